//! Session id issuance.
//!
//! Session ids come from one counter behind a mutex. The issuer is an
//! ordinary value injected wherever ids are needed, not a process-wide
//! static, so each server (and each test) gets its own sequence.

use parking_lot::Mutex;

use keelnet_protocol::SessionId;

/// Hands out session ids 1, 2, 3, ... with no gaps or duplicates, however
/// many threads call [`issue`](Self::issue) at once.
#[derive(Debug, Default)]
pub struct SessionIssuer {
    last: Mutex<u64>,
}

impl SessionIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues the next id.
    pub fn issue(&self) -> SessionId {
        let mut last = self.last.lock();
        // 2^64 logins will not happen; wrapping would hand out 0, the
        // "unauthenticated" value, so saturate instead.
        *last = last.saturating_add(1);
        SessionId(*last)
    }

    /// The most recently issued id, or [`SessionId::NONE`].
    pub fn last_issued(&self) -> SessionId {
        SessionId(*self.last.lock())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_issue_starts_at_one() {
        let issuer = SessionIssuer::new();
        assert_eq!(issuer.last_issued(), SessionId::NONE);
        assert_eq!(issuer.issue(), SessionId(1));
        assert_eq!(issuer.issue(), SessionId(2));
        assert_eq!(issuer.last_issued(), SessionId(2));
    }

    #[test]
    fn test_issue_concurrent_callers_get_one_to_k() {
        const THREADS: u64 = 8;
        const PER_THREAD: u64 = 500;

        let issuer = Arc::new(SessionIssuer::new());
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let issuer = Arc::clone(&issuer);
                std::thread::spawn(move || {
                    (0..PER_THREAD).map(|_| issuer.issue().0).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(all.insert(id), "duplicate session id {id}");
            }
        }

        let k = THREADS * PER_THREAD;
        assert_eq!(all, (1..=k).collect::<HashSet<_>>());
    }

    #[test]
    fn test_separate_issuers_are_independent() {
        let a = SessionIssuer::new();
        let b = SessionIssuer::new();
        a.issue();
        a.issue();
        assert_eq!(b.issue(), SessionId(1));
    }
}
