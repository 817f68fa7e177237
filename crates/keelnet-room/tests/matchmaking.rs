//! Integration tests for room assignment.

use std::collections::HashSet;
use std::sync::Arc;

use keelnet_protocol::{RoomNumber, UserId};
use keelnet_room::{MatchMaker, RoomConfig, RoomError};
use rand::Rng;

// =========================================================================
// Overflow into a second room
// =========================================================================

#[test]
fn test_enter_user_101st_goes_to_room_two() {
    let mm = MatchMaker::new(RoomConfig::default());

    for n in 1..=100 {
        assert_eq!(mm.enter_user(UserId(n)), Ok(RoomNumber(1)));
    }
    assert_eq!(mm.enter_user(UserId(101)), Ok(RoomNumber(2)));

    let rooms = mm.rooms();
    assert_eq!(rooms.len(), 2);
    assert_eq!(rooms[0].members, 100);
    assert_eq!(rooms[1].members, 1);
    assert_eq!(mm.room_members(RoomNumber(2)), Some(vec![UserId(101)]));
}

#[test]
fn test_enter_user_fills_freed_slot_in_earlier_room() {
    let mm = MatchMaker::new(RoomConfig::default());
    for n in 1..=101 {
        mm.enter_user(UserId(n)).unwrap();
    }

    mm.exit_user(UserId(42)).unwrap();
    // First fit: room 1 has a slot again.
    assert_eq!(mm.enter_user(UserId(500)), Ok(RoomNumber(1)));
    assert_eq!(mm.room_count(), 2);
}

#[test]
fn test_emptied_room_is_reused_not_recreated() {
    let mm = MatchMaker::new(RoomConfig { capacity: 1 });
    mm.enter_user(UserId(1)).unwrap();
    mm.enter_user(UserId(2)).unwrap();
    mm.exit_user(UserId(1)).unwrap();

    assert_eq!(mm.enter_user(UserId(3)), Ok(RoomNumber(1)));
    assert_eq!(mm.room_count(), 2);
}

// =========================================================================
// Invariants under random operation sequences
// =========================================================================

#[test]
fn test_random_enter_exit_sequence_keeps_invariants() {
    let mut rng = rand::rng();

    for _ in 0..10 {
        let mm = MatchMaker::new(RoomConfig { capacity: 7 });
        let mut inside: HashSet<u64> = HashSet::new();

        for _ in 0..2_000 {
            let user = rng.random_range(0..60u64);
            if rng.random_bool(0.6) {
                let result = mm.enter_user(UserId(user));
                if inside.insert(user) {
                    assert!(result.is_ok());
                } else {
                    assert!(matches!(result, Err(RoomError::AlreadyInRoom(..))));
                }
            } else {
                let result = mm.exit_user(UserId(user));
                if inside.remove(&user) {
                    assert!(result.is_ok());
                } else {
                    assert_eq!(result, Err(RoomError::NotInAnyRoom(UserId(user))));
                }
            }
            mm.check_invariants().unwrap();
        }

        assert_eq!(mm.user_count(), inside.len());
        assert!(mm.rooms().iter().all(|r| r.members <= 7));
    }
}

// =========================================================================
// Concurrency
// =========================================================================

#[test]
fn test_concurrent_enter_user_never_overfills() {
    const THREADS: u64 = 8;
    const PER_THREAD: u64 = 125;

    let mm = Arc::new(MatchMaker::new(RoomConfig::default()));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let mm = Arc::clone(&mm);
            std::thread::spawn(move || {
                for i in 0..PER_THREAD {
                    mm.enter_user(UserId(t * PER_THREAD + i)).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let rooms = mm.rooms();
    assert_eq!(rooms.len(), 10);
    assert!(rooms.iter().all(|r| r.members == 100));
    mm.check_invariants().unwrap();
}
