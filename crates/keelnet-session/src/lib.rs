//! Session issuance for Keelnet.
//!
//! Two pieces:
//!
//! 1. **Issuance**: handing out strictly increasing session ids
//!    ([`SessionIssuer`]).
//! 2. **Binding**: remembering which connection holds which session
//!    ([`SessionRegistry`]).
//!
//! A session carries no authority. It only marks "this connection has
//! logged in" and feeds the per-frame IV derivation.
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)     ← gets a UserId once a session is bound
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol Layer (below) ← provides SessionId, ConnectionId, UserId
//! ```

mod error;
mod issuer;
mod manager;
mod session;

pub use error::SessionError;
pub use issuer::SessionIssuer;
pub use manager::SessionRegistry;
pub use session::Session;
