/// Lifecycle of one connection, shared by both roles.
///
/// ```text
/// Uninitialized ─► Connecting ─► Connected ─► Disconnecting ─► Disconnected
///                      │              │                            ▲
///                      └──────────────┴────────────────────────────┘
/// ```
///
/// A client may go from `Disconnected` back to `Connecting`. A server
/// connection is born `Connected` and ends `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Uninitialized,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

impl ConnectionState {
    /// Whether a new connect attempt may start from this state.
    pub fn can_connect(self) -> bool {
        matches!(self, Self::Uninitialized | Self::Disconnected)
    }
}
