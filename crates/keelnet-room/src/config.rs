//! Room configuration.

use serde::{Deserialize, Serialize};

/// Settings shared by every room a [`MatchMaker`](crate::MatchMaker)
/// creates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Maximum users per room.
    pub capacity: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_config_default() {
        assert_eq!(RoomConfig::default().capacity, 100);
    }
}
