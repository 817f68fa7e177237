//! Server and client configuration.
//!
//! Both structs deserialize from a JSON settings document; every field is
//! optional and falls back to its default. The cipher key is deliberately
//! absent: it is embedded in the binary, see [`CipherKey::embedded`].
//!
//! [`CipherKey::embedded`]: keelnet_protocol::CipherKey::embedded

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use keelnet_room::RoomConfig;
use keelnet_tick::TickConfig;
use keelnet_transport::LinkSettings;
use serde::{Deserialize, Serialize};

/// Errors from loading a settings document.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid settings document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on.
    pub host: IpAddr,

    pub port: u16,

    /// Listen backlog handed to the OS.
    pub backlog: u32,

    /// Bytes requested per socket read.
    pub recv_buffer_size: usize,

    /// Largest `totalSize` a client may announce. Anything bigger closes
    /// the connection.
    pub max_frame_size: usize,

    /// Connection pool slots. Accepted sockets beyond this are closed.
    pub max_connections: usize,

    /// Dispatcher pump rate.
    pub tick_rate_hz: u32,

    /// Length of the filler text in every ping response.
    pub ping_text_len: usize,

    /// Length of the shorter second response sent after each ping reply.
    /// `0` sends only the first.
    pub ping_followup_len: usize,

    #[serde(default)]
    pub rooms: RoomConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 20000,
            backlog: 10,
            recv_buffer_size: 4096,
            max_frame_size: 4096,
            max_connections: 1024,
            tick_rate_hz: 1000,
            ping_text_len: 2000,
            ping_followup_len: 200,
            rooms: RoomConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parses a JSON settings document and validates it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recv_buffer_size == 0 {
            return Err(invalid("recv_buffer_size", "must be positive"));
        }
        if self.max_frame_size < keelnet_protocol::HEADER_SIZE {
            return Err(invalid(
                "max_frame_size",
                format!("must be at least {} bytes", keelnet_protocol::HEADER_SIZE),
            ));
        }
        if self.max_connections == 0 {
            return Err(invalid("max_connections", "must be positive"));
        }
        if self.rooms.capacity == 0 {
            return Err(invalid("rooms.capacity", "must be positive"));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            recv_buffer_size: self.recv_buffer_size,
            max_frame_size: self.max_frame_size,
        }
    }

    pub fn tick_config(&self) -> TickConfig {
        TickConfig::with_rate(self.tick_rate_hz)
    }
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Hostname or dotted-quad of the server.
    pub host: String,

    pub port: u16,

    pub recv_buffer_size: usize,

    pub max_frame_size: usize,

    /// How long the application may sit in the background before it
    /// should drop the connection. Keelnet itself never reads this.
    pub background_disconnect_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 20000,
            recv_buffer_size: 4096,
            max_frame_size: 8192,
            background_disconnect_secs: 60,
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        if config.host.is_empty() {
            return Err(invalid("host", "must not be empty"));
        }
        if config.recv_buffer_size == 0 {
            return Err(invalid("recv_buffer_size", "must be positive"));
        }
        Ok(config)
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            recv_buffer_size: self.recv_buffer_size,
            max_frame_size: self.max_frame_size,
        }
    }

    pub fn background_disconnect(&self) -> Duration {
        Duration::from_secs(self.background_disconnect_secs)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
