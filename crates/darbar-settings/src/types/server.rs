use serde::{Deserialize, Serialize};

/// Listener and per-connection transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP/WebSocket port. `0` picks an ephemeral port.
    pub port: u16,
    /// Outbound frames buffered per connection before new ones are dropped.
    pub max_send_queue: usize,
    /// Dropped frames after which a connection is closed as a slow client.
    pub max_drops: u64,
    /// Ping cadence.
    pub heartbeat_interval_secs: u64,
    /// Silence (no pong, no frame) after which a client is reaped.
    pub client_timeout_secs: u64,
    /// How often the reaper runs.
    pub cleanup_interval_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_send_queue: 256,
            max_drops: 100,
            heartbeat_interval_secs: 30,
            client_timeout_secs: 90,
            cleanup_interval_secs: 60,
        }
    }
}

impl ServerSettings {
    pub(crate) fn clamp(&mut self) {
        clamp_field("server.maxSendQueue", &mut self.max_send_queue, 1, 65_536);
        clamp_field("server.maxDrops", &mut self.max_drops, 1, 1_000_000);
        clamp_field("server.heartbeatIntervalSecs", &mut self.heartbeat_interval_secs, 1, 3600);
        clamp_field("server.cleanupIntervalSecs", &mut self.cleanup_interval_secs, 1, 3600);
        // A client must survive at least one missed ping.
        let min_timeout = self.heartbeat_interval_secs * 2;
        clamp_field("server.clientTimeoutSecs", &mut self.client_timeout_secs, min_timeout, 86_400.max(min_timeout));
    }
}

pub(crate) fn clamp_field<T>(key: &str, value: &mut T, min: T, max: T)
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    let clamped = if *value < min {
        min
    } else if *value > max {
        max
    } else {
        return;
    };
    tracing::warn!(key, value = %value, clamped = %clamped, "settings value out of range, clamping");
    *value = clamped;
}
