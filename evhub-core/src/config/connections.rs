use std::time::Duration;

/// Settings for live event-stream connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Drop sessions that have not produced a ping or pong for this long.
    /// `None` disables the sweep.
    pub idle_timeout: Option<Duration>,
    pub sweep_interval: Duration,
    /// Period of the transport Ping each socket sends. A client answering
    /// with Pong stays live without sending pings of its own.
    pub keepalive_interval: Duration,
    /// Time allowed for one frame write before the connection is dropped.
    pub write_timeout: Duration,
    /// Frames queued per connection before it counts as too slow and is
    /// dropped.
    pub outbound_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(90)),
            sweep_interval: Duration::from_secs(15),
            keepalive_interval: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
            outbound_buffer: 64,
        }
    }
}
