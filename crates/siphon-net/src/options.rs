use std::time::Duration;

/// Outbound connection tuning for the upstream hub.
#[derive(Clone, Debug)]
pub struct NetOptions {
    /// TCP connect (including TLS handshake) deadline.
    pub connect_timeout: Duration,
    /// Keep-alive interval for pooled connections.
    pub tcp_keepalive: Duration,
    /// How long idle pooled connections are kept around.
    pub pool_idle_timeout: Duration,
    /// Max idle connections per host.
    pub pool_max_idle_per_host: usize,
}

impl Default for NetOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(60),
            tcp_keepalive: Duration::from_secs(60),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 100,
        }
    }
}
