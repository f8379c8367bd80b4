use std::time::Duration;

/// Settings for outbound webhook requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// Per-request timeout, covering connect through reading the body.
    pub timeout: Duration,
    /// Maximum number of response body bytes stored on a delivery record.
    pub response_excerpt_limit: usize,
    /// Upper bound on in-flight webhook requests across all events.
    pub max_concurrent: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            response_excerpt_limit: 1024,
            max_concurrent: 64,
        }
    }
}
