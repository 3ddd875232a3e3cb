use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection and timeout settings for the ledger [`Gateway`](crate::Gateway).
///
/// Connection setup, endorsement, ordering and commit confirmation are
/// distinct round-trips with different latency profiles, so each has its own
/// bound. A submission can block for at most the sum of the connect,
/// endorse, submit and commit-status bounds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub channel: String,
    pub contract: String,
    pub connect_timeout_ms: u64,
    /// Bound for read-only evaluations (`ReadProduct`, `GetAllProducts`).
    pub evaluate_timeout_ms: u64,
    pub endorse_timeout_ms: u64,
    pub submit_timeout_ms: u64,
    pub commit_status_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            channel: "mychannel".into(),
            contract: "product_cc".into(),
            connect_timeout_ms: 10_000,
            evaluate_timeout_ms: 5_000,
            endorse_timeout_ms: 15_000,
            submit_timeout_ms: 5_000,
            commit_status_timeout_ms: 60_000,
        }
    }
}

impl GatewayConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn evaluate_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluate_timeout_ms)
    }

    pub fn endorse_timeout(&self) -> Duration {
        Duration::from_millis(self.endorse_timeout_ms)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn commit_status_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_status_timeout_ms)
    }

    /// Upper bound on how long one `submit_create` may block.
    pub fn max_submission_time(&self) -> Duration {
        self.connect_timeout()
            + self.endorse_timeout()
            + self.submit_timeout()
            + self.commit_status_timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = GatewayConfig::default();
        assert_eq!(c.channel, "mychannel");
        assert_eq!(c.contract, "product_cc");
        assert_eq!(c.endorse_timeout(), Duration::from_secs(15));
        assert_eq!(c.commit_status_timeout(), Duration::from_secs(60));
        assert_eq!(c.max_submission_time(), Duration::from_secs(90));
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let c: GatewayConfig =
            serde_json::from_str(r#"{"commit_status_timeout_ms": 250}"#).unwrap();
        assert_eq!(c.commit_status_timeout(), Duration::from_millis(250));
        assert_eq!(c.submit_timeout(), Duration::from_secs(5));
    }
}
