use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use ptrack_broker::BrokerConfig;
use ptrack_gateway::GatewayConfig;
use ptrack_server::ServerConfig;
use ptrack_store::StoreConfig;
use ptrack_worker::{RetryPolicy, WorkerConfig};

use crate::cli::RetryArgs;

/// Everything a ptrack process can be configured with, one TOML table per
/// component. Missing tables and keys keep their defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub broker: BrokerConfig,
    pub store: StoreConfig,
    pub gateway: GatewayConfig,
    pub worker: WorkerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            // Separate `serve` and `worker` processes meet on disk.
            broker: BrokerConfig::durable("data/broker"),
            store: StoreConfig::default(),
            gateway: GatewayConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Read `path`, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Apply `--db-path` / `--data-dir` (or their environment variables).
    pub fn with_overrides(mut self, db_path: Option<PathBuf>, data_dir: Option<PathBuf>) -> Self {
        if let Some(path) = db_path {
            self.store = StoreConfig::Sqlite { path };
        }
        if let Some(dir) = data_dir {
            self.broker.data_dir = Some(dir);
        }
        self
    }

    /// Apply the worker's retry flags.
    pub fn with_retry(mut self, args: &RetryArgs) -> Self {
        if args.fail_fast {
            self.worker.retry = RetryPolicy::fail_fast();
        } else if let Some(n) = args.max_attempts {
            self.worker.retry.max_attempts = n;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_durable() {
        let c = AppConfig::load(None).unwrap();
        assert_eq!(c.broker.data_dir, Some(PathBuf::from("data/broker")));
        assert_eq!(
            c.store,
            StoreConfig::Sqlite {
                path: PathBuf::from("data/ptrack.db")
            }
        );
        assert_eq!(c.server.bind_addr.port(), 8080);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[store]
backend = "memory"

[worker]
dead_letter_topic = "product.create.dlq"

[worker.retry]
max_attempts = 5

[gateway]
commit_status_timeout_ms = 30000
"#
        )
        .unwrap();

        let c = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(c.store, StoreConfig::Memory);
        assert_eq!(c.worker.retry.max_attempts, 5);
        assert_eq!(c.worker.retry.initial_backoff_ms, 500);
        assert_eq!(c.worker.dead_letter_topic.as_deref(), Some("product.create.dlq"));
        assert_eq!(c.gateway.commit_status_timeout_ms, 30_000);
        assert_eq!(c.gateway.connect_timeout_ms, 10_000);
        assert_eq!(c.broker.topic, "product.create");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn overrides_win() {
        let c = AppConfig::default()
            .with_overrides(Some("/tmp/p.db".into()), Some("/tmp/broker".into()))
            .with_retry(&RetryArgs {
                fail_fast: true,
                max_attempts: None,
            });
        assert_eq!(c.store, StoreConfig::Sqlite { path: "/tmp/p.db".into() });
        assert_eq!(c.broker.data_dir, Some(PathBuf::from("/tmp/broker")));
        assert_eq!(c.worker.retry, RetryPolicy::fail_fast());
    }
}
