use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ptrack",
    about = "ptrack: product records verified on a tamper-evident ledger",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json: bool,

    /// SQLite database path (overrides the configured store).
    #[arg(long, global = true, env = "PTRACK_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Broker data directory (overrides the configured one).
    #[arg(long, global = true, env = "PTRACK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP intake and read API
    Serve(ServeArgs),
    /// Run the verification worker
    Worker(WorkerArgs),
    /// Run broker, ledger, store, API and worker in one process
    Dev(DevArgs),
    /// Inspect the store or the event log
    Inspect(InspectArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[derive(Args, Default)]
pub struct RetryArgs {
    /// Mark a product FAILED on the first transport failure.
    #[arg(long, conflicts_with = "max_attempts")]
    pub fail_fast: bool,

    /// Ledger submissions per product before giving up.
    #[arg(long)]
    pub max_attempts: Option<u32>,
}

#[derive(Args)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub retry: RetryArgs,
}

#[derive(Args)]
pub struct DevArgs {
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    #[command(flatten)]
    pub retry: RetryArgs,
}

#[derive(Args)]
pub struct InspectArgs {
    #[command(subcommand)]
    pub target: InspectTarget,
}

#[derive(Subcommand)]
pub enum InspectTarget {
    /// List products, most recent first
    Products,
    /// Dump the creation-event log and committed offsets
    Events {
        #[arg(short, long)]
        partition: Option<u32>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serve() {
        let cli = Cli::try_parse_from(["ptrack", "serve", "--bind", "127.0.0.1:9000"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.bind, Some("127.0.0.1:9000".parse().unwrap()));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_worker_fail_fast() {
        let cli = Cli::try_parse_from(["ptrack", "worker", "--fail-fast"]).unwrap();
        if let Command::Worker(args) = cli.command {
            assert!(args.retry.fail_fast);
            assert_eq!(args.retry.max_attempts, None);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn fail_fast_conflicts_with_max_attempts() {
        assert!(Cli::try_parse_from(["ptrack", "worker", "--fail-fast", "--max-attempts", "4"]).is_err());
    }

    #[test]
    fn parse_dev() {
        let cli = Cli::try_parse_from(["ptrack", "dev", "--max-attempts", "5"]).unwrap();
        if let Command::Dev(args) = cli.command {
            assert_eq!(args.retry.max_attempts, Some(5));
            assert_eq!(args.bind, None);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_inspect_events() {
        let cli = Cli::try_parse_from(["ptrack", "inspect", "events", "-p", "2"]).unwrap();
        if let Command::Inspect(args) = cli.command {
            assert!(matches!(args.target, InspectTarget::Events { partition: Some(2) }));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_inspect_products() {
        let cli = Cli::try_parse_from(["ptrack", "inspect", "products"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Inspect(InspectArgs { target: InspectTarget::Products })
        ));
    }

    #[test]
    fn global_flags() {
        let cli = Cli::try_parse_from([
            "ptrack", "--verbose", "--json", "-c", "ptrack.toml", "--db-path", "/tmp/p.db", "worker",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("ptrack.toml")));
        assert_eq!(cli.db_path, Some(PathBuf::from("/tmp/p.db")));
    }
}
