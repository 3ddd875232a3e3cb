use std::sync::Arc;

use anyhow::Context;
use colored::{ColoredString, Colorize};
use tokio::sync::watch;
use tracing::{info, warn};

use ptrack_broker::{Broker, BrokerConsumer};
use ptrack_gateway::{Gateway, InProcessPeer, LedgerClient};
use ptrack_ledger::LedgerNetwork;
use ptrack_server::{AppState, PtrackServer};
use ptrack_store::{open_store, ProductStore};
use ptrack_types::{CreationEvent, ProductRecord, ProductStatus};
use ptrack_worker::{IntakeService, VerificationWorker};

use crate::cli::*;
use crate::config::AppConfig;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?.with_overrides(cli.db_path, cli.data_dir);
    match cli.command {
        Command::Serve(args) => cmd_serve(config, args).await,
        Command::Worker(args) => cmd_worker(config.with_retry(&args.retry)).await,
        Command::Dev(args) => cmd_dev(config.with_retry(&args.retry), args).await,
        Command::Inspect(args) => match args.target {
            InspectTarget::Products => cmd_inspect_products(&config),
            InspectTarget::Events { partition } => cmd_inspect_events(&config, partition),
        },
    }
}

fn open_broker(config: &AppConfig) -> anyhow::Result<Arc<Broker>> {
    if config.broker.data_dir.is_none() {
        warn!("broker has no data_dir; events live only as long as this process");
    }
    let broker = Broker::open(config.broker.clone()).context("opening broker")?;
    Ok(Arc::new(broker))
}

fn open_product_store(config: &AppConfig) -> anyhow::Result<Arc<dyn ProductStore>> {
    open_store(&config.store).context("opening product store")
}

fn intake(config: &AppConfig, broker: &Arc<Broker>, store: &Arc<dyn ProductStore>) -> Arc<IntakeService> {
    Arc::new(IntakeService::new(
        store.clone(),
        broker.clone(),
        config.broker.topic.clone(),
    ))
}

fn ledger(config: &AppConfig) -> Arc<Gateway<InProcessPeer>> {
    let network = LedgerNetwork::new(&config.gateway.channel, &config.gateway.contract);
    Arc::new(Gateway::new(
        InProcessPeer::new(Arc::new(network)),
        config.gateway.clone(),
    ))
}

fn worker(
    config: &AppConfig,
    broker: &Arc<Broker>,
    store: &Arc<dyn ProductStore>,
    ledger: Arc<dyn LedgerClient>,
) -> anyhow::Result<VerificationWorker<BrokerConsumer>> {
    let consumer = broker
        .subscribe(&config.broker.topic, &config.broker.consumer_group)
        .context("joining consumer group")?;
    info!(
        topic = %config.broker.topic,
        group = %config.broker.consumer_group,
        partitions = ?consumer.assigned(),
        max_attempts = config.worker.retry.max_attempts(),
        "verification worker started"
    );
    Ok(VerificationWorker::new(consumer, ledger, store.clone(), config.worker.clone())
        .with_dead_letters(broker.clone()))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn cmd_serve(mut config: AppConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    let broker = open_broker(&config)?;
    let store = open_product_store(&config)?;
    let state = AppState::new(intake(&config, &broker, &store));

    println!("{} ptrack API on {}", "✓".green().bold(), config.server.bind_addr.to_string().bold());
    PtrackServer::new(config.server, state)
        .serve_with_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn cmd_worker(config: AppConfig) -> anyhow::Result<()> {
    let broker = open_broker(&config)?;
    let store = open_product_store(&config)?;
    let mut worker = worker(&config, &broker, &store, ledger(&config))?;

    let (stop, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = stop.send(true);
    });
    worker.run(shutdown).await?;
    Ok(())
}

async fn cmd_dev(mut config: AppConfig, args: DevArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    let broker = open_broker(&config)?;
    let store = open_product_store(&config)?;
    let ledger = ledger(&config);

    let mut worker = worker(&config, &broker, &store, ledger.clone())?;
    let state = AppState::new(intake(&config, &broker, &store)).with_ledger(ledger);

    let (stop, shutdown) = watch::channel(false);
    let worker_task = tokio::spawn(async move { worker.run(shutdown).await });

    println!(
        "{} ptrack dev pipeline on {} (topic {}, in-process ledger)",
        "✓".green().bold(),
        config.server.bind_addr.to_string().bold(),
        config.broker.topic.cyan()
    );
    let served = PtrackServer::new(config.server, state)
        .serve_with_shutdown(shutdown_signal())
        .await;

    let _ = stop.send(true);
    worker_task.await.context("worker task panicked")??;
    served?;
    Ok(())
}

fn status_label(status: ProductStatus) -> ColoredString {
    match status {
        ProductStatus::Pending => status.as_str().yellow(),
        ProductStatus::Verified => status.as_str().green(),
        ProductStatus::Failed => status.as_str().red(),
    }
}

fn product_line(record: &ProductRecord) -> String {
    let mut line = format!(
        "{:<8} {}  {}  ({})",
        status_label(record.status),
        record.id.to_string().bold(),
        record.fields.name,
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
    );
    if let Some(tx) = &record.ledger_tx_id {
        line.push_str(&format!("  tx {}", tx.short_hex().dimmed()));
    }
    if let Some(reason) = &record.failure_reason {
        line.push_str(&format!("  [{}, {} attempts]", reason, record.attempts));
    }
    line
}

fn cmd_inspect_products(config: &AppConfig) -> anyhow::Result<()> {
    let store = open_product_store(config)?;
    let records = store.list_recent()?;
    if records.is_empty() {
        println!("No products.");
        return Ok(());
    }
    for record in &records {
        println!("{}", product_line(record));
    }
    let verified = records.iter().filter(|r| r.status == ProductStatus::Verified).count();
    let failed = records.iter().filter(|r| r.status == ProductStatus::Failed).count();
    println!(
        "\n{} products: {} verified, {} failed, {} pending",
        records.len(),
        verified.to_string().green(),
        failed.to_string().red(),
        (records.len() - verified - failed).to_string().yellow()
    );
    Ok(())
}

fn cmd_inspect_events(config: &AppConfig, partition: Option<u32>) -> anyhow::Result<()> {
    const BATCH: usize = 256;

    let broker = open_broker(config)?;
    let topic = &config.broker.topic;
    let count = broker.partition_count(topic)?;
    let partitions: Vec<u32> = match partition {
        Some(p) if p >= count => anyhow::bail!("topic {topic} has {count} partitions; no partition {p}"),
        Some(p) => vec![p],
        None => (0..count).collect(),
    };
    let committed = broker.offsets().group_offsets(&config.broker.consumer_group, topic);

    for p in partitions {
        let end = broker.end_offset(topic, p)?;
        let position = committed.get(&p).copied().unwrap_or(0);
        println!(
            "{} {}/{}  end {}  committed {}  lag {}",
            "partition".bold(),
            topic,
            p,
            end,
            position,
            end.saturating_sub(position)
        );

        let mut offset = 0;
        loop {
            let batch = broker.fetch(topic, p, offset, BATCH)?;
            let Some(last) = batch.last() else { break };
            offset = last.offset + 1;
            for message in &batch {
                let marker = if message.offset < position { " " } else { "*" };
                let summary = match CreationEvent::decode(&message.value) {
                    Ok(event) => format!("{} {}", event.fields.name, event.fields.integrity_hash.dimmed()),
                    Err(err) => err.to_string().red().to_string(),
                };
                println!(
                    "  {marker} {:>6}  {}  {}  {}",
                    message.offset,
                    message.timestamp().format("%Y-%m-%d %H:%M:%S"),
                    String::from_utf8_lossy(&message.key).yellow(),
                    summary
                );
            }
        }
    }
    Ok(())
}
