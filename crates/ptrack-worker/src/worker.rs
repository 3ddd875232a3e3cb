use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, field, info, info_span, warn, Instrument};

use ptrack_broker::{Delivery, EventConsumer, EventPublisher};
use ptrack_gateway::{CreateRequest, GatewayError, LedgerClient, RejectionKind};
use ptrack_store::{ProductStore, StoreError};
use ptrack_types::{CreationEvent, ProductRecord};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::outcome::{DeadLetter, Disposition, Outcome};

/// The verification pipeline's orchestrator.
///
/// One event is fully processed (ledger submission, store update, position
/// commit) before the next is pulled. Every collaborator is passed in, so
/// tests can substitute a fake ledger, an in-memory broker and an in-memory
/// store.
pub struct VerificationWorker<C> {
    consumer: C,
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn ProductStore>,
    dead_letters: Option<Arc<dyn EventPublisher>>,
    config: WorkerConfig,
}

impl<C: EventConsumer> VerificationWorker<C> {
    pub fn new(
        consumer: C,
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn ProductStore>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            consumer,
            ledger,
            store,
            dead_letters: None,
            config,
        }
    }

    /// Publisher for `config.dead_letter_topic`.
    pub fn with_dead_letters(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.dead_letters = Some(publisher);
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }

    /// Process the next available event, if any.
    ///
    /// Returns `Ok(None)` when every assigned partition is caught up.
    pub async fn run_once(&mut self) -> WorkerResult<Option<Disposition>> {
        match self.consumer.poll().await? {
            Some(delivery) => self.handle(delivery).await.map(Some),
            None => Ok(None),
        }
    }

    /// Run the consumption loop until `shutdown` becomes `true` (or its
    /// sender is dropped).
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> WorkerResult<()> {
        info!(
            max_attempts = self.config.retry.max_attempts(),
            dead_letter_topic = ?self.config.dead_letter_topic,
            "verification worker started"
        );
        loop {
            if *shutdown.borrow() {
                break;
            }
            let next = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                next = self.consumer.next() => next,
            };

            let pause = match next {
                Ok(delivery) => match self.handle(delivery).await {
                    Ok(_) => None,
                    Err(err) if err.is_store_outage() => {
                        error!(error = %err, "store unavailable; event will be redelivered");
                        Some(self.config.store_retry_backoff())
                    }
                    Err(err) => {
                        error!(error = %err, "event not completed; will be redelivered");
                        Some(self.config.store_retry_backoff())
                    }
                },
                Err(err) => {
                    error!(error = %err, "failed to fetch from broker");
                    Some(self.config.store_retry_backoff())
                }
            };

            if let Some(pause) = pause {
                tokio::select! {
                    _ = shutdown.changed() => {}
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }
        info!("verification worker stopped");
        Ok(())
    }

    /// Process one delivery, then commit its position; on error rewind so it
    /// is delivered again.
    pub async fn handle(&mut self, delivery: Delivery) -> WorkerResult<Disposition> {
        match self.process_event(&delivery).await {
            Ok(disposition) => {
                self.consumer.commit(&delivery).await?;
                Ok(disposition)
            }
            Err(err) => {
                self.consumer.rewind(&delivery).await?;
                Err(err)
            }
        }
    }

    /// Decode, submit and reconcile one event. Does not touch the consumer
    /// position.
    pub async fn process_event(&self, delivery: &Delivery) -> WorkerResult<Disposition> {
        let span = info_span!(
            "verify",
            product_id = field::Empty,
            partition = delivery.partition,
            offset = delivery.offset
        );
        self.process_inner(delivery, &span).instrument(span.clone()).await
    }

    async fn process_inner(&self, delivery: &Delivery, span: &tracing::Span) -> WorkerResult<Disposition> {
        let event = match CreationEvent::decode(&delivery.value) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "dropping malformed creation event");
                return Ok(Disposition::Dropped {
                    reason: err.to_string(),
                });
            }
        };
        span.record("product_id", field::display(&event.id));
        debug!("creation event received");

        let Some(row) = self.store.get(&event.id)? else {
            error!("no relational row for event; skipping ledger submission");
            return Ok(Disposition::Orphaned { id: event.id });
        };

        // Only an explicit retry (FAILED -> PENDING) re-opens a row for
        // submission.
        if row.status.is_terminal() {
            let outcome = (row.fields != event.fields).then(|| {
                warn!(status = %row.status, "event conflicts with a reconciled row; not submitting");
                Outcome::Rejected {
                    kind: RejectionKind::Duplicate,
                    reason: RejectionKind::Duplicate.to_string(),
                }
            });
            if outcome.is_none() {
                info!(status = %row.status, "event already reconciled");
            }
            return Ok(Disposition::AlreadyReconciled {
                id: event.id,
                outcome,
                current: row.status,
            });
        }

        let max_attempts = self.config.retry.max_attempts();
        let outcome = if row.attempts >= max_attempts {
            warn!(attempts = row.attempts, "retry budget already spent; not resubmitting");
            Outcome::TransportFailed {
                reason: row
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| format!("retry budget exhausted after {} attempts", row.attempts)),
                attempts: row.attempts,
            }
        } else {
            self.submit(&event).await?
        };

        if let Outcome::TransportFailed { reason, attempts } = &outcome {
            self.dead_letter(delivery, &event, reason, *attempts).await?;
        }
        self.reconcile(&event, outcome)
    }

    /// Submit with retries; returns once the outcome is definitive or the
    /// retry budget is spent.
    async fn submit(&self, event: &CreationEvent) -> WorkerResult<Outcome> {
        let request = CreateRequest::from(event);
        let max_attempts = self.config.retry.max_attempts();

        loop {
            // Persist the attempt first so a crash mid-submission still
            // counts against the budget.
            let attempt = self.store.record_attempt(&event.id)?.attempts;
            debug!(attempt, "submitting to ledger");

            let err = match self.ledger.submit_create(&request).await {
                Ok(receipt) => {
                    info!(tx_id = %receipt.tx_id.short_hex(), seq = receipt.seq, attempt, "ledger commit confirmed");
                    return Ok(Outcome::Committed(receipt));
                }
                Err(err) => err,
            };

            let err = match err {
                GatewayError::Rejected {
                    kind: RejectionKind::Duplicate,
                    ..
                } => match self.reconcile_duplicate(event).await {
                    Ok(outcome) => return Ok(outcome),
                    Err(err) => err,
                },
                err => err,
            };

            match err {
                GatewayError::Rejected { kind, message } => {
                    warn!(%kind, %message, "ledger rejected product");
                    return Ok(Outcome::Rejected {
                        kind,
                        reason: kind.to_string(),
                    });
                }
                GatewayError::Transport(_) if attempt >= max_attempts => {
                    warn!(attempt, error = %err, "ledger unreachable; retry budget spent");
                    return Ok(Outcome::TransportFailed {
                        reason: err.classification(),
                        attempts: attempt,
                    });
                }
                GatewayError::Transport(_) => {
                    let backoff = self.config.retry.backoff(attempt);
                    warn!(attempt, error = %err, ?backoff, "transient ledger failure; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// A duplicate rejection is only a failure if the ledger holds something
    /// other than this event.
    ///
    /// A read-back that fails in transport is handed back to the submit loop:
    /// the ledger may well hold this exact record.
    async fn reconcile_duplicate(&self, event: &CreationEvent) -> Result<Outcome, GatewayError> {
        let duplicate = Outcome::Rejected {
            kind: RejectionKind::Duplicate,
            reason: RejectionKind::Duplicate.to_string(),
        };
        match self.ledger.read_product(&event.id).await {
            Ok(existing) if existing.matches(&event.fields) => {
                info!(tx_id = %existing.tx_id.short_hex(), "ledger already holds this product; recovered");
                Ok(Outcome::Recovered {
                    tx_id: existing.tx_id,
                })
            }
            Ok(_) => {
                warn!("ledger holds a different product under this id");
                Ok(duplicate)
            }
            Err(GatewayError::Rejected { kind, message }) => {
                warn!(%kind, %message, "duplicate not readable from ledger");
                Ok(duplicate)
            }
            Err(err) => {
                warn!(error = %err, "could not read back duplicate from ledger");
                Err(err)
            }
        }
    }

    async fn dead_letter(
        &self,
        delivery: &Delivery,
        event: &CreationEvent,
        reason: &str,
        attempts: u32,
    ) -> WorkerResult<()> {
        let (Some(topic), Some(publisher)) = (&self.config.dead_letter_topic, &self.dead_letters) else {
            return Ok(());
        };
        let letter = DeadLetter {
            product_id: &event.id,
            reason,
            attempts,
            source_topic: &delivery.topic,
            source_partition: delivery.partition,
            source_offset: delivery.offset,
            event: serde_json::to_value(event).map_err(|e| WorkerError::Serialization(e.to_string()))?,
        };
        let payload =
            serde_json::to_vec(&letter).map_err(|e| WorkerError::Serialization(e.to_string()))?;
        let published = publisher.publish(topic, event.key(), &payload).await?;
        info!(topic = %topic, partition = published.partition, offset = published.offset, "event dead-lettered");
        Ok(())
    }

    fn reconcile(&self, event: &CreationEvent, outcome: Outcome) -> WorkerResult<Disposition> {
        let update = outcome.status_update();
        match self.store.apply_outcome(&event.id, &update) {
            Ok(record) => {
                log_reconciled(&record, &outcome);
                Ok(Disposition::Reconciled { outcome, record })
            }
            Err(StoreError::InvalidTransition { from, to, .. }) => {
                warn!(%from, %to, outcome = outcome.label(), "store refused transition; keeping current status");
                Ok(Disposition::AlreadyReconciled {
                    id: event.id.clone(),
                    outcome: Some(outcome),
                    current: from,
                })
            }
            Err(StoreError::NotFound(id)) => {
                error!("relational row vanished before the outcome could be written");
                Ok(Disposition::Orphaned { id })
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn log_reconciled(record: &ProductRecord, outcome: &Outcome) {
    match outcome {
        Outcome::Committed(_) | Outcome::Recovered { .. } => info!(
            status = %record.status,
            outcome = outcome.label(),
            "product verified"
        ),
        Outcome::Rejected { .. } | Outcome::TransportFailed { .. } => warn!(
            status = %record.status,
            outcome = outcome.label(),
            reason = record.failure_reason.as_deref().unwrap_or_default(),
            "product failed"
        ),
    }
}

impl<C> std::fmt::Debug for VerificationWorker<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationWorker")
            .field("config", &self.config)
            .field("dead_letters", &self.dead_letters.is_some())
            .finish_non_exhaustive()
    }
}
