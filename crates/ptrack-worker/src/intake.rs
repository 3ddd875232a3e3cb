use std::sync::Arc;

use tracing::{info, warn};

use ptrack_broker::EventPublisher;
use ptrack_store::{ProductStore, StatusUpdate};
use ptrack_types::{CreationEvent, ProductFields, ProductId, ProductRecord, ProductStatus};

use crate::error::IntakeError;

/// Write side of the intake API plus the read-side queries.
///
/// `submit` is write-then-publish: the `PENDING` row is durable before the
/// creation event exists, so the worker never sees an event without a row.
pub struct IntakeService {
    store: Arc<dyn ProductStore>,
    publisher: Arc<dyn EventPublisher>,
    topic: String,
}

impl IntakeService {
    pub fn new(
        store: Arc<dyn ProductStore>,
        publisher: Arc<dyn EventPublisher>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            store,
            publisher,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Record a new product as `PENDING` and queue its creation event.
    ///
    /// A publish failure leaves the row `PENDING` and is reported to the
    /// caller.
    pub async fn submit(&self, id: ProductId, fields: ProductFields) -> Result<ProductRecord, IntakeError> {
        let record = self.store.insert_pending(&id, &fields)?;
        self.publish(CreationEvent::new(id, fields)).await?;
        info!(product_id = %record.id, "product creation requested");
        Ok(record)
    }

    /// Queue a product for verification again.
    ///
    /// A `FAILED` row moves back to `PENDING` with its attempt counter reset.
    /// A `PENDING` row that was never submitted (its event was lost at
    /// intake) is republished unchanged. Anything else is refused.
    pub async fn retry(&self, id: &ProductId) -> Result<ProductRecord, IntakeError> {
        let current = self
            .store
            .get(id)?
            .ok_or_else(|| IntakeError::NotFound(id.clone()))?;
        let record = match current.status {
            ProductStatus::Failed => self.store.apply_outcome(id, &StatusUpdate::retry())?,
            ProductStatus::Pending if current.attempts == 0 => current,
            status => {
                return Err(IntakeError::NotRetryable {
                    id: id.clone(),
                    status,
                })
            }
        };
        self.publish(CreationEvent::new(id.clone(), record.fields.clone()))
            .await?;
        info!(product_id = %id, "product verification requeued");
        Ok(record)
    }

    pub fn get_by_id(&self, id: &ProductId) -> Result<Option<ProductRecord>, IntakeError> {
        Ok(self.store.get(id)?)
    }

    /// Every product, most recent first.
    pub fn list_all(&self) -> Result<Vec<ProductRecord>, IntakeError> {
        Ok(self.store.list_recent()?)
    }

    async fn publish(&self, event: CreationEvent) -> Result<(), IntakeError> {
        let payload = event.encode()?;
        match self.publisher.publish(&self.topic, event.key(), &payload).await {
            Ok(_) => Ok(()),
            Err(source) => {
                warn!(product_id = %event.id, error = %source, "failed to queue creation event; row stays PENDING");
                Err(IntakeError::Publish {
                    id: event.id,
                    source,
                })
            }
        }
    }
}

impl std::fmt::Debug for IntakeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntakeService")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}
