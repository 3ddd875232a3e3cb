use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ptrack_ledger::{ContractCall, LedgerProduct, Proposal};
use ptrack_types::{ProductId, TxId};

use crate::client::{CommitReceipt, CreateRequest, LedgerClient};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult, PeerError, TransportFailure};
use crate::peer::LedgerPeer;

/// Timeout-bounded ledger client over a [`LedgerPeer`].
///
/// The connection is established on first use. A failed connect is not
/// cached, so the next call tries again.
pub struct Gateway<P> {
    peer: P,
    config: GatewayConfig,
    connected: OnceCell<()>,
}

impl<P: LedgerPeer> Gateway<P> {
    pub fn new(peer: P, config: GatewayConfig) -> Self {
        Self {
            peer,
            config,
            connected: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn peer(&self) -> &P {
        &self.peer
    }

    pub fn is_connected(&self) -> bool {
        self.connected.initialized()
    }

    async fn ensure_connected(&self) -> GatewayResult<()> {
        let limit = self.config.connect_timeout();
        self.connected
            .get_or_try_init(|| async {
                bounded(limit, self.peer.connect(), TransportFailure::ConnectTimeout).await?;
                info!(
                    channel = %self.config.channel,
                    contract = %self.config.contract,
                    "connected to ledger gateway"
                );
                Ok::<(), GatewayError>(())
            })
            .await?;
        Ok(())
    }

    fn next_tx_id(&self) -> TxId {
        let nonce = Uuid::now_v7();
        TxId::derive(&self.config.channel, &self.config.contract, nonce.as_bytes())
    }

    async fn evaluate(&self, call: ContractCall) -> GatewayResult<Vec<u8>> {
        self.ensure_connected().await?;
        bounded(
            self.config.evaluate_timeout(),
            self.peer.evaluate(call),
            TransportFailure::EvaluateTimeout,
        )
        .await
    }
}

#[async_trait]
impl<P: LedgerPeer> LedgerClient for Gateway<P> {
    async fn submit_create(&self, request: &CreateRequest) -> GatewayResult<CommitReceipt> {
        self.ensure_connected().await?;

        let tx_id = self.next_tx_id();
        let proposal = Proposal::new(
            tx_id,
            Utc::now(),
            ContractCall::CreateProduct {
                id: request.id.clone(),
                fields: request.fields.clone(),
            },
        );
        debug!(product_id = %request.id, tx_id = %tx_id.short_hex(), "submitting CreateProduct");

        let endorsement = bounded(
            self.config.endorse_timeout(),
            self.peer.endorse(proposal),
            TransportFailure::EndorseTimeout,
        )
        .await?;

        bounded(
            self.config.submit_timeout(),
            self.peer.submit(endorsement),
            TransportFailure::SubmitTimeout,
        )
        .await?;

        let status = bounded(
            self.config.commit_status_timeout(),
            self.peer.commit_status(tx_id),
            TransportFailure::CommitStatusTimeout,
        )
        .await?;

        if !status.validation.is_valid() {
            warn!(product_id = %request.id, tx_id = %tx_id.short_hex(), code = %status.validation, "transaction not committed");
            return Err(TransportFailure::CommitInvalid(status.validation).into());
        }

        Ok(CommitReceipt {
            tx_id,
            seq: status.seq,
            committed_at: status.timestamp,
        })
    }

    async fn read_product(&self, id: &ProductId) -> GatewayResult<LedgerProduct> {
        let bytes = self
            .evaluate(ContractCall::ReadProduct { id: id.clone() })
            .await?;
        decode(&bytes)
    }

    async fn list_products(&self) -> GatewayResult<Vec<LedgerProduct>> {
        let bytes = self.evaluate(ContractCall::GetAllProducts).await?;
        decode(&bytes)
    }
}

impl<P> std::fmt::Debug for Gateway<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("channel", &self.config.channel)
            .field("contract", &self.config.contract)
            .field("connected", &self.connected.initialized())
            .finish()
    }
}

/// Run one peer round-trip under `limit`, classifying the outcome.
async fn bounded<T, F>(
    limit: Duration,
    call: F,
    on_timeout: fn(Duration) -> TransportFailure,
) -> GatewayResult<T>
where
    F: Future<Output = Result<T, PeerError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(classify(err)),
        Err(_) => Err(on_timeout(limit).into()),
    }
}

fn classify(err: PeerError) -> GatewayError {
    match err {
        PeerError::ChaincodeRejected(message) => GatewayError::rejected(message),
        PeerError::Unavailable(msg) => TransportFailure::Unavailable(msg).into(),
        PeerError::EndorsementFailed(msg) => TransportFailure::EndorsementFailed(msg).into(),
        PeerError::OrderingFailed(msg) => TransportFailure::OrderingFailed(msg).into(),
        PeerError::UnknownTransaction(tx) => {
            TransportFailure::OrderingFailed(format!("transaction {tx} unknown to peer")).into()
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> GatewayResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| TransportFailure::MalformedResponse(e.to_string()).into())
}
