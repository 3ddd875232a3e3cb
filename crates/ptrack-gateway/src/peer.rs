use std::sync::Arc;

use async_trait::async_trait;

use ptrack_ledger::{
    CommitStatus, ContractCall, Endorsement, LedgerError, LedgerNetwork, Proposal,
};
use ptrack_types::TxId;

use crate::error::PeerError;

/// Transport boundary to a ledger network.
///
/// Each method is one network round-trip; the [`Gateway`](crate::Gateway)
/// puts a separate timeout around each.
#[async_trait]
pub trait LedgerPeer: Send + Sync {
    async fn connect(&self) -> Result<(), PeerError>;
    async fn endorse(&self, proposal: Proposal) -> Result<Endorsement, PeerError>;
    async fn submit(&self, endorsement: Endorsement) -> Result<(), PeerError>;
    /// Wait until the transaction is final and report its validation result.
    async fn commit_status(&self, tx_id: TxId) -> Result<CommitStatus, PeerError>;
    async fn evaluate(&self, call: ContractCall) -> Result<Vec<u8>, PeerError>;
}

/// Peer backed by an in-process [`LedgerNetwork`].
///
/// Ordering and commit happen synchronously inside `submit`, so
/// `commit_status` answers immediately.
#[derive(Clone, Debug)]
pub struct InProcessPeer {
    network: Arc<LedgerNetwork>,
}

impl InProcessPeer {
    pub fn new(network: Arc<LedgerNetwork>) -> Self {
        Self { network }
    }

    pub fn network(&self) -> &Arc<LedgerNetwork> {
        &self.network
    }
}

#[async_trait]
impl LedgerPeer for InProcessPeer {
    async fn connect(&self) -> Result<(), PeerError> {
        Ok(())
    }

    async fn endorse(&self, proposal: Proposal) -> Result<Endorsement, PeerError> {
        self.network.endorse(proposal).map_err(map_ledger_error)
    }

    async fn submit(&self, endorsement: Endorsement) -> Result<(), PeerError> {
        self.network
            .submit(endorsement)
            .map(|_| ())
            .map_err(map_ledger_error)
    }

    async fn commit_status(&self, tx_id: TxId) -> Result<CommitStatus, PeerError> {
        self.network.commit_status(&tx_id).map_err(map_ledger_error)
    }

    async fn evaluate(&self, call: ContractCall) -> Result<Vec<u8>, PeerError> {
        self.network.evaluate(&call).map_err(map_ledger_error)
    }
}

fn map_ledger_error(err: LedgerError) -> PeerError {
    match err {
        LedgerError::Contract(e) if e.is_business_rejection() => {
            PeerError::ChaincodeRejected(e.to_string())
        }
        LedgerError::DuplicateTransaction(tx) => {
            PeerError::OrderingFailed(format!("transaction {tx} already ordered"))
        }
        LedgerError::UnknownTransaction(tx) => PeerError::UnknownTransaction(tx),
        other => PeerError::EndorsementFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ptrack_types::{ProductFields, ProductId};

    fn proposal(id: &str, nonce: &[u8]) -> Proposal {
        Proposal::new(
            TxId::derive("mychannel", "product_cc", nonce),
            Utc::now(),
            ContractCall::CreateProduct {
                id: ProductId::new(id).unwrap(),
                fields: ProductFields::new("n", "p", "d", "h"),
            },
        )
    }

    #[tokio::test]
    async fn in_process_round_trip() {
        let peer = InProcessPeer::new(Arc::new(LedgerNetwork::default()));
        peer.connect().await.unwrap();
        let p = proposal("P1", b"1");
        let tx_id = p.tx_id;
        let endorsement = peer.endorse(p).await.unwrap();
        peer.submit(endorsement).await.unwrap();
        let status = peer.commit_status(tx_id).await.unwrap();
        assert!(status.validation.is_valid());
    }

    #[tokio::test]
    async fn duplicate_maps_to_chaincode_rejection() {
        let peer = InProcessPeer::new(Arc::new(LedgerNetwork::default()));
        let e = peer.endorse(proposal("P1", b"1")).await.unwrap();
        peer.submit(e).await.unwrap();

        let err = peer.endorse(proposal("P1", b"2")).await.unwrap_err();
        assert_eq!(
            err,
            PeerError::ChaincodeRejected("the product P1 already exists".into())
        );
    }

    #[tokio::test]
    async fn unknown_status_is_reported() {
        let peer = InProcessPeer::new(Arc::new(LedgerNetwork::default()));
        let err = peer
            .commit_status(TxId::derive("c", "k", b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, PeerError::UnknownTransaction(_)));
    }
}
