use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use ptrack_types::{ProductFields, ProductId, TxId};

use crate::error::ContractError;
use crate::state::WorldState;

/// On-ledger lifecycle state. The ledger only ever records created products.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerStatus {
    Created,
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
        }
    }
}

/// A product as held in the ledger world state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerProduct {
    pub id: ProductId,
    pub name: String,
    pub producer_id: String,
    pub manufacture_date: String,
    pub cert_hash: String,
    pub status: LedgerStatus,
    /// Transaction timestamp of the creating transaction, RFC 3339 UTC.
    pub created_time: String,
    /// The transaction that created this entry.
    pub tx_id: TxId,
}

impl LedgerProduct {
    /// The descriptive fields, in the shape the rest of the pipeline uses.
    pub fn fields(&self) -> ProductFields {
        ProductFields::new(
            self.name.clone(),
            self.producer_id.clone(),
            self.manufacture_date.clone(),
            self.cert_hash.clone(),
        )
    }

    /// Returns `true` if this entry records exactly `fields`.
    pub fn matches(&self, fields: &ProductFields) -> bool {
        self.name == fields.name
            && self.producer_id == fields.producer_id
            && self.manufacture_date == fields.manufacture_date
            && self.cert_hash == fields.integrity_hash
    }
}

/// Per-transaction context handed to the contract by the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxContext {
    pub tx_id: TxId,
    /// Timestamp assigned by the submitting client and carried in the proposal.
    pub timestamp: DateTime<Utc>,
}

/// A contract invocation decoded from its positional wire form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContractCall {
    CreateProduct { id: ProductId, fields: ProductFields },
    ReadProduct { id: ProductId },
    ProductExists { id: ProductId },
    GetAllProducts,
}

impl ContractCall {
    /// Decode `function(args...)` as sent by a ledger client.
    pub fn parse(function: &str, args: &[String]) -> Result<Self, ContractError> {
        let arity = |expected: usize| {
            if args.len() == expected {
                Ok(())
            } else {
                Err(ContractError::InvalidArgument(format!(
                    "{function} expects {expected} arguments, got {}",
                    args.len()
                )))
            }
        };
        let product_id = |raw: &str| {
            ProductId::new(raw).map_err(|e| ContractError::InvalidArgument(e.to_string()))
        };

        match function {
            "CreateProduct" => {
                arity(5)?;
                Ok(Self::CreateProduct {
                    id: product_id(&args[0])?,
                    fields: ProductFields::new(
                        args[1].clone(),
                        args[2].clone(),
                        args[3].clone(),
                        args[4].clone(),
                    ),
                })
            }
            "ReadProduct" => {
                arity(1)?;
                Ok(Self::ReadProduct {
                    id: product_id(&args[0])?,
                })
            }
            "ProductExists" => {
                arity(1)?;
                Ok(Self::ProductExists {
                    id: product_id(&args[0])?,
                })
            }
            "GetAllProducts" => {
                arity(0)?;
                Ok(Self::GetAllProducts)
            }
            other => Err(ContractError::InvalidArgument(format!(
                "unknown function {other}"
            ))),
        }
    }

    pub fn function(&self) -> &'static str {
        match self {
            Self::CreateProduct { .. } => "CreateProduct",
            Self::ReadProduct { .. } => "ReadProduct",
            Self::ProductExists { .. } => "ProductExists",
            Self::GetAllProducts => "GetAllProducts",
        }
    }

    /// Positional arguments, in the order `parse` expects them.
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::CreateProduct { id, fields } => vec![
                id.to_string(),
                fields.name.clone(),
                fields.producer_id.clone(),
                fields.manufacture_date.clone(),
                fields.integrity_hash.clone(),
            ],
            Self::ReadProduct { id } | Self::ProductExists { id } => vec![id.to_string()],
            Self::GetAllProducts => Vec::new(),
        }
    }

    pub fn is_read_only(&self) -> bool {
        !matches!(self, Self::CreateProduct { .. })
    }
}

/// The product contract: the ledger-side state machine for product records.
///
/// The contract is stateless; every call receives the world state it runs
/// against, so the same code serves direct calls, endorsement simulation and
/// read-only evaluation.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProductContract;

impl ProductContract {
    /// Existence probe. No side effect.
    pub fn exists(&self, state: &dyn WorldState, id: &ProductId) -> Result<bool, ContractError> {
        Ok(state.get_state(id.as_str())?.is_some())
    }

    /// Create a product entry with status `CREATED`.
    ///
    /// Uniqueness is decided by one conditional put; a duplicate id is a
    /// business rejection and leaves the world state untouched.
    pub fn create(
        &self,
        state: &dyn WorldState,
        ctx: &TxContext,
        id: &ProductId,
        fields: &ProductFields,
    ) -> Result<LedgerProduct, ContractError> {
        let product = LedgerProduct {
            id: id.clone(),
            name: fields.name.clone(),
            producer_id: fields.producer_id.clone(),
            manufacture_date: fields.manufacture_date.clone(),
            cert_hash: fields.integrity_hash.clone(),
            status: LedgerStatus::Created,
            created_time: ctx.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            tx_id: ctx.tx_id,
        };
        let encoded = to_json(&product)?;

        if !state.put_if_absent(id.as_str(), encoded)? {
            return Err(ContractError::AlreadyExists(id.clone()));
        }

        debug!(product_id = %id, tx_id = %ctx.tx_id.short_hex(), "product created");
        Ok(product)
    }

    pub fn read(&self, state: &dyn WorldState, id: &ProductId) -> Result<LedgerProduct, ContractError> {
        let bytes = state
            .get_state(id.as_str())?
            .ok_or_else(|| ContractError::NotFound(id.clone()))?;
        serde_json::from_slice(&bytes).map_err(|e| ContractError::Serialization(e.to_string()))
    }

    /// Full range scan, in ledger storage order.
    pub fn list_all(&self, state: &dyn WorldState) -> Result<Vec<LedgerProduct>, ContractError> {
        state
            .range("", "")?
            .into_iter()
            .map(|(_, bytes)| {
                serde_json::from_slice(&bytes)
                    .map_err(|e| ContractError::Serialization(e.to_string()))
            })
            .collect()
    }

    /// Dispatch a decoded call and return its JSON result.
    pub fn invoke(
        &self,
        state: &dyn WorldState,
        ctx: &TxContext,
        call: &ContractCall,
    ) -> Result<Vec<u8>, ContractError> {
        match call {
            ContractCall::CreateProduct { id, fields } => {
                to_json(&self.create(state, ctx, id, fields)?)
            }
            ContractCall::ReadProduct { id } => to_json(&self.read(state, id)?),
            ContractCall::ProductExists { id } => to_json(&self.exists(state, id)?),
            ContractCall::GetAllProducts => to_json(&self.list_all(state)?),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, ContractError> {
    serde_json::to_vec(value).map_err(|e| ContractError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemoryWorldState;

    fn ctx(nonce: &[u8]) -> TxContext {
        TxContext {
            tx_id: TxId::derive("mychannel", "product_cc", nonce),
            timestamp: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    fn pid(s: &str) -> ProductId {
        ProductId::new(s).unwrap()
    }

    fn fields(hash: &str) -> ProductFields {
        ProductFields::new("Coffee", "F1", "2024-01-01", hash)
    }

    #[test]
    fn create_then_read() {
        let state = InMemoryWorldState::new();
        let contract = ProductContract;
        assert!(!contract.exists(&state, &pid("P1")).unwrap());

        let created = contract
            .create(&state, &ctx(b"1"), &pid("P1"), &fields("h1"))
            .unwrap();
        assert_eq!(created.status, LedgerStatus::Created);
        assert_eq!(created.created_time, "2024-05-01T10:00:00Z");

        assert!(contract.exists(&state, &pid("P1")).unwrap());
        assert_eq!(contract.read(&state, &pid("P1")).unwrap(), created);
    }

    #[test]
    fn duplicate_create_is_rejected_and_state_unchanged() {
        let state = InMemoryWorldState::new();
        let contract = ProductContract;
        let first = contract
            .create(&state, &ctx(b"1"), &pid("P1"), &fields("h1"))
            .unwrap();

        let err = contract
            .create(&state, &ctx(b"2"), &pid("P1"), &fields("h2"))
            .unwrap_err();
        assert_eq!(err, ContractError::AlreadyExists(pid("P1")));
        assert!(err.is_business_rejection());
        assert_eq!(err.to_string(), "the product P1 already exists");

        assert_eq!(contract.read(&state, &pid("P1")).unwrap(), first);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn read_missing_is_not_found() {
        let state = InMemoryWorldState::new();
        let err = ProductContract.read(&state, &pid("nope")).unwrap_err();
        assert!(matches!(err, ContractError::NotFound(_)));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn list_all_returns_every_entry() {
        let state = InMemoryWorldState::new();
        let contract = ProductContract;
        for (i, id) in ["B", "A", "C"].iter().enumerate() {
            contract
                .create(&state, &ctx(&[i as u8]), &pid(id), &fields(id))
                .unwrap();
        }
        let ids: Vec<String> = contract
            .list_all(&state)
            .unwrap()
            .into_iter()
            .map(|p| p.id.to_string())
            .collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn matches_compares_all_fields() {
        let state = InMemoryWorldState::new();
        let product = ProductContract
            .create(&state, &ctx(b"1"), &pid("P1"), &fields("h1"))
            .unwrap();
        assert!(product.matches(&fields("h1")));
        assert!(!product.matches(&fields("h2")));
        assert_eq!(product.fields(), fields("h1"));
    }

    #[test]
    fn parse_positional_create() {
        let args: Vec<String> = ["P1", "Coffee", "F1", "2024-01-01", "h1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let call = ContractCall::parse("CreateProduct", &args).unwrap();
        assert_eq!(call.function(), "CreateProduct");
        assert_eq!(call.args(), args);
        assert!(!call.is_read_only());
    }

    #[test]
    fn parse_rejects_bad_arity_and_unknown_function() {
        assert!(matches!(
            ContractCall::parse("CreateProduct", &["P1".to_string()]),
            Err(ContractError::InvalidArgument(_))
        ));
        assert!(matches!(
            ContractCall::parse("DeleteProduct", &[]),
            Err(ContractError::InvalidArgument(_))
        ));
        assert!(matches!(
            ContractCall::parse("ReadProduct", &[" ".to_string()]),
            Err(ContractError::InvalidArgument(_))
        ));
    }

    #[test]
    fn invoke_encodes_results_as_json() {
        let state = InMemoryWorldState::new();
        let contract = ProductContract;
        let call = ContractCall::CreateProduct {
            id: pid("P1"),
            fields: fields("h1"),
        };
        contract.invoke(&state, &ctx(b"1"), &call).unwrap();

        let exists = contract
            .invoke(&state, &ctx(b"2"), &ContractCall::ProductExists { id: pid("P1") })
            .unwrap();
        assert_eq!(exists, b"true");

        let all = contract
            .invoke(&state, &ctx(b"3"), &ContractCall::GetAllProducts)
            .unwrap();
        let parsed: Vec<LedgerProduct> = serde_json::from_slice(&all).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].cert_hash, "h1");
    }
}
