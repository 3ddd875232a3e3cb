use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use ptrack_gateway::LedgerClient;
use ptrack_types::{ProductFields, ProductId, ProductRecord, TypeError};
use ptrack_worker::IntakeService;

use crate::error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<IntakeService>,
    /// Present only when this process shares a ledger with the worker.
    pub ledger: Option<Arc<dyn LedgerClient>>,
}

impl AppState {
    pub fn new(intake: Arc<IntakeService>) -> Self {
        Self { intake, ledger: None }
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn LedgerClient>) -> Self {
        self.ledger = Some(ledger);
        self
    }
}

/// Body of `POST /products`. Any `status` the caller sends is ignored.
#[derive(Debug, Deserialize)]
pub struct CreateProduct {
    pub id: String,
    #[serde(flatten)]
    pub fields: ProductFields,
}

impl CreateProduct {
    fn validate(self) -> Result<(ProductId, ProductFields), TypeError> {
        let id = ProductId::new(self.id)?;
        let f = &self.fields;
        for (value, field) in [
            (&f.name, "name"),
            (&f.producer_id, "producerId"),
            (&f.manufacture_date, "manufactureDate"),
            (&f.integrity_hash, "integrityHash"),
        ] {
            if value.trim().is_empty() {
                return Err(TypeError::MissingField(field));
            }
        }
        Ok((id, self.fields))
    }
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn create_product(
    State(state): State<AppState>,
    body: Result<Json<CreateProduct>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let (id, fields) = body.validate()?;

    let record = state.intake.submit(id, fields).await?;
    info!(product_id = %record.id, "product creation requested");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Product creation requested",
            "product": record,
        })),
    ))
}

pub async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<ProductRecord>>, ApiError> {
    Ok(Json(state.intake.list_all()?))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProductRecord>, ApiError> {
    let not_found = || ApiError::NotFound("Product not found".into());
    let id = ProductId::new(id).map_err(|_| not_found())?;
    state.intake.get_by_id(&id)?.map(Json).ok_or_else(not_found)
}

pub async fn retry_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let id = ProductId::new(id).map_err(|_| ApiError::NotFound("Product not found".into()))?;
    let record = state.intake.retry(&id).await?;
    info!(product_id = %record.id, "product verification requeued");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Product verification requeued",
            "product": record,
        })),
    ))
}

/// The ledger's own view of a product, independent of the relational row.
pub async fn ledger_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let ledger = state.ledger.as_ref().ok_or(ApiError::LedgerUnavailable)?;
    let id = ProductId::new(id).map_err(|_| ApiError::NotFound("Product not found on ledger".into()))?;
    let product = ledger.read_product(&id).await?;
    serde_json::to_value(product)
        .map(Json)
        .map_err(|e| ApiError::Internal(e.to_string()))
}
