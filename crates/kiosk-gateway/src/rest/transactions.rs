//! Transaction history endpoints.

use crate::domain::types::{NewTransaction, TransactionRecord};
use crate::domain::ApiResult;
use crate::rest::users::RfidQuery;
use crate::service::AppState;
use axum::{
    extract::{Query, State},
    Json,
};

/// `GET /transactions?rfid=`
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<RfidQuery>,
) -> ApiResult<Json<Vec<TransactionRecord>>> {
    state.kiosk.transactions(query.rfid.trim()).await.map(Json)
}

/// `POST /add_transaction`
pub async fn add_transaction(
    State(state): State<AppState>,
    Json(transaction): Json<NewTransaction>,
) -> ApiResult<&'static str> {
    state.kiosk.add_transaction(transaction).await?;
    Ok("Transaction added successfully")
}
