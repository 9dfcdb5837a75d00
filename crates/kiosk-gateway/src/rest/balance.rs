//! Account balance endpoints.

use crate::domain::types::{deserialize_amount, UserId};
use crate::domain::ApiResult;
use crate::service::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: UserId,
}

/// Body of `POST /update_user_balance`; `balance` is a signed delta
#[derive(Debug, Deserialize)]
pub struct BalanceDelta {
    pub rfid: String,
    #[serde(deserialize_with = "deserialize_amount")]
    pub balance: i64,
}

/// `GET /get_user_balance?id=`
pub async fn get_user_balance(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> ApiResult<Json<i64>> {
    state.kiosk.balance_of(query.id).await.map(Json)
}

/// `POST /update_user_balance`
pub async fn update_user_balance(
    State(state): State<AppState>,
    Json(body): Json<BalanceDelta>,
) -> ApiResult<&'static str> {
    let change = state
        .kiosk
        .adjust_balance(body.rfid.trim(), body.balance)
        .await?;
    debug!(
        rfid = %change.user.rfid,
        pushed = change.push.delivered,
        "Balance change pushed"
    );
    Ok("Account balance updated successfully")
}
