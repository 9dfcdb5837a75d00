//! Bottle classification and voucher delivery.

use crate::domain::types::EncodedImage;
use crate::domain::ApiResult;
use crate::service::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct BottleRequest {
    pub bottle: EncodedImage,
}

#[derive(Debug, Serialize)]
pub struct BottleVerdict {
    pub result: bool,
}

#[derive(Debug, Deserialize)]
pub struct VoucherRequest {
    pub email: String,
    pub voucher_code: String,
}

/// `POST /bottle`
pub async fn classify_bottle(
    State(state): State<AppState>,
    Json(body): Json<BottleRequest>,
) -> ApiResult<Json<BottleVerdict>> {
    let result = state.kiosk.classify_bottle(&body.bottle).await?;
    Ok(Json(BottleVerdict { result }))
}

/// `POST /voucher`
pub async fn send_voucher(
    State(state): State<AppState>,
    Json(body): Json<VoucherRequest>,
) -> ApiResult<&'static str> {
    state
        .kiosk
        .send_voucher(&body.email, &body.voucher_code)
        .await?;
    Ok("Email sent successfully")
}
