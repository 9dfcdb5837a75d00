//! User endpoints.

use crate::domain::types::{deserialize_amount, NewUser, UserId, UserProfile};
use crate::domain::ApiResult;
use crate::service::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct RfidQuery {
    pub rfid: String,
}

#[derive(Debug, Deserialize)]
pub struct EditDetails {
    pub rfid: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct EditPassword {
    #[serde(deserialize_with = "deserialize_amount")]
    pub id: UserId,
    pub password: String,
}

/// `GET /`
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<UserProfile>>> {
    state.kiosk.list_users().await.map(Json)
}

/// `POST /add_user`
pub async fn add_user(
    State(state): State<AppState>,
    Json(user): Json<NewUser>,
) -> ApiResult<&'static str> {
    state.kiosk.add_user(user).await?;
    Ok("User added successfully")
}

/// `GET /get_user?email=`
pub async fn get_user(
    State(state): State<AppState>,
    Query(query): Query<EmailQuery>,
) -> ApiResult<Json<UserProfile>> {
    state.kiosk.user_by_email(&query.email).await.map(Json)
}

/// `GET /get_user_by_rfid?rfid=`
pub async fn get_user_by_rfid(
    State(state): State<AppState>,
    Query(query): Query<RfidQuery>,
) -> ApiResult<Json<UserProfile>> {
    state.kiosk.user_by_rfid(query.rfid.trim()).await.map(Json)
}

/// `PUT /edit_user_details`
pub async fn edit_user_details(
    State(state): State<AppState>,
    Json(body): Json<EditDetails>,
) -> ApiResult<&'static str> {
    state
        .kiosk
        .edit_details(body.rfid.trim(), &body.name, body.email.trim())
        .await?;
    Ok("User updated successfully")
}

/// `PUT /edit_user_password`
pub async fn edit_user_password(
    State(state): State<AppState>,
    Json(body): Json<EditPassword>,
) -> ApiResult<&'static str> {
    state.kiosk.edit_password(body.id, &body.password).await?;
    Ok("User password updated successfully")
}
