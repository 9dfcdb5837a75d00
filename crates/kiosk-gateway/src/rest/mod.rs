//! REST endpoints consumed by the kiosk frontend.
//!
//! Paths and success messages are the ones the frontend already calls.

pub mod balance;
pub mod rewards;
pub mod transactions;
pub mod users;

use crate::service::AppState;
use crate::ws::WebSocketHandler;
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    routing::{get, post, put},
    Router,
};

/// All REST routes plus the push channel upgrade at `ws_path`
pub fn routes(ws_path: &str) -> Router<AppState> {
    Router::new()
        .route("/", get(users::list_users))
        .route("/add_user", post(users::add_user))
        .route("/get_user", get(users::get_user))
        .route("/get_user_by_rfid", get(users::get_user_by_rfid))
        .route("/edit_user_details", put(users::edit_user_details))
        .route("/edit_user_password", put(users::edit_user_password))
        .route("/get_user_balance", get(balance::get_user_balance))
        .route("/update_user_balance", post(balance::update_user_balance))
        .route("/transactions", get(transactions::list_transactions))
        .route("/add_transaction", post(transactions::add_transaction))
        .route("/bottle", post(rewards::classify_bottle))
        .route("/voucher", post(rewards::send_voucher))
        .route(ws_path, get(push_upgrade))
}

/// `GET /ws`: upgrade to the balance push channel
async fn push_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let config = state.ws_config.clone();
    ws.on_upgrade(move |socket| async move {
        let handler = WebSocketHandler::new(
            state.kiosk.registry().clone(),
            state.metrics.clone(),
            config,
        );
        handler.handle(socket, state.shutdown.clone()).await;
    })
}
