//! # REST Flows
//!
//! Drives the assembled HTTP router (CORS, tracing, metrics and timeout
//! layers included) with in-process requests:
//!
//! 1. User lifecycle: add, look up by email and RFID, edit, duplicate rejection
//! 2. Balance: read, adjust, push to followers, no push on failed persist
//! 3. Transaction history and rewards (classification, vouchers)

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{Method, StatusCode};
    use kiosk_gateway::adapters::InMemoryUserStore;
    use kiosk_gateway::ws::{ConnectionHandle, BALANCE_UPDATE_EVENT};
    use kiosk_gateway::Rfid;
    use serde_json::json;
    use tower::ServiceExt;

    use crate::integration::support::{
        fixture, fixture_with_store, get, json as json_request, read_json, read_text, user,
        BalanceWriteFails,
    };

    // =============================================================================
    // USERS
    // =============================================================================

    #[tokio::test]
    async fn test_user_lifecycle() {
        let fx = fixture(vec![]);
        let app = fx.gateway.http_router();

        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/add_user",
                json!({
                    "rfid": "RFID123",
                    "name": "Ana",
                    "email": "ana@example.com",
                    "password": "pw",
                    "balance": "10",
                    "permission": "user"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(
            read_text(response).await,
            (StatusCode::OK, "User added successfully".to_string())
        );

        let (status, body) = read_json(
            app.clone()
                .oneshot(get("/get_user?email=ana@example.com"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rfid"], "RFID123");
        assert_eq!(body["balance"], 10);
        assert!(body.get("password").is_none());

        let response = app
            .clone()
            .oneshot(json_request(
                Method::PUT,
                "/edit_user_details",
                json!({"rfid": "RFID123", "name": "Ana B", "email": "anab@example.com"}),
            ))
            .await
            .unwrap();
        assert_eq!(
            read_text(response).await,
            (StatusCode::OK, "User updated successfully".to_string())
        );

        let (_, body) = read_json(
            app.clone()
                .oneshot(get("/get_user_by_rfid?rfid=RFID123"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(body["name"], "Ana B");
        assert_eq!(body["email"], "anab@example.com");

        let (status, users) = read_json(app.oneshot(get("/")).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(users.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_duplicate_rfid_conflicts() {
        let fx = fixture(vec![user("RFID123", "a@example.com", 0)]);
        let response = fx
            .gateway
            .http_router()
            .oneshot(json_request(
                Method::POST,
                "/add_user",
                json!({
                    "rfid": "RFID123",
                    "name": "Other",
                    "email": "other@example.com",
                    "password": "pw"
                }),
            ))
            .await
            .unwrap();
        let (status, body) = read_json(response).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("RFID123"));
    }

    #[tokio::test]
    async fn test_unknown_lookups_are_not_found() {
        let app = fixture(vec![]).gateway.http_router();

        let (status, body) = read_json(
            app.clone()
                .oneshot(get("/get_user?email=nobody@example.com"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "User not found"}));

        let (status, body) = read_json(
            app.clone()
                .oneshot(get("/get_user_by_rfid?rfid=NOPE"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "RFID mapping not found"}));

        let response = app
            .oneshot(json_request(
                Method::PUT,
                "/edit_user_password",
                json!({"id": 42, "password": "new"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_edit_password_by_string_id() {
        let fx = fixture(vec![user("RFID123", "a@example.com", 0)]);
        let response = fx
            .gateway
            .http_router()
            .oneshot(json_request(
                Method::PUT,
                "/edit_user_password",
                json!({"id": "1", "password": "rotated"}),
            ))
            .await
            .unwrap();
        assert_eq!(
            read_text(response).await,
            (
                StatusCode::OK,
                "User password updated successfully".to_string()
            )
        );
    }

    // =============================================================================
    // BALANCE
    // =============================================================================

    #[tokio::test]
    async fn test_balance_update_pushes_to_followers() {
        let fx = fixture(vec![user("RFID123", "a@example.com", 100)]);
        let registry = fx.gateway.registry();
        let (first, mut first_rx) = ConnectionHandle::channel(4);
        let (second, mut second_rx) = ConnectionHandle::channel(4);
        let (other, mut other_rx) = ConnectionHandle::channel(4);
        registry.register(&Rfid::from("RFID123"), first);
        registry.register(&Rfid::from("RFID123"), second);
        registry.register(&Rfid::from("RFID999"), other);

        let app = fx.gateway.http_router();
        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/update_user_balance",
                json!({"rfid": "RFID123", "balance": "25"}),
            ))
            .await
            .unwrap();
        assert_eq!(
            read_text(response).await,
            (
                StatusCode::OK,
                "Account balance updated successfully".to_string()
            )
        );

        for rx in [&mut first_rx, &mut second_rx] {
            let event = rx.try_recv().unwrap();
            assert_eq!(event.event, BALANCE_UPDATE_EVENT);
            assert_eq!(event.data, json!({"rfid": "RFID123", "newBalance": 125}));
        }
        assert!(other_rx.try_recv().is_err());

        let (status, balance) = read_json(
            app.oneshot(get("/get_user_balance?id=1")).await.unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(balance, json!(125));
    }

    #[tokio::test]
    async fn test_negative_delta_and_unfollowed_rfid() {
        let fx = fixture(vec![user("RFID123", "a@example.com", 100)]);
        let response = fx
            .gateway
            .http_router()
            .oneshot(json_request(
                Method::POST,
                "/update_user_balance",
                json!({"rfid": "RFID123", "balance": -40}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let kiosk = fx.gateway.kiosk();
        assert_eq!(kiosk.user_by_rfid("RFID123").await.unwrap().balance, 60);
        assert_eq!(fx.gateway.registry().stats().events_delivered, 0);
    }

    #[tokio::test]
    async fn test_failed_persist_pushes_nothing() {
        let store = InMemoryUserStore::with_users(vec![user("RFID123", "a@example.com", 100)])
            .unwrap();
        let fx = fixture_with_store(Arc::new(BalanceWriteFails(store)), Some(true));
        let (handle, mut rx) = ConnectionHandle::channel(4);
        fx.gateway
            .registry()
            .register(&Rfid::from("RFID123"), handle);

        let response = fx
            .gateway
            .http_router()
            .oneshot(json_request(
                Method::POST,
                "/update_user_balance",
                json!({"rfid": "RFID123", "balance": 5}),
            ))
            .await
            .unwrap();
        let (status, body) = read_json(response).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].is_string());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_balance_of_unknown_id() {
        let app = fixture(vec![]).gateway.http_router();
        let (status, body) =
            read_json(app.oneshot(get("/get_user_balance?id=7")).await.unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Account balance not found"}));
    }

    #[tokio::test]
    async fn test_malformed_delta_rejected() {
        let app = fixture(vec![user("RFID123", "a@example.com", 100)])
            .gateway
            .http_router();
        let response = app
            .oneshot(json_request(
                Method::POST,
                "/update_user_balance",
                json!({"rfid": "RFID123", "balance": "lots"}),
            ))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    // =============================================================================
    // TRANSACTIONS AND REWARDS
    // =============================================================================

    #[tokio::test]
    async fn test_transaction_history() {
        let fx = fixture(vec![user("RFID123", "a@example.com", 0)]);
        let app = fx.gateway.http_router();

        let (status, body) = read_json(
            app.clone()
                .oneshot(get("/transactions?rfid=RFID123"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Transactions not found"}));

        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/add_transaction",
                json!({
                    "rfid": "RFID123",
                    "transaction_type": "deposit",
                    "bottle_count": 3,
                    "balance_modified": "3"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(
            read_text(response).await,
            (StatusCode::OK, "Transaction added successfully".to_string())
        );

        let (status, rows) = read_json(
            app.oneshot(get("/transactions?rfid=RFID123"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rows[0]["bottle_count"], 3);
        assert_eq!(rows[0]["balance_modified"], 3);
        assert_eq!(rows[0]["transaction_type"], "deposit");
    }

    #[tokio::test]
    async fn test_bottle_classification() {
        let app = fixture(vec![]).gateway.http_router();
        let (status, body) = read_json(
            app.oneshot(json_request(
                Method::POST,
                "/bottle",
                json!({"bottle": "aGVsbG8="}),
            ))
            .await
            .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"result": true}));
    }

    #[tokio::test]
    async fn test_unclear_classification_is_upstream_error() {
        let fx = fixture_with_store(Arc::new(InMemoryUserStore::new()), None);
        let response = fx
            .gateway
            .http_router()
            .oneshot(json_request(
                Method::POST,
                "/bottle",
                json!({"bottle": "aGVsbG8="}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_voucher_delivery() {
        let fx = fixture(vec![]);
        let response = fx
            .gateway
            .http_router()
            .oneshot(json_request(
                Method::POST,
                "/voucher",
                json!({"email": "ana@example.com", "voucher_code": "ABC-123"}),
            ))
            .await
            .unwrap();
        assert_eq!(
            read_text(response).await,
            (StatusCode::OK, "Email sent successfully".to_string())
        );
        assert_eq!(
            fx.notifier.sent.lock().as_slice(),
            &[("ana@example.com".to_string(), "ABC-123".to_string())]
        );
    }

    #[tokio::test]
    async fn test_requests_are_counted() {
        let fx = fixture(vec![]);
        let app = fx.gateway.http_router();
        let _ = app.oneshot(get("/")).await.unwrap();

        let (_, metrics) = read_json(
            fx.gateway
                .admin_router()
                .oneshot(get("/metrics"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(metrics["requests"]["total"], 1);
    }
}
