//! # Push Channel Flows
//!
//! Balance pushes from `POST /update_user_balance` to live kiosk displays.
//!
//! ## Flows Tested
//!
//! 1. **Registry fan-out**: every connection in a room gets the event, other
//!    rooms get nothing, a full queue only affects its own connection
//! 2. **Session lifecycle**: re-announcing moves a connection, closing removes it
//! 3. **Live sockets**: register over a real WebSocket, receive the push,
//!    disconnect or shut down and find the registry empty

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use kiosk_gateway::ws::{
        Announcement, ConnectionHandle, ConnectionPhase, ConnectionRegistry, PushSession,
        BALANCE_UPDATE_EVENT,
    };
    use kiosk_gateway::{BalanceUpdate, GatewayError, GatewayMetrics, GatewayService, Rfid};
    use serde_json::{json, Value};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    use crate::integration::support::{fixture, user};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    const WAIT: Duration = Duration::from_secs(5);

    // =============================================================================
    // REGISTRY FAN-OUT
    // =============================================================================

    #[test]
    fn test_fan_out_reaches_whole_room_only() {
        let registry = ConnectionRegistry::new();
        let (a, mut a_rx) = ConnectionHandle::channel(4);
        let (b, mut b_rx) = ConnectionHandle::channel(4);
        let (c, mut c_rx) = ConnectionHandle::channel(4);
        registry.register(&Rfid::from("RFID1"), a);
        registry.register(&Rfid::from("RFID1"), b);
        registry.register(&Rfid::from("RFID2"), c);

        let report = registry.broadcast_balance(&BalanceUpdate::new(Rfid::from("RFID1"), 7));
        assert_eq!(report.delivered, 2);
        assert_eq!(report.targeted(), 2);

        assert_eq!(a_rx.try_recv().unwrap().data["newBalance"], 7);
        assert_eq!(b_rx.try_recv().unwrap().data["newBalance"], 7);
        assert!(c_rx.try_recv().is_err());
    }

    #[test]
    fn test_slow_consumer_does_not_block_room() {
        let registry = ConnectionRegistry::new();
        let (slow, _slow_rx) = ConnectionHandle::channel(1);
        let (fast, mut fast_rx) = ConnectionHandle::channel(8);
        registry.register(&Rfid::from("RFID1"), slow);
        registry.register(&Rfid::from("RFID1"), fast);

        for balance in 1..=3 {
            registry.broadcast_balance(&BalanceUpdate::new(Rfid::from("RFID1"), balance));
        }

        let received: Vec<i64> = std::iter::from_fn(|| fast_rx.try_recv().ok())
            .map(|event| event.data["newBalance"].as_i64().unwrap())
            .collect();
        assert_eq!(received, vec![1, 2, 3]);

        let stats = registry.stats();
        assert_eq!(stats.events_delivered, 4);
        assert_eq!(stats.events_dropped, 2);
    }

    #[test]
    fn test_closed_connection_is_skipped() {
        let registry = ConnectionRegistry::new();
        let (gone, gone_rx) = ConnectionHandle::channel(4);
        let (live, mut live_rx) = ConnectionHandle::channel(4);
        registry.register(&Rfid::from("RFID1"), gone);
        registry.register(&Rfid::from("RFID1"), live);
        drop(gone_rx);

        let report = registry.broadcast("RFID1", BALANCE_UPDATE_EVENT, json!({"newBalance": 1}));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.closed, 1);
        assert!(live_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_join_and_leave_leaves_no_empty_rooms() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut tasks = Vec::new();

        for worker in 0..16 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                for round in 0..50 {
                    let rfid = Rfid::from(format!("RFID{}", (worker + round) % 4));
                    let (handle, _rx) = ConnectionHandle::channel(1);
                    let registration = registry.join(rfid.clone(), handle);
                    registry.broadcast(rfid.as_str(), "tick", Value::Null);
                    drop(registration);
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.identity_count(), 0);
        assert_eq!(registry.connection_count(), 0);
    }

    // =============================================================================
    // SESSION LIFECYCLE
    // =============================================================================

    #[test]
    fn test_reannounce_moves_between_rooms() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (handle, mut rx) = ConnectionHandle::channel(4);
        let mut session = PushSession::new(
            Arc::clone(&registry),
            Arc::new(GatewayMetrics::new()),
            handle,
        );

        assert_eq!(session.announce(Rfid::from("RFID1")), Announcement::Joined);
        assert_eq!(
            session.announce(Rfid::from("RFID2")),
            Announcement::Moved {
                previous: Rfid::from("RFID1")
            }
        );
        assert!(!registry.contains("RFID1"));
        assert_eq!(registry.members("RFID2"), vec![session.connection_id()]);

        registry.broadcast_balance(&BalanceUpdate::new(Rfid::from("RFID1"), 1));
        assert!(rx.try_recv().is_err());
        registry.broadcast_balance(&BalanceUpdate::new(Rfid::from("RFID2"), 2));
        assert_eq!(rx.try_recv().unwrap().data["rfid"], "RFID2");

        session.close();
        assert_eq!(session.phase(), ConnectionPhase::Closed);
        assert_eq!(session.announce(Rfid::from("RFID3")), Announcement::Rejected);
        assert_eq!(registry.connection_count(), 0);
    }

    // =============================================================================
    // LIVE SOCKETS
    // =============================================================================

    async fn start(
        gateway: &Arc<GatewayService>,
    ) -> (SocketAddr, JoinHandle<Result<(), GatewayError>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let gateway = Arc::clone(gateway);
        let server = tokio::spawn(async move { gateway.serve(Some(listener), None).await });
        (addr, server)
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (client, _) = timeout(WAIT, connect_async(format!("ws://{}/ws", addr)))
            .await
            .unwrap()
            .unwrap();
        client
    }

    /// Next text frame as JSON, skipping control frames
    async fn next_event(client: &mut Client) -> Option<Value> {
        loop {
            match timeout(WAIT, client.next()).await.ok()?? {
                Ok(Message::Text(text)) => return serde_json::from_str(text.as_str()).ok(),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                _ => return None,
            }
        }
    }

    async fn send(client: &mut Client, frame: Value) {
        client.send(Message::text(frame.to_string())).await.unwrap();
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        timeout(WAIT, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    async fn post_balance(addr: SocketAddr, rfid: &str, delta: i64) -> reqwest::StatusCode {
        reqwest::Client::new()
            .post(format!("http://{}/update_user_balance", addr))
            .json(&json!({"rfid": rfid, "balance": delta}))
            .send()
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_live_balance_push() {
        let fx = fixture(vec![user("RFID123", "a@example.com", 100)]);
        let (addr, _server) = start(&fx.gateway).await;

        let mut display = connect(addr).await;
        let mut second_display = connect(addr).await;
        for client in [&mut display, &mut second_display] {
            send(client, json!({"event": "register", "rfid": "RFID123"})).await;
            let reply = next_event(client).await.unwrap();
            assert_eq!(reply, json!({"event": "registered", "data": {"rfid": "RFID123"}}));
        }

        assert_eq!(post_balance(addr, "RFID123", 15).await, reqwest::StatusCode::OK);

        for client in [&mut display, &mut second_display] {
            let push = next_event(client).await.unwrap();
            assert_eq!(push["event"], BALANCE_UPDATE_EVENT);
            assert_eq!(push["data"], json!({"rfid": "RFID123", "newBalance": 115}));
        }

        fx.gateway.shutdown();
    }

    #[tokio::test]
    async fn test_invalid_frames_keep_connection_open() {
        let fx = fixture(vec![]);
        let (addr, _server) = start(&fx.gateway).await;
        let mut client = connect(addr).await;

        send(&mut client, json!({"event": "register", "rfid": "   "})).await;
        let reply = next_event(&mut client).await.unwrap();
        assert_eq!(reply["event"], "error");

        client.send(Message::text("not json")).await.unwrap();
        assert_eq!(next_event(&mut client).await.unwrap()["event"], "error");

        send(&mut client, json!({"event": "ping"})).await;
        assert_eq!(next_event(&mut client).await.unwrap()["event"], "pong");
        assert_eq!(fx.gateway.registry().connection_count(), 0);

        fx.gateway.shutdown();
    }

    #[tokio::test]
    async fn test_disconnect_removes_membership() {
        let fx = fixture(vec![user("RFID123", "a@example.com", 0)]);
        let (addr, _server) = start(&fx.gateway).await;
        let registry = fx.gateway.registry();

        let mut client = connect(addr).await;
        send(&mut client, json!({"event": "register", "rfid": "RFID123"})).await;
        next_event(&mut client).await.unwrap();
        assert!(registry.contains("RFID123"));

        client.close(None).await.unwrap();
        wait_until(|| !registry.contains("RFID123")).await;

        // Nobody left to push to; the update itself still succeeds
        assert_eq!(post_balance(addr, "RFID123", 1).await, reqwest::StatusCode::OK);

        fx.gateway.shutdown();
    }

    #[tokio::test]
    async fn test_unregister_then_register_again() {
        let fx = fixture(vec![user("RFID123", "a@example.com", 0)]);
        let (addr, _server) = start(&fx.gateway).await;
        let registry = fx.gateway.registry();
        let mut client = connect(addr).await;

        send(&mut client, json!({"event": "register", "rfid": "RFID123"})).await;
        next_event(&mut client).await.unwrap();
        send(&mut client, json!({"event": "unregister"})).await;
        assert_eq!(next_event(&mut client).await.unwrap()["event"], "unregistered");
        assert!(!registry.contains("RFID123"));

        send(&mut client, json!({"event": "register", "rfid": "RFID123"})).await;
        next_event(&mut client).await.unwrap();
        assert_eq!(registry.connection_count(), 1);

        fx.gateway.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_closes_sessions() {
        let fx = fixture(vec![user("RFID123", "a@example.com", 0)]);
        let (addr, server) = start(&fx.gateway).await;
        let registry = fx.gateway.registry();

        let mut client = connect(addr).await;
        send(&mut client, json!({"event": "register", "rfid": "RFID123"})).await;
        next_event(&mut client).await.unwrap();

        fx.gateway.shutdown();

        assert!(next_event(&mut client).await.is_none());
        wait_until(|| registry.connection_count() == 0).await;
        assert!(timeout(WAIT, server).await.unwrap().unwrap().is_ok());
    }
}
