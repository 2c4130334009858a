//! Subscriber against a real relayer.

use std::time::Duration;

use futures_util::StreamExt;
use relayer::config::{Config, DeliveryMode};
use relayer::relay::RelayState;
use relayer::RelayServer;
use serde_json::json;
use shared::{Event, EventBody};
use subscriber::relay_client::BackoffConfig;
use subscriber::{subscribe, ClientConfig, ClientError, Publisher};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        initial: Duration::from_millis(20),
        max: Duration::from_millis(100),
        multiplier: 2.0,
        max_retries: None,
    }
}

fn client_config(server: &RelayServer) -> ClientConfig {
    let mut config = ClientConfig::for_addr(server.local_addr());
    config.backoff = fast_backoff();
    config
}

async fn wait_for_sessions(relay: &RelayState, user_id: &str, n: usize) {
    tokio::time::timeout(Duration::from_secs(3), async {
        while relay.sessions_for(user_id) != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{} never reached {} sessions", user_id, n));
}

fn transaction(user_id: &str, amount: u64) -> Event {
    Event::new(
        user_id,
        EventBody::Transaction {
            transaction: json!({"amount": amount}),
        },
    )
}

#[tokio::test]
async fn callback_receives_exactly_the_broadcast_event() {
    let server = RelayServer::start(Config::for_test(DeliveryMode::All, None))
        .await
        .unwrap();
    let relay = server.relay();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let sub = subscribe(&client_config(&server), "abc123", move |event| {
        let _ = tx.send(event);
    });
    assert_eq!(sub.wait_for_connection().await.unwrap(), 1);
    wait_for_sessions(&relay, "abc123", 1).await;

    let sent = transaction("abc123", 5);
    relay.broadcast(&sent);

    let got = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got, sent);
    assert!(tokio::time::timeout(Duration::from_millis(200), rx.recv())
        .await
        .is_err());

    sub.close().await;
    wait_for_sessions(&relay, "abc123", 0).await;
    server.stop().await.unwrap();
}

#[tokio::test]
async fn published_events_reach_the_subscriber() {
    let server = RelayServer::start(Config::for_test(DeliveryMode::All, Some("pub-key")))
        .await
        .unwrap();
    let relay = server.relay();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut config = client_config(&server);
    let sub = subscribe(&config, "merchant-1", move |event| {
        let _ = tx.send(event);
    });
    wait_for_sessions(&relay, "merchant-1", 1).await;

    let event = Event::new(
        "merchant-1",
        EventBody::PayLink {
            pay_link: json!({"id": "pl_1", "amount": "0.05", "currency": "ETH"}),
        },
    );

    let err = Publisher::new(&config).publish(&event).await.unwrap_err();
    assert!(matches!(err, ClientError::Rejected { status: 401, .. }));

    config.publish_api_key = Some("pub-key".to_string());
    Publisher::new(&config).publish(&event).await.unwrap();

    let got = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got, event);

    sub.close().await;
    server.stop().await.unwrap();
}

#[tokio::test]
async fn resubscribes_after_relayer_restart() {
    let server = RelayServer::start(Config::for_test(DeliveryMode::All, None))
        .await
        .unwrap();
    let addr = server.local_addr();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let sub = subscribe(&client_config(&server), "abc123", move |event| {
        let _ = tx.send(event);
    });
    wait_for_sessions(&server.relay(), "abc123", 1).await;
    server.stop().await.unwrap();

    let mut config = Config::for_test(DeliveryMode::All, None);
    config.port = addr.port();
    let server = RelayServer::start(config).await.unwrap();
    let relay = server.relay();
    wait_for_sessions(&relay, "abc123", 1).await;

    let mut status = sub.status();
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if let subscriber::ConnectionStatus::Connected { generation } = *status.borrow_and_update() {
                if generation >= 2 {
                    break;
                }
            }
            status.changed().await.unwrap();
        }
    })
    .await
    .expect("second generation");

    relay.broadcast(&transaction("abc123", 9));
    let got = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got, transaction("abc123", 9));

    sub.close().await;
    server.stop().await.unwrap();
}

#[tokio::test]
async fn messages_queued_before_connect_do_not_disturb_the_session() {
    let server = RelayServer::start(Config::for_test(DeliveryMode::Latest, None))
        .await
        .unwrap();
    let relay = server.relay();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let sub = subscribe(&client_config(&server), "abc123", move |event| {
        let _ = tx.send(event);
    });
    // the relayer ignores application messages; they must not break the subscription
    sub.send(&json!({"type": "supportTicket", "userId": "abc123", "ticket": {"subject": "help"}}))
        .unwrap();
    wait_for_sessions(&relay, "abc123", 1).await;

    relay.broadcast(&transaction("abc123", 1));
    assert!(tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .is_some());

    sub.close().await;
    server.stop().await.unwrap();
}

#[tokio::test]
async fn subscribe_frame_goes_out_before_queued_messages() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = ClientConfig::for_addr(listener.local_addr().unwrap());
    config.backoff = fast_backoff();

    let sub = subscribe(&config, "u", |_| {});
    let queued = json!({"type": "supportTicket", "userId": "u", "ticket": {"subject": "help"}});
    sub.send(&queued).unwrap();

    let (stream, _) = tokio::time::timeout(Duration::from_secs(3), listener.accept())
        .await
        .expect("client should connect")
        .unwrap();
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

    let mut frames = Vec::new();
    while frames.len() < 2 {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("frame")
            .expect("stream open")
            .unwrap();
        if let Message::Text(t) = msg {
            frames.push(serde_json::from_str::<serde_json::Value>(&t).unwrap());
        }
    }
    assert_eq!(frames[0], json!({"type": "subscribe", "userId": "u"}));
    assert_eq!(frames[1], queued);

    sub.close().await;
}
