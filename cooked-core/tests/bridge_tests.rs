// Tests for the extension bridge over real websocket connections

use cooked_core::bridge::BridgeOptions;
use cooked_core::{BridgeHost, BridgeMessage, CoreError, MessageKind, OptChoice};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Extension = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn host(choice: OptChoice) -> BridgeHost {
    BridgeHost::bind(BridgeOptions {
        bind: "127.0.0.1:0".parse().unwrap(),
        choice,
    })
    .await
    .unwrap()
}

async fn connect(host: &BridgeHost) -> Extension {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", host.local_addr()))
        .await
        .unwrap();
    ws
}

async fn next_json(ws: &mut Extension) -> Value {
    let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("no frame from bridge")
        .unwrap()
        .unwrap();
    serde_json::from_str(frame.to_text().unwrap()).unwrap()
}

async fn send(ws: &mut Extension, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

fn report(lifecycle: &str) -> Value {
    json!({
        "type": "report",
        "message": {
            "state": {"lifecycle": lifecycle, "detectedCmps": ["Sourcepoint"], "detectedPopups": ["banner"]}
        }
    })
}

// ============================================================================
// Connection Tests
// ============================================================================

#[tokio::test]
async fn test_opt_choice_sent_on_connect() {
    let host = host(OptChoice::OptOut).await;
    let mut ext = connect(&host).await;

    assert_eq!(next_json(&mut ext).await, json!({"type": "optChoice", "choice": "optOut"}));
    assert!(host.connections().is_connected());
}

#[tokio::test]
async fn test_new_connection_replaces_old() {
    let host = host(OptChoice::OptIn).await;

    let mut old = connect(&host).await;
    next_json(&mut old).await;
    let mut new = connect(&host).await;
    next_json(&mut new).await;

    let closed = tokio::time::timeout(Duration::from_secs(5), old.next()).await.unwrap();
    assert!(matches!(closed, Some(Ok(Message::Close(_))) | None));

    // Reports flow through the replacement
    let waiter = host.arm_report().unwrap();
    send(&mut new, report("done")).await;
    assert_eq!(waiter.wait(Duration::from_secs(5)).await.cmps, vec![json!("Sourcepoint")]);

    assert!(
        host.send(&BridgeMessage::OptChoice {
            choice: OptChoice::OptOut
        })
        .unwrap()
    );
    assert_eq!(next_json(&mut new).await["choice"], "optOut");
}

// ============================================================================
// Report Wait Tests
// ============================================================================

#[tokio::test]
async fn test_done_report_resolves_wait() {
    let host = host(OptChoice::OptIn).await;
    let mut ext = connect(&host).await;
    next_json(&mut ext).await;

    let waiter = host.arm_report().unwrap();
    send(&mut ext, report("done")).await;

    let got = waiter.wait(Duration::from_secs(5)).await;
    assert_eq!(got.popups, vec![json!("banner")]);
    assert!(!host.handlers().is_registered(MessageKind::Report));
}

#[tokio::test]
async fn test_other_lifecycles_leave_wait_pending() {
    let host = host(OptChoice::OptIn).await;
    let mut ext = connect(&host).await;
    next_json(&mut ext).await;

    let waiter = host.arm_report().unwrap();
    send(&mut ext, report("cmpDetected")).await;
    send(&mut ext, json!({"type": "heartbeat"})).await;
    ext.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    send(&mut ext, report("nothingDetected")).await;

    let got = waiter.wait(Duration::from_secs(5)).await;
    assert_eq!(got.cmps, vec![json!("Sourcepoint")]);
}

#[tokio::test]
async fn test_wait_falls_back_to_empty_report() {
    let host = host(OptChoice::OptIn).await;
    let mut ext = connect(&host).await;
    next_json(&mut ext).await;

    send(&mut ext, report("cmpDetected")).await;
    let got = host.await_report(Duration::from_millis(200)).await.unwrap();

    assert!(got.cmps.is_empty());
    assert!(got.popups.is_empty());
}

#[tokio::test]
async fn test_only_one_report_wait_at_a_time() {
    let host = host(OptChoice::OptIn).await;

    let first = host.arm_report().unwrap();
    assert!(matches!(
        host.arm_report(),
        Err(CoreError::HandlerBusy(MessageKind::Report))
    ));

    drop(first);
    assert!(host.arm_report().is_ok());
}
