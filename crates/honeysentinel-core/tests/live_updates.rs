//! Push channel listener against a local WebSocket server.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use futures_util::SinkExt;
use honeysentinel_core::{
    AcquisitionState, Backoff, ConnectionState, LiveUpdateListener, OverallStatus, RecordSource,
    SharedStore,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

fn update(id: &str, status: &str) -> WsMessage {
    WsMessage::Text(
        json!({
            "type": "email_update",
            "email_id": id,
            "data": {"domain": "bank.test", "overall_status": status},
        })
        .to_string()
        .into(),
    )
}

fn listener(url: Url, store: &SharedStore) -> LiveUpdateListener {
    LiveUpdateListener::new(
        url,
        store.clone(),
        Backoff::new(Duration::from_millis(20), Duration::from_millis(100)),
    )
}

async fn wait_for_status(store: &SharedStore, id: &str, status: OverallStatus) {
    timeout(Duration::from_secs(5), async {
        loop {
            if store
                .get(id)
                .record
                .is_some_and(|r| r.overall_status == status)
            {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn listener_reconnects_after_server_closes() {
    let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();

    // Each connection delivers one update, then the server hangs up.
    let backend = tokio::spawn(async move {
        for (id, status) in [("m1", "untrustworthy"), ("m2", "highly_trustworthy")] {
            let (stream, _) = server.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(WsMessage::Text(r#"{"type": "welcome"}"#.into()))
                .await
                .unwrap();
            ws.send(update(id, status)).await.unwrap();
            ws.close(None).await.unwrap();
        }
    });

    let store = SharedStore::new();
    let live = listener(Url::parse(&format!("ws://{addr}/ws")).unwrap(), &store);
    let state = live.subscribe();
    let (shutdown, rx) = broadcast::channel(1);
    let handle = tokio::spawn(live.run(rx));

    // The second update only arrives if the listener reconnected.
    wait_for_status(&store, "m1", OverallStatus::Untrustworthy).await;
    wait_for_status(&store, "m2", OverallStatus::HighlyTrustworthy).await;
    backend.await.unwrap();

    let e = store.get("m2");
    assert_eq!(e.state, AcquisitionState::Ready);
    assert_eq!(e.source, Some(RecordSource::Push));
    assert_eq!(e.record.unwrap().domain, "bank.test");

    shutdown.send(()).unwrap();
    timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(*state.borrow(), ConnectionState::Closed);
}

#[tokio::test]
async fn unreachable_server_reports_error_and_keeps_trying() {
    // Grab a free port, then release it so connections are refused.
    let addr = {
        let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
        socket.local_addr().unwrap()
    };

    let store = SharedStore::new();
    let live = listener(Url::parse(&format!("ws://{addr}/ws")).unwrap(), &store);
    let mut state = live.subscribe();
    let (shutdown, rx) = broadcast::channel(1);
    let handle = tokio::spawn(live.run(rx));

    timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Error),
    )
    .await
    .unwrap()
    .unwrap();
    // Later attempts keep publishing state changes.
    timeout(Duration::from_secs(5), state.changed())
        .await
        .unwrap()
        .unwrap();

    shutdown.send(()).unwrap();
    handle.await.unwrap();
    assert!(store.is_empty());
}
