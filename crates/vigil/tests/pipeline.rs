//! End-to-end tests for the capture-and-delivery pipeline against a real
//! TCP collector.

use std::net::SocketAddr;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use vigil::{
    Breadcrumb, Catcher, CatcherOptions, ConnectionState, ReportEvent, Severity, Status,
    VigilConfig,
};

// ── Test collector ───────────────────────────────────────────────────────

/// Accept connections on `listener` and forward every NDJSON line.
fn spawn_collector(listener: TcpListener) -> mpsc::UnboundedReceiver<Value> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stream).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let value: Value = serde_json::from_str(&line).expect("collector got invalid JSON");
                    if tx.send(value).is_err() {
                        return;
                    }
                }
            });
        }
    });
    rx
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for the collector")
        .expect("collector stopped")
}

fn config_for(addr: SocketAddr) -> VigilConfig {
    let mut config = VigilConfig {
        token: Some("integration-token".into()),
        collector_endpoint: addr.to_string(),
        ..VigilConfig::default()
    };
    config.transport.reconnection_timeout_ms = 100;
    config.performance.batch_interval_ms = 100;
    config
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn error_report_reaches_collector_with_trail() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut received = spawn_collector(listener);

    let catcher = Catcher::new(CatcherOptions::new(config_for(addr)));
    catcher.add_breadcrumb(Breadcrumb::new("clicked save"));
    catcher
        .send(ReportEvent::new("Save failed").with_context("attempt", 2))
        .unwrap();

    let message = next(&mut received).await;
    assert_eq!(message["token"], "integration-token");
    assert_eq!(message["catcher_type"], "errors/rust");
    assert_eq!(message["payload"]["title"], "Save failed");
    assert_eq!(message["payload"]["context"]["attempt"], 2);
    assert_eq!(message["payload"]["breadcrumbs"][0]["message"], "clicked save");

    catcher.destroy().await;
}

#[tokio::test]
async fn performance_batches_are_sent_periodically() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut received = spawn_collector(listener);

    let catcher = Catcher::new(CatcherOptions::new(config_for(addr)));
    let tx = catcher
        .start_transaction("sync", Severity::Default)
        .unwrap();
    tx.start_span("download").unwrap().finish(Status::Failure);
    tx.finish(Status::Failure);

    let message = next(&mut received).await;
    assert_eq!(message["catcher_type"], "performance");
    let transaction = &message["payload"]["transactions"][0];
    assert_eq!(transaction["name"], "sync");
    assert_eq!(transaction["status"], "failure");
    assert_eq!(transaction["spans"][0]["name"], "download");
    assert_eq!(message["payload"]["aggregates"][0]["count"], 1);
    assert_eq!(message["payload"]["aggregates"][0]["failure_rate"], 1.0);

    catcher.destroy().await;
}

#[tokio::test]
async fn reports_sent_while_offline_arrive_in_order() {
    // Reserve a port, then leave it unbound so the first attempt fails.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let catcher = Catcher::new(CatcherOptions::new(config_for(addr)));
    for n in 1..=3 {
        catcher.send(ReportEvent::new(format!("offline {n}"))).unwrap();
    }
    assert_ne!(catcher.transport().state(), ConnectionState::Open);

    let listener = TcpListener::bind(addr).await.unwrap();
    let mut received = spawn_collector(listener);

    catcher.transport().wait_for_state(ConnectionState::Open).await;
    catcher.send(ReportEvent::new("online")).unwrap();

    let titles: Vec<Value> = {
        let mut titles = Vec::new();
        for _ in 0..4 {
            titles.push(next(&mut received).await["payload"]["title"].clone());
        }
        titles
    };
    assert_eq!(
        titles,
        vec!["offline 1", "offline 2", "offline 3", "online"]
    );

    catcher.destroy().await;
}

#[tokio::test]
async fn instrumented_http_calls_land_in_reports() {
    let collector = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = collector.local_addr().unwrap();
    let mut received = spawn_collector(collector);

    // An HTTP endpoint with nothing behind it.
    let dead = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let catcher = Catcher::new(CatcherOptions::new(config_for(addr)));
    let client = catcher
        .breadcrumbs()
        .instrument_client(reqwest::Client::new());
    let result = client.send(client.get(format!("http://{dead}/api"))).await;
    assert!(result.is_err());

    catcher.send(ReportEvent::new("API unreachable")).unwrap();

    let message = next(&mut received).await;
    let crumb = &message["payload"]["breadcrumbs"][0];
    assert_eq!(crumb["type"], "request");
    assert_eq!(crumb["category"], "fetch");
    assert_eq!(crumb["level"], "error");
    assert_eq!(crumb["data"]["method"], "GET");

    catcher.destroy().await;
}
