//! End-to-end session flow over the real TCP channel against an in-process
//! mock instrument.

use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use tagwatch_core::{SessionConfig, SessionController, SessionState, TcpJsonConnector};

async fn pump_until<C, F>(
    controller: &mut SessionController<C>,
    events: &mut tokio::sync::mpsc::UnboundedReceiver<tagwatch_core::ChannelEvent>,
    mut done: F,
) where
    C: tagwatch_core::ChannelConnector,
    F: FnMut(&SessionController<C>) -> bool,
{
    while !done(controller) {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for channel event")
            .expect("channel event stream ended");
        controller.handle_event(event);
    }
}

#[tokio::test]
async fn configure_then_three_reports() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        // First line must be the configure message with passthrough params.
        let first = lines.next_line().await.unwrap().unwrap();
        let msg: Value = serde_json::from_str(&first).unwrap();
        assert_eq!(msg["event"], "configure");
        assert_eq!(msg["data"]["groups"], "1,2; 3,4");
        assert_eq!(msg["data"]["cwin"], 1000);
        assert_eq!(msg["data"]["rtime"], 1.0);

        let ack = json!({"event": "configured", "data": {"status": 200}});
        write_half
            .write_all(format!("{ack}\n").as_bytes())
            .await
            .unwrap();
        for _ in 0..3 {
            let frame = json!({
                "event": "coincidence",
                "data": {
                    "status": 200,
                    "rtime": 1.0,
                    "groups": [[1, 2], [3, 4]],
                    "rates": [10.0, 20.0],
                },
            });
            write_half
                .write_all(format!("{frame}\n").as_bytes())
                .await
                .unwrap();
        }
        // Keep the connection up until the client is done reading.
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let config = SessionConfig {
        groups: "1,2; 3,4".to_string(),
        coincidence_window_ps: 1000,
        report_interval_secs: 1.0,
    };
    let (mut controller, mut events) =
        SessionController::new(TcpJsonConnector::default(), addr.to_string(), config);
    controller.start().unwrap();

    pump_until(&mut controller, &mut events, |c| c.window().len() >= 3).await;

    assert_eq!(controller.state(), SessionState::Active);
    let times: Vec<f64> = controller.window().points().map(|p| p.time_secs).collect();
    assert_eq!(times, vec![1.0, 2.0, 3.0]);
    for point in controller.window().points() {
        assert_eq!(point.rates.get("1,2"), Some(&10.0));
        assert_eq!(point.rates.get("3,4"), Some(&20.0));
    }

    controller.stop();
    assert_eq!(controller.state(), SessionState::Idle);
    assert!(controller.window().is_empty());
    server.abort();
}

#[tokio::test]
async fn remote_error_frames_are_surfaced_not_buffered() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let _ = lines.next_line().await.unwrap();

        let frame = json!({
            "event": "coincidence",
            "data": {"status": 500, "error": "tagger busy"},
        });
        write_half
            .write_all(format!("{frame}\n").as_bytes())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let config = SessionConfig {
        groups: "1,2".to_string(),
        ..SessionConfig::default()
    };
    let (mut controller, mut events) =
        SessionController::new(TcpJsonConnector::default(), addr.to_string(), config);
    controller.start().unwrap();

    pump_until(&mut controller, &mut events, |c| c.last_error().is_some()).await;

    assert_eq!(controller.state(), SessionState::Active);
    assert!(controller.window().is_empty());
    server.abort();
}
