use std::io::ErrorKind;

use serde_json::json;
use tokio::io::{self, AsyncWriteExt};

use comms::msg::{Command, Mode, Response};

#[test]
fn command_wire_shape_matches_schema() {
    let cmd = Command::Setup {
        model_name: "facebook/opt-1.3b".to_string(),
        mode: Mode::Train,
        client_id: 1,
        total_clients: 2,
    };

    assert_eq!(
        serde_json::to_value(&cmd).unwrap(),
        json!({
            "command": "setup",
            "model_name": "facebook/opt-1.3b",
            "mode": "train",
            "client_id": 1,
            "total_clients": 2,
        })
    );

    assert_eq!(
        serde_json::to_value(Command::LoadData).unwrap(),
        json!({"command": "load_data"})
    );

    assert_eq!(
        serde_json::to_value(Command::Infer {
            input: "What is diabetes?".to_string(),
        })
        .unwrap(),
        json!({"command": "infer", "input": "What is diabetes?"})
    );
}

#[test]
fn response_wire_shape_matches_schema() {
    let resp = Response::TrainingError {
        client_id: 1,
        error: "OOM".to_string(),
    };

    assert_eq!(
        serde_json::to_value(&resp).unwrap(),
        json!({"command": "training_error", "client_id": 1, "error": "OOM"})
    );
    assert_eq!(resp.client_id(), 1);
    assert_eq!(resp.kind(), "training_error");
    assert!(resp.is_error());

    let resp: Response =
        serde_json::from_value(json!({"command": "ready", "client_id": 3})).unwrap();
    assert_eq!(resp, Response::Ready { client_id: 3 });
    assert!(!resp.is_error());
}

#[tokio::test]
async fn send_recv_roundtrip() {
    const SIZE: usize = 512;

    let (one, two) = io::duplex(SIZE);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    let cmd = Command::Train { epochs: 2 };
    tx.send(&cmd).await.unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let received: Command = rx.recv().await.unwrap();
    assert_eq!(received, cmd);
}

#[tokio::test]
async fn per_channel_order_is_preserved() {
    let (one, two) = io::duplex(512);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    tx.send(&Command::LoadData).await.unwrap();
    tx.send(&Command::Train { epochs: 1 }).await.unwrap();
    tx.send(&Command::Shutdown).await.unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    assert_eq!(rx.recv::<Command>().await.unwrap(), Command::LoadData);
    assert_eq!(
        rx.recv::<Command>().await.unwrap(),
        Command::Train { epochs: 1 }
    );
    assert_eq!(rx.recv::<Command>().await.unwrap(), Command::Shutdown);
}

#[tokio::test]
async fn malformed_body_fails_without_desyncing_the_stream() {
    let (one, two) = io::duplex(512);
    let (_, mut raw_tx) = io::split(one);

    // Hand-rolled frame with a body that is not a valid message.
    let body = br#"{"command": "bogus"}"#;
    raw_tx.write_all(&(body.len() as u64).to_be_bytes()).await.unwrap();
    raw_tx.write_all(body).await.unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let err = rx.recv::<Command>().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);

    // The next well-formed frame still parses.
    let body = br#"{"command": "shutdown"}"#;
    raw_tx.write_all(&(body.len() as u64).to_be_bytes()).await.unwrap();
    raw_tx.write_all(body).await.unwrap();

    assert_eq!(rx.recv::<Command>().await.unwrap(), Command::Shutdown);
}

#[tokio::test]
async fn oversized_frame_is_rejected() {
    let (one, two) = io::duplex(512);
    let (_, mut raw_tx) = io::split(one);

    let len = (comms::MAX_FRAME_SIZE as u64 + 1).to_be_bytes();
    raw_tx.write_all(&len).await.unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let err = rx.recv::<Response>().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
}
