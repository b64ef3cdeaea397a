use clubs_rust_realtime::{ConnectionState, RealtimeError, SocketClient, SocketFrame};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

// Helper: a one-connection echo server that tags replies with a sender and
// closes the socket after `replies` frames
async fn start_mock_server(
    replies: usize,
) -> (std::net::SocketAddr, oneshot::Receiver<String>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (path_tx, path_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let _ = path_tx.send(request.uri().path().to_string());
            Ok(response)
        };
        let mut ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();

        let mut sent = 0;
        while sent < replies {
            match ws_stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    let mut frame: serde_json::Value = serde_json::from_str(&text).unwrap();
                    frame["sender"] = json!("server");
                    ws_stream
                        .send(Message::Text(frame.to_string()))
                        .await
                        .unwrap();
                    sent += 1;
                }
                Some(Ok(_)) => continue,
                _ => return,
            }
        }
        let _ = ws_stream.close(None).await;
    });

    (addr, path_rx)
}

async fn wait_for_state(client: &SocketClient, expected: ConnectionState) {
    let mut changes = client.on_state_change();
    let wait = async {
        while client.connection_state().await != expected {
            let _ = tokio::time::timeout(Duration::from_millis(100), changes.recv()).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("state change timed out");
}

#[tokio::test]
async fn test_chat_round_trip() {
    let _ = pretty_env_logger::try_init();
    let (addr, path_rx) = start_mock_server(1).await;

    let client = SocketClient::new(&format!("http://{}", addr), "chat", "pennlabs").unwrap();
    let mut frames = client.subscribe();

    client.connect().await.unwrap();
    assert!(client.can_send().await);
    assert_eq!(path_rx.await.unwrap(), "/api/ws/chat/pennlabs/");

    client.send("hello club").await.unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), frames.recv())
        .await
        .expect("no frame received")
        .unwrap();
    assert_eq!(frame.message, "hello club");
    assert_eq!(frame.get("sender"), Some(&json!("server")));
}

#[tokio::test]
async fn test_connection_loss_disables_input() {
    let (addr, _path_rx) = start_mock_server(1).await;

    let client = SocketClient::new(&format!("http://{}", addr), "script", "7").unwrap();
    client.connect().await.unwrap();
    client
        .send_frame(&SocketFrame::new("print(1)").with_field("kind", "run"))
        .await
        .unwrap();

    // The server closes after its single reply
    wait_for_state(&client, ConnectionState::Closed).await;

    assert!(!client.can_send().await);
    assert!(matches!(
        client.send("again").await,
        Err(RealtimeError::InputDisabled)
    ));
    // No reconnection on the same client
    assert!(matches!(
        client.connect().await,
        Err(RealtimeError::InputDisabled)
    ));
}

#[tokio::test]
async fn test_connect_failure_closes_client() {
    // Nothing listens on this port once the listener is dropped
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = SocketClient::new(&format!("http://{}", addr), "chat", "1").unwrap();
    let result = client.connect().await;

    assert!(matches!(result, Err(RealtimeError::ConnectionError(_))));
    assert_eq!(client.connection_state().await, ConnectionState::Closed);
}

#[tokio::test]
async fn test_manual_close() {
    let (addr, _path_rx) = start_mock_server(0).await;

    let client = SocketClient::new(&format!("ws://{}", addr), "chat", "2").unwrap();
    // The mock server closes right away; close() must still leave the client closed
    let _ = client.connect().await;
    client.close().await;

    assert_eq!(client.connection_state().await, ConnectionState::Closed);
    assert!(client.send("bye").await.is_err());
}
