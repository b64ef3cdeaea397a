use crate::error::RealtimeError;
use crate::message::SocketFrame;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// 接続状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected
    Disconnected,
    Connecting,
    Connected,
    /// Lost or closed; terminal for this client
    Closed,
}

/// SocketClient設定オプション
#[derive(Debug, Clone)]
pub struct SocketClientOptions {
    /// Path prefix of socket endpoints
    pub path_prefix: String,
    /// Buffered outgoing messages
    pub send_buffer: usize,
    /// Buffered incoming frames per subscriber
    pub receive_buffer: usize,
}

impl Default for SocketClientOptions {
    fn default() -> Self {
        Self {
            path_prefix: "/api/ws".to_string(),
            send_buffer: 100,
            receive_buffer: 256,
        }
    }
}

/// `ws(s)://<host>/api/ws/<feature>/<id>/` for a site URL
pub fn socket_url(
    site_url: &str,
    path_prefix: &str,
    feature: &str,
    id: &str,
) -> Result<Url, RealtimeError> {
    let mut url = Url::parse(site_url)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        s => {
            return Err(RealtimeError::ConnectionError(format!(
                "Unsupported URL scheme: {}",
                s
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| RealtimeError::ConnectionError(format!("Cannot use scheme {}", scheme)))?;
    url.set_query(None);

    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| RealtimeError::ConnectionError(format!("Cannot be a base URL: {}", site_url)))?;
        segments.clear();
        for segment in path_prefix.split('/').filter(|segment| !segment.is_empty()) {
            segments.push(segment);
        }
        segments.push(feature).push(id).push("");
    }

    Ok(url)
}

/// WebSocket client for one live feature instance
pub struct SocketClient {
    url: Url,
    options: SocketClientOptions,
    state: Arc<RwLock<ConnectionState>>,
    state_change: broadcast::Sender<ConnectionState>,
    socket: Arc<RwLock<Option<mpsc::Sender<Message>>>>,
    frames: broadcast::Sender<SocketFrame>,
}

impl SocketClient {
    /// デフォルトオプションで新しいクライアントを作成
    pub fn new(site_url: &str, feature: &str, id: &str) -> Result<Self, RealtimeError> {
        Self::new_with_options(site_url, feature, id, SocketClientOptions::default())
    }

    /// カスタムオプションで新しいクライアントを作成
    pub fn new_with_options(
        site_url: &str,
        feature: &str,
        id: &str,
        options: SocketClientOptions,
    ) -> Result<Self, RealtimeError> {
        let url = socket_url(site_url, &options.path_prefix, feature, id)?;
        let (state_change, _) = broadcast::channel(16);
        let (frames, _) = broadcast::channel(options.receive_buffer.max(1));

        Ok(Self {
            url,
            options,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            state_change,
            socket: Arc::new(RwLock::new(None)),
            frames,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Incoming frames; subscribe before connecting to see every frame
    pub fn subscribe(&self) -> broadcast::Receiver<SocketFrame> {
        self.frames.subscribe()
    }

    /// 接続状態変更の通知を受け取るためのレシーバーを取得
    pub fn on_state_change(&self) -> broadcast::Receiver<ConnectionState> {
        self.state_change.subscribe()
    }

    /// 現在の接続状態を取得
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Whether the input bound to this socket should be enabled
    pub async fn can_send(&self) -> bool {
        self.connection_state().await == ConnectionState::Connected
    }

    /// Open the connection and start the reader/writer tasks.
    ///
    /// A client connects once; after the connection closes it stays closed.
    pub async fn connect(&self) -> Result<(), RealtimeError> {
        {
            let state = self.state.read().await;
            match *state {
                ConnectionState::Disconnected => {}
                ConnectionState::Closed => return Err(RealtimeError::InputDisabled),
                other => {
                    return Err(RealtimeError::ConnectionError(format!(
                        "Already {:?}",
                        other
                    )))
                }
            }
        }

        info!("Attempting to connect to WebSocket: {}", self.url);
        set_state(&self.state, &self.state_change, ConnectionState::Connecting).await;

        let ws_stream = match connect_async(self.url.as_str()).await {
            Ok((stream, response)) => {
                debug!("WebSocket connection successful. Status: {}", response.status());
                stream
            }
            Err(e) => {
                error!("WebSocket connection failed: {}", e);
                set_state(&self.state, &self.state_change, ConnectionState::Closed).await;
                return Err(RealtimeError::ConnectionError(format!(
                    "WebSocket connection failed: {}",
                    e
                )));
            }
        };

        let (mut write, mut read) = ws_stream.split();
        let (socket_tx, mut socket_rx) = mpsc::channel::<Message>(self.options.send_buffer.max(1));
        *self.socket.write().await = Some(socket_tx);
        set_state(&self.state, &self.state_change, ConnectionState::Connected).await;

        // --- WebSocket Writer Task ---
        let writer_socket = self.socket.clone();
        let writer_state = self.state.clone();
        let writer_state_change = self.state_change.clone();
        tokio::spawn(async move {
            debug!("Writer task started");
            while let Some(message) = socket_rx.recv().await {
                trace!("Writer task sending message: {:?}", message);
                if let Err(e) = write.send(message).await {
                    error!("Writer task: WebSocket send error: {}. Closing connection.", e);
                    break;
                }
            }
            let _ = write.close().await;
            *writer_socket.write().await = None;
            set_state(&writer_state, &writer_state_change, ConnectionState::Closed).await;
            debug!("Writer task finished.");
        });

        // --- WebSocket Reader Task ---
        let reader_socket = self.socket.clone();
        let reader_state = self.state.clone();
        let reader_state_change = self.state_change.clone();
        let frames = self.frames.clone();
        tokio::spawn(async move {
            debug!("Reader task started");
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<SocketFrame>(&text) {
                        Ok(frame) => {
                            trace!("Reader task received frame: {:?}", frame);
                            // No subscribers is fine
                            let _ = frames.send(frame);
                        }
                        Err(e) => {
                            warn!("Reader task: ignoring malformed frame: {}. Raw: {}", e, text);
                        }
                    },
                    Ok(Message::Close(close)) => {
                        debug!("Reader task received Close frame: {:?}", close);
                        break;
                    }
                    Ok(other) => trace!("Reader task ignoring message: {:?}", other),
                    Err(e) => {
                        error!("Reader task: WebSocket read error: {}", e);
                        break;
                    }
                }
            }
            // Dropping the sender stops the writer task
            *reader_socket.write().await = None;
            set_state(&reader_state, &reader_state_change, ConnectionState::Closed).await;
            info!("WebSocket connection closed; input disabled.");
        });

        Ok(())
    }

    /// Send `{"message": text}`
    pub async fn send(&self, text: &str) -> Result<(), RealtimeError> {
        self.send_frame(&SocketFrame::new(text)).await
    }

    pub async fn send_frame(&self, frame: &SocketFrame) -> Result<(), RealtimeError> {
        let payload = serde_json::to_string(frame)?;
        let socket = self.socket.read().await;
        match socket.as_ref() {
            Some(socket_tx) => socket_tx
                .send(Message::Text(payload))
                .await
                .map_err(|_| RealtimeError::InputDisabled),
            None => {
                warn!("Cannot send message, socket unavailable.");
                Err(RealtimeError::InputDisabled)
            }
        }
    }

    /// 切断処理
    pub async fn close(&self) {
        info!("close() called");
        if self.socket.write().await.take().is_none() {
            debug!("close(): no active socket");
        }
        set_state(&self.state, &self.state_change, ConnectionState::Closed).await;
    }
}

async fn set_state(
    state: &RwLock<ConnectionState>,
    state_change: &broadcast::Sender<ConnectionState>,
    new_state: ConnectionState,
) {
    let mut current = state.write().await;
    if *current != new_state {
        trace!("Socket state changing from {:?} to {:?}", *current, new_state);
        *current = new_state;
        let _ = state_change.send(new_state);
    }
}
