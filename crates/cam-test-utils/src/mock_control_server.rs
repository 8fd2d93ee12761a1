// mock_control_server: A mock control-socket server for exercising the event
// channel against a real WebSocket peer.
//
// Accepts connections on ws://127.0.0.1:<port>, records every text frame it
// receives, and lets the test drive the current connection: push text frames
// to the client or close it with a chosen code.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use cam_protocol::ControlMessage;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Operations a test can apply to the currently connected client.
enum ServerOp {
    SendText(String),
    Close(u16),
}

#[derive(Default)]
struct ServerState {
    accepted: AtomicUsize,
    client_closes: AtomicUsize,
    reject_handshakes: AtomicBool,
    received: Mutex<Vec<String>>,
    current: Mutex<Option<mpsc::UnboundedSender<ServerOp>>>,
}

/// A mock control-socket server for integration testing.
///
/// Binds to port 0 (random) and exposes the actual bound address. Each test
/// can spin up its own isolated server instance.
///
/// # Behavior
///
/// - Every accepted TCP connection counts toward [`connection_count`], even
///   when the handshake is then rejected -- the counter measures client dial
///   attempts.
/// - Inbound text frames are recorded verbatim; the server never replies on
///   its own. Tests drive outbound traffic through [`send_text`],
///   [`send_message`] and [`close_current`]; operations issued before the
///   handshake finishes are queued and applied right after it.
///
/// [`connection_count`]: MockControlServer::connection_count
/// [`send_text`]: MockControlServer::send_text
/// [`send_message`]: MockControlServer::send_message
/// [`close_current`]: MockControlServer::close_current
pub struct MockControlServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    /// Handle to the background accept loop; detached when the server drops.
    _task: tokio::task::JoinHandle<()>,
}

impl MockControlServer {
    /// Start the mock server, binding to a random available port.
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(ServerState::default());

        let accept_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            accept_loop(listener, accept_state).await;
        });

        Ok(Self {
            addr,
            state,
            _task: task,
        })
    }

    /// Return the address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// `ws://` URL of the server.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Total connections accepted so far, including rejected handshakes.
    pub fn connection_count(&self) -> usize {
        self.state.accepted.load(Ordering::SeqCst)
    }

    /// Number of close frames initiated by clients. Acknowledgements of
    /// server-initiated closes are not counted.
    pub fn client_close_count(&self) -> usize {
        self.state.client_closes.load(Ordering::SeqCst)
    }

    /// When set, new TCP connections are dropped before the WebSocket
    /// handshake completes, so client dials fail.
    pub fn set_reject_handshakes(&self, reject: bool) {
        self.state
            .reject_handshakes
            .store(reject, Ordering::SeqCst);
    }

    /// Text frames received from clients, oldest first.
    pub async fn received_texts(&self) -> Vec<String> {
        self.state.received.lock().await.clone()
    }

    /// Push a text frame to the currently connected client.
    pub async fn send_text(
        &self,
        text: impl Into<String>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.op(ServerOp::SendText(text.into())).await
    }

    /// Serialize a control message and push it to the current client.
    pub async fn send_message(
        &self,
        msg: &ControlMessage,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string(msg)?;
        self.op(ServerOp::SendText(json)).await
    }

    /// Close the current connection with the given close code.
    pub async fn close_current(&self, code: u16) -> Result<(), Box<dyn std::error::Error>> {
        self.op(ServerOp::Close(code)).await
    }

    /// Wait until at least `n` connections have been accepted. Panics after
    /// five seconds so a hung test fails fast.
    pub async fn wait_for_connections(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.connection_count() < n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {n} connections (got {})",
                self.connection_count()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until at least `n` text frames have been received.
    pub async fn wait_for_received(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.received_texts().await.len() < n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {n} received frames"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until at least `n` client-initiated close frames have arrived.
    pub async fn wait_for_client_closes(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.client_close_count() < n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {n} client closes (got {})",
                self.client_close_count()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn op(&self, op: ServerOp) -> Result<(), Box<dyn std::error::Error>> {
        let guard = self.state.current.lock().await;
        let tx = guard.as_ref().ok_or("no client connected")?;
        tx.send(op).map_err(|_| "client connection gone")?;
        Ok(())
    }
}

/// Accept loop: counts dial attempts, registers the connection's operation
/// queue, and spawns a handler.
async fn accept_loop(listener: TcpListener, state: Arc<ServerState>) {
    loop {
        match listener.accept().await {
            Ok((stream, _peer)) => {
                state.accepted.fetch_add(1, Ordering::SeqCst);
                if state.reject_handshakes.load(Ordering::SeqCst) {
                    drop(stream);
                    continue;
                }
                // Registered before the handshake so tests can queue
                // operations as soon as the dial attempt is visible.
                let (op_tx, op_rx) = mpsc::unbounded_channel();
                *state.current.lock().await = Some(op_tx);
                let conn_state = Arc::clone(&state);
                tokio::spawn(async move {
                    // Connection errors are expected in tests (client drops,
                    // forced closes); swallow them.
                    let _ = handle_connection(stream, op_rx, conn_state).await;
                });
            }
            Err(_) => break,
        }
    }
}

/// Handle a single connection: record inbound text, apply test operations.
async fn handle_connection(
    stream: TcpStream,
    mut op_rx: mpsc::UnboundedReceiver<ServerOp>,
    state: Arc<ServerState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut ws = tokio_tungstenite::accept_async(stream).await?;

    loop {
        tokio::select! {
            op = op_rx.recv() => match op {
                Some(ServerOp::SendText(text)) => {
                    ws.send(Message::Text(text.into())).await?;
                }
                Some(ServerOp::Close(code)) => {
                    ws.close(Some(CloseFrame {
                        code: CloseCode::from(code),
                        reason: "".into(),
                    }))
                    .await?;
                    break;
                }
                None => break,
            },
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    state.received.lock().await.push(text.to_string());
                }
                Some(Ok(Message::Close(_))) => {
                    state.client_closes.fetch_add(1, Ordering::SeqCst);
                    break;
                }
                Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    Ok(())
}
