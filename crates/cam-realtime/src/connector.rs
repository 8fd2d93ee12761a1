//! Socket-creation seam.
//!
//! Channels never call `connect_async` directly; they hold an
//! `Arc<dyn Connector>` handed in at construction.  Production uses
//! [`WsConnector`]; tests inject counting, failing, or scripted connectors.

use futures_util::future::BoxFuture;
use futures_util::{Sink, Stream};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

pub use tokio_tungstenite::tungstenite::Error as WsError;

/// Object-safe view of an open WebSocket: message stream plus message sink.
pub trait Socket:
    Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send + Unpin
{
}

impl<T> Socket for T where
    T: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send + Unpin
{
}

pub type BoxedSocket = Box<dyn Socket>;

/// Dials one socket per call.
pub trait Connector: Send + Sync {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<BoxedSocket, WsError>>;
}

/// Production connector backed by `tokio_tungstenite::connect_async`
/// (ws:// and wss:// via rustls).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<BoxedSocket, WsError>> {
        let url = url.to_owned();
        Box::pin(async move {
            let (ws, _response) = connect_async(url).await?;
            Ok(Box::new(ws) as BoxedSocket)
        })
    }
}
