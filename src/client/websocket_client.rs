//! WebSocket gateway transport
//!
//! Talks to a KNXnet/IP bridge process that relays group telegrams as JSON
//! text frames, one [`GroupEvent`] per frame:
//!
//! ```json
//! {"command":"write","source":"1.1.10","destination":"2/5/7","data":[0,12,51]}
//! ```
//!
//! Frames that do not decode are logged and skipped.

use super::{BusTransport, GatewayHandle, GatewayLink, INBOUND_CAPACITY};
use crate::address::GroupEvent;
use crate::error::{KnxError, Result};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Production transport over WebSocket
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    connect_timeout: Duration,
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl WebSocketTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// `ws://host:port` unless the gateway already names a scheme
    pub fn gateway_url(gateway: &str) -> Result<Url> {
        let raw = if gateway.starts_with("ws://") || gateway.starts_with("wss://") {
            gateway.to_string()
        } else {
            format!("ws://{gateway}")
        };
        Url::parse(&raw)
            .map_err(|e| KnxError::transport_connect(format!("invalid gateway {gateway:?}: {e}")))
    }
}

#[async_trait]
impl BusTransport for WebSocketTransport {
    async fn connect(&self, gateway: &str) -> Result<GatewayLink> {
        let url = Self::gateway_url(gateway)?;
        debug!("WebSocket URL: {url}");

        let connecting = connect_async(url.as_str());
        let (ws_stream, response) = tokio::time::timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| KnxError::transport_connect(format!("{gateway}: connect timed out")))?
            .map_err(|e| KnxError::transport_connect(format!("{gateway}: {e}")))?;
        debug!("WebSocket connected, response: {:?}", response.status());

        let (sink, stream) = ws_stream.split();
        let (tx, inbound) = mpsc::channel(INBOUND_CAPACITY);
        let reader = tokio::spawn(read_frames(gateway.to_string(), stream, tx));

        let handle = WebSocketHandle {
            sink: Mutex::new(sink),
            reader,
        };
        Ok(GatewayLink {
            inbound,
            handle: Arc::new(handle),
        })
    }
}

async fn read_frames(
    gateway: String,
    mut stream: SplitStream<WsStream>,
    tx: mpsc::Sender<GroupEvent>,
) {
    while let Some(frame) = stream.next().await {
        let payload = match frame {
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Binary(data)) => data,
            Ok(Message::Close(close_frame)) => {
                match close_frame {
                    Some(frame) => info!(
                        "Gateway {gateway} closed the connection: {} - {}",
                        frame.code, frame.reason
                    ),
                    None => info!("Gateway {gateway} closed the connection"),
                }
                break;
            }
            // pings are answered by tungstenite
            Ok(_) => continue,
            Err(e) => {
                warn!("Gateway {gateway} read error: {e}");
                break;
            }
        };

        match serde_json::from_slice::<GroupEvent>(&payload) {
            Ok(event) => {
                if tx.send(event).await.is_err() {
                    // receiver dropped, link is being torn down
                    break;
                }
            }
            Err(e) => warn!("Gateway {gateway} sent an undecodable frame: {e}"),
        }
    }
}

struct WebSocketHandle {
    sink: Mutex<SplitSink<WsStream, Message>>,
    reader: JoinHandle<()>,
}

#[async_trait]
impl GatewayHandle for WebSocketHandle {
    async fn send(&self, event: &GroupEvent) -> Result<()> {
        let json = serde_json::to_string(event)?;
        self.sink.lock().await.send(Message::Text(json)).await?;
        Ok(())
    }

    async fn close(&self) {
        if let Err(e) = self.sink.lock().await.close().await {
            debug!("Closing gateway socket: {e}");
        }
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::GroupCommand;
    use tokio::net::TcpListener;

    #[test]
    fn test_gateway_url() {
        assert_eq!(
            WebSocketTransport::gateway_url("192.168.1.11:3671")
                .unwrap()
                .as_str(),
            "ws://192.168.1.11:3671/"
        );
        assert_eq!(
            WebSocketTransport::gateway_url("wss://knx.example.org/bus")
                .unwrap()
                .as_str(),
            "wss://knx.example.org/bus"
        );
    }

    #[tokio::test]
    async fn test_exchange_with_gateway_bridge() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            ws.send(Message::Text("garbage".to_string())).await.unwrap();
            ws.send(Message::Text(
                r#"{"command":"write","source":"1.1.10","destination":"2/5/7","data":[0,12,51]}"#
                    .to_string(),
            ))
            .await
            .unwrap();
            // wait for the bridge to write back
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => return text,
                    Some(Ok(_)) => continue,
                    other => panic!("unexpected frame {other:?}"),
                }
            }
        });

        let transport = WebSocketTransport::default();
        let mut link = transport.connect(&addr.to_string()).await.unwrap();

        let event = link.inbound.recv().await.unwrap();
        assert_eq!(event.command, GroupCommand::Write);
        assert_eq!(event.destination.to_string(), "2/5/7");
        assert_eq!(event.data, vec![0, 12, 51]);

        link.handle
            .send(&GroupEvent::write("1/0/1".parse().unwrap(), vec![1]))
            .await
            .unwrap();
        let sent: GroupEvent = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(sent.destination.to_string(), "1/0/1");
        assert_eq!(sent.data, vec![1]);

        link.handle.close().await;
        assert!(link.inbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WebSocketTransport::default().connect(&addr.to_string()).await;
        assert!(matches!(result, Err(KnxError::TransportConnect(_))));
    }
}
