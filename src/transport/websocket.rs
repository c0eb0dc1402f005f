use super::{Connection, Connector, InboundFrame, OutboundFrame};
use crate::error::SttError;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite};
use tracing::{debug, info, warn};

/// WebSocket transport for the realtime transcription endpoint.
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Connection, SttError> {
        info!("Connecting to {}", url);

        let (ws_stream, _) = connect_async(url).await.map_err(map_connect_error)?;

        info!("WebSocket connected");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundFrame>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<InboundFrame>();

        // Writer: drain outbound frames; a dropped sender closes the socket.
        let writer_in_tx = in_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let msg = match frame {
                    OutboundFrame::Text(text) => tungstenite::Message::Text(text),
                    OutboundFrame::Binary(bytes) => tungstenite::Message::Binary(bytes),
                };
                if let Err(e) = ws_tx.send(msg).await {
                    warn!("WebSocket send failed: {}", e);
                    let _ = writer_in_tx.send(InboundFrame::Error(map_stream_error(e)));
                    return;
                }
            }
            debug!("Outbound channel closed, closing WebSocket");
            let _ = ws_tx.close().await;
        });

        // Reader: forward inbound frames until the socket ends or nobody listens.
        tokio::spawn(async move {
            while let Some(msg) = ws_rx.next().await {
                let frame = match msg {
                    Ok(tungstenite::Message::Text(text)) => InboundFrame::Text(text),
                    Ok(tungstenite::Message::Binary(bytes)) => InboundFrame::Binary(bytes),
                    Ok(tungstenite::Message::Close(close)) => {
                        let (code, reason) = match close {
                            Some(frame) => (Some(u16::from(frame.code)), frame.reason.into_owned()),
                            None => (None, String::new()),
                        };
                        let _ = in_tx.send(InboundFrame::Closed { code, reason });
                        return;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = in_tx.send(InboundFrame::Error(map_stream_error(e)));
                        return;
                    }
                };
                if in_tx.send(frame).is_err() {
                    return;
                }
            }
            let _ = in_tx.send(InboundFrame::Closed {
                code: None,
                reason: String::new(),
            });
        });

        Ok(Connection {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

fn map_connect_error(err: tungstenite::Error) -> SttError {
    match err {
        tungstenite::Error::Http(response) => {
            let status = response.status().as_u16();
            let body = response
                .body()
                .as_ref()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            SttError::from_status(status, format!("Connection rejected ({}): {}", status, body))
        }
        tungstenite::Error::Io(e) => SttError::network(format!("Network error: {}", e)),
        other => SttError::connection(format!("Failed to connect: {}", other)),
    }
}

fn map_stream_error(err: tungstenite::Error) -> SttError {
    match err {
        tungstenite::Error::Io(e) => SttError::network(format!("Network error: {}", e)),
        other => SttError::connection(format!("WebSocket error: {}", other)),
    }
}
