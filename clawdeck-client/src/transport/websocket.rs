//! WebSocket transport over `tokio-tungstenite`.

use super::{Connector, Outbound, Transport, TransportEvent};
use crate::error::ClientError;
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Connects with `tokio_tungstenite::connect_async`. `wss://` URLs use
/// rustls with the webpki root store.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn open(&self, url: &str) -> BoxFuture<'static, Result<Transport, ClientError>> {
        let url = url.to_string();
        Box::pin(async move {
            tracing::debug!("Opening WebSocket to {}", url);
            let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| ClientError::Transport(e.to_string()))?;
            tracing::debug!("WebSocket open");

            let (mut sink, mut source) = stream.split();
            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
            let (in_tx, in_rx) = mpsc::unbounded_channel::<TransportEvent>();

            let error_tx = in_tx.clone();
            tokio::spawn(async move {
                while let Some(message) = out_rx.recv().await {
                    match message {
                        Outbound::Text(text) => {
                            if let Err(e) = sink.send(Message::Text(text.into())).await {
                                tracing::debug!("WebSocket write failed: {}", e);
                                let _ = error_tx.send(TransportEvent::Error(e.to_string()));
                                break;
                            }
                        }
                        Outbound::Close => {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    }
                }
                let _ = sink.close().await;
            });

            tokio::spawn(async move {
                loop {
                    let next = tokio::select! {
                        _ = in_tx.closed() => break,
                        next = source.next() => next,
                    };

                    let event = match next {
                        Some(Ok(Message::Text(text))) => TransportEvent::Message(text.to_string()),
                        Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                            Ok(text) => TransportEvent::Message(text),
                            Err(_) => {
                                tracing::debug!("Dropping non-UTF-8 binary message");
                                continue;
                            }
                        },
                        Some(Ok(Message::Close(frame))) => {
                            if let Some(frame) = frame {
                                tracing::debug!("WebSocket closed: {} {}", frame.code, frame.reason);
                            }
                            let _ = in_tx.send(TransportEvent::Closed);
                            break;
                        }
                        // Ping/pong are answered by tungstenite.
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            let _ = in_tx.send(TransportEvent::Error(e.to_string()));
                            break;
                        }
                        None => {
                            let _ = in_tx.send(TransportEvent::Closed);
                            break;
                        }
                    };

                    if in_tx.send(event).is_err() {
                        break;
                    }
                }
            });

            Ok(Transport::new(out_tx, in_rx))
        })
    }
}
