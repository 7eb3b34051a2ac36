/// Broker transport: STOMP over WebSocket
///
/// `BrokerConnector` is the seam between the connection manager and the
/// network. A successful `connect` yields a `BrokerLink` that is already
/// subscribed to the requested topic.
use crate::config::{AuthMode, BrokerConfig};
use crate::error::{ClientError, Result};
use crate::stomp::{Command, Frame, FrameOrHeartbeat};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Event emitted by an established link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Body of a MESSAGE frame on the subscribed topic
    Message(String),
    /// The link is gone; no further events follow
    Closed(Option<String>),
}

/// An established, subscribed broker connection
///
/// Sending on (or dropping) the shutdown handle closes the link.
#[derive(Debug)]
pub struct BrokerLink {
    events: mpsc::UnboundedReceiver<LinkEvent>,
    shutdown: oneshot::Sender<()>,
}

impl BrokerLink {
    pub fn new(events: mpsc::UnboundedReceiver<LinkEvent>, shutdown: oneshot::Sender<()>) -> Self {
        Self { events, shutdown }
    }

    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<LinkEvent>, oneshot::Sender<()>) {
        (self.events, self.shutdown)
    }
}

#[async_trait]
pub trait BrokerConnector: Send + Sync + 'static {
    /// Open a connection and subscribe to `topic`
    async fn connect(&self, topic: &str) -> Result<BrokerLink>;
}

/// Production connector
pub struct StompConnector {
    config: BrokerConfig,
    token: Option<String>,
}

impl StompConnector {
    pub fn new(config: BrokerConfig, token: Option<String>) -> Self {
        Self { config, token }
    }

    fn endpoint(&self) -> Result<Url> {
        let mut url = Url::parse(&self.config.url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {e}", self.config.url)))?;
        if let (AuthMode::QueryParam, Some(token)) = (self.config.auth_mode, &self.token) {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url)
    }

    async fn open_socket(&self, url: &Url) -> Result<WsStream> {
        let mut request = url.as_str().into_client_request()?;
        if let Some(protocol) = &self.config.subprotocol {
            let value = HeaderValue::from_str(protocol)
                .map_err(|e| ClientError::Config(format!("invalid subprotocol: {e}")))?;
            request.headers_mut().insert("Sec-WebSocket-Protocol", value);
        }
        if let (AuthMode::Header, Some(token)) = (self.config.auth_mode, &self.token) {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ClientError::Config(format!("invalid token: {e}")))?;
            request.headers_mut().insert("Authorization", value);
        }

        let (ws, _response) = tokio_tungstenite::connect_async(request).await?;
        Ok(ws)
    }
}

#[async_trait]
impl BrokerConnector for StompConnector {
    async fn connect(&self, topic: &str) -> Result<BrokerLink> {
        let url = self.endpoint()?;
        let host = url.host_str().unwrap_or("localhost").to_string();
        debug!(url = %redact(&url), "opening broker socket");

        let mut ws = self.open_socket(&url).await?;

        send_frame(&mut ws, &Frame::connect(&host, self.token.as_deref())).await?;
        loop {
            let frame = next_frame(&mut ws).await?;
            match frame.command {
                Command::Connected => {
                    debug!(
                        version = frame.get_header("version").unwrap_or("1.0"),
                        "broker handshake complete"
                    );
                    break;
                }
                Command::Error => return Err(ClientError::Handshake(error_text(&frame))),
                other => debug!(command = %other, "ignoring frame before CONNECTED"),
            }
        }

        let subscription_id = format!("sub-{}", Uuid::new_v4());
        let receipt_id = format!("receipt-{}", Uuid::new_v4());
        send_frame(
            &mut ws,
            &Frame::subscribe(&subscription_id, topic, &receipt_id),
        )
        .await?;

        // Messages can race ahead of the receipt; keep them in order
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        loop {
            let frame = next_frame(&mut ws).await?;
            match frame.command {
                Command::Receipt if frame.get_header("receipt-id") == Some(receipt_id.as_str()) => {
                    break;
                }
                Command::Message => {
                    let _ = events_tx.send(LinkEvent::Message(frame.body));
                }
                Command::Error => return Err(ClientError::Handshake(error_text(&frame))),
                other => debug!(command = %other, "ignoring frame before subscription receipt"),
            }
        }

        info!(topic, "subscribed to broker topic");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(pump(ws, subscription_id, events_tx, shutdown_rx));
        Ok(BrokerLink::new(events_rx, shutdown_tx))
    }
}

async fn send_frame(ws: &mut WsStream, frame: &Frame) -> Result<()> {
    ws.send(Message::Text(frame.encode().into())).await?;
    Ok(())
}

/// Next STOMP frame during the handshake, skipping heartbeats and control messages
async fn next_frame(ws: &mut WsStream) -> Result<Frame> {
    loop {
        let payload = match ws.next().await {
            Some(Ok(Message::Text(text))) => text.as_str().to_string(),
            Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
            Some(Ok(Message::Close(_))) | None => {
                return Err(ClientError::Handshake(
                    "connection closed during handshake".to_string(),
                ))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        };

        match Frame::decode(&payload)? {
            FrameOrHeartbeat::Frame(frame) => return Ok(frame),
            FrameOrHeartbeat::Heartbeat => continue,
        }
    }
}

/// Forward MESSAGE bodies until the socket ends or shutdown is requested
async fn pump(
    mut ws: WsStream,
    subscription_id: String,
    events: mpsc::UnboundedSender<LinkEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = send_frame(&mut ws, &Frame::unsubscribe(&subscription_id)).await;
                let _ = send_frame(&mut ws, &Frame::disconnect()).await;
                let _ = ws.close(None).await;
                debug!("broker link closed by client");
                return;
            }
            msg = ws.next() => {
                let closed = match msg {
                    Some(Ok(Message::Text(text))) => handle_payload(text.as_str(), &events),
                    Some(Ok(Message::Binary(bytes))) => {
                        handle_payload(&String::from_utf8_lossy(&bytes), &events)
                    }
                    Some(Ok(Message::Close(frame))) => Some(
                        frame
                            .map(|f| f.reason.to_string())
                            .unwrap_or_else(|| "closed by broker".to_string()),
                    ),
                    Some(Ok(_)) => None,
                    Some(Err(e)) => Some(e.to_string()),
                    None => Some("stream ended".to_string()),
                };

                if let Some(reason) = closed {
                    warn!(reason = %reason, "broker link lost");
                    let _ = events.send(LinkEvent::Closed(Some(reason)));
                    return;
                }
            }
        }
    }
}

/// Returns a close reason when the link must end
fn handle_payload(payload: &str, events: &mpsc::UnboundedSender<LinkEvent>) -> Option<String> {
    match Frame::decode(payload) {
        Ok(FrameOrHeartbeat::Frame(frame)) => match frame.command {
            Command::Message => {
                if events.send(LinkEvent::Message(frame.body)).is_err() {
                    return Some("link receiver dropped".to_string());
                }
                None
            }
            Command::Error => Some(format!("broker error: {}", error_text(&frame))),
            other => {
                debug!(command = %other, "ignoring broker frame");
                None
            }
        },
        Ok(FrameOrHeartbeat::Heartbeat) => None,
        Err(e) => {
            warn!(error = %e, "dropping malformed broker frame");
            None
        }
    }
}

fn error_text(frame: &Frame) -> String {
    frame
        .get_header("message")
        .map(str::to_string)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| frame.body.trim_end_matches('\0').to_string())
}

/// URL without the token query parameter, for logs
fn redact(url: &Url) -> String {
    let mut clean = url.clone();
    clean.set_query(None);
    clean.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn broker_config(auth_mode: AuthMode) -> BrokerConfig {
        BrokerConfig {
            url: "ws://localhost:8080/ws".to_string(),
            auth_mode,
            ..BrokerConfig::default()
        }
    }

    #[test]
    fn test_query_param_auth_appends_token() {
        let connector =
            StompConnector::new(broker_config(AuthMode::QueryParam), Some("t0k".to_string()));
        let url = connector.endpoint().unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8080/ws?token=t0k");
        assert_eq!(redact(&url), "ws://localhost:8080/ws");
    }

    #[test]
    fn test_header_auth_leaves_url_untouched() {
        let connector =
            StompConnector::new(broker_config(AuthMode::Header), Some("t0k".to_string()));
        assert_eq!(connector.endpoint().unwrap().as_str(), "ws://localhost:8080/ws");
    }

    #[test]
    fn test_invalid_url_rejected() {
        let config = BrokerConfig {
            url: "not a url".to_string(),
            ..BrokerConfig::default()
        };
        let connector = StompConnector::new(config, None);
        assert!(matches!(connector.endpoint(), Err(ClientError::InvalidUrl(_))));
    }

    #[test]
    fn test_handle_payload_forwards_messages() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let frame = Frame::new(Command::Message).body("{\"id\":1}").encode();
        assert_eq!(handle_payload(&frame, &tx), None);
        assert_eq!(rx.try_recv().unwrap(), LinkEvent::Message("{\"id\":1}".to_string()));
    }

    #[test]
    fn test_handle_payload_error_frame_closes() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let frame = Frame::new(Command::Error)
            .header("message", "session expired")
            .encode();
        assert_eq!(
            handle_payload(&frame, &tx),
            Some("broker error: session expired".to_string())
        );
    }

    #[test]
    fn test_handle_payload_ignores_heartbeats_and_garbage() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert_eq!(handle_payload("\n", &tx), None);
        assert_eq!(handle_payload("BOGUS\n\n\0", &tx), None);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_refused_is_an_error() {
        let config = BrokerConfig {
            url: "ws://127.0.0.1:9/ws".to_string(),
            connect_timeout: Duration::from_millis(500),
            ..BrokerConfig::default()
        };
        let connector = StompConnector::new(config, None);
        assert!(connector.connect("/topic/notifications/7").await.is_err());
    }
}
