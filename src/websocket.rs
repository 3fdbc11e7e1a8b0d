use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::connection::WebSocketConnection;
use crate::error::{DeepstreamError, Result};
use crate::transport::{TransportEvent, TransportEvents, TransportHandler};

/// [`TransportHandler`] backed by tokio-tungstenite
#[derive(Default)]
pub struct WebSocketTransport {
    uri: Option<String>,
    events: Option<TransportEvents>,
    connection: Option<WebSocketConnection>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while the socket task is running
    pub fn is_open(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| !c.is_closed())
    }

    fn notify(&self, event: TransportEvent) {
        notify(&self.events, event);
    }
}

fn notify(events: &Option<TransportEvents>, event: TransportEvent) {
    if let Some(events) = events
        && events.send(event).is_err()
    {
        trace!("No listener for transport events");
    }
}

#[async_trait]
impl TransportHandler for WebSocketTransport {
    fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    fn set_uri(&mut self, uri: &str) {
        self.uri = Some(uri.to_string());
    }

    fn attach(&mut self, events: TransportEvents) {
        self.events = Some(events);
    }

    async fn open(&mut self) -> Result<()> {
        let uri = self.uri.as_deref().ok_or(DeepstreamError::EmptyUri)?;
        let url = Url::parse(uri)?;

        if let Some(connection) = self.connection.take() {
            debug!("Replacing open connection");
            connection.close().await;
        }

        info!("Connecting to deepstream at {}", url);

        let (ws_stream, response) = connect_async(url).await.map_err(|e| {
            error!("Failed to connect to WebSocket server: {}", e);
            self.notify(TransportEvent::Error(e.to_string()));
            e
        })?;

        debug!("Connected to WebSocket server. Response: {:?}", response);

        let (tx, rx) = mpsc::channel::<Message>(100);
        self.connection = Some(WebSocketConnection {
            socket: tx,
            task_handle: spawn_ws_task(ws_stream, rx, self.events.clone()),
        });

        self.notify(TransportEvent::Open);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(connection) = self.connection.take()
            && !connection.close().await
        {
            // aborted tasks cannot report their own end
            self.notify(TransportEvent::Close);
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        if let Some(connection) = &self.connection {
            connection.send(Message::Close(None)).await?;
        }
        Ok(())
    }

    async fn send(&mut self, buffer: &[u8]) -> Result<()> {
        let connection = self
            .connection
            .as_ref()
            .ok_or(DeepstreamError::NotConnected)?;

        let text = String::from_utf8(buffer.to_vec())
            .map_err(|e| DeepstreamError::SendError(format!("payload is not UTF-8: {}", e)))?;

        trace!("Sending frame: {:?}", text);
        connection.send(Message::Text(text)).await
    }
}

/// Spawn the task that owns the socket. It forwards queued frames to the
/// server and incoming frames to `events`, and reports `Close` when it ends.
fn spawn_ws_task(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut rx: mpsc::Receiver<Message>,
    events: Option<TransportEvents>,
) -> tokio::task::JoinHandle<()> {
    let (mut sink, mut stream) = ws_stream.split();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                outgoing = rx.recv() => match outgoing {
                    Some(message) => {
                        if let Err(e) = sink.send(message).await {
                            error!("Error sending message: {}", e);
                            notify(&events, TransportEvent::Error(e.to_string()));
                            break;
                        }
                    }
                    None => {
                        debug!("Connection handle dropped");
                        break;
                    }
                },

                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        trace!("Received frame: {:?}", text);
                        notify(&events, TransportEvent::Message(text.into_bytes()));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        notify(&events, TransportEvent::Message(data));
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            error!("Failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!("Server closed the connection: {:?}", frame);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        notify(&events, TransportEvent::Error(e.to_string()));
                        break;
                    }
                    None => {
                        warn!("WebSocket stream ended");
                        break;
                    }
                },
            }
        }

        notify(&events, TransportEvent::Close);
    })
}
