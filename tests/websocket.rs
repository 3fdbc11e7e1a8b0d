use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use deepstream::{
    Client, ConnectionState, DeepstreamError, TransportEvent, TransportHandler,
    WebSocketTransport, from_human_readable, to_human_readable,
};
use futures_util::{SinkExt as _, StreamExt as _};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

fn wire(text: &str) -> String {
    String::from_utf8(from_human_readable(text)).unwrap()
}

/// Local deepstream server that accepts every connection and login.
struct MockDeepstream {
    addr: SocketAddr,
    /// Frames pushed to every connected client
    message_tx: broadcast::Sender<String>,
    /// Frames received from clients, human-readable
    received_rx: mpsc::UnboundedReceiver<String>,
}

impl MockDeepstream {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (message_tx, _) = broadcast::channel::<String>(100);
        let (received_tx, received_rx) = mpsc::unbounded_channel::<String>();
        let broadcast_tx = message_tx.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };

                let (mut write, mut read) = ws_stream.split();
                let received_tx = received_tx.clone();
                let mut msg_rx = broadcast_tx.subscribe();

                tokio::spawn(async move {
                    if write.send(Message::Text(wire("C|CH+"))).await.is_err() {
                        return;
                    }

                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                let text = match msg {
                                    Some(Ok(Message::Text(text))) => to_human_readable(text.as_bytes()),
                                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                                    Some(Ok(_)) => continue,
                                };

                                let reply = if text.starts_with("C|CHR|") {
                                    Some("C|A+")
                                } else if text.starts_with("A|REQ|") {
                                    Some("A|A|O{\"id\":7}+")
                                } else {
                                    None
                                };
                                drop(received_tx.send(text));

                                if let Some(reply) = reply
                                    && write.send(Message::Text(wire(reply))).await.is_err()
                                {
                                    break;
                                }
                            }
                            msg = msg_rx.recv() => {
                                let Ok(text) = msg else { break };
                                if write.send(Message::Text(wire(&text))).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            message_tx,
            received_rx,
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/deepstream", self.addr)
    }

    fn send(&self, frame: &str) {
        drop(self.message_tx.send(frame.to_owned()));
    }

    async fn recv(&mut self) -> Option<String> {
        timeout(Duration::from_secs(2), self.received_rx.recv())
            .await
            .ok()
            .flatten()
    }
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
    timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn transport_exchanges_frames() {
    let mut server = MockDeepstream::start().await;
    let (tx, mut events) = mpsc::unbounded_channel();

    let mut transport = WebSocketTransport::new();
    transport.set_uri(&server.ws_url());
    transport.attach(tx);
    transport.open().await.unwrap();
    assert!(transport.is_open());

    assert_eq!(next_event(&mut events).await, TransportEvent::Open);
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Message(from_human_readable("C|CH+"))
    );

    transport
        .send(&from_human_readable("E|EVT|news|Shello+"))
        .await
        .unwrap();
    assert_eq!(server.recv().await.as_deref(), Some("E|EVT|news|Shello+"));

    server.send("C|PI+");
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Message(from_human_readable("C|PI+"))
    );

    transport.close().await.unwrap();
    assert_eq!(next_event(&mut events).await, TransportEvent::Close);
    assert!(!transport.is_open());
}

#[tokio::test]
async fn transport_requires_uri() {
    let mut transport = WebSocketTransport::new();
    assert!(matches!(
        transport.open().await,
        Err(DeepstreamError::EmptyUri)
    ));
    assert!(matches!(
        transport.send(b"C|PO").await,
        Err(DeepstreamError::NotConnected)
    ));
}

#[tokio::test]
async fn transport_reports_refused_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (tx, mut events) = mpsc::unbounded_channel();
    let mut transport = WebSocketTransport::new();
    transport.set_uri(&format!("ws://{}/deepstream", addr));
    transport.attach(tx);

    assert!(matches!(
        transport.open().await,
        Err(DeepstreamError::WebSocketError(_))
    ));
    assert!(matches!(
        next_event(&mut events).await,
        TransportEvent::Error(_)
    ));
}

#[tokio::test]
async fn client_talks_to_server() {
    let mut server = MockDeepstream::start().await;
    let client = Client::with_defaults(&server.ws_url()).unwrap();

    client.connect().await.unwrap();
    let user_data = client.login_anonymous().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(user_data.as_deref(), Some(&b"O{\"id\":7}"[..]));

    assert_eq!(
        server.recv().await,
        Some(format!("C|CHR|{}+", server.ws_url()))
    );
    assert_eq!(server.recv().await.as_deref(), Some("A|REQ|{}+"));

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    client
        .event
        .subscribe("news", move |data| sink.lock().push(data.to_vec()))
        .unwrap();
    client.process_messages().await.unwrap();
    assert_eq!(server.recv().await.as_deref(), Some("E|S|news+"));

    server.send("E|EVT|news|Sbreaking+");
    timeout(Duration::from_secs(2), async {
        while received.lock().is_empty() {
            client.process_messages().await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(*received.lock(), vec![b"Sbreaking".to_vec()]);

    client.close().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
}
