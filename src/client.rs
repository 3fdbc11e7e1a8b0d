use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::config::Config;
use crate::error::{DeepstreamError, Result};
use crate::error_handler::{DefaultErrorHandler, ErrorHandler};
use crate::event::Event;
use crate::message::{Action, Message, Topic};
use crate::outbox::Outbox;
use crate::parser;
use crate::presence::Presence;
use crate::state::{ConnectionState, Sender, transition};
use crate::transport::{TransportEvent, TransportHandler};
use crate::typed;
use crate::websocket::WebSocketTransport;

/// Main deepstream client, composed of a transport and an error handler
pub struct Client {
    uri: parking_lot::Mutex<String>,
    config: Config,
    transport: Mutex<Box<dyn TransportHandler>>,
    error_handler: Arc<dyn ErrorHandler>,
    incoming: Mutex<mpsc::UnboundedReceiver<TransportEvent>>,
    pending: Mutex<VecDeque<Message>>,
    outgoing: Mutex<mpsc::UnboundedReceiver<Message>>,
    state: watch::Sender<ConnectionState>,
    /// Event publish/subscribe API
    pub event: Event,
    /// Presence API
    pub presence: Presence,
}

impl Client {
    /// Create a client for `uri`. No I/O happens until [`Client::connect`].
    pub fn new<T, E>(uri: &str, transport: T, error_handler: E) -> Result<Self>
    where
        T: TransportHandler + 'static,
        E: ErrorHandler + 'static,
    {
        if uri.is_empty() {
            return Err(DeepstreamError::EmptyUri);
        }
        Url::parse(uri)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut transport: Box<dyn TransportHandler> = Box::new(transport);
        transport.set_uri(uri);
        transport.attach(events_tx);

        let (state_tx, state_rx) = watch::channel(ConnectionState::AwaitConnection);
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let outbox = Outbox::new(outbox_tx, state_rx);
        let ids = Arc::new(AtomicU64::new(0));

        Ok(Self {
            uri: parking_lot::Mutex::new(uri.to_string()),
            config: Config::default(),
            transport: Mutex::new(transport),
            error_handler: Arc::new(error_handler),
            incoming: Mutex::new(events_rx),
            pending: Mutex::new(VecDeque::new()),
            outgoing: Mutex::new(outbox_rx),
            state: state_tx,
            event: Event::new(outbox.clone(), Arc::clone(&ids)),
            presence: Presence::new(outbox, ids),
        })
    }

    /// Create a client using [`WebSocketTransport`] and [`DefaultErrorHandler`]
    pub fn with_defaults(uri: &str) -> Result<Self> {
        Self::new(uri, WebSocketTransport::new(), DefaultErrorHandler)
    }

    /// Set client configuration
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current connection target; changes when the server redirects
    pub fn uri(&self) -> String {
        self.uri.lock().clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Open the transport and complete the connection handshake.
    ///
    /// On success the client awaits authentication.
    ///
    /// A disconnected client may connect again; it starts over at its
    /// current URI and replays subscriptions once logged in.
    pub async fn connect(&self) -> Result<()> {
        let state = self.state();
        match state {
            ConnectionState::AwaitConnection => {}
            ConnectionState::Disconnected => {
                self.discard_incoming().await;
                self.set_state(ConnectionState::AwaitConnection);
            }
            _ => {
                return Err(DeepstreamError::InvalidState {
                    operation: "connect",
                    state,
                });
            }
        }

        let result = self.handshake().await;
        if result.is_err() {
            self.abandon().await;
        }
        result
    }

    async fn handshake(&self) -> Result<()> {
        let mut redirections = 0;
        loop {
            let uri = self.uri();
            debug!("Opening transport to {}", uri);
            self.transport.lock().await.open().await?;

            self.await_reply().await?;
            if self.state() != ConnectionState::Challenging {
                return Err(self.unexpected_state("connect").await);
            }

            self.send(
                &Message::new(Topic::Connection, Action::ChallengeResponse)
                    .with_argument(uri.as_bytes()),
            )
            .await?;

            let reply = self.await_reply().await?;
            match self.state() {
                ConnectionState::AwaitAuthentication => {
                    info!("Connected to {}, awaiting authentication", uri);
                    return Ok(());
                }
                ConnectionState::AwaitConnection => {
                    redirections += 1;
                    if redirections >= self.config.max_redirections {
                        self.close_transport().await;
                        self.set_state(ConnectionState::Disconnected);
                        let err =
                            DeepstreamError::TooManyRedirections(self.config.max_redirections);
                        self.report(&err).await;
                        return Err(err);
                    }

                    let target = reply
                        .argument(0)
                        .map(|a| String::from_utf8_lossy(a).into_owned())
                        .unwrap_or_default();
                    Url::parse(&target)?;
                    info!("Redirected from {} to {}", uri, target);

                    self.close_transport().await;
                    self.transport.lock().await.set_uri(&target);
                    *self.uri.lock() = target;
                }
                ConnectionState::Disconnected => {
                    let err = DeepstreamError::ConnectionRejected;
                    self.report(&err).await;
                    return Err(err);
                }
                _ => return Err(self.unexpected_state("connect").await),
            }
        }
    }

    /// Log in with the given authentication data, usually a JSON object.
    ///
    /// Returns the user data the server sent with its acknowledgement.
    pub async fn login(&self, auth: &str) -> Result<Option<Vec<u8>>> {
        let state = self.state();
        if state != ConnectionState::AwaitAuthentication {
            return Err(DeepstreamError::InvalidState {
                operation: "login",
                state,
            });
        }

        let result = self.authenticate(auth).await;
        // rejected credentials leave the connection usable for another attempt
        if let Err(e) = &result
            && !matches!(e, DeepstreamError::AuthenticationFailed(_))
        {
            self.abandon().await;
        }
        result
    }

    async fn authenticate(&self, auth: &str) -> Result<Option<Vec<u8>>> {
        self.send(&Message::new(Topic::Auth, Action::Request).with_argument(auth))
            .await?;

        let reply = self.await_reply().await?;
        match self.state() {
            ConnectionState::Connected => {
                info!("Logged in");
                self.flush_outbox().await?;
                Ok(reply.argument(0).map(<[u8]>::to_vec))
            }
            ConnectionState::AwaitAuthentication | ConnectionState::Disconnected => {
                let reason = reply
                    .argument(0)
                    .and_then(|a| typed::decode_value(a).ok())
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_else(|| reply.header().to_string());
                let err = DeepstreamError::AuthenticationFailed(reason);
                self.report(&err).await;
                Err(err)
            }
            _ => Err(self.unexpected_state("login").await),
        }
    }

    /// Log in without credentials.
    pub async fn login_anonymous(&self) -> Result<Option<Vec<u8>>> {
        self.login("{}").await
    }

    /// Handle every message that has arrived so far, then send what the
    /// event and presence APIs queued. Never waits for new messages.
    pub async fn process_messages(&self) -> Result<()> {
        while let Some(message) = self.next_message(false).await? {
            self.handle_message(message).await?;
        }
        self.flush_outbox().await
    }

    /// Close the connection.
    pub async fn close(&self) -> Result<()> {
        info!("Closing connection to {}", self.uri());
        let result = self.transport.lock().await.close().await;
        self.set_state(ConnectionState::Disconnected);
        self.discard_incoming().await;
        result
    }

    /// Validate the message against the state machine and send it.
    async fn send(&self, message: &Message) -> Result<()> {
        let state = self.state();
        let next = transition(state, message, Sender::Client);
        if next == ConnectionState::Error {
            return Err(DeepstreamError::InvalidStateTransition {
                state,
                header: message.header().to_string(),
            });
        }

        trace!("Sending {}", message);
        self.transport.lock().await.send(&message.to_bytes()).await?;
        self.set_state(next);
        Ok(())
    }

    async fn flush_outbox(&self) -> Result<()> {
        loop {
            let next = self.outgoing.lock().await.try_recv();
            let Ok(message) = next else {
                return Ok(());
            };
            if let Err(e) = self.send(&message).await {
                error!("Failed to send {}: {}", message, e);
                self.report(&e).await;
                return Err(e);
            }
        }
    }

    /// Wait for the next server message that is not a heartbeat and apply it.
    async fn await_reply(&self) -> Result<Message> {
        loop {
            let Some(message) = self.next_message(true).await? else {
                return Err(DeepstreamError::Timeout);
            };
            let is_ping =
                message.topic() == Topic::Connection && message.action() == Action::Ping;
            self.handle_message(message.clone()).await?;
            if !is_ping {
                return Ok(message);
            }
        }
    }

    /// Next parsed server message. With `wait`, blocks up to the receive
    /// timeout; otherwise returns `None` as soon as nothing is buffered.
    async fn next_message(&self, wait: bool) -> Result<Option<Message>> {
        loop {
            if let Some(message) = self.pending.lock().await.pop_front() {
                return Ok(Some(message));
            }

            let received = {
                let mut incoming = self.incoming.lock().await;
                if wait {
                    tokio::time::timeout(self.config.receive_timeout, incoming.recv())
                        .await
                        .ok()
                } else {
                    Some(incoming.try_recv().ok())
                }
            };

            let Some(event) = received else {
                let err = DeepstreamError::Timeout;
                self.report(&err).await;
                return Err(err);
            };
            let Some(event) = event else {
                return Ok(None);
            };

            match event {
                TransportEvent::Open => debug!("Transport open"),
                TransportEvent::Message(frame) => self.receive_frame(&frame).await?,
                TransportEvent::Error(reason) => {
                    let err = DeepstreamError::TransportError(reason);
                    self.report(&err).await;
                    return Err(err);
                }
                TransportEvent::Close => {
                    if self.state() == ConnectionState::Disconnected {
                        debug!("Transport closed");
                        continue;
                    }
                    warn!("Transport closed unexpectedly");
                    self.set_state(ConnectionState::Disconnected);
                    let err = DeepstreamError::SuddenDisconnect;
                    self.report(&err).await;
                    return Err(err);
                }
            }
        }
    }

    async fn receive_frame(&self, frame: &[u8]) -> Result<()> {
        let (messages, errors) = parser::parse(frame);

        if let Some(first) = errors.first().cloned() {
            for err in errors {
                error!("Failed to parse frame: {}", err);
                self.report(&DeepstreamError::ParseError(err)).await;
            }
            self.close_transport().await;
            self.set_state(ConnectionState::Disconnected);
            return Err(first.into());
        }

        self.pending.lock().await.extend(messages);
        Ok(())
    }

    /// Apply a server message to the state machine and route it.
    async fn handle_message(&self, message: Message) -> Result<()> {
        let state = self.state();
        let next = transition(state, &message, Sender::Server);

        if next == ConnectionState::Error {
            error!("Invalid state transition from {} on {}", state, message);
            self.close_transport().await;
            self.set_state(ConnectionState::Disconnected);
            let err = DeepstreamError::InvalidStateTransition {
                state,
                header: message.header().to_string(),
            };
            self.report(&err).await;
            return Err(err);
        }

        self.set_state(next);

        if next == ConnectionState::Disconnected {
            self.close_transport().await;
            return Ok(());
        }

        match message.topic() {
            Topic::Connection if message.action() == Action::Ping => {
                self.send(&Message::new(Topic::Connection, Action::Pong))
                    .await?;
            }
            Topic::Event => self.event.notify(&message),
            Topic::Presence => self.presence.notify(&message),
            Topic::Auth | Topic::Connection => {}
            _ => warn!("Unhandled message: {}", message),
        }
        Ok(())
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous == next {
            return;
        }

        debug!("Connection state changed: {} -> {}", previous, next);
        if next == ConnectionState::Connected {
            self.event.on_connected();
            self.presence.on_connected();
        }
    }

    async fn unexpected_state(&self, operation: &'static str) -> DeepstreamError {
        let err = DeepstreamError::InvalidState {
            operation,
            state: self.state(),
        };
        self.close_transport().await;
        self.set_state(ConnectionState::Disconnected);
        self.report(&err).await;
        err
    }

    /// End a handshake or login that failed midway.
    async fn abandon(&self) {
        if self.state() == ConnectionState::Disconnected {
            return;
        }
        warn!("Abandoning connection to {} in state {}", self.uri(), self.state());
        self.close_transport().await;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Close the transport after a protocol-level end of the connection and
    /// drop whatever it reported meanwhile.
    async fn close_transport(&self) {
        if let Err(e) = self.transport.lock().await.close().await {
            warn!("Error closing transport: {}", e);
        }
        self.discard_incoming().await;
    }

    async fn discard_incoming(&self) {
        self.pending.lock().await.clear();
        let mut incoming = self.incoming.lock().await;
        while let Ok(event) = incoming.try_recv() {
            trace!("Discarding {:?}", event);
        }
    }

    async fn report(&self, err: &DeepstreamError) {
        self.error_handler.on_error(err).await;
    }
}
