#![allow(unused, reason = "Each test binary uses a different subset of the helpers")]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use deepstream::{
    DeepstreamError, ErrorHandler, Result, TransportEvent, TransportEvents, TransportHandler,
    from_human_readable, to_human_readable,
};
use parking_lot::Mutex;

/// Server replies for one client action: `"open"` or a sent message in
/// human-readable form. Receives the current endpoint first.
pub type Script = Box<dyn FnMut(&str, &str) -> Vec<&'static str> + Send>;

struct Shared {
    events: Mutex<Option<TransportEvents>>,
    log: Mutex<Vec<String>>,
    script: Mutex<Script>,
    failing: AtomicBool,
}

impl Shared {
    fn emit(&self, event: TransportEvent) {
        if let Some(events) = self.events.lock().as_ref() {
            let _ = events.send(event);
        }
    }

    fn respond(&self, uri: &str, action: &str) {
        let replies = {
            let mut script = self.script.lock();
            (*script)(uri, action)
        };
        for reply in replies {
            self.emit(TransportEvent::Message(from_human_readable(reply)));
        }
    }
}

/// In-memory transport that answers client messages from a script and
/// records every call it receives
pub struct ScriptedTransport {
    uri: Option<String>,
    shared: Arc<Shared>,
}

/// Test-side view of a [`ScriptedTransport`] after it moved into a client
#[derive(Clone)]
pub struct ScriptHandle {
    shared: Arc<Shared>,
}

impl ScriptedTransport {
    pub fn new<F>(script: F) -> (Self, ScriptHandle)
    where
        F: FnMut(&str, &str) -> Vec<&'static str> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            events: Mutex::new(None),
            log: Mutex::new(Vec::new()),
            script: Mutex::new(Box::new(script)),
            failing: AtomicBool::new(false),
        });
        let handle = ScriptHandle {
            shared: Arc::clone(&shared),
        };
        (Self { uri: None, shared }, handle)
    }

    /// Transport whose server accepts the connection and any login
    pub fn accepting() -> (Self, ScriptHandle) {
        Self::new(handshake)
    }
}

/// Replies of a server that accepts every connection and login
pub fn handshake(_uri: &str, action: &str) -> Vec<&'static str> {
    if action == "open" {
        vec!["C|CH+"]
    } else if action.starts_with("C|CHR|") {
        vec!["C|A+"]
    } else if action.starts_with("A|REQ|") {
        vec!["A|A+"]
    } else {
        vec![]
    }
}

impl ScriptHandle {
    /// Every call the transport received, in order
    pub fn log(&self) -> Vec<String> {
        self.shared.log.lock().clone()
    }

    /// Messages the client sent since the last call
    pub fn take_sent(&self) -> Vec<String> {
        let mut log = self.shared.log.lock();
        let sent = log.iter().filter(|l| l.ends_with('+')).cloned().collect();
        log.clear();
        sent
    }

    /// Deliver a frame from the server
    pub fn push(&self, frame: &str) {
        self.shared
            .emit(TransportEvent::Message(from_human_readable(frame)));
    }

    /// Make every later send fail
    pub fn fail_sends(&self) {
        self.shared.failing.store(true, Ordering::SeqCst);
    }

    /// Drop the connection from the server side
    pub fn disconnect(&self) {
        self.shared.emit(TransportEvent::Close);
    }
}

#[async_trait]
impl TransportHandler for ScriptedTransport {
    fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    fn set_uri(&mut self, uri: &str) {
        self.uri = Some(uri.to_string());
    }

    fn attach(&mut self, events: TransportEvents) {
        *self.shared.events.lock() = Some(events);
    }

    async fn open(&mut self) -> Result<()> {
        let uri = self.uri.clone().ok_or(DeepstreamError::EmptyUri)?;
        self.shared.log.lock().push(format!("open {}", uri));
        self.shared.emit(TransportEvent::Open);
        self.shared.respond(&uri, "open");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.shared.log.lock().push("close".to_string());
        self.shared.emit(TransportEvent::Close);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.shared.log.lock().push("shutdown".to_string());
        Ok(())
    }

    async fn send(&mut self, buffer: &[u8]) -> Result<()> {
        let text = to_human_readable(buffer);
        if self.shared.failing.load(Ordering::SeqCst) {
            return Err(DeepstreamError::SendError(format!("refused {}", text)));
        }
        self.shared.log.lock().push(text.clone());
        let uri = self.uri.clone().unwrap_or_default();
        self.shared.respond(&uri, &text);
        Ok(())
    }
}

/// Error handler that remembers what it was told
#[derive(Clone, Default)]
pub struct RecordingErrorHandler {
    errors: Arc<Mutex<Vec<String>>>,
}

impl RecordingErrorHandler {
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

#[async_trait]
impl ErrorHandler for RecordingErrorHandler {
    async fn on_error(&self, err: &DeepstreamError) {
        self.errors.lock().push(err.to_string());
    }
}
