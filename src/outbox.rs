use tokio::sync::{mpsc, watch};
use tracing::trace;

use crate::message::Message;
use crate::state::ConnectionState;

/// Queue from the event and presence APIs to the client
#[derive(Clone)]
pub(crate) struct Outbox {
    queue: mpsc::UnboundedSender<Message>,
    state: watch::Receiver<ConnectionState>,
}

impl Outbox {
    pub fn new(
        queue: mpsc::UnboundedSender<Message>,
        state: watch::Receiver<ConnectionState>,
    ) -> Self {
        Self { queue, state }
    }

    pub fn is_connected(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected
    }

    /// Queue the message for sending. Returns false, dropping the message,
    /// when the client is not connected.
    pub fn send(&self, message: Message) -> bool {
        if !self.is_connected() {
            trace!("Not connected, dropping {}", message);
            return false;
        }
        self.queue.send(message).is_ok()
    }
}
