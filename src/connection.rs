use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::warn;

use crate::error::DeepstreamError;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the task that owns an open WebSocket
pub(crate) struct WebSocketConnection {
    pub socket: mpsc::Sender<Message>,
    pub task_handle: JoinHandle<()>,
}

impl WebSocketConnection {
    pub async fn send(&self, message: Message) -> Result<(), DeepstreamError> {
        self.socket
            .send(message)
            .await
            .map_err(|e| DeepstreamError::SendError(e.to_string()))
    }

    /// True once the socket task has stopped
    pub fn is_closed(&self) -> bool {
        self.socket.is_closed()
    }

    /// Send a close frame and wait for the socket task to finish.
    /// Returns false if the task had to be aborted.
    pub async fn close(self) -> bool {
        if let Err(e) = self.send(Message::Close(None)).await {
            warn!("Error sending close frame: {}", e);
        }

        let Self {
            socket,
            mut task_handle,
        } = self;
        drop(socket);

        match tokio::time::timeout(CLOSE_TIMEOUT, &mut task_handle).await {
            Ok(_) => true,
            Err(_) => {
                warn!("WebSocket task did not stop within {:?}", CLOSE_TIMEOUT);
                task_handle.abort();
                false
            }
        }
    }
}
