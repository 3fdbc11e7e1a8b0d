use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Something that happened on a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is open and ready to send
    Open,
    /// A complete frame arrived from the server
    Message(Vec<u8>),
    /// The transport failed; the string describes the failure
    Error(String),
    /// The connection is closed
    Close,
}

/// Channel through which a transport reports [`TransportEvent`]s to the client
pub type TransportEvents = mpsc::UnboundedSender<TransportEvent>;

/// Pluggable connection used by the [`Client`](crate::Client)
///
/// The client sets the endpoint, attaches its event channel and then drives
/// the lifecycle hooks. Incoming data is reported through the attached
/// channel rather than returned from any hook.
#[async_trait]
pub trait TransportHandler: Send + Sync {
    /// The endpoint, or `None` if none was set yet
    fn uri(&self) -> Option<&str>;

    /// Replace the endpoint
    fn set_uri(&mut self, uri: &str);

    /// Hand the transport the channel it reports events on
    fn attach(&mut self, _events: TransportEvents) {}

    /// Connect to the current endpoint
    async fn open(&mut self) -> Result<()>;

    /// Close the connection
    async fn close(&mut self) -> Result<()>;

    /// Close, then open again
    async fn reconnect(&mut self) -> Result<()> {
        self.close().await?;
        self.open().await
    }

    /// Stop sending while letting the peer finish
    async fn shutdown(&mut self) -> Result<()>;

    /// Send the buffer as a single text frame
    async fn send(&mut self, buffer: &[u8]) -> Result<()>;
}
