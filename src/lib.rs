// src/lib.rs

mod client;
mod config;
mod connection;
mod error;
mod error_handler;
mod event;
mod message;
mod outbox;
mod parser;
mod presence;
mod state;
mod transport;
pub mod typed;
mod version;
mod websocket;

pub use client::Client;
pub use config::Config;
pub use error::{DeepstreamError, Result};
pub use error_handler::{DefaultErrorHandler, ErrorHandler};
pub use event::{Event, SubscriptionId};
pub use message::{
    Action, Header, Message, RECORD_SEPARATOR, Topic, UNIT_SEPARATOR, from_human_readable,
    to_human_readable,
};
pub use parser::{ErrorTag, ParseError, parse};
pub use presence::Presence;
pub use state::{ConnectionState, Sender, transition};
pub use transport::{TransportEvent, TransportEvents, TransportHandler};
pub use version::{
    VERSION, VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH, check_version, version_to_string,
};
pub use websocket::WebSocketTransport;
