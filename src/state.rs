use std::fmt;

use serde::{Deserialize, Serialize};

use crate::message::{Action, Message, Topic};

/// Connection states of a deepstream 2.x client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Error,
    AwaitConnection,
    Challenging,
    ChallengingWait,
    AwaitAuthentication,
    Authenticating,
    Connected,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Error => "ERROR",
            ConnectionState::AwaitConnection => "AWAIT_CONNECTION",
            ConnectionState::Challenging => "CHALLENGING",
            ConnectionState::ChallengingWait => "CHALLENGING_WAIT",
            ConnectionState::AwaitAuthentication => "AWAIT_AUTHENTICATION",
            ConnectionState::Authenticating => "AUTHENTICATING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Disconnected => "DISCONNECTED",
        };
        f.write_str(name)
    }
}

/// Origin of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    Client,
    Server,
}

/// Next state of the connection after `message` was sent by `sender`.
///
/// Returns [`ConnectionState::Error`] for any message the protocol does not
/// allow in the current state. `Error` and `Disconnected` are terminal.
pub fn transition(state: ConnectionState, message: &Message, sender: Sender) -> ConnectionState {
    use ConnectionState::*;

    if matches!(state, Error | Disconnected) {
        return Error;
    }

    let topic = message.topic();
    let action = message.action();
    let is_ack = message.is_ack();

    // deepstream heartbeats, independent of websocket ping frames
    if topic == Topic::Connection && !is_ack {
        match (action, sender) {
            (Action::Ping, Sender::Server) | (Action::Pong, Sender::Client) => return state,
            _ => {}
        }
    }

    match (state, topic, action, is_ack, sender) {
        (AwaitConnection, Topic::Connection, Action::Challenge, false, Sender::Server) => {
            Challenging
        }
        (Challenging, Topic::Connection, Action::ChallengeResponse, false, Sender::Client) => {
            ChallengingWait
        }
        (ChallengingWait, Topic::Connection, Action::ChallengeResponse, true, Sender::Server) => {
            AwaitAuthentication
        }
        (ChallengingWait, Topic::Connection, Action::Redirect, false, Sender::Server) => {
            AwaitConnection
        }
        (ChallengingWait, Topic::Connection, Action::Reject, false, Sender::Server) => {
            Disconnected
        }
        (AwaitAuthentication, Topic::Auth, Action::Request, false, Sender::Client) => {
            Authenticating
        }
        (Authenticating, Topic::Auth, Action::Request, true, Sender::Server) => Connected,
        (Authenticating, Topic::Auth, Action::ErrorTooManyAuthAttempts, false, Sender::Server)
        | (Authenticating, Topic::Auth, Action::ErrorInvalidAuthMsg, false, Sender::Server) => {
            Disconnected
        }
        (Authenticating, Topic::Auth, Action::ErrorInvalidAuthData, false, Sender::Server) => {
            AwaitAuthentication
        }
        (Connected, ..) => Connected,
        _ => Error,
    }
}
