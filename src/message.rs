use std::fmt;

/// Terminates every message on the wire (`+` in human-readable form)
pub const RECORD_SEPARATOR: u8 = 30;

/// Separates the fields of a message (`|` in human-readable form)
pub const UNIT_SEPARATOR: u8 = 31;

/// Message topic, the first header field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Auth,
    Connection,
    Error,
    Event,
    Presence,
    Record,
    Rpc,
}

impl Topic {
    pub fn code(self) -> &'static str {
        match self {
            Topic::Auth => "A",
            Topic::Connection => "C",
            Topic::Error => "X",
            Topic::Event => "E",
            Topic::Presence => "U",
            Topic::Record => "R",
            Topic::Rpc => "P",
        }
    }
}

/// Message action, the last header field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Challenge,
    ChallengeResponse,
    CreateOrRead,
    ErrorInvalidAuthData,
    ErrorInvalidAuthMsg,
    ErrorTooManyAuthAttempts,
    Event,
    Listen,
    ListenAccept,
    ListenReject,
    Ping,
    Pong,
    PresenceJoin,
    PresenceLeave,
    Query,
    Redirect,
    Reject,
    Request,
    Subscribe,
    SubscriptionForPatternFound,
    SubscriptionForPatternRemoved,
    Unlisten,
    Unsubscribe,
}

impl Action {
    pub fn code(self) -> &'static str {
        match self {
            Action::Challenge => "CH",
            Action::ChallengeResponse => "CHR",
            Action::CreateOrRead => "CR",
            Action::ErrorInvalidAuthData => "E|INVALID_AUTH_DATA",
            Action::ErrorInvalidAuthMsg => "E|INVALID_AUTH_MSG",
            Action::ErrorTooManyAuthAttempts => "E|TOO_MANY_AUTH_ATTEMPTS",
            Action::Event => "EVT",
            Action::Listen => "L",
            Action::ListenAccept => "LA",
            Action::ListenReject => "LR",
            Action::Ping => "PI",
            Action::Pong => "PO",
            Action::PresenceJoin => "PNJ",
            Action::PresenceLeave => "PNL",
            Action::Query => "Q",
            Action::Redirect => "RED",
            Action::Reject => "REJ",
            Action::Request => "REQ",
            Action::Subscribe => "S",
            Action::SubscriptionForPatternFound => "SP",
            Action::SubscriptionForPatternRemoved => "SR",
            Action::Unlisten => "UL",
            Action::Unsubscribe => "US",
        }
    }
}

/// Topic, action and acknowledgement flag of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Header {
    pub topic: Topic,
    pub action: Action,
    pub is_ack: bool,
}

struct HeaderEntry {
    header: Header,
    text: &'static str,
    min_args: usize,
    max_args: usize,
}

const fn entry(
    topic: Topic,
    action: Action,
    is_ack: bool,
    text: &'static str,
    min_args: usize,
    max_args: usize,
) -> HeaderEntry {
    HeaderEntry {
        header: Header {
            topic,
            action,
            is_ack,
        },
        text,
        min_args,
        max_args,
    }
}

// Every header the client understands, with its argument bounds.
const HEADERS: &[HeaderEntry] = &[
    entry(Topic::Auth, Action::Request, false, "A|REQ", 1, 1),
    entry(Topic::Auth, Action::Request, true, "A|A", 0, 1),
    entry(Topic::Auth, Action::ErrorInvalidAuthData, false, "A|E|INVALID_AUTH_DATA", 0, 1),
    entry(Topic::Auth, Action::ErrorInvalidAuthMsg, false, "A|E|INVALID_AUTH_MSG", 0, 1),
    entry(Topic::Auth, Action::ErrorTooManyAuthAttempts, false, "A|E|TOO_MANY_AUTH_ATTEMPTS", 0, 1),
    entry(Topic::Connection, Action::Challenge, false, "C|CH", 0, 0),
    entry(Topic::Connection, Action::ChallengeResponse, false, "C|CHR", 1, 1),
    entry(Topic::Connection, Action::ChallengeResponse, true, "C|A", 0, 0),
    entry(Topic::Connection, Action::Redirect, false, "C|RED", 1, 1),
    entry(Topic::Connection, Action::Reject, false, "C|REJ", 0, 0),
    entry(Topic::Connection, Action::Ping, false, "C|PI", 0, 0),
    entry(Topic::Connection, Action::Pong, false, "C|PO", 0, 0),
    entry(Topic::Event, Action::Event, false, "E|EVT", 2, 2),
    entry(Topic::Event, Action::Subscribe, false, "E|S", 1, 1),
    entry(Topic::Event, Action::Subscribe, true, "E|A|S", 1, 1),
    entry(Topic::Event, Action::Unsubscribe, false, "E|US", 1, 1),
    entry(Topic::Event, Action::Unsubscribe, true, "E|A|US", 1, 1),
    entry(Topic::Event, Action::Listen, false, "E|L", 1, 1),
    entry(Topic::Event, Action::Listen, true, "E|A|L", 1, 1),
    entry(Topic::Event, Action::Unlisten, false, "E|UL", 1, 1),
    entry(Topic::Event, Action::Unlisten, true, "E|A|UL", 1, 1),
    entry(Topic::Event, Action::ListenAccept, false, "E|LA", 2, 2),
    entry(Topic::Event, Action::ListenReject, false, "E|LR", 2, 2),
    entry(Topic::Event, Action::SubscriptionForPatternFound, false, "E|SP", 2, 2),
    entry(Topic::Event, Action::SubscriptionForPatternRemoved, false, "E|SR", 2, 2),
    entry(Topic::Presence, Action::Subscribe, false, "U|S", 0, 0),
    entry(Topic::Presence, Action::Subscribe, true, "U|A|S", 0, 1),
    entry(Topic::Presence, Action::Unsubscribe, false, "U|US", 0, 0),
    entry(Topic::Presence, Action::Unsubscribe, true, "U|A|US", 0, 1),
    entry(Topic::Presence, Action::PresenceJoin, false, "U|PNJ", 1, 1),
    entry(Topic::Presence, Action::PresenceLeave, false, "U|PNL", 1, 1),
    entry(Topic::Presence, Action::Query, false, "U|Q", 0, usize::MAX),
];

impl Header {
    pub const fn new(topic: Topic, action: Action) -> Self {
        Self {
            topic,
            action,
            is_ack: false,
        }
    }

    pub const fn ack(topic: Topic, action: Action) -> Self {
        Self {
            topic,
            action,
            is_ack: true,
        }
    }

    /// All headers known to the codec
    pub fn all() -> impl Iterator<Item = Header> {
        HEADERS.iter().map(|s| s.header)
    }

    fn lookup(&self) -> Option<&'static HeaderEntry> {
        HEADERS.iter().find(|s| s.header == *self)
    }

    /// Inclusive bounds on the argument count, `None` for unknown headers
    pub fn num_arguments(&self) -> Option<(usize, usize)> {
        self.lookup().map(|s| (s.min_args, s.max_args))
    }

    pub fn is_known(&self) -> bool {
        self.lookup().is_some()
    }

    /// Header bytes as they appear on the wire, without a trailing separator
    pub fn to_bytes(&self) -> Vec<u8> {
        from_human_readable(&self.to_string())
    }

    /// Find the longest known header that prefixes the given fields.
    /// Returns the header and the number of fields it occupies.
    pub(crate) fn match_fields(fields: &[&[u8]]) -> Option<(Header, usize)> {
        HEADERS
            .iter()
            .filter_map(|s| {
                let parts: Vec<&str> = s.text.split('|').collect();
                let n = parts.len();
                let matches = fields.len() >= n
                    && parts
                        .iter()
                        .zip(fields.iter())
                        .all(|(p, f)| p.as_bytes() == *f);
                matches.then_some((s.header, n))
            })
            .max_by_key(|(_, n)| *n)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lookup() {
            Some(s) => f.write_str(s.text),
            None if self.is_ack => write!(f, "{}|A|{}", self.topic.code(), self.action.code()),
            None => write!(f, "{}|{}", self.topic.code(), self.action.code()),
        }
    }
}

/// A deepstream message: a header followed by byte-string arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    header: Header,
    arguments: Vec<Vec<u8>>,
}

impl Message {
    pub fn new(topic: Topic, action: Action) -> Self {
        Self::from_header(Header::new(topic, action))
    }

    pub fn ack(topic: Topic, action: Action) -> Self {
        Self::from_header(Header::ack(topic, action))
    }

    pub fn from_header(header: Header) -> Self {
        Self {
            header,
            arguments: Vec::new(),
        }
    }

    pub fn with_argument(mut self, argument: impl Into<Vec<u8>>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    pub fn add_argument(&mut self, argument: impl Into<Vec<u8>>) {
        self.arguments.push(argument.into());
    }

    pub fn header(&self) -> Header {
        self.header
    }

    pub fn topic(&self) -> Topic {
        self.header.topic
    }

    pub fn action(&self) -> Action {
        self.header.action
    }

    pub fn is_ack(&self) -> bool {
        self.header.is_ack
    }

    pub fn num_arguments(&self) -> usize {
        self.arguments.len()
    }

    pub fn argument(&self, index: usize) -> Option<&[u8]> {
        self.arguments.get(index).map(Vec::as_slice)
    }

    pub fn arguments(&self) -> &[Vec<u8>] {
        &self.arguments
    }

    /// Serialized message including the trailing record separator
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.header.to_bytes();
        for argument in &self.arguments {
            bytes.push(UNIT_SEPARATOR);
            bytes.extend_from_slice(argument);
        }
        bytes.push(RECORD_SEPARATOR);
        bytes
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_human_readable(&self.to_bytes()))
    }
}

/// Convert `E|S|event+` notation into wire bytes.
pub fn from_human_readable(text: &str) -> Vec<u8> {
    text.bytes()
        .map(|b| match b {
            b'|' => UNIT_SEPARATOR,
            b'+' => RECORD_SEPARATOR,
            other => other,
        })
        .collect()
}

/// Convert wire bytes into `E|S|event+` notation.
pub fn to_human_readable(bytes: &[u8]) -> String {
    let text: Vec<u8> = bytes
        .iter()
        .map(|&b| match b {
            UNIT_SEPARATOR => b'|',
            RECORD_SEPARATOR => b'+',
            other => other,
        })
        .collect();
    String::from_utf8_lossy(&text).into_owned()
}
