use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_REDIRECTIONS: u32 = 3;
const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Client behavior settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Redirections followed during the handshake before giving up
    pub max_redirections: u32,
    /// How long `connect` and `login` wait for each server reply
    #[serde(rename = "receive_timeout_ms", with = "millis")]
    pub receive_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_redirections: DEFAULT_MAX_REDIRECTIONS,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
        }
    }
}

impl Config {
    pub fn with_max_redirections(mut self, max_redirections: u32) -> Self {
        self.max_redirections = max_redirections;
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
