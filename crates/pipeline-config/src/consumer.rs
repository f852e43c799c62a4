// ============================================================================
// Consumer Loop Configuration
// ============================================================================

use crate::constants::*;
use crate::{env_or, env_parse_or};
use std::time::Duration;

/// Settings shared by every consumer loop in the process
#[derive(Clone, Debug)]
pub struct ConsumerConfig {
    /// Where a new consumer group starts reading ("earliest" | "latest")
    pub auto_offset_reset: String,
    pub session_timeout_ms: u32,
    pub heartbeat_interval_ms: u32,
    /// Upper bound on a single handler invocation before the broker evicts the member
    pub max_poll_interval_ms: u32,
    /// Pause after a transport error before the next receive attempt
    pub error_pause_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            auto_offset_reset: DEFAULT_AUTO_OFFSET_RESET.to_string(),
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            max_poll_interval_ms: DEFAULT_MAX_POLL_INTERVAL_MS,
            error_pause_ms: DEFAULT_ERROR_PAUSE_MS,
        }
    }
}

impl ConsumerConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            auto_offset_reset: env_or("KAFKA_AUTO_OFFSET_RESET", DEFAULT_AUTO_OFFSET_RESET),
            session_timeout_ms: env_parse_or(
                "KAFKA_CONSUMER_SESSION_TIMEOUT_MS",
                DEFAULT_SESSION_TIMEOUT_MS,
            ),
            heartbeat_interval_ms: env_parse_or(
                "KAFKA_CONSUMER_HEARTBEAT_INTERVAL_MS",
                DEFAULT_HEARTBEAT_INTERVAL_MS,
            ),
            max_poll_interval_ms: env_parse_or(
                "KAFKA_CONSUMER_MAX_POLL_INTERVAL_MS",
                DEFAULT_MAX_POLL_INTERVAL_MS,
            ),
            error_pause_ms: env_parse_or("KAFKA_CONSUMER_ERROR_PAUSE_MS", DEFAULT_ERROR_PAUSE_MS),
        }
    }

    pub fn error_pause(&self) -> Duration {
        Duration::from_millis(self.error_pause_ms)
    }
}
