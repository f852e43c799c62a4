use crate::env_parse_or;

/// Logging switches for message content
///
/// Payloads may carry business data, so raw bytes are kept out of the logs
/// unless explicitly enabled.
#[derive(Clone, Debug, Default)]
pub struct LoggingConfig {
    /// Include (truncated) raw payloads when a message fails to deserialize
    pub log_payloads: bool,
}

impl LoggingConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            log_payloads: env_parse_or("LOG_PAYLOADS", false),
        }
    }
}
