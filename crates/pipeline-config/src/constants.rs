// ============================================================================
// Configuration Constants
// ============================================================================

// Broker and topology defaults
pub(crate) const DEFAULT_BROKERS: &str = "localhost:9092";
pub(crate) const DEFAULT_TOPIC: &str = "input";
pub(crate) const DEFAULT_GROUP_ID: &str = "input-processors";
pub(crate) const DEFAULT_EXCEPTION_TOPIC: &str = "input-exceptions";
pub(crate) const DEFAULT_EXCEPTION_GROUP_ID: &str = "input-retry-processors";

// Producer defaults
pub(crate) const DEFAULT_PRODUCER_COMPRESSION: &str = "snappy";
pub(crate) const DEFAULT_PRODUCER_ACKS: &str = "all";
pub(crate) const DEFAULT_PRODUCER_LINGER_MS: u32 = 10;
pub(crate) const DEFAULT_PRODUCER_BATCH_SIZE: u32 = 16384;
pub(crate) const DEFAULT_PRODUCER_MAX_IN_FLIGHT: u32 = 5;
pub(crate) const DEFAULT_PRODUCER_RETRIES: u32 = 2147483647;
pub(crate) const DEFAULT_PRODUCER_REQUEST_TIMEOUT_MS: u32 = 30000;
pub(crate) const DEFAULT_PRODUCER_DELIVERY_TIMEOUT_MS: u32 = 120000;
pub(crate) const DEFAULT_PRODUCER_SEND_TIMEOUT_MS: u64 = 5000;

// Consumer defaults
pub(crate) const DEFAULT_AUTO_OFFSET_RESET: &str = "earliest";
pub(crate) const DEFAULT_SESSION_TIMEOUT_MS: u32 = 30000;
pub(crate) const DEFAULT_HEARTBEAT_INTERVAL_MS: u32 = 3000;
pub(crate) const DEFAULT_MAX_POLL_INTERVAL_MS: u32 = 300000;
// Pause after a transport error so an unreachable broker does not spin the loop
pub(crate) const DEFAULT_ERROR_PAUSE_MS: u64 = 1000;

// Worker defaults
pub(crate) const DEFAULT_METRICS_LOG_INTERVAL_SECS: u64 = 30;
pub(crate) const DEFAULT_SHUTDOWN_FLUSH_TIMEOUT_SECS: u64 = 10;
