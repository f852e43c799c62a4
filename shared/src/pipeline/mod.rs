// Retry routing
//
// Two consumer loops share one producer bound to the exception topic:
// - main topic    -> PrimaryHandler: process, on failure wrap and republish
// - exception topic -> RetryHandler: process the wrapped record, on failure
//   rewrap and republish to the same topic
//
// There is no retry bound and no backoff.

mod handlers;
mod processor;
mod wiring;

pub use handlers::{PrimaryHandler, RetryHandler};
pub use processor::Processor;
pub use wiring::{PipelineHandles, RetryPipeline};
