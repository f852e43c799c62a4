// Processing services
//
// Business logic run by the two consumer loops. The first pass and the retry
// pass apply the same validation; the retry pass logs at info so cycling
// records are visible.

use anyhow::{Result, ensure};
use pipeline_shared::kafka::Input;
use pipeline_shared::pipeline::Processor;
use tracing::{debug, info};

/// Validate a record taken from the main topic
pub struct ProcessingService;

impl Processor<Input> for ProcessingService {
    fn process(&self, input: &Input) -> Result<()> {
        validate(input)?;
        debug!(id = input.id, "Input processed");
        Ok(())
    }
}

/// Validate a record taken back off the exception topic
pub struct RetryProcessingService;

impl Processor<Input> for RetryProcessingService {
    fn process(&self, input: &Input) -> Result<()> {
        validate(input)?;
        info!(id = input.id, "Input processed on retry");
        Ok(())
    }
}

fn validate(input: &Input) -> Result<()> {
    ensure!(input.id > 0, "id must be positive, got {}", input.id);

    if !input.payload.is_null() {
        ensure!(
            input.payload.is_object(),
            "payload of input {} must be a JSON object",
            input.id
        );
    }
    Ok(())
}
