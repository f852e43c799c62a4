use std::panic::AssertUnwindSafe;

use crate::utils::panic_message;

/// Business logic applied to every record
///
/// Any `Fn(&T) -> anyhow::Result<()>` is a processor. An `Err` or a panic
/// means the record failed and is routed to the exception topic.
pub trait Processor<T>: Send + Sync + 'static {
    fn process(&self, record: &T) -> anyhow::Result<()>;
}

impl<T, F> Processor<T> for F
where
    F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn process(&self, record: &T) -> anyhow::Result<()> {
        self(record)
    }
}

/// Run `processor`, turning a panic into an error
pub(crate) fn run_processor<T, P>(processor: &P, record: &T) -> anyhow::Result<()>
where
    P: Processor<T> + ?Sized,
{
    match std::panic::catch_unwind(AssertUnwindSafe(|| processor.process(record))) {
        Ok(result) => result,
        Err(panic) => Err(anyhow::anyhow!(
            "processor panicked: {}",
            panic_message(panic.as_ref())
        )),
    }
}
