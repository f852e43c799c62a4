pub mod kafka;
pub mod pipeline;
pub mod utils;

pub use pipeline_config as config;
pub use pipeline_error as error;
