//! Output formatting for CLI.

mod json;
mod text;

pub use json::{
    CheckpointsOutput, EndpointOutput, JsonFormatter, NamesOutput, RunOutput, StatusOutput,
};
pub use text::TextFormatter;
