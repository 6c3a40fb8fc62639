pub mod email_body;
pub mod letter;
pub mod mailer;
pub mod normalizer;
pub mod orchestrator;
pub mod pdf;
pub mod send_tracker;
pub mod site_prober;

pub use email_body::*;
pub use letter::*;
pub use mailer::*;
pub use normalizer::*;
pub use orchestrator::*;
pub use pdf::*;
pub use send_tracker::*;
pub use site_prober::*;

use std::path::PathBuf;

/// Errors a pipeline run surfaces to the caller. Everything recoverable is
/// logged and absorbed inside the pipelines instead.
#[derive(Debug)]
pub enum RunError {
    InputNotFound(PathBuf),
    Csv(csv::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::InputNotFound(path) => {
                write!(f, "Input file {} not found", path.display())
            }
            RunError::Csv(e) => write!(f, "CSV error: {}", e),
            RunError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::InputNotFound(_) => None,
            RunError::Csv(e) => Some(e),
            RunError::Io(e) => Some(e),
        }
    }
}

impl From<csv::Error> for RunError {
    fn from(e: csv::Error) -> Self {
        RunError::Csv(e)
    }
}

impl From<std::io::Error> for RunError {
    fn from(e: std::io::Error) -> Self {
        RunError::Io(e)
    }
}
