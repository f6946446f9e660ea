/// Failure of one step of the redesign workflow or one relay call.
///
/// Each variant carries the human-readable message that ends up in the
/// response body or on screen.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error("{0}")]
    MissingInput(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    ResourceUnavailable(String),
    #[error("{0}")]
    LocalIo(String),
}

impl StepError {
    pub fn kind(&self) -> &'static str {
        match self {
            StepError::MissingInput(_) => "missing_input",
            StepError::Upstream(_) => "upstream",
            StepError::ResourceUnavailable(_) => "resource_unavailable",
            StepError::LocalIo(_) => "local_io",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            StepError::MissingInput(message)
            | StepError::Upstream(message)
            | StepError::ResourceUnavailable(message)
            | StepError::LocalIo(message) => message,
        }
    }
}

impl From<reqwest::Error> for StepError {
    fn from(err: reqwest::Error) -> Self {
        StepError::Upstream(err.to_string())
    }
}

impl From<std::io::Error> for StepError {
    fn from(err: std::io::Error) -> Self {
        StepError::LocalIo(err.to_string())
    }
}
