use thiserror::Error;

// Top-level error returned by the director. Only initialization and content-authoring
// defects reach this type; per-message advisor and image failures are recovered locally.
#[derive(Debug, Error)]
pub enum DirectorError {
    #[error("Data load error: {0}")]
    DataLoad(#[from] DataLoadError),

    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    #[error("Selection error: {0}")]
    Selection(#[from] SelectionError),

    #[error("Director not initialized")]
    NotInitialized,
}

// Failures while loading the content catalog. Fatal to initialization.
#[derive(Debug, Error)]
pub enum DataLoadError {
    /// Every resource that failed, each with its own cause.
    #[error("Failed to load: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Failed(Vec<DataLoadError>),

    #[error("Failed to fetch {resource}: {source}")]
    Fetch {
        resource: String,
        #[source]
        source: FetchError,
    },

    #[error("Invalid JSON structure in {0}")]
    InvalidStructure(String),

    #[error("Malformed {resource}: {reason}")]
    Malformed { resource: String, reason: String },

    #[error("Stages data not loaded")]
    StagesMissing,
}

impl DataLoadError {
    /// The resource a single failure is about.
    pub fn resource(&self) -> Option<&str> {
        match self {
            DataLoadError::Fetch { resource, .. } | DataLoadError::Malformed { resource, .. } => {
                Some(resource)
            }
            DataLoadError::InvalidStructure(resource) => Some(resource),
            DataLoadError::Failed(_) | DataLoadError::StagesMissing => None,
        }
    }

    /// Names of all failed resources, in catalog order.
    pub fn failed_resources(&self) -> Vec<&str> {
        match self {
            DataLoadError::Failed(failures) => {
                failures.iter().filter_map(DataLoadError::resource).collect()
            }
            other => other.resource().into_iter().collect(),
        }
    }
}

// Transport-level failures of a content source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error! status: {0}")]
    Status(u16),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

// Errors related to the Narrative Advisor. Always recovered with a fallback value.
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("OpenAI API error: {0}")]
    OpenAI(#[from] async_openai::error::OpenAIError),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Empty completion")]
    EmptyCompletion,

    #[error("No JSON found in response")]
    NoStructuredData,

    #[error("Invalid JSON structure: {0}")]
    MalformedResponse(String),
}

impl From<serde_json::Error> for AdvisorError {
    fn from(err: serde_json::Error) -> AdvisorError {
        AdvisorError::MalformedResponse(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ImageFetchError {
    #[error("Failed to fetch image from GitHub: {0}")]
    Fetch(#[from] FetchError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StageError {
    #[error("Stage index {index} out of range for {len} stages")]
    OutOfRange { index: usize, len: usize },

    #[error("Unknown stage number {0}")]
    UnknownStage(u32),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("No candidate images to select from")]
    NoCandidates,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = DirectorError> = std::result::Result<T, E>;
