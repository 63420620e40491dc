pub mod ai;
pub mod ai_response;
pub mod command;
pub mod content;
pub mod director;
pub mod error;
pub mod host;
pub mod logging;
pub mod matcher;
pub mod message;
pub mod panel;
pub mod prompts;
pub mod repo;
pub mod session;
pub mod settings;
pub mod stage;

// Re-export commonly used items for easier access
pub use ai::{CompletionBackend, NarrativeAdvisor, OpenAIBackend};
pub use ai_response::{AdvisorVerdict, normalize_advisor_response};
pub use content::{ContentCatalog, ImageEntry, Stage};
pub use director::{Director, MessageOutcome};
pub use error::{DirectorError, Result};
pub use host::{Host, MemoryHost};
pub use message::{Author, ThreadMessage};
pub use repo::{ContentSource, GithubSource};
pub use session::{DynamicImageMode, SessionState};
pub use settings::Settings;
pub use stage::{AdvanceDecision, AdvanceReason, StageEngine, ThoughtMode};
