// Slash commands typed by the user. Command messages never stay in the thread.
use std::str::FromStr;

use crate::session::DynamicImageMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    OpenWindow,
    CustomImage,
    NextStage,
    PreviousStage,
    Thought,
    Guidance,
    ChangeImage,
    ImageMode(DynamicImageMode),
    Unknown(String),
}

impl Command {
    /// `None` when the text is not a command at all.
    pub fn parse(content: &str) -> Option<Command> {
        let content = content.trim_start();
        if !content.starts_with('/') {
            return None;
        }
        let mut words = content.split_whitespace();
        let name = words.next().unwrap_or_default();
        let argument = words.next();

        Some(match name {
            "/openwindow" => Command::OpenWindow,
            "/customImage" => Command::CustomImage,
            "/nextstage" => Command::NextStage,
            "/prevstage" => Command::PreviousStage,
            "/thought" => Command::Thought,
            "/guidance" => Command::Guidance,
            "/changeimage" => Command::ChangeImage,
            "/imagemode" => match argument.map(DynamicImageMode::from_str) {
                Some(Ok(mode)) => Command::ImageMode(mode),
                _ => Command::Unknown(content.to_string()),
            },
            _ => Command::Unknown(content.to_string()),
        })
    }

    /// Whether running the command requires loaded stages.
    pub fn needs_stages(&self) -> bool {
        matches!(
            self,
            Command::CustomImage
                | Command::NextStage
                | Command::PreviousStage
                | Command::Thought
                | Command::Guidance
                | Command::ChangeImage
        )
    }
}
