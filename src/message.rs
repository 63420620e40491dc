use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Ai,
    System,
    #[serde(untagged)]
    Other(String),
}

impl Author {
    pub fn is_conversational(&self) -> bool {
        matches!(self, Author::User | Author::Ai)
    }
}

/// One message of the host conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub author: Author,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hidden_from: Vec<Author>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expects_reply: Option<bool>,
}

impl ThreadMessage {
    pub fn new(author: Author, content: impl Into<String>) -> Self {
        ThreadMessage {
            author,
            content: content.into(),
            hidden_from: Vec::new(),
            expects_reply: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Author::User, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(Author::Ai, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Author::System, content)
    }

    pub fn hidden_from(mut self, author: Author) -> Self {
        self.hidden_from.push(author);
        self
    }

    pub fn expects_reply(mut self, expects_reply: bool) -> Self {
        self.expects_reply = Some(expects_reply);
        self
    }

    pub fn is_command(&self) -> bool {
        self.author == Author::User && self.content.starts_with('/')
    }
}
