use crate::models::DEFAULT_CONVERSATION_TITLE;
use serde::{Deserialize, Serialize};
use serde_valid::Validate;

#[derive(Serialize, Deserialize, Debug, Default, Validate)]
pub struct NewConversation {
    #[validate(max_length = 200)]
    pub title: Option<String>,
}

impl NewConversation {
    /// Title to store; blank or missing titles get the default.
    pub fn title(&self) -> &str {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title,
            _ => DEFAULT_CONVERSATION_TITLE,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Validate)]
pub struct SendMessage {
    #[validate(min_length = 1)]
    #[validate(max_length = 8000)]
    pub content: String,
}
