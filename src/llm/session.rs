//! Explicit conversation state owned by the caller.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Alternating user/assistant history sent with every completion request.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.messages.clear();
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage { role: Role::User, content: content.into() });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage { role: Role::Assistant, content: content.into() });
    }

    /// Drop a trailing user turn that never got an answer.
    pub fn discard_unanswered(&mut self) {
        if matches!(self.messages.last(), Some(m) if m.role == Role::User) {
            self.messages.pop();
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discard_only_removes_unanswered_user_turn() {
        let mut session = Conversation::new();
        session.push_user("q1");
        session.push_assistant("a1");
        session.discard_unanswered();
        assert_eq!(session.len(), 2);

        session.push_user("q2");
        session.discard_unanswered();
        assert_eq!(session.len(), 2);
        assert_eq!(session.messages()[1].role, Role::Assistant);

        session.reset();
        assert!(session.is_empty());
    }

    #[test]
    fn roles_serialize_lowercase() {
        let msg = ChatMessage { role: Role::Assistant, content: "hi".into() };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
