//! Conversation log and exchange lifecycle.

use crate::client::ClientError;
use crate::events::{FinalResponse, StreamEvent};
use crate::models::{Message, Presentation, Role};
use crate::session::activity::ToolActivity;

/// Message log plus the state of the exchange in flight.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    messages: Vec<Message>,
    conversation_id: Option<String>,
    loading: bool,
    last_error: Option<String>,
    tools: ToolActivity,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continues a server-side conversation started elsewhere.
    pub fn resume(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: Some(conversation_id.into()),
            ..Self::default()
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn tools(&self) -> &ToolActivity {
        &self.tools
    }

    pub(crate) fn tools_mut(&mut self) -> &mut ToolActivity {
        &mut self.tools
    }

    /// Latest assistant message, if any.
    pub fn last_reply(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    pub fn append_user_message(&mut self, text: impl Into<String>) -> &Message {
        let message = Message::user(text);
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn begin_exchange(&mut self) {
        self.loading = true;
        self.last_error = None;
        self.tools.reset();
    }

    /// Applies a terminal event.
    ///
    /// Returns the deck that should become current, if the reply carried any.
    /// Non-terminal events are left to the tracker and the deck store.
    pub fn ingest(&mut self, event: StreamEvent) -> Option<Presentation> {
        match event {
            StreamEvent::Final(reply) => {
                self.tools.reset();
                self.append_reply(reply)
            }
            StreamEvent::Error { message } => {
                self.tools.reset();
                tracing::warn!(error = %message, "agent reported an error");
                self.last_error = Some(message);
                None
            }
            other => {
                tracing::debug!(kind = other.kind(), "event not handled by conversation store");
                None
            }
        }
    }

    /// Records a failure that ended the exchange.
    pub fn fail(&mut self, error: &ClientError) {
        tracing::warn!(kind = %error.kind, error = %error.message, "exchange failed");
        self.last_error = Some(error.message.clone());
    }

    pub fn end_exchange(&mut self) {
        self.loading = false;
        self.tools.reset();
    }

    /// Drops all local history.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.conversation_id = None;
        self.last_error = None;
        self.loading = false;
        self.tools.reset();
    }

    fn append_reply(&mut self, reply: FinalResponse) -> Option<Presentation> {
        if self.conversation_id.is_none()
            && let Some(id) = reply.conversation_id.filter(|id| !id.is_empty())
        {
            tracing::debug!(conversation_id = %id, "conversation id adopted");
            self.conversation_id = Some(id);
        }

        let current_deck = reply.presentations.first().cloned();
        let mut message = Message::new(Role::Assistant, reply.response);
        message.charts = reply.charts;
        message.presentations = reply.presentations;
        message.suggestions = reply.suggestions;
        self.messages.push(message);

        current_deck
    }
}
