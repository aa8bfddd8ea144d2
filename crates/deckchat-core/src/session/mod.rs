//! Client-side session state.
//!
//! A [`Session`] owns the conversation log and the current deck, and is the
//! only writer of either. Stream events are applied one at a time in arrival
//! order; the transport does not read the next chunk until `apply` returns.

pub mod activity;
pub mod conversation;

use crate::client::{
    ChatClient, ChatRequest, ClientError, ClientResult, DeckPreview, ExportRequest, ExportedDeck,
};
use crate::deck::DeckStore;
use crate::events::StreamEvent;
use crate::raster::{RenderTarget, Rasterizer};

pub use activity::ToolActivity;
pub use conversation::ConversationStore;

/// What a finished exchange reported beyond the stored reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeOutcome {
    /// Conversation id from the response header, if the server sent one.
    pub header_conversation_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct Session {
    pub conversation: ConversationStore,
    pub deck: DeckStore,
    /// Set once the exchange in progress has seen `final` or `error`.
    terminal_seen: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with an existing server-side conversation id.
    pub fn resume(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation: ConversationStore::resume(conversation_id),
            ..Self::default()
        }
    }

    /// Routes one stream event to the store that owns it.
    ///
    /// Events arriving after the exchange's terminal event are ignored.
    pub fn apply(&mut self, event: StreamEvent) {
        if self.terminal_seen {
            tracing::debug!(kind = event.kind(), "ignoring event after terminal event");
            return;
        }
        match event {
            StreamEvent::ToolStart { tool } => {
                tracing::debug!(tool = %tool, "tool started");
                self.conversation.tools_mut().tool_start(tool);
            }
            StreamEvent::ToolEnd => self.conversation.tools_mut().tool_end(),
            StreamEvent::Presentation { presentation } => self.deck.set_current(presentation),
            StreamEvent::PresentationUpdate { update } => self.deck.apply_update(&update),
            terminal @ (StreamEvent::Final(_) | StreamEvent::Error { .. }) => {
                self.terminal_seen = true;
                if let Some(deck) = self.conversation.ingest(terminal) {
                    self.deck.set_current(deck);
                }
            }
        }
    }

    /// Sends `text` over the chat stream and applies every event.
    ///
    /// # Errors
    /// Exactly one error per failed exchange: `Transport` or `BodyMissing`
    /// from the transport, `RemoteAgent` for an agent `error` event, or
    /// `Transport` when the stream ends without a terminal event. Loading is
    /// off and the tool tracker reset on every path.
    pub async fn send(&mut self, client: &ChatClient, text: &str) -> ClientResult<ExchangeOutcome> {
        self.send_with(client, text, |_, _| {}).await
    }

    /// Like [`Session::send`], calling `observe` after each event is applied.
    ///
    /// # Errors
    /// See [`Session::send`].
    pub async fn send_with<F>(
        &mut self,
        client: &ChatClient,
        text: &str,
        mut observe: F,
    ) -> ClientResult<ExchangeOutcome>
    where
        F: FnMut(&StreamEvent, &Session),
    {
        let request = self.start_exchange(text);
        let streamed = client
            .stream_chat(&request, |event| {
                let seen = event.clone();
                self.apply(event);
                observe(&seen, self);
            })
            .await;

        let result = match streamed {
            Ok(header_conversation_id) => self
                .terminal_result()
                .map(|()| ExchangeOutcome {
                    header_conversation_id,
                }),
            Err(err) if self.terminal_seen => {
                tracing::warn!(error = %err, "stream failed after its terminal event");
                self.terminal_result().map(|()| ExchangeOutcome::default())
            }
            Err(err) => {
                self.conversation.fail(&err);
                Err(err)
            }
        };
        self.conversation.end_exchange();
        result
    }

    /// Sends `text` through the non-streaming endpoint.
    ///
    /// # Errors
    /// `Transport` on any request failure.
    pub async fn send_once(&mut self, client: &ChatClient, text: &str) -> ClientResult<()> {
        let request = self.start_exchange(text);
        let result = match client.send(&request).await {
            Ok(reply) => {
                self.apply(StreamEvent::Final(reply));
                Ok(())
            }
            Err(err) => {
                self.conversation.fail(&err);
                Err(err)
            }
        };
        self.conversation.end_exchange();
        result
    }

    /// Forgets the conversation and the deck, then asks the server to do the
    /// same. Local state is cleared even if the server call fails.
    pub async fn clear(&mut self, client: &ChatClient) {
        let conversation_id = self.conversation.conversation_id().map(str::to_string);
        self.conversation.clear();
        self.deck.clear();
        self.terminal_seen = false;

        if let Some(id) = conversation_id
            && let Err(err) = client.clear_conversation(&id).await
        {
            tracing::warn!(conversation_id = %id, error = %err, "server-side clear failed");
        }
    }

    /// Captures missing chart images into the current deck and exports it.
    ///
    /// # Errors
    /// `NoPresentation` when there is no deck, `Transport` when the export
    /// request fails, `ExportInFlight` when `rasterizer` is busy.
    pub async fn export<T: RenderTarget>(
        &mut self,
        client: &ChatClient,
        rasterizer: &Rasterizer<T>,
    ) -> ClientResult<ExportedDeck> {
        self.capture_charts(rasterizer).await?;
        let deck = self
            .deck
            .current()
            .ok_or_else(|| ClientError::no_presentation("No presentation to export"))?;
        let exported = client
            .export_deck(&ExportRequest {
                title: &deck.title,
                slides: &deck.slides,
            })
            .await?;
        tracing::info!(
            deck = %deck.id,
            filename = %exported.filename,
            bytes = exported.bytes.len(),
            "deck exported"
        );
        Ok(exported)
    }

    /// Asks the server how it would lay out the current deck.
    ///
    /// # Errors
    /// `NoPresentation` when there is no deck, `Transport` when the request fails.
    pub async fn preview(&self, client: &ChatClient) -> ClientResult<DeckPreview> {
        let deck = self
            .deck
            .current()
            .ok_or_else(|| ClientError::no_presentation("No presentation to preview"))?;
        client
            .preview_deck(&ExportRequest {
                title: &deck.title,
                slides: &deck.slides,
            })
            .await
    }

    /// Rasterizes charts still lacking an image and stores the results.
    /// Returns how many slides gained an image.
    ///
    /// # Errors
    /// `ExportInFlight` when `rasterizer` is busy.
    pub async fn capture_charts<T: RenderTarget>(
        &mut self,
        rasterizer: &Rasterizer<T>,
    ) -> ClientResult<usize> {
        let Some(deck) = self.deck.current().cloned() else {
            return Ok(0);
        };
        let slides = rasterizer.rasterize(&deck).await?;
        Ok(self.deck.attach_images(&deck.id, &slides))
    }

    fn start_exchange(&mut self, text: &str) -> ChatRequest {
        self.conversation.append_user_message(text);
        self.conversation.begin_exchange();
        self.terminal_seen = false;
        ChatRequest::new(text, self.conversation.conversation_id().map(str::to_string))
    }

    fn terminal_result(&mut self) -> ClientResult<()> {
        if !self.terminal_seen {
            let err = ClientError::transport("stream ended before a final response");
            self.conversation.fail(&err);
            return Err(err);
        }
        match self.conversation.last_error() {
            Some(message) => Err(ClientError::remote_agent(message)),
            None => Ok(()),
        }
    }
}
