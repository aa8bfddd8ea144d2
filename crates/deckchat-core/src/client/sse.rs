use std::pin::Pin;
use std::task::{Context, Poll};

use eventsource_stream::{EventStream, EventStreamError, Eventsource};
use futures_util::Stream;

use super::error::{ClientError, ClientResult};
use crate::events::StreamEvent;

/// SSE parser that converts a byte stream into `StreamEvent`s.
///
/// Framing (blank-line delimited records, `data:` payload lines, chunk
/// boundaries anywhere, including inside a UTF-8 sequence) is handled by
/// `eventsource-stream`. Records whose payload does not decode are dropped
/// and the stream continues; only a failure of the underlying byte stream
/// is surfaced as an error.
pub struct SseParser<S> {
    inner: EventStream<S>,
}

impl<S> SseParser<S> {
    pub fn new(stream: S) -> Self
    where
        S: Eventsource,
    {
        Self {
            inner: stream.eventsource(),
        }
    }
}

impl<S, E> Stream for SseParser<S>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = ClientResult<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => match decode_record(&event.data) {
                    Ok(decoded) => return Poll::Ready(Some(Ok(decoded))),
                    Err(err) => {
                        tracing::debug!(error = %err, "dropping malformed stream record");
                    }
                },
                Poll::Ready(Some(Err(EventStreamError::Transport(e)))) => {
                    return Poll::Ready(Some(Err(ClientError::transport(format!(
                        "Response stream failed: {e}"
                    )))));
                }
                Poll::Ready(Some(Err(e))) => {
                    tracing::debug!(error = %e, "dropping unparseable stream record");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Decodes the payload of a single record into a `StreamEvent`.
///
/// # Errors
/// Returns a `Decode` error if the payload is empty or is not a known event.
pub fn decode_record(data: &str) -> ClientResult<StreamEvent> {
    let data = data.trim();
    if data.is_empty() {
        return Err(ClientError::decode("Empty stream record"));
    }
    serde_json::from_str(data)
        .map_err(|err| ClientError::decode(format!("Failed to parse stream record: {err}")))
}
