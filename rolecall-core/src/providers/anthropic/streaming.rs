//! Streaming support for Anthropic responses
//!
//! Anthropic already streams indexed content blocks, so the relevant events
//! translate 1:1 and everything else is skipped.

use super::types::AnthropicStreamEvent;
use crate::protocol::{ContentBlock, ContentDelta, StreamChunk};
use crate::providers::sse::SseEvent;
use crate::providers::{ChunkStream, ProviderResult};
use futures::{Stream, StreamExt};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Translate one Anthropic event, or `None` if it carries nothing to emit
pub fn translate_event(event: AnthropicStreamEvent) -> Option<StreamChunk> {
    match event {
        AnthropicStreamEvent::ContentBlockStart {
            index,
            content_block,
        } => match serde_json::from_value::<ContentBlock>(content_block) {
            Ok(content_block) => Some(StreamChunk::ContentBlockStart {
                index,
                content_block,
            }),
            Err(e) => {
                debug!("Skipping unsupported block start at {}: {}", index, e);
                None
            }
        },
        AnthropicStreamEvent::ContentBlockDelta { index, delta } => {
            match serde_json::from_value::<ContentDelta>(delta) {
                Ok(delta) => Some(StreamChunk::ContentBlockDelta { index, delta }),
                Err(e) => {
                    debug!("Skipping unsupported delta at {}: {}", index, e);
                    None
                }
            }
        }
        AnthropicStreamEvent::MessageStop => Some(StreamChunk::MessageStop),
        AnthropicStreamEvent::Error { error } => {
            warn!("Provider reported a stream error event: {}", error);
            None
        }
        AnthropicStreamEvent::Ignored => None,
    }
}

/// Translate decoded SSE events into a normalized chunk stream
///
/// Ends after the provider's `message_stop`, or synthesizes one when the body
/// ends without it. Deltas for a block whose start was skipped are dropped.
pub fn translate_stream<S>(events: S) -> ChunkStream
where
    S: Stream<Item = ProviderResult<SseEvent>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut events = Box::pin(events);
        let mut started: HashSet<usize> = HashSet::new();

        while let Some(event) = events.next().await {
            match event {
                Ok(SseEvent::Data(data)) => {
                    match serde_json::from_str::<AnthropicStreamEvent>(&data) {
                        Ok(event) => {
                            if let Some(chunk) = translate_event(event) {
                                match &chunk {
                                    StreamChunk::ContentBlockStart { index, .. } => {
                                        started.insert(*index);
                                    }
                                    StreamChunk::ContentBlockDelta { index, .. }
                                        if !started.contains(index) =>
                                    {
                                        debug!("Dropping delta for unstarted block {}", index);
                                        continue;
                                    }
                                    _ => {}
                                }
                                let stop = chunk.is_stop();
                                yield Ok(chunk);
                                if stop {
                                    return;
                                }
                            }
                        }
                        Err(e) => debug!("Dropping malformed stream event: {} - data: {}", e, data),
                    }
                }
                Ok(SseEvent::Done) => break,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        yield Ok(StreamChunk::MessageStop);
    })
}
