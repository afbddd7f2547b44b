//! Streaming support for OpenAI responses
//!
//! OpenAI streams text and tool calls as flat deltas. They are regrouped into
//! indexed content blocks: text is block 0 and tool-call slot `n` is block
//! `n + 1`.

use super::types::OpenAIStreamChunk;
use crate::protocol::{ContentBlock, ContentDelta, StreamChunk};
use crate::providers::sse::SseEvent;
use crate::providers::{ChunkStream, ProviderResult};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

const TEXT_INDEX: usize = 0;

#[derive(Debug, Default)]
struct ToolSlot {
    id: Option<String>,
    name: Option<String>,
    pending_arguments: String,
    started: bool,
}

/// Stateful translator from OpenAI chunks to normalized stream chunks
#[derive(Debug, Default)]
pub struct StreamTranslator {
    text_started: bool,
    slots: BTreeMap<usize, ToolSlot>,
}

impl StreamTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one wire chunk
    pub fn process(&mut self, chunk: OpenAIStreamChunk) -> Vec<StreamChunk> {
        let mut out = Vec::new();

        for choice in chunk.choices {
            let delta = choice.delta;

            if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
                if !self.text_started {
                    self.text_started = true;
                    out.push(StreamChunk::ContentBlockStart {
                        index: TEXT_INDEX,
                        content_block: ContentBlock::text(""),
                    });
                }
                out.push(StreamChunk::ContentBlockDelta {
                    index: TEXT_INDEX,
                    delta: ContentDelta::TextDelta { text },
                });
            }

            for call in delta.tool_calls.unwrap_or_default() {
                let Some(index) = call.index.checked_add(1) else {
                    debug!("Skipping tool call with out-of-range slot {}", call.index);
                    continue;
                };
                let slot = self.slots.entry(call.index).or_default();

                if let Some(id) = call.id.filter(|id| !id.is_empty()) {
                    slot.id.get_or_insert(id);
                }
                if let Some(function) = call.function {
                    if let Some(name) = function.name.filter(|n| !n.is_empty()) {
                        slot.name.get_or_insert(name);
                    }
                    if let Some(arguments) = function.arguments {
                        slot.pending_arguments.push_str(&arguments);
                    }
                }

                if !slot.started {
                    if let (Some(id), Some(name)) = (&slot.id, &slot.name) {
                        out.push(StreamChunk::ContentBlockStart {
                            index,
                            content_block: ContentBlock::ToolUse {
                                id: id.clone(),
                                name: name.clone(),
                                input: Value::Object(Default::default()),
                            },
                        });
                        slot.started = true;
                    }
                }

                if slot.started && !slot.pending_arguments.is_empty() {
                    out.push(StreamChunk::ContentBlockDelta {
                        index,
                        delta: ContentDelta::InputJsonDelta {
                            partial_json: std::mem::take(&mut slot.pending_arguments),
                        },
                    });
                }
            }
        }

        out
    }
}

/// Translate decoded SSE events into a normalized chunk stream
///
/// The stream ends with exactly one `MessageStop` unless a read error
/// terminates it first.
pub fn translate_stream<S>(events: S) -> ChunkStream
where
    S: Stream<Item = ProviderResult<SseEvent>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut events = Box::pin(events);
        let mut translator = StreamTranslator::new();

        while let Some(event) = events.next().await {
            match event {
                Ok(SseEvent::Data(data)) => match serde_json::from_str::<OpenAIStreamChunk>(&data) {
                    Ok(chunk) => {
                        for out in translator.process(chunk) {
                            yield Ok(out);
                        }
                    }
                    Err(e) => debug!("Dropping malformed stream chunk: {} - data: {}", e, data),
                },
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
