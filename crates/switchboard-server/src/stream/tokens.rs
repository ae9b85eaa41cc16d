use switchboard_core::events::ChunkMetadata;
use switchboard_core::messages::Message;

/// Visible text of a token chunk, or `None` when it should not be streamed:
/// tagged `skip_stream`, not an assistant chunk, or empty once tool-call parts
/// are removed (the model is asking for a tool).
pub fn token_text(chunk: &Message, metadata: &ChunkMetadata) -> Option<String> {
    if metadata.skip_stream() {
        return None;
    }
    let Message::AiChunk(chunk) = chunk else {
        return None;
    };
    let content = chunk.content.without_tool_calls();
    if content.is_empty() {
        return None;
    }
    let text = content.to_text();
    (!text.is_empty()).then_some(text)
}
