//! Stateful scanners over the agent's streamed text.

mod completion;
mod task;

pub use completion::*;
pub use task::*;

/// Drop leading characters so at most `max_chars` remain.
pub(crate) fn keep_tail(buffer: &mut String, max_chars: usize) {
    let count = buffer.chars().count();
    if count <= max_chars {
        return;
    }
    let cut = buffer
        .char_indices()
        .nth(count - max_chars)
        .map_or(buffer.len(), |(idx, _)| idx);
    buffer.drain(..cut);
}
