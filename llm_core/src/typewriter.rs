use std::time::Duration;

use futures::{stream, Stream, StreamExt};
use tokio_stream::wrappers::IntervalStream;

/// Reveal `text` one character per `speed` tick.
///
/// Yields the growing prefix ("H", "He", ...) and ends once the whole text has
/// been shown. The first character appears after one full tick. A zero
/// `speed` ticks every millisecond.
pub fn typewriter(text: impl Into<String>, speed: Duration) -> impl Stream<Item = String> {
    let text = text.into();
    let ends: Vec<usize> = text.char_indices().map(|(i, c)| i + c.len_utf8()).collect();
    // the first tick of a tokio interval completes immediately
    let period = speed.max(Duration::from_millis(1));
    let ticks = IntervalStream::new(tokio::time::interval(period)).skip(1);
    stream::iter(ends)
        .zip(ticks)
        .map(move |(end, _)| text[..end].to_string())
}
