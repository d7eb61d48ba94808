//! Line-buffered streaming of subprocess output.
//!
//! Chunked stdout/stderr from children is reassembled into lines before
//! dispatch, so consumers never have to split partial reads themselves.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

use crate::events::{EventSender, LogLine, StreamKind};

/// Spawn a reader task that forwards each line of `reader` as an output
/// event attributed to `service`, returning the collected lines on join.
pub(crate) fn forward_lines<R>(
    reader: R,
    service: impl Into<String>,
    stream: StreamKind,
    events: EventSender,
) -> JoinHandle<Vec<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let service = service.into();
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut collected = Vec::new();
        while let Ok(Some(text)) = lines.next_line().await {
            events.emit_output(LogLine::now(service.clone(), stream, text.clone()));
            collected.push(text);
        }
        collected
    })
}
