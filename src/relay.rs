//! Incremental line relay for streamed completions.
//!
//! The upstream body is framed into lines as bytes arrive and each line
//! goes through [`crate::sanitize::relay_line`]. Nothing is read ahead of
//! the consumer, and dropping the returned stream drops the upstream body.

use crate::sanitize::relay_line;
use bytes::Bytes;
use futures_util::future;
use futures_util::{Stream, TryStreamExt};
use std::io;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tokio_util::io::StreamReader;

/// Longest upstream line accepted before the stream is aborted.
pub const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Frames a byte stream into text lines, LF or CRLF terminated.
///
/// A trailing line without a terminator is still yielded at end of input.
/// Invalid UTF-8 is replaced rather than treated as an error.
pub fn upstream_lines<S, E>(bytes: S) -> impl Stream<Item = io::Result<String>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let reader = StreamReader::new(bytes.map_err(io::Error::other));
    let codec =
        AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), b"\n".to_vec(), MAX_LINE_BYTES);
    FramedRead::new(reader, codec)
        .map_ok(|line| {
            let raw: &[u8] = &line;
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            String::from_utf8_lossy(raw).into_owned()
        })
        .map_err(|err| match err {
            AnyDelimiterCodecError::Io(err) => err,
            AnyDelimiterCodecError::MaxChunkLengthExceeded => io::Error::new(
                io::ErrorKind::InvalidData,
                format!("upstream stream line exceeds {MAX_LINE_BYTES} bytes"),
            ),
        })
}

/// Reshapes an upstream SSE body into the caller-facing one.
pub fn relay_stream<S, E>(bytes: S) -> impl Stream<Item = io::Result<Bytes>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    upstream_lines(bytes)
        .try_filter_map(|line| {
            future::ready(Ok(relay_line(&line).map(|mut out| {
                out.push('\n');
                Bytes::from(out)
            })))
        })
        .inspect_err(|err| tracing::warn!("upstream stream aborted: {err}"))
}
