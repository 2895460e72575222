//! Turns provider output into plain text plus usage reports.

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use log::debug;
use serde_json::Value;
use std::pin::Pin;

use unillm_core::{Result, StreamFrame, TransportError, UsageCallback, UsageRecord};

use crate::transport::ChunkStream;

/// Lazily produced text fragments of a streamed reply.
///
/// An `Err` item ends the stream. Dropping the stream drops the underlying
/// transport stream.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Provider-specific decoding of raw stream chunks.
///
/// A decoder is created per stream and may carry state between chunks.
/// Chunks without content (pings, bookkeeping events, chunks with no
/// output candidate) decode to `Ok(None)`.
pub trait ChunkDecoder: Send {
    fn decode(&mut self, chunk: &[u8]) -> std::result::Result<Option<StreamFrame>, TransportError>;
}

/// Build the fragment stream for `chunks`.
///
/// Chunks are handled strictly in arrival order:
/// - chunks decoding to no frame are skipped;
/// - with a callback configured, frames carrying usage are reported and
///   produce no text;
/// - stop frames are skipped;
/// - any other frame yields its text.
///
/// Every usage-bearing frame triggers its own callback.
pub fn normalize_stream<D>(chunks: ChunkStream, decoder: D, usage: Option<UsageCallback>) -> TextStream
where
    D: ChunkDecoder + 'static,
{
    Box::pin(fragments(chunks, decoder, usage))
}

fn fragments<D>(
    mut chunks: ChunkStream,
    mut decoder: D,
    usage: Option<UsageCallback>,
) -> impl Stream<Item = Result<String>> + Send
where
    D: ChunkDecoder + 'static,
{
    try_stream! {
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            let frame = match decoder.decode(&chunk)? {
                Some(frame) => frame,
                None => {
                    debug!("Skipping non-content chunk ({} bytes)", chunk.len());
                    continue;
                }
            };

            if let (Some(callback), Some(record)) = (&usage, frame.usage) {
                callback.report(record).await?;
                continue;
            }
            if frame.is_stop() {
                continue;
            }
            if let Some(text) = frame.text {
                yield text;
            }
        }
    }
}

/// Report the estimated usage of a non-streamed reply, if a callback is set
pub async fn report_estimate(usage: Option<&UsageCallback>, prompt: &str, completion: &str) -> Result<()> {
    match usage {
        Some(callback) => callback.report(UsageRecord::estimate(prompt, completion)).await,
        None => Ok(()),
    }
}

/// Drain `stream`, handing each fragment to `on_fragment`, and return the
/// whole reply. The first error is returned after the fragments before it
/// have been handled.
pub async fn collect_stream<F>(mut stream: TextStream, mut on_fragment: F) -> Result<String>
where
    F: FnMut(&str),
{
    let mut reply = String::new();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        on_fragment(&fragment);
        reply.push_str(&fragment);
    }
    Ok(reply)
}

/// Parse a reply as JSON. A surrounding Markdown code fence is ignored.
pub fn parse_json(reply: &str) -> Result<Value> {
    let body = reply.trim();
    let body = match body.strip_prefix("```").and_then(|rest| rest.strip_suffix("```")) {
        // drop the info string, e.g. "json"
        Some(fenced) => fenced.split_once('\n').map_or("", |(_, code)| code),
        None => body,
    };
    let value = serde_json::from_str(body.trim()).map_err(TransportError::from)?;
    Ok(value)
}
