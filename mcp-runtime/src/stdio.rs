//! Line-framed stream transport.
//!
//! One JSON request per input line, one JSON response per output line,
//! strictly in order. A line is processed to completion, including its REST
//! call, before the next one is read.

use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use toolgate_core::protocol::{ProtocolError, Request, Response};

use crate::dispatcher::{CallContext, Dispatcher};

/// Longest accepted request line, newline excluded. Matches axum's default
/// request body limit on the HTTP transport.
pub const MAX_LINE_BYTES: usize = 2 * 1024 * 1024;

/// One-shot gate released by the host once its own startup is done. Only the
/// first `activate` has an effect.
#[derive(Debug, Clone)]
pub struct ActivationGate {
    open: Arc<watch::Sender<bool>>,
}

impl Default for ActivationGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivationGate {
    pub fn new() -> Self {
        let (open, _) = watch::channel(false);
        Self {
            open: Arc::new(open),
        }
    }

    /// Returns `true` only for the call that opened the gate.
    pub fn activate(&self) -> bool {
        self.open.send_if_modified(|open| {
            if *open {
                false
            } else {
                *open = true;
                true
            }
        })
    }

    pub fn is_active(&self) -> bool {
        *self.open.borrow()
    }

    pub async fn wait(&self) {
        let mut receiver = self.open.subscribe();
        // The sender lives as long as `self`, so this only returns once open.
        let _ = receiver.wait_for(|open| *open).await;
    }
}

/// Serve the agent protocol over stdin/stdout until end of input or `cancel`.
pub async fn serve_stdio(
    dispatcher: &Dispatcher,
    gate: &ActivationGate,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let config = dispatcher.config();
    if config.authorization.require_authorization {
        tracing::warn!(
            "Authorization is configured as required, but the stdio transport cannot enforce it. Disable authorization or serve over HTTP."
        );
    }
    let forwarded = config.rest.forwarded_header_names().count();
    if forwarded > 0 {
        tracing::warn!(
            count = forwarded,
            "Header forwarding is configured, but the stdio transport has no inbound headers. Disable header forwarding or serve over HTTP."
        );
    }
    tracing::info!(
        base_address = %config.rest.base_address,
        tools = dispatcher.registry().len(),
        "Listening for agent protocol traffic on stdio"
    );

    serve_stream(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        dispatcher,
        gate,
        cancel,
    )
    .await
}

pub async fn serve_stream<R, W>(
    reader: R,
    writer: W,
    dispatcher: &Dispatcher,
    gate: &ActivationGate,
    cancel: CancellationToken,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    serve_lines(reader, writer, dispatcher, gate, cancel, MAX_LINE_BYTES).await
}

async fn serve_lines<R, W>(
    mut reader: R,
    mut writer: W,
    dispatcher: &Dispatcher,
    gate: &ActivationGate,
    cancel: CancellationToken,
    max_line: usize,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    tokio::select! {
        _ = gate.wait() => {}
        _ = cancel.cancelled() => return Ok(()),
    }

    let context = CallContext::stream(cancel.clone());
    let mut line = Vec::new();
    loop {
        line.clear();
        // A blocked read loses the race against shutdown and is abandoned.
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Stream transport cancelled");
                break;
            }
            read = read_bounded_line(&mut reader, &mut line, max_line) => read?,
        };
        if read.consumed == 0 {
            tracing::info!("Input stream closed");
            break;
        }

        let started = Instant::now();
        let text = trim_line(&line);
        let (method, response) = if read.oversized {
            tracing::warn!(limit = max_line, consumed = read.consumed, "Discarded oversized request line");
            (None, Response::from_error(None, ProtocolError::parse_error()))
        } else if text.iter().all(u8::is_ascii_whitespace) {
            tracing::warn!("Received blank request line");
            (None, Response::from_error(None, ProtocolError::invalid_request()))
        } else {
            match Request::parse(text) {
                Ok(request) => {
                    let method = request.method.clone();
                    (Some(method), dispatcher.dispatch(request, &context).await)
                }
                Err(error) => {
                    tracing::warn!("Failed to parse request line");
                    (None, Response::from_error(None, error))
                }
            }
        };

        if !response.is_empty() {
            let mut encoded = serde_json::to_vec(&response)?;
            encoded.push(b'\n');
            writer.write_all(&encoded).await?;
            writer.flush().await?;
        }

        tracing::info!(
            method = method.as_deref().unwrap_or("<invalid>"),
            request_id = ?response.id,
            is_error = response.is_error(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Stream request completed"
        );
    }

    Ok(())
}

struct LineRead {
    /// Bytes taken off the reader, newline included. Zero at end of input.
    consumed: usize,
    oversized: bool,
}

/// Read up to and including the next `\n`. A line longer than `limit` is
/// drained from the reader but not buffered.
async fn read_bounded_line<R>(
    reader: &mut R,
    line: &mut Vec<u8>,
    limit: usize,
) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let mut consumed = 0;
    let mut oversized = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(LineRead { consumed, oversized });
        }
        let (chunk, done) = match available.iter().position(|byte| *byte == b'\n') {
            Some(end) => (&available[..=end], true),
            None => (available, false),
        };
        let taken = chunk.len();
        if !oversized {
            if line.len() + taken - usize::from(done) > limit {
                oversized = true;
                line.clear();
            } else {
                line.extend_from_slice(chunk);
            }
        }
        reader.consume(taken);
        consumed += taken;
        if done {
            return Ok(LineRead { consumed, oversized });
        }
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    line.strip_prefix("\u{feff}".as_bytes()).unwrap_or(line)
}
