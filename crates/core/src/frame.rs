//! Length-prefixed JSON-RPC framing: `Content-Length: N\r\n\r\n<body>`.
//!
//! Pure codec, no process or transport policy — callers own the byte stream.

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Guards against a corrupt or hostile `Content-Length` header forcing an
/// unbounded allocation; 64 MiB comfortably exceeds any real MCP payload.
const MAX_CONTENT_LENGTH: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("truncated frame")]
    Truncated,
    #[error("content-length {0} exceeds maximum frame size")]
    TooLarge(usize),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of reading one frame from a stream.
#[derive(Debug)]
pub enum Frame {
    /// A parsed JSON message.
    Message(Value),
    /// EOF encountered before any header bytes — clean stream close.
    Closed,
}

/// Serialize `value` as compact UTF-8 JSON and prepend the Content-Length header.
pub fn encode(value: &Value) -> Vec<u8> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"null".to_vec());
    let mut out = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    out.extend_from_slice(&body);
    out
}

/// Write one framed message and flush.
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, value: &Value) -> Result<(), FrameError> {
    writer.write_all(&encode(value)).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message, resynchronizing past malformed bodies.
///
/// A body that fails to parse as JSON is dropped (logged by the caller) and
/// framing resumes at the next header — this is the only non-fatal failure
/// mode. Anything that truncates the header/body bytes themselves is fatal
/// for the stream.
pub async fn read_message<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Frame, FrameError> {
    loop {
        let content_length = match read_content_length(reader).await? {
            Some(n) => n,
            None => return Ok(Frame::Closed),
        };
        if content_length > MAX_CONTENT_LENGTH {
            return Err(FrameError::TooLarge(content_length));
        }

        let mut body = vec![0u8; content_length];
        reader
            .read_exact(&mut body)
            .await
            .map_err(|_| FrameError::Truncated)?;

        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => return Ok(Frame::Message(value)),
            Err(_) => continue, // malformed body: drop and resynchronize
        }
    }
}

/// Read header lines up to the blank-line terminator and return Content-Length.
///
/// `Content-Length` is matched case-insensitively; any other header is
/// accepted and ignored. Returns `Ok(None)` when EOF is hit before any
/// header bytes (clean stream close).
async fn read_content_length<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<usize>, FrameError> {
    let mut content_length: Option<usize> = None;
    let mut saw_any_bytes = false;

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return if saw_any_bytes {
                Err(FrameError::Truncated)
            } else {
                Ok(None)
            };
        }
        saw_any_bytes = true;

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse::<usize>().ok();
            }
        }
    }

    match content_length {
        Some(n) => Ok(Some(n)),
        None => Err(FrameError::Truncated),
    }
}
