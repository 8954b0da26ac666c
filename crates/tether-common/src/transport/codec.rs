//! Message framing and JSON codec.
//!
//! Socket messages are framed as `[4-byte length as u32 big-endian] +
//! [JSON data]`. The frame helpers are generic over the stream halves so the
//! socket transport can drive reads and writes concurrently.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::{Request, Response, Result, TetherError};

/// Maximum framed message size (16 MB). Frames above this reject before any
/// buffer is allocated.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// JSON codec for the request/response envelopes.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a request to bytes.
    pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(request)?)
    }

    /// Decode a request from bytes.
    pub fn decode_request(data: &[u8]) -> Result<Request> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Encode a response to bytes.
    pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(response)?)
    }

    /// Decode a response from bytes.
    pub fn decode_response(data: &[u8]) -> Result<Response> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Writes one length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = data.len() as u32;

    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| TetherError::Connection(format!("writing length prefix: {}", e)))?;
    writer
        .write_all(data)
        .await
        .map_err(|e| TetherError::Connection(format!("writing frame data: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| TetherError::Connection(format!("flushing frame: {}", e)))?;

    Ok(())
}

/// Reads one length-prefixed frame.
///
/// A clean EOF on the length prefix reads as the peer closing the
/// connection and surfaces as a `Connection` error for the caller to treat
/// as a disconnect.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                TetherError::Connection("connection closed by peer".to_string())
            }
            _ => TetherError::Connection(format!("reading length prefix: {}", e)),
        })?;

    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(TetherError::InvalidResponse(format!(
            "Message too large: {} bytes (max {} bytes)",
            len, MAX_MESSAGE_SIZE
        )));
    }

    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| TetherError::Connection(format!("reading frame data: {}", e)))?;

    Ok(buf)
}
