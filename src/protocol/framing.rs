//! `Content-Length` framing for messages on a byte stream.
//!
//! Format: `Content-Length: N\r\n\r\n{json}`

use std::io;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const CONTENT_LENGTH: &str = "Content-Length:";

/// Write one framed JSON value and flush.
pub(crate) async fn write_frame<W>(writer: &mut W, value: &Value) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(io::Error::other)?;
    let header = format!("{} {}\r\n\r\n", CONTENT_LENGTH, body.len());

    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await
}

/// Read one frame body.
///
/// Returns `Ok(None)` on a clean EOF between frames. The body is returned
/// undecoded so a malformed payload can be skipped without losing framing.
pub(crate) async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;

    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            if saw_header {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "EOF inside frame header",
                ));
            }
            return Ok(None);
        }

        let line = line.trim();
        if line.is_empty() {
            if saw_header {
                break;
            }
            // Tolerate stray blank lines between frames
            continue;
        }
        saw_header = true;

        if let Some(len) = line.strip_prefix(CONTENT_LENGTH) {
            let len = len.trim().parse::<usize>().map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("invalid Content-Length: {}", e),
                )
            })?;
            content_length = Some(len);
        }
    }

    let content_length = content_length.ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "missing Content-Length header")
    })?;

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::BufReader;

    async fn read_json<R: AsyncBufRead + Unpin>(reader: &mut R) -> Option<Value> {
        read_frame(reader)
            .await
            .unwrap()
            .map(|body| serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn frames_are_read_back_in_order() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &json!([0, 1, "a", []])).await.unwrap();
        write_frame(&mut buffer, &json!([0, 2, "b", []])).await.unwrap();

        let mut reader = BufReader::new(buffer.as_slice());
        assert_eq!(read_json(&mut reader).await, Some(json!([0, 1, "a", []])));
        assert_eq!(read_json(&mut reader).await, Some(json!([0, 2, "b", []])));
        assert_eq!(read_json(&mut reader).await, None);
    }

    #[tokio::test]
    async fn header_uses_byte_length() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &json!("é")).await.unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("Content-Length: 4\r\n\r\n"), "{text:?}");
    }

    #[tokio::test]
    async fn missing_content_length_is_invalid_data() {
        let input = b"X-Other: 1\r\n\r\n{}".to_vec();
        let mut reader = BufReader::new(input.as_slice());
        let err = read_frame(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn truncated_body_is_unexpected_eof() {
        let input = b"Content-Length: 10\r\n\r\n[1,".to_vec();
        let mut reader = BufReader::new(input.as_slice());
        let err = read_frame(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn malformed_body_keeps_stream_aligned() {
        let mut input = b"Content-Length: 3\r\n\r\n{x}".to_vec();
        write_frame(&mut input, &json!([1, 1, null])).await.unwrap();

        let mut reader = BufReader::new(input.as_slice());
        let body = read_frame(&mut reader).await.unwrap().unwrap();
        assert!(serde_json::from_slice::<Value>(&body).is_err());
        assert_eq!(read_json(&mut reader).await, Some(json!([1, 1, null])));
    }
}
