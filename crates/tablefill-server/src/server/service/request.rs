use crate::server::error::{Result, ServiceError};
use bytes::BytesMut;
use tablefill::FillRequest;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Reads bytes until they form one complete JSON [`FillRequest`].
///
/// Clients do not delimit or half-close their request, so the buffer is
/// re-parsed after every read and decoding stops as soon as a whole JSON
/// value is present. At most `max_bytes` are read.
///
/// # Errors
///
/// - [`ServiceError::InvalidRequest`] if the bytes are not a valid request,
///   exceed `max_bytes`, or the stream ends mid-value.
/// - [`ServiceError::Io`] if the read itself fails.
pub async fn read_request<R>(reader: &mut R, max_bytes: usize) -> Result<FillRequest>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(max_bytes.min(1024));
    let mut limited = reader.take(max_bytes as u64);

    loop {
        let n = limited.read_buf(&mut buf).await?;

        match serde_json::from_slice::<FillRequest>(&buf) {
            Ok(request) => return Ok(request),
            Err(e) if e.is_eof() => {
                if n > 0 {
                    continue;
                }
                if buf.len() >= max_bytes {
                    return Err(ServiceError::invalid_request(format!(
                        "request exceeds {max_bytes} bytes"
                    )));
                }
                if buf.iter().all(u8::is_ascii_whitespace) {
                    return Err(ServiceError::invalid_request(
                        "connection closed before a request was sent",
                    ));
                }
                return Err(ServiceError::invalid_request(format!(
                    "incomplete request: {e}"
                )));
            }
            Err(e) => return Err(ServiceError::invalid_request(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn reads_request_without_delimiter_or_eof() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client
            .write_all(br#"{"rows": 3, "cols": 4, "num_threads": 2}"#)
            .await
            .unwrap();

        // The client keeps its side open, as the interactive client does.
        let request = read_request(&mut server, 256).await.unwrap();
        assert_eq!(request, FillRequest::new(3, 4, 2));
        drop(client);
    }

    #[tokio::test]
    async fn reassembles_split_writes() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let reader = tokio::spawn(async move { read_request(&mut server, 256).await });

        let parts: [&[u8]; 3] = [br#"{"rows": 1"#, br#"0, "cols""#, br#": 2, "threads": 5}"#];
        for part in parts {
            client.write_all(part).await.unwrap();
            client.flush().await.unwrap();
            tokio::task::yield_now().await;
        }

        let request = reader.await.unwrap().unwrap();
        assert_eq!(request, FillRequest::new(10, 2, 5));
    }

    #[tokio::test]
    async fn rejects_oversized_requests() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let padding = " ".repeat(64);
        client
            .write_all(format!(r#"{{"rows": 1,{padding}"cols": 1, "num_threads": 1}}"#).as_bytes())
            .await
            .unwrap();

        let err = read_request(&mut server, 32).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvalidRequest { ref reason } if reason.contains("exceeds 32 bytes")
        ));
    }

    #[tokio::test]
    async fn rejects_malformed_json() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(b"rows=3").await.unwrap();
        let err = read_request(&mut server, 256).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn rejects_non_numeric_fields() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client
            .write_all(br#"{"rows": 3, "cols": 4, "num_threads": "many"}"#)
            .await
            .unwrap();
        let err = read_request(&mut server, 256).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn rejects_truncated_request() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(br#"{"rows": 3, "co"#).await.unwrap();
        client.shutdown().await.unwrap();

        let err = read_request(&mut server, 256).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvalidRequest { ref reason } if reason.starts_with("incomplete request")
        ));
    }

    #[tokio::test]
    async fn rejects_empty_connection() {
        let (client, mut server) = tokio::io::duplex(1024);
        drop(client);

        let err = read_request(&mut server, 256).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvalidRequest { ref reason } if reason.contains("before a request")
        ));
    }
}
