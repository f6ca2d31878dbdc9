// SPDX-License-Identifier: AGPL-3.0-or-later
//! Helpers for building and consuming byte streams and sinks

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{ByteSink, ByteStream, Location, UflError, UflResult};

/// Default chunk size for streamed reads
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Stream an async reader in chunks of at most `chunk_size` bytes
pub fn reader_stream<R>(reader: R, chunk_size: usize, location: Location) -> ByteStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    Box::pin(futures::stream::try_unfold(reader, move |mut reader| {
        let location = location.clone();
        async move {
            let mut buf = BytesMut::with_capacity(chunk_size);
            let n = reader
                .read_buf(&mut buf)
                .await
                .map_err(|e| UflError::io_at(e, &location))?;
            if n == 0 {
                Ok::<_, UflError>(None)
            } else {
                Ok(Some((buf.freeze(), reader)))
            }
        }
    }))
}

/// Sink writing every chunk to an async writer, flushing as it goes
pub fn writer_sink<W>(writer: W, location: Location) -> ByteSink
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    Box::pin(futures::sink::unfold(writer, move |mut writer, chunk: Bytes| {
        let location = location.clone();
        async move {
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| UflError::io_at(e, &location))?;
            writer
                .flush()
                .await
                .map_err(|e| UflError::io_at(e, &location))?;
            Ok::<_, UflError>(writer)
        }
    }))
}

/// Fail the stream with [`UflError::Timeout`] when no chunk arrives within
/// `timeout`. The stream ends after reporting the timeout.
pub fn with_chunk_timeout(stream: ByteStream, timeout: Duration, what: String) -> ByteStream {
    Box::pin(futures::stream::unfold(
        Some(stream),
        move |stream| {
            let what = what.clone();
            async move {
                let mut stream = stream?;
                match tokio::time::timeout(timeout, stream.next()).await {
                    Ok(Some(item)) => Some((item, Some(stream))),
                    Ok(None) => None,
                    Err(_) => Some((Err(UflError::Timeout(what)), None)),
                }
            }
        },
    ))
}

/// Drain a stream into memory
pub async fn read_to_bytes(mut stream: ByteStream) -> UflResult<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

/// Read at most `limit` bytes from the start of a stream
pub async fn read_prefix(mut stream: ByteStream, limit: usize) -> UflResult<Bytes> {
    let mut buf = BytesMut::with_capacity(limit);
    while buf.len() < limit {
        match stream.next().await {
            Some(chunk) => {
                let chunk = chunk?;
                let take = chunk.len().min(limit - buf.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            None => break,
        }
    }
    Ok(buf.freeze())
}
