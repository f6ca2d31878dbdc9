// SPDX-License-Identifier: AGPL-3.0-or-later
//! Seekable local copies of archive sources, and blocking decode streams

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use ufl_core::{ByteStream, FileRef, UflError, UflResult};

const CHANNEL_CHUNKS: usize = 4;
const CHUNK_SIZE: usize = 64 * 1024;

/// Where the archive bytes can be read with seeking
#[derive(Debug)]
pub enum Spool {
    /// The source already lives on local disk
    Local(PathBuf),
    /// Copied from a stream; removed when dropped
    Temp(NamedTempFile),
}

impl Spool {
    /// Use the source's local path when it has one, otherwise copy it into a
    /// temporary file
    pub async fn fill(source: &FileRef) -> UflResult<Self> {
        if let Some(path) = source.local_path() {
            return Ok(Spool::Local(path));
        }

        let temp = tokio::task::spawn_blocking(NamedTempFile::new)
            .await
            .map_err(io::Error::from)??;
        let mut out = tokio::fs::File::from_std(temp.reopen()?);
        let mut stream = source.open_read().await?;
        let mut copied = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            copied += chunk.len() as u64;
            out.write_all(&chunk).await?;
        }
        out.flush().await?;
        tracing::debug!("Spooled {} bytes of {} to {}", copied, source.location(), temp.path().display());
        Ok(Spool::Temp(temp))
    }

    pub fn path(&self) -> &Path {
        match self {
            Spool::Local(path) => path,
            Spool::Temp(temp) => temp.path(),
        }
    }

    pub fn open(&self) -> io::Result<io::BufReader<std::fs::File>> {
        Ok(io::BufReader::new(std::fs::File::open(self.path())?))
    }
}

/// `Write` end of a bounded channel feeding a [`ByteStream`]
///
/// Fails with `BrokenPipe` once the stream is dropped, which stops the codec
/// writing into it.
struct ChannelWriter {
    tx: mpsc::Sender<UflResult<Bytes>>,
    buf: BytesMut,
}

impl ChannelWriter {
    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = self.buf.split().freeze();
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let room = CHUNK_SIZE - self.buf.len();
        let take = data.len().min(room);
        self.buf.extend_from_slice(&data[..take]);
        if self.buf.len() >= CHUNK_SIZE {
            self.send_buffered()?;
        }
        Ok(take)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

/// Run `job` on the blocking pool and stream what it writes
///
/// Errors from the job go through `map_err` and end the stream. Dropping the
/// stream makes the job's next write fail, which ends it.
pub fn blocking_stream<J, M>(job: J, map_err: M) -> ByteStream
where
    J: FnOnce(&mut dyn Write) -> io::Result<u64> + Send + 'static,
    M: FnOnce(io::Error) -> UflError + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CHUNKS);
    tokio::task::spawn_blocking(move || {
        let mut writer = ChannelWriter {
            tx: tx.clone(),
            buf: BytesMut::with_capacity(CHUNK_SIZE),
        };
        let result = job(&mut writer).and_then(|_| writer.flush());
        match result {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe && tx.is_closed() => {
                tracing::debug!("Archive reader dropped, stopping decode");
            }
            Err(e) => {
                let _ = tx.blocking_send(Err(map_err(e)));
            }
        }
    });

    Box::pin(futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ufl_core::stream::read_to_bytes;

    #[tokio::test]
    async fn test_blocking_stream_delivers_everything() {
        let stream = blocking_stream(
            |out| {
                let data = vec![5u8; CHUNK_SIZE * 2 + 3];
                out.write_all(&data)?;
                Ok(data.len() as u64)
            },
            UflError::Io,
        );
        let data = read_to_bytes(stream).await.unwrap();
        assert_eq!(data.len(), CHUNK_SIZE * 2 + 3);
    }

    #[tokio::test]
    async fn test_blocking_stream_reports_error_after_data() {
        let stream = blocking_stream(
            |out| {
                out.write_all(b"partial")?;
                out.flush()?;
                Err(io::Error::new(io::ErrorKind::InvalidData, "bad block"))
            },
            |e| UflError::CorruptArchive {
                archive: "a.zip".into(),
                entry: None,
                message: e.to_string(),
            },
        );
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(&items[0].as_ref().unwrap()[..], b"partial");
        assert!(matches!(items[1], Err(UflError::CorruptArchive { .. })));
    }

    #[tokio::test]
    async fn test_dropping_stream_stops_job() {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let mut stream = blocking_stream(
            move |out| {
                let chunk = vec![0u8; CHUNK_SIZE];
                let result = loop {
                    if let Err(e) = out.write_all(&chunk) {
                        break e;
                    }
                };
                let _ = done_tx.send(result.kind());
                Err(result)
            },
            UflError::Io,
        );
        assert!(stream.next().await.unwrap().is_ok());
        drop(stream);
        assert_eq!(done_rx.await.unwrap(), io::ErrorKind::BrokenPipe);
    }
}
