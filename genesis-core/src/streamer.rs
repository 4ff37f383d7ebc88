//! Streaming of logical artifacts assembled from several backing files.
//!
//! A transfer is prepared first: every backing file is stat'ed and the
//! requested range is resolved against the total size, so a missing file is
//! reported before a single byte goes out. The prepared [`Transfer`] is then
//! pumped into a [`ChunkSink`] in `buffer_size` pieces, checking the
//! cancellation token between pieces.

use crate::digest::ArtifactHasher;
use crate::error::{GenesisError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{OwnedSemaphorePermit, mpsc};
use tokio_util::sync::CancellationToken;

/// Chunks buffered between the pump task and the response body.
const BODY_CHANNEL_DEPTH: usize = 2;

/// Requested byte range, inclusive. `to` of `None` or `0` means end of artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub from: u64,
    pub to: Option<u64>,
}

impl ByteRange {
    /// Parse a `Range` header value of the form `bytes=<from>-[<to>]`.
    pub fn parse_header(value: &str) -> Result<Self> {
        let invalid = || GenesisError::InvalidRequest(format!("unsupported range: {}", value));

        let (unit, spec) = value.trim().split_once('=').ok_or_else(invalid)?;
        if !unit.trim().eq_ignore_ascii_case("bytes") || spec.contains(',') {
            return Err(invalid());
        }

        let (from, to) = spec.trim().split_once('-').ok_or_else(invalid)?;
        let from = from.trim().parse::<u64>().map_err(|_| invalid())?;
        let to = match to.trim() {
            "" => None,
            to => Some(to.parse::<u64>().map_err(|_| invalid())?),
        };

        Ok(Self { from, to })
    }
}

/// Resolved range of a partial response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub from: u64,
    pub to: u64,
    pub total: u64,
}

impl ContentRange {
    pub fn len(&self) -> u64 {
        self.to - self.from + 1
    }

    pub fn header_value(&self) -> String {
        format!("bytes {}-{}/{}", self.from, self.to, self.total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackingFile {
    pub path: PathBuf,
    pub size: u64,
}

/// A transfer whose backing files all exist.
#[derive(Debug, Clone)]
pub struct Transfer {
    files: Vec<BackingFile>,
    total: u64,
    range: Option<ContentRange>,
}

impl Transfer {
    pub fn files(&self) -> &[BackingFile] {
        &self.files
    }

    pub fn total_size(&self) -> u64 {
        self.total
    }

    pub fn range(&self) -> Option<ContentRange> {
        self.range
    }

    /// Bytes the transfer will emit.
    pub fn content_length(&self) -> u64 {
        match self.range {
            Some(range) => range.len(),
            None => self.total,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed { bytes: u64 },
    Cancelled { bytes: u64 },
}

/// Destination of pumped chunks. Returning `false` stops the transfer.
#[async_trait]
pub trait ChunkSink: Send {
    async fn accept(&mut self, chunk: Bytes) -> bool;
}

#[async_trait]
impl ChunkSink for mpsc::Sender<std::io::Result<Bytes>> {
    async fn accept(&mut self, chunk: Bytes) -> bool {
        self.send(Ok(chunk)).await.is_ok()
    }
}

#[async_trait]
impl ChunkSink for ArtifactHasher {
    async fn accept(&mut self, chunk: Bytes) -> bool {
        self.update(&chunk);
        true
    }
}

#[async_trait]
impl ChunkSink for Vec<u8> {
    async fn accept(&mut self, chunk: Bytes) -> bool {
        self.extend_from_slice(&chunk);
        true
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RangeStreamer {
    buffer_size: usize,
}

impl RangeStreamer {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Stat every backing file and resolve `range` against their total size.
    pub async fn prepare(&self, paths: Vec<PathBuf>, range: Option<ByteRange>) -> Result<Transfer> {
        if paths.is_empty() {
            return Err(GenesisError::ArtifactNotFound(
                "artifact resolves to no backing files".to_string(),
            ));
        }

        let mut files = Vec::with_capacity(paths.len());
        let mut total = 0u64;
        for path in paths {
            let size = match fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => meta.len(),
                _ => return Err(GenesisError::UnitMissing(path)),
            };
            total += size;
            files.push(BackingFile { path, size });
        }

        let range = match range {
            Some(range) => Some(resolve_range(range, total)?),
            None => None,
        };

        Ok(Transfer {
            files,
            total,
            range,
        })
    }

    /// Copy the transfer's bytes into `sink`.
    ///
    /// Cancellation is observed between chunks and while the sink is
    /// applying backpressure; a cancelled transfer is not an error.
    pub async fn pump<S: ChunkSink>(
        &self,
        transfer: &Transfer,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<TransferOutcome> {
        let (mut skip, mut remaining) = match transfer.range {
            Some(range) => (range.from, range.len()),
            None => (0, transfer.total),
        };
        let mut written = 0u64;

        for file in &transfer.files {
            if remaining == 0 {
                break;
            }

            if skip >= file.size {
                skip -= file.size;
                continue;
            }

            let mut handle = fs::File::open(&file.path).await.map_err(|error| {
                if error.kind() == std::io::ErrorKind::NotFound {
                    GenesisError::UnitMissing(file.path.clone())
                } else {
                    GenesisError::Io(error)
                }
            })?;

            if skip > 0 {
                handle.seek(SeekFrom::Start(skip)).await?;
            }

            let wanted = (file.size - skip).min(remaining);
            skip = 0;

            let mut from_file = 0u64;
            while from_file < wanted {
                if cancel.is_cancelled() {
                    return Ok(TransferOutcome::Cancelled { bytes: written });
                }

                let len = (self.buffer_size as u64).min(wanted - from_file) as usize;
                let mut buf = vec![0u8; len];
                let n = handle.read(&mut buf).await?;
                if n == 0 {
                    if from_file == 0 {
                        return Err(GenesisError::TruncatedUnit(file.path.clone()));
                    }
                    tracing::warn!(
                        "Short read on {} after {} of {} bytes",
                        file.path.display(),
                        from_file,
                        wanted
                    );
                    break;
                }
                buf.truncate(n);

                let accepted = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => false,
                    accepted = sink.accept(Bytes::from(buf)) => accepted,
                };
                if !accepted {
                    return Ok(TransferOutcome::Cancelled { bytes: written });
                }

                from_file += n as u64;
                written += n as u64;
                remaining -= n as u64;
            }
        }

        Ok(TransferOutcome::Completed { bytes: written })
    }

    /// Pump `transfer` from a background task into a bounded channel.
    ///
    /// `permit` is held until the pump finishes. A failure after the
    /// response started is forwarded as an `Err` item so the body aborts.
    pub fn spawn_body(
        &self,
        transfer: Transfer,
        cancel: CancellationToken,
        permit: Option<OwnedSemaphorePermit>,
    ) -> mpsc::Receiver<std::io::Result<Bytes>> {
        let (tx, rx) = mpsc::channel(BODY_CHANNEL_DEPTH);
        let streamer = *self;

        tokio::spawn(async move {
            let _permit = permit;
            let mut sink = tx;

            match streamer.pump(&transfer, &mut sink, &cancel).await {
                Ok(TransferOutcome::Completed { bytes }) => {
                    tracing::debug!("Transfer completed: {} bytes", bytes);
                }
                Ok(TransferOutcome::Cancelled { bytes }) => {
                    tracing::debug!("Transfer cancelled by peer after {} bytes", bytes);
                }
                Err(error) => {
                    tracing::error!("Transfer aborted: {}", error);
                    let _ = sink
                        .send(Err(std::io::Error::other(error.to_string())))
                        .await;
                }
            }
        });

        rx
    }
}

fn resolve_range(range: ByteRange, total: u64) -> Result<ContentRange> {
    let not_satisfiable = || GenesisError::RangeNotSatisfiable {
        from: range.from,
        to: range.to,
        total,
    };

    if total == 0 || range.from >= total {
        return Err(not_satisfiable());
    }

    let to = match range.to {
        None | Some(0) => total - 1,
        Some(to) => to.min(total - 1),
    };

    if range.from > to {
        return Err(not_satisfiable());
    }

    Ok(ContentRange {
        from: range.from,
        to,
        total,
    })
}
