//! Asynchronous read boundary.
//!
//! The block cache never touches files itself. It submits a [`ReadRequest`]
//! (path, byte offset, length) to a [`BlockReader`] together with the sending
//! half of its completion inbox. The reader fills a buffer on whatever thread
//! it likes and posts exactly one [`ReadCompletion`] per request. The tick
//! thread is the only receiver and drains the inbox once per tick, so no cache
//! state is ever touched off the tick thread.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::arena::Handle;

/// Sending half of the completion inbox, handed to readers
pub type CompletionSender = mpsc::UnboundedSender<ReadCompletion>;

/// Receiving half of the completion inbox, owned by the block cache
pub type CompletionInbox = mpsc::UnboundedReceiver<ReadCompletion>;

/// Create a completion inbox
pub fn completion_channel() -> (CompletionSender, CompletionInbox) {
    mpsc::unbounded_channel()
}

/// One block read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    /// Cache entry the completion belongs to
    pub ticket: Handle,
    /// Archive file
    pub path: PathBuf,
    /// Absolute byte offset
    pub offset: u64,
    /// Bytes to read
    pub len: usize,
}

/// Result of a read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Buffer filled with exactly the requested bytes
    Filled(Vec<u8>),
    /// Read failed; no retry is attempted
    Failed(String),
}

/// Completion posted by a reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadCompletion {
    /// Ticket of the request this completes
    pub ticket: Handle,
    /// Filled buffer or failure reason
    pub outcome: ReadOutcome,
}

impl ReadCompletion {
    /// Successful completion
    pub const fn filled(ticket: Handle, data: Vec<u8>) -> Self {
        Self {
            ticket,
            outcome: ReadOutcome::Filled(data),
        }
    }

    /// Failed completion
    pub fn failed(ticket: Handle, reason: impl Into<String>) -> Self {
        Self {
            ticket,
            outcome: ReadOutcome::Failed(reason.into()),
        }
    }
}

/// Host asynchronous read facility
///
/// Implementations must post exactly one completion per submitted request.
/// A send error means the cache has gone away and can be ignored.
pub trait BlockReader {
    /// Start reading `request.len` bytes at `request.offset` of `request.path`
    fn submit(&self, request: ReadRequest, inbox: CompletionSender);

    /// Resolve every request that would otherwise wait on the host
    ///
    /// Called before the cache blocks on outstanding reads. Readers that
    /// complete on their own can leave this as a no-op.
    fn cancel_pending(&self) {}
}

/// Reads on the submitting thread and posts the completion immediately
///
/// Open file handles are cached per path, so streaming many blocks from one
/// archive opens it once.
#[derive(Debug, Default)]
pub struct FileBlockReader {
    handles: Mutex<HashMap<PathBuf, File>>,
}

impl FileBlockReader {
    /// Create a reader with an empty handle cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every cached file handle
    pub fn close_all(&self) {
        self.handles.lock().clear();
    }

    fn read_range(&self, path: &Path, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        let mut handles = self.handles.lock();
        let file = match handles.entry(path.to_path_buf()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!("Opening archive {}", path.display());
                entry.insert(File::open(path)?)
            }
        };

        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }
}

impl BlockReader for FileBlockReader {
    fn submit(&self, request: ReadRequest, inbox: CompletionSender) {
        trace!(
            "Reading {} bytes at {} from {}",
            request.len,
            request.offset,
            request.path.display()
        );
        let completion = match self.read_range(&request.path, request.offset, request.len) {
            Ok(data) => ReadCompletion::filled(request.ticket, data),
            Err(e) => {
                // A handle that failed mid-read may be in a bad state
                self.handles.lock().remove(&request.path);
                ReadCompletion::failed(request.ticket, e.to_string())
            }
        };
        let _ = inbox.send(completion);
    }
}

/// Reads on a Tokio runtime and posts the completion from the task
///
/// The tick thread must not itself be a runtime worker when the cache is
/// flushed, since flushing blocks on outstanding completions.
#[derive(Debug, Clone)]
pub struct TokioBlockReader {
    handle: tokio::runtime::Handle,
}

impl TokioBlockReader {
    /// Spawn reads onto the given runtime
    pub const fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Spawn reads onto the runtime of the calling context, if any
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

async fn read_range_async(path: &Path, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
    use tokio::io::{AsyncReadExt, AsyncSeekExt};

    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buffer = vec![0u8; len];
    file.read_exact(&mut buffer).await?;
    Ok(buffer)
}

impl BlockReader for TokioBlockReader {
    fn submit(&self, request: ReadRequest, inbox: CompletionSender) {
        self.handle.spawn(async move {
            let completion =
                match read_range_async(&request.path, request.offset, request.len).await {
                    Ok(data) => ReadCompletion::filled(request.ticket, data),
                    Err(e) => ReadCompletion::failed(request.ticket, e.to_string()),
                };
            let _ = inbox.send(completion);
        });
    }
}

/// Queues requests until the caller completes them
///
/// For hosts that run their own I/O loop: drain the queue, perform the reads
/// however the platform prefers, and complete each request. Nothing is
/// posted to the inbox until then, which also makes completion order fully
/// controllable.
#[derive(Debug, Default)]
pub struct QueuedBlockReader {
    queue: Mutex<Vec<(ReadRequest, CompletionSender)>>,
}

impl QueuedBlockReader {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests awaiting completion
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Check if no request is waiting
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Snapshot of the waiting requests in submission order
    pub fn requests(&self) -> Vec<ReadRequest> {
        self.queue.lock().iter().map(|(r, _)| r.clone()).collect()
    }

    /// Complete one request with the given outcome
    ///
    /// Returns `false` if no waiting request carries `ticket`.
    pub fn complete(&self, ticket: Handle, outcome: ReadOutcome) -> bool {
        let mut queue = self.queue.lock();
        let Some(position) = queue.iter().position(|(r, _)| r.ticket == ticket) else {
            return false;
        };
        let (request, inbox) = queue.remove(position);
        let _ = inbox.send(ReadCompletion {
            ticket: request.ticket,
            outcome,
        });
        true
    }

    /// Perform every waiting read from disk and post the completions
    pub fn complete_all(&self) -> usize {
        let drained: Vec<_> = self.queue.lock().drain(..).collect();
        let count = drained.len();
        let files = FileBlockReader::new();
        for (request, inbox) in drained {
            files.submit(request, inbox);
        }
        count
    }

    /// Fail every waiting read
    pub fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<_> = self.queue.lock().drain(..).collect();
        let count = drained.len();
        for (request, inbox) in drained {
            let _ = inbox.send(ReadCompletion::failed(request.ticket, reason));
        }
        count
    }
}

impl BlockReader for QueuedBlockReader {
    fn submit(&self, request: ReadRequest, inbox: CompletionSender) {
        self.queue.lock().push((request, inbox));
    }

    fn cancel_pending(&self) {
        let cancelled = self.fail_all("cancelled");
        if cancelled > 0 {
            debug!("Cancelled {} queued block reads", cancelled);
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn ticket() -> Handle {
        Arena::new().insert(())
    }

    fn sample_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(b"0123456789abcdef").expect("write");
        file.flush().expect("flush");
        file
    }

    #[test]
    fn test_file_reader_reads_range() {
        let file = sample_file();
        let reader = FileBlockReader::new();
        let (tx, mut rx) = completion_channel();

        let request = ReadRequest {
            ticket: ticket(),
            path: file.path().to_path_buf(),
            offset: 4,
            len: 6,
        };
        reader.submit(request, tx);

        let completion = rx.try_recv().expect("completion posted");
        assert_eq!(completion.outcome, ReadOutcome::Filled(b"456789".to_vec()));
    }

    #[test]
    fn test_file_reader_reports_short_read() {
        let file = sample_file();
        let reader = FileBlockReader::new();
        let (tx, mut rx) = completion_channel();

        reader.submit(
            ReadRequest {
                ticket: ticket(),
                path: file.path().to_path_buf(),
                offset: 12,
                len: 8,
            },
            tx,
        );

        let completion = rx.try_recv().expect("completion posted");
        assert!(matches!(completion.outcome, ReadOutcome::Failed(_)));
    }

    #[test]
    fn test_file_reader_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let reader = FileBlockReader::new();
        let (tx, mut rx) = completion_channel();

        reader.submit(
            ReadRequest {
                ticket: ticket(),
                path: dir.path().join("missing.dat"),
                offset: 0,
                len: 1,
            },
            tx,
        );

        let completion = rx.try_recv().expect("completion posted");
        assert!(matches!(completion.outcome, ReadOutcome::Failed(_)));
    }

    #[test]
    fn test_queued_reader_holds_until_completed() {
        let file = sample_file();
        let reader = QueuedBlockReader::new();
        let (tx, mut rx) = completion_channel();
        let t = ticket();

        reader.submit(
            ReadRequest {
                ticket: t,
                path: file.path().to_path_buf(),
                offset: 0,
                len: 4,
            },
            tx.clone(),
        );
        assert_eq!(reader.len(), 1);
        assert!(rx.try_recv().is_err());

        assert!(reader.complete(t, ReadOutcome::Filled(vec![1, 2, 3, 4])));
        assert!(!reader.complete(t, ReadOutcome::Failed("again".into())));
        assert!(reader.is_empty());
        assert_eq!(
            rx.try_recv().expect("posted").outcome,
            ReadOutcome::Filled(vec![1, 2, 3, 4])
        );

        reader.submit(
            ReadRequest {
                ticket: t,
                path: file.path().to_path_buf(),
                offset: 0,
                len: 4,
            },
            tx,
        );
        assert_eq!(reader.complete_all(), 1);
        assert_eq!(
            rx.try_recv().expect("posted").outcome,
            ReadOutcome::Filled(b"0123".to_vec())
        );
    }

    #[test]
    fn test_queued_reader_cancel_fails_waiting_requests() {
        let reader = QueuedBlockReader::new();
        let (tx, mut rx) = completion_channel();
        let t = ticket();
        reader.submit(
            ReadRequest {
                ticket: t,
                path: PathBuf::from("unused.dat"),
                offset: 0,
                len: 4,
            },
            tx,
        );

        reader.cancel_pending();
        assert!(reader.is_empty());
        let completion = rx.try_recv().expect("posted");
        assert_eq!(completion.ticket, t);
        assert!(matches!(completion.outcome, ReadOutcome::Failed(_)));

        // Nothing queued: no-op
        reader.cancel_pending();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_tokio_reader_posts_completion() {
        let file = sample_file();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("runtime");
        let reader = TokioBlockReader::new(runtime.handle().clone());
        let (tx, mut rx) = completion_channel();

        reader.submit(
            ReadRequest {
                ticket: ticket(),
                path: file.path().to_path_buf(),
                offset: 10,
                len: 6,
            },
            tx,
        );

        let completion = rx.blocking_recv().expect("completion posted");
        assert_eq!(completion.outcome, ReadOutcome::Filled(b"abcdef".to_vec()));
    }
}
