//! Block residency manager.
//!
//! Keeps the directory of every loaded archive in memory and streams data
//! blocks in on demand. Each `(archive, block)` pair is Absent, Pending (one
//! read in flight) or Resident (buffer held). Resident blocks are evicted
//! least-recently-touched first whenever resident bytes exceed the budget;
//! Pending blocks, blocks with registered dependents and the most recently
//! touched block are never evicted.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use caption_formats::{ArchiveError, ArchiveIndex, DirectoryEntry, caption_hash};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::arena::{Arena, Handle};
use crate::io::{BlockReader, CompletionInbox, CompletionSender, ReadOutcome, ReadRequest};
use crate::lru::LruOrder;
use crate::{CaptionError, Result};

/// Index of a loaded archive, in load order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ArchiveId(usize);

impl ArchiveId {
    /// Position in load order
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Residency of one block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockState {
    /// Not in memory, no read issued
    Absent,
    /// Read in flight
    Pending,
    /// Buffer in memory
    Resident,
}

/// Notification produced by [`BlockCache::poll_completions`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// Block became resident
    Resident {
        /// Archive
        archive: ArchiveId,
        /// Block number
        block: u32,
        /// Dependents registered while the read was in flight
        dependents: usize,
        /// Block contents
        data: Bytes,
    },
    /// Read failed; the block is Absent again
    Failed {
        /// Archive
        archive: ArchiveId,
        /// Block number
        block: u32,
        /// Reader's failure reason
        reason: String,
    },
}

/// Cache occupancy snapshot for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheDiagnostics {
    /// Loaded archives
    pub archives: usize,
    /// Blocks with a read in flight
    pub pending_blocks: usize,
    /// Blocks held in memory
    pub resident_blocks: usize,
    /// Bytes held in memory
    pub resident_bytes: usize,
    /// Configured byte budget
    pub budget_bytes: usize,
    /// Reads submitted
    pub reads_issued: u64,
    /// Reads completed successfully
    pub completions: u64,
    /// Reads failed
    pub failures: u64,
    /// Blocks evicted
    pub evictions: u64,
    /// Key lookups that found nothing
    pub missing_keys: u64,
}

#[derive(Debug)]
struct LoadedArchive {
    path: PathBuf,
    index: ArchiveIndex,
    blocks: Vec<Option<Handle>>,
}

#[derive(Debug)]
enum EntryData {
    Pending,
    Resident(Bytes),
}

#[derive(Debug)]
struct CacheEntry {
    archive: ArchiveId,
    block: u32,
    data: EntryData,
    dependents: usize,
}

#[derive(Debug, Default)]
struct CacheStats {
    reads_issued: u64,
    completions: u64,
    failures: u64,
    evictions: u64,
}

/// Block residency manager for a set of loaded archives
pub struct BlockCache<R: BlockReader> {
    archives: Vec<LoadedArchive>,
    entries: Arena<CacheEntry>,
    lru: LruOrder,
    resident_bytes: usize,
    budget: usize,
    reader: R,
    sender: CompletionSender,
    inbox: CompletionInbox,
    outstanding: usize,
    stats: CacheStats,
}

impl<R: BlockReader> BlockCache<R> {
    /// Create an empty cache with a resident-byte budget
    pub fn new(reader: R, budget: usize) -> Self {
        let (sender, inbox) = crate::io::completion_channel();
        Self {
            archives: Vec::new(),
            entries: Arena::new(),
            lru: LruOrder::new(),
            resident_bytes: 0,
            budget,
            reader,
            sender,
            inbox,
            outstanding: 0,
            stats: CacheStats::default(),
        }
    }

    /// Load an archive's header and directory
    ///
    /// An archive with a bad magic, unsupported version, malformed directory
    /// or truncated data section is rejected whole and never consulted.
    pub fn load_archive(&mut self, path: impl AsRef<Path>) -> Result<ArchiveId> {
        let path = path.as_ref();
        let index = match Self::read_index(path) {
            Ok(index) => index,
            Err(e) => {
                warn!("Rejecting caption archive {}: {}", path.display(), e);
                return Err(e);
            }
        };

        info!(
            "Loaded caption archive {}: {} blocks of {} bytes, {} entries",
            path.display(),
            index.header.num_blocks,
            index.header.block_size,
            index.len()
        );

        let id = ArchiveId(self.archives.len());
        self.archives.push(LoadedArchive {
            path: path.to_path_buf(),
            blocks: vec![None; index.header.num_blocks as usize],
            index,
        });
        Ok(id)
    }

    fn read_index(path: &Path) -> Result<ArchiveIndex> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let index = ArchiveIndex::read(&mut BufReader::new(file))?;
        if file_len < index.header.file_len() {
            return Err(ArchiveError::InvalidHeader(format!(
                "data section truncated: file is {} bytes, header requires {}",
                file_len,
                index.header.file_len()
            ))
            .into());
        }
        Ok(index)
    }

    /// Number of loaded archives
    pub fn archive_count(&self) -> usize {
        self.archives.len()
    }

    /// Directory of a loaded archive
    pub fn archive_index(&self, archive: ArchiveId) -> Option<&ArchiveIndex> {
        self.archives.get(archive.0).map(|a| &a.index)
    }

    /// File path of a loaded archive
    pub fn archive_path(&self, archive: ArchiveId) -> Option<&Path> {
        self.archives.get(archive.0).map(|a| a.path.as_path())
    }

    /// Find a key hash, searching archives in load order
    pub fn find_hash(&self, hash: u32) -> Option<(ArchiveId, DirectoryEntry)> {
        self.archives.iter().enumerate().find_map(|(i, archive)| {
            archive
                .index
                .find(hash)
                .and_then(|pos| archive.index.entry(pos))
                .map(|entry| (ArchiveId(i), *entry))
        })
    }

    /// Find a caption key, searching archives in load order
    pub fn find_key(&self, key: &str) -> Option<(ArchiveId, DirectoryEntry)> {
        self.find_hash(caption_hash(key))
    }

    fn slot(&self, archive: ArchiveId, block: u32) -> Result<Option<Handle>> {
        let loaded = self
            .archives
            .get(archive.0)
            .ok_or(CaptionError::UnknownArchive(archive.0))?;
        loaded.blocks.get(block as usize).copied().ok_or_else(|| {
            CaptionError::Archive(ArchiveError::InvalidHeader(format!(
                "block {} out of range for archive {}",
                block, archive.0
            )))
        })
    }

    fn set_slot(&mut self, archive: ArchiveId, block: u32, handle: Option<Handle>) {
        if let Some(slot) = self
            .archives
            .get_mut(archive.0)
            .and_then(|a| a.blocks.get_mut(block as usize))
        {
            *slot = handle;
        }
    }

    /// Current state of a block
    pub fn state(&self, archive: ArchiveId, block: u32) -> BlockState {
        match self.slot(archive, block) {
            Ok(Some(handle)) => match self.entries.get(handle).map(|e| &e.data) {
                Some(EntryData::Pending) => BlockState::Pending,
                Some(EntryData::Resident(_)) => BlockState::Resident,
                None => BlockState::Absent,
            },
            _ => BlockState::Absent,
        }
    }

    /// Make a block resident, issuing at most one read for it
    ///
    /// An Absent block gets a read submitted for exactly `block_size` bytes at
    /// its file offset and becomes Pending. A Pending block is left alone. In
    /// every case the block becomes the most recently touched.
    pub fn ensure_resident(&mut self, archive: ArchiveId, block: u32) -> Result<BlockState> {
        if let Some(handle) = self.slot(archive, block)? {
            self.lru.touch(handle);
            return Ok(self.state(archive, block));
        }

        let loaded = &self.archives[archive.0];
        let path = loaded.path.clone();
        let offset = loaded.index.header.block_offset(block);
        let len = loaded.index.header.block_size as usize;

        let handle = self.entries.insert(CacheEntry {
            archive,
            block,
            data: EntryData::Pending,
            dependents: 0,
        });
        self.set_slot(archive, block, Some(handle));
        self.lru.touch(handle);

        debug!(
            "Requesting block {} of archive {} ({} bytes at {})",
            block, archive.0, len, offset
        );
        self.outstanding += 1;
        self.stats.reads_issued += 1;
        self.reader.submit(
            ReadRequest {
                ticket: handle,
                path,
                offset,
                len,
            },
            self.sender.clone(),
        );

        Ok(BlockState::Pending)
    }

    /// Mark a block as most recently used
    pub fn touch(&mut self, archive: ArchiveId, block: u32) {
        if let Ok(Some(handle)) = self.slot(archive, block) {
            self.lru.touch(handle);
        }
    }

    /// Register a dependent on a Pending block
    ///
    /// Returns `false` if the block is not Pending. The count is handed back
    /// in the [`CacheEvent`] for the block's completion and then cleared.
    pub fn add_dependent(&mut self, archive: ArchiveId, block: u32) -> bool {
        let Ok(Some(handle)) = self.slot(archive, block) else {
            return false;
        };
        match self.entries.get_mut(handle) {
            Some(entry) if matches!(entry.data, EntryData::Pending) => {
                entry.dependents += 1;
                true
            }
            _ => false,
        }
    }

    /// Contents of a Resident block
    pub fn block_data(&self, archive: ArchiveId, block: u32) -> Option<Bytes> {
        let handle = self.slot(archive, block).ok()??;
        match &self.entries.get(handle)?.data {
            EntryData::Resident(data) => Some(data.clone()),
            EntryData::Pending => None,
        }
    }

    /// Drain the completion inbox
    ///
    /// Pending blocks whose reads finished become Resident (or Absent on
    /// failure), then the byte budget is enforced.
    pub fn poll_completions(&mut self) -> Vec<CacheEvent> {
        let mut events = Vec::new();
        while let Ok(completion) = self.inbox.try_recv() {
            self.outstanding = self.outstanding.saturating_sub(1);
            if let Some(event) = self.apply_completion(completion.ticket, completion.outcome) {
                events.push(event);
            }
        }

        if !events.is_empty() {
            self.enforce_budget();
        }
        events
    }

    fn apply_completion(&mut self, ticket: Handle, outcome: ReadOutcome) -> Option<CacheEvent> {
        let Some(entry) = self.entries.get_mut(ticket) else {
            trace!("Ignoring stale read completion for slot {}", ticket.index());
            return None;
        };
        let (archive, block) = (entry.archive, entry.block);
        let expected = self.archives[archive.0].index.header.block_size as usize;

        let reason = match outcome {
            ReadOutcome::Filled(data) if data.len() == expected => {
                let dependents = std::mem::take(&mut entry.dependents);
                let data = Bytes::from(data);
                entry.data = EntryData::Resident(data.clone());
                self.resident_bytes += data.len();
                self.stats.completions += 1;
                trace!(
                    "Block {} of archive {} resident, {} dependents",
                    block, archive.0, dependents
                );
                return Some(CacheEvent::Resident {
                    archive,
                    block,
                    dependents,
                    data,
                });
            }
            ReadOutcome::Filled(data) => {
                format!("short read: {} of {} bytes", data.len(), expected)
            }
            ReadOutcome::Failed(reason) => reason,
        };

        warn!(
            "Read of block {} from archive {} failed: {}",
            block, archive.0, reason
        );
        self.entries.remove(ticket);
        self.lru.remove(ticket);
        self.set_slot(archive, block, None);
        self.stats.failures += 1;
        Some(CacheEvent::Failed {
            archive,
            block,
            reason,
        })
    }

    fn enforce_budget(&mut self) {
        if self.resident_bytes <= self.budget {
            return;
        }

        let newest = self.lru.newest();
        let mut over = self.resident_bytes - self.budget;
        let mut victims = Vec::new();
        for handle in self.lru.oldest_first() {
            if over == 0 {
                break;
            }
            if Some(handle) == newest {
                continue;
            }
            if let Some(CacheEntry {
                data: EntryData::Resident(data),
                dependents: 0,
                ..
            }) = self.entries.get(handle)
            {
                over = over.saturating_sub(data.len());
                victims.push(handle);
            }
        }

        for handle in victims {
            self.evict(handle);
        }

        if self.resident_bytes > self.budget {
            debug!(
                "Eviction deferred: {} resident bytes over budget of {}",
                self.resident_bytes, self.budget
            );
        }
    }

    fn evict(&mut self, handle: Handle) {
        let Some(entry) = self.entries.remove(handle) else {
            return;
        };
        self.lru.remove(handle);
        self.set_slot(entry.archive, entry.block, None);
        if let EntryData::Resident(data) = entry.data {
            self.resident_bytes -= data.len();
        }
        self.stats.evictions += 1;
        trace!("Evicted block {} of archive {}", entry.block, entry.archive.0);
    }

    /// Drop all resident and pending state
    ///
    /// Reads still waiting on the host are cancelled through
    /// [`BlockReader::cancel_pending`], then outstanding reads are awaited and
    /// their buffers discarded, so no late completion can land on a reused
    /// slot. Archive directories stay loaded; the next reference to any block
    /// reads it again. This blocks the calling thread and must not be called
    /// from inside an async runtime.
    pub fn flush(&mut self) {
        if self.outstanding > 0 {
            self.reader.cancel_pending();
        }
        while self.outstanding > 0 {
            if self.inbox.blocking_recv().is_none() {
                break;
            }
            self.outstanding -= 1;
        }

        debug!(
            "Flushing block cache: {} entries, {} resident bytes",
            self.entries.len(),
            self.resident_bytes
        );
        self.entries.clear();
        self.lru.clear();
        for archive in &mut self.archives {
            archive.blocks.fill(None);
        }
        self.resident_bytes = 0;
    }

    /// Per-block state of one archive
    pub fn block_states(&self, archive: ArchiveId) -> Option<Vec<BlockState>> {
        let loaded = self.archives.get(archive.0)?;
        Some(
            (0..loaded.blocks.len() as u32)
                .map(|block| self.state(archive, block))
                .collect(),
        )
    }

    /// Bytes of Resident block data
    pub const fn resident_bytes(&self) -> usize {
        self.resident_bytes
    }

    /// Configured byte budget
    pub const fn budget(&self) -> usize {
        self.budget
    }

    /// Reads submitted but not yet drained from the inbox
    pub const fn outstanding_reads(&self) -> usize {
        self.outstanding
    }

    /// The reader reads are submitted to
    pub const fn reader(&self) -> &R {
        &self.reader
    }

    /// Occupancy snapshot
    pub fn diagnostics(&self) -> CacheDiagnostics {
        let (pending, resident) =
            self.entries
                .iter()
                .fold((0, 0), |(p, r), (_, entry)| match entry.data {
                    EntryData::Pending => (p + 1, r),
                    EntryData::Resident(_) => (p, r + 1),
                });
        CacheDiagnostics {
            archives: self.archives.len(),
            pending_blocks: pending,
            resident_blocks: resident,
            resident_bytes: self.resident_bytes,
            budget_bytes: self.budget,
            reads_issued: self.stats.reads_issued,
            completions: self.stats.completions,
            failures: self.stats.failures,
            evictions: self.stats.evictions,
            missing_keys: 0,
        }
    }
}

impl<R: BlockReader> std::fmt::Debug for BlockCache<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCache")
            .field("archives", &self.archives.len())
            .field("entries", &self.entries.len())
            .field("resident_bytes", &self.resident_bytes)
            .field("budget", &self.budget)
            .field("outstanding", &self.outstanding)
            .finish_non_exhaustive()
    }
}
