//! Caption request resolution.
//!
//! A request is one key ([`CaptionRequest::Single`]) or an ordered list of
//! keys forming a sentence ([`CaptionRequest::Sentence`]). Every key is looked
//! up when the request is created; if any is missing the whole request fails,
//! so partial sentences are never shown. Tokens whose blocks are already
//! resident are copied out immediately, the rest wait for the block cache to
//! report their block.

use std::collections::HashSet;

use bytes::Bytes;
use caption_formats::archive::decode_caption;
use caption_formats::{ArchiveError, ArchiveResult, DirectoryEntry, caption_hash};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::block_cache::{ArchiveId, BlockCache, BlockState};
use crate::io::BlockReader;

/// Identifier handed back for an accepted request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RequestId(u64);

impl RequestId {
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id, unique for the resolver's lifetime
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Caller-supplied hints for a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionHints {
    /// Requested on-screen duration; also the request's priority
    pub duration: Option<f32>,
    /// Caption originates from the tracked speaking entity
    pub from_speaker: bool,
    /// Log a warning the first time this key is found missing
    pub warn_if_missing: bool,
}

impl CaptionHints {
    /// Set the requested duration
    #[must_use]
    pub const fn with_duration(mut self, seconds: f32) -> Self {
        self.duration = Some(seconds);
        self
    }

    /// Mark the caption as spoken by the tracked entity
    #[must_use]
    pub const fn from_speaker(mut self) -> Self {
        self.from_speaker = true;
        self
    }

    /// Warn once when the key is missing
    #[must_use]
    pub const fn warn_if_missing(mut self) -> Self {
        self.warn_if_missing = true;
        self
    }
}

#[derive(Debug, Clone)]
struct Token {
    archive: ArchiveId,
    entry: DirectoryEntry,
    text: Option<String>,
}

impl Token {
    fn waits_on(&self, archive: ArchiveId, block: u32) -> bool {
        self.text.is_none() && self.archive == archive && self.entry.block == block
    }

    fn fill(&mut self, data: &[u8]) -> ArchiveResult<()> {
        let range = self.entry.block_range();
        let bytes = data.get(range).ok_or(ArchiveError::EntryOutOfBounds {
            hash: self.entry.hash,
        })?;
        self.text = Some(decode_caption(bytes)?);
        Ok(())
    }
}

/// Pending resolution of one or more keys
#[derive(Debug, Clone)]
enum CaptionRequest {
    Single(Token),
    Sentence(Vec<Token>),
}

impl CaptionRequest {
    fn tokens(&self) -> &[Token] {
        match self {
            Self::Single(token) => std::slice::from_ref(token),
            Self::Sentence(tokens) => tokens,
        }
    }

    fn tokens_mut(&mut self) -> &mut [Token] {
        match self {
            Self::Single(token) => std::slice::from_mut(token),
            Self::Sentence(tokens) => tokens,
        }
    }

    fn waits_on(&self, archive: ArchiveId, block: u32) -> bool {
        self.tokens().iter().any(|t| t.waits_on(archive, block))
    }

    fn on_block_resident(
        &mut self,
        archive: ArchiveId,
        block: u32,
        data: &[u8],
    ) -> ArchiveResult<()> {
        for token in self.tokens_mut() {
            if token.waits_on(archive, block) {
                token.fill(data)?;
            }
        }
        Ok(())
    }

    fn is_satisfied(&self) -> bool {
        self.tokens().iter().all(|t| t.text.is_some())
    }

    /// Assembled string once every token is resolved
    fn try_finalize(&self) -> Option<String> {
        match self {
            Self::Single(token) => token.text.clone(),
            Self::Sentence(tokens) => {
                let parts: Option<Vec<&str>> =
                    tokens.iter().map(|t| t.text.as_deref()).collect();
                parts.map(|parts| parts.join(" "))
            }
        }
    }
}

#[derive(Debug)]
struct PendingRequest {
    id: RequestId,
    key_hash: u32,
    hints: CaptionHints,
    request: CaptionRequest,
}

/// Fully resolved caption ready for parsing and layout
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCaption {
    /// Request this resolves
    pub id: RequestId,
    /// Hash used for repeat suppression
    pub key_hash: u32,
    /// Assembled caption string, commands still embedded
    pub text: String,
    /// Hints the request was made with
    pub hints: CaptionHints,
}

/// Tracks outstanding requests until their blocks arrive
#[derive(Debug, Default)]
pub struct CaptionResolver {
    outstanding: Vec<PendingRequest>,
    next_id: u64,
    warned: HashSet<u32>,
    missing: u64,
}

impl CaptionResolver {
    /// Create a resolver with no outstanding requests
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a single caption key
    pub fn create_single<R: BlockReader>(
        &mut self,
        cache: &mut BlockCache<R>,
        key: &str,
        hints: CaptionHints,
    ) -> Option<RequestId> {
        self.create(cache, &[key], false, hints)
    }

    /// Request a sentence assembled from several keys
    ///
    /// The repeat-suppression hash of a sentence is the hash of its keys
    /// joined by single spaces.
    pub fn create_sentence<R: BlockReader>(
        &mut self,
        cache: &mut BlockCache<R>,
        keys: &[&str],
        hints: CaptionHints,
    ) -> Option<RequestId> {
        if keys.is_empty() {
            return None;
        }
        self.create(cache, keys, true, hints)
    }

    fn create<R: BlockReader>(
        &mut self,
        cache: &mut BlockCache<R>,
        keys: &[&str],
        sentence: bool,
        hints: CaptionHints,
    ) -> Option<RequestId> {
        let mut tokens = Vec::with_capacity(keys.len());
        for key in keys {
            let Some((archive, entry)) = cache.find_key(key) else {
                self.note_missing(key, hints.warn_if_missing);
                return None;
            };
            tokens.push(Token {
                archive,
                entry,
                text: None,
            });
        }

        for token in &mut tokens {
            let block = token.entry.block;
            match cache.ensure_resident(token.archive, block) {
                Ok(BlockState::Resident) => {
                    let filled = cache
                        .block_data(token.archive, block)
                        .map(|data| token.fill(&data));
                    if let Some(Err(e)) = filled {
                        warn!("Dropping caption: undecodable string: {}", e);
                        return None;
                    }
                }
                Ok(_) => {
                    cache.add_dependent(token.archive, block);
                }
                Err(e) => {
                    warn!("Dropping caption: {}", e);
                    return None;
                }
            }
        }

        let key_hash = if sentence {
            caption_hash(&keys.join(" "))
        } else {
            tokens.first().map_or(0, |t| t.entry.hash)
        };
        let request = if sentence {
            CaptionRequest::Sentence(tokens)
        } else {
            CaptionRequest::Single(tokens.into_iter().next()?)
        };

        let id = RequestId::new(self.next_id);
        self.next_id += 1;
        trace!("Created caption request {} ({} keys)", id.0, keys.len());
        self.outstanding.push(PendingRequest {
            id,
            key_hash,
            hints,
            request,
        });
        Some(id)
    }

    fn note_missing(&mut self, key: &str, warn_if_missing: bool) {
        self.missing += 1;
        let hash = caption_hash(key);
        if warn_if_missing && self.warned.insert(hash) {
            warn!("Missing caption for key '{}' (hash {:08x})", key, hash);
        } else {
            debug!("Missing caption for key '{}'", key);
        }
    }

    /// Copy strings out of a block that just became resident
    ///
    /// Requests whose string fails to decode are dropped.
    pub fn on_block_resident(&mut self, archive: ArchiveId, block: u32, data: &Bytes) {
        self.outstanding.retain_mut(|pending| {
            match pending.request.on_block_resident(archive, block, data) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Dropping caption request {}: {}", pending.id.0, e);
                    false
                }
            }
        });
    }

    /// Drop every request still waiting on a block whose read failed
    pub fn on_block_failed(&mut self, archive: ArchiveId, block: u32) {
        let before = self.outstanding.len();
        self.outstanding
            .retain(|pending| !pending.request.waits_on(archive, block));
        let dropped = before - self.outstanding.len();
        if dropped > 0 {
            debug!(
                "Dropped {} caption requests waiting on block {} of archive {}",
                dropped,
                block,
                archive.index()
            );
        }
    }

    /// Remove and return every satisfied request, oldest first
    pub fn drain_satisfied(&mut self) -> Vec<ResolvedCaption> {
        let (done, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.outstanding)
            .into_iter()
            .partition(|pending| pending.request.is_satisfied());
        self.outstanding = waiting;

        done.into_iter()
            .filter_map(|pending| {
                let text = pending.request.try_finalize()?;
                Some(ResolvedCaption {
                    id: pending.id,
                    key_hash: pending.key_hash,
                    text,
                    hints: pending.hints,
                })
            })
            .collect()
    }

    /// Drop every outstanding request
    pub fn clear(&mut self) {
        self.outstanding.clear();
    }

    /// Requests not yet satisfied
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Key lookups that found nothing
    pub const fn missing_count(&self) -> u64 {
        self.missing
    }
}
