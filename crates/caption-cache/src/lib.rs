//! Runtime closed caption cache.
//!
//! This crate streams caption strings out of block-indexed caption archives
//! (see `caption-formats`), assembles single-key and sentence captions, lays
//! them out into styled lines and drives their on-screen lifetime.
//!
//! The pipeline is tick-driven and single-threaded. The only cross-thread
//! boundary is the asynchronous block read, whose completions are posted to
//! an inbox that the tick polls:
//!
//! ```text
//!  key / sentence ──► CaptionResolver ──► BlockCache ──► BlockReader (async I/O)
//!                          ▲                  │                 │
//!                          │      tick: poll  ◄──── completion inbox
//!                          ▼
//!                  command parse + layout ──► DisplayManager ──► renderer
//! ```
//!
//! Each [`CaptionSystem::tick`] runs three phases in fixed order:
//! 1. the block cache polls read completions and notifies dependents,
//! 2. the resolver finalizes satisfied requests into laid-out display items,
//! 3. the display manager ages items and retires expired ones.
//!
//! # Example
//!
//! ```rust,ignore
//! use caption_cache::{CaptionConfig, CaptionHints, CaptionSystem, FileBlockReader};
//!
//! let mut system =
//!     CaptionSystem::new(CaptionConfig::default(), FileBlockReader::new(), measurer)?;
//! system.load_archive("resource/closecaption_english.dat")?;
//! system.request_caption("npc.greeting", CaptionHints::default());
//!
//! loop {
//!     system.tick(1.0 / 60.0);
//!     for visible in system.visible_items() {
//!         // hand visible.item.units() to the renderer
//!     }
//! }
//! ```

#![warn(missing_docs)]

use thiserror::Error;

// Generation-checked storage for cache entries
pub mod arena;

// Block residency, async population and eviction
pub mod block_cache;

// Inline command parsing
pub mod command;

// Configuration
pub mod config;

// On-screen lifetime of captions
pub mod display;

// Asynchronous read boundary
pub mod io;

// Word-wrap and work units
pub mod layout;

// Recency ordering for eviction
pub mod lru;

// Repeat suppression
pub mod repeat;

// Caption request resolution
pub mod request;

// Fonts and colours
pub mod style;

// Tick driver
mod system;

pub use block_cache::{ArchiveId, BlockCache, BlockState, CacheDiagnostics, CacheEvent};
pub use command::{CaptionMeta, Command, ParsedCaption, Piece};
pub use config::CaptionConfig;
pub use display::{DisplayItem, DisplayManager, DisplaySettings, ItemPhase, VisibleItem};
pub use io::{BlockReader, FileBlockReader, QueuedBlockReader, TokioBlockReader};
pub use layout::{CaptionLayout, LayoutEngine, MonospaceMeasurer, TextMeasurer, WorkUnit};
pub use request::{CaptionHints, CaptionResolver, RequestId, ResolvedCaption};
pub use style::{FontStyle, Rgb};
pub use system::CaptionSystem;

/// Result type for caption operations.
pub type Result<T> = std::result::Result<T, CaptionError>;

/// Errors that can occur in the caption runtime.
///
/// None of these are fatal to the host: the tick pipeline logs them and
/// carries on without the affected caption.
#[derive(Debug, Error)]
pub enum CaptionError {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive rejected or malformed.
    #[error("Archive error: {0}")]
    Archive(#[from] caption_formats::ArchiveError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Archive id does not refer to a loaded archive.
    #[error("Unknown archive: {0}")]
    UnknownArchive(usize),

    /// Caption key not present in any loaded archive.
    #[error("Caption key not found: {0}")]
    KeyNotFound(String),
}

/// Version information for the caption runtime.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
