//! Tick driver tying the cache, resolver, layout and display together.

use std::path::Path;

use tracing::debug;

use crate::block_cache::{ArchiveId, BlockCache, BlockState, CacheDiagnostics, CacheEvent};
use crate::command;
use crate::config::CaptionConfig;
use crate::display::{DisplayItem, DisplayManager, DisplaySettings, VisibleItem};
use crate::io::BlockReader;
use crate::layout::{LayoutEngine, TextMeasurer};
use crate::repeat::RepeatSuppressor;
use crate::request::{CaptionHints, CaptionResolver, RequestId, ResolvedCaption};
use crate::{CaptionError, Result};

/// Owns all caption state and advances it once per tick
#[derive(Debug)]
pub struct CaptionSystem<R: BlockReader, M: TextMeasurer> {
    config: CaptionConfig,
    cache: BlockCache<R>,
    resolver: CaptionResolver,
    layout: LayoutEngine<M>,
    display: DisplayManager,
    repeats: RepeatSuppressor,
    clock: f64,
    ticks: u64,
}

impl<R: BlockReader, M: TextMeasurer> CaptionSystem<R, M> {
    /// Create a system with no archives loaded
    pub fn new(config: CaptionConfig, reader: R, measurer: M) -> Result<Self> {
        config.validate().map_err(CaptionError::Config)?;

        let layout = LayoutEngine::new(measurer, config.default_color, config.reduced_font);
        let display =
            DisplayManager::new(DisplaySettings::from_config(&config, layout.min_line_height()));

        Ok(Self {
            cache: BlockCache::new(reader, config.cache_budget_bytes),
            resolver: CaptionResolver::new(),
            layout,
            display,
            repeats: RepeatSuppressor::new(),
            clock: 0.0,
            ticks: 0,
            config,
        })
    }

    /// Load an archive; later archives are searched after earlier ones
    pub fn load_archive(&mut self, path: impl AsRef<Path>) -> Result<ArchiveId> {
        self.cache.load_archive(path)
    }

    /// Request a single caption
    ///
    /// Returns `None` when the key is in no loaded archive.
    pub fn request_caption(&mut self, key: &str, hints: CaptionHints) -> Option<RequestId> {
        self.resolver.create_single(&mut self.cache, key, hints)
    }

    /// Request a sentence assembled from several keys
    ///
    /// Returns `None` when any key is in no loaded archive.
    pub fn request_sentence(&mut self, keys: &[&str], hints: CaptionHints) -> Option<RequestId> {
        self.resolver.create_sentence(&mut self.cache, keys, hints)
    }

    /// Advance by `dt` seconds
    ///
    /// Completions are applied first, then satisfied requests become display
    /// items, then every item ages.
    pub fn tick(&mut self, dt: f32) {
        self.clock += f64::from(dt);
        self.ticks += 1;

        for event in self.cache.poll_completions() {
            match event {
                CacheEvent::Resident {
                    archive,
                    block,
                    data,
                    ..
                } => self.resolver.on_block_resident(archive, block, &data),
                CacheEvent::Failed { archive, block, .. } => {
                    self.resolver.on_block_failed(archive, block);
                }
            }
        }

        for caption in self.resolver.drain_satisfied() {
            self.present(caption);
        }

        self.display.tick(dt);
    }

    fn present(&mut self, caption: ResolvedCaption) {
        let from_speaker = caption.hints.from_speaker;
        let parsed = command::parse(&caption.text, from_speaker);

        if parsed.meta.sound_effect && !self.config.show_sound_effects {
            debug!("Suppressing sound-effect caption {}", caption.id.get());
            return;
        }

        if !self.repeats.try_emit(
            caption.key_hash,
            parsed.meta.no_repeat,
            self.clock,
            self.ticks,
        ) {
            debug!("Suppressing repeated caption {:08x}", caption.key_hash);
            return;
        }

        let lifespan = parsed.meta.duration.unwrap_or_else(|| {
            caption
                .hints
                .duration
                .map_or(self.config.default_duration, |d| d + self.config.linger_time)
        });

        let layout = self
            .layout
            .layout(&parsed.pieces, self.config.viewport_width);
        let item = DisplayItem::new(
            caption.id,
            caption.key_hash,
            parsed,
            layout,
            lifespan,
            from_speaker,
        );
        if !item.is_valid() {
            debug!("Caption {} has no visible text", caption.id.get());
            return;
        }
        self.display.push(item);
    }

    /// Drop every displayed item and every outstanding request
    pub fn reset(&mut self) {
        self.display.clear();
        self.resolver.clear();
    }

    /// Change the viewport and lay every active item out again
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.config.viewport_width = width;
        self.config.viewport_height = height;
        self.display.set_viewport_height(height);
        for item in self.display.items_mut() {
            let layout = self.layout.layout(item.pieces(), width);
            item.set_layout(layout);
        }
    }

    /// Visible items with their render state, stacked top-down
    pub fn visible_items(&self) -> Vec<VisibleItem<'_>> {
        self.display.visible_items()
    }

    /// The display list
    pub const fn display(&self) -> &DisplayManager {
        &self.display
    }

    /// Drop all cached blocks, outstanding requests and repeat records
    ///
    /// Reads waiting on the host are cancelled and in-flight reads awaited.
    /// Loaded archives stay loaded.
    pub fn flush_cache(&mut self) {
        self.resolver.clear();
        self.cache.flush();
        self.repeats.clear();
    }

    /// Per-block state of an archive
    pub fn block_states(&self, archive: ArchiveId) -> Option<Vec<BlockState>> {
        self.cache.block_states(archive)
    }

    /// Cache occupancy and lookup counters
    pub fn diagnostics(&self) -> CacheDiagnostics {
        CacheDiagnostics {
            missing_keys: self.resolver.missing_count(),
            ..self.cache.diagnostics()
        }
    }

    /// The block cache
    pub const fn cache(&self) -> &BlockCache<R> {
        &self.cache
    }

    /// Active configuration
    pub const fn config(&self) -> &CaptionConfig {
        &self.config
    }

    /// Requests waiting on blocks
    pub fn outstanding_requests(&self) -> usize {
        self.resolver.outstanding()
    }

    /// Seconds advanced so far
    pub const fn clock(&self) -> f64 {
        self.clock
    }

    /// Ticks run so far
    pub const fn tick_count(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::io::QueuedBlockReader;
    use crate::layout::MonospaceMeasurer;
    use caption_formats::ArchiveBuilder;
    use tempfile::NamedTempFile;

    fn system(
        entries: &[(&str, &str)],
        config: CaptionConfig,
    ) -> (NamedTempFile, CaptionSystem<QueuedBlockReader, MonospaceMeasurer>) {
        let mut builder = ArchiveBuilder::new(256);
        for (key, text) in entries {
            builder.add(key, text).unwrap();
        }
        let mut file = NamedTempFile::new().unwrap();
        builder.write(file.as_file_mut()).unwrap();

        let mut system =
            CaptionSystem::new(config, QueuedBlockReader::new(), MonospaceMeasurer::new(10, 20))
                .unwrap();
        system.load_archive(file.path()).unwrap();
        (file, system)
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = CaptionSystem::new(
            CaptionConfig::default().with_cache_budget(0),
            QueuedBlockReader::new(),
            MonospaceMeasurer::new(10, 20),
        );
        assert!(matches!(result, Err(CaptionError::Config(_))));
    }

    #[test]
    fn test_lifespan_sources() {
        let config = CaptionConfig {
            linger_time: 0.5,
            ..CaptionConfig::default()
        };
        let (_file, mut system) = system(
            &[("plain", "Plain"), ("timed", "<len:7>Timed")],
            config,
        );

        system.request_caption("plain", CaptionHints::default());
        system.request_caption("plain", CaptionHints::default().with_duration(2.0));
        system.request_caption("timed", CaptionHints::default().with_duration(2.0));
        system.cache().reader().complete_all();
        system.tick(0.0);

        let lifespans: Vec<f32> = system
            .display()
            .items()
            .map(DisplayItem::initial_lifespan)
            .collect();
        // Second "plain" lands in the same tick as the first and is suppressed
        assert_eq!(lifespans, vec![4.0, 7.0]);
    }

    #[test]
    fn test_sound_effects_filter() {
        let (_file, mut system) = system(
            &[("door", "<sfx>[Door creaks]")],
            CaptionConfig::default().with_sound_effects(false),
        );
        system.request_caption("door", CaptionHints::default());
        system.cache().reader().complete_all();
        system.tick(0.1);
        assert!(system.display().is_empty());
    }

    #[test]
    fn test_reset_drops_pending_and_active() {
        let (_file, mut system) = system(&[("a", "A"), ("b", "B")], CaptionConfig::default());

        system.request_caption("a", CaptionHints::default());
        system.cache().reader().complete_all();
        system.tick(0.1);
        assert_eq!(system.display().len(), 1);

        system.flush_cache();
        system.request_caption("b", CaptionHints::default());
        assert_eq!(system.outstanding_requests(), 1);

        system.reset();
        assert!(system.display().is_empty());
        assert_eq!(system.outstanding_requests(), 0);

        // The late block arrives but nothing is waiting on it
        system.cache().reader().complete_all();
        system.tick(0.1);
        assert!(system.display().is_empty());
    }

    #[test]
    fn test_flush_with_host_reads_outstanding() {
        let (_file, mut system) = system(&[("a", "A")], CaptionConfig::default());
        assert!(system.request_caption("a", CaptionHints::default()).is_some());
        assert_eq!(system.cache().outstanding_reads(), 1);

        system.flush_cache();
        assert_eq!(system.cache().outstanding_reads(), 0);
        assert_eq!(system.outstanding_requests(), 0);
        assert!(system.cache().reader().is_empty());

        // A fresh request reads the block again and displays
        system.request_caption("a", CaptionHints::default());
        system.cache().reader().complete_all();
        system.tick(0.1);
        assert_eq!(system.display().len(), 1);
    }

    #[test]
    fn test_set_viewport_relays_out() {
        let (_file, mut system) = system(&[("long", "aaaa bbbb cccc")], CaptionConfig::default());
        system.request_caption("long", CaptionHints::default());
        system.cache().reader().complete_all();
        system.tick(0.1);
        assert_eq!(system.visible_items()[0].item.units().len(), 1);

        system.set_viewport(50, 200);
        let units = system.visible_items()[0].item.units().to_vec();
        let texts: Vec<&str> = units.iter().map(|u| u.text.as_str()).collect();
        assert_eq!(texts, vec!["aaaa", "bbbb", "cccc"]);
        assert_eq!(system.config().viewport_width, 50);
    }

    #[test]
    fn test_diagnostics_count_missing_keys() {
        let (_file, mut system) = system(&[("a", "A")], CaptionConfig::default());
        assert!(system.request_caption("zzz", CaptionHints::default()).is_none());
        assert!(system.request_sentence(&["a", "zzz"], CaptionHints::default()).is_none());

        let diagnostics = system.diagnostics();
        assert_eq!(diagnostics.missing_keys, 2);
        assert_eq!(diagnostics.archives, 1);
        assert_eq!(diagnostics.reads_issued, 0);
    }

    #[test]
    fn test_clock_advances() {
        let (_file, mut system) = system(&[("a", "A")], CaptionConfig::default());
        system.tick(0.5);
        system.tick(0.25);
        assert_eq!(system.clock(), 0.75);
        assert_eq!(system.tick_count(), 2);
    }
}
