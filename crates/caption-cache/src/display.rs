//! On-screen caption lifetime.
//!
//! Items wait out their pre-display delay, then count their time-to-live
//! down to zero. They leave strictly from the front of the list: an expired
//! item behind a live one stays until everything older has gone, and an item
//! taller than the viewport stays until its pan-scroll has shown every line.

use std::collections::VecDeque;

use tracing::debug;

use crate::command::{ParsedCaption, Piece};
use crate::config::CaptionConfig;
use crate::layout::{CaptionLayout, WorkUnit};
use crate::request::RequestId;

/// Floating-point slack when comparing accumulated time
const TIME_EPSILON: f32 = 1e-4;

/// Lifecycle phase of an item
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ItemPhase {
    /// Waiting out the delay; seconds remaining
    PreDisplay(f32),
    /// On screen; time-to-live remaining
    Visible(f32),
}

/// One caption on screen
#[derive(Debug, Clone)]
pub struct DisplayItem {
    id: RequestId,
    key_hash: u32,
    text: String,
    pieces: Vec<Piece>,
    layout: CaptionLayout,
    delay: f32,
    ttl: f32,
    initial_lifespan: f32,
    visible: bool,
    visible_time: f32,
    from_speaker: bool,
    sound_effect: bool,
}

impl DisplayItem {
    /// Create an item from a parsed caption and its layout
    pub fn new(
        id: RequestId,
        key_hash: u32,
        parsed: ParsedCaption,
        layout: CaptionLayout,
        lifespan: f32,
        from_speaker: bool,
    ) -> Self {
        let text = parsed.plain_text();
        Self {
            id,
            key_hash,
            text,
            pieces: parsed.pieces,
            layout,
            delay: parsed.meta.delay.unwrap_or(0.0).max(0.0),
            ttl: lifespan.max(0.0),
            initial_lifespan: lifespan.max(0.0),
            visible: false,
            visible_time: 0.0,
            from_speaker,
            sound_effect: parsed.meta.sound_effect,
        }
    }

    /// Request that produced the item
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// Repeat-suppression hash
    pub const fn key_hash(&self) -> u32 {
        self.key_hash
    }

    /// Caption text with commands removed
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Parsed pieces, kept for relayout
    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    /// Current layout
    pub const fn layout(&self) -> &CaptionLayout {
        &self.layout
    }

    /// Laid-out work units
    pub fn units(&self) -> &[WorkUnit] {
        &self.layout.units
    }

    /// Replace the layout after a width change
    pub fn set_layout(&mut self, layout: CaptionLayout) {
        self.layout = layout;
    }

    /// Lifecycle phase
    pub const fn phase(&self) -> ItemPhase {
        if self.visible {
            ItemPhase::Visible(self.ttl)
        } else {
            ItemPhase::PreDisplay(self.delay)
        }
    }

    /// Time-to-live remaining
    pub const fn ttl_remaining(&self) -> f32 {
        self.ttl
    }

    /// Lifespan the item started with
    pub const fn initial_lifespan(&self) -> f32 {
        self.initial_lifespan
    }

    /// Caption from the tracked speaking entity
    pub const fn is_from_speaker(&self) -> bool {
        self.from_speaker
    }

    /// Caption marked `<sfx>`
    pub const fn is_sound_effect(&self) -> bool {
        self.sound_effect
    }

    /// Whether anything visible was laid out
    pub fn is_valid(&self) -> bool {
        !self.layout.is_empty()
    }

    /// Whether the delay has elapsed
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    fn advance(&mut self, dt: f32) {
        if self.visible {
            self.ttl = (self.ttl - dt).max(0.0);
            self.visible_time += dt;
        } else {
            self.delay = (self.delay - dt).max(0.0);
            self.visible = self.delay <= 0.0;
        }
    }

    /// Scroll offsets: the resting position, then one per overflowing line
    pub fn pan_offsets(&self, viewport_height: u32) -> Vec<u32> {
        let mut offsets = vec![0];
        for unit in &self.layout.units {
            let bottom = unit.bottom();
            if bottom > viewport_height {
                let offset = bottom - viewport_height;
                if offsets.last().is_some_and(|last| offset > *last) {
                    offsets.push(offset);
                }
            }
        }
        offsets
    }

    fn pan_step_time(&self, positions: usize, crossfade: f32) -> f32 {
        (self.initial_lifespan / positions as f32)
            .max(crossfade)
            .max(TIME_EPSILON)
    }

    /// Current pan offset and cross-fade factor
    fn pan_state(&self, viewport_height: u32, crossfade: f32) -> (u32, f32) {
        let offsets = self.pan_offsets(viewport_height);
        if offsets.len() == 1 {
            return (0, 1.0);
        }
        let step_time = self.pan_step_time(offsets.len(), crossfade);
        let step = ((self.visible_time / step_time) as usize).min(offsets.len() - 1);
        let into_step = self.visible_time - step as f32 * step_time;
        let fade = if step > 0 && crossfade > 0.0 {
            (into_step / crossfade).clamp(0.0, 1.0)
        } else {
            1.0
        };
        (offsets[step], fade)
    }

    /// Seconds of pan-scroll still to show
    fn pan_remaining(&self, viewport_height: u32, crossfade: f32) -> f32 {
        let positions = self.pan_offsets(viewport_height).len();
        if positions == 1 {
            return 0.0;
        }
        let total = self.pan_step_time(positions, crossfade) * positions as f32;
        (total - self.visible_time).max(0.0)
    }

    /// Whether every pan position has been shown
    pub fn pan_complete(&self, viewport_height: u32, crossfade: f32) -> bool {
        self.pan_remaining(viewport_height, crossfade) <= TIME_EPSILON
    }

    /// Opacity from the fade windows, before pan cross-fade
    fn fade(&self, settings: &DisplaySettings) -> f32 {
        if !self.visible {
            return 0.0;
        }

        let age = self.initial_lifespan - self.ttl;
        let fade_in = if age < settings.fade_in_hidden {
            0.0
        } else if settings.fade_in > 0.0 && age < settings.fade_in_hidden + settings.fade_in {
            (age - settings.fade_in_hidden) / settings.fade_in
        } else {
            1.0
        };

        let remaining = self
            .ttl
            .max(self.pan_remaining(settings.viewport_height, settings.pan_crossfade));
        let fade_out = if settings.fade_out > 0.0 && remaining < settings.fade_out {
            remaining / settings.fade_out
        } else {
            1.0
        };

        fade_in.min(fade_out).clamp(0.0, 1.0)
    }
}

/// Timing and geometry used by the display manager
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplaySettings {
    /// Leading fully-transparent window
    pub fade_in_hidden: f32,
    /// Linear fade-in
    pub fade_in: f32,
    /// Linear fade-out at end of life
    pub fade_out: f32,
    /// Cross-fade at each pan step
    pub pan_crossfade: f32,
    /// Box grow/shrink time
    pub box_resize_time: f32,
    /// Box opacity animation time
    pub box_fade_time: f32,
    /// Visible height of the box
    pub viewport_height: u32,
    /// Gap between stacked items
    pub item_spacing: u32,
    /// Height of one line in the base font
    pub min_line_height: u32,
}

impl DisplaySettings {
    /// Take timing and geometry from a configuration
    pub const fn from_config(config: &CaptionConfig, min_line_height: u32) -> Self {
        Self {
            fade_in_hidden: config.fade_in_hidden,
            fade_in: config.fade_in,
            fade_out: config.fade_out,
            pan_crossfade: config.pan_crossfade,
            box_resize_time: config.box_resize_time,
            box_fade_time: config.box_fade_time,
            viewport_height: config.viewport_height,
            item_spacing: config.item_spacing,
            min_line_height,
        }
    }
}

/// A visible item with its render state
#[derive(Debug, Clone, Copy)]
pub struct VisibleItem<'a> {
    /// The item
    pub item: &'a DisplayItem,
    /// Opacity in `0.0..=1.0`
    pub opacity: f32,
    /// Pixels scrolled off the top
    pub pan_offset: u32,
    /// Top of the item within the box
    pub y: u32,
}

/// Ordered list of displayed captions plus the box animation
#[derive(Debug)]
pub struct DisplayManager {
    items: VecDeque<DisplayItem>,
    settings: DisplaySettings,
    box_height: f32,
    box_from: f32,
    box_to: f32,
    box_elapsed: f32,
    box_opacity: f32,
}

impl DisplayManager {
    /// Create an empty display
    pub fn new(settings: DisplaySettings) -> Self {
        let line = settings.min_line_height as f32;
        Self {
            items: VecDeque::new(),
            settings,
            box_height: line,
            box_from: line,
            box_to: line,
            box_elapsed: 0.0,
            box_opacity: 0.0,
        }
    }

    /// Current settings
    pub const fn settings(&self) -> &DisplaySettings {
        &self.settings
    }

    /// Change the visible box height
    pub fn set_viewport_height(&mut self, height: u32) {
        self.settings.viewport_height = height;
    }

    /// Append an item at the back
    pub fn push(&mut self, item: DisplayItem) {
        self.items.push_back(item);
    }

    /// Items oldest first
    pub fn items(&self) -> impl Iterator<Item = &DisplayItem> {
        self.items.iter()
    }

    /// Mutable items oldest first
    pub fn items_mut(&mut self) -> impl Iterator<Item = &mut DisplayItem> {
        self.items.iter_mut()
    }

    /// Number of active items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if no item is active
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every item
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Animated box height
    pub const fn box_height(&self) -> f32 {
        self.box_height
    }

    /// Animated box opacity
    pub const fn box_opacity(&self) -> f32 {
        self.box_opacity
    }

    /// Age every item by `dt`, retire expired items from the front and
    /// animate the box
    pub fn tick(&mut self, dt: f32) {
        for item in &mut self.items {
            item.advance(dt);
        }

        let (height, crossfade) = (self.settings.viewport_height, self.settings.pan_crossfade);
        while let Some(front) = self.items.front() {
            let done = front.is_visible()
                && front.ttl_remaining() <= 0.0
                && front.pan_complete(height, crossfade);
            if !done {
                break;
            }
            debug!("Retiring caption {}", front.id().get());
            self.items.pop_front();
        }

        self.animate_box(dt);
    }

    fn animate_box(&mut self, dt: f32) {
        let viewport = self.settings.viewport_height;
        let tallest = self
            .items
            .iter()
            .filter(|item| item.is_visible())
            .map(|item| item.layout().height.min(viewport))
            .max();

        let target = tallest.unwrap_or(0).max(self.settings.min_line_height) as f32;
        if (target - self.box_to).abs() > f32::EPSILON {
            self.box_from = self.box_height;
            self.box_to = target;
            self.box_elapsed = 0.0;
        }
        self.box_elapsed += dt;
        self.box_height = if self.settings.box_resize_time > 0.0 {
            let t = (self.box_elapsed / self.settings.box_resize_time).min(1.0);
            (self.box_to - self.box_from).mul_add(t, self.box_from)
        } else {
            self.box_to
        };

        let opacity_target = if tallest.is_some() { 1.0 } else { 0.0 };
        self.box_opacity = if self.settings.box_fade_time > 0.0 {
            let step = dt / self.settings.box_fade_time;
            if opacity_target > self.box_opacity {
                (self.box_opacity + step).min(opacity_target)
            } else {
                (self.box_opacity - step).max(opacity_target)
            }
        } else {
            opacity_target
        };
    }

    /// Items past their delay, stacked top-down with their render state
    pub fn visible_items(&self) -> Vec<VisibleItem<'_>> {
        let mut y = 0;
        let mut visible = Vec::new();
        for item in self.items.iter().filter(|item| item.is_visible()) {
            let (pan_offset, crossfade) =
                item.pan_state(self.settings.viewport_height, self.settings.pan_crossfade);
            visible.push(VisibleItem {
                item,
                opacity: item.fade(&self.settings) * crossfade,
                pan_offset,
                y,
            });
            y += item.layout().height.min(self.settings.viewport_height)
                + self.settings.item_spacing;
        }
        visible
    }
}
