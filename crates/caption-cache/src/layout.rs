//! Word-wrap and work units.
//!
//! Text is measured one character at a time. The engine remembers the most
//! recent whitespace in the current unit and the width up to it; when the next
//! character would overflow the line it rolls back to that whitespace (which
//! is dropped) and carries the rest of the word onto a new line. A word with
//! no whitespace to fall back on is broken at the overflowing character.
//!
//! Style commands close the current unit and open a new one on the same line.
//! Empty units are discarded.

use crate::command::{Command, Piece};
use crate::style::{FontStyle, Rgb};

/// Per-character text metrics supplied by the host
pub trait TextMeasurer {
    /// Advance width of one character in pixels
    fn char_width(&self, font: FontStyle, ch: char) -> u32;

    /// Line height of a font in pixels
    fn line_height(&self, font: FontStyle) -> u32;
}

/// Fixed-advance metrics, for headless runs and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonospaceMeasurer {
    /// Advance of every character
    pub advance: u32,
    /// Height of every line
    pub line_height: u32,
}

impl MonospaceMeasurer {
    /// Create fixed metrics
    pub const fn new(advance: u32, line_height: u32) -> Self {
        Self {
            advance,
            line_height,
        }
    }
}

impl TextMeasurer for MonospaceMeasurer {
    fn char_width(&self, _font: FontStyle, _ch: char) -> u32 {
        self.advance
    }

    fn line_height(&self, _font: FontStyle) -> u32 {
        self.line_height
    }
}

/// One positioned run of text sharing font and colour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    /// Run text
    pub text: String,
    /// Font face
    pub font: FontStyle,
    /// Colour
    pub color: Rgb,
    /// Left edge relative to the item
    pub x: u32,
    /// Top edge relative to the item
    pub y: u32,
    /// Measured width
    pub width: u32,
    /// Line height of the run's font
    pub height: u32,
}

impl WorkUnit {
    /// Right edge
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Bottom edge
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// Laid-out caption content
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptionLayout {
    /// Work units in reading order
    pub units: Vec<WorkUnit>,
    /// Maximum right edge
    pub width: u32,
    /// Maximum bottom edge
    pub height: u32,
}

impl CaptionLayout {
    /// Check if nothing visible was laid out
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Lays parsed captions out against an available width
#[derive(Debug, Clone)]
pub struct LayoutEngine<M: TextMeasurer> {
    measurer: M,
    default_color: Rgb,
    reduced_font: bool,
}

impl<M: TextMeasurer> LayoutEngine<M> {
    /// Create an engine with the base colour and font mode
    pub const fn new(measurer: M, default_color: Rgb, reduced_font: bool) -> Self {
        Self {
            measurer,
            default_color,
            reduced_font,
        }
    }

    /// The text measurer in use
    pub const fn measurer(&self) -> &M {
        &self.measurer
    }

    /// Height of one line in the base font
    pub fn min_line_height(&self) -> u32 {
        self.measurer
            .line_height(FontStyle::select(false, false, self.reduced_font))
    }

    /// Lay out pieces within `width` pixels
    pub fn layout(&self, pieces: &[Piece], width: u32) -> CaptionLayout {
        let mut state = LineBuilder::new(self, width);
        for piece in pieces {
            match piece {
                Piece::Text(text) => {
                    for ch in text.chars() {
                        state.push_char(ch);
                    }
                }
                Piece::Command(Command::LineBreak) => {
                    state.flush_unit();
                    state.end_line();
                }
                Piece::Command(command) => {
                    state.flush_unit();
                    state.apply_style(*command);
                }
            }
        }
        state.finish()
    }
}

/// Most recent whitespace in the pending unit
#[derive(Debug, Clone, Copy)]
struct Break {
    /// Byte index of the whitespace in the pending text
    index: usize,
    /// Pending width before the whitespace
    width_before: u32,
    /// Width of the whitespace itself
    width: u32,
}

struct LineBuilder<'a, M: TextMeasurer> {
    engine: &'a LayoutEngine<M>,
    available: u32,
    units: Vec<WorkUnit>,
    line: Vec<WorkUnit>,
    line_top: u32,
    bold: bool,
    italic: bool,
    colors: Vec<Rgb>,
    pending: String,
    pending_x: u32,
    pending_width: u32,
    last_break: Option<Break>,
}

impl<'a, M: TextMeasurer> LineBuilder<'a, M> {
    fn new(engine: &'a LayoutEngine<M>, available: u32) -> Self {
        Self {
            engine,
            available,
            units: Vec::new(),
            line: Vec::new(),
            line_top: 0,
            bold: false,
            italic: false,
            colors: vec![engine.default_color],
            pending: String::new(),
            pending_x: 0,
            pending_width: 0,
            last_break: None,
        }
    }

    fn font(&self) -> FontStyle {
        FontStyle::select(self.bold, self.italic, self.engine.reduced_font)
    }

    fn color(&self) -> Rgb {
        self.colors.last().copied().unwrap_or(self.engine.default_color)
    }

    fn apply_style(&mut self, command: Command) {
        match command {
            Command::PushColor(color) => self.colors.push(color),
            Command::PopColor => {
                if self.colors.len() > 1 {
                    self.colors.pop();
                }
            }
            Command::Bold => self.bold = !self.bold,
            Command::Italic => self.italic = !self.italic,
            Command::LineBreak => {}
        }
    }

    fn overflows(&self, width: u32) -> bool {
        let occupied = !self.pending.is_empty() || self.pending_x > 0;
        occupied && self.pending_x + self.pending_width + width > self.available
    }

    fn push_char(&mut self, ch: char) {
        let font = self.font();
        let width = self.engine.measurer.char_width(font, ch);

        if ch.is_whitespace() && self.overflows(width) {
            // Break here and drop the whitespace
            self.flush_unit();
            self.end_line();
            return;
        }

        while self.overflows(width) {
            match self.last_break.take() {
                Some(brk) => self.roll_back(brk),
                None => {
                    self.flush_unit();
                    self.end_line();
                }
            }
        }

        if ch.is_whitespace() {
            self.last_break = Some(Break {
                index: self.pending.len(),
                width_before: self.pending_width,
                width,
            });
        }
        self.pending.push(ch);
        self.pending_width += width;
    }

    /// End the line at the remembered whitespace, carrying the tail over
    fn roll_back(&mut self, brk: Break) {
        let space_len = self.pending[brk.index..]
            .chars()
            .next()
            .map_or(0, char::len_utf8);
        let tail_start = brk.index + space_len;
        let tail = self.pending[tail_start..].to_string();
        let tail_width = self.pending_width - brk.width_before - brk.width;

        self.pending.truncate(brk.index);
        self.pending_width = brk.width_before;
        self.flush_unit();
        self.end_line();

        self.pending = tail;
        self.pending_width = tail_width;
    }

    /// Close the pending run as a unit on the current line
    fn flush_unit(&mut self) {
        self.last_break = None;
        if self.pending.is_empty() {
            return;
        }
        let font = self.font();
        self.line.push(WorkUnit {
            text: std::mem::take(&mut self.pending),
            font,
            color: self.color(),
            x: self.pending_x,
            y: 0,
            width: self.pending_width,
            height: self.engine.measurer.line_height(font),
        });
        self.pending_x += self.pending_width;
        self.pending_width = 0;
    }

    /// Position the current line's units and start the next line
    fn end_line(&mut self) {
        let height = self
            .line
            .iter()
            .map(|u| u.height)
            .max()
            .unwrap_or_else(|| self.engine.measurer.line_height(self.font()));
        for mut unit in self.line.drain(..) {
            unit.y = self.line_top;
            self.units.push(unit);
        }
        self.line_top += height;
        self.pending_x = 0;
    }

    fn finish(mut self) -> CaptionLayout {
        self.flush_unit();
        if !self.line.is_empty() {
            self.end_line();
        }
        let width = self.units.iter().map(WorkUnit::right).max().unwrap_or(0);
        let height = self.units.iter().map(WorkUnit::bottom).max().unwrap_or(0);
        CaptionLayout {
            units: self.units,
            width,
            height,
        }
    }
}
