//! Fonts and colours carried by laid-out text.

use serde::{Deserialize, Serialize};

/// 8-bit RGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
}

impl Rgb {
    /// White, the usual caption colour
    pub const WHITE: Self = Self::new(255, 255, 255);

    /// Create a colour
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `"r,g,b"` with each component in `0..=255`
    pub fn parse(args: &str) -> Option<Self> {
        let mut parts = args.split(',').map(|p| p.trim().parse::<u8>());
        let r = parts.next()?.ok()?;
        let g = parts.next()?.ok()?;
        let b = parts.next()?.ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(r, g, b))
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Font face selected by the bold/italic state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FontStyle {
    /// Regular face
    Normal,
    /// Bold face
    Bold,
    /// Italic face
    Italic,
    /// Bold italic face
    BoldItalic,
    /// Single reduced-size face used on constrained surfaces
    Reduced,
}

impl FontStyle {
    /// Select a face from the bold/italic toggles
    ///
    /// On reduced surfaces every run uses [`FontStyle::Reduced`].
    pub const fn select(bold: bool, italic: bool, reduced: bool) -> Self {
        if reduced {
            return Self::Reduced;
        }
        match (bold, italic) {
            (false, false) => Self::Normal,
            (true, false) => Self::Bold,
            (false, true) => Self::Italic,
            (true, true) => Self::BoldItalic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rgb() {
        assert_eq!(Rgb::parse("255,0,0"), Some(Rgb::new(255, 0, 0)));
        assert_eq!(Rgb::parse(" 10, 20 ,30 "), Some(Rgb::new(10, 20, 30)));
        assert_eq!(Rgb::parse("256,0,0"), None);
        assert_eq!(Rgb::parse("1,2"), None);
        assert_eq!(Rgb::parse("1,2,3,4"), None);
        assert_eq!(Rgb::parse(""), None);
    }

    #[test]
    fn test_font_selection() {
        assert_eq!(FontStyle::select(false, false, false), FontStyle::Normal);
        assert_eq!(FontStyle::select(true, false, false), FontStyle::Bold);
        assert_eq!(FontStyle::select(false, true, false), FontStyle::Italic);
        assert_eq!(FontStyle::select(true, true, false), FontStyle::BoldItalic);
        assert_eq!(FontStyle::select(true, true, true), FontStyle::Reduced);
    }
}
