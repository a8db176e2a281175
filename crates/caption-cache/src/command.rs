//! Inline caption commands.
//!
//! Caption strings carry commands of the form `<name>` or `<name:args>`:
//!
//! | Command | Effect |
//! |---|---|
//! | `<cr>` | line break |
//! | `<clr:r,g,b>` / `<clr>` | push / pop a colour |
//! | `<playerclr:r,g,b:r,g,b>` | push the first colour for the speaker, else the second |
//! | `<b>`, `<i>` | toggle bold / italic |
//! | `<len:s>` | override the lifespan |
//! | `<norepeat:s>` | repeat-suppression interval |
//! | `<delay:s>` | pre-display delay |
//! | `<sfx>` | sound-effect caption |
//! | `<gender:first:second>` | `first` for the speaker, else `second` |
//!
//! A `<` with no `>` within [`MAX_COMMAND_LEN`] characters is literal text.
//! Unknown commands are stripped, and a command with malformed arguments does
//! nothing.

use tracing::trace;

use crate::style::Rgb;

/// Longest command body, in characters, searched for a closing `>`
pub const MAX_COMMAND_LEN: usize = 128;

/// Layout-affecting command
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// End the current line
    LineBreak,
    /// Push a colour
    PushColor(Rgb),
    /// Pop a colour; the base colour is never popped
    PopColor,
    /// Toggle bold
    Bold,
    /// Toggle italic
    Italic,
}

/// Plain text or a layout command, in caption order
#[derive(Debug, Clone, PartialEq)]
pub enum Piece {
    /// Visible characters
    Text(String),
    /// Style or line command
    Command(Command),
}

/// Caption-level settings gathered from commands
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CaptionMeta {
    /// `<len>` lifespan override, last one wins
    pub duration: Option<f32>,
    /// `<norepeat>` interval
    pub no_repeat: Option<f32>,
    /// `<delay>` pre-display delay
    pub delay: Option<f32>,
    /// `<sfx>` present
    pub sound_effect: bool,
}

/// A caption split into text and commands
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedCaption {
    /// Text runs and layout commands
    pub pieces: Vec<Piece>,
    /// Caption-level settings
    pub meta: CaptionMeta,
}

impl ParsedCaption {
    /// Visible text with every command removed
    pub fn plain_text(&self) -> String {
        self.pieces
            .iter()
            .filter_map(|piece| match piece {
                Piece::Text(text) => Some(text.as_str()),
                Piece::Command(_) => None,
            })
            .collect()
    }
}

/// Split a caption string into text and commands
///
/// `from_speaker` selects `<gender>` variants and `<playerclr>` colours.
pub fn parse(text: &str, from_speaker: bool) -> ParsedCaption {
    let mut parsed = ParsedCaption::default();
    let mut literal = String::new();
    let mut rest = text;

    while let Some(open) = rest.find('<') {
        literal.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let Some(close) = find_close(after) else {
            // Unterminated or oversized: the '<' is ordinary text
            literal.push('<');
            rest = after;
            continue;
        };

        let body = &after[..close];
        rest = &after[close + 1..];
        let (name, args) = body.split_once(':').unwrap_or((body, ""));
        apply(&mut parsed, &mut literal, name.trim(), args, from_speaker);
    }
    literal.push_str(rest);
    flush_text(&mut parsed, &mut literal);
    parsed
}

/// Byte index of the `>` closing a command, if within the length limit
///
/// A second `<` before the `>` means the first one was not a command.
fn find_close(after: &str) -> Option<usize> {
    after
        .char_indices()
        .take(MAX_COMMAND_LEN + 1)
        .find(|&(_, c)| c == '>' || c == '<')
        .filter(|&(_, c)| c == '>')
        .map(|(i, _)| i)
}

fn flush_text(parsed: &mut ParsedCaption, literal: &mut String) {
    if !literal.is_empty() {
        parsed.pieces.push(Piece::Text(std::mem::take(literal)));
    }
}

fn push_command(parsed: &mut ParsedCaption, literal: &mut String, command: Command) {
    flush_text(parsed, literal);
    parsed.pieces.push(Piece::Command(command));
}

fn parse_seconds(args: &str) -> Option<f32> {
    args.trim().parse::<f32>().ok().filter(|v| v.is_finite())
}

fn apply(
    parsed: &mut ParsedCaption,
    literal: &mut String,
    name: &str,
    args: &str,
    from_speaker: bool,
) {
    let is = |candidate: &str| name.eq_ignore_ascii_case(candidate);

    if is("cr") {
        push_command(parsed, literal, Command::LineBreak);
    } else if is("clr") {
        if args.trim().is_empty() {
            push_command(parsed, literal, Command::PopColor);
        } else if let Some(color) = Rgb::parse(args) {
            push_command(parsed, literal, Command::PushColor(color));
        }
    } else if is("playerclr") {
        let colors = args
            .split_once(':')
            .and_then(|(speaker, other)| Some((Rgb::parse(speaker)?, Rgb::parse(other)?)));
        if let Some((speaker, other)) = colors {
            let color = if from_speaker { speaker } else { other };
            push_command(parsed, literal, Command::PushColor(color));
        }
    } else if is("b") {
        push_command(parsed, literal, Command::Bold);
    } else if is("i") {
        push_command(parsed, literal, Command::Italic);
    } else if is("len") {
        if let Some(seconds) = parse_seconds(args).filter(|s| *s > 0.0) {
            parsed.meta.duration = Some(seconds);
        }
    } else if is("norepeat") {
        if let Some(seconds) = parse_seconds(args) {
            parsed.meta.no_repeat = Some(seconds);
        }
    } else if is("delay") {
        if let Some(seconds) = parse_seconds(args).filter(|s| *s >= 0.0) {
            parsed.meta.delay = Some(seconds);
        }
    } else if is("sfx") {
        parsed.meta.sound_effect = true;
    } else if is("gender") {
        if let Some((first, second)) = args.split_once(':') {
            literal.push_str(if from_speaker { first } else { second });
        }
    } else {
        trace!("Stripping unknown caption command <{}>", name);
    }
}
