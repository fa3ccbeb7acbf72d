//! Terminal styling for weave reports
//!
//! Only status words are colored; the rest of each line is written plain.
//! A set `NO_COLOR` wins over whatever `--color` asks for.

use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Color mode for stdout given the `--color` value
pub fn resolve_color_choice(flag: Option<&str>) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    match flag {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

/// Highlight applied to a status word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// The class was rewritten or passed verification
    Changed,
    /// The class is emitted as read
    Unchanged,
    /// Label in front of a report detail
    Detail,
}

impl Tone {
    fn color_spec(self) -> ColorSpec {
        let mut spec = ColorSpec::new();
        match self {
            Tone::Changed => spec.set_fg(Some(Color::Green)).set_bold(true),
            Tone::Unchanged => spec.set_fg(Some(Color::Yellow)).set_bold(true),
            Tone::Detail => spec.set_fg(Some(Color::Cyan)),
        };
        spec
    }
}

/// Report writer over stdout
///
/// Write errors are ignored: a closed pipe must not turn a finished weave
/// into a failure.
pub struct StyledOutput {
    stdout: StandardStream,
}

impl StyledOutput {
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            stdout: StandardStream::stdout(choice),
        }
    }

    /// Write `word` in `tone` and stay on the current line
    pub fn tag(&mut self, word: &str, tone: Tone) {
        let _ = self.stdout.set_color(&tone.color_spec());
        let _ = write!(self.stdout, "{}", word);
        let _ = self.stdout.reset();
    }

    /// Finish the current line with `rest`
    pub fn line(&mut self, rest: &str) {
        let _ = writeln!(self.stdout, "{}", rest);
    }

    pub fn flush(&mut self) {
        let _ = self.stdout.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_flag() {
        if std::env::var_os("NO_COLOR").is_some() {
            return;
        }
        assert!(matches!(resolve_color_choice(Some("never")), ColorChoice::Never));
        assert!(matches!(resolve_color_choice(Some("always")), ColorChoice::Always));
        assert!(matches!(resolve_color_choice(Some("sometimes")), ColorChoice::Auto));
        assert!(matches!(resolve_color_choice(None), ColorChoice::Auto));
    }

    #[test]
    fn test_tones_are_distinct() {
        let changed = Tone::Changed.color_spec();
        let unchanged = Tone::Unchanged.color_spec();
        let detail = Tone::Detail.color_spec();
        assert_eq!(changed.fg(), Some(&Color::Green));
        assert_eq!(unchanged.fg(), Some(&Color::Yellow));
        assert!(changed.bold() && unchanged.bold());
        assert!(!detail.bold());
    }
}
