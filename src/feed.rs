//! Text feed assembly
//!
//! Turns raw input lines into the "current text" shown by the overlay. The
//! framing is one of three mutually exclusive modes:
//! - `Clock`: no input is read, the text is the local wall-clock time
//! - `Line`: every input line replaces the text
//! - `Delimited`: lines accumulate until a line equals the delimiter token

mod clock;
mod lines;

pub use clock::{clock_text, until_next_second};
pub use lines::LineSplitter;

use tracing::{debug, warn};

/// Upper bound for accumulated, not yet promoted input
pub const FEED_CAPACITY: usize = 65536;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMode {
    Clock,
    Line,
    /// Flush on a line whose content equals the token; `""` means a blank line
    Delimited(String),
}

impl FeedMode {
    pub fn reads_input(&self) -> bool {
        !matches!(self, FeedMode::Clock)
    }
}

/// Bounded accumulator for delimited input
#[derive(Debug)]
pub struct TextFeed {
    mode: FeedMode,
    pending: String,
    capacity: usize,
}

impl TextFeed {
    pub fn new(mode: FeedMode) -> Self {
        Self::with_capacity(mode, FEED_CAPACITY)
    }

    pub fn with_capacity(mode: FeedMode, capacity: usize) -> Self {
        Self {
            mode,
            pending: String::new(),
            capacity,
        }
    }

    #[cfg(test)]
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Feed one input line (terminator included, if any).
    ///
    /// Returns the text to promote, if this line completed one.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        let content = line.strip_suffix('\n').unwrap_or(line);
        let content = content.strip_suffix('\r').unwrap_or(content);

        match &self.mode {
            FeedMode::Clock => None,
            FeedMode::Line => Some(content.to_string()),
            FeedMode::Delimited(token) if content == token => self.flush(),
            FeedMode::Delimited(_) => {
                let needed = line.len() + usize::from(!line.ends_with('\n'));
                if self.pending.len() + needed > self.capacity {
                    warn!(
                        pending = self.pending.len(),
                        line = line.len(),
                        "feed buffer size exceeded, ignoring line"
                    );
                } else {
                    self.pending.push_str(line);
                    if !line.ends_with('\n') {
                        self.pending.push('\n');
                    }
                }
                None
            }
        }
    }

    /// Input closed: promote whatever is still accumulated
    pub fn close(&mut self) -> Option<String> {
        self.flush()
    }

    fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        debug!(size = self.pending.len(), "flushing feed buffer");
        Some(std::mem::take(&mut self.pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_line_delimits_paragraphs() {
        let mut feed = TextFeed::new(FeedMode::Delimited(String::new()));
        assert_eq!(feed.push_line("alpha\n"), None);
        assert_eq!(feed.push_line("beta\n"), None);
        assert_eq!(feed.push_line("\n"), Some("alpha\nbeta\n".to_string()));
        assert_eq!(feed.pending(), "");

        assert_eq!(feed.push_line("gamma\n"), None);
        assert_eq!(feed.pending(), "gamma\n");
        assert_eq!(feed.close(), Some("gamma\n".to_string()));
    }

    #[test]
    fn test_line_mode_replaces_text() {
        let mut feed = TextFeed::new(FeedMode::Line);
        assert_eq!(feed.push_line("one\n"), Some("one".to_string()));
        assert_eq!(feed.push_line("two\n"), Some("two".to_string()));
        assert_eq!(feed.pending(), "");
        assert_eq!(feed.close(), None);
    }

    #[test]
    fn test_custom_delimiter_is_excluded_from_text() {
        let mut feed = TextFeed::new(FeedMode::Delimited("---".into()));
        feed.push_line("first\n");
        assert_eq!(feed.push_line("---\n"), Some("first\n".to_string()));
        // A delimiter with nothing accumulated promotes nothing.
        assert_eq!(feed.push_line("---\n"), None);
    }

    #[test]
    fn test_overflowing_line_is_dropped_and_accumulation_continues() {
        let mut feed = TextFeed::with_capacity(FeedMode::Delimited(String::new()), 10);
        feed.push_line("12345\n");
        feed.push_line("this line is too long\n");
        assert_eq!(feed.pending(), "12345\n");
        feed.push_line("abc\n");
        assert_eq!(feed.push_line("\n"), Some("12345\nabc\n".to_string()));
    }

    #[test]
    fn test_close_without_input_promotes_nothing() {
        let mut feed = TextFeed::new(FeedMode::Delimited(String::new()));
        assert_eq!(feed.close(), None);
    }

    #[test]
    fn test_unterminated_last_line_gets_a_newline() {
        let mut feed = TextFeed::new(FeedMode::Delimited(String::new()));
        feed.push_line("tail");
        assert_eq!(feed.close(), Some("tail\n".to_string()));
    }

    #[test]
    fn test_clock_mode_ignores_input() {
        let mut feed = TextFeed::new(FeedMode::Clock);
        assert!(!FeedMode::Clock.reads_input());
        assert_eq!(feed.push_line("ignored\n"), None);
    }
}
