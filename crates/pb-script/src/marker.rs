//! Activity marker protocol
//!
//! Build scripts announce each step by printing a line starting with
//! [`ACTIVITY_PREFIX`]; the rest of that line is the step's label. The
//! executor watches remote output for these lines to show what each host is
//! doing and how much output the current step has produced.

use std::time::Instant;

/// Prefix of a step announcement line
pub const ACTIVITY_PREFIX: &str = "========================= Performing ";

/// Output fragment that makes a build untrustworthy
pub const CLOCK_SKEW_WARNING: &str = "Clock skew detected";

/// Label shown before a host prints its first marker
pub const INITIAL_LABEL: &str = "starting up";

/// The label announced by `line`, if it is a marker line
pub fn activity_label(line: &str) -> Option<&str> {
    line.strip_prefix(ACTIVITY_PREFIX).map(str::trim_end)
}

/// Shell line printing a marker for `label`
pub fn marker_echo(label: &str) -> String {
    format!("echo \"{}{}\"", ACTIVITY_PREFIX, escape_double_quoted(label))
}

/// Escape text for use inside a double-quoted shell string
pub fn escape_double_quoted(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Classification of one output line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Step announcement; the label changed
    Marker,
    /// Ordinary output
    Output,
    /// Clock skew warning; the build must be stopped
    ClockSkew,
}

/// Follows a host's current step from its output lines
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    label: String,
    lines: u64,
    updated_at: Instant,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            label: INITIAL_LABEL.to_string(),
            lines: 0,
            updated_at: Instant::now(),
        }
    }

    /// Record one output line.
    ///
    /// A marker line resets the line count to zero; every other line adds one.
    pub fn observe(&mut self, line: &str) -> LineKind {
        self.updated_at = Instant::now();
        if let Some(label) = activity_label(line) {
            self.label = label.to_string();
            self.lines = 0;
            return LineKind::Marker;
        }

        self.lines += 1;
        if line.contains(CLOCK_SKEW_WARNING) {
            LineKind::ClockSkew
        } else {
            LineKind::Output
        }
    }

    /// Current step label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Lines seen since the label last changed
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// When the last line arrived
    pub fn updated_at(&self) -> Instant {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_length() {
        assert_eq!(ACTIVITY_PREFIX.len(), 37);
    }

    #[test]
    fn test_marker_label_and_line_count() {
        let mut tracker = ActivityTracker::new();
        assert_eq!(tracker.label(), INITIAL_LABEL);

        assert_eq!(tracker.observe("Sourcing /etc/profile"), LineKind::Output);
        assert_eq!(
            tracker.observe("========================= Performing make all test"),
            LineKind::Marker
        );
        assert_eq!(tracker.label(), "make all test");
        assert_eq!(tracker.lines(), 0);

        for _ in 0..3 {
            tracker.observe("g++ -c foo.cpp");
        }
        assert_eq!(tracker.label(), "make all test");
        assert_eq!(tracker.lines(), 3);
    }

    #[test]
    fn test_marker_trailing_whitespace_trimmed() {
        assert_eq!(
            activity_label("========================= Performing Finishing up; status=0  \r"),
            Some("Finishing up; status=0")
        );
        assert_eq!(activity_label("Performing make"), None);
    }

    #[test]
    fn test_empty_marker_resets_label() {
        assert_eq!(activity_label("========================= Performing "), Some(""));
        assert_eq!(activity_label("========================= Performing \r"), Some(""));

        let mut tracker = ActivityTracker::new();
        tracker.observe("========================= Performing make");
        tracker.observe("cc -c foo.c");
        tracker.observe("cc -c bar.c");
        assert_eq!(tracker.observe("========================= Performing "), LineKind::Marker);
        assert_eq!(tracker.label(), "");
        assert_eq!(tracker.lines(), 0);
    }

    #[test]
    fn test_clock_skew_detected() {
        let mut tracker = ActivityTracker::new();
        let kind = tracker.observe("make: warning:  Clock skew detected.  Your build may be incomplete.");
        assert_eq!(kind, LineKind::ClockSkew);
        assert_eq!(tracker.lines(), 1);
    }

    #[test]
    fn test_marker_echo_escapes() {
        assert_eq!(
            marker_echo("make \"all\" $X"),
            "echo \"========================= Performing make \\\"all\\\" \\$X\""
        );
    }
}
