//! Two-phase script construction
//!
//! Lines are collected in a [`ScriptBuilder`]; [`ScriptBuilder::finalize`]
//! consumes it and produces an immutable [`ScriptDocument`] whose length
//! markers match its final line count.

/// Placeholder replaced with the script's line count
pub const SCRIPT_LEN_MARKER: &str = "<SCRIPT_LEN>";

/// Placeholder replaced with the script's line count plus one
pub const SCRIPT_LEN_PLUS_ONE_MARKER: &str = "<SCRIPT_LEN+1>";

/// Line counts used to locate a payload appended after the script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthMarkers {
    pub script_len: usize,
    pub script_len_plus_one: usize,
}

/// Accumulates script lines
#[derive(Debug, Clone, Default)]
pub struct ScriptBuilder {
    lines: Vec<String>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text; embedded newlines start new lines
    pub fn push(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.lines.extend(text.as_ref().split('\n').map(str::to_string));
        self
    }

    /// Append an empty line
    pub fn blank(&mut self) -> &mut Self {
        self.lines.push(String::new());
        self
    }

    pub fn extend<I, S>(&mut self, lines: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.push(line);
        }
        self
    }

    /// Append every line of another builder
    pub fn append(&mut self, other: ScriptBuilder) -> &mut Self {
        self.lines.extend(other.lines);
        self
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Freeze the script, filling in the length placeholders
    pub fn finalize(self) -> ScriptDocument {
        let script_len = self.lines.len();
        let markers = LengthMarkers {
            script_len,
            script_len_plus_one: script_len + 1,
        };
        let len = markers.script_len.to_string();
        let len_plus_one = markers.script_len_plus_one.to_string();

        let lines = self
            .lines
            .into_iter()
            .map(|line| {
                if line.contains('<') {
                    line.replace(SCRIPT_LEN_PLUS_ONE_MARKER, &len_plus_one)
                        .replace(SCRIPT_LEN_MARKER, &len)
                } else {
                    line
                }
            })
            .collect();

        ScriptDocument { lines, markers }
    }
}

/// A finished script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDocument {
    lines: Vec<String>,
    markers: LengthMarkers,
}

impl ScriptDocument {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn markers(&self) -> LengthMarkers {
        self.markers
    }

    /// Script text, one newline after every line
    pub fn render(&self) -> String {
        let mut text = String::with_capacity(self.lines.iter().map(|l| l.len() + 1).sum());
        for line in &self.lines {
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}
