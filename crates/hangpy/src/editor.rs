use crate::keywords::HELP_FUNCTION;

pub const EXAMPLE_PROGRAM: &str =
    "출력(\"HangPy 준비 완료!\")\n이름 = 입력(\"이름: \")\n출력(\"안녕,\", 이름)\n";

/// The guest source buffer. A run takes a snapshot of [`Editor::text`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Editor {
    text: String,
}

impl Editor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An editor holding the example program.
    #[must_use]
    pub fn with_example() -> Self {
        Self {
            text: EXAMPLE_PROGRAM.to_string(),
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Append `snippet` on a line of its own.
    pub fn append_snippet(&mut self, snippet: &str) {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }
        self.text.push_str(snippet);
    }

    pub fn insert_help_call(&mut self) {
        self.append_snippet(&format!("{HELP_FUNCTION}()\n"));
    }

    pub fn insert_example(&mut self) {
        self.append_snippet(EXAMPLE_PROGRAM);
    }

    /// Gutter line count.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.text.matches('\n').count() + 1
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
