//! Input buffer shared between voice capture and the chat facade.
//!
//! Holds the committed draft text plus a transient interim transcript.
//! Interim text is display-only: it is always superseded by (and never
//! duplicated with) the final fragments committed behind it.

/// Committed draft + transient interim transcript.
#[derive(Debug, Clone, Default)]
pub struct TranscriptBuffer {
    committed: String,
    interim: Option<String>,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a confirmed fragment to the committed text, separated by a
    /// single space when the buffer is non-empty and does not already end
    /// with whitespace. Clears any interim text it supersedes.
    pub fn commit(&mut self, fragment: &str) {
        self.interim = None;
        if fragment.is_empty() {
            return;
        }
        if !self.committed.is_empty() && !self.committed.ends_with(char::is_whitespace) {
            self.committed.push(' ');
        }
        self.committed.push_str(fragment);
    }

    /// Replace the transient interim transcript.
    pub fn set_interim(&mut self, text: impl Into<String>) {
        self.interim = Some(text.into());
    }

    pub fn clear_interim(&mut self) {
        self.interim = None;
    }

    /// Replace the committed draft (operator typed into the input box).
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.committed = text.into();
    }

    pub fn committed(&self) -> &str {
        &self.committed
    }

    pub fn interim(&self) -> Option<&str> {
        self.interim.as_deref()
    }

    /// Committed text plus the interim tail, for display while recording.
    pub fn preview(&self) -> String {
        match &self.interim {
            Some(interim) if !interim.is_empty() => {
                if self.committed.is_empty()
                    || self.committed.ends_with(char::is_whitespace)
                {
                    format!("{}{}", self.committed, interim)
                } else {
                    format!("{} {}", self.committed, interim)
                }
            }
            _ => self.committed.clone(),
        }
    }

    /// Drain the committed text for sending; drops any interim remnant.
    pub fn take(&mut self) -> String {
        self.interim = None;
        std::mem::take(&mut self.committed)
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }
}
