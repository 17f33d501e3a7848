//! Client-side `$(name)` template expansion.
//!
//! Substitutions are textual: the value is pasted into the statement before
//! it is sent, so quoting is the caller's business (`'$(name)'`).

use crate::bind::BindValue;

/// Named substitution values for a statement template.
#[derive(Debug, Clone, Default)]
pub struct Substitutions {
    entries: Vec<(String, BindValue)>,
}

impl Substitutions {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a substitution.
    pub fn set(&mut self, name: &str, value: BindValue) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    /// Remove all substitutions.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Check if no substitutions are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get(&self, name: &str) -> Option<&BindValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Expand every `$(name)` token that has a value. Unknown tokens are left in place.
    pub fn apply(&self, template: &str) -> String {
        if self.entries.is_empty() {
            return template.to_string();
        }

        let bytes = template.as_bytes();
        let mut out = String::with_capacity(template.len());
        let mut pos = 0;

        for start in memchr::memmem::find_iter(bytes, b"$(") {
            if start < pos {
                continue;
            }
            let name_start = start + 2;
            let Some(len) = memchr::memchr(b')', &bytes[name_start..]) else {
                break;
            };
            let name_end = name_start + len;
            if let Some(value) = self.get(&template[name_start..name_end]) {
                out.push_str(&template[pos..start]);
                out.push_str(&value.to_text());
                pos = name_end + 1;
            }
        }

        out.push_str(&template[pos..]);
        out
    }
}
