/// A bounded text buffer for captured subprocess output. When appending
/// would exceed `max_chars`, the oldest content is dropped down to about
/// three quarters of capacity, always on a UTF-8 character boundary.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    combined: String,
    max_chars: usize,
    truncated: bool,
}

impl OutputBuffer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            combined: String::new(),
            max_chars,
            truncated: false,
        }
    }

    pub fn push(&mut self, text: &str) {
        self.combined.push_str(text);
        if self.combined.len() > self.max_chars {
            self.truncated = true;
            let target = self.max_chars * 3 / 4;
            let len = self.combined.len();
            let mut boundary = len.saturating_sub(target);
            while boundary < len && !self.combined.is_char_boundary(boundary) {
                boundary += 1;
            }
            self.combined = self.combined[boundary..].to_string();
        }
    }

    pub fn as_str(&self) -> &str {
        &self.combined
    }

    pub fn was_truncated(&self) -> bool {
        self.truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_under_cap_without_truncating() {
        let mut buf = OutputBuffer::new(100);
        buf.push("hello");
        assert_eq!(buf.as_str(), "hello");
        assert!(!buf.was_truncated());
    }

    #[test]
    fn truncates_oldest_content_on_overflow() {
        let mut buf = OutputBuffer::new(10);
        buf.push("0123456789");
        buf.push("ABCDEFGHIJ");
        assert!(buf.was_truncated());
        assert!(buf.as_str().len() <= 20);
        assert!(buf.as_str().ends_with('J'));
    }

    #[test]
    fn truncation_respects_utf8_boundaries() {
        let mut buf = OutputBuffer::new(8);
        buf.push("aé€bcdé€bcd");
        // Must not panic, and must produce valid UTF-8.
        let _ = buf.as_str().to_string();
    }
}
