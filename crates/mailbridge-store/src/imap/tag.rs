//! IMAP command tags.

/// Generates sequential command tags ("A0001", "A0002", ...).
///
/// Tags only need to be unique among in-flight commands, so the counter
/// wraps instead of failing after `u32::MAX` commands.
#[derive(Debug, Clone)]
pub struct TagGenerator {
    counter: u32,
    prefix: char,
}

impl TagGenerator {
    /// Creates a tag generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self { counter: 0, prefix }
    }

    /// Returns the next tag.
    pub fn next(&mut self) -> String {
        self.counter = self.counter.wrapping_add(1);
        format!("{}{:04}", self.prefix, self.counter)
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_sequential_and_padded() {
        let mut tags = TagGenerator::default();
        assert_eq!(tags.next(), "A0001");
        assert_eq!(tags.next(), "A0002");
        for _ in 3..100 {
            let _ = tags.next();
        }
        assert_eq!(tags.next(), "A0100");
    }

    #[test]
    fn custom_prefix() {
        let mut tags = TagGenerator::new('T');
        assert_eq!(tags.next(), "T0001");
    }

    #[test]
    fn counter_wraps() {
        let mut tags = TagGenerator {
            counter: u32::MAX,
            prefix: 'A',
        };
        assert_eq!(tags.next(), "A0000");
    }
}
