//! Multipart boundary generator.
//!
//! Boundaries look like `----mailcompose-?=_1-<base>`. The `_` can never
//! appear in quoted-printable output and `?` never in base64, so an encoded
//! body can not accidentally contain a delimiter line. Bodies are not
//! scanned for collisions.

use chrono::Utc;

/// Literal prefix of every boundary.
pub const BOUNDARY_PREFIX: &str = "----mailcompose-?=_";

/// Generates unique boundaries for one message.
///
/// The counter starts at 1 and is owned by the generator, so independent
/// compositions never share state.
#[derive(Debug, Clone)]
pub struct BoundaryGenerator {
    counter: u32,
    base: String,
}

impl BoundaryGenerator {
    /// Creates a generator with a fixed base token.
    ///
    /// A fixed base makes the output fully deterministic.
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            counter: 0,
            base: base.into(),
        }
    }

    /// Creates a generator whose base token is the current time in nanoseconds.
    #[must_use]
    pub fn from_clock() -> Self {
        let now = Utc::now();
        let base = now
            .timestamp_nanos_opt()
            .map_or_else(|| now.timestamp_millis().to_string(), |nanos| nanos.to_string());
        Self::new(base)
    }

    /// Generates the next boundary.
    ///
    /// # Panics
    ///
    /// Panics if the counter would overflow `u32::MAX`, which would require
    /// four billion multipart nodes in a single message.
    #[must_use]
    pub fn next(&mut self) -> String {
        self.counter = self
            .counter
            .checked_add(1)
            .unwrap_or_else(|| panic!("boundary counter overflow after {} boundaries", u32::MAX));
        format!("{BOUNDARY_PREFIX}{}-{}", self.counter, self.base)
    }

    /// Returns the number of boundaries generated so far.
    #[must_use]
    pub const fn current(&self) -> u32 {
        self.counter
    }

    /// Returns the base token.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
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
    fn test_boundary_sequence() {
        let mut generator = BoundaryGenerator::new("test");
        assert_eq!(generator.next(), "----mailcompose-?=_1-test");
        assert_eq!(generator.next(), "----mailcompose-?=_2-test");
        assert_eq!(generator.current(), 2);
    }

    #[test]
    fn test_generators_are_independent() {
        let mut first = BoundaryGenerator::new("a");
        let mut second = BoundaryGenerator::new("a");
        let _ = first.next();
        let _ = first.next();
        assert_eq!(second.next(), "----mailcompose-?=_1-a");
    }

    #[test]
    fn test_uniqueness() {
        let mut generator = BoundaryGenerator::new("x");
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(generator.next()), "duplicate boundary generated");
        }
    }

    #[test]
    fn test_from_clock_has_numeric_base() {
        let generator = BoundaryGenerator::from_clock();
        assert!(!generator.base().is_empty());
        assert!(generator.base().chars().all(|c| c.is_ascii_digit() || c == '-'));
    }

    #[test]
    #[should_panic(expected = "boundary counter overflow")]
    fn test_overflow_detection() {
        let mut generator = BoundaryGenerator::new("x");
        generator.counter = u32::MAX;
        let _ = generator.next();
    }
}
