//! Replicated game settings
//!
//! Each field is an independent last-writer-wins register tagged with a
//! `(revision, writer)` stamp. Merging is commutative and idempotent, so
//! SettingsUpdate broadcasts can arrive duplicated or out of order and every
//! phone still converges on the same record.

use shared::{Difficulty, Modifiers, PlayerId, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Stamp {
    pub revision: u64,
    pub writer: PlayerId,
}

#[derive(Debug, Clone)]
struct Register<T> {
    value: T,
    stamp: Option<Stamp>,
}

impl<T: Clone + PartialEq> Register<T> {
    fn new(value: T) -> Self {
        Self { value, stamp: None }
    }

    /// Returns true if the stored value changed
    fn merge(&mut self, value: &T, stamp: Stamp) -> bool {
        if self.stamp.is_some_and(|current| current >= stamp) {
            return false;
        }
        self.stamp = Some(stamp);
        if self.value == *value {
            return false;
        }
        self.value = value.clone();
        true
    }
}

#[derive(Debug, Clone)]
pub struct SettingsRecord {
    category: Register<String>,
    difficulty: Register<Difficulty>,
    time_limit_ms: Register<u64>,
    num_questions: Register<u32>,
    modifiers: Register<Modifiers>,
    highest_revision: u64,
}

impl SettingsRecord {
    pub fn new(initial: Settings) -> Self {
        Self {
            category: Register::new(initial.category),
            difficulty: Register::new(initial.difficulty),
            time_limit_ms: Register::new(initial.time_limit_ms),
            num_questions: Register::new(initial.num_questions),
            modifiers: Register::new(initial.modifiers),
            highest_revision: 0,
        }
    }

    /// Merges a remote write; returns true if any field changed
    pub fn merge(&mut self, settings: &Settings, stamp: Stamp) -> bool {
        self.highest_revision = self.highest_revision.max(stamp.revision);

        let mut changed = self.category.merge(&settings.category, stamp);
        changed |= self.difficulty.merge(&settings.difficulty, stamp);
        changed |= self.time_limit_ms.merge(&settings.time_limit_ms, stamp);
        changed |= self.num_questions.merge(&settings.num_questions, stamp);
        changed |= self.modifiers.merge(&settings.modifiers, stamp);
        changed
    }

    /// Applies a local write with a revision above anything seen so far
    pub fn write_local(&mut self, writer: PlayerId, settings: &Settings) -> Stamp {
        let stamp = Stamp {
            revision: self.highest_revision.saturating_add(1),
            writer,
        };
        self.merge(settings, stamp);
        stamp
    }

    pub fn current(&self) -> Settings {
        Settings {
            category: self.category.value.clone(),
            difficulty: self.difficulty.value,
            time_limit_ms: self.time_limit_ms.value,
            num_questions: self.num_questions.value,
            modifiers: self.modifiers.value,
        }
    }
}

impl Default for SettingsRecord {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hard(num_questions: u32) -> Settings {
        Settings {
            difficulty: Difficulty::Hard,
            num_questions,
            ..Settings::default()
        }
    }

    fn stamp(revision: u64, writer: u32) -> Stamp {
        Stamp {
            revision,
            writer: PlayerId(writer),
        }
    }

    #[test]
    fn test_newer_revision_wins() {
        let mut record = SettingsRecord::default();
        assert!(record.merge(&hard(10), stamp(1, 1)));
        assert!(record.merge(&hard(3), stamp(2, 1)));
        assert_eq!(record.current().num_questions, 3);
    }

    #[test]
    fn test_out_of_order_delivery_converges() {
        let mut forward = SettingsRecord::default();
        forward.merge(&hard(10), stamp(1, 1));
        forward.merge(&hard(3), stamp(2, 1));

        let mut backward = SettingsRecord::default();
        backward.merge(&hard(3), stamp(2, 1));
        assert!(!backward.merge(&hard(10), stamp(1, 1)));

        assert_eq!(forward.current(), backward.current());
    }

    #[test]
    fn test_duplicate_merge_is_noop() {
        let mut record = SettingsRecord::default();
        assert!(record.merge(&hard(8), stamp(4, 2)));
        assert!(!record.merge(&hard(8), stamp(4, 2)));
        assert_eq!(record.current(), hard(8));
    }

    #[test]
    fn test_writer_breaks_revision_ties() {
        let mut a = SettingsRecord::default();
        a.merge(&hard(4), stamp(1, 1));
        a.merge(&hard(6), stamp(1, 2));

        let mut b = SettingsRecord::default();
        b.merge(&hard(6), stamp(1, 2));
        b.merge(&hard(4), stamp(1, 1));

        assert_eq!(a.current().num_questions, 6);
        assert_eq!(b.current().num_questions, 6);
    }

    #[test]
    fn test_local_write_outranks_seen_revisions() {
        let mut record = SettingsRecord::default();
        record.merge(&hard(10), stamp(7, 1));

        let local = record.write_local(PlayerId(2), &hard(2));
        assert_eq!(local.revision, 8);
        assert_eq!(record.current().num_questions, 2);
    }

    #[test]
    fn test_local_write_after_highest_revision() {
        let mut record = SettingsRecord::default();
        record.merge(&hard(10), stamp(u64::MAX, 1));

        let local = record.write_local(PlayerId(2), &hard(2));
        assert_eq!(local.revision, u64::MAX);
        assert_eq!(record.current().num_questions, 2);
    }
}
