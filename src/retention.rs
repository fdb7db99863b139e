//! Retention policy: which ledger entries to prune

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::ledger::LedgerEntry;

/// Count and age limits; zero or negative disables a rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_count: Option<i64>,
    pub max_age_days: Option<i64>,
}

impl RetentionPolicy {
    pub fn new(max_count: Option<i64>, max_age_days: Option<i64>) -> Self {
        Self {
            max_count,
            max_age_days,
        }
    }

    fn count_limit(&self) -> Option<usize> {
        self.max_count
            .filter(|n| *n > 0)
            .and_then(|n| usize::try_from(n).ok())
    }

    fn age_limit(&self) -> Option<i64> {
        self.max_age_days.filter(|d| *d > 0)
    }

    /// Whether at least one rule is active
    pub fn is_enabled(&self) -> bool {
        self.count_limit().is_some() || self.age_limit().is_some()
    }

    /// Entries to remove, newest first
    pub fn select_for_pruning(&self, entries: &[LedgerEntry]) -> Vec<LedgerEntry> {
        self.select_for_pruning_at(entries, Utc::now())
    }

    /// Same as [`select_for_pruning`](Self::select_for_pruning) with an explicit clock
    ///
    /// The result is the union of both rules, deduplicated by id. Entries
    /// whose timestamp cannot be parsed are never pruned by age.
    pub fn select_for_pruning_at(&self, entries: &[LedgerEntry], now: DateTime<Utc>) -> Vec<LedgerEntry> {
        let mut sorted: Vec<&LedgerEntry> = entries.iter().collect();
        sorted.sort_by(|a, b| {
            (b.created_at_utc(), &b.created_at).cmp(&(a.created_at_utc(), &a.created_at))
        });

        let mut doomed: HashSet<&str> = HashSet::new();

        if let Some(limit) = self.count_limit() {
            for entry in sorted.iter().copied().skip(limit) {
                doomed.insert(entry.id.as_str());
            }
        }

        // A cutoff before chrono's representable range means nothing is old enough.
        let cutoff = self
            .age_limit()
            .and_then(Duration::try_days)
            .and_then(|age| now.checked_sub_signed(age));
        if let Some(cutoff) = cutoff {
            for entry in sorted.iter().copied() {
                if let Some(created) = entry.created_at_utc() {
                    if created < cutoff {
                        doomed.insert(entry.id.as_str());
                    }
                }
            }
        }

        let mut seen: HashSet<String> = HashSet::new();
        sorted
            .into_iter()
            .filter(|e| doomed.contains(e.id.as_str()) && seen.insert(e.id.clone()))
            .cloned()
            .collect()
    }
}

/// Free-function form of [`RetentionPolicy::select_for_pruning`]
pub fn select_for_pruning(
    entries: &[LedgerEntry],
    max_count: Option<i64>,
    max_age_days: Option<i64>,
) -> Vec<LedgerEntry> {
    RetentionPolicy::new(max_count, max_age_days).select_for_pruning(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::model::fixtures::entry;
    use chrono::SecondsFormat;

    fn aged(now: DateTime<Utc>, days: i64) -> LedgerEntry {
        let created = (now - Duration::days(days)).to_rfc3339_opts(SecondsFormat::Micros, false);
        entry(&format!("age{:03}", days), &created)
    }

    fn ids(entries: &[LedgerEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_union_of_count_and_age() {
        let now = Utc::now();
        let entries: Vec<_> = [100, 50, 5, 1].iter().map(|d| aged(now, *d)).collect();
        let pruned = RetentionPolicy::new(Some(1), Some(30)).select_for_pruning_at(&entries, now);
        assert_eq!(ids(&pruned), vec!["age005", "age050", "age100"]);
    }

    #[test]
    fn test_count_only() {
        let now = Utc::now();
        let entries: Vec<_> = [3, 1, 2].iter().map(|d| aged(now, *d)).collect();
        let pruned = RetentionPolicy::new(Some(2), None).select_for_pruning_at(&entries, now);
        assert_eq!(ids(&pruned), vec!["age003"]);
    }

    #[test]
    fn test_age_only() {
        let now = Utc::now();
        let entries: Vec<_> = [40, 10].iter().map(|d| aged(now, *d)).collect();
        let pruned = RetentionPolicy::new(None, Some(30)).select_for_pruning_at(&entries, now);
        assert_eq!(ids(&pruned), vec!["age040"]);
    }

    #[test]
    fn test_zero_and_negative_disable_rules() {
        let now = Utc::now();
        let entries: Vec<_> = [400, 200, 1].iter().map(|d| aged(now, *d)).collect();
        let policy = RetentionPolicy::new(Some(0), Some(-5));
        assert!(!policy.is_enabled());
        assert!(policy.select_for_pruning_at(&entries, now).is_empty());
    }

    #[test]
    fn test_under_limit_prunes_nothing() {
        let now = Utc::now();
        let entries: Vec<_> = [2, 1].iter().map(|d| aged(now, *d)).collect();
        assert!(RetentionPolicy::new(Some(5), Some(30))
            .select_for_pruning_at(&entries, now)
            .is_empty());
    }

    #[test]
    fn test_unparsable_dates_skipped_by_age_rule() {
        let now = Utc::now();
        let entries = vec![entry("bad", "not a date"), aged(now, 90)];
        let pruned = RetentionPolicy::new(None, Some(30)).select_for_pruning_at(&entries, now);
        assert_eq!(ids(&pruned), vec!["age090"]);
    }

    #[test]
    fn test_huge_age_limit_prunes_nothing() {
        let now = Utc::now();
        let entries: Vec<_> = [10_000, 1].iter().map(|d| aged(now, *d)).collect();
        for days in [1_000_000_000_000, i64::MAX] {
            let pruned = RetentionPolicy::new(None, Some(days)).select_for_pruning_at(&entries, now);
            assert!(pruned.is_empty());
        }
        assert!(select_for_pruning(&entries, None, Some(1_000_000_000_000)).is_empty());

        let pruned = RetentionPolicy::new(Some(1), Some(i64::MAX)).select_for_pruning_at(&entries, now);
        assert_eq!(ids(&pruned), vec!["age10000"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(select_for_pruning(&[], Some(1), Some(1)).is_empty());
    }
}
