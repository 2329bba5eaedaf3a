//! Stats - consumer ごとの統計とその集計
//!
//! `ConsumerStats` は実行中ちょうど1本の ClaimLoop が所有し、ループ完了時に
//! のみ外へ渡される。`StatsReport::aggregate` は完了済み統計に対する純粋関数
//! で、重複数が claim プロトコルが守られたかどうかの主な指標になる。

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::domain::TaskId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    consumer: usize,

    /// Candidate ids returned by discovery, summed over all cycles.
    found_task_ids: u64,
    /// Candidates that could not be locked (lost race, vanished, ...).
    found_already_locked: u64,
    processed: u64,
    /// Cycles where every candidate failed to lock.
    could_not_lock_any: u64,
    /// Cycles where discovery returned at least one candidate.
    cycles_with_candidates: u64,
    empty_discoveries: u64,
    /// Removals rejected because the lock expired mid-processing.
    removal_failures: u64,
    /// Removals that failed for store reasons (outage, bad request).
    removal_errors: u64,

    processed_ids: Vec<TaskId>,
}

impl ConsumerStats {
    pub fn new(consumer: usize) -> Self {
        Self {
            consumer,
            ..Self::default()
        }
    }

    pub fn consumer(&self) -> usize {
        self.consumer
    }

    pub fn found_task_ids(&self) -> u64 {
        self.found_task_ids
    }

    pub fn found_already_locked(&self) -> u64 {
        self.found_already_locked
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn could_not_lock_any(&self) -> u64 {
        self.could_not_lock_any
    }

    pub fn cycles_with_candidates(&self) -> u64 {
        self.cycles_with_candidates
    }

    pub fn empty_discoveries(&self) -> u64 {
        self.empty_discoveries
    }

    pub fn removal_failures(&self) -> u64 {
        self.removal_failures
    }

    pub fn removal_errors(&self) -> u64 {
        self.removal_errors
    }

    /// Processed task ids in processing order.
    pub fn processed_ids(&self) -> &[TaskId] {
        &self.processed_ids
    }

    pub(crate) fn record_candidates(&mut self, count: usize) {
        self.cycles_with_candidates += 1;
        self.found_task_ids += count as u64;
    }

    pub(crate) fn record_already_locked(&mut self) {
        self.found_already_locked += 1;
    }

    pub(crate) fn record_could_not_lock_any(&mut self) {
        self.could_not_lock_any += 1;
    }

    pub(crate) fn record_empty_discovery(&mut self) {
        self.empty_discoveries += 1;
    }

    pub(crate) fn record_processed(&mut self, id: TaskId) {
        self.processed += 1;
        self.processed_ids.push(id);
    }

    pub(crate) fn record_removal_failure(&mut self) {
        self.removal_failures += 1;
    }

    pub(crate) fn record_removal_error(&mut self) {
        self.removal_errors += 1;
    }

    /// Percentage of candidate-bearing cycles that ended with a processed
    /// task.
    pub fn loop_efficiency(&self) -> Option<f64> {
        percentage(self.processed, self.cycles_with_candidates)
    }

    /// Percentage of lock attempts that won.
    pub fn lock_efficiency(&self) -> Option<f64> {
        percentage(self.processed, self.processed + self.found_already_locked)
    }
}

fn percentage(part: u64, whole: u64) -> Option<f64> {
    (whole > 0).then(|| part as f64 / whole as f64 * 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumerRow {
    pub consumer: usize,
    pub found_task_ids: u64,
    pub found_already_locked: u64,
    pub processed: u64,
    pub could_not_lock_any: u64,
    pub empty_discoveries: u64,
    pub removal_failures: u64,
    pub removal_errors: u64,
    pub loop_efficiency: Option<f64>,
    pub lock_efficiency: Option<f64>,
}

impl From<&ConsumerStats> for ConsumerRow {
    fn from(stats: &ConsumerStats) -> Self {
        Self {
            consumer: stats.consumer,
            found_task_ids: stats.found_task_ids,
            found_already_locked: stats.found_already_locked,
            processed: stats.processed,
            could_not_lock_any: stats.could_not_lock_any,
            empty_discoveries: stats.empty_discoveries,
            removal_failures: stats.removal_failures,
            removal_errors: stats.removal_errors,
            loop_efficiency: stats.loop_efficiency(),
            lock_efficiency: stats.lock_efficiency(),
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    pub rows: Vec<ConsumerRow>,
    pub total_processed: u64,
    /// Distinct task ids processed more than once, by any consumers.
    pub duplicate_task_ids: usize,
    /// Executions of those ids, counting every run of each.
    pub duplicate_executions: u64,
    /// Locks that expired while their task was being processed. Such a task
    /// may have run again elsewhere without showing up as a duplicate, since
    /// only successful removals are recorded.
    pub lost_locks: u64,
    /// Processed tasks left in the store by a failed removal. They become
    /// claimable again once their lock expires.
    pub removal_errors: u64,
}

impl StatsReport {
    pub fn aggregate(stats: &[ConsumerStats]) -> Self {
        let mut seen: HashMap<TaskId, u64> = HashMap::new();
        for id in stats.iter().flat_map(|s| s.processed_ids.iter()) {
            *seen.entry(*id).or_default() += 1;
        }
        let duplicates: Vec<u64> = seen.into_values().filter(|&count| count > 1).collect();

        Self {
            rows: stats.iter().map(ConsumerRow::from).collect(),
            total_processed: stats.iter().map(|s| s.processed).sum(),
            duplicate_task_ids: duplicates.len(),
            duplicate_executions: duplicates.iter().sum(),
            lost_locks: stats.iter().map(|s| s.removal_failures).sum(),
            removal_errors: stats.iter().map(|s| s.removal_errors).sum(),
        }
    }

    /// No task ran twice, and none was left behind to run again.
    pub fn is_clean(&self) -> bool {
        self.duplicate_task_ids == 0 && self.lost_locks == 0 && self.removal_errors == 0
    }
}

fn fmt_efficiency(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "### Stats ###")?;
        writeln!(f)?;
        writeln!(f, "- totFound: total task ids found")?;
        writeln!(f, "- totLockedFound: candidates found already locked")?;
        writeln!(f, "- totProcessed: tasks processed and removed")?;
        writeln!(f, "- couldNotLock: cycles where no candidate could be locked")?;
        writeln!(f, "- empty: discovery passes that found nothing")?;
        writeln!(f, "- lostLock: removals rejected because the lock had expired")?;
        writeln!(f, "- rmErr: removals that failed for store reasons")?;
        writeln!(f, "- loopEff: % of cycles with candidates that processed a task")?;
        writeln!(f, "- lockEff: % of lock attempts that won")?;
        writeln!(f)?;
        writeln!(
            f,
            "Duplicate task ids: {} ({} executions) <-- must be 0",
            self.duplicate_task_ids, self.duplicate_executions
        )?;
        writeln!(
            f,
            "Lost locks: {}, removal errors: {} <-- must be 0",
            self.lost_locks, self.removal_errors
        )?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>8} | {:>8} | {:>14} | {:>12} | {:>12} | {:>6} | {:>8} | {:>6} | {:>8} | {:>8}",
            "consumer",
            "totFound",
            "totLockedFound",
            "totProcessed",
            "couldNotLock",
            "empty",
            "lostLock",
            "rmErr",
            "loopEff",
            "lockEff",
        )?;
        for row in &self.rows {
            writeln!(
                f,
                "{:>8} | {:>8} | {:>14} | {:>12} | {:>12} | {:>6} | {:>8} | {:>6} | {:>8} | {:>8}",
                row.consumer,
                row.found_task_ids,
                row.found_already_locked,
                row.processed,
                row.could_not_lock_any,
                row.empty_discoveries,
                row.removal_failures,
                row.removal_errors,
                fmt_efficiency(row.loop_efficiency),
                fmt_efficiency(row.lock_efficiency),
            )?;
        }
        write!(f, "total processed: {}", self.total_processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use ulid::Ulid;

    fn id() -> TaskId {
        TaskId::from_ulid(Ulid::new())
    }

    fn stats_with(processed: u64, cycles: u64, already_locked: u64) -> ConsumerStats {
        let mut stats = ConsumerStats::new(0);
        for _ in 0..cycles {
            stats.record_candidates(1);
        }
        for _ in 0..already_locked {
            stats.record_already_locked();
        }
        for _ in 0..processed {
            stats.record_processed(id());
        }
        stats
    }

    #[rstest]
    #[case(5, 10, 0, Some(50.0), Some(100.0))]
    #[case(3, 3, 1, Some(100.0), Some(75.0))]
    #[case(0, 4, 4, Some(0.0), Some(0.0))]
    #[case(0, 0, 0, None, None)]
    fn efficiencies(
        #[case] processed: u64,
        #[case] cycles: u64,
        #[case] already_locked: u64,
        #[case] loop_eff: Option<f64>,
        #[case] lock_eff: Option<f64>,
    ) {
        let stats = stats_with(processed, cycles, already_locked);
        assert_eq!(stats.loop_efficiency(), loop_eff);
        assert_eq!(stats.lock_efficiency(), lock_eff);
    }

    #[test]
    fn candidates_accumulate_per_cycle() {
        let mut stats = ConsumerStats::new(3);
        stats.record_candidates(4);
        stats.record_candidates(2);
        assert_eq!(stats.consumer(), 3);
        assert_eq!(stats.cycles_with_candidates(), 2);
        assert_eq!(stats.found_task_ids(), 6);
    }

    #[test]
    fn disjoint_runs_have_no_duplicates() {
        let mut a = ConsumerStats::new(0);
        let mut b = ConsumerStats::new(1);
        a.record_processed(id());
        a.record_processed(id());
        b.record_processed(id());

        let report = StatsReport::aggregate(&[a, b]);
        assert!(report.is_clean());
        assert_eq!(report.total_processed, 3);
        assert_eq!(report.duplicate_executions, 0);
        assert_eq!(report.rows.len(), 2);
    }

    #[test]
    fn same_id_in_two_consumers_is_a_duplicate() {
        let shared = id();
        let mut a = ConsumerStats::new(0);
        let mut b = ConsumerStats::new(1);
        a.record_processed(shared);
        b.record_processed(shared);
        b.record_processed(id());

        let report = StatsReport::aggregate(&[a, b]);
        assert_eq!(report.duplicate_task_ids, 1);
        assert_eq!(report.duplicate_executions, 2);
        assert!(!report.is_clean());
    }

    #[test]
    fn repeat_within_one_consumer_is_a_duplicate() {
        let shared = id();
        let mut a = ConsumerStats::new(0);
        a.record_processed(shared);
        a.record_processed(shared);
        a.record_processed(shared);

        let report = StatsReport::aggregate(&[a]);
        assert_eq!(report.duplicate_task_ids, 1);
        assert_eq!(report.duplicate_executions, 3);
    }

    #[test]
    fn lost_locks_make_a_run_unclean() {
        let mut a = ConsumerStats::new(0);
        a.record_processed(id());
        a.record_removal_failure();
        let mut b = ConsumerStats::new(1);
        b.record_removal_error();

        let report = StatsReport::aggregate(&[a, b]);
        assert_eq!(report.duplicate_task_ids, 0);
        assert_eq!(report.lost_locks, 1);
        assert_eq!(report.removal_errors, 1);
        assert!(!report.is_clean());
        assert!(
            report
                .to_string()
                .contains("Lost locks: 1, removal errors: 1 <-- must be 0")
        );
    }

    #[test]
    fn a_removal_error_alone_makes_a_run_unclean() {
        let mut a = ConsumerStats::new(0);
        a.record_removal_error();
        let report = StatsReport::aggregate(&[a]);
        assert_eq!(report.lost_locks, 0);
        assert!(!report.is_clean());
    }

    #[test]
    fn empty_run_is_clean() {
        let report = StatsReport::aggregate(&[]);
        assert!(report.is_clean());
        assert_eq!(report.total_processed, 0);
    }

    #[test]
    fn display_renders_one_line_per_consumer() {
        let report = StatsReport::aggregate(&[stats_with(1, 2, 0), ConsumerStats::new(1)]);
        let text = report.to_string();

        assert!(text.contains("Duplicate task ids: 0 (0 executions)"));
        assert!(text.contains("50.00"));
        // idle consumer has no efficiency to show
        assert!(text.lines().any(|l| l.trim_end().ends_with("-")));
        assert!(text.ends_with("total processed: 1"));
    }
}
