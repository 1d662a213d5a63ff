//! Statistics from the harvest index
//!
//! This module extracts target counts from the storage layer and prints
//! them for `--stats`.

use crate::storage::{RunRecord, Storage, StorageResult, TargetKind, TargetStatus};
use std::collections::BTreeMap;

/// Harvest statistics summary
#[derive(Debug, Clone, Default)]
pub struct HarvestStatistics {
    /// Most recent run, if any run was recorded
    pub latest_run: Option<RunRecord>,

    /// Number of runs ever recorded
    pub total_runs: u64,

    /// Count of targets by dataset kind and status
    pub targets: BTreeMap<TargetKind, BTreeMap<TargetStatus, u64>>,
}

impl HarvestStatistics {
    pub fn count(&self, kind: TargetKind, status: TargetStatus) -> u64 {
        self.targets
            .get(&kind)
            .and_then(|by_status| by_status.get(&status))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_targets(&self) -> u64 {
        self.targets.values().flat_map(|m| m.values()).sum()
    }

    pub fn total_with_status(&self, status: TargetStatus) -> u64 {
        self.targets.values().filter_map(|m| m.get(&status)).sum()
    }
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn Storage) -> StorageResult<HarvestStatistics> {
    let mut targets: BTreeMap<TargetKind, BTreeMap<TargetStatus, u64>> = BTreeMap::new();
    for (kind, status, count) in storage.count_targets()? {
        targets.entry(kind).or_default().insert(status, count);
    }

    Ok(HarvestStatistics {
        latest_run: storage.get_latest_run()?,
        total_runs: storage.count_runs()?,
        targets,
    })
}

/// Formats statistics as the `--stats` report
pub fn format_statistics(stats: &HarvestStatistics) -> String {
    let mut out = String::from("=== Harvest Statistics ===\n\n");

    out.push_str(&format!("Runs recorded: {}\n", stats.total_runs));
    if let Some(run) = &stats.latest_run {
        out.push_str(&format!(
            "Latest run: #{} {} (started {}, finished {})\n",
            run.id,
            run.status.to_db_string(),
            run.started_at,
            run.finished_at.as_deref().unwrap_or("-")
        ));
    }
    out.push('\n');

    out.push_str("Targets by Dataset:\n");
    if stats.targets.is_empty() {
        out.push_str("  (none)\n");
    }
    for (kind, by_status) in &stats.targets {
        let parts: Vec<String> = by_status
            .iter()
            .map(|(status, count)| format!("{} {}", count, status))
            .collect();
        out.push_str(&format!("  {}: {}\n", kind, parts.join(", ")));
    }
    out.push('\n');

    let completed = stats.total_with_status(TargetStatus::Completed);
    let total = stats.total_targets();
    let rate = if total > 0 {
        (completed as f64 / total as f64) * 100.0
    } else {
        0.0
    };
    out.push_str(&format!(
        "Success Rate: {:.1}% ({} / {} targets completed)\n",
        rate, completed, total
    ));

    out
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &HarvestStatistics) {
    print!("{}", format_statistics(stats));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{SqliteStorage, TargetRecord};
    use crate::HarvestError;

    #[test]
    fn test_load_and_format() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("h").unwrap();
        let artifact = tempfile::NamedTempFile::new().unwrap();

        for key in ["1", "2", "3"] {
            storage
                .record_target(run_id, &TargetRecord::completed(TargetKind::Details, key, 1, artifact.path()))
                .unwrap();
        }
        storage
            .record_target(run_id, &TargetRecord::failed(TargetKind::Details, "4", &HarvestError::Cancelled))
            .unwrap();

        let stats = load_statistics(&storage).unwrap();
        assert_eq!(stats.total_runs, 1);
        assert_eq!(stats.count(TargetKind::Details, TargetStatus::Completed), 3);
        assert_eq!(stats.count(TargetKind::Reviews, TargetStatus::Completed), 0);
        assert_eq!(stats.total_targets(), 4);

        let text = format_statistics(&stats);
        assert!(text.contains("details: 3 completed, 1 cancelled"));
        assert!(text.contains("Success Rate: 75.0% (3 / 4 targets completed)"));
        assert!(text.contains("Latest run: #1 running"));
    }

    #[test]
    fn test_empty_index() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let stats = load_statistics(&storage).unwrap();
        let text = format_statistics(&stats);
        assert!(text.contains("(none)"));
        assert!(text.contains("0.0% (0 / 0"));
    }
}
