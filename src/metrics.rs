//! Progress metrics derived from store contents
//!
//! Snapshots are recomputed from scratch on every request, never
//! incrementally patched, so they cannot drift from the phase records
//! they summarize.

use crate::types::{PhaseStatus, ProgressSnapshot};

/// Per-phase view the calculator reads. The store assembles these from
/// its records.
#[derive(Debug, Clone, Copy)]
pub struct PhaseReading {
    pub status: PhaseStatus,
    pub estimated_minutes: u32,
    /// Wall-clock minutes actually spent, recorded when the phase
    /// reached a terminal state
    pub actual_minutes: Option<f64>,
}

/// Compute a full snapshot from per-phase readings.
#[must_use]
pub fn compute_snapshot(readings: &[PhaseReading]) -> ProgressSnapshot {
    let total_count = readings.len();
    let completed_count = readings
        .iter()
        .filter(|r| r.status == PhaseStatus::Completed)
        .count();

    let actual_minutes_spent: f64 = readings.iter().filter_map(|r| r.actual_minutes).sum();
    let estimated_minutes_total: u32 = readings.iter().map(|r| r.estimated_minutes).sum();

    let estimated_of_completed: u32 = readings
        .iter()
        .filter(|r| r.status == PhaseStatus::Completed)
        .map(|r| r.estimated_minutes)
        .sum();

    let remaining_minutes_estimate: u32 = readings
        .iter()
        .filter(|r| matches!(r.status, PhaseStatus::Pending | PhaseStatus::InProgress))
        .map(|r| r.estimated_minutes)
        .sum();

    ProgressSnapshot {
        completed_count,
        total_count,
        percentage: percentage(completed_count, total_count),
        actual_minutes_spent,
        estimated_minutes_total,
        efficiency_percent: efficiency_percent(estimated_of_completed, actual_minutes_spent),
        remaining_minutes_estimate,
    }
}

/// `round(completed / total * 100)`; an empty pipeline reports 0.
#[must_use]
pub fn percentage(completed_count: usize, total_count: usize) -> u32 {
    if total_count == 0 {
        return 0;
    }
    ((completed_count as f64 / total_count as f64) * 100.0).round() as u32
}

/// `round(estimated_of_completed / actual * 100)`; undefined while no
/// actual time has been recorded.
#[must_use]
pub fn efficiency_percent(estimated_of_completed: u32, actual_minutes_spent: f64) -> Option<u32> {
    if actual_minutes_spent == 0.0 {
        return None;
    }
    Some((f64::from(estimated_of_completed) / actual_minutes_spent * 100.0).round() as u32)
}
