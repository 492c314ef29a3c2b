//! Diagnostics: run statistics and the aggregated failure report.

use crate::pipeline::GenerationStatus;
use crate::placement::OutcomeKind;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub attempts: u32,
    pub local_backtracks: u32,
    pub tiles_placed: u64,
    pub tiles_pruned: u64,
    pub candidates_tested: u64,
    /// Wall time spent in each phase, summed over attempts.
    pub phase_times: Vec<(GenerationStatus, Duration)>,
}

impl GenerationStats {
    pub(crate) fn add_phase_time(&mut self, status: GenerationStatus, elapsed: Duration) {
        match self.phase_times.iter_mut().find(|(s, _)| *s == status) {
            Some((_, total)) => *total += elapsed,
            None => self.phase_times.push((status, elapsed)),
        }
    }

    pub fn total_time(&self) -> Duration {
        self.phase_times.iter().map(|(_, d)| *d).sum()
    }
}

/// One line of a failure report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCount {
    pub kind: OutcomeKind,
    pub name: String,
    pub count: usize,
}

/// Why a run gave up, grouped by failure kind and sorted by frequency.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub seed: u64,
    pub attempts: u32,
    pub counts: Vec<FailureCount>,
}

impl FailureReport {
    pub fn from_counts(seed: u64, attempts: u32, counts: impl IntoIterator<Item = (OutcomeKind, usize)>) -> Self {
        let counts = counts
            .into_iter()
            .filter(|(kind, count)| *kind != OutcomeKind::Success && *count > 0)
            .map(|(kind, count)| FailureCount {
                kind,
                name: kind.name().to_string(),
                count,
            })
            .sorted_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)))
            .collect();

        FailureReport { seed, attempts, counts }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().map(|c| c.count).sum()
    }

    pub fn count_of(&self, kind: OutcomeKind) -> usize {
        self.counts.iter().find(|c| c.kind == kind).map_or(0, |c| c.count)
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Generation failed after {} attempt(s) (seed {})",
            self.attempts, self.seed
        )?;
        for c in &self.counts {
            writeln!(f, "  {}: {}", c.name, c.count)?;
        }
        Ok(())
    }
}
