//! End-to-end analysis: filter, check alignment, aggregate, test.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use splitcheck_tests::{SignificanceResult, SimulationResult, simulate_null, two_proportion_test};
use uuid::Uuid;

use crate::aggregate::{ExperimentCounts, aggregate};
use crate::config::AnalysisConfig;
use crate::confound::{ConfoundReport, confound_check};
use crate::error::Result;
use crate::integrity::{CrossTab, FilterReport, cross_tab, filter, verify_alignment};
use crate::loader::load_observations;
use crate::observation::Observation;

/// First and last observation time of the analyzed rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
    pub duration_secs: i64,
}

impl TimeSpan {
    pub fn of(observations: &[Observation]) -> Option<Self> {
        let first = observations.iter().map(|o| o.timestamp).min()?;
        let last = observations.iter().map(|o| o.timestamp).max()?;
        Some(Self {
            first,
            last,
            duration_secs: (last - first).num_seconds(),
        })
    }
}

/// Structured result of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: Uuid,
    pub splitcheck_version: String,
    pub filter: FilterReport,
    /// Rows dropped by the lenient alignment check.
    pub misaligned_dropped: usize,
    pub cross_tab_before: CrossTab,
    pub cross_tab_after: CrossTab,
    pub span: Option<TimeSpan>,
    pub counts: ExperimentCounts,
    pub significance: SignificanceResult,
    pub confound: Option<ConfoundReport>,
    pub simulation: Option<SimulationResult>,
}

/// Run the full analysis over an in-memory observation log.
pub fn run_analysis(observations: &[Observation], cfg: &AnalysisConfig) -> Result<AnalysisReport> {
    cfg.validate()?;

    let cross_tab_before = cross_tab(observations);
    let outcome = filter(observations, cfg.duplicate_policy)?;
    let (kept, misaligned_dropped) = verify_alignment(outcome.kept, cfg.strict_alignment)?;
    let cross_tab_after = cross_tab(&kept);

    let counts = aggregate(&kept);
    let significance = two_proportion_test(counts.control, counts.treatment, &cfg.significance)?;
    log::info!(
        "difference {:+.4} (p = {:.4}), null {}",
        significance.difference,
        significance.p_value,
        if significance.reject_null {
            "rejected"
        } else {
            "not rejected"
        }
    );

    let confound = cfg
        .confound_check
        .then(|| confound_check(observations, &outcome.multi_observation, &cfg.significance));

    let simulation = match &cfg.simulation {
        Some(sim) => {
            log::info!("simulating {} null experiments (seed {})", sim.iterations, sim.seed);
            Some(simulate_null(counts.control, counts.treatment, sim)?)
        }
        None => None,
    };

    Ok(AnalysisReport {
        run_id: Uuid::new_v4(),
        splitcheck_version: crate::VERSION.to_string(),
        filter: outcome.report,
        misaligned_dropped,
        cross_tab_before,
        cross_tab_after,
        span: TimeSpan::of(&kept),
        counts,
        significance,
        confound,
        simulation,
    })
}

/// Load `path` with the configured loader and analyze it.
pub fn analyze_file(path: &Path, cfg: &AnalysisConfig) -> Result<AnalysisReport> {
    let observations = load_observations(path, &cfg.loader)?;
    run_analysis(&observations, cfg)
}
