//! # splitcheck-core
//!
//! **Clean an A/B test log, then ask whether the new page really converts better.**
//!
//! `splitcheck-core` loads a CSV of exposures (subject, condition, page shown,
//! converted, timestamp), removes subjects the tracker logged more than once,
//! verifies that every remaining row saw the page its condition prescribes, and
//! compares the two conversion rates with a two-proportion test.
//!
//! ## Quick Start
//!
//! ```no_run
//! use splitcheck_core::{AnalysisConfig, analyze_file};
//!
//! let report = analyze_file("ab_data.csv".as_ref(), &AnalysisConfig::default())?;
//! println!(
//!     "treatment - control = {:+.4}, p = {:.4}",
//!     report.significance.difference, report.significance.p_value
//! );
//! # Ok::<(), splitcheck_core::AnalysisError>(())
//! ```
//!
//! ## Architecture
//!
//! Loader → Integrity filter → Alignment check → Aggregator → Significance test
//!
//! Each stage is a pure function of its input. Any error aborts the run.
//! Statistics live in the `splitcheck-tests` crate and operate on counts only.

pub mod aggregate;
pub mod config;
pub mod confound;
pub mod error;
pub mod integrity;
pub mod loader;
pub mod observation;
pub mod pipeline;

pub use aggregate::{ExperimentCounts, aggregate};
pub use config::{AnalysisConfig, load_config_from_path};
pub use confound::{ConfoundReport, confound_check};
pub use error::{AnalysisError, Result};
pub use integrity::{
    CrossTab, DuplicatePolicy, FilterOutcome, FilterReport, cross_tab, filter,
    keep_first_per_subject, multi_observation_subjects, remove_multi_observation,
    verify_alignment,
};
pub use loader::{ColumnNames, Labels, LoaderConfig, load_observations, read_observations};
pub use observation::{Condition, Observation, Page};
pub use pipeline::{AnalysisReport, TimeSpan, analyze_file, run_analysis};
pub use splitcheck_tests::{
    GroupCounts, Interval, SignificanceConfig, SignificanceResult, SimulationConfig,
    SimulationResult, StatsError,
};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
