pub mod analyze;
pub mod inspect;

use std::path::Path;

use anyhow::Context;
use splitcheck_core::{AnalysisConfig, DuplicatePolicy, GroupCounts, Interval};

/// Load the JSON config at `path`, or the defaults when none is given.
pub fn load_config(path: Option<&str>) -> anyhow::Result<AnalysisConfig> {
    match path {
        Some(p) => splitcheck_core::load_config_from_path(Path::new(p))
            .with_context(|| format!("loading config {p}")),
        None => Ok(AnalysisConfig::default()),
    }
}

/// Parse a `--policy` value into the enum.
pub fn parse_policy(s: &str) -> anyhow::Result<DuplicatePolicy> {
    Ok(s.parse::<DuplicatePolicy>()?)
}

/// Render a probability as a percentage with two decimals.
pub fn pct(p: f64) -> String {
    format!("{:.2}%", p * 100.0)
}

pub fn pct_interval(ci: &Interval) -> String {
    format!("[{}, {}]", pct(ci.lower), pct(ci.upper))
}

pub fn counts_line(label: &str, c: GroupCounts) -> String {
    let rate = c.rate().map(pct).unwrap_or_else(|| "—".to_string());
    format!("  {label:<10} {:>9} {:>9} {:>9}", c.n, c.x, rate)
}
