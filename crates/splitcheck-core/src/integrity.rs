//! Integrity filter for subjects logged more than once.
//!
//! A tracking glitch can record the same subject several times, typically on
//! the new page and then on the old page moments later. Such subjects did not
//! experience a single condition, so by default every row belonging to them is
//! dropped rather than repaired. Dropping is only unbiased if the glitch hit
//! subjects at random; [`crate::confound`] reports evidence against that.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::observation::{Condition, Observation, Page};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// What to do with subjects that have more than one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Remove every row of a multi-observation subject.
    #[default]
    DropAll,
    /// Keep only the earliest row of each subject.
    KeepFirst,
    /// Refuse to analyze a log containing multi-observation subjects.
    Reject,
}

impl std::fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DropAll => write!(f, "drop_all"),
            Self::KeepFirst => write!(f, "keep_first"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

impl std::str::FromStr for DuplicatePolicy {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "drop" | "drop_all" | "drop-all" => Ok(Self::DropAll),
            "keep_first" | "keep-first" => Ok(Self::KeepFirst),
            "reject" => Ok(Self::Reject),
            other => Err(AnalysisError::Config(format!(
                "unknown duplicate policy `{other}`"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Subject grouping
// ---------------------------------------------------------------------------

fn subject_counts(observations: &[Observation]) -> HashMap<&str, usize> {
    let mut counts: HashMap<&str, usize> = HashMap::with_capacity(observations.len());
    for obs in observations {
        *counts.entry(obs.subject_id.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Subjects observed more than once, with their observation counts.
pub fn multi_observation_subjects(observations: &[Observation]) -> BTreeMap<String, usize> {
    subject_counts(observations)
        .into_iter()
        .filter(|&(_, c)| c > 1)
        .map(|(id, c)| (id.to_string(), c))
        .collect()
}

/// Rows whose subject appears exactly once, in input order.
pub fn remove_multi_observation(observations: &[Observation]) -> Vec<Observation> {
    let counts = subject_counts(observations);
    observations
        .iter()
        .filter(|obs| counts.get(obs.subject_id.as_str()) == Some(&1))
        .cloned()
        .collect()
}

/// The earliest row of every subject, in input order. Ties on timestamp go to
/// the row that comes first in the input.
pub fn keep_first_per_subject(observations: &[Observation]) -> Vec<Observation> {
    let mut first: HashMap<&str, usize> = HashMap::with_capacity(observations.len());
    for (i, obs) in observations.iter().enumerate() {
        first
            .entry(obs.subject_id.as_str())
            .and_modify(|best| {
                if obs.timestamp < observations[*best].timestamp {
                    *best = i;
                }
            })
            .or_insert(i);
    }
    observations
        .iter()
        .enumerate()
        .filter(|(i, obs)| first.get(obs.subject_id.as_str()) == Some(i))
        .map(|(_, obs)| obs.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Counts describing one filter pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterReport {
    pub policy: DuplicatePolicy,
    pub input_rows: usize,
    pub kept_rows: usize,
    pub removed_rows: usize,
    pub multi_observation_subjects: usize,
    /// Removed rows that had converted.
    pub removed_converted: usize,
}

#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub kept: Vec<Observation>,
    /// Every multi-observation subject found in the input.
    pub multi_observation: BTreeMap<String, usize>,
    pub report: FilterReport,
}

/// Apply `policy` to the full observation log.
pub fn filter(observations: &[Observation], policy: DuplicatePolicy) -> Result<FilterOutcome> {
    let multi = multi_observation_subjects(observations);

    let kept = match policy {
        DuplicatePolicy::DropAll => remove_multi_observation(observations),
        DuplicatePolicy::KeepFirst => keep_first_per_subject(observations),
        DuplicatePolicy::Reject => {
            if let Some((id, count)) = multi.iter().next() {
                let subjects = multi.len();
                return Err(AnalysisError::validation(format!(
                    "{subjects} subjects have more than one observation \
                     (e.g. `{id}` appears {count} times)"
                )));
            }
            observations.to_vec()
        }
    };

    let converted_in = observations.iter().filter(|o| o.converted).count();
    let converted_kept = kept.iter().filter(|o| o.converted).count();
    let report = FilterReport {
        policy,
        input_rows: observations.len(),
        kept_rows: kept.len(),
        removed_rows: observations.len() - kept.len(),
        multi_observation_subjects: multi.len(),
        removed_converted: converted_in - converted_kept,
    };

    log::info!(
        "integrity filter ({}): kept {} of {} rows, {} multi-observation subjects",
        policy,
        report.kept_rows,
        report.input_rows,
        report.multi_observation_subjects
    );
    for (id, count) in &multi {
        log::debug!("multi-observation subject {id}: {count} rows");
    }

    Ok(FilterOutcome {
        kept,
        multi_observation: multi,
        report,
    })
}

// ---------------------------------------------------------------------------
// Condition x page alignment
// ---------------------------------------------------------------------------

/// Cross-tabulation of assigned condition against served page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CrossTab {
    pub control_old: usize,
    pub control_new: usize,
    pub treatment_old: usize,
    pub treatment_new: usize,
}

impl CrossTab {
    pub fn get(&self, condition: Condition, page: Page) -> usize {
        match (condition, page) {
            (Condition::Control, Page::Old) => self.control_old,
            (Condition::Control, Page::New) => self.control_new,
            (Condition::Treatment, Page::Old) => self.treatment_old,
            (Condition::Treatment, Page::New) => self.treatment_new,
        }
    }

    fn bump(&mut self, condition: Condition, page: Page) {
        let cell = match (condition, page) {
            (Condition::Control, Page::Old) => &mut self.control_old,
            (Condition::Control, Page::New) => &mut self.control_new,
            (Condition::Treatment, Page::Old) => &mut self.treatment_old,
            (Condition::Treatment, Page::New) => &mut self.treatment_new,
        };
        *cell += 1;
    }

    pub fn total(&self) -> usize {
        self.control_old + self.control_new + self.treatment_old + self.treatment_new
    }

    /// Rows on the design diagonal: control/old and treatment/new.
    pub fn aligned(&self) -> usize {
        self.control_old + self.treatment_new
    }

    pub fn misaligned(&self) -> usize {
        self.control_new + self.treatment_old
    }

    /// Only the two design cells are populated.
    pub fn is_aligned(&self) -> bool {
        self.misaligned() == 0
    }
}

pub fn cross_tab(observations: &[Observation]) -> CrossTab {
    let mut tab = CrossTab::default();
    for obs in observations {
        tab.bump(obs.condition, obs.page_shown);
    }
    tab
}

/// Check that every row's page matches its condition.
///
/// Strict mode fails on the first mismatch. Otherwise mismatched rows are
/// dropped with a warning and their count returned alongside the kept rows.
pub fn verify_alignment(
    observations: Vec<Observation>,
    strict: bool,
) -> Result<(Vec<Observation>, usize)> {
    let tab = cross_tab(&observations);
    if tab.is_aligned() {
        return Ok((observations, 0));
    }
    if strict {
        return Err(AnalysisError::validation(format!(
            "{} filtered rows have a page that does not match their condition \
             (control/new = {}, treatment/old = {})",
            tab.misaligned(),
            tab.control_new,
            tab.treatment_old
        )));
    }
    let dropped = tab.misaligned();
    log::warn!("dropping {dropped} rows whose page does not match their condition");
    let kept = observations.into_iter().filter(Observation::is_aligned).collect();
    Ok((kept, dropped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn obs(id: &str, condition: Condition, page: Page, converted: bool, secs: i64) -> Observation {
        Observation {
            subject_id: id.to_string(),
            condition,
            page_shown: page,
            converted,
            timestamp: Utc.with_ymd_and_hms(2017, 1, 2, 0, 0, 0).unwrap() + Duration::seconds(secs),
        }
    }

    fn ten_and_ten() -> Vec<Observation> {
        let mut rows = Vec::new();
        for i in 0..10 {
            rows.push(obs(&format!("c{i}"), Condition::Control, Page::Old, i < 1, i));
            rows.push(obs(&format!("t{i}"), Condition::Treatment, Page::New, i < 3, i));
        }
        rows
    }

    // -----------------------------------------------------------------------
    // Policy parsing
    // -----------------------------------------------------------------------

    #[test]
    fn test_policy_from_str() {
        assert_eq!("drop".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::DropAll);
        assert_eq!(
            "keep-first".parse::<DuplicatePolicy>().unwrap(),
            DuplicatePolicy::KeepFirst
        );
        assert_eq!("reject".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::Reject);
        assert!("repair".parse::<DuplicatePolicy>().is_err());
    }

    // -----------------------------------------------------------------------
    // Filter
    // -----------------------------------------------------------------------

    #[test]
    fn test_clean_log_is_untouched() {
        let rows = ten_and_ten();
        let out = filter(&rows, DuplicatePolicy::DropAll).unwrap();
        assert_eq!(out.kept, rows);
        assert_eq!(out.report.removed_rows, 0);
        assert!(out.multi_observation.is_empty());
    }

    #[test]
    fn test_duplicate_subject_removed_wholesale() {
        let mut rows = ten_and_ten();
        rows.push(obs("u1", Condition::Treatment, Page::New, false, 100));
        rows.push(obs("u1", Condition::Control, Page::Old, true, 101));
        let out = filter(&rows, DuplicatePolicy::DropAll).unwrap();
        assert_eq!(out.kept.len(), rows.len() - 2);
        assert!(out.kept.iter().all(|o| o.subject_id != "u1"));
        assert_eq!(out.report.removed_rows, 2);
        assert_eq!(out.report.removed_converted, 1);
        assert_eq!(out.multi_observation.get("u1"), Some(&2));
    }

    #[test]
    fn test_drop_all_is_idempotent() {
        let mut rows = ten_and_ten();
        rows.push(obs("c3", Condition::Treatment, Page::New, false, 50));
        let once = remove_multi_observation(&rows);
        let twice = remove_multi_observation(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_keep_first_takes_earliest() {
        let rows = vec![
            obs("u1", Condition::Control, Page::Old, true, 30),
            obs("u2", Condition::Control, Page::Old, false, 5),
            obs("u1", Condition::Treatment, Page::New, false, 10),
        ];
        let out = filter(&rows, DuplicatePolicy::KeepFirst).unwrap();
        assert_eq!(out.kept.len(), 2);
        let u1 = out.kept.iter().find(|o| o.subject_id == "u1").unwrap();
        assert_eq!(u1.condition, Condition::Treatment);
        assert_eq!(out.report.removed_converted, 1);
        assert_eq!(out.report.multi_observation_subjects, 1);
    }

    #[test]
    fn test_keep_first_tie_uses_input_order() {
        let rows = vec![
            obs("u1", Condition::Treatment, Page::New, false, 0),
            obs("u1", Condition::Control, Page::Old, true, 0),
        ];
        let kept = keep_first_per_subject(&rows);
        assert_eq!(kept, vec![rows[0].clone()]);
    }

    #[test]
    fn test_reject_policy_fails_on_duplicates() {
        let mut rows = ten_and_ten();
        rows.push(obs("t0", Condition::Control, Page::Old, false, 99));
        let err = filter(&rows, DuplicatePolicy::Reject).unwrap_err();
        assert!(err.to_string().contains("`t0`"));
        assert!(filter(&ten_and_ten(), DuplicatePolicy::Reject).is_ok());
    }

    // -----------------------------------------------------------------------
    // Alignment
    // -----------------------------------------------------------------------

    #[test]
    fn test_cross_tab_counts() {
        let mut rows = ten_and_ten();
        rows.push(obs("x", Condition::Treatment, Page::Old, false, 0));
        let tab = cross_tab(&rows);
        assert_eq!(tab.get(Condition::Control, Page::Old), 10);
        assert_eq!(tab.treatment_new, 10);
        assert_eq!(tab.treatment_old, 1);
        assert_eq!(tab.total(), 21);
        assert_eq!(tab.aligned() + tab.misaligned(), tab.total());
        assert!(!tab.is_aligned());
    }

    #[test]
    fn test_verify_alignment_strict_fails() {
        let mut rows = ten_and_ten();
        rows.push(obs("x", Condition::Control, Page::New, false, 0));
        assert!(verify_alignment(rows, true).is_err());
    }

    #[test]
    fn test_verify_alignment_lenient_drops() {
        let mut rows = ten_and_ten();
        rows.push(obs("x", Condition::Control, Page::New, false, 0));
        let (kept, dropped) = verify_alignment(rows, false).unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 20);
        assert!(cross_tab(&kept).is_aligned());
    }

    #[test]
    fn test_glitch_rows_leave_aligned_table() {
        // New page first, then old page moments later.
        let mut rows = ten_and_ten();
        rows.push(obs("g1", Condition::Treatment, Page::New, false, 200));
        rows.push(obs("g1", Condition::Control, Page::New, false, 201));
        rows.push(obs("g1", Condition::Treatment, Page::Old, false, 202));
        assert!(!cross_tab(&rows).is_aligned());
        let out = filter(&rows, DuplicatePolicy::DropAll).unwrap();
        assert!(cross_tab(&out.kept).is_aligned());
    }
}
