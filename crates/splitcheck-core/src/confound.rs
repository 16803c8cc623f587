//! Compare multi-observation subjects against the rest of the log.
//!
//! Dropping glitched subjects assumes the glitch struck at random. This check
//! cannot prove that, but it flags the obvious counter-evidence: anomalous rows
//! that convert at a clearly different rate from clean rows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use splitcheck_tests::{GroupCounts, SignificanceConfig, SignificanceResult, two_proportion_test};

use crate::observation::{Condition, Observation};

/// Side-by-side summary of clean and anomalous rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfoundReport {
    pub clean_rows: usize,
    pub anomalous_rows: usize,
    pub clean_treatment_share: Option<f64>,
    pub anomalous_treatment_share: Option<f64>,
    pub clean_conversion_rate: Option<f64>,
    pub anomalous_conversion_rate: Option<f64>,
    /// Clean rows as control, anomalous rows as treatment.
    pub conversion_test: Option<SignificanceResult>,
    pub flagged: bool,
    pub note: Option<String>,
}

#[derive(Default)]
struct Tally {
    rows: u64,
    treatment: u64,
    converted: u64,
}

impl Tally {
    fn add(&mut self, obs: &Observation) {
        self.rows += 1;
        if obs.condition == Condition::Treatment {
            self.treatment += 1;
        }
        if obs.converted {
            self.converted += 1;
        }
    }

    fn share(&self, k: u64) -> Option<f64> {
        (self.rows > 0).then(|| k as f64 / self.rows as f64)
    }
}

/// Summarize `observations` split by membership in `multi_observation`.
pub fn confound_check(
    observations: &[Observation],
    multi_observation: &BTreeMap<String, usize>,
    cfg: &SignificanceConfig,
) -> ConfoundReport {
    let mut clean = Tally::default();
    let mut anomalous = Tally::default();
    for obs in observations {
        if multi_observation.contains_key(&obs.subject_id) {
            anomalous.add(obs);
        } else {
            clean.add(obs);
        }
    }

    let (conversion_test, note) = match two_proportion_test(
        GroupCounts::new(clean.rows, clean.converted),
        GroupCounts::new(anomalous.rows, anomalous.converted),
        cfg,
    ) {
        Ok(result) => (Some(result), None),
        Err(e) => (None, Some(format!("conversion comparison skipped: {e}"))),
    };
    let flagged = conversion_test.as_ref().is_some_and(|t| t.reject_null);

    if flagged {
        log::warn!(
            "multi-observation subjects convert differently from clean subjects \
             (p = {:.4}); dropping them may bias the estimate",
            conversion_test.as_ref().map_or(f64::NAN, |t| t.p_value)
        );
    }

    ConfoundReport {
        clean_rows: clean.rows as usize,
        anomalous_rows: anomalous.rows as usize,
        clean_treatment_share: clean.share(clean.treatment),
        anomalous_treatment_share: anomalous.share(anomalous.treatment),
        clean_conversion_rate: clean.share(clean.converted),
        anomalous_conversion_rate: anomalous.share(anomalous.converted),
        conversion_test,
        flagged,
        note,
    }
}
