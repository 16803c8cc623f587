//! Per-condition trial and conversion counts.

use serde::{Deserialize, Serialize};
use splitcheck_tests::GroupCounts;

use crate::observation::{Condition, Observation};

/// Counts for both arms of the experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExperimentCounts {
    pub control: GroupCounts,
    pub treatment: GroupCounts,
}

impl ExperimentCounts {
    pub fn get(&self, condition: Condition) -> GroupCounts {
        match condition {
            Condition::Control => self.control,
            Condition::Treatment => self.treatment,
        }
    }

    pub fn total(&self) -> u64 {
        self.control.n + self.treatment.n
    }
}

/// Group observations by condition and count `n` and converted `x`.
pub fn aggregate(observations: &[Observation]) -> ExperimentCounts {
    let mut counts = ExperimentCounts::default();
    for obs in observations {
        let group = match obs.condition {
            Condition::Control => &mut counts.control,
            Condition::Treatment => &mut counts.treatment,
        };
        group.n += 1;
        if obs.converted {
            group.x += 1;
        }
    }
    log::info!(
        "aggregated: control {}/{}, treatment {}/{}",
        counts.control.x,
        counts.control.n,
        counts.treatment.x,
        counts.treatment.n
    );
    counts
}
