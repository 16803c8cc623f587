//! One row of an A/B test log and its categorical fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Experimental arm a subject was assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Control,
    Treatment,
}

impl Condition {
    pub const ALL: [Condition; 2] = [Condition::Control, Condition::Treatment];

    /// Page the experiment design shows to this arm.
    pub fn expected_page(self) -> Page {
        match self {
            Self::Control => Page::Old,
            Self::Treatment => Page::New,
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Control => write!(f, "control"),
            Self::Treatment => write!(f, "treatment"),
        }
    }
}

/// Landing page variant actually served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    Old,
    New,
}

impl Page {
    pub const ALL: [Page; 2] = [Page::Old, Page::New];
}

impl std::fmt::Display for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Old => write!(f, "old"),
            Self::New => write!(f, "new"),
        }
    }
}

/// A single logged exposure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Not guaranteed unique across the log.
    pub subject_id: String,
    pub condition: Condition,
    pub page_shown: Page,
    pub converted: bool,
    pub timestamp: DateTime<Utc>,
}

impl Observation {
    /// Whether the served page matches the assigned condition.
    pub fn is_aligned(&self) -> bool {
        self.condition.expected_page() == self.page_shown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_expected_page() {
        assert_eq!(Condition::Control.expected_page(), Page::Old);
        assert_eq!(Condition::Treatment.expected_page(), Page::New);
    }

    #[test]
    fn test_is_aligned() {
        let mut obs = Observation {
            subject_id: "u1".into(),
            condition: Condition::Treatment,
            page_shown: Page::New,
            converted: false,
            timestamp: Utc.with_ymd_and_hms(2017, 1, 21, 22, 11, 48).unwrap(),
        };
        assert!(obs.is_aligned());
        obs.page_shown = Page::Old;
        assert!(!obs.is_aligned());
    }

    #[test]
    fn test_display() {
        assert_eq!(Condition::Treatment.to_string(), "treatment");
        assert_eq!(Page::Old.to_string(), "old");
    }
}
