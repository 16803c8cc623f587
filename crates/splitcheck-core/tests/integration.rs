//! Integration tests for splitcheck-core.
//!
//! These tests exercise the full pipeline on CSV files written to disk:
//! load → integrity filter → alignment check → aggregation → significance test.

use std::collections::HashMap;
use std::io::Write;

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use splitcheck_core::{
    AnalysisConfig, AnalysisError, Condition, DuplicatePolicy, Observation, Page, aggregate,
    analyze_file, cross_tab, load_config_from_path, remove_multi_observation,
};

const HEADER: &str = "user_id,timestamp,group,landing_page,converted";

fn write_csv(dir: &tempfile::TempDir, rows: &[String]) -> std::path::PathBuf {
    let path = dir.path().join("ab_data.csv");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(f, "{HEADER}").unwrap();
    for row in rows {
        writeln!(f, "{row}").unwrap();
    }
    path
}

fn clean_rows() -> Vec<String> {
    let mut rows = Vec::new();
    for i in 0..10 {
        rows.push(format!(
            "c{i},2017-01-03 10:00:{i:02}.000000,control,old_page,{}",
            u8::from(i < 1)
        ));
        rows.push(format!(
            "t{i},2017-01-03 11:00:{i:02}.000000,treatment,new_page,{}",
            u8::from(i < 3)
        ));
    }
    rows
}

#[test]
fn clean_file_rates() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_csv(&tmp, &clean_rows());

    let report = analyze_file(&path, &AnalysisConfig::default()).unwrap();
    assert_eq!(report.filter.removed_rows, 0);
    assert!((report.significance.control.rate - 0.10).abs() < 1e-12);
    assert!((report.significance.treatment.rate - 0.30).abs() < 1e-12);
    assert!(!report.significance.reject_null);
    assert!(report.significance.difference_interval.contains(0.2));
}

#[test]
fn glitched_subject_drops_two_rows() {
    let tmp = tempfile::tempdir().unwrap();
    let mut rows = clean_rows();
    rows.push("u1,2017-01-04 09:15:00.100000,treatment,new_page,0".to_string());
    rows.push("u1,2017-01-04 09:15:02.400000,control,old_page,1".to_string());
    let path = write_csv(&tmp, &rows);

    let report = analyze_file(&path, &AnalysisConfig::default()).unwrap();
    assert_eq!(report.filter.input_rows, 22);
    assert_eq!(report.filter.kept_rows, 20);
    assert_eq!(report.filter.removed_rows, 2);
    assert_eq!(report.filter.multi_observation_subjects, 1);
}

#[test]
fn glitch_with_mismatched_pages_filters_to_aligned_table() {
    let tmp = tempfile::tempdir().unwrap();
    let mut rows = clean_rows();
    rows.push("g7,2017-01-05 12:00:00,treatment,new_page,0".to_string());
    rows.push("g7,2017-01-05 12:00:01,treatment,old_page,0".to_string());
    let path = write_csv(&tmp, &rows);

    let report = analyze_file(&path, &AnalysisConfig::default()).unwrap();
    assert_eq!(report.cross_tab_before.misaligned(), 1);
    assert!(report.cross_tab_after.is_aligned());
}

#[test]
fn keep_first_policy_from_config_file() {
    let tmp = tempfile::tempdir().unwrap();
    let mut rows = clean_rows();
    rows.push("u1,2017-01-04 09:15:00,treatment,new_page,0".to_string());
    rows.push("u1,2017-01-04 09:15:02,control,old_page,1".to_string());
    let path = write_csv(&tmp, &rows);

    let cfg_path = tmp.path().join("analysis.json");
    std::fs::write(&cfg_path, r#"{"duplicate_policy": "keep_first"}"#).unwrap();
    let cfg = load_config_from_path(&cfg_path).unwrap();
    assert_eq!(cfg.duplicate_policy, DuplicatePolicy::KeepFirst);

    let report = analyze_file(&path, &cfg).unwrap();
    assert_eq!(report.filter.kept_rows, 21);
    assert_eq!(report.counts.treatment.n, 11);
}

#[test]
fn unknown_label_fails_with_row() {
    let tmp = tempfile::tempdir().unwrap();
    let mut rows = clean_rows();
    rows.insert(3, "z,2017-01-03 10:00:00,variant_b,new_page,0".to_string());
    let path = write_csv(&tmp, &rows);

    match analyze_file(&path, &AnalysisConfig::default()) {
        Err(AnalysisError::DataValidation { row, message }) => {
            assert_eq!(row, Some(4));
            assert!(message.contains("variant_b"));
        }
        other => panic!("expected DataValidation, got {other:?}"),
    }
}

#[test]
fn single_arm_file_is_invalid_input() {
    let tmp = tempfile::tempdir().unwrap();
    let rows: Vec<String> = clean_rows()
        .into_iter()
        .filter(|r| r.contains("control"))
        .collect();
    let path = write_csv(&tmp, &rows);
    let err = analyze_file(&path, &AnalysisConfig::default()).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidInput(_)));
}

#[test]
fn missing_file_is_io_error() {
    let tmp = tempfile::tempdir().unwrap();
    let err = analyze_file(&tmp.path().join("nope.csv"), &AnalysisConfig::default()).unwrap_err();
    assert!(matches!(err, AnalysisError::Io(_)));
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// Rows where only multi-observation subjects may be served the wrong page.
fn glitchy_log() -> impl Strategy<Value = Vec<Observation>> {
    let entry = (0u32..40, any::<bool>(), any::<bool>(), any::<bool>(), 0i64..3600);
    prop::collection::vec(entry, 0..120)
        .prop_map(|entries| {
            let mut counts: HashMap<u32, usize> = HashMap::new();
            for (id, ..) in &entries {
                *counts.entry(*id).or_insert(0) += 1;
            }
            let base = Utc.with_ymd_and_hms(2017, 1, 2, 0, 0, 0).unwrap();
            entries
                .into_iter()
                .map(|(id, treated, flip, converted, secs)| {
                    let condition = if treated {
                        Condition::Treatment
                    } else {
                        Condition::Control
                    };
                    let aligned = condition.expected_page();
                    let page_shown = if flip && counts[&id] > 1 {
                        match aligned {
                            Page::Old => Page::New,
                            Page::New => Page::Old,
                        }
                    } else {
                        aligned
                    };
                    Observation {
                        subject_id: format!("s{id}"),
                        condition,
                        page_shown,
                        converted,
                        timestamp: base + Duration::seconds(secs),
                    }
                })
                .collect()
        })
}

proptest! {
    #[test]
    fn filtered_subjects_are_unique(rows in glitchy_log()) {
        let kept = remove_multi_observation(&rows);
        let mut seen = std::collections::HashSet::new();
        for obs in &kept {
            prop_assert!(seen.insert(obs.subject_id.clone()));
        }
    }

    #[test]
    fn filter_is_idempotent(rows in glitchy_log()) {
        let once = remove_multi_observation(&rows);
        prop_assert_eq!(remove_multi_observation(&once), once);
    }

    #[test]
    fn filtered_rows_are_aligned(rows in glitchy_log()) {
        let kept = remove_multi_observation(&rows);
        let tab = cross_tab(&kept);
        prop_assert_eq!(
            tab.get(Condition::Control, Page::Old) + tab.get(Condition::Treatment, Page::New),
            kept.len()
        );
    }

    #[test]
    fn counts_sum_to_filtered_rows(rows in glitchy_log()) {
        let kept = remove_multi_observation(&rows);
        let counts = aggregate(&kept);
        prop_assert_eq!((counts.control.n + counts.treatment.n) as usize, kept.len());
    }
}
