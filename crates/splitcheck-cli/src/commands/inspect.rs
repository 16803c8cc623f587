use std::path::Path;

use anyhow::Context;
use splitcheck_core::{
    Condition, CrossTab, DuplicatePolicy, Observation, Page, Result, confound_check, cross_tab,
    filter, load_observations, multi_observation_subjects,
};

pub fn run(input: &str, config_path: Option<&str>, limit: usize) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let observations = load_observations(Path::new(input), &config.loader)
        .with_context(|| format!("loading {input}"))?;

    let multi = multi_observation_subjects(&observations);
    let anomalous_rows: usize = multi.values().sum();
    println!(
        "{} rows, {} multi-observation subjects covering {} rows\n",
        observations.len(),
        multi.len(),
        anomalous_rows
    );

    if !multi.is_empty() {
        println!("Multi-observation subjects (first {limit}):");
        for (id, count) in multi.iter().take(limit) {
            let trail = exposure_trail(&observations, id);
            println!("  {id:<16} {count} rows  {trail}");
        }
        println!();
    }

    println!("Condition x page, all rows");
    print_cross_tab(&cross_tab(&observations));

    let policy = config.duplicate_policy;
    println!("\nCondition x page, after filtering ({policy})");
    match filtered_cross_tab(&observations, policy) {
        Ok(after) => {
            print_cross_tab(&after);
            if after.is_aligned() {
                println!("  ✓ every remaining row saw the page its condition prescribes");
            } else {
                println!("  ✗ {} remaining rows contradict their condition", after.misaligned());
            }
        }
        Err(e) => println!("  ✗ {e}"),
    }

    let report = confound_check(&observations, &multi, &config.significance);
    println!("\nConfound check");
    if let (Some(a), Some(b)) = (report.clean_conversion_rate, report.anomalous_conversion_rate) {
        println!("  conversion: clean {}, anomalous {}", super::pct(a), super::pct(b));
    }
    match (&report.conversion_test, &report.note) {
        (Some(t), _) => println!("  p = {:.4}, flagged = {}", t.p_value, report.flagged),
        (None, Some(note)) => println!("  {note}"),
        (None, None) => {}
    }
    Ok(())
}

/// Cross-tab of the rows `analyze` would keep under `policy`.
fn filtered_cross_tab(observations: &[Observation], policy: DuplicatePolicy) -> Result<CrossTab> {
    let outcome = filter(observations, policy)?;
    Ok(cross_tab(&outcome.kept))
}

/// Chronological `condition/page[*]` sequence for one subject; `*` marks a conversion.
fn exposure_trail(observations: &[Observation], subject_id: &str) -> String {
    let mut rows: Vec<&Observation> = observations
        .iter()
        .filter(|o| o.subject_id == subject_id)
        .collect();
    rows.sort_by_key(|o| o.timestamp);
    rows.iter()
        .map(|o| {
            format!(
                "{}/{}{}",
                o.condition,
                o.page_shown,
                if o.converted { "*" } else { "" }
            )
        })
        .collect::<Vec<_>>()
        .join(" → ")
}

fn print_cross_tab(tab: &CrossTab) {
    println!("  {:<10} {:>9} {:>9}", "", "old", "new");
    for condition in Condition::ALL {
        println!(
            "  {:<10} {:>9} {:>9}",
            condition.to_string(),
            tab.get(condition, Page::Old),
            tab.get(condition, Page::New)
        );
    }
}
