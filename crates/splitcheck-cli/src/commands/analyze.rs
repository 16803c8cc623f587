use std::path::Path;

use anyhow::Context;
use splitcheck_core::{AnalysisConfig, AnalysisReport};

use super::{counts_line, pct, pct_interval};

pub struct AnalyzeCommandConfig<'a> {
    pub input: &'a str,
    pub config_path: Option<&'a str>,
    pub confidence: Option<f64>,
    pub alpha: Option<f64>,
    pub no_correction: bool,
    pub policy: Option<&'a str>,
    pub lenient: bool,
    pub confound: bool,
    pub simulate: Option<usize>,
    pub seed: Option<u64>,
    pub output_path: Option<&'a str>,
}

/// Layer command-line flags over the (file or default) config.
fn build_config(cfg: &AnalyzeCommandConfig<'_>) -> anyhow::Result<AnalysisConfig> {
    let mut config = super::load_config(cfg.config_path)?;
    if let Some(level) = cfg.confidence {
        config.significance.confidence_level = level;
    }
    if let Some(alpha) = cfg.alpha {
        config.significance.alpha = alpha;
    }
    if cfg.no_correction {
        config.significance.continuity_correction = false;
    }
    if let Some(policy) = cfg.policy {
        config.duplicate_policy = super::parse_policy(policy)?;
    }
    if cfg.lenient {
        config.strict_alignment = false;
    }
    if cfg.confound {
        config.confound_check = true;
    }
    if cfg.simulate.is_some() || cfg.seed.is_some() {
        let mut sim = config.simulation.unwrap_or_default();
        if let Some(iterations) = cfg.simulate {
            sim.iterations = iterations;
        }
        if let Some(seed) = cfg.seed {
            sim.seed = seed;
        }
        config.simulation = Some(sim);
    }
    config.validate()?;
    log::debug!("effective config: {config:?}");
    Ok(config)
}

pub fn run(cfg: AnalyzeCommandConfig<'_>) -> anyhow::Result<()> {
    let config = build_config(&cfg)?;
    let report = splitcheck_core::analyze_file(Path::new(cfg.input), &config)
        .with_context(|| format!("analyzing {}", cfg.input))?;

    print_report(&report);

    if let Some(path) = cfg.output_path {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json).with_context(|| format!("writing report to {path}"))?;
        println!("\nReport saved to: {path}");
    }
    Ok(())
}

fn print_report(report: &AnalysisReport) {
    let f = &report.filter;
    println!("Integrity filter ({})", f.policy);
    println!(
        "  {} rows in, {} kept, {} removed ({} multi-observation subjects, {} removed conversions)",
        f.input_rows, f.kept_rows, f.removed_rows, f.multi_observation_subjects, f.removed_converted
    );
    if report.misaligned_dropped > 0 {
        println!("  {} rows dropped: page did not match condition", report.misaligned_dropped);
    }
    if let Some(span) = &report.span {
        println!(
            "  observed {} → {} ({:.1} days)",
            span.first.format("%Y-%m-%d %H:%M"),
            span.last.format("%Y-%m-%d %H:%M"),
            span.duration_secs as f64 / 86_400.0
        );
    }

    let s = &report.significance;
    let level = pct(s.confidence_level);
    println!("\n{}", "=".repeat(60));
    println!("  {:<10} {:>9} {:>9} {:>9}", "Group", "n", "x", "Rate");
    println!("{}", "-".repeat(60));
    println!("{}", counts_line("control", report.counts.control));
    println!("{}", counts_line("treatment", report.counts.treatment));
    println!("{}", "-".repeat(60));
    println!("  control   {level} CI {}", pct_interval(&s.control.interval));
    println!("  treatment {level} CI {}", pct_interval(&s.treatment.interval));

    println!(
        "\n  Difference (treatment − control): {:+.4} pp, {level} CI {}",
        s.difference * 100.0,
        pct_interval(&s.difference_interval)
    );
    println!(
        "  X² = {:.4}, z = {:+.4}, p = {:.6} (continuity correction {:.3})",
        s.statistic, s.z, s.p_value, s.correction
    );
    let verdict = if s.reject_null {
        "reject H₀: conversion rates differ"
    } else {
        "fail to reject H₀: no detectable difference"
    };
    println!("  α = {}: {verdict} (evidence: {})", s.alpha, s.evidence);

    if let Some(c) = &report.confound {
        println!("\nConfound check (multi-observation vs clean rows)");
        println!("  clean {} rows, anomalous {} rows", c.clean_rows, c.anomalous_rows);
        if let (Some(a), Some(b)) = (c.clean_conversion_rate, c.anomalous_conversion_rate) {
            println!("  conversion: clean {}, anomalous {}", pct(a), pct(b));
        }
        match (&c.conversion_test, &c.note) {
            (Some(t), _) => println!(
                "  p = {:.4}{}",
                t.p_value,
                if c.flagged { "  ⚠ glitch looks non-random" } else { "" }
            ),
            (None, Some(note)) => println!("  {note}"),
            (None, None) => {}
        }
    }

    if let Some(sim) = &report.simulation {
        println!("\nNull simulation ({} runs, seed {})", sim.iterations, sim.seed);
        println!(
            "  simulated Δ: mean {:+.5}, sd {:.5}; empirical p = {:.4}",
            sim.mean_difference, sim.std_difference, sim.p_value
        );
    }
}
