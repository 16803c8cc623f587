//! Two-proportion significance tests for conversion experiments.
//!
//! Works purely on counts: a group is `n` trials with `x` successes. Provides
//! the Pearson chi-squared test on the 2x2 table (with optional Yates continuity
//! correction), a confidence interval for the difference in rates, Wilson score
//! intervals for each group, and a seeded simulation of the null distribution.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Binomial, Distribution};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::function::erf::erfc;
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// Core types
// ═══════════════════════════════════════════════════════════════════════════════

/// Rejected input to one of the tests.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StatsError {
    #[error("group `{group}` is empty: n must be positive")]
    EmptyGroup { group: &'static str },

    #[error("group `{group}` has {x} successes out of {n} trials")]
    SuccessesExceedTrials { group: &'static str, n: u64, x: u64 },

    #[error("confidence level must lie strictly between 0 and 1, got {0}")]
    ConfidenceLevel(f64),

    #[error("significance level must lie strictly between 0 and 1, got {0}")]
    Alpha(f64),

    #[error("pooled conversion rate is {0}; the test statistic is undefined")]
    Degenerate(f64),

    #[error("simulation needs at least one iteration")]
    NoIterations,

    #[error("cannot sample conversions: {0}")]
    Sampler(String),
}

/// Trials and successes for one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupCounts {
    pub n: u64,
    pub x: u64,
}

impl GroupCounts {
    pub fn new(n: u64, x: u64) -> Self {
        Self { n, x }
    }

    /// Success rate `x / n`, or `None` for an empty group.
    pub fn rate(&self) -> Option<f64> {
        if self.n == 0 {
            None
        } else {
            Some(self.x as f64 / self.n as f64)
        }
    }

    fn validate(&self, group: &'static str) -> Result<(), StatsError> {
        if self.n == 0 {
            return Err(StatsError::EmptyGroup { group });
        }
        if self.x > self.n {
            return Err(StatsError::SuccessesExceedTrials {
                group,
                n: self.n,
                x: self.x,
            });
        }
        Ok(())
    }
}

/// Closed interval `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.4}, {:.4}]", self.lower, self.upper)
    }
}

/// Parameters shared by the interval and test routines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignificanceConfig {
    /// Coverage of every reported interval.
    pub confidence_level: f64,
    /// Two-tailed rejection threshold for the p-value.
    pub alpha: f64,
    /// Apply the Yates continuity correction.
    pub continuity_correction: bool,
}

impl Default for SignificanceConfig {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
            alpha: 0.05,
            continuity_correction: true,
        }
    }
}

impl SignificanceConfig {
    pub fn validate(&self) -> Result<(), StatsError> {
        validate_level(self.confidence_level)?;
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(StatsError::Alpha(self.alpha));
        }
        Ok(())
    }
}

/// Qualitative reading of a p-value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evidence {
    VeryStrong,
    Strong,
    Moderate,
    Weak,
    Negligible,
}

impl Evidence {
    /// Bucket a p-value.
    ///
    /// - VeryStrong: p < 0.001
    /// - Strong: p < 0.01
    /// - Moderate: p < 0.05
    /// - Weak: p < 0.1
    /// - Negligible: otherwise
    pub fn from_p(p: f64) -> Self {
        match p {
            p if p < 0.001 => Evidence::VeryStrong,
            p if p < 0.01 => Evidence::Strong,
            p if p < 0.05 => Evidence::Moderate,
            p if p < 0.1 => Evidence::Weak,
            _ => Evidence::Negligible,
        }
    }
}

impl fmt::Display for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Evidence::VeryStrong => "very strong",
            Evidence::Strong => "strong",
            Evidence::Moderate => "moderate",
            Evidence::Weak => "weak",
            Evidence::Negligible => "negligible",
        };
        f.write_str(s)
    }
}

/// Rate and score interval for one group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupEstimate {
    pub n: u64,
    pub x: u64,
    pub rate: f64,
    pub interval: Interval,
}

/// Result of comparing a control group with a treatment group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceResult {
    pub control: GroupEstimate,
    pub treatment: GroupEstimate,
    /// Treatment rate minus control rate.
    pub difference: f64,
    pub difference_interval: Interval,
    pub pooled_rate: f64,
    /// Pearson chi-squared statistic, 1 degree of freedom.
    pub statistic: f64,
    /// Signed square root of the statistic, positive when treatment is ahead.
    pub z: f64,
    pub p_value: f64,
    /// Continuity correction actually applied (0 when disabled).
    pub correction: f64,
    pub confidence_level: f64,
    pub alpha: f64,
    pub reject_null: bool,
    pub evidence: Evidence,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════════

fn validate_level(level: f64) -> Result<(), StatsError> {
    if level > 0.0 && level < 1.0 {
        Ok(())
    } else {
        Err(StatsError::ConfidenceLevel(level))
    }
}

/// Two-sided critical value of the standard normal for `level` coverage.
fn critical_z(level: f64) -> f64 {
    Normal::standard().inverse_cdf((1.0 + level) / 2.0)
}

/// Upper tail of chi-squared with one degree of freedom.
fn chi_squared_1_sf(statistic: f64) -> f64 {
    erfc((statistic / 2.0).sqrt()).clamp(0.0, 1.0)
}

// ═══════════════════════════════════════════════════════════════════════════════
// 1. SINGLE-PROPORTION INTERVAL
// ═══════════════════════════════════════════════════════════════════════════════

/// Wilson score interval for `counts.x / counts.n`.
///
/// With `correct`, the continuity correction `min(0.5, |x - n/2|)` is applied to
/// each bound, matching the correction used by [`two_proportion_test`].
pub fn proportion_interval(
    counts: GroupCounts,
    level: f64,
    correct: bool,
) -> Result<Interval, StatsError> {
    counts.validate("sample")?;
    validate_level(level)?;

    let n = counts.n as f64;
    let x = counts.x as f64;
    let estimate = x / n;
    let z = critical_z(level);
    let yates = if correct {
        0.5_f64.min((x - n * 0.5).abs())
    } else {
        0.0
    };
    let z22n = z * z / (2.0 * n);
    let denom = 1.0 + 2.0 * z22n;

    let p_hi = estimate + yates / n;
    let upper = if p_hi >= 1.0 {
        1.0
    } else {
        (p_hi + z22n + z * (p_hi * (1.0 - p_hi) / n + z22n / (2.0 * n)).sqrt()) / denom
    };

    let p_lo = estimate - yates / n;
    let lower = if p_lo <= 0.0 {
        0.0
    } else {
        (p_lo + z22n - z * (p_lo * (1.0 - p_lo) / n + z22n / (2.0 * n)).sqrt()) / denom
    };

    Ok(Interval {
        lower: lower.max(0.0),
        upper: upper.min(1.0),
    })
}

fn estimate(
    counts: GroupCounts,
    group: &'static str,
    cfg: &SignificanceConfig,
) -> Result<GroupEstimate, StatsError> {
    counts.validate(group)?;
    let interval = proportion_interval(counts, cfg.confidence_level, cfg.continuity_correction)?;
    Ok(GroupEstimate {
        n: counts.n,
        x: counts.x,
        rate: counts.x as f64 / counts.n as f64,
        interval,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// 2. TWO-PROPORTION TEST
// ═══════════════════════════════════════════════════════════════════════════════

/// Two-sided test of equal conversion rates between `control` and `treatment`.
///
/// The statistic is Pearson's chi-squared on the 2x2 (group x outcome) table.
/// The continuity correction is `min(0.5, |d| / (1/n_c + 1/n_t))` where `d` is
/// the rate difference, so it never exceeds the observed deviation. The
/// difference interval is the Wald interval widened by the same correction and
/// clamped to `[-1, 1]`.
///
/// Fails when either group is empty, when successes exceed trials, or when the
/// pooled rate is 0 or 1 (no variance to test against).
pub fn two_proportion_test(
    control: GroupCounts,
    treatment: GroupCounts,
    cfg: &SignificanceConfig,
) -> Result<SignificanceResult, StatsError> {
    cfg.validate()?;
    let control_est = estimate(control, "control", cfg)?;
    let treatment_est = estimate(treatment, "treatment", cfg)?;

    let (n1, x1) = (control.n as f64, control.x as f64);
    let (n2, x2) = (treatment.n as f64, treatment.x as f64);
    let p1 = control_est.rate;
    let p2 = treatment_est.rate;
    let difference = p2 - p1;

    let pooled = (x1 + x2) / (n1 + n2);
    if pooled <= 0.0 || pooled >= 1.0 {
        return Err(StatsError::Degenerate(pooled));
    }

    let inv_sum = 1.0 / n1 + 1.0 / n2;
    let correction = if cfg.continuity_correction {
        0.5_f64.min(difference.abs() / inv_sum)
    } else {
        0.0
    };

    let z_crit = critical_z(cfg.confidence_level);
    let standard_error = (p1 * (1.0 - p1) / n1 + p2 * (1.0 - p2) / n2).sqrt();
    let width = z_crit * standard_error + correction * inv_sum;
    let difference_interval = Interval {
        lower: (difference - width).max(-1.0),
        upper: (difference + width).min(1.0),
    };

    let observed = [[x1, n1 - x1], [x2, n2 - x2]];
    let expected = [
        [n1 * pooled, n1 * (1.0 - pooled)],
        [n2 * pooled, n2 * (1.0 - pooled)],
    ];
    let statistic: f64 = observed
        .iter()
        .flatten()
        .zip(expected.iter().flatten())
        .map(|(&o, &e)| {
            let dev = (o - e).abs() - correction;
            dev * dev / e
        })
        .sum();

    let z = if difference < 0.0 {
        -statistic.sqrt()
    } else {
        statistic.sqrt()
    };
    let p_value = chi_squared_1_sf(statistic);

    Ok(SignificanceResult {
        control: control_est,
        treatment: treatment_est,
        difference,
        difference_interval,
        pooled_rate: pooled,
        statistic,
        z,
        p_value,
        correction,
        confidence_level: cfg.confidence_level,
        alpha: cfg.alpha,
        reject_null: p_value < cfg.alpha,
        evidence: Evidence::from_p(p_value),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// 3. NULL SIMULATION
// ═══════════════════════════════════════════════════════════════════════════════

/// How many null experiments to draw, and from which seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub iterations: usize,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            iterations: 1000,
            seed: 42,
        }
    }
}

/// Sampling distribution of the rate difference under equal rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub iterations: usize,
    pub seed: u64,
    pub pooled_rate: f64,
    pub observed_difference: f64,
    pub mean_difference: f64,
    pub std_difference: f64,
    /// Share of simulated |difference| at least as large as the observed one.
    pub p_value: f64,
}

fn binomial(n: u64, p: f64) -> Result<Binomial, StatsError> {
    Binomial::new(n, p).map_err(|e| StatsError::Sampler(e.to_string()))
}

/// Simulate experiments in which both groups convert at the pooled rate.
///
/// Each iteration draws a binomial conversion count for each group at the
/// pooled rate and records the difference in simulated rates. Deterministic
/// for a given seed.
pub fn simulate_null(
    control: GroupCounts,
    treatment: GroupCounts,
    cfg: &SimulationConfig,
) -> Result<SimulationResult, StatsError> {
    control.validate("control")?;
    treatment.validate("treatment")?;
    if cfg.iterations == 0 {
        return Err(StatsError::NoIterations);
    }

    let (n1, n2) = (control.n as f64, treatment.n as f64);
    let pooled = (control.x + treatment.x) as f64 / (n1 + n2);
    let observed = treatment.x as f64 / n2 - control.x as f64 / n1;

    let control_draw = binomial(control.n, pooled)?;
    let treatment_draw = binomial(treatment.n, pooled)?;
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let diffs: Vec<f64> = (0..cfg.iterations)
        .map(|_| {
            let xc = control_draw.sample(&mut rng);
            let xt = treatment_draw.sample(&mut rng);
            xt as f64 / n2 - xc as f64 / n1
        })
        .collect();

    let count = diffs.len() as f64;
    let mean = diffs.iter().sum::<f64>() / count;
    let var = diffs.iter().map(|d| (d - mean) * (d - mean)).sum::<f64>() / count;
    // Tolerance keeps ties with the observed difference on the extreme side.
    let threshold = observed.abs() - 1e-12;
    let extreme = diffs.iter().filter(|d| d.abs() >= threshold).count();

    Ok(SimulationResult {
        iterations: cfg.iterations,
        seed: cfg.seed,
        pooled_rate: pooled,
        observed_difference: observed,
        mean_difference: mean,
        std_difference: var.sqrt(),
        p_value: extreme as f64 / count,
    })
}
