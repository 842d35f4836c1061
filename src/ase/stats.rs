//! Allele balance statistics.

use statrs::distribution::{Binomial, Discrete};

use super::err::{Error, RowError};

/// Relative tolerance when comparing point probabilities to the observed one.
const RELATIVE_TOLERANCE: f64 = 1.0 + 1e-7;

/// Exact two-sided binomial test of `successes` out of `trials` against `probability`.
///
/// The p-value is the total probability of all outcomes that are at most as
/// likely as the observed one.  Observing exactly the expected count yields 1.
pub fn binomial_test(successes: u64, trials: u64, probability: f64) -> Result<f64, Error> {
    let stats_err = |message: String| Error::Statistics {
        trials,
        probability,
        message,
    };
    if successes > trials {
        return Err(stats_err(format!(
            "{} successes exceed the number of trials",
            successes
        )));
    }
    let dist = Binomial::new(probability, trials).map_err(|e| stats_err(e.to_string()))?;

    if successes as f64 == probability * trials as f64 {
        return Ok(1.0);
    }

    let threshold = dist.pmf(successes) * RELATIVE_TOLERANCE;
    let p_value: f64 = (0..=trials)
        .map(|k| dist.pmf(k))
        .filter(|&pmf| pmf <= threshold)
        .sum();
    Ok(p_value.min(1.0))
}

/// Copy number states with a defined allele expectation.
///
/// Negative values encode a genotype at the same copy count: -4 is AABB and
/// -5 is AAABB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum CopyNumberClass {
    /// CN 2 or -4.
    #[strum(serialize = "2")]
    Two,
    #[strum(serialize = "3")]
    Three,
    #[strum(serialize = "4")]
    Four,
    #[strum(serialize = "5")]
    Five,
    /// CN 1 or -5.
    #[strum(serialize = "1")]
    One,
}

impl TryFrom<i64> for CopyNumberClass {
    type Error = RowError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            2 | -4 => Ok(Self::Two),
            3 => Ok(Self::Three),
            4 => Ok(Self::Four),
            5 => Ok(Self::Five),
            1 | -5 => Ok(Self::One),
            _ => Err(RowError::UnsupportedCopyNumber(value)),
        }
    }
}

/// Expected allele balance under a copy number state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Expectation {
    /// Expected ref/alt ratio; the observed RNA ratio is divided by it.
    pub divisor: f64,
    /// Expected fraction of reference reads.
    pub probability: f64,
}

impl CopyNumberClass {
    /// Expectation given whether the reference allele is in DNA majority.
    pub fn expectation(self, ref_majority: bool) -> Expectation {
        let (divisor, probability) = match (self, ref_majority) {
            (Self::Two, _) => (1.0, 0.5),
            (Self::Three, true) => (2.0, 2.0 / 3.0),
            (Self::Three, false) => (0.5, 1.0 / 3.0),
            (Self::Four, true) => (3.0, 0.75),
            (Self::Four, false) => (1.0 / 3.0, 0.25),
            (Self::Five, true) => (1.5, 0.6),
            (Self::Five, false) => (2.0 / 3.0, 0.4),
            (Self::One, true) => (4.0, 0.8),
            (Self::One, false) => (0.25, 0.2),
        };
        Expectation {
            divisor,
            probability,
        }
    }
}
