//! Monte Carlo uncertainty analysis and SIL classification.
//!
//! Trials draw every basic-event distribution with one seeded ChaCha
//! stream in trial order, so a fixed seed reproduces the output bit for
//! bit. The SIL histogram partitions the mission window into equal
//! buckets and classifies the instantaneous PFD of each bucket into the
//! IEC 61508 bands.

use log::info;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{Error, Result, Warning};
use crate::expression::Expression;
use crate::guard::Guard;

#[derive(Debug, Clone)]
pub struct UncertaintyResult {
    pub trials: usize,
    pub mean: f64,
    pub std_dev: f64,
    /// 5%, 50% and 95% quantiles of the sampled top probability.
    pub quantiles: [f64; 3],
    /// `(lower, upper, fraction)` bins over the sampled range.
    pub histogram: Vec<(f64, f64, f64)>,
}

/// Runs `trials` Monte Carlo trials of the top-event probability.
///
/// `evaluate` maps a sampled per-event probability vector (0-based) to
/// the top probability; the caller is responsible for invalidating any
/// probability cache inside it. Sampling order is the expression order,
/// so results are deterministic for a fixed seed.
pub fn monte_carlo(
    expressions: &[Expression],
    mission_time: f64,
    trials: usize,
    seed: u64,
    guard: &Guard,
    mut evaluate: impl FnMut(&[f64]) -> f64,
) -> Result<UncertaintyResult> {
    if trials == 0 {
        return Err(Error::Analysis("Monte Carlo needs at least one trial".into()));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut samples = Vec::with_capacity(trials);
    let mut p = vec![0.0; expressions.len()];
    for _ in 0..trials {
        guard.check()?;
        for (slot, expression) in p.iter_mut().zip(expressions) {
            *slot = expression.sample(mission_time, &mut rng);
        }
        let top = evaluate(&p);
        if !top.is_finite() {
            return Err(Error::Analysis("non-finite probability in a trial".into()));
        }
        samples.push(top);
    }

    let mean = samples.iter().sum::<f64>() / trials as f64;
    let variance = if trials > 1 {
        samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (trials - 1) as f64
    } else {
        0.0
    };

    let mut sorted = samples;
    sorted.sort_by(|a, b| a.total_cmp(b));
    let quantile = |q: f64| -> f64 {
        let position = q * (sorted.len() - 1) as f64;
        sorted[position.round() as usize]
    };

    let low = sorted[0];
    let high = *sorted.last().expect("at least one sample");
    let bins = 10usize;
    let width = ((high - low) / bins as f64).max(f64::MIN_POSITIVE);
    let mut histogram = vec![0usize; bins];
    for &s in &sorted {
        let bin = (((s - low) / width) as usize).min(bins - 1);
        histogram[bin] += 1;
    }
    let histogram = histogram
        .into_iter()
        .enumerate()
        .map(|(i, count)| {
            (low + i as f64 * width, low + (i + 1) as f64 * width, count as f64 / trials as f64)
        })
        .collect();

    info!("Monte Carlo: {trials} trials, mean = {mean:.6e}, sd = {:.6e}", variance.sqrt());
    Ok(UncertaintyResult {
        trials,
        mean,
        std_dev: variance.sqrt(),
        quantiles: [quantile(0.05), quantile(0.5), quantile(0.95)],
        histogram,
    })
}

/// IEC 61508 band occupation. Index 0 is "worse than SIL 1", indices
/// 1..=4 are SIL 1..4, index 5 is "better than SIL 4".
#[derive(Debug, Clone)]
pub struct SilResult {
    pub pfd_avg: f64,
    /// Simplified average failure frequency per hour.
    pub pfh_avg: f64,
    pub pfd_fractions: [f64; 6],
    pub pfh_fractions: [f64; 6],
    /// `(bucket midpoint, instantaneous PFD)`.
    pub buckets: Vec<(f64, f64)>,
}

const PFD_BANDS: [f64; 5] = [1e-1, 1e-2, 1e-3, 1e-4, 1e-5];
const PFH_BANDS: [f64; 5] = [1e-5, 1e-6, 1e-7, 1e-8, 1e-9];

fn band(value: f64, bands: &[f64; 5]) -> usize {
    // Index 0: >= bands[0]; index i: within [bands[i], bands[i-1]);
    // index 5: below the last boundary.
    bands.iter().position(|&b| value >= b).unwrap_or(5)
}

/// Classifies the instantaneous PFD over `buckets` equal time slices.
///
/// The PFH is the simplified average failure frequency `p(t) / t`, which
/// is magnitude-accurate only; the caller attaches
/// [`Warning::SimplifiedPfh`].
pub fn sil(
    mission_time: f64,
    buckets: usize,
    warnings: &mut Vec<Warning>,
    mut pfd_at: impl FnMut(f64) -> f64,
) -> Result<SilResult> {
    if buckets == 0 || mission_time <= 0.0 {
        return Err(Error::Analysis("SIL needs a positive mission time and bucket count".into()));
    }

    let mut pfd_fractions = [0.0; 6];
    let mut pfh_fractions = [0.0; 6];
    let mut series = Vec::with_capacity(buckets);
    let mut pfd_sum = 0.0;
    let mut pfh_sum = 0.0;
    let share = 1.0 / buckets as f64;
    for i in 0..buckets {
        let t = mission_time * (i as f64 + 0.5) * share;
        let pfd = pfd_at(t);
        let pfh = pfd / t;
        pfd_fractions[band(pfd, &PFD_BANDS)] += share;
        pfh_fractions[band(pfh, &PFH_BANDS)] += share;
        pfd_sum += pfd;
        pfh_sum += pfh;
        series.push((t, pfd));
    }

    warnings.push(Warning::SimplifiedPfh);
    Ok(SilResult {
        pfd_avg: pfd_sum * share,
        pfh_avg: pfh_sum * share,
        pfd_fractions,
        pfh_fractions,
        buckets: series,
    })
}
