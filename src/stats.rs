//! Posterior summaries and convergence diagnostics for recorded chains.
//!
//! Everything here works on plain draws; callers slice off their own
//! burn-in before summarizing (for example via
//! `&history.column(0)[burn_in..]` or `history.to_array()`).

use ndarray::prelude::*;
use ndarray_stats::QuantileExt;
use rustfft::{num_complex::Complex, FftPlanner};

use crate::error::Error;

/// Five-number summary of one marginal posterior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PosteriorSummary {
    /// Sample mean of the draws.
    pub mean: f64,
    /// Sample standard deviation of the draws.
    pub sd: f64,
    /// 2.5th percentile.
    pub q025: f64,
    /// Median.
    pub median: f64,
    /// 97.5th percentile.
    pub q975: f64,
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    sorted[(q * sorted.len() as f64) as usize]
}

/// Summarizes one parameter's draws into mean, spread, and the 95%
/// credible interval bounds.
pub fn summarize(draws: &[f64]) -> Result<PosteriorSummary, Error> {
    if draws.is_empty() {
        return Err(Error::NoDraws);
    }
    let n = draws.len() as f64;
    let mean = draws.iter().sum::<f64>() / n;
    let sd = if draws.len() > 1 {
        (draws.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        0.0
    };
    let mut sorted = draws.to_vec();
    sorted.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap());
    Ok(PosteriorSummary {
        mean,
        sd,
        q025: quantile(&sorted, 0.025),
        median: quantile(&sorted, 0.5),
        q975: quantile(&sorted, 0.975),
    })
}

/// Split potential scale reduction per parameter.
///
/// Each chain (one `n x dim` array per chain, rows in iteration order) is
/// split into its first and second half, and the usual between/within
/// variance ratio is computed over the resulting half-chains, so a single
/// slowly drifting chain is flagged just like disagreeing chains. Values
/// near 1 indicate convergence. Odd-length chains drop their middle row.
///
/// All chains must share the same parameter dimension; every chain needs
/// at least 4 rows so each half holds 2.
pub fn split_rhat(chains: &[Array2<f64>]) -> Result<Array1<f64>, Error> {
    if chains.is_empty() {
        return Err(Error::NoDraws);
    }
    let n_params = chains[0].ncols();
    let half_len = chains.iter().map(|c| c.nrows()).min().unwrap_or(0) / 2;
    if half_len < 2 {
        return Err(Error::NoDraws);
    }

    let n_halves = 2 * chains.len();
    let mut means = Array2::<f64>::zeros((n_halves, n_params));
    let mut vars = Array2::<f64>::zeros((n_halves, n_params));
    for (c, chain) in chains.iter().enumerate() {
        let rows = chain.nrows();
        let first = chain.slice(s![..half_len, ..]);
        let second = chain.slice(s![rows - half_len.., ..]);
        for (h, half) in [first, second].into_iter().enumerate() {
            let mean = half
                .mean_axis(Axis(0))
                .expect("Expected computing half-chain means to succeed");
            means.row_mut(2 * c + h).assign(&mean);
            vars.row_mut(2 * c + h).assign(&half.var_axis(Axis(0), 1.0));
        }
    }

    let n = half_len as f64;
    let m = n_halves as f64;
    let within = vars
        .mean_axis(Axis(0))
        .expect("Expected computing within-chain variances to succeed");
    let grand = means
        .mean_axis(Axis(0))
        .expect("Expected computing global means to succeed");
    let between = (means - grand.insert_axis(Axis(0))).pow2().sum_axis(Axis(0)) * (n / (m - 1.0));
    let var = within.clone() * ((n - 1.0) / n) + between * (1.0 / n);
    Ok((var / within).sqrt())
}

/// Largest split R-hat over all parameters, the usual single go/no-go
/// number for a multi-chain run.
pub fn max_split_rhat(chains: &[Array2<f64>]) -> Result<f64, Error> {
    let all = split_rhat(chains)?;
    let max = *all.max().map_err(|_| Error::NoDraws)?;
    Ok(max)
}

/// Effective sample size of one parameter's draws.
///
/// Estimates the integrated autocorrelation time from the FFT-based
/// autocovariance sequence, truncated by Geyer's initial positive
/// sequence rule, and returns `n / tau`. Returns NaN when there are
/// fewer than 4 draws or the draws are (numerically) constant.
pub fn ess(draws: &[f64]) -> f64 {
    let n = draws.len();
    if n < 4 {
        return f64::NAN;
    }
    let mean = draws.iter().sum::<f64>() / n as f64;
    let var = draws.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n as f64;
    if !(var > 1e-300) {
        return f64::NAN;
    }

    // Zero-padding to at least 2n makes the circular convolution linear.
    let m = (2 * n).next_power_of_two();
    let mut buf = vec![Complex::new(0.0, 0.0); m];
    for (slot, &x) in buf.iter_mut().zip(draws) {
        *slot = Complex::new(x - mean, 0.0);
    }
    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(m).process(&mut buf);
    for v in buf.iter_mut() {
        *v = Complex::new(v.norm_sqr(), 0.0);
    }
    planner.plan_fft_inverse(m).process(&mut buf);

    // buf[k].re is proportional to the lag-k autocovariance; the shared
    // scale cancels in the correlation ratios.
    let denom = buf[0].re;
    let mut tau = -1.0;
    let mut lag = 0;
    while lag + 1 < n {
        let pair = (buf[lag].re + buf[lag + 1].re) / denom;
        if pair <= 0.0 {
            break;
        }
        tau += 2.0 * pair;
        lag += 2;
    }
    if tau <= 0.0 {
        // Anti-correlated draws carry at least as much information as
        // independent ones.
        return n as f64;
    }
    n as f64 / tau
}
