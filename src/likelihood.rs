/*!
Posterior density of the stochastic SIR model.

The likelihood treats each observed day as a pair of binomial draws: new
cases from the susceptible pool with the infection hazard, new removals
from the infected pool with the removal hazard. Rates carry independent
Uniform(0, [`PRIOR_MAX`]) priors. Everything is evaluated in log space,
and every way a parameter or series can be impossible (outside the prior,
infeasible trajectory, count larger than its pool) collapses to a
log-density of negative infinity rather than an error, so samplers can
treat such states as ordinary rejections.

Two ready-made targets implement the [`Target`] trait: [`SirPosterior`]
over `[beta, gamma]` for fully observed data, and [`AugmentedPosterior`]
over `[beta, gamma, latent..]` for series with missing counts.
*/

use statrs::distribution::{Binomial, Discrete};

use crate::data::{LatentSlot, OutbreakData};
use crate::epidemic::{infection_prob, reconstruct, removal_prob};
use crate::error::Error;

/// Upper bound of the uniform prior on both rates.
pub const PRIOR_MAX: f64 = 0.5;

/// A distribution the Metropolis-Hastings samplers can draw from.
///
/// Implementors return the log of an unnormalized density; normalizing
/// constants cancel in the acceptance ratio and are never needed.
pub trait Target {
    /// Returns the log of the unnormalized density for state `theta`.
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64;
}

/// Log-density of one binomial transition, negative infinity when the
/// probability is outside [0, 1] or the count exceeds its pool.
fn binomial_ln_pmf(count: u64, pool: u64, prob: f64) -> f64 {
    match Binomial::new(prob, pool) {
        Ok(dist) => dist.ln_pmf(count),
        Err(_) => f64::NEG_INFINITY,
    }
}

/// Log-likelihood of the observed series under rates `(beta, gamma)`.
///
/// Reconstructs the compartment trajectory, then accumulates the binomial
/// log-probabilities of each day's case and removal counts. Infeasible
/// series and impossible transitions yield negative infinity.
pub fn log_likelihood(data: &OutbreakData, beta: f64, gamma: f64) -> f64 {
    let traj = match reconstruct(data) {
        Some(traj) => traj,
        None => return f64::NEG_INFINITY,
    };

    let p_remove = removal_prob(gamma);
    let mut ll = 0.0;
    for day in 0..data.n_days() {
        let p_infect = infection_prob(beta, traj.i[day], data.n_pop());
        ll += binomial_ln_pmf(data.cases()[day], traj.s[day], p_infect);
        // A feasible trajectory still allows removals[day] > I[day] when
        // enough new cases arrive the same day; the pmf is zero there.
        ll += binomial_ln_pmf(data.removals()[day], traj.i[day], p_remove);
    }
    ll
}

/// Log-density of the flat prior: zero inside `[0, PRIOR_MAX]^2`,
/// negative infinity outside.
pub fn log_prior(beta: f64, gamma: f64) -> f64 {
    if (0.0..=PRIOR_MAX).contains(&beta) && (0.0..=PRIOR_MAX).contains(&gamma) {
        0.0
    } else {
        f64::NEG_INFINITY
    }
}

/// Unnormalized log-posterior over `(beta, gamma)`.
pub fn log_posterior(data: &OutbreakData, beta: f64, gamma: f64) -> f64 {
    let prior = log_prior(beta, gamma);
    if prior == f64::NEG_INFINITY {
        return prior;
    }
    prior + log_likelihood(data, beta, gamma)
}

/// Posterior over `[beta, gamma]` for a fully observed outbreak.
#[derive(Debug, Clone)]
pub struct SirPosterior {
    data: OutbreakData,
}

impl SirPosterior {
    pub fn new(data: OutbreakData) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &OutbreakData {
        &self.data
    }
}

impl Target for SirPosterior {
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        log_posterior(&self.data, theta[0], theta[1])
    }
}

/// Posterior over `[beta, gamma, latent..]` for an outbreak with missing
/// counts.
///
/// Latent coordinates carry an improper flat prior over the non-negative
/// integers; their only constraint is that the spliced series must stay
/// feasible. Coordinates are rounded to the nearest integer before
/// splicing, matching the integer-preserving proposal kernel.
#[derive(Debug, Clone)]
pub struct AugmentedPosterior {
    data: OutbreakData,
    slots: Vec<LatentSlot>,
}

impl AugmentedPosterior {
    /// Builds the augmented target, failing if any slot lies outside the
    /// observed series.
    pub fn new(data: OutbreakData, slots: Vec<LatentSlot>) -> Result<Self, Error> {
        data.validate_slots(&slots)?;
        Ok(Self { data, slots })
    }

    /// Number of latent coordinates appended after `[beta, gamma]`.
    pub fn n_latents(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[LatentSlot] {
        &self.slots
    }

    pub fn data(&self) -> &OutbreakData {
        &self.data
    }
}

impl Target for AugmentedPosterior {
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        let mut latents = Vec::with_capacity(self.slots.len());
        for &value in &theta[2..] {
            if !value.is_finite() {
                return f64::NEG_INFINITY;
            }
            latents.push(value.round() as i64);
        }
        match self.data.with_latents(&self.slots, &latents) {
            Some(merged) => log_posterior(&merged, theta[0], theta[1]),
            None => f64::NEG_INFINITY,
        }
    }
}
