/*!
Discrete-time stochastic SIR dynamics.

The model partitions a closed population of size N into susceptible,
infected, and removed compartments. Each day two binomial transitions
fire: every susceptible becomes infected with probability
`1 - exp(-beta * I / N)` and every infected is removed with probability
`1 - exp(-gamma)`. This module provides the deterministic half of that
picture: rebuilding the full compartment trajectory implied by a pair of
count series ([`reconstruct`]), the two per-day hazard probabilities, and
a forward simulator ([`simulate`]) used for synthetic data and parametric
bootstrap replicates.
*/

use rand::rngs::SmallRng;
use rand_distr::{Binomial, Distribution};

use crate::data::OutbreakData;
use crate::error::Error;

/// Compartment counts over time, each vector holding T+1 entries
/// (day 0 through day T).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trajectory {
    /// Susceptible counts S[0..=T].
    pub s: Vec<u64>,
    /// Infected counts I[0..=T].
    pub i: Vec<u64>,
    /// Removed counts R[0..=T].
    pub r: Vec<u64>,
}

/// Probability that one susceptible is infected during a day with
/// `infected` currently infectious individuals.
pub fn infection_prob(beta: f64, infected: u64, n_pop: u64) -> f64 {
    -(-beta * infected as f64 / n_pop as f64).exp_m1()
}

/// Probability that one infected individual is removed during a day.
pub fn removal_prob(gamma: f64) -> f64 {
    -(-gamma).exp_m1()
}

/// Rebuilds the compartment trajectory implied by the observed counts.
///
/// Starting from `(S, I, R) = (N - I0, I0, 0)`, each observed day moves
/// `cases[t]` individuals from S to I and `removals[t]` from I to R.
/// Returns `None` as soon as any compartment would go negative; such a
/// series cannot have been produced by the model, whatever the rates.
pub fn reconstruct(data: &OutbreakData) -> Option<Trajectory> {
    let n_days = data.n_days();
    let mut s = Vec::with_capacity(n_days + 1);
    let mut i = Vec::with_capacity(n_days + 1);
    let mut r = Vec::with_capacity(n_days + 1);
    s.push(data.n_pop() - data.i0());
    i.push(data.i0());
    r.push(0u64);

    for day in 0..n_days {
        let cases = data.cases()[day];
        let removals = data.removals()[day];
        let next_s = s[day].checked_sub(cases)?;
        let next_i = i[day].checked_add(cases)?.checked_sub(removals)?;
        let next_r = r[day].checked_add(removals)?;
        s.push(next_s);
        i.push(next_i);
        r.push(next_r);
    }
    Some(Trajectory { s, i, r })
}

/// Draws one synthetic outbreak of length `n_days` from the model.
///
/// Each day samples `cases ~ Binomial(S, p_infect)` and
/// `removals ~ Binomial(I, p_remove)` and advances the compartments, so the
/// returned series always reconstructs to a feasible trajectory.
pub fn simulate(
    n_pop: u64,
    i0: u64,
    n_days: usize,
    beta: f64,
    gamma: f64,
    rng: &mut SmallRng,
) -> Result<OutbreakData, Error> {
    if !beta.is_finite() || beta < 0.0 {
        return Err(Error::InvalidRate { value: beta });
    }
    if !gamma.is_finite() || gamma < 0.0 {
        return Err(Error::InvalidRate { value: gamma });
    }
    if n_pop == 0 || i0 > n_pop {
        return Err(Error::InvalidPopulation { n_pop, i0 });
    }
    if n_days == 0 {
        return Err(Error::EmptySeries);
    }

    let p_remove = removal_prob(gamma);
    let mut s = n_pop - i0;
    let mut i = i0;
    let mut cases = Vec::with_capacity(n_days);
    let mut removals = Vec::with_capacity(n_days);

    for _ in 0..n_days {
        let p_infect = infection_prob(beta, i, n_pop);
        let new_cases = Binomial::new(s, p_infect)
            .expect("Expecting hazard probability to lie in [0, 1].")
            .sample(rng);
        let new_removals = Binomial::new(i, p_remove)
            .expect("Expecting hazard probability to lie in [0, 1].")
            .sample(rng);
        cases.push(new_cases);
        removals.push(new_removals);
        s -= new_cases;
        i = i + new_cases - new_removals;
    }

    Ok(OutbreakData::from_parts(n_pop, i0, cases, removals))
}
