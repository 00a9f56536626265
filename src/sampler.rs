/*!
# Metropolis-Hastings samplers

Generic Metropolis-Hastings machinery over any target distribution `D`
implementing [`Target`] and proposal kernels implementing
[`Proposal`]. Two samplers are provided:

- [`MetropolisHastings`]: block updates, proposing a whole parameter
  vector at once.
- [`SingleSiteMetropolis`]: coordinate-wise updates for the two-rate SIR
  posterior, proposing and accepting `beta` and `gamma` separately each
  iteration, each with its own kernel and acceptance counter.

Both run several independent chains in parallel with rayon, record every
iteration (including the initial state) in a [`ChainHistory`], and can be
interrupted between iterations through a shared stop flag.

## Reproducibility

`set_seed` derives one disjoint stream per random source: chain `i`
draws its acceptance variates from `seed + i` and its proposal kernels
from `seed + k * n_chains + i` for the k-th kernel. Two runs with the
same seed produce identical histories; no stream is shared between
chains.

## Example

```rust
use sir_mcmc::data::OutbreakData;
use sir_mcmc::likelihood::SirPosterior;
use sir_mcmc::proposals::{Proposal, RandomWalk};
use sir_mcmc::sampler::MetropolisHastings;

let data = OutbreakData::new(1000, 10, vec![12, 18, 25], vec![3, 7, 11])?;
let target = SirPosterior::new(data);
let proposal = RandomWalk::new(0.02)?;
let mut mh = MetropolisHastings::new(target, proposal, &[0.2, 0.1], 4).set_seed(42);

let histories = mh.run(200)?;
assert_eq!(histories.len(), 4);
assert_eq!(histories[0].len(), 200);
# Ok::<(), sir_mcmc::error::Error>(())
```
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use ndarray::Array2;
use rand::prelude::*;
use rayon::prelude::*;

use crate::error::Error;
use crate::likelihood::Target;
use crate::proposals::Proposal;

pub(crate) const UPDATE_INTERVAL: Duration = Duration::from_millis(500);

pub(crate) fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap()
        .progress_chars("##-")
}

/// One Metropolis accept/reject decision in log space.
///
/// Accepts when `ln(u) < log_accept_ratio` for `u ~ Uniform(0, 1)`. A NaN
/// ratio (both densities zero, the 0/0 case) compares false and therefore
/// rejects; an infinite ratio in favor of the proposal always accepts.
pub(crate) fn accept_move(log_accept_ratio: f64, rng: &mut SmallRng) -> bool {
    log_accept_ratio > rng.gen::<f64>().ln()
}

/// The recorded trajectory of one chain: every state from the initial one
/// onward, plus per-update acceptance flags for each transition.
///
/// A full run of `n` iterations holds `n` states (record 0 is the initial
/// state) and `n - 1` transitions. Interrupted runs hold fewer; whatever
/// was recorded up to the interruption remains valid.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainHistory {
    states: Vec<Vec<f64>>,
    accept_flags: Vec<bool>,
    updates_per_step: usize,
}

impl ChainHistory {
    pub(crate) fn new(capacity: usize, initial: Vec<f64>, updates_per_step: usize) -> Self {
        let mut states = Vec::with_capacity(capacity);
        states.push(initial);
        Self {
            states,
            accept_flags: Vec::with_capacity(capacity.saturating_sub(1) * updates_per_step),
            updates_per_step,
        }
    }

    pub(crate) fn push(&mut self, state: Vec<f64>, accepted: &[bool]) {
        debug_assert_eq!(accepted.len(), self.updates_per_step);
        self.states.push(state);
        self.accept_flags.extend_from_slice(accepted);
    }

    /// Number of recorded iterations, the initial state included.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True only for a freshly constructed history, which still holds the
    /// initial state, so in practice never.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Dimension of the recorded states.
    pub fn dim(&self) -> usize {
        self.states[0].len()
    }

    /// Number of accept/reject decisions taken per iteration (1 for block
    /// updates, 2 for single-site updates).
    pub fn updates_per_step(&self) -> usize {
        self.updates_per_step
    }

    /// All recorded states in iteration order.
    pub fn states(&self) -> &[Vec<f64>] {
        &self.states
    }

    /// The most recent state.
    pub fn final_state(&self) -> &[f64] {
        self.states
            .last()
            .expect("Expected history to hold the initial state.")
    }

    /// One coordinate of every recorded state, in iteration order.
    pub fn column(&self, dim: usize) -> Vec<f64> {
        self.states.iter().map(|state| state[dim]).collect()
    }

    /// All recorded states as an `len x dim` array, one row per iteration.
    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.states.len(), self.dim()), |(i, j)| self.states[i][j])
    }

    /// Fraction of accepted updates over all transitions and update slots.
    pub fn accept_rate(&self) -> f64 {
        if self.accept_flags.is_empty() {
            return 0.0;
        }
        let accepted = self.accept_flags.iter().filter(|&&a| a).count();
        accepted as f64 / self.accept_flags.len() as f64
    }

    /// Raw per-update acceptance flags in iteration order. With more than
    /// one update per step, flags of one iteration are adjacent.
    pub fn accept_flags(&self) -> &[bool] {
        &self.accept_flags
    }

    /// Acceptance rate of one update slot (0-based). For single-site
    /// updates, slot 0 is `beta` and slot 1 is `gamma`.
    pub fn accept_rate_of(&self, slot: usize) -> f64 {
        let mut total = 0_usize;
        let mut accepted = 0_usize;
        for &flag in self.accept_flags.iter().skip(slot).step_by(self.updates_per_step) {
            total += 1;
            accepted += usize::from(flag);
        }
        if total == 0 {
            return 0.0;
        }
        accepted as f64 / total as f64
    }
}

/// Unnormalized log posterior density at every recorded state of a chain.
///
/// Histories store only states and acceptance flags; density consumers
/// re-evaluate the target on demand.
pub fn log_posterior_at<D: Target>(target: &D, history: &ChainHistory) -> Vec<f64> {
    history
        .states()
        .iter()
        .map(|state| target.unnorm_log_prob(state))
        .collect()
}

/// A single Markov chain performing block Metropolis-Hastings updates.
///
/// Each chain stores its own copy of the target and proposal, maintains
/// its current state, and draws acceptance variates from a chain-specific
/// random number generator.
#[derive(Debug, Clone)]
pub struct MHMarkovChain<D, Q> {
    /// The target distribution to sample from.
    pub target: D,
    /// The proposal kernel generating candidate states.
    pub proposal: Q,
    /// The current state of the chain.
    pub current_state: Vec<f64>,
    /// The chain-specific random seed.
    pub seed: u64,
    /// The random number generator for acceptance draws.
    pub rng: SmallRng,
}

impl<D, Q> MHMarkovChain<D, Q>
where
    D: Target + Clone,
    Q: Proposal<f64> + Clone,
{
    /// Creates a chain starting at `initial_state`, seeded from entropy.
    pub fn new(target: D, proposal: Q, initial_state: &[f64]) -> Self {
        let seed = thread_rng().gen::<u64>();
        Self {
            target,
            proposal,
            current_state: initial_state.to_vec(),
            seed,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Performs one block update and reports whether the proposal was
    /// accepted.
    ///
    /// The acceptance ratio in log space is
    /// `(log p(proposed) + log q(current | proposed))
    ///  - (log p(current) + log q(proposed | current))`,
    /// which keeps asymmetric kernels like
    /// [`FixedCenter`](crate::proposals::FixedCenter) valid; for symmetric
    /// kernels the two q-terms cancel exactly.
    pub fn step(&mut self) -> bool {
        let proposed = self.proposal.sample(&self.current_state);
        let current_lp = self.target.unnorm_log_prob(&self.current_state);
        let proposed_lp = self.target.unnorm_log_prob(&proposed);
        let log_q_forward = self.proposal.log_prob(&self.current_state, &proposed);
        let log_q_backward = self.proposal.log_prob(&proposed, &self.current_state);
        let log_accept_ratio = (proposed_lp + log_q_backward) - (current_lp + log_q_forward);
        let accepted = accept_move(log_accept_ratio, &mut self.rng);
        if accepted {
            self.current_state = proposed;
        }
        accepted
    }

    /// Runs the chain for `n_steps` iterations (initial state included).
    pub fn run(&mut self, n_steps: usize) -> ChainHistory {
        let never = AtomicBool::new(false);
        self.run_inner(n_steps, &never, None)
    }

    /// Runs the chain, stopping early once `stop` is set. The returned
    /// history then holds fewer than `n_steps` records.
    pub fn run_until(&mut self, n_steps: usize, stop: &AtomicBool) -> ChainHistory {
        self.run_inner(n_steps, stop, None)
    }

    /// Runs the chain while updating a progress bar with the running
    /// acceptance rate.
    pub fn run_with_progress(&mut self, n_steps: usize, pb: &ProgressBar) -> ChainHistory {
        let never = AtomicBool::new(false);
        self.run_inner(n_steps, &never, Some(pb))
    }

    fn run_inner(
        &mut self,
        n_steps: usize,
        stop: &AtomicBool,
        pb: Option<&ProgressBar>,
    ) -> ChainHistory {
        let mut history = ChainHistory::new(n_steps, self.current_state.clone(), 1);
        let mut accept_count = 0_usize;
        let mut last_update = Instant::now();
        if let Some(pb) = pb {
            pb.set_length(n_steps as u64);
        }

        for step_idx in 1..n_steps {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            let accepted = self.step();
            accept_count += usize::from(accepted);
            history.push(self.current_state.clone(), &[accepted]);

            if let Some(pb) = pb {
                if last_update.elapsed() >= UPDATE_INTERVAL || step_idx + 1 == n_steps {
                    let accept_rate = accept_count as f64 / step_idx as f64;
                    pb.set_position(step_idx as u64 + 1);
                    pb.set_message(format!("AcceptRate={:.3}", accept_rate));
                    last_update = Instant::now();
                }
            }
        }
        history
    }
}

/// Block Metropolis-Hastings over multiple parallel chains.
///
/// All chains start from the same state. A global seed (see
/// [`MetropolisHastings::set_seed`]) derives disjoint per-chain streams
/// for both acceptance draws and proposal noise.
#[derive(Debug, Clone)]
pub struct MetropolisHastings<D, Q> {
    /// The target distribution to sample from.
    pub target: D,
    /// The proposal kernel prototype cloned into each chain.
    pub proposal: Q,
    /// The independent Markov chains.
    pub chains: Vec<MHMarkovChain<D, Q>>,
    /// The global random seed.
    pub seed: u64,
    stop: Arc<AtomicBool>,
}

impl<D, Q> MetropolisHastings<D, Q>
where
    D: Target + Clone + Send,
    Q: Proposal<f64> + Clone + Send,
{
    /// Creates `n_chains` parallel chains, all starting at
    /// `initial_state`, seeded from entropy.
    pub fn new(target: D, proposal: Q, initial_state: &[f64], n_chains: usize) -> Self {
        let chains = (0..n_chains)
            .map(|_| MHMarkovChain::new(target.clone(), proposal.clone(), initial_state))
            .collect();
        let mut sampler = Self {
            target,
            proposal,
            chains,
            seed: 0,
            stop: Arc::new(AtomicBool::new(false)),
        };
        sampler.reseed(thread_rng().gen::<u64>());
        sampler
    }

    /// Sets the global seed and re-derives every per-chain stream.
    ///
    /// Chain `i` gets acceptance seed `seed + i` and proposal seed
    /// `seed + n_chains + i`, so no two sources share a stream.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.reseed(seed);
        self
    }

    fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        let n_chains = self.chains.len() as u64;
        for (i, chain) in self.chains.iter_mut().enumerate() {
            let chain_seed = seed + i as u64;
            chain.seed = chain_seed;
            chain.rng = SmallRng::seed_from_u64(chain_seed);
            chain.proposal = chain.proposal.clone().set_seed(seed + n_chains + i as u64);
        }
    }

    /// A handle on the shared stop flag, for cancelling a run from
    /// another thread.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Asks all chains to stop before their next iteration.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Re-arms the stop flag after a cancelled run.
    pub fn clear_stop(&self) {
        self.stop.store(false, Ordering::Relaxed);
    }

    /// Runs all chains in parallel for `n_steps` iterations each and
    /// returns one history per chain.
    pub fn run(&mut self, n_steps: usize) -> Result<Vec<ChainHistory>, Error> {
        if n_steps < 2 {
            return Err(Error::ChainTooShort { n: n_steps });
        }
        let stop = Arc::clone(&self.stop);
        let histories = self
            .chains
            .par_iter_mut()
            .map(|chain| chain.run_until(n_steps, &stop))
            .collect();
        Ok(histories)
    }

    /// Like [`MetropolisHastings::run`], with one progress bar per chain.
    pub fn run_progress(&mut self, n_steps: usize) -> Result<Vec<ChainHistory>, Error> {
        if n_steps < 2 {
            return Err(Error::ChainTooShort { n: n_steps });
        }
        let stop = Arc::clone(&self.stop);
        let multi = MultiProgress::new();
        let pb_style = progress_style();
        let histories = self
            .chains
            .par_iter_mut()
            .enumerate()
            .map(|(i, chain)| {
                let pb = multi.add(ProgressBar::new(n_steps as u64));
                pb.set_prefix(format!("Chain {i}"));
                pb.set_style(pb_style.clone());
                let history = chain.run_inner(n_steps, &stop, Some(&pb));
                pb.finish_with_message("Done!");
                history
            })
            .collect();
        Ok(histories)
    }
}

/// One coordinate-wise Metropolis update: proposes a new value for
/// `state[site]` only and accepts or rejects it against the full target.
fn update_site<D, Q>(
    target: &D,
    proposal: &mut Q,
    state: &mut Vec<f64>,
    site: usize,
    rng: &mut SmallRng,
) -> bool
where
    D: Target,
    Q: Proposal<f64>,
{
    let fragment = [state[site]];
    let proposed = proposal.sample(&fragment);
    let mut candidate = state.clone();
    candidate[site] = proposed[0];
    let current_lp = target.unnorm_log_prob(state);
    let candidate_lp = target.unnorm_log_prob(&candidate);
    let log_q_forward = proposal.log_prob(&fragment, &proposed);
    let log_q_backward = proposal.log_prob(&proposed, &fragment);
    let log_accept_ratio = (candidate_lp + log_q_backward) - (current_lp + log_q_forward);
    let accepted = accept_move(log_accept_ratio, rng);
    if accepted {
        *state = candidate;
    }
    accepted
}

/// A single Markov chain performing coordinate-wise updates over the
/// two-rate state `[beta, gamma]`.
///
/// Each iteration first updates `beta` conditional on the current
/// `gamma`, then `gamma` conditional on the just-updated `beta`. The two
/// sites may use different kernel types and are counted separately.
#[derive(Debug, Clone)]
pub struct SingleSiteChain<D, Qb, Qg> {
    /// The target distribution to sample from.
    pub target: D,
    /// Kernel proposing `beta` values.
    pub beta_proposal: Qb,
    /// Kernel proposing `gamma` values.
    pub gamma_proposal: Qg,
    /// The current state `[beta, gamma]`.
    pub current_state: Vec<f64>,
    /// The chain-specific random seed.
    pub seed: u64,
    /// The random number generator for acceptance draws.
    pub rng: SmallRng,
}

impl<D, Qb, Qg> SingleSiteChain<D, Qb, Qg>
where
    D: Target + Clone,
    Qb: Proposal<f64> + Clone,
    Qg: Proposal<f64> + Clone,
{
    /// Creates a chain starting at `initial_state`, seeded from entropy.
    pub fn new(target: D, beta_proposal: Qb, gamma_proposal: Qg, initial_state: &[f64]) -> Self {
        let seed = thread_rng().gen::<u64>();
        Self {
            target,
            beta_proposal,
            gamma_proposal,
            current_state: initial_state.to_vec(),
            seed,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Performs one sweep over both sites, returning the per-site
    /// acceptance flags `[beta_accepted, gamma_accepted]`.
    pub fn step(&mut self) -> [bool; 2] {
        let beta_accepted = update_site(
            &self.target,
            &mut self.beta_proposal,
            &mut self.current_state,
            0,
            &mut self.rng,
        );
        let gamma_accepted = update_site(
            &self.target,
            &mut self.gamma_proposal,
            &mut self.current_state,
            1,
            &mut self.rng,
        );
        [beta_accepted, gamma_accepted]
    }

    /// Runs the chain for `n_steps` iterations (initial state included).
    pub fn run(&mut self, n_steps: usize) -> ChainHistory {
        let never = AtomicBool::new(false);
        self.run_inner(n_steps, &never, None)
    }

    /// Runs the chain, stopping early once `stop` is set.
    pub fn run_until(&mut self, n_steps: usize, stop: &AtomicBool) -> ChainHistory {
        self.run_inner(n_steps, stop, None)
    }

    fn run_inner(
        &mut self,
        n_steps: usize,
        stop: &AtomicBool,
        pb: Option<&ProgressBar>,
    ) -> ChainHistory {
        let mut history = ChainHistory::new(n_steps, self.current_state.clone(), 2);
        let mut accept_count = 0_usize;
        let mut last_update = Instant::now();
        if let Some(pb) = pb {
            pb.set_length(n_steps as u64);
        }

        for step_idx in 1..n_steps {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            let accepted = self.step();
            accept_count += accepted.iter().filter(|&&a| a).count();
            history.push(self.current_state.clone(), &accepted);

            if let Some(pb) = pb {
                if last_update.elapsed() >= UPDATE_INTERVAL || step_idx + 1 == n_steps {
                    let accept_rate = accept_count as f64 / (2 * step_idx) as f64;
                    pb.set_position(step_idx as u64 + 1);
                    pb.set_message(format!("AcceptRate={:.3}", accept_rate));
                    last_update = Instant::now();
                }
            }
        }
        history
    }
}

/// Coordinate-wise Metropolis-Hastings over multiple parallel chains.
///
/// The single-site analogue of [`MetropolisHastings`], with one proposal
/// kernel per rate. Seeding derives three disjoint streams per chain:
/// acceptance draws, the `beta` kernel, and the `gamma` kernel.
#[derive(Debug, Clone)]
pub struct SingleSiteMetropolis<D, Qb, Qg> {
    /// The target distribution to sample from.
    pub target: D,
    /// Kernel prototype for `beta`, cloned into each chain.
    pub beta_proposal: Qb,
    /// Kernel prototype for `gamma`, cloned into each chain.
    pub gamma_proposal: Qg,
    /// The independent Markov chains.
    pub chains: Vec<SingleSiteChain<D, Qb, Qg>>,
    /// The global random seed.
    pub seed: u64,
    stop: Arc<AtomicBool>,
}

impl<D, Qb, Qg> SingleSiteMetropolis<D, Qb, Qg>
where
    D: Target + Clone + Send,
    Qb: Proposal<f64> + Clone + Send,
    Qg: Proposal<f64> + Clone + Send,
{
    /// Creates `n_chains` parallel chains, all starting at
    /// `initial_state`, seeded from entropy.
    pub fn new(
        target: D,
        beta_proposal: Qb,
        gamma_proposal: Qg,
        initial_state: &[f64],
        n_chains: usize,
    ) -> Self {
        let chains = (0..n_chains)
            .map(|_| {
                SingleSiteChain::new(
                    target.clone(),
                    beta_proposal.clone(),
                    gamma_proposal.clone(),
                    initial_state,
                )
            })
            .collect();
        let mut sampler = Self {
            target,
            beta_proposal,
            gamma_proposal,
            chains,
            seed: 0,
            stop: Arc::new(AtomicBool::new(false)),
        };
        sampler.reseed(thread_rng().gen::<u64>());
        sampler
    }

    /// Sets the global seed and re-derives every per-chain stream.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.reseed(seed);
        self
    }

    fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        let n_chains = self.chains.len() as u64;
        for (i, chain) in self.chains.iter_mut().enumerate() {
            let chain_seed = seed + i as u64;
            chain.seed = chain_seed;
            chain.rng = SmallRng::seed_from_u64(chain_seed);
            chain.beta_proposal = chain
                .beta_proposal
                .clone()
                .set_seed(seed + n_chains + i as u64);
            chain.gamma_proposal = chain
                .gamma_proposal
                .clone()
                .set_seed(seed + 2 * n_chains + i as u64);
        }
    }

    /// A handle on the shared stop flag, for cancelling a run from
    /// another thread.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Asks all chains to stop before their next iteration.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Re-arms the stop flag after a cancelled run.
    pub fn clear_stop(&self) {
        self.stop.store(false, Ordering::Relaxed);
    }

    /// Runs all chains in parallel for `n_steps` iterations each and
    /// returns one history per chain.
    pub fn run(&mut self, n_steps: usize) -> Result<Vec<ChainHistory>, Error> {
        if n_steps < 2 {
            return Err(Error::ChainTooShort { n: n_steps });
        }
        let stop = Arc::clone(&self.stop);
        let histories = self
            .chains
            .par_iter_mut()
            .map(|chain| chain.run_until(n_steps, &stop))
            .collect();
        Ok(histories)
    }

    /// Like [`SingleSiteMetropolis::run`], with one progress bar per
    /// chain.
    pub fn run_progress(&mut self, n_steps: usize) -> Result<Vec<ChainHistory>, Error> {
        if n_steps < 2 {
            return Err(Error::ChainTooShort { n: n_steps });
        }
        let stop = Arc::clone(&self.stop);
        let multi = MultiProgress::new();
        let pb_style = progress_style();
        let histories = self
            .chains
            .par_iter_mut()
            .enumerate()
            .map(|(i, chain)| {
                let pb = multi.add(ProgressBar::new(n_steps as u64));
                pb.set_prefix(format!("Chain {i}"));
                pb.set_style(pb_style.clone());
                let history = chain.run_inner(n_steps, &stop, Some(&pb));
                pb.finish_with_message("Done!");
                history
            })
            .collect();
        Ok(histories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::OutbreakData;
    use crate::likelihood::{SirPosterior, PRIOR_MAX};
    use crate::proposals::{FixedCenter, PriorDraw, RandomWalk};

    const SEED: u64 = 42;

    /// A one-dimensional Gaussian target for kernel-agnostic checks.
    #[derive(Clone)]
    struct Gaussian1D {
        mean: f64,
        std: f64,
    }

    impl Target for Gaussian1D {
        fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
            let z = (theta[0] - self.mean) / self.std;
            -0.5 * z * z
        }
    }

    /// A target that is zero everywhere, so every ratio is NaN.
    #[derive(Clone)]
    struct Impossible;

    impl Target for Impossible {
        fn unnorm_log_prob(&self, _theta: &[f64]) -> f64 {
            f64::NEG_INFINITY
        }
    }

    /// A target that is impossible only at the marked starting point.
    #[derive(Clone)]
    struct EscapeHatch;

    impl Target for EscapeHatch {
        fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
            if theta[0] == 99.0 {
                f64::NEG_INFINITY
            } else {
                0.0
            }
        }
    }

    fn sir_data() -> OutbreakData {
        let mut rng = SmallRng::seed_from_u64(SEED);
        crate::epidemic::simulate(1000, 20, 20, 0.3, 0.12, &mut rng).unwrap()
    }

    #[test]
    fn history_records_every_iteration_and_the_initial_state() {
        let target = Gaussian1D { mean: 0.0, std: 1.0 };
        let proposal = RandomWalk::new(0.5).unwrap();
        let mut mh = MetropolisHastings::new(target, proposal, &[3.0], 2).set_seed(SEED);
        let histories = mh.run(100).unwrap();
        assert_eq!(histories.len(), 2);
        for history in &histories {
            assert_eq!(history.len(), 100);
            assert_eq!(history.dim(), 1);
            assert_eq!(history.states()[0], vec![3.0]);
            assert!(history.accept_rate() > 0.0 && history.accept_rate() < 1.0);
        }
    }

    #[test]
    fn history_array_view_and_densities_line_up() {
        let data = sir_data();
        let target = SirPosterior::new(data);
        let proposal = RandomWalk::new(0.02).unwrap();
        let mut mh =
            MetropolisHastings::new(target.clone(), proposal, &[0.2, 0.1], 1).set_seed(SEED);
        let history = mh.run(50).unwrap().remove(0);

        let arr = history.to_array();
        assert_eq!(arr.shape(), &[50, 2]);
        assert_eq!(arr[[0, 0]], 0.2);
        assert_eq!(arr[[49, 1]], history.final_state()[1]);

        let lps = log_posterior_at(&target, &history);
        assert_eq!(lps.len(), 50);
        assert_eq!(lps[0], target.unnorm_log_prob(&[0.2, 0.1]));
        assert!(lps.iter().all(|lp| lp.is_finite()));
    }

    #[test]
    fn run_rejects_too_short_chains() {
        let target = Gaussian1D { mean: 0.0, std: 1.0 };
        let proposal = RandomWalk::new(0.5).unwrap();
        let mut mh = MetropolisHastings::new(target, proposal, &[0.0], 1).set_seed(SEED);
        assert!(matches!(mh.run(1), Err(Error::ChainTooShort { n: 1 })));
        assert!(matches!(mh.run(0), Err(Error::ChainTooShort { n: 0 })));
    }

    #[test]
    fn set_seed_gives_each_chain_its_own_stream() {
        let target = Gaussian1D { mean: 0.0, std: 1.0 };
        let proposal = RandomWalk::new(0.5).unwrap();
        let mh = MetropolisHastings::new(target, proposal, &[0.0], 3).set_seed(SEED);
        assert_eq!(mh.seed, SEED);
        assert_eq!(mh.chains[0].seed, SEED);
        assert_eq!(mh.chains[1].seed, SEED + 1);
        assert_eq!(mh.chains[2].seed, SEED + 2);
    }

    #[test]
    fn seeded_runs_are_reproducible_and_chains_differ() {
        let target = Gaussian1D { mean: 0.0, std: 1.0 };
        let proposal = RandomWalk::new(0.5).unwrap();
        let mut first =
            MetropolisHastings::new(target.clone(), proposal.clone(), &[0.0], 2).set_seed(SEED);
        let mut second = MetropolisHastings::new(target, proposal, &[0.0], 2).set_seed(SEED);
        let a = first.run(200).unwrap();
        let b = second.run(200).unwrap();
        assert_eq!(a, b);
        // Proposal streams are reseeded per chain, so chains diverge.
        assert_ne!(a[0].states(), a[1].states());
    }

    #[test]
    fn nan_log_ratio_always_rejects() {
        let proposal = RandomWalk::new(0.5).unwrap();
        let mut mh = MetropolisHastings::new(Impossible, proposal, &[1.0], 1).set_seed(SEED);
        let history = &mh.run(50).unwrap()[0];
        assert_eq!(history.accept_rate(), 0.0);
        assert!(history.states().iter().all(|s| s == &vec![1.0]));
    }

    #[test]
    fn chain_escapes_an_impossible_starting_point() {
        let proposal = RandomWalk::new(0.5).unwrap();
        let mut mh = MetropolisHastings::new(EscapeHatch, proposal, &[99.0], 1).set_seed(SEED);
        let history = &mh.run(10).unwrap()[0];
        // First proposal has ratio +inf and must be accepted.
        assert_ne!(history.states()[1], vec![99.0]);
    }

    #[test]
    fn preset_stop_flag_halts_chains_immediately() {
        let target = Gaussian1D { mean: 0.0, std: 1.0 };
        let proposal = RandomWalk::new(0.5).unwrap();
        let mut mh = MetropolisHastings::new(target, proposal, &[0.0], 2).set_seed(SEED);
        mh.request_stop();
        let histories = mh.run(1000).unwrap();
        for history in &histories {
            assert_eq!(history.len(), 1);
            assert_eq!(history.accept_rate(), 0.0);
        }
        mh.clear_stop();
        let histories = mh.run(1000).unwrap();
        assert!(histories.iter().all(|h| h.len() == 1000));
    }

    #[test]
    fn block_sampler_recovers_gaussian_moments() {
        let target = Gaussian1D { mean: 2.0, std: 0.7 };
        let proposal = RandomWalk::new(0.8).unwrap();
        let mut mh = MetropolisHastings::new(target, proposal, &[0.0], 4).set_seed(SEED);
        let histories = mh.run(5_000).unwrap();
        let draws: Vec<f64> = histories
            .iter()
            .flat_map(|h| h.column(0)[500..].to_vec())
            .collect();
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        let var =
            draws.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / draws.len() as f64;
        assert!((mean - 2.0).abs() < 0.1, "mean off: {mean}");
        assert!((var - 0.49).abs() < 0.1, "variance off: {var}");
    }

    #[test]
    fn prior_draw_and_walk_agree_on_the_sir_posterior() {
        let data = sir_data();
        let walk = RandomWalk::new(0.015).unwrap();
        let draw = PriorDraw::new(0.0, PRIOR_MAX).unwrap();
        let mut walk_mh = MetropolisHastings::new(
            SirPosterior::new(data.clone()),
            walk,
            &[0.25, 0.25],
            2,
        )
        .set_seed(SEED);
        let mut draw_mh =
            MetropolisHastings::new(SirPosterior::new(data), draw, &[0.25, 0.25], 2).set_seed(SEED);

        // The independence kernel accepts rarely on a concentrated
        // posterior, so give it a long run and a loose margin.
        let walk_mean = posterior_mean(&walk_mh.run(8_000).unwrap(), 0, 1_000);
        let draw_mean = posterior_mean(&draw_mh.run(8_000).unwrap(), 0, 1_000);
        assert!(
            (walk_mean - draw_mean).abs() < 0.03,
            "kernels disagree: walk={walk_mean} draw={draw_mean}"
        );
    }

    #[test]
    fn fixed_center_kernel_targets_the_same_posterior() {
        let data = sir_data();
        let center = FixedCenter::new(vec![0.3, 0.12], 0.05).unwrap();
        let walk = RandomWalk::new(0.015).unwrap();
        let mut center_mh = MetropolisHastings::new(
            SirPosterior::new(data.clone()),
            center,
            &[0.3, 0.12],
            2,
        )
        .set_seed(SEED);
        let mut walk_mh =
            MetropolisHastings::new(SirPosterior::new(data), walk, &[0.3, 0.12], 2).set_seed(SEED);

        let center_mean = posterior_mean(&center_mh.run(6_000).unwrap(), 1, 1_000);
        let walk_mean = posterior_mean(&walk_mh.run(6_000).unwrap(), 1, 1_000);
        assert!(
            (center_mean - walk_mean).abs() < 0.02,
            "kernels disagree: center={center_mean} walk={walk_mean}"
        );
    }

    #[test]
    fn single_site_sweeps_track_both_acceptance_rates() {
        let data = sir_data();
        let target = SirPosterior::new(data);
        let beta_walk = RandomWalk::new(0.01).unwrap();
        let gamma_walk = RandomWalk::new(0.04).unwrap();
        let mut mh = SingleSiteMetropolis::new(target, beta_walk, gamma_walk, &[0.25, 0.25], 2)
            .set_seed(SEED);
        let histories = mh.run(2_000).unwrap();
        for history in &histories {
            assert_eq!(history.updates_per_step(), 2);
            let beta_rate = history.accept_rate_of(0);
            let gamma_rate = history.accept_rate_of(1);
            assert!(beta_rate > 0.0 && beta_rate < 1.0);
            assert!(gamma_rate > 0.0 && gamma_rate < 1.0);
            // The tighter beta kernel should accept more often.
            assert!(beta_rate > gamma_rate);
            let pooled = history.accept_rate();
            approx::assert_abs_diff_eq!(
                pooled,
                (beta_rate + gamma_rate) / 2.0,
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn single_site_and_block_find_the_same_posterior_mean() {
        let data = sir_data();
        let mut block = MetropolisHastings::new(
            SirPosterior::new(data.clone()),
            RandomWalk::new(0.015).unwrap(),
            &[0.25, 0.25],
            2,
        )
        .set_seed(SEED);
        let mut single = SingleSiteMetropolis::new(
            SirPosterior::new(data),
            RandomWalk::new(0.015).unwrap(),
            RandomWalk::new(0.015).unwrap(),
            &[0.25, 0.25],
            2,
        )
        .set_seed(SEED);

        let block_mean = posterior_mean(&block.run(6_000).unwrap(), 0, 1_000);
        let single_mean = posterior_mean(&single.run(6_000).unwrap(), 0, 1_000);
        assert!(
            (block_mean - single_mean).abs() < 0.02,
            "schemes disagree: block={block_mean} single={single_mean}"
        );
    }

    fn posterior_mean(histories: &[ChainHistory], dim: usize, burn_in: usize) -> f64 {
        let draws: Vec<f64> = histories
            .iter()
            .flat_map(|h| h.column(dim)[burn_in..].to_vec())
            .collect();
        draws.iter().sum::<f64>() / draws.len() as f64
    }
}
