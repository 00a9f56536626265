/*!
# Data-augmentation sampler

Treats missing daily counts as extra coordinates of the chain state and
samples parameters and latent counts jointly. The state layout is
`[beta, gamma, latent_0, latent_1, ..]`, one latent coordinate per
[`LatentSlot`](crate::data::LatentSlot) of the target.

Each iteration proposes a complete candidate state, perturbing the two
rates with a continuous kernel and the latent counts with an
integer-preserving kernel, and applies a single joint accept/reject
decision: either all coordinates move or none do. The target is usually
an [`AugmentedPosterior`](crate::likelihood::AugmentedPosterior), which
splices the latent values into the observed series before evaluating the
density, so infeasible latent combinations simply reject.

## Example

```rust
use sir_mcmc::augmented::AugmentedMetropolis;
use sir_mcmc::data::{LatentSlot, OutbreakData};
use sir_mcmc::likelihood::AugmentedPosterior;
use sir_mcmc::proposals::{RandomWalk, RoundedWalk};

let data = OutbreakData::new(100, 5, vec![3, 7, 2], vec![1, 4, 5])?;
let target = AugmentedPosterior::new(data, vec![LatentSlot::Cases(1)])?;
let param_kernel = RandomWalk::new(0.02)?;
let latent_kernel = RoundedWalk::new(2.0)?;

// State layout: [beta, gamma, cases[1]].
let mut sampler =
    AugmentedMetropolis::new(target, param_kernel, latent_kernel, &[0.2, 0.2, 7.0], 2)
        .set_seed(42);
let histories = sampler.run(50)?;
assert_eq!(histories[0].dim(), 3);
# Ok::<(), sir_mcmc::error::Error>(())
```
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use indicatif::{MultiProgress, ProgressBar};
use rand::prelude::*;
use rayon::prelude::*;

use crate::error::Error;
use crate::likelihood::Target;
use crate::proposals::Proposal;
use crate::sampler::{accept_move, progress_style, ChainHistory, UPDATE_INTERVAL};

/// A single chain over the joint state `[beta, gamma, latents..]`.
///
/// Holds two proposal kernels: `param_proposal` perturbs the leading two
/// rate coordinates, `latent_proposal` the remaining latent counts.
#[derive(Debug, Clone)]
pub struct AugmentedChain<D, Qp, Ql> {
    /// The joint target distribution.
    pub target: D,
    /// Kernel for the `[beta, gamma]` block.
    pub param_proposal: Qp,
    /// Kernel for the latent-count block.
    pub latent_proposal: Ql,
    /// The current joint state.
    pub current_state: Vec<f64>,
    /// The chain-specific random seed.
    pub seed: u64,
    /// The random number generator for acceptance draws.
    pub rng: SmallRng,
}

impl<D, Qp, Ql> AugmentedChain<D, Qp, Ql>
where
    D: Target + Clone,
    Qp: Proposal<f64> + Clone,
    Ql: Proposal<f64> + Clone,
{
    /// Creates a chain at `initial_state`, rounding the latent
    /// coordinates so the recorded history is integer-valued throughout.
    pub fn new(target: D, param_proposal: Qp, latent_proposal: Ql, initial_state: &[f64]) -> Self {
        let mut state = initial_state.to_vec();
        for value in state.iter_mut().skip(2) {
            *value = value.round();
        }
        let seed = thread_rng().gen::<u64>();
        Self {
            target,
            param_proposal,
            latent_proposal,
            current_state: state,
            seed,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Performs one joint update and reports whether it was accepted.
    ///
    /// Both blocks are proposed together and judged by a single
    /// accept/reject decision; parameters and latents never move
    /// independently within an iteration.
    pub fn step(&mut self) -> bool {
        let mut proposed = self.param_proposal.sample(&self.current_state[..2]);
        proposed.extend(self.latent_proposal.sample(&self.current_state[2..]));

        let current_lp = self.target.unnorm_log_prob(&self.current_state);
        let proposed_lp = self.target.unnorm_log_prob(&proposed);
        let log_q_forward = self
            .param_proposal
            .log_prob(&self.current_state[..2], &proposed[..2])
            + self
                .latent_proposal
                .log_prob(&self.current_state[2..], &proposed[2..]);
        let log_q_backward = self
            .param_proposal
            .log_prob(&proposed[..2], &self.current_state[..2])
            + self
                .latent_proposal
                .log_prob(&proposed[2..], &self.current_state[2..]);

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

/// Joint parameter/latent Metropolis-Hastings over multiple parallel
/// chains.
///
/// Seeding derives three disjoint streams per chain: acceptance draws,
/// the parameter kernel, and the latent kernel.
#[derive(Debug, Clone)]
pub struct AugmentedMetropolis<D, Qp, Ql> {
    /// The joint target distribution.
    pub target: D,
    /// Parameter-kernel prototype cloned into each chain.
    pub param_proposal: Qp,
    /// Latent-kernel prototype cloned into each chain.
    pub latent_proposal: Ql,
    /// The independent Markov chains.
    pub chains: Vec<AugmentedChain<D, Qp, Ql>>,
    /// The global random seed.
    pub seed: u64,
    stop: Arc<AtomicBool>,
}

impl<D, Qp, Ql> AugmentedMetropolis<D, Qp, Ql>
where
    D: Target + Clone + Send,
    Qp: Proposal<f64> + Clone + Send,
    Ql: Proposal<f64> + Clone + Send,
{
    /// Creates `n_chains` parallel chains, all starting at
    /// `initial_state`, seeded from entropy.
    pub fn new(
        target: D,
        param_proposal: Qp,
        latent_proposal: Ql,
        initial_state: &[f64],
        n_chains: usize,
    ) -> Self {
        let chains = (0..n_chains)
            .map(|_| {
                AugmentedChain::new(
                    target.clone(),
                    param_proposal.clone(),
                    latent_proposal.clone(),
                    initial_state,
                )
            })
            .collect();
        let mut sampler = Self {
            target,
            param_proposal,
            latent_proposal,
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
            chain.param_proposal = chain
                .param_proposal
                .clone()
                .set_seed(seed + n_chains + i as u64);
            chain.latent_proposal = chain
                .latent_proposal
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

    /// Like [`AugmentedMetropolis::run`], with one progress bar per
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
