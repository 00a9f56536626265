//! Error type for invalid model setup and sampler configuration.
//!
//! Only unrecoverable configuration problems surface as [`Error`] values.
//! Parameter values that merely fall outside the prior or produce an
//! impossible trajectory are handled inside the likelihood by returning a
//! log-density of negative infinity, which the samplers treat as rejection.

use thiserror::Error;

/// Fatal setup errors, reported before any sampling or fitting starts.
#[derive(Debug, Error)]
pub enum Error {
    /// The observed series contains no days.
    #[error("observed series is empty; need at least one day of counts")]
    EmptySeries,

    /// Case and removal series must cover the same days.
    #[error("case series has {cases} days but removal series has {removals}")]
    LengthMismatch { cases: usize, removals: usize },

    /// Population must be positive and hold the initial infecteds.
    #[error("invalid population: N={n_pop}, I0={i0} (need N >= 1 and I0 <= N)")]
    InvalidPopulation { n_pop: u64, i0: u64 },

    /// A latent slot points at a day outside the observed series.
    #[error("latent slot refers to day {day} but the series has {len} days")]
    LatentOutOfRange { day: usize, len: usize },

    /// A chain needs at least the initial record plus one transition.
    #[error("chain length {n} too short; need at least 2 iterations")]
    ChainTooShort { n: usize },

    /// Proposal scales must be positive and finite.
    #[error("proposal scale {value} is not a positive finite number")]
    BadProposalScale { value: f64 },

    /// Simulation rates must be finite and non-negative.
    #[error("rate {value} is not a finite non-negative number")]
    InvalidRate { value: f64 },

    /// Interval proposals need a non-empty support.
    #[error("proposal support [{lo}, {hi}) is empty or not finite")]
    BadProposalSupport { lo: f64, hi: f64 },

    /// The bootstrap needs at least one replicate.
    #[error("bootstrap requested with zero replicates")]
    EmptyBootstrap,

    /// Summaries and convergence diagnostics need enough draws.
    #[error("not enough draws to compute the requested summary")]
    NoDraws,

    /// The underlying optimizer failed to run. Carries the rendered
    /// argmin error; non-convergence within the iteration budget is not
    /// an error and is reported through the fit outcome instead.
    #[error("optimizer failed: {0}")]
    Optimizer(String),
}
