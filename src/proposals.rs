/*!
Proposal kernels for the Metropolis-Hastings samplers.

All kernels implement the [`Proposal`] trait and are generic over the
floating-point precision via [`num_traits::Float`]. Three operate on
continuous rate coordinates:

- [`RandomWalk`]: symmetric Gaussian perturbation of the current state,
  the workhorse kernel.
- [`PriorDraw`]: independence kernel drawing each coordinate uniformly
  from a fixed interval, ignoring the current state. Its log-density is
  constant on the support, so forward and backward terms cancel in the
  acceptance ratio.
- [`FixedCenter`]: independence kernel drawing around a fixed center
  point. Genuinely asymmetric; the acceptance ratio needs both proposal
  densities, which the samplers always include.

[`RoundedWalk`] perturbs integer-valued coordinates by rounding a
Gaussian step, for latent counts in the data-augmentation sampler. Its
transition mass depends only on the absolute jump, so it is symmetric.

Every kernel owns a [`SmallRng`] and offers `set_seed` for reproducible
streams, mirroring the samplers' per-chain seeding.
*/

use num_traits::Float;
use rand::distributions::uniform::SampleUniform;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use statrs::distribution::ContinuousCDF;
use std::f64::consts::PI;

use crate::error::Error;

/// A transition kernel that generates candidate states and evaluates its
/// own transition density `q(to | from)` in log space.
pub trait Proposal<T: Float> {
    /// Samples a candidate state given the current one.
    fn sample(&mut self, current: &[T]) -> Vec<T>;

    /// Evaluates `log q(to | from)`.
    fn log_prob(&self, from: &[T], to: &[T]) -> T;

    /// Returns this kernel reseeded with `seed`.
    fn set_seed(self, seed: u64) -> Self;
}

fn check_scale<T: Float>(sigma: T) -> Result<(), Error> {
    if sigma.is_finite() && sigma > T::zero() {
        Ok(())
    } else {
        Err(Error::BadProposalScale {
            value: sigma.to_f64().unwrap_or(f64::NAN),
        })
    }
}

/// Per-coordinate Gaussian log-density of `to` around `mean`.
fn gaussian_log_prob<T: Float>(mean: &[T], to: &[T], sigma: T) -> T {
    let two = T::from(2.0).unwrap();
    let var = sigma * sigma;
    let norm = (two * T::from(PI).unwrap() * var).ln() / two;
    let mut lp = T::zero();
    for (&m, &t) in mean.iter().zip(to) {
        let diff = t - m;
        lp = lp - diff * diff / (two * var) - norm;
    }
    lp
}

/// Symmetric Gaussian random-walk kernel.
#[derive(Clone)]
pub struct RandomWalk<T: Float> {
    /// Standard deviation of the per-coordinate step.
    pub sigma: T,
    rng: SmallRng,
}

impl<T: Float> RandomWalk<T> {
    /// Creates a random-walk kernel with step scale `sigma`.
    pub fn new(sigma: T) -> Result<Self, Error> {
        check_scale(sigma)?;
        Ok(Self {
            sigma,
            rng: SmallRng::from_entropy(),
        })
    }
}

impl<T: Float> Proposal<T> for RandomWalk<T>
where
    rand_distr::StandardNormal: rand_distr::Distribution<T>,
{
    fn sample(&mut self, current: &[T]) -> Vec<T> {
        let normal = Normal::new(T::zero(), self.sigma)
            .expect("Expecting creation of normal distribution to succeed.");
        normal
            .sample_iter(&mut self.rng)
            .zip(current)
            .map(|(eps, &x)| x + eps)
            .collect()
    }

    fn log_prob(&self, from: &[T], to: &[T]) -> T {
        gaussian_log_prob(from, to, self.sigma)
    }

    fn set_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }
}

/// Independence kernel drawing each coordinate uniformly from `[lo, hi)`.
#[derive(Clone)]
pub struct PriorDraw<T: Float> {
    /// Lower bound of the support.
    pub lo: T,
    /// Upper bound of the support.
    pub hi: T,
    rng: SmallRng,
}

impl<T: Float> PriorDraw<T> {
    /// Creates a uniform independence kernel over `[lo, hi)`.
    pub fn new(lo: T, hi: T) -> Result<Self, Error> {
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(Error::BadProposalSupport {
                lo: lo.to_f64().unwrap_or(f64::NAN),
                hi: hi.to_f64().unwrap_or(f64::NAN),
            });
        }
        Ok(Self {
            lo,
            hi,
            rng: SmallRng::from_entropy(),
        })
    }
}

impl<T: Float + SampleUniform> Proposal<T> for PriorDraw<T> {
    fn sample(&mut self, current: &[T]) -> Vec<T> {
        (0..current.len())
            .map(|_| self.rng.gen_range(self.lo..self.hi))
            .collect()
    }

    /// Constant on the support and independent of `from`, so the forward
    /// and backward terms cancel whenever both states are inside it.
    fn log_prob(&self, _from: &[T], to: &[T]) -> T {
        let width_ln = (self.hi - self.lo).ln();
        let mut lp = T::zero();
        for &t in to {
            if t < self.lo || t >= self.hi {
                return T::neg_infinity();
            }
            lp = lp - width_ln;
        }
        lp
    }

    fn set_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }
}

/// Independence kernel drawing around a fixed center point.
#[derive(Clone)]
pub struct FixedCenter<T: Float> {
    /// Center of the Gaussian, one entry per coordinate.
    pub center: Vec<T>,
    /// Standard deviation around the center.
    pub sigma: T,
    rng: SmallRng,
}

impl<T: Float> FixedCenter<T> {
    /// Creates a fixed-center kernel around `center` with spread `sigma`.
    pub fn new(center: Vec<T>, sigma: T) -> Result<Self, Error> {
        check_scale(sigma)?;
        Ok(Self {
            center,
            sigma,
            rng: SmallRng::from_entropy(),
        })
    }
}

impl<T: Float> Proposal<T> for FixedCenter<T>
where
    rand_distr::StandardNormal: rand_distr::Distribution<T>,
{
    fn sample(&mut self, _current: &[T]) -> Vec<T> {
        let normal = Normal::new(T::zero(), self.sigma)
            .expect("Expecting creation of normal distribution to succeed.");
        normal
            .sample_iter(&mut self.rng)
            .zip(&self.center)
            .map(|(eps, &c)| c + eps)
            .collect()
    }

    /// Depends only on the destination, which makes the kernel asymmetric.
    fn log_prob(&self, _from: &[T], to: &[T]) -> T {
        gaussian_log_prob(&self.center, to, self.sigma)
    }

    fn set_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }
}

/// Integer-preserving random walk: adds Gaussian noise, then rounds.
#[derive(Clone)]
pub struct RoundedWalk<T: Float> {
    /// Standard deviation of the underlying Gaussian step.
    pub sigma: T,
    rng: SmallRng,
}

impl<T: Float> RoundedWalk<T> {
    /// Creates a rounded random-walk kernel with step scale `sigma`.
    pub fn new(sigma: T) -> Result<Self, Error> {
        check_scale(sigma)?;
        Ok(Self {
            sigma,
            rng: SmallRng::from_entropy(),
        })
    }
}

impl<T: Float> Proposal<T> for RoundedWalk<T>
where
    rand_distr::StandardNormal: rand_distr::Distribution<T>,
{
    fn sample(&mut self, current: &[T]) -> Vec<T> {
        let normal = Normal::new(T::zero(), self.sigma)
            .expect("Expecting creation of normal distribution to succeed.");
        normal
            .sample_iter(&mut self.rng)
            .zip(current)
            .map(|(eps, &x)| (x + eps).round())
            .collect()
    }

    /// Mass of the rounded Gaussian landing exactly on `to[k]`, the
    /// integral of the step density over `to[k] - from[k] +- 0.5`. The
    /// mass depends only on the absolute jump, so swapping `from` and
    /// `to` gives the same value.
    fn log_prob(&self, from: &[T], to: &[T]) -> T {
        let sigma = self.sigma.to_f64().unwrap();
        let gauss = statrs::distribution::Normal::new(0.0, sigma)
            .expect("Expecting creation of normal distribution to succeed.");
        let mut lp = 0.0;
        for (&f, &t) in from.iter().zip(to) {
            let jump = (t - f).abs().to_f64().unwrap();
            // Evaluate in the lower tail to avoid cancellation.
            let mass = gauss.cdf(0.5 - jump) - gauss.cdf(-0.5 - jump);
            lp += mass.ln();
        }
        T::from(lp).unwrap()
    }

    fn set_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }
}
