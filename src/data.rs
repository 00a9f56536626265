/*!
Observed outbreak data for the discrete-time SIR model.

An [`OutbreakData`] value bundles the closed population size, the initial
number of infecteds, and the two daily count series (new cases and new
removals) that the likelihood is evaluated against. Constructing one
validates the pieces once, so every downstream consumer can rely on the
series being non-empty, equal-length, and consistent with the population.

Missing observations are handled by *splicing*: a [`LatentSlot`] names a
single count in one of the two series, and [`OutbreakData::with_latents`]
returns a copy of the data with candidate values substituted into those
slots. The data-augmentation sampler uses this to treat missing counts as
extra parameters without ever mutating the base series.

# Examples

```rust
use sir_mcmc::data::{LatentSlot, OutbreakData};

let data = OutbreakData::new(1000, 10, vec![5, 8, 12], vec![2, 4, 6]).unwrap();
assert_eq!(data.n_days(), 3);

// Treat the day-1 case count as missing and splice in a candidate value.
let spliced = data.with_latents(&[LatentSlot::Cases(1)], &[9]).unwrap();
assert_eq!(spliced.cases()[1], 9);
assert_eq!(data.cases()[1], 8);
```
*/

use crate::error::Error;

/// A single missing count: one day in either the case or the removal series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatentSlot {
    /// The new-case count on the given day (0-based).
    Cases(usize),
    /// The new-removal count on the given day (0-based).
    Removals(usize),
}

impl LatentSlot {
    /// The day index this slot refers to.
    pub fn day(&self) -> usize {
        match *self {
            LatentSlot::Cases(day) | LatentSlot::Removals(day) => day,
        }
    }
}

/// Daily outbreak counts over a closed population.
///
/// Day `t` of `cases` holds the number of new infections during day `t`,
/// and day `t` of `removals` the number of recoveries. Both series have
/// the same length, the time horizon returned by [`OutbreakData::n_days`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutbreakData {
    n_pop: u64,
    i0: u64,
    cases: Vec<u64>,
    removals: Vec<u64>,
}

impl OutbreakData {
    /// Validates and bundles observed outbreak counts.
    ///
    /// Fails when the series are empty or of unequal length, when the
    /// population is zero, or when the initial infecteds exceed it.
    pub fn new(n_pop: u64, i0: u64, cases: Vec<u64>, removals: Vec<u64>) -> Result<Self, Error> {
        if cases.is_empty() {
            return Err(Error::EmptySeries);
        }
        if cases.len() != removals.len() {
            return Err(Error::LengthMismatch {
                cases: cases.len(),
                removals: removals.len(),
            });
        }
        if n_pop == 0 || i0 > n_pop {
            return Err(Error::InvalidPopulation { n_pop, i0 });
        }
        Ok(Self {
            n_pop,
            i0,
            cases,
            removals,
        })
    }

    /// Builds outbreak data whose invariants the caller has already upheld.
    pub(crate) fn from_parts(n_pop: u64, i0: u64, cases: Vec<u64>, removals: Vec<u64>) -> Self {
        Self {
            n_pop,
            i0,
            cases,
            removals,
        }
    }

    /// Total population size N.
    pub fn n_pop(&self) -> u64 {
        self.n_pop
    }

    /// Number of infected individuals on day 0.
    pub fn i0(&self) -> u64 {
        self.i0
    }

    /// Length of the observed series (the time horizon T).
    pub fn n_days(&self) -> usize {
        self.cases.len()
    }

    /// Daily new-case counts.
    pub fn cases(&self) -> &[u64] {
        &self.cases
    }

    /// Daily new-removal counts.
    pub fn removals(&self) -> &[u64] {
        &self.removals
    }

    /// Checks that every latent slot points inside the observed series.
    pub fn validate_slots(&self, slots: &[LatentSlot]) -> Result<(), Error> {
        for slot in slots {
            if slot.day() >= self.n_days() {
                return Err(Error::LatentOutOfRange {
                    day: slot.day(),
                    len: self.n_days(),
                });
            }
        }
        Ok(())
    }

    /// Returns a copy of the data with `values` substituted into `slots`.
    ///
    /// Returns `None` when any candidate value is negative or any slot lies
    /// outside the series. Callers evaluating a log-density map `None` to
    /// negative infinity; the base series is never modified.
    pub fn with_latents(&self, slots: &[LatentSlot], values: &[i64]) -> Option<Self> {
        if slots.len() != values.len() {
            return None;
        }
        let mut merged = self.clone();
        for (slot, &value) in slots.iter().zip(values) {
            if value < 0 || slot.day() >= merged.cases.len() {
                return None;
            }
            match *slot {
                LatentSlot::Cases(day) => merged.cases[day] = value as u64,
                LatentSlot::Removals(day) => merged.removals[day] = value as u64,
            }
        }
        Some(merged)
    }
}
