/*!
# I/O Utilities for Saving Chain Histories to CSV

This module provides functions to save recorded chain histories to CSV files.
Enable via the `csv` feature.
*/

use std::error::Error;
use std::fs::File;

use csv::Writer;

use crate::sampler::ChainHistory;

/**
Saves recorded chain histories as a CSV file.

Histories are expected to hold `[beta, gamma, latent values...]` states,
one history per chain. The resulting CSV file will have:
- A header row containing `"chain"`, `"iteration"`, `"beta"`, `"gamma"`,
  one column per latent value named `"latent_0"`, `"latent_1"`, etc., and
  one column per acceptance slot named `"accepted_0"`, `"accepted_1"`, etc.
- One row per recorded iteration of each chain. Acceptance columns hold
  `1` or `0`; they are empty on iteration 0, which records the initial
  state rather than a transition.

# Arguments

* `histories` - One recorded history per chain, as returned by the samplers.
* `filename` - The file path where the CSV data will be written.

# Returns

Returns `Ok(())` if successful, or an error if any I/O or CSV formatting
issue occurs.

# Examples

```rust
use sir_mcmc::data::OutbreakData;
use sir_mcmc::io::csv::save_histories;
use sir_mcmc::likelihood::SirPosterior;
use sir_mcmc::proposals::RandomWalk;
use sir_mcmc::sampler::MetropolisHastings;

let data = OutbreakData::new(1000, 10, vec![12, 18, 25], vec![3, 7, 11])?;
let target = SirPosterior::new(data);
let proposal = RandomWalk::new(0.02)?;
let mut mh = MetropolisHastings::new(target, proposal, &[0.2, 0.1], 2).set_seed(42);

let histories = mh.run(50)?;
save_histories(&histories, "/tmp/sir_chains.csv").expect("Expecting saving chains to succeed");
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/
pub fn save_histories(histories: &[ChainHistory], filename: &str) -> Result<(), Box<dyn Error>> {
    let mut wtr = Writer::from_writer(File::create(filename)?);
    let n_dims = histories.first().map_or(0, |h| h.dim());
    let n_slots = histories.first().map_or(0, |h| h.updates_per_step());

    let mut names = vec!["beta".to_string(), "gamma".to_string()];
    names.extend((2..n_dims).map(|i| format!("latent_{}", i - 2)));
    names.truncate(n_dims);
    let mut header: Vec<String> = vec!["chain".to_string(), "iteration".to_string()];
    header.extend(names);
    header.extend((0..n_slots).map(|i| format!("accepted_{}", i)));
    wtr.write_record(&header)?;

    for (chain_idx, history) in histories.iter().enumerate() {
        let flags = history.accept_flags();
        for (iter_idx, state) in history.states().iter().enumerate() {
            let mut row = vec![chain_idx.to_string(), iter_idx.to_string()];
            row.extend(state.iter().map(|v| v.to_string()));
            if iter_idx == 0 {
                row.extend(std::iter::repeat(String::new()).take(n_slots));
            } else {
                let offset = (iter_idx - 1) * n_slots;
                row.extend(
                    flags[offset..offset + n_slots]
                        .iter()
                        .map(|&f| (f as u8).to_string()),
                );
            }
            wtr.write_record(&row)?;
        }
    }

    wtr.flush()?;
    Ok(())
}
