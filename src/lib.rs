pub mod augmented;
pub mod bootstrap;
pub mod data;
pub mod epidemic;
pub mod error;
pub mod io;
pub mod likelihood;
pub mod mle;
pub mod proposals;
pub mod sampler;
pub mod stats;
