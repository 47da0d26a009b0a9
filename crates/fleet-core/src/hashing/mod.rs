//! Hashing determinista.

pub mod hash;

pub use hash::deterministic_seed;
