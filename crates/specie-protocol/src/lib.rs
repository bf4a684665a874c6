//! The witness validation engine: bounded per-witness memory (probabilistic
//! seen-set plus exact recency cache), the reputation subsystem, the
//! pluggable public-key directory, and the ordered validation pipeline.

pub mod bloom;
pub mod directory;
pub mod recency;
pub mod reputation;
pub mod witness;
