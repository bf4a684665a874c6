//! Core types for the specie coin-validation protocol: the coin object
//! model, canonical hashing, shared identifiers, and the network event union.

pub mod canonical;
pub mod coin;
pub mod event;
pub mod types;
