//! Wallet key material and the coin-holding wallet for the specie protocol.

pub mod keys;
pub mod wallet;
