//! lovemeorleaveme - shuts the machine down once the CPU has been idle long enough.
//!
//! Sampler → policy → coordinator: readings feed a sliding-window idle policy,
//! and sustained idle starts a cancellable countdown that ends in an OS shutdown.

pub mod config;
pub mod coordinator;
pub mod daemon;
pub mod domain;
pub mod idle;
pub mod interaction;
pub mod policy;
pub mod power;
pub mod sampler;
