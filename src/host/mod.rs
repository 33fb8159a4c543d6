//! Host-facing command contract and stdio bridge for supervising processes.

pub mod channel;
pub mod contract;
pub mod handler;
pub mod service;
pub mod stdio;
