pub mod cli;
pub mod config;
pub mod error;
pub mod genesis;
pub mod metrics;
pub mod node;
pub mod rpc;
