pub mod anchor;
pub mod chain;
pub mod constants;
pub mod error;
pub mod primitives;
pub mod snapshot;
