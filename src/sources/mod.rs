//! Sample source implementations

mod replay;

pub use replay::{ReplaySource, ReplayTick};
