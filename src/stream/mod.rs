//! Stream combinators for status observers

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
