pub mod accumulator;
pub mod axes;
pub mod throttler;
