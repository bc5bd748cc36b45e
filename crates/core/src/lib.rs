#![forbid(unsafe_code)]

pub mod model;
pub mod sampler;
pub mod scheduler;
pub mod selector;
pub mod time;

pub use time::Clock;
