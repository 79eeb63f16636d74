pub mod ansi;
mod pool;

pub use ansi::{Color, RenderMode};
pub use pool::ThreadPool;

pub use num_cpus::get as num_cpus;
