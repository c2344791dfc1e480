pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Daemon, Download, Health, Init, Upload, Version};
