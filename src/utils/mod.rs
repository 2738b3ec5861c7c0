pub mod logging;
pub mod paths;

pub use paths::{absolute, dir_arg};
