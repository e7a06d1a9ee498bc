// Image transform relay library

pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod proxy;
pub mod signing;
pub mod source;
pub mod upstream_path;
