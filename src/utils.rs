pub mod context;
pub mod file;
pub mod logging;
pub mod process;
pub mod thread;
pub mod time;
pub mod toml;
