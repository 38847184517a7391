// ABOUTME: Library root for hotswap - blue-green container releases on a single host.
// ABOUTME: The CLI binary lives in main.rs; everything it drives is exposed here for testing.

pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod hooks;
pub mod notify;
pub mod output;
pub mod runtime;
pub mod secrets;
pub mod types;
