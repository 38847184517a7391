// ABOUTME: Composable capability traits for container runtimes.
// ABOUTME: Defines ContainerOps, ImageOps, LogOps, RuntimeInfo and the FullRuntime bundle.

mod container;
mod image;
mod logs;
mod runtime_info;
mod shared_types;

pub use container::{ContainerError, ContainerFilters, ContainerOps, ContainerSummary};
pub use image::{ImageError, ImageOps};
pub use logs::{LogError, LogLine, LogLineStream, LogOps, LogStream};
pub use runtime_info::{RuntimeInfo, RuntimeInfoError};
pub use shared_types::*;

/// Everything a deployment needs from a runtime.
pub trait FullRuntime: ContainerOps + ImageOps + LogOps + RuntimeInfo {}

impl<T> FullRuntime for T where T: ContainerOps + ImageOps + LogOps + RuntimeInfo {}
