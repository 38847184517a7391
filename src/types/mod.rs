// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Phantom-typed ids, image references, service names and release naming.

mod id;
mod image_ref;
mod instance;
mod service_name;
mod version;

pub use id::ContainerId;
pub use image_ref::{ImageRef, ParseImageRefError};
pub use instance::{InstanceName, ParseInstanceNameError, Role, RoleError};
pub use service_name::{ServiceName, ServiceNameError};
pub use version::{ParseVersionError, ReleaseVersion};
