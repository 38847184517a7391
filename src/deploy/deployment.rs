// ABOUTME: Generic release struct parameterized by state marker.
// ABOUTME: State types carry their own data, so an instance exists exactly when a stage created it.

use crate::types::{ImageRef, ReleaseVersion, ServiceName};

use super::instance::ContainerInstance;
use super::request::ReleaseRequest;
use super::state::{Done, Idle, Promoted, Retired, Staged, Verified};

/// A release in progress, parameterized by its current state.
///
/// The state type parameter `S` carries stage-specific data (the digest, the
/// staging instance, the retiring snapshot) directly in the state type, so a
/// transition that needs a staging instance cannot be called before one exists.
#[derive(Debug)]
pub struct Deployment<S> {
    pub(crate) request: ReleaseRequest,
    pub(crate) version: ReleaseVersion,
    /// Production instance serving when the release started.
    pub(crate) previous: Option<ContainerInstance>,
    pub(crate) state: S,
}

impl Deployment<Idle> {
    pub fn new(request: ReleaseRequest) -> Self {
        Deployment {
            request,
            version: ReleaseVersion::next(None),
            previous: None,
            state: Idle,
        }
    }
}

impl<S> Deployment<S> {
    pub fn service(&self) -> &ServiceName {
        self.request.service()
    }

    pub fn image(&self) -> &ImageRef {
        self.request.image()
    }

    pub fn request(&self) -> &ReleaseRequest {
        &self.request
    }

    pub fn version(&self) -> ReleaseVersion {
        self.version
    }

    /// Production instance serving when the release started (None on first release).
    pub fn previous(&self) -> Option<&ContainerInstance> {
        self.previous.as_ref()
    }

    /// Move to the next state, carrying request and version along.
    pub(crate) fn transition<T>(self, state: T) -> Deployment<T> {
        Deployment {
            request: self.request,
            version: self.version,
            previous: self.previous,
            state,
        }
    }
}

impl Deployment<Staged> {
    pub fn staging(&self) -> &ContainerInstance {
        &self.state.staging
    }

    pub fn digest(&self) -> &str {
        &self.state.digest
    }
}

impl Deployment<Verified> {
    pub fn staging(&self) -> &ContainerInstance {
        &self.state.staging
    }

    pub fn health_attempts(&self) -> u32 {
        self.state.health_attempts
    }
}

impl Deployment<Promoted> {
    pub fn production(&self) -> &ContainerInstance {
        &self.state.production
    }
}

impl Deployment<Retired> {
    pub fn production(&self) -> &ContainerInstance {
        &self.state.production
    }
}

impl Deployment<Done> {
    pub fn production(&self) -> &ContainerInstance {
        &self.state.production
    }

    pub fn digest(&self) -> &str {
        &self.state.digest
    }

    /// Containers and images removed by the cleaning stage.
    pub fn reclaimed(&self) -> u64 {
        self.state.reclaimed
    }
}
