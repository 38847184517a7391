// ABOUTME: Errors raised while locating and reaching the local container runtime.
// ABOUTME: SNAFU context selectors attach the socket path to connection failures.

use snafu::Snafu;

use super::detection::DetectionError;
use super::traits::RuntimeInfoError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RuntimeError {
    #[snafu(display("no usable container runtime: {source}"))]
    Detection { source: DetectionError },

    #[snafu(display("cannot open runtime socket {socket}: {source}"))]
    Connect {
        socket: String,
        source: RuntimeInfoError,
    },

    #[snafu(display("runtime at {socket} is not answering: {source}"))]
    Unresponsive {
        socket: String,
        source: RuntimeInfoError,
    },
}
