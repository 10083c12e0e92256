// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines the hierarchy of error types for the rendering subsystem.

use crate::renderer::context::ContextDiagnostics;
use std::fmt;

/// An error reported by a [`GraphicsDriver`](crate::renderer::traits::GraphicsDriver)
/// implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The native context could not be created.
    ContextCreationFailed(String),
    /// The driver refused to allocate an object.
    ObjectCreationFailed(&'static str),
    /// A program failed to compile or link.
    ProgramCompilation {
        /// Label of the program.
        label: String,
        /// Compiler or linker log.
        log: String,
    },
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::ContextCreationFailed(msg) => {
                write!(f, "Native context creation failed: {msg}")
            }
            DriverError::ObjectCreationFailed(kind) => {
                write!(f, "Driver failed to create a {kind} object")
            }
            DriverError::ProgramCompilation { label, log } => {
                write!(f, "Program '{label}' failed to build: {log}")
            }
        }
    }
}

impl std::error::Error for DriverError {}

/// An error related to rendering context lifecycle or currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// No current, default, or shared context could be made usable.
    Unavailable(ContextDiagnostics),
    /// The driver failed to create the native context.
    CreationFailed(DriverError),
    /// The driver refused to make the context current.
    SwitchFailed,
    /// The context has no live native context.
    InvalidContext,
    /// The context is current on another thread.
    CurrentOnAnotherThread,
    /// The context has been permanently released.
    Released,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::Unavailable(diagnostics) => write!(f, "{diagnostics}"),
            ContextError::CreationFailed(e) => write!(f, "Context creation failed: {e}"),
            ContextError::SwitchFailed => write!(f, "Driver refused to make the context current"),
            ContextError::InvalidContext => write!(f, "Context has no live native context"),
            ContextError::CurrentOnAnotherThread => {
                write!(f, "Context is already current on another thread")
            }
            ContextError::Released => write!(f, "Context has been released"),
        }
    }
}

impl std::error::Error for ContextError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ContextError::CreationFailed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DriverError> for ContextError {
    fn from(e: DriverError) -> Self {
        ContextError::CreationFailed(e)
    }
}

/// An error related to the creation or management of a GPU resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// No usable context exists to own the resource.
    ContextUnavailable(ContextDiagnostics),
    /// The resource's native handle is missing or stale.
    InvalidHandle,
    /// The driver lacks a capability the operation needs.
    CapabilityUnsupported(String),
    /// An offset or size fell outside the resource.
    OutOfBounds,
    /// A backend-specific failure.
    BackendError(String),
    /// A context operation failed.
    Context(ContextError),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::ContextUnavailable(diagnostics) => write!(f, "{diagnostics}"),
            ResourceError::InvalidHandle => write!(f, "Invalid or stale resource handle"),
            ResourceError::CapabilityUnsupported(what) => {
                write!(f, "Capability not supported by the driver: {what}")
            }
            ResourceError::OutOfBounds => write!(f, "Resource access out of bounds"),
            ResourceError::BackendError(msg) => write!(f, "Backend error: {msg}"),
            ResourceError::Context(e) => write!(f, "Context error: {e}"),
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResourceError::Context(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ContextError> for ResourceError {
    fn from(e: ContextError) -> Self {
        match e {
            ContextError::Unavailable(diagnostics) => ResourceError::ContextUnavailable(diagnostics),
            other => ResourceError::Context(other),
        }
    }
}

impl From<DriverError> for ResourceError {
    fn from(e: DriverError) -> Self {
        ResourceError::BackendError(e.to_string())
    }
}

/// An error raised by an instance stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Appending would exceed the stream's per-draw-call or per-frame capacity.
    CapacityExceeded {
        /// Number of instances the batch would hold.
        requested: usize,
        /// Maximum the stream can hold.
        capacity: usize,
    },
    /// `prepare_for_render` asked for more instances than were appended.
    NothingToFlush {
        /// Instances requested.
        requested: usize,
        /// Instances pending in the current batch.
        pending: usize,
    },
    /// A resource operation failed.
    Resource(ResourceError),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::CapacityExceeded {
                requested,
                capacity,
            } => write!(
                f,
                "Instance stream capacity exceeded: {requested} instances requested, capacity is {capacity}"
            ),
            StreamError::NothingToFlush { requested, pending } => write!(
                f,
                "Cannot flush {requested} instances, only {pending} pending"
            ),
            StreamError::Resource(e) => write!(f, "Instance stream resource error: {e}"),
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StreamError::Resource(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ResourceError> for StreamError {
    fn from(e: ResourceError) -> Self {
        StreamError::Resource(e)
    }
}

impl From<ContextError> for StreamError {
    fn from(e: ContextError) -> Self {
        StreamError::Resource(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_exceeded_display() {
        let err = StreamError::CapacityExceeded {
            requested: 33,
            capacity: 32,
        };
        assert_eq!(
            err.to_string(),
            "Instance stream capacity exceeded: 33 instances requested, capacity is 32"
        );
    }

    #[test]
    fn test_context_unavailable_converts_to_resource_error() {
        let diagnostics = ContextDiagnostics::default();
        let err: ResourceError = ContextError::Unavailable(diagnostics.clone()).into();
        assert_eq!(err, ResourceError::ContextUnavailable(diagnostics));

        let err: ResourceError = ContextError::SwitchFailed.into();
        assert_eq!(err, ResourceError::Context(ContextError::SwitchFailed));
    }

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::ProgramCompilation {
            label: "sprite".to_string(),
            log: "missing main".to_string(),
        };
        assert_eq!(err.to_string(), "Program 'sprite' failed to build: missing main");
    }
}
