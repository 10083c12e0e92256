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

//! Human-readable snapshots of context state for error reports.

use super::RenderingContext;
use crate::renderer::api::ContextId;
use std::fmt;

/// Identity and status flags of one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextInfo {
    /// Arena id.
    pub id: ContextId,
    /// Has a live native context and is not released.
    pub is_valid: bool,
    /// A native context exists.
    pub is_created: bool,
    /// The context was permanently released.
    pub is_destroyed: bool,
}

impl ContextInfo {
    /// Captures the flags of `context`.
    pub fn of(context: &RenderingContext) -> Self {
        Self {
            id: context.id(),
            is_valid: context.is_valid(),
            is_created: context.is_created(),
            is_destroyed: context.is_destroyed(),
        }
    }
}

impl fmt::Display for ContextInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (isValid={} isCreated={} isDestroyed={})",
            self.id, self.is_valid as u8, self.is_created as u8, self.is_destroyed as u8
        )
    }
}

/// The contexts a factory tried before giving up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextDiagnostics {
    /// Context current on the calling thread.
    pub current: Option<ContextInfo>,
    /// Default context of the render system.
    pub default: Option<ContextInfo>,
    /// Shared context of the render system.
    pub shared: Option<ContextInfo>,
}

fn describe(info: &Option<ContextInfo>) -> String {
    info.map_or_else(|| "null".to_string(), |i| i.to_string())
}

impl fmt::Display for ContextDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Context is null! currentContext={}, defaultContext={}, sharedContext={}",
            describe(&self.current),
            describe(&self.default),
            describe(&self.shared)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_display() {
        let diagnostics = ContextDiagnostics {
            current: None,
            default: Some(ContextInfo {
                id: ContextId(1),
                is_valid: false,
                is_created: false,
                is_destroyed: true,
            }),
            shared: None,
        };
        assert_eq!(
            diagnostics.to_string(),
            "Context is null! currentContext=null, defaultContext=ctx#1 (isValid=0 isCreated=0 isDestroyed=1), sharedContext=null"
        );
    }
}
