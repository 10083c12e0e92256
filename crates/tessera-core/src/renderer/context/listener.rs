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

//! Lifecycle observers of a rendering context.
//!
//! A context never owns the resources that depend on it. Dependents subscribe
//! a weak reference and unwind themselves when notified, so a dropped resource
//! simply stops receiving events.

use super::RenderingContext;
use crate::renderer::api::RenderTargetId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

/// A lifecycle event of a rendering context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextEvent {
    /// A native context was (re)created and is current.
    Created,
    /// Default states are applied and the capability probe is done.
    SetupComplete,
    /// The native context is about to be torn down and is still current.
    WillBeDestroyed,
    /// The native context is gone.
    Destroyed,
    /// Another context is about to become current on this thread, or the
    /// thread is about to unbind. Carries the render target that was current.
    WillLoseCurrency {
        /// Render target current alongside the context, reset by the switch.
        render_target: Option<RenderTargetId>,
    },
}

/// Receives lifecycle events of the contexts it subscribed to.
///
/// Events arrive in the order `Created -> SetupComplete` and
/// `WillBeDestroyed -> Destroyed`, always with the render lock held.
/// `WillLoseCurrency` may arrive at any point in between while the context is
/// still current.
pub trait ContextListener: Send + Sync {
    /// A native context was (re)created.
    fn on_context_created(&self, _context: &RenderingContext) {}
    /// The context finished setup; recreate GPU objects here.
    fn on_context_setup_complete(&self, _context: &RenderingContext) {}
    /// The native context is about to go away; snapshot GPU content here.
    fn on_context_will_be_destroyed(&self, _context: &RenderingContext) {}
    /// The native context is gone; drop remaining native references here.
    fn on_context_destroyed(&self, _context: &RenderingContext) {}
    /// The context is still current but the thread is switching away from it;
    /// flush work targeting `render_target` here.
    fn on_context_will_lose_currency(
        &self,
        _context: &RenderingContext,
        _render_target: Option<RenderTargetId>,
    ) {
    }
}

/// Token returned by [`ListenerList::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// An observer list of weak listener references.
///
/// Dispatch works on a snapshot, so listeners may subscribe or unsubscribe
/// (themselves or others) while an event is being delivered. A listener
/// removed mid-dispatch is not called afterwards.
#[derive(Default)]
pub struct ListenerList {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Weak<dyn ContextListener>)>>,
}

impl std::fmt::Debug for ListenerList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerList")
            .field("len", &self.entries.lock().len())
            .finish()
    }
}

impl ListenerList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener.
    pub fn subscribe(&self, listener: Weak<dyn ContextListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((id, listener));
        id
    }

    /// Removes a listener. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.entries.lock().retain(|(entry, _)| *entry != id);
    }

    /// Number of listeners that are still alive.
    pub fn live_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    /// Drops every subscription.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn contains(&self, id: ListenerId) -> bool {
        self.entries.lock().iter().any(|(entry, _)| *entry == id)
    }

    /// Delivers `event` to every live listener in subscription order and prunes
    /// the dead ones.
    pub fn dispatch(&self, event: ContextEvent, context: &RenderingContext) {
        let snapshot: Vec<_> = self.entries.lock().clone();
        let mut dead = Vec::new();

        for (id, weak) in snapshot {
            if !self.contains(id) {
                continue;
            }
            let Some(listener) = weak.upgrade() else {
                dead.push(id);
                continue;
            };
            match event {
                ContextEvent::Created => listener.on_context_created(context),
                ContextEvent::SetupComplete => listener.on_context_setup_complete(context),
                ContextEvent::WillBeDestroyed => listener.on_context_will_be_destroyed(context),
                ContextEvent::Destroyed => listener.on_context_destroyed(context),
                ContextEvent::WillLoseCurrency { render_target } => {
                    listener.on_context_will_lose_currency(context, render_target)
                }
            }
        }

        if !dead.is_empty() {
            self.entries.lock().retain(|(id, _)| !dead.contains(id));
        }
    }
}
