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

use log;

/// A thread-safe, unbounded event channel.
///
/// The bus keeps one receiver for its owner; additional consumers obtain their own
/// handle through [`EventBus::subscribe`]. Receivers compete for events, so each
/// event is observed by exactly one of them.
#[derive(Debug)]
pub struct EventBus<T: Send + 'static> {
    sender: flume::Sender<T>,
    receiver: flume::Receiver<T>,
}

impl<T: Send + 'static> EventBus<T> {
    /// Creates a bus backed by an unbounded channel.
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        log::debug!("EventBus<{}> initialized.", std::any::type_name::<T>());
        Self { sender, receiver }
    }

    /// Publishes an event. Never blocks.
    pub fn publish(&self, event: T) {
        log::trace!("Publishing {}.", std::any::type_name::<T>());
        if let Err(e) = self.sender.send(event) {
            log::error!("Failed to publish event: {e}. Receiver likely disconnected.");
        }
    }

    /// Returns a sender so other components can publish on this bus.
    pub fn sender(&self) -> flume::Sender<T> {
        self.sender.clone()
    }

    /// Returns a new receiver handle for this bus.
    pub fn subscribe(&self) -> flume::Receiver<T> {
        self.receiver.clone()
    }

    /// Removes and returns every event currently queued, without blocking.
    pub fn drain(&self) -> Vec<T> {
        self.receiver.try_iter().collect()
    }
}

impl<T: Send + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[derive(Debug, Clone, PartialEq)]
    enum TestEvent {
        Created(u64),
        Released(u64),
    }

    #[test]
    fn test_drain_returns_events_in_order() {
        let bus = EventBus::new();
        bus.publish(TestEvent::Created(1));
        bus.publish(TestEvent::Released(1));

        assert_eq!(
            bus.drain(),
            vec![TestEvent::Created(1), TestEvent::Released(1)]
        );
        assert!(bus.drain().is_empty());
    }

    #[test]
    fn test_publish_from_other_thread() {
        let bus = EventBus::new();
        let sender = bus.sender();
        let receiver = bus.subscribe();

        thread::spawn(move || {
            sender.send(TestEvent::Created(7)).unwrap();
        })
        .join()
        .unwrap();

        assert_eq!(receiver.recv().unwrap(), TestEvent::Created(7));
    }
}
