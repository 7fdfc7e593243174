/*
 * Copyright 2024 Clinical Store Contributors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! The store's event bus. Emissions here are the store's entire interface to
//! the UI-layer event fan-out, which is out of scope for this crate: we only
//! guarantee the events are emitted, not who listens.

use tokio::sync::broadcast;

/// An event emitted by the store. Subscribers that lag far enough behind to
/// miss events will observe a [`broadcast::error::RecvError::Lagged`] on
/// their next `recv` — the store does not buffer events indefinitely.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum StoreEvent {
    /// A new object was created in the named model's collection.
    Create { model: String, id: String },
    /// A new revision was created for an existing object.
    CreateRevision {
        model: String,
        id: String,
        revision_id: String,
    },
    /// A lock acquisition that had been polling (`acquire_when_free`)
    /// finally succeeded.
    LockAcquired { lock_id: String },
}

/// A cheaply-clonable handle to a per-session event bus.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(256);
        EventBus { sender }
    }

    /// Subscribe to future events. Past events are never replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    /// Emit an event. A send with no subscribers is not an error: the store
    /// does not require anyone to be listening.
    pub fn emit(&self, event: StoreEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
