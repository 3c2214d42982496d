//! Ordered listener registry behind the event bus.
//!
//! [`EventRegistry`] maps an event identity to the ordered list of
//! registrations against it. The backing map is keyed by the identity string
//! form, which is complete for both matching modes: strict and non-strict
//! comparison alike require an identical `"namespace:name"`, so candidates
//! always live in the same bucket and are narrowed by the event equality
//! rule afterwards.
//!
//! The registry is a plain single-writer structure; the bus wraps it in a
//! read-write lock.

use std::collections::HashMap;

use crate::core::error::RuntimeError;
use crate::events::bus::Listener;
use crate::events::event::Event;

/// Handle returned by registration, usable for later unregistration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerToken {
    identity: String,
    id: u64,
}

impl ListenerToken {
    /// Identity string form the listener was registered against.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

struct Registration {
    event: Event,
    priority: u8,
    listener: Listener,
    id: u64,
}

/// Mapping from event identity to its ordered listener list.
///
/// Per identity, entries are kept sorted by priority ascending with
/// registration order as the tie-break (stable insertion order). Insertion
/// order across distinct identities is irrelevant.
#[derive(Default)]
pub struct EventRegistry {
    entries: HashMap<String, Vec<Registration>>,
    next_id: u64,
}

impl EventRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener against an event identity.
    ///
    /// The registered event (strict flag and payload included) is retained
    /// for match narrowing at dispatch time.
    pub fn insert(&mut self, event: Event, priority: u8, listener: Listener) -> ListenerToken {
        let identity = event.identity();
        let id = self.next_id;
        self.next_id += 1;

        let registrations = self.entries.entry(identity.clone()).or_default();
        registrations.push(Registration {
            event,
            priority,
            listener,
            id,
        });
        // Stable sort keeps registration order within equal priorities.
        registrations.sort_by_key(|r| r.priority);

        ListenerToken { identity, id }
    }

    /// Remove the registration behind a token.
    ///
    /// Returns `false` when the token no longer resolves (already removed).
    pub fn remove(&mut self, token: &ListenerToken) -> bool {
        let Some(registrations) = self.entries.get_mut(&token.identity) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|r| r.id != token.id);
        let removed = registrations.len() < before;
        if registrations.is_empty() {
            self.entries.remove(&token.identity);
        }
        removed
    }

    /// All `(priority, listener)` pairs whose registered event compares
    /// equal to `event`, in dispatch order. Empty when nothing matches.
    #[must_use]
    pub fn matches(&self, event: &Event) -> Vec<(u8, Listener)> {
        self.bucket(&event.identity()).map_or_else(
            |_| Vec::new(),
            |registrations| {
                registrations
                    .iter()
                    .filter(|r| r.event == *event)
                    .map(|r| (r.priority, Listener::clone(&r.listener)))
                    .collect()
            },
        )
    }

    /// Number of registrations across all identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Whether the registry holds no registrations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn bucket(&self, identity: &str) -> Result<&Vec<Registration>, RuntimeError> {
        self.entries
            .get(identity)
            .ok_or_else(|| RuntimeError::NotFound(identity.to_owned()))
    }
}
