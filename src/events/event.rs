//! Event identity: namespaces, payloads, and the strict matching rule.
//!
//! An [`Event`] is identified by `(namespace, name)` and rendered as
//! `"NAMESPACE:NAME"`, or just `"NAMESPACE"` when the name is empty (a
//! namespace-wide event). It carries a `strict` flag and an open payload map.
//!
//! Equality is deliberately asymmetric in depth: when either operand is
//! strict, the full identity is compared — namespace, name, and every
//! payload attribute; when both are non-strict, only `namespace:name`
//! matters. A strict-registered listener therefore matches only an exact
//! payload, while a non-strict listener matches any payload on the same
//! identity. The strict flag itself and the dispatch timestamp never take
//! part in equality.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::RuntimeError;
use crate::util::clock::now_ms;

/// Opaque string identifier grouping events, e.g. a subsystem name.
///
/// Namespaces are always supplied explicitly by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace(String);

impl Namespace {
    /// Create a namespace from its string value.
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    /// The namespace's string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Create an event on this namespace.
    #[must_use]
    pub fn event<S: Into<String>>(&self, name: S) -> Event {
        Event::new(self.clone(), name)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Namespace {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Namespace {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl PartialEq<str> for Namespace {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// An event with identity, strictness, payload, and dispatch timestamp.
///
/// Events are non-strict by default; strictness is an explicit opt-in via
/// [`Event::strict`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    namespace: Namespace,
    name: String,
    strict: bool,
    payload: BTreeMap<String, Value>,
    dispatched_at_ms: Option<u128>,
}

impl Event {
    /// Create a non-strict event with an empty payload.
    pub fn new<N: Into<Namespace>, S: Into<String>>(namespace: N, name: S) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            strict: false,
            payload: BTreeMap::new(),
            dispatched_at_ms: None,
        }
    }

    /// Set the strict flag.
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Add one payload attribute.
    #[must_use]
    pub fn with_attr<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// The event's namespace.
    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The event's name; empty for a namespace-wide event.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the event requires exact payload matches.
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.strict
    }

    /// The open payload map.
    #[must_use]
    pub const fn payload(&self) -> &BTreeMap<String, Value> {
        &self.payload
    }

    /// Look up one payload attribute.
    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Dispatch timestamp in milliseconds since the epoch; `None` before the
    /// event has been dispatched.
    #[must_use]
    pub const fn dispatched_at_ms(&self) -> Option<u128> {
        self.dispatched_at_ms
    }

    /// The identity string form: `"NAMESPACE:NAME"`, or `"NAMESPACE"` when
    /// the name is empty.
    #[must_use]
    pub fn identity(&self) -> String {
        self.to_string()
    }

    pub(crate) fn merge_payload<I>(&mut self, extra: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.payload.extend(extra);
    }

    pub(crate) fn stamp_dispatched(&mut self) {
        self.dispatched_at_ms = Some(now_ms());
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.namespace)
        } else {
            write!(f, "{}:{}", self.namespace, self.name)
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        let identity_matches = self.namespace == other.namespace && self.name == other.name;
        if self.strict || other.strict {
            identity_matches && self.payload == other.payload
        } else {
            identity_matches
        }
    }
}

impl FromStr for Event {
    type Err = RuntimeError;

    /// Parse the `"NAMESPACE[:NAME]"` wire format into a non-strict event.
    ///
    /// A bare `"NAMESPACE"` denotes the namespace-wide event with an empty
    /// name. More than one colon, or an empty namespace, is rejected.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let (namespace, name) = spec.split_once(':').unwrap_or((spec, ""));
        if namespace.is_empty() || name.contains(':') {
            return Err(RuntimeError::InvalidEventSpec(spec.to_owned()));
        }
        Ok(Self::new(namespace, name))
    }
}

/// An event argument: either an [`Event`] value or its string wire form.
#[derive(Debug, Clone)]
pub enum EventSpec {
    /// An explicit event.
    Event(Event),
    /// A `"NAMESPACE[:NAME]"` string, parsed non-strict at use.
    Text(String),
}

impl EventSpec {
    /// Resolve the spec into an event.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidEventSpec`] for a malformed string
    /// form.
    pub fn resolve(self) -> Result<Event, RuntimeError> {
        match self {
            Self::Event(event) => Ok(event),
            Self::Text(text) => text.parse(),
        }
    }
}

impl From<Event> for EventSpec {
    fn from(event: Event) -> Self {
        Self::Event(event)
    }
}

impl From<&str> for EventSpec {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for EventSpec {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}
