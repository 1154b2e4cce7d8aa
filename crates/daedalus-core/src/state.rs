//! Application and per-request state.
//!
//! The application owns one [`SharedState`]. Every request gets a [`State`]
//! derived from it according to a [`StatePolicy`]:
//!
//! | Policy | Reads | Writes |
//! |---|---|---|
//! | `Clone` | snapshot taken at context creation | local |
//! | `Alias` | live application state | application state |
//! | `Prototype` | local first, then live application state | local |
//! | `Empty` | local only | local |

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How per-request state is derived from the application state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatePolicy {
    /// Deep copy of the application state. Requests are isolated.
    #[default]
    Clone,
    /// Shared reference to the application state.
    Alias,
    /// Local writes with reads falling through to the application state.
    Prototype,
    /// A fresh, empty state.
    Empty,
}

impl fmt::Display for StatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Clone => "clone",
            Self::Alias => "alias",
            Self::Prototype => "prototype",
            Self::Empty => "empty",
        };
        f.write_str(name)
    }
}

/// Error returned when parsing an unknown state policy name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown state policy '{0}', expected one of clone, alias, prototype, empty")]
pub struct ParseStatePolicyError(String);

impl FromStr for StatePolicy {
    type Err = ParseStatePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clone" => Ok(Self::Clone),
            "alias" => Ok(Self::Alias),
            "prototype" => Ok(Self::Prototype),
            "empty" => Ok(Self::Empty),
            other => Err(ParseStatePolicyError(other.to_string())),
        }
    }
}

/// Application-wide state shared between requests.
///
/// Cloning a `SharedState` clones the handle, not the data.
#[derive(Debug, Clone, Default)]
pub struct SharedState(Arc<RwLock<Map<String, Value>>>);

impl SharedState {
    /// Creates an empty shared state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a shared state from an existing map.
    #[must_use]
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(Arc::new(RwLock::new(map)))
    }

    /// Returns a copy of the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.read().get(key).cloned()
    }

    /// Stores a value, returning the previous one.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.write().insert(key.into(), value.into())
    }

    /// Removes a value, returning it.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.write().remove(key)
    }

    /// Returns true if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.read().contains_key(key)
    }

    /// Returns a deep copy of the whole map.
    #[must_use]
    pub fn snapshot(&self) -> Map<String, Value> {
        self.0.read().clone()
    }

    /// Returns true if both handles point at the same storage.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Per-request state.
///
/// # Example
///
/// ```
/// use daedalus_core::{SharedState, State, StatePolicy};
///
/// let app = SharedState::new();
/// app.set("greeting", "hello");
///
/// let mut state = State::derive(&app, StatePolicy::Prototype);
/// assert_eq!(state.get("greeting"), Some("hello".into()));
///
/// state.set("greeting", "hi");
/// assert_eq!(app.get("greeting"), Some("hello".into()));
/// ```
#[derive(Debug, Clone)]
pub struct State {
    inner: Inner,
}

#[derive(Debug, Clone)]
enum Inner {
    Owned(Map<String, Value>),
    Alias(SharedState),
    Prototype {
        local: Map<String, Value>,
        parent: SharedState,
    },
}

impl Default for State {
    fn default() -> Self {
        Self {
            inner: Inner::Owned(Map::new()),
        }
    }
}

impl State {
    /// Derives a request state from the application state.
    #[must_use]
    pub fn derive(app: &SharedState, policy: StatePolicy) -> Self {
        let inner = match policy {
            StatePolicy::Clone => Inner::Owned(app.snapshot()),
            StatePolicy::Alias => Inner::Alias(app.clone()),
            StatePolicy::Prototype => Inner::Prototype {
                local: Map::new(),
                parent: app.clone(),
            },
            StatePolicy::Empty => Inner::Owned(Map::new()),
        };
        Self { inner }
    }

    /// Returns a copy of the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        match &self.inner {
            Inner::Owned(map) => map.get(key).cloned(),
            Inner::Alias(shared) => shared.get(key),
            Inner::Prototype { local, parent } => {
                local.get(key).cloned().or_else(|| parent.get(key))
            }
        }
    }

    /// Returns the value under `key` deserialized as `T`.
    ///
    /// Returns `None` when the key is absent or has a different shape.
    #[must_use]
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    /// Stores a value, returning the previous local value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        match &mut self.inner {
            Inner::Owned(map) | Inner::Prototype { local: map, .. } => {
                map.insert(key.into(), value.into())
            }
            Inner::Alias(shared) => shared.set(key, value),
        }
    }

    /// Removes a value. Under `Prototype` only the local value is removed,
    /// so the application value becomes visible again.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        match &mut self.inner {
            Inner::Owned(map) | Inner::Prototype { local: map, .. } => map.remove(key),
            Inner::Alias(shared) => shared.remove(key),
        }
    }

    /// Returns true if `key` is visible from this state.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        match &self.inner {
            Inner::Owned(map) => map.contains_key(key),
            Inner::Alias(shared) => shared.contains_key(key),
            Inner::Prototype { local, parent } => {
                local.contains_key(key) || parent.contains_key(key)
            }
        }
    }

    /// Returns every visible entry as one map.
    #[must_use]
    pub fn to_map(&self) -> Map<String, Value> {
        match &self.inner {
            Inner::Owned(map) => map.clone(),
            Inner::Alias(shared) => shared.snapshot(),
            Inner::Prototype { local, parent } => {
                let mut merged = parent.snapshot();
                for (k, v) in local {
                    merged.insert(k.clone(), v.clone());
                }
                merged
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn app_state() -> SharedState {
        let app = SharedState::new();
        app.set("count", 1);
        app.set("nested", json!({ "a": [1, 2] }));
        app
    }

    #[test]
    fn test_clone_policy_isolates_writes() {
        let app = app_state();
        let mut state = State::derive(&app, StatePolicy::Clone);

        state.set("count", 5);
        assert_eq!(state.get("count"), Some(json!(5)));
        assert_eq!(app.get("count"), Some(json!(1)));

        app.set("late", true);
        assert!(!state.contains_key("late"));
    }

    #[test]
    fn test_alias_policy_shares_writes() {
        let app = app_state();
        let mut state = State::derive(&app, StatePolicy::Alias);

        state.set("count", 7);
        assert_eq!(app.get("count"), Some(json!(7)));

        state.remove("nested");
        assert!(!app.contains_key("nested"));
    }

    #[test]
    fn test_prototype_policy_falls_through() {
        let app = app_state();
        let mut state = State::derive(&app, StatePolicy::Prototype);

        assert_eq!(state.get("count"), Some(json!(1)));
        state.set("count", 2);
        assert_eq!(state.get("count"), Some(json!(2)));
        assert_eq!(app.get("count"), Some(json!(1)));

        state.remove("count");
        assert_eq!(state.get("count"), Some(json!(1)));

        app.set("late", "seen");
        assert_eq!(state.get("late"), Some(json!("seen")));
    }

    #[test]
    fn test_prototype_to_map_merges_local_over_parent() {
        let app = app_state();
        let mut state = State::derive(&app, StatePolicy::Prototype);
        state.set("count", 3);
        state.set("own", "x");

        let map = state.to_map();
        assert_eq!(map.get("count"), Some(&json!(3)));
        assert_eq!(map.get("own"), Some(&json!("x")));
        assert!(map.contains_key("nested"));
    }

    #[test]
    fn test_empty_policy() {
        let app = app_state();
        let state = State::derive(&app, StatePolicy::Empty);
        assert!(state.to_map().is_empty());
    }

    #[test]
    fn test_get_as() {
        let app = app_state();
        let state = State::derive(&app, StatePolicy::Clone);
        assert_eq!(state.get_as::<u32>("count"), Some(1));
        assert_eq!(state.get_as::<String>("count"), None);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("alias".parse::<StatePolicy>(), Ok(StatePolicy::Alias));
        assert_eq!(" Prototype ".parse::<StatePolicy>(), Ok(StatePolicy::Prototype));
        assert!("global".parse::<StatePolicy>().is_err());
        assert_eq!(StatePolicy::default().to_string(), "clone");
    }

    #[test]
    fn test_policy_serde() {
        let policy: StatePolicy = serde_json::from_str("\"empty\"").unwrap();
        assert_eq!(policy, StatePolicy::Empty);
    }
}
