//! The application-facing side of a request context.

use std::fmt;
use std::sync::Arc;

use crate::state::SharedState;

/// Signs and verifies byte strings, typically for cookies.
///
/// Daedalus only carries the key ring around; the signing algorithm and key
/// rotation belong to the implementation.
pub trait KeyRing: Send + Sync {
    /// Returns a signature for `data`.
    fn sign(&self, data: &[u8]) -> Vec<u8>;

    /// Returns true if `signature` is valid for `data` under any key.
    fn verify(&self, data: &[u8], signature: &[u8]) -> bool;
}

/// What a request context can see of its application.
///
/// Cheap to clone; every request holds one.
#[derive(Clone, Default)]
pub struct AppHandle {
    state: SharedState,
    keys: Option<Arc<dyn KeyRing>>,
    proxy: bool,
}

impl AppHandle {
    /// Creates a handle over the given shared state.
    #[must_use]
    pub fn new(state: SharedState) -> Self {
        Self {
            state,
            keys: None,
            proxy: false,
        }
    }

    /// Sets the key ring.
    #[must_use]
    pub fn with_keys(mut self, keys: Arc<dyn KeyRing>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Trusts `x-forwarded-*` headers when building request URLs.
    #[must_use]
    pub fn with_proxy(mut self, proxy: bool) -> Self {
        self.proxy = proxy;
        self
    }

    /// Returns the application state.
    #[must_use]
    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Returns the key ring, if configured.
    #[must_use]
    pub fn keys(&self) -> Option<&Arc<dyn KeyRing>> {
        self.keys.as_ref()
    }

    /// Returns true if proxy headers are trusted.
    #[must_use]
    pub fn proxy(&self) -> bool {
        self.proxy
    }
}

impl fmt::Debug for AppHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppHandle")
            .field("state", &self.state)
            .field("keys", &self.keys.is_some())
            .field("proxy", &self.proxy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Reverse;

    impl KeyRing for Reverse {
        fn sign(&self, data: &[u8]) -> Vec<u8> {
            data.iter().rev().copied().collect()
        }

        fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
            self.sign(data) == signature
        }
    }

    #[test]
    fn test_handle_shares_state() {
        let state = SharedState::new();
        let handle = AppHandle::new(state.clone());
        handle.state().set("k", "v");
        assert_eq!(state.get("k"), Some("v".into()));
    }

    #[test]
    fn test_key_ring_contract() {
        let handle = AppHandle::default().with_keys(Arc::new(Reverse));
        let keys = handle.keys().unwrap();
        let sig = keys.sign(b"abc");
        assert!(keys.verify(b"abc", &sig));
        assert!(!keys.verify(b"abd", &sig));
        assert!(format!("{handle:?}").contains("keys: true"));
    }
}
