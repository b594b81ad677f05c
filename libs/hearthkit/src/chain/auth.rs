//! A rotating set of credential keys for a single provider entry.

use parking_lot::Mutex;

pub struct AuthProfile {
    keys: Vec<String>,
    idx: Mutex<usize>,
}

impl AuthProfile {
    pub fn new(keys: Vec<String>) -> Self {
        assert!(!keys.is_empty(), "AuthProfile requires at least one key");
        Self {
            keys,
            idx: Mutex::new(0),
        }
    }

    pub fn current(&self) -> &str {
        &self.keys[*self.idx.lock()]
    }

    /// Advances to the next key, wrapping around. Returns whether a rotation
    /// actually happened (a single-key profile never rotates).
    pub fn rotate(&self) -> bool {
        if self.keys.len() <= 1 {
            return false;
        }
        let mut idx = self.idx.lock();
        *idx = (*idx + 1) % self.keys.len();
        true
    }
}
