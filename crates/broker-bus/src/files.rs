//! Opaque-token registry for files the dashboard is allowed to serve back
//! (e.g. a handoff file referenced from a transcript). Tokens are random
//! hex strings, not the path itself, so the HTTP surface never leaks a
//! filesystem layout to a browser.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use rand::RngCore;

/// Maps opaque tokens to the workspace-relative paths they stand for.
pub struct FileRegistry {
    entries: Mutex<HashMap<String, PathBuf>>,
}

impl FileRegistry {
    pub fn new() -> Self {
        FileRegistry { entries: Mutex::new(HashMap::new()) }
    }

    /// Registers `path` and returns a fresh token for it. Re-registering the
    /// same path yields a new, independent token rather than reusing one —
    /// tokens are cheap and this keeps lookup a single hash-map path.
    pub fn register(&self, path: PathBuf) -> String {
        let token = random_token();
        self.entries.lock().expect("file registry mutex poisoned").insert(token.clone(), path);
        token
    }

    pub fn resolve(&self, token: &str) -> Option<PathBuf> {
        self.entries.lock().expect("file registry mutex poisoned").get(token).cloned()
    }
}

impl Default for FileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_resolve_round_trips() {
        let registry = FileRegistry::new();
        let token = registry.register(PathBuf::from("/tmp/handoff.txt"));
        assert_eq!(registry.resolve(&token), Some(PathBuf::from("/tmp/handoff.txt")));
    }

    #[test]
    fn unknown_token_resolves_to_none() {
        let registry = FileRegistry::new();
        assert_eq!(registry.resolve("deadbeef"), None);
    }

    #[test]
    fn repeated_registration_of_same_path_yields_distinct_tokens() {
        let registry = FileRegistry::new();
        let a = registry.register(PathBuf::from("/tmp/x"));
        let b = registry.register(PathBuf::from("/tmp/x"));
        assert_ne!(a, b);
    }
}
