//! User credentials checked by the login form.

use std::collections::HashMap;
use std::path::Path;

use crate::session::store::SessionError;

/// User name → password table loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    users: HashMap<String, String>,
}

impl Credentials {
    pub fn from_map(users: HashMap<String, String>) -> Self {
        Self { users }
    }

    /// Load a JSON object of `{"user": "password"}` pairs.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let content = std::fs::read_to_string(path)?;
        let users: HashMap<String, String> = serde_json::from_str(&content)?;
        tracing::info!(path = %path.display(), users = users.len(), "Loaded credentials");
        Ok(Self { users })
    }

    pub fn verify(&self, user: &str, password: &str) -> bool {
        self.users
            .get(user)
            .map(|expected| expected == password)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_known_user() {
        let creds = Credentials::from_map(HashMap::from([("alice".into(), "s3cret".into())]));
        assert!(creds.verify("alice", "s3cret"));
        assert!(!creds.verify("alice", "wrong"));
        assert!(!creds.verify("bob", "s3cret"));
    }

    #[test]
    fn loads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, r#"{"alice": "a", "bob": "b"}"#).unwrap();

        let creds = Credentials::load(&path).unwrap();
        assert_eq!(creds.len(), 2);
        assert!(creds.verify("bob", "b"));
    }
}
