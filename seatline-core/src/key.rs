use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier of a reservation draft. Carries no meaning beyond
/// identity; generated from a random v4 UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftKey(String);

impl DraftKey {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespaced form used by key-value stores, e.g. `draft:<key>`.
    pub fn namespaced(&self, namespace: &str) -> String {
        format!("{}:{}", namespace, self.0)
    }
}

impl fmt::Display for DraftKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DraftKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for DraftKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for DraftKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_keys_are_unique() {
        let keys: HashSet<DraftKey> = (0..10_000).map(|_| DraftKey::generate()).collect();
        assert_eq!(keys.len(), 10_000);
    }

    #[test]
    fn test_namespaced() {
        let key = DraftKey::from("abc");
        assert_eq!(key.namespaced("token"), "token:abc");
        assert_eq!(key.namespaced("reservation"), "reservation:abc");
    }
}
