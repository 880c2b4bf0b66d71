//! Storage key names.

/// Well-known storage keys, all prefixed with a site namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    namespace: String,
}

impl StorageKeys {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Raw access token of the last relayed session
    pub fn auth_token(&self) -> String {
        self.key("auth_token")
    }

    /// JSON-serialized user of the last relayed session
    pub fn auth_user(&self) -> String {
        self.key("auth_user")
    }

    /// Capture time of the last relayed session (ms since epoch)
    pub fn auth_timestamp(&self) -> String {
        self.key("auth_timestamp")
    }

    /// Staged manual token, removed once relayed
    pub fn manual_token(&self) -> String {
        self.key("manual_token")
    }

    /// Staged manual user (JSON), removed once relayed
    pub fn manual_user(&self) -> String {
        self.key("manual_user")
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}_{}", self.namespace, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_namespaced() {
        let keys = StorageKeys::new("sift");
        assert_eq!(keys.auth_token(), "sift_auth_token");
        assert_eq!(keys.auth_user(), "sift_auth_user");
        assert_eq!(keys.auth_timestamp(), "sift_auth_timestamp");
        assert_eq!(keys.manual_token(), "sift_manual_token");
        assert_eq!(keys.manual_user(), "sift_manual_user");
    }
}
