//! Finalizer token handling
//!
//! The token is the engine's claim on an object: while it is present in the
//! object's finalizer set, the store only marks the object for deletion and
//! waits for the engine to run its cleanup. The token is an explicit
//! configuration value handed to each engine at construction, so engines with
//! distinct tokens can share one store.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Default token used by the shipped operator binary
pub const DEFAULT_FINALIZER: &str = "hardware.fleetops.io/request-protection";

/// A well-known string identifying one engine's claim on managed objects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizerToken(String);

impl FinalizerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this token is in the object's finalizer set
    pub fn is_present(&self, meta: &ObjectMeta) -> bool {
        meta.finalizers
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|f| f == &self.0)
    }

    /// Add this token to the finalizer set; idempotent
    pub fn add(&self, meta: &mut ObjectMeta) {
        let finalizers = meta.finalizers.get_or_insert_with(Vec::new);
        if !finalizers.iter().any(|f| f == &self.0) {
            finalizers.push(self.0.clone());
        }
    }

    /// Remove this token from the finalizer set; idempotent
    pub fn remove(&self, meta: &mut ObjectMeta) {
        if let Some(finalizers) = meta.finalizers.as_mut() {
            finalizers.retain(|f| f != &self.0);
        }
    }
}

impl Default for FinalizerToken {
    fn default() -> Self {
        Self::new(DEFAULT_FINALIZER)
    }
}

impl std::fmt::Display for FinalizerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent() {
        let token = FinalizerToken::new("test.io/protect");
        let mut meta = ObjectMeta::default();

        token.add(&mut meta);
        token.add(&mut meta);

        assert_eq!(meta.finalizers, Some(vec!["test.io/protect".to_string()]));
        assert!(token.is_present(&meta));
    }

    #[test]
    fn test_remove_leaves_other_tokens() {
        let ours = FinalizerToken::new("test.io/protect");
        let mut meta = ObjectMeta {
            finalizers: Some(vec![
                "test.io/protect".to_string(),
                "other.io/protect".to_string(),
            ]),
            ..Default::default()
        };

        ours.remove(&mut meta);

        assert!(!ours.is_present(&meta));
        assert_eq!(meta.finalizers, Some(vec!["other.io/protect".to_string()]));
    }

    #[test]
    fn test_distinct_tokens_coexist() {
        let first = FinalizerToken::new("first.io/protect");
        let second = FinalizerToken::new("second.io/protect");
        let mut meta = ObjectMeta::default();

        first.add(&mut meta);
        second.add(&mut meta);

        assert!(first.is_present(&meta));
        assert!(second.is_present(&meta));
    }
}
