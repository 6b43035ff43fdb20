//! Hub access credential

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Primary environment variable for the hub token
pub const TOKEN_ENV: &str = "HF_TOKEN";

/// Legacy alias for the hub token
pub const LEGACY_TOKEN_ENV: &str = "HUGGING_FACE_HUB_TOKEN";

const VISIBLE_PREFIX_LEN: usize = 5;

/// Opaque hub access token
///
/// The secret never appears in `Debug` output; use [`Credential::prefix`]
/// for diagnostics.
#[derive(Clone)]
pub struct Credential(SecretString);

impl Credential {
    /// Wrap a raw token
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::new(token.into()))
    }

    /// Pick the first non-empty token, primary before legacy alias
    pub fn resolve(primary: Option<&str>, legacy: Option<&str>) -> Option<Self> {
        [primary, legacy]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|token| !token.is_empty())
            .map(Self::new)
    }

    /// Short non-secret prefix, safe to log
    pub fn prefix(&self) -> String {
        self.0.expose_secret().chars().take(VISIBLE_PREFIX_LEN).collect()
    }

    /// Raw token, for building authorization headers only
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({}...)", self.prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefers_primary() {
        let credential = Credential::resolve(Some("hf_primary"), Some("hf_legacy")).unwrap();
        assert_eq!(credential.expose(), "hf_primary");
    }

    #[test]
    fn test_resolve_falls_back_on_empty_primary() {
        let credential = Credential::resolve(Some(""), Some("hf_legacy")).unwrap();
        assert_eq!(credential.expose(), "hf_legacy");

        let credential = Credential::resolve(None, Some("hf_legacy")).unwrap();
        assert_eq!(credential.expose(), "hf_legacy");
    }

    #[test]
    fn test_resolve_none() {
        assert!(Credential::resolve(None, None).is_none());
        assert!(Credential::resolve(Some("  "), Some("")).is_none());
    }

    #[test]
    fn test_debug_masks_secret() {
        let credential = Credential::new("hf_abcdefghijklmnop");
        let debug = format!("{:?}", credential);
        assert_eq!(debug, "Credential(hf_ab...)");
        assert!(!debug.contains("cdefgh"));
        assert_eq!(credential.prefix(), "hf_ab");
    }
}
