use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wrapper for client contact data that masks its value in Debug and Display output.
///
/// Serialization writes the real value: API responses and persistence need it,
/// log macros like `tracing::info!("{:?}", booking)` must not see it.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl Masked<String> {
    /// Domain part of an email address, lower-cased. Safe to log.
    pub fn email_domain(&self) -> Option<String> {
        self.0
            .rsplit_once('@')
            .map(|(_, domain)| domain.trim().to_ascii_lowercase())
            .filter(|domain| !domain.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_output_is_masked() {
        let email = Masked::new("agent@studio.example".to_string());
        assert_eq!(format!("{:?}", email), "********");
        assert_eq!(serde_json::to_string(&email).unwrap(), "\"agent@studio.example\"");
        assert_eq!(email.email_domain().as_deref(), Some("studio.example"));
    }

    #[test]
    fn test_email_domain_missing() {
        assert_eq!(Masked::new("no-at-sign".to_string()).email_domain(), None);
    }
}
