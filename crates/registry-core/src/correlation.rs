//! Correlation identifiers linking a dispatched command to its outcome.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transport metadata property that carries the correlation id on a command.
pub const CORRELATION_ID_PROPERTY: &str = "correlation-id";

/// Default prefix for per-correlation result channels.
pub const DEFAULT_RESULT_CHANNEL_PREFIX: &str = "product-registry-result";

/// Opaque token created once per inbound command.
///
/// The same token tags the command on the command transport and names the
/// result channel the matching event or error is published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generates a fresh correlation id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Derives the deterministic channel name scoped to this correlation id.
    #[must_use]
    pub fn scope(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.0)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorrelationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_correlation_ids_are_unique() {
        assert_ne!(CorrelationId::new(), CorrelationId::new());
    }

    #[test]
    fn test_scope_is_prefix_dash_id() {
        // Arrange
        let id = Uuid::new_v4();
        let correlation_id = CorrelationId::from_uuid(id);

        // Act
        let scope = correlation_id.scope(DEFAULT_RESULT_CHANNEL_PREFIX);

        // Assert
        assert_eq!(scope, format!("product-registry-result-{id}"));
    }

    #[test]
    fn test_parse_round_trips_display() {
        let correlation_id = CorrelationId::new();

        let parsed: CorrelationId = correlation_id.to_string().parse().unwrap();

        assert_eq!(parsed, correlation_id);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("not-a-uuid".parse::<CorrelationId>().is_err());
    }

    #[test]
    fn test_serializes_as_bare_uuid_string() {
        let id = Uuid::new_v4();

        let json = serde_json::to_value(CorrelationId::from_uuid(id)).unwrap();

        assert_eq!(json, serde_json::Value::String(id.to_string()));
    }
}
