//! Agent configuration.

/// How an agent presents itself and receives messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Label shown to the other side in invitations and requests.
    pub label: String,
    /// Where this agent receives messages directly. `None` for agents that
    /// only receive through an agency.
    pub endpoint: Option<String>,
    /// Seed for a deterministic public DID.
    pub public_did_seed: Option<String>,
    /// Overrides the unwrap depth derived from the bound agency.
    pub max_unwrap_layers: Option<usize>,
}

impl AgentConfig {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            endpoint: None,
            public_did_seed: None,
            max_unwrap_layers: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_public_did_seed(mut self, seed: impl Into<String>) -> Self {
        self.public_did_seed = Some(seed.into());
        self
    }

    pub fn with_max_unwrap_layers(mut self, layers: usize) -> Self {
        self.max_unwrap_layers = Some(layers);
        self
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new("pairwise agent")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = AgentConfig::new("Alice")
            .with_endpoint("http://alice/msg")
            .with_public_did_seed("000000000000000000000000000Alice")
            .with_max_unwrap_layers(3);

        assert_eq!(config.label, "Alice");
        assert_eq!(config.endpoint.as_deref(), Some("http://alice/msg"));
        assert_eq!(config.max_unwrap_layers, Some(3));
    }

    #[test]
    fn test_default_has_no_endpoint() {
        let config = AgentConfig::default();
        assert!(config.endpoint.is_none());
        assert!(config.public_did_seed.is_none());
    }
}
