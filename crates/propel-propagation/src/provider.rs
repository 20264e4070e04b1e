//! Connector lookup.

use std::collections::HashMap;
use std::sync::Arc;

use propel_connector::traits::ConnectorFacade;

/// Resolves the connector facade serving a resource.
pub trait ConnectorProvider: Send + Sync {
    fn connector(&self, resource: &str) -> Option<Arc<dyn ConnectorFacade>>;
}

/// Provider backed by a fixed map of resource name to facade.
#[derive(Default, Clone)]
pub struct StaticConnectorProvider {
    connectors: HashMap<String, Arc<dyn ConnectorFacade>>,
}

impl StaticConnectorProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, resource: impl Into<String>, facade: Arc<dyn ConnectorFacade>) {
        self.connectors.insert(resource.into(), facade);
    }

    #[must_use]
    pub fn with(mut self, resource: impl Into<String>, facade: Arc<dyn ConnectorFacade>) -> Self {
        self.register(resource, facade);
        self
    }
}

impl std::fmt::Debug for StaticConnectorProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut resources: Vec<&str> = self.connectors.keys().map(String::as_str).collect();
        resources.sort_unstable();
        f.debug_struct("StaticConnectorProvider")
            .field("resources", &resources)
            .finish()
    }
}

impl ConnectorProvider for StaticConnectorProvider {
    fn connector(&self, resource: &str) -> Option<Arc<dyn ConnectorFacade>> {
        self.connectors.get(resource).cloned()
    }
}
