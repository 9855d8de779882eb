//! Map log entries onto deployment rows

use std::sync::Arc;

use metasync_domain::{DeploymentRecord, Invocation, Result};
use tracing::debug;

use super::ports::AggregateStore;

/// Outcome of resolving an entry's external id.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found(DeploymentRecord),
    /// No deployment is registered under the external id.
    NotFound,
}

pub struct EntryResolver {
    store: Arc<dyn AggregateStore>,
}

impl EntryResolver {
    pub fn new(store: Arc<dyn AggregateStore>) -> Self {
        Self { store }
    }

    /// Find the deployment an invocation ran on.
    ///
    /// # Errors
    /// Store failures propagate; a missing deployment is
    /// [`Resolution::NotFound`], not an error.
    pub async fn resolve(&self, invocation: &Invocation) -> Result<Resolution> {
        match self.store.find_deployment(&invocation.external_id).await? {
            Some(deployment) => Ok(Resolution::Found(deployment)),
            None => {
                debug!(
                    entry_id = invocation.entry_id,
                    external_id = %invocation.external_id,
                    "resolver.unknown_deployment"
                );
                Ok(Resolution::NotFound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use metasync_domain::MetaSyncError;

    use super::*;
    use crate::test_support::{invocation, lineage, InMemoryAggregateStore};

    #[tokio::test(flavor = "multi_thread")]
    async fn resolves_registered_deployment() {
        let store = Arc::new(InMemoryAggregateStore::new());
        let deployment =
            store.insert_lineage(lineage(3, "arn:aws:lambda:us-east-1:1:function:f")).await;
        let resolver = EntryResolver::new(store);

        let found = resolver.resolve(&invocation(1, &deployment.external_id, 10, true)).await;

        assert_eq!(found.unwrap(), Resolution::Found(deployment));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_external_id_is_not_found() {
        let resolver = EntryResolver::new(Arc::new(InMemoryAggregateStore::new()));

        let resolution = resolver.resolve(&invocation(1, "unregistered", 10, true)).await;

        assert_eq!(resolution.unwrap(), Resolution::NotFound);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn store_failure_propagates() {
        let resolver =
            EntryResolver::new(Arc::new(InMemoryAggregateStore::new().with_unavailable()));

        let err = resolver.resolve(&invocation(1, "x", 10, true)).await.unwrap_err();

        assert!(matches!(err, MetaSyncError::Unavailable(_)));
    }
}
