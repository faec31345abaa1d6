//! Project network provisioning

use crate::{CoreError, Result};
use dapp_bk_config::ProjectEnv;
use tokio::sync::mpsc;

use super::{send_progress, StackManager};

/// What `ensure_network` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkOutcome {
    Existing,
    Created,
}

impl StackManager {
    /// Make sure `<project>-network` exists, creating it if absent.
    ///
    /// Check-then-create is not atomic; two invocations racing on the same
    /// project may both try to create it.
    pub async fn ensure_network(
        &self,
        env: &ProjectEnv,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> Result<NetworkOutcome> {
        let name = env.network_name();

        if let Some(network) = self.provider.inspect_network(&name).await? {
            tracing::debug!(
                "Found network {} ({}, driver {})",
                network.name,
                network.id,
                network.driver
            );
            send_progress(progress, &format!("Network {} already exists", name));
            return Ok(NetworkOutcome::Existing);
        }

        send_progress(progress, &format!("Creating network: {}", name));
        let id = self
            .provider
            .create_network(&name)
            .await
            .map_err(|source| CoreError::NetworkCreate {
                name: name.clone(),
                source,
            })?;
        tracing::debug!("Created network {} ({})", name, id);
        send_progress(progress, &format!("✓ Network {} created", name));

        Ok(NetworkOutcome::Created)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::env;
    use super::*;
    use crate::test_support::{MockCall, MockProvider};

    #[tokio::test]
    async fn test_creates_missing_network() {
        let mock = MockProvider::new();
        let calls = mock.calls.clone();
        let manager = StackManager::new(Box::new(mock));

        let outcome = manager
            .ensure_network(&env(&[("PROJECT_NAME", "shop")]), None)
            .await
            .unwrap();

        assert_eq!(outcome, NetworkOutcome::Created);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                MockCall::InspectNetwork {
                    name: "shop-network".into()
                },
                MockCall::CreateNetwork {
                    name: "shop-network".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_existing_network_untouched() {
        let mock = MockProvider::new().with_network("shop-network");
        let calls = mock.calls.clone();
        let manager = StackManager::new(Box::new(mock));

        let outcome = manager
            .ensure_network(&env(&[("PROJECT_NAME", "shop")]), None)
            .await
            .unwrap();

        assert_eq!(outcome, NetworkOutcome::Existing);
        assert!(!calls
            .lock()
            .unwrap()
            .iter()
            .any(|c| matches!(c, MockCall::CreateNetwork { .. })));
    }

    #[tokio::test]
    async fn test_create_failure_surfaces_engine_message() {
        let mock = MockProvider::new();
        *mock.create_network_error.lock().unwrap() = Some("pool overlaps".into());
        let manager = StackManager::new(Box::new(mock));

        let err = manager
            .ensure_network(&env(&[("PROJECT_NAME", "shop")]), None)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::NetworkCreate { .. }));
        assert!(err.to_string().contains("pool overlaps"));
    }
}
