//! Data container roles. Only acknowledged for now; nothing is provisioned.

use dapp_bk_config::{data_nonrel_container_name, data_rel_container_name, ProjectEnv};
use tokio::sync::mpsc;

use super::{send_progress, StackManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRole {
    Relational,
    NonRelational,
}

impl std::fmt::Display for DataRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Relational => write!(f, "Relational"),
            Self::NonRelational => write!(f, "Non-relational"),
        }
    }
}

/// A declared data container that was acknowledged but not touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataAcknowledgement {
    pub role: DataRole,
    pub container_name: String,
    pub db_type: String,
}

impl StackManager {
    /// Acknowledge each declared data role. No engine call is made.
    pub fn handle_data_containers(
        &self,
        env: &ProjectEnv,
        rebuild: bool,
        import: bool,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> Vec<DataAcknowledgement> {
        if rebuild {
            tracing::warn!("--rebuild-data is not implemented yet; ignoring");
        }
        if import {
            tracing::warn!("--import-data is not implemented yet; ignoring");
        }

        let declared = [
            (
                DataRole::Relational,
                env.data_rel_type.as_ref(),
                data_rel_container_name(&env.project_name),
            ),
            (
                DataRole::NonRelational,
                env.data_nonrel_type.as_ref(),
                data_nonrel_container_name(&env.project_name),
            ),
        ];

        declared
            .into_iter()
            .filter_map(|(role, db_type, container_name)| {
                let db_type = db_type?.clone();
                send_progress(
                    progress,
                    &format!(
                        "{} database container handling ({}: {})...",
                        role, container_name, db_type
                    ),
                );
                Some(DataAcknowledgement {
                    role,
                    container_name,
                    db_type,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::{drain, env};
    use super::*;
    use crate::test_support::MockProvider;

    #[test]
    fn test_nothing_declared() {
        let mock = MockProvider::new();
        let calls = mock.calls.clone();
        let manager = StackManager::new(Box::new(mock));

        let acks = manager.handle_data_containers(&env(&[("PROJECT_NAME", "shop")]), true, true, None);

        assert!(acks.is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_both_roles_acknowledged() {
        let manager = StackManager::new(Box::new(MockProvider::new()));
        let env = env(&[
            ("PROJECT_NAME", "shop"),
            ("DATA_REL_TYPE", "postgres"),
            ("DATA_NONREL_TYPE", "mongodb"),
        ]);
        let (tx, rx) = mpsc::unbounded_channel();

        let acks = manager.handle_data_containers(&env, false, false, Some(&tx));
        drop(tx);

        assert_eq!(
            acks,
            vec![
                DataAcknowledgement {
                    role: DataRole::Relational,
                    container_name: "shop-data-rel-container".into(),
                    db_type: "postgres".into(),
                },
                DataAcknowledgement {
                    role: DataRole::NonRelational,
                    container_name: "shop-data-nonrel-container".into(),
                    db_type: "mongodb".into(),
                },
            ]
        );

        let out = drain(rx);
        assert!(out.contains("Relational database container handling"));
        assert!(out.contains("Non-relational database container handling"));
    }

    #[test]
    fn test_only_nonrel_declared() {
        let manager = StackManager::new(Box::new(MockProvider::new()));
        let env = env(&[("PROJECT_NAME", "shop"), ("DATA_NONREL_TYPE", "redis")]);

        let acks = manager.handle_data_containers(&env, false, false, None);

        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].role, DataRole::NonRelational);
    }
}
