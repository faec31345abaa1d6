//! Composer dependency installation inside the running app container

use crate::{CoreError, Result};
use dapp_bk_provider::{ContainerId, ContainerStatus, ExecConfig};
use tokio::sync::mpsc;

use super::{send_progress, StackManager};

/// Project root inside the container when `APP_CONTAINER_VOLUME_PATH` is unset
pub const DEFAULT_CONTAINER_PROJECT_ROOT: &str = "/var/www/html";

const COMPOSER_SETUP: &str = "/tmp/composer-setup.php";

/// What `install_dependencies` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// No manifest at the expected path; nothing was run
    Skipped { manifest: String },
    /// `composer install` completed
    Installed {
        /// Composer had to be installed into the container first
        composer_bootstrapped: bool,
    },
}

impl StackManager {
    /// Run `composer install` in `container_name` with `workdir` as the
    /// project root, installing Composer first if the image lacks it.
    pub async fn install_dependencies(
        &self,
        container_name: &str,
        workdir: &str,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> Result<InstallOutcome> {
        let container = self
            .provider
            .inspect_container(container_name)
            .await?
            .ok_or_else(|| CoreError::ContainerNotFound(container_name.to_string()))?;

        if container.status != ContainerStatus::Running {
            return Err(CoreError::NotRunning {
                name: container_name.to_string(),
                status: container.status,
            });
        }
        send_progress(progress, "✓ Container is running");
        send_progress(progress, &format!("Project root in container: {}", workdir));

        let manifest = format!("{}/composer.json", workdir.trim_end_matches('/'));
        send_progress(progress, "Checking for composer.json...");
        if self
            .exec_status(&container.id, ["test", "-f", manifest.as_str()])
            .await?
            != 0
        {
            tracing::warn!("No composer.json found in {}", workdir);
            send_progress(
                progress,
                &format!("No composer.json found in {}, skipping Composer install", workdir),
            );
            return Ok(InstallOutcome::Skipped { manifest });
        }
        send_progress(progress, "✓ Found composer.json");

        send_progress(progress, "Checking for Composer...");
        let composer_bootstrapped = if self.exec_status(&container.id, ["which", "composer"]).await? != 0 {
            send_progress(progress, "Composer not found, installing...");
            self.bootstrap_composer(&container.id, progress).await?;
            true
        } else {
            send_progress(progress, "✓ Composer is installed");
            false
        };

        send_progress(progress, "Running composer install...");
        let install = ExecConfig::new([
            "composer",
            "install",
            "--no-interaction",
            "--optimize-autoloader",
        ])
        .in_dir(workdir);

        let exit_code = match progress {
            Some(tx) => {
                self.provider
                    .exec_with_progress(&container.id, &install, tx.clone())
                    .await?
            }
            None => {
                let result = self.provider.exec(&container.id, &install).await?;
                if !result.output.is_empty() {
                    tracing::info!("{}", result.output.trim_end());
                }
                result.exit_code
            }
        };

        if exit_code != 0 {
            return Err(CoreError::InstallFailed(exit_code));
        }

        send_progress(progress, "✓ Composer install completed successfully!");
        Ok(InstallOutcome::Installed {
            composer_bootstrapped,
        })
    }

    async fn bootstrap_composer(
        &self,
        id: &ContainerId,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> Result<()> {
        send_progress(progress, "Installing Composer...");

        let download = format!(
            "copy('https://getcomposer.org/installer', '{}');",
            COMPOSER_SETUP
        );
        if self.exec_status(id, ["php", "-r", download.as_str()]).await? != 0 {
            return Err(CoreError::ComposerSetup(
                "Failed to download Composer installer".to_string(),
            ));
        }

        let code = self
            .exec_status(
                id,
                [
                    "php",
                    COMPOSER_SETUP,
                    "--install-dir=/usr/local/bin",
                    "--filename=composer",
                ],
            )
            .await?;
        if code != 0 {
            return Err(CoreError::ComposerSetup(
                "Failed to install Composer".to_string(),
            ));
        }

        match self.exec_status(id, ["rm", COMPOSER_SETUP]).await {
            Ok(0) => {}
            Ok(code) => tracing::warn!("Failed to remove {} (exit code {})", COMPOSER_SETUP, code),
            Err(e) => tracing::warn!("Failed to remove {}: {}", COMPOSER_SETUP, e),
        }

        send_progress(progress, "✓ Composer installed successfully");
        Ok(())
    }

    async fn exec_status<const N: usize>(&self, id: &ContainerId, cmd: [&str; N]) -> Result<i64> {
        let result = self.provider.exec(id, &ExecConfig::new(cmd)).await?;
        tracing::debug!("exec {:?} exited with {}", cmd, result.exit_code);
        Ok(result.exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::drain;
    use super::*;
    use crate::test_support::{MockCall, MockProvider};

    const APP: &str = "shop-app-container";

    fn cmds(calls: &[MockCall]) -> Vec<String> {
        calls
            .iter()
            .filter_map(|c| match c {
                MockCall::Exec { cmd, .. } | MockCall::ExecWithProgress { cmd, .. } => {
                    Some(cmd.join(" "))
                }
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_container_not_found() {
        let manager = StackManager::new(Box::new(MockProvider::new()));

        let err = manager
            .install_dependencies(APP, DEFAULT_CONTAINER_PROJECT_ROOT, None)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::ContainerNotFound(ref n) if n == APP));
    }

    #[tokio::test]
    async fn test_container_not_running_aborts() {
        let mock = MockProvider::new().with_container(APP, ContainerStatus::Exited);
        let calls = mock.calls.clone();
        let manager = StackManager::new(Box::new(mock));

        let err = manager
            .install_dependencies(APP, DEFAULT_CONTAINER_PROJECT_ROOT, None)
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Container 'shop-app-container' is not running (status: exited)"
        );
        assert!(cmds(&calls.lock().unwrap()).is_empty());
    }

    #[tokio::test]
    async fn test_missing_manifest_skips() {
        let mock = MockProvider::new()
            .with_container(APP, ContainerStatus::Running)
            .with_exec_exit_code("test -f", 1);
        let calls = mock.calls.clone();
        let manager = StackManager::new(Box::new(mock));

        let outcome = manager
            .install_dependencies(APP, "/app/", None)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            InstallOutcome::Skipped {
                manifest: "/app/composer.json".into()
            }
        );
        assert_eq!(cmds(&calls.lock().unwrap()), vec!["test -f /app/composer.json"]);
    }

    #[tokio::test]
    async fn test_installs_with_existing_composer() {
        let mock = MockProvider::new().with_container(APP, ContainerStatus::Running);
        *mock.exec_output.lock().unwrap() = vec!["Generating optimized autoload files\n".into()];
        let calls = mock.calls.clone();
        let manager = StackManager::new(Box::new(mock));
        let (tx, rx) = mpsc::unbounded_channel();

        let outcome = manager
            .install_dependencies(APP, DEFAULT_CONTAINER_PROJECT_ROOT, Some(&tx))
            .await
            .unwrap();
        drop(tx);

        assert_eq!(
            outcome,
            InstallOutcome::Installed {
                composer_bootstrapped: false
            }
        );
        assert!(calls.lock().unwrap().contains(&MockCall::ExecWithProgress {
            id: "shop-app-container-id".into(),
            cmd: vec![
                "composer".into(),
                "install".into(),
                "--no-interaction".into(),
                "--optimize-autoloader".into(),
            ],
            working_dir: Some("/var/www/html".into()),
        }));
        assert!(drain(rx).contains("Generating optimized autoload files"));
    }

    #[tokio::test]
    async fn test_bootstraps_missing_composer() {
        let mock = MockProvider::new()
            .with_container(APP, ContainerStatus::Running)
            .with_exec_exit_code("which composer", 1);
        let calls = mock.calls.clone();
        let manager = StackManager::new(Box::new(mock));

        let outcome = manager
            .install_dependencies(APP, DEFAULT_CONTAINER_PROJECT_ROOT, None)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            InstallOutcome::Installed {
                composer_bootstrapped: true
            }
        );
        assert_eq!(
            cmds(&calls.lock().unwrap()),
            vec![
                "test -f /var/www/html/composer.json",
                "which composer",
                "php -r copy('https://getcomposer.org/installer', '/tmp/composer-setup.php');",
                "php /tmp/composer-setup.php --install-dir=/usr/local/bin --filename=composer",
                "rm /tmp/composer-setup.php",
                "composer install --no-interaction --optimize-autoloader",
            ]
        );
    }

    #[tokio::test]
    async fn test_installer_download_failure_is_fatal() {
        let mock = MockProvider::new()
            .with_container(APP, ContainerStatus::Running)
            .with_exec_exit_code("which composer", 1)
            .with_exec_exit_code("php -r", 1);
        let calls = mock.calls.clone();
        let manager = StackManager::new(Box::new(mock));

        let err = manager
            .install_dependencies(APP, DEFAULT_CONTAINER_PROJECT_ROOT, None)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::ComposerSetup(_)));
        assert!(!cmds(&calls.lock().unwrap())
            .iter()
            .any(|c| c.starts_with("composer install")));
    }

    #[tokio::test]
    async fn test_cleanup_failure_is_not_fatal() {
        let mock = MockProvider::new()
            .with_container(APP, ContainerStatus::Running)
            .with_exec_exit_code("which composer", 1)
            .with_exec_exit_code("rm ", 1);
        let manager = StackManager::new(Box::new(mock));

        let outcome = manager
            .install_dependencies(APP, DEFAULT_CONTAINER_PROJECT_ROOT, None)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            InstallOutcome::Installed {
                composer_bootstrapped: true
            }
        ));
    }

    #[tokio::test]
    async fn test_install_nonzero_exit_is_fatal() {
        let mock = MockProvider::new()
            .with_container(APP, ContainerStatus::Running)
            .with_exec_exit_code("composer install", 2);
        let manager = StackManager::new(Box::new(mock));

        let err = manager
            .install_dependencies(APP, DEFAULT_CONTAINER_PROJECT_ROOT, None)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::InstallFailed(2)));
    }
}
