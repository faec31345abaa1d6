//! `build/out/containers-names.txt`: the container names written by `build`
//! and read back by `composer:install`. The app container is always the
//! first line.

use crate::{CoreError, Result};
use dapp_bk_config::{data_nonrel_container_name, data_rel_container_name, ProjectEnv, BUILD_DIR};
use std::path::{Path, PathBuf};

pub const NAMES_FILE: &str = "containers-names.txt";

/// Location of the names file for a project root
pub fn names_file_path(project_root: &Path) -> PathBuf {
    project_root.join(BUILD_DIR).join("out").join(NAMES_FILE)
}

/// Container names for the project, app container first, then any declared
/// data containers.
pub fn container_names(env: &ProjectEnv) -> Vec<String> {
    let mut names = vec![env.app_container_name()];
    if env.data_rel_type.is_some() {
        names.push(data_rel_container_name(&env.project_name));
    }
    if env.data_nonrel_type.is_some() {
        names.push(data_nonrel_container_name(&env.project_name));
    }
    names
}

/// Write the names file, creating `build/out` if needed
pub fn write_container_names(project_root: &Path, env: &ProjectEnv) -> Result<PathBuf> {
    let path = names_file_path(project_root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut content = container_names(env).join("\n");
    content.push('\n');
    std::fs::write(&path, content)?;

    tracing::debug!("Wrote container names to {:?}", path);
    Ok(path)
}

/// Read the app container name (first non-empty line)
pub fn read_app_container_name(project_root: &Path) -> Result<String> {
    let path = names_file_path(project_root);
    if !path.is_file() {
        return Err(CoreError::NamesFileMissing(path));
    }

    let content = std::fs::read_to_string(&path)?;
    content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
        .ok_or(CoreError::NamesFileEmpty(path))
}
