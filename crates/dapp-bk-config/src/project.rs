//! Project environment loaded from `build/.env`
//!
//! The project root is the first directory, walking up from the working
//! directory, that contains `build/.env`.

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Directory (relative to project root) holding the env file and build outputs
pub const BUILD_DIR: &str = "build";

/// Env file name inside [`BUILD_DIR`]
pub const ENV_FILE: &str = ".env";

/// Number of ancestor directories searched above the start directory
pub const MAX_SEARCH_DEPTH: usize = 5;

const DEFAULT_HOST_PORT: u16 = 8080;
const DEFAULT_VOLUME_CONTAINER: &str = "/var/www/html";

/// Declared application type, selecting the default Dockerfile and port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppType {
    #[default]
    PhpApache,
    Node,
    Python,
    Java,
}

impl AppType {
    /// Resolve an `APP_TYPE` value. Unrecognized values fall back to php-apache.
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "php-apache" => Self::PhpApache,
            "node" => Self::Node,
            "python" => Self::Python,
            "java" => Self::Java,
            other => {
                tracing::debug!("Unknown APP_TYPE '{}', using php-apache defaults", other);
                Self::PhpApache
            }
        }
    }

    /// Default Dockerfile path, relative to the project root
    pub fn default_dockerfile(&self) -> &'static str {
        match self {
            Self::PhpApache => "docker/app/Dockerfile-app-php",
            Self::Node => "docker/app/Dockerfile-app-node",
            Self::Python => "docker/app/Dockerfile-app-python",
            Self::Java => "docker/app/Dockerfile-app-java",
        }
    }

    /// Port the application listens on inside the container
    pub fn container_port(&self) -> u16 {
        match self {
            Self::PhpApache => 80,
            Self::Node => 3000,
            Self::Python => 5000,
            Self::Java => 8080,
        }
    }
}

impl std::fmt::Display for AppType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PhpApache => write!(f, "php-apache"),
            Self::Node => write!(f, "node"),
            Self::Python => write!(f, "python"),
            Self::Java => write!(f, "java"),
        }
    }
}

/// Parsed `build/.env`
#[derive(Debug, Clone)]
pub struct ProjectEnv {
    /// `PROJECT_NAME` (required, non-empty)
    pub project_name: String,
    /// `APP_TYPE` as written in the file
    pub app_type_name: Option<String>,
    pub data_rel_type: Option<String>,
    pub data_nonrel_type: Option<String>,
    pub app_dockerfile: Option<String>,
    pub app_base_image: Option<String>,
    pub app_host_port: u16,
    pub app_volume_host: Option<String>,
    pub app_volume_container: String,
    /// `APP_CONTAINER_VOLUME_PATH`: project root inside the container
    pub app_container_volume_path: Option<String>,
    /// Every key/value pair in the file
    pub vars: HashMap<String, String>,
}

impl ProjectEnv {
    /// Path of the env file for a project root
    pub fn env_path(project_root: &Path) -> PathBuf {
        project_root.join(BUILD_DIR).join(ENV_FILE)
    }

    /// Load `build/.env` from the project root
    pub fn load(project_root: &Path) -> Result<Self> {
        let path = Self::env_path(project_root);
        if !path.is_file() {
            return Err(ConfigError::NotFound(path));
        }

        let file = std::fs::File::open(&path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            source: e,
        })?;

        let env = Self::parse(file, &path)?;
        tracing::debug!("Loaded {} keys from {:?}", env.vars.len(), path);
        Ok(env)
    }

    /// Parse env file content. `path` is only used in error messages.
    pub fn parse<R: Read>(reader: R, path: &Path) -> Result<Self> {
        let mut vars = HashMap::new();
        for item in dotenvy::from_read_iter(reader) {
            let (key, value) = item.map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?;
            vars.insert(key, value);
        }
        Self::from_vars(vars)
    }

    /// Build from an already parsed key/value map
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| -> Option<String> {
            vars.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(|v| v.to_string())
        };

        let project_name = get("PROJECT_NAME").ok_or(ConfigError::MissingKey("PROJECT_NAME"))?;

        let app_host_port = match get("APP_HOST_PORT") {
            Some(raw) => raw.parse::<u16>().ok().filter(|p| *p != 0).ok_or_else(|| {
                ConfigError::Invalid(format!("APP_HOST_PORT '{}' is not a valid port", raw))
            })?,
            None => DEFAULT_HOST_PORT,
        };

        Ok(Self {
            project_name,
            app_type_name: get("APP_TYPE"),
            data_rel_type: get("DATA_REL_TYPE"),
            data_nonrel_type: get("DATA_NONREL_TYPE"),
            app_dockerfile: get("APP_DOCKERFILE"),
            app_base_image: get("APP_BASE_IMAGE"),
            app_host_port,
            app_volume_host: get("APP_VOLUME_HOST"),
            app_volume_container: get("APP_VOLUME_CONTAINER")
                .unwrap_or_else(|| DEFAULT_VOLUME_CONTAINER.to_string()),
            app_container_volume_path: get("APP_CONTAINER_VOLUME_PATH"),
            vars,
        })
    }

    /// Effective application type
    pub fn app_type(&self) -> AppType {
        self.app_type_name
            .as_deref()
            .map(AppType::from_name)
            .unwrap_or_default()
    }

    /// Dockerfile path relative to the project root
    pub fn dockerfile(&self) -> String {
        self.app_dockerfile
            .clone()
            .unwrap_or_else(|| self.app_type().default_dockerfile().to_string())
    }

    pub fn network_name(&self) -> String {
        network_name(&self.project_name)
    }

    pub fn app_container_name(&self) -> String {
        app_container_name(&self.project_name)
    }
}

/// `<project>-network`
pub fn network_name(project_name: &str) -> String {
    format!("{}-network", project_name)
}

/// `<project>-app-container`; also used as the image tag
pub fn app_container_name(project_name: &str) -> String {
    format!("{}-app-container", project_name)
}

/// `<project>-data-rel-container`
pub fn data_rel_container_name(project_name: &str) -> String {
    format!("{}-data-rel-container", project_name)
}

/// `<project>-data-nonrel-container`
pub fn data_nonrel_container_name(project_name: &str) -> String {
    format!("{}-data-nonrel-container", project_name)
}

/// Find the project root starting at `start`.
///
/// Checks `start` and up to [`MAX_SEARCH_DEPTH`] ancestors for `build/.env`.
/// When run from inside the `build` directory itself, its parent is the root.
pub fn find_project_root(start: &Path) -> Result<PathBuf> {
    let mut current = Some(start);
    for _ in 0..=MAX_SEARCH_DEPTH {
        let Some(dir) = current else { break };
        if ProjectEnv::env_path(dir).is_file() {
            tracing::debug!("Found project root at {:?}", dir);
            return Ok(dir.to_path_buf());
        }
        current = dir.parent();
    }

    if start.file_name().is_some_and(|n| n == BUILD_DIR) && start.join(ENV_FILE).is_file() {
        if let Some(parent) = start.parent() {
            return Ok(parent.to_path_buf());
        }
    }

    Err(ConfigError::RootNotFound {
        start: start.to_path_buf(),
        searched: MAX_SEARCH_DEPTH,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<ProjectEnv> {
        ProjectEnv::parse(content.as_bytes(), Path::new("build/.env"))
    }

    fn write_env(root: &Path, content: &str) {
        std::fs::create_dir_all(root.join(BUILD_DIR)).unwrap();
        std::fs::write(ProjectEnv::env_path(root), content).unwrap();
    }

    #[test]
    fn test_parse_full_env() {
        let env = parse(
            "# project settings\n\
             PROJECT_NAME=shop\n\
             APP_TYPE=node\n\
             DATA_REL_TYPE=mysql\n\
             APP_BASE_IMAGE=node:20\n\
             APP_HOST_PORT=9000\n\
             APP_VOLUME_HOST=./src\n\
             APP_VOLUME_CONTAINER=/srv/app\n",
        )
        .unwrap();

        assert_eq!(env.project_name, "shop");
        assert_eq!(env.app_type(), AppType::Node);
        assert_eq!(env.data_rel_type.as_deref(), Some("mysql"));
        assert_eq!(env.data_nonrel_type, None);
        assert_eq!(env.app_base_image.as_deref(), Some("node:20"));
        assert_eq!(env.app_host_port, 9000);
        assert_eq!(env.app_volume_host.as_deref(), Some("./src"));
        assert_eq!(env.app_volume_container, "/srv/app");
        assert_eq!(env.dockerfile(), "docker/app/Dockerfile-app-node");
        assert_eq!(env.vars.get("APP_TYPE").map(String::as_str), Some("node"));
    }

    #[test]
    fn test_defaults() {
        let env = parse("PROJECT_NAME=demo\n").unwrap();
        assert_eq!(env.app_type(), AppType::PhpApache);
        assert_eq!(env.app_host_port, 8080);
        assert_eq!(env.app_volume_container, "/var/www/html");
        assert_eq!(env.dockerfile(), "docker/app/Dockerfile-app-php");
        assert!(env.app_volume_host.is_none());
    }

    #[test]
    fn test_missing_project_name_rejected() {
        let err = parse("APP_TYPE=node\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey("PROJECT_NAME")));

        let err = parse("PROJECT_NAME=\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey("PROJECT_NAME")));
    }

    #[test]
    fn test_malformed_line_is_parse_error() {
        let err = parse("PROJECT_NAME=demo\nnot a valid line\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_invalid_host_port() {
        let err = parse("PROJECT_NAME=demo\nAPP_HOST_PORT=http\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_explicit_dockerfile_wins() {
        let env = parse("PROJECT_NAME=demo\nAPP_TYPE=java\nAPP_DOCKERFILE=ops/Dockerfile\n").unwrap();
        assert_eq!(env.dockerfile(), "ops/Dockerfile");
        assert_eq!(env.app_type().container_port(), 8080);
    }

    #[test]
    fn test_app_type_table() {
        let cases = [
            ("php-apache", "docker/app/Dockerfile-app-php", 80),
            ("node", "docker/app/Dockerfile-app-node", 3000),
            ("python", "docker/app/Dockerfile-app-python", 5000),
            ("java", "docker/app/Dockerfile-app-java", 8080),
            ("ruby", "docker/app/Dockerfile-app-php", 80),
        ];
        for (name, dockerfile, port) in cases {
            let t = AppType::from_name(name);
            assert_eq!(t.default_dockerfile(), dockerfile, "{}", name);
            assert_eq!(t.container_port(), port, "{}", name);
        }
    }

    #[test]
    fn test_naming() {
        for name in ["a", "my-shop", "Project_1"] {
            assert_eq!(network_name(name), format!("{}-network", name));
            assert_eq!(app_container_name(name), format!("{}-app-container", name));
        }
        assert_eq!(data_rel_container_name("x"), "x-data-rel-container");
        assert_eq!(data_nonrel_container_name("x"), "x-data-nonrel-container");
    }

    #[test]
    fn test_find_root_in_ancestor() {
        let tmp = tempfile::tempdir().unwrap();
        write_env(tmp.path(), "PROJECT_NAME=demo\n");
        let nested = tmp.path().join("src/app/http");
        std::fs::create_dir_all(&nested).unwrap();

        let root = find_project_root(&nested).unwrap();
        assert_eq!(root, tmp.path());
    }

    #[test]
    fn test_find_root_from_build_dir() {
        let tmp = tempfile::tempdir().unwrap();
        write_env(tmp.path(), "PROJECT_NAME=demo\n");

        let root = find_project_root(&tmp.path().join(BUILD_DIR)).unwrap();
        assert_eq!(root, tmp.path());
    }

    #[test]
    fn test_find_root_too_deep() {
        let tmp = tempfile::tempdir().unwrap();
        write_env(tmp.path(), "PROJECT_NAME=demo\n");
        let nested = tmp.path().join("a/b/c/d/e/f");
        std::fs::create_dir_all(&nested).unwrap();

        let err = find_project_root(&nested).unwrap_err();
        assert!(matches!(err, ConfigError::RootNotFound { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ProjectEnv::load(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        write_env(tmp.path(), "PROJECT_NAME=disk\nAPP_TYPE=python\n");
        let env = ProjectEnv::load(tmp.path()).unwrap();
        assert_eq!(env.project_name, "disk");
        assert_eq!(env.app_type().container_port(), 5000);
        assert_eq!(env.network_name(), "disk-network");
        assert_eq!(env.app_container_name(), "disk-app-container");
    }
}
