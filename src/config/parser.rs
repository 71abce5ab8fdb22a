//! Loading of `stackctl.yaml`.
//!
//! Reads the project file, applies `STACKCTL_*` environment overrides and
//! loads the `.env` file sitting next to it.

use crate::error::{ConfigError, Result, StackctlError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::ProjectConfig;

/// File names probed, in order, when no `--config` is given.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "stackctl.yaml",
    "stackctl.yml",
    "stacks.yaml",
    "stacks.yml",
];

/// Reads a [`ProjectConfig`] from disk.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Directory holding the project file and its `.env`.
    project_dir: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a parser rooted at the working directory.
    #[must_use]
    pub const fn new() -> Self {
        Self { project_dir: None }
    }

    /// Roots the parser at `dir` instead of the working directory.
    #[must_use]
    pub fn with_base_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = Some(dir.into());
        self
    }

    /// Reads and parses the project file at `path`.
    ///
    /// # Errors
    ///
    /// `FileNotFound` when `path` is absent, `ParseError` when it cannot be
    /// read or is not a valid project document.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ProjectConfig> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StackctlError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        info!(path = %path.display(), "Reading project file");
        let raw = std::fs::read_to_string(path).map_err(|e| {
            StackctlError::Config(ConfigError::ParseError {
                message: format!("cannot read project file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&raw, Some(path))
    }

    /// Parses a project document held in memory.
    ///
    /// `source` only labels errors.
    ///
    /// # Errors
    ///
    /// `ParseError` when the document does not match the project schema.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ProjectConfig> {
        let config: ProjectConfig = serde_yaml::from_str(content).map_err(|e| {
            StackctlError::Config(ConfigError::ParseError {
                message: format!("invalid project document: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })?;

        debug!(
            project = %config.project,
            contexts = config.contexts.len(),
            stacks = config.stacks.len(),
            "Parsed project file"
        );
        Ok(config)
    }

    /// Like [`Self::load_file`], then applies `STACKCTL_PROJECT` and
    /// `STACKCTL_REGION` on top.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load_file`].
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<ProjectConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    fn apply_env_overrides(config: &mut ProjectConfig) {
        if let Ok(project) = std::env::var("STACKCTL_PROJECT") {
            debug!("STACKCTL_PROJECT overrides project name");
            config.project = project;
        }
        if let Ok(region) = std::env::var("STACKCTL_REGION") {
            debug!("STACKCTL_REGION overrides global region");
            config.region = Some(region);
        }
    }

    /// Exports the variables of the project's `.env` file, when one exists.
    ///
    /// # Errors
    ///
    /// `ParseError` when the file exists but is malformed.
    pub fn load_dotenv(&self) -> Result<()> {
        let dotenv = self
            .project_dir
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |dir| dir.join(".env"));

        if !dotenv.exists() {
            debug!(path = %dotenv.display(), "No .env file");
            return Ok(());
        }

        info!(path = %dotenv.display(), "Loading .env");
        dotenvy::from_path(&dotenv).map_err(|e| {
            StackctlError::Config(ConfigError::ParseError {
                message: format!("malformed .env file: {e}"),
                location: Some(dotenv.display().to_string()),
            })
        })
    }
}

/// Searches `start_dir` and each of its ancestors for a project file.
///
/// # Errors
///
/// `FileNotFound` naming `stackctl.yaml` under `start_dir` when no ancestor
/// holds one.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();

    for dir in start.ancestors() {
        if let Some(found) = DEFAULT_CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.exists())
        {
            info!(path = %found.display(), "Found project file");
            return Ok(found);
        }
    }

    Err(StackctlError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::spec::{ListItem, ParameterValue, ResolverSpec};
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
project: test-project
";
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).unwrap();

        assert_eq!(config.project, "test-project");
        assert!(config.region.is_none());
        assert!(config.contexts.is_empty());
        assert!(config.stacks.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
project: my-app
region: us-east-1
tags:
  Project: my-app

contexts:
  dev:
    account: "123456789012"
    region: us-west-2
    tags:
      Environment: dev
  prod:
    account: "210987654321"

stacks:
  vpc:
    template: templates/vpc.yaml
    parameters:
      CidrBlock: 10.0.0.0/16
  app:
    template: file:///srv/templates/app.yaml
    depends_on: [vpc]
    capabilities: [CAPABILITY_IAM]
    parameters:
      SecurityGroups:
        - sg-1
        - type: stack-output
          stack_name: security
          output_key: WebSGId
    contexts:
      prod:
        parameters:
          InstanceType: m5.large
"#;
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).unwrap();

        assert_eq!(config.project, "my-app");
        assert_eq!(config.context_names(), vec!["dev", "prod"]);
        assert_eq!(config.stack_names(), vec!["app", "vpc"]);
        assert_eq!(config.contexts["dev"].account.as_deref(), Some("123456789012"));

        let app = &config.stacks["app"];
        assert_eq!(app.depends_on, vec![String::from("vpc")]);
        assert_eq!(
            app.parameters["SecurityGroups"],
            ParameterValue::List(vec![
                ListItem::Literal(String::from("sg-1")),
                ListItem::Resolver(ResolverSpec::stack_output("security", "WebSGId")),
            ])
        );
        assert!(app.contexts.contains_key("prod"));
    }

    #[test]
    fn test_parse_error_reports_location() {
        let parser = ConfigParser::new();
        let err = parser
            .parse_yaml("project: [unterminated", Some(Path::new("stackctl.yaml")))
            .unwrap_err();

        match err {
            StackctlError::Config(ConfigError::ParseError { location, .. }) => {
                assert_eq!(location.as_deref(), Some("stackctl.yaml"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_missing_file() {
        let parser = ConfigParser::new();
        let result = parser.load_file("/nonexistent/stackctl.yaml");
        assert!(matches!(
            result,
            Err(StackctlError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(temp.path().join("stackctl.yaml"), "project: demo\n").unwrap();
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, temp.path().join("stackctl.yaml"));
    }
}
