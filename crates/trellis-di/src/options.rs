//! Container options
//!
//! Options are plain serde data with defaults for every field, so a container
//! can be built from `ContainerOptions::default()`, from code, or loaded from
//! an optional file layered under `TRELLIS_*` environment variables.

use std::fmt;
use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::EngineKind;
use crate::error::{DIError, DIResult};

/// Environment variable prefix read by [`ContainerOptions::load`]
pub const ENV_PREFIX: &str = "TRELLIS";

/// What synchronous disposal does with an instance that only supports async disposal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsyncDisposePolicy {
    /// Run the async disposal to completion on a dedicated thread
    #[default]
    Block,
    /// Report a lifecycle error and skip the instance
    Reject,
}

impl fmt::Display for AsyncDisposePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsyncDisposePolicy::Block => f.write_str("block"),
            AsyncDisposePolicy::Reject => f.write_str("reject"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerOptions {
    pub engine: EngineKind,
    /// Invocation at which the dynamic engine schedules compilation
    pub compile_after: u32,
    /// Reject scoped services resolved from the root or captured by singletons
    pub validate_scopes: bool,
    /// Plan every registration when the container is built
    pub validate_on_build: bool,
    pub async_dispose: AsyncDisposePolicy,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            engine: EngineKind::Dynamic,
            compile_after: 2,
            validate_scopes: false,
            validate_on_build: false,
            async_dispose: AsyncDisposePolicy::Block,
        }
    }
}

impl ContainerOptions {
    /// Options suited to development: scope and build validation enabled
    pub fn strict() -> Self {
        Self {
            validate_scopes: true,
            validate_on_build: true,
            ..Self::default()
        }
    }

    /// Load from an optional file, overridden by `TRELLIS_*` environment variables
    pub fn load(path: impl AsRef<Path>) -> DIResult<Self> {
        let path = path.as_ref();
        let config = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        let options: ContainerOptions = config.try_deserialize()?;
        options.validate()?;

        debug!(
            path = %path.display(),
            engine = %options.engine,
            compile_after = options.compile_after,
            "Loaded container options"
        );
        Ok(options)
    }

    pub fn validate(&self) -> DIResult<()> {
        if self.compile_after == 0 {
            return Err(DIError::InvalidOptions(
                "compile_after must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let options = ContainerOptions::default();
        assert_eq!(options.engine, EngineKind::Dynamic);
        assert_eq!(options.compile_after, 2);
        assert!(!options.validate_scopes);
        assert!(!options.validate_on_build);
        assert_eq!(options.async_dispose, AsyncDisposePolicy::Block);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "engine = \"compiled\"").unwrap();
        writeln!(file, "validate_scopes = true").unwrap();
        writeln!(file, "async_dispose = \"reject\"").unwrap();

        let options = ContainerOptions::load(file.path()).unwrap();
        assert_eq!(options.engine, EngineKind::Compiled);
        assert!(options.validate_scopes);
        assert_eq!(options.async_dispose, AsyncDisposePolicy::Reject);
        assert_eq!(options.compile_after, 2);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let options = ContainerOptions::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(options.engine, ContainerOptions::default().engine);
    }

    #[test]
    fn test_zero_compile_after_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "compile_after = 0").unwrap();

        let err = ContainerOptions::load(file.path()).unwrap_err();
        assert!(matches!(err, DIError::InvalidOptions(_)));
    }
}
