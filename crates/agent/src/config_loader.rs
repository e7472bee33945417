//! Configuration loading entry point (spec §6): loads a `.env` file first
//! (so its values are visible to `${VAR}` expansion), then parses and
//! validates the YAML config tree.
//!
//! Grounded on `sa_gateway::cli::load_config`'s "config path from env var,
//! fall back to default" shape, extended with `dotenvy` per this
//! workspace's ambient-stack section — the teacher never loads a `.env`
//! file itself.

use std::path::{Path, PathBuf};

use ac_domain::config::Config;
use ac_domain::error::{CoreError, Result};

pub const CONFIG_PATH_ENV_VAR: &str = "AC_AGENT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Load configuration from `path`, or from `$AC_AGENT_CONFIG`, or from
/// `./config.yaml` if neither is given and that file exists. Returns the
/// default (empty) config only when *no* path was named at all and
/// `./config.yaml` doesn't exist either; an explicitly named path (argument
/// or env var) that doesn't exist is a `ConfigInvalid` error, not a silent
/// fallback — a typo in `--config` or `$AC_AGENT_CONFIG` must surface here,
/// not as a confusing `ModelNotFound` later at `execute()` time.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let _ = dotenvy::dotenv();

    let explicit = path
        .map(PathBuf::from)
        .or_else(|| std::env::var(CONFIG_PATH_ENV_VAR).ok().map(PathBuf::from));

    if let Some(explicit) = explicit {
        if !explicit.exists() {
            return Err(CoreError::ConfigInvalid(format!(
                "config path '{}' does not exist",
                explicit.display()
            )));
        }
        return Config::load(&explicit);
    }

    let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
    if default_path.exists() {
        Config::load(&default_path)
    } else {
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_an_explicit_path() {
        let mut file = tempfile_with_contents("models:\n  default_chat: main\n  definitions:\n    main:\n      provider: openai\n      model_name: gpt-4o\n");
        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.models.default_chat.as_deref(), Some("main"));
        file.flush().ok();
    }

    #[test]
    fn falls_back_to_default_config_when_nothing_is_given_and_no_default_file_exists() {
        std::env::remove_var(CONFIG_PATH_ENV_VAR);
        let config = load(None).unwrap();
        assert!(config.models.definitions.is_empty());
    }

    #[test]
    fn an_explicit_path_argument_that_does_not_exist_is_an_error() {
        std::env::remove_var(CONFIG_PATH_ENV_VAR);
        let err = load(Some(Path::new("/nonexistent/path/does-not-exist.yaml"))).unwrap_err();
        assert!(matches!(err, ac_domain::error::CoreError::ConfigInvalid(_)));
    }

    #[test]
    fn an_env_var_path_that_does_not_exist_is_an_error() {
        std::env::set_var(CONFIG_PATH_ENV_VAR, "/nonexistent/env-var-path.yaml");
        let err = load(None).unwrap_err();
        std::env::remove_var(CONFIG_PATH_ENV_VAR);
        assert!(matches!(err, ac_domain::error::CoreError::ConfigInvalid(_)));
    }

    fn tempfile_with_contents(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }
}
