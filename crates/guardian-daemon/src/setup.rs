//! Config and questionnaire loading, well-known paths.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use guardian_types::Questionnaire;
use tracing::info;

use crate::config::{Config, QuizConfig};
use crate::error::DaemonError;

/// Load configuration from the given path, or the default location.
pub fn load_config(path: Option<&str>) -> Result<Config, DaemonError> {
    let config_path = resolve_config_path(path);

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| DaemonError::Config(format!("failed to read config: {e}")))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| DaemonError::Config(format!("failed to parse config: {e}")))?;
        info!(path = %config_path.display(), "loaded config");
        Ok(config)
    } else {
        info!("no config file found, using defaults");
        Ok(Config::default())
    }
}

/// The config file `load_config` reads for the given argument.
pub fn resolve_config_path(path: Option<&str>) -> PathBuf {
    match path {
        Some(p) => PathBuf::from(p),
        None => default_config_path(),
    }
}

/// Load the questionnaire named by the config, or the built-in one.
pub fn load_questionnaire(quiz: &QuizConfig) -> Result<Arc<Questionnaire>, DaemonError> {
    let questionnaire = match &quiz.file {
        Some(path) => read_questionnaire(path)?,
        None => {
            info!("using built-in questionnaire");
            Questionnaire::builtin()
        }
    };
    Ok(Arc::new(questionnaire))
}

fn read_questionnaire(path: &Path) -> Result<Questionnaire, DaemonError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DaemonError::Config(format!("failed to read questionnaire {}: {e}", path.display()))
    })?;
    let questionnaire: Questionnaire = toml::from_str(&content).map_err(|e| {
        DaemonError::Config(format!("failed to parse questionnaire {}: {e}", path.display()))
    })?;
    questionnaire.validate()?;
    info!(path = %path.display(), questions = questionnaire.len(), "loaded questionnaire");
    Ok(questionnaire)
}

/// Get the default config directory path.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("guardian")
}

/// Get the default config file path.
fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the log file path used while the terminal surface owns the screen.
pub fn log_file_path() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("guardian")
        .join("guardian.log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardian_types::QuestionnaireError;

    #[test]
    fn missing_config_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.server.url, "http://localhost:3000");
    }

    #[test]
    fn config_path_defaults_to_config_dir() {
        assert_eq!(resolve_config_path(None), config_dir().join("config.toml"));
        assert_eq!(
            resolve_config_path(Some("/etc/guardian.toml")),
            PathBuf::from("/etc/guardian.toml")
        );
    }

    #[test]
    fn config_file_values_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[daemon]\nlog_level = \"debug\"\n").unwrap();
        let config = load_config(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.daemon.log_level, "debug");
    }

    #[test]
    fn unparseable_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nurl = 3").unwrap();
        let err = load_config(Some(path.to_str().unwrap())).unwrap_err();
        assert!(matches!(err, DaemonError::Config(_)));
    }

    #[test]
    fn builtin_questionnaire_without_file() {
        let q = load_questionnaire(&QuizConfig::default()).unwrap();
        assert_eq!(*q, Questionnaire::builtin());
    }

    #[test]
    fn questionnaire_file_is_loaded_and_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questions.toml");
        std::fs::write(
            &path,
            r#"
[[questions]]
text = "2+2?"
options = ["3", "4", "5"]
correct_index = 1
"#,
        )
        .unwrap();
        let q = load_questionnaire(&QuizConfig {
            file: Some(path.clone()),
        })
        .unwrap();
        assert_eq!(q.len(), 1);

        std::fs::write(
            &path,
            r#"
[[questions]]
text = "2+2?"
options = ["3", "4"]
correct_index = 7
"#,
        )
        .unwrap();
        let err = load_questionnaire(&QuizConfig { file: Some(path) }).unwrap_err();
        assert!(matches!(
            err,
            DaemonError::Questionnaire(QuestionnaireError::CorrectIndexOutOfRange { .. })
        ));
    }
}
