use crate::errors::{BrowserError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub locator: LocatorConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
    pub presets: PresetParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub browser_type: BrowserType,
    /// Browser binary. Chrome is auto-detected by headless_chrome; Edge falls
    /// back to the usual install locations.
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub viewport: Viewport,
    /// Persisted profile root (`--user-data-dir`), so existing logins apply.
    pub profile_dir: Option<PathBuf>,
    /// Profile inside `profile_dir` (`--profile-directory`).
    pub profile_name: Option<String>,
    pub user_agent: Option<String>,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserType {
    Chrome,
    Edge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Budget for ordinary step lookups.
    pub default_timeout_ms: u64,
    /// Shorter budget for the shadow host and its inner frame.
    pub host_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub navigation_timeout_ms: u64,
    /// Pause after each interaction so the page can react.
    pub settle_ms: u64,
    /// Pause after a completed iteration before reloading the list.
    pub iteration_pause_ms: u64,
    /// How often a missing frame may trigger a reload before the run aborts.
    pub max_reloads: u32,
    /// Where to write a screenshot when a run aborts.
    pub screenshot_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub level: String,
    pub file: Option<PathBuf>,
}

/// Values the built-in workflows plug into their steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetParams {
    /// Instance root, e.g. `https://acme.service-now.com/`.
    pub instance: Option<url::Url>,
    /// `data-test-id` of the account tile on the login page.
    pub account: Option<String>,
    /// Assignment group -> assignee.
    pub assignees: BTreeMap<String, String>,
    pub default_assignee: String,
    pub close_code: String,
    pub resolution_note: String,
    pub work_note: String,
    pub tag_group: String,
    pub max_iterations: Option<u32>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            browser_type: BrowserType::Chrome,
            executable: None,
            headless: true,
            viewport: Viewport::default(),
            profile_dir: None,
            profile_name: None,
            user_agent: None,
            args: vec![],
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 10_000,
            host_timeout_ms: 5_000,
        }
    }
}

impl LocatorConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn host_timeout(&self) -> Duration {
        Duration::from_millis(self.host_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: 30_000,
            settle_ms: 2_000,
            iteration_pause_ms: 3_000,
            max_reloads: 3,
            screenshot_dir: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Default for PresetParams {
    fn default() -> Self {
        Self {
            instance: None,
            account: None,
            assignees: BTreeMap::new(),
            default_assignee: "Default User".to_string(),
            close_code: "Solution provided".to_string(),
            resolution_note: "لعدم رد العميل لاكثر من 3 مرات يرجي اغلاق التذكرة".to_string(),
            work_note: "هل من تحديث؟".to_string(),
            tag_group: "DD".to_string(),
            max_iterations: None,
        }
    }
}

impl PresetParams {
    pub fn instance(&self) -> Result<&url::Url> {
        self.instance.as_ref().ok_or_else(|| {
            BrowserError::ConfigurationError(
                "no instance URL configured (set presets.instance or --instance)".to_string(),
            )
        })
    }
}

impl Config {
    /// Read a YAML or JSON config file, picked by extension.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(content)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(content)?,
            other => {
                return Err(BrowserError::ConfigurationError(format!(
                    "unsupported config format {:?} for {}",
                    other,
                    path.display()
                )))
            }
        };
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = r#"
browser:
  browser_type: edge
  profile_name: Default
presets:
  instance: https://acme.service-now.com/
  assignees:
    Group A: Implementer A
"#;
        let config = Config::parse(yaml, Path::new("nowpilot.yaml")).unwrap();

        assert_eq!(config.browser.browser_type, BrowserType::Edge);
        assert!(config.browser.headless);
        assert_eq!(config.browser.profile_name.as_deref(), Some("Default"));
        assert_eq!(config.locator.host_timeout(), Duration::from_secs(5));
        assert_eq!(config.session.settle_ms, 2_000);
        assert_eq!(
            config.presets.assignees.get("Group A").map(String::as_str),
            Some("Implementer A")
        );
        assert_eq!(config.presets.default_assignee, "Default User");
    }

    #[test]
    fn json_config_is_accepted() {
        let json = r#"{ "locator": { "default_timeout_ms": 3000 } }"#;
        let config = Config::parse(json, Path::new("nowpilot.json")).unwrap();
        assert_eq!(config.locator.default_timeout(), Duration::from_secs(3));
        assert_eq!(config.locator.host_timeout_ms, 5_000);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = Config::parse("", Path::new("nowpilot.toml")).unwrap_err();
        assert!(matches!(err, BrowserError::ConfigurationError(_)));
    }

    #[test]
    fn missing_instance_is_a_configuration_error() {
        let err = PresetParams::default().instance().unwrap_err();
        assert!(err.to_string().contains("--instance"));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nowpilot.yaml");
        std::fs::write(&path, "session:\n  max_reloads: 7\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.session.max_reloads, 7);
    }
}
