//! Plugins Config - 플러그인 활성화 설정
//!
//! ```json
//! {
//!   "plugins": {
//!     "stats": { "enabled": true, "config": { "interval": 30 } }
//!   },
//!   "auto_enable_new": true
//! }
//! ```

use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, error};

/// 설정 파일명
pub const PLUGINS_CONFIG_FILE: &str = "plugins.json";

/// 플러그인 설정 파일 전체
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// 플러그인별 설정 (키: slug 또는 이름)
    #[serde(default)]
    pub plugins: HashMap<String, PluginConfigEntry>,

    /// 설정에 없는 플러그인 자동 활성화 여부
    #[serde(default = "default_auto_enable")]
    pub auto_enable_new: bool,
}

/// 플러그인 하나의 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginConfigEntry {
    /// 활성화 여부 (생략 시 false)
    #[serde(default)]
    pub enabled: bool,

    /// 플러그인에 전달할 추가 설정
    #[serde(default)]
    pub config: Map<String, Value>,
}

fn default_auto_enable() -> bool {
    true
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            plugins: HashMap::new(),
            auto_enable_new: true,
        }
    }
}

impl PluginsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 파일에서 로드
    ///
    /// 파일이 없으면 기본값, 파싱 실패 시 에러 로그 후 기본값.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(Some(config)) => {
                debug!(
                    path = %path.display(),
                    entries = config.plugins.len(),
                    "Loaded plugins config"
                );
                config
            }
            Ok(None) => {
                debug!(path = %path.display(), "Plugins config not found, using defaults");
                Self::default()
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read plugins config");
                Self::default()
            }
        }
    }

    /// 파일에서 로드 (파일이 없으면 None)
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let (store, file_name) = JsonStore::for_file(path)?;
        store.load_optional(&file_name)
    }

    /// 파일로 저장 (디렉토리 자동 생성)
    pub fn save(&self, path: &Path) -> Result<()> {
        let (store, file_name) = JsonStore::for_file(path)?;
        store.save(&file_name, self)
    }

    /// 첫 번째로 매칭되는 키의 설정 항목
    fn find(&self, keys: &[&str]) -> Option<&PluginConfigEntry> {
        keys.iter().find_map(|key| self.plugins.get(*key))
    }

    /// 활성화 여부 - 키 순서대로 검사, 없으면 auto_enable_new
    pub fn is_enabled(&self, keys: &[&str]) -> bool {
        self.find(keys)
            .map(|entry| entry.enabled)
            .unwrap_or(self.auto_enable_new)
    }

    /// 플러그인 추가 설정
    pub fn entry_config(&self, keys: &[&str]) -> Option<&Map<String, Value>> {
        self.find(keys).map(|entry| &entry.config)
    }

    /// 활성화 플래그 변경 (메모리에만 반영)
    pub fn set_enabled(&mut self, key: impl Into<String>, enabled: bool) {
        self.plugins.entry(key.into()).or_default().enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PluginsConfig::load_or_default(&dir.path().join(PLUGINS_CONFIG_FILE));

        assert!(config.auto_enable_new);
        assert!(config.plugins.is_empty());
        assert!(config.is_enabled(&["anything"]));
    }

    #[test]
    fn test_invalid_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PLUGINS_CONFIG_FILE);
        std::fs::write(&path, "not json").unwrap();

        let config = PluginsConfig::load_or_default(&path);
        assert!(config.auto_enable_new);
    }

    #[test]
    fn test_parse_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PLUGINS_CONFIG_FILE);
        std::fs::write(
            &path,
            r#"{
                "plugins": {
                    "stats": { "enabled": false },
                    "Greeter Plugin": { "enabled": true, "config": { "greeting": "hi" } },
                    "bare": { "config": {} }
                },
                "auto_enable_new": false
            }"#,
        )
        .unwrap();

        let config = PluginsConfig::load_or_default(&path);
        assert!(!config.is_enabled(&["stats", "Stats"]));
        assert!(config.is_enabled(&["greeter", "Greeter Plugin"]));
        // enabled 생략 -> false
        assert!(!config.is_enabled(&["bare"]));
        // 미등록 -> auto_enable_new
        assert!(!config.is_enabled(&["unknown"]));

        let extra = config.entry_config(&["greeter", "Greeter Plugin"]).unwrap();
        assert_eq!(extra["greeting"], "hi");
    }

    #[test]
    fn test_slug_key_wins_over_name() {
        let mut config = PluginsConfig::new();
        config.set_enabled("stats", true);
        config.set_enabled("Stats Plugin", false);

        assert!(config.is_enabled(&["stats", "Stats Plugin"]));
        assert!(!config.is_enabled(&["other", "Stats Plugin"]));
    }

    #[test]
    fn test_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs").join(PLUGINS_CONFIG_FILE);

        let mut config = PluginsConfig::new();
        config.set_enabled("stats", false);
        config.save(&path).unwrap();

        let loaded = PluginsConfig::load(&path).unwrap().unwrap();
        assert!(!loaded.is_enabled(&["stats"]));
    }
}
