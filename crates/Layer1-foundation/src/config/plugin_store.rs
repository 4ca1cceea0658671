//! Plugin Config Store - 플러그인별 설정 파일
//!
//! `<plugin_config_dir>/<slug>.json` 에 플러그인 기본 설정을 생성/로드합니다.

use crate::storage::JsonStore;
use crate::Result;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// 플러그인별 설정 저장소
#[derive(Debug, Clone)]
pub struct PluginConfigStore {
    store: JsonStore,
}

impl PluginConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::new(dir),
        }
    }

    pub fn dir(&self) -> &Path {
        self.store.base_dir()
    }

    fn file_name(slug: &str) -> String {
        format!("{}.json", slug)
    }

    /// 설정 파일 경로
    pub fn path_for(&self, slug: &str) -> PathBuf {
        self.store.file_path(&Self::file_name(slug))
    }

    /// 설정 파일 존재 여부
    pub fn exists(&self, slug: &str) -> bool {
        self.store.exists(&Self::file_name(slug))
    }

    /// 설정 로드, 없으면 기본값으로 생성
    ///
    /// - 기존 파일이 정상이면 그대로 사용
    /// - 파싱 실패 또는 파일 없음 + 기본값 있음 -> 기본값으로 (재)생성
    /// - 둘 다 없으면 None
    pub fn load_or_create(
        &self,
        slug: &str,
        defaults: Option<&Map<String, Value>>,
    ) -> Result<Option<Map<String, Value>>> {
        let file_name = Self::file_name(slug);

        if self.store.exists(&file_name) {
            match self.store.load::<Map<String, Value>>(&file_name) {
                Ok(config) => {
                    debug!(slug, path = %self.path_for(slug).display(), "Loaded plugin config");
                    return Ok(Some(config));
                }
                Err(e) => {
                    error!(slug, error = %e, "Failed to parse plugin config, will recreate");
                }
            }
        }

        match defaults {
            Some(defaults) => {
                self.store.save(&file_name, defaults)?;
                info!(slug, path = %self.path_for(slug).display(), "Created default plugin config");
                Ok(Some(defaults.clone()))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> Map<String, Value> {
        json!({ "interval": 30, "enabled_features": ["a"] })
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_creates_from_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = PluginConfigStore::new(dir.path().join("plugins"));

        let config = store.load_or_create("stats", Some(&defaults())).unwrap().unwrap();
        assert_eq!(config["interval"], 30);
        assert!(store.exists("stats"));
    }

    #[test]
    fn test_existing_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = PluginConfigStore::new(dir.path());
        std::fs::write(store.path_for("stats"), r#"{ "interval": 5 }"#).unwrap();

        let config = store.load_or_create("stats", Some(&defaults())).unwrap().unwrap();
        assert_eq!(config["interval"], 5);
    }

    #[test]
    fn test_corrupt_file_recreated() {
        let dir = tempfile::tempdir().unwrap();
        let store = PluginConfigStore::new(dir.path());
        std::fs::write(store.path_for("stats"), "{{{").unwrap();

        let config = store.load_or_create("stats", Some(&defaults())).unwrap().unwrap();
        assert_eq!(config["interval"], 30);

        let on_disk: Value =
            serde_json::from_str(&std::fs::read_to_string(store.path_for("stats")).unwrap())
                .unwrap();
        assert_eq!(on_disk["interval"], 30);
    }

    #[test]
    fn test_no_defaults_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = PluginConfigStore::new(dir.path());

        assert!(store.load_or_create("stats", None).unwrap().is_none());
        assert!(!store.exists("stats"));
    }
}
