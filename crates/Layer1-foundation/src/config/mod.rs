//! Config - 플러그인 설정 관리
//!
//! - `plugins.rs` - plugins.json (활성화 플래그 + 추가 설정)
//! - `plugin_store.rs` - 플러그인별 기본 설정 파일

mod plugin_store;
mod plugins;

pub use plugin_store::PluginConfigStore;
pub use plugins::{PluginConfigEntry, PluginsConfig, PLUGINS_CONFIG_FILE};
