//! # modhost-foundation
//!
//! Foundation layer for ModHost:
//! - Error: 공통 에러 타입
//! - Storage: JsonStore (범용 JSON 파일 저장소)
//! - Config: plugins.json, 플러그인별 설정 파일

pub mod config;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{PluginConfigEntry, PluginConfigStore, PluginsConfig, PLUGINS_CONFIG_FILE};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::JsonStore;
