//! Plugin Error - 플러그인 런타임 에러 분류

use super::manifest::LoadOrder;
use super::state::PluginState;
use thiserror::Error;

/// Result type alias
pub type PluginResult<T> = std::result::Result<T, PluginError>;

/// 플러그인 런타임 에러
///
/// 엔트리의 마지막 실패 정보(`load_error`)로 그대로 보관되므로 `Clone`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    // ========================================================================
    // 등록/검증
    // ========================================================================
    #[error("invalid slug '{slug}': {reason}")]
    InvalidSlug { slug: String, reason: String },

    #[error("slug '{slug}' is already used by plugin {owner}")]
    DuplicateSlug { slug: String, owner: String },

    #[error("missing required dependencies: {}", missing.join(", "))]
    MissingRequiredDependency { slug: String, missing: Vec<String> },

    #[error("plugin factory failed: {0}")]
    FactoryConstruction(String),

    // ========================================================================
    // 콜백 실패
    // ========================================================================
    #[error("panic during load: {0}")]
    LoadFault(String),

    #[error("load failed: {0}")]
    LoadReturnedError(String),

    #[error("panic during unload: {0}")]
    UnloadFault(String),

    #[error("unload failed: {0}")]
    UnloadReturnedError(String),

    // ========================================================================
    // IPC
    // ========================================================================
    #[error("service '{name}' is already registered by {owner}")]
    ServiceNameConflict { name: String, owner: String },

    // ========================================================================
    // 관리 API
    // ========================================================================
    #[error("plugin not found: {0}")]
    UnknownSlug(String),

    #[error("plugin {0} is disabled in config")]
    PluginDisabled(String),

    #[error("plugin {slug} is {state}")]
    InvalidState { slug: String, state: PluginState },

    #[error("lifecycle operations cannot be called from inside a plugin callback")]
    NestedLifecycleCall,

    // ========================================================================
    // 의존성 그래프 (치명적이지 않음)
    // ========================================================================
    #[error("dependency cycle in {bucket} bucket among: {}", members.join(", "))]
    CyclicDependency {
        bucket: LoadOrder,
        members: Vec<String>,
    },
}

impl PluginError {
    /// 에러 종류 이름 (로그/관리 API 용)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSlug { .. } => "invalid_slug",
            Self::DuplicateSlug { .. } => "duplicate_slug",
            Self::MissingRequiredDependency { .. } => "missing_required_dependency",
            Self::FactoryConstruction(_) => "factory_construction_error",
            Self::LoadFault(_) => "load_fault",
            Self::LoadReturnedError(_) => "load_returned_error",
            Self::UnloadFault(_) => "unload_fault",
            Self::UnloadReturnedError(_) => "unload_returned_error",
            Self::ServiceNameConflict { .. } => "service_name_conflict",
            Self::UnknownSlug(_) => "unknown_slug",
            Self::PluginDisabled(_) => "plugin_disabled",
            Self::InvalidState { .. } => "invalid_state",
            Self::NestedLifecycleCall => "nested_lifecycle_call",
            Self::CyclicDependency { .. } => "cyclic_dependency",
        }
    }

    /// 플러그인 콜백 내부에서 발생한 실패인지 확인
    pub fn is_callback_failure(&self) -> bool {
        matches!(
            self,
            Self::LoadFault(_)
                | Self::LoadReturnedError(_)
                | Self::UnloadFault(_)
                | Self::UnloadReturnedError(_)
                | Self::FactoryConstruction(_)
        )
    }
}
