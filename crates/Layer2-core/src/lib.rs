//! modhost-core: Plugin Runtime Core for ModHost
//!
//! Layer2 - 플러그인 런타임 레이어
//!
//! # 주요 모듈
//!
//! - `plugin`: 레지스트리, 의존성 정렬, 라이프사이클 매니저, 리소스 스코프, fault boundary
//! - `ipc`: 플러그인 간 서비스 레지스트리와 이벤트 버스
//! - `admin`: 관리 표면 (HTTP 라우팅, `plugin` 채팅 명령)
//!
//! # 사용 예시
//!
//! ```ignore
//! use modhost_core::{AdminApi, PluginManager, PluginManagerConfig};
//!
//! let manager = Arc::new(PluginManager::with_config(PluginManagerConfig::global()?));
//! manager.register(Arc::new(CorePlugin))?;
//! manager.register(Arc::new(StatsPlugin))?;
//!
//! // 의존성 순서대로 로드
//! let summary = manager.init()?;
//!
//! // 관리 API
//! let api = AdminApi::new(Arc::clone(&manager)).with_prefix("/admin");
//! let response = api.handle("POST", "/admin/plugins/stats/reload");
//!
//! // 역순 언로드
//! manager.shutdown()?;
//! ```

// Core modules
pub mod admin;
pub mod ipc;
pub mod plugin;

// Re-exports: Plugin
pub use plugin::{
    // Traits
    DependentPlugin,
    OrderedPlugin,
    Plugin,
    PluginContext,
    // Manifest
    LoadOrder,
    PluginDependency,
    // Errors
    PluginError,
    PluginResult,
    // Manager
    PluginManager,
    PluginManagerConfig,
    PluginSummary,
    TOPIC_PLUGIN_LOADED,
    TOPIC_PLUGIN_UNLOADED,
    // Registry
    EntryId,
    PluginInfo,
    PluginRegistry,
    PluginState,
    // Scope
    ResourceTracker,
    ScopeRemovers,
    ScopeResources,
    ScopeTracker,
};

// Re-exports: IPC
pub use ipc::{EventBus, ServiceHandle, ServiceRegistry, SubscriptionId};

// Re-exports: Admin
pub use admin::{AdminApi, AdminResponse, PluginCommand};

/// 크레이트 버전
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
