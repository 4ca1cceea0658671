//! # Plugin System
//!
//! ModHost 플러그인 런타임 코어
//!
//! ## 개요
//!
//! 호스트 프로세스 안에서 플러그인을 등록하고, 의존성 순서대로 로드하며,
//! 플러그인이 남긴 리소스를 언로드 시 자동으로 정리한다:
//! - slug 검증과 등록 (중복/예약어 거부)
//! - 로드 순서 클래스 + 의존성 위상 정렬
//! - 상태 머신 (Unloaded → Loading → Loaded → Unloading → Unloaded, Failed, Disabled)
//! - 리소스 스코프 추적과 해제
//! - 플러그인 콜백 fault boundary (panic 격리)
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PluginManager                           │
//! │  ┌──────────────────┐  ┌──────────────────┐                │
//! │  │  PluginRegistry  │  │ DependencyResolver│               │
//! │  │  (entries, slug) │  │ (Early/Normal/Late)│              │
//! │  └──────────────────┘  └──────────────────┘                │
//! │            │                                                │
//! │  ┌─────────┼─────────────────────────────────────────────┐ │
//! │  │  PluginContext                                        │ │
//! │  │  - ServiceRegistry   (ipc)                            │ │
//! │  │  - EventBus          (ipc)                            │ │
//! │  │  - ScopeTracker      (리소스 기록 → 언로드 시 해제)    │ │
//! │  └───────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 예시
//!
//! ```ignore
//! struct Greeter;
//!
//! impl Plugin for Greeter {
//!     fn slug(&self) -> &str { "greeter" }
//!     // name, version, author, description ...
//!     fn load(&self, ctx: &PluginContext) -> anyhow::Result<()> {
//!         ctx.subscribe("player.join", |data| println!("hello {}", data));
//!         Ok(())
//!     }
//!     fn unload(&self, _ctx: &PluginContext) -> anyhow::Result<()> { Ok(()) }
//! }
//!
//! let manager = PluginManager::new();
//! manager.register(Arc::new(Greeter))?;
//! manager.init()?;
//! ```

mod error;
pub mod fault;
mod manager;
mod manifest;
mod registry;
mod resolver;
mod scope;
mod slug;
mod state;
mod traits;

pub use error::{PluginError, PluginResult};
pub use manager::{
    PluginManager, PluginManagerConfig, PluginSummary, TOPIC_PLUGIN_LOADED,
    TOPIC_PLUGIN_UNLOADED,
};
pub use manifest::{LoadOrder, PluginDependency};
pub use registry::{EntryId, PluginInfo, PluginRegistry, ResolverNode};
pub use resolver::{DependencyResolver, Resolution};
pub use scope::{
    HttpRoute, PluginScope, ResourceTracker, ScopeRemovers, ScopeResources, ScopeTracker,
    ScopeWindow,
};
pub use slug::{sanitize_slug, slug_key, validate_slug, DEFAULT_RESERVED_SLUGS, MAX_SLUG_LEN};
pub use state::PluginState;
pub use traits::{
    dependencies_of, load_order_of, DependentPlugin, OrderedPlugin, Plugin, PluginContext,
    PluginFactory,
};
