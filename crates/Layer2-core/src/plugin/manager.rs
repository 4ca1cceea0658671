//! Plugin Manager - 플러그인 라이프사이클 관리
//!
//! 레지스트리, 의존성 정렬기, 스코프 트래커를 묶어 플러그인을 상태 머신대로 움직인다.
//!
//! ## 로드 순서 (엔트리 하나)
//!
//! 1. 팩토리면 인스턴스 생성 후 slug 재검증
//! 2. 필수 의존성이 모두 `Loaded`인지 확인 (아니면 `Failed`, load 호출 안 함)
//! 3. 설정에서 비활성화면 `Disabled`
//! 4. 플러그인 설정 파일 준비
//! 5. 스코프 활성화 → load 콜백 (fault boundary) → 스코프 해제
//!
//! ## 동시성
//!
//! 모든 lifecycle 작업은 하나의 재진입 락으로 직렬화된다. 콜백 안에서
//! lifecycle API를 다시 부르면 `NestedLifecycleCall`로 거부된다.
//! 콜백은 레지스트리 락을 잡지 않은 상태로 호출된다.

use super::error::{PluginError, PluginResult};
use super::fault::{self, Fault};
use super::registry::{EntryId, PluginInfo, PluginRegistry};
use super::resolver::DependencyResolver;
use super::scope::{ScopeRemovers, ScopeTracker};
use super::slug::DEFAULT_RESERVED_SLUGS;
use super::state::PluginState;
use super::traits::{dependencies_of, Plugin, PluginContext};
use crate::ipc::{EventBus, ServiceRegistry};
use modhost_foundation::{JsonStore, PluginConfigStore, PluginsConfig, PLUGINS_CONFIG_FILE};
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard, RwLock};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 로드 성공 시 발행되는 토픽
pub const TOPIC_PLUGIN_LOADED: &str = "plugin.loaded";

/// 언로드 성공 시 발행되는 토픽
pub const TOPIC_PLUGIN_UNLOADED: &str = "plugin.unloaded";

// ============================================================================
// PluginManagerConfig
// ============================================================================

/// 플러그인 매니저 설정
#[derive(Debug, Clone)]
pub struct PluginManagerConfig {
    /// plugins.json 경로 (None이면 파일 없이 기본값)
    pub config_path: Option<PathBuf>,

    /// 플러그인별 설정 파일 디렉토리 (None이면 생성하지 않음)
    pub plugin_config_dir: Option<PathBuf>,

    /// 예약된 slug
    pub reserved_slugs: Vec<String>,

    /// 로드/언로드 알림을 이벤트 버스로 발행
    pub lifecycle_events: bool,
}

impl Default for PluginManagerConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            plugin_config_dir: None,
            reserved_slugs: DEFAULT_RESERVED_SLUGS.iter().map(|s| s.to_string()).collect(),
            lifecycle_events: true,
        }
    }
}

impl PluginManagerConfig {
    /// `<dir>/plugins.json`, `<dir>/plugins/<slug>.json` 레이아웃
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            config_path: Some(dir.join(PLUGINS_CONFIG_FILE)),
            plugin_config_dir: Some(dir.join("plugins")),
            ..Self::default()
        }
    }

    /// OS 설정 디렉토리 기준 (`<config>/modhost`)
    pub fn global() -> modhost_foundation::Result<Self> {
        let store = JsonStore::global()?;
        Ok(Self::in_dir(store.base_dir()))
    }

    /// 빌더 패턴: 예약어 교체
    pub fn with_reserved_slugs(mut self, reserved: impl IntoIterator<Item = String>) -> Self {
        self.reserved_slugs = reserved.into_iter().collect();
        self
    }

    /// 빌더 패턴: 라이프사이클 알림 여부
    pub fn with_lifecycle_events(mut self, enabled: bool) -> Self {
        self.lifecycle_events = enabled;
        self
    }
}

// ============================================================================
// PluginSummary
// ============================================================================

/// 상태별 플러그인 수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PluginSummary {
    pub total: usize,
    pub loaded: usize,
    pub failed: usize,
    pub disabled: usize,
    pub unloaded: usize,
}

impl std::fmt::Display for PluginSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} loaded, {} failed, {} disabled",
            self.loaded, self.total, self.failed, self.disabled
        )
    }
}

// ============================================================================
// PluginManager
// ============================================================================

/// 플러그인 매니저 - lifecycle 컨트롤러
pub struct PluginManager {
    config: PluginManagerConfig,

    registry: Arc<PluginRegistry>,
    resolver: DependencyResolver,
    scopes: Arc<ScopeTracker>,
    services: Arc<ServiceRegistry>,
    events: Arc<EventBus>,

    /// 스코프 해제 함수 (호스트 제공 + 서비스/구독 기본값)
    removers: ScopeRemovers,

    /// plugins.json 내용
    plugins_config: RwLock<PluginsConfig>,

    /// 플러그인별 설정 파일
    config_store: Option<PluginConfigStore>,

    /// 로드 시 전달한 설정 (언로드 컨텍스트에 재사용)
    active_configs: Mutex<HashMap<EntryId, Map<String, Value>>>,

    /// lifecycle 작업 직렬화
    lifecycle: ReentrantMutex<()>,

    /// 플러그인 콜백 실행 중
    in_callback: AtomicBool,

    initialized: AtomicBool,
}

impl PluginManager {
    /// 기본 설정으로 생성 (설정 파일 없음)
    pub fn new() -> Self {
        Self::with_config(PluginManagerConfig::default())
    }

    /// 설정으로 생성
    pub fn with_config(config: PluginManagerConfig) -> Self {
        let services = Arc::new(ServiceRegistry::new());
        let events = Arc::new(EventBus::new());

        let removers = {
            let services = Arc::clone(&services);
            let events = Arc::clone(&events);
            ScopeRemovers::new()
                .on_service(move |owner, name| {
                    services.unregister_owned(owner, name);
                })
                .on_event_subscription(move |id| {
                    events.unsubscribe(id);
                })
        };

        Self {
            registry: Arc::new(PluginRegistry::with_reserved_slugs(
                config.reserved_slugs.iter().cloned(),
            )),
            resolver: DependencyResolver::new(),
            scopes: Arc::new(ScopeTracker::new()),
            services,
            events,
            removers,
            plugins_config: RwLock::new(PluginsConfig::default()),
            config_store: config.plugin_config_dir.clone().map(PluginConfigStore::new),
            active_configs: Mutex::new(HashMap::new()),
            lifecycle: ReentrantMutex::new(()),
            in_callback: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            config,
        }
    }

    /// 빌더 패턴: 호스트 리무버 설정
    ///
    /// 서비스/이벤트 구독 리무버를 비워 두면 매니저의 기본값이 쓰인다.
    pub fn with_removers(mut self, removers: ScopeRemovers) -> Self {
        self.removers = removers.or(&self.removers);
        self
    }

    // ========================================================================
    // 접근자
    // ========================================================================

    pub fn config(&self) -> &PluginManagerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// 호스트 리소스 등록 API가 기록할 트래커
    pub fn scopes(&self) -> &Arc<ScopeTracker> {
        &self.scopes
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    // ========================================================================
    // 등록
    // ========================================================================

    pub fn register(&self, plugin: Arc<dyn Plugin>) -> PluginResult<EntryId> {
        self.registry.register(plugin)
    }

    pub fn register_factory(
        &self,
        factory: impl Fn() -> anyhow::Result<Arc<dyn Plugin>> + Send + Sync + 'static,
    ) -> EntryId {
        self.registry.register_factory(factory)
    }

    // ========================================================================
    // Init / Shutdown
    // ========================================================================

    /// 설정 로드 → 정렬 → 순서대로 로드
    ///
    /// 개별 플러그인 실패는 엔트리 상태로만 남고 에러로 반환되지 않는다.
    pub fn init(&self) -> PluginResult<PluginSummary> {
        let _guard = self.enter()?;

        if self.initialized.load(Ordering::SeqCst) {
            warn!("Plugin manager already initialized");
            return Ok(self.summary());
        }

        info!(plugins = self.registry.len(), "Initializing plugin manager");
        self.load_plugins_config();

        let resolution = self.resolver.resolve(&self.registry.resolver_nodes());
        self.registry.apply_order(resolution.order);

        for id in self.registry.ordered_ids() {
            if self.registry.state(id) == Some(PluginState::Loaded) {
                continue;
            }
            // 실패 상세는 엔트리에 기록됨
            let _ = self.load_entry(id, false);
        }

        self.initialized.store(true, Ordering::SeqCst);
        let summary = self.summary();
        info!("Plugin manager initialized: {}", summary);
        Ok(summary)
    }

    /// 로드 역순으로 모두 언로드
    pub fn shutdown(&self) -> PluginResult<()> {
        let _guard = self.enter()?;

        if !self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        info!("Shutting down plugin manager");
        for id in self.registry.ordered_ids().into_iter().rev() {
            if self.registry.state(id) != Some(PluginState::Loaded) {
                continue;
            }
            let _ = self.unload_entry(id, false);
        }

        self.initialized.store(false, Ordering::SeqCst);
        info!("Plugin manager shutdown complete");
        Ok(())
    }

    // ========================================================================
    // 관리 API (slug 기준)
    // ========================================================================

    /// 플러그인 하나 로드 (init과 같은 검증 수행)
    pub fn load(&self, slug: &str) -> PluginResult<PluginInfo> {
        let _guard = self.enter()?;
        let id = self.lookup(slug)?;

        match self.current_state(id) {
            PluginState::Unloaded | PluginState::Failed | PluginState::Disabled => {}
            state => return Err(PluginError::InvalidState { slug: slug.to_string(), state }),
        }

        self.load_entry(id, false)?;
        self.entry_info(id, slug)
    }

    /// 플러그인 하나 언로드
    pub fn unload(&self, slug: &str) -> PluginResult<PluginInfo> {
        let _guard = self.enter()?;
        let id = self.lookup(slug)?;

        let state = self.current_state(id);
        if state != PluginState::Loaded {
            return Err(PluginError::InvalidState { slug: slug.to_string(), state });
        }

        self.unload_entry(id, false)?;
        self.entry_info(id, slug)
    }

    /// 핫 리로드 - 로드 상태면 언로드 후, `is_reload = true`로 다시 로드
    pub fn reload(&self, slug: &str) -> PluginResult<PluginInfo> {
        let _guard = self.enter()?;
        let id = self.lookup(slug)?;

        let state = self.current_state(id);
        if state.is_transient() {
            return Err(PluginError::InvalidState { slug: slug.to_string(), state });
        }

        if state == PluginState::Loaded {
            if let Err(err) = self.unload_entry(id, true) {
                warn!(slug, error = %err, "Unload failed during reload, loading anyway");
            }
        }

        self.load_entry(id, true)?;
        self.entry_info(id, slug)
    }

    /// slug로 정보 조회
    pub fn info(&self, slug: &str) -> PluginResult<PluginInfo> {
        self.registry
            .get_by_slug(slug)
            .ok_or_else(|| PluginError::UnknownSlug(slug.to_string()))
    }

    /// 로드 순서대로 모든 플러그인
    pub fn list(&self) -> Vec<PluginInfo> {
        self.registry.list()
    }

    pub fn loaded_count(&self) -> usize {
        self.registry.loaded_count()
    }

    /// 로드된 플러그인 인스턴스 (표시 이름 기준)
    pub fn plugin_by_name(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.registry.plugin_by_name(name)
    }

    pub fn summary(&self) -> PluginSummary {
        self.registry
            .list()
            .iter()
            .fold(PluginSummary::default(), |mut summary, info| {
                summary.total += 1;
                match info.state {
                    PluginState::Loaded => summary.loaded += 1,
                    PluginState::Failed => summary.failed += 1,
                    PluginState::Disabled => summary.disabled += 1,
                    _ => summary.unloaded += 1,
                }
                summary
            })
    }

    // ========================================================================
    // 설정
    // ========================================================================

    /// plugins.json 다시 읽기
    pub fn reload_config(&self) {
        self.load_plugins_config();
    }

    /// 활성화 플래그 변경 (메모리에만 반영, `save_config`로 저장)
    pub fn set_enabled(&self, slug: &str, enabled: bool) -> PluginResult<()> {
        let info = self.info(slug)?;
        self.plugins_config.write().set_enabled(info.slug, enabled);
        info!(slug, enabled, "Plugin enable flag changed");
        Ok(())
    }

    /// 현재 설정이 활성화 상태인지
    pub fn is_enabled(&self, slug: &str) -> bool {
        match self.registry.get_by_slug(slug) {
            Some(info) => self.plugins_config.read().is_enabled(&[&info.slug, &info.name]),
            None => self.plugins_config.read().is_enabled(&[slug]),
        }
    }

    /// plugins.json 저장
    pub fn save_config(&self) -> modhost_foundation::Result<()> {
        let Some(path) = &self.config.config_path else {
            return Ok(());
        };
        self.plugins_config.read().save(path)?;
        debug!(path = %path.display(), "Saved plugins config");
        Ok(())
    }

    fn load_plugins_config(&self) {
        let config = match &self.config.config_path {
            Some(path) => PluginsConfig::load_or_default(path),
            None => PluginsConfig::default(),
        };
        *self.plugins_config.write() = config;
    }

    // ========================================================================
    // 내부: 엔트리 로드/언로드
    // ========================================================================

    fn enter(&self) -> PluginResult<ReentrantMutexGuard<'_, ()>> {
        let guard = self.lifecycle.lock();
        if self.in_callback.load(Ordering::SeqCst) {
            warn!("Lifecycle operation called from inside a plugin callback");
            return Err(PluginError::NestedLifecycleCall);
        }
        Ok(guard)
    }

    fn lookup(&self, slug: &str) -> PluginResult<EntryId> {
        self.registry
            .find_by_slug(slug)
            .ok_or_else(|| PluginError::UnknownSlug(slug.to_string()))
    }

    fn current_state(&self, id: EntryId) -> PluginState {
        self.registry.state(id).unwrap_or_default()
    }

    fn entry_info(&self, id: EntryId, slug: &str) -> PluginResult<PluginInfo> {
        self.registry
            .info(id)
            .ok_or_else(|| PluginError::UnknownSlug(slug.to_string()))
    }

    /// 플러그인 코드 실행 (콜백 플래그 + fault boundary)
    fn invoke<T>(&self, f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, Fault> {
        self.in_callback.store(true, Ordering::SeqCst);
        let result = fault::contain(f);
        self.in_callback.store(false, Ordering::SeqCst);
        result
    }

    /// 실패 기록
    fn fail(&self, id: EntryId, err: PluginError) -> PluginError {
        self.registry
            .transition(id, PluginState::Failed, Some(err.clone()));
        err
    }

    /// 인스턴스 확보 (팩토리면 생성 + slug 검증)
    fn resolve_instance(&self, id: EntryId) -> PluginResult<Arc<dyn Plugin>> {
        if let Some(plugin) = self.registry.plugin(id) {
            return Ok(plugin);
        }

        let Some(factory) = self.registry.factory(id) else {
            return Err(self.fail(id, PluginError::FactoryConstruction("no plugin instance".into())));
        };

        let plugin = match self.invoke(|| factory()) {
            Ok(plugin) => plugin,
            Err(fault) => {
                error!(entry = %id, error = %fault, "Plugin factory failed");
                return Err(self.fail(id, PluginError::FactoryConstruction(fault.detail())));
            }
        };

        if let Err(err) = self.registry.bind_instance(id, Arc::clone(&plugin)) {
            error!(plugin = plugin.name(), error = %err, "Rejected factory-created plugin");
            return Err(self.fail(id, err));
        }
        Ok(plugin)
    }

    /// 필수 의존성 중 로드되지 않았거나 버전이 맞지 않는 것
    fn missing_dependencies(&self, plugin: &dyn Plugin) -> Vec<String> {
        dependencies_of(plugin)
            .into_iter()
            .filter(|dep| dep.is_required())
            .filter_map(|dep| match self.registry.dependency_status(&dep.name) {
                Some((PluginState::Loaded, version)) if dep.accepts_version(&version) => None,
                Some((PluginState::Loaded, version)) => Some(format!(
                    "{} (requires {}, found {})",
                    dep.name, dep.version, version
                )),
                _ => Some(dep.name),
            })
            .collect()
    }

    /// 플러그인 설정 = 설정 파일 + plugins.json 항목의 config
    fn plugin_config(&self, plugin: &dyn Plugin) -> Map<String, Value> {
        let slug = plugin.slug();
        let mut config = Map::new();

        if let Some(store) = &self.config_store {
            let defaults = plugin.default_config();
            if defaults.is_some() || store.exists(slug) {
                match store.load_or_create(slug, defaults.as_ref()) {
                    Ok(Some(loaded)) => config = loaded,
                    Ok(None) => {}
                    Err(e) => error!(slug, error = %e, "Failed to load plugin config"),
                }
            }
        } else if let Some(defaults) = plugin.default_config() {
            config = defaults;
        }

        if let Some(overlay) = self
            .plugins_config
            .read()
            .entry_config(&[slug, plugin.name()])
        {
            for (key, value) in overlay {
                config.insert(key.clone(), value.clone());
            }
        }
        config
    }

    fn context(&self, slug: &str, is_reload: bool, config: Map<String, Value>) -> PluginContext {
        PluginContext::new(
            slug,
            Arc::clone(&self.services),
            Arc::clone(&self.events),
            Arc::clone(&self.scopes),
        )
        .with_reload(is_reload)
        .with_config(config)
    }

    fn load_entry(&self, id: EntryId, is_reload: bool) -> PluginResult<()> {
        let plugin = self.resolve_instance(id)?;
        let slug = plugin.slug().to_string();
        let name = plugin.name().to_string();

        let missing = self.missing_dependencies(plugin.as_ref());
        if !missing.is_empty() {
            error!(slug = %slug, missing = ?missing, "Plugin {} has missing dependencies", name);
            return Err(self.fail(
                id,
                PluginError::MissingRequiredDependency {
                    slug: slug.clone(),
                    missing,
                },
            ));
        }

        if !self.plugins_config.read().is_enabled(&[&slug, &name]) {
            self.registry.transition(id, PluginState::Disabled, None);
            info!(slug = %slug, "Plugin {} is disabled in config", name);
            return Err(PluginError::PluginDisabled(slug));
        }

        let config = self.plugin_config(plugin.as_ref());

        self.registry.transition(id, PluginState::Loading, None);
        info!(slug = %slug, version = plugin.version(), reload = is_reload, "Loading plugin: {}", name);

        let window = match self.scopes.open(&slug) {
            Ok(window) => window,
            Err(err) => return Err(self.fail(id, err)),
        };
        let ctx = self.context(&slug, is_reload, config.clone());
        let result = self.invoke(|| plugin.load(&ctx));
        let scope = window.close();

        match result {
            Ok(()) => {
                debug!(slug = %slug, resources = scope.len(), "Recorded plugin scope");
                self.scopes.persist(scope);
                self.active_configs.lock().insert(id, config);
                self.registry.transition(id, PluginState::Loaded, None);
                info!(slug = %slug, "Plugin {} loaded successfully", name);
                self.notify(TOPIC_PLUGIN_LOADED, &slug, &name, is_reload);
                Ok(())
            }
            Err(fault) => {
                // 실패한 구간에서 등록된 리소스는 즉시 해제
                let released = scope.cleanup(&self.removers);
                let err = match fault {
                    Fault::Panicked(detail) => PluginError::LoadFault(detail),
                    Fault::Returned(e) => PluginError::LoadReturnedError(format!("{:#}", e)),
                };
                error!(slug = %slug, released, error = %err, "Plugin {} failed to load", name);
                Err(self.fail(id, err))
            }
        }
    }

    fn unload_entry(&self, id: EntryId, is_reload: bool) -> PluginResult<()> {
        let Some(plugin) = self.registry.plugin(id) else {
            return Ok(());
        };
        if self.registry.state(id) != Some(PluginState::Loaded) {
            return Ok(());
        }

        let slug = plugin.slug().to_string();
        let name = plugin.name().to_string();

        self.registry.transition(id, PluginState::Unloading, None);
        info!(slug = %slug, reload = is_reload, "Unloading plugin: {}", name);

        // 언로드 콜백 결과와 관계없이 스코프는 항상 해제
        if let Some(scope) = self.scopes.take(&slug) {
            let released = scope.cleanup(&self.removers);
            debug!(slug = %slug, released, "Released plugin scope");
        }

        let config = self.active_configs.lock().remove(&id).unwrap_or_default();
        let ctx = self.context(&slug, is_reload, config);

        match self.invoke(|| plugin.unload(&ctx)) {
            Ok(()) => {
                self.registry.transition(id, PluginState::Unloaded, None);
                info!(slug = %slug, "Plugin {} unloaded", name);
                self.notify(TOPIC_PLUGIN_UNLOADED, &slug, &name, is_reload);
                Ok(())
            }
            Err(fault) => {
                let err = match fault {
                    Fault::Panicked(detail) => PluginError::UnloadFault(detail),
                    Fault::Returned(e) => PluginError::UnloadReturnedError(format!("{:#}", e)),
                };
                warn!(slug = %slug, error = %err, "Plugin {} failed to unload cleanly", name);
                Err(self.fail(id, err))
            }
        }
    }

    /// 라이프사이클 알림 (구독자도 플러그인 코드로 취급)
    fn notify(&self, topic: &str, slug: &str, name: &str, is_reload: bool) {
        if !self.config.lifecycle_events {
            return;
        }
        let data = json!({ "slug": slug, "name": name, "reload": is_reload });

        self.in_callback.store(true, Ordering::SeqCst);
        self.events.publish(topic, &data);
        self.in_callback.store(false, Ordering::SeqCst);
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::manifest::{LoadOrder, PluginDependency};
    use crate::plugin::traits::{DependentPlugin, OrderedPlugin};
    use anyhow::bail;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counters {
        loads: AtomicUsize,
        unloads: AtomicUsize,
        reloads: AtomicUsize,
    }

    struct TestPlugin {
        slug: &'static str,
        version: &'static str,
        deps: Vec<PluginDependency>,
        order: LoadOrder,
        fail_load: bool,
        counters: Arc<Counters>,
    }

    impl TestPlugin {
        fn new(slug: &'static str) -> Self {
            Self {
                slug,
                version: "1.0.0",
                deps: Vec::new(),
                order: LoadOrder::Normal,
                fail_load: false,
                counters: Arc::new(Counters::default()),
            }
        }

        fn requires(mut self, dep: PluginDependency) -> Self {
            self.deps.push(dep);
            self
        }
    }

    impl Plugin for TestPlugin {
        fn slug(&self) -> &str {
            self.slug
        }
        fn name(&self) -> &str {
            self.slug
        }
        fn version(&self) -> &str {
            self.version
        }
        fn author(&self) -> &str {
            "tests"
        }
        fn description(&self) -> &str {
            ""
        }
        fn default_config(&self) -> Option<Map<String, Value>> {
            let mut defaults = Map::new();
            defaults.insert("greeting".into(), json!("hello"));
            Some(defaults)
        }
        fn load(&self, ctx: &PluginContext) -> anyhow::Result<()> {
            self.counters.loads.fetch_add(1, Ordering::SeqCst);
            if ctx.is_reload() {
                self.counters.reloads.fetch_add(1, Ordering::SeqCst);
            }
            if self.fail_load {
                bail!("refusing to start");
            }
            Ok(())
        }
        fn unload(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
            self.counters.unloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn as_dependent(&self) -> Option<&dyn DependentPlugin> {
            Some(self)
        }
        fn as_ordered(&self) -> Option<&dyn OrderedPlugin> {
            Some(self)
        }
    }

    impl DependentPlugin for TestPlugin {
        fn dependencies(&self) -> Vec<PluginDependency> {
            self.deps.clone()
        }
    }

    impl OrderedPlugin for TestPlugin {
        fn load_order(&self) -> LoadOrder {
            self.order
        }
    }

    #[test]
    fn test_init_and_shutdown() {
        let manager = PluginManager::new();
        let plugin = TestPlugin::new("core");
        let counters = Arc::clone(&plugin.counters);
        manager.register(Arc::new(plugin)).unwrap();

        let summary = manager.init().unwrap();
        assert_eq!(summary.loaded, 1);
        assert_eq!(counters.loads.load(Ordering::SeqCst), 1);

        manager.shutdown().unwrap();
        assert_eq!(counters.unloads.load(Ordering::SeqCst), 1);
        assert_eq!(manager.info("core").unwrap().state, PluginState::Unloaded);
    }

    #[test]
    fn test_version_mismatch_counts_as_missing() {
        let manager = PluginManager::new();
        manager.register(Arc::new(TestPlugin::new("core"))).unwrap();
        let stats = TestPlugin::new("stats")
            .requires(PluginDependency::new("core").with_version(">=2"));
        let counters = Arc::clone(&stats.counters);
        manager.register(Arc::new(stats)).unwrap();

        manager.init().unwrap();
        let err = manager.registry().last_error("stats").unwrap();
        assert_eq!(
            err,
            PluginError::MissingRequiredDependency {
                slug: "stats".into(),
                missing: vec!["core (requires >=2, found 1.0.0)".into()],
            }
        );
        assert_eq!(counters.loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_returned_error_marks_failed() {
        let manager = PluginManager::new();
        let mut plugin = TestPlugin::new("broken");
        plugin.fail_load = true;
        manager.register(Arc::new(plugin)).unwrap();

        manager.init().unwrap();
        let info = manager.info("broken").unwrap();
        assert_eq!(info.state, PluginState::Failed);
        assert_eq!(info.error_kind, Some("load_returned_error"));
        assert_eq!(info.error.as_deref(), Some("load failed: refusing to start"));
    }

    #[test]
    fn test_admin_state_checks() {
        let manager = PluginManager::new();
        manager.register(Arc::new(TestPlugin::new("core"))).unwrap();

        assert_eq!(
            manager.unload("core").unwrap_err(),
            PluginError::InvalidState {
                slug: "core".into(),
                state: PluginState::Unloaded
            }
        );
        assert_eq!(manager.load("core").unwrap().state, PluginState::Loaded);
        assert_eq!(manager.load("core").unwrap_err().kind(), "invalid_state");
        assert_eq!(
            manager.load("ghost").unwrap_err(),
            PluginError::UnknownSlug("ghost".into())
        );
    }

    #[test]
    fn test_reload_sets_flag() {
        let manager = PluginManager::new();
        let plugin = TestPlugin::new("core");
        let counters = Arc::clone(&plugin.counters);
        manager.register(Arc::new(plugin)).unwrap();
        manager.init().unwrap();

        let info = manager.reload("core").unwrap();
        assert_eq!(info.state, PluginState::Loaded);
        assert_eq!(counters.loads.load(Ordering::SeqCst), 2);
        assert_eq!(counters.unloads.load(Ordering::SeqCst), 1);
        assert_eq!(counters.reloads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_then_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let config = PluginManagerConfig::in_dir(dir.path());
        std::fs::write(
            config.config_path.as_ref().unwrap(),
            r#"{ "plugins": { "core": { "enabled": false } } }"#,
        )
        .unwrap();

        let manager = PluginManager::with_config(config);
        manager.register(Arc::new(TestPlugin::new("core"))).unwrap();
        manager.init().unwrap();
        assert_eq!(manager.info("core").unwrap().state, PluginState::Disabled);

        assert_eq!(
            manager.reload("core").unwrap_err(),
            PluginError::PluginDisabled("core".into())
        );

        manager.set_enabled("core", true).unwrap();
        assert_eq!(manager.reload("core").unwrap().state, PluginState::Loaded);
    }

    #[test]
    fn test_plugin_config_materialized_and_overlaid() {
        let dir = tempfile::tempdir().unwrap();
        let config = PluginManagerConfig::in_dir(dir.path());
        std::fs::write(
            config.config_path.as_ref().unwrap(),
            r#"{ "plugins": { "core": { "enabled": true, "config": { "port": 8080 } } } }"#,
        )
        .unwrap();
        let plugin_file = config.plugin_config_dir.as_ref().unwrap().join("core.json");

        let manager = PluginManager::with_config(config);
        manager.register(Arc::new(TestPlugin::new("core"))).unwrap();
        manager.init().unwrap();

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(plugin_file).unwrap()).unwrap();
        assert_eq!(written, json!({ "greeting": "hello" }));

        let id = manager.registry().find_by_slug("core").unwrap();
        let active = manager.active_configs.lock().get(&id).cloned().unwrap();
        assert_eq!(active.get("port"), Some(&json!(8080)));
        assert_eq!(active.get("greeting"), Some(&json!("hello")));
    }

    #[test]
    fn test_factory_failure_and_success() {
        let manager = PluginManager::new();
        manager.register_factory(|| bail!("no database"));
        manager.register_factory(|| Ok(Arc::new(TestPlugin::new("lazy")) as Arc<dyn Plugin>));

        let summary = manager.init().unwrap();
        assert_eq!(summary.loaded, 1);
        assert_eq!(summary.failed, 1);

        let failed = manager
            .list()
            .into_iter()
            .find(|p| p.state == PluginState::Failed)
            .unwrap();
        assert_eq!(failed.error_kind, Some("factory_construction_error"));
        assert_eq!(manager.info("lazy").unwrap().state, PluginState::Loaded);
    }

    #[test]
    fn test_lifecycle_events_published() {
        let manager = PluginManager::new();
        manager.register(Arc::new(TestPlugin::new("core"))).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        manager
            .events()
            .subscribe("host", TOPIC_PLUGIN_LOADED, move |data| s.lock().push(data.clone()));

        manager.init().unwrap();
        manager.reload("core").unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], json!({ "slug": "core", "name": "core", "reload": false }));
        assert_eq!(seen[1]["reload"], json!(true));
    }
}
