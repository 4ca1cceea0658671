//! Plugin traits - 핵심 플러그인 인터페이스

use super::error::PluginError;
use super::manifest::{LoadOrder, PluginDependency};
use super::scope::{ResourceTracker, ScopeTracker};
use crate::ipc::{EventBus, ServiceHandle, ServiceRegistry, SubscriptionId};
use serde_json::{Map, Value};
use std::any::Any;
use std::sync::Arc;

// ============================================================================
// Plugin - 모든 플러그인이 구현하는 trait
// ============================================================================

/// 플러그인 trait
///
/// 콜백은 호출자 스레드에서 동기 실행된다. 시간 제한은 없으며,
/// 내부 상태가 필요하면 내부 가변성을 사용한다.
pub trait Plugin: Send + Sync {
    /// 고유 식별자 (등록 후 변경 불가)
    fn slug(&self) -> &str;

    /// 표시 이름
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn author(&self) -> &str;

    fn description(&self) -> &str;

    /// 기본 설정 (있으면 `<slug>.json`으로 저장됨)
    fn default_config(&self) -> Option<Map<String, Value>> {
        None
    }

    /// 로드 (`ctx.is_reload()`로 핫 리로드 구분)
    fn load(&self, ctx: &PluginContext) -> anyhow::Result<()>;

    /// 언로드
    fn unload(&self, ctx: &PluginContext) -> anyhow::Result<()>;

    /// 의존성 선언 기능 조회
    fn as_dependent(&self) -> Option<&dyn DependentPlugin> {
        None
    }

    /// 로드 순서 선언 기능 조회
    fn as_ordered(&self) -> Option<&dyn OrderedPlugin> {
        None
    }
}

/// 의존성을 선언하는 플러그인
pub trait DependentPlugin {
    fn dependencies(&self) -> Vec<PluginDependency>;
}

/// 로드 순서 클래스를 선언하는 플러그인
pub trait OrderedPlugin {
    fn load_order(&self) -> LoadOrder;
}

/// 플러그인 팩토리 (첫 로드 시 호출)
pub type PluginFactory = Arc<dyn Fn() -> anyhow::Result<Arc<dyn Plugin>> + Send + Sync>;

/// 선언된 의존성 (없으면 빈 목록)
pub fn dependencies_of(plugin: &dyn Plugin) -> Vec<PluginDependency> {
    plugin
        .as_dependent()
        .map(|d| d.dependencies())
        .unwrap_or_default()
}

/// 선언된 로드 순서 (없으면 `Normal`)
pub fn load_order_of(plugin: &dyn Plugin) -> LoadOrder {
    plugin
        .as_ordered()
        .map(|o| o.load_order())
        .unwrap_or_default()
}

// ============================================================================
// PluginContext - 콜백에 전달되는 컨텍스트
// ============================================================================

/// 플러그인 컨텍스트
///
/// 서비스 등록과 이벤트 구독은 플러그인 slug를 소유자로 기록하고
/// 활성 스코프에 추적된다.
pub struct PluginContext {
    slug: String,
    is_reload: bool,
    config: Map<String, Value>,
    services: Arc<ServiceRegistry>,
    events: Arc<EventBus>,
    scopes: Arc<ScopeTracker>,
}

impl PluginContext {
    pub fn new(
        slug: impl Into<String>,
        services: Arc<ServiceRegistry>,
        events: Arc<EventBus>,
        scopes: Arc<ScopeTracker>,
    ) -> Self {
        Self {
            slug: slug.into(),
            is_reload: false,
            config: Map::new(),
            services,
            events,
            scopes,
        }
    }

    /// 빌더 패턴: 리로드 여부
    pub fn with_reload(mut self, is_reload: bool) -> Self {
        self.is_reload = is_reload;
        self
    }

    /// 빌더 패턴: 플러그인 설정
    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// 핫 리로드 중인지
    pub fn is_reload(&self) -> bool {
        self.is_reload
    }

    // ========================================================================
    // 설정
    // ========================================================================

    pub fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    // ========================================================================
    // 서비스
    // ========================================================================

    /// 서비스 등록 (이름 충돌 시 에러, 기존 서비스 유지)
    pub fn register_service(
        &self,
        name: impl Into<String>,
        handle: ServiceHandle,
    ) -> Result<(), PluginError> {
        let name = name.into();
        self.services.register(&self.slug, name.clone(), handle)?;
        self.scopes.track_service(&name);
        Ok(())
    }

    pub fn get_service(&self, name: &str) -> Option<ServiceHandle> {
        self.services.get(name)
    }

    pub fn get_service_as<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.services.get_as::<T>(name)
    }

    // ========================================================================
    // 이벤트
    // ========================================================================

    /// 토픽 구독
    pub fn subscribe(
        &self,
        topic: impl Into<String>,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.events.subscribe(&self.slug, topic, callback);
        self.scopes.track_event_subscription(id);
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// 이벤트 발행, 정상 완료된 구독자 수 반환
    pub fn publish(&self, topic: &str, data: &Value) -> usize {
        self.events.publish(topic, data)
    }

    // ========================================================================
    // 호스트 리소스
    // ========================================================================

    /// 호스트 리소스 기록용 트래커 (활성 스코프로 위임)
    pub fn tracker(&self) -> &dyn ResourceTracker {
        &*self.scopes
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("slug", &self.slug)
            .field("is_reload", &self.is_reload)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Plain;

    impl Plugin for Plain {
        fn slug(&self) -> &str {
            "plain"
        }
        fn name(&self) -> &str {
            "Plain"
        }
        fn version(&self) -> &str {
            "1.0.0"
        }
        fn author(&self) -> &str {
            "tests"
        }
        fn description(&self) -> &str {
            ""
        }
        fn load(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
            Ok(())
        }
        fn unload(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct Declaring;

    impl Plugin for Declaring {
        fn slug(&self) -> &str {
            "declaring"
        }
        fn name(&self) -> &str {
            "Declaring"
        }
        fn version(&self) -> &str {
            "1.0.0"
        }
        fn author(&self) -> &str {
            "tests"
        }
        fn description(&self) -> &str {
            ""
        }
        fn load(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
            Ok(())
        }
        fn unload(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
            Ok(())
        }
        fn as_dependent(&self) -> Option<&dyn DependentPlugin> {
            Some(self)
        }
        fn as_ordered(&self) -> Option<&dyn OrderedPlugin> {
            Some(self)
        }
    }

    impl DependentPlugin for Declaring {
        fn dependencies(&self) -> Vec<PluginDependency> {
            vec![PluginDependency::new("plain")]
        }
    }

    impl OrderedPlugin for Declaring {
        fn load_order(&self) -> LoadOrder {
            LoadOrder::Late
        }
    }

    fn context(slug: &str) -> (PluginContext, Arc<ScopeTracker>) {
        let scopes = Arc::new(ScopeTracker::new());
        let ctx = PluginContext::new(
            slug,
            Arc::new(ServiceRegistry::new()),
            Arc::new(EventBus::new()),
            Arc::clone(&scopes),
        );
        (ctx, scopes)
    }

    #[test]
    fn test_capability_probing() {
        assert!(dependencies_of(&Plain).is_empty());
        assert_eq!(load_order_of(&Plain), LoadOrder::Normal);
        assert_eq!(dependencies_of(&Declaring)[0].name, "plain");
        assert_eq!(load_order_of(&Declaring), LoadOrder::Late);
    }

    #[test]
    fn test_context_tracks_into_active_scope() {
        let (ctx, scopes) = context("core");
        let window = scopes.open("core").unwrap();

        ctx.register_service("core.api", Arc::new(5u32)).unwrap();
        ctx.subscribe("tick", |_| {});
        ctx.tracker().track_timer(3);

        let scope = window.close();
        let snapshot = scope.snapshot();
        assert_eq!(snapshot.services, vec!["core.api".to_string()]);
        assert_eq!(snapshot.event_subscriptions.len(), 1);
        assert_eq!(snapshot.timers, vec![3]);

        assert_eq!(ctx.services().owner_of("core.api").as_deref(), Some("core"));
        assert_eq!(*ctx.get_service_as::<u32>("core.api").unwrap(), 5);
    }

    #[test]
    fn test_conflicting_service_not_tracked() {
        let (ctx, scopes) = context("stats");
        ctx.services()
            .register("core", "shared", Arc::new(1u8))
            .unwrap();

        let window = scopes.open("stats").unwrap();
        assert!(ctx.register_service("shared", Arc::new(2u8)).is_err());
        assert!(window.close().is_empty());
    }

    #[test]
    fn test_context_config() {
        let (ctx, _) = context("core");
        let mut config = Map::new();
        config.insert("interval".into(), json!(30));
        let ctx = ctx.with_config(config).with_reload(true);

        assert!(ctx.is_reload());
        assert_eq!(ctx.config_value("interval"), Some(&json!(30)));
        assert!(ctx.config_value("missing").is_none());
    }
}
