//! Resource Scope - 로드 구간 동안 등록된 공유 리소스 추적
//!
//! 컨트롤러가 load 콜백 직전에 스코프를 활성화하고 직후에 해제한다.
//! 그 사이에 어떤 경로로든 등록된 리소스는 활성 스코프에 기록되고,
//! unload 시 등록된 리무버로 하나씩 해제된다.
//!
//! 활성 스코프는 프로세스 전역에 하나뿐이다. 컨트롤러의 lifecycle 락이
//! load 구간을 직렬화하므로 성립하며, 중첩 활성화는 거부된다.
//! 로드 구간 밖에서 등록된 리소스는 추적되지 않는다.

use super::error::PluginError;
use super::fault;
use super::slug::slug_key;
use crate::ipc::SubscriptionId;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

// ============================================================================
// ResourceTracker - 리소스 카테고리별 기록 인터페이스
// ============================================================================

/// 리소스 기록 인터페이스 (카테고리당 메서드 하나)
pub trait ResourceTracker: Send + Sync {
    fn track_chat_command(&self, name: &str);
    fn track_handler(&self, id: u64);
    fn track_timer(&self, id: u64);
    fn track_http_route(&self, method: &str, path: &str);
    fn track_permission(&self, name: &str);
    fn track_event_subscription(&self, id: SubscriptionId);
    fn track_service(&self, name: &str);
}

/// HTTP 라우트 식별자
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct HttpRoute {
    pub method: String,
    pub path: String,
}

/// 스코프에 기록된 리소스 목록
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScopeResources {
    pub chat_commands: Vec<String>,
    pub handlers: Vec<u64>,
    pub timers: Vec<u64>,
    pub http_routes: Vec<HttpRoute>,
    pub permissions: Vec<String>,
    #[serde(skip)]
    pub event_subscriptions: Vec<SubscriptionId>,
    pub services: Vec<String>,
}

impl ScopeResources {
    /// 기록된 리소스 총 개수
    pub fn len(&self) -> usize {
        self.chat_commands.len()
            + self.handlers.len()
            + self.timers.len()
            + self.http_routes.len()
            + self.permissions.len()
            + self.event_subscriptions.len()
            + self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// ScopeRemovers - 카테고리별 해제 함수
// ============================================================================

type NameRemover = Arc<dyn Fn(&str) + Send + Sync>;
type IdRemover = Arc<dyn Fn(u64) + Send + Sync>;
type RouteRemover = Arc<dyn Fn(&str, &str) + Send + Sync>;
type SubscriptionRemover = Arc<dyn Fn(SubscriptionId) + Send + Sync>;

/// `(owner, name)` - 스코프의 slug와 서비스 이름
type ServiceRemover = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// 리소스 해제 함수 모음
///
/// 호스트가 제공한다. 비어 있는 카테고리에 기록된 리소스가 있으면
/// 경고만 남기고 버린다.
#[derive(Clone, Default)]
pub struct ScopeRemovers {
    pub chat_command: Option<NameRemover>,
    pub handler: Option<IdRemover>,
    pub timer: Option<IdRemover>,
    pub http_route: Option<RouteRemover>,
    pub permission: Option<NameRemover>,
    pub event_subscription: Option<SubscriptionRemover>,
    pub service: Option<ServiceRemover>,
}

impl ScopeRemovers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_chat_command(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.chat_command = Some(Arc::new(f));
        self
    }

    pub fn on_handler(mut self, f: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.handler = Some(Arc::new(f));
        self
    }

    pub fn on_timer(mut self, f: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.timer = Some(Arc::new(f));
        self
    }

    pub fn on_http_route(mut self, f: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.http_route = Some(Arc::new(f));
        self
    }

    pub fn on_permission(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.permission = Some(Arc::new(f));
        self
    }

    pub fn on_event_subscription(
        mut self,
        f: impl Fn(SubscriptionId) + Send + Sync + 'static,
    ) -> Self {
        self.event_subscription = Some(Arc::new(f));
        self
    }

    /// 서비스 리무버는 스코프 소유자 slug도 함께 받는다
    pub fn on_service(mut self, f: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.service = Some(Arc::new(f));
        self
    }

    /// 비어 있는 카테고리를 `fallback`의 함수로 채움
    pub fn or(mut self, fallback: &ScopeRemovers) -> Self {
        self.chat_command = self.chat_command.or_else(|| fallback.chat_command.clone());
        self.handler = self.handler.or_else(|| fallback.handler.clone());
        self.timer = self.timer.or_else(|| fallback.timer.clone());
        self.http_route = self.http_route.or_else(|| fallback.http_route.clone());
        self.permission = self.permission.or_else(|| fallback.permission.clone());
        self.event_subscription = self
            .event_subscription
            .or_else(|| fallback.event_subscription.clone());
        self.service = self.service.or_else(|| fallback.service.clone());
        self
    }
}

impl std::fmt::Debug for ScopeRemovers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeRemovers")
            .field("chat_command", &self.chat_command.is_some())
            .field("handler", &self.handler.is_some())
            .field("timer", &self.timer.is_some())
            .field("http_route", &self.http_route.is_some())
            .field("permission", &self.permission.is_some())
            .field("event_subscription", &self.event_subscription.is_some())
            .field("service", &self.service.is_some())
            .finish()
    }
}

// ============================================================================
// PluginScope - 플러그인 하나의 리소스 기록
// ============================================================================

/// 플러그인 스코프
#[derive(Debug)]
pub struct PluginScope {
    slug: String,
    resources: Mutex<ScopeResources>,
}

impl PluginScope {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            resources: Mutex::new(ScopeResources::default()),
        }
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// 현재 기록 스냅샷
    pub fn snapshot(&self) -> ScopeResources {
        self.resources.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.resources.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.lock().is_empty()
    }

    /// 기록된 리소스를 모두 해제하고 목록을 비움, 호출된 리무버 수 반환
    ///
    /// 목록을 먼저 꺼내고 락 밖에서 리무버를 호출한다.
    /// 두 번째 호출은 아무것도 하지 않는다.
    pub fn cleanup(&self, removers: &ScopeRemovers) -> usize {
        let resources = std::mem::take(&mut *self.resources.lock());
        if resources.is_empty() {
            return 0;
        }

        debug!(slug = %self.slug, resources = resources.len(), "Releasing plugin scope");

        let r = removers;
        let mut invoked = 0;
        invoked += self.replay("chat_command", &r.chat_command, &resources.chat_commands, |f, n| {
            f(n)
        });
        invoked += self.replay("handler", &r.handler, &resources.handlers, |f, id| f(*id));
        invoked += self.replay("timer", &r.timer, &resources.timers, |f, id| f(*id));
        invoked += self.replay("http_route", &r.http_route, &resources.http_routes, |f, route| {
            f(&route.method, &route.path)
        });
        invoked += self.replay("permission", &r.permission, &resources.permissions, |f, n| {
            f(n)
        });
        invoked += self.replay(
            "event_subscription",
            &r.event_subscription,
            &resources.event_subscriptions,
            |f, id| f(*id),
        );
        invoked += self.replay("service", &r.service, &resources.services, |f, n| {
            f(&self.slug, n)
        });
        invoked
    }

    fn replay<F: ?Sized, T: std::fmt::Debug>(
        &self,
        category: &str,
        remover: &Option<Arc<F>>,
        items: &[T],
        call: impl Fn(&F, &T),
    ) -> usize {
        if items.is_empty() {
            return 0;
        }

        let Some(remover) = remover else {
            warn!(
                slug = %self.slug,
                category,
                count = items.len(),
                "No remover registered, dropping tracked resources"
            );
            return 0;
        };

        for item in items {
            trace!(slug = %self.slug, category, resource = ?item, "Removing resource");
            let context = format!("{} remover for {}", category, self.slug);
            fault::contain_logged(&context, || call(&**remover, item));
        }
        items.len()
    }
}

impl ResourceTracker for PluginScope {
    fn track_chat_command(&self, name: &str) {
        self.resources.lock().chat_commands.push(name.to_string());
    }

    fn track_handler(&self, id: u64) {
        self.resources.lock().handlers.push(id);
    }

    fn track_timer(&self, id: u64) {
        self.resources.lock().timers.push(id);
    }

    fn track_http_route(&self, method: &str, path: &str) {
        self.resources.lock().http_routes.push(HttpRoute {
            method: method.to_string(),
            path: path.to_string(),
        });
    }

    fn track_permission(&self, name: &str) {
        self.resources.lock().permissions.push(name.to_string());
    }

    fn track_event_subscription(&self, id: SubscriptionId) {
        self.resources.lock().event_subscriptions.push(id);
    }

    fn track_service(&self, name: &str) {
        self.resources.lock().services.push(name.to_string());
    }
}

// ============================================================================
// ScopeTracker - 활성 스코프 포인터 + slug별 기록 보관
// ============================================================================

/// 스코프 트래커
///
/// `ResourceTracker` 구현은 활성 스코프로 위임되며, 활성 스코프가 없으면 무시된다.
/// 호스트의 리소스 등록 API는 이 트래커에 기록만 하면 된다.
#[derive(Debug, Default)]
pub struct ScopeTracker {
    active: Mutex<Option<Arc<PluginScope>>>,
    records: RwLock<HashMap<String, Arc<PluginScope>>>,
}

impl ScopeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 현재 활성 스코프
    pub fn active(&self) -> Option<Arc<PluginScope>> {
        self.active.lock().clone()
    }

    /// 새 스코프를 열고 활성화
    ///
    /// 이미 활성 스코프가 있으면 `NestedLifecycleCall`. 반환된 윈도우가
    /// drop 되면 활성 포인터가 해제된다.
    pub fn open(&self, slug: &str) -> Result<ScopeWindow<'_>, PluginError> {
        let mut active = self.active.lock();
        if let Some(current) = active.as_ref() {
            warn!(
                slug,
                active = current.slug(),
                "Scope already active, rejecting nested activation"
            );
            return Err(PluginError::NestedLifecycleCall);
        }

        let scope = Arc::new(PluginScope::new(slug));
        *active = Some(Arc::clone(&scope));
        trace!(slug, "Scope activated");

        Ok(ScopeWindow {
            tracker: self,
            scope,
        })
    }

    /// 닫힌 스코프를 slug 기록으로 보관
    pub fn persist(&self, scope: Arc<PluginScope>) {
        let key = slug_key(scope.slug());
        if let Some(previous) = self.records.write().insert(key, scope) {
            if !previous.is_empty() {
                warn!(
                    slug = previous.slug(),
                    resources = previous.len(),
                    "Replaced a scope record that was never released"
                );
            }
        }
    }

    /// slug의 기록을 꺼냄
    pub fn take(&self, slug: &str) -> Option<Arc<PluginScope>> {
        self.records.write().remove(&slug_key(slug))
    }

    /// slug의 기록 조회
    pub fn record(&self, slug: &str) -> Option<Arc<PluginScope>> {
        self.records.read().get(&slug_key(slug)).cloned()
    }

    fn with_active(&self, f: impl FnOnce(&PluginScope)) {
        match self.active() {
            Some(scope) => f(&scope),
            None => trace!("No active scope, resource left untracked"),
        }
    }
}

impl ResourceTracker for ScopeTracker {
    fn track_chat_command(&self, name: &str) {
        self.with_active(|s| s.track_chat_command(name));
    }

    fn track_handler(&self, id: u64) {
        self.with_active(|s| s.track_handler(id));
    }

    fn track_timer(&self, id: u64) {
        self.with_active(|s| s.track_timer(id));
    }

    fn track_http_route(&self, method: &str, path: &str) {
        self.with_active(|s| s.track_http_route(method, path));
    }

    fn track_permission(&self, name: &str) {
        self.with_active(|s| s.track_permission(name));
    }

    fn track_event_subscription(&self, id: SubscriptionId) {
        self.with_active(|s| s.track_event_subscription(id));
    }

    fn track_service(&self, name: &str) {
        self.with_active(|s| s.track_service(name));
    }
}

/// 활성 스코프 구간 (drop 시 비활성화)
pub struct ScopeWindow<'a> {
    tracker: &'a ScopeTracker,
    scope: Arc<PluginScope>,
}

impl ScopeWindow<'_> {
    pub fn scope(&self) -> &Arc<PluginScope> {
        &self.scope
    }

    /// 구간을 닫고 스코프 반환
    pub fn close(self) -> Arc<PluginScope> {
        Arc::clone(&self.scope)
    }
}

impl Drop for ScopeWindow<'_> {
    fn drop(&mut self) {
        let mut active = self.tracker.active.lock();
        if active
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &self.scope))
        {
            *active = None;
            trace!(slug = self.scope.slug(), "Scope deactivated");
        }
    }
}
