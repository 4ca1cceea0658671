//! Plugin Registry - 플러그인 저장소
//!
//! 등록 순서를 유지하며, 엔트리는 프로세스가 끝날 때까지 삭제되지 않는다.
//! 상태 변경은 lifecycle 컨트롤러만 수행한다 (`pub(crate)` 메서드).

use super::error::{PluginError, PluginResult};
use super::manifest::{LoadOrder, PluginDependency};
use super::slug::{slug_key, validate_slug, DEFAULT_RESERVED_SLUGS};
use super::state::PluginState;
use super::traits::{dependencies_of, load_order_of, Plugin, PluginFactory};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// ============================================================================
// EntryId / PluginInfo
// ============================================================================

/// 레지스트리 엔트리 ID (등록 순번)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(usize);

impl EntryId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entry-{}", self.0)
    }
}

/// 플러그인 정보 스냅샷 (관리 API 응답에 사용)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginInfo {
    pub slug: String,
    pub name: String,
    pub version: String,
    pub author: String,
    pub description: String,
    pub state: PluginState,

    /// 마지막 실패 상세
    pub error: Option<String>,

    /// 마지막 실패 종류
    pub error_kind: Option<&'static str>,

    /// 마지막 로드 성공 시각
    pub loaded_at: Option<DateTime<Utc>>,
}

/// 의존성 정렬 입력
#[derive(Debug, Clone)]
pub struct ResolverNode {
    pub id: EntryId,
    pub slug: String,
    pub name: String,
    pub order: LoadOrder,
    pub dependencies: Vec<PluginDependency>,
}

// ============================================================================
// PluginEntry
// ============================================================================

struct PluginEntry {
    slug: String,
    name: String,
    version: String,
    author: String,
    description: String,
    plugin: Option<Arc<dyn Plugin>>,
    factory: Option<PluginFactory>,
    state: PluginState,
    load_error: Option<PluginError>,
    loaded_at: Option<DateTime<Utc>>,
}

impl PluginEntry {
    fn from_plugin(plugin: Arc<dyn Plugin>) -> Self {
        let mut entry = Self::placeholder(None);
        entry.bind(plugin);
        entry
    }

    fn placeholder(factory: Option<PluginFactory>) -> Self {
        Self {
            slug: String::new(),
            name: "Unknown".to_string(),
            version: String::new(),
            author: String::new(),
            description: String::new(),
            plugin: None,
            factory,
            state: PluginState::Unloaded,
            load_error: None,
            loaded_at: None,
        }
    }

    fn bind(&mut self, plugin: Arc<dyn Plugin>) {
        self.slug = plugin.slug().to_string();
        self.name = plugin.name().to_string();
        self.version = plugin.version().to_string();
        self.author = plugin.author().to_string();
        self.description = plugin.description().to_string();
        self.plugin = Some(plugin);
        self.factory = None;
    }

    fn info(&self) -> PluginInfo {
        PluginInfo {
            slug: self.slug.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
            author: self.author.clone(),
            description: self.description.clone(),
            state: self.state,
            error: self.load_error.as_ref().map(|e| e.to_string()),
            error_kind: self.load_error.as_ref().map(|e| e.kind()),
            loaded_at: self.loaded_at,
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    /// 등록 순서 (인덱스 = EntryId)
    entries: Vec<PluginEntry>,

    /// 마지막으로 적용된 로드 순서 (등록 순서는 `entries` 인덱스)
    order: Vec<EntryId>,

    /// 소문자 slug -> 엔트리
    slug_index: HashMap<String, EntryId>,
}

impl RegistryInner {
    fn entry(&self, id: EntryId) -> Option<&PluginEntry> {
        self.entries.get(id.0)
    }

    fn entry_mut(&mut self, id: EntryId) -> Option<&mut PluginEntry> {
        self.entries.get_mut(id.0)
    }

    /// slug 우선, 없으면 표시 이름 일치
    fn find(&self, name: &str) -> Option<EntryId> {
        if let Some(id) = self.slug_index.get(&slug_key(name)) {
            return Some(*id);
        }
        self.order
            .iter()
            .copied()
            .find(|id| self.entries[id.0].name == name)
    }

    fn claim_slug(&self, slug: &str, claimant: Option<EntryId>) -> PluginResult<()> {
        match self.slug_index.get(&slug_key(slug)) {
            Some(existing) if Some(*existing) != claimant => Err(PluginError::DuplicateSlug {
                slug: slug.to_string(),
                owner: self.entries[existing.0].name.clone(),
            }),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// PluginRegistry
// ============================================================================

/// 플러그인 레지스트리
pub struct PluginRegistry {
    inner: RwLock<RegistryInner>,
    reserved: Vec<String>,
}

impl PluginRegistry {
    /// 기본 예약어로 생성
    pub fn new() -> Self {
        Self::with_reserved_slugs(DEFAULT_RESERVED_SLUGS.iter().map(|s| s.to_string()))
    }

    /// 예약어 지정하여 생성
    pub fn with_reserved_slugs(reserved: impl IntoIterator<Item = String>) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            reserved: reserved.into_iter().collect(),
        }
    }

    pub fn reserved_slugs(&self) -> &[String] {
        &self.reserved
    }

    // ========================================================================
    // 등록
    // ========================================================================

    /// 플러그인 인스턴스 등록
    ///
    /// slug 검증과 중복 검사, 삽입은 하나의 쓰기 락 안에서 수행된다.
    /// 실패는 로그로 보고되며 기존 엔트리는 변경되지 않는다.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> PluginResult<EntryId> {
        let slug = plugin.slug().to_string();

        if let Err(err) = validate_slug(&slug, &self.reserved) {
            error!(plugin = plugin.name(), error = %err, "Rejected plugin registration");
            return Err(err);
        }

        let mut inner = self.inner.write();
        if let Err(err) = inner.claim_slug(&slug, None) {
            error!(plugin = plugin.name(), error = %err, "Rejected plugin registration");
            return Err(err);
        }

        let id = EntryId(inner.entries.len());
        let entry = PluginEntry::from_plugin(plugin);
        info!(
            slug = %entry.slug,
            version = %entry.version,
            author = %entry.author,
            "Registered plugin: {}",
            entry.name
        );

        inner.entries.push(entry);
        inner.order.push(id);
        inner.slug_index.insert(slug_key(&slug), id);
        Ok(id)
    }

    /// 팩토리 등록 (slug 검증은 첫 로드 시 수행)
    pub fn register_factory(
        &self,
        factory: impl Fn() -> anyhow::Result<Arc<dyn Plugin>> + Send + Sync + 'static,
    ) -> EntryId {
        let mut inner = self.inner.write();
        let id = EntryId(inner.entries.len());
        inner.entries.push(PluginEntry::placeholder(Some(Arc::new(factory))));
        inner.order.push(id);
        debug!(entry = %id, "Registered plugin factory");
        id
    }

    // ========================================================================
    // 조회
    // ========================================================================

    /// 표시 이름으로 조회
    pub fn get(&self, name: &str) -> Option<PluginInfo> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .map(|id| &inner.entries[id.0])
            .find(|e| e.name == name)
            .map(PluginEntry::info)
    }

    /// slug로 조회 (대소문자 무시)
    pub fn get_by_slug(&self, slug: &str) -> Option<PluginInfo> {
        let inner = self.inner.read();
        let id = inner.slug_index.get(&slug_key(slug))?;
        inner.entry(*id).map(PluginEntry::info)
    }

    /// 로드 순서대로 모든 플러그인 (스냅샷)
    pub fn list(&self) -> Vec<PluginInfo> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .map(|id| inner.entries[id.0].info())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// 로드된 플러그인 수
    pub fn loaded_count(&self) -> usize {
        self.inner
            .read()
            .entries
            .iter()
            .filter(|e| e.state == PluginState::Loaded)
            .count()
    }

    /// 로드된 플러그인 인스턴스 (플러그인 간 직접 호출용)
    pub fn plugin_by_name(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .map(|id| &inner.entries[id.0])
            .find(|e| e.name == name && e.state == PluginState::Loaded)
            .and_then(|e| e.plugin.clone())
    }

    /// 마지막 실패 (slug 기준)
    pub fn last_error(&self, slug: &str) -> Option<PluginError> {
        let inner = self.inner.read();
        let id = inner.slug_index.get(&slug_key(slug))?;
        inner.entry(*id).and_then(|e| e.load_error.clone())
    }

    // ========================================================================
    // 컨트롤러 전용
    // ========================================================================

    /// slug로만 엔트리 찾기
    pub(crate) fn find_by_slug(&self, slug: &str) -> Option<EntryId> {
        self.inner.read().slug_index.get(&slug_key(slug)).copied()
    }

    pub(crate) fn ordered_ids(&self) -> Vec<EntryId> {
        self.inner.read().order.clone()
    }

    /// 정렬 입력 (등록 순서, 미생성 팩토리는 `Normal`/의존성 없음)
    ///
    /// 이전에 적용된 로드 순서와 무관하게 항상 등록 순서로 만든다.
    pub(crate) fn resolver_nodes(&self) -> Vec<ResolverNode> {
        let inner = self.inner.read();
        inner
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let (order, dependencies) = match &entry.plugin {
                    Some(plugin) => (load_order_of(plugin.as_ref()), dependencies_of(plugin.as_ref())),
                    None => (LoadOrder::Normal, Vec::new()),
                };
                ResolverNode {
                    id: EntryId(index),
                    slug: entry.slug.clone(),
                    name: entry.name.clone(),
                    order,
                    dependencies,
                }
            })
            .collect()
    }

    /// 로드 순서 적용 (같은 엔트리 집합의 순열이어야 함)
    pub(crate) fn apply_order(&self, order: Vec<EntryId>) {
        let mut inner = self.inner.write();
        let mut sorted = order.clone();
        sorted.sort();

        if !sorted.iter().copied().eq((0..inner.entries.len()).map(EntryId)) {
            warn!("Ignoring load order that does not cover every registered plugin");
            return;
        }
        inner.order = order;
    }

    pub(crate) fn info(&self, id: EntryId) -> Option<PluginInfo> {
        self.inner.read().entry(id).map(PluginEntry::info)
    }

    pub(crate) fn state(&self, id: EntryId) -> Option<PluginState> {
        self.inner.read().entry(id).map(|e| e.state)
    }

    pub(crate) fn plugin(&self, id: EntryId) -> Option<Arc<dyn Plugin>> {
        self.inner.read().entry(id).and_then(|e| e.plugin.clone())
    }

    pub(crate) fn factory(&self, id: EntryId) -> Option<PluginFactory> {
        self.inner.read().entry(id).and_then(|e| e.factory.clone())
    }

    /// 상태와 버전 (의존성 검사용)
    pub(crate) fn dependency_status(&self, name: &str) -> Option<(PluginState, String)> {
        let inner = self.inner.read();
        let id = inner.find(name)?;
        inner.entry(id).map(|e| (e.state, e.version.clone()))
    }

    /// 팩토리가 만든 인스턴스 바인딩
    ///
    /// slug 검증, 중복 검사, 인덱스 삽입을 하나의 쓰기 락 안에서 수행한다.
    pub(crate) fn bind_instance(&self, id: EntryId, plugin: Arc<dyn Plugin>) -> PluginResult<()> {
        let slug = plugin.slug().to_string();
        validate_slug(&slug, &self.reserved)?;

        let mut inner = self.inner.write();
        inner.claim_slug(&slug, Some(id))?;

        let entry = inner
            .entry_mut(id)
            .ok_or_else(|| PluginError::UnknownSlug(slug.clone()))?;
        entry.bind(plugin);
        info!(slug = %entry.slug, version = %entry.version, "Factory created plugin: {}", entry.name);

        inner.slug_index.insert(slug_key(&slug), id);
        Ok(())
    }

    /// 상태 전이
    ///
    /// 허용되지 않는 전이는 무시하고 false. `Loaded`가 되면 에러가 지워지고,
    /// `error`가 주어지면 기록된다.
    pub(crate) fn transition(
        &self,
        id: EntryId,
        next: PluginState,
        error: Option<PluginError>,
    ) -> bool {
        let mut inner = self.inner.write();
        let Some(entry) = inner.entry_mut(id) else {
            return false;
        };

        if !entry.state.can_transition_to(next) {
            warn!(
                slug = %entry.slug,
                from = %entry.state,
                to = %next,
                "Rejected invalid state transition"
            );
            return false;
        }

        debug!(slug = %entry.slug, from = %entry.state, to = %next, "State transition");
        entry.state = next;

        if next == PluginState::Loaded {
            entry.load_error = None;
            entry.loaded_at = Some(Utc::now());
        }
        if let Some(err) = error {
            entry.load_error = Some(err);
        }
        true
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.len())
            .field("reserved", &self.reserved)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::traits::PluginContext;

    struct Named {
        slug: &'static str,
        name: &'static str,
    }

    impl Plugin for Named {
        fn slug(&self) -> &str {
            self.slug
        }
        fn name(&self) -> &str {
            self.name
        }
        fn version(&self) -> &str {
            "1.0.0"
        }
        fn author(&self) -> &str {
            "tests"
        }
        fn description(&self) -> &str {
            "test plugin"
        }
        fn load(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
            Ok(())
        }
        fn unload(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn named(slug: &'static str, name: &'static str) -> Arc<dyn Plugin> {
        Arc::new(Named { slug, name })
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = PluginRegistry::new();
        let id = registry.register(named("core", "Core")).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_by_slug("CORE").unwrap().name, "Core");
        assert_eq!(registry.get("Core").unwrap().slug, "core");
        assert_eq!(registry.info(id).unwrap().state, PluginState::Unloaded);
        assert!(registry.get("core").is_none());
    }

    #[test]
    fn test_duplicate_slug_case_insensitive() {
        let registry = PluginRegistry::new();
        registry.register(named("core", "Core")).unwrap();

        let err = registry.register(named("Core", "Impostor")).unwrap_err();
        assert_eq!(
            err,
            PluginError::DuplicateSlug {
                slug: "Core".into(),
                owner: "Core".into()
            }
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_by_slug("core").unwrap().name, "Core");
    }

    #[test]
    fn test_invalid_and_reserved_slugs() {
        let registry = PluginRegistry::new();
        assert!(registry.register(named("9bad", "Bad")).is_err());
        assert!(registry.register(named("system", "Sys")).is_err());
        assert!(registry.is_empty());

        let open = PluginRegistry::with_reserved_slugs(Vec::new());
        assert!(open.register(named("system", "Sys")).is_ok());
    }

    #[test]
    fn test_list_is_snapshot() {
        let registry = PluginRegistry::new();
        registry.register(named("core", "Core")).unwrap();
        let snapshot = registry.list();

        registry.register(named("stats", "Stats")).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn test_factory_binding() {
        let registry = PluginRegistry::new();
        registry.register(named("core", "Core")).unwrap();
        let fid = registry.register_factory(|| Ok(named("stats", "Stats")));

        let placeholder = registry.info(fid).unwrap();
        assert_eq!(placeholder.slug, "");
        assert!(registry.find_by_slug("stats").is_none());

        registry.bind_instance(fid, named("stats", "Stats")).unwrap();
        assert_eq!(registry.find_by_slug("stats"), Some(fid));
        assert!(registry.factory(fid).is_none());

        let dup = registry.register_factory(|| Ok(named("core", "Core2")));
        let err = registry.bind_instance(dup, named("core", "Core2")).unwrap_err();
        assert_eq!(err.kind(), "duplicate_slug");
    }

    #[test]
    fn test_transition_rules() {
        let registry = PluginRegistry::new();
        let id = registry.register(named("core", "Core")).unwrap();

        assert!(!registry.transition(id, PluginState::Unloading, None));
        assert!(registry.transition(id, PluginState::Loading, None));
        assert!(registry.transition(
            id,
            PluginState::Failed,
            Some(PluginError::LoadReturnedError("boom".into()))
        ));
        assert_eq!(registry.last_error("core").unwrap().kind(), "load_returned_error");

        registry.transition(id, PluginState::Loading, None);
        registry.transition(id, PluginState::Loaded, None);
        let info = registry.info(id).unwrap();
        assert!(info.error.is_none());
        assert!(info.loaded_at.is_some());
        assert_eq!(registry.loaded_count(), 1);
        assert!(registry.plugin_by_name("Core").is_some());
    }

    #[test]
    fn test_find_by_slug_or_name() {
        let registry = PluginRegistry::new();
        let id = registry.register(named("core", "Core Services")).unwrap();
        registry.transition(id, PluginState::Loading, None);
        registry.transition(id, PluginState::Loaded, None);

        let status = Some((PluginState::Loaded, registry.info(id).unwrap().version));
        assert_eq!(registry.dependency_status("CORE"), status);
        assert_eq!(registry.dependency_status("Core Services"), status);
        assert_eq!(registry.dependency_status("core services"), None);
    }

    #[test]
    fn test_apply_order_rejects_partial() {
        let registry = PluginRegistry::new();
        let a = registry.register(named("aa", "A")).unwrap();
        let b = registry.register(named("bb", "B")).unwrap();

        registry.apply_order(vec![b]);
        assert_eq!(registry.ordered_ids(), vec![a, b]);

        registry.apply_order(vec![b, a]);
        assert_eq!(registry.list()[0].slug, "bb");
    }

    #[test]
    fn test_resolver_nodes_keep_registration_order() {
        let registry = PluginRegistry::new();
        let a = registry.register(named("aa", "A")).unwrap();
        let b = registry.register(named("bb", "B")).unwrap();
        let c = registry.register(named("cc", "C")).unwrap();

        registry.apply_order(vec![c, b, a]);
        assert_eq!(registry.ordered_ids(), vec![c, b, a]);

        let ids: Vec<EntryId> = registry.resolver_nodes().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![a, b, c]);
    }
}
