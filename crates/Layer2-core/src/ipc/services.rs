//! Service Registry - 플러그인 간 공유 서비스 디렉터리
//!
//! 이름 하나당 살아있는 서비스는 하나. 먼저 등록한 쪽이 이기며 덮어쓰기는 없다.

use crate::plugin::PluginError;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// 서비스 핸들 (불투명 객체)
pub type ServiceHandle = Arc<dyn Any + Send + Sync>;

struct ServiceEntry {
    owner: String,
    handle: ServiceHandle,
}

/// 서비스 레지스트리
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, ServiceEntry>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
        }
    }

    /// 서비스 등록
    ///
    /// 같은 이름이 이미 있으면 `ServiceNameConflict`, 기존 항목은 그대로 남는다.
    pub fn register(
        &self,
        owner: &str,
        name: impl Into<String>,
        handle: ServiceHandle,
    ) -> Result<(), PluginError> {
        let name = name.into();
        let mut services = self.services.write();

        if let Some(existing) = services.get(&name) {
            warn!(
                service = %name,
                owner = %existing.owner,
                requested_by = owner,
                "Service name already registered"
            );
            return Err(PluginError::ServiceNameConflict {
                name,
                owner: existing.owner.clone(),
            });
        }

        debug!(service = %name, owner, "Registered service");
        services.insert(
            name,
            ServiceEntry {
                owner: owner.to_string(),
                handle,
            },
        );
        Ok(())
    }

    /// 서비스 조회
    pub fn get(&self, name: &str) -> Option<ServiceHandle> {
        self.services.read().get(name).map(|e| Arc::clone(&e.handle))
    }

    /// 구체 타입으로 서비스 조회
    pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.get(name).and_then(|handle| handle.downcast::<T>().ok())
    }

    /// 서비스 소유자 slug
    pub fn owner_of(&self, name: &str) -> Option<String> {
        self.services.read().get(name).map(|e| e.owner.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.read().contains_key(name)
    }

    /// 서비스 제거
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.services.write().remove(name).is_some();
        if removed {
            debug!(service = name, "Unregistered service");
        }
        removed
    }

    /// `owner`가 등록한 항목일 때만 제거
    ///
    /// 같은 이름을 다른 플러그인이 다시 등록했다면 그대로 남는다.
    pub fn unregister_owned(&self, owner: &str, name: &str) -> bool {
        let mut services = self.services.write();
        let Some(current_owner) = services.get(name).map(|e| e.owner.clone()) else {
            return false;
        };

        if current_owner != owner {
            debug!(
                service = name,
                owner,
                current_owner = %current_owner,
                "Service now belongs to another plugin, leaving it"
            );
            return false;
        }

        services.remove(name);
        debug!(service = name, owner, "Unregistered service");
        true
    }

    /// 소유자의 모든 서비스 제거, 제거된 개수 반환
    pub fn unregister_all_for_owner(&self, owner: &str) -> usize {
        let mut services = self.services.write();
        let before = services.len();
        services.retain(|_, e| e.owner != owner);
        let removed = before - services.len();

        if removed > 0 {
            debug!(owner, removed, "Unregistered services for owner");
        }
        removed
    }

    /// 등록된 서비스 이름 (정렬됨)
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.names())
            .finish()
    }
}
