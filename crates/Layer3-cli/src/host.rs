//! Host resources - 플러그인이 등록하는 채팅 명령 테이블

use modhost_core::{ResourceTracker, ScopeTracker};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// 명령 핸들러 `(args) -> reply`
pub type CommandHandler = Arc<dyn Fn(&[&str]) -> String + Send + Sync>;

/// 플러그인 채팅 명령 테이블
///
/// 등록은 활성 스코프에 기록되므로 플러그인 언로드 시 자동으로 제거된다.
pub struct ChatCommands {
    commands: RwLock<BTreeMap<String, CommandHandler>>,
    tracker: Arc<ScopeTracker>,
}

impl ChatCommands {
    pub fn new(tracker: Arc<ScopeTracker>) -> Self {
        Self {
            commands: RwLock::new(BTreeMap::new()),
            tracker,
        }
    }

    /// 명령 등록, 이미 있으면 false
    pub fn register(
        &self,
        name: &str,
        handler: impl Fn(&[&str]) -> String + Send + Sync + 'static,
    ) -> bool {
        let name = name.to_ascii_lowercase();
        {
            let mut commands = self.commands.write();
            if commands.contains_key(&name) {
                warn!(command = %name, "Chat command already registered");
                return false;
            }
            commands.insert(name.clone(), Arc::new(handler));
        }
        self.tracker.track_chat_command(&name);
        debug!(command = %name, "Registered chat command");
        true
    }

    pub fn remove(&self, name: &str) -> bool {
        let removed = self.commands.write().remove(name).is_some();
        if removed {
            debug!(command = name, "Removed chat command");
        }
        removed
    }

    /// 명령 실행, 없는 명령이면 None
    pub fn dispatch(&self, name: &str, args: &[&str]) -> Option<String> {
        let handler = self.commands.read().get(&name.to_ascii_lowercase()).cloned()?;
        Some(handler(args))
    }

    pub fn names(&self) -> Vec<String> {
        self.commands.read().keys().cloned().collect()
    }
}
