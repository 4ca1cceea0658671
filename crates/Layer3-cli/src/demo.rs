//! Demo plugins - `core`, `stats` (core 필요), `admin` (core 필요, Late)

use crate::host::ChatCommands;
use modhost_core::{
    DependentPlugin, LoadOrder, OrderedPlugin, Plugin, PluginContext, PluginDependency,
    ServiceHandle, TOPIC_PLUGIN_LOADED, TOPIC_PLUGIN_UNLOADED,
};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// core 플러그인이 제공하는 서비스 이름
pub const MOTD_SERVICE: &str = "core.motd";

/// 플레이어 입장 토픽
pub const TOPIC_PLAYER_JOIN: &str = "player.join";

const AUDIT_CAPACITY: usize = 16;

/// 세 데모 플러그인을 의존성 순서와 무관하게 등록
pub fn register_all(
    manager: &modhost_core::PluginManager,
    commands: &Arc<ChatCommands>,
) -> anyhow::Result<()> {
    manager.register(Arc::new(AdminPlugin::new(Arc::clone(commands))))?;
    manager.register(Arc::new(StatsPlugin::new(Arc::clone(commands))))?;
    manager.register(Arc::new(CorePlugin::new(Arc::clone(commands))))?;
    Ok(())
}

// ============================================================================
// core
// ============================================================================

/// 공용 서비스 (MOTD)와 `motd` 명령 제공
pub struct CorePlugin {
    commands: Arc<ChatCommands>,
}

impl CorePlugin {
    pub fn new(commands: Arc<ChatCommands>) -> Self {
        Self { commands }
    }
}

impl Plugin for CorePlugin {
    fn slug(&self) -> &str {
        "core"
    }
    fn name(&self) -> &str {
        "Core Services"
    }
    fn version(&self) -> &str {
        "1.0.0"
    }
    fn author(&self) -> &str {
        "ModHost"
    }
    fn description(&self) -> &str {
        "Shared services every other demo plugin builds on"
    }

    fn default_config(&self) -> Option<Map<String, Value>> {
        let mut defaults = Map::new();
        defaults.insert("motd".into(), json!("Welcome to ModHost"));
        Some(defaults)
    }

    fn load(&self, ctx: &PluginContext) -> anyhow::Result<()> {
        let motd = ctx
            .config_value("motd")
            .and_then(Value::as_str)
            .unwrap_or("Welcome")
            .to_string();

        let handle: ServiceHandle = Arc::new(motd.clone());
        ctx.register_service(MOTD_SERVICE, handle)?;
        self.commands.register("motd", move |_| motd.clone());
        Ok(())
    }

    fn unload(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }
}

// ============================================================================
// stats
// ============================================================================

/// 플레이어 입장 횟수 집계
pub struct StatsPlugin {
    commands: Arc<ChatCommands>,
    joins: Arc<AtomicUsize>,
}

impl StatsPlugin {
    pub fn new(commands: Arc<ChatCommands>) -> Self {
        Self {
            commands,
            joins: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Plugin for StatsPlugin {
    fn slug(&self) -> &str {
        "stats"
    }
    fn name(&self) -> &str {
        "Player Stats"
    }
    fn version(&self) -> &str {
        "0.4.1"
    }
    fn author(&self) -> &str {
        "ModHost"
    }
    fn description(&self) -> &str {
        "Counts player joins"
    }

    fn load(&self, ctx: &PluginContext) -> anyhow::Result<()> {
        if !ctx.is_reload() {
            self.joins.store(0, Ordering::SeqCst);
        }

        let joins = Arc::clone(&self.joins);
        ctx.subscribe(TOPIC_PLAYER_JOIN, move |data| {
            let total = joins.fetch_add(1, Ordering::SeqCst) + 1;
            info!(player = %data["name"], total, "Player joined");
        });

        let motd = ctx
            .get_service_as::<String>(MOTD_SERVICE)
            .ok_or_else(|| anyhow::anyhow!("service {} is not available", MOTD_SERVICE))?;
        let joins = Arc::clone(&self.joins);
        self.commands.register("stats", move |_| {
            format!("{} | players joined: {}", motd, joins.load(Ordering::SeqCst))
        });
        Ok(())
    }

    fn unload(&self, ctx: &PluginContext) -> anyhow::Result<()> {
        if !ctx.is_reload() {
            info!(total = self.joins.load(Ordering::SeqCst), "Final join count");
        }
        Ok(())
    }

    fn as_dependent(&self) -> Option<&dyn DependentPlugin> {
        Some(self)
    }
}

impl DependentPlugin for StatsPlugin {
    fn dependencies(&self) -> Vec<PluginDependency> {
        vec![PluginDependency::new("core").with_version("^1")]
    }
}

// ============================================================================
// admin
// ============================================================================

/// 라이프사이클 알림 감사 로그 (`audit` 명령)
pub struct AdminPlugin {
    commands: Arc<ChatCommands>,
    audit: Arc<Mutex<VecDeque<String>>>,
}

impl AdminPlugin {
    pub fn new(commands: Arc<ChatCommands>) -> Self {
        Self {
            commands,
            audit: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    fn record(audit: &Mutex<VecDeque<String>>, entry: String) {
        let mut audit = audit.lock();
        if audit.len() == AUDIT_CAPACITY {
            audit.pop_front();
        }
        audit.push_back(entry);
    }
}

impl Plugin for AdminPlugin {
    fn slug(&self) -> &str {
        "admin"
    }
    fn name(&self) -> &str {
        "Admin Tools"
    }
    fn version(&self) -> &str {
        "0.2.0"
    }
    fn author(&self) -> &str {
        "ModHost"
    }
    fn description(&self) -> &str {
        "Keeps an audit trail of plugin lifecycle changes"
    }

    fn load(&self, ctx: &PluginContext) -> anyhow::Result<()> {
        for (topic, verb) in [(TOPIC_PLUGIN_LOADED, "loaded"), (TOPIC_PLUGIN_UNLOADED, "unloaded")] {
            let audit = Arc::clone(&self.audit);
            ctx.subscribe(topic, move |data| {
                let reload = if data["reload"].as_bool() == Some(true) { " (reload)" } else { "" };
                let slug = data["slug"].as_str().unwrap_or("?");
                Self::record(&audit, format!("{} {}{}", slug, verb, reload));
            });
        }

        let audit = Arc::clone(&self.audit);
        self.commands.register("audit", move |_| {
            let audit = audit.lock();
            if audit.is_empty() {
                "audit log is empty".to_string()
            } else {
                audit.iter().cloned().collect::<Vec<_>>().join("\n")
            }
        });
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

impl DependentPlugin for AdminPlugin {
    fn dependencies(&self) -> Vec<PluginDependency> {
        vec![PluginDependency::new("core")]
    }
}

impl OrderedPlugin for AdminPlugin {
    fn load_order(&self) -> LoadOrder {
        LoadOrder::Late
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modhost_core::{PluginManager, PluginState, ScopeRemovers};

    fn host() -> (PluginManager, Arc<ChatCommands>) {
        let manager = PluginManager::new();
        let commands = Arc::new(ChatCommands::new(Arc::clone(manager.scopes())));
        let removers = {
            let commands = Arc::clone(&commands);
            ScopeRemovers::new().on_chat_command(move |name| {
                commands.remove(name);
            })
        };
        let manager = manager.with_removers(removers);
        register_all(&manager, &commands).unwrap();
        (manager, commands)
    }

    #[test]
    fn test_demo_load_order() {
        let (manager, commands) = host();
        let summary = manager.init().unwrap();
        assert_eq!(summary.loaded, 3);

        let order: Vec<String> = manager.list().into_iter().map(|p| p.slug).collect();
        assert_eq!(order, vec!["core", "stats", "admin"]);
        assert_eq!(commands.names(), vec!["audit", "motd", "stats"]);
    }

    #[test]
    fn test_stats_counts_joins() {
        let (manager, commands) = host();
        manager.init().unwrap();

        manager.events().publish(TOPIC_PLAYER_JOIN, &json!({ "name": "alex" }));
        manager.events().publish(TOPIC_PLAYER_JOIN, &json!({ "name": "sam" }));
        assert_eq!(
            commands.dispatch("stats", &[]).as_deref(),
            Some("Welcome to ModHost | players joined: 2")
        );
    }

    #[test]
    fn test_unload_removes_commands_and_audits() {
        let (manager, commands) = host();
        manager.init().unwrap();

        manager.reload("stats").unwrap();
        assert_eq!(
            commands.dispatch("audit", &[]).as_deref(),
            Some("admin loaded\nstats unloaded (reload)\nstats loaded (reload)")
        );

        manager.unload("stats").unwrap();
        assert_eq!(manager.info("stats").unwrap().state, PluginState::Unloaded);
        assert_eq!(commands.dispatch("stats", &[]), None);
        assert_eq!(manager.events().subscriber_count(TOPIC_PLAYER_JOIN), 0);

        manager.shutdown().unwrap();
        assert!(commands.names().is_empty());
    }
}
