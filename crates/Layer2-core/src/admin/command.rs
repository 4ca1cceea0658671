//! Admin Command - `plugin <list|load|unload|reload|info> [slug]` 채팅 명령

use crate::plugin::{PluginInfo, PluginManager};
use std::sync::Arc;
use tracing::{debug, warn};

/// 명령 이름
pub const PLUGIN_COMMAND: &str = "plugin";

/// 사용법
pub const PLUGIN_COMMAND_USAGE: &str = "<list|load|unload|reload|info> [slug]";

/// 필요 권한
pub const PLUGIN_ADMIN_PERMISSION: &str = "modhost.admin.plugins";

/// 응답 함수 `(slot, message)`
pub type ReplyFn = Arc<dyn Fn(i32, &str) + Send + Sync>;

/// 권한 확인 함수 `(slot, permission)`
pub type PermissionFn = Arc<dyn Fn(i32, &str) -> bool + Send + Sync>;

/// 플러그인 관리 채팅 명령
#[derive(Clone)]
pub struct PluginCommand {
    manager: Arc<PluginManager>,
    reply: ReplyFn,
    permission: PermissionFn,
}

impl PluginCommand {
    /// 생성 (권한 확인은 기본적으로 모두 허용)
    pub fn new(
        manager: Arc<PluginManager>,
        reply: impl Fn(i32, &str) + Send + Sync + 'static,
    ) -> Self {
        Self {
            manager,
            reply: Arc::new(reply),
            permission: Arc::new(|_, _| true),
        }
    }

    /// 빌더 패턴: 권한 확인 함수
    pub fn with_permission_check(
        mut self,
        check: impl Fn(i32, &str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.permission = Arc::new(check);
        self
    }

    fn reply(&self, slot: i32, message: impl AsRef<str>) {
        (self.reply)(slot, message.as_ref());
    }

    /// 명령 실행 (`args`는 명령 이름 뒤의 인자), 처리했으면 true
    pub fn execute(&self, slot: i32, args: &[&str]) -> bool {
        if !(self.permission)(slot, PLUGIN_ADMIN_PERMISSION) {
            warn!(slot, "Denied plugin command");
            self.reply(slot, "[ERROR] You do not have permission to use this command");
            return true;
        }

        let Some(first) = args.first() else {
            self.reply(slot, format!("Usage: {} {}", PLUGIN_COMMAND, PLUGIN_COMMAND_USAGE));
            return true;
        };
        let action = first.to_ascii_lowercase();
        let slug = args.get(1).copied();

        debug!(slot, action = %action, slug, "Plugin command");

        match action.as_str() {
            "list" => self.list(slot),
            "load" | "unload" | "reload" => match slug {
                Some(slug) => self.run_action(slot, &action, slug),
                None => self.reply(slot, format!("Usage: {} {} <slug>", PLUGIN_COMMAND, action)),
            },
            "info" => match slug {
                Some(slug) => self.info(slot, slug),
                None => self.reply(slot, format!("Usage: {} info <slug>", PLUGIN_COMMAND)),
            },
            _ => self.reply(
                slot,
                format!(
                    "Unknown action: {}. Use: list, load, unload, reload, info",
                    action
                ),
            ),
        }
        true
    }

    fn list(&self, slot: i32) {
        let plugins = self.manager.list();
        self.reply(slot, format!("Plugins ({}):", plugins.len()));
        for plugin in &plugins {
            self.reply(slot, format!("  {}", list_line(plugin)));
        }
    }

    fn run_action(&self, slot: i32, action: &str, slug: &str) {
        let (result, done) = match action {
            "load" => (self.manager.load(slug), "loaded"),
            "unload" => (self.manager.unload(slug), "unloaded"),
            _ => (self.manager.reload(slug), "reloaded"),
        };

        match result {
            Ok(_) => self.reply(slot, format!("Plugin {} {} successfully", slug, done)),
            Err(err) => self.reply(slot, format!("[ERROR] {}", err)),
        }
    }

    fn info(&self, slot: i32, slug: &str) {
        let Ok(info) = self.manager.info(slug) else {
            self.reply(slot, format!("[ERROR] Plugin not found: {}", slug));
            return;
        };

        self.reply(slot, format!("{} v{} by {}", info.name, info.version, info.author));
        self.reply(slot, format!("  Slug: {} | State: {}", info.slug, info.state));
        if !info.description.is_empty() {
            self.reply(slot, format!("  {}", info.description));
        }
        if let Some(error) = &info.error {
            self.reply(slot, format!("  Error: {}", error));
        }
    }
}

fn list_line(plugin: &PluginInfo) -> String {
    let state = match &plugin.error {
        Some(error) => format!("{} ({})", plugin.state, error),
        None => plugin.state.to_string(),
    };
    let slug = if plugin.slug.is_empty() { "-" } else { plugin.slug.as_str() };
    format!("{} [{}] - {} v{}", slug, state, plugin.name, plugin.version)
}

impl std::fmt::Debug for PluginCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginCommand").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{Plugin, PluginContext};
    use parking_lot::Mutex;

    struct Greeter;

    impl Plugin for Greeter {
        fn slug(&self) -> &str {
            "greeter"
        }
        fn name(&self) -> &str {
            "Greeter"
        }
        fn version(&self) -> &str {
            "1.2.0"
        }
        fn author(&self) -> &str {
            "tests"
        }
        fn description(&self) -> &str {
            "says hello"
        }
        fn load(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
            Ok(())
        }
        fn unload(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn command() -> (PluginCommand, Arc<Mutex<Vec<(i32, String)>>>) {
        let manager = Arc::new(PluginManager::new());
        manager.register(Arc::new(Greeter)).unwrap();

        let replies = Arc::new(Mutex::new(Vec::new()));
        let r = Arc::clone(&replies);
        let command = PluginCommand::new(manager, move |slot, msg| {
            r.lock().push((slot, msg.to_string()));
        });
        (command, replies)
    }

    fn messages(replies: &Mutex<Vec<(i32, String)>>) -> Vec<String> {
        replies.lock().drain(..).map(|(_, m)| m).collect()
    }

    #[test]
    fn test_list_and_load() {
        let (command, replies) = command();

        assert!(command.execute(3, &["list"]));
        assert_eq!(
            messages(&replies),
            vec!["Plugins (1):", "  greeter [Unloaded] - Greeter v1.2.0"]
        );

        command.execute(3, &["LOAD", "greeter"]);
        assert_eq!(messages(&replies), vec!["Plugin greeter loaded successfully"]);

        command.execute(3, &["load", "greeter"]);
        assert_eq!(messages(&replies), vec!["[ERROR] plugin greeter is Loaded"]);
    }

    #[test]
    fn test_info() {
        let (command, replies) = command();
        command.execute(0, &["info", "greeter"]);
        assert_eq!(
            messages(&replies),
            vec![
                "Greeter v1.2.0 by tests",
                "  Slug: greeter | State: Unloaded",
                "  says hello"
            ]
        );

        command.execute(0, &["info", "ghost"]);
        assert_eq!(messages(&replies), vec!["[ERROR] Plugin not found: ghost"]);
    }

    #[test]
    fn test_usage_and_unknown() {
        let (command, replies) = command();
        command.execute(1, &["unload"]);
        command.execute(1, &["explode"]);
        command.execute(1, &[]);
        assert_eq!(
            messages(&replies),
            vec![
                "Usage: plugin unload <slug>",
                "Unknown action: explode. Use: list, load, unload, reload, info",
                "Usage: plugin <list|load|unload|reload|info> [slug]",
            ]
        );
    }

    #[test]
    fn test_permission_denied() {
        let (command, replies) = command();
        let command = command.with_permission_check(|slot, perm| {
            slot == 0 && perm == PLUGIN_ADMIN_PERMISSION
        });

        command.execute(5, &["load", "greeter"]);
        assert_eq!(
            messages(&replies),
            vec!["[ERROR] You do not have permission to use this command"]
        );

        command.execute(0, &["load", "greeter"]);
        assert_eq!(messages(&replies), vec!["Plugin greeter loaded successfully"]);
    }
}
