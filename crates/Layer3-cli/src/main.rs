//! ModHost CLI - Main entry point

mod demo;
mod host;

use clap::{Parser, Subcommand};
use host::ChatCommands;
use modhost_core::{AdminApi, PluginCommand, PluginManager, PluginManagerConfig, ScopeRemovers};
use serde_json::Value;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// ModHost - plugin runtime host
#[derive(Parser, Debug)]
#[command(name = "modhost")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Directory holding plugins.json and per-plugin config files
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load all plugins and read commands from stdin until EOF
    Run,
    /// Load all plugins and print their state
    List,
    /// Dispatch a single admin HTTP request
    Http {
        /// HTTP method (GET, POST)
        method: String,
        /// Request path, e.g. /plugins/stats/reload
        path: String,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = match args.config_dir {
        Some(dir) => PluginManagerConfig::in_dir(dir),
        None => PluginManagerConfig::global()?,
    };
    let host = Host::new(config, |line| println!("{}", line))?;

    host.manager.init()?;
    let result = match args.command.unwrap_or(Command::Run) {
        Command::Run => host.run(std::io::stdin().lock()),
        Command::List => {
            host.execute("http GET /plugins");
            Ok(())
        }
        Command::Http { method, path } => {
            host.execute(&format!("http {} {}", method, path));
            Ok(())
        }
    };
    host.manager.shutdown()?;
    result
}

// ============================================================================
// Host
// ============================================================================

type Output = Arc<dyn Fn(&str) + Send + Sync>;

/// 플러그인 매니저와 관리 표면을 묶은 호스트 프로세스
struct Host {
    manager: Arc<PluginManager>,
    commands: Arc<ChatCommands>,
    admin: AdminApi,
    plugin_command: PluginCommand,
    out: Output,
}

impl Host {
    fn new(
        config: PluginManagerConfig,
        out: impl Fn(&str) + Send + Sync + 'static,
    ) -> anyhow::Result<Self> {
        let manager = PluginManager::with_config(config);
        let commands = Arc::new(ChatCommands::new(Arc::clone(manager.scopes())));

        let removers = {
            let commands = Arc::clone(&commands);
            ScopeRemovers::new().on_chat_command(move |name| {
                commands.remove(name);
            })
        };
        let manager = Arc::new(manager.with_removers(removers));
        demo::register_all(&manager, &commands)?;

        let out: Output = Arc::new(out);
        let reply = Arc::clone(&out);
        Ok(Self {
            admin: AdminApi::new(Arc::clone(&manager)),
            plugin_command: PluginCommand::new(Arc::clone(&manager), move |_, msg| reply(msg)),
            manager,
            commands,
            out,
        })
    }

    /// 입력이 끝날 때까지 한 줄씩 실행
    fn run(&self, input: impl BufRead) -> anyhow::Result<()> {
        info!("{}", self.manager.summary());
        self.print("Type 'plugin list', 'publish <topic> <json>', 'http <METHOD> <PATH>' or a plugin command");

        for line in input.lines() {
            if !self.execute(line?.trim()) {
                break;
            }
        }
        Ok(())
    }

    /// 한 줄 실행, 종료 요청이면 false
    fn execute(&self, line: &str) -> bool {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            return true;
        };

        debug!(command, "Host command");
        match command {
            "quit" | "exit" => return false,
            "plugin" => {
                let args: Vec<&str> = parts.collect();
                self.plugin_command.execute(0, &args);
            }
            "publish" => self.publish(line),
            "http" => match (parts.next(), parts.next()) {
                (Some(method), Some(path)) => {
                    let response = self.admin.handle(method, path);
                    self.print(&format!("{} {}", response.status, pretty(&response.body)));
                }
                _ => self.print("Usage: http <METHOD> <PATH>"),
            },
            name => {
                let args: Vec<&str> = parts.collect();
                match self.commands.dispatch(name, &args) {
                    Some(reply) => self.print(&reply),
                    None => self.print(&format!("Unknown command: {}", name)),
                }
            }
        }
        true
    }

    fn publish(&self, line: &str) {
        let mut parts = line.splitn(3, char::is_whitespace).skip(1);
        let Some(topic) = parts.next().filter(|t| !t.is_empty()) else {
            self.print("Usage: publish <topic> [json]");
            return;
        };

        let data = match parts.next().map(str::trim).filter(|d| !d.is_empty()) {
            Some(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(data) => data,
                Err(e) => {
                    self.print(&format!("[ERROR] invalid JSON: {}", e));
                    return;
                }
            },
            None => Value::Null,
        };

        let delivered = self.manager.events().publish(topic, &data);
        self.print(&format!("Delivered to {} subscriber(s)", delivered));
    }

    fn print(&self, line: &str) {
        (self.out)(line);
    }
}

fn pretty(body: &Value) -> String {
    serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string())
}
