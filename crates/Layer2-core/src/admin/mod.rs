//! Admin - 플러그인 관리 표면 (HTTP 라우팅, 채팅 명령)

mod command;
mod http;

pub use command::{
    PermissionFn, PluginCommand, ReplyFn, PLUGIN_ADMIN_PERMISSION, PLUGIN_COMMAND,
    PLUGIN_COMMAND_USAGE,
};
pub use http::{AdminApi, AdminResponse};
