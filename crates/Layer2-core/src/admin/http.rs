//! Admin HTTP - 전송 계층과 무관한 플러그인 관리 라우팅
//!
//! 호스트의 HTTP 서버가 (method, path)를 넘기면 상태 코드와 JSON 본문을 돌려준다.
//!
//! | Method | Path                               | 응답                          |
//! |--------|------------------------------------|-------------------------------|
//! | GET    | `/plugins`                         | 200 `{count, plugins}`        |
//! | GET    | `/plugins/{slug}`                  | 200 `{plugin}` / 404          |
//! | POST   | `/plugins/{slug}/{load,unload,reload}` | 200 `{ok, action, plugin}` / 400 `{error}` |

use crate::plugin::{PluginError, PluginManager};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// 관리 API 응답
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminResponse {
    pub status: u16,
    pub body: Value,
}

impl AdminResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }

    fn plugin_error(status: u16, err: &PluginError) -> Self {
        Self {
            status,
            body: json!({ "error": err.to_string(), "kind": err.kind() }),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 관리 HTTP 라우터
#[derive(Debug, Clone)]
pub struct AdminApi {
    manager: Arc<PluginManager>,
    prefix: String,
}

impl AdminApi {
    pub fn new(manager: Arc<PluginManager>) -> Self {
        Self {
            manager,
            prefix: String::new(),
        }
    }

    /// 빌더 패턴: 경로 접두사 (예: `/api/admin`)
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    /// 요청 처리
    pub fn handle(&self, method: &str, path: &str) -> AdminResponse {
        let path = path.split('?').next().unwrap_or_default();
        // 접두사는 경로 세그먼트 경계에서만 일치
        let Some(rest) = path
            .strip_prefix(self.prefix.as_str())
            .filter(|rest| self.prefix.is_empty() || rest.is_empty() || rest.starts_with('/'))
        else {
            return AdminResponse::error(404, "not found");
        };
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        let method = method.to_ascii_uppercase();

        debug!(method = %method, path, "Admin request");

        match (method.as_str(), segments.as_slice()) {
            ("GET", ["plugins"]) => self.list(),
            ("GET", ["plugins", slug]) => self.show(slug),
            ("POST", ["plugins", slug, action]) => self.action(slug, action),
            (_, ["plugins"]) | (_, ["plugins", _]) | (_, ["plugins", _, _]) => {
                AdminResponse::error(405, format!("method {} not allowed", method))
            }
            _ => AdminResponse::error(404, "not found"),
        }
    }

    fn list(&self) -> AdminResponse {
        let plugins = self.manager.list();
        AdminResponse::ok(json!({
            "count": plugins.len(),
            "plugins": plugins,
        }))
    }

    fn show(&self, slug: &str) -> AdminResponse {
        match self.manager.info(slug) {
            Ok(info) => AdminResponse::ok(json!({ "plugin": info })),
            Err(err) => AdminResponse::plugin_error(404, &err),
        }
    }

    fn action(&self, slug: &str, action: &str) -> AdminResponse {
        let result = match action {
            "load" => self.manager.load(slug),
            "unload" => self.manager.unload(slug),
            "reload" => self.manager.reload(slug),
            _ => return AdminResponse::error(400, format!("unknown action: {}", action)),
        };

        match result {
            Ok(info) => {
                info!(slug, action, "Admin plugin action completed");
                AdminResponse::ok(json!({
                    "ok": true,
                    "action": action,
                    "plugin": info,
                }))
            }
            Err(err) => AdminResponse::plugin_error(400, &err),
        }
    }
}
