//! Plugin Manifest - 플러그인 선언 타입 (의존성, 로드 순서)

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// 로드 순서 클래스 - 의존성 정렬 전에 적용되는 큰 단위 구분
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOrder {
    /// 가장 먼저 로드
    Early,

    /// 기본값
    #[default]
    Normal,

    /// 가장 나중에 로드
    Late,
}

impl LoadOrder {
    /// 정렬 순서대로 모든 클래스
    pub const ALL: [LoadOrder; 3] = [LoadOrder::Early, LoadOrder::Normal, LoadOrder::Late];
}

impl std::fmt::Display for LoadOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Early => write!(f, "early"),
            Self::Normal => write!(f, "normal"),
            Self::Late => write!(f, "late"),
        }
    }
}

/// 플러그인 의존성
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDependency {
    /// 의존하는 플러그인 (slug 또는 이름)
    pub name: String,

    /// 버전 요구사항 (semver, 빈 문자열이면 제한 없음)
    #[serde(default)]
    pub version: String,

    /// 선택적 의존성 여부
    #[serde(default)]
    pub optional: bool,
}

impl PluginDependency {
    /// 필수 의존성 생성 (버전 제한 없음)
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            optional: false,
        }
    }

    /// 빌더 패턴: 버전 요구사항 설정 (예: ">=1.2", "^2")
    pub fn with_version(mut self, constraint: impl Into<String>) -> Self {
        self.version = constraint.into();
        self
    }

    /// 빌더 패턴: 선택적 의존성으로 표시
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// 필수 의존성 여부
    pub fn is_required(&self) -> bool {
        !self.optional
    }

    /// 주어진 버전이 요구사항을 만족하는지 확인
    ///
    /// 요구사항이나 버전 문자열이 semver가 아니면 검사하지 않고 통과시킨다.
    pub fn accepts_version(&self, found: &str) -> bool {
        let constraint = self.version.trim();
        if constraint.is_empty() || constraint == "*" {
            return true;
        }

        let (req, version) = match (
            VersionReq::parse(constraint),
            Version::parse(found.trim().trim_start_matches('v')),
        ) {
            (Ok(req), Ok(version)) => (req, version),
            _ => {
                debug!(
                    dependency = %self.name,
                    constraint,
                    found,
                    "Skipping non-semver version check"
                );
                return true;
            }
        };

        req.matches(&version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_order_default() {
        assert_eq!(LoadOrder::default(), LoadOrder::Normal);
        assert_eq!(LoadOrder::Late.to_string(), "late");
    }

    #[test]
    fn test_dependency_builder() {
        let dep = PluginDependency::new("core").with_version(">=1.0").optional();
        assert_eq!(dep.name, "core");
        assert!(!dep.is_required());
    }

    #[test]
    fn test_version_constraint() {
        let dep = PluginDependency::new("core").with_version(">=1.2");
        assert!(dep.accepts_version("1.2.0"));
        assert!(dep.accepts_version("v1.4.3"));
        assert!(!dep.accepts_version("1.1.9"));

        let caret = PluginDependency::new("core").with_version("^2");
        assert!(caret.accepts_version("2.5.0"));
        assert!(!caret.accepts_version("3.0.0"));
    }

    #[test]
    fn test_free_form_versions_pass() {
        let any = PluginDependency::new("core");
        assert!(any.accepts_version("whatever"));

        let dep = PluginDependency::new("core").with_version(">=1.0");
        assert!(dep.accepts_version("nightly"));
    }
}
