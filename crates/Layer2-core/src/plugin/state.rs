//! Plugin State - 플러그인 상태 머신
//!
//! ```text
//! Unloaded ─load─▶ Loading ─ok─▶ Loaded ─unload─▶ Unloading ─ok─▶ Unloaded
//!    │                │                               │
//!    │                └──────err──▶ Failed ◀──err─────┘
//!    └─config off──▶ Disabled
//! ```

use serde::{Deserialize, Serialize};

/// 플러그인 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PluginState {
    /// 등록됨, 로드되지 않음
    #[default]
    Unloaded,

    /// load 콜백 실행 중
    Loading,

    /// 로드 완료
    Loaded,

    /// unload 진행 중
    Unloading,

    /// 검증 또는 콜백 실패
    Failed,

    /// 설정에서 비활성화됨
    Disabled,
}

impl PluginState {
    /// 콜백 실행 중인 일시적 상태인지
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Loading | Self::Unloading)
    }

    /// 허용되는 상태 전이인지 확인
    pub fn can_transition_to(&self, next: PluginState) -> bool {
        use PluginState::*;

        match (*self, next) {
            (Unloaded | Failed | Disabled, Loading) => true,
            // 검증 실패는 load 콜백 전에 발생
            (Unloaded | Failed | Disabled, Failed) => true,
            (Unloaded | Failed | Disabled, Disabled) => true,
            (Loading, Loaded | Failed) => true,
            (Loaded, Unloading) => true,
            (Unloading, Unloaded | Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unloaded => write!(f, "Unloaded"),
            Self::Loading => write!(f, "Loading"),
            Self::Loaded => write!(f, "Loaded"),
            Self::Unloading => write!(f, "Unloading"),
            Self::Failed => write!(f, "Failed"),
            Self::Disabled => write!(f, "Disabled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use PluginState::*;
        assert!(Unloaded.can_transition_to(Loading));
        assert!(Loading.can_transition_to(Loaded));
        assert!(Loaded.can_transition_to(Unloading));
        assert!(Unloading.can_transition_to(Unloaded));
    }

    #[test]
    fn test_rejected_transitions() {
        use PluginState::*;
        assert!(!Loaded.can_transition_to(Loading));
        assert!(!Unloaded.can_transition_to(Unloading));
        assert!(!Loaded.can_transition_to(Disabled));
        assert!(!Loading.can_transition_to(Unloaded));
    }

    #[test]
    fn test_failed_exits() {
        use PluginState::*;
        assert!(Loading.can_transition_to(Failed));
        assert!(Unloading.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Loading));
        assert!(Disabled.can_transition_to(Loading));
    }
}
