//! Fault Boundary - 플러그인 코드 실행 격리
//!
//! 플러그인이 일으킨 panic을 잡아 에러로 바꾸는 유일한 지점.
//! 플러그인 내부 코드는 일반적인 `Result` 반환을 사용해야 한다.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// 격리된 호출의 실패
#[derive(Debug)]
pub enum Fault {
    /// 호출 중 panic 발생
    Panicked(String),

    /// 호출이 에러를 반환
    Returned(anyhow::Error),
}

impl Fault {
    /// 기록용 상세 메시지 (에러 체인 포함)
    pub fn detail(&self) -> String {
        match self {
            Self::Panicked(message) => message.clone(),
            Self::Returned(err) => format!("{:#}", err),
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Panicked(message) => write!(f, "panic: {}", message),
            Self::Returned(err) => write!(f, "{:#}", err),
        }
    }
}

/// panic payload를 문자열로 변환
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// 플러그인 콜백 실행 (panic과 에러 모두 `Fault`로 변환)
pub fn contain<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, Fault> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(Fault::Returned(err)),
        Err(payload) => Err(Fault::Panicked(panic_message(payload.as_ref()))),
    }
}

/// 반환값 없는 콜백 실행 - panic은 로그만 남기고 삼킨다
///
/// 구독자/리무버처럼 실패가 호출자에게 전파되면 안 되는 곳에 사용.
/// 정상 완료 시 true.
pub fn contain_logged(context: &str, f: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            error!(
                context,
                panic = %panic_message(payload.as_ref()),
                "Contained panic in plugin callback"
            );
            false
        }
    }
}
