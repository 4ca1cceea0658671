//! IPC - 플러그인 간 통신 (서비스 레지스트리, 이벤트 버스)

mod events;
mod services;

pub use events::{EventBus, EventCallback, SubscriptionId};
pub use services::{ServiceHandle, ServiceRegistry};
