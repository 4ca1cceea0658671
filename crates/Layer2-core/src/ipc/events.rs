//! Event Bus - 토픽 기반 동기 발행/구독
//!
//! 발행은 호출자 스레드에서 구독 순서대로 동기 실행된다.
//! 구독자 하나의 panic은 기록 후 무시하고 나머지에게 계속 전달한다.

use crate::plugin::fault;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

// ============================================================================
// SubscriptionId
// ============================================================================

/// 구독 ID (전역 유일, 단조 증가)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// 이벤트 콜백
pub type EventCallback = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    owner: String,
    callback: EventCallback,
}

// ============================================================================
// EventBus
// ============================================================================

/// 이벤트 버스
pub struct EventBus {
    /// 토픽별 구독 목록 (구독 순서 유지)
    topics: RwLock<HashMap<String, Vec<Subscription>>>,

    /// ID 카운터
    counter: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            counter: AtomicU64::new(1),
        }
    }

    /// 토픽 구독
    pub fn subscribe(
        &self,
        owner: &str,
        topic: impl Into<String>,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let topic = topic.into();
        let id = SubscriptionId::new(self.counter.fetch_add(1, Ordering::SeqCst));

        debug!(subscription = %id, owner, topic = %topic, "Subscribed to topic");

        self.topics
            .write()
            .entry(topic)
            .or_default()
            .push(Subscription {
                id,
                owner: owner.to_string(),
                callback: Arc::new(callback),
            });

        id
    }

    /// 이벤트 발행, 정상 완료된 구독자 수 반환
    ///
    /// 구독 목록 스냅샷을 떠서 락 밖에서 호출하므로 콜백 안에서
    /// subscribe/unsubscribe 해도 안전하다.
    pub fn publish(&self, topic: &str, data: &Value) -> usize {
        let snapshot: Vec<Subscription> = match self.topics.read().get(topic) {
            Some(subs) => subs.clone(),
            None => return 0,
        };

        trace!(topic, subscribers = snapshot.len(), "Publishing event");

        let mut delivered = 0;
        for sub in &snapshot {
            let context = format!("{} ({} on {})", sub.id, sub.owner, topic);
            if fault::contain_logged(&context, || (sub.callback)(data)) {
                delivered += 1;
            }
        }
        delivered
    }

    /// 구독 해제
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut topics = self.topics.write();
        for subs in topics.values_mut() {
            if let Some(pos) = subs.iter().position(|s| s.id == id) {
                subs.remove(pos);
                debug!(subscription = %id, "Unsubscribed");
                return true;
            }
        }
        false
    }

    /// 소유자의 모든 구독 해제, 해제된 개수 반환
    pub fn unsubscribe_all_for_owner(&self, owner: &str) -> usize {
        let mut topics = self.topics.write();
        let mut removed = 0;
        for subs in topics.values_mut() {
            let before = subs.len();
            subs.retain(|s| s.owner != owner);
            removed += before - subs.len();
        }
        topics.retain(|_, subs| !subs.is_empty());

        if removed > 0 {
            debug!(owner, removed, "Unsubscribed all for owner");
        }
        removed
    }

    /// 토픽 구독자 수
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.read().get(topic).map_or(0, |subs| subs.len())
    }

    /// 구독이 있는 토픽 목록 (정렬됨)
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .topics
            .read()
            .iter()
            .filter(|(_, subs)| !subs.is_empty())
            .map(|(t, _)| t.clone())
            .collect();
        topics.sort();
        topics
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("topics", &self.topics())
            .finish()
    }
}
