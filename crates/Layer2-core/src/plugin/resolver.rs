//! Dependency Resolver - 로드 순서 계산
//!
//! 로드 순서 클래스(Early/Normal/Late)로 먼저 나눈 뒤, 클래스 안에서
//! 필수 의존성으로 Kahn 위상 정렬을 한다. 순환이 있으면 그 클래스는
//! 등록 순서로 되돌아가고 경고만 남긴다.

use super::error::PluginError;
use super::manifest::LoadOrder;
use super::registry::{EntryId, ResolverNode};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// 정렬 결과
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// 최종 로드 순서 (언로드는 역순)
    pub order: Vec<EntryId>,

    /// 치명적이지 않은 문제 (`CyclicDependency`)
    pub warnings: Vec<PluginError>,
}

impl Resolution {
    /// 언로드 순서
    pub fn unload_order(&self) -> Vec<EntryId> {
        self.order.iter().rev().copied().collect()
    }
}

/// 의존성 정렬기
#[derive(Debug, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    /// 로드 순서 계산 (입력 순서 = 등록 순서)
    pub fn resolve(&self, nodes: &[ResolverNode]) -> Resolution {
        let mut resolution = Resolution::default();

        for class in LoadOrder::ALL {
            let bucket: Vec<&ResolverNode> = nodes.iter().filter(|n| n.order == class).collect();
            if bucket.is_empty() {
                continue;
            }

            match sort_bucket(&bucket) {
                Ok(sorted) => resolution.order.extend(sorted),
                Err(members) => {
                    let warning = PluginError::CyclicDependency {
                        bucket: class,
                        members,
                    };
                    warn!(bucket = %class, "{}, falling back to registration order", warning);
                    resolution.warnings.push(warning);
                    resolution.order.extend(bucket.iter().map(|n| n.id));
                }
            }
        }

        debug!(plugins = resolution.order.len(), "Resolved load order");
        resolution
    }
}

/// 클래스 하나를 정렬. 순환이면 정렬되지 못한 멤버 이름을 반환
fn sort_bucket(bucket: &[&ResolverNode]) -> Result<Vec<EntryId>, Vec<String>> {
    let n = bucket.len();
    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (i, node) in bucket.iter().enumerate() {
        for dep in node.dependencies.iter().filter(|d| d.is_required()) {
            // 다른 클래스나 미등록 의존성은 정렬에 영향 없음 (로드 시 검사)
            let Some(target) = bucket.iter().position(|candidate| names(candidate, &dep.name))
            else {
                continue;
            };
            dependents[target].push(i);
            in_degree[i] += 1;
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|i| in_degree[*i] == 0).collect();
    let mut sorted = Vec::with_capacity(n);

    while let Some(i) = queue.pop_front() {
        sorted.push(i);
        for &next in &dependents[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if sorted.len() != n {
        let members = (0..n)
            .filter(|i| in_degree[*i] > 0)
            .map(|i| display_name(bucket[i]))
            .collect();
        return Err(members);
    }

    Ok(sorted.into_iter().map(|i| bucket[i].id).collect())
}

/// 의존성 이름이 노드를 가리키는지 (slug 대소문자 무시, 또는 표시 이름 일치)
fn names(node: &ResolverNode, name: &str) -> bool {
    (!node.slug.is_empty() && node.slug.eq_ignore_ascii_case(name)) || node.name == name
}

fn display_name(node: &ResolverNode) -> String {
    if node.slug.is_empty() {
        node.name.clone()
    } else {
        node.slug.clone()
    }
}
