//! 稳定期跟踪
//!
//! 系统在创建通知后会播放入场动画，可能覆盖早期写入的位置。首次移动成功后
//! 把内容节点登记到这里，在稳定期内由引擎以更快的节奏反复重新定位。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::access::ElementAccess;
use crate::registry::WindowId;

/// 以原生身份为键的映射
///
/// 不同的句柄值可能指向同一个对象，所以不能用句柄本身做键：先按身份哈希分桶，
/// 再用 `same_element` 比较。引擎其余部分不直接接触平台的身份原语。
pub struct IdentityMap<E, V> {
    buckets: HashMap<u64, Vec<(E, V)>>,
}

impl<E: Clone, V> Default for IdentityMap<E, V> {
    fn default() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }
}

impl<E: Clone, V> IdentityMap<E, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 不存在时插入，返回是否插入
    pub fn insert_if_absent<A>(&mut self, access: &A, key: E, value: V) -> bool
    where
        A: ElementAccess<Element = E>,
    {
        let bucket = self.buckets.entry(access.identity_hash(&key)).or_default();
        if bucket.iter().any(|(k, _)| access.same_element(k, &key)) {
            return false;
        }
        bucket.push((key, value));
        true
    }

    pub fn get<A>(&self, access: &A, key: &E) -> Option<&V>
    where
        A: ElementAccess<Element = E>,
    {
        self.buckets
            .get(&access.identity_hash(key))?
            .iter()
            .find(|(k, _)| access.same_element(k, key))
            .map(|(_, v)| v)
    }

    pub fn remove<A>(&mut self, access: &A, key: &E) -> Option<V>
    where
        A: ElementAccess<Element = E>,
    {
        let hash = access.identity_hash(key);
        let bucket = self.buckets.get_mut(&hash)?;
        let index = bucket.iter().position(|(k, _)| access.same_element(k, key))?;
        let (_, value) = bucket.swap_remove(index);
        if bucket.is_empty() {
            self.buckets.remove(&hash);
        }
        Some(value)
    }

    /// 移除回调返回 true 的项并返回它们
    pub fn remove_where<F>(&mut self, mut remove: F) -> Vec<(E, V)>
    where
        F: FnMut(&E, &V) -> bool,
    {
        let mut removed = Vec::new();
        self.buckets.retain(|_, bucket| {
            let mut i = 0;
            while i < bucket.len() {
                if remove(&bucket[i].0, &bucket[i].1) {
                    removed.push(bucket.swap_remove(i));
                } else {
                    i += 1;
                }
            }
            !bucket.is_empty()
        });
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&E, &V)> {
        self.buckets
            .values()
            .flat_map(|bucket| bucket.iter().map(|(k, v)| (k, v)))
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

/// 稳定期登记项
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilizationEntry {
    pub window: WindowId,
    pub registered_at: Instant,
}

/// 内容节点 → 登记时间
pub struct StabilizationMap<E> {
    entries: IdentityMap<E, StabilizationEntry>,
    duration: Duration,
}

impl<E: Clone> StabilizationMap<E> {
    pub fn new(duration: Duration) -> Self {
        Self {
            entries: IdentityMap::new(),
            duration,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// 登记内容节点；已登记的不刷新时间，保证稳定期有上限
    pub fn register<A>(&mut self, access: &A, content: E, window: WindowId, now: Instant) -> bool
    where
        A: ElementAccess<Element = E>,
    {
        self.entries.insert_if_absent(
            access,
            content,
            StabilizationEntry {
                window,
                registered_at: now,
            },
        )
    }

    pub fn contains<A>(&self, access: &A, content: &E) -> bool
    where
        A: ElementAccess<Element = E>,
    {
        self.entries.get(access, content).is_some()
    }

    /// 移除已失效（被关闭）的节点
    pub fn remove<A>(&mut self, access: &A, content: &E) -> Option<StabilizationEntry>
    where
        A: ElementAccess<Element = E>,
    {
        self.entries.remove(access, content)
    }

    /// 移除超过稳定期的项，返回它们所属的窗口
    pub fn expire(&mut self, now: Instant) -> Vec<WindowId> {
        let duration = self.duration;
        self.entries
            .remove_where(|_, entry| now.saturating_duration_since(entry.registered_at) > duration)
            .into_iter()
            .map(|(_, entry)| entry.window)
            .collect()
    }

    /// 当前登记项的快照，按登记时间排序
    pub fn snapshot(&self) -> Vec<(E, StabilizationEntry)> {
        let mut items: Vec<(E, StabilizationEntry)> =
            self.entries.iter().map(|(k, v)| (k.clone(), *v)).collect();
        items.sort_by_key(|(_, entry)| (entry.registered_at, entry.window));
        items
    }

    /// 是否还有同一窗口的其他登记项
    pub fn has_window(&self, window: WindowId) -> bool {
        self.entries.iter().any(|(_, entry)| entry.window == window)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
