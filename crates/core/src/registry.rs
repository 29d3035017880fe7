use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::access::ElementAccess;
use crate::Rect;

/// 窗口代理 ID，首次观察到时分配，单调递增
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 候选窗口生命周期
///
/// Unseen 即不在注册表中；Settled 只是稳定期到期，没有显式的"稳定"信号。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateState {
    Detected,
    Located,
    Moved,
    Stabilizing,
    Settled,
    Expired,
}

impl CandidateState {
    pub fn is_finished(&self) -> bool {
        matches!(self, CandidateState::Settled | CandidateState::Expired)
    }
}

/// 被观察到的通知形窗口
#[derive(Debug, Clone)]
pub struct CandidateWindow<E> {
    pub id: WindowId,
    /// 系统窗口编号（推送事件来的窗口可能没有）
    pub number: Option<u32>,
    pub owner_pid: i32,
    pub bounds: Rect,
    pub state: CandidateState,
    // 原生句柄只保存在这里；结束后释放
    handle: Option<E>,
}

impl<E> CandidateWindow<E> {
    pub fn handle(&self) -> Option<&E> {
        self.handle.as_ref()
    }
}

/// 已分类窗口编号集合
///
/// 无论是否像通知，每个观察到的窗口都会加入，避免每轮重复处理。
/// 没有淘汰策略，只在显式 reset 时清空。
#[derive(Debug, Default)]
pub struct KnownWindowSet {
    numbers: HashSet<u32>,
}

impl KnownWindowSet {
    /// 返回是否是新加入的
    pub fn insert(&mut self, number: u32) -> bool {
        self.numbers.insert(number)
    }

    pub fn contains(&self, number: u32) -> bool {
        self.numbers.contains(&number)
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    pub fn reset(&mut self) {
        self.numbers.clear();
    }
}

/// 代理 ID → 候选窗口的注册表
pub struct WindowRegistry<E> {
    next_id: u64,
    candidates: HashMap<WindowId, CandidateWindow<E>>,
    by_number: HashMap<u32, WindowId>,
    known: KnownWindowSet,
}

impl<E: Clone> Default for WindowRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> WindowRegistry<E> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            candidates: HashMap::new(),
            by_number: HashMap::new(),
            known: KnownWindowSet::default(),
        }
    }

    pub fn known(&self) -> &KnownWindowSet {
        &self.known
    }

    pub fn known_mut(&mut self) -> &mut KnownWindowSet {
        &mut self.known
    }

    fn allocate(&mut self) -> WindowId {
        let id = WindowId(self.next_id);
        self.next_id += 1;
        id
    }

    /// 轮询发现的窗口，句柄稍后解析
    pub fn register_window(&mut self, number: u32, owner_pid: i32, bounds: Rect) -> WindowId {
        if let Some(id) = self.by_number.get(&number) {
            return *id;
        }
        let id = self.allocate();
        self.candidates.insert(
            id,
            CandidateWindow {
                id,
                number: Some(number),
                owner_pid,
                bounds,
                state: CandidateState::Detected,
                handle: None,
            },
        );
        self.by_number.insert(number, id);
        log::debug!("候选窗口 {} (编号 {}, pid {})", id, number, owner_pid);
        id
    }

    /// 推送事件带来的窗口，已经有句柄
    pub fn register_handle(&mut self, handle: E, owner_pid: i32, bounds: Rect) -> WindowId {
        let id = self.allocate();
        self.candidates.insert(
            id,
            CandidateWindow {
                id,
                number: None,
                owner_pid,
                bounds,
                state: CandidateState::Detected,
                handle: Some(handle),
            },
        );
        log::debug!("候选窗口 {} (推送, pid {})", id, owner_pid);
        id
    }

    /// 把窗口编号关联到已有候选（推送先到、轮询后到的情况）
    pub fn link_number(&mut self, id: WindowId, number: u32) {
        if let Some(candidate) = self.candidates.get_mut(&id) {
            candidate.number = Some(number);
            self.by_number.insert(number, id);
        }
    }

    pub fn attach_handle(&mut self, id: WindowId, handle: E) {
        if let Some(candidate) = self.candidates.get_mut(&id) {
            candidate.handle = Some(handle);
        }
    }

    pub fn get(&self, id: WindowId) -> Option<&CandidateWindow<E>> {
        self.candidates.get(&id)
    }

    pub fn id_for_number(&self, number: u32) -> Option<WindowId> {
        self.by_number.get(&number).copied()
    }

    pub fn handle(&self, id: WindowId) -> Option<&E> {
        self.candidates.get(&id).and_then(|c| c.handle.as_ref())
    }

    pub fn state(&self, id: WindowId) -> Option<CandidateState> {
        self.candidates.get(&id).map(|c| c.state)
    }

    /// 更新状态；进入终态时释放原生句柄
    pub fn set_state(&mut self, id: WindowId, state: CandidateState) {
        if let Some(candidate) = self.candidates.get_mut(&id) {
            if candidate.state != state {
                log::debug!("候选窗口 {}: {:?} → {:?}", id, candidate.state, state);
                candidate.state = state;
            }
            if state.is_finished() {
                candidate.handle = None;
            }
        }
    }

    /// 按原生身份查找已注册的窗口
    pub fn find_by_handle<A>(&self, access: &A, handle: &E) -> Option<WindowId>
    where
        A: ElementAccess<Element = E>,
    {
        self.candidates
            .values()
            .find(|c| c.handle.as_ref().is_some_and(|h| access.same_element(h, handle)))
            .map(|c| c.id)
    }

    /// 当前仍持有句柄的候选
    pub fn live_ids(&self) -> Vec<WindowId> {
        let mut ids: Vec<WindowId> = self
            .candidates
            .values()
            .filter(|c| c.handle.is_some())
            .map(|c| c.id)
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
