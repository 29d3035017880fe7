//! 通知检测与定位引擎
//!
//! 轮询和推送两个来源都产生同一种"候选窗口被观察到"事件，进入同一条
//! 定位 → 计算 → 移动 → 稳定 流水线。所有状态只在调用 [`Engine::tick`]
//! 的协作式循环线程上修改；平台回调经 [`CreationQueue`] 交接进来。

use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use crate::access::{
    size_with_retry, AccessError, Backend, CreationQueue, RetryPolicy, WindowSnapshot,
};
use crate::config::{ConfigContext, ConfigEvent, EngineConfig};
use crate::locator::{self, Located, LocatorSettings, NOTIFICATION_ENVELOPE};
use crate::mover::{self, MoveOutcome, MoveRequest};
use crate::registry::{CandidateState, WindowId, WindowRegistry};
use crate::stabilizer::StabilizationMap;
use crate::Rect;

/// 通知中心进程的 bundle 标识
pub const NOTIFICATION_CENTER_BUNDLE_ID: &str = "com.apple.notificationcenterui";

/// 窗口边界匹配容差
const BOUNDS_TOLERANCE: f64 = 2.0;

/// 引擎内部参数
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub poll_interval: Duration,
    pub stabilize_interval: Duration,
    pub stabilization_duration: Duration,
    /// 推送事件到达后等待几何信息提交的时间
    pub settle_delay: Duration,
    pub notification_bundle_id: String,
    pub size_retry: RetryPolicy,
    pub verify_moves: bool,
    pub locator: LocatorSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            stabilize_interval: Duration::from_millis(50),
            stabilization_duration: Duration::from_secs(1),
            settle_delay: Duration::from_millis(50),
            notification_bundle_id: NOTIFICATION_CENTER_BUNDLE_ID.to_string(),
            size_retry: RetryPolicy::default(),
            verify_moves: true,
            locator: LocatorSettings::default(),
        }
    }
}

/// 候选窗口的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationSource {
    Poll,
    Push,
}

/// 候选窗口被观察到
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateObserved {
    pub window: WindowId,
    pub source: ObservationSource,
}

struct PendingPush<E> {
    handle: E,
    pid: i32,
    due: Instant,
}

pub struct Engine<B: Backend> {
    backend: B,
    settings: EngineSettings,
    config: EngineConfig,
    config_events: Receiver<ConfigEvent>,
    registry: WindowRegistry<B::Element>,
    stabilizer: StabilizationMap<B::Element>,
    creations: CreationQueue<B::Element>,
    pending: Vec<PendingPush<B::Element>>,
    service_pid: Option<i32>,
    subscribed_pid: Option<i32>,
    // 同一进程订阅失败后不再每轮重试，等下一次 start
    failed_subscription: Option<i32>,
    running: bool,
    next_poll: Option<Instant>,
    next_stabilize: Option<Instant>,
}

impl<B: Backend> Engine<B> {
    pub fn new(backend: B, context: ConfigContext, settings: EngineSettings) -> Self {
        let stabilizer = StabilizationMap::new(settings.stabilization_duration);
        Self {
            backend,
            settings,
            config: context.snapshot,
            config_events: context.events,
            registry: WindowRegistry::new(),
            stabilizer,
            creations: CreationQueue::new(),
            pending: Vec::new(),
            service_pid: None,
            subscribed_pid: None,
            failed_subscription: None,
            running: false,
            next_poll: None,
            next_stabilize: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &WindowRegistry<B::Element> {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn known_window_count(&self) -> usize {
        self.registry.known().len()
    }

    pub fn stabilizing_count(&self) -> usize {
        self.stabilizer.len()
    }

    pub fn subscribed_pid(&self) -> Option<i32> {
        self.subscribed_pid
    }

    /// 启动轮询、稳定计时和创建事件订阅。重复调用无副作用
    ///
    /// 调用方负责确认已获得辅助功能权限。
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.next_poll = None;
        self.next_stabilize = None;
        self.failed_subscription = None;
        self.refresh_subscription();
        log::info!("通知定位引擎已启动 (位置: {:?})", self.config.anchor);
    }

    /// 停止计时、清空稳定表并取消所有订阅。重复调用无副作用
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.next_poll = None;
        self.next_stabilize = None;

        for (_, entry) in self.stabilizer.snapshot() {
            self.registry.set_state(entry.window, CandidateState::Settled);
        }
        self.stabilizer.clear();
        self.pending.clear();
        self.creations.drain();

        if let Some(pid) = self.subscribed_pid.take() {
            self.backend.unsubscribe_window_created(pid);
        }
        log::info!("通知定位引擎已停止");
    }

    /// 处理配置变更
    pub fn on_config_changed(&mut self, event: ConfigEvent, now: Instant) {
        match event {
            ConfigEvent::PositionChanged(anchor) => {
                self.config.anchor = anchor;
                if self.running {
                    self.move_all(now);
                }
            }
            ConfigEvent::PaddingChanged(padding) => {
                self.config.padding = padding;
            }
            ConfigEvent::EnabledChanged(enabled) => {
                self.config.enabled = enabled;
                if enabled {
                    self.start();
                } else {
                    self.stop();
                }
            }
        }
    }

    /// 协作式循环每次迭代调用；按各自节奏驱动轮询和稳定计时
    pub fn tick(&mut self, now: Instant) {
        self.drain_config_events(now);
        if !self.running {
            return;
        }

        self.accept_creations(now);
        self.process_due_pushes(now);

        if self.next_poll.map_or(true, |due| now >= due) {
            self.poll(now);
            self.next_poll = Some(now + self.settings.poll_interval);
        }

        if self.next_stabilize.map_or(true, |due| now >= due) {
            self.stabilize(now);
            self.next_stabilize = Some(now + self.settings.stabilize_interval);
        }
    }

    fn drain_config_events(&mut self, now: Instant) {
        while let Ok(event) = self.config_events.try_recv() {
            log::debug!("收到配置事件: {:?}", event);
            self.on_config_changed(event, now);
        }
    }

    /// 强制重新扫描所有屏幕窗口并移动（权限授予或手动刷新后使用）
    pub fn move_all(&mut self, now: Instant) {
        if !self.running {
            return;
        }
        log::info!("重新扫描并移动所有通知");
        self.refresh_subscription();

        let windows = self.backend.on_screen_windows();
        for snapshot in &windows {
            self.registry.known_mut().insert(snapshot.number);
            if !self.is_candidate_window(snapshot) {
                continue;
            }
            let id = match self.registry.id_for_number(snapshot.number) {
                Some(id) => {
                    if self.registry.handle(id).is_none() {
                        if let Some(handle) = self.resolve_window_handle(snapshot) {
                            self.registry.attach_handle(id, handle);
                        }
                    }
                    id
                }
                None => match self.admit_polled(snapshot) {
                    Some(id) => id,
                    None => continue,
                },
            };
            self.observe(
                CandidateObserved {
                    window: id,
                    source: ObservationSource::Poll,
                },
                now,
            );
        }

        // 只由推送发现、还没有窗口编号的候选
        for id in self.registry.live_ids() {
            let unnumbered = self.registry.get(id).is_some_and(|c| c.number.is_none());
            if unnumbered {
                self.observe(
                    CandidateObserved {
                        window: id,
                        source: ObservationSource::Push,
                    },
                    now,
                );
            }
        }
    }

    /// 重新解析通知中心进程；进程重启（pid 变化）时重新订阅
    fn refresh_subscription(&mut self) {
        let bundle_id = self.settings.notification_bundle_id.clone();
        match self.backend.pid_for_bundle(&bundle_id) {
            Ok(pid) => {
                self.service_pid = Some(pid);
                if self.subscribed_pid == Some(pid) || self.failed_subscription == Some(pid) {
                    return;
                }
                if let Some(old) = self.subscribed_pid.take() {
                    log::info!("通知中心进程已变化 ({} → {})，重新订阅", old, pid);
                    self.backend.unsubscribe_window_created(old);
                }
                match self
                    .backend
                    .subscribe_window_created(pid, self.creations.clone())
                {
                    Ok(()) => {
                        log::info!("已订阅通知中心 (pid {}) 窗口创建事件", pid);
                        self.subscribed_pid = Some(pid);
                        self.failed_subscription = None;
                    }
                    Err(e) => {
                        log::warn!("订阅窗口创建事件失败，仅使用轮询: {}", e);
                        self.failed_subscription = Some(pid);
                    }
                }
            }
            Err(e) => {
                if self.service_pid.take().is_some() {
                    log::warn!("通知中心进程不可用: {}", e);
                } else {
                    log::debug!("未找到通知中心进程: {}", e);
                }
                if let Some(old) = self.subscribed_pid.take() {
                    self.backend.unsubscribe_window_created(old);
                }
            }
        }
    }

    /// 轮询：对比窗口列表与已知集合，处理新出现的通知形窗口
    fn poll(&mut self, now: Instant) {
        self.refresh_subscription();

        let windows = self.backend.on_screen_windows();
        for snapshot in &windows {
            // 无论是否匹配都记为已知
            if !self.registry.known_mut().insert(snapshot.number) {
                continue;
            }
            if !self.is_candidate_window(snapshot) {
                continue;
            }
            if let Some(id) = self.admit_polled(snapshot) {
                self.observe(
                    CandidateObserved {
                        window: id,
                        source: ObservationSource::Poll,
                    },
                    now,
                );
            }
        }
    }

    fn is_candidate_window(&self, snapshot: &WindowSnapshot) -> bool {
        if !NOTIFICATION_ENVELOPE.contains(snapshot.bounds.size()) {
            return false;
        }
        self.service_pid.map_or(true, |pid| pid == snapshot.owner_pid)
    }

    /// 为轮询发现的窗口分配代理 ID；已由推送登记过的窗口只补充编号
    fn admit_polled(&mut self, snapshot: &WindowSnapshot) -> Option<WindowId> {
        let handle = self.resolve_window_handle(snapshot);
        if let Some(handle) = &handle {
            if let Some(existing) = self.registry.find_by_handle(&self.backend, handle) {
                log::debug!("窗口编号 {} 已由推送登记为 {}", snapshot.number, existing);
                self.registry.link_number(existing, snapshot.number);
                return None;
            }
        }

        let id = self
            .registry
            .register_window(snapshot.number, snapshot.owner_pid, snapshot.bounds);
        match handle {
            Some(handle) => self.registry.attach_handle(id, handle),
            None => log::debug!("无法为窗口编号 {} 找到辅助功能元素", snapshot.number),
        }
        Some(id)
    }

    /// 在所属进程的窗口中按边界找到对应元素
    fn resolve_window_handle(&self, snapshot: &WindowSnapshot) -> Option<B::Element> {
        let app = self.backend.application(snapshot.owner_pid)?;
        let windows: Vec<B::Element> = self
            .backend
            .children(&app)
            .into_iter()
            .filter(|w| self.backend.role(w).as_deref() == Some("AXWindow"))
            .collect();

        let matched = windows.iter().find(|w| {
            let position = self.backend.position(w);
            let size = self.backend.size(w);
            match (position, size) {
                (Ok(p), Ok(s)) => {
                    let rect = Rect::from_origin_size(p, s);
                    (rect.x - snapshot.bounds.x).abs() <= BOUNDS_TOLERANCE
                        && (rect.y - snapshot.bounds.y).abs() <= BOUNDS_TOLERANCE
                        && (rect.width - snapshot.bounds.width).abs() <= BOUNDS_TOLERANCE
                        && (rect.height - snapshot.bounds.height).abs() <= BOUNDS_TOLERANCE
                }
                _ => false,
            }
        });

        match matched {
            Some(w) => Some(w.clone()),
            // 只有一个窗口时直接使用
            None if windows.len() == 1 => windows.into_iter().next(),
            None => None,
        }
    }

    /// 平台回调推入的新窗口，进入等待期
    fn accept_creations(&mut self, now: Instant) {
        let Some(pid) = self.subscribed_pid else {
            self.creations.drain();
            return;
        };
        let due = now + self.settings.settle_delay;
        for handle in self.creations.drain() {
            self.pending.push(PendingPush { handle, pid, due });
        }
    }

    fn process_due_pushes(&mut self, now: Instant) {
        if self.pending.is_empty() {
            return;
        }
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| now >= p.due);
        self.pending = waiting;

        for push in due {
            if let Some(id) = self.admit_pushed(push.handle, push.pid) {
                self.observe(
                    CandidateObserved {
                        window: id,
                        source: ObservationSource::Push,
                    },
                    now,
                );
            }
        }
    }

    fn admit_pushed(&mut self, handle: B::Element, pid: i32) -> Option<WindowId> {
        if self.registry.find_by_handle(&self.backend, &handle).is_some() {
            return None;
        }
        let size = match size_with_retry(&self.backend, &handle, self.settings.size_retry) {
            Ok(size) => size,
            Err(e) => {
                log::debug!("新窗口尺寸不可用，跳过: {}", e);
                return None;
            }
        };
        if !NOTIFICATION_ENVELOPE.contains(size) {
            log::trace!("新窗口尺寸 {:.0}x{:.0} 不像通知", size.width, size.height);
            return None;
        }
        let origin = self.backend.position(&handle).unwrap_or_default();
        Some(
            self.registry
                .register_handle(handle, pid, Rect::from_origin_size(origin, size)),
        )
    }

    /// 两个来源汇合处
    fn observe(&mut self, observed: CandidateObserved, now: Instant) {
        log::debug!(
            "候选窗口 {} (来源: {:?})",
            observed.window,
            observed.source
        );
        self.process_candidate(observed.window, now);
    }

    /// 定位内容节点并移动；首次生效后登记到稳定表
    fn process_candidate(&mut self, id: WindowId, now: Instant) {
        let Some(window) = self.registry.handle(id).cloned() else {
            return;
        };
        let Some(located) = self.locate(&window) else {
            return;
        };
        if self.registry.state(id) == Some(CandidateState::Detected) {
            self.registry.set_state(id, CandidateState::Located);
        }

        let content = located.element.clone();
        let outcome = match self.move_content(&window, &content) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::debug!("候选窗口 {} 移动失败: {}", id, e);
                return;
            }
        };

        match outcome {
            MoveOutcome::UnsupportedAnchor => {
                log::warn!("位置 {:?} 尚未支持，跳过移动", self.config.anchor);
            }
            MoveOutcome::Failed(e) => {
                log::debug!("候选窗口 {} 移动失败: {}", id, e);
            }
            applied => {
                if let MoveOutcome::Moved { .. } = applied {
                    log::info!("通知窗口 {} 已移动到 {:?}", id, self.config.anchor);
                }
                self.registry.set_state(id, CandidateState::Moved);
                if self.stabilizer.register(&self.backend, content, id, now)
                    || self.stabilizer.has_window(id)
                {
                    self.registry.set_state(id, CandidateState::Stabilizing);
                }
            }
        }
    }

    fn locate(&self, window: &B::Element) -> Option<Located<B::Element>> {
        match locator::find_content_element(&self.backend, window, &self.settings.locator) {
            Some(located) => {
                log::debug!("定位策略: {:?}, 深度 {}", located.strategy, located.depth);
                locator::log_element_details(&self.backend, &located.element, "内容节点");
                Some(located)
            }
            None => {
                let subroles =
                    locator::collect_subroles(&self.backend, window, self.settings.locator.max_depth);
                log::debug!("未找到通知内容节点，子树中的 subrole: {:?}", subroles);
                if log::log_enabled!(log::Level::Trace) {
                    log::trace!(
                        "元素层级:\n{}",
                        locator::dump_hierarchy(&self.backend, window, self.settings.locator.max_depth)
                    );
                }
                None
            }
        }
    }

    /// 读取最新的屏幕和尺寸后执行一次移动
    fn move_content(
        &self,
        window: &B::Element,
        content: &B::Element,
    ) -> Result<MoveOutcome, AccessError> {
        let geometry = self
            .backend
            .main_screen()
            .ok_or(AccessError::AttributeUnavailable { attribute: "screen" })?;
        let content_size = size_with_retry(&self.backend, content, self.settings.size_retry)?;
        let anchor = self.config.anchor;

        Ok(mover::apply_move(
            &self.backend,
            &MoveRequest {
                window,
                content,
                content_size,
                anchor,
                padding: self.config.padding_for(anchor),
                geometry: &geometry,
                verify: self.settings.verify_moves,
            },
        ))
    }

    /// 稳定计时：过期的移除，其余重新定位并移动
    fn stabilize(&mut self, now: Instant) {
        for window in self.stabilizer.expire(now) {
            if !self.stabilizer.has_window(window) {
                self.registry.set_state(window, CandidateState::Settled);
            }
        }

        for (content, entry) in self.stabilizer.snapshot() {
            if size_with_retry(&self.backend, &content, self.settings.size_retry).is_err() {
                log::debug!("通知 {} 已消失，停止稳定", entry.window);
                self.stabilizer.remove(&self.backend, &content);
                if !self.stabilizer.has_window(entry.window) {
                    self.registry.set_state(entry.window, CandidateState::Expired);
                }
                continue;
            }

            let Some(window) = self.registry.handle(entry.window).cloned() else {
                self.stabilizer.remove(&self.backend, &content);
                continue;
            };
            let target = self
                .locate(&window)
                .map(|l| l.element)
                .unwrap_or(content);
            match self.move_content(&window, &target) {
                Ok(MoveOutcome::Moved { delta, .. }) => {
                    log::debug!(
                        "稳定期内修正通知 {} 位置 ({:.0},{:.0})",
                        entry.window,
                        delta.x,
                        delta.y
                    );
                }
                Ok(_) => {}
                Err(e) => log::trace!("稳定期移动失败: {}", e),
            }
        }
    }
}
