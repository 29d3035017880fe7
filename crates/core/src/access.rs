//! 平台边界：引擎通过这里的 trait 访问辅助功能元素、窗口列表、进程和屏幕。
//!
//! 线程约定：除 [`CreationQueue::push`] 外，所有方法只能在引擎所在的
//! 协作式循环线程上调用。平台回调若在其他执行上下文触发，必须先把元素
//! 推入 [`CreationQueue`]，由引擎在下一个 tick 取出处理。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{Point, Rect, ScreenGeometry, Size};

/// 平台元素访问错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AccessError {
    #[error("属性不可用: {attribute}")]
    AttributeUnavailable { attribute: &'static str },

    #[error("写入属性 {attribute} 失败 (code={code})")]
    AttributeWriteFailed { attribute: &'static str, code: i32 },

    #[error("元素已失效")]
    InvalidElement,

    #[error("为进程 {pid} 创建观察者失败 (code={code})")]
    ObserverFailed { pid: i32, code: i32 },

    #[error("未找到进程: {bundle_id}")]
    ProcessNotFound { bundle_id: String },
}

/// 字符串类属性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAttribute {
    Role,
    Subrole,
    Identifier,
    Title,
}

/// UI 元素读写接口（macOS 上对应 AXUIElement）
pub trait ElementAccess {
    /// 不透明的元素句柄
    type Element: Clone;

    fn position(&self, element: &Self::Element) -> Result<Point, AccessError>;

    fn set_position(&self, element: &Self::Element, position: Point) -> Result<(), AccessError>;

    /// 单次尺寸查询，不重试。引擎统一通过 [`size_with_retry`] 调用
    fn size(&self, element: &Self::Element) -> Result<Size, AccessError>;

    /// position 属性当前是否可写
    fn is_position_settable(&self, element: &Self::Element) -> bool;

    fn text(&self, element: &Self::Element, attribute: TextAttribute) -> Option<String>;

    fn children(&self, element: &Self::Element) -> Vec<Self::Element>;

    /// 通过进程 ID 构造应用根元素
    fn application(&self, pid: i32) -> Option<Self::Element>;

    /// 元素身份哈希。不同的句柄值可能指向同一个底层对象，哈希必须一致
    fn identity_hash(&self, element: &Self::Element) -> u64;

    /// 两个句柄是否指向同一个底层对象
    fn same_element(&self, a: &Self::Element, b: &Self::Element) -> bool;

    fn role(&self, element: &Self::Element) -> Option<String> {
        self.text(element, TextAttribute::Role)
    }

    fn subrole(&self, element: &Self::Element) -> Option<String> {
        self.text(element, TextAttribute::Subrole)
    }

    fn identifier(&self, element: &Self::Element) -> Option<String> {
        self.text(element, TextAttribute::Identifier)
    }

    fn title(&self, element: &Self::Element) -> Option<String> {
        self.text(element, TextAttribute::Title)
    }
}

/// 尺寸查询重试策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 首次失败后的额外重试次数
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            backoff: Duration::from_millis(10),
        }
    }
}

/// 查询元素尺寸；新创建的窗口可能还没提交几何信息，失败时短暂退避重试
pub fn size_with_retry<A: ElementAccess + ?Sized>(
    access: &A,
    element: &A::Element,
    policy: RetryPolicy,
) -> Result<Size, AccessError> {
    let mut attempt = 0;
    loop {
        match access.size(element) {
            Ok(size) => return Ok(size),
            Err(e) if attempt >= policy.retries => return Err(e),
            Err(e) => {
                attempt += 1;
                log::trace!("尺寸查询失败，第 {} 次重试: {}", attempt, e);
                if !policy.backoff.is_zero() {
                    std::thread::sleep(policy.backoff);
                }
            }
        }
    }
}

/// 屏幕上的一个窗口（来自窗口列表快照）
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSnapshot {
    /// 系统窗口编号
    pub number: u32,
    pub owner_pid: i32,
    pub layer: i32,
    /// 窗口坐标系（原点左上角）
    pub bounds: Rect,
}

/// 窗口枚举：返回屏幕上的非桌面级窗口
pub trait WindowSource {
    fn on_screen_windows(&self) -> Vec<WindowSnapshot>;
}

/// 进程目录：bundle/service 标识 → 进程 ID
pub trait ProcessDirectory {
    fn pid_for_bundle(&self, bundle_id: &str) -> Result<i32, AccessError>;
}

/// 主屏幕几何信息，每次调用都重新读取
pub trait ScreenSource {
    fn main_screen(&self) -> Option<ScreenGeometry>;
}

/// 跨线程交接队列：平台回调往里推，引擎在自己的循环里取
pub struct CreationQueue<E> {
    inner: Arc<Mutex<VecDeque<E>>>,
}

impl<E> Clone for CreationQueue<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for CreationQueue<E> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
        }
    }
}

impl<E> CreationQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 可以在任意线程调用
    pub fn push(&self, element: E) {
        match self.inner.lock() {
            Ok(mut queue) => queue.push_back(element),
            Err(poisoned) => poisoned.into_inner().push_back(element),
        }
    }

    /// 取出全部待处理元素
    pub fn drain(&self) -> Vec<E> {
        match self.inner.lock() {
            Ok(mut queue) => queue.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// "窗口已创建"事件订阅，按进程 ID 注册
pub trait CreationEvents: ElementAccess {
    /// 订阅 pid 下的窗口创建事件，新窗口元素会被推入 queue
    fn subscribe_window_created(
        &mut self,
        pid: i32,
        queue: CreationQueue<Self::Element>,
    ) -> Result<(), AccessError>;

    fn unsubscribe_window_created(&mut self, pid: i32);
}

/// 引擎需要的全部平台能力
pub trait Backend:
    ElementAccess + CreationEvents + WindowSource + ProcessDirectory + ScreenSource
{
}

impl<T> Backend for T where
    T: ElementAccess + CreationEvents + WindowSource + ProcessDirectory + ScreenSource
{
}
