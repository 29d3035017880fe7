//! 在通知窗口的元素树中查找可移动的内容节点
//!
//! 主策略是带评分的深度优先搜索；找不到时按固定顺序尝试一组回退策略。

use std::collections::{BTreeSet, VecDeque};
use std::fmt::Write as _;

use crate::access::{AccessError, ElementAccess};
use crate::Size;

/// 宽高区间（闭区间）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub width: (f64, f64),
    pub height: (f64, f64),
}

impl Envelope {
    pub const fn new(width: (f64, f64), height: (f64, f64)) -> Self {
        Self { width, height }
    }

    pub fn contains(&self, size: Size) -> bool {
        size.fits(self.width, self.height)
    }
}

/// 通知横幅的大致尺寸范围，窗口检测和主策略共用
pub const NOTIFICATION_ENVELOPE: Envelope = Envelope::new((200.0, 800.0), (60.0, 200.0));
/// 常见横幅尺寸，命中加分
const TYPICAL_ENVELOPE: Envelope = Envelope::new((300.0, 450.0), (55.0, 85.0));
const ROLE_ENVELOPE: Envelope = Envelope::new((300.0, 800.0), (60.0, 300.0));
const LOOSE_ROLE_ENVELOPE: Envelope = Envelope::new((280.0, 800.0), (50.0, 300.0));
const DEEPEST_ENVELOPE: Envelope = Envelope::new((280.0, 800.0), (0.0, 300.0));
const LAST_RESORT_ENVELOPE: Envelope = Envelope::new((250.0, 600.0), (40.0, 200.0));

/// 超过这个尺寸的窗口视为常驻面板，而不是临时横幅
const PANEL_MIN_WIDTH: f64 = 600.0;
const PANEL_MIN_HEIGHT: f64 = 300.0;

const DEPTH_WEIGHT: i64 = 100;
const SPECIFIC_SUBROLE_BONUS: i64 = 50;
const TYPICAL_SIZE_BONUS: i64 = 30;

/// 查找参数
#[derive(Debug, Clone)]
pub struct LocatorSettings {
    /// 候选节点必须具有的 subrole
    pub target_subroles: Vec<String>,
    /// 明确属于通知的 subrole，额外加分
    pub specific_subroles: Vec<String>,
    /// 回退策略 1 使用的 identifier
    pub fallback_identifier: String,
    /// 回退策略 4 接受的 role
    pub fallback_roles: Vec<String>,
    pub max_depth: usize,
    pub identifier_max_depth: usize,
}

impl Default for LocatorSettings {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            target_subroles: strings(&[
                "AXNotificationCenterBanner",
                "AXNotificationCenterAlert",
                "AXNotificationCenterBannerStack",
                "AXNotificationCenterAlertStack",
                "AXNotificationCenterBannerWindow",
            ]),
            specific_subroles: strings(&["AXNotificationCenterBanner", "AXNotificationCenterAlert"]),
            fallback_identifier: "notificationCenterBanner".to_string(),
            fallback_roles: strings(&["AXGroup", "AXScrollArea", "AXLayoutArea", "AXSplitGroup"]),
            max_depth: 15,
            identifier_max_depth: 10,
        }
    }
}

/// 找到内容节点所用的策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Scored { score: i64 },
    Identifier,
    GroupRole,
    ScrollAreaRole,
    FallbackRole,
    DeepestSized,
    LastResort,
}

/// 查找结果
#[derive(Debug, Clone)]
pub struct Located<E> {
    pub element: E,
    pub size: Size,
    pub depth: usize,
    pub strategy: Strategy,
}

/// 先用评分搜索，失败后依次尝试回退策略
pub fn find_content_element<A: ElementAccess>(
    access: &A,
    root: &A::Element,
    settings: &LocatorSettings,
) -> Option<Located<A::Element>> {
    if let Some(found) = find_scored(access, root, settings) {
        return Some(found);
    }
    log::debug!("评分搜索未命中，尝试回退策略");
    find_fallback(access, root, settings)
}

/// 评分深度优先搜索
///
/// 分数 = 深度 * 100 + 特定 subrole 50 + 常见尺寸 30。同分时先遍历到的胜出。
/// 节点是否命中都会继续搜索子节点，真正的内容通常嵌在容器下面。
pub fn find_scored<A: ElementAccess>(
    access: &A,
    root: &A::Element,
    settings: &LocatorSettings,
) -> Option<Located<A::Element>> {
    let mut best: Option<Located<A::Element>> = None;
    let mut stack = vec![(root.clone(), 0usize)];

    while let Some((element, depth)) = stack.pop() {
        if let Some((score, size)) = score_candidate(access, &element, depth, settings) {
            let better = best.as_ref().map_or(true, |b| match b.strategy {
                Strategy::Scored { score: current } => score > current,
                _ => true,
            });
            if better {
                best = Some(Located {
                    element: element.clone(),
                    size,
                    depth,
                    strategy: Strategy::Scored { score },
                });
            }
        }

        if depth < settings.max_depth {
            push_children(access, &element, depth, &mut stack);
        }
    }

    best
}

fn score_candidate<A: ElementAccess>(
    access: &A,
    element: &A::Element,
    depth: usize,
    settings: &LocatorSettings,
) -> Option<(i64, Size)> {
    let subrole = access.subrole(element)?;
    if !settings.target_subroles.iter().any(|s| *s == subrole) {
        return None;
    }
    let size = access.size(element).ok()?;
    if !NOTIFICATION_ENVELOPE.contains(size) {
        return None;
    }

    let mut score = depth as i64 * DEPTH_WEIGHT;
    if settings.specific_subroles.iter().any(|s| *s == subrole) {
        score += SPECIFIC_SUBROLE_BONUS;
    }
    if TYPICAL_ENVELOPE.contains(size) {
        score += TYPICAL_SIZE_BONUS;
    }
    Some((score, size))
}

// 逆序压栈，保证弹出顺序与子节点顺序一致（先序遍历）
fn push_children<A: ElementAccess>(
    access: &A,
    element: &A::Element,
    depth: usize,
    stack: &mut Vec<(A::Element, usize)>,
) {
    let children = access.children(element);
    stack.extend(children.into_iter().rev().map(|c| (c, depth + 1)));
}

/// 回退策略，按顺序尝试，每一步返回各自遍历中的第一个匹配
pub fn find_fallback<A: ElementAccess>(
    access: &A,
    root: &A::Element,
    settings: &LocatorSettings,
) -> Option<Located<A::Element>> {
    let identifier = settings.fallback_identifier.as_str();
    if let Some(found) = first_preorder(access, root, settings.identifier_max_depth, |el, _| {
        access.identifier(el).as_deref() == Some(identifier)
    }) {
        return Some(located(access, found, Strategy::Identifier));
    }

    if let Some(found) = first_preorder(access, root, settings.max_depth, |el, size| {
        access.role(el).as_deref() == Some("AXGroup")
            && size.is_some_and(|s| ROLE_ENVELOPE.contains(s))
    }) {
        return Some(located(access, found, Strategy::GroupRole));
    }

    if let Some(found) = first_preorder(access, root, settings.max_depth, |el, size| {
        access.role(el).as_deref() == Some("AXScrollArea")
            && size.is_some_and(|s| ROLE_ENVELOPE.contains(s))
    }) {
        return Some(located(access, found, Strategy::ScrollAreaRole));
    }

    if let Some(found) = first_preorder(access, root, settings.max_depth, |el, size| {
        access
            .role(el)
            .is_some_and(|role| settings.fallback_roles.iter().any(|r| *r == role))
            && size.is_some_and(|s| LOOSE_ROLE_ENVELOPE.contains(s))
    }) {
        return Some(located(access, found, Strategy::FallbackRole));
    }

    if let Some(found) = deepest_sized(access, root, settings.max_depth) {
        return Some(located(access, found, Strategy::DeepestSized));
    }

    if let Some(found) = first_breadth_first(access, root, settings.max_depth) {
        return Some(located(access, found, Strategy::LastResort));
    }

    None
}

fn located<A: ElementAccess>(
    access: &A,
    found: (A::Element, usize),
    strategy: Strategy,
) -> Located<A::Element> {
    let (element, depth) = found;
    let size = access.size(&element).unwrap_or_default();
    Located {
        element,
        size,
        depth,
        strategy,
    }
}

fn first_preorder<A, F>(
    access: &A,
    root: &A::Element,
    max_depth: usize,
    matches: F,
) -> Option<(A::Element, usize)>
where
    A: ElementAccess,
    F: Fn(&A::Element, Option<Size>) -> bool,
{
    let mut stack = vec![(root.clone(), 0usize)];
    while let Some((element, depth)) = stack.pop() {
        let size = access.size(&element).ok();
        if matches(&element, size) {
            return Some((element, depth));
        }
        if depth < max_depth {
            push_children(access, &element, depth, &mut stack);
        }
    }
    None
}

/// 满足宽松尺寸条件的最深节点，深度优先于其他属性
fn deepest_sized<A: ElementAccess>(
    access: &A,
    root: &A::Element,
    max_depth: usize,
) -> Option<(A::Element, usize)> {
    let mut best: Option<(A::Element, usize)> = None;
    let mut stack = vec![(root.clone(), 0usize)];
    while let Some((element, depth)) = stack.pop() {
        let fits = access
            .size(&element)
            .is_ok_and(|s| DEEPEST_ENVELOPE.contains(s));
        if fits && best.as_ref().map_or(true, |(_, d)| depth > *d) {
            best = Some((element.clone(), depth));
        }
        if depth < max_depth {
            push_children(access, &element, depth, &mut stack);
        }
    }
    best
}

/// 最后手段：自顶向下逐层找第一个尺寸合适的节点
fn first_breadth_first<A: ElementAccess>(
    access: &A,
    root: &A::Element,
    max_depth: usize,
) -> Option<(A::Element, usize)> {
    let mut queue = VecDeque::from([(root.clone(), 0usize)]);
    while let Some((element, depth)) = queue.pop_front() {
        if access
            .size(&element)
            .is_ok_and(|s| LAST_RESORT_ENVELOPE.contains(s))
        {
            return Some((element, depth));
        }
        if depth < max_depth {
            queue.extend(access.children(&element).into_iter().map(|c| (c, depth + 1)));
        }
    }
    None
}

/// 决定位置写入哪个句柄：外层窗口还是内部内容节点
///
/// 尺寸超过 600x300 的窗口是常驻面板，永远不选它。
pub fn positionable_element<A: ElementAccess>(
    access: &A,
    window: &A::Element,
    content: &A::Element,
) -> A::Element {
    let is_panel = access
        .size(window)
        .is_ok_and(|s| s.width > PANEL_MIN_WIDTH && s.height > PANEL_MIN_HEIGHT);
    if is_panel {
        log::debug!("窗口尺寸过大，视为常驻面板，改用内容节点");
        return content.clone();
    }

    if access.is_position_settable(window) {
        return window.clone();
    }
    if !access.is_position_settable(content) {
        log::debug!("窗口和内容节点的 position 都不可写，仍尝试内容节点");
    }
    content.clone()
}

/// 记录节点详情
pub fn log_element_details<A: ElementAccess>(access: &A, element: &A::Element, label: &str) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    log::debug!(
        "{}: role={:?} subrole={:?} identifier={:?} size={}",
        label,
        access.role(element),
        access.subrole(element),
        access.identifier(element),
        describe_size(access.size(element)),
    );
}

fn describe_size(size: Result<Size, AccessError>) -> String {
    match size {
        Ok(s) => format!("{:.0}x{:.0}", s.width, s.height),
        Err(_) => "?".to_string(),
    }
}

/// 收集子树中出现过的所有 subrole
pub fn collect_subroles<A: ElementAccess>(
    access: &A,
    root: &A::Element,
    max_depth: usize,
) -> BTreeSet<String> {
    let mut subroles = BTreeSet::new();
    let mut stack = vec![(root.clone(), 0usize)];
    while let Some((element, depth)) = stack.pop() {
        if let Some(subrole) = access.subrole(&element) {
            subroles.insert(subrole);
        }
        if depth < max_depth {
            push_children(access, &element, depth, &mut stack);
        }
    }
    subroles
}

/// 以缩进文本输出子树，用于诊断未知的通知布局
pub fn dump_hierarchy<A: ElementAccess>(access: &A, root: &A::Element, max_depth: usize) -> String {
    let mut out = String::new();
    let mut stack = vec![(root.clone(), 0usize)];
    while let Some((element, depth)) = stack.pop() {
        let _ = write!(
            out,
            "{}{}",
            "  ".repeat(depth),
            access.role(&element).unwrap_or_else(|| "?".to_string())
        );
        if let Some(subrole) = access.subrole(&element) {
            let _ = write!(out, " subrole={}", subrole);
        }
        if let Some(identifier) = access.identifier(&element) {
            let _ = write!(out, " id={}", identifier);
        }
        if let Some(title) = access.title(&element) {
            let _ = write!(out, " title={:?}", title);
        }
        let _ = writeln!(out, " size={}", describe_size(access.size(&element)));

        if depth < max_depth {
            push_children(access, &element, depth, &mut stack);
        }
    }
    out
}
