use crate::access::{AccessError, ElementAccess};
use crate::locator;
use crate::position::{self, AnchorPosition};
use crate::{Point, ScreenGeometry, Size};

/// 位移小于 1px 时不再写入，避免抖动
const MOVE_THRESHOLD: f64 = 1.0;
/// 写入后校验允许的误差
pub const VERIFY_TOLERANCE: f64 = 2.0;

/// 一次移动的输入
#[derive(Debug, Clone)]
pub struct MoveRequest<'a, E> {
    pub window: &'a E,
    pub content: &'a E,
    pub content_size: Size,
    pub anchor: AnchorPosition,
    pub padding: f64,
    pub geometry: &'a ScreenGeometry,
    pub verify: bool,
}

/// 移动结果
#[derive(Debug, Clone, PartialEq)]
pub enum MoveOutcome {
    Moved { target: Point, delta: Point },
    AlreadyInPlace,
    UnsupportedAnchor,
    Failed(AccessError),
}

impl MoveOutcome {
    /// 位置已经生效（刚写入或本来就对）
    pub fn is_applied(&self) -> bool {
        matches!(self, MoveOutcome::Moved { .. } | MoveOutcome::AlreadyInPlace)
    }
}

/// 按位移量移动通知
///
/// 可写的 position 通常在外层窗口上，而要对齐的是内部内容节点，两者之间没有
/// 可靠的偏移量，所以分别读取位置，把内容节点需要的位移加到可写句柄上。
pub fn apply_move<A: ElementAccess>(access: &A, request: &MoveRequest<'_, A::Element>) -> MoveOutcome {
    let Some(target) = position::target_position(
        request.anchor,
        request.content_size,
        request.padding,
        request.geometry,
    ) else {
        return MoveOutcome::UnsupportedAnchor;
    };

    let handle = locator::positionable_element(access, request.window, request.content);

    let banner_pos = match access.position(request.content) {
        Ok(p) => p,
        Err(e) => return MoveOutcome::Failed(e),
    };
    let handle_pos = match access.position(&handle) {
        Ok(p) => p,
        Err(e) => return MoveOutcome::Failed(e),
    };

    let delta = target.delta_from(banner_pos);
    if delta.within(Point::default(), MOVE_THRESHOLD) {
        return MoveOutcome::AlreadyInPlace;
    }

    let new_pos = handle_pos.offset(delta);
    if let Err(e) = access.set_position(&handle, new_pos) {
        log::debug!("写入位置失败: {}", e);
        return MoveOutcome::Failed(e);
    }

    log::debug!(
        "通知已移动: ({:.0},{:.0}) → ({:.0},{:.0})",
        banner_pos.x,
        banner_pos.y,
        target.x,
        target.y
    );

    // 不一致只记录，由稳定循环负责重试
    if request.verify && !verify_position(access, request.content, target) {
        log::warn!("移动后位置与目标不一致: 目标 ({:.0},{:.0})", target.x, target.y);
    }

    MoveOutcome::Moved { target, delta }
}

/// 重新读取元素位置，检查是否在目标 2px 以内
pub fn verify_position<A: ElementAccess>(access: &A, element: &A::Element, expected: Point) -> bool {
    match access.position(element) {
        Ok(actual) => {
            let ok = actual.within(expected, VERIFY_TOLERANCE + f64::EPSILON);
            if !ok {
                log::debug!(
                    "位置校验: 实际 ({:.1},{:.1}) 目标 ({:.1},{:.1})",
                    actual.x,
                    actual.y,
                    expected.x,
                    expected.y
                );
            }
            ok
        }
        Err(e) => {
            log::debug!("位置校验读取失败: {}", e);
            false
        }
    }
}
