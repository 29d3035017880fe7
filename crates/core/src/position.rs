use serde::{Deserialize, Serialize};

use crate::{Point, ScreenGeometry, Size};

/// 通知目标位置
///
/// 模型定义了九宫格，但目前只有四个角实现了计算策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnchorPosition {
    TopLeft,
    TopMiddle,
    #[default]
    TopRight,
    MiddleLeft,
    DeadCenter,
    MiddleRight,
    BottomLeft,
    BottomMiddle,
    BottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Horizontal {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vertical {
    Top,
    Bottom,
}

impl AnchorPosition {
    pub const ALL: [AnchorPosition; 9] = [
        AnchorPosition::TopLeft,
        AnchorPosition::TopMiddle,
        AnchorPosition::TopRight,
        AnchorPosition::MiddleLeft,
        AnchorPosition::DeadCenter,
        AnchorPosition::MiddleRight,
        AnchorPosition::BottomLeft,
        AnchorPosition::BottomMiddle,
        AnchorPosition::BottomRight,
    ];

    pub fn is_corner(&self) -> bool {
        self.corner().is_some()
    }

    fn corner(&self) -> Option<(Horizontal, Vertical)> {
        match self {
            AnchorPosition::TopLeft => Some((Horizontal::Left, Vertical::Top)),
            AnchorPosition::TopRight => Some((Horizontal::Right, Vertical::Top)),
            AnchorPosition::BottomLeft => Some((Horizontal::Left, Vertical::Bottom)),
            AnchorPosition::BottomRight => Some((Horizontal::Right, Vertical::Bottom)),
            _ => None,
        }
    }
}

/// 计算通知在窗口坐标系（原点左上角）中的目标位置
///
/// 纯函数：结果只取决于参数。非四角位置返回 `None`。
pub fn target_position(
    anchor: AnchorPosition,
    element: Size,
    padding: f64,
    geometry: &ScreenGeometry,
) -> Option<Point> {
    let (horizontal, vertical) = anchor.corner()?;

    let x = match horizontal {
        Horizontal::Left => geometry.safe_left() + padding,
        Horizontal::Right => geometry.safe_right() - element.width - padding,
    };
    let y = match vertical {
        Vertical::Top => geometry.safe_top() + padding,
        Vertical::Bottom => geometry.safe_bottom() - element.height - padding,
    };

    Some(Point::new(x, y))
}
