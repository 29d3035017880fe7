pub mod access;
pub mod config;
pub mod engine;
pub mod locator;
pub mod mover;
pub mod position;
pub mod registry;
pub mod stabilizer;

#[cfg(test)]
pub(crate) mod fake;

/// 二维坐标点
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// 两点之间的位移（self - other）
    pub fn delta_from(&self, other: Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn offset(&self, delta: Point) -> Point {
        Point::new(self.x + delta.x, self.y + delta.y)
    }

    /// 两个分量是否都在容差范围内
    pub fn within(&self, other: Point, tolerance: f64) -> bool {
        (self.x - other.x).abs() < tolerance && (self.y - other.y).abs() < tolerance
    }
}

/// 二维尺寸
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// 宽高是否都落在闭区间内
    pub fn fits(&self, width: (f64, f64), height: (f64, f64)) -> bool {
        self.width >= width.0
            && self.width <= width.1
            && self.height >= height.0
            && self.height <= height.1
    }
}

/// 矩形区域
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_origin_size(origin: Point, size: Size) -> Self {
        Self::new(origin.x, origin.y, size.width, size.height)
    }

    pub fn min_x(&self) -> f64 {
        self.x
    }

    pub fn min_y(&self) -> f64 {
        self.y
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// 另一个矩形是否完全包含在当前矩形内
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.min_x() >= self.min_x()
            && other.max_x() <= self.max_x()
            && other.min_y() >= self.min_y()
            && other.max_y() <= self.max_y()
    }
}

/// 屏幕几何信息（每次计算时重新获取，不缓存）
///
/// 两个矩形都使用可见区域坐标系：原点在左下角，y 轴向上。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenGeometry {
    /// 显示器完整区域（包含菜单栏/Dock）
    pub full_frame: Rect,
    /// 可用区域（排除菜单栏/Dock）
    pub visible_frame: Rect,
}

impl ScreenGeometry {
    pub fn new(full_frame: Rect, visible_frame: Rect) -> Self {
        Self {
            full_frame,
            visible_frame,
        }
    }

    /// 从物理顶部到安全区顶部的距离（窗口坐标系）
    pub fn safe_top(&self) -> f64 {
        self.full_frame.height - self.visible_frame.max_y()
    }

    /// 从物理顶部到安全区底部的距离（窗口坐标系）
    pub fn safe_bottom(&self) -> f64 {
        self.full_frame.height - self.visible_frame.min_y()
    }

    pub fn safe_left(&self) -> f64 {
        self.visible_frame.min_x()
    }

    pub fn safe_right(&self) -> f64 {
        self.visible_frame.max_x()
    }

    /// 安全区在窗口坐标系（原点左上角，y 轴向下）中的矩形
    pub fn safe_area(&self) -> Rect {
        Rect::new(
            self.safe_left(),
            self.safe_top(),
            self.visible_frame.width,
            self.safe_bottom() - self.safe_top(),
        )
    }

    /// 完整显示器在窗口坐标系中的矩形
    pub fn full_area(&self) -> Rect {
        Rect::new(
            self.full_frame.min_x(),
            0.0,
            self.full_frame.width,
            self.full_frame.height,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_area_with_menu_bar() {
        let geometry = ScreenGeometry::new(
            Rect::new(0.0, 0.0, 1440.0, 900.0),
            Rect::new(0.0, 0.0, 1440.0, 875.0),
        );
        assert_eq!(geometry.safe_top(), 25.0);
        assert_eq!(geometry.safe_bottom(), 900.0);
        assert_eq!(geometry.safe_area(), Rect::new(0.0, 25.0, 1440.0, 875.0));
    }

    #[test]
    fn test_safe_area_with_dock() {
        // 菜单栏 25，底部 Dock 70
        let geometry = ScreenGeometry::new(
            Rect::new(0.0, 0.0, 1440.0, 900.0),
            Rect::new(0.0, 70.0, 1440.0, 805.0),
        );
        assert_eq!(geometry.safe_top(), 25.0);
        assert_eq!(geometry.safe_bottom(), 830.0);
    }

    #[test]
    fn test_size_fits() {
        let size = Size::new(360.0, 70.0);
        assert!(size.fits((200.0, 800.0), (60.0, 200.0)));
        assert!(!size.fits((400.0, 800.0), (60.0, 200.0)));
        assert!(Size::new(200.0, 60.0).fits((200.0, 800.0), (60.0, 200.0)));
    }

    #[test]
    fn test_point_within() {
        let a = Point::new(10.0, 10.0);
        assert!(a.within(Point::new(10.5, 9.6), 1.0));
        assert!(!a.within(Point::new(11.0, 10.0), 1.0));
    }
}
