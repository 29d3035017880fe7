#![allow(unexpected_cfgs)]

use anyhow::Result;

pub use notimover_core::access::{
    AccessError, Backend, CreationEvents, CreationQueue, ElementAccess, ProcessDirectory,
    ScreenSource, WindowSnapshot, WindowSource,
};

/// 权限检查 trait
pub trait PermissionChecker {
    /// 静默检查是否已获得辅助功能权限
    fn check_permissions(&self) -> bool;

    /// 请求权限（弹出系统授权引导）
    fn request_permissions(&self) -> Result<()>;
}

// 平台实现模块
#[cfg(target_os = "macos")]
pub mod macos;

// 平台工厂函数
#[cfg(target_os = "macos")]
pub fn create_platform() -> macos::MacPlatform {
    macos::MacPlatform::new()
}
