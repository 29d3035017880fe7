pub mod element;
pub mod observer;
pub mod process;
pub mod screen;
pub mod window_list;

use anyhow::Result;

use notimover_core::access::{AccessError, CreationEvents, CreationQueue};

use crate::PermissionChecker;

pub use element::MacElement;

/// macOS 平台实现：辅助功能元素、窗口列表、进程、屏幕和创建事件
pub struct MacPlatform {
    observers: observer::ObserverSet,
}

impl Default for MacPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MacPlatform {
    pub fn new() -> Self {
        Self {
            observers: observer::ObserverSet::new(),
        }
    }

    /// 静默检查是否已授予辅助功能权限（不弹出系统提示框）
    pub fn check_accessibility_permissions(&self) -> bool {
        unsafe {
            extern "C" {
                fn AXIsProcessTrusted() -> bool;
            }
            AXIsProcessTrusted()
        }
    }

    /// 请求辅助功能权限（会弹出系统提示框引导用户授权）
    pub fn request_accessibility_permissions(&self) {
        use core_foundation::base::TCFType;
        use core_foundation::boolean::CFBoolean;
        use core_foundation::dictionary::CFDictionary;
        use core_foundation::string::CFString;

        unsafe {
            let key = CFString::new("AXTrustedCheckOptionPrompt");
            let value = CFBoolean::true_value();
            let options = CFDictionary::from_CFType_pairs(&[(key.as_CFType(), value.as_CFType())]);

            extern "C" {
                fn AXIsProcessTrustedWithOptions(options: core_foundation::base::CFTypeRef) -> bool;
            }

            // 传入 Prompt=true，系统会弹出授权引导对话框
            AXIsProcessTrustedWithOptions(options.as_concrete_TypeRef() as _);
        }
    }
}

impl PermissionChecker for MacPlatform {
    fn check_permissions(&self) -> bool {
        self.check_accessibility_permissions()
    }

    fn request_permissions(&self) -> Result<()> {
        self.request_accessibility_permissions();
        Ok(())
    }
}

impl CreationEvents for MacPlatform {
    fn subscribe_window_created(
        &mut self,
        pid: i32,
        queue: CreationQueue<MacElement>,
    ) -> Result<(), AccessError> {
        self.observers.subscribe(pid, queue)
    }

    fn unsubscribe_window_created(&mut self, pid: i32) {
        self.observers.unsubscribe(pid);
    }
}
