#![allow(deprecated)] // cocoa crate fields are deprecated in favor of objc2-foundation

use cocoa::base::{id, nil};
use cocoa::foundation::{NSAutoreleasePool, NSRect, NSUInteger};
use objc::*;

use notimover_core::access::ScreenSource;
use notimover_core::{Rect, ScreenGeometry};

use super::MacPlatform;

fn to_rect(frame: NSRect) -> Rect {
    Rect::new(frame.origin.x, frame.origin.y, frame.size.width, frame.size.height)
}

impl ScreenSource for MacPlatform {
    /// 主屏幕的 frame 和 visibleFrame
    ///
    /// 保持 NSScreen 原始坐标（原点左下角），由 ScreenGeometry 换算安全区。
    /// 每次调用都重新读取，Dock 和菜单栏可能随时变化。
    fn main_screen(&self) -> Option<ScreenGeometry> {
        unsafe {
            let pool = NSAutoreleasePool::new(nil);
            let screens: id = msg_send![class!(NSScreen), screens];
            let count: NSUInteger = if screens == nil { 0 } else { msg_send![screens, count] };

            let geometry = if count > 0 {
                let main: id = msg_send![screens, objectAtIndex: 0usize];
                let frame: NSRect = msg_send![main, frame];
                let visible: NSRect = msg_send![main, visibleFrame];
                Some(ScreenGeometry::new(to_rect(frame), to_rect(visible)))
            } else {
                log::warn!("没有可用的屏幕");
                None
            };

            pool.drain();
            geometry
        }
    }
}
