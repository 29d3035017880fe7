//! 窗口创建事件订阅（AXObserver）
//!
//! 回调在主线程 RunLoop 上触发，只把新窗口元素推入队列，由引擎下一次 tick 处理。

use std::collections::HashMap;
use std::ffi::c_void;

use core_foundation::base::TCFType;
use core_foundation::runloop::{kCFRunLoopDefaultMode, CFRunLoop, CFRunLoopSource};
use core_foundation::string::CFString;

use notimover_core::access::{AccessError, CreationQueue};

use super::element::{CFTypeRef, MacElement};

const AX_SUCCESS: i32 = 0;
const WINDOW_CREATED: &str = "AXWindowCreated";

type AXObserverCallback = unsafe extern "C" fn(
    observer: CFTypeRef,
    element: CFTypeRef,
    notification: CFTypeRef,
    refcon: *mut c_void,
);

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    fn AXObserverCreate(pid: i32, callback: AXObserverCallback, observer: *mut CFTypeRef) -> i32;
    fn AXObserverAddNotification(
        observer: CFTypeRef,
        element: CFTypeRef,
        notification: CFTypeRef,
        refcon: *mut c_void,
    ) -> i32;
    fn AXObserverRemoveNotification(
        observer: CFTypeRef,
        element: CFTypeRef,
        notification: CFTypeRef,
    ) -> i32;
    fn AXObserverGetRunLoopSource(observer: CFTypeRef) -> CFTypeRef;
    fn AXUIElementCreateApplication(pid: i32) -> CFTypeRef;
}

extern "C" {
    fn CFRelease(cf: CFTypeRef);
}

unsafe extern "C" fn on_window_created(
    _observer: CFTypeRef,
    element: CFTypeRef,
    _notification: CFTypeRef,
    refcon: *mut c_void,
) {
    if refcon.is_null() {
        return;
    }
    let queue = &*(refcon as *const CreationQueue<MacElement>);
    if let Some(window) = MacElement::wrap_under_get_rule(element) {
        queue.push(window);
    }
}

/// 单个进程的订阅
struct Subscription {
    observer: CFTypeRef,
    app: CFTypeRef,
    source: CFRunLoopSource,
    // 回调上下文，生命周期与订阅一致
    queue: *mut CreationQueue<MacElement>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        unsafe {
            let name = CFString::from_static_string(WINDOW_CREATED);
            AXObserverRemoveNotification(self.observer, self.app, name.as_concrete_TypeRef() as _);
            CFRunLoop::get_main().remove_source(&self.source, kCFRunLoopDefaultMode);
            CFRelease(self.observer);
            CFRelease(self.app);
            drop(Box::from_raw(self.queue));
        }
    }
}

/// 按 pid 管理的 AXObserver 集合
#[derive(Default)]
pub struct ObserverSet {
    subscriptions: HashMap<i32, Subscription>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        pid: i32,
        queue: CreationQueue<MacElement>,
    ) -> Result<(), AccessError> {
        // 同一进程重复订阅时先移除旧的
        self.unsubscribe(pid);

        unsafe {
            let mut observer: CFTypeRef = std::ptr::null();
            let code = AXObserverCreate(pid, on_window_created, &mut observer);
            if code != AX_SUCCESS || observer.is_null() {
                return Err(AccessError::ObserverFailed { pid, code });
            }

            let app = AXUIElementCreateApplication(pid);
            if app.is_null() {
                CFRelease(observer);
                return Err(AccessError::ObserverFailed { pid, code: 0 });
            }

            let context = Box::into_raw(Box::new(queue));
            let name = CFString::from_static_string(WINDOW_CREATED);
            let code = AXObserverAddNotification(
                observer,
                app,
                name.as_concrete_TypeRef() as _,
                context as *mut c_void,
            );
            if code != AX_SUCCESS {
                CFRelease(observer);
                CFRelease(app);
                drop(Box::from_raw(context));
                return Err(AccessError::ObserverFailed { pid, code });
            }

            let source = CFRunLoopSource::wrap_under_get_rule(
                AXObserverGetRunLoopSource(observer) as _,
            );
            CFRunLoop::get_main().add_source(&source, kCFRunLoopDefaultMode);

            self.subscriptions.insert(
                pid,
                Subscription {
                    observer,
                    app,
                    source,
                    queue: context,
                },
            );
        }

        log::debug!("已为 pid {} 创建 AXObserver", pid);
        Ok(())
    }

    pub fn unsubscribe(&mut self, pid: i32) {
        if self.subscriptions.remove(&pid).is_some() {
            log::debug!("已移除 pid {} 的 AXObserver", pid);
        }
    }
}
