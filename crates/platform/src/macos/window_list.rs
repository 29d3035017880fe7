use std::ffi::c_void;

use core_foundation::base::TCFType;
use core_foundation::string::CFString;
use core_graphics::geometry::CGRect;

use notimover_core::access::{WindowSnapshot, WindowSource};
use notimover_core::Rect;

use super::element::CFTypeRef;
use super::MacPlatform;

// CGWindowListOption
const ON_SCREEN_ONLY: u32 = 1 << 0;
const EXCLUDE_DESKTOP_ELEMENTS: u32 = 1 << 4;
const NULL_WINDOW_ID: u32 = 0;

// CFNumberType: kCFNumberSInt64Type
const CF_NUMBER_SINT64: isize = 4;

extern "C" {
    fn CGWindowListCopyWindowInfo(option: u32, relative_to_window: u32) -> CFTypeRef;
    fn CGRectMakeWithDictionaryRepresentation(dict: CFTypeRef, rect: *mut CGRect) -> bool;
    fn CFArrayGetCount(array: CFTypeRef) -> isize;
    fn CFArrayGetValueAtIndex(array: CFTypeRef, index: isize) -> CFTypeRef;
    fn CFDictionaryGetValue(dict: CFTypeRef, key: CFTypeRef) -> CFTypeRef;
    fn CFNumberGetValue(number: CFTypeRef, the_type: isize, value_ptr: *mut c_void) -> bool;
    fn CFRelease(cf: CFTypeRef);
}

/// 窗口信息字典的键
struct InfoKeys {
    number: CFString,
    owner_pid: CFString,
    layer: CFString,
    bounds: CFString,
}

impl InfoKeys {
    fn new() -> Self {
        Self {
            number: CFString::from_static_string("kCGWindowNumber"),
            owner_pid: CFString::from_static_string("kCGWindowOwnerPID"),
            layer: CFString::from_static_string("kCGWindowLayer"),
            bounds: CFString::from_static_string("kCGWindowBounds"),
        }
    }
}

unsafe fn dict_value(dict: CFTypeRef, key: &CFString) -> Option<CFTypeRef> {
    let value = CFDictionaryGetValue(dict, key.as_concrete_TypeRef() as _);
    (!value.is_null()).then_some(value)
}

unsafe fn dict_i64(dict: CFTypeRef, key: &CFString) -> Option<i64> {
    let number = dict_value(dict, key)?;
    let mut out: i64 = 0;
    CFNumberGetValue(number, CF_NUMBER_SINT64, &mut out as *mut i64 as *mut c_void).then_some(out)
}

unsafe fn parse_window(dict: CFTypeRef, keys: &InfoKeys) -> Option<WindowSnapshot> {
    let number = dict_i64(dict, &keys.number)?;
    let owner_pid = dict_i64(dict, &keys.owner_pid)?;
    let layer = dict_i64(dict, &keys.layer).unwrap_or(0);

    let bounds_dict = dict_value(dict, &keys.bounds)?;
    let mut rect = CGRect::new(
        &core_graphics::geometry::CGPoint::new(0.0, 0.0),
        &core_graphics::geometry::CGSize::new(0.0, 0.0),
    );
    if !CGRectMakeWithDictionaryRepresentation(bounds_dict, &mut rect) {
        return None;
    }

    Some(WindowSnapshot {
        number: u32::try_from(number).ok()?,
        owner_pid: i32::try_from(owner_pid).ok()?,
        layer: layer as i32,
        bounds: Rect::new(rect.origin.x, rect.origin.y, rect.size.width, rect.size.height),
    })
}

impl WindowSource for MacPlatform {
    /// 屏幕上的非桌面级窗口，bounds 为左上角原点坐标
    fn on_screen_windows(&self) -> Vec<WindowSnapshot> {
        unsafe {
            let list =
                CGWindowListCopyWindowInfo(ON_SCREEN_ONLY | EXCLUDE_DESKTOP_ELEMENTS, NULL_WINDOW_ID);
            if list.is_null() {
                log::warn!("获取窗口列表失败");
                return Vec::new();
            }

            let keys = InfoKeys::new();
            let count = CFArrayGetCount(list);
            let windows = (0..count)
                .filter_map(|i| parse_window(CFArrayGetValueAtIndex(list, i), &keys))
                .collect();
            CFRelease(list);
            windows
        }
    }
}
