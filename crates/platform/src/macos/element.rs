use std::ffi::c_void;

use core_foundation::base::TCFType;
use core_foundation::string::{CFString, CFStringRef};
use core_graphics::geometry::{CGPoint, CGSize};

use notimover_core::access::{AccessError, ElementAccess, TextAttribute};
use notimover_core::{Point, Size};

use super::MacPlatform;

pub(crate) type CFTypeRef = *const c_void;

// AXError
const AX_SUCCESS: i32 = 0;
const AX_INVALID_ELEMENT: i32 = -25202;

// AXValueType: kAXValueCGPointType = 1, kAXValueCGSizeType = 2
const AX_VALUE_CG_POINT: u32 = 1;
const AX_VALUE_CG_SIZE: u32 = 2;

const POSITION: &str = "AXPosition";
const SIZE: &str = "AXSize";
const CHILDREN: &str = "AXChildren";

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    fn AXUIElementCopyAttributeValue(
        element: CFTypeRef,
        attribute: CFTypeRef,
        value: *mut CFTypeRef,
    ) -> i32;
    fn AXUIElementSetAttributeValue(element: CFTypeRef, attribute: CFTypeRef, value: CFTypeRef)
        -> i32;
    fn AXUIElementIsAttributeSettable(
        element: CFTypeRef,
        attribute: CFTypeRef,
        settable: *mut u8,
    ) -> i32;
    fn AXUIElementCreateApplication(pid: i32) -> CFTypeRef;
    fn AXValueCreate(value_type: u32, value_ptr: *const c_void) -> CFTypeRef;
    fn AXValueGetValue(value: CFTypeRef, value_type: u32, value_ptr: *mut c_void) -> bool;
}

extern "C" {
    fn CFRetain(cf: CFTypeRef) -> CFTypeRef;
    fn CFRelease(cf: CFTypeRef);
    fn CFHash(cf: CFTypeRef) -> usize;
    fn CFEqual(a: CFTypeRef, b: CFTypeRef) -> u8;
    fn CFGetTypeID(cf: CFTypeRef) -> usize;
    fn CFStringGetTypeID() -> usize;
    fn CFArrayGetTypeID() -> usize;
    fn CFArrayGetCount(array: CFTypeRef) -> isize;
    fn CFArrayGetValueAtIndex(array: CFTypeRef, index: isize) -> CFTypeRef;
}

/// AXUIElement 的持有型包装，Clone 时 retain，Drop 时 release
#[derive(Debug)]
pub struct MacElement {
    ptr: CFTypeRef,
}

// AXUIElement 是线程安全的
unsafe impl Send for MacElement {}
unsafe impl Sync for MacElement {}

impl MacElement {
    /// 接管 Create/Copy 规则返回的引用
    pub(crate) unsafe fn wrap_under_create_rule(ptr: CFTypeRef) -> Option<Self> {
        (!ptr.is_null()).then_some(Self { ptr })
    }

    /// Get 规则返回的引用，需要额外 retain
    pub(crate) unsafe fn wrap_under_get_rule(ptr: CFTypeRef) -> Option<Self> {
        if ptr.is_null() {
            return None;
        }
        CFRetain(ptr);
        Some(Self { ptr })
    }

    pub(crate) fn as_ptr(&self) -> CFTypeRef {
        self.ptr
    }
}

impl Clone for MacElement {
    fn clone(&self) -> Self {
        unsafe {
            CFRetain(self.ptr);
        }
        Self { ptr: self.ptr }
    }
}

impl Drop for MacElement {
    fn drop(&mut self) {
        unsafe { CFRelease(self.ptr) }
    }
}

/// 读取属性；返回的引用归调用方释放
unsafe fn copy_attribute(
    element: &MacElement,
    attribute: &'static str,
) -> Result<CFTypeRef, AccessError> {
    let name = CFString::from_static_string(attribute);
    let mut value: CFTypeRef = std::ptr::null();
    let code =
        AXUIElementCopyAttributeValue(element.as_ptr(), name.as_concrete_TypeRef() as _, &mut value);
    match code {
        AX_SUCCESS if !value.is_null() => Ok(value),
        AX_INVALID_ELEMENT => Err(AccessError::InvalidElement),
        _ => Err(AccessError::AttributeUnavailable { attribute }),
    }
}

/// 读取 AXValue 包装的结构体
unsafe fn copy_ax_value<T>(
    element: &MacElement,
    attribute: &'static str,
    value_type: u32,
    out: &mut T,
) -> Result<(), AccessError> {
    let value = copy_attribute(element, attribute)?;
    let ok = AXValueGetValue(value, value_type, out as *mut T as *mut c_void);
    CFRelease(value);
    if ok {
        Ok(())
    } else {
        Err(AccessError::AttributeUnavailable { attribute })
    }
}

fn text_attribute_name(attribute: TextAttribute) -> &'static str {
    match attribute {
        TextAttribute::Role => "AXRole",
        TextAttribute::Subrole => "AXSubrole",
        TextAttribute::Identifier => "AXIdentifier",
        TextAttribute::Title => "AXTitle",
    }
}

impl ElementAccess for MacPlatform {
    type Element = MacElement;

    fn position(&self, element: &MacElement) -> Result<Point, AccessError> {
        let mut p = CGPoint::new(0.0, 0.0);
        unsafe { copy_ax_value(element, POSITION, AX_VALUE_CG_POINT, &mut p)? };
        Ok(Point::new(p.x, p.y))
    }

    fn set_position(&self, element: &MacElement, position: Point) -> Result<(), AccessError> {
        unsafe {
            let name = CFString::from_static_string(POSITION);
            let cg_point = CGPoint::new(position.x, position.y);
            let value = AXValueCreate(AX_VALUE_CG_POINT, &cg_point as *const _ as *const c_void);
            if value.is_null() {
                return Err(AccessError::AttributeWriteFailed {
                    attribute: POSITION,
                    code: 0,
                });
            }
            let code = AXUIElementSetAttributeValue(
                element.as_ptr(),
                name.as_concrete_TypeRef() as _,
                value,
            );
            CFRelease(value);
            match code {
                AX_SUCCESS => Ok(()),
                AX_INVALID_ELEMENT => Err(AccessError::InvalidElement),
                code => Err(AccessError::AttributeWriteFailed {
                    attribute: POSITION,
                    code,
                }),
            }
        }
    }

    fn size(&self, element: &MacElement) -> Result<Size, AccessError> {
        let mut s = CGSize::new(0.0, 0.0);
        unsafe { copy_ax_value(element, SIZE, AX_VALUE_CG_SIZE, &mut s)? };
        Ok(Size::new(s.width, s.height))
    }

    fn is_position_settable(&self, element: &MacElement) -> bool {
        unsafe {
            let name = CFString::from_static_string(POSITION);
            let mut settable: u8 = 0;
            let code = AXUIElementIsAttributeSettable(
                element.as_ptr(),
                name.as_concrete_TypeRef() as _,
                &mut settable,
            );
            code == AX_SUCCESS && settable != 0
        }
    }

    fn text(&self, element: &MacElement, attribute: TextAttribute) -> Option<String> {
        unsafe {
            let value = copy_attribute(element, text_attribute_name(attribute)).ok()?;
            if CFGetTypeID(value) != CFStringGetTypeID() {
                CFRelease(value);
                return None;
            }
            let s = CFString::wrap_under_create_rule(value as CFStringRef);
            Some(s.to_string())
        }
    }

    fn children(&self, element: &MacElement) -> Vec<MacElement> {
        unsafe {
            let Ok(array) = copy_attribute(element, CHILDREN) else {
                return Vec::new();
            };
            if CFGetTypeID(array) != CFArrayGetTypeID() {
                CFRelease(array);
                return Vec::new();
            }
            let count = CFArrayGetCount(array);
            let children = (0..count)
                .filter_map(|i| MacElement::wrap_under_get_rule(CFArrayGetValueAtIndex(array, i)))
                .collect();
            CFRelease(array);
            children
        }
    }

    fn application(&self, pid: i32) -> Option<MacElement> {
        unsafe { MacElement::wrap_under_create_rule(AXUIElementCreateApplication(pid)) }
    }

    fn identity_hash(&self, element: &MacElement) -> u64 {
        unsafe { CFHash(element.as_ptr()) as u64 }
    }

    fn same_element(&self, a: &MacElement, b: &MacElement) -> bool {
        unsafe { CFEqual(a.as_ptr(), b.as_ptr()) != 0 }
    }
}
