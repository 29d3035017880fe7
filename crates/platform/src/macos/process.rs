#![allow(deprecated)] // cocoa crate fields are deprecated in favor of objc2-foundation

use cocoa::base::{id, nil};
use cocoa::foundation::{NSAutoreleasePool, NSString, NSUInteger};
use objc::*;

use notimover_core::access::{AccessError, ProcessDirectory};

use super::MacPlatform;

impl ProcessDirectory for MacPlatform {
    /// 通过 NSRunningApplication 查找 bundle 对应的进程
    fn pid_for_bundle(&self, bundle_id: &str) -> Result<i32, AccessError> {
        unsafe {
            let pool = NSAutoreleasePool::new(nil);
            let bundle = NSString::alloc(nil).init_str(bundle_id);

            let apps: id = msg_send![
                class!(NSRunningApplication),
                runningApplicationsWithBundleIdentifier: bundle
            ];
            let count: NSUInteger = if apps == nil { 0 } else { msg_send![apps, count] };
            let pid = if count > 0 {
                let app: id = msg_send![apps, objectAtIndex: 0usize];
                let pid: i32 = msg_send![app, processIdentifier];
                Some(pid)
            } else {
                None
            };

            let _: () = msg_send![bundle, release];
            pool.drain();

            match pid {
                Some(pid) if pid > 0 => Ok(pid),
                _ => Err(AccessError::ProcessNotFound {
                    bundle_id: bundle_id.to_string(),
                }),
            }
        }
    }
}
