//! Idle time for macOS using IOKit HIDIdleTime.

use std::time::Duration;

use core_foundation::base::TCFType;
use core_foundation::number::CFNumber;
use core_foundation::string::CFString;

use super::IdleProbe;
use crate::error::{Error, Result};

#[link(name = "IOKit", kind = "framework")]
extern "C" {
    fn IOServiceGetMatchingService(
        main_port: u32,
        matching: core_foundation::base::CFTypeRef,
    ) -> u32;
    fn IOServiceMatching(name: *const std::os::raw::c_char) -> core_foundation::base::CFTypeRef;
    fn IORegistryEntryCreateCFProperty(
        entry: u32,
        key: core_foundation::string::CFStringRef,
        allocator: core_foundation::base::CFAllocatorRef,
        options: u32,
    ) -> core_foundation::base::CFTypeRef;
    fn IOObjectRelease(object: u32) -> i32;
}

/// Reads `HIDIdleTime` (nanoseconds since last HID event) from IOHIDSystem.
#[derive(Debug, Default)]
pub struct HidIdleProbe;

impl IdleProbe for HidIdleProbe {
    fn sample(&self) -> Result<Duration> {
        let unavailable = |msg: &str| Error::ProbeUnavailable(msg.to_string());

        let service_name = std::ffi::CString::new("IOHIDSystem")
            .map_err(|_| unavailable("invalid IOKit service name"))?;

        // SAFETY: every IOKit object obtained here is released or handed to a
        // CF wrapper that owns it under the create rule.
        unsafe {
            // IOServiceGetMatchingService consumes the matching dictionary.
            let matching = IOServiceMatching(service_name.as_ptr());
            if matching.is_null() {
                return Err(unavailable("IOServiceMatching returned null"));
            }

            let service = IOServiceGetMatchingService(0, matching);
            if service == 0 {
                return Err(unavailable("IOHIDSystem service not found"));
            }

            let key = CFString::new("HIDIdleTime");
            let property = IORegistryEntryCreateCFProperty(
                service,
                key.as_concrete_TypeRef(),
                std::ptr::null(),
                0,
            );

            IOObjectRelease(service);

            if property.is_null() {
                return Err(unavailable("HIDIdleTime property missing"));
            }

            let cf_number: CFNumber = CFNumber::wrap_under_create_rule(property as *mut _);
            let nanoseconds = cf_number
                .to_i64()
                .ok_or_else(|| unavailable("HIDIdleTime is not an integer"))?;

            Ok(Duration::from_nanos(nanoseconds.max(0) as u64))
        }
    }
}
