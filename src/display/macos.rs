//! CoreGraphics / SkyLight display backend
//!
//! Enabling and disabling a display goes through the private SkyLight call
//! `SLSConfigureDisplayEnabled`, staged inside a regular CoreGraphics
//! configuration transaction.

use std::ffi::{c_char, c_void};
use std::sync::OnceLock;
use std::thread;

use core_foundation::base::{CFType, TCFType};
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::number::CFNumber;
use core_foundation::runloop::CFRunLoop;
use core_foundation::string::{CFString, CFStringRef};
use core_graphics::display::CGDisplay;
use core_graphics::event::CGEvent;
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::geometry::CGPoint;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{AttachedDisplay, ConfigTransaction, DisplayError, DisplayHardware, DisplayId, OsStatus};

type CGDisplayConfigRef = *mut c_void;

const CG_SUCCESS: OsStatus = 0;
const CG_ILLEGAL_ARGUMENT: OsStatus = 1001;
const CONFIGURE_FOR_SESSION: u32 = 1;
const MAX_DISPLAYS: u32 = 16;

const RECONFIGURE_ADD_FLAG: u32 = 1 << 4;

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGBeginDisplayConfiguration(config: *mut CGDisplayConfigRef) -> OsStatus;
    fn CGCompleteDisplayConfiguration(config: CGDisplayConfigRef, option: u32) -> OsStatus;
    fn CGCancelDisplayConfiguration(config: CGDisplayConfigRef) -> OsStatus;
    fn CGGetActiveDisplayList(max: u32, displays: *mut DisplayId, count: *mut u32) -> OsStatus;
    fn CGGetDisplaysWithPoint(
        point: CGPoint,
        max: u32,
        displays: *mut DisplayId,
        count: *mut u32,
    ) -> OsStatus;
    fn CGDisplayRegisterReconfigurationCallback(
        callback: extern "C" fn(DisplayId, u32, *mut c_void),
        user_info: *mut c_void,
    ) -> OsStatus;
}

#[link(name = "SkyLight", kind = "framework")]
extern "C" {
    fn SLSConfigureDisplayEnabled(config: CGDisplayConfigRef, display: DisplayId, enabled: bool) -> OsStatus;
    fn SLSGetDisplayList(max: u32, displays: *mut DisplayId, count: *mut u32) -> OsStatus;
}

/// The real display hardware of this Mac
#[derive(Debug, Default)]
pub struct MacDisplayHardware;

impl MacDisplayHardware {
    pub fn new() -> Self {
        Self
    }
}

fn display_list(
    call: unsafe extern "C" fn(u32, *mut DisplayId, *mut u32) -> OsStatus,
) -> Result<Vec<DisplayId>, OsStatus> {
    let mut ids = vec![0 as DisplayId; MAX_DISPLAYS as usize];
    let mut count = 0u32;
    let err = unsafe { call(MAX_DISPLAYS, ids.as_mut_ptr(), &mut count) };
    if err != CG_SUCCESS {
        return Err(err);
    }
    ids.truncate(count as usize);
    Ok(ids)
}

fn display_name(id: DisplayId) -> String {
    let display = CGDisplay::new(id);
    if display.is_builtin() {
        return "Built-in Display".to_string();
    }

    let (vendor, model) = (display.vendor_number(), display.model_number());
    product_name(vendor, model).unwrap_or_else(|| format!("Display {:04X}-{:04X}", vendor, model))
}

type IoObject = u32;

const IO_DISPLAY_ONLY_PREFERRED_NAME: u32 = 0x0000_0200;
const KERN_SUCCESS: i32 = 0;

#[link(name = "IOKit", kind = "framework")]
extern "C" {
    static kIOMasterPortDefault: u32;
    fn IOServiceMatching(name: *const c_char) -> *mut c_void;
    fn IOServiceGetMatchingServices(master: u32, matching: *mut c_void, existing: *mut IoObject) -> i32;
    fn IOIteratorNext(iterator: IoObject) -> IoObject;
    fn IOObjectRelease(object: IoObject) -> i32;
    fn IODisplayCreateInfoDictionary(framebuffer: IoObject, options: u32) -> CFDictionaryRef;
}

/// EDID product name of the connected display with this vendor and model
///
/// Walks the `IODisplayConnect` services. Returns `None` when no service
/// matches, which is the case on machines without that registry class.
fn product_name(vendor: u32, model: u32) -> Option<String> {
    let mut iterator: IoObject = 0;
    let matching = unsafe { IOServiceMatching(b"IODisplayConnect\0".as_ptr() as *const c_char) };
    if matching.is_null() {
        return None;
    }
    // The matching dictionary is consumed by the call
    let err = unsafe { IOServiceGetMatchingServices(kIOMasterPortDefault, matching, &mut iterator) };
    if err != KERN_SUCCESS {
        return None;
    }

    let mut found = None;
    loop {
        let service = unsafe { IOIteratorNext(iterator) };
        if service == 0 {
            break;
        }
        if found.is_none() {
            found = service_product_name(service, vendor, model);
        }
        unsafe { IOObjectRelease(service) };
    }
    unsafe { IOObjectRelease(iterator) };
    found
}

fn service_product_name(service: IoObject, vendor: u32, model: u32) -> Option<String> {
    let raw = unsafe { IODisplayCreateInfoDictionary(service, IO_DISPLAY_ONLY_PREFERRED_NAME) };
    if raw.is_null() {
        return None;
    }
    let info: CFDictionary<CFString, CFType> = unsafe { TCFType::wrap_under_create_rule(raw) };

    let number = |key: &'static str| {
        info.find(&CFString::from_static_string(key))
            .and_then(|value| value.downcast::<CFNumber>())
            .and_then(|n| n.to_i64())
    };
    if number("DisplayVendorID") != Some(i64::from(vendor)) || number("DisplayProductID") != Some(i64::from(model)) {
        return None;
    }

    // Localised names keyed by locale; only the preferred one was requested
    let names = info
        .find(&CFString::from_static_string("DisplayProductName"))?
        .downcast::<CFDictionary>()?;
    let (_, values) = names.get_keys_and_values();
    let first = *values.first()?;
    if first.is_null() {
        return None;
    }
    let name = unsafe { CFString::wrap_under_get_rule(first as CFStringRef) };
    Some(name.to_string())
}

impl DisplayHardware for MacDisplayHardware {
    fn begin_config(&self) -> Result<Box<dyn ConfigTransaction + '_>, OsStatus> {
        let mut config: CGDisplayConfigRef = std::ptr::null_mut();
        let err = unsafe { CGBeginDisplayConfiguration(&mut config) };
        if err != CG_SUCCESS {
            return Err(err);
        }
        if config.is_null() {
            return Err(CG_ILLEGAL_ARGUMENT);
        }
        Ok(Box::new(MacConfigTransaction { config }))
    }

    fn enumerate_attached(&self) -> Result<Vec<AttachedDisplay>, OsStatus> {
        Ok(display_list(CGGetActiveDisplayList)?
            .into_iter()
            .map(|id| AttachedDisplay {
                id,
                name: display_name(id),
            })
            .collect())
    }

    fn enumerate_all(&self) -> Result<Vec<DisplayId>, OsStatus> {
        display_list(SLSGetDisplayList)
    }

    fn display_name(&self, id: DisplayId) -> String {
        display_name(id)
    }

    fn display_under_pointer(&self) -> Option<DisplayId> {
        let source = CGEventSource::new(CGEventSourceStateID::CombinedSessionState).ok()?;
        let location = CGEvent::new(source).ok()?.location();

        let mut id: DisplayId = 0;
        let mut count = 0u32;
        let err = unsafe { CGGetDisplaysWithPoint(location, 1, &mut id, &mut count) };
        (err == CG_SUCCESS && count > 0).then_some(id)
    }
}

struct MacConfigTransaction {
    config: CGDisplayConfigRef,
}

impl ConfigTransaction for MacConfigTransaction {
    fn set_enabled(&mut self, id: DisplayId, enabled: bool) -> Result<(), OsStatus> {
        match unsafe { SLSConfigureDisplayEnabled(self.config, id, enabled) } {
            CG_SUCCESS => Ok(()),
            err => Err(err),
        }
    }

    fn commit(&mut self) -> Result<(), OsStatus> {
        match unsafe { CGCompleteDisplayConfiguration(self.config, CONFIGURE_FOR_SESSION) } {
            CG_SUCCESS => Ok(()),
            err => Err(err),
        }
    }

    fn cancel(&mut self) {
        let err = unsafe { CGCancelDisplayConfiguration(self.config) };
        if err != CG_SUCCESS {
            debug!(code = err, "cancel display configuration returned an error");
        }
    }
}

static TOPOLOGY_TX: OnceLock<mpsc::UnboundedSender<DisplayId>> = OnceLock::new();

extern "C" fn reconfiguration_callback(display: DisplayId, flags: u32, _user_info: *mut c_void) {
    // Removals are handled manually ("clear disconnected"), only additions refresh
    if flags & RECONFIGURE_ADD_FLAG == 0 {
        return;
    }
    if let Some(tx) = TOPOLOGY_TX.get() {
        let _ = tx.send(display);
    }
}

/// Watch for displays being added
///
/// Registers the CoreGraphics reconfiguration callback on a dedicated run-loop
/// thread that lives until process exit. Each added display id is sent on the
/// returned channel. Only one watcher may exist per process.
pub fn watch_topology() -> Result<mpsc::UnboundedReceiver<DisplayId>, DisplayError> {
    let (tx, rx) = mpsc::unbounded_channel();
    TOPOLOGY_TX
        .set(tx)
        .map_err(|_| DisplayError::CallbackRegistration(CG_ILLEGAL_ARGUMENT))?;

    let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<OsStatus>(1);
    thread::Builder::new()
        .name("display-watcher".to_string())
        .spawn(move || {
            let err = unsafe {
                CGDisplayRegisterReconfigurationCallback(reconfiguration_callback, std::ptr::null_mut())
            };
            let _ = ready_tx.send(err);
            if err != CG_SUCCESS {
                return;
            }
            info!("display reconfiguration callback registered");
            CFRunLoop::run_current();
        })
        .map_err(|e| {
            error!(?e, "failed to spawn display watcher thread");
            DisplayError::CallbackRegistration(CG_ILLEGAL_ARGUMENT)
        })?;

    match ready_rx.recv() {
        Ok(CG_SUCCESS) => Ok(rx),
        Ok(err) => Err(DisplayError::CallbackRegistration(err)),
        Err(_) => Err(DisplayError::CallbackRegistration(CG_ILLEGAL_ARGUMENT)),
    }
}
