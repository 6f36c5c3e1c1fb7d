//! macOS window list and Accessibility window mover.
//!
//! The window list comes from `CGWindowListCopyWindowInfo`, front to back,
//! in global display coordinates with a top-left origin (the same space
//! event locations use).
//!
//! Moving a window goes through the owning application's Accessibility
//! tree: the app element's `AXWindows` are searched for the element whose
//! window-server id matches, then `AXPosition` and `AXSize` are set.

use std::ffi::c_void;

use core_foundation::array::{CFArray, CFArrayRef};
use core_foundation::base::{CFType, CFTypeRef, TCFType};
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::number::CFNumber;
use core_foundation::string::{CFString, CFStringRef};
use core_graphics::geometry::{CGPoint, CGSize};
use tapwise_core::{Point, Rect, Size, WindowId, WindowInfo};
use tracing::{debug, trace};

use crate::application::window_geometry::{GeometryError, WindowMover, WindowQuery};

const LIST_OPTION_ALL: u32 = 0;
const LIST_OPTION_ON_SCREEN_ONLY: u32 = 1 << 0;
const LIST_OPTION_INCLUDING_WINDOW: u32 = 1 << 3;
const LIST_EXCLUDE_DESKTOP_ELEMENTS: u32 = 1 << 4;
const NULL_WINDOW_ID: u32 = 0;

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGWindowListCopyWindowInfo(option: u32, relative_to_window: u32) -> CFArrayRef;
}

// ── Window list ───────────────────────────────────────────────────────────────

/// Reads the window list from the window server.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuartzWindowQuery;

impl QuartzWindowQuery {
    pub fn new() -> Self {
        Self
    }
}

fn copy_window_list(option: u32, relative_to: u32) -> Result<Vec<WindowInfo>, GeometryError> {
    let raw = unsafe { CGWindowListCopyWindowInfo(option, relative_to) };
    if raw.is_null() {
        return Err(GeometryError::Unavailable(
            "CGWindowListCopyWindowInfo returned NULL".to_string(),
        ));
    }
    let list: CFArray<*const c_void> = unsafe { CFArray::wrap_under_create_rule(raw) };
    let windows = list
        .iter()
        .filter_map(|entry| {
            let dict: CFDictionary = unsafe { CFDictionary::wrap_under_get_rule(*entry as CFDictionaryRef) };
            parse_window(&dict)
        })
        .collect();
    Ok(windows)
}

fn value(dict: &CFDictionary, key: &'static str) -> Option<CFType> {
    let key = CFString::from_static_string(key);
    dict.find(key.as_concrete_TypeRef() as *const c_void)
        .map(|v| unsafe { CFType::wrap_under_get_rule(*v as CFTypeRef) })
}

fn number(dict: &CFDictionary, key: &'static str) -> Option<f64> {
    value(dict, key)?.downcast::<CFNumber>()?.to_f64()
}

fn parse_bounds(dict: &CFDictionary) -> Option<Rect> {
    let bounds = value(dict, "kCGWindowBounds")?.downcast::<CFDictionary>()?;
    Some(Rect::new(
        number(&bounds, "X")?,
        number(&bounds, "Y")?,
        number(&bounds, "Width")?,
        number(&bounds, "Height")?,
    ))
}

fn parse_window(dict: &CFDictionary) -> Option<WindowInfo> {
    let id = number(dict, "kCGWindowNumber")? as u32;
    let frame = parse_bounds(dict)?;
    let owner_name = value(dict, "kCGWindowOwnerName")
        .and_then(|v| v.downcast::<CFString>())
        .map(|s| s.to_string())
        .unwrap_or_default();
    Some(WindowInfo {
        id: WindowId(id),
        frame,
        owner_pid: number(dict, "kCGWindowOwnerPID").unwrap_or(0.0) as i32,
        owner_name,
        layer: number(dict, "kCGWindowLayer").unwrap_or(0.0) as i32,
    })
}

impl WindowQuery for QuartzWindowQuery {
    fn all_windows(&self, on_screen_only: bool) -> Result<Vec<WindowInfo>, GeometryError> {
        let option = if on_screen_only {
            LIST_OPTION_ON_SCREEN_ONLY | LIST_EXCLUDE_DESKTOP_ELEMENTS
        } else {
            LIST_OPTION_ALL | LIST_EXCLUDE_DESKTOP_ELEMENTS
        };
        let windows = copy_window_list(option, NULL_WINDOW_ID)?;
        trace!(count = windows.len(), on_screen_only, "window list queried");
        Ok(windows)
    }

    fn frontmost_window(&self) -> Result<Option<WindowInfo>, GeometryError> {
        Ok(self.all_windows(true)?.into_iter().find(|w| w.is_normal_layer()))
    }

    fn window_frame(&self, id: WindowId) -> Result<Rect, GeometryError> {
        copy_window_list(LIST_OPTION_INCLUDING_WINDOW, id.0)?
            .into_iter()
            .find(|w| w.id == id)
            .map(|w| w.frame)
            .ok_or(GeometryError::WindowNotFound(id))
    }
}

// ── Accessibility mover ───────────────────────────────────────────────────────

type AXUIElementRef = CFTypeRef;
type AXError = i32;

const AX_SUCCESS: AXError = 0;
const AX_VALUE_CG_POINT: u32 = 1;
const AX_VALUE_CG_SIZE: u32 = 2;
/// Frame match tolerance when the window id cannot be read from an element.
const FRAME_MATCH_TOLERANCE: f64 = 2.0;

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    fn AXUIElementCreateApplication(pid: i32) -> AXUIElementRef;
    fn AXUIElementCopyAttributeValue(element: AXUIElementRef, attribute: CFStringRef, value: *mut CFTypeRef)
        -> AXError;
    fn AXUIElementSetAttributeValue(element: AXUIElementRef, attribute: CFStringRef, value: CFTypeRef) -> AXError;
    fn AXValueCreate(value_type: u32, value: *const c_void) -> CFTypeRef;
    fn AXValueGetValue(value: CFTypeRef, value_type: u32, out: *mut c_void) -> bool;
    fn _AXUIElementGetWindow(element: AXUIElementRef, out: *mut u32) -> AXError;
}

fn copy_attribute(element: &CFType, attribute: &'static str) -> Result<CFType, GeometryError> {
    let name = CFString::from_static_string(attribute);
    let mut out: CFTypeRef = std::ptr::null();
    let status = unsafe { AXUIElementCopyAttributeValue(element.as_CFTypeRef(), name.as_concrete_TypeRef(), &mut out) };
    if status != AX_SUCCESS || out.is_null() {
        return Err(GeometryError::MoveFailed(format!("reading {attribute}: AXError {status}")));
    }
    Ok(unsafe { CFType::wrap_under_create_rule(out) })
}

fn set_attribute(element: &CFType, attribute: &'static str, value: &CFType) -> Result<(), GeometryError> {
    let name = CFString::from_static_string(attribute);
    let status = unsafe {
        AXUIElementSetAttributeValue(element.as_CFTypeRef(), name.as_concrete_TypeRef(), value.as_CFTypeRef())
    };
    if status == AX_SUCCESS {
        Ok(())
    } else {
        Err(GeometryError::MoveFailed(format!("setting {attribute}: AXError {status}")))
    }
}

fn ax_value<T>(value_type: u32, value: &T) -> Result<CFType, GeometryError> {
    let raw = unsafe { AXValueCreate(value_type, (value as *const T).cast()) };
    if raw.is_null() {
        return Err(GeometryError::MoveFailed("AXValueCreate returned NULL".to_string()));
    }
    Ok(unsafe { CFType::wrap_under_create_rule(raw) })
}

fn element_frame(element: &CFType) -> Option<Rect> {
    let position = copy_attribute(element, "AXPosition").ok()?;
    let size = copy_attribute(element, "AXSize").ok()?;
    let mut origin = CGPoint::new(0.0, 0.0);
    let mut extent = CGSize::new(0.0, 0.0);
    let ok = unsafe {
        AXValueGetValue(position.as_CFTypeRef(), AX_VALUE_CG_POINT, (&mut origin as *mut CGPoint).cast())
            && AXValueGetValue(size.as_CFTypeRef(), AX_VALUE_CG_SIZE, (&mut extent as *mut CGSize).cast())
    };
    ok.then(|| Rect::new(origin.x, origin.y, extent.width, extent.height))
}

/// Moves and resizes windows through the Accessibility API.
#[derive(Debug, Default, Clone, Copy)]
pub struct AccessibilityWindowMover;

impl AccessibilityWindowMover {
    pub fn new() -> Self {
        Self
    }

    /// Finds the Accessibility element for `window` in its owner's tree.
    ///
    /// Matches on the window-server id first and falls back to the frame
    /// for elements that do not expose one.
    fn element_for(&self, window: &WindowInfo) -> Result<CFType, GeometryError> {
        let raw_app = unsafe { AXUIElementCreateApplication(window.owner_pid) };
        if raw_app.is_null() {
            return Err(GeometryError::WindowNotFound(window.id));
        }
        let app = unsafe { CFType::wrap_under_create_rule(raw_app) };
        let list = copy_attribute(&app, "AXWindows")?;
        let Some(elements) = list.downcast::<CFArray>() else {
            return Err(GeometryError::WindowNotFound(window.id));
        };

        let elements: Vec<CFType> = elements
            .iter()
            .map(|e| unsafe { CFType::wrap_under_get_rule(*e as CFTypeRef) })
            .collect();

        let by_id = elements.iter().find(|element| {
            let mut id = 0u32;
            let status = unsafe { _AXUIElementGetWindow(element.as_CFTypeRef(), &mut id) };
            status == AX_SUCCESS && id == window.id.0
        });
        if let Some(element) = by_id {
            return Ok(element.clone());
        }

        elements
            .into_iter()
            .find(|element| {
                element_frame(element).is_some_and(|f| f.approx_eq(&window.frame, FRAME_MATCH_TOLERANCE))
            })
            .ok_or(GeometryError::WindowNotFound(window.id))
    }
}

impl WindowMover for AccessibilityWindowMover {
    fn move_window(&self, window: &WindowInfo, origin: Point) -> Result<(), GeometryError> {
        let element = self.element_for(window)?;
        let value = ax_value(AX_VALUE_CG_POINT, &CGPoint::new(origin.x, origin.y))?;
        set_attribute(&element, "AXPosition", &value)?;
        debug!(window = %window.id, ?origin, "window moved");
        Ok(())
    }

    fn resize_window(&self, window: &WindowInfo, size: Size) -> Result<(), GeometryError> {
        let element = self.element_for(window)?;
        let value = ax_value(AX_VALUE_CG_SIZE, &CGSize::new(size.width, size.height))?;
        set_attribute(&element, "AXSize", &value)?;
        debug!(window = %window.id, ?size, "window resized");
        Ok(())
    }

    fn set_frame(&self, window: &WindowInfo, frame: Rect) -> Result<(), GeometryError> {
        let element = self.element_for(window)?;
        let position = ax_value(AX_VALUE_CG_POINT, &CGPoint::new(frame.x, frame.y))?;
        let size = ax_value(AX_VALUE_CG_SIZE, &CGSize::new(frame.width, frame.height))?;
        set_attribute(&element, "AXPosition", &position)?;
        set_attribute(&element, "AXSize", &size)?;
        debug!(window = %window.id, ?frame, "window frame set");
        Ok(())
    }
}
