//! Platform-neutral view of a Quartz input event.
//!
//! Pipelines only ever see a `&mut dyn TapEvent`. On macOS it wraps the live
//! `CGEventRef` handed to the tap callback; in tests it is a
//! [`SyntheticEvent`]. Event type and field numbers match the Quartz
//! constants so the macOS adapter can pass them straight through.

use std::collections::HashMap;
use std::ops::BitOr;

use crate::domain::geometry::Point;

/// Quartz event types the pipelines care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EventType {
    LeftMouseDown = 1,
    LeftMouseUp = 2,
    RightMouseDown = 3,
    RightMouseUp = 4,
    MouseMoved = 5,
    LeftMouseDragged = 6,
    RightMouseDragged = 7,
    ScrollWheel = 22,
    OtherMouseDown = 25,
    OtherMouseUp = 26,
    OtherMouseDragged = 27,
    /// The OS disabled the tap because a callback was too slow.
    TapDisabledByTimeout = 0xFFFF_FFFE,
    /// The OS disabled the tap in response to user input (secure input etc).
    TapDisabledByUserInput = 0xFFFF_FFFF,
}

impl EventType {
    pub fn from_raw(raw: u32) -> Option<Self> {
        let ty = match raw {
            1 => EventType::LeftMouseDown,
            2 => EventType::LeftMouseUp,
            3 => EventType::RightMouseDown,
            4 => EventType::RightMouseUp,
            5 => EventType::MouseMoved,
            6 => EventType::LeftMouseDragged,
            7 => EventType::RightMouseDragged,
            22 => EventType::ScrollWheel,
            25 => EventType::OtherMouseDown,
            26 => EventType::OtherMouseUp,
            27 => EventType::OtherMouseDragged,
            0xFFFF_FFFE => EventType::TapDisabledByTimeout,
            0xFFFF_FFFF => EventType::TapDisabledByUserInput,
            _ => return None,
        };
        Some(ty)
    }

    pub fn raw(self) -> u32 {
        self as u32
    }

    /// `true` for the two pseudo-events that announce an OS-disabled tap.
    pub fn is_tap_disabled(self) -> bool {
        matches!(
            self,
            EventType::TapDisabledByTimeout | EventType::TapDisabledByUserInput
        )
    }

    /// `true` for pointer movement with or without a button held.
    pub fn is_pointer_motion(self) -> bool {
        matches!(
            self,
            EventType::MouseMoved
                | EventType::LeftMouseDragged
                | EventType::RightMouseDragged
                | EventType::OtherMouseDragged
        )
    }
}

/// Bit mask of event types, `1 << type` per entry as `CGEventMaskBit` builds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventMask(u64);

impl EventMask {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn of(types: &[EventType]) -> Self {
        types.iter().fold(Self::empty(), |mask, ty| mask | *ty)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    /// Tap-disabled notifications are always delivered and are never part of
    /// a mask, so they report `false` here.
    pub fn contains(self, ty: EventType) -> bool {
        !ty.is_tap_disabled() && self.0 & (1u64 << ty.raw()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr<EventType> for EventMask {
    type Output = EventMask;

    fn bitor(self, ty: EventType) -> EventMask {
        if ty.is_tap_disabled() {
            return self;
        }
        EventMask(self.0 | (1u64 << ty.raw()))
    }
}

impl BitOr for EventMask {
    type Output = EventMask;

    fn bitor(self, other: EventMask) -> EventMask {
        EventMask(self.0 | other.0)
    }
}

/// Quartz event field selector (`CGEventField`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventField(pub u32);

impl EventField {
    pub const MOUSE_EVENT_CLICK_STATE: EventField = EventField(1);
    pub const MOUSE_EVENT_DELTA_X: EventField = EventField(4);
    pub const MOUSE_EVENT_DELTA_Y: EventField = EventField(5);
    pub const SCROLL_WHEEL_EVENT_DELTA_AXIS_1: EventField = EventField(11);
    pub const SCROLL_WHEEL_EVENT_DELTA_AXIS_2: EventField = EventField(12);
    pub const EVENT_SOURCE_USER_DATA: EventField = EventField(42);
    pub const SCROLL_WHEEL_EVENT_IS_CONTINUOUS: EventField = EventField(88);
    pub const SCROLL_WHEEL_EVENT_FIXED_PT_DELTA_AXIS_1: EventField = EventField(93);
    pub const SCROLL_WHEEL_EVENT_FIXED_PT_DELTA_AXIS_2: EventField = EventField(94);
    pub const SCROLL_WHEEL_EVENT_POINT_DELTA_AXIS_1: EventField = EventField(96);
    pub const SCROLL_WHEEL_EVENT_POINT_DELTA_AXIS_2: EventField = EventField(97);
    pub const SCROLL_WHEEL_EVENT_SCROLL_PHASE: EventField = EventField(99);
    pub const SCROLL_WHEEL_EVENT_MOMENTUM_PHASE: EventField = EventField(123);
}

/// Mutable access to one in-flight input event.
pub trait TapEvent {
    fn event_type(&self) -> EventType;

    fn location(&self) -> Point;

    fn set_location(&mut self, location: Point);

    fn integer_field(&self, field: EventField) -> i64;

    fn set_integer_field(&mut self, field: EventField, value: i64);

    fn double_field(&self, field: EventField) -> f64;

    fn set_double_field(&mut self, field: EventField, value: f64);
}

/// What a tap callback wants done with the event it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapVerdict {
    /// Return the (possibly mutated) event to the event stream.
    Forward,
    /// Drop the event entirely.
    Suppress,
}

// ── Synthetic events ──────────────────────────────────────────────────────────

/// An in-memory event used by tests, benches and the mock tap backend.
///
/// Integer and double fields are stored separately; reading a field that was
/// never written returns zero, as Quartz does.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticEvent {
    event_type: EventType,
    location: Point,
    integers: HashMap<u32, i64>,
    doubles: HashMap<u32, f64>,
}

impl SyntheticEvent {
    pub fn new(event_type: EventType, location: Point) -> Self {
        Self {
            event_type,
            location,
            integers: HashMap::new(),
            doubles: HashMap::new(),
        }
    }

    /// A `MouseMoved` event at `location` carrying the given deltas.
    pub fn mouse_moved(location: Point, dx: f64, dy: f64) -> Self {
        Self::new(EventType::MouseMoved, location).with_mouse_delta(dx, dy)
    }

    /// A discrete (mouse wheel) scroll event.
    pub fn scroll(delta_axis_1: i64, delta_axis_2: i64) -> Self {
        let mut event = Self::new(EventType::ScrollWheel, Point::default());
        event.set_integer_field(EventField::SCROLL_WHEEL_EVENT_DELTA_AXIS_1, delta_axis_1);
        event.set_integer_field(EventField::SCROLL_WHEEL_EVENT_DELTA_AXIS_2, delta_axis_2);
        event.set_double_field(EventField::SCROLL_WHEEL_EVENT_FIXED_PT_DELTA_AXIS_1, delta_axis_1 as f64);
        event.set_double_field(EventField::SCROLL_WHEEL_EVENT_FIXED_PT_DELTA_AXIS_2, delta_axis_2 as f64);
        event.set_integer_field(EventField::SCROLL_WHEEL_EVENT_POINT_DELTA_AXIS_1, delta_axis_1 * 10);
        event.set_integer_field(EventField::SCROLL_WHEEL_EVENT_POINT_DELTA_AXIS_2, delta_axis_2 * 10);
        event
    }

    pub fn with_mouse_delta(mut self, dx: f64, dy: f64) -> Self {
        self.set_integer_field(EventField::MOUSE_EVENT_DELTA_X, dx.round() as i64);
        self.set_integer_field(EventField::MOUSE_EVENT_DELTA_Y, dy.round() as i64);
        self.set_double_field(EventField::MOUSE_EVENT_DELTA_X, dx);
        self.set_double_field(EventField::MOUSE_EVENT_DELTA_Y, dy);
        self
    }

    pub fn with_continuous(mut self, continuous: bool) -> Self {
        self.set_integer_field(EventField::SCROLL_WHEEL_EVENT_IS_CONTINUOUS, i64::from(continuous));
        self
    }

    pub fn with_momentum_phase(mut self, phase: i64) -> Self {
        self.set_integer_field(EventField::SCROLL_WHEEL_EVENT_MOMENTUM_PHASE, phase);
        self
    }
}

impl TapEvent for SyntheticEvent {
    fn event_type(&self) -> EventType {
        self.event_type
    }

    fn location(&self) -> Point {
        self.location
    }

    fn set_location(&mut self, location: Point) {
        self.location = location;
    }

    fn integer_field(&self, field: EventField) -> i64 {
        self.integers.get(&field.0).copied().unwrap_or(0)
    }

    fn set_integer_field(&mut self, field: EventField, value: i64) {
        self.integers.insert(field.0, value);
    }

    fn double_field(&self, field: EventField) -> f64 {
        self.doubles.get(&field.0).copied().unwrap_or(0.0)
    }

    fn set_double_field(&mut self, field: EventField, value: f64) {
        self.doubles.insert(field.0, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trips_through_raw_value() {
        for ty in [
            EventType::LeftMouseDown,
            EventType::MouseMoved,
            EventType::ScrollWheel,
            EventType::OtherMouseDragged,
            EventType::TapDisabledByTimeout,
            EventType::TapDisabledByUserInput,
        ] {
            assert_eq!(EventType::from_raw(ty.raw()), Some(ty));
        }
    }

    #[test]
    fn test_event_type_from_raw_unknown_returns_none() {
        // 10 is kCGEventKeyDown, which no pipeline taps.
        assert_eq!(EventType::from_raw(10), None);
    }

    #[test]
    fn test_event_mask_matches_cg_event_mask_bit() {
        let mask = EventMask::of(&[EventType::LeftMouseDown, EventType::ScrollWheel]);
        assert_eq!(mask.bits(), (1 << 1) | (1 << 22));
        assert!(mask.contains(EventType::ScrollWheel));
        assert!(!mask.contains(EventType::MouseMoved));
    }

    #[test]
    fn test_event_mask_ignores_tap_disabled_types() {
        let mask = EventMask::empty() | EventType::TapDisabledByTimeout;
        assert!(mask.is_empty());
        assert!(!EventMask::of(&[EventType::MouseMoved]).contains(EventType::TapDisabledByUserInput));
    }

    #[test]
    fn test_synthetic_event_unset_fields_read_zero() {
        let event = SyntheticEvent::new(EventType::MouseMoved, Point::default());
        assert_eq!(event.integer_field(EventField::SCROLL_WHEEL_EVENT_MOMENTUM_PHASE), 0);
        assert_eq!(event.double_field(EventField::MOUSE_EVENT_DELTA_X), 0.0);
    }
}
