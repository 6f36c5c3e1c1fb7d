//! Scroll direction rules.

use serde::{Deserialize, Serialize};

use crate::event::{EventField, TapEvent};

/// User-facing scroll direction preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    /// Content follows the fingers (macOS default).
    Natural,
    /// Content moves opposite to the wheel, as on a classic mouse.
    Traditional,
}

/// Integer delta fields flipped on inversion.
const INTEGER_DELTA_FIELDS: [EventField; 4] = [
    EventField::SCROLL_WHEEL_EVENT_DELTA_AXIS_1,
    EventField::SCROLL_WHEEL_EVENT_DELTA_AXIS_2,
    EventField::SCROLL_WHEEL_EVENT_POINT_DELTA_AXIS_1,
    EventField::SCROLL_WHEEL_EVENT_POINT_DELTA_AXIS_2,
];

/// Fixed-point delta fields flipped on inversion.
const DOUBLE_DELTA_FIELDS: [EventField; 2] = [
    EventField::SCROLL_WHEEL_EVENT_FIXED_PT_DELTA_AXIS_1,
    EventField::SCROLL_WHEEL_EVENT_FIXED_PT_DELTA_AXIS_2,
];

/// Returns `true` when `configured` disagrees with the OS-wide setting.
pub fn should_invert(configured: ScrollDirection, system_natural: bool) -> bool {
    (configured == ScrollDirection::Natural) != system_natural
}

/// Returns `true` while the event belongs to an inertial (momentum) tail.
pub fn is_momentum(event: &dyn TapEvent) -> bool {
    event.integer_field(EventField::SCROLL_WHEEL_EVENT_MOMENTUM_PHASE) != 0
}

/// Returns `true` for trackpad-style continuous scrolling.
pub fn is_continuous(event: &dyn TapEvent) -> bool {
    event.integer_field(EventField::SCROLL_WHEEL_EVENT_IS_CONTINUOUS) != 0
}

/// Flips the sign of every scroll delta the event carries, line and pixel.
pub fn invert_scroll_deltas(event: &mut dyn TapEvent) {
    for field in INTEGER_DELTA_FIELDS {
        let value = event.integer_field(field);
        if value != 0 {
            event.set_integer_field(field, -value);
        }
    }
    for field in DOUBLE_DELTA_FIELDS {
        let value = event.double_field(field);
        if value != 0.0 {
            event.set_double_field(field, -value);
        }
    }
}
