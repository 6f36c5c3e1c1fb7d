//! # tapwise-core
//!
//! Shared library for Tapwise containing the pure, OS-independent parts of
//! the input pipeline:
//!
//! - **`curve`** evaluates cubic Bezier acceleration curves, inverts them
//!   with a bounded Newton-Raphson solver and scales raw pointer deltas.
//! - **`domain`** holds geometry primitives, window edge/corner hit testing
//!   with the rounded-corner dead-zone correction, drag-to-edge snap zones,
//!   device classification and the scroll-direction rule.
//! - **`event`** is the platform-neutral event abstraction the pipelines
//!   mutate: event types, masks, field selectors and an in-memory
//!   [`SyntheticEvent`] for tests.
//!
//! Every function on the per-event hot path here is allocation-free and runs
//! well inside the 5ms budget an event tap callback is given.

pub mod curve;
pub mod domain;
pub mod event;

pub use curve::{AccelerationCurve, CurveError, CurvePreset, VelocityMapper};
pub use domain::device::{classify_device, Device, DeviceDescriptor, DeviceId, DeviceType};
pub use domain::geometry::{Point, Rect, Size};
pub use domain::hit_test::{
    calculate_adjusted_location, corner_correction, detect_edge, find_window_and_edge,
    is_in_dead_zone, Edge, EdgeHit, HitTestConfig,
};
pub use domain::scroll::ScrollDirection;
pub use domain::snap::{build_snap_zones, check_snap_zone, SnapZone, SnapZoneKind, SnapZoneSet};
pub use domain::window::{window_at, WindowId, WindowInfo};
pub use event::{EventField, EventMask, EventType, SyntheticEvent, TapEvent, TapVerdict};
