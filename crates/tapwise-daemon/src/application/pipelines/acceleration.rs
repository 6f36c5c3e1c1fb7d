//! Pointer acceleration.
//!
//! Scales the raw mouse deltas through the configured curve and moves the
//! event location by the same correction, so the cursor lands where the
//! scaled delta says it should.

use std::sync::{PoisonError, RwLock};

use tapwise_core::event::{EventField, EventMask, EventType, TapEvent, TapVerdict};
use tapwise_core::{Point, VelocityMapper};
use tracing::trace;

use super::{Feature, Transform};
use crate::application::tap_manager::TapCallback;

pub struct AccelerationTransform {
    mapper: RwLock<VelocityMapper>,
}

impl AccelerationTransform {
    pub fn new(mapper: VelocityMapper) -> Self {
        Self {
            mapper: RwLock::new(mapper),
        }
    }

    pub fn set_mapper(&self, mapper: VelocityMapper) {
        *self.mapper.write().unwrap_or_else(PoisonError::into_inner) = mapper;
    }

    pub fn mapper(&self) -> VelocityMapper {
        self.mapper.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl TapCallback for AccelerationTransform {
    fn on_event(&self, event_type: EventType, event: &mut dyn TapEvent) -> TapVerdict {
        if !event_type.is_pointer_motion() {
            return TapVerdict::Forward;
        }

        let dx = event.double_field(EventField::MOUSE_EVENT_DELTA_X);
        let dy = event.double_field(EventField::MOUSE_EVENT_DELTA_Y);
        let scaled = self
            .mapper
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .scale(dx, dy);
        let Some((sx, sy)) = scaled else {
            return TapVerdict::Forward;
        };

        event.set_double_field(EventField::MOUSE_EVENT_DELTA_X, sx);
        event.set_double_field(EventField::MOUSE_EVENT_DELTA_Y, sy);
        event.set_integer_field(EventField::MOUSE_EVENT_DELTA_X, sx.round() as i64);
        event.set_integer_field(EventField::MOUSE_EVENT_DELTA_Y, sy.round() as i64);

        let location = event.location();
        event.set_location(Point::new(location.x + (sx - dx), location.y + (sy - dy)));

        trace!(dx, dy, sx, sy, "pointer delta scaled");
        TapVerdict::Forward
    }
}

impl Transform for AccelerationTransform {
    fn feature(&self) -> Feature {
        Feature::Acceleration
    }

    fn event_mask(&self) -> EventMask {
        EventMask::of(&[
            EventType::MouseMoved,
            EventType::LeftMouseDragged,
            EventType::RightMouseDragged,
            EventType::OtherMouseDragged,
        ])
    }
}
