//! Touch gestures: two-finger pinch zoom and double-tap zoom toggle

use std::time::Duration;

use super::zoom::RenderScale;

/// Pinches that start with fingers closer than this are ignored
const MIN_PINCH_DISTANCE: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TouchPoint {
    pub id: u64,
    pub x: f32,
    pub y: f32,
}

impl TouchPoint {
    #[must_use]
    pub const fn new(id: u64, x: f32, y: f32) -> Self {
        Self { id, x, y }
    }

    fn distance(&self, other: &TouchPoint) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TouchPhase {
    Start,
    Move,
    End,
    Cancel,
}

/// A touch event on the viewer surface
#[derive(Clone, Debug, PartialEq)]
pub struct TouchEvent {
    pub phase: TouchPhase,
    /// Touches still active after this event
    pub touches: Vec<TouchPoint>,
    /// Event time, relative to any fixed epoch
    pub timestamp: Duration,
}

impl TouchEvent {
    #[must_use]
    pub fn new(phase: TouchPhase, touches: Vec<TouchPoint>, timestamp_ms: u64) -> Self {
        Self {
            phase,
            touches,
            timestamp: Duration::from_millis(timestamp_ms),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GestureState {
    Idle,
    Pinching {
        initial_distance: f32,
        start_scale: RenderScale,
    },
}

/// What the shell should do with a touch event
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GestureResponse {
    /// Suppress the platform's own handling (native zoom/scroll)
    pub prevent_default: bool,
    /// New scale to pass to the viewport controller
    pub set_scale: Option<f32>,
}

impl GestureResponse {
    fn consumed(set_scale: Option<f32>) -> Self {
        Self {
            prevent_default: true,
            set_scale,
        }
    }
}

#[derive(Debug)]
pub struct GestureHandler {
    state: GestureState,
    double_tap_window: Duration,
    last_tap: Option<Duration>,
    tap_candidate: bool,
}

impl Default for GestureHandler {
    fn default() -> Self {
        Self::new(Duration::from_millis(300))
    }
}

impl GestureHandler {
    #[must_use]
    pub fn new(double_tap_window: Duration) -> Self {
        Self {
            state: GestureState::Idle,
            double_tap_window,
            last_tap: None,
            tap_candidate: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> GestureState {
        self.state
    }

    /// Forget any gesture in progress
    pub fn reset(&mut self) {
        self.state = GestureState::Idle;
        self.last_tap = None;
        self.tap_candidate = false;
    }

    pub fn handle(&mut self, event: &TouchEvent, current_scale: RenderScale) -> GestureResponse {
        match event.phase {
            TouchPhase::Start => self.on_start(event, current_scale),
            TouchPhase::Move => self.on_move(event),
            TouchPhase::End => self.on_end(event, current_scale),
            TouchPhase::Cancel => {
                let was_pinching = matches!(self.state, GestureState::Pinching { .. });
                self.reset();
                GestureResponse {
                    prevent_default: was_pinching,
                    set_scale: None,
                }
            }
        }
    }

    fn on_start(&mut self, event: &TouchEvent, current_scale: RenderScale) -> GestureResponse {
        match event.touches.as_slice() {
            [a, b, ..] => {
                self.tap_candidate = false;
                let initial_distance = a.distance(b);
                if initial_distance < MIN_PINCH_DISTANCE {
                    return GestureResponse::default();
                }
                self.state = GestureState::Pinching {
                    initial_distance,
                    start_scale: current_scale,
                };
                GestureResponse::consumed(None)
            }
            [_] => {
                self.tap_candidate = matches!(self.state, GestureState::Idle);
                GestureResponse::default()
            }
            [] => GestureResponse::default(),
        }
    }

    fn on_move(&mut self, event: &TouchEvent) -> GestureResponse {
        self.tap_candidate = false;

        let GestureState::Pinching {
            initial_distance,
            start_scale,
        } = self.state
        else {
            return GestureResponse::default();
        };

        match event.touches.as_slice() {
            [a, b, ..] => {
                let ratio = a.distance(b) / initial_distance;
                let scale = RenderScale::new(start_scale.get() * ratio);
                GestureResponse::consumed(Some(scale.get()))
            }
            _ => {
                self.state = GestureState::Idle;
                GestureResponse::default()
            }
        }
    }

    fn on_end(&mut self, event: &TouchEvent, current_scale: RenderScale) -> GestureResponse {
        if matches!(self.state, GestureState::Pinching { .. }) {
            if event.touches.len() < 2 {
                self.state = GestureState::Idle;
            }
            return GestureResponse::consumed(None);
        }

        if !self.tap_candidate || !event.touches.is_empty() {
            return GestureResponse::default();
        }
        self.tap_candidate = false;

        let now = event.timestamp;
        let is_double = self
            .last_tap
            .is_some_and(|prev| now.saturating_sub(prev) <= self.double_tap_window);

        if is_double {
            self.last_tap = None;
            let target = if current_scale.get() > 1.0 { 1.0 } else { 2.0 };
            GestureResponse::consumed(Some(target))
        } else {
            self.last_tap = Some(now);
            GestureResponse::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two(d: f32) -> Vec<TouchPoint> {
        vec![TouchPoint::new(1, 0.0, 0.0), TouchPoint::new(2, d, 0.0)]
    }

    fn tap(handler: &mut GestureHandler, at_ms: u64, scale: f32) -> GestureResponse {
        let scale = RenderScale::new(scale);
        let down = TouchEvent::new(TouchPhase::Start, vec![TouchPoint::new(1, 5.0, 5.0)], at_ms);
        let _ = handler.handle(&down, scale);
        let up = TouchEvent::new(TouchPhase::End, vec![], at_ms + 40);
        handler.handle(&up, scale)
    }

    #[test]
    fn test_pinch_doubling_distance_doubles_scale() {
        let mut handler = GestureHandler::default();
        let start = handler.handle(
            &TouchEvent::new(TouchPhase::Start, two(100.0), 0),
            RenderScale::new(1.0),
        );
        assert!(start.prevent_default);
        assert!(matches!(handler.state(), GestureState::Pinching { .. }));

        let moved = handler.handle(
            &TouchEvent::new(TouchPhase::Move, two(200.0), 16),
            RenderScale::new(1.0),
        );
        assert!(moved.prevent_default);
        assert_eq!(moved.set_scale, Some(2.0));
    }

    #[test]
    fn test_pinch_is_clamped() {
        let mut handler = GestureHandler::default();
        let _ = handler.handle(
            &TouchEvent::new(TouchPhase::Start, two(10.0), 0),
            RenderScale::new(3.0),
        );
        let out = handler.handle(
            &TouchEvent::new(TouchPhase::Move, two(100.0), 16),
            RenderScale::new(3.0),
        );
        assert_eq!(out.set_scale, Some(5.0));

        let inward = handler.handle(
            &TouchEvent::new(TouchPhase::Move, two(0.5), 32),
            RenderScale::new(5.0),
        );
        assert_eq!(inward.set_scale, Some(0.5));
    }

    #[test]
    fn test_pinch_ends_when_a_finger_lifts() {
        let mut handler = GestureHandler::default();
        let scale = RenderScale::new(1.0);
        let _ = handler.handle(&TouchEvent::new(TouchPhase::Start, two(50.0), 0), scale);
        let lifted = handler.handle(
            &TouchEvent::new(TouchPhase::End, vec![TouchPoint::new(1, 0.0, 0.0)], 10),
            scale,
        );
        assert!(lifted.prevent_default);
        assert_eq!(handler.state(), GestureState::Idle);

        // Remaining finger moving is not a pinch
        let out = handler.handle(
            &TouchEvent::new(TouchPhase::Move, vec![TouchPoint::new(1, 9.0, 9.0)], 20),
            scale,
        );
        assert_eq!(out, GestureResponse::default());
    }

    #[test]
    fn test_double_tap_toggles_between_one_and_two() {
        let mut handler = GestureHandler::default();
        assert_eq!(tap(&mut handler, 0, 1.0).set_scale, None);
        let second = tap(&mut handler, 200, 1.0);
        assert!(second.prevent_default);
        assert_eq!(second.set_scale, Some(2.0));

        assert_eq!(tap(&mut handler, 1000, 2.0).set_scale, None);
        assert_eq!(tap(&mut handler, 1100, 2.0).set_scale, Some(1.0));
    }

    #[test]
    fn test_slow_taps_are_not_double() {
        let mut handler = GestureHandler::default();
        assert_eq!(tap(&mut handler, 0, 1.0).set_scale, None);
        assert_eq!(tap(&mut handler, 500, 1.0).set_scale, None);
        assert_eq!(tap(&mut handler, 700, 1.0).set_scale, Some(2.0));
    }

    #[test]
    fn test_drag_is_not_a_tap() {
        let mut handler = GestureHandler::default();
        let scale = RenderScale::new(1.0);
        assert_eq!(tap(&mut handler, 0, 1.0).set_scale, None);

        let _ = handler.handle(
            &TouchEvent::new(TouchPhase::Start, vec![TouchPoint::new(1, 0.0, 0.0)], 100),
            scale,
        );
        let _ = handler.handle(
            &TouchEvent::new(TouchPhase::Move, vec![TouchPoint::new(1, 0.0, 40.0)], 120),
            scale,
        );
        let up = handler.handle(&TouchEvent::new(TouchPhase::End, vec![], 150), scale);
        assert_eq!(up.set_scale, None);
    }
}
