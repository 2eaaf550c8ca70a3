use crate::events::MouseButton;
use retrace::Point;
use std::time::{Duration, Instant};

/// Collapses repeated notifications of one physical click.
///
/// The hook and the poll can both report the same press, in either order,
/// so the time check is symmetric.
#[derive(Debug, Clone)]
pub struct ClickDebouncer {
    last_click_position: Option<Point>,
    last_click_time: Option<Instant>,
    last_click_button: Option<MouseButton>,
    /// Maximum gap between notifications of the same click
    pub window: Duration,
    /// Maximum pointer travel between notifications of the same click (in pixels)
    pub distance_threshold: f64,
}

impl Default for ClickDebouncer {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), 4.0)
    }
}

impl ClickDebouncer {
    pub fn new(window: Duration, distance_threshold: f64) -> Self {
        Self {
            last_click_position: None,
            last_click_time: None,
            last_click_button: None,
            window,
            distance_threshold,
        }
    }

    /// Returns true when the click is new, false when it repeats the last one.
    pub fn accept(&mut self, button: MouseButton, position: Point, now: Instant) -> bool {
        let duplicate = match (
            self.last_click_position,
            self.last_click_time,
            self.last_click_button,
        ) {
            (Some(last_pos), Some(last_time), Some(last_button)) => {
                let gap = if now >= last_time {
                    now - last_time
                } else {
                    last_time - now
                };
                last_button == button
                    && gap <= self.window
                    && position.distance(last_pos) <= self.distance_threshold
            }
            _ => false,
        };

        if !duplicate {
            self.last_click_position = Some(position);
            self.last_click_time = Some(now);
            self.last_click_button = Some(button);
        }
        !duplicate
    }

    pub fn reset(&mut self) {
        self.last_click_position = None;
        self.last_click_time = None;
        self.last_click_button = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_click_seen_twice() {
        let mut debouncer = ClickDebouncer::default();
        let t0 = Instant::now();
        assert!(debouncer.accept(MouseButton::Left, Point::new(100, 100), t0));
        assert!(!debouncer.accept(
            MouseButton::Left,
            Point::new(102, 101),
            t0 + Duration::from_millis(40)
        ));
    }

    #[test]
    fn test_poll_may_report_before_hook() {
        let mut debouncer = ClickDebouncer::default();
        let t0 = Instant::now() + Duration::from_millis(100);
        assert!(debouncer.accept(MouseButton::Left, Point::new(5, 5), t0));
        assert!(!debouncer.accept(
            MouseButton::Left,
            Point::new(5, 5),
            t0 - Duration::from_millis(30)
        ));
    }

    #[test]
    fn test_distinct_clicks() {
        let mut debouncer = ClickDebouncer::default();
        let t0 = Instant::now();
        assert!(debouncer.accept(MouseButton::Left, Point::new(100, 100), t0));
        // Far away
        assert!(debouncer.accept(
            MouseButton::Left,
            Point::new(140, 100),
            t0 + Duration::from_millis(10)
        ));
        // Too late
        assert!(debouncer.accept(
            MouseButton::Left,
            Point::new(140, 100),
            t0 + Duration::from_millis(400)
        ));
        // Other button
        assert!(debouncer.accept(
            MouseButton::Right,
            Point::new(140, 100),
            t0 + Duration::from_millis(410)
        ));
    }

    #[test]
    fn test_reset() {
        let mut debouncer = ClickDebouncer::default();
        let t0 = Instant::now();
        assert!(debouncer.accept(MouseButton::Left, Point::new(1, 1), t0));
        debouncer.reset();
        assert!(debouncer.accept(MouseButton::Left, Point::new(1, 1), t0));
    }
}
