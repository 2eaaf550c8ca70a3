use super::{InputSink, RawInputSource};
use crate::error::{RecorderError, Result};
use crate::events::{InputOrigin, MouseButton, RawInputEvent, RawInputKind};
use rdev::{Button, EventType};
use retrace::{Key, Point};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{error, info};

/// Global hook backed by `rdev::listen`.
///
/// `rdev` offers no way to unregister a listener, so the listener thread
/// stays alive after [`RawInputSource::stop`] and simply drops events.
/// Starting again re-attaches to the same thread.
pub struct RdevInputSource {
    stop_indicator: Arc<AtomicBool>,
    sink: Arc<Mutex<Option<InputSink>>>,
    listening: AtomicBool,
}

impl RdevInputSource {
    pub fn new() -> Self {
        Self {
            stop_indicator: Arc::new(AtomicBool::new(true)),
            sink: Arc::new(Mutex::new(None)),
            listening: AtomicBool::new(false),
        }
    }
}

impl Default for RdevInputSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RawInputSource for RdevInputSource {
    fn start(&self, sink: InputSink) -> Result<()> {
        *self
            .sink
            .lock()
            .map_err(|_| RecorderError::InputSource("hook state poisoned".to_string()))? =
            Some(sink);
        self.stop_indicator.store(false, Ordering::SeqCst);

        if self.listening.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let stop_indicator = Arc::clone(&self.stop_indicator);
        let sink = Arc::clone(&self.sink);
        thread::Builder::new()
            .name("retrace-rdev-hook".to_string())
            .spawn(move || {
                info!("Global input hook thread started");
                let mut last_position: Option<Point> = None;

                if let Err(error) = rdev::listen(move |event: rdev::Event| {
                    if stop_indicator.load(Ordering::SeqCst) {
                        return;
                    }
                    let Some(sink) = sink.lock().ok().and_then(|s| s.clone()) else {
                        return;
                    };

                    match event.event_type {
                        EventType::MouseMove { x, y } => {
                            last_position = Some(Point::new(x.round() as i32, y.round() as i32));
                        }
                        EventType::ButtonPress(button) => {
                            let (Some(button), Some(position)) = (map_button(button), last_position)
                            else {
                                return;
                            };
                            sink(RawInputEvent::new(
                                RawInputKind::MouseDown { button, position },
                                InputOrigin::Hook,
                            ));
                        }
                        EventType::KeyPress(key) => {
                            if let Some(key) = map_key(key) {
                                sink(RawInputEvent::key_down(key));
                            }
                            if let Some(name) = event.name.as_deref() {
                                for c in name.chars().filter(|c| !c.is_control()) {
                                    sink(RawInputEvent::char(c));
                                }
                            }
                        }
                        EventType::KeyRelease(key) => {
                            if let Some(key) = map_key(key) {
                                sink(RawInputEvent::key_up(key));
                            }
                        }
                        _ => {}
                    }
                }) {
                    error!("Global input hook failed: {:?}", error);
                }
            })
            .map_err(|e| RecorderError::InputSource(format!("failed to spawn hook thread: {e}")))?;
        Ok(())
    }

    fn stop(&self) {
        self.stop_indicator.store(true, Ordering::SeqCst);
        if let Ok(mut sink) = self.sink.lock() {
            *sink = None;
        }
    }
}

fn map_button(button: Button) -> Option<MouseButton> {
    match button {
        Button::Left => Some(MouseButton::Left),
        Button::Right => Some(MouseButton::Right),
        Button::Middle => Some(MouseButton::Middle),
        Button::Unknown(_) => None,
    }
}

fn map_key(key: rdev::Key) -> Option<Key> {
    use rdev::Key as K;
    let mapped = match key {
        K::ControlLeft | K::ControlRight => Key::Control,
        K::ShiftLeft | K::ShiftRight => Key::Shift,
        K::Alt => Key::Alt,
        K::MetaLeft | K::MetaRight => Key::Meta,
        K::Return | K::KpReturn => Key::Enter,
        K::Tab => Key::Tab,
        K::Backspace => Key::Backspace,
        K::Delete => Key::Delete,
        K::Escape => Key::Escape,
        K::Space => Key::Space,
        K::UpArrow => Key::Up,
        K::DownArrow => Key::Down,
        K::LeftArrow => Key::Left,
        K::RightArrow => Key::Right,
        K::Home => Key::Home,
        K::End => Key::End,
        K::PageUp => Key::PageUp,
        K::PageDown => Key::PageDown,
        K::F1 => Key::F(1),
        K::F2 => Key::F(2),
        K::F3 => Key::F(3),
        K::F4 => Key::F(4),
        K::F5 => Key::F(5),
        K::F6 => Key::F(6),
        K::F7 => Key::F(7),
        K::F8 => Key::F(8),
        K::F9 => Key::F(9),
        K::F10 => Key::F(10),
        K::F11 => Key::F(11),
        K::F12 => Key::F(12),
        other => {
            // KeyA..KeyZ and Num0..Num9
            let name = format!("{other:?}");
            let c = name
                .strip_prefix("Key")
                .or_else(|| name.strip_prefix("Num"))
                .and_then(|rest| {
                    let mut chars = rest.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) if c.is_ascii_alphanumeric() => Some(c),
                        _ => None,
                    }
                })?;
            Key::Char(c.to_ascii_lowercase())
        }
    };
    Some(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_key() {
        assert_eq!(map_key(rdev::Key::KeyQ), Some(Key::Char('q')));
        assert_eq!(map_key(rdev::Key::Num7), Some(Key::Char('7')));
        assert_eq!(map_key(rdev::Key::ControlRight), Some(Key::Control));
        assert_eq!(map_key(rdev::Key::F12), Some(Key::F(12)));
        assert_eq!(map_key(rdev::Key::CapsLock), None);
        // AltGr composes characters and must not suppress them.
        assert_eq!(map_key(rdev::Key::AltGr), None);
    }
}
