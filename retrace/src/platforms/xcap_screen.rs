use crate::errors::AutomationError;
use crate::platforms::{ForegroundWindow, ScreenCapturer};
use crate::types::{Rect, ScreenshotResult};
use image::RgbaImage;
use tracing::debug;

/// Screen capture through xcap
#[derive(Debug, Default, Clone, Copy)]
pub struct XcapScreen;

impl XcapScreen {
    pub fn new() -> Self {
        Self
    }
}

fn platform_err(context: &str, e: impl std::fmt::Display) -> AutomationError {
    AutomationError::PlatformError(format!("{context}: {e}"))
}

fn focused_window() -> Result<xcap::Window, AutomationError> {
    let windows = xcap::Window::all().map_err(|e| platform_err("Failed to get windows", e))?;
    windows
        .into_iter()
        .find(|w| w.is_focused().unwrap_or(false) && !w.is_minimized().unwrap_or(false))
        .ok_or_else(|| AutomationError::ElementNotFound("No focused window found".to_string()))
}

impl ScreenCapturer for XcapScreen {
    fn capture_virtual_screen(&self) -> Result<ScreenshotResult, AutomationError> {
        let monitors = xcap::Monitor::all().map_err(|e| platform_err("Failed to get monitors", e))?;

        let mut shots = Vec::with_capacity(monitors.len());
        let mut bounds: Option<Rect> = None;
        for monitor in monitors {
            let x = monitor.x().map_err(|e| platform_err("Failed to get monitor x", e))?;
            let y = monitor.y().map_err(|e| platform_err("Failed to get monitor y", e))?;
            let image = monitor
                .capture_image()
                .map_err(|e| platform_err("Failed to capture monitor", e))?;
            let rect = Rect::new(x, y, image.width() as i32, image.height() as i32);
            bounds = Some(match bounds {
                Some(b) => b.union(&rect),
                None => rect,
            });
            shots.push((rect, image));
        }

        let bounds =
            bounds.ok_or_else(|| AutomationError::PlatformError("No monitors found".to_string()))?;
        let mut canvas = RgbaImage::new(bounds.width as u32, bounds.height as u32);
        for (rect, image) in &shots {
            image::imageops::overlay(
                &mut canvas,
                image,
                (rect.x - bounds.x) as i64,
                (rect.y - bounds.y) as i64,
            );
        }
        debug!(
            "Captured virtual screen {}x{} at {},{} from {} monitor(s)",
            bounds.width,
            bounds.height,
            bounds.x,
            bounds.y,
            shots.len()
        );
        Ok(ScreenshotResult::new(canvas, bounds.x, bounds.y))
    }

    fn capture_active_window(&self) -> Result<ScreenshotResult, AutomationError> {
        let window = focused_window()?;
        let x = window.x().map_err(|e| platform_err("Failed to get window x", e))?;
        let y = window.y().map_err(|e| platform_err("Failed to get window y", e))?;
        let image = window
            .capture_image()
            .map_err(|e| platform_err("Failed to capture window", e))?;
        Ok(ScreenshotResult::new(image, x, y))
    }

    fn foreground_window(&self) -> Option<ForegroundWindow> {
        let window = focused_window().ok()?;
        Some(ForegroundWindow {
            title: window.title().unwrap_or_default(),
            app_name: window.app_name().unwrap_or_default(),
            process_id: window.pid().ok(),
        })
    }
}
