//! Common types shared by the recorder and the runner

use crate::errors::AutomationError;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::info;

/// Represents a position on the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Moves the point, clamping at the edges of the `i32` plane.
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.y.saturating_add(dy))
    }

    pub fn distance(self, other: Point) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        (dx * dx + dy * dy).sqrt()
    }

    /// Parses a literal `x,y` pair as authored in step values.
    pub fn parse(s: &str) -> Option<Point> {
        let (x, y) = s.trim().split_once(',')?;
        let x = x.trim().parse::<f64>().ok()?;
        let y = y.trim().parse::<f64>().ok()?;
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        Some(Point::new(x.round() as i32, y.round() as i32))
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Represents a rectangle in screen coordinates
///
/// Coordinates come from scripts, so the arithmetic below saturates instead
/// of overflowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.x.saturating_add(self.width / 2),
            self.y.saturating_add(self.height / 2),
        )
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.y >= self.y && p.x < self.right() && p.y < self.bottom()
    }

    /// Grows the rectangle by `pad` pixels on every side.
    pub fn inflate(&self, pad: i32) -> Rect {
        let grow = pad.saturating_mul(2);
        Rect::new(
            self.x.saturating_sub(pad),
            self.y.saturating_sub(pad),
            self.width.saturating_add(grow),
            self.height.saturating_add(grow),
        )
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.width,
            self.height,
        )
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return None;
        }
        Some(Rect::new(
            left,
            top,
            right.saturating_sub(left),
            bottom.saturating_sub(top),
        ))
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &Rect) -> Rect {
        let left = self.x.min(other.x);
        let top = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(
            left,
            top,
            right.saturating_sub(left),
            bottom.saturating_sub(top),
        )
    }

    /// Parses `x,y,w,h`. The far edges must fit in `i32`.
    pub fn parse(s: &str) -> Option<Rect> {
        let parts: Vec<i32> = s
            .split(',')
            .map(|p| p.trim().parse::<i32>())
            .collect::<Result<_, _>>()
            .ok()?;
        match parts.as_slice() {
            [x, y, w, h] if *w > 0 && *h > 0 => {
                x.checked_add(*w)?;
                y.checked_add(*h)?;
                Some(Rect::new(*x, *y, *w, *h))
            }
            _ => None,
        }
    }
}

/// Pixel offset from the centre of a resolved element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Offset {
    pub dx: i32,
    pub dy: i32,
}

/// Holds the screenshot data
///
/// `x`/`y` are the screen coordinates of the top-left pixel so that
/// positions found inside the image can be mapped back onto the screen.
#[derive(Debug, Clone)]
pub struct ScreenshotResult {
    pub image: RgbaImage,
    pub x: i32,
    pub y: i32,
}

impl ScreenshotResult {
    pub fn new(image: RgbaImage, x: i32, y: i32) -> Self {
        Self { image, x, y }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width() as i32, self.height() as i32)
    }

    /// Copies out the part of the capture covered by `region` (screen coordinates).
    pub fn crop(&self, region: &Rect) -> Option<ScreenshotResult> {
        let visible = self.bounds().intersect(region)?;
        let local_x = visible.x.abs_diff(self.x);
        let local_y = visible.y.abs_diff(self.y);
        let view = image::imageops::crop_imm(
            &self.image,
            local_x,
            local_y,
            visible.width as u32,
            visible.height as u32,
        );
        Some(ScreenshotResult::new(view.to_image(), visible.x, visible.y))
    }
}

/// A partial, disjunctive description of a UI element.
///
/// Absent and empty fields are kept distinct on disk; for matching purposes
/// both count as "not specified".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_type: Option<String>,
    /// Path of a PNG cropped around the element at record time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<Offset>,
}

pub(crate) fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Target {
    pub fn automation_id(&self) -> Option<&str> {
        non_empty(&self.automation_id)
    }

    pub fn name(&self) -> Option<&str> {
        non_empty(&self.name)
    }

    pub fn class_name(&self) -> Option<&str> {
        non_empty(&self.class_name)
    }

    pub fn control_type(&self) -> Option<&str> {
        non_empty(&self.control_type)
    }

    pub fn image_path(&self) -> Option<&str> {
        non_empty(&self.image_path)
    }

    /// True when no structural field is set.
    pub fn has_structural_fields(&self) -> bool {
        self.automation_id().is_some()
            || self.name().is_some()
            || self.class_name().is_some()
            || self.control_type().is_some()
    }

    /// A target with nothing to resolve against.
    pub fn is_empty(&self) -> bool {
        !self.has_structural_fields() && self.image_path().is_none()
    }

    /// No identifier, name or class: structural replay is unlikely to be reliable.
    pub fn is_weak(&self) -> bool {
        self.automation_id().is_none() && self.name().is_none() && self.class_name().is_none()
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(id) = self.automation_id() {
            parts.push(format!("id='{id}'"));
        }
        if let Some(name) = self.name() {
            parts.push(format!("name='{name}'"));
        }
        if let Some(class) = self.class_name() {
            parts.push(format!("class='{class}'"));
        }
        if let Some(ty) = self.control_type() {
            parts.push(format!("type='{ty}'"));
        }
        if let Some(img) = self.image_path() {
            parts.push(format!("image='{img}'"));
        }
        if let Some(off) = self.offset {
            parts.push(format!("offset={},{}", off.dx, off.dy));
        }
        if parts.is_empty() {
            "<empty target>".to_string()
        } else {
            parts.join(" ")
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// The action performed by a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Click,
    SetText,
    TypeText,
    AssertExists,
    AssertTextEquals,
    AssertTextContains,
    SmartFindClick,
    SmartExtract,
    OcrRead,
    PasteVar,
    Delay,
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Action::Click => "Click",
            Action::SetText => "SetText",
            Action::TypeText => "TypeText",
            Action::AssertExists => "AssertExists",
            Action::AssertTextEquals => "AssertTextEquals",
            Action::AssertTextContains => "AssertTextContains",
            Action::SmartFindClick => "SmartFindClick",
            Action::SmartExtract => "SmartExtract",
            Action::OcrRead => "OcrRead",
            Action::PasteVar => "PasteVar",
            Action::Delay => "Delay",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One recorded or authored action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    #[serde(default)]
    pub value: String,
    /// Fixed wait before the step runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Step {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            target: None,
            value: String::new(),
            delay_ms: None,
            note: None,
        }
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Where structural lookups are rooted
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Desktop,
    Process(String),
}

impl Scope {
    /// An empty application name means the whole desktop.
    pub fn from_app(app: &str) -> Self {
        let app = app.trim();
        if app.is_empty() {
            Scope::Desktop
        } else {
            Scope::Process(app.to_string())
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Desktop => f.write_str("desktop"),
            Scope::Process(name) => write!(f, "process '{name}'"),
        }
    }
}

/// An application target plus an ordered step sequence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// Process name, or empty for the whole desktop.
    #[serde(default)]
    pub app: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Script {
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            steps: Vec::new(),
        }
    }

    pub fn scope(&self) -> Scope {
        Scope::from_app(&self.app)
    }

    pub fn push(&mut self, step: Step) -> usize {
        self.steps.push(step);
        self.steps.len() - 1
    }

    /// Replaces the step at `index` with an edited clone.
    pub fn replace(&mut self, index: usize, step: Step) -> Result<(), AutomationError> {
        let slot = self.steps.get_mut(index).ok_or_else(|| {
            AutomationError::InvalidArgument(format!("no step at index {index}"))
        })?;
        *slot = step;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), AutomationError> {
        info!("Saving script with {} steps to {:?}", self.steps.len(), path.as_ref());
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, AutomationError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let script: Script = serde_json::from_str(&content)?;
        info!(
            "Loaded script for '{}' with {} steps from {:?}",
            script.app,
            script.steps.len(),
            path.as_ref()
        );
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_parse() {
        assert_eq!(Point::parse("10,20"), Some(Point::new(10, 20)));
        assert_eq!(Point::parse(" 10.6 , 20.2 "), Some(Point::new(11, 20)));
        assert_eq!(Point::parse("10"), None);
        assert_eq!(Point::parse("a,b"), None);
        assert_eq!(Point::parse(""), None);
    }

    #[test]
    fn test_rect_helpers() {
        let r = Rect::new(10, 10, 20, 10);
        assert_eq!(r.center(), Point::new(20, 15));
        assert!(r.contains(Point::new(10, 10)));
        assert!(!r.contains(Point::new(30, 10)));
        assert_eq!(
            r.intersect(&Rect::new(25, 0, 100, 100)),
            Some(Rect::new(25, 10, 5, 10))
        );
        assert_eq!(r.intersect(&Rect::new(100, 100, 5, 5)), None);
        assert_eq!(Rect::parse("1,2,3,4"), Some(Rect::new(1, 2, 3, 4)));
        assert_eq!(Rect::parse("1,2,0,4"), None);
    }

    #[test]
    fn test_target_emptiness_and_weakness() {
        let empty = Target {
            name: Some("   ".to_string()),
            ..Target::default()
        };
        assert!(empty.is_empty());
        assert!(empty.is_weak());

        let typed_only = Target {
            control_type: Some("Button".to_string()),
            ..Target::default()
        };
        assert!(!typed_only.is_empty());
        assert!(typed_only.is_weak());

        let named = Target {
            name: Some("OK".to_string()),
            ..Target::default()
        };
        assert!(!named.is_weak());
    }

    #[test]
    fn test_scope_from_app() {
        assert_eq!(Scope::from_app(""), Scope::Desktop);
        assert_eq!(
            Scope::from_app("notepad.exe"),
            Scope::Process("notepad.exe".to_string())
        );
    }

    #[test]
    fn test_screenshot_crop_clips_to_capture() {
        let shot = ScreenshotResult::new(RgbaImage::new(10, 10), 100, 100);
        let crop = shot.crop(&Rect::new(95, 105, 10, 10)).unwrap();
        assert_eq!((crop.x, crop.y), (100, 105));
        assert_eq!((crop.width(), crop.height()), (5, 5));
        assert!(shot.crop(&Rect::new(0, 0, 5, 5)).is_none());
    }

    #[test]
    fn test_geometry_at_the_edge_of_i32() {
        let far = Rect::new(2_147_483_000, 0, 1000, 10);
        assert_eq!(far.right(), i32::MAX);
        assert_eq!(Rect::parse("2147483000,0,1000,10"), None);
        assert_eq!(Rect::parse("2147483000,0,647,10"), Some(Rect::new(2_147_483_000, 0, 647, 10)));

        let shot = ScreenshotResult::new(RgbaImage::new(10, 10), 0, 0);
        assert!(shot.crop(&far).is_none());
        assert_eq!(
            Rect::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX).intersect(&shot.bounds()),
            None
        );

        assert_eq!(far.translate(i32::MAX, 0).x, i32::MAX);
        assert_eq!(Point::new(i32::MAX, i32::MIN).offset(5, -5), Point::new(i32::MAX, i32::MIN));
        assert_eq!(far.center().x, 2_147_483_500);
    }
}
