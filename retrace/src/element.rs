use crate::errors::AutomationError;
use crate::types::{Rect, Target};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

/// Represents a UI element exposed by the structural query provider
#[derive(Clone)]
pub struct UIElement {
    inner: Arc<dyn UIElementImpl>,
}

/// Plain snapshot of the identifying attributes of an element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UIElementAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Rect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
}

/// Platform-side element. Optional capabilities default to "unsupported".
pub trait UIElementImpl: Send + Sync + Debug {
    fn automation_id(&self) -> Option<String>;
    fn name(&self) -> Option<String>;
    fn class_name(&self) -> Option<String>;
    fn control_type(&self) -> Option<String>;
    fn bounds(&self) -> Result<Rect, AutomationError>;
    fn process_id(&self) -> Option<u32>;

    fn supports_invoke(&self) -> bool {
        false
    }

    fn invoke(&self) -> Result<(), AutomationError> {
        Err(AutomationError::UnsupportedOperation(
            "invoke is not supported by this element".to_string(),
        ))
    }

    /// Value pattern support. Used as the "editable" heuristic while recording.
    fn supports_value(&self) -> bool {
        false
    }

    fn value(&self) -> Result<Option<String>, AutomationError> {
        Ok(None)
    }

    fn set_value(&self, _value: &str) -> Result<(), AutomationError> {
        Err(AutomationError::UnsupportedOperation(
            "value pattern is not supported by this element".to_string(),
        ))
    }

    /// Text pattern content, if the element exposes one.
    fn text(&self) -> Result<Option<String>, AutomationError> {
        Ok(None)
    }
}

impl UIElement {
    pub fn new(inner: impl UIElementImpl + 'static) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn from_arc(inner: Arc<dyn UIElementImpl>) -> Self {
        Self { inner }
    }

    pub fn automation_id(&self) -> Option<String> {
        self.inner.automation_id()
    }

    pub fn name(&self) -> Option<String> {
        self.inner.name()
    }

    pub fn name_or_empty(&self) -> String {
        self.inner.name().unwrap_or_default()
    }

    pub fn class_name(&self) -> Option<String> {
        self.inner.class_name()
    }

    pub fn control_type(&self) -> Option<String> {
        self.inner.control_type()
    }

    pub fn bounds(&self) -> Result<Rect, AutomationError> {
        self.inner.bounds()
    }

    pub fn process_id(&self) -> Option<u32> {
        self.inner.process_id()
    }

    pub fn supports_invoke(&self) -> bool {
        self.inner.supports_invoke()
    }

    pub fn invoke(&self) -> Result<(), AutomationError> {
        self.inner.invoke()
    }

    pub fn supports_value(&self) -> bool {
        self.inner.supports_value()
    }

    pub fn value(&self) -> Result<Option<String>, AutomationError> {
        self.inner.value()
    }

    pub fn set_value(&self, value: &str) -> Result<(), AutomationError> {
        self.inner.set_value(value)
    }

    pub fn text(&self) -> Result<Option<String>, AutomationError> {
        self.inner.text()
    }

    /// Reads the element's text: value pattern, then text pattern, then display name.
    pub fn read_text(&self) -> Result<String, AutomationError> {
        if self.supports_value() {
            if let Some(v) = self.value()? {
                return Ok(v);
            }
        }
        if let Some(t) = self.text()? {
            return Ok(t);
        }
        Ok(self.name_or_empty())
    }

    pub fn attributes(&self) -> UIElementAttributes {
        UIElementAttributes {
            automation_id: self.automation_id(),
            name: self.name(),
            class_name: self.class_name(),
            control_type: self.control_type(),
            bounds: self.bounds().ok(),
            process_id: self.process_id(),
        }
    }

    /// Builds a replayable target from the element's identifying fields.
    pub fn to_target(&self) -> Target {
        fn keep(v: Option<String>) -> Option<String> {
            v.filter(|s| !s.trim().is_empty())
        }
        Target {
            automation_id: keep(self.automation_id()),
            name: keep(self.name()),
            class_name: keep(self.class_name()),
            control_type: keep(self.control_type()),
            image_path: None,
            offset: None,
        }
    }
}

impl Debug for UIElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UIElement")
            .field("automation_id", &self.automation_id())
            .field("name", &self.name())
            .field("class_name", &self.class_name())
            .field("control_type", &self.control_type())
            .finish()
    }
}
