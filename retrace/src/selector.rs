use crate::element::UIElement;
use crate::types::Target;
use std::fmt;

/// Conjunction of the structural fields of a [`Target`].
///
/// Only the fields that are set take part; an element matches when every one
/// of them is equal (case-sensitive, surrounding whitespace ignored).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Selector {
    pub automation_id: Option<String>,
    pub name: Option<String>,
    pub class_name: Option<String>,
    pub control_type: Option<String>,
}

impl Selector {
    pub fn from_target(target: &Target) -> Self {
        Self {
            automation_id: target.automation_id().map(str::to_string),
            name: target.name().map(str::to_string),
            class_name: target.class_name().map(str::to_string),
            control_type: target.control_type().map(str::to_string),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.automation_id.is_none()
            && self.name.is_none()
            && self.class_name.is_none()
            && self.control_type.is_none()
    }

    pub fn matches(&self, element: &UIElement) -> bool {
        if self.is_empty() {
            return false;
        }
        field_matches(&self.automation_id, element.automation_id())
            && field_matches(&self.name, element.name())
            && field_matches(&self.class_name, element.class_name())
            && field_matches(&self.control_type, element.control_type())
    }
}

fn field_matches(expected: &Option<String>, actual: Option<String>) -> bool {
    match expected {
        None => true,
        Some(want) => actual.is_some_and(|have| have.trim() == want.trim()),
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(v) = &self.automation_id {
            parts.push(format!("AutomationId={v:?}"));
        }
        if let Some(v) = &self.name {
            parts.push(format!("Name={v:?}"));
        }
        if let Some(v) = &self.class_name {
            parts.push(format!("ClassName={v:?}"));
        }
        if let Some(v) = &self.control_type {
            parts.push(format!("ControlType={v:?}"));
        }
        write!(f, "{}", parts.join(" && "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockElement;

    #[test]
    fn test_selector_requires_every_field() {
        let target = Target {
            name: Some("OK".to_string()),
            control_type: Some("Button".to_string()),
            ..Target::default()
        };
        let selector = Selector::from_target(&target);

        let full = UIElement::new(MockElement::new("OK").with_control_type("Button"));
        let partial = UIElement::new(MockElement::new("OK").with_control_type("Text"));
        let missing = UIElement::new(MockElement::new("OK"));

        assert!(selector.matches(&full));
        assert!(!selector.matches(&partial));
        assert!(!selector.matches(&missing));
    }

    #[test]
    fn test_empty_selector_matches_nothing() {
        let selector = Selector::from_target(&Target::default());
        assert!(selector.is_empty());
        assert!(!selector.matches(&UIElement::new(MockElement::new("anything"))));
    }

    #[test]
    fn test_display_lists_conjunction() {
        let selector = Selector {
            automation_id: Some("btnOk".to_string()),
            name: Some("OK".to_string()),
            ..Selector::default()
        };
        assert_eq!(selector.to_string(), r#"AutomationId="btnOk" && Name="OK""#);
    }
}
