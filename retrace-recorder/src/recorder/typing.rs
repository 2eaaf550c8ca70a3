use retrace::{Action, Step, Target};
use std::time::{Duration, Instant};

/// Text typed since the last commit, and where it goes.
///
/// Bound to an editable target the buffer holds the field's whole value and
/// every commit replays as a `SetText` of that value, so a later commit into
/// the same field never erases an earlier one. Unbound, only the pending text
/// is kept and it replays as keystrokes through `TypeText`.
#[derive(Debug, Default)]
pub struct TypingBuffer {
    text: String,
    target: Option<Target>,
    pending: bool,
    last_input: Option<Instant>,
}

impl TypingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh field. Commit first; pending text is discarded.
    pub fn bind(&mut self, target: Target) {
        self.reset();
        self.target = Some(target);
    }

    /// Drops the binding. Commit first; pending text is discarded.
    pub fn unbind(&mut self) {
        self.reset();
        self.target = None;
    }

    fn reset(&mut self) {
        self.text.clear();
        self.pending = false;
        self.last_input = None;
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// Current value of the bound field, or the pending keystrokes.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// True when nothing awaits a commit.
    pub fn is_empty(&self) -> bool {
        !self.pending
    }

    pub fn push(&mut self, c: char, at: Instant) {
        self.text.push(c);
        self.pending = true;
        self.last_input = Some(at);
    }

    pub fn backspace(&mut self, at: Instant) {
        if self.text.pop().is_some() {
            self.pending = true;
            self.last_input = Some(at);
        }
    }

    /// True when text is pending and nothing was typed for `idle`.
    pub fn is_idle(&self, now: Instant, idle: Duration) -> bool {
        self.pending
            && self
                .last_input
                .is_some_and(|last| now.saturating_duration_since(last) >= idle)
    }

    /// Turns pending input into a step. A bound field keeps its value so
    /// typing can continue into it.
    pub fn commit(&mut self) -> Option<Step> {
        if !self.pending {
            return None;
        }
        self.pending = false;
        self.last_input = None;
        let step = match &self.target {
            Some(target) => Step::new(Action::SetText)
                .with_target(target.clone())
                .with_value(self.text.clone()),
            None => Step::new(Action::TypeText).with_value(std::mem::take(&mut self.text)),
        };
        Some(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_unbound_is_type_text() {
        let mut buf = TypingBuffer::new();
        let t0 = Instant::now();
        for c in "hi".chars() {
            buf.push(c, t0);
        }
        let step = buf.commit().unwrap();
        assert_eq!(step.action, Action::TypeText);
        assert_eq!(step.value, "hi");
        assert!(step.target.is_none());
        assert!(buf.commit().is_none());
    }

    #[test]
    fn test_commit_bound_is_set_text() {
        let mut buf = TypingBuffer::new();
        let target = Target {
            automation_id: Some("user".to_string()),
            ..Target::default()
        };
        buf.bind(target.clone());
        let t0 = Instant::now();
        for c in "bob".chars() {
            buf.push(c, t0);
        }
        let step = buf.commit().unwrap();
        assert_eq!(step.action, Action::SetText);
        assert_eq!(step.target, Some(target));
        assert_eq!(step.value, "bob");
        assert!(buf.target().is_some());
    }

    #[test]
    fn test_bound_commits_carry_the_whole_value() {
        let mut buf = TypingBuffer::new();
        buf.bind(Target {
            automation_id: Some("note".to_string()),
            ..Target::default()
        });
        let t0 = Instant::now();
        for c in "hello".chars() {
            buf.push(c, t0);
        }
        assert_eq!(buf.commit().unwrap().value, "hello");
        assert!(buf.commit().is_none());

        buf.backspace(t0);
        for c in "p!".chars() {
            buf.push(c, t0);
        }
        assert_eq!(buf.commit().unwrap().value, "hellp!");

        buf.bind(Target {
            automation_id: Some("other".to_string()),
            ..Target::default()
        });
        assert_eq!(buf.text(), "");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_backspace_and_idle() {
        let mut buf = TypingBuffer::new();
        let t0 = Instant::now();
        buf.backspace(t0);
        assert!(buf.is_empty());
        for c in "abx".chars() {
            buf.push(c, t0);
        }
        buf.backspace(t0);
        assert_eq!(buf.text(), "ab");
        let idle = Duration::from_millis(1500);
        assert!(!buf.is_idle(t0 + Duration::from_millis(1000), idle));
        assert!(buf.is_idle(t0 + Duration::from_millis(1500), idle));
    }
}
