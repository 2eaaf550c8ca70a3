//! Keys, hotkeys and the `{KEY}` token language used by `TypeText` steps

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::errors::AutomationError;
use crate::types::Point;

/// A physical key as seen by the input hooks and the injection provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Control,
    Shift,
    Alt,
    Meta,
    Enter,
    Tab,
    Backspace,
    Delete,
    Escape,
    Space,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
    /// Printable key, stored lowercase.
    Char(char),
}

impl Key {
    pub fn is_modifier(&self) -> bool {
        matches!(self, Key::Control | Key::Shift | Key::Alt | Key::Meta)
    }
}

impl FromStr for Key {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let key = match upper.as_str() {
            "CTRL" | "CONTROL" => Key::Control,
            "SHIFT" => Key::Shift,
            "ALT" => Key::Alt,
            "WIN" | "META" | "CMD" | "SUPER" => Key::Meta,
            "ENTER" | "RETURN" => Key::Enter,
            "TAB" => Key::Tab,
            "BACKSPACE" | "BS" => Key::Backspace,
            "DELETE" | "DEL" => Key::Delete,
            "ESC" | "ESCAPE" => Key::Escape,
            "SPACE" => Key::Space,
            "UP" => Key::Up,
            "DOWN" => Key::Down,
            "LEFT" => Key::Left,
            "RIGHT" => Key::Right,
            "HOME" => Key::Home,
            "END" => Key::End,
            "PGUP" | "PAGEUP" => Key::PageUp,
            "PGDN" | "PAGEDOWN" => Key::PageDown,
            _ => {
                if let Some(n) = upper.strip_prefix('F').and_then(|n| n.parse::<u8>().ok()) {
                    if (1..=24).contains(&n) {
                        return Ok(Key::F(n));
                    }
                }
                let mut chars = upper.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_alphanumeric() => {
                        Key::Char(c.to_ascii_lowercase())
                    }
                    _ => {
                        return Err(AutomationError::InvalidArgument(format!(
                            "unknown key '{s}'"
                        )))
                    }
                }
            }
        };
        Ok(key)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Control => f.write_str("CTRL"),
            Key::Shift => f.write_str("SHIFT"),
            Key::Alt => f.write_str("ALT"),
            Key::Meta => f.write_str("WIN"),
            Key::Enter => f.write_str("ENTER"),
            Key::Tab => f.write_str("TAB"),
            Key::Backspace => f.write_str("BACKSPACE"),
            Key::Delete => f.write_str("DELETE"),
            Key::Escape => f.write_str("ESC"),
            Key::Space => f.write_str("SPACE"),
            Key::Up => f.write_str("UP"),
            Key::Down => f.write_str("DOWN"),
            Key::Left => f.write_str("LEFT"),
            Key::Right => f.write_str("RIGHT"),
            Key::Home => f.write_str("HOME"),
            Key::End => f.write_str("END"),
            Key::PageUp => f.write_str("PGUP"),
            Key::PageDown => f.write_str("PGDN"),
            Key::F(n) => write!(f, "F{n}"),
            Key::Char(c) => write!(f, "{}", c.to_ascii_uppercase()),
        }
    }
}

/// A key combination such as `Ctrl+Shift+F12`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hotkey {
    keys: Vec<Key>,
}

impl Hotkey {
    pub fn new(keys: Vec<Key>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// The non-modifier key whose press completes the combination.
    pub fn trigger(&self) -> Option<Key> {
        self.keys.iter().copied().find(|k| !k.is_modifier())
    }

    pub fn is_pressed(&self, pressed: &HashSet<Key>) -> bool {
        !self.keys.is_empty() && self.keys.iter().all(|k| pressed.contains(k))
    }
}

impl Default for Hotkey {
    fn default() -> Self {
        Self::new(vec![Key::Control, Key::Shift, Key::F(12)])
    }
}

impl FromStr for Hotkey {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let keys = s
            .split('+')
            .map(str::parse::<Key>)
            .collect::<Result<Vec<_>, _>>()?;
        if keys.is_empty() {
            return Err(AutomationError::InvalidArgument("empty hotkey".to_string()));
        }
        Ok(Self::new(keys))
    }
}

impl TryFrom<String> for Hotkey {
    type Error = AutomationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Hotkey> for String {
    fn from(value: Hotkey) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.keys.iter().map(|k| k.to_string()).collect();
        f.write_str(&parts.join("+"))
    }
}

/// Point-in-time state of pointer and keyboard, as read by a poller
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSnapshot {
    pub cursor: Option<Point>,
    pub left_button_down: bool,
    pub pressed_keys: HashSet<Key>,
}

/// One piece of a `TypeText` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyChunk {
    Text(String),
    Combo(Vec<Key>),
}

/// Splits `Hello{TAB}World{CTRL+S}` into text runs and key combinations.
///
/// A brace group is a key token only when every `+`-separated part names a
/// key; anything else, including `{{var}}` placeholders, stays literal.
pub fn parse_key_sequence(input: &str) -> Vec<KeyChunk> {
    let mut chunks = Vec::new();
    let mut text = String::new();
    let mut rest = input;

    while let Some(open) = rest.find('{') {
        text.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let combo = after.find('}').and_then(|close| {
            let inner = &after[..close];
            if inner.is_empty()
                || !inner
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '+')
            {
                return None;
            }
            inner
                .parse::<Hotkey>()
                .ok()
                .map(|h| (h.keys().to_vec(), close))
        });
        match combo {
            Some((keys, close)) => {
                if !text.is_empty() {
                    chunks.push(KeyChunk::Text(std::mem::take(&mut text)));
                }
                chunks.push(KeyChunk::Combo(keys));
                rest = &after[close + 1..];
            }
            None => {
                text.push('{');
                rest = after;
            }
        }
    }
    text.push_str(rest);
    if !text.is_empty() {
        chunks.push(KeyChunk::Text(text));
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hotkey() {
        let hk: Hotkey = "Ctrl+Shift+F12".parse().unwrap();
        assert_eq!(hk.keys(), &[Key::Control, Key::Shift, Key::F(12)]);
        assert_eq!(hk.trigger(), Some(Key::F(12)));
        assert_eq!(hk.to_string(), "CTRL+SHIFT+F12");
        assert!("Ctrl+Banana".parse::<Hotkey>().is_err());
    }

    #[test]
    fn test_hotkey_pressed() {
        let hk = Hotkey::default();
        let mut pressed: HashSet<Key> = [Key::Control, Key::F(12)].into_iter().collect();
        assert!(!hk.is_pressed(&pressed));
        pressed.insert(Key::Shift);
        assert!(hk.is_pressed(&pressed));
    }

    #[test]
    fn test_parse_key_sequence() {
        let chunks = parse_key_sequence("user{TAB}secret{ENTER}");
        assert_eq!(
            chunks,
            vec![
                KeyChunk::Text("user".to_string()),
                KeyChunk::Combo(vec![Key::Tab]),
                KeyChunk::Text("secret".to_string()),
                KeyChunk::Combo(vec![Key::Enter]),
            ]
        );
    }

    #[test]
    fn test_parse_key_sequence_keeps_unknown_braces() {
        assert_eq!(
            parse_key_sequence("{{name}} {not a key} {CTRL+A}"),
            vec![
                KeyChunk::Text("{{name}} {not a key} ".to_string()),
                KeyChunk::Combo(vec![Key::Control, Key::Char('a')]),
            ]
        );
        assert_eq!(
            parse_key_sequence("{unclosed"),
            vec![KeyChunk::Text("{unclosed".to_string())]
        );
    }
}
