//! Argument parsing and post-processing for the OCR-driven step actions
//!
//! `SmartFindClick` values look like `Save As;min=0.75;fuzzy=false`.
//! `SmartExtract` / `OcrRead` values are `;`-separated `key=value` pairs:
//!
//! ```text
//! var=total;rect=0,24,120,18;relative=true;pre=gray,threshold:140;digits=true;pattern=(\d+)
//! ```
//!
//! `pattern=` consumes the rest of the value, so regexes may contain `;`.

use crate::errors::AutomationError;
use crate::types::{Point, Rect};
use image::{Rgba, RgbaImage};
use regex::Regex;
use tracing::warn;

/// Variable written when an extraction step does not name one.
pub const DEFAULT_VARIABLE: &str = "ocr_text";

#[derive(Debug, Clone, PartialEq)]
pub struct SmartFindArgs {
    pub prompt: String,
    pub min_score: Option<f64>,
    pub fuzzy: Option<bool>,
}

impl SmartFindArgs {
    pub fn parse(value: &str) -> Result<Self, AutomationError> {
        let mut parts = value.split(';');
        let mut prompt = parts.next().unwrap_or_default().trim().to_string();
        let mut min_score = None;
        let mut fuzzy = None;
        for part in parts {
            match part.split_once('=').map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim())) {
                Some((key, v)) if key == "min" => {
                    min_score = Some(v.parse::<f64>().map_err(|_| {
                        AutomationError::InvalidStep(format!("invalid min score '{v}'"))
                    })?);
                }
                Some((key, v)) if key == "fuzzy" => fuzzy = Some(parse_bool(v)?),
                // Not an option: the prompt itself contained a ';'
                _ => {
                    prompt.push(';');
                    prompt.push_str(part);
                }
            }
        }
        if prompt.trim().is_empty() {
            return Err(AutomationError::InvalidStep(
                "SmartFindClick needs a prompt".to_string(),
            ));
        }
        Ok(Self {
            prompt,
            min_score,
            fuzzy,
        })
    }
}

/// Image clean-up applied before recognition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Preprocess {
    pub grayscale: bool,
    pub threshold: Option<u8>,
    pub invert: bool,
}

impl Preprocess {
    pub fn is_noop(&self) -> bool {
        !self.grayscale && self.threshold.is_none() && !self.invert
    }

    fn parse(value: &str) -> Result<Self, AutomationError> {
        let mut pre = Preprocess::default();
        for op in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let lower = op.to_ascii_lowercase();
            match lower.split_once(':') {
                None if lower == "gray" || lower == "grey" || lower == "grayscale" => {
                    pre.grayscale = true
                }
                None if lower == "invert" => pre.invert = true,
                None if lower == "threshold" => pre.threshold = Some(128),
                Some(("threshold", level)) => {
                    pre.threshold = Some(level.trim().parse::<u8>().map_err(|_| {
                        AutomationError::InvalidStep(format!("invalid threshold '{level}'"))
                    })?)
                }
                _ => {
                    return Err(AutomationError::InvalidStep(format!(
                        "unknown preprocessing step '{op}'"
                    )))
                }
            }
        }
        Ok(pre)
    }

    /// Returns a processed copy. Thresholding implies grayscale.
    pub fn apply(&self, image: &RgbaImage) -> RgbaImage {
        let mut out = image.clone();
        if self.grayscale || self.threshold.is_some() {
            for px in out.pixels_mut() {
                let [r, g, b, a] = px.0;
                let mut y = ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8;
                if let Some(level) = self.threshold {
                    y = if y >= level { 255 } else { 0 };
                }
                *px = Rgba([y, y, y, a]);
            }
        }
        if self.invert {
            image::imageops::invert(&mut out);
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractArgs {
    pub var: Option<String>,
    pub rect: Option<Rect>,
    pub relative: bool,
    pub preprocess: Preprocess,
    pub digits: bool,
    pub retries: Option<u32>,
    pub delay_ms: Option<u64>,
    pub pattern: Option<Regex>,
}

impl ExtractArgs {
    pub fn parse(value: &str) -> Result<Self, AutomationError> {
        let mut args = ExtractArgs::default();
        let mut rest = value.trim();
        while !rest.is_empty() {
            let (segment, tail) = match rest.find(';') {
                Some(i) => (&rest[..i], &rest[i + 1..]),
                None => (rest, ""),
            };
            if segment.trim().is_empty() {
                rest = tail.trim_start();
                continue;
            }
            let Some((key, val)) = segment.split_once('=') else {
                return Err(AutomationError::InvalidStep(format!(
                    "expected key=value, got '{segment}'"
                )));
            };
            let key = key.trim().to_ascii_lowercase();
            let val = val.trim();
            match key.as_str() {
                "pattern" => {
                    let raw = rest.split_once('=').map(|(_, p)| p.trim()).unwrap_or_default();
                    let re = Regex::new(raw).map_err(|e| {
                        AutomationError::InvalidStep(format!("invalid pattern '{raw}': {e}"))
                    })?;
                    args.pattern = Some(re);
                    break;
                }
                "var" => args.var = Some(crate::helpers::variable_name(val).to_string()),
                "rect" => {
                    args.rect = Some(Rect::parse(val).ok_or_else(|| {
                        AutomationError::InvalidStep(format!("invalid rect '{val}'"))
                    })?)
                }
                "relative" => args.relative = parse_bool(val)?,
                "pre" => args.preprocess = Preprocess::parse(val)?,
                "digits" => args.digits = parse_bool(val)?,
                "retries" => {
                    args.retries = Some(val.parse().map_err(|_| {
                        AutomationError::InvalidStep(format!("invalid retries '{val}'"))
                    })?)
                }
                "delay" => {
                    args.delay_ms = Some(val.parse().map_err(|_| {
                        AutomationError::InvalidStep(format!("invalid delay '{val}'"))
                    })?)
                }
                other => warn!("Ignoring unknown extraction option '{other}'"),
            }
            rest = tail.trim_start();
        }
        Ok(args)
    }

    pub fn variable(&self) -> &str {
        self.var
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_VARIABLE)
    }

    /// Screen rectangle to capture. Relative rectangles are offset from the
    /// last click.
    pub fn region(&self, last_click: Option<Point>) -> Result<Rect, AutomationError> {
        let rect = self
            .rect
            .ok_or_else(|| AutomationError::InvalidStep("extraction needs rect=x,y,w,h".into()))?;
        if !self.relative {
            return Ok(rect);
        }
        let origin = last_click.ok_or_else(|| {
            AutomationError::InvalidStep("relative region but nothing was clicked yet".into())
        })?;
        Ok(rect.translate(origin.x, origin.y))
    }

    /// Applies the pattern constraint, then digit clean-up.
    pub fn post_process(&self, text: &str) -> String {
        let text = match &self.pattern {
            Some(re) => apply_pattern(re, text).unwrap_or_default(),
            None => text.trim().to_string(),
        };
        if self.digits {
            clean_digits(&text)
        } else {
            text
        }
    }
}

/// First match of `re`: capture group 1 when the pattern has one, else the
/// whole match.
pub fn apply_pattern(re: &Regex, text: &str) -> Option<String> {
    let caps = re.captures(text)?;
    caps.get(1)
        .or_else(|| caps.get(0))
        .map(|m| m.as_str().trim().to_string())
}

/// Fixes the usual OCR letter/digit confusions and keeps digits and `.,-`.
pub fn clean_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'O' | 'o' => '0',
            'l' | 'I' | '|' => '1',
            'S' => '5',
            'B' => '8',
            other => other,
        })
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect()
}

fn parse_bool(value: &str) -> Result<bool, AutomationError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(AutomationError::InvalidStep(format!(
            "expected a boolean, got '{other}'"
        ))),
    }
}
