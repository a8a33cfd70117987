use std::sync::OnceLock;

use regex::Regex;

/// A pure text transform.
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, text: &str) -> String;
}

/// Applies its sanitizers in insertion order, feeding each output to the next.
#[derive(Default)]
pub struct CompositeSanitizer {
    sanitizers: Vec<Box<dyn Sanitizer>>,
}

impl CompositeSanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sanitizer: impl Sanitizer + 'static) -> Self {
        self.add(sanitizer);
        self
    }

    pub fn add(&mut self, sanitizer: impl Sanitizer + 'static) {
        self.sanitizers.push(Box::new(sanitizer));
    }
}

impl Sanitizer for CompositeSanitizer {
    fn sanitize(&self, text: &str) -> String {
        self.sanitizers
            .iter()
            .fold(text.to_string(), |acc, s| s.sanitize(&acc))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TrimSanitizer;

impl Sanitizer for TrimSanitizer {
    fn sanitize(&self, text: &str) -> String {
        text.trim().to_string()
    }
}

/// Removes C0 control characters except tab, LF and CR.
#[derive(Clone, Copy, Debug, Default)]
pub struct ControlCharsSanitizer;

impl Sanitizer for ControlCharsSanitizer {
    fn sanitize(&self, text: &str) -> String {
        static CONTROL: OnceLock<Regex> = OnceLock::new();
        let re = CONTROL.get_or_init(|| {
            Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F]").expect("static control-char regex")
        });
        re.replace_all(text, "").into_owned()
    }
}

/// Backslash-escapes Telegram MarkdownV2 special characters.
#[derive(Clone, Copy, Debug, Default)]
pub struct MarkdownEscapeSanitizer;

impl MarkdownEscapeSanitizer {
    const SPECIAL: &'static str = "\\_*[]()~`>#+-=|{}.!";
}

impl Sanitizer for MarkdownEscapeSanitizer {
    fn sanitize(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for ch in text.chars() {
            if Self::SPECIAL.contains(ch) {
                out.push('\\');
            }
            out.push(ch);
        }
        out
    }
}
