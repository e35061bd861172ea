use std::sync::LazyLock;

use regex::Regex;

use crate::dataset::QuestionType;

static PRACTICAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"《問(\d+)》").unwrap());
static WRITTEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"問(\d+)[．.]").unwrap());

// Any of these closes the span that is currently open, whatever its style.
static BOUNDARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"《問\d+》|問\d+[．.]|【第\d+問】|-{3}\s*ページ\s*\d+\s*-{3}").unwrap()
});

/// Which exam section's question marker opens a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    /// `《問12》`
    Practical,
    /// `問12．` or `問12.`
    Written,
}

impl Style {
    pub const ALL: [Style; 2] = [Style::Practical, Style::Written];

    fn opening(self) -> &'static Regex {
        match self {
            Style::Practical => &PRACTICAL_RE,
            Style::Written => &WRITTEN_RE,
        }
    }

    pub fn question_type(self) -> QuestionType {
        match self {
            Style::Practical => QuestionType::Practical,
            Style::Written => QuestionType::Written,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span<'a> {
    /// Question number printed in the marker.
    pub ordinal: u32,
    pub text: &'a str,
    /// Byte offset of `text` in the source blob.
    pub offset: usize,
}

/// Lazy walk over the spans of one style. Cloning restarts from the
/// clone point; `segment` always starts from the top.
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    text: &'a str,
    style: Style,
    pos: usize,
}

pub fn segment(text: &str, style: Style) -> Segments<'_> {
    Segments {
        text,
        style,
        pos: 0,
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Span<'a>;

    fn next(&mut self) -> Option<Span<'a>> {
        loop {
            if self.pos >= self.text.len() {
                return None;
            }
            let caps = self.style.opening().captures_at(self.text, self.pos)?;
            let marker = caps.get(0)?;
            let start = marker.end();
            let end = BOUNDARY_RE
                .find_at(self.text, start)
                .map(|b| b.start())
                .unwrap_or(self.text.len());
            self.pos = end.max(start);

            // A numeral too large for u32 is not a question number.
            let Some(ordinal) = parse_numeral(&caps[1]) else {
                continue;
            };
            let raw = &self.text[start..end];
            let trimmed = raw.trim_start();
            let offset = start + (raw.len() - trimmed.len());
            return Some(Span {
                ordinal,
                text: trimmed.trim_end(),
                offset,
            });
        }
    }
}

/// ASCII or full-width digits to a number.
pub fn parse_numeral(digits: &str) -> Option<u32> {
    let mut value: u32 = 0;
    for c in digits.chars() {
        let d = match c {
            '0'..='9' => c as u32 - '0' as u32,
            '０'..='９' => c as u32 - '０' as u32,
            _ => return None,
        };
        value = value.checked_mul(10)?.checked_add(d)?;
    }
    Some(value)
}
