use crate::parser::normalize::normalize;
use crate::settings::Settings;

/// Closing glyph of an inline choice marker: `1）`.
pub const MARKER_CLOSE: char = '）';

const QUOTE_GLYPHS: &[char] = &['「', '」', '『', '』', '"', '“', '”'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min_choices: usize,
    pub target_choices: usize,
    pub min_statement_chars: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits::from(&Settings::default())
    }
}

impl From<&Settings> for Limits {
    fn from(s: &Settings) -> Self {
        Limits {
            min_choices: s.min_choices,
            target_choices: s.target_choices,
            min_statement_chars: s.min_statement_chars,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedQuestion {
    pub statement: String,
    pub choices: Vec<String>,
}

/// Why a span produced no question. Not an error: the caller drops the span
/// and counts it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("found {found} choice marker(s), need at least {min}")]
    TooFewChoices { found: usize, min: usize },
    #[error("statement is {chars} char(s), need at least {min}")]
    StatementTooShort { chars: usize, min: usize },
    #[error("only {distinct} distinct non-empty choice(s), need at least {min}")]
    TooFewDistinctChoices { distinct: usize, min: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Text(&'a str),
    Marker(u32),
}

/// Choice numeral 1..=3, ASCII or full width.
fn choice_numeral(c: char) -> Option<u32> {
    match c {
        '1'..='3' => Some(c as u32 - '0' as u32),
        '１'..='３' => Some(c as u32 - '０' as u32),
        _ => None,
    }
}

fn is_digit(c: char) -> bool {
    c.is_ascii_digit() || ('０'..='９').contains(&c)
}

/// Split text into prose and `N）` markers. A numeral glued to a preceding
/// digit (`11）`, `2023）`) is prose.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut prev: Option<char> = None;
    let mut pending = 0;

    while let Some((i, c)) = chars.next() {
        let numeral = choice_numeral(c).filter(|_| !prev.is_some_and(is_digit));
        if let Some(n) = numeral {
            if let Some(&(j, MARKER_CLOSE)) = chars.peek() {
                if pending < i {
                    tokens.push(Token::Text(&text[pending..i]));
                }
                tokens.push(Token::Marker(n));
                chars.next();
                pending = j + MARKER_CLOSE.len_utf8();
                prev = Some(MARKER_CLOSE);
                continue;
            }
        }
        prev = Some(c);
    }
    if pending < text.len() {
        tokens.push(Token::Text(&text[pending..]));
    }
    tokens
}

pub fn has_inline_marker(text: &str) -> bool {
    tokenize(text).iter().any(|t| matches!(t, Token::Marker(_)))
}

enum State {
    Statement,
    Choice(usize),
}

/// Statement before the first marker, and one raw segment per marker.
pub fn split(text: &str) -> (String, Vec<(u32, String)>) {
    let mut statement = String::new();
    let mut segments: Vec<(u32, String)> = Vec::new();
    let mut state = State::Statement;

    for token in tokenize(text) {
        match (token, &state) {
            (Token::Marker(n), _) => {
                segments.push((n, String::new()));
                state = State::Choice(segments.len() - 1);
            }
            (Token::Text(t), State::Statement) => statement.push_str(t),
            (Token::Text(t), State::Choice(idx)) => segments[*idx].1.push_str(t),
        }
    }
    (statement, segments)
}

pub fn clean_choice(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| QUOTE_GLYPHS.contains(&c) || c.is_whitespace())
        .to_string()
}

/// Normalize one span and pull out its statement and choice texts.
pub fn extract(span: &str, limits: &Limits) -> Result<ExtractedQuestion, Rejection> {
    let normalized = normalize(span);
    let (statement, mut segments) = split(&normalized);

    if segments.len() < limits.min_choices {
        return Err(Rejection::TooFewChoices {
            found: segments.len(),
            min: limits.min_choices,
        });
    }
    let statement = statement.trim().to_string();
    let chars = statement.chars().count();
    if chars < limits.min_statement_chars {
        return Err(Rejection::StatementTooShort {
            chars,
            min: limits.min_statement_chars,
        });
    }

    segments.truncate(limits.target_choices);
    let mut choices: Vec<String> = Vec::with_capacity(segments.len());
    for (_, raw) in segments {
        let text = clean_choice(&raw);
        if !text.is_empty() && !choices.contains(&text) {
            choices.push(text);
        }
    }
    if choices.len() < limits.min_choices {
        return Err(Rejection::TooFewDistinctChoices {
            distinct: choices.len(),
            min: limits.min_choices,
        });
    }

    Ok(ExtractedQuestion { statement, choices })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_choice_span() {
        let q = extract("Which is correct? 1）Apples 2）Oranges", &Limits::default()).unwrap();
        assert_eq!(q.statement, "Which is correct?");
        assert_eq!(q.choices, vec!["Apples", "Oranges"]);
    }

    #[test]
    fn strips_quotes_and_keeps_first_three() {
        let span = "遺言に関する次の記述のうち、最も適切なものはどれか。\
                    1）「自筆証書遺言は検認が必要である。」 2）『公正証書遺言は証人2人以上』 \
                    3）秘密証書遺言 1）重複";
        let q = extract(span, &Limits::default()).unwrap();
        assert_eq!(
            q.choices,
            vec!["自筆証書遺言は検認が必要である。", "公正証書遺言は証人2人以上", "秘密証書遺言"]
        );
        assert!(!q.statement.contains('）'));
    }

    #[test]
    fn numerals_inside_numbers_are_not_markers() {
        let tokens = tokenize("令和5年（2023）11）と 1）A");
        assert_eq!(
            tokens,
            vec![Token::Text("令和5年（2023）11）と "), Token::Marker(1), Token::Text("A")]
        );
    }

    #[test]
    fn full_width_markers() {
        let (statement, segs) = split("問題文 １）甲 ２）乙");
        assert_eq!(statement, "問題文 ");
        assert_eq!(segs, vec![(1, "甲 ".to_string()), (2, "乙".to_string())]);
    }

    #[test]
    fn rejects_single_choice() {
        let r = extract("十分に長い問題文がここにあります。 1）ひとつだけ", &Limits::default());
        assert_eq!(r, Err(Rejection::TooFewChoices { found: 1, min: 2 }));
    }

    #[test]
    fn rejects_short_statement() {
        let r = extract("短い 1）A 2）B", &Limits::default());
        assert_eq!(r, Err(Rejection::StatementTooShort { chars: 2, min: 10 }));
    }

    #[test]
    fn rejects_when_choices_collapse_to_one() {
        let r = extract("十分に長い問題文がここにあります 1）同じ 2）「同じ」 3）", &Limits::default());
        assert_eq!(r, Err(Rejection::TooFewDistinctChoices { distinct: 1, min: 2 }));
    }

    #[test]
    fn statement_never_keeps_markup() {
        let q = extract(
            "<span class=\"highlight-number\">70,000円</span>が上限の共済はどれか 1）小規模企業共済 2）中退共",
            &Limits::default(),
        )
        .unwrap();
        assert_eq!(q.statement, "70,000円が上限の共済はどれか");
    }

    #[test]
    fn has_inline_marker_detects_numbering() {
        assert!(has_inline_marker("どれか。1）A"));
        assert!(!has_inline_marker("2023）の改正"));
    }
}
