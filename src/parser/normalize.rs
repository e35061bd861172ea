use std::sync::LazyLock;

use regex::Regex;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^<>]+>").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static PAGE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{3}\s*ページ\s*\d+\s*-{3}").unwrap());
static NOTE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"※[^。\n]*").unwrap());
static BANNER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+級（.*?）.*?版").unwrap());
static PAGE_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"－\d+－").unwrap());
static MATERIAL_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"〈[^〉]*〉").unwrap());
static CASE_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"《設\s*例》").unwrap());
static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"【第\d+問】").unwrap());
static DECORATION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[◆★]").unwrap());

static SENTENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"。\s*").unwrap());
static LEAD_IN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*(次のうち|以下の文章)").unwrap());
static ASIDE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*（([^）]{20,})）\s*").unwrap());

/// Radical code points PDF extraction emits in place of the unified ideograph.
const CHAR_FIXES: &[(char, char)] = &[
    ('\u{2F29}', '小'),
    ('\u{2F24}', '大'),
    ('\u{2F08}', '人'),
    ('\u{2F42}', '文'),
    ('\u{2F49}', '月'),
    ('\u{2F47}', '日'),
    ('\u{2F55}', '火'),
    ('\u{2F54}', '水'),
    ('\u{2F4A}', '木'),
    ('\u{2FA6}', '金'),
    ('\u{2F1F}', '土'),
    ('\u{2F6C}', '目'),
    ('\u{2F3F}', '手'),
    ('\u{2F9C}', '足'),
    ('\u{2F9D}', '身'),
    ('\u{2F3C}', '心'),
    ('\u{2F12}', '力'),
    ('\u{2F45}', '方'),
    ('\u{2F64}', '用'),
    ('\u{2F8F}', '行'),
    ('\u{2F92}', '見'),
    ('\u{2F94}', '言'),
    ('\u{2F26}', '子'),
    ('\u{2F25}', '女'),
    ('\u{2F7C}', '老'),
    ('\u{2ED1}', '長'),
    ('\u{2FBC}', '高'),
    ('\u{2F00}', '一'),
    ('\u{2F06}', '二'),
    ('\u{2F17}', '十'),
    ('\u{2F0A}', '入'),
    ('\u{2F63}', '生'),
    ('\u{2F83}', '自'),
    ('\u{2F40}', '支'),
];

// Upper bound on cleanup rounds; real input settles in one or two.
const MAX_ROUNDS: usize = 8;

/// Full normalization: character fixes, markup, document noise, layout.
pub fn normalize(text: &str) -> String {
    let fixed = fix_characters(text);
    // First strip runs before lines are joined, so a `※` note ends at its newline.
    let mut current = collapse_whitespace(&strip_noise(&strip_markup(&fixed)));
    for _ in 0..MAX_ROUNDS {
        let next = collapse_whitespace(&strip_noise(&strip_markup(&current)));
        if next == current {
            break;
        }
        current = next;
    }
    layout(&current)
}

pub fn fix_characters(text: &str) -> String {
    text.chars()
        .map(|c| {
            CHAR_FIXES
                .iter()
                .find(|(bad, _)| *bad == c)
                .map(|(_, good)| *good)
                .unwrap_or(c)
        })
        .collect()
}

/// Drop tags, keep what they wrap. A tag never spans a `<`, so the innermost
/// one goes first and the loop peels nested fragments like `<<b>span>` whole.
pub fn strip_markup(text: &str) -> String {
    let mut out = text.to_string();
    while TAG_RE.is_match(&out) {
        out = TAG_RE.replace_all(&out, "").into_owned();
    }
    out
}

pub fn has_markup(text: &str) -> bool {
    TAG_RE.is_match(text)
}

fn strip_noise(text: &str) -> String {
    let mut out = text.to_string();
    for re in [
        &*PAGE_MARKER_RE,
        &*NOTE_RE,
        &*BANNER_RE,
        &*PAGE_NUMBER_RE,
        &*MATERIAL_TAG_RE,
        &*CASE_TAG_RE,
        &*SECTION_RE,
        &*DECORATION_RE,
    ] {
        out = re.replace_all(&out, "").into_owned();
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    WS_RE.replace_all(text, " ").trim().to_string()
}

// Break insertion runs before asides so the aside length check sees the
// same text on every pass.
fn layout(text: &str) -> String {
    let text = SENTENCE_RE.replace_all(text, "。\n");
    let text = LEAD_IN_RE.replace_all(&text, "\n$1");
    let text = ASIDE_RE.replace_all(&text, "\n（$1）\n");
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
