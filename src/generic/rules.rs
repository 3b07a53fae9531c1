use regex::Regex;
use std::sync::LazyLock;

use crate::core::{EXTRACTION_EXTENSIONS, has_supported_extension};

/// Field names that declare a stream as a `"<name>":"<value>"` JSON fragment
const STRICT_FIELDS: &[&str] = &[
    "stream",
    "file",
    "@id",
    "fileURL",
    "streamURL",
    "mediaURL",
    "associatedMedia",
];

/// Platform asset markers and generic attribute patterns, most specific first
const LOOSE_PATTERNS: &[(&str, &str)] = &[
    ("assetUrl", r#"assetUrl\\":\\"(.*?)""#),
    ("jsdata", r#"jsdata="Kwyn5e;(.*?);"#),
    ("url", r#"url":"(.*?)""#),
    ("src", r#"src="(.*?)""#),
    ("href", r#"href="(.*?)""#),
];

/// Rule strictness. Loose rules match far more than streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Strict,
    Loose,
}

/// One pattern of the extraction cascade
#[derive(Debug)]
pub struct ExtractionRule {
    pub name: &'static str,
    pub kind: RuleKind,
    pattern: Regex,
    extensions: &'static [&'static str],
}

impl ExtractionRule {
    /// Distinct values this rule finds in `text`, in order of first
    /// appearance, filtered by the extension allow-list
    pub fn apply(&self, text: &str) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for caps in self.pattern.captures_iter(text) {
            let Some(m) = caps.get(1) else { continue };
            let url = clean_candidate(m.as_str());
            if url.is_empty() || !has_supported_extension(&url, self.extensions) {
                continue;
            }
            if !found.contains(&url) {
                found.push(url);
            }
        }
        found
    }
}

/// The ordered cascade: strict field rules, then loose rules
pub static RULES: LazyLock<Vec<ExtractionRule>> = LazyLock::new(|| {
    let strict = STRICT_FIELDS.iter().map(|field| ExtractionRule {
        name: field,
        kind: RuleKind::Strict,
        pattern: Regex::new(&format!(r#"{}":"(.*?)""#, regex::escape(field)))
            .expect("strict extraction pattern"),
        extensions: EXTRACTION_EXTENSIONS,
    });
    let loose = LOOSE_PATTERNS.iter().map(|(name, pattern)| ExtractionRule {
        name,
        kind: RuleKind::Loose,
        pattern: Regex::new(pattern).expect("loose extraction pattern"),
        extensions: EXTRACTION_EXTENSIONS,
    });
    strict.chain(loose).collect()
});

/// Run the cascade; the first rule with a non-empty result wins
pub fn apply_rules<'a>(
    rules: &'a [ExtractionRule],
    text: &str,
) -> Option<(&'a ExtractionRule, Vec<String>)> {
    rules.iter().find_map(|rule| {
        let found = rule.apply(text);
        (!found.is_empty()).then_some((rule, found))
    })
}

/// Undo JSON string escaping left in values scraped out of page sources
fn clean_candidate(raw: &str) -> String {
    raw.trim_end_matches('\\')
        .replace("\\/", "/")
        .replace("\\u002F", "/")
        .replace("\\u002f", "/")
        .replace("\\u0026", "&")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}
