//! Request content inspection.
//!
//! An ordered table of compiled patterns is checked against request text;
//! the first matching rule decides the verdict. The table is built once and
//! shared by every request.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Class of payload a rule detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThreatKind {
    Xss,
    SqlInjection,
}

impl ThreatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ThreatKind::Xss => "xss",
            ThreatKind::SqlInjection => "sql_injection",
        }
    }
}

impl fmt::Display for ThreatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, compiled detection pattern.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub name: String,
    pub kind: ThreatKind,
    regex: Regex,
}

impl PatternRule {
    pub fn new(name: impl Into<String>, kind: ThreatKind, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            kind,
            regex: Regex::new(pattern)?,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Outcome of a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Clean,
    Flagged { kind: ThreatKind, rule: String },
}

impl Verdict {
    pub fn is_clean(&self) -> bool {
        matches!(self, Verdict::Clean)
    }
}

const BUILTIN_PATTERNS: &[(&str, ThreatKind, &str)] = &[
    ("script_tag", ThreatKind::Xss, r"(?i)<\s*script[^>]*>"),
    (
        "event_handler",
        ThreatKind::Xss,
        r"(?i)\bon(?:load|error|click|dblclick|mouseover|mouseout|mouseenter|focus|blur|change|submit|input|keydown|keyup|keypress|abort|unload|resize|scroll|toggle|animationstart)\s*=",
    ),
    ("script_uri", ThreatKind::Xss, r"(?i)(?:javascript|vbscript)\s*:"),
    ("embedded_frame", ThreatKind::Xss, r"(?i)<\s*(?:iframe|frame|object|embed|applet)\b"),
    (
        "quoted_tautology",
        ThreatKind::SqlInjection,
        r"(?i)'\s*(?:or|and)\s+'?[^'\s]*'?\s*=\s*'?",
    ),
    ("numeric_tautology", ThreatKind::SqlInjection, r"(?i)\bor\s+1\s*=\s*1\b"),
    (
        "stacked_query",
        ThreatKind::SqlInjection,
        r"(?i);\s*(?:drop|alter|create|truncate|rename|insert|update|delete|exec)\s+",
    ),
    ("union_select", ThreatKind::SqlInjection, r"(?i)\bunion\s+(?:all\s+)?select\b"),
    ("comment_terminator", ThreatKind::SqlInjection, r"(?i)'\s*(?:--|#|/\*)"),
];

/// The default rule table: XSS rules first, then SQL injection.
pub fn builtin_rules() -> Vec<PatternRule> {
    BUILTIN_PATTERNS
        .iter()
        .filter_map(|(name, kind, pattern)| match PatternRule::new(*name, *kind, pattern) {
            Ok(rule) => Some(rule),
            Err(e) => {
                tracing::error!(rule = *name, error = %e, "Failed to compile inspection rule");
                None
            }
        })
        .collect()
}

/// Pattern-based payload classifier.
#[derive(Debug, Clone)]
pub struct ContentInspector {
    rules: Arc<[PatternRule]>,
}

impl ContentInspector {
    pub fn new(rules: Vec<PatternRule>) -> Self {
        Self { rules: rules.into() }
    }

    pub fn with_builtin_rules() -> Self {
        Self::new(builtin_rules())
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn scan(&self, text: &str) -> Verdict {
        self.rules
            .iter()
            .find(|rule| rule.is_match(text))
            .map_or(Verdict::Clean, |rule| Verdict::Flagged {
                kind: rule.kind,
                rule: rule.name.clone(),
            })
    }

    /// Scan a request body together with its raw and decoded query string.
    pub fn scan_request(&self, body: &[u8], query: Option<&str>) -> Verdict {
        let body = String::from_utf8_lossy(body);
        for candidate in candidates(&body).chain(query.into_iter().flat_map(candidates)) {
            let verdict = self.scan(&candidate);
            if !verdict.is_clean() {
                return verdict;
            }
        }
        Verdict::Clean
    }
}

impl Default for ContentInspector {
    fn default() -> Self {
        Self::with_builtin_rules()
    }
}

/// The text itself, plus its form-decoded form when it carries escapes.
fn candidates(text: &str) -> impl Iterator<Item = Cow<'_, str>> {
    let decoded = (text.contains('%') || text.contains('+')).then(|| Cow::Owned(form_decode(text)));
    std::iter::once(Cow::Borrowed(text)).chain(decoded)
}

fn form_decode(text: &str) -> String {
    url::form_urlencoded::parse(text.as_bytes())
        .map(|(k, v)| if v.is_empty() { k.into_owned() } else { format!("{k}={v}") })
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inspector() -> ContentInspector {
        ContentInspector::with_builtin_rules()
    }

    fn kind_of(verdict: Verdict) -> Option<ThreatKind> {
        match verdict {
            Verdict::Clean => None,
            Verdict::Flagged { kind, .. } => Some(kind),
        }
    }

    #[test]
    fn test_all_builtin_rules_compile() {
        assert_eq!(builtin_rules().len(), BUILTIN_PATTERNS.len());
    }

    #[test]
    fn test_script_tag_is_xss() {
        assert_eq!(
            inspector().scan("<script>alert(1)</script>"),
            Verdict::Flagged {
                kind: ThreatKind::Xss,
                rule: "script_tag".into()
            }
        );
    }

    #[test]
    fn test_quoted_tautology_is_sqli() {
        assert_eq!(kind_of(inspector().scan("' OR '1'='1")), Some(ThreatKind::SqlInjection));
    }

    #[test]
    fn test_plain_text_is_clean() {
        assert_eq!(inspector().scan("hello world"), Verdict::Clean);
        assert_eq!(
            inspector().scan(r#"{"name":"Blue mug","description":"Holds 350ml, dishwasher safe; great for tea"}"#),
            Verdict::Clean
        );
    }

    #[test]
    fn test_xss_variants() {
        let i = inspector();
        for payload in [
            r#"<img src=x onerror=alert(1)>"#,
            "<a href=\"javascript:void(0)\">x</a>",
            "VBScript:msgbox(1)",
            "<iframe src=//evil>",
            "< SCRIPT src=x>",
        ] {
            assert_eq!(kind_of(i.scan(payload)), Some(ThreatKind::Xss), "{payload}");
        }
    }

    #[test]
    fn test_sqli_variants() {
        let i = inspector();
        for payload in [
            "1 UNION ALL SELECT password FROM users",
            "x'; DROP TABLE orders",
            "admin'--",
            "id=5 or 1=1",
        ] {
            assert_eq!(kind_of(i.scan(payload)), Some(ThreatKind::SqlInjection), "{payload}");
        }
    }

    #[test]
    fn test_first_match_wins() {
        // Both an XSS and a SQLi rule match; XSS rules come first.
        let verdict = inspector().scan("<script>' OR '1'='1</script>");
        assert_eq!(kind_of(verdict), Some(ThreatKind::Xss));
    }

    #[test]
    fn test_query_is_scanned_decoded() {
        let verdict = inspector().scan_request(b"{}", Some("q=%3Cscript%3Ealert(1)%3C%2Fscript%3E"));
        assert_eq!(kind_of(verdict), Some(ThreatKind::Xss));
    }

    #[test]
    fn test_form_body_is_scanned_decoded() {
        let verdict = inspector().scan_request(b"user=admin%27+OR+%271%27%3D%271", None);
        assert_eq!(kind_of(verdict), Some(ThreatKind::SqlInjection));
    }

    #[test]
    fn test_custom_rule_table() {
        let rules = vec![PatternRule::new("forbidden", ThreatKind::Xss, "(?i)forbidden").unwrap()];
        let i = ContentInspector::new(rules);
        assert_eq!(i.rule_count(), 1);
        assert!(!i.scan("FORBIDDEN word").is_clean());
        assert!(i.scan("<script>").is_clean());
    }
}
