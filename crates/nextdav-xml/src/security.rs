//! XML security guard.
//!
//! Every response body a CalDAV server hands back goes through [`validate`]
//! before it reaches the tokenizer. The checks are cheap substring scans plus
//! a single-pass depth estimate, so a hostile document is rejected without
//! ever being parsed.
//!
//! [`detect_xxe_attempt`] and [`detect_entity_expansion_attack`] are advisory
//! heuristics built on regular expressions. They catch the well-known shapes
//! (external `SYSTEM`/`PUBLIC` entities, parameter entities, nested entity
//! chains) and are not a complete defence; the policy checks in [`validate`]
//! are what actually gate parsing.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// External entity declarations pointing at a fetchable scheme.
static EXTERNAL_ENTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<!ENTITY\s+(?:%\s*)?[^\s>]+\s+(?:SYSTEM|PUBLIC)\s+[^>]*?["'](?:file|https?|ftp)://[^>]*>"#,
    )
    .expect("Invalid external entity regex")
});

/// Parameter entity declarations (`<!ENTITY % name ...>`).
static PARAMETER_ENTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<!ENTITY\s+%\s*[^\s>]+[^>]*>").expect("Invalid parameter entity regex")
});

/// Internal general entity declarations with a quoted replacement text.
static INTERNAL_ENTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<!ENTITY\s+([^\s%>]+)\s+(?:"([^"]*)"|'([^']*)')"#)
        .expect("Invalid internal entity regex")
});

/// Ten or more entity references in a row.
static REFERENCE_RUN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:&[A-Za-z_][\w.:-]*;\s*){10,}").expect("Invalid reference run regex")
});

static DOCTYPE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<!DOCTYPE(?:[^\[>]*\[.*?\])?[^>]*>").expect("Invalid DOCTYPE regex")
});

/// An entity declaration; `>` inside a quoted value does not end it.
static ENTITY_DECL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<!ENTITY(?:"[^"]*"|'[^']*'|[^>"'])*>"#).expect("Invalid ENTITY regex")
});

static PROCESSING_INSTRUCTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<\?.*?\?>").expect("Invalid processing instruction regex"));

/// Limits applied to untrusted XML before parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityPolicy {
    /// Largest accepted document, in bytes.
    pub max_size_bytes: usize,
    /// Deepest accepted element nesting.
    pub max_depth: usize,
    /// Whether a `<!DOCTYPE` declaration is tolerated at all.
    pub allow_dtd: bool,
    /// Whether a DOCTYPE may reference an external DTD (`SYSTEM`/`PUBLIC`).
    pub allow_external_dtd: bool,
    /// Reject `<!ENTITY` declarations when set.
    pub disable_entity_expansion: bool,
}

impl SecurityPolicy {
    /// Default size limit (10 MiB).
    pub const DEFAULT_MAX_SIZE_BYTES: usize = 10 * 1024 * 1024;

    /// Default nesting limit.
    pub const DEFAULT_MAX_DEPTH: usize = 100;

    /// Sets the size limit.
    #[must_use]
    pub fn with_max_size_bytes(mut self, bytes: usize) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    /// Sets the nesting limit.
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Tolerates internal DOCTYPE declarations.
    #[must_use]
    pub fn with_dtd_allowed(mut self, allowed: bool) -> Self {
        self.allow_dtd = allowed;
        self
    }

    /// Tolerates DOCTYPEs referencing an external DTD.
    #[must_use]
    pub fn with_external_dtd_allowed(mut self, allowed: bool) -> Self {
        self.allow_external_dtd = allowed;
        self
    }

    /// Toggles rejection of entity declarations.
    #[must_use]
    pub fn with_entity_expansion_disabled(mut self, disabled: bool) -> Self {
        self.disable_entity_expansion = disabled;
        self
    }
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            max_size_bytes: Self::DEFAULT_MAX_SIZE_BYTES,
            max_depth: Self::DEFAULT_MAX_DEPTH,
            allow_dtd: false,
            allow_external_dtd: false,
            disable_entity_expansion: true,
        }
    }
}

/// A single policy violation found by [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SecurityIssue {
    /// The document is larger than the policy allows.
    TooLarge { size: usize, max: usize },
    /// A `<!DOCTYPE` declaration is present.
    DoctypeNotAllowed,
    /// The DOCTYPE references an external DTD.
    ExternalDtd,
    /// An `<!ENTITY` declaration is present while expansion is disabled.
    EntityDeclaration,
    /// Estimated element nesting exceeds the limit.
    TooDeep { depth: usize, max: usize },
}

impl fmt::Display for SecurityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge { size, max } => {
                write!(f, "document size {size} bytes exceeds limit of {max} bytes")
            }
            Self::DoctypeNotAllowed => write!(f, "DOCTYPE declarations are not allowed"),
            Self::ExternalDtd => write!(f, "external DTD references are not allowed"),
            Self::EntityDeclaration => {
                write!(f, "entity declarations are not allowed (entity expansion disabled)")
            }
            Self::TooDeep { depth, max } => {
                write!(f, "nesting depth {depth} exceeds limit of {max}")
            }
        }
    }
}

/// Outcome of [`validate`]. Every failing check contributes one issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    issues: Vec<SecurityIssue>,
}

impl ValidationReport {
    /// Returns true when no check failed.
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// The failing checks, in the order they were run.
    pub fn issues(&self) -> &[SecurityIssue] {
        &self.issues
    }

    /// Consumes the report, returning its issues.
    pub fn into_issues(self) -> Vec<SecurityIssue> {
        self.issues
    }

    /// Human-readable issue descriptions.
    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }
}

/// Result of a heuristic attack detector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detection {
    /// Whether the pattern was found.
    pub detected: bool,
    /// The matched fragment or a short explanation.
    pub details: Option<String>,
}

impl Detection {
    fn clean() -> Self {
        Self::default()
    }

    fn found(details: impl Into<String>) -> Self {
        Self {
            detected: true,
            details: Some(details.into()),
        }
    }
}

/// Checks `xml` against `policy` without parsing it.
///
/// All checks run; the report lists every failure, not just the first.
pub fn validate(xml: &str, policy: &SecurityPolicy) -> ValidationReport {
    let mut issues = Vec::new();

    if xml.len() > policy.max_size_bytes {
        issues.push(SecurityIssue::TooLarge {
            size: xml.len(),
            max: policy.max_size_bytes,
        });
    }

    let has_doctype = contains_ignore_ascii_case(xml, "<!DOCTYPE");
    if has_doctype && !policy.allow_dtd {
        issues.push(SecurityIssue::DoctypeNotAllowed);
    }
    if has_doctype
        && !policy.allow_external_dtd
        && (contains_ignore_ascii_case(xml, "SYSTEM") || contains_ignore_ascii_case(xml, "PUBLIC"))
    {
        issues.push(SecurityIssue::ExternalDtd);
    }

    if policy.disable_entity_expansion && contains_ignore_ascii_case(xml, "<!ENTITY") {
        issues.push(SecurityIssue::EntityDeclaration);
    }

    let depth = estimate_depth(xml);
    if depth > policy.max_depth {
        issues.push(SecurityIssue::TooDeep {
            depth,
            max: policy.max_depth,
        });
    }

    ValidationReport { issues }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Open,
    Close,
    Markup,
}

/// Estimates the maximum element nesting depth of `xml` in one pass.
///
/// Comments and CDATA sections are skipped, quoted attribute values are
/// opaque, and `<?...?>` / `<!...>` markup does not count as an element.
/// The scan never fails: on truncated or malformed input it returns the
/// deepest level seen so far.
pub fn estimate_depth(xml: &str) -> usize {
    let bytes = xml.as_bytes();
    let mut depth = 0usize;
    let mut max_depth = 0usize;
    let mut tag: Option<TagKind> = None;
    let mut quote: Option<u8> = None;
    let mut in_comment = false;
    let mut in_cdata = false;
    let mut i = 0;

    while i < bytes.len() {
        let rest = &bytes[i..];

        if in_comment {
            if rest.starts_with(b"-->") {
                in_comment = false;
                i += 3;
            } else {
                i += 1;
            }
            continue;
        }
        if in_cdata {
            if rest.starts_with(b"]]>") {
                in_cdata = false;
                i += 3;
            } else {
                i += 1;
            }
            continue;
        }
        if let Some(q) = quote {
            if bytes[i] == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match tag {
            Some(kind) => match bytes[i] {
                b'"' | b'\'' => quote = Some(bytes[i]),
                b'/' if rest.starts_with(b"/>") => {
                    if kind == TagKind::Open {
                        depth = depth.saturating_sub(1);
                    }
                    tag = None;
                    i += 2;
                    continue;
                }
                b'>' => tag = None,
                _ => {}
            },
            None if bytes[i] == b'<' => {
                if rest.starts_with(b"<!--") {
                    in_comment = true;
                    i += 4;
                    continue;
                }
                if rest.starts_with(b"<![CDATA[") {
                    in_cdata = true;
                    i += 9;
                    continue;
                }
                match rest.get(1) {
                    Some(b'/') => {
                        depth = depth.saturating_sub(1);
                        tag = Some(TagKind::Close);
                    }
                    Some(b'?') | Some(b'!') => tag = Some(TagKind::Markup),
                    _ => {
                        depth += 1;
                        max_depth = max_depth.max(depth);
                        tag = Some(TagKind::Open);
                    }
                }
            }
            None => {}
        }
        i += 1;
    }

    max_depth
}

/// Looks for external entity declarations and parameter entities.
pub fn detect_xxe_attempt(xml: &str) -> Detection {
    if let Some(m) = EXTERNAL_ENTITY_REGEX.find(xml) {
        return Detection::found(m.as_str());
    }
    if let Some(m) = PARAMETER_ENTITY_REGEX.find(xml) {
        return Detection::found(m.as_str());
    }
    Detection::clean()
}

/// Looks for nested entity definitions ("billion laughs") and long runs of
/// entity references.
pub fn detect_entity_expansion_attack(xml: &str) -> Detection {
    let entities: Vec<(&str, &str)> = INTERNAL_ENTITY_REGEX
        .captures_iter(xml)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str();
            let value = caps.get(2).or_else(|| caps.get(3))?.as_str();
            Some((name, value))
        })
        .collect();

    for (name, value) in &entities {
        for (other, _) in &entities {
            if value.contains(&format!("&{other};")) {
                return Detection::found(format!(
                    "entity '{name}' references entity '{other}'"
                ));
            }
        }
    }

    if let Some(m) = REFERENCE_RUN_REGEX.find(xml) {
        return Detection::found(format!(
            "run of consecutive entity references: {}",
            truncate(m.as_str(), 120)
        ));
    }

    Detection::clean()
}

/// Strips DOCTYPE declarations, entity declarations and processing
/// instructions. Best effort: the output must be validated again.
pub fn sanitize(xml: &str) -> String {
    let without_entities = ENTITY_DECL_REGEX.replace_all(xml, "");
    let without_doctype = DOCTYPE_REGEX.replace_all(&without_entities, "");
    PROCESSING_INSTRUCTION_REGEX
        .replace_all(&without_doctype, "")
        .into_owned()
}

fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    let needle = needle.as_bytes();
    haystack
        .as_bytes()
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XXE: &str = r#"<?xml version="1.0"?><!DOCTYPE foo [<!ENTITY xxe SYSTEM "file:///etc/passwd">]><foo>&xxe;</foo>"#;

    const BILLION_LAUGHS: &str = r#"<?xml version="1.0"?>
<!DOCTYPE lolz [
  <!ENTITY lol "lol">
  <!ENTITY lol1 "&lol;&lol;&lol;&lol;&lol;&lol;&lol;&lol;&lol;&lol;">
  <!ENTITY lol2 "&lol1;&lol1;&lol1;&lol1;&lol1;&lol1;&lol1;&lol1;&lol1;&lol1;">
  <!ENTITY lol3 "&lol2;&lol2;&lol2;&lol2;&lol2;&lol2;&lol2;&lol2;&lol2;&lol2;">
]>
<lolz>&lol3;</lolz>"#;

    fn nested(levels: usize) -> String {
        let mut xml = String::new();
        for _ in 0..levels {
            xml.push_str("<a>");
        }
        for _ in 0..levels {
            xml.push_str("</a>");
        }
        xml
    }

    #[test]
    fn plain_multistatus_is_valid() {
        let xml = r#"<d:multistatus xmlns:d="DAV:"><d:response><d:href>/c/</d:href></d:response></d:multistatus>"#;
        let report = validate(xml, &SecurityPolicy::default());
        assert!(report.is_valid(), "{:?}", report.messages());
    }

    #[test]
    fn oversized_document_is_rejected() {
        let xml = format!("<a>{}</a>", "x".repeat(20 * 1024 * 1024));
        let report = validate(&xml, &SecurityPolicy::default());
        assert!(!report.is_valid());
        assert!(matches!(
            report.issues()[0],
            SecurityIssue::TooLarge { max: SecurityPolicy::DEFAULT_MAX_SIZE_BYTES, .. }
        ));
    }

    #[test]
    fn xxe_document_reports_every_failing_check() {
        let report = validate(XXE, &SecurityPolicy::default());
        assert!(!report.is_valid());
        assert_eq!(
            report.issues(),
            &[
                SecurityIssue::DoctypeNotAllowed,
                SecurityIssue::ExternalDtd,
                SecurityIssue::EntityDeclaration,
            ]
        );
        assert_eq!(report.messages().len(), 3);
    }

    #[test]
    fn permissive_policy_accepts_internal_dtd() {
        let xml = r#"<!DOCTYPE foo [<!ELEMENT foo ANY>]><foo/>"#;
        let policy = SecurityPolicy::default()
            .with_dtd_allowed(true)
            .with_entity_expansion_disabled(false);
        assert!(validate(xml, &policy).is_valid());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let report = validate(&nested(101), &SecurityPolicy::default());
        assert_eq!(
            report.issues(),
            &[SecurityIssue::TooDeep { depth: 101, max: 100 }]
        );
        assert!(validate(&nested(100), &SecurityPolicy::default()).is_valid());
    }

    #[test]
    fn depth_counts_self_closing_tags_once() {
        assert_eq!(estimate_depth("<a><b/><b/><c><d/></c></a>"), 3);
        assert_eq!(estimate_depth("<a><b></b><b></b></a>"), 2);
    }

    #[test]
    fn depth_ignores_comments_cdata_and_quoted_values() {
        let xml = r#"<?xml version="1.0"?><!-- <x><y><z> --><a title="<b><c>" other='/>'><![CDATA[<p><q><r>]]></a>"#;
        assert_eq!(estimate_depth(xml), 1);
    }

    #[test]
    fn depth_survives_truncated_input() {
        assert_eq!(estimate_depth("<a><b><c attr=\"unterminated"), 3);
        assert_eq!(estimate_depth("<a><!-- never closed <b><c>"), 1);
        assert_eq!(estimate_depth("</a></b><"), 1);
        assert_eq!(estimate_depth(""), 0);
    }

    #[test]
    fn detects_external_entity() {
        let detection = detect_xxe_attempt(XXE);
        assert!(detection.detected);
        assert_eq!(
            detection.details.as_deref(),
            Some(r#"<!ENTITY xxe SYSTEM "file:///etc/passwd">"#)
        );
    }

    #[test]
    fn detects_public_and_parameter_entities() {
        let public = r#"<!DOCTYPE x [<!ENTITY ext PUBLIC "-//X//EN" "http://evil.example/x.dtd">]>"#;
        assert!(detect_xxe_attempt(public).detected);

        let parameter = r#"<!DOCTYPE x [<!ENTITY % dtd "<!ENTITY leak 'x'>">%dtd;]>"#;
        let detection = detect_xxe_attempt(parameter);
        assert!(detection.detected);
        assert!(detection.details.unwrap().starts_with("<!ENTITY % dtd"));
    }

    #[test]
    fn no_xxe_in_plain_document() {
        assert_eq!(detect_xxe_attempt("<a>SYSTEM</a>"), Detection::default());
    }

    #[test]
    fn detects_billion_laughs() {
        let detection = detect_entity_expansion_attack(BILLION_LAUGHS);
        assert!(detection.detected);
        assert_eq!(
            detection.details.as_deref(),
            Some("entity 'lol1' references entity 'lol'")
        );
    }

    #[test]
    fn detects_reference_runs() {
        let xml = format!("<a>{}</a>", "&foo;".repeat(10));
        assert!(detect_entity_expansion_attack(&xml).detected);

        let short = format!("<a>{}</a>", "&foo;".repeat(9));
        assert!(!detect_entity_expansion_attack(&short).detected);
    }

    #[test]
    fn single_harmless_entity_is_not_expansion() {
        let xml = r#"<!DOCTYPE a [<!ENTITY name "value">]><a>&name;</a>"#;
        assert!(!detect_entity_expansion_attack(xml).detected);
    }

    #[test]
    fn sanitize_strips_dtd_entities_and_instructions() {
        let cleaned = sanitize(XXE);
        assert_eq!(cleaned, "<foo>&xxe;</foo>");
        assert!(validate(&cleaned, &SecurityPolicy::default()).is_valid());

        let cleaned = sanitize(BILLION_LAUGHS);
        assert!(!cleaned.contains("<!ENTITY"));
        assert!(!cleaned.contains("<!DOCTYPE"));
        assert_eq!(cleaned.trim(), "<lolz>&lol3;</lolz>");
    }

    #[test]
    fn sanitize_skips_quoted_entity_values() {
        let xml = r#"<!DOCTYPE a [<!ENTITY x "1>2"><!ENTITY y '<b>'>]><a/>"#;
        assert_eq!(sanitize(xml), "<a/>");

        let parameter = r#"<!DOCTYPE x [<!ENTITY % dtd "<!ENTITY leak 'x'>">]><x/>"#;
        assert_eq!(sanitize(parameter), "<x/>");
    }

    #[test]
    fn external_dtd_keywords_ignore_case() {
        let policy = SecurityPolicy::default().with_dtd_allowed(true);
        let lower = r#"<!doctype x system "http://evil.example/x.dtd"><x/>"#;
        assert_eq!(validate(lower, &policy).issues(), &[SecurityIssue::ExternalDtd]);

        let mixed = r#"<!DocType x Public "-//X//EN" "x.dtd"><x/>"#;
        assert_eq!(validate(mixed, &policy).issues(), &[SecurityIssue::ExternalDtd]);
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let policy: SecurityPolicy =
            serde_json::from_str(r#"{"max_depth": 20, "allow_dtd": true}"#).unwrap();
        assert_eq!(policy.max_depth, 20);
        assert!(policy.allow_dtd);
        assert_eq!(policy.max_size_bytes, SecurityPolicy::DEFAULT_MAX_SIZE_BYTES);
        assert!(policy.disable_entity_expansion);
    }
}
