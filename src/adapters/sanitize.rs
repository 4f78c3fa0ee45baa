//! Log sanitization for patient identifiers and secrets.
//!
//! Formatted log lines pass through `sanitize()` before reaching the sink.
//! Redacted categories:
//! - Patient identifiers (`BJ20250001` style national codes)
//! - Sealed QR payloads and PNG data URLs
//! - Emails and phone numbers
//! - JWTs, PEM private keys and raw key material
//!
//! Sanitizing strings is a fallback. Sensitive values should not reach log
//! calls in the first place; `CodecKey` for instance only ever prints its
//! fingerprint.
//!
//! Input is capped (see `HEDERA_SANITIZE_MAX_BYTES`) so a huge line cannot
//! stall the logging thread.

use regex::{Regex, RegexSet};
use std::sync::OnceLock;
use tracing_subscriber::fmt::MakeWriter;

static REDACTION_RULES: OnceLock<RedactionRules> = OnceLock::new();

/// Default per-call cap, overridable via `HEDERA_SANITIZE_MAX_BYTES`.
const DEFAULT_SANITIZE_MAX_BYTES: usize = 16 * 1024;

struct Rule {
    regex: Regex,
    replacement: &'static str,
}

struct RedactionRules {
    set: RegexSet,
    rules: Vec<Rule>,
    pem: Rule,
}

fn truncate_to_char_boundary(input: &str, max_bytes: usize) -> (&str, bool) {
    if input.len() <= max_bytes {
        return (input, false);
    }

    let mut end = max_bytes;
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    (&input[..end], true)
}

fn max_sanitize_bytes() -> usize {
    std::env::var("HEDERA_SANITIZE_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|&v| v > 0)
        .unwrap_or(DEFAULT_SANITIZE_MAX_BYTES)
}

fn rules() -> &'static RedactionRules {
    REDACTION_RULES.get_or_init(|| {
        // Order matters: data URLs and sealed blobs are replaced before the
        // narrower patterns could match fragments inside them.
        let table: Vec<(&'static str, &'static str)> = vec![
            (r"data:image/[a-z]+;base64,[A-Za-z0-9+/=]+", "[REDACTED-QR-IMAGE]"),
            (r"[A-Za-z0-9+/]{40,}={0,2}", "[REDACTED-BLOB]"),
            (
                r"\beyJ[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}\b",
                "[REDACTED-JWT]",
            ),
            (
                r"(?i)\b(?:api[_-]?key|secret|password|passphrase|token|key)\b\s*[:=]\s*\S{8,}",
                "[REDACTED-SECRET]",
            ),
            (r"\b[0-9a-fA-F]{32,}\b", "[REDACTED-KEY]"),
            (
                r"(?i)\b[a-z0-9](?:[a-z0-9._%+-]{0,62}[a-z0-9])?@(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}\b",
                "[REDACTED-EMAIL]",
            ),
            (r"\b[A-Z]{2}\d{8}\b", "[REDACTED-PATIENT]"),
            (
                r"(?:\+\d{1,3}[ .]?)?\b\d{2}[ .]\d{2}[ .]\d{2}[ .]\d{2}\b",
                "[REDACTED-PHONE]",
            ),
        ];

        let set = RegexSet::new(table.iter().map(|(p, _)| *p)).expect("Valid regex set");
        let rules = table
            .into_iter()
            .map(|(pattern, replacement)| Rule {
                regex: Regex::new(pattern).expect("Valid regex"),
                replacement,
            })
            .collect();

        // Kept out of the set: a bounded dot-all pattern bloats the merged program.
        let pem = Rule {
            regex: Regex::new(
                r"(?s)-----BEGIN [A-Z0-9 ]{0,40}PRIVATE KEY-----.{0,8192}?-----END [A-Z0-9 ]{0,40}PRIVATE KEY-----",
            )
            .expect("Valid regex"),
            replacement: "[REDACTED-PEM-PRIVATE-KEY]",
        };

        RedactionRules { set, rules, pem }
    })
}

/// Redact identifiers and secrets from a string.
#[must_use]
pub fn sanitize(input: &str) -> String {
    sanitize_with_limit(input, max_sanitize_bytes())
}

fn sanitize_with_limit(input: &str, max_bytes: usize) -> String {
    let rules = rules();
    let (prefix, truncated) = truncate_to_char_boundary(input, max_bytes);

    let mut result = if rules.set.is_match(prefix) {
        let matched = rules.set.matches(prefix);
        let mut out = prefix.to_string();
        // Apply in table order; earlier replacements can remove later matches.
        for (idx, rule) in rules.rules.iter().enumerate() {
            if matched.matched(idx) {
                out = rule.regex.replace_all(&out, rule.replacement).into_owned();
            }
        }
        out
    } else {
        prefix.to_string()
    };

    if result.contains("-----BEGIN ") {
        result = rules
            .pem
            .regex
            .replace_all(&result, rules.pem.replacement)
            .into_owned();
    }

    if truncated {
        result.push_str(" [TRUNCATED]");
        if input.ends_with('\n') {
            result.push('\n');
        }
    }
    result
}

/// Whether a string contains anything `sanitize` would redact.
#[must_use]
pub fn contains_sensitive(input: &str) -> bool {
    let rules = rules();
    let (prefix, _) = truncate_to_char_boundary(input, max_sanitize_bytes());
    rules.set.is_match(prefix)
        || (prefix.contains("-----BEGIN ") && rules.pem.regex.is_match(prefix))
}

/// A `tracing_subscriber` writer that sanitizes each formatted line before
/// handing it to the wrapped writer.
#[derive(Debug, Clone)]
pub struct SanitizingMakeWriter<M> {
    inner: M,
}

impl<M> SanitizingMakeWriter<M> {
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

pub struct SanitizingWriter<W> {
    inner: W,
    buffer: Vec<u8>,
}

impl<W: std::io::Write> SanitizingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
        }
    }

    fn flush_lines(&mut self) -> std::io::Result<()> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let sanitized = sanitize(&String::from_utf8_lossy(&line));
            self.inner.write_all(sanitized.as_bytes())?;
        }
        Ok(())
    }
}

impl<W: std::io::Write> std::io::Write for SanitizingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);

        // A line with no newline in sight is flushed once it exceeds twice the cap.
        let hard_cap = max_sanitize_bytes().saturating_mul(2);
        if self.buffer.len() > hard_cap {
            let sanitized = sanitize(&String::from_utf8_lossy(&self.buffer));
            self.inner.write_all(sanitized.as_bytes())?;
            self.inner.write_all(b"\n")?;
            self.buffer.clear();
            return Ok(buf.len());
        }

        self.flush_lines()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_lines()?;

        if !self.buffer.is_empty() {
            let sanitized = sanitize(&String::from_utf8_lossy(&self.buffer));
            self.inner.write_all(sanitized.as_bytes())?;
            self.buffer.clear();
        }

        self.inner.flush()
    }
}

impl<'a, M> MakeWriter<'a> for SanitizingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = SanitizingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        SanitizingWriter::new(self.inner.make_writer())
    }
}
