//! Event sanitization.
//!
//! Every string reaching storage passes through here first: control
//! characters and HTML are stripped, credential material and card/SSN
//! patterns are masked unconditionally, and emails/phones/IPs are masked
//! when the project's [`ScrubPolicy`] asks for it. Sanitization is
//! idempotent: running it twice yields the same output.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::event::{ErrorEvent, StackFrame};
use crate::project::ScrubPolicy;

/// Maximum string length in Unicode code points; overflow is marked with a
/// trailing ellipsis.
const MAX_STRING_LEN: usize = 2000;

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

static CARD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d(?:[ \-]?\d){12,18}\b").unwrap());

static SSN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}[\- ]?\d{2}[\- ]?\d{4}\b").unwrap());

static KEY_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(password|passwd|pwd|secret|api[_-]?key|token)\s*[=:]\s*\S+").unwrap()
});

static BEARER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bbearer\s+\S+").unwrap());

static GENERIC_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(sk|pk|api|key|token)([-_]?)([A-Za-z0-9_\-]{8,})").unwrap());

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").unwrap());

static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?\d{1,3}[\-. ]?)?\(?\d{3}\)?[\-. ]?\d{3}[\-. ]?\d{4}\b").unwrap()
});

static IPV4: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,3}(?:\.\d{1,3}){3}\b").unwrap());

/// Sanitize a single string according to the policy.
#[must_use]
pub fn sanitize_string(input: &str, policy: &ScrubPolicy) -> String {
    let mut out: String = input
        .chars()
        .filter(|c| !('\u{0000}'..='\u{001f}').contains(c) && *c != '\u{007f}')
        .collect();

    out = HTML_TAG.replace_all(&out, "").into_owned();
    out = CARD.replace_all(&out, "[REDACTED:CARD]").into_owned();
    out = SSN.replace_all(&out, "XXX-**-XXXX").into_owned();
    out = KEY_ASSIGNMENT
        .replace_all(&out, "$1=[REDACTED]")
        .into_owned();
    out = BEARER.replace_all(&out, "bearer [REDACTED]").into_owned();
    out = GENERIC_KEY
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            format!("{}{}{}", &caps[1], &caps[2], mask_body(&caps[3]))
        })
        .into_owned();

    if policy.remove_emails {
        out = EMAIL.replace_all(&out, "[REDACTED:EMAIL]").into_owned();
    }
    if policy.remove_phones {
        out = PHONE.replace_all(&out, "[REDACTED:PHONE]").into_owned();
    }
    if policy.remove_ips {
        out = IPV4.replace_all(&out, "[REDACTED:IP]").into_owned();
    }

    clamp(&out)
}

/// Replace the interior of a credential body with asterisks, preserving the
/// last two characters.
fn mask_body(body: &str) -> String {
    let chars: Vec<char> = body.chars().collect();
    let keep = 2.min(chars.len());
    let mut masked = "*".repeat(chars.len() - keep);
    masked.extend(&chars[chars.len() - keep..]);
    masked
}

/// Clamp to [`MAX_STRING_LEN`] code points with a trailing ellipsis.
fn clamp(input: &str) -> String {
    let mut count = 0usize;
    for (idx, _) in input.char_indices() {
        if count == MAX_STRING_LEN {
            let mut out = input[..idx].to_owned();
            out.push('\u{2026}');
            return out;
        }
        count += 1;
    }
    input.to_owned()
}

/// Recursively sanitize a JSON value: strings are scrubbed, arrays and
/// mappings are walked, numbers and booleans pass through unchanged.
#[must_use]
pub fn sanitize_value(value: &Value, policy: &ScrubPolicy) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_string(s, policy)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| sanitize_value(v, policy)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), sanitize_value(v, policy)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn sanitize_frame(frame: &StackFrame, policy: &ScrubPolicy) -> StackFrame {
    StackFrame {
        file: frame.file.as_deref().map(|f| sanitize_string(f, policy)),
        line: frame.line,
        column: frame.column,
        function: frame
            .function
            .as_deref()
            .map(|f| sanitize_string(f, policy)),
        in_app: frame.in_app,
    }
}

/// Sanitize a raw event per the project policy.
///
/// The output is structurally identical to the input: fields the client
/// did not send stay `None`, so issue updates downstream never overwrite
/// absent data.
#[must_use]
pub fn sanitize_event(event: &ErrorEvent, policy: &ScrubPolicy) -> ErrorEvent {
    ErrorEvent {
        message: sanitize_string(&event.message, policy),
        stack_trace: event
            .stack_trace
            .iter()
            .map(|f| sanitize_frame(f, policy))
            .collect(),
        environment: event
            .environment
            .as_deref()
            .map(|e| sanitize_string(e, policy)),
        metadata: event.metadata.as_ref().map(|v| sanitize_value(v, policy)),
        user_context: event
            .user_context
            .as_ref()
            .map(|v| sanitize_value(v, policy)),
        context: event.context.as_ref().map(|v| sanitize_value(v, policy)),
        request: event.request.as_ref().map(|v| sanitize_value(v, policy)),
        timestamp: event.timestamp,
    }
}
