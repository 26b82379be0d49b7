//! Percent-encoding and parameter carriers for OAuth 1.0a.
//!
//! OAuth signs the RFC 3986 encoding of every key and value: only the
//! unreserved characters `ALPHA / DIGIT / "-" / "." / "_" / "~"` pass through,
//! everything else becomes `%XX` with uppercase hex digits.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// RFC 3986 unreserved characters are the only ones left untouched.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Same as [`OAUTH_ENCODE_SET`] but keeps path separators, for `next=` targets.
const PATH_ENCODE_SET: &AsciiSet = &OAUTH_ENCODE_SET.remove(b'/');

/// Percent-encodes a string with the OAuth (RFC 3986) rules.
///
/// ```
/// use starberry_oauth1::oauth_core::encoding::encode;
/// assert_eq!(encode("Hello World!"), "Hello%20World%21");
/// assert_eq!(encode("a-b_c.d~e"), "a-b_c.d~e");
/// ```
pub fn encode(input: &str) -> String {
    utf8_percent_encode(input, OAUTH_ENCODE_SET).to_string()
}

/// Encodes a local path and query so it can travel as a single query value.
pub fn encode_path(input: &str) -> String {
    utf8_percent_encode(input, PATH_ENCODE_SET).to_string()
}

/// Decodes a percent-encoded string, replacing invalid UTF-8 lossily.
pub fn decode(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

/// Parses an `application/x-www-form-urlencoded` string (query or body).
pub fn parse_form(input: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(input.trim_start_matches('?').as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Serializes `key=value` pairs with OAuth encoding, preserving order.
///
/// Used for the token endpoint bodies, e.g.
/// `oauth_token_secret=...&oauth_token=...`.
pub fn encode_form<K: AsRef<str>, V: AsRef<str>>(pairs: &[(K, V)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k.as_ref()), encode(v.as_ref())))
        .collect::<Vec<_>>()
        .join("&")
}

/// Parsed `Authorization: OAuth ...` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationHeader {
    /// The `realm` attribute, which never takes part in signing.
    pub realm: Option<String>,
    /// Every other attribute, decoded, in header order.
    pub params: Vec<(String, String)>,
}

/// Parses an `Authorization` header value using the `OAuth` scheme.
///
/// Returns `None` when the header uses another scheme (e.g. `Basic`).
pub fn parse_authorization_header(value: &str) -> Option<AuthorizationHeader> {
    let value = value.trim();
    let (scheme, rest) = match value.split_once(char::is_whitespace) {
        Some((scheme, rest)) => (scheme, rest),
        None => (value, ""),
    };
    if !scheme.eq_ignore_ascii_case("OAuth") {
        return None;
    }

    let mut header = AuthorizationHeader::default();
    for item in split_outside_quotes(rest, ',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let Some((key, raw)) = item.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let raw = raw.trim();
        if key.eq_ignore_ascii_case("realm") {
            header.realm = Some(unquote(raw));
        } else {
            header.params.push((decode(key), decode(&unquote(raw))));
        }
    }
    Some(header)
}

/// Renders an `Authorization: OAuth ...` header value from protocol parameters.
pub fn authorization_header<K: AsRef<str>, V: AsRef<str>>(realm: Option<&str>, params: &[(K, V)]) -> String {
    let mut parts = Vec::with_capacity(params.len() + 1);
    if let Some(realm) = realm {
        parts.push(format!("realm=\"{}\"", escape_quoted(realm)));
    }
    for (k, v) in params {
        parts.push(format!("{}=\"{}\"", encode(k.as_ref()), encode(v.as_ref())));
    }
    format!("OAuth {}", parts.join(", "))
}

/// Splits on `sep`, ignoring separators inside double-quoted sections.
fn split_outside_quotes(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;
    for (idx, c) in input.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                parts.push(&input[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

/// Strips surrounding quotes and resolves backslash escapes (RFC 2616 quoted-string).
fn unquote(s: &str) -> String {
    let Some(inner) = s.strip_prefix('"').and_then(|s| s.strip_suffix('"')) else {
        return s.to_string();
    };
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                result.push(next);
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn escape_quoted(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        if c == '"' || c == '\\' {
            result.push('\\');
        }
        result.push(c);
    }
    result
}
