//! Parsers for the response header values the engine relies on.
//!
//! Most of this module tokenizes `Content-Disposition` parameters, handling
//! the three value forms servers send in practice:
//! - quoted: `filename="report \"final\".pdf"`
//! - unquoted (token): `filename=report.pdf`
//! - extended (RFC 5987): `filename*=UTF-8''%E6%8A%A5%E5%91%8A.pdf`
//!
//! Parsing never fails. A malformed extended value is kept as
//! [`ParamValue::Invalid`] so callers can treat it as absent and move on to
//! the next source of a filename.
//!
//! `Content-Range` and `Accept-Ranges` get small dedicated parsers at the end.

use std::collections::HashMap;

/// A single decoded parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// Quoted or token value, unescaped.
    Regular(String),
    /// Extended (`name*=`) value, percent-decoded in its declared charset.
    Extended(String),
    /// Extended value that could not be decoded.
    Invalid,
}

impl ParamValue {
    /// Returns the decoded text, or `None` for invalid values.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Regular(value) | Self::Extended(value) => Some(value),
            Self::Invalid => None,
        }
    }

    /// Whether the value was written in `name*=` notation.
    #[must_use]
    pub fn is_extended(&self) -> bool {
        matches!(self, Self::Extended(_))
    }
}

/// Parsed `Content-Disposition` header: the disposition type plus its parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Disposition {
    /// Lower-cased disposition type (`attachment`, `inline`, ...). May be empty.
    pub kind: String,
    /// Parameters keyed by lower-cased name, including a trailing `*` for extended ones.
    pub params: HashMap<String, ParamValue>,
}

impl Disposition {
    /// Returns the filename hint, preferring a valid `filename*` over `filename`.
    ///
    /// Empty values are treated as absent.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        let non_empty = |key: &str| {
            self.params
                .get(key)
                .and_then(ParamValue::as_str)
                .filter(|v| !v.trim().is_empty())
        };
        non_empty("filename*").or_else(|| non_empty("filename"))
    }
}

/// Parses a full `Content-Disposition` header value.
#[must_use]
pub fn parse_disposition(header: &str) -> Disposition {
    let header = header.trim();
    let (kind, rest) = match header.find(';') {
        Some(pos) => (&header[..pos], &header[pos + 1..]),
        None => (header, ""),
    };

    // A header that starts directly with a parameter has no type token.
    if kind.contains('=') {
        return Disposition {
            kind: String::new(),
            params: parse_parameters(header),
        };
    }

    Disposition {
        kind: kind.trim().to_ascii_lowercase(),
        params: parse_parameters(rest),
    }
}

/// Parses `key=value; key="value"; key*=charset'lang'value` parameter lists.
///
/// The first occurrence of a key wins. Parameters without `=` are skipped.
#[must_use]
pub fn parse_parameters(input: &str) -> HashMap<String, ParamValue> {
    let mut params = HashMap::new();
    let mut chars = input.char_indices().peekable();

    loop {
        while chars.next_if(|(_, c)| *c == ';' || c.is_whitespace()).is_some() {}
        let Some(&(key_start, _)) = chars.peek() else {
            break;
        };

        let mut key_end = input.len();
        let mut has_value = false;
        while let Some((idx, c)) = chars.next() {
            if c == '=' {
                key_end = idx;
                has_value = true;
                break;
            }
            if c == ';' {
                key_end = idx;
                break;
            }
        }
        if !has_value {
            continue;
        }
        let key = input[key_start..key_end].trim().to_ascii_lowercase();

        while chars.next_if(|(_, c)| *c == ' ' || *c == '\t').is_some() {}

        let raw = if chars.next_if(|(_, c)| *c == '"').is_some() {
            let mut value = String::new();
            while let Some((_, c)) = chars.next() {
                match c {
                    '\\' => {
                        if let Some((_, escaped)) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    other => value.push(other),
                }
            }
            // Skip trailing garbage up to the next separator.
            while chars.next_if(|(_, c)| *c != ';').is_some() {}
            value
        } else {
            let start = chars.peek().map_or(input.len(), |(idx, _)| *idx);
            let mut end = input.len();
            while let Some((idx, c)) = chars.next() {
                if c == ';' {
                    end = idx;
                    break;
                }
            }
            input[start..end].trim().to_string()
        };

        if key.is_empty() {
            continue;
        }
        let value = if key.ends_with('*') {
            decode_extended(&raw)
        } else {
            ParamValue::Regular(raw)
        };
        params.entry(key).or_insert(value);
    }

    params
}

/// Decodes an RFC 5987 `charset'lang'pct-encoded` value.
#[must_use]
pub fn decode_extended(raw: &str) -> ParamValue {
    let mut parts = raw.splitn(3, '\'');
    let (Some(charset), Some(_lang), Some(encoded)) = (parts.next(), parts.next(), parts.next())
    else {
        return ParamValue::Invalid;
    };

    if !is_valid_percent_encoding(encoded) {
        return ParamValue::Invalid;
    }
    let bytes = urlencoding::decode_binary(encoded.as_bytes());

    let charset = charset.trim();
    if charset.eq_ignore_ascii_case("utf-8") {
        match String::from_utf8(bytes.into_owned()) {
            Ok(text) => ParamValue::Extended(text),
            Err(_) => ParamValue::Invalid,
        }
    } else if charset.eq_ignore_ascii_case("iso-8859-1") || charset.eq_ignore_ascii_case("latin1")
    {
        ParamValue::Extended(bytes.iter().map(|&b| char::from(b)).collect())
    } else {
        ParamValue::Invalid
    }
}

/// Every `%` must introduce exactly two hex digits.
fn is_valid_percent_encoding(value: &str) -> bool {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex_pair = bytes.get(i + 1..i + 3);
            if !hex_pair.is_some_and(|pair| pair.iter().all(u8::is_ascii_hexdigit)) {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

/// Parsed `Content-Range: bytes start-end/total` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// First byte offset.
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
    /// Complete length, `None` when the server sends `*`.
    pub total: Option<u64>,
}

/// Parses a `Content-Range` header. Returns `None` for any other unit or shape.
#[must_use]
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.trim().split_once('-')?;
    let start = start.trim().parse().ok()?;
    let end = end.trim().parse().ok()?;
    if end < start {
        return None;
    }
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some(ContentRange { start, end, total })
}

/// Whether an `Accept-Ranges` value advertises the `bytes` unit.
#[must_use]
pub fn accepts_byte_ranges(value: &str) -> bool {
    value
        .split(',')
        .any(|unit| unit.trim().eq_ignore_ascii_case("bytes"))
}
