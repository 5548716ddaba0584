//! Response status keys and HTTP reason phrases
//!
//! OpenAPI keys responses by strings: exact codes (`"201"`), class wildcards
//! (`"2XX"`) and `"default"`. [`StatusKey`] parses all three and knows how to
//! render them into a collection response template.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A response key as declared in an OpenAPI `responses` mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKey {
    /// Exact status code, e.g. `201`
    Code(u16),
    /// Status class wildcard, e.g. `2XX` → `Class(2)`
    Class(u8),
    /// The `default` response (treated as a server error)
    Default,
}

impl StatusKey {
    /// Numeric code used in response templates.
    ///
    /// `default` maps to 500, a class wildcard to its first code.
    #[must_use]
    pub const fn representative(self) -> u16 {
        match self {
            Self::Code(c) => c,
            Self::Class(c) => c as u16 * 100,
            Self::Default => 500,
        }
    }

    /// Status class digit (`2` for any 2xx).
    #[must_use]
    pub const fn class(self) -> u8 {
        match self {
            Self::Code(c) => (c / 100) as u8,
            Self::Class(c) => c,
            Self::Default => 5,
        }
    }

    /// True for keys in the 2xx class.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.class() == 2
    }

    /// Whether an expectation key selects this declared response key.
    ///
    /// Exact keys must be equal; a class wildcard on either side matches any
    /// code in that class.
    #[must_use]
    pub fn matches(self, declared: Self) -> bool {
        match (self, declared) {
            (Self::Class(a), other) | (other, Self::Class(a)) if other != Self::Default => {
                other.class() == a
            }
            (a, b) => a == b,
        }
    }

    /// Reason phrase for the key, falling back to the class description.
    #[must_use]
    pub fn reason_phrase(self) -> &'static str {
        match self {
            Self::Code(c) => reason_phrase(c),
            Self::Class(c) => class_description(c),
            Self::Default => reason_phrase(500),
        }
    }
}

impl fmt::Display for StatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(c) => write!(f, "{c}"),
            Self::Class(c) => write!(f, "{c}XX"),
            Self::Default => f.write_str("default"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid response status key: {0:?}")]
pub struct InvalidStatusKey(pub String);

impl FromStr for StatusKey {
    type Err = InvalidStatusKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("default") {
            return Ok(Self::Default);
        }
        let bytes = trimmed.as_bytes();
        if bytes.len() == 3 && bytes[0].is_ascii_digit() {
            if bytes[1..].iter().all(|b| b.eq_ignore_ascii_case(&b'x')) {
                return Ok(Self::Class(bytes[0] - b'0'));
            }
            if let Ok(code) = trimmed.parse::<u16>() {
                return Ok(Self::Code(code));
            }
        }
        Err(InvalidStatusKey(s.to_string()))
    }
}

impl Serialize for StatusKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StatusKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Config files write `code: 201` as often as `code: "201"`.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(u16),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(code) => Ok(Self::Code(code)),
            Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Registered reason phrase for an exact code.
#[must_use]
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        102 => "Processing",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Time-out",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Request Entity Too Large",
        414 => "Request-URI Too Large",
        415 => "Unsupported Media Type",
        416 => "Requested range not satisfiable",
        417 => "Expectation Failed",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Time-out",
        505 => "HTTP Version not supported",
        other => class_description((other / 100) as u8),
    }
}

/// Description of a status class (`2` → "Success - ...").
#[must_use]
pub const fn class_description(class: u8) -> &'static str {
    match class {
        1 => "Informational - Request received, continuing process",
        2 => "Success - The action was successfully received, understood, and accepted",
        3 => "Redirection - Further action must be taken in order to complete the request",
        4 => "Client Error - The request contains bad syntax or cannot be fulfilled",
        5 => "Server Error - The server failed to fulfill an apparently valid request",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_exact_code() {
        assert_eq!("201".parse::<StatusKey>().unwrap(), StatusKey::Code(201));
    }

    #[test]
    fn parse_class_wildcard_any_case() {
        assert_eq!("2XX".parse::<StatusKey>().unwrap(), StatusKey::Class(2));
        assert_eq!("4xx".parse::<StatusKey>().unwrap(), StatusKey::Class(4));
    }

    #[test]
    fn parse_default() {
        assert_eq!("default".parse::<StatusKey>().unwrap(), StatusKey::Default);
        assert_eq!(StatusKey::Default.representative(), 500);
        assert!(!StatusKey::Default.is_success());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("ok".parse::<StatusKey>().is_err());
        assert!("20".parse::<StatusKey>().is_err());
        assert!("2X0".parse::<StatusKey>().is_err());
    }

    #[test]
    fn deserialize_int_and_string() {
        let a: StatusKey = serde_json::from_str("201").unwrap();
        let b: StatusKey = serde_json::from_str("\"201\"").unwrap();
        assert_eq!(a, b);
        let c: StatusKey = serde_json::from_str("\"5XX\"").unwrap();
        assert_eq!(c, StatusKey::Class(5));
    }

    #[test]
    fn serialize_as_string() {
        assert_eq!(
            serde_json::to_string(&StatusKey::Class(2)).unwrap(),
            "\"2XX\""
        );
    }

    #[test]
    fn matching_rules() {
        assert!(StatusKey::Code(201).matches(StatusKey::Code(201)));
        assert!(!StatusKey::Code(201).matches(StatusKey::Code(200)));
        assert!(StatusKey::Code(201).matches(StatusKey::Class(2)));
        assert!(StatusKey::Class(2).matches(StatusKey::Code(204)));
        assert!(!StatusKey::Class(2).matches(StatusKey::Default));
        assert!(StatusKey::Default.matches(StatusKey::Default));
    }

    #[test]
    fn reason_phrase_defined_and_fallback() {
        assert_eq!(reason_phrase(200), "OK");
        assert_eq!(
            reason_phrase(299),
            "Success - The action was successfully received, understood, and accepted"
        );
        assert_eq!(StatusKey::Class(4).reason_phrase(), class_description(4));
    }
}
