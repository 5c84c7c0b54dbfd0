//! Input transformations applied to each candidate value before the
//! operator sees it (`t:lowercase`, `t:urlDecode`, ...).

use std::borrow::Cow;

use base64::Engine as Base64Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;

use crate::error::{EvalError, Result};

/// A single transformation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transformation {
    Lowercase,
    Uppercase,
    Trim,
    TrimLeft,
    TrimRight,
    /// Collapse every run of whitespace into one space.
    CompressWhitespace,
    RemoveWhitespace,
    RemoveNulls,
    /// Percent-decoding, with `+` read as a space. Invalid sequences are
    /// left as they are.
    UrlDecode,
    /// Undecodable input is passed through unchanged.
    Base64Decode,
    /// Replace the value with its length in bytes.
    Length,
}

/// What a `t:` action asks for: clear the chain (`t:none`) or append a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformStep {
    None,
    Apply(Transformation),
}

impl TransformStep {
    pub fn from_name(name: &str) -> Result<Self> {
        let t = match name.trim().to_ascii_lowercase().as_str() {
            "none" => return Ok(TransformStep::None),
            "lowercase" => Transformation::Lowercase,
            "uppercase" => Transformation::Uppercase,
            "trim" => Transformation::Trim,
            "trimleft" => Transformation::TrimLeft,
            "trimright" => Transformation::TrimRight,
            "compresswhitespace" => Transformation::CompressWhitespace,
            "removewhitespace" => Transformation::RemoveWhitespace,
            "removenulls" => Transformation::RemoveNulls,
            "urldecode" | "urldecodeuni" => Transformation::UrlDecode,
            "base64decode" => Transformation::Base64Decode,
            "length" => Transformation::Length,
            other => {
                return Err(EvalError::InvalidActionParam {
                    action: "t".into(),
                    reason: format!("unknown transformation '{other}'"),
                });
            }
        };
        Ok(TransformStep::Apply(t))
    }
}

impl Transformation {
    pub fn name(self) -> &'static str {
        match self {
            Transformation::Lowercase => "lowercase",
            Transformation::Uppercase => "uppercase",
            Transformation::Trim => "trim",
            Transformation::TrimLeft => "trimLeft",
            Transformation::TrimRight => "trimRight",
            Transformation::CompressWhitespace => "compressWhitespace",
            Transformation::RemoveWhitespace => "removeWhitespace",
            Transformation::RemoveNulls => "removeNulls",
            Transformation::UrlDecode => "urlDecode",
            Transformation::Base64Decode => "base64Decode",
            Transformation::Length => "length",
        }
    }

    pub fn apply<'a>(self, input: &'a str) -> Cow<'a, str> {
        match self {
            Transformation::Lowercase => {
                if input.bytes().any(|b| b.is_ascii_uppercase()) {
                    Cow::Owned(input.to_ascii_lowercase())
                } else {
                    Cow::Borrowed(input)
                }
            }
            Transformation::Uppercase => Cow::Owned(input.to_ascii_uppercase()),
            Transformation::Trim => Cow::Borrowed(input.trim()),
            Transformation::TrimLeft => Cow::Borrowed(input.trim_start()),
            Transformation::TrimRight => Cow::Borrowed(input.trim_end()),
            Transformation::CompressWhitespace => {
                let mut out = String::with_capacity(input.len());
                let mut in_space = false;
                for c in input.chars() {
                    if c.is_whitespace() {
                        if !in_space {
                            out.push(' ');
                        }
                        in_space = true;
                    } else {
                        out.push(c);
                        in_space = false;
                    }
                }
                Cow::Owned(out)
            }
            Transformation::RemoveWhitespace => {
                Cow::Owned(input.chars().filter(|c| !c.is_whitespace()).collect())
            }
            Transformation::RemoveNulls => {
                if input.contains('\0') {
                    Cow::Owned(input.replace('\0', ""))
                } else {
                    Cow::Borrowed(input)
                }
            }
            Transformation::UrlDecode => {
                let plus_as_space = input.replace('+', " ");
                let bytes = urlencoding::decode_binary(plus_as_space.as_bytes());
                Cow::Owned(String::from_utf8_lossy(&bytes).into_owned())
            }
            Transformation::Base64Decode => match BASE64_STANDARD.decode(input.trim()) {
                Ok(bytes) => Cow::Owned(String::from_utf8_lossy(&bytes).into_owned()),
                Err(e) => {
                    log::debug!("base64Decode left input unchanged: {e}");
                    Cow::Borrowed(input)
                }
            },
            Transformation::Length => Cow::Owned(input.len().to_string()),
        }
    }
}

/// Run a transformation chain over `input`, in order.
pub fn apply_all<'a>(chain: &[Transformation], input: &'a str) -> Cow<'a, str> {
    let mut value = Cow::Borrowed(input);
    for t in chain {
        value = match value {
            Cow::Borrowed(s) => t.apply(s),
            Cow::Owned(s) => Cow::Owned(t.apply(&s).into_owned()),
        };
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(
            TransformStep::from_name("lowercase").unwrap(),
            TransformStep::Apply(Transformation::Lowercase)
        );
        assert_eq!(
            TransformStep::from_name("urlDecodeUni").unwrap(),
            TransformStep::Apply(Transformation::UrlDecode)
        );
        assert_eq!(TransformStep::from_name("none").unwrap(), TransformStep::None);
        assert!(matches!(
            TransformStep::from_name("rot13"),
            Err(EvalError::InvalidActionParam { .. })
        ));
    }

    #[test]
    fn test_case_and_trim() {
        assert_eq!(Transformation::Lowercase.apply("<SCRIPT>"), "<script>");
        assert!(matches!(Transformation::Lowercase.apply("abc"), Cow::Borrowed(_)));
        assert_eq!(Transformation::Uppercase.apply("abc"), "ABC");
        assert_eq!(Transformation::Trim.apply("  a b  "), "a b");
        assert_eq!(Transformation::TrimLeft.apply("  a "), "a ");
        assert_eq!(Transformation::TrimRight.apply("  a "), "  a");
    }

    #[test]
    fn test_whitespace() {
        assert_eq!(
            Transformation::CompressWhitespace.apply("union \t\n  select"),
            "union select"
        );
        assert_eq!(Transformation::RemoveWhitespace.apply("a b\tc"), "abc");
        assert_eq!(Transformation::RemoveNulls.apply("a\0b"), "ab");
    }

    #[test]
    fn test_url_decode() {
        assert_eq!(
            Transformation::UrlDecode.apply("%3Cscript%3E+alert(1)"),
            "<script> alert(1)"
        );
        assert_eq!(Transformation::UrlDecode.apply("100%"), "100%");
    }

    #[test]
    fn test_base64_decode() {
        assert_eq!(Transformation::Base64Decode.apply("PHNjcmlwdD4="), "<script>");
        assert_eq!(Transformation::Base64Decode.apply("not base64!"), "not base64!");
    }

    #[test]
    fn test_length() {
        assert_eq!(Transformation::Length.apply("hello"), "5");
    }

    #[test]
    fn test_chain_in_order() {
        let chain = [
            Transformation::UrlDecode,
            Transformation::Lowercase,
            Transformation::CompressWhitespace,
        ];
        assert_eq!(apply_all(&chain, "UNION%20%20SELECT"), "union select");
        assert_eq!(apply_all(&[], "x"), "x");
    }
}
