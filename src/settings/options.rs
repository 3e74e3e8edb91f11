//! Keyword option parsing.
//!
//! Bundle settings can be given as `key = value` pairs, either one at a time through
//! [`crate::settings::BundleSettingsBuilder::option`] or as a whole text file such as the
//! `TBPARAMETERS` target body file:
//!
//! ```text
//! # Moon pole and radius
//! Group = SolveTargetBody
//!   Ra               = position
//!   RaValue          = 269.9949
//!   RaSigma          = 0.0013
//!   RadiiSolveOption = mean
//! End_Group
//! End
//! ```
//!
//! Comments start with `#`, keys are case-insensitive, `Group`/`End_Group`/`End` markers are
//! accepted and skipped. Values may be quoted.
use std::collections::BTreeMap;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, space0},
    combinator::{opt, rest},
    sequence::{delimited, preceded},
    IResult, Parser,
};

use crate::jigsaw_errors::JigsawError;

/// Parsed keyword file, keys lower-cased.
pub type KeywordMap = BTreeMap<String, String>;

fn is_key_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn parse_key(input: &str) -> IResult<&str, &str> {
    preceded(space0, take_while1(is_key_char)).parse(input)
}

fn parse_quoted(input: &str) -> IResult<&str, &str> {
    delimited(char('"'), take_while(|c: char| c != '"'), char('"')).parse(input)
}

fn parse_value(input: &str) -> IResult<&str, &str> {
    preceded(space0, alt((parse_quoted, rest))).parse(input)
}

/// Parse one `KEY = VALUE` line.
pub fn parse_keyword_line(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, key) = parse_key(input)?;
    let (input, _) = preceded(space0, tag("=")).parse(input)?;
    let (input, value) = parse_value(input)?;
    let (input, _) = opt(space0).parse(input)?;
    Ok((input, (key, value.trim())))
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn is_structure_line(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower == "end"
        || lower == "end_group"
        || lower == "end_object"
        || lower.starts_with("group")
        || lower.starts_with("object")
}

/// Parse a whole keyword file into a [`KeywordMap`].
///
/// Arguments
/// -----------------
/// * `content`: the text of the file.
///
/// Return
/// ----------
/// * The keyword map (keys lower-cased, last occurrence wins), or
///   [`JigsawError::NomParsingError`] naming the first malformed line.
pub fn parse_keyword_file(content: &str) -> Result<KeywordMap, JigsawError> {
    let mut map = KeywordMap::new();
    for raw in content.lines() {
        let line = strip_comment(raw).trim();
        if line.is_empty() || is_structure_line(line) {
            continue;
        }
        let (_, (key, value)) =
            parse_keyword_line(line).map_err(|_| JigsawError::NomParsingError(raw.to_string()))?;
        map.insert(key.to_ascii_lowercase(), value.to_string());
    }
    Ok(map)
}

/// Parse a boolean option value (`true/false`, `yes/no`, `on/off`, `1/0`).
pub fn parse_bool(key: &str, value: &str) -> Result<bool, JigsawError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(JigsawError::InvalidSetting(format!(
            "{key}: expected a boolean, got '{value}'"
        ))),
    }
}

/// Parse a floating point option value.
pub fn parse_f64(key: &str, value: &str) -> Result<f64, JigsawError> {
    value.trim().parse::<f64>().map_err(|_| {
        JigsawError::InvalidSetting(format!("{key}: expected a number, got '{value}'"))
    })
}

/// Parse an optional sigma: `Null`, `None` or an empty value mean no constraint.
pub fn parse_sigma(key: &str, value: &str) -> Result<Option<f64>, JigsawError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "null" | "none" => Ok(None),
        _ => parse_f64(key, value).map(Some),
    }
}

/// Parse a non-negative integer option value.
pub fn parse_usize(key: &str, value: &str) -> Result<usize, JigsawError> {
    value.trim().parse::<usize>().map_err(|_| {
        JigsawError::InvalidSetting(format!(
            "{key}: expected a non-negative integer, got '{value}'"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keyword_line() {
        let (_, (k, v)) = parse_keyword_line("  RaValue = 269.9949").unwrap();
        assert_eq!(k, "RaValue");
        assert_eq!(v, "269.9949");

        let (_, (k, v)) = parse_keyword_line("Name = \"Moon target\"").unwrap();
        assert_eq!(k, "Name");
        assert_eq!(v, "Moon target");
    }

    #[test]
    fn test_parse_keyword_file_skips_structure() {
        let content = "# header\nGroup = SolveTargetBody\n  Ra = position # solve\n  RaSigma = 0.1\nEnd_Group\nEnd\n";
        let map = parse_keyword_file(content).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["ra"], "position");
        assert_eq!(map["rasigma"], "0.1");
    }

    #[test]
    fn test_parse_keyword_file_rejects_garbage() {
        let err = parse_keyword_file("Ra position").unwrap_err();
        assert_eq!(err, JigsawError::NomParsingError("Ra position".into()));
    }

    #[test]
    fn test_value_helpers() {
        assert!(parse_bool("k", "Yes").unwrap());
        assert!(!parse_bool("k", "0").unwrap());
        assert!(parse_bool("k", "maybe").is_err());
        assert_eq!(parse_sigma("k", "Null").unwrap(), None);
        assert_eq!(parse_sigma("k", "2.5").unwrap(), Some(2.5));
        assert!(parse_usize("k", "-1").is_err());
    }
}
