//! Search filter evaluation for the in-memory directory
//!
//! Covers the subset of RFC 4515 the console sends: `&`, `|`, `!`,
//! presence (`attr=*`) and equality with `*` wildcards. Matching is
//! case-insensitive.

use crate::domain::dn;
use crate::domain::{find_attribute, Attributes, MATCH_ALL_FILTER};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Present(String),
    /// Lowercased value pieces between unescaped `*`
    Equals(String, Vec<String>),
}

impl Filter {
    /// Parse a filter string; an empty string matches everything.
    pub fn parse(input: &str) -> AppResult<Self> {
        let input = input.trim();
        let input = if input.is_empty() { MATCH_ALL_FILTER } else { input };
        match parse_one(input) {
            Some((filter, rest)) if rest.trim().is_empty() => Ok(filter),
            _ => Err(AppError::Malformed(format!("Invalid search filter: {}", input))),
        }
    }

    pub fn matches(&self, attributes: &Attributes) -> bool {
        match self {
            Filter::And(items) => items.iter().all(|f| f.matches(attributes)),
            Filter::Or(items) => items.iter().any(|f| f.matches(attributes)),
            Filter::Not(inner) => !inner.matches(attributes),
            // Every entry carries objectClass on a real server.
            Filter::Present(attr) if attr.eq_ignore_ascii_case("objectClass") => true,
            Filter::Present(attr) => find_attribute(attributes, attr).is_some(),
            Filter::Equals(attr, pieces) => find_attribute(attributes, attr)
                .map(|(_, value)| value.values().iter().any(|v| wildcard_match(pieces, v)))
                .unwrap_or(false),
        }
    }
}

fn parse_one(input: &str) -> Option<(Filter, &str)> {
    let body = input.trim_start().strip_prefix('(')?;

    if let Some(rest) = body.strip_prefix('&') {
        let (items, rest) = parse_list(rest)?;
        return Some((Filter::And(items), rest));
    }
    if let Some(rest) = body.strip_prefix('|') {
        let (items, rest) = parse_list(rest)?;
        return Some((Filter::Or(items), rest));
    }
    if let Some(rest) = body.strip_prefix('!') {
        let (inner, rest) = parse_one(rest)?;
        let rest = rest.trim_start().strip_prefix(')')?;
        return Some((Filter::Not(Box::new(inner)), rest));
    }

    let end = body.find(')')?;
    let (attr, value) = body[..end].split_once('=')?;
    let attr = attr.trim();
    if attr.is_empty() || attr.ends_with(['<', '>', '~', ':']) {
        return None;
    }
    let filter = if value == "*" {
        Filter::Present(attr.to_string())
    } else {
        Filter::Equals(attr.to_string(), pattern_pieces(value))
    };
    Some((filter, &body[end + 1..]))
}

fn parse_list(mut input: &str) -> Option<(Vec<Filter>, &str)> {
    let mut items = Vec::new();
    loop {
        let trimmed = input.trim_start();
        if let Some(rest) = trimmed.strip_prefix(')') {
            return Some((items, rest));
        }
        let (item, rest) = parse_one(trimmed)?;
        items.push(item);
        input = rest;
    }
}

fn pattern_pieces(value: &str) -> Vec<String> {
    value
        .split('*')
        .map(|piece| dn::unescape_value(piece).to_lowercase())
        .collect()
}

fn wildcard_match(pieces: &[String], candidate: &str) -> bool {
    let candidate = candidate.to_lowercase();
    match pieces {
        [] => false,
        [exact] => candidate == *exact,
        [first, middle @ .., last] => {
            if !candidate.starts_with(first.as_str()) {
                return false;
            }
            let mut pos = first.len();
            for piece in middle {
                match candidate[pos..].find(piece.as_str()) {
                    Some(idx) => pos += idx + piece.len(),
                    None => return false,
                }
            }
            candidate.len() >= pos + last.len() && candidate[pos..].ends_with(last.as_str())
        }
    }
}
