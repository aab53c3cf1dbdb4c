use std::str::FromStr;

use pep508_rs::Requirement as PepRequirement;
use serde::{Deserialize, Serialize};

/// Extras whose requirements count as test dependencies.
pub const TEST_EXTRAS: &[&str] = &["test", "tests"];

/// `Requires-Dist` entries split by purpose.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementSets {
    pub run: Vec<String>,
    pub test: Vec<String>,
}

/// Unmarked requirements are runtime dependencies; a marker consisting of
/// a single `extra == "test"` (or `"tests"`) comparison makes a test
/// dependency. Everything else is dropped.
pub fn classify_requirements<'a>(
    requirements: impl IntoIterator<Item = &'a str>,
) -> RequirementSets {
    let mut sets = RequirementSets::default();
    for raw in requirements {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        match marker_of(raw) {
            None => push_unique(&mut sets.run, raw),
            Some(marker) if is_test_extra(&marker) => push_unique(&mut sets.test, raw),
            Some(_) => {}
        }
    }
    sets
}

/// Distribution name of a requirement string.
pub fn requirement_name(raw: &str) -> Option<String> {
    PepRequirement::from_str(raw.trim())
        .ok()
        .map(|req| req.name.to_string())
}

fn marker_of(raw: &str) -> Option<String> {
    match PepRequirement::from_str(raw) {
        Ok(req) => req.marker.map(|expr| expr.to_string()),
        Err(_) => raw
            .split_once(';')
            .map(|(_, marker)| marker.trim().to_string())
            .filter(|marker| !marker.is_empty()),
    }
}

fn is_test_extra(marker: &str) -> bool {
    let compact: String = marker
        .chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '"' && *ch != '\'')
        .collect();
    TEST_EXTRAS
        .iter()
        .any(|extra| compact == format!("extra=={extra}"))
}

fn push_unique(values: &mut Vec<String>, raw: &str) {
    if !values.iter().any(|known| known == raw) {
        values.push(raw.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_run_and_test_requirements() {
        let sets = classify_requirements([
            "requests>=2",
            "pytest ; extra == 'test'",
            "coverage; extra == \"tests\"",
            "sphinx; extra == 'docs'",
            "tomli; python_version < '3.11'",
        ]);
        assert_eq!(sets.run, vec!["requests>=2".to_string()]);
        assert_eq!(
            sets.test,
            vec![
                "pytest ; extra == 'test'".to_string(),
                "coverage; extra == \"tests\"".to_string()
            ]
        );
    }

    #[test]
    fn names_come_from_pep508() {
        let name = requirement_name("Foo[bar] >= 1.0").map(|name| name.to_ascii_lowercase());
        assert_eq!(name.as_deref(), Some("foo"));
        assert!(requirement_name("not a requirement !!").is_none());
    }
}
