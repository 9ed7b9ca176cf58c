//! Target pattern resolution
//!
//! A target pattern is a comma-separated list of names. An element containing
//! `*` is a wildcard where `*` stands for any run of characters, so `cass*`
//! selects every name starting with `cass`.

use crate::error::{ProjectError, Result};
use regex::Regex;
use std::collections::BTreeSet;

/// Resolve `pattern` against the declared `names`.
///
/// Every element must select something: an unknown exact name or a wildcard
/// with no match is an error listing what is available. The result is sorted
/// and free of duplicates.
pub fn resolve_targets<'a, I>(pattern: &str, names: I, kind: &str) -> Result<Vec<String>>
where
    I: IntoIterator<Item = &'a String>,
{
    let names: BTreeSet<&str> = names.into_iter().map(String::as_str).collect();
    let available = || names.iter().map(|n| n.to_string()).collect::<Vec<_>>();

    if pattern.trim().is_empty() {
        return Err(ProjectError::EmptyPattern(format!("{}s", kind)));
    }

    let mut selected = BTreeSet::new();
    for element in pattern.split(',').map(str::trim) {
        if element.contains('*') {
            let re = wildcard_regex(element)?;
            let matches: Vec<&str> = names.iter().copied().filter(|n| re.is_match(n)).collect();
            if matches.is_empty() {
                return Err(ProjectError::NoMatch {
                    kind: kind.to_string(),
                    pattern: element.to_string(),
                    available: available(),
                });
            }
            selected.extend(matches);
        } else if names.contains(element) {
            selected.insert(element);
        } else {
            return Err(ProjectError::UnknownName {
                kind: kind.to_string(),
                name: element.to_string(),
                available: available(),
            });
        }
    }

    Ok(selected.into_iter().map(str::to_string).collect())
}

fn wildcard_regex(element: &str) -> Result<Regex> {
    let body = element
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{}$", body))
        .map_err(|e| ProjectError::Invalid(format!("bad target pattern '{}': {}", element, e)))
}
