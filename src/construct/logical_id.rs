//! Logical id allocation.
//!
//! A resource's logical id is derived from its construct path below the stack so
//! that it stays stable across synthesis runs. Single-component paths are used as-is;
//! longer paths get a readable prefix plus a hash of the full path.

use crate::error::{Error, Result};

/// Path components with this id are dropped before allocation.
const HIDDEN_ID: &str = "Default";

/// Path components with this id are dropped from the readable part only.
const HIDDEN_FROM_HUMAN_ID: &str = "Resource";

const PATH_SEP: &str = "/";
const HASH_LEN: usize = 8;
const MAX_HUMAN_LEN: usize = 240;
const MAX_ID_LEN: usize = 255;

/// Allocate a logical id for the given path components (stack excluded).
pub fn make_unique_id(components: &[&str]) -> Result<String> {
    let components: Vec<&str> = components
        .iter()
        .copied()
        .filter(|c| *c != HIDDEN_ID)
        .collect();

    if components.is_empty() {
        return Err(Error::InvalidConstructId(
            "unable to calculate a unique id for an empty set of components".to_string(),
        ));
    }

    if components.len() == 1 {
        let candidate = remove_non_alphanumeric(components[0]);
        if candidate.len() <= MAX_ID_LEN {
            return Ok(candidate);
        }
    }

    let hash = path_hash(&components);
    let mut human: String = remove_dupes(&components)
        .into_iter()
        .filter(|c| *c != HIDDEN_FROM_HUMAN_ID)
        .map(remove_non_alphanumeric)
        .collect();
    human.truncate(MAX_HUMAN_LEN);

    Ok(format!("{human}{hash}"))
}

fn path_hash(components: &[&str]) -> String {
    let digest = md5::compute(components.join(PATH_SEP));
    let hex = format!("{digest:x}");
    hex[..HASH_LEN].to_uppercase()
}

fn remove_non_alphanumeric(s: &str) -> String {
    s.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Drop a component when the previous kept one already ends with it
/// (`["Bucket", "Bucket"]` reads as `Bucket`).
fn remove_dupes<'a>(components: &[&'a str]) -> Vec<&'a str> {
    let mut kept: Vec<&str> = Vec::with_capacity(components.len());
    for &component in components {
        match kept.last() {
            Some(last) if last.ends_with(component) => {}
            _ => kept.push(component),
        }
    }
    kept
}
