//! Pure set logic for a device's topic names, independent of storage.

use std::collections::HashSet;

/// Names from `requested` that are not yet in `current`. Keeps the request
/// order and drops repeats within the request itself.
pub fn topics_to_add(current: &[String], requested: &[String]) -> Vec<String> {
    let mut seen: HashSet<&str> = current.iter().map(String::as_str).collect();
    let mut to_add = Vec::new();

    for name in requested {
        if seen.insert(name.as_str()) {
            to_add.push(name.clone());
        }
    }

    to_add
}

/// Subset of `current` whose names appear in `requested`, in `current` order.
pub fn topics_to_remove<'a, T, F>(current: &'a [T], requested: &[String], name_of: F) -> Vec<&'a T>
where
    F: Fn(&T) -> &str,
{
    let requested: HashSet<&str> = requested.iter().map(String::as_str).collect();
    current
        .iter()
        .filter(|item| requested.contains(name_of(item)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn add_diff_skips_existing_names() {
        let current = names(&["temp", "humidity"]);
        let requested = names(&["temp", "pressure"]);
        assert_eq!(topics_to_add(&current, &requested), names(&["pressure"]));
    }

    #[test]
    fn add_diff_preserves_request_order_and_dedups_the_request() {
        let current = names(&[]);
        let requested = names(&["b", "a", "b", "c", "a"]);
        assert_eq!(topics_to_add(&current, &requested), names(&["b", "a", "c"]));
    }

    #[test]
    fn add_diff_is_empty_when_everything_exists() {
        let current = names(&["temp"]);
        assert_eq!(topics_to_add(&current, &names(&["temp"])), names(&[]));
        assert_eq!(topics_to_add(&current, &names(&[])), names(&[]));
    }

    #[test]
    fn remove_intersects_by_name_in_current_order() {
        let current = names(&["temp", "humidity", "pressure"]);
        let requested = names(&["pressure", "temp", "unknown"]);
        let selected = topics_to_remove(&current, &requested, |n| n.as_str());
        assert_eq!(selected, vec![&current[0], &current[2]]);
    }

    #[test]
    fn remove_is_empty_for_unknown_names() {
        let current = names(&["temp"]);
        let selected = topics_to_remove(&current, &names(&["ghost"]), |n| n.as_str());
        assert!(selected.is_empty());
    }
}
