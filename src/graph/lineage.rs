//! Lineage keys: slash-joined ancestor unit-id paths.
//!
//! Lineage order is the global scheduling invariant: within one
//! notification batch, ancestors and earlier-declared units always run
//! before later or deeper ones. Comparison is numeric-aware so that
//! `0/10` sorts after `0/2`. Keyed iteration instances extend a segment
//! with `:key`.

use std::cmp::Ordering;

/// Compare two lineage strings segment by segment, numerically where
/// both segments are numeric.
pub fn compare(a: &str, b: &str) -> Ordering {
    let mut left = a.split('/');
    let mut right = b.split('/');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let segment = compare_segment(x, y);
                if segment != Ordering::Equal {
                    return segment;
                }
            }
        }
    }
}

fn compare_segment(a: &str, b: &str) -> Ordering {
    let (a_id, a_key) = split_key(a);
    let (b_id, b_key) = split_key(b);
    let id = compare_part(a_id, b_id);
    if id != Ordering::Equal {
        return id;
    }
    match (a_key, b_key) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => compare_part(x, y),
    }
}

fn split_key(segment: &str) -> (&str, Option<&str>) {
    match segment.split_once(':') {
        Some((id, key)) => (id, Some(key)),
        None => (segment, None),
    }
}

fn compare_part(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// Child lineage of `parent` for unit `id`.
pub fn child(parent: &str, id: u32) -> String {
    if parent.is_empty() {
        id.to_string()
    } else {
        format!("{parent}/{id}")
    }
}

/// Child lineage for a keyed iteration instance.
pub fn keyed_child(parent: &str, id: u32, key: &str) -> String {
    format!("{}:{key}", child(parent, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_segments_compare_numerically() {
        assert_eq!(compare("0/2", "0/10"), Ordering::Less);
        assert_eq!(compare("0/10", "0/2"), Ordering::Greater);
        assert_eq!(compare("0/2/1", "0/2"), Ordering::Greater);
        assert_eq!(compare("0/2", "0/2"), Ordering::Equal);
    }

    #[test]
    fn keyed_instances_sort_after_their_unit_and_by_key() {
        assert_eq!(compare("0/3", "0/3:0"), Ordering::Less);
        assert_eq!(compare("0/3:2", "0/3:10"), Ordering::Less);
        assert_eq!(compare("0/3:1/4", "0/3:2/4"), Ordering::Less);
    }

    #[test]
    fn builders_compose() {
        assert_eq!(child("", 0), "0");
        assert_eq!(child("0", 4), "0/4");
        assert_eq!(keyed_child("0", 4, "k"), "0/4:k");
    }
}
