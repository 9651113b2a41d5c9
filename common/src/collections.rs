// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Set arithmetic over host lists and host-keyed maps.

use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

/// Elements of `a` that are not in `b`, preserving the order of `a`.
pub fn slice_diff<T>(a: &[T], b: &[T]) -> Vec<T>
where
    T: Eq + Hash + Clone,
{
    let exclude: HashSet<&T> = b.iter().collect();
    a.iter().filter(|item| !exclude.contains(item)).cloned().collect()
}

/// Restrict a host-keyed map to the given keys.
pub fn filter_map_by_key<V: Clone>(
    map: &BTreeMap<String, V>,
    keys: &[String],
) -> BTreeMap<String, V> {
    keys.iter()
        .filter_map(|key| map.get(key).map(|value| (key.clone(), value.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_diff_preserves_order() {
        let a = vec!["h3".to_string(), "h1".to_string(), "h2".to_string()];
        let b = vec!["h1".to_string()];
        assert_eq!(slice_diff(&a, &b), vec!["h3".to_string(), "h2".to_string()]);
    }

    #[test]
    fn slice_diff_of_disjoint_sets_is_identity() {
        let a = vec![1, 2, 3];
        assert_eq!(slice_diff(&a, &[9]), a);
    }

    #[test]
    fn filter_map_keeps_only_named_keys() {
        let mut map = BTreeMap::new();
        map.insert("h1".to_string(), 1);
        map.insert("h2".to_string(), 2);
        let filtered = filter_map_by_key(&map, &["h2".to_string(), "h9".to_string()]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered["h2"], 2);
    }
}
