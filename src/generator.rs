//! Deterministic tag-set generators for tests and benchmarks.
//!
//! Keys are named `a`, `b`, `c`, ... (then `k26`, `k27`, ... past `z`) and values are the
//! decimal strings `0`, `1`, ....

use crate::types::Tags;

/// Name of the `i`-th generated tag key.
pub fn key_name(i: usize) -> String {
    if i < 26 {
        char::from(b'a' + i as u8).to_string()
    } else {
        format!("k{}", i)
    }
}

/// `value_num` tag sets where every key carries the same value:
/// `{a:0,b:0}, {a:1,b:1}, ...`.
pub fn diagonal(key_num: usize, value_num: usize) -> Vec<Tags> {
    (0..value_num)
        .map(|v| {
            let value = v.to_string();
            (0..key_num)
                .map(|k| (key_name(k), value.clone()))
                .collect()
        })
        .collect()
}

/// Every combination of `value_num` values over `key_num` keys, `value_num^key_num` sets,
/// with the first key varying slowest.
pub fn full_permutation(key_num: usize, value_num: usize) -> Vec<Tags> {
    let mut out = Vec::new();
    let mut current = vec![0usize; key_num];
    if key_num == 0 || value_num == 0 {
        return out;
    }
    loop {
        out.push(
            current
                .iter()
                .enumerate()
                .map(|(k, v)| (key_name(k), v.to_string()))
                .collect(),
        );
        // odometer increment, last key fastest
        let mut k = key_num;
        loop {
            if k == 0 {
                return out;
            }
            k -= 1;
            current[k] += 1;
            if current[k] < value_num {
                break;
            }
            current[k] = 0;
        }
    }
}

/// Query tag sets: every key is either absent or set to one of `value_num` values.
/// The all-absent set is left out, so there are `(value_num + 1)^key_num - 1` queries.
pub fn full_permutation_queries(key_num: usize, value_num: usize) -> Vec<Tags> {
    // slot value 0 means "key absent"
    full_permutation(key_num, value_num + 1)
        .into_iter()
        .filter_map(|tags| {
            let q: Tags = tags
                .iter()
                .filter_map(|t| {
                    let slot: usize = t.value.parse().ok()?;
                    (slot > 0).then(|| (t.key.clone(), (slot - 1).to_string()))
                })
                .collect();
            (!q.is_empty()).then_some(q)
        })
        .collect()
}
