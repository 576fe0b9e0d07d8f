use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

use tsgrid::grid_block::{decode_grid, encode_grid};
use tsgrid::{GridIndex, MultiplierOptimizer, Tags};

/// Tag sets over a small key/value alphabet so that values repeat across sets.
fn tag_set() -> impl Strategy<Value = Tags> {
    prop::collection::btree_map(0u8..4, 0u8..6, 1..4).prop_map(|m| {
        let mut tags = Tags::new();
        for (k, v) in m {
            tags.set(format!("k{}", k), format!("v{}", v));
        }
        tags
    })
}

fn optimizer() -> impl Strategy<Value = (u64, u64)> {
    (1u64..5, 1u64..4)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 1000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_ids_are_stable_and_unique(
        (basic_num, multiplier) in optimizer(),
        sets in prop::collection::vec(tag_set(), 1..60)
    ) {
        let gi = GridIndex::new(MultiplierOptimizer::new(basic_num, multiplier).unwrap());
        let mut assigned: HashMap<Tags, u64> = HashMap::new();
        for t in &sets {
            let (id, created) = gi.set_tags(t).unwrap();
            prop_assert!(id >= 1);
            match assigned.get(t) {
                Some(prev) => {
                    prop_assert!(!created);
                    prop_assert_eq!(*prev, id);
                }
                None => {
                    prop_assert!(created);
                    assigned.insert(t.clone(), id);
                }
            }
        }
        let distinct: HashSet<u64> = assigned.values().copied().collect();
        prop_assert_eq!(distinct.len(), assigned.len());
        prop_assert_eq!(gi.series_count(), assigned.len() as u64);
    }

    #[test]
    fn prop_full_query_finds_exactly_its_series(
        (basic_num, multiplier) in optimizer(),
        sets in prop::collection::vec(tag_set(), 1..40)
    ) {
        let gi = GridIndex::new(MultiplierOptimizer::new(basic_num, multiplier).unwrap());
        let ids: Vec<u64> = sets.iter().map(|t| gi.set_tags(t).unwrap().0).collect();
        for (t, id) in sets.iter().zip(ids) {
            prop_assert_eq!(gi.strictly_matching_id(t), Some(id));
            let found = gi.matching_ids_for(t);
            // only series with exactly these keys can match all of them
            for other in found.iter() {
                let owner = sets.iter().find(|s| gi.strictly_matching_id(s) == Some(other));
                prop_assert!(owner.is_some());
                let owner = owner.unwrap();
                prop_assert!(t.iter().all(|tag| owner.get(&tag.key) == Some(tag.value.as_str())));
            }
            prop_assert!(found.contains(id));
        }
    }

    #[test]
    fn prop_partial_query_matches_brute_force(
        sets in prop::collection::vec(tag_set(), 1..40),
        query in prop::collection::btree_map(0u8..4, 0u8..6, 0..3)
    ) {
        let gi = GridIndex::new(MultiplierOptimizer::new(2, 2).unwrap());
        let mut by_tags: HashMap<Tags, u64> = HashMap::new();
        for t in &sets {
            by_tags.insert(t.clone(), gi.set_tags(t).unwrap().0);
        }
        let mut q = Tags::new();
        for (k, v) in query {
            q.set(format!("k{}", k), format!("v{}", v));
        }

        let expected: HashSet<u64> = by_tags
            .iter()
            .filter(|(t, _)| q.iter().all(|tag| t.get(&tag.key) == Some(tag.value.as_str())))
            .map(|(_, id)| *id)
            .collect();
        let got: HashSet<u64> = gi.matching_ids_for(&q).iter().collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_grid_ranges_are_disjoint(
        (basic_num, multiplier) in optimizer(),
        sets in prop::collection::vec(tag_set(), 1..60)
    ) {
        let gi = GridIndex::new(MultiplierOptimizer::new(basic_num, multiplier).unwrap());
        for t in &sets {
            gi.set_tags(t);
        }
        let grids = gi.snapshot();
        prop_assert_eq!(grids[0].offset(), 1);
        for pair in grids.windows(2) {
            prop_assert_eq!(pair[1].offset(), pair[0].offset() + pair[0].id_space_size());
        }
    }

    #[test]
    fn prop_decoded_grid_answers_like_original(
        sets in prop::collection::vec(tag_set(), 1..30)
    ) {
        let gi = GridIndex::new(MultiplierOptimizer::new(3, 2).unwrap());
        for t in &sets {
            gi.set_tags(t);
        }
        for grid in gi.snapshot() {
            let back = decode_grid(&encode_grid(&grid).unwrap()).unwrap();
            prop_assert_eq!(back.offset(), grid.offset());
            prop_assert_eq!(back.tag_keys(), grid.tag_keys());
            prop_assert_eq!(back.id_space_size(), grid.id_space_size());
            prop_assert_eq!(
                back.series_id_set().iter().collect::<Vec<_>>(),
                grid.series_id_set().iter().collect::<Vec<_>>()
            );
            for t in &sets {
                prop_assert_eq!(back.strictly_matching_id(t), grid.strictly_matching_id(t));
            }
        }
    }
}
