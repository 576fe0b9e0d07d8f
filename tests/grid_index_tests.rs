use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;

use tsgrid::generator::{diagonal, full_permutation, full_permutation_queries};
use tsgrid::{Grid, GridIndex, MultiplierOptimizer, Optimizer, TagValues, Tags};

fn grid_index(basic_num: u64, multiplier: u64) -> GridIndex {
    GridIndex::new(MultiplierOptimizer::new(basic_num, multiplier).unwrap())
}

fn example(suffix: &str) -> Tags {
    Tags::from_pairs(&[
        ("a", &format!("0{}", suffix)),
        ("b", &format!("1{}", suffix)),
        ("c", &format!("2{}", suffix)),
        ("d", &format!("3{}", suffix)),
    ])
}

#[test]
fn test_init_and_get_series_id() {
    let gi = grid_index(10, 1);

    assert_eq!(gi.set_tags(&example("0")), Some((1, true)));
    assert_eq!(gi.set_tags(&example("0")), Some((1, false)));
    assert_eq!(gi.set_tags(&example("1")), Some((1112, true)));
    assert_eq!(gi.set_tags(&example("1")), Some((1112, false)));

    assert!(gi.matching_ids_for(&example("0")).contains(1));
    assert!(gi.matching_ids_for(&example("1")).contains(1112));
    assert!(!gi.matching_ids_for(&example("2")).contains(1112));

    // shares c=21 with the second series
    let mut third = example("2");
    third.set("c", "21");
    assert_eq!(gi.set_tags(&third), Some((2213, true)));

    let ids = gi.matching_ids_for(&Tags::from_pairs(&[("c", "21")]));
    assert_eq!(ids.cardinality(), 2);
    assert!(ids.contains(1112));
    assert!(ids.contains(2213));
}

fn diagonal_scenario() -> Vec<Tags> {
    let mut sets = diagonal(2, 5);
    sets.extend(diagonal(3, 2));
    sets
}

#[test]
fn test_multi_grid_fixed_capacity() {
    let gi = grid_index(2, 1);
    let sets = diagonal_scenario();
    let wanted = [1u64, 4, 5, 8, 9, 13, 20];
    for (tags, want) in sets.iter().zip(wanted) {
        assert_eq!(gi.set_tags(tags), Some((want, true)), "inserting {}", tags);
    }
    for (tags, want) in sets.iter().zip(wanted) {
        assert!(gi.matching_ids_for(tags).contains(want));
    }
    assert_eq!(gi.grid_count(), 4);
}

#[test]
fn test_multi_grid_with_multiplier() {
    let gi = grid_index(2, 2);
    let sets = diagonal_scenario();
    // 2x2 grid, then 4x4 after a and b saturate, then 4x4x2 for the three-key sets
    let wanted = [1u64, 4, 5, 10, 15, 21, 32];
    for (tags, want) in sets.iter().zip(wanted) {
        assert_eq!(gi.set_tags(tags), Some((want, true)), "inserting {}", tags);
    }
    for (tags, want) in sets.iter().zip(wanted) {
        assert!(gi.matching_ids_for(tags).contains(want));
    }
}

#[test]
fn test_many_keys_each_query_matches_one_id() {
    let gi = grid_index(2, 2);
    let sets = diagonal(10, 14);
    let ids: Vec<u64> = sets
        .iter()
        .map(|t| {
            let (id, created) = gi.set_tags(t).unwrap();
            assert!(created);
            id
        })
        .collect();
    for (tags, id) in sets.iter().zip(&ids) {
        let found = gi.matching_ids_for(tags);
        assert_eq!(found.cardinality(), 1);
        assert!(found.contains(*id));
    }
}

#[test]
fn test_many_keys_stop_at_the_local_id_limit() {
    let gi = grid_index(2, 2);
    // grids of 2^10, 4^10 and 8^10 ids hold 2 + 4 + 8 sets; 16^10 ids would not fit
    let sets = diagonal(10, 16);
    for t in &sets[..14] {
        assert!(gi.set_tags(t).is_some());
    }
    let before = gi.next_offset();
    assert_eq!(before, 1 + (1 << 10) + (1 << 20) + (1 << 30));

    for t in &sets[14..] {
        assert_eq!(gi.set_tags(t), None);
        assert_eq!(gi.strictly_matching_id(t), None);
        assert!(gi.matching_ids_for(t).is_empty());
    }
    assert_eq!(gi.grid_count(), 3);
    assert_eq!(gi.series_count(), 14);
    assert_eq!(gi.next_offset(), before);
    assert!(!gi.has_tag_value("a", "14"));
    // earlier series keep their ids
    assert_eq!(gi.set_tags(&sets[0]), Some((1, false)));
}

#[test]
fn test_full_permutation_fills_one_grid() {
    let gi = grid_index(3, 2);
    let sets = full_permutation(3, 3);
    for t in &sets {
        gi.set_tags(t);
    }
    assert_eq!(gi.grid_count(), 1);
    assert_eq!(gi.series_count(), 27);
    // coordinates are dense: 1..=27
    assert_eq!(
        gi.series_id_set().iter().collect::<Vec<_>>(),
        (1..=27).collect::<Vec<u64>>()
    );

    for q in full_permutation_queries(3, 3) {
        let expected = 3u64.pow(3 - q.len() as u32);
        assert_eq!(gi.matching_ids_for(&q).cardinality(), expected, "query {}", q);
    }
}

#[test]
fn test_partial_query_on_sparse_grid() {
    let gi = grid_index(10, 1);
    gi.set_tags(&Tags::from_pairs(&[("host", "a"), ("region", "eu")]));
    gi.set_tags(&Tags::from_pairs(&[("host", "b"), ("region", "us")]));

    // the cross product of host x region would include (a, us), which was never inserted
    let us = gi.matching_ids_for(&Tags::from_pairs(&[("region", "us")]));
    assert_eq!(us.cardinality(), 1);
    assert!(gi
        .matching_ids_for(&Tags::from_pairs(&[("host", "a"), ("region", "us")]))
        .is_empty());
    // more tags than any grid has dimensions
    assert!(gi
        .matching_ids_for(&Tags::from_pairs(&[("host", "a"), ("region", "eu"), ("x", "y")]))
        .is_empty());
}

#[test]
fn test_capacity_boundary_forces_new_grid() {
    let gi = grid_index(3, 1);
    for v in 0..3 {
        gi.set_tags(&Tags::from_pairs(&[("k", &v.to_string())]));
    }
    assert_eq!(gi.grid_count(), 1);
    let (id, created) = gi.set_tags(&Tags::from_pairs(&[("k", "3")])).unwrap();
    assert!(created);
    assert_eq!(gi.grid_count(), 2);
    assert_eq!(id, 1 + 3);
}

/// Places every grid right after the previous one with a fixed capacity of 1 per key.
#[derive(Debug)]
struct UnitOptimizer;

impl Optimizer for UnitOptimizer {
    fn new_optimized_grid(&self, grids: &[Grid], tags: &Tags) -> Grid {
        let offset = tsgrid::optimizer::next_grid_offset(grids);
        let keys = tags.keys().map(str::to_string).collect();
        let values = tags
            .iter()
            .map(|t| {
                let mut tv = TagValues::new(1);
                tv.set_value(&t.value);
                tv
            })
            .collect();
        Grid::new(offset, keys, values)
    }
}

#[test]
fn test_custom_optimizer_seam() {
    let gi = GridIndex::new(UnitOptimizer);
    for (i, t) in diagonal(2, 4).iter().enumerate() {
        assert_eq!(gi.set_tags(t), Some((i as u64 + 1, true)));
    }
    assert_eq!(gi.grid_count(), 4);
    assert_eq!(gi.num_filled_up_grids("a"), 4);
}

#[test]
fn test_if_thread_safe_for_grid_index() {
    let gi = Arc::new(grid_index(2, 2));
    let sets = Arc::new(diagonal(10, 14));
    let queries = Arc::new(full_permutation_queries(2, 4));
    let wanted: Arc<Mutex<HashMap<usize, u64>>> = Arc::new(Mutex::new(HashMap::new()));
    let created_count = Arc::new(Mutex::new(vec![0usize; sets.len()]));

    let mut handles = Vec::new();
    for step in [1usize, 2, 3] {
        let gi = Arc::clone(&gi);
        let sets = Arc::clone(&sets);
        let wanted = Arc::clone(&wanted);
        let created_count = Arc::clone(&created_count);
        handles.push(thread::spawn(move || {
            for (i, t) in sets.iter().enumerate().filter(|(i, _)| i % step == 0) {
                let (id, created) = gi.set_tags(t).unwrap();
                if created {
                    created_count.lock().unwrap()[i] += 1;
                }
                let mut w = wanted.lock().unwrap();
                let prev = *w.entry(i).or_insert(id);
                assert_eq!(prev, id, "series {} got two ids", i);
            }
        }));
    }
    for _ in 0..2 {
        let gi = Arc::clone(&gi);
        let queries = Arc::clone(&queries);
        handles.push(thread::spawn(move || {
            for q in queries.iter() {
                gi.matching_ids_for(q);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert!(created_count.lock().unwrap().iter().all(|n| *n == 1));
    let wanted = wanted.lock().unwrap();
    for (i, t) in sets.iter().enumerate() {
        assert!(gi.matching_ids_for(t).contains(wanted[&i]));
    }
    assert_eq!(gi.series_count(), sets.len() as u64);
}
