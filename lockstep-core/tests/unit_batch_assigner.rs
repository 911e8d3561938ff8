//! Unit tests for splitting flat task lists across workers

use lockstep_core::coordinator::BatchAssigner;
use lockstep_core::task::{JobPlan, Phase, Task};

#[test]
fn test_even_split() {
    let batches = BatchAssigner::new(3).split((0..9).collect::<Vec<u32>>());
    assert_eq!(batches, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6, 7, 8]]);
}

#[test]
fn test_order_preserved_and_nothing_lost() {
    for workers in 1..8u32 {
        for len in 0..30u32 {
            let batches = BatchAssigner::new(workers).split((0..len).collect::<Vec<_>>());
            assert_eq!(batches.len(), workers as usize);

            let flat: Vec<u32> = batches.iter().flatten().copied().collect();
            assert_eq!(flat, (0..len).collect::<Vec<_>>());

            let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
            let max = *sizes.iter().max().unwrap();
            let min = *sizes.iter().min().unwrap();
            assert!(max - min <= 1, "uneven split {:?}", sizes);
            assert!(sizes.windows(2).all(|w| w[0] <= w[1]), "larger slices come last: {:?}", sizes);
        }
    }
}

#[test]
fn test_more_workers_than_items() {
    let batches = BatchAssigner::new(5).split(vec!["a", "b"]);
    assert_eq!(batches, vec![vec![], vec![], vec![], vec!["a"], vec!["b"]]);
}

#[test]
fn test_zero_workers() {
    let assigner = BatchAssigner::new(0);
    assert!(assigner.split(vec![1, 2, 3]).is_empty());
    assert_eq!(assigner.worker_for(0, 3), None);
}

#[test]
fn test_split_phase_in_plan() {
    let plan = JobPlan::from_json(r#"{"phases": [{"tasks": ["a", "b", "c", "d", "e"]}]}"#).unwrap();
    let resolved = plan.resolve(2).unwrap();

    assert_eq!(resolved.len(), 1);
    assert_eq!(
        resolved[0],
        vec![
            vec![Task::shell("a"), Task::shell("b")],
            vec![Task::shell("c"), Task::shell("d"), Task::shell("e")],
        ]
    );
    assert!(matches!(plan.phases[0], Phase::Split { .. }));
}
