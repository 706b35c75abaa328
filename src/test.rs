use std::collections::BTreeSet;

use itertools::Itertools;
use proptest::prelude::*;

use crate::{
    config::SolverSettings,
    decomposition::TreeDecomposition,
    error::SolveError,
    generate::{random_instance, GeneratorParams},
    graph::NodeId,
    parse::{parse_instance, save_instance},
    problem::{EdgeDescription, Instance, InstanceDescription},
    solver::{solve, Solution},
};

fn instance(c_fix: f64, edges: &[(NodeId, NodeId, u32, u32, f64)]) -> Instance {
    let edges = edges.iter().zip(1..).map(|(&(left, right, f_min, f_max, cost), id)| {
        EdgeDescription { id, left, right, length: 1.0, f_min, f_max, cost }
    }).collect();
    Instance::new(InstanceDescription { c_fix, edges }).unwrap()
}

fn path_td(bags: &[&[NodeId]]) -> TreeDecomposition {
    TreeDecomposition::from_path_decomposition(bags.iter().map(|b| b.iter().copied().collect())).unwrap()
}

fn min_degree_td(instance: &Instance) -> TreeDecomposition {
    let order = TreeDecomposition::min_degree_order(&instance.graph);
    TreeDecomposition::from_elimination_order(&instance.graph, &order).unwrap()
}

/// Checks that the reconstructed line concept is feasible and costs what the solver claims
fn assert_consistent(instance: &Instance, solution: &Solution) {
    assert!(solution.line_concept.is_feasible(instance), "Ensure the reconstructed line concept is feasible");
    let total = solution.line_concept.costs(instance).total;
    assert!((total - solution.cost).abs() < 1e-9, "Ensure the reconstruction costs {} as claimed, not {total}", solution.cost);
}

/// Path 1-2-3-4 whose middle edge admits only one line
fn worked_example() -> Instance {
    instance(1.0, &[(1, 2, 3, 5, 0.0), (2, 3, 1, 1, 0.0), (3, 4, 2, 5, 0.0)])
}

/// Solves the worked example on a path decomposition
#[test]
fn test_worked_example() {
    let instance = worked_example();
    let td = path_td(&[&[1, 2], &[2, 3], &[3, 4]]);
    let solution = solve(&instance, &td, &SolverSettings::default()).unwrap();
    assert_eq!(solution.cost, 4.0, "Ensure the line through the bottleneck is shared by both ends");
    assert_eq!(solution.width, 1);
    assert!(solution.operators > td.bags().len(), "Ensure every bag contributes at least one cost vector");
    assert_consistent(&instance, &solution);
    assert_eq!(solution.line_concept.lines.iter().map(|l| l.frequency).sum::<u32>(), 4);
}

#[test]
fn test_single_edge() {
    let instance = instance(1.0, &[(1, 2, 1, 1, 0.0)]);
    let solution = solve(&instance, &path_td(&[&[1, 2]]), &SolverSettings::default()).unwrap();
    assert_eq!(solution.cost, 1.0);
    assert_eq!(solution.line_concept.lines.len(), 1);
    assert_eq!(solution.line_concept.lines[0].edges, vec![1]);
}

/// A line whose hidden part passes through a stop forgotten after both of its neighbours
#[test]
fn test_line_through_late_forgotten_stop() {
    let instance = instance(1.0, &[(1, 2, 1, 1, 0.0), (2, 3, 1, 1, 0.0), (3, 4, 1, 1, 0.0)]);
    let td = TreeDecomposition::from_tree(
        vec![BTreeSet::from([2, 4]), BTreeSet::from([1, 2]), BTreeSet::from([2, 3, 4])],
        &[(0, 1), (0, 2)],
        0,
    ).unwrap();
    let solution = solve(&instance, &td, &SolverSettings::default()).unwrap();
    assert_eq!(solution.cost, 1.0, "Ensure a single line covers the whole path");
    assert_consistent(&instance, &solution);
}

#[test]
fn test_disjoint_components() {
    let instance = instance(1.0, &[(1, 2, 2, 3, 1.0), (3, 4, 2, 3, 1.0)]);
    let td = TreeDecomposition::from_tree(
        vec![BTreeSet::from([1, 2]), BTreeSet::from([3, 4])],
        &[(0, 1)],
        0,
    ).unwrap();
    let solution = solve(&instance, &td, &SolverSettings::default()).unwrap();
    assert_eq!(solution.cost, 8.0);
    assert_consistent(&instance, &solution);
}

/// A line cannot close a cycle, so a triangle needs two lines
#[test]
fn test_triangle() {
    let instance = instance(2.0, &[(1, 2, 1, 1, 1.0), (2, 3, 1, 1, 1.0), (1, 3, 1, 1, 1.0)]);
    let solution = solve(&instance, &path_td(&[&[1, 2, 3]]), &SolverSettings::default()).unwrap();
    // a single line can cover two of the edges, the third needs its own
    assert_eq!(solution.cost, 2.0 + 2.0 + 2.0 + 1.0);
    assert_consistent(&instance, &solution);
}

#[test]
fn test_infeasible_and_rejected_inputs() {
    let broken = instance(1.0, &[(1, 2, 2, 1, 0.0)]);
    let result = solve(&broken, &path_td(&[&[1, 2]]), &SolverSettings::default());
    assert!(matches!(result, Err(SolveError::Infeasible)), "Ensure impossible bounds are reported");

    let instance = worked_example();
    let uncovered = path_td(&[&[1, 2], &[3, 4]]);
    assert!(matches!(
        solve(&instance, &uncovered, &SolverSettings::default()),
        Err(SolveError::InvalidDecomposition(_)),
    ));

    let settings = SolverSettings { max_bag_size: 1, ..SolverSettings::default() };
    assert!(matches!(
        solve(&instance, &path_td(&[&[1, 2], &[2, 3], &[3, 4]]), &settings),
        Err(SolveError::BagTooLarge { size: 2, limit: 1 }),
    ));
}

fn assert_same_optimum(instance: &Instance, decompositions: &[TreeDecomposition], expected: f64) {
    for td in decompositions {
        let solution = solve(instance, td, &SolverSettings::default()).unwrap();
        assert_eq!(solution.cost, expected, "Ensure every decomposition gives the same optimum");
        assert_consistent(instance, &solution);
    }
}

/// The optimum must not depend on which decomposition is used
#[test]
fn test_decomposition_independence() {
    let instance = worked_example();
    let decompositions = [
        path_td(&[&[1, 2], &[2, 3], &[3, 4]]),
        path_td(&[&[3, 4], &[2, 3], &[1, 2]]),
        min_degree_td(&instance),
    ];
    assert_same_optimum(&instance, &decompositions, 4.0);

    // wide bags only stay tractable with small frequencies
    let mut clamped = worked_example();
    clamped.clamp_fmax(2);
    let decompositions = [
        path_td(&[&[1, 2], &[2, 3], &[3, 4]]),
        path_td(&[&[1, 2, 3], &[3, 4]]),
        path_td(&[&[1, 2, 3, 4]]),
    ];
    assert_same_optimum(&clamped, &decompositions, 3.0);
}

/// A star around stop 1, whose minimum degree decomposition joins one bag per leaf
#[test]
fn test_decomposition_independence_with_joins() {
    let instance = instance(1.0, &[(1, 2, 2, 2, 0.0), (1, 3, 1, 1, 0.0), (1, 4, 1, 1, 0.0)]);
    let joined = min_degree_td(&instance);
    assert!(!joined.is_path(), "Ensure the decomposition has a real join");
    let decompositions = [joined, path_td(&[&[1, 2], &[1, 3], &[1, 4]])];
    // lines 2-1-3 and 2-1-4
    assert_same_optimum(&instance, &decompositions, 2.0);
    assert_eq!(brute_force(&instance), Some(2.0));
}

#[test]
fn test_deterministic() {
    let mut rng = fastrand::Rng::with_seed(11);
    let params = GeneratorParams { max_frequency: 2, ..GeneratorParams::new(5) };
    let (instance, td) = random_instance(&params, &mut rng).unwrap();
    let first = solve(&instance, &td, &SolverSettings::default());
    let second = solve(&instance, &td, &SolverSettings::default());
    match (first, second) {
        (Ok(a), Ok(b)) => {
            assert_eq!(a.cost, b.cost);
            assert_eq!(a.line_concept, b.line_concept, "Ensure repeated runs give the same line concept");
            assert_eq!(a.memo_entries, b.memo_entries);
        }
        (a, b) => assert_eq!(a.is_err(), b.is_err()),
    }
}

/// Tests saving and loading capabilities, ensuring that the solver sees the same instance
#[test]
fn test_instance_serde() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("instance.toml");
    let instance = worked_example();
    save_instance(&path, &instance).unwrap();
    let reread = parse_instance(&path).unwrap();
    assert_eq!(reread.describe(), instance.describe(), "Ensure instance data (de)serialises consistently");
    let solution = solve(&reread, &min_degree_td(&reread), &SolverSettings::default()).unwrap();
    assert_eq!(solution.cost, 4.0);
}

#[test]
fn test_fmax_clamp() {
    let mut instance = instance(1.0, &[(1, 2, 3, 5, 0.0), (2, 3, 0, 5, 0.0)]);
    instance.clamp_fmax(2);
    let edge = instance.graph.edge(1).unwrap();
    assert_eq!((edge.info.f_min, edge.info.f_max), (2, 2));
    let solution = solve(&instance, &path_td(&[&[1, 2], &[2, 3]]), &SolverSettings::default()).unwrap();
    assert_eq!(solution.cost, 2.0);
}

/// The cheapest feasible multiset of simple paths, found by exhaustive search
fn brute_force(instance: &Instance) -> Option<f64> {
    let graph = &instance.graph;
    let mut paths: Vec<Vec<usize>> = vec![];
    fn extend(graph: &crate::graph::Graph, path: &mut Vec<NodeId>, found: &mut Vec<Vec<NodeId>>) {
        if path.len() > 1 && path[0] < path[path.len() - 1] {
            found.push(path.clone());
        }
        let last = path[path.len() - 1];
        for &next in graph.nodes() {
            if !path.contains(&next) && graph.find_edge(last, next).is_some() {
                path.push(next);
                extend(graph, path, found);
                path.pop();
            }
        }
    }
    let mut stop_paths = vec![];
    for &start in graph.nodes() {
        extend(graph, &mut vec![start], &mut stop_paths);
    }
    let edge_position = |u, v| graph.edges().iter().position(|e| graph.find_edge(u, v) == Some(e));
    for path in &stop_paths {
        paths.push(path.iter().tuple_windows().filter_map(|(&u, &v)| edge_position(u, v)).collect());
    }
    let path_costs = paths.iter()
        .map(|p| instance.c_fix + p.iter().map(|&e| graph.edges()[e].info.cost).sum::<f64>())
        .collect_vec();

    fn search(i: usize, paths: &[Vec<usize>], costs: &[f64], loads: &mut [u32], graph: &crate::graph::Graph, spent: f64, best: &mut Option<f64>) {
        if i == paths.len() {
            let feasible = graph.edges().iter().zip(loads.iter()).all(|(e, &l)| e.info.admits(l));
            if feasible && best.map_or(true, |b| spent < b) {
                *best = Some(spent);
            }
            return;
        }
        let room = paths[i].iter().map(|&e| graph.edges()[e].info.f_max - loads[e]).min().unwrap_or(0);
        for frequency in 0..=room {
            paths[i].iter().for_each(|&e| loads[e] += frequency);
            search(i + 1, paths, costs, loads, graph, spent + frequency as f64 * costs[i], best);
            paths[i].iter().for_each(|&e| loads[e] -= frequency);
        }
    }
    let mut best = None;
    search(0, &paths, &path_costs, &mut vec![0; graph.edges().len()][..], graph, 0.0, &mut best);
    best
}

fn small_instance() -> impl Strategy<Value = Instance> {
    (2u32..=5)
        .prop_flat_map(|n| {
            let pairs = (1..=n).tuple_combinations::<(NodeId, NodeId)>().collect_vec();
            let specs = proptest::collection::vec((any::<bool>(), 0u32..=1, 0u32..=1, 0u32..=3), pairs.len());
            (Just(pairs), specs, 1u32..=3)
        })
        .prop_map(|(pairs, specs, c_fix)| {
            let edges = pairs.into_iter().zip(specs).enumerate()
                .filter(|(i, (_, (chosen, ..)))| *i == 0 || *chosen)
                .take(5)
                .map(|(_, ((left, right), (_, f_min, extra, cost)))| (left, right, f_min, f_min + extra, cost as f64))
                .collect_vec();
            instance(c_fix as f64, &edges)
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    /// Cross-checks the solver against exhaustive search on tiny graphs
    #[test]
    fn test_matches_brute_force(instance in small_instance()) {
        let td = min_degree_td(&instance);
        let expected = brute_force(&instance);
        match solve(&instance, &td, &SolverSettings::default()) {
            Ok(solution) => {
                assert_consistent(&instance, &solution);
                prop_assert_eq!(Some(solution.cost), expected);
            }
            Err(SolveError::Infeasible) => {
                prop_assert_eq!(expected, None);
            }
            Err(e) => prop_assert!(false, "unexpected error {e}"),
        }
    }
}
