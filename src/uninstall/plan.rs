use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use log::{debug, warn};

use super::DependencyGraph;
use crate::error::PackageError;
use crate::package::{PackageIdentity, VersionRange};

/// Compute the ordered removal list for `targets`.
///
/// With `remove_dependencies`, the dependencies of every removed package
/// become candidates too, but a candidate is only removed when all of its
/// transitive dependents are removed with it. A target that something staying
/// installed requires fails with [`PackageError::DependentsExist`] unless
/// `force_remove_targets` is set, in which case it is removed anyway.
///
/// Dependents always come before their dependencies in the returned list.
pub fn plan_uninstall(
    graph: &DependencyGraph,
    targets: &[PackageIdentity],
    remove_dependencies: bool,
    force_remove_targets: bool,
) -> Result<Vec<PackageIdentity>, PackageError> {
    for target in targets {
        if !graph.contains(target) {
            return Err(PackageError::NotFound {
                id: target.id.to_string(),
                range: Some(VersionRange::exact(target.version.clone())),
            });
        }
    }

    let candidates = discover(graph, targets, remove_dependencies);
    let candidate_set: HashSet<&PackageIdentity> = candidates.iter().collect();
    let target_set: HashSet<&PackageIdentity> = targets.iter().collect();

    if !force_remove_targets {
        for target in targets {
            let closure = graph.transitive_dependents(target);
            if closure.iter().all(|p| candidate_set.contains(p)) {
                continue;
            }
            let mut blocking: Vec<PackageIdentity> = graph
                .dependents(target)
                .into_iter()
                .filter(|p| !candidate_set.contains(p))
                .collect();
            if blocking.is_empty() {
                blocking = closure
                    .into_iter()
                    .filter(|p| !candidate_set.contains(p))
                    .collect();
            }
            return Err(PackageError::DependentsExist {
                package: target.clone(),
                dependents: blocking,
            });
        }
    }

    let removal = keep_active_dependencies(graph, &candidates, &target_set);
    let ordered = removal_order(graph, &candidates, &removal);
    debug!(
        "Planned removal of {} package(s): {}",
        ordered.len(),
        ordered
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(ordered)
}

/// Targets plus, when requested, everything they transitively depend on, in
/// discovery order.
fn discover(
    graph: &DependencyGraph,
    targets: &[PackageIdentity],
    remove_dependencies: bool,
) -> Vec<PackageIdentity> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();
    let mut queue: VecDeque<&PackageIdentity> = targets.iter().collect();
    while let Some(current) = queue.pop_front() {
        if !seen.insert(current) {
            continue;
        }
        found.push(current.clone());
        if remove_dependencies {
            queue.extend(graph.dependencies(current));
        }
    }
    found
}

/// Drop every non-target candidate that something outside the removal set
/// still requires. Dropping one candidate can strand another, so this runs
/// to a fixed point.
fn keep_active_dependencies(
    graph: &DependencyGraph,
    candidates: &[PackageIdentity],
    targets: &HashSet<&PackageIdentity>,
) -> BTreeSet<PackageIdentity> {
    let mut removal: BTreeSet<PackageIdentity> = candidates.iter().cloned().collect();
    loop {
        let still_needed: Vec<PackageIdentity> = removal
            .iter()
            .filter(|p| !targets.contains(p))
            .filter(|p| {
                graph
                    .transitive_dependents(p)
                    .iter()
                    .any(|d| !removal.contains(d))
            })
            .cloned()
            .collect();
        if still_needed.is_empty() {
            return removal;
        }
        for package in still_needed {
            debug!("Keeping {}: still required by installed packages", package);
            removal.remove(&package);
        }
    }
}

/// Kahn's algorithm over the removal subgraph, dependents first. Ready
/// packages are taken in discovery order.
fn removal_order(
    graph: &DependencyGraph,
    candidates: &[PackageIdentity],
    removal: &BTreeSet<PackageIdentity>,
) -> Vec<PackageIdentity> {
    let nodes: Vec<&PackageIdentity> = candidates.iter().filter(|p| removal.contains(p)).collect();
    let rank: HashMap<&PackageIdentity, usize> =
        nodes.iter().enumerate().map(|(i, p)| (*p, i)).collect();

    // Number of not-yet-removed dependents inside the removal set
    let mut pending: HashMap<&PackageIdentity, usize> = nodes
        .iter()
        .map(|p| {
            let count = graph
                .dependents(p)
                .iter()
                .filter(|d| removal.contains(*d))
                .count();
            (*p, count)
        })
        .collect();

    let mut ready: BTreeSet<usize> = nodes
        .iter()
        .enumerate()
        .filter(|(_, p)| pending[*p] == 0)
        .map(|(i, _)| i)
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(index) = ready.pop_first() {
        let package = nodes[index];
        order.push(package.clone());
        for dependency in graph.dependencies(package) {
            if let Some(count) = pending.get_mut(dependency) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(rank[dependency]);
                }
            }
        }
    }

    if order.len() < nodes.len() {
        warn!("Installed packages form a dependency cycle; removing the rest in discovery order");
        for package in nodes {
            if !order.contains(package) {
                order.push(package.clone());
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(s: &str) -> PackageIdentity {
        s.parse().unwrap()
    }

    /// Graph from `(dependent, dependency)` pairs plus isolated packages.
    fn graph(edges: &[(&str, &str)], isolated: &[&str]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (from, to) in edges {
            graph.add_edge(&identity(from), &identity(to));
        }
        for package in isolated {
            graph.add_package(identity(package));
        }
        graph
    }

    fn names(order: &[PackageIdentity]) -> Vec<String> {
        order.iter().map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_sole_dependent_removes_dependency() {
        let graph = graph(&[("Q@1.0.0", "P@1.0.0")], &[]);
        let order = plan_uninstall(&graph, &[identity("Q@1.0.0")], true, false).unwrap();
        assert_eq!(names(&order), vec!["Q@1.0.0", "P@1.0.0"]);
    }

    #[test]
    fn test_shared_dependency_is_kept() {
        let graph = graph(&[("Q@1.0.0", "P@1.0.0"), ("R@1.0.0", "P@1.0.0")], &[]);
        let order = plan_uninstall(&graph, &[identity("Q@1.0.0")], true, false).unwrap();
        assert_eq!(names(&order), vec!["Q@1.0.0"]);
    }

    #[test]
    fn test_without_remove_dependencies_only_targets() {
        let graph = graph(&[("Q@1.0.0", "P@1.0.0")], &[]);
        let order = plan_uninstall(&graph, &[identity("Q@1.0.0")], false, false).unwrap();
        assert_eq!(names(&order), vec!["Q@1.0.0"]);
    }

    #[test]
    fn test_dependents_exist_names_dependents() {
        let graph = graph(&[("Q@1.0.0", "P@1.0.0"), ("R@1.0.0", "P@1.0.0")], &[]);
        let err = plan_uninstall(&graph, &[identity("P@1.0.0")], false, false).unwrap_err();
        assert_eq!(
            err,
            PackageError::DependentsExist {
                package: identity("P@1.0.0"),
                dependents: vec![identity("Q@1.0.0"), identity("R@1.0.0")],
            }
        );
    }

    #[test]
    fn test_force_removes_target_with_dependents() {
        let graph = graph(&[("Q@1.0.0", "P@1.0.0")], &[]);
        let order = plan_uninstall(&graph, &[identity("P@1.0.0")], false, true).unwrap();
        assert_eq!(names(&order), vec!["P@1.0.0"]);
    }

    #[test]
    fn test_targeting_dependent_too_is_allowed() {
        let graph = graph(&[("Q@1.0.0", "P@1.0.0")], &[]);
        let order = plan_uninstall(
            &graph,
            &[identity("P@1.0.0"), identity("Q@1.0.0")],
            false,
            false,
        )
        .unwrap();
        assert_eq!(names(&order), vec!["Q@1.0.0", "P@1.0.0"]);
    }

    #[test]
    fn test_diamond_order_is_topological() {
        // App -> Left -> Base, App -> Right -> Base, Right -> Left
        let graph = graph(
            &[
                ("App@1.0.0", "Left@1.0.0"),
                ("App@1.0.0", "Right@1.0.0"),
                ("Left@1.0.0", "Base@1.0.0"),
                ("Right@1.0.0", "Base@1.0.0"),
                ("Right@1.0.0", "Left@1.0.0"),
            ],
            &[],
        );
        let order = plan_uninstall(&graph, &[identity("App@1.0.0")], true, false).unwrap();
        assert_eq!(
            names(&order),
            vec!["App@1.0.0", "Right@1.0.0", "Left@1.0.0", "Base@1.0.0"]
        );
    }

    #[test]
    fn test_stranded_dependency_is_kept() {
        // Mid is kept for Other, so Leaf under Mid must stay as well.
        let graph = graph(
            &[
                ("App@1.0.0", "Mid@1.0.0"),
                ("Other@1.0.0", "Mid@1.0.0"),
                ("Mid@1.0.0", "Leaf@1.0.0"),
                ("App@1.0.0", "Leaf@1.0.0"),
            ],
            &[],
        );
        let order = plan_uninstall(&graph, &[identity("App@1.0.0")], true, false).unwrap();
        assert_eq!(names(&order), vec!["App@1.0.0"]);
    }

    #[test]
    fn test_unknown_target_is_not_found() {
        let graph = graph(&[], &["P@1.0.0"]);
        let err = plan_uninstall(&graph, &[identity("P@2.0.0")], false, false).unwrap_err();
        assert!(matches!(err, PackageError::NotFound { ref id, .. } if id == "P"));
    }
}
