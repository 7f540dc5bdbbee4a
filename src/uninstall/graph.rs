//! Dependency graph of the installed packages.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use log::warn;

use crate::package::{PackageIdentity, PackageMetadata};

/// Installed packages with forward and reverse dependency edges.
///
/// Built fresh from a store snapshot whenever a removal is planned; never
/// persisted.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    packages: BTreeSet<PackageIdentity>,
    /// Package -> packages it depends on, in declaration order
    dependencies: BTreeMap<PackageIdentity, Vec<PackageIdentity>>,
    /// Package -> packages that depend on it
    dependents: BTreeMap<PackageIdentity, BTreeSet<PackageIdentity>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from installed manifests.
    ///
    /// Each dependency range is bound to the highest installed version of its
    /// id that satisfies it. A range nothing installed satisfies adds no edge.
    pub fn from_manifests(manifests: &[PackageMetadata], framework: Option<&str>) -> Self {
        let mut graph = Self::new();
        for meta in manifests {
            graph.add_package(meta.identity());
        }

        for meta in manifests {
            let from = meta.identity();
            for dependency in meta.dependencies_for(framework) {
                let target = graph
                    .packages
                    .iter()
                    .filter(|p| p.id == dependency.id && dependency.range.satisfies(&p.version))
                    .max()
                    .cloned();
                match target {
                    Some(to) => graph.add_edge(&from, &to),
                    None => warn!(
                        "{} depends on {} which is not installed",
                        from, dependency
                    ),
                }
            }
        }
        graph
    }

    pub fn add_package(&mut self, identity: PackageIdentity) {
        self.packages.insert(identity);
    }

    /// Record that `from` depends on `to`.
    pub fn add_edge(&mut self, from: &PackageIdentity, to: &PackageIdentity) {
        self.packages.insert(from.clone());
        self.packages.insert(to.clone());

        let forward = self.dependencies.entry(from.clone()).or_default();
        if !forward.contains(to) {
            forward.push(to.clone());
        }
        self.dependents
            .entry(to.clone())
            .or_default()
            .insert(from.clone());
    }

    pub fn contains(&self, identity: &PackageIdentity) -> bool {
        self.packages.contains(identity)
    }

    pub fn packages(&self) -> impl Iterator<Item = &PackageIdentity> {
        self.packages.iter()
    }

    pub fn dependencies(&self, identity: &PackageIdentity) -> &[PackageIdentity] {
        self.dependencies
            .get(identity)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn dependents(&self, identity: &PackageIdentity) -> BTreeSet<PackageIdentity> {
        self.dependents.get(identity).cloned().unwrap_or_default()
    }

    /// Every package that requires `identity`, directly or indirectly.
    pub fn transitive_dependents(&self, identity: &PackageIdentity) -> BTreeSet<PackageIdentity> {
        let mut closure = BTreeSet::new();
        let mut queue: VecDeque<&PackageIdentity> = VecDeque::from([identity]);
        while let Some(current) = queue.pop_front() {
            if let Some(dependents) = self.dependents.get(current) {
                for dependent in dependents {
                    if dependent != identity && closure.insert(dependent.clone()) {
                        queue.push_back(dependent);
                    }
                }
            }
        }
        closure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{DependencyGroup, DependencyRange, parse_version};

    fn identity(s: &str) -> PackageIdentity {
        s.parse().unwrap()
    }

    fn manifest(id: &str, version: &str, deps: &[(&str, &str)]) -> PackageMetadata {
        let mut meta = PackageMetadata::new(id, parse_version(version).unwrap());
        meta.dependency_groups = vec![DependencyGroup {
            framework: None,
            dependencies: deps
                .iter()
                .map(|(dep, range)| DependencyRange::new(*dep, range.parse().unwrap()))
                .collect(),
        }];
        meta
    }

    #[test]
    fn test_edges_bind_to_highest_satisfying_version() {
        let graph = DependencyGraph::from_manifests(
            &[
                manifest("App", "1.0", &[("Core", "[1.0,2.0)")]),
                manifest("Core", "1.0", &[]),
                manifest("Core", "1.5", &[]),
                manifest("Core", "2.0", &[]),
            ],
            None,
        );
        assert_eq!(
            graph.dependencies(&identity("App@1.0.0")),
            &[identity("Core@1.5.0")]
        );
        assert!(graph.dependents(&identity("Core@2.0.0")).is_empty());
        assert_eq!(
            graph.dependents(&identity("Core@1.5.0")),
            BTreeSet::from([identity("App@1.0.0")])
        );
    }

    #[test]
    fn test_missing_dependency_adds_no_edge() {
        let graph =
            DependencyGraph::from_manifests(&[manifest("App", "1.0", &[("Ghost", "1.0")])], None);
        assert!(graph.contains(&identity("App@1.0.0")));
        assert!(graph.dependencies(&identity("App@1.0.0")).is_empty());
        assert_eq!(graph.packages().count(), 1);
    }

    #[test]
    fn test_transitive_dependents() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(&identity("B@1.0.0"), &identity("A@1.0.0"));
        graph.add_edge(&identity("C@1.0.0"), &identity("B@1.0.0"));
        graph.add_edge(&identity("D@1.0.0"), &identity("C@1.0.0"));
        graph.add_edge(&identity("A@1.0.0"), &identity("D@1.0.0"));

        let closure = graph.transitive_dependents(&identity("A@1.0.0"));
        assert_eq!(
            closure,
            BTreeSet::from([identity("B@1.0.0"), identity("C@1.0.0"), identity("D@1.0.0")])
        );
    }
}
