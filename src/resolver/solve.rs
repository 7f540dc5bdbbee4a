use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use semver::Version;

use super::{DependencyBehavior, DependencyPool};
use crate::error::PackageError;
use crate::package::{PackageDependencyInfo, PackageId, PackageIdentity, VersionRange};

/// Choose one version per package id and order the install set.
///
/// The target version is fixed. Every other id gets a version satisfying all
/// ranges placed on it by the chosen packages; an installed version wins when
/// it satisfies them, otherwise `behavior` picks the newest or oldest. The
/// returned list contains already-installed packages too and puts every
/// dependency before its dependents, with `target` last.
pub fn resolve(
    target: &PackageIdentity,
    pool: &DependencyPool,
    installed: &BTreeSet<PackageIdentity>,
    behavior: DependencyBehavior,
) -> Result<Vec<PackageIdentity>, PackageError> {
    if !pool.contains_key(target) {
        return Err(PackageError::NotFound {
            id: target.id.to_string(),
            range: Some(VersionRange::exact(target.version.clone())),
        });
    }
    if behavior == DependencyBehavior::Ignore {
        return Ok(vec![target.clone()]);
    }

    let mut candidates: BTreeMap<PackageId, Vec<&Version>> = BTreeMap::new();
    for identity in pool.keys() {
        candidates
            .entry(identity.id.clone())
            .or_default()
            .push(&identity.version);
    }

    let mut solver = Solver {
        target,
        pool,
        installed,
        behavior,
        candidates,
        chosen: HashMap::from([(target.id.clone(), target.version.clone())]),
    };
    solver.solve()?;
    solver.order()
}

/// Ranges placed on one id, with the package that placed each one.
type Constraints = BTreeMap<PackageId, Vec<(VersionRange, PackageIdentity)>>;

struct Solver<'a> {
    target: &'a PackageIdentity,
    pool: &'a DependencyPool,
    installed: &'a BTreeSet<PackageIdentity>,
    behavior: DependencyBehavior,
    candidates: BTreeMap<PackageId, Vec<&'a Version>>,
    chosen: HashMap<PackageId, Version>,
}

impl<'a> Solver<'a> {
    /// Repeat until every reachable choice satisfies its constraints.
    ///
    /// Each round walks the graph from the target, choosing versions for ids
    /// seen for the first time. A choice violated by a range found later in
    /// the walk is replaced and the walk restarts.
    fn solve(&mut self) -> Result<(), PackageError> {
        let limit = self.pool.len() + 1;
        for _ in 0..limit {
            let constraints = self.walk()?;
            match self.first_violation(&constraints) {
                None => return Ok(()),
                Some(id) => {
                    let ranges = &constraints[&id];
                    if id == self.target.id {
                        return Err(conflict(&id, ranges));
                    }
                    let version = self
                        .choose(&id, ranges.iter().map(|(r, _)| r))
                        .ok_or_else(|| conflict(&id, ranges))?;
                    self.chosen.insert(id, version);
                }
            }
        }
        Err(PackageError::ResolutionConflict {
            id: self.target.id.to_string(),
            reason: "version selection did not settle".to_string(),
        })
    }

    fn walk(&mut self) -> Result<Constraints, PackageError> {
        let mut constraints = Constraints::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([self.target.clone()]);

        while let Some(identity) = queue.pop_front() {
            if !visited.insert(identity.clone()) {
                continue;
            }
            let info = lookup(self.pool, &identity)?;
            for dependency in &info.dependencies {
                let placed = constraints.entry(dependency.id.clone()).or_default();
                placed.push((dependency.range.clone(), identity.clone()));

                let version = match self.chosen.get(&dependency.id) {
                    Some(version) => version.clone(),
                    None => {
                        let version = self
                            .choose(&dependency.id, placed.iter().map(|(r, _)| r))
                            .or_else(|| self.choose(&dependency.id, [&dependency.range]))
                            .ok_or_else(|| PackageError::NotFound {
                                id: dependency.id.to_string(),
                                range: Some(dependency.range.clone()),
                            })?;
                        self.chosen.insert(dependency.id.clone(), version.clone());
                        version
                    }
                };
                queue.push_back(PackageIdentity::new(dependency.id.clone(), version));
            }
        }

        // Choices for ids no longer reachable must not leak into later rounds.
        self.chosen
            .retain(|id, _| *id == self.target.id || constraints.contains_key(id));
        Ok(constraints)
    }

    fn first_violation(&self, constraints: &Constraints) -> Option<PackageId> {
        constraints.iter().find_map(|(id, ranges)| {
            let version = self.chosen.get(id)?;
            ranges
                .iter()
                .any(|(range, _)| !range.satisfies(version))
                .then(|| id.clone())
        })
    }

    /// Best candidate for `id` satisfying every range in `ranges`.
    fn choose<'r>(
        &self,
        id: &PackageId,
        ranges: impl IntoIterator<Item = &'r VersionRange>,
    ) -> Option<Version> {
        let ranges: Vec<&VersionRange> = ranges.into_iter().collect();
        let satisfying: Vec<&Version> = self
            .candidates
            .get(id)?
            .iter()
            .copied()
            .filter(|v| ranges.iter().all(|r| r.satisfies(v)))
            .collect();

        let installed: Vec<&Version> = satisfying
            .iter()
            .copied()
            .filter(|v| {
                self.installed
                    .contains(&PackageIdentity::new(id.clone(), (*v).clone()))
            })
            .collect();
        let preferred = if installed.is_empty() {
            satisfying
        } else {
            installed
        };

        let picked = match self.behavior {
            DependencyBehavior::Lowest => preferred.into_iter().min(),
            _ => preferred.into_iter().max(),
        };
        picked.cloned()
    }

    /// Depth-first post-order from the target over the chosen versions.
    fn order(&self) -> Result<Vec<PackageIdentity>, PackageError> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut visiting = Vec::new();
        self.visit(self.target, &mut order, &mut visited, &mut visiting)?;
        Ok(order)
    }

    fn visit(
        &self,
        identity: &PackageIdentity,
        order: &mut Vec<PackageIdentity>,
        visited: &mut HashSet<PackageIdentity>,
        visiting: &mut Vec<PackageIdentity>,
    ) -> Result<(), PackageError> {
        if visited.contains(identity) {
            return Ok(());
        }
        if let Some(start) = visiting.iter().position(|i| i == identity) {
            let cycle: Vec<String> = visiting[start..]
                .iter()
                .chain(std::iter::once(identity))
                .map(|i| i.to_string())
                .collect();
            return Err(PackageError::ResolutionConflict {
                id: identity.id.to_string(),
                reason: format!("circular dependency {}", cycle.join(" -> ")),
            });
        }

        visiting.push(identity.clone());
        for dependency in &lookup(self.pool, identity)?.dependencies {
            if let Some(version) = self.chosen.get(&dependency.id) {
                let next = PackageIdentity::new(dependency.id.clone(), version.clone());
                self.visit(&next, order, visited, visiting)?;
            }
        }
        visiting.pop();

        visited.insert(identity.clone());
        order.push(identity.clone());
        Ok(())
    }
}

fn lookup<'p>(
    pool: &'p DependencyPool,
    identity: &PackageIdentity,
) -> Result<&'p PackageDependencyInfo, PackageError> {
    pool.get(identity).ok_or_else(|| PackageError::NotFound {
        id: identity.id.to_string(),
        range: Some(VersionRange::exact(identity.version.clone())),
    })
}

fn conflict(id: &PackageId, ranges: &[(VersionRange, PackageIdentity)]) -> PackageError {
    let placed: Vec<String> = ranges
        .iter()
        .map(|(range, by)| format!("{} requires {}", by, range))
        .collect();
    PackageError::ResolutionConflict {
        id: id.to_string(),
        reason: format!("no version satisfies all constraints ({})", placed.join("; ")),
    }
}
