//! Plan optimization.
//!
//! Three passes, always applied in this order:
//!
//! 1. phases are ordered by canonical type rank, then priority
//! 2. phases sharing a type are merged into the first one
//! 3. tests inside a phase are sorted longest-first and clustered into
//!    dependency groups
//!
//! Running the passes on an already optimized list changes nothing.

use crate::plan::{Phase, TestGroup};
use gantry_core::{DependencyGraph, TestDescriptor, TestId, TestType};
use indexmap::{IndexMap, IndexSet};
use std::collections::{BTreeSet, VecDeque};

/// Apply all passes
#[must_use]
pub fn optimize_phases(phases: Vec<Phase>, graph: &DependencyGraph) -> Vec<Phase> {
    let mut phases = merge_phases(order_phases(phases));
    for phase in &mut phases {
        optimize_phase(phase, graph);
    }
    phases
}

/// Stable sort by canonical rank, with unranked types last, then priority
#[must_use]
pub fn order_phases(mut phases: Vec<Phase>) -> Vec<Phase> {
    phases.sort_by_key(|p| (p.phase_type.canonical_rank().unwrap_or(usize::MAX), p.priority));
    phases
}

/// Merge phases of the same type into the position of the first one
#[must_use]
pub fn merge_phases(phases: Vec<Phase>) -> Vec<Phase> {
    let mut merged: IndexMap<TestType, Phase> = IndexMap::new();
    for phase in phases {
        match merged.get_mut(&phase.phase_type) {
            Some(into) => absorb(into, phase),
            None => {
                merged.insert(phase.phase_type, phase);
            }
        }
    }
    merged.into_values().collect()
}

fn absorb(into: &mut Phase, other: Phase) {
    tracing::debug!(into = %into.name, from = %other.name, "merging phases");
    for test in other.tests {
        if into.test(&test.id).is_none() {
            into.tests.push(test);
        }
    }
    into.priority = into.priority.min(other.priority);
    into.parallel &= other.parallel;
    into.continue_on_failure &= other.continue_on_failure;
    into.estimated_duration_ms += other.estimated_duration_ms;
    into.test_groups.clear();
}

/// Sort a phase longest-first and recompute its groups
pub fn optimize_phase(phase: &mut Phase, graph: &DependencyGraph) {
    phase
        .tests
        .sort_by(|a, b| b.estimated_ms().cmp(&a.estimated_ms()));
    phase.test_groups = cluster_tests(&phase.tests, graph);
}

/// Partition `tests` into connected components of the dependency relation
/// restricted to `tests`. Groups are seeded in input order; members are
/// listed dependencies first.
#[must_use]
pub fn cluster_tests(tests: &[TestDescriptor], graph: &DependencyGraph) -> Vec<TestGroup> {
    let members: IndexSet<&TestId> = tests.iter().map(|t| &t.id).collect();

    // undirected adjacency over member indices
    let mut adjacent: Vec<Vec<usize>> = vec![Vec::new(); members.len()];
    for (i, id) in members.iter().enumerate() {
        for dep in graph.dependencies_of(id) {
            if let Some(j) = members.get_index_of(dep) {
                if i != j {
                    adjacent[i].push(j);
                    adjacent[j].push(i);
                }
            }
        }
    }

    let mut seen = vec![false; members.len()];
    let mut groups = Vec::new();
    for seed in 0..members.len() {
        if seen[seed] {
            continue;
        }
        seen[seed] = true;
        let mut component = vec![seed];
        let mut queue = VecDeque::from([seed]);
        while let Some(i) = queue.pop_front() {
            for &j in &adjacent[i] {
                if !seen[j] {
                    seen[j] = true;
                    component.push(j);
                    queue.push_back(j);
                }
            }
        }
        component.sort_unstable();

        let ordered = dependencies_first(&component, &members, graph);
        groups.push(TestGroup::new(
            ordered.into_iter().map(|i| members[i].clone()).collect(),
        ));
    }
    groups
}

/// Kahn's algorithm over one component, always taking the lowest ready index.
/// Members left over by a cycle are appended in index order.
fn dependencies_first(component: &[usize], members: &IndexSet<&TestId>, graph: &DependencyGraph) -> Vec<usize> {
    let inside: IndexSet<usize> = component.iter().copied().collect();
    let mut in_degree: IndexMap<usize, usize> = component.iter().map(|&i| (i, 0)).collect();
    let mut dependents: IndexMap<usize, Vec<usize>> = IndexMap::new();
    for &i in component {
        for dep in graph.dependencies_of(members[i]) {
            let Some(j) = members.get_index_of(dep) else { continue };
            if j == i || !inside.contains(&j) {
                continue;
            }
            dependents.entry(j).or_default().push(i);
            in_degree[&i] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(i, _)| *i)
        .collect();
    let mut placed: IndexSet<usize> = IndexSet::with_capacity(component.len());
    while let Some(i) = ready.pop_first() {
        placed.insert(i);
        for &next in dependents.get(&i).map_or(&[][..], Vec::as_slice) {
            let degree = &mut in_degree[&next];
            *degree -= 1;
            if *degree == 0 {
                ready.insert(next);
            }
        }
    }

    if placed.len() < component.len() {
        tracing::warn!(
            tests = component.len() - placed.len(),
            "dependency cycle inside phase, keeping longest-first order"
        );
        // component is sorted, so leftovers stay in index order
        let rest: Vec<usize> = component.iter().copied().filter(|i| !placed.contains(i)).collect();
        placed.extend(rest);
    }
    placed.into_iter().collect()
}
