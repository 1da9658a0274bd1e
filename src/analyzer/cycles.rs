use super::{Dependency, NodeRef};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Cycles in the operation-to-operation part of the dependency graph.
///
/// Nodes are keyed `path:METHOD`. Each cycle lists its keys in edge
/// order and repeats the first key at the end. Schema nodes are
/// ignored: they cannot be executed, so they cannot deadlock a chain.
pub fn find_cycles(dependencies: &[Dependency]) -> Vec<Vec<String>> {
    let mut graph: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for dep in dependencies {
        if let (NodeRef::Operation { .. }, NodeRef::Operation { .. }) = (&dep.source, &dep.target)
        {
            let target = dep.target.key();
            graph.entry(dep.source.key()).or_default().insert(target.clone());
            graph.entry(target).or_default();
        }
    }

    let mut search = CycleSearch {
        graph: &graph,
        visited: HashSet::new(),
        stack: Vec::new(),
        on_stack: HashSet::new(),
        cycles: Vec::new(),
    };
    for node in graph.keys() {
        if !search.visited.contains(node.as_str()) {
            search.visit(node);
        }
    }
    search.cycles
}

struct CycleSearch<'g> {
    graph: &'g BTreeMap<String, BTreeSet<String>>,
    visited: HashSet<&'g str>,
    stack: Vec<&'g str>,
    on_stack: HashSet<&'g str>,
    cycles: Vec<Vec<String>>,
}

impl<'g> CycleSearch<'g> {
    fn visit(&mut self, node: &'g str) {
        self.visited.insert(node);
        self.stack.push(node);
        self.on_stack.insert(node);

        let graph = self.graph;
        if let Some(next) = graph.get(node) {
            for neighbour in next {
                let neighbour = neighbour.as_str();
                if self.on_stack.contains(neighbour) {
                    // back edge: the cycle is the stack from `neighbour` on
                    let start = self
                        .stack
                        .iter()
                        .position(|entry| *entry == neighbour)
                        .unwrap_or(0);
                    let mut cycle: Vec<String> =
                        self.stack[start..].iter().map(|key| key.to_string()).collect();
                    cycle.push(neighbour.to_string());
                    self.cycles.push(cycle);
                } else if !self.visited.contains(neighbour) {
                    self.visit(neighbour);
                }
            }
        }

        self.stack.pop();
        self.on_stack.remove(node);
    }
}
