//! Inheritance walks over the single-parent type hierarchy.
//!
//! Parent links are not checked for cycles when they are created, so every
//! walk here carries a visited set and stops at the first repeat.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use hashbrown::{HashMap, HashSet};

use super::TypeDef;

/// Directed `parent → children` adjacency.
#[derive(Debug, Clone, Default)]
pub struct ChildIndex {
    children: HashMap<String, BTreeSet<String>>,
}

impl ChildIndex {
    pub fn build(types: &BTreeMap<String, TypeDef>) -> Self {
        let mut index = Self::default();
        for (name, def) in types {
            if let Some(parent) = &def.parent {
                index.link(parent, name);
            }
        }
        index
    }

    pub fn link(&mut self, parent: &str, child: &str) {
        self.children.entry(parent.to_owned()).or_default().insert(child.to_owned());
    }

    pub fn unlink(&mut self, parent: &str, child: &str) {
        if let Some(set) = self.children.get_mut(parent) {
            set.remove(child);
            if set.is_empty() {
                self.children.remove(parent);
            }
        }
    }

    pub fn direct_children(&self, parent: &str) -> impl Iterator<Item = &String> {
        self.children.get(parent).into_iter().flatten()
    }

    /// Every type reachable downward from `root`, excluding `root`.
    pub fn descendants(&self, root: &str) -> BTreeSet<String> {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            for child in self.direct_children(current) {
                if child != root && seen.insert(child.clone()) {
                    queue.push_back(child);
                }
            }
        }
        seen
    }
}

/// Ancestors of `name`, nearest first.
pub fn ancestors(types: &BTreeMap<String, TypeDef>, name: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut seen: HashSet<&str> = HashSet::from_iter([name]);
    let mut current = types.get(name).and_then(|d| d.parent.as_deref());
    while let Some(parent) = current {
        if !seen.insert(parent) {
            break;
        }
        chain.push(parent.to_owned());
        current = types.get(parent).and_then(|d| d.parent.as_deref());
    }
    chain
}

/// Connectivity-based descendant computation.
///
/// Takes the undirected `{parent, child}` edge set, finds the component
/// containing `name`, keeps the members that have a parent and drops `name`
/// itself. For a tree this includes siblings and cousins of `name` as well
/// as its descendants; see [`ChildIndex::descendants`] for directed reach.
pub fn connected_descendants(types: &BTreeMap<String, TypeDef>, name: &str) -> BTreeSet<String> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for (child, def) in types {
        if let Some(parent) = def.parent.as_deref() {
            adjacency.entry(parent).or_default().push(child.as_str());
            adjacency.entry(child.as_str()).or_default().push(parent);
        }
    }

    let mut component: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([name]);
    while let Some(current) = queue.pop_front() {
        if !component.insert(current) {
            continue;
        }
        for &next in adjacency.get(current).into_iter().flatten() {
            if !component.contains(next) {
                queue.push_back(next);
            }
        }
    }

    component
        .into_iter()
        .filter(|t| *t != name)
        .filter(|t| types.get(*t).is_some_and(|d| d.parent.is_some()))
        .map(str::to_owned)
        .collect()
}
