//! Persistent parse trees.
//!
//! Trees are immutable after the parser finishes: every transformation maps
//! to a new tree that physically shares unmodified subtrees with the old
//! one. Identity (pointer) comparison decides whether a subtree changed;
//! deep equality is never used.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::rc::Rc;

use crate::list::List;
use crate::Element;

pub type TreeRef = Rc<Tree>;

/// Path from the current node (head) back to the root (last).
pub type Path = Rc<List<TreeRef>>;

/// A tree-to-tree rewriting step; `None` drops the node.
pub type MapFn = Box<dyn Fn(&TreeRef, &Path) -> Option<TreeRef>>;

pub const PARENT: &str = "<";
pub const ANCESTOR: &str = "<<";
pub const SIBLING: &str = "-";

#[derive(Debug)]
pub struct Tree {
    pub node: Element,
    /// `None` children are placeholders awaiting cleanup.
    pub children: Vec<Option<TreeRef>>,
}

impl Tree {
    pub fn leaf(node: Element) -> TreeRef {
        Rc::new(Tree {
            node,
            children: Vec::new(),
        })
    }

    pub fn with_children(node: Element, children: Vec<Option<TreeRef>>) -> TreeRef {
        Rc::new(Tree { node, children })
    }

    fn non_nil_children(&self) -> Vec<&TreeRef> {
        self.children.iter().flatten().collect()
    }

    /// Bottom-up map. The mapper sees each node (its possibly-rebuilt copy
    /// if any child changed) together with its path from the root; a node
    /// whose children all came back identical is passed through unchanged,
    /// so untouched subtrees keep their identity in the result.
    pub fn map(tree: &TreeRef, mapper: &dyn Fn(&TreeRef, &Path) -> Option<TreeRef>) -> Option<TreeRef> {
        Tree::map_with_path(tree, mapper, None)
    }

    fn map_with_path(
        tree: &TreeRef,
        mapper: &dyn Fn(&TreeRef, &Path) -> Option<TreeRef>,
        ancestors: Option<Path>,
    ) -> Option<TreeRef> {
        let path: Path = Rc::new(List::cons(tree.clone(), ancestors.clone()));
        let mut rebuilt: Option<Vec<Option<TreeRef>>> = None;
        for (i, child) in tree.children.iter().enumerate() {
            if let Some(child) = child {
                let mapped = Tree::map_with_path(child, mapper, Some(path.clone()));
                let changed = match &mapped {
                    Some(m) => !Rc::ptr_eq(m, child),
                    None => true,
                };
                if changed {
                    rebuilt.get_or_insert_with(|| tree.children.clone())[i] = mapped;
                }
            }
        }
        match rebuilt {
            None => mapper(tree, &path),
            Some(children) => {
                let copy = Tree::with_children(tree.node.clone(), children);
                let path = Rc::new(List::cons(copy.clone(), ancestors));
                mapper(&copy, &path)
            }
        }
    }

    /// Applies `patterns`, then maps: trees that matched are rewritten by
    /// `mapper`, all others pass through with sharing preserved.
    pub fn map_match(
        tree: &TreeRef,
        mapper: impl Fn(&TreeRef, &MatchResult) -> Option<TreeRef>,
        patterns: &[Vec<String>],
    ) -> Option<TreeRef> {
        let index = Tree::build_index(tree);
        let results = index.matches(patterns);
        if results.is_empty() {
            return Some(tree.clone());
        }
        let matched: HashMap<*const Tree, MatchResult> = results
            .into_iter()
            .map(|r| (Rc::as_ptr(&r.tree), r))
            .collect();
        Tree::map(tree, &|t, _| match matched.get(&Rc::as_ptr(t)) {
            Some(result) => mapper(t, result),
            None => Some(t.clone()),
        })
    }

    /// Indexes every node by its `tree_pattern()` identifier and records
    /// each node's parent.
    pub fn build_index(tree: &TreeRef) -> TreeIndex {
        use std::cell::RefCell;
        let by_pattern = RefCell::new(HashMap::<String, Vec<TreeRef>>::new());
        let parent = RefCell::new(HashMap::<*const Tree, TreeRef>::new());
        Tree::map(tree, &|t, path| {
            by_pattern
                .borrow_mut()
                .entry(t.node.tree_pattern().to_string())
                .or_default()
                .push(t.clone());
            if let Some(tail) = path.tail() {
                parent.borrow_mut().insert(Rc::as_ptr(t), tail.head().clone());
            }
            Some(t.clone())
        });
        TreeIndex {
            root: tree.clone(),
            by_pattern: by_pattern.into_inner(),
            parent: parent.into_inner(),
        }
    }

    pub fn to_dot(tree: &TreeRef, title: &str) -> String {
        let mut spec = String::from("digraph G {\n");
        if !title.is_empty() {
            let _ = writeln!(spec, "\tlabel=\"{}\"", title.replace('"', "\\\""));
        }
        dot_node(tree, "0", &mut spec);
        spec.push('}');
        spec
    }
}

fn dot_node(tree: &TreeRef, position: &str, spec: &mut String) {
    for (i, child) in tree.children.iter().enumerate() {
        if let Some(child) = child {
            let child_position = format!("{position}{i}");
            let _ = writeln!(
                spec,
                "\t\"{} [{}]\" -> \"{} [{}]\"",
                tree.node, position, child.node, child_position
            );
            dot_node(child, &child_position, spec);
        }
    }
}

/// Drops nil placeholders from the child vector.
pub fn compact(tree: &TreeRef, _path: &Path) -> Option<TreeRef> {
    if tree.children.iter().any(|c| c.is_none()) {
        Some(Tree::with_children(
            tree.node.clone(),
            tree.children.iter().filter(|c| c.is_some()).cloned().collect(),
        ))
    } else {
        Some(tree.clone())
    }
}

/// A node with exactly one remaining child is replaced by that child.
pub fn promote_single_child(tree: &TreeRef, _path: &Path) -> Option<TreeRef> {
    let non_nil = tree.non_nil_children();
    if non_nil.len() == 1 {
        Some(non_nil[0].clone())
    } else {
        Some(tree.clone())
    }
}

/// A non-terminal whose children are all gone is dropped.
pub fn drop_orphan_nonterminal(tree: &TreeRef, _path: &Path) -> Option<TreeRef> {
    if !tree.node.terminal() && tree.non_nil_children().is_empty() {
        None
    } else {
        Some(tree.clone())
    }
}

/// Applies the mappers in order, short-circuiting when one drops the node.
pub fn compose(mappers: Vec<MapFn>) -> MapFn {
    Box::new(move |tree, path| {
        let mut current = tree.clone();
        for mapper in &mappers {
            match mapper(&current, path) {
                Some(next) => current = next,
                None => return None,
            }
        }
        Some(current)
    })
}

/// The default post-parse pass: drop orphan non-terminals, promote single
/// children, compact nils.
pub fn cleanup() -> MapFn {
    compose(vec![
        Box::new(drop_orphan_nonterminal),
        Box::new(promote_single_child),
        Box::new(compact),
    ])
}

/// Parses a multiline pattern: each line is one conjunct of
/// whitespace-separated identifiers and relations.
pub fn parse_pattern(pattern: &str) -> Vec<Vec<String>> {
    pattern
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.split_whitespace().map(str::to_string).collect())
        .collect()
}

/// One matched occurrence: the topmost matched tree, the paths walked (one
/// per conjunct), and every tree encountered keyed by its identifier.
pub struct MatchResult {
    pub tree: TreeRef,
    pub paths: Vec<Path>,
    pub bindings: HashMap<String, Vec<TreeRef>>,
}

pub struct TreeIndex {
    root: TreeRef,
    by_pattern: HashMap<String, Vec<TreeRef>>,
    parent: HashMap<*const Tree, TreeRef>,
}

impl TreeIndex {
    pub fn root(&self) -> &TreeRef {
        &self.root
    }

    pub fn parent_of(&self, tree: &TreeRef) -> Option<&TreeRef> {
        self.parent.get(&Rc::as_ptr(tree))
    }

    /// Matches each conjunct right-to-left from every tree carrying the
    /// rightmost identifier, then intersects the topmost matches across
    /// conjuncts. The already-matched set keeps one pattern occurrence from
    /// binding the same subtree twice.
    pub fn matches(&self, patterns: &[Vec<String>]) -> Vec<MatchResult> {
        let mut tops: Option<HashMap<*const Tree, (TreeRef, Vec<Path>)>> = None;

        for pattern in patterns {
            let mut bottoms: HashMap<*const Tree, (TreeRef, Path)> = HashMap::new();
            let mut already: HashSet<*const Tree> = HashSet::new();
            let mut pending_rel: Option<&str> = None;

            for (j, part) in pattern.iter().enumerate().rev() {
                if j == pattern.len() - 1 {
                    // initial candidates are not marked: a later occurrence
                    // of the same identifier must still be able to bind a
                    // different subtree
                    for t in self.by_pattern.get(part).into_iter().flatten() {
                        bottoms.insert(
                            Rc::as_ptr(t),
                            (t.clone(), Rc::new(List::cons(t.clone(), None))),
                        );
                    }
                } else if pending_rel.is_none() {
                    assert!(
                        matches!(part.as_str(), PARENT | ANCESTOR | SIBLING),
                        "bad relation pattern {part}"
                    );
                    pending_rel = Some(part);
                } else {
                    let rel = pending_rel.take().unwrap();
                    bottoms = self.step(rel, part, bottoms, &mut already);
                }
                if bottoms.is_empty() {
                    return Vec::new();
                }
            }

            tops = Some(match tops {
                None => bottoms
                    .into_iter()
                    .map(|(k, (t, path))| (k, (t, vec![path])))
                    .collect(),
                Some(previous) => {
                    let mut intersection = HashMap::new();
                    for (k, (t, path)) in bottoms {
                        if let Some((_, paths)) = previous.get(&k) {
                            let mut paths = paths.clone();
                            paths.push(path);
                            intersection.insert(k, (t, paths));
                        }
                    }
                    intersection
                }
            });
            if tops.as_ref().unwrap().is_empty() {
                return Vec::new();
            }
        }

        let Some(tops) = tops else { return Vec::new() };
        tops.into_values()
            .map(|(tree, paths)| {
                let mut bindings: HashMap<String, Vec<TreeRef>> = HashMap::new();
                for path in &paths {
                    for t in path.iter() {
                        bindings
                            .entry(t.node.tree_pattern().to_string())
                            .or_default()
                            .push(t.clone());
                    }
                }
                MatchResult {
                    tree,
                    paths,
                    bindings,
                }
            })
            .collect()
    }

    fn step(
        &self,
        rel: &str,
        ident: &str,
        bottoms: HashMap<*const Tree, (TreeRef, Path)>,
        already: &mut HashSet<*const Tree>,
    ) -> HashMap<*const Tree, (TreeRef, Path)> {
        let mut next = HashMap::new();
        match rel {
            // the nearest not-yet-matched sibling to the left
            SIBLING => {
                for (t, path) in bottoms.into_values() {
                    let Some(parent) = self.parent.get(&Rc::as_ptr(&t)) else {
                        continue;
                    };
                    let position = parent
                        .children
                        .iter()
                        .position(|c| matches!(c, Some(c) if Rc::ptr_eq(c, &t)));
                    let Some(position) = position else { continue };
                    for k in (0..position).rev() {
                        if let Some(sibling) = &parent.children[k] {
                            let ptr = Rc::as_ptr(sibling);
                            if !already.contains(&ptr) && sibling.node.tree_pattern() == ident {
                                next.insert(ptr, (sibling.clone(), path.push(sibling.clone())));
                                already.insert(ptr);
                                break;
                            }
                        }
                    }
                }
            }
            PARENT => {
                for (t, path) in bottoms.into_values() {
                    if let Some(parent) = self.parent.get(&Rc::as_ptr(&t)) {
                        let ptr = Rc::as_ptr(parent);
                        if !already.contains(&ptr) && parent.node.tree_pattern() == ident {
                            next.insert(ptr, (parent.clone(), path.push(parent.clone())));
                            already.insert(ptr);
                        }
                    }
                }
            }
            ANCESTOR => {
                for (t, path) in bottoms.into_values() {
                    let mut up = self.parent.get(&Rc::as_ptr(&t));
                    while let Some(anc) = up {
                        if anc.node.tree_pattern() == ident {
                            break;
                        }
                        up = self.parent.get(&Rc::as_ptr(anc));
                    }
                    if let Some(anc) = up {
                        let ptr = Rc::as_ptr(anc);
                        next.insert(ptr, (anc.clone(), path.push(anc.clone())));
                        already.insert(ptr);
                    }
                }
            }
            other => panic!("bad relation pattern {other}"),
        }
        next
    }
}
