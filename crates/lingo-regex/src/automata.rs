//! Finite automata over [`ClassAtom`] labels.
//!
//! States are entity handles into an arena; transitions live in a per-state
//! table and final states in a bit set, so the cyclic NFA/DFA graphs never
//! hold references into themselves.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;

use bit_set::BitSet;
use cranelift_entity::{entity_impl, EntityRef, PrimaryMap, SecondaryMap};

use crate::class::{ClassAtom, ClassKind, GroupId};

/// An automaton state.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct State(u32);
entity_impl!(State);

#[derive(Clone, Debug)]
pub struct Transition {
    pub label: ClassAtom,
    pub target: State,
}

/// A finite automaton. The same representation serves both the ε-NFA built
/// by Thompson's construction and the DFA produced by subset construction;
/// the DFA form guarantees that at most one outgoing label of any state
/// matches a given scalar.
#[derive(Clone, Debug)]
pub struct Automaton {
    transitions: PrimaryMap<State, Vec<Transition>>,
    start: State,
    finals: BitSet,
}

impl Automaton {
    /// A fresh automaton containing only its start state.
    pub fn new() -> Automaton {
        let mut transitions = PrimaryMap::new();
        let start = transitions.push(Vec::new());
        Automaton {
            transitions,
            start,
            finals: BitSet::new(),
        }
    }

    pub fn add_state(&mut self) -> State {
        self.transitions.push(Vec::new())
    }

    pub fn add_transition(&mut self, from: State, label: ClassAtom, to: State) {
        self.transitions[from].push(Transition { label, target: to });
    }

    pub fn start(&self) -> State {
        self.start
    }

    pub fn set_start(&mut self, s: State) {
        self.start = s;
    }

    pub fn mark_final(&mut self, s: State) {
        self.finals.insert(s.index());
    }

    pub fn is_final(&self, s: State) -> bool {
        self.finals.contains(s.index())
    }

    pub fn state_count(&self) -> usize {
        self.transitions.len()
    }

    pub fn transitions_from(&self, s: State) -> &[Transition] {
        &self.transitions[s]
    }

    pub fn states(&self) -> impl Iterator<Item = State> + '_ {
        self.transitions.keys()
    }

    /// The single matching transition out of `s`, if any. Only meaningful on
    /// the DFA form.
    pub fn step(&self, s: State, c: char) -> Option<State> {
        self.transitions[s]
            .iter()
            .find(|t| t.label.matches(c))
            .map(|t| t.target)
    }

    /// Depth-first traversal over ε-labelled edges.
    pub fn epsilon_closure(&self, from: State, closure: &mut BitSet) {
        let mut stack = vec![from];
        while let Some(s) = stack.pop() {
            if !closure.insert(s.index()) {
                continue;
            }
            for t in &self.transitions[s] {
                if t.label.is_empty() && !closure.contains(t.target.index()) {
                    stack.push(t.target);
                }
            }
        }
    }

    fn contains_final(&self, set: &BitSet) -> bool {
        !self.finals.is_disjoint(set)
    }

    /// Subset construction: builds the DFA whose states are ε-closed sets of
    /// this automaton's states.
    pub fn determinize(&self) -> Automaton {
        let mut dfa = Automaton::new();

        let mut start_closure = BitSet::new();
        self.epsilon_closure(self.start, &mut start_closure);

        let mut subsets: HashMap<Vec<usize>, State> = HashMap::new();
        let key = |set: &BitSet| set.iter().collect::<Vec<usize>>();

        subsets.insert(key(&start_closure), dfa.start);
        if self.contains_final(&start_closure) {
            dfa.mark_final(dfa.start);
        }

        let mut worklist = vec![(dfa.start, start_closure)];
        while let Some((source, subset)) = worklist.pop() {
            // Union the outgoing non-ε transitions of every member state,
            // grouped by their pattern string.
            let mut grouped: BTreeMap<String, (ClassAtom, BTreeSet<GroupId>, Vec<State>)> =
                BTreeMap::new();
            for s in subset.iter().map(State::new) {
                for t in &self.transitions[s] {
                    if t.label.is_empty() {
                        continue;
                    }
                    let entry = grouped.entry(t.label.pattern()).or_insert_with(|| {
                        (t.label.clone(), BTreeSet::new(), Vec::new())
                    });
                    entry.1.extend(t.label.groups.iter().copied());
                    entry.2.push(t.target);
                }
            }

            for (_, (mut label, groups, targets)) in grouped {
                let mut reachable = BitSet::new();
                for t in targets {
                    self.epsilon_closure(t, &mut reachable);
                }
                label.groups = groups.into_iter().collect();

                let target = match subsets.get(&key(&reachable)) {
                    Some(&existing) => existing,
                    None => {
                        let created = dfa.add_state();
                        subsets.insert(key(&reachable), created);
                        if self.contains_final(&reachable) {
                            dfa.mark_final(created);
                        }
                        worklist.push((created, reachable));
                        created
                    }
                };
                dfa.add_transition(source, label, target);
            }
        }

        log::debug!(
            "determinized {} NFA states into {} DFA states",
            self.state_count(),
            dfa.state_count()
        );
        dfa
    }

    /// Hopcroft-style partition refinement. Two states stay in the same
    /// partition only while their transitions on equal span sets lead into
    /// the same partitions.
    pub fn minimize(&self) -> Automaton {
        let mut partition: SecondaryMap<State, u32> = SecondaryMap::new();
        for s in self.states() {
            partition[s] = if self.is_final(s) { 0 } else { 1 };
        }
        let mut next_partition = 2u32;

        let members = |partition: &SecondaryMap<State, u32>, p: u32| {
            self.states()
                .filter(|&s| partition[s] == p)
                .collect::<Vec<State>>()
        };

        let mut changed = true;
        while changed {
            changed = false;
            'split: for s in self.states() {
                let p = partition[s];
                let peers = members(&partition, p);
                if peers.len() <= 1 {
                    continue;
                }
                for t1 in &self.transitions[s] {
                    let mut equiv = vec![s];
                    for &other in &peers {
                        if other == s {
                            continue;
                        }
                        let agrees = self.transitions[other].iter().any(|t2| {
                            partition[t1.target] == partition[t2.target]
                                && t1.label.span_set() == t2.label.span_set()
                        });
                        if agrees {
                            equiv.push(other);
                        }
                    }
                    if equiv.len() < peers.len() {
                        let p2 = next_partition;
                        next_partition += 1;
                        for e in equiv {
                            partition[e] = p2;
                        }
                        changed = true;
                        break 'split;
                    }
                }
            }
        }

        // Build the quotient automaton, one state per surviving partition.
        let mut quotient = Automaton::new();
        let mut mapped: HashMap<u32, State> = HashMap::new();
        mapped.insert(partition[self.start], quotient.start);
        for s in self.states() {
            let p = partition[s];
            if !mapped.contains_key(&p) {
                let q = quotient.add_state();
                mapped.insert(p, q);
            }
        }

        // Coalesce parallel transitions between the same pair of quotient
        // states into a single set atom.
        let mut edges: BTreeMap<(State, State), Vec<ClassAtom>> = BTreeMap::new();
        for s in self.states() {
            let from = mapped[&partition[s]];
            if self.is_final(s) {
                quotient.mark_final(from);
            }
            for t in &self.transitions[s] {
                let to = mapped[&partition[t.target]];
                let labels = edges.entry((from, to)).or_default();
                if !labels.iter().any(|l| l.span_set() == t.label.span_set()) {
                    labels.push(t.label.clone());
                }
            }
        }
        for ((from, to), mut labels) in edges {
            let label = if labels.len() == 1 {
                labels.pop().unwrap()
            } else {
                let mods = labels[0].mods;
                let mut groups: Vec<GroupId> =
                    labels.iter().flat_map(|l| l.groups.iter().copied()).collect();
                groups.sort_unstable();
                groups.dedup();
                let members = labels.into_iter().map(|l| l.kind).collect();
                ClassAtom::new(
                    ClassKind::Set {
                        negated: false,
                        members,
                    },
                    mods,
                    groups,
                )
            };
            quotient.add_transition(from, label, to);
        }

        log::debug!(
            "minimized {} states into {}",
            self.state_count(),
            quotient.state_count()
        );
        quotient
    }

    /// GraphViz rendering. The start state is `S`, final states `F1..Fn`,
    /// the rest numbered in discovery order.
    pub fn to_dot(&self, title: &str) -> String {
        let mut names: HashMap<State, String> = HashMap::new();
        let mut final_count = 0;
        for s in self.states() {
            if self.is_final(s) {
                final_count += 1;
                names.insert(s, format!("F{final_count}"));
            }
        }
        if !self.is_final(self.start) {
            names.insert(self.start, "S".to_string());
        }

        let mut spec = String::from("digraph G {\n");
        if !title.is_empty() {
            let _ = writeln!(spec, "\tlabel=\"{}\"", title.replace('"', "\\\""));
        }
        spec.push_str("\t{\n");
        if !self.is_final(self.start) {
            let _ = writeln!(
                spec,
                "\t\t\"S\" [shape=circle color=\"lightblue\" style=filled]"
            );
        }
        for s in self.states() {
            if self.is_final(s) {
                if s == self.start {
                    let _ = writeln!(
                        spec,
                        "\t\t\"{}\" [shape=doublecircle color=\"lightblue\" style=filled]",
                        names[&s]
                    );
                } else {
                    let _ = writeln!(spec, "\t\t\"{}\" [shape=doublecircle style=filled]", names[&s]);
                }
            }
        }
        spec.push_str("\t}\n");

        let mut counter = 0;
        for s in self.states() {
            if !names.contains_key(&s) {
                counter += 1;
                names.insert(s, counter.to_string());
            }
            for t in &self.transitions[s] {
                if !names.contains_key(&t.target) {
                    counter += 1;
                    names.insert(t.target, counter.to_string());
                }
                let groups = t
                    .label
                    .groups
                    .iter()
                    .map(|g| g.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                let label = if t.label.is_empty() {
                    "ε".to_string()
                } else {
                    t.label.pattern().replace('"', "\\\"")
                };
                let _ = writeln!(
                    spec,
                    "\t\"{}\" -> \"{}\" [label=\"{}:{}\"]",
                    names[&s], names[&t.target], label, groups
                );
            }
        }
        spec.push('}');
        spec
    }
}

impl Default for Automaton {
    fn default() -> Self {
        Automaton::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::Modifiers;

    fn atom(c: char) -> ClassAtom {
        ClassAtom::new(ClassKind::Single(c), Modifiers::default(), vec![0])
    }

    #[test]
    fn epsilon_closure_follows_only_empty_edges() {
        let mut nfa = Automaton::new();
        let a = nfa.start();
        let b = nfa.add_state();
        let c = nfa.add_state();
        let d = nfa.add_state();
        nfa.add_transition(a, ClassAtom::epsilon(), b);
        nfa.add_transition(b, ClassAtom::epsilon(), c);
        nfa.add_transition(c, atom('x'), d);

        let mut closure = BitSet::new();
        nfa.epsilon_closure(a, &mut closure);
        assert!(closure.contains(a.index()));
        assert!(closure.contains(b.index()));
        assert!(closure.contains(c.index()));
        assert!(!closure.contains(d.index()));
    }

    #[test]
    fn determinize_merges_parallel_branches() {
        // a -> b on 'x' and a -> c on 'x' collapse into one DFA target.
        let mut nfa = Automaton::new();
        let a = nfa.start();
        let b = nfa.add_state();
        let c = nfa.add_state();
        nfa.add_transition(a, atom('x'), b);
        nfa.add_transition(a, atom('x'), c);
        nfa.mark_final(b);

        let dfa = nfa.determinize();
        assert_eq!(dfa.state_count(), 2);
        let next = dfa.step(dfa.start(), 'x').unwrap();
        assert!(dfa.is_final(next));
        assert!(dfa.step(next, 'x').is_none());
    }

    #[test]
    fn dfa_state_has_at_most_one_match_per_scalar() {
        let mut nfa = Automaton::new();
        let a = nfa.start();
        let b = nfa.add_state();
        let c = nfa.add_state();
        nfa.add_transition(a, atom('x'), b);
        nfa.add_transition(a, atom('y'), c);
        nfa.mark_final(b);
        nfa.mark_final(c);

        let dfa = nfa.determinize();
        for s in dfa.states() {
            for probe in ['x', 'y', 'z'] {
                let matching = dfa
                    .transitions_from(s)
                    .iter()
                    .filter(|t| t.label.matches(probe))
                    .count();
                assert!(matching <= 1);
            }
        }
    }

    #[test]
    fn minimize_collapses_equivalent_states() {
        // B and C both step to D on 'c' and are otherwise identical, so the
        // quotient merges them: A -{a,b}-> BC -c-> D.
        let mut dfa = Automaton::new();
        let a = dfa.start();
        let b = dfa.add_state();
        let c = dfa.add_state();
        let d = dfa.add_state();
        dfa.add_transition(a, atom('a'), b);
        dfa.add_transition(a, atom('b'), c);
        dfa.add_transition(b, atom('c'), d);
        dfa.add_transition(c, atom('c'), d);
        dfa.mark_final(d);

        let min = dfa.minimize();
        assert_eq!(min.state_count(), 3);
        for input in ["ac", "bc"] {
            let mut state = min.start();
            for ch in input.chars() {
                state = min.step(state, ch).unwrap();
            }
            assert!(min.is_final(state), "{input} no longer accepted");
        }
    }

    #[test]
    fn dot_export_names_start_and_finals() {
        let mut nfa = Automaton::new();
        let f = nfa.add_state();
        nfa.add_transition(nfa.start(), atom('a'), f);
        nfa.mark_final(f);
        let dot = nfa.to_dot("demo");
        assert!(dot.starts_with("digraph G {"));
        assert!(dot.contains("label=\"demo\""));
        assert!(dot.contains("\"S\""));
        assert!(dot.contains("doublecircle"));
    }
}
