use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::grammar::Grammar;
use crate::rules::{Rule, Symbol};

/// Index of a state in the per-parse registry. Identifiers are assigned
/// monotonically on insertion and are only meaningful within one parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(usize);

impl StateId {
  pub fn index(self) -> usize {
    self.0
  }
}

/// Which operation created a state. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
  Predicted,
  Scanned,
  Completed,
}

/// One Earley state: a dotted rule over a span of the input, with its
/// probability bookkeeping and the registry ids of the completed
/// constituents that advanced it.
#[derive(Debug, Clone)]
pub struct State {
  pub rule: Arc<Rule>,
  /// Index into the rule body; `body.len()` means complete.
  pub dot: usize,
  pub start: usize,
  pub end: usize,
  /// Probability of generating the input prefix through this state.
  pub forward: f64,
  /// Probability of generating the spanned substring from this rule.
  pub inner: f64,
  pub parents: Vec<StateId>,
  pub origin: Origin,
}

impl State {
  /// Terminal rules are always complete; a phrase rule is complete once
  /// the dot has consumed its whole body.
  pub fn is_complete(&self) -> bool {
    match self.rule.as_ref() {
      Rule::Phrase { body, .. } => self.dot == body.len(),
      Rule::Terminal { .. } => true,
    }
  }

  /// The symbol after the dot; `None` iff the state is complete.
  pub fn next_symbol(&self) -> Option<Symbol> {
    self.rule.symbol_at(self.dot)
  }

  fn key(&self) -> StateKey {
    StateKey {
      rule: self.rule.clone(),
      start: self.start,
      dot: self.dot,
      parents: self.parents.clone(),
    }
  }
}

/// Column-local dedup key. Within a column the end position is fixed, so
/// (rule, start, dot) pins the dotted span. Parent ids participate too:
/// states reached through different derivations must both survive, because
/// the forest builder resolves children purely through parent lists.
/// States that converge along the same derivation still merge, which is
/// where forward-probability summing applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StateKey {
  rule: Arc<Rule>,
  start: usize,
  dot: usize,
  parents: Vec<StateId>,
}

#[derive(Debug, Default)]
struct Column {
  states: Vec<StateId>,
  index: HashMap<StateKey, StateId>,
}

/// The chart for one parse request: one column per input position plus an
/// arena holding every state ever inserted. The arena doubles as the
/// registry that resolves backpointers; it is dropped with the chart and
/// never shared across requests.
#[derive(Debug)]
pub struct Chart {
  columns: Vec<Column>,
  arena: Vec<State>,
}

impl Chart {
  pub fn new(columns: usize) -> Self {
    Self {
      columns: (0..columns).map(|_| Column::default()).collect(),
      arena: Vec::new(),
    }
  }

  /// Number of columns, i.e. input length + 1.
  pub fn len(&self) -> usize {
    self.columns.len()
  }

  pub fn is_empty(&self) -> bool {
    self.columns.is_empty()
  }

  pub fn len_at(&self, k: usize) -> usize {
    self.columns[k].states.len()
  }

  /// Total number of states across all columns.
  pub fn state_count(&self) -> usize {
    self.arena.len()
  }

  pub fn id_at(&self, k: usize, idx: usize) -> StateId {
    self.columns[k].states[idx]
  }

  pub fn get(&self, id: StateId) -> &State {
    &self.arena[id.0]
  }

  pub fn exists(&self, k: usize, state: &State) -> bool {
    self.columns[k].index.contains_key(&state.key())
  }

  /// Inserts into column `k`, assigning the next registry id. If an equal
  /// state is already present the new one is discarded; with
  /// `sum_probabilities` its forward mass is folded into the existing
  /// state first. Inner probability and parents are never touched after
  /// insertion.
  pub fn enqueue(&mut self, k: usize, state: State, sum_probabilities: bool) -> StateId {
    if let Some(&existing) = self.columns[k].index.get(&state.key()) {
      if sum_probabilities {
        self.arena[existing.0].forward += state.forward;
      }
      return existing;
    }

    let id = StateId(self.arena.len());
    self.columns[k].index.insert(state.key(), id);
    self.columns[k].states.push(id);
    self.arena.push(state);
    id
  }

  /// Completed parse-root states spanning the whole input, in insertion
  /// order. These are the forest roots.
  pub fn roots(&self) -> Vec<StateId> {
    let Some(last) = self.columns.last() else {
      return Vec::new();
    };
    last
      .states
      .iter()
      .copied()
      .filter(|&id| {
        let state = self.get(id);
        state.rule.head() == Some(Symbol::PARSE_ROOT)
          && state.is_complete()
          && state.start == 0
      })
      .collect()
  }

  /// Prefix probability at position `k`: the total forward mass of scanned
  /// states ending there.
  pub fn prefix_probability(&self, k: usize) -> f64 {
    self.columns[k]
      .states
      .iter()
      .map(|&id| self.get(id))
      .filter(|s| s.origin == Origin::Scanned)
      .map(|s| s.forward)
      .sum()
  }

  /// Inner probability of the whole sentence: total inner mass of the
  /// forest roots.
  pub fn sentence_probability(&self) -> f64 {
    self.roots().into_iter().map(|id| self.get(id).inner).sum()
  }

  /// Chart rendering needs the grammar to resolve symbol names.
  pub fn display<'a>(&'a self, grammar: &'a Grammar) -> ChartDisplay<'a> {
    ChartDisplay {
      chart: self,
      grammar,
    }
  }
}

pub struct ChartDisplay<'a> {
  chart: &'a Chart,
  grammar: &'a Grammar,
}

impl fmt::Display for ChartDisplay<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for k in 0..self.chart.len() {
      writeln!(f, "Chart {}:", k)?;
      for idx in 0..self.chart.len_at(k) {
        let id = self.chart.id_at(k, idx);
        let state = self.chart.get(id);
        writeln!(
          f,
          "  #{} {}..{} {} dot={} parents={:?} {{for: {}, inn: {}}}",
          id.index(),
          state.start,
          state.end,
          self.grammar.rule_to_string(&state.rule),
          state.dot,
          state.parents.iter().map(|p| p.index()).collect::<Vec<_>>(),
          state.forward,
          state.inner,
        )?;
      }
    }
    Ok(())
  }
}

#[cfg(test)]
fn test_state(rule: &Arc<Rule>, dot: usize, start: usize, end: usize, forward: f64) -> State {
  State {
    rule: rule.clone(),
    dot,
    start,
    end,
    forward,
    inner: 1.0,
    parents: Vec::new(),
    origin: Origin::Predicted,
  }
}

#[cfg(test)]
fn test_rule() -> Arc<Rule> {
  Arc::new(Rule::Phrase {
    head: Some(Symbol::PARSE_ROOT),
    body: vec![Symbol::UNKNOWN_TERMINAL, Symbol::UNKNOWN_TERMINAL],
    weight: 1.0,
    annotation: String::new(),
  })
}

#[test]
fn test_enqueue_assigns_monotonic_ids() {
  let rule = test_rule();
  let mut chart = Chart::new(3);
  let a = chart.enqueue(0, test_state(&rule, 0, 0, 0, 1.0), true);
  let b = chart.enqueue(1, test_state(&rule, 1, 0, 1, 1.0), true);
  let c = chart.enqueue(1, test_state(&rule, 1, 1, 1, 1.0), true);
  assert!(a < b && b < c);
  assert_eq!(chart.state_count(), 3);
  assert_eq!(chart.len_at(1), 2);
  assert_eq!(chart.id_at(1, 0), b);
}

#[test]
fn test_enqueue_merges_forward_mass() {
  let rule = test_rule();
  let mut chart = Chart::new(2);
  let a = chart.enqueue(0, test_state(&rule, 0, 0, 0, 0.25), true);
  let b = chart.enqueue(0, test_state(&rule, 0, 0, 0, 0.5), true);
  assert_eq!(a, b);
  assert_eq!(chart.state_count(), 1);
  assert_eq!(chart.get(a).forward, 0.75);
  // inner is never merged
  assert_eq!(chart.get(a).inner, 1.0);

  // without summing the duplicate is just discarded
  let c = chart.enqueue(0, test_state(&rule, 0, 0, 0, 4.0), false);
  assert_eq!(c, a);
  assert_eq!(chart.get(a).forward, 0.75);
}

#[test]
fn test_dedup_key_spans_rule_start_dot_and_parents() {
  let rule = test_rule();
  let mut chart = Chart::new(2);
  let a = chart.enqueue(1, test_state(&rule, 1, 0, 1, 1.0), true);
  assert!(chart.exists(1, &test_state(&rule, 1, 0, 1, 7.0)));

  // a different derivation (different parents) is a distinct state
  let mut other = test_state(&rule, 1, 0, 1, 1.0);
  other.parents = vec![a];
  assert!(!chart.exists(1, &other));
  let b = chart.enqueue(1, other, true);
  assert_ne!(a, b);
  assert_eq!(chart.len_at(1), 2);
}
