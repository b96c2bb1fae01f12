//! Derivation-tree reconstruction.
//!
//! The chart alone only answers membership; the parent ids recorded by the
//! completer are what let us rebuild full derivations. Each root state in
//! the final column becomes one tree, with children resolved by walking its
//! parent list (last added first) against the state registry.

use tracing::debug;

use crate::chart::{Chart, StateId};
use crate::grammar::Grammar;
use crate::rules::Rule;
use crate::tree::DerivNode;

/// Builds every derivation tree rooted in the final column, best score
/// first. Equal scores keep their root-discovery order.
pub fn trees(chart: &Chart, grammar: &Grammar) -> Vec<DerivNode> {
  let mut roots: Vec<DerivNode> = chart
    .roots()
    .into_iter()
    .map(|id| build(chart, grammar, id))
    .collect();

  roots.sort_by(|a, b| b.score().total_cmp(&a.score()));

  debug!(trees = roots.len(), "reconstructed forest");
  roots
}

fn build(chart: &Chart, grammar: &Grammar, id: StateId) -> DerivNode {
  let state = chart.get(id);

  let mut children = Vec::with_capacity(state.parents.len());
  for &parent in state.parents.iter().rev() {
    // parents are always registered before the states that point at them,
    // so a non-decreasing id here means the registry is corrupt
    assert!(
      parent.index() < id.index(),
      "backpointer cycle: state {} lists parent {}",
      id.index(),
      parent.index()
    );
    children.push(build(chart, grammar, parent));
  }

  match state.rule.as_ref() {
    Rule::Phrase {
      head,
      weight,
      annotation,
      ..
    } => {
      let label = head
        .and_then(|h| grammar.string_for(h))
        .unwrap_or_default()
        .to_string();
      DerivNode::phrase(label, *weight, annotation.clone(), children)
    }
    Rule::Terminal {
      word,
      weight,
      annotation,
      ..
    } => DerivNode::word(word.clone(), *weight, annotation.clone()),
  }
}

#[test]
fn test_weights_and_annotations_flow_into_trees() {
  use crate::earley::Parser;
  use crate::grammar::Grammar;

  let g: Grammar = r#"
1 # TOP ::= S
2 # S ::= NP <&> VP <@> clause
0.5 # NP ::= it <@> subject
1 # VP ::= sleeps
"#
  .parse()
  .unwrap();
  let parser = Parser::new(g).unwrap();
  let trees = parser.parse_sentence(&["it", "sleeps"]).unwrap();
  assert_eq!(trees.len(), 1);

  let top = &trees[0];
  assert_eq!(top.weight, 1.0);
  let s = &top.children[0];
  assert_eq!(s.annotation, "clause");
  assert_eq!(s.weight, 2.0);
  let np = &s.children[0];
  assert_eq!(np.annotation, "subject");
  assert_eq!(np.children[0].label, "it");
  assert!(np.children[0].is_leaf());
  assert_eq!(top.score(), 1.0 + 2.0 + 0.5 + 1.0);
}

#[test]
fn test_children_are_ordered_left_to_right() {
  use crate::earley::Parser;
  use crate::grammar::Grammar;

  let g: Grammar = r#"
1 # TOP ::= S
1 # S ::= A <&> B <&> C
1 # A ::= a
1 # B ::= b
1 # C ::= c
"#
  .parse()
  .unwrap();
  let parser = Parser::new(g).unwrap();
  let trees = parser.parse_sentence(&["a", "b", "c"]).unwrap();
  assert_eq!(trees.len(), 1);

  let s = &trees[0].children[0];
  let labels: Vec<&str> = s.children.iter().map(|c| c.label.as_str()).collect();
  assert_eq!(labels, vec!["A", "B", "C"]);
  assert_eq!(trees[0].leaves(), vec!["a", "b", "c"]);
}
