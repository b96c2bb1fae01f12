use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, trace};

use crate::Err;
use crate::chart::{Chart, Origin, State, StateId};
use crate::forest;
use crate::grammar::Grammar;
use crate::left_corner::LeftCornerRelation;
use crate::rules::{Rule, Symbol};
use crate::tree::DerivNode;

/// A Stolcke probabilistic Earley parser over one immutable grammar.
///
/// Construction validates the grammar and precomputes the left-corner
/// closure, so every configuration error surfaces here and nothing can fail
/// mid-parse. A `Parser` may serve concurrent requests: each call to
/// [`Parser::parse_sentence`] allocates its own chart and registry.
#[derive(Debug)]
pub struct Parser {
  grammar: Grammar,
  left_corner: LeftCornerRelation,
  /// Headless rule whose single state seeds column 0. The enqueue policy
  /// drops any state that would advance it back into the chart.
  root_rule: Arc<Rule>,
  cancelled: AtomicBool,
}

impl Parser {
  pub fn new(grammar: Grammar) -> Result<Self, Err> {
    grammar.validate()?;
    let left_corner = LeftCornerRelation::build(&grammar)?;

    // a unit-production cycle re-derives a nonterminal from itself without
    // consuming input; the completer would keep extending parent chains and
    // never close the column. The unit closure diagonal exceeds 1 exactly
    // when such a cycle carries weight.
    for symbol in grammar.nonterminals() {
      if left_corner.unit_relation(symbol, symbol) > 1.0 + 1e-9 {
        return Err(
          format!(
            "unit-production cycle through {}",
            grammar.string_for(symbol).unwrap_or("?")
          )
          .into(),
        );
      }
    }

    let root_rule = Arc::new(Rule::Phrase {
      head: None,
      body: vec![Symbol::PARSE_ROOT],
      weight: Rule::DEFAULT_WEIGHT,
      annotation: String::new(),
    });
    Ok(Self {
      grammar,
      left_corner,
      root_rule,
      cancelled: AtomicBool::new(false),
    })
  }

  pub fn grammar(&self) -> &Grammar {
    &self.grammar
  }

  pub fn left_corner(&self) -> &LeftCornerRelation {
    &self.left_corner
  }

  /// Asks an in-flight parse to abort at its next checkpoint.
  pub fn request_cancellation(&self) {
    self.cancelled.store(true, Ordering::Relaxed);
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::Relaxed)
  }

  /// Parses a tokenized sentence into scored derivation trees, best score
  /// first. An empty vec means the grammar does not generate the sentence;
  /// `None` means the parse was cancelled (check [`Parser::is_cancelled`]).
  pub fn parse_sentence(&self, sentence: &[&str]) -> Option<Vec<DerivNode>> {
    let chart = self.parse_chart(sentence)?;
    Some(forest::trees(&chart, &self.grammar))
  }

  /// Runs the recognizer over the sentence and returns the populated chart,
  /// or `None` on cancellation.
  pub fn parse_chart(&self, sentence: &[&str]) -> Option<Chart> {
    self.cancelled.store(false, Ordering::Relaxed);

    let mut chart = Chart::new(sentence.len() + 1);
    chart.enqueue(
      0,
      State {
        rule: self.root_rule.clone(),
        dot: 0,
        start: 0,
        end: 0,
        forward: 1.0,
        inner: 1.0,
        parents: Vec::new(),
        origin: Origin::Predicted,
      },
      false,
    );

    for k in 0..chart.len() {
      if self.is_cancelled() {
        return None;
      }

      // the column grows while we walk it, so re-read its length each step;
      // states enqueued into column k are processed before we move to k + 1
      let mut idx = 0;
      while idx < chart.len_at(k) {
        if self.is_cancelled() {
          return None;
        }

        let id = chart.id_at(k, idx);
        idx += 1;

        let state = chart.get(id).clone();
        match state.next_symbol() {
          Some(symbol) if symbol.is_nonterminal() => {
            self.predictor(&mut chart, k, &state);
          }
          Some(symbol) => self.scanner(&mut chart, &state, symbol, sentence),
          None => self.completer(&mut chart, &state, id),
        }
      }
      trace!(column = k, states = chart.len_at(k), "column closed");
    }

    debug!(
      columns = chart.len(),
      states = chart.state_count(),
      roots = chart.roots().len(),
      "chart complete"
    );
    Some(chart)
  }

  /// Expands a nonterminal expectation into all of its productions at the
  /// current position. The left-corner closure stands in for the infinite
  /// chain of predictions a left-recursive grammar would otherwise need.
  fn predictor(&self, chart: &mut Chart, k: usize, state: &State) {
    let needed = match state.next_symbol() {
      Some(symbol) => symbol,
      None => return,
    };

    for rule in self.grammar.rules_with_head(needed) {
      let relation = match rule.leftmost() {
        Some(leftmost) => {
          let r = self.left_corner.left_corner_relation(needed, leftmost);
          if r == 0.0 { 1.0 } else { r }
        }
        None => 1.0,
      };
      let weight = rule.weight();

      self.enqueue(
        chart,
        k,
        State {
          rule: rule.clone(),
          dot: 0,
          start: k,
          end: k,
          forward: state.forward * relation * weight,
          inner: weight,
          parents: Vec::new(),
          origin: Origin::Predicted,
        },
      );
    }
  }

  /// Consumes one input token (or the empty terminal) against a terminal
  /// expectation, producing a complete terminal state in the next column
  /// (or a zero-width one in this column).
  fn scanner(&self, chart: &mut Chart, state: &State, needed: Symbol, sentence: &[&str]) {
    let at = state.end;

    if at >= sentence.len() {
      // past the input only an explicit empty-terminal expectation fires
      if needed == Symbol::EMPTY_TERMINAL {
        self.enqueue(chart, at, self.terminal_state(needed, "", at, at, state.inner));
      }
      return;
    }

    let word = sentence[at];
    if self.grammar.terminal_code_for(word) == needed || needed == Symbol::UNKNOWN_TERMINAL {
      self.enqueue(
        chart,
        at + 1,
        self.terminal_state(needed, word, at, at + 1, state.inner),
      );
    }

    // independent of the word match; both may fire for one source state
    if needed == Symbol::EMPTY_TERMINAL {
      self.enqueue(chart, at, self.terminal_state(needed, "", at, at, state.inner));
    }
  }

  fn terminal_state(
    &self,
    head: Symbol,
    word: &str,
    start: usize,
    end: usize,
    inner: f64,
  ) -> State {
    State {
      rule: Arc::new(Rule::Terminal {
        head,
        word: word.to_string(),
        weight: Rule::DEFAULT_WEIGHT,
        annotation: String::new(),
      }),
      dot: 0,
      start,
      end,
      forward: inner,
      inner,
      parents: Vec::new(),
      origin: Origin::Scanned,
    }
  }

  /// Advances every state waiting for the completed constituent's head at
  /// its start position, recording the completed state as a parent.
  fn completer(&self, chart: &mut Chart, completed: &State, id: StateId) {
    let k = completed.start;
    let head = completed.rule.head();

    // collect first: the waiting column may be the one being extended
    let waiting: Vec<StateId> = (0..chart.len_at(k))
      .map(|i| chart.id_at(k, i))
      .filter(|&wid| {
        let w = chart.get(wid);
        w.end == k && !w.is_complete() && w.next_symbol() == head
      })
      .collect();

    for wid in waiting {
      let w = chart.get(wid).clone();

      let mut parents = Vec::with_capacity(w.parents.len() + 1);
      parents.push(id);
      for &p in &w.parents {
        if !parents.contains(&p) {
          parents.push(p);
        }
      }

      self.enqueue(
        chart,
        completed.end,
        State {
          rule: w.rule.clone(),
          dot: w.dot + 1,
          start: w.start,
          end: completed.end,
          forward: w.forward * completed.inner,
          inner: w.inner * completed.inner,
          parents,
          origin: Origin::Completed,
        },
      );
    }
  }

  /// Enqueue policy: states over the synthetic headless rule are dropped,
  /// everything else is inserted with forward-probability summing on
  /// duplicates, at all three creation sites.
  fn enqueue(&self, chart: &mut Chart, k: usize, state: State) {
    if state.rule.head().is_none() {
      return;
    }
    chart.enqueue(k, state, true);
  }
}

#[cfg(test)]
fn toy_parser() -> Parser {
  let g: Grammar = r#"
1 # TOP ::= S
1 # S ::= NP <&> VP
1 # NP ::= it
1 # VP ::= sleeps
"#
  .parse()
  .unwrap();
  Parser::new(g).unwrap()
}

#[test]
fn test_single_derivation() {
  let parser = toy_parser();
  let trees = parser.parse_sentence(&["it", "sleeps"]).unwrap();
  assert_eq!(trees.len(), 1);
  assert_eq!(trees[0].label, "TOP");
  assert_eq!(trees[0].penn(), "(TOP (S (NP it) (VP sleeps)))");
  assert_eq!(trees[0].leaves(), vec!["it", "sleeps"]);
  assert_eq!(trees[0].score(), 4.0);
}

#[test]
fn test_non_membership_yields_empty_forest() {
  let parser = toy_parser();
  // "runs" is out of vocabulary and nothing carries the wildcard
  let trees = parser.parse_sentence(&["it", "runs"]).unwrap();
  assert!(trees.is_empty());
  assert!(!parser.is_cancelled());

  // too short and too long inputs fail the same way
  assert!(parser.parse_sentence(&["it"]).unwrap().is_empty());
  assert!(
    parser
      .parse_sentence(&["it", "sleeps", "sleeps"])
      .unwrap()
      .is_empty()
  );
}

#[test]
fn test_ambiguity_yields_distinct_trees_best_first() {
  let g: Grammar = r#"
1 # TOP ::= S
1 # S ::= NP <&> VP
0.7 # NP ::= it
0.3 # NP ::= PRO
1 # PRO ::= it
1 # VP ::= sleeps
"#
  .parse()
  .unwrap();
  let parser = Parser::new(g).unwrap();

  let trees = parser.parse_sentence(&["it", "sleeps"]).unwrap();
  assert_eq!(trees.len(), 2);
  // scores non-increasing: the PRO chain carries more weight mass
  assert!(trees[0].score() >= trees[1].score());
  assert_eq!(trees[0].penn(), "(TOP (S (NP (PRO it)) (VP sleeps)))");
  assert_eq!(trees[1].penn(), "(TOP (S (NP it) (VP sleeps)))");
  for tree in &trees {
    assert_eq!(tree.leaves(), vec!["it", "sleeps"]);
  }
}

#[test]
fn test_unknown_word_wildcard() {
  let g: Grammar = r#"
1 # TOP ::= S
1 # S ::= NP <&> VP
1 # NP ::= <?>
1 # VP ::= sleeps
"#
  .parse()
  .unwrap();
  let parser = Parser::new(g).unwrap();
  let trees = parser.parse_sentence(&["borogove", "sleeps"]).unwrap();
  assert_eq!(trees.len(), 1);
  assert_eq!(trees[0].leaves(), vec!["borogove", "sleeps"]);
}

#[test]
fn test_empty_terminal_at_end_of_input() {
  let g: Grammar = r#"
1 # TOP ::= S
1 # S ::= it <&> E
1 # E ::= <>
"#
  .parse()
  .unwrap();
  let parser = Parser::new(g).unwrap();
  let trees = parser.parse_sentence(&["it"]).unwrap();
  assert_eq!(trees.len(), 1);
  // the empty leaf is zero-width and contributes nothing to the yield
  assert_eq!(trees[0].leaves(), vec!["it"]);
}

#[test]
fn test_left_recursive_grammar_terminates() {
  let g: Grammar = r#"
1 # TOP ::= S
0.5 # S ::= S <&> x
0.5 # S ::= x
"#
  .parse()
  .unwrap();
  let parser = Parser::new(g).unwrap();
  let trees = parser.parse_sentence(&["x", "x", "x"]).unwrap();
  assert_eq!(trees.len(), 1);
  assert_eq!(trees[0].leaves(), vec!["x", "x", "x"]);
}

#[test]
fn test_parse_is_idempotent() {
  let parser = toy_parser();
  let first = parser.parse_sentence(&["it", "sleeps"]).unwrap();
  let second = parser.parse_sentence(&["it", "sleeps"]).unwrap();
  assert_eq!(first, second);
}

#[test]
fn test_cancellation_flag_lifecycle() {
  let parser = toy_parser();
  assert!(!parser.is_cancelled());
  parser.request_cancellation();
  assert!(parser.is_cancelled());
  // a fresh parse clears the flag and runs to completion
  assert!(parser.parse_sentence(&["it", "sleeps"]).is_some());
  assert!(!parser.is_cancelled());
}

#[test]
fn test_prefix_and_sentence_probabilities() {
  let g: Grammar = r#"
1 # TOP ::= S
0.4 # S ::= A
0.6 # S ::= B
1 # A ::= x
1 # B ::= x
"#
  .parse()
  .unwrap();
  let parser = Parser::new(g).unwrap();
  let chart = parser.parse_chart(&["x"]).unwrap();
  // both derivations survive as separate roots
  assert_eq!(chart.roots().len(), 2);
  // each root's inner probability is its derivation's rule-weight product
  let total = chart.sentence_probability();
  assert!((total - (0.4 + 0.6)).abs() < 1e-9, "got {}", total);
  assert!(chart.prefix_probability(1) > 0.0);
}

#[test]
fn test_configuration_errors_fail_construction() {
  let unreachable: Grammar = "TOP ::= S".parse().unwrap();
  assert!(Parser::new(unreachable).is_err());

  let singular: Grammar = "1 # S ::= S\n1 # TOP ::= S".parse().unwrap();
  assert!(Parser::new(singular).is_err());
}

#[test]
fn test_unit_production_cycle_is_a_fatal_error() {
  // weight 0.5 keeps (I - P) invertible, so the singularity check alone
  // would let this grammar through and the completer would loop forever
  let g: Grammar = r#"
1 # TOP ::= A
0.5 # A ::= B
0.5 # B ::= A
0.5 # A ::= x
"#
  .parse()
  .unwrap();
  let err = Parser::new(g).unwrap_err();
  assert!(err.to_string().contains("unit-production cycle"), "{}", err);

  // a unit chain without a cycle is fine
  let chain: Grammar = "1 # TOP ::= A\n1 # A ::= B\n1 # B ::= x".parse().unwrap();
  assert!(Parser::new(chain).is_ok());
}

#[test]
fn test_cancellation_aborts_an_in_flight_parse() {
  use std::thread;

  let g: Grammar = r#"
1 # TOP ::= S
1 # S ::= NP <&> VP
0.7 # NP ::= DET <&> N
0.3 # NP ::= NP <&> PP
1 # PP ::= P <&> NP
0.6 # VP ::= V <&> NP
0.4 # VP ::= VP <&> PP
1 # DET ::= the
1 # N ::= dog
1 # N ::= cat
1 # N ::= telescope
1 # N ::= park
1 # V ::= saw
1 # P ::= with
1 # P ::= in
"#
  .parse()
  .unwrap();
  let parser = Arc::new(Parser::new(g).unwrap());

  // keep re-requesting cancellation so the parse's own flag reset cannot
  // outrun us; every state is a checkpoint, so one store is enough
  let done = Arc::new(AtomicBool::new(false));
  let canceller = {
    let parser = Arc::clone(&parser);
    let done = Arc::clone(&done);
    thread::spawn(move || {
      while !done.load(Ordering::Relaxed) {
        parser.request_cancellation();
      }
    })
  };

  let sentence = format!(
    "the dog saw the cat{}",
    " with the telescope in the park".repeat(4)
  );
  let sentence: Vec<&str> = sentence.split(' ').collect();
  let result = parser.parse_sentence(&sentence);

  done.store(true, Ordering::Relaxed);
  canceller.join().unwrap();

  assert!(result.is_none());
  assert!(parser.is_cancelled());
}
