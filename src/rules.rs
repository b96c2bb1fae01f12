use std::hash::{Hash, Hasher};

/// An interned grammar symbol.
///
/// Nonterminal codes and terminal codes are drawn from disjoint numeric
/// ranges: nonterminals at or above [`Symbol::NONTERMINAL_FLOOR`], terminals
/// below it. Three codes are reserved: the synthetic parse root, the
/// unknown-word wildcard and the empty terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(i32);

impl Symbol {
  /// The synthetic parse-root nonterminal, spelled `TOP` in grammar files.
  pub const PARSE_ROOT: Symbol = Symbol(999_999);

  /// The out-of-vocabulary wildcard terminal, spelled `<?>`.
  pub const UNKNOWN_TERMINAL: Symbol = Symbol(-1);

  /// The zero-width empty terminal, spelled `<>`.
  pub const EMPTY_TERMINAL: Symbol = Symbol(-2);

  pub(crate) const NONTERMINAL_FLOOR: i32 = 500_000;

  pub(crate) fn new(code: i32) -> Self {
    Symbol(code)
  }

  pub fn code(self) -> i32 {
    self.0
  }

  pub fn is_nonterminal(self) -> bool {
    self.0 >= Self::NONTERMINAL_FLOOR
  }

  pub fn is_terminal(self) -> bool {
    !self.is_nonterminal()
  }
}

/// A weighted production.
///
/// `Phrase` rewrites a nonterminal head into a sequence of symbols; the head
/// is `None` only for the synthetic rule that seeds the chart. `Terminal`
/// matches one literal word and is created by the scanner, never stored in
/// the grammar.
///
/// Equality and hashing are structural over head + body (or head + word)
/// only: weight and annotation never participate, so two rules built in
/// different places still compare equal and index into the same chart entry.
#[derive(Debug, Clone)]
pub enum Rule {
  Phrase {
    head: Option<Symbol>,
    body: Vec<Symbol>,
    weight: f64,
    annotation: String,
  },
  Terminal {
    head: Symbol,
    word: String,
    weight: f64,
    annotation: String,
  },
}

impl Rule {
  pub const DEFAULT_WEIGHT: f64 = 0.0;

  pub fn head(&self) -> Option<Symbol> {
    match self {
      Self::Phrase { head, .. } => *head,
      Self::Terminal { head, .. } => Some(*head),
    }
  }

  pub fn weight(&self) -> f64 {
    match self {
      Self::Phrase { weight, .. } | Self::Terminal { weight, .. } => *weight,
    }
  }

  pub fn annotation(&self) -> &str {
    match self {
      Self::Phrase { annotation, .. } | Self::Terminal { annotation, .. } => annotation,
    }
  }

  /// Number of body symbols; a terminal rule spans exactly one word.
  pub fn len(&self) -> usize {
    match self {
      Self::Phrase { body, .. } => body.len(),
      Self::Terminal { .. } => 1,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// The leftmost body symbol, if there is one.
  pub fn leftmost(&self) -> Option<Symbol> {
    match self {
      Self::Phrase { body, .. } => body.first().copied(),
      Self::Terminal { .. } => None,
    }
  }

  pub fn symbol_at(&self, dot: usize) -> Option<Symbol> {
    match self {
      Self::Phrase { body, .. } => body.get(dot).copied(),
      Self::Terminal { .. } => None,
    }
  }
}

impl PartialEq for Rule {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (
        Self::Phrase { head: h1, body: b1, .. },
        Self::Phrase { head: h2, body: b2, .. },
      ) => h1 == h2 && b1 == b2,
      (
        Self::Terminal { head: h1, word: w1, .. },
        Self::Terminal { head: h2, word: w2, .. },
      ) => h1 == h2 && w1 == w2,
      _ => false,
    }
  }
}

impl Eq for Rule {}

impl Hash for Rule {
  fn hash<H: Hasher>(&self, state: &mut H) {
    match self {
      Self::Phrase { head, body, .. } => {
        0u8.hash(state);
        head.hash(state);
        body.hash(state);
      }
      Self::Terminal { head, word, .. } => {
        1u8.hash(state);
        head.hash(state);
        word.hash(state);
      }
    }
  }
}

#[test]
fn test_symbol_ranges() {
  assert!(Symbol::PARSE_ROOT.is_nonterminal());
  assert!(Symbol::UNKNOWN_TERMINAL.is_terminal());
  assert!(Symbol::EMPTY_TERMINAL.is_terminal());
  assert!(Symbol::new(1).is_terminal());
  assert!(Symbol::new(999_998).is_nonterminal());
}

#[test]
fn test_rule_equality_ignores_weight_and_annotation() {
  let a = Rule::Phrase {
    head: Some(Symbol::new(999_998)),
    body: vec![Symbol::new(1), Symbol::new(2)],
    weight: 0.5,
    annotation: "x".to_string(),
  };
  let b = Rule::Phrase {
    head: Some(Symbol::new(999_998)),
    body: vec![Symbol::new(1), Symbol::new(2)],
    weight: 3.0,
    annotation: String::new(),
  };
  assert_eq!(a, b);

  let t = Rule::Terminal {
    head: Symbol::new(1),
    word: "dog".to_string(),
    weight: 0.0,
    annotation: String::new(),
  };
  assert_ne!(a, t);
  assert_eq!(
    t,
    Rule::Terminal {
      head: Symbol::new(1),
      word: "dog".to_string(),
      weight: 9.0,
      annotation: "lex".to_string(),
    }
  );
}
