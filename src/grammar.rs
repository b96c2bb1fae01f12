use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::Err;
use crate::rules::{Rule, Symbol};

/// Spelling of the parse-root nonterminal in grammar files.
pub const START_SYMBOL: &str = "TOP";

/// Spelling of the out-of-vocabulary wildcard terminal.
pub const UNKNOWN_WORD: &str = "<?>";

/// Spelling of the empty terminal.
pub const EMPTY_WORD: &str = "<>";

/// A resolved, in-memory weighted grammar.
///
/// Built once by the grammar-text loader ([`crate::parse_grammar`]) and
/// immutable afterwards: no mutation methods are exposed post-build, so one
/// instance can be read-shared by concurrent parse requests.
#[derive(Debug)]
pub struct Grammar {
  nonterminals: HashMap<String, Symbol>,
  terminals: HashMap<String, Symbol>,
  names: HashMap<Symbol, String>,
  rules: HashMap<Symbol, Vec<Arc<Rule>>>,
  containing: HashMap<Symbol, Vec<Arc<Rule>>>,
  next_nonterminal: i32,
  next_terminal: i32,
}

impl Grammar {
  pub(crate) fn new() -> Self {
    let mut g = Self {
      nonterminals: HashMap::new(),
      terminals: HashMap::new(),
      names: HashMap::new(),
      rules: HashMap::new(),
      containing: HashMap::new(),
      next_nonterminal: Symbol::PARSE_ROOT.code() - 1,
      next_terminal: 1,
    };
    g.nonterminals
      .insert(START_SYMBOL.to_string(), Symbol::PARSE_ROOT);
    g.names
      .insert(Symbol::PARSE_ROOT, START_SYMBOL.to_string());
    g.terminals
      .insert(UNKNOWN_WORD.to_string(), Symbol::UNKNOWN_TERMINAL);
    g.names
      .insert(Symbol::UNKNOWN_TERMINAL, UNKNOWN_WORD.to_string());
    g.terminals
      .insert(EMPTY_WORD.to_string(), Symbol::EMPTY_TERMINAL);
    g.names
      .insert(Symbol::EMPTY_TERMINAL, EMPTY_WORD.to_string());
    g
  }

  /// Interns a surface token, assigning a fresh code on first sight.
  /// Fully upper-case tokens are nonterminals, everything else a terminal.
  pub(crate) fn intern(&mut self, token: &str) -> Symbol {
    let is_nonterminal = token
      .chars()
      .next()
      .is_some_and(|c| c.is_uppercase())
      && token == token.to_uppercase();

    if is_nonterminal {
      if let Some(&symbol) = self.nonterminals.get(token) {
        return symbol;
      }
      let symbol = Symbol::new(self.next_nonterminal);
      self.next_nonterminal -= 1;
      self.nonterminals.insert(token.to_string(), symbol);
      self.names.insert(symbol, token.to_string());
      symbol
    } else {
      if let Some(&symbol) = self.terminals.get(token) {
        return symbol;
      }
      let symbol = Symbol::new(self.next_terminal);
      self.next_terminal += 1;
      self.terminals.insert(token.to_string(), symbol);
      self.names.insert(symbol, token.to_string());
      symbol
    }
  }

  /// Indexes a rule under its head, and under every body symbol for the
  /// inverted lookup.
  pub(crate) fn add_rule(&mut self, rule: Arc<Rule>) {
    if let Some(head) = rule.head() {
      self.rules.entry(head).or_default().push(rule.clone());
    }
    if let Rule::Phrase { body, .. } = rule.as_ref() {
      for &symbol in body {
        self
          .containing
          .entry(symbol)
          .or_default()
          .push(rule.clone());
      }
    }
  }

  /// All productions headed by `head`; empty when there are none.
  pub fn rules_with_head(&self, head: Symbol) -> &[Arc<Rule>] {
    self.rules.get(&head).map(Vec::as_slice).unwrap_or(&[])
  }

  /// All productions whose body mentions `symbol`; empty when there are none.
  pub fn rules_containing(&self, symbol: Symbol) -> &[Arc<Rule>] {
    self
      .containing
      .get(&symbol)
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }

  /// Terminal code for a surface word. Out-of-vocabulary words resolve to
  /// the reserved unknown code; this lookup never fails.
  pub fn terminal_code_for(&self, word: &str) -> Symbol {
    self
      .terminals
      .get(word)
      .copied()
      .unwrap_or(Symbol::UNKNOWN_TERMINAL)
  }

  /// Inverse lookup across both symbol tables. `None` means the code was
  /// never interned, which is a caller error rather than a grammar error.
  pub fn string_for(&self, symbol: Symbol) -> Option<&str> {
    self.names.get(&symbol).map(String::as_str)
  }

  pub fn nonterminals(&self) -> impl Iterator<Item = Symbol> + '_ {
    self.nonterminals.values().copied()
  }

  /// Checks that every nonterminal reachable from the parse root has at
  /// least one production. Runs once before parsing; lookups during the
  /// parse itself never fail.
  pub fn validate(&self) -> Result<(), Err> {
    let mut visited: HashSet<Symbol> = HashSet::new();
    let mut pending = vec![Symbol::PARSE_ROOT];

    while let Some(symbol) = pending.pop() {
      if !visited.insert(symbol) {
        continue;
      }
      let rules = self.rules_with_head(symbol);
      if rules.is_empty() {
        return Err(
          format!(
            "no production for nonterminal {} (code {}) reachable from {}",
            self.string_for(symbol).unwrap_or("?"),
            symbol.code(),
            START_SYMBOL
          )
          .into(),
        );
      }
      for rule in rules {
        if let Rule::Phrase { body, .. } = rule.as_ref() {
          for &s in body {
            if s.is_nonterminal() {
              pending.push(s);
            }
          }
        }
      }
    }

    debug!(nonterminals = visited.len(), "grammar validated");
    Ok(())
  }

  /// Renders a rule with symbol names resolved.
  pub fn rule_to_string(&self, rule: &Rule) -> String {
    let name = |s: Symbol| self.string_for(s).unwrap_or("?").to_string();
    match rule {
      Rule::Phrase { head, body, .. } => {
        let head = head.map(name).unwrap_or_else(|| "?".to_string());
        let body = body
          .iter()
          .map(|&s| name(s))
          .collect::<Vec<_>>()
          .join(" <&> ");
        format!("{} ::= {}", head, body)
      }
      Rule::Terminal { head, word, .. } => {
        format!("{} ::= {}", name(*head), word)
      }
    }
  }
}

impl fmt::Display for Grammar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[** nonterminals:")?;
    let mut names: Vec<&str> = self.nonterminals.keys().map(String::as_str).collect();
    names.sort_unstable();
    for name in names {
      write!(f, " {}", name)?;
    }
    writeln!(f)?;

    let mut heads: Vec<Symbol> = self.rules.keys().copied().collect();
    heads.sort_unstable();
    for head in heads {
      for rule in self.rules_with_head(head) {
        writeln!(f, "{}", self.rule_to_string(rule))?;
      }
    }
    Ok(())
  }
}

#[cfg(test)]
fn test_grammar() -> Grammar {
  r#"
[ toy grammar
1 # TOP ::= S
1 # S ::= NP <&> VP
1 # NP ::= it
1 # VP ::= sleeps
"#
  .parse()
  .unwrap()
}

#[test]
fn test_interning_is_stable_and_disjoint() {
  let mut g = Grammar::new();
  let np1 = g.intern("NP");
  let np2 = g.intern("NP");
  assert_eq!(np1, np2);
  assert!(np1.is_nonterminal());

  let dog = g.intern("dog");
  assert_eq!(dog, g.intern("dog"));
  assert!(dog.is_terminal());
  assert_ne!(np1, g.intern("VP"));

  assert_eq!(g.intern(START_SYMBOL), Symbol::PARSE_ROOT);
  assert_eq!(g.string_for(np1), Some("NP"));
  assert_eq!(g.string_for(dog), Some("dog"));
  assert_eq!(g.string_for(Symbol::new(424_242)), None);
}

#[test]
fn test_unknown_word_resolves_to_wildcard() {
  let g = test_grammar();
  assert_eq!(g.terminal_code_for("xyzzy"), Symbol::UNKNOWN_TERMINAL);
  assert!(g.terminal_code_for("it").is_terminal());
  assert_ne!(g.terminal_code_for("it"), Symbol::UNKNOWN_TERMINAL);
}

#[test]
fn test_inverted_index() {
  let g = test_grammar();
  let np = g.terminal_code_for("it");
  // "it" occurs in exactly one body, NP ::= it
  let rules = g.rules_containing(np);
  assert_eq!(rules.len(), 1);
  assert_eq!(g.rule_to_string(&rules[0]), "NP ::= it");
  // nothing mentions the wildcard here
  assert!(g.rules_containing(Symbol::UNKNOWN_TERMINAL).is_empty());
}

#[test]
fn test_validate_accepts_complete_grammar() {
  assert!(test_grammar().validate().is_ok());
}

#[test]
fn test_validate_rejects_missing_production() {
  let g: Grammar = "TOP ::= S".parse().unwrap();
  let err = g.validate().unwrap_err();
  assert!(err.to_string().contains("no production"), "{}", err);
}
