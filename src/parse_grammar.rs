//! Line-oriented parsing of the PEN grammar text format.
//!
//! One rule per line: `weight # HEAD ::= B1 <&> B2 <@> annotation`, where
//! the `weight #` prefix and the `<@> annotation` suffix are optional.
//! Lines starting with `[` are comments, lines starting with `>` include
//! another grammar file (resolved relative to the including file).

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use crate::Err;
use crate::grammar::Grammar;
use crate::rules::Rule;

pub const COMMENT: char = '[';
pub const INCLUDE: char = '>';

/// helper macro for initializing a regex with lazy_static!
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: Regex = Regex::new($pattern).unwrap();
    }
  };
}

impl FromStr for Grammar {
  type Err = Err;

  /// Parses a grammar from a string. Include lines are rejected here
  /// because there is no file to resolve them against; use
  /// [`Grammar::read_from_file`] for grammars split across files.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut grammar = Grammar::new();
    let mut rule_count = 0usize;

    for (lineno, line) in s.lines().enumerate() {
      let line = line.trim();
      if line.is_empty() || line.starts_with(COMMENT) {
        continue;
      }
      if line.starts_with(INCLUDE) {
        return Err(
          format!(
            "line {}: include directives need a file context, use Grammar::read_from_file",
            lineno + 1
          )
          .into(),
        );
      }
      add_rule_line(&mut grammar, line)
        .map_err(|e| -> Err { format!("line {}: {}", lineno + 1, e).into() })?;
      rule_count += 1;
    }

    if rule_count == 0 {
      return Err("empty ruleset".into());
    }
    debug!(rules = rule_count, "parsed grammar");
    Ok(grammar)
  }
}

impl Grammar {
  /// Reads a grammar file, following `>` include lines breadth-first.
  /// Every file is loaded at most once.
  pub fn read_from_file(path: impl AsRef<Path>) -> Result<Grammar, Err> {
    let mut grammar = Grammar::new();
    let mut rule_count = 0usize;
    let first = path.as_ref().to_path_buf();
    let mut included: Vec<PathBuf> = vec![first.clone()];
    let mut queue: VecDeque<PathBuf> = VecDeque::from([first]);

    while let Some(file) = queue.pop_front() {
      let text = fs::read_to_string(&file)
        .map_err(|e| -> Err { format!("{}: {}", file.display(), e).into() })?;

      for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(COMMENT) {
          continue;
        }
        if let Some(name) = line.strip_prefix(INCLUDE) {
          let target = file
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(name.trim());
          if !included.contains(&target) {
            included.push(target.clone());
            queue.push_back(target);
          }
          continue;
        }
        add_rule_line(&mut grammar, line).map_err(|e| -> Err {
          format!("{} line {}: {}", file.display(), lineno + 1, e).into()
        })?;
        rule_count += 1;
      }
    }

    if rule_count == 0 {
      return Err("empty ruleset".into());
    }
    debug!(rules = rule_count, files = included.len(), "read grammar");
    Ok(grammar)
  }
}

/// Splits the optional weight prefix and annotation suffix off a rule line,
/// then interns the head and body symbols.
fn add_rule_line(grammar: &mut Grammar, line: &str) -> Result<(), Err> {
  regex_static!(WEIGHT_AND_ANNOTATION, r"^(.*)#(.*)<@>(.*)$");
  regex_static!(WEIGHT_ONLY, r"^(.*)#(.*)$");
  regex_static!(ANNOTATION_ONLY, r"^(.*)<@>(.*)$");

  let (weight, rule_text, annotation) = if let Some(c) = WEIGHT_AND_ANNOTATION.captures(line) {
    (
      parse_weight(&c[1])?,
      c[2].trim().to_string(),
      c[3].trim().to_string(),
    )
  } else if let Some(c) = WEIGHT_ONLY.captures(line) {
    (parse_weight(&c[1])?, c[2].trim().to_string(), String::new())
  } else if let Some(c) = ANNOTATION_ONLY.captures(line) {
    (
      Rule::DEFAULT_WEIGHT,
      c[1].trim().to_string(),
      c[2].trim().to_string(),
    )
  } else {
    (Rule::DEFAULT_WEIGHT, line.to_string(), String::new())
  };

  regex_static!(SEPARATORS, r"(::=)|(<&>)");
  let mut tokens = SEPARATORS.split(&rule_text).map(str::trim);

  let head_token = tokens
    .next()
    .filter(|t| !t.is_empty())
    .ok_or_else(|| -> Err { format!("missing rule head: {}", line).into() })?;
  let head = grammar.intern(head_token);
  if head.is_terminal() {
    return Err(
      format!(
        "rule head must be a nonterminal (all upper-case): {}",
        head_token
      )
      .into(),
    );
  }

  let body = tokens
    .filter(|t| !t.is_empty())
    .map(|t| grammar.intern(t))
    .collect::<Vec<_>>();

  grammar.add_rule(Arc::new(Rule::Phrase {
    head: Some(head),
    body,
    weight,
    annotation,
  }));
  Ok(())
}

fn parse_weight(text: &str) -> Result<f64, Err> {
  let weight = text
    .trim()
    .parse::<f64>()
    .map_err(|e| -> Err { format!("bad weight {:?}: {}", text.trim(), e).into() })?;
  if weight < 0.0 {
    return Err(format!("negative weight: {}", weight).into());
  }
  Ok(weight)
}

#[test]
fn test_parse_rule_forms() {
  let g: Grammar = r#"
[ comments and blank lines are skipped

TOP ::= S
0.5 # S ::= NP <&> VP <@> clause
S ::= NP <@> bare
0.25 # NP ::= it
VP ::= sleeps
"#
  .parse()
  .unwrap();

  let top = g.rules_with_head(crate::rules::Symbol::PARSE_ROOT);
  assert_eq!(top.len(), 1);
  assert_eq!(top[0].weight(), Rule::DEFAULT_WEIGHT);

  let s = g.terminal_code_for("it"); // "it" interned as a terminal
  assert!(s.is_terminal());

  let s_head = top[0].leftmost().expect("TOP rule has a body");
  let s_rules = g.rules_with_head(s_head);
  assert_eq!(s_rules.len(), 2);
  assert_eq!(s_rules[0].weight(), 0.5);
  assert_eq!(s_rules[0].annotation(), "clause");
  assert_eq!(s_rules[0].len(), 2);
  assert_eq!(s_rules[1].annotation(), "bare");
  assert_eq!(s_rules[1].weight(), Rule::DEFAULT_WEIGHT);
}

#[test]
fn test_parse_rejects_bad_input() {
  assert!("".parse::<Grammar>().is_err());
  assert!("[ only a comment".parse::<Grammar>().is_err());
  assert!("> other.pen".parse::<Grammar>().is_err());
  assert!("nope ::= NP".parse::<Grammar>().is_err());
  assert!("x # S ::= NP".parse::<Grammar>().is_err());
  assert!("-1 # S ::= NP".parse::<Grammar>().is_err());
}

#[test]
fn test_reserved_words_intern_to_reserved_codes() {
  use crate::rules::Symbol;

  let g: Grammar = "TOP ::= <?> <&> <>".parse().unwrap();
  let rule = &g.rules_with_head(Symbol::PARSE_ROOT)[0];
  assert_eq!(rule.leftmost(), Some(Symbol::UNKNOWN_TERMINAL));
  assert_eq!(rule.symbol_at(1), Some(Symbol::EMPTY_TERMINAL));
}
