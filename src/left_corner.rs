//! Probabilistic left-corner relations.
//!
//! For nonterminals X and Y, the one-step relation P[X][Y] sums the weights
//! of productions `X ::= Y mu`. Its transitive closure R = (I - P)^-1 gives
//! the probability that X's leftmost derivation bottoms out through Y, and
//! seeds predictor forward probabilities without unrolling left recursion.
//! A parallel relation restricted to unit productions (`X ::= Y`) is kept
//! alongside.

use std::collections::HashMap;

use tracing::debug;

use crate::Err;
use crate::grammar::Grammar;
use crate::rules::{Rule, Symbol};

/// Small dense square matrix, row-major.
#[derive(Debug, Clone)]
struct Matrix {
  n: usize,
  data: Vec<f64>,
}

impl Matrix {
  fn zero(n: usize) -> Self {
    Self {
      n,
      data: vec![0.0; n * n],
    }
  }

  fn identity(n: usize) -> Self {
    let mut m = Self::zero(n);
    for i in 0..n {
      m.set(i, i, 1.0);
    }
    m
  }

  fn get(&self, row: usize, col: usize) -> f64 {
    self.data[row * self.n + col]
  }

  fn set(&mut self, row: usize, col: usize, value: f64) {
    self.data[row * self.n + col] = value;
  }

  fn add(&mut self, row: usize, col: usize, value: f64) {
    self.data[row * self.n + col] += value;
  }

  fn minus(&self, other: &Matrix) -> Matrix {
    let data = self
      .data
      .iter()
      .zip(other.data.iter())
      .map(|(a, b)| a - b)
      .collect();
    Matrix { n: self.n, data }
  }

  fn swap_rows(&mut self, a: usize, b: usize) {
    for col in 0..self.n {
      self.data.swap(a * self.n + col, b * self.n + col);
    }
  }

  /// Gauss-Jordan elimination with partial pivoting.
  /// Returns `None` for a singular matrix.
  fn inverse(&self) -> Option<Matrix> {
    const EPSILON: f64 = 1e-12;

    let n = self.n;
    let mut a = self.clone();
    let mut inv = Matrix::identity(n);

    for col in 0..n {
      let mut pivot = col;
      for row in col + 1..n {
        if a.get(row, col).abs() > a.get(pivot, col).abs() {
          pivot = row;
        }
      }
      if a.get(pivot, col).abs() < EPSILON {
        return None;
      }
      if pivot != col {
        a.swap_rows(pivot, col);
        inv.swap_rows(pivot, col);
      }

      let divisor = a.get(col, col);
      for j in 0..n {
        a.set(col, j, a.get(col, j) / divisor);
        inv.set(col, j, inv.get(col, j) / divisor);
      }

      for row in 0..n {
        if row == col {
          continue;
        }
        let factor = a.get(row, col);
        if factor == 0.0 {
          continue;
        }
        for j in 0..n {
          a.set(row, j, a.get(row, j) - factor * a.get(col, j));
          inv.set(row, j, inv.get(row, j) - factor * inv.get(col, j));
        }
      }
    }

    Some(inv)
  }
}

/// Point lookups into the transitive left-corner and unit-production
/// closures. Built once per grammar, immutable afterwards.
#[derive(Debug)]
pub struct LeftCornerRelation {
  left_corner: HashMap<(Symbol, Symbol), f64>,
  unit: HashMap<(Symbol, Symbol), f64>,
}

impl LeftCornerRelation {
  /// Accumulates both one-step matrices over the grammar's nonterminals,
  /// inverts `(I - P)` for each, and materializes them sparsely. A singular
  /// matrix is a fatal grammar-configuration error.
  pub fn build(grammar: &Grammar) -> Result<Self, Err> {
    // sorted so symbol-table iteration order cannot leak into the results
    let mut nonterminals: Vec<Symbol> = grammar.nonterminals().collect();
    nonterminals.sort_unstable();
    let index: HashMap<Symbol, usize> = nonterminals
      .iter()
      .enumerate()
      .map(|(i, &s)| (s, i))
      .collect();

    let n = nonterminals.len();
    let mut one_step = Matrix::zero(n);
    let mut one_step_unit = Matrix::zero(n);

    for (i, &head) in nonterminals.iter().enumerate() {
      for rule in grammar.rules_with_head(head) {
        let Rule::Phrase { body, weight, .. } = rule.as_ref() else {
          continue;
        };
        let Some(&leftmost) = body.first() else {
          continue;
        };
        if let Some(&j) = index.get(&leftmost) {
          one_step.add(i, j, *weight);
          if body.len() == 1 {
            one_step_unit.add(i, j, *weight);
          }
        }
      }
    }

    let left_corner = Self::closure(&one_step, &nonterminals).ok_or_else(|| -> Err {
      "left-corner matrix is singular: (I - P) has no inverse".into()
    })?;
    let unit = Self::closure(&one_step_unit, &nonterminals).ok_or_else(|| -> Err {
      "unit-production matrix is singular: (I - P) has no inverse".into()
    })?;

    debug!(
      nonterminals = n,
      pairs = left_corner.len(),
      unit_pairs = unit.len(),
      "built left-corner closure"
    );
    Ok(Self { left_corner, unit })
  }

  /// R = (I - P)^-1, with zero entries dropped. The sparse map is a
  /// materialization for lookup speed, not a semantic step.
  fn closure(
    one_step: &Matrix,
    nonterminals: &[Symbol],
  ) -> Option<HashMap<(Symbol, Symbol), f64>> {
    let r = Matrix::identity(one_step.n).minus(one_step).inverse()?;
    let mut map = HashMap::new();
    for (i, &lhs) in nonterminals.iter().enumerate() {
      for (j, &rhs) in nonterminals.iter().enumerate() {
        let probability = r.get(i, j);
        if probability != 0.0 {
          map.insert((lhs, rhs), probability);
        }
      }
    }
    Some(map)
  }

  /// Transitive left-corner probability; 0 when no relation exists, which
  /// is the common case for most pairs.
  pub fn left_corner_relation(&self, lhs: Symbol, rhs: Symbol) -> f64 {
    self.left_corner.get(&(lhs, rhs)).copied().unwrap_or(0.0)
  }

  /// Same contract, restricted to unit productions.
  pub fn unit_relation(&self, lhs: Symbol, rhs: Symbol) -> f64 {
    self.unit.get(&(lhs, rhs)).copied().unwrap_or(0.0)
  }
}

#[cfg(test)]
fn symbols(g: &Grammar, names: &[&str]) -> Vec<Symbol> {
  let mut out = Vec::new();
  for name in names {
    let symbol = g
      .nonterminals()
      .find(|&s| g.string_for(s) == Some(*name))
      .unwrap();
    out.push(symbol);
  }
  out
}

#[cfg(test)]
fn assert_close(actual: f64, expected: f64) {
  assert!(
    (actual - expected).abs() < 1e-9,
    "expected {}, got {}",
    expected,
    actual
  );
}

#[test]
fn test_no_left_recursion_means_no_amplification() {
  let g: Grammar = r#"
0.1 # TOP ::= S
0.5 # S ::= NP <&> VP
0.2 # NP ::= it
0.3 # VP ::= sleeps
"#
  .parse()
  .unwrap();
  let lc = LeftCornerRelation::build(&g).unwrap();
  let syms = symbols(&g, &["TOP", "S", "NP"]);
  let (top, s, np) = (syms[0], syms[1], syms[2]);

  // closure of a DAG is the finite sum I + P + P^2 + ...
  assert_close(lc.left_corner_relation(top, top), 1.0);
  assert_close(lc.left_corner_relation(top, s), 0.1);
  assert_close(lc.left_corner_relation(s, np), 0.5);
  assert_close(lc.left_corner_relation(top, np), 0.1 * 0.5);
  // NP's left corner is the terminal "it", outside the relation
  assert_close(lc.left_corner_relation(np, s), 0.0);
}

#[test]
fn test_left_recursion_accumulates_geometrically() {
  let g: Grammar = r#"
1 # TOP ::= S
0.5 # S ::= S <&> x
0.5 # S ::= x
"#
  .parse()
  .unwrap();
  let lc = LeftCornerRelation::build(&g).unwrap();
  let syms = symbols(&g, &["TOP", "S"]);
  let (top, s) = (syms[0], syms[1]);

  // R[S][S] = 1 / (1 - 0.5)
  assert_close(lc.left_corner_relation(s, s), 2.0);
  assert_close(lc.left_corner_relation(top, s), 2.0);
}

#[test]
fn test_unit_relation_only_counts_unit_productions() {
  let g: Grammar = r#"
1 # TOP ::= S
0.4 # S ::= NP
0.6 # S ::= NP <&> VP
1 # NP ::= it
1 # VP ::= sleeps
"#
  .parse()
  .unwrap();
  let lc = LeftCornerRelation::build(&g).unwrap();
  let syms = symbols(&g, &["S", "NP"]);
  let (s, np) = (syms[0], syms[1]);

  assert_close(lc.left_corner_relation(s, np), 1.0);
  assert_close(lc.unit_relation(s, np), 0.4);
}

#[test]
fn test_singular_matrix_is_a_fatal_error() {
  // S ::= S with weight 1 zeroes the (I - P) row for S
  let g: Grammar = "1 # S ::= S\nTOP ::= S".parse().unwrap();
  let err = LeftCornerRelation::build(&g).unwrap_err();
  assert!(err.to_string().contains("singular"), "{}", err);
}
