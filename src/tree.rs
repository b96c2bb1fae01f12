use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
  Phrase,
  Word,
}

/// One node of a derivation tree. A node owns its children outright; trees
/// are acyclic and carry no parent links.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivNode {
  /// Nonterminal name for phrase nodes, surface word for leaves.
  pub label: String,
  pub weight: f64,
  pub annotation: String,
  pub children: Vec<DerivNode>,
  kind: NodeKind,
}

impl DerivNode {
  pub fn phrase(
    label: String,
    weight: f64,
    annotation: String,
    children: Vec<DerivNode>,
  ) -> Self {
    Self {
      label,
      weight,
      annotation,
      children,
      kind: NodeKind::Phrase,
    }
  }

  pub fn word(label: String, weight: f64, annotation: String) -> Self {
    Self {
      label,
      weight,
      annotation,
      children: Vec::new(),
      kind: NodeKind::Word,
    }
  }

  pub fn is_leaf(&self) -> bool {
    self.kind == NodeKind::Word
  }

  /// Own weight plus the summed scores of all descendants.
  pub fn score(&self) -> f64 {
    self.weight + self.children.iter().map(DerivNode::score).sum::<f64>()
  }

  /// Leaf labels in order. Empty-terminal leaves are zero-width and
  /// contribute nothing.
  pub fn leaves(&self) -> Vec<&str> {
    let mut out = Vec::new();
    self.collect_leaves(&mut out);
    out
  }

  fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a str>) {
    if self.is_leaf() {
      if !self.label.is_empty() {
        out.push(&self.label);
      }
    } else {
      for child in &self.children {
        child.collect_leaves(out);
      }
    }
  }

  /// Penn-style bracketing: `(TOP (S (NP it) (VP sleeps)))`.
  pub fn penn(&self) -> String {
    if self.is_leaf() {
      escape_leaf(&self.label)
    } else {
      let mut out = format!("({}", self.label);
      for child in &self.children {
        out.push(' ');
        out.push_str(&child.penn());
      }
      out.push(')');
      out
    }
  }
}

/// Leaf labels escape `"`, `^`, `'` and `$` with a preceding backslash.
fn escape_leaf(label: &str) -> String {
  let mut out = String::with_capacity(label.len());
  for c in label.chars() {
    if matches!(c, '"' | '^' | '\'' | '$') {
      out.push('\\');
    }
    out.push(c);
  }
  out
}

impl fmt::Display for DerivNode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.fmt_indented(f, 0)
  }
}

impl DerivNode {
  fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    write!(f, "{:indent$}", "", indent = depth * 2)?;
    if self.is_leaf() {
      write!(f, "> ")?;
    }
    write!(f, "[{}]({})", self.label, self.weight)?;
    if !self.annotation.is_empty() {
      write!(f, "(@ {})", self.annotation)?;
    }
    writeln!(f)?;
    for child in &self.children {
      child.fmt_indented(f, depth + 1)?;
    }
    Ok(())
  }
}

#[cfg(test)]
fn sample() -> DerivNode {
  DerivNode::phrase(
    "S".to_string(),
    1.0,
    String::new(),
    vec![
      DerivNode::phrase(
        "NP".to_string(),
        0.5,
        "subject".to_string(),
        vec![DerivNode::word("it".to_string(), 0.0, String::new())],
      ),
      DerivNode::phrase(
        "VP".to_string(),
        0.25,
        String::new(),
        vec![DerivNode::word("sleeps".to_string(), 0.0, String::new())],
      ),
    ],
  )
}

#[test]
fn test_score_sums_the_subtree() {
  assert_eq!(sample().score(), 1.75);
}

#[test]
fn test_leaves_in_order() {
  assert_eq!(sample().leaves(), vec!["it", "sleeps"]);
}

#[test]
fn test_penn_bracketing() {
  assert_eq!(sample().penn(), "(S (NP it) (VP sleeps))");
}

#[test]
fn test_penn_escapes_leaf_labels() {
  let node = DerivNode::phrase(
    "N".to_string(),
    0.0,
    String::new(),
    vec![DerivNode::word("it's \"5$\"^2".to_string(), 0.0, String::new())],
  );
  assert_eq!(node.penn(), r#"(N it\'s \"5\$\"\^2)"#);
}

#[test]
fn test_display_indents_and_marks_leaves() {
  let text = sample().to_string();
  let lines: Vec<&str> = text.lines().collect();
  assert_eq!(lines[0], "[S](1)");
  assert_eq!(lines[1], "  [NP](0.5)(@ subject)");
  assert_eq!(lines[2], "    > [it](0)");
  assert_eq!(lines[3], "  [VP](0.25)");
}
