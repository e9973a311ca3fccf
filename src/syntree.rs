use std::fmt;

/// A node of the tree handed back to the caller: a token leaf, or an
/// exported (or root) non-terminal over its ordered children. All other
/// structure of the derivation is flattened away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynTree {
  pub symbol: String,
  pub children: Vec<SynTree>,
}

impl SynTree {
  pub fn leaf<S: Into<String>>(symbol: S) -> Self {
    Self {
      symbol: symbol.into(),
      children: Vec::new(),
    }
  }

  pub fn branch<S: Into<String>>(symbol: S, children: Vec<SynTree>) -> Self {
    Self {
      symbol: symbol.into(),
      children,
    }
  }

  pub fn is_leaf(&self) -> bool {
    self.children.is_empty()
  }

  /// Single-line rendering: `(<root> weather in (<city> seattle))`.
  pub fn compact(&self) -> String {
    if self.is_leaf() {
      self.symbol.clone()
    } else {
      let children = self
        .children
        .iter()
        .map(|c| c.compact())
        .collect::<Vec<_>>()
        .join(" ");
      format!("({} {})", self.symbol, children)
    }
  }

  fn repr(&self, f: &mut fmt::Formatter<'_>, level: usize) -> fmt::Result {
    if level != 0 {
      write!(f, "\n{}", "  ".repeat(level))?;
    }
    if self.is_leaf() {
      write!(f, "{}", self.symbol)
    } else {
      write!(f, "({}", self.symbol)?;
      for child in self.children.iter() {
        write!(f, " ")?;
        child.repr(f, level + 1)?;
      }
      write!(f, ")")
    }
  }
}

/// Leaves print bare; branches wrap in parentheses with every child on its
/// own line, indented two spaces per depth.
impl fmt::Display for SynTree {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.repr(f, 0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display_leaf() {
    assert_eq!(SynTree::leaf("seattle").to_string(), "seattle");
  }

  #[test]
  fn test_display_indents_children() {
    let tree = SynTree::branch(
      "<root>",
      vec![
        SynTree::leaf("weather"),
        SynTree::leaf("in"),
        SynTree::branch("<city>", vec![SynTree::leaf("beijing")]),
      ],
    );
    assert_eq!(
      tree.to_string(),
      "(<root> \n  weather \n  in \n  (<city> \n    beijing))"
    );
  }

  #[test]
  fn test_compact() {
    let tree = SynTree::branch(
      "<root>",
      vec![
        SynTree::leaf("weather"),
        SynTree::branch("<city>", vec![SynTree::leaf("beijing")]),
      ],
    );
    assert_eq!(tree.compact(), "(<root> weather (<city> beijing))");
  }
}
