use std::fmt;

use regex::Regex;

/// Epsilon, only meaningful on a right-hand side: `<a> ::= <nil>` makes
/// `<a>` derive the empty string.
pub const EPSILON_SYMBOL: &str = "<nil>";

/// The entry-point non-terminal every query is parsed against.
pub const ROOT_SYMBOL: &str = "<root>";

lazy_static! {
  static ref VALID_SYMBOL: Regex = Regex::new(r#"^(<\??(?-u:[-\w]+)>|[^<>"?|]+)$"#).unwrap();
  static ref NON_IDENT: Regex = Regex::new("[^_A-Za-z0-9]+").unwrap();
}

/// A grammar symbol, terminal or non-terminal, classified by its surface:
/// `<city>` is a non-terminal, `<?city>` and anything not wrapped in angle
/// brackets is a terminal, `<nil>` is epsilon.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
  pub name: String,
}

impl Symbol {
  pub fn new<S: Into<String>>(name: S) -> Self {
    Self { name: name.into() }
  }

  /// Mints a non-terminal of the reserved `<__…>` form, disjoint from
  /// anything the validity rules let a user write.
  pub fn internal(name: &str) -> Self {
    Self::new(format!("<__{}>", name.trim()))
  }

  pub fn is_valid(&self) -> bool {
    VALID_SYMBOL.is_match(&self.name)
  }

  /// Whether this symbol is terminal, assuming it is valid. `<nil>` and the
  /// `<?…>` placeholder form count as terminal.
  pub fn is_terminal(&self) -> bool {
    !self.name.starts_with('<') || self.name == EPSILON_SYMBOL || self.name.starts_with("<?")
  }

  pub fn is_epsilon(&self) -> bool {
    self.name == EPSILON_SYMBOL
  }

  /// Canonical identifier form used to synthesize fresh internal symbol
  /// names: the bracket-stripped text with every run of non-identifier
  /// characters collapsed to a single `_`.
  ///
  /// ```
  /// use pcfg::rules::Symbol;
  ///
  /// assert_eq!(Symbol::new("<city-name>").text(), "city_name");
  /// assert_eq!(Symbol::new("<?time_s0>").text(), "time_s0");
  /// assert_eq!(Symbol::new("weather").text(), "weather");
  /// ```
  pub fn text(&self) -> String {
    let name = self.name.as_str();
    let inner = if name.starts_with("<?") && name.ends_with('>') {
      &name[2..name.len() - 1]
    } else if name.starts_with('<') && name.ends_with('>') {
      &name[1..name.len() - 1]
    } else {
      name
    };
    NON_IDENT.replace_all(inner, "_").into_owned()
  }
}

impl fmt::Display for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name)
  }
}

/// A weighted production `left ::= right… ; weight`.
///
/// `path` records the non-terminals that were collapsed into this rule
/// during normalization, outermost first: inlining `A ::= B`, `B ::= C`,
/// `C ::= D E` yields `A ::= D E` with path `[B, C]`. Freshly parsed rules
/// have an empty path.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
  pub left: Symbol,
  pub right: Vec<Symbol>,
  pub weight: f64,
  pub path: Vec<Symbol>,
}

impl Rule {
  pub fn new(left: Symbol, right: Vec<Symbol>, weight: f64) -> Self {
    Self {
      left,
      right,
      weight,
      path: Vec::new(),
    }
  }

  pub fn is_unary(&self) -> bool {
    self.right.len() == 1
  }

  pub fn is_binary(&self) -> bool {
    self.right.len() == 2
  }
}

impl fmt::Display for Rule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ::=", self.left)?;
    for symbol in self.right.iter() {
      write!(f, " {}", symbol)?;
    }
    write!(f, " ; {:.3}", self.weight)?;
    if !self.path.is_empty() {
      let path = self
        .path
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(" ");
      write!(f, " ({})", path)?;
    }
    Ok(())
  }
}
