//! Line-based parsing of grammar files.
//!
//! A grammar is a sequence of rule lines `LEFT ::= ALT | ALT ; WEIGHT`,
//! comment lines starting with `;`, and `;!exports:` directive lines naming
//! the non-terminals that survive into parse trees.

use std::str::FromStr;

use crate::grammar::Grammar;
use crate::rules::{Rule, Symbol};
use crate::Err;

const EXPORTS_DIRECTIVE: &str = ";!exports:";

/// Parses one rule line into the list of weighted rules it declares, one
/// per `|`-separated alternative. A missing `; WEIGHT` suffix defaults to
/// 1.0.
///
/// ```
/// use pcfg::parse_grammar::parse_rule;
///
/// let rules = parse_rule("<w> ::= weather in <city> | <city> weather ; 0.3").unwrap();
/// assert_eq!(rules.len(), 2);
/// assert_eq!(rules[0].weight, 1.0);
/// assert_eq!(rules[1].weight, 0.3);
/// ```
pub fn parse_rule(rule_text: &str) -> Result<Vec<Rule>, Err> {
  let sides: Vec<&str> = rule_text.split("::=").collect();
  if sides.len() != 2 {
    return Err(format!("rule '{}': expected exactly one '::='", rule_text).into());
  }

  let left = Symbol::new(sides[0].trim());
  if left.is_terminal() {
    return Err(format!("rule '{}': terminal symbol on the left-hand side", rule_text).into());
  }

  let mut rules = Vec::new();
  for alternative in sides[1].split('|') {
    let fields: Vec<&str> = alternative.trim().split(';').collect();
    let weight = match fields.len() {
      1 => 1.0,
      2 => {
        let weight_text = fields[1].trim();
        let weight: f64 = weight_text.parse().map_err(|_| -> Err {
          format!("rule '{}': float expected but '{}' found", rule_text, weight_text).into()
        })?;
        if !weight.is_finite() || weight <= 0.0 {
          return Err(
            format!("rule '{}': weight must be a positive float, got '{}'", rule_text, weight_text)
              .into(),
          );
        }
        weight
      }
      _ => return Err(format!("rule '{}': unexpected ';'", rule_text).into()),
    };

    let mut right = Vec::new();
    for name in fields[0].split_whitespace() {
      let symbol = Symbol::new(name);
      if !symbol.is_valid() {
        return Err(format!("rule '{}': unexpected symbol '{}'", rule_text, name).into());
      }
      right.push(symbol);
    }
    if right.is_empty() {
      return Err(format!("rule '{}': empty alternative", rule_text).into());
    }

    rules.push(Rule::new(left.clone(), right, weight));
  }

  Ok(rules)
}

/// Parses a whole grammar: every non-comment line is a rule line, and
/// `;!exports:` lines accumulate the export set.
pub fn parse_grammar(grammar_text: &str) -> Result<Grammar, Err> {
  let mut grammar = Grammar::new();
  for line in grammar_text.lines() {
    let line = line.trim();

    if let Some(names) = line.strip_prefix(EXPORTS_DIRECTIVE) {
      for name in names.split_whitespace() {
        let symbol = Symbol::new(name);
        if symbol.is_terminal() || !symbol.is_valid() {
          return Err(format!("exports: '{}' is not a valid non-terminal", name).into());
        }
        grammar.exports.insert(symbol);
      }
      continue;
    }

    if line.is_empty() || line.starts_with(';') {
      continue;
    }

    grammar.rules.extend(parse_rule(line)?);
  }
  Ok(grammar)
}

impl FromStr for Grammar {
  type Err = Err;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    parse_grammar(s)
  }
}
