//! The frozen, integer-interned form of a normalized grammar that the
//! chart parser runs against.

use std::collections::{HashMap, HashSet};

use crate::rules::{Rule, Symbol};

/// Dense id assigned to a symbol in first-seen order.
pub type SymbolId = usize;

/// The part shared by binary and terminal rules: the producing symbol, the
/// rule probability, and the unit chain collapsed into the rule.
#[derive(Debug, Clone, PartialEq)]
pub struct CnfRuleCore {
  pub source: SymbolId,
  pub probability: f64,
  pub path: Vec<SymbolId>,
}

/// A binary rule `source ::= first second`, stored under its two children.
#[derive(Debug, Clone, PartialEq)]
pub struct CnfRule {
  pub core: CnfRuleCore,
  pub first: SymbolId,
  pub second: SymbolId,
}

/// A terminal rule `source ::= terminal`, stored under its terminal text.
#[derive(Debug, Clone, PartialEq)]
pub struct CnfTerminalRule {
  pub core: CnfRuleCore,
  pub terminal: String,
}

/// A grammar in Chomsky normal form, indexed for the two lookups parsing
/// needs: token text to terminal rules, and child pair `(B, C)` to the
/// binary rules `A ::= B C`.
#[derive(Debug, Clone, Default)]
pub struct CnfGrammar {
  symbol_ids: HashMap<String, SymbolId>,
  symbols: Vec<String>,
  terminal_rules: HashMap<String, Vec<CnfTerminalRule>>,
  rules: HashMap<SymbolId, HashMap<SymbolId, Vec<CnfRule>>>,
  exports: HashSet<SymbolId>,
}

impl CnfGrammar {
  pub fn new() -> Self {
    Default::default()
  }

  fn intern(&mut self, symbol: &Symbol) -> SymbolId {
    if let Some(&id) = self.symbol_ids.get(&symbol.name) {
      return id;
    }
    let id = self.symbols.len();
    self.symbol_ids.insert(symbol.name.clone(), id);
    self.symbols.push(symbol.name.clone());
    id
  }

  /// Adds a rule, which must already be in normal form: binary over
  /// non-terminals, or unary over a terminal.
  pub fn add_rule(&mut self, rule: &Rule) {
    assert!(
      rule.is_binary() || (rule.is_unary() && rule.right[0].is_terminal()),
      "rule not in normal form: {}",
      rule
    );
    assert!(
      rule.is_unary() || (!rule.right[0].is_terminal() && !rule.right[1].is_terminal()),
      "rule not in normal form: {}",
      rule
    );

    let source = self.intern(&rule.left);
    let path = rule.path.iter().map(|s| self.intern(s)).collect();
    let core = CnfRuleCore {
      source,
      probability: rule.weight,
      path,
    };

    if rule.is_unary() {
      let terminal = rule.right[0].name.clone();
      self
        .terminal_rules
        .entry(terminal.clone())
        .or_insert_with(Vec::new)
        .push(CnfTerminalRule { core, terminal });
    } else {
      let first = self.intern(&rule.right[0]);
      let second = self.intern(&rule.right[1]);
      self
        .rules
        .entry(first)
        .or_insert_with(HashMap::new)
        .entry(second)
        .or_insert_with(Vec::new)
        .push(CnfRule { core, first, second });
    }
  }

  pub fn add_export(&mut self, symbol: &Symbol) {
    let id = self.intern(symbol);
    self.exports.insert(id);
  }

  pub fn symbol_id(&self, name: &str) -> Option<SymbolId> {
    self.symbol_ids.get(name).copied()
  }

  pub fn symbol_name(&self, id: SymbolId) -> &str {
    &self.symbols[id]
  }

  pub fn is_export(&self, id: SymbolId) -> bool {
    self.exports.contains(&id)
  }

  /// Terminal rules deriving exactly this token, if any.
  pub fn terminal_rules(&self, terminal: &str) -> Option<&[CnfTerminalRule]> {
    self.terminal_rules.get(terminal).map(|rules| rules.as_slice())
  }

  /// Binary rules grouped by second child, for a fixed first child.
  pub fn rules_with_first(&self, first: SymbolId) -> Option<&HashMap<SymbolId, Vec<CnfRule>>> {
    self.rules.get(&first)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn symbol(name: &str) -> Symbol {
    Symbol::new(name)
  }

  #[test]
  fn test_interning_is_first_seen_order() {
    let mut cnf = CnfGrammar::new();
    cnf.add_rule(&Rule::new(symbol("<a>"), vec![symbol("<b>"), symbol("<c>")], 1.0));
    cnf.add_rule(&Rule::new(symbol("<b>"), vec![symbol("b")], 1.0));

    assert_eq!(cnf.symbol_id("<a>"), Some(0));
    assert_eq!(cnf.symbol_id("<b>"), Some(1));
    assert_eq!(cnf.symbol_id("<c>"), Some(2));
    assert_eq!(cnf.symbol_id("<d>"), None);
    assert_eq!(cnf.symbol_name(2), "<c>");
  }

  #[test]
  fn test_rule_lookups() {
    let mut cnf = CnfGrammar::new();
    let mut rule = Rule::new(symbol("<a>"), vec![symbol("<b>"), symbol("<c>")], 0.5);
    rule.path = vec![symbol("<p>")];
    cnf.add_rule(&rule);
    cnf.add_rule(&Rule::new(symbol("<b>"), vec![symbol("b")], 1.0));
    cnf.add_export(&symbol("<a>"));

    let b = cnf.symbol_id("<b>").unwrap();
    let c = cnf.symbol_id("<c>").unwrap();
    let binary = &cnf.rules_with_first(b).unwrap()[&c];
    assert_eq!(binary.len(), 1);
    assert_eq!(binary[0].core.source, cnf.symbol_id("<a>").unwrap());
    assert_eq!(binary[0].core.probability, 0.5);
    assert_eq!(binary[0].core.path, vec![cnf.symbol_id("<p>").unwrap()]);

    let terminal = cnf.terminal_rules("b").unwrap();
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].core.source, b);
    assert!(cnf.terminal_rules("missing").is_none());

    assert!(cnf.is_export(cnf.symbol_id("<a>").unwrap()));
    assert!(!cnf.is_export(b));
  }

  #[test]
  #[should_panic(expected = "not in normal form")]
  fn test_rejects_unit_nonterminal_rule() {
    let mut cnf = CnfGrammar::new();
    cnf.add_rule(&Rule::new(symbol("<a>"), vec![symbol("<b>")], 1.0));
  }
}
