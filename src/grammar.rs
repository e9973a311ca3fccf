//! The mutable rule store and its rewrite into Chomsky normal form.
//!
//! `convert_to_cnf` reworks the grammar in place through six stages:
//! weight normalization, terminal extraction, binarization, null-rule
//! elimination, strong-component collapse, and unit-rule inlining. The
//! stages keep derivation probabilities intact and record collapsed unit
//! chains on each rule's `path` so parse trees can be rebuilt afterwards.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::mem;

use crate::cnf::CnfGrammar;
use crate::digraph::DirectedGraph;
use crate::rules::{Rule, Symbol};

/// An ordered list of weighted rules plus the set of exported
/// non-terminals.
#[derive(Debug, Clone, Default)]
pub struct Grammar {
  pub rules: Vec<Rule>,
  pub exports: HashSet<Symbol>,
}

impl Grammar {
  pub fn new() -> Self {
    Default::default()
  }

  /// Runs the full normalization pipeline and freezes the result into an
  /// indexed CNF grammar. The grammar itself is left in its post-pipeline
  /// state.
  pub fn convert_to_cnf(&mut self) -> CnfGrammar {
    debug!("original grammar:\n{}", self);
    self.normalize_weight();
    self.add_term_variables();
    debug!("after terminal extraction:\n{}", self);
    self.reduce_higher_rules();
    debug!("after binarization:\n{}", self);
    self.remove_null_rules();
    debug!("after null elimination:\n{}", self);
    self.remove_strong_components();
    debug!("after strong-component collapse:\n{}", self);
    self.remove_unit_rules();
    debug!("after unit-rule elimination:\n{}", self);

    let mut cnf = CnfGrammar::new();
    for rule in self.rules.iter() {
      cnf.add_rule(rule);
    }
    for export in self.exports.iter() {
      cnf.add_export(export);
    }
    cnf
  }

  /// Scales weights so that, for every left-hand symbol, the weights of its
  /// rules sum to one.
  fn normalize_weight(&mut self) {
    let mut totals: HashMap<Symbol, f64> = HashMap::new();
    for rule in self.rules.iter() {
      *totals.entry(rule.left.clone()).or_insert(0.0) += rule.weight;
    }
    for rule in self.rules.iter_mut() {
      rule.weight /= totals[&rule.left];
    }
  }

  /// Replaces every terminal inside a multi-symbol right-hand side with a
  /// fresh non-terminal deriving it, so terminals only remain in unary
  /// rules. A terminal seen twice reuses its replacement.
  fn add_term_variables(&mut self) {
    let mut term_count = 0;
    let mut replacements: Vec<(Symbol, Symbol)> = Vec::new();
    let mut by_terminal: HashMap<Symbol, usize> = HashMap::new();

    for rule in self.rules.iter_mut() {
      if rule.is_unary() {
        // a unary terminal rule is already in its final form
        continue;
      }
      for symbol in rule.right.iter_mut() {
        if !symbol.is_terminal() {
          continue;
        }
        let fresh = match by_terminal.get(symbol) {
          Some(&i) => replacements[i].1.clone(),
          None => {
            let fresh = Symbol::internal(&format!("t_{}_{}", symbol.text(), term_count));
            by_terminal.insert(symbol.clone(), replacements.len());
            replacements.push((symbol.clone(), fresh.clone()));
            fresh
          }
        };
        *symbol = fresh;
        term_count += 1;
      }
    }

    for (terminal, fresh) in replacements {
      self.rules.push(Rule::new(fresh, vec![terminal], 1.0));
    }
  }

  /// Splits every rule of length three or more into a right-deep chain of
  /// binary rules. The whole probability stays on the first link; the
  /// intermediate links are deterministic.
  fn reduce_higher_rules(&mut self) {
    let mut binary = Vec::new();
    let mut count = 1;

    for rule in mem::take(&mut self.rules) {
      if rule.is_unary() || rule.is_binary() {
        binary.push(rule);
        continue;
      }

      let text = rule.left.text();
      let k = rule.right.len();

      let x = Symbol::internal(&format!("x_{}_{}", text, count));
      binary.push(Rule::new(
        rule.left.clone(),
        vec![rule.right[0].clone(), x],
        rule.weight,
      ));

      for i in 1..k - 2 {
        let x = Symbol::internal(&format!("x_{}_{}", text, count));
        let next = Symbol::internal(&format!("x_{}_{}", text, count + 1));
        count += 1;
        binary.push(Rule::new(x, vec![rule.right[i].clone(), next], 1.0));
      }

      let x = Symbol::internal(&format!("x_{}_{}", text, count));
      count += 1;
      binary.push(Rule::new(
        x,
        vec![rule.right[k - 2].clone(), rule.right[k - 1].clone()],
        1.0,
      ));
    }

    self.rules = binary;
  }

  /// Indices of the rules each non-terminal occurs in on the right-hand
  /// side. A binary rule with twice the same child is listed twice, so
  /// occurrence counts stay meaningful.
  fn occurs_right(&self) -> HashMap<Symbol, Vec<usize>> {
    let mut occurs: HashMap<Symbol, Vec<usize>> = HashMap::new();
    for (i, rule) in self.rules.iter().enumerate() {
      if rule.is_binary() {
        occurs.entry(rule.right[0].clone()).or_insert_with(Vec::new).push(i);
        occurs.entry(rule.right[1].clone()).or_insert_with(Vec::new).push(i);
      } else if rule.is_unary() && !rule.right[0].is_terminal() {
        occurs.entry(rule.right[0].clone()).or_insert_with(Vec::new).push(i);
      }
    }
    occurs
  }

  /// Indices of the rules grouped by left-hand symbol.
  fn occurs_left(&self) -> HashMap<Symbol, Vec<usize>> {
    let mut occurs: HashMap<Symbol, Vec<usize>> = HashMap::new();
    for (i, rule) in self.rules.iter().enumerate() {
      occurs.entry(rule.left.clone()).or_insert_with(Vec::new).push(i);
    }
    occurs
  }

  /// The probability of deriving the empty string from each nullable
  /// symbol, by worklist propagation from the `A ::= <nil>` rules. Each
  /// rule contributes to its left-hand symbol at most once.
  fn find_nullables(&self) -> HashMap<Symbol, f64> {
    let occurs = self.occurs_right();
    let mut nullable: HashMap<Symbol, f64> = HashMap::new();
    let mut todo: VecDeque<Symbol> = VecDeque::new();

    for rule in self.rules.iter() {
      if rule.is_unary() && rule.right[0].is_epsilon() {
        *nullable.entry(rule.left.clone()).or_insert(0.0) += rule.weight;
        todo.push_back(rule.left.clone());
      }
    }

    let mut contributed: HashSet<usize> = HashSet::new();
    while let Some(b) = todo.pop_front() {
      let indices = match occurs.get(&b) {
        Some(indices) => indices,
        None => continue,
      };
      for &i in indices.iter() {
        if contributed.contains(&i) {
          continue;
        }
        let rule = &self.rules[i];
        let mut null_prob = rule.weight;
        for symbol in rule.right.iter() {
          null_prob *= nullable.get(symbol).copied().unwrap_or(0.0);
        }
        if null_prob > 0.0 {
          *nullable.entry(rule.left.clone()).or_insert(0.0) += null_prob;
          contributed.insert(i);
          todo.push_back(rule.left.clone());
        }
      }
    }

    nullable
  }

  /// Removes `A ::= <nil>` rules. For every binary rule with a nullable
  /// child, the null mass moves onto a shortened unary variant, merging
  /// into an existing `A ::= B` rule when one is present.
  fn remove_null_rules(&mut self) {
    let nullables = self.find_nullables();

    let mut single_rules: HashMap<(Symbol, Symbol), usize> = HashMap::new();
    for (i, rule) in self.rules.iter().enumerate() {
      if rule.is_unary() {
        single_rules.insert((rule.left.clone(), rule.right[0].clone()), i);
      }
    }

    let mut to_add: Vec<(Symbol, Symbol, f64)> = Vec::new();
    for rule in self.rules.iter_mut() {
      if !rule.is_binary() {
        continue;
      }
      let probability = rule.weight;
      let b = rule.right[0].clone();
      let c = rule.right[1].clone();
      if let Some(&null_b) = nullables.get(&b) {
        if null_b > 0.0 {
          to_add.push((rule.left.clone(), c.clone(), probability * null_b));
          rule.weight -= probability * null_b;
        }
      }
      if let Some(&null_c) = nullables.get(&c) {
        if null_c > 0.0 {
          to_add.push((rule.left.clone(), b.clone(), probability * null_c));
          rule.weight -= probability * null_c;
        }
      }
    }

    for (left, right, probability) in to_add {
      if let Some(&i) = single_rules.get(&(left.clone(), right.clone())) {
        self.rules[i].weight += probability;
      } else {
        self.rules.push(Rule::new(left, vec![right], probability));
      }
    }

    self.rules.retain(|rule| !(rule.is_unary() && rule.right[0].is_epsilon()));

    // totals changed for the directly nullable symbols
    self.normalize_weight();
  }

  /// Strongly connected components of the unit-rule graph, each with more
  /// than one member.
  fn find_strong_components(&self) -> Vec<Vec<Symbol>> {
    let mut graph = DirectedGraph::new();
    for rule in self.rules.iter() {
      if rule.is_unary() && !rule.right[0].is_terminal() {
        graph.add(rule.left.clone(), rule.right[0].clone(), rule.weight);
      }
    }
    graph.strong_components()
  }

  /// Collapses one strongly connected component of the unit-rule graph.
  ///
  /// Members referenced from outside the component take over the non-cycle
  /// rules of every other member, scaled by the probability of reaching
  /// that member along unit rules inside the component (shortest paths over
  /// `-ln(weight)` turn the maximum product into a minimum sum). Members
  /// referenced only from inside disappear together with all unit rules of
  /// the component.
  fn remove_strong_component(&mut self, members: &[Symbol]) {
    let occurs_left = self.occurs_left();
    let occurs_right = self.occurs_right();
    let component: HashSet<Symbol> = members.iter().cloned().collect();

    let mut graph = DirectedGraph::new();
    for rule in self.rules.iter() {
      if rule.is_unary()
        && component.contains(&rule.left)
        && component.contains(&rule.right[0])
      {
        graph.add(rule.left.clone(), rule.right[0].clone(), -rule.weight.ln());
      }
    }
    let distance = graph.floyd();

    let mut internals: HashSet<Symbol> = HashSet::new();
    let mut collapsed: Vec<Rule> = Vec::new();

    for symbol in members.iter() {
      let is_external = occurs_right
        .get(symbol)
        .map_or(false, |indices| {
          indices.iter().any(|&i| {
            let rule = &self.rules[i];
            rule.is_binary() || !component.contains(&rule.left)
          })
        });
      if !is_external {
        internals.insert(symbol.clone());
        continue;
      }

      // probability that symbol steps into the component at all
      let mut inner_prob = 0.0;
      if let Some(indices) = occurs_left.get(symbol) {
        for &i in indices.iter() {
          let rule = &self.rules[i];
          if rule.is_unary() && component.contains(&rule.right[0]) {
            inner_prob += rule.weight;
          }
        }
      }

      for target in members.iter() {
        if target == symbol {
          continue;
        }
        let trans_prob = (-distance[symbol][target]).exp();
        if let Some(indices) = occurs_left.get(target) {
          for &i in indices.iter() {
            let rule = &self.rules[i];
            if rule.is_unary() && component.contains(&rule.right[0]) {
              continue;
            }
            collapsed.push(Rule::new(
              symbol.clone(),
              rule.right.clone(),
              inner_prob * trans_prob * rule.weight,
            ));
          }
        }
      }
    }

    self.rules.extend(collapsed);
    self.rules.retain(|rule| {
      if rule.is_unary()
        && component.contains(&rule.left)
        && component.contains(&rule.right[0])
      {
        return false;
      }
      !internals.contains(&rule.left)
    });
  }

  /// Breaks every unit-rule cycle so the unit-rule graph becomes a DAG.
  fn remove_strong_components(&mut self) {
    for component in self.find_strong_components() {
      self.remove_strong_component(&component);
    }

    self.rules.retain(|rule| !(rule.is_unary() && rule.left == rule.right[0]));
    self.normalize_weight();
  }

  /// Inlines the single unit rule `left ::= right`, copying every rule of
  /// `right` onto `left` with `right` prepended to its path. When nothing
  /// else references `right`, its own rules are dropped as well.
  fn remove_unit_rule(&mut self, left: &Symbol, right: &Symbol) {
    let occurs_left = self.occurs_left();
    let occurs_right = self.occurs_right();

    let mut weight = 0.0;
    if let Some(indices) = occurs_left.get(left) {
      for &i in indices.iter() {
        let rule = &self.rules[i];
        if rule.is_unary() && rule.right[0] == *right {
          weight = rule.weight;
          break;
        }
      }
    }

    let mut inlined = Vec::new();
    if let Some(indices) = occurs_left.get(right) {
      for &i in indices.iter() {
        let rule = &self.rules[i];
        let mut new_rule = Rule::new(left.clone(), rule.right.clone(), rule.weight * weight);
        new_rule.path.push(right.clone());
        new_rule.path.extend(rule.path.iter().cloned());
        inlined.push(new_rule);
      }
    }
    self.rules.extend(inlined);

    let right_unreferenced = occurs_right.get(right).map_or(0, |v| v.len()) == 1;
    self.rules.retain(|rule| {
      if rule.is_unary() && rule.left == *left && rule.right[0] == *right {
        return false;
      }
      !(right_unreferenced && rule.left == *right)
    });
  }

  /// Inlines unit rules leaf-first until none remain. The unit-rule graph
  /// is a DAG here, so a leaf always exists: the topologically first vertex
  /// of the transpose has no outgoing unit rules, and its first DFS
  /// neighbor in the transpose is one of its parents.
  fn remove_unit_rules(&mut self) {
    loop {
      let mut graph = DirectedGraph::new();
      for rule in self.rules.iter() {
        if rule.is_unary() && !rule.right[0].is_terminal() {
          graph.add(rule.left.clone(), rule.right[0].clone(), rule.weight);
        }
      }
      if graph.is_empty() {
        break;
      }

      let transposed = graph.transpose();
      let order = transposed.topological_sort();
      let mut visited = HashSet::new();
      let chain = transposed.dfs(&order[0], &mut visited);
      assert!(chain.len() >= 2, "unit-rule graph is not a DAG");

      let right = chain[0].clone();
      let left = chain[1].clone();
      assert!(graph.has_arc(&left, &right), "unit-rule graph is not a DAG");
      debug!("inlining unit rule: {} ::= {}", left, right);
      self.remove_unit_rule(&left, &right);
    }
  }
}

impl fmt::Display for Grammar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if !self.exports.is_empty() {
      let mut exports = self.exports.iter().map(|s| s.name.as_str()).collect::<Vec<_>>();
      exports.sort_unstable();
      writeln!(f, ";!exports: {}", exports.join(" "))?;
    }
    for rule in self.rules.iter() {
      writeln!(f, "{}", rule)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::rules::EPSILON_SYMBOL;

  const WEATHER: &str = r"
    ;!exports: <city>
    <city> ::= seattle | beijing
    <whats> ::= what's the | <nil>
    <root> ::= <whats> weather in <city>
  ";

  fn weather() -> Grammar {
    WEATHER.parse().unwrap()
  }

  fn assert_weights_normalized(grammar: &Grammar) {
    let mut totals: HashMap<Symbol, f64> = HashMap::new();
    for rule in grammar.rules.iter() {
      *totals.entry(rule.left.clone()).or_insert(0.0) += rule.weight;
    }
    for (left, total) in totals {
      assert!((total - 1.0).abs() <= 1e-6, "{} weights sum to {}", left, total);
    }
  }

  #[test]
  fn test_normalize_weight() {
    let mut grammar = weather();
    grammar.normalize_weight();
    assert_weights_normalized(&grammar);

    let city_weights: Vec<f64> = grammar
      .rules
      .iter()
      .filter(|r| r.left.name == "<city>")
      .map(|r| r.weight)
      .collect();
    assert_eq!(city_weights, vec![0.5, 0.5]);
  }

  #[test]
  fn test_add_term_variables() {
    let mut grammar = weather();
    grammar.normalize_weight();
    grammar.add_term_variables();

    for rule in grammar.rules.iter() {
      if rule.right.len() >= 2 {
        assert!(
          rule.right.iter().all(|s| !s.is_terminal()),
          "terminal remains in {}",
          rule
        );
      }
    }
    // each extracted terminal got a unary rule deriving it
    assert!(grammar
      .rules
      .iter()
      .any(|r| r.is_unary() && r.right[0].name == "weather" && r.left.name.starts_with("<__t_")));
  }

  #[test]
  fn test_reduce_higher_rules() {
    let mut grammar = weather();
    grammar.normalize_weight();
    grammar.add_term_variables();
    grammar.reduce_higher_rules();

    for rule in grammar.rules.iter() {
      assert!(rule.is_unary() || rule.is_binary(), "too long: {}", rule);
    }
  }

  #[test]
  fn test_reduce_higher_rules_keeps_alternatives_apart() {
    let mut grammar: Grammar = "<a> ::= b c d | e f g".parse().unwrap();
    grammar.normalize_weight();
    grammar.add_term_variables();
    grammar.reduce_higher_rules();

    // every chain intermediate belongs to exactly one alternative
    let mut definitions: HashMap<&str, usize> = HashMap::new();
    for rule in grammar.rules.iter() {
      if rule.left.name.starts_with("<__x_") {
        *definitions.entry(rule.left.name.as_str()).or_insert(0) += 1;
      }
    }
    assert_eq!(definitions.len(), 2);
    for (left, count) in definitions {
      assert_eq!(count, 1, "{} defined {} times", left, count);
    }
  }

  #[test]
  fn test_find_nullables() {
    let mut grammar = weather();
    grammar.normalize_weight();
    let nullables = grammar.find_nullables();
    assert_eq!(nullables.len(), 1);
    let whats = nullables.get(&Symbol::new("<whats>")).copied().unwrap();
    assert!((whats - 0.5).abs() < 1e-9);
  }

  #[test]
  fn test_remove_null_rules() {
    let mut grammar = weather();
    grammar.normalize_weight();
    grammar.add_term_variables();
    grammar.reduce_higher_rules();
    grammar.remove_null_rules();

    for rule in grammar.rules.iter() {
      assert!(
        !(rule.is_unary() && rule.right[0].name == EPSILON_SYMBOL),
        "null rule left: {}",
        rule
      );
    }
    assert_weights_normalized(&grammar);

    // the optional prefix produced a shortened variant of the root rule
    assert!(grammar
      .rules
      .iter()
      .any(|r| r.left.name == "<root>" && r.is_unary()));
  }

  #[test]
  fn test_remove_strong_components() {
    let mut grammar: Grammar = "
      <a> ::= <b> ; 0.5 | a ; 0.5
      <b> ::= <a> ; 1.0
      <root> ::= <a> ; 1.0
    "
    .parse()
    .unwrap();
    grammar.normalize_weight();
    grammar.add_term_variables();
    grammar.reduce_higher_rules();
    grammar.remove_null_rules();
    grammar.remove_strong_components();

    assert!(grammar.find_strong_components().is_empty());
    assert_weights_normalized(&grammar);
  }

  #[test]
  fn test_full_pipeline_reaches_cnf() {
    let mut grammar = weather();
    grammar.convert_to_cnf();

    for rule in grammar.rules.iter() {
      let terminal_form = rule.is_unary() && rule.right[0].is_terminal();
      let binary_form =
        rule.is_binary() && !rule.right[0].is_terminal() && !rule.right[1].is_terminal();
      assert!(terminal_form || binary_form, "not in normal form: {}", rule);
    }
  }

  #[test]
  fn test_unit_inlining_records_path() {
    let mut grammar: Grammar = "
      <root> ::= <a>
      <a> ::= b c
    "
    .parse()
    .unwrap();
    grammar.convert_to_cnf();

    let inlined = grammar
      .rules
      .iter()
      .find(|r| r.left.name == "<root>" && r.is_binary())
      .expect("inlined root rule");
    assert_eq!(inlined.path, vec![Symbol::new("<a>")]);
  }

  #[test]
  fn test_pipeline_idempotent() {
    let mut grammar = weather();
    grammar.convert_to_cnf();
    let first = grammar.rules.clone();
    grammar.convert_to_cnf();

    assert_eq!(grammar.rules.len(), first.len());
    for (a, b) in grammar.rules.iter().zip(first.iter()) {
      assert_eq!(a.left, b.left);
      assert_eq!(a.right, b.right);
      assert_eq!(a.path, b.path);
      assert!((a.weight - b.weight).abs() < 1e-9, "{} vs {}", a, b);
    }
  }

  #[test]
  fn test_degenerate_nullable_grammar_builds() {
    let mut grammar: Grammar = "
      <root> ::= <x> ; 1.0
      <x> ::= <nil> ; 1.0
    "
    .parse()
    .unwrap();
    grammar.convert_to_cnf();
    assert!(grammar.rules.is_empty());
  }
}
