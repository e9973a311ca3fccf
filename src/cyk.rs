//! Bottom-up Viterbi chart parsing over a CNF grammar, and reconstruction
//! of the user-visible tree from back-pointers and collapsed unit chains.

use std::fmt::Write;

use crate::cnf::{CnfGrammar, CnfRuleCore, SymbolId};
use crate::rules::ROOT_SYMBOL;
use crate::syntree::SynTree;

/// Index into the per-parse node arena.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct NodeIdx(u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum CellSymbol {
  /// Placeholder for the i-th input token; only ever a back-pointer target.
  Token(usize),
  Nonterminal(SymbolId),
}

/// One candidate derivation of a chart cell. Cells chain their candidates
/// through `next`; no pruning or deduplication happens below the root.
#[derive(Debug, Copy, Clone)]
struct ChartNode<'g> {
  symbol: CellSymbol,
  rule: Option<&'g CnfRuleCore>,
  logp: f64,
  left: Option<NodeIdx>,
  right: Option<NodeIdx>,
  next: Option<NodeIdx>,
}

/// Arena holding every chart node of one parse; the whole allocation dies
/// with the parse call.
struct NodeArena<'g> {
  nodes: Vec<ChartNode<'g>>,
}

impl<'g> NodeArena<'g> {
  fn new() -> Self {
    Self { nodes: Vec::new() }
  }

  fn alloc(&mut self, node: ChartNode<'g>) -> NodeIdx {
    let idx = NodeIdx(self.nodes.len() as u32);
    self.nodes.push(node);
    idx
  }

  fn get(&self, idx: NodeIdx) -> &ChartNode<'g> {
    &self.nodes[idx.0 as usize]
  }
}

/// Parses `query` against the grammar and returns the most probable tree
/// rooted at `<root>`, or `None` when the query doesn't match.
pub fn parse(grammar: &CnfGrammar, query: &[&str]) -> Option<SynTree> {
  if query.is_empty() {
    return None;
  }

  let n = query.len();
  let mut arena = NodeArena::new();

  // chart[length][start]; row 0 holds the token placeholders that length-1
  // nodes point back to
  let mut chart: Vec<Vec<Option<NodeIdx>>> = Vec::with_capacity(n + 1);
  chart.push(
    (0..n)
      .map(|i| {
        Some(arena.alloc(ChartNode {
          symbol: CellSymbol::Token(i),
          rule: None,
          logp: 0.0,
          left: None,
          right: None,
          next: None,
        }))
      })
      .collect(),
  );

  // length 1: terminal rules over single tokens
  let mut row = vec![None; n];
  for (i, token) in query.iter().enumerate() {
    if let Some(rules) = grammar.terminal_rules(token) {
      for rule in rules.iter() {
        let node = arena.alloc(ChartNode {
          symbol: CellSymbol::Nonterminal(rule.core.source),
          rule: Some(&rule.core),
          logp: rule.core.probability.ln(),
          left: chart[0][i],
          right: None,
          next: row[i],
        });
        row[i] = Some(node);
      }
    }
  }
  chart.push(row);
  trace!("chart row 1: {}", fmt_row(grammar, &arena, &chart[1]));

  // longer spans: every split of every span, every rule over every
  // candidate pair
  for length in 2..=n {
    let columns = n - length + 1;
    let mut row = vec![None; columns];
    for start in 0..columns {
      for partition in 1..length {
        let mut left = chart[partition][start];
        while let Some(left_idx) = left {
          let left_node = *arena.get(left_idx);
          left = left_node.next;
          let first = match left_node.symbol {
            CellSymbol::Nonterminal(id) => id,
            CellSymbol::Token(_) => continue,
          };
          let by_second = match grammar.rules_with_first(first) {
            Some(by_second) => by_second,
            None => continue,
          };

          let mut right = chart[length - partition][start + partition];
          while let Some(right_idx) = right {
            let right_node = *arena.get(right_idx);
            right = right_node.next;
            let second = match right_node.symbol {
              CellSymbol::Nonterminal(id) => id,
              CellSymbol::Token(_) => continue,
            };

            if let Some(rules) = by_second.get(&second) {
              for rule in rules.iter() {
                let logp = rule.core.probability.ln() + left_node.logp + right_node.logp;
                let node = arena.alloc(ChartNode {
                  symbol: CellSymbol::Nonterminal(rule.core.source),
                  rule: Some(&rule.core),
                  logp,
                  left: Some(left_idx),
                  right: Some(right_idx),
                  next: row[start],
                });
                row[start] = Some(node);
              }
            }
          }
        }
      }
    }
    chart.push(row);
    trace!("chart row {}: {}", length, fmt_row(grammar, &arena, &chart[length]));
  }

  // pick the best root candidate spanning the whole query
  let root_id = grammar.symbol_id(ROOT_SYMBOL)?;
  let mut best: Option<NodeIdx> = None;
  let mut best_logp = f64::NEG_INFINITY;
  let mut candidate = chart[n][0];
  while let Some(idx) = candidate {
    let node = arena.get(idx);
    if node.symbol == CellSymbol::Nonterminal(root_id) && node.logp > best_logp {
      best_logp = node.logp;
      best = Some(idx);
    }
    candidate = node.next;
  }

  let root = best?;
  let mut nodes = construct_tree(grammar, &arena, root, root_id, query);
  Some(nodes.swap_remove(0))
}

/// Materializes the visible tree below a chart node: leaves for tokens,
/// then wrappers for exported symbols found on the collapsed path (walked
/// innermost-first, since the build is bottom-up) and for the node's own
/// symbol when it is exported or the root.
fn construct_tree(
  grammar: &CnfGrammar,
  arena: &NodeArena,
  idx: NodeIdx,
  root_id: SymbolId,
  query: &[&str],
) -> Vec<SynTree> {
  let node = arena.get(idx);
  let symbol = match node.symbol {
    CellSymbol::Token(i) => return vec![SynTree::leaf(query[i])],
    CellSymbol::Nonterminal(id) => id,
  };

  let left = node.left.expect("non-leaf chart node without a left child");
  let mut children = construct_tree(grammar, arena, left, root_id, query);
  if let Some(right) = node.right {
    children.extend(construct_tree(grammar, arena, right, root_id, query));
  }

  let rule = node.rule.expect("non-leaf chart node without a rule");
  for &path_symbol in rule.path.iter().rev() {
    if grammar.is_export(path_symbol) {
      children = vec![SynTree::branch(grammar.symbol_name(path_symbol), children)];
    }
  }

  if grammar.is_export(symbol) || symbol == root_id {
    children = vec![SynTree::branch(grammar.symbol_name(symbol), children)];
  }

  children
}

/// One chart row as `[start: symbols…] …`, for trace output.
fn fmt_row(grammar: &CnfGrammar, arena: &NodeArena, row: &[Option<NodeIdx>]) -> String {
  let mut out = String::new();
  for (i, &head) in row.iter().enumerate() {
    let mut symbols = Vec::new();
    let mut candidate = head;
    while let Some(idx) = candidate {
      let node = arena.get(idx);
      if let CellSymbol::Nonterminal(id) = node.symbol {
        symbols.push(grammar.symbol_name(id));
      }
      candidate = node.next;
    }
    let _ = write!(out, "[{}: {}] ", i, symbols.join(" "));
  }
  out
}
