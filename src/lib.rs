//! A probabilistic context-free grammar parser for intent and slot
//! matching over tokenized utterances.
//!
//! A grammar is a list of weighted rules plus a set of exported
//! non-terminals. Building a [`Parser`] normalizes the grammar into
//! Chomsky normal form; parsing runs Viterbi CYK over the query and
//! returns the most probable tree, flattened down to `<root>` and the
//! exported symbols.

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

pub mod cnf;
pub mod cyk;
pub mod digraph;
pub mod grammar;
pub mod parse_grammar;
pub mod rules;
pub mod syntree;
pub mod utils;

use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::cnf::CnfGrammar;
use crate::grammar::Grammar;
use crate::syntree::SynTree;
pub use crate::utils::Err;

/// A compiled grammar, ready to parse queries. Immutable once built, so a
/// single instance can serve any number of parses.
pub struct Parser {
  grammar: Grammar,
  cnf: CnfGrammar,
}

impl Parser {
  /// Builds a parser from grammar text.
  ///
  /// ```
  /// use pcfg::Parser;
  ///
  /// let parser: Parser = "
  ///   ;!exports: <city>
  ///   <city> ::= seattle | beijing
  ///   <root> ::= weather in <city>
  /// "
  /// .parse()
  /// .unwrap();
  ///
  /// let tree = parser.parse(&["weather", "in", "seattle"]).unwrap();
  /// assert_eq!(tree.compact(), "(<root> weather in (<city> seattle))");
  /// ```
  pub fn new(grammar_text: &str) -> Result<Self, Err> {
    let mut grammar: Grammar = grammar_text.parse()?;
    let cnf = grammar.convert_to_cnf();
    Ok(Self { grammar, cnf })
  }

  pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<Self, Err> {
    Self::new(&fs::read_to_string(path)?)
  }

  /// The most probable parse of `query`, or `None` when it doesn't match
  /// the grammar.
  pub fn parse(&self, query: &[&str]) -> Option<SynTree> {
    cyk::parse(&self.cnf, query)
  }

  /// The rule store in its post-normalization state.
  pub fn grammar(&self) -> &Grammar {
    &self.grammar
  }

  pub fn cnf_grammar(&self) -> &CnfGrammar {
    &self.cnf
  }
}

impl FromStr for Parser {
  type Err = Err;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::new(s)
  }
}
