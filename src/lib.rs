#[macro_use]
extern crate lazy_static;

pub mod chart;
pub mod earley;
pub mod forest;
pub mod grammar;
pub mod left_corner;
pub mod parse_grammar;
pub mod rules;
pub mod tree;
pub mod utils;

pub use crate::earley::Parser;
pub use crate::grammar::Grammar;
pub use crate::tree::DerivNode;
pub use crate::utils::Err;

#[test]
fn test_end_to_end_weighted_parse() {
  let g: Grammar = r#"
[ pp-attachment ambiguity: the classic telescope sentence
1 # TOP ::= S
1 # S ::= NP <&> VP
0.7 # NP ::= DET <&> N
0.3 # NP ::= NP <&> PP
1 # PP ::= P <&> NP
0.6 # VP ::= V <&> NP
0.4 # VP ::= VP <&> PP
1 # DET ::= the
1 # N ::= dog
1 # N ::= cat
1 # N ::= telescope
1 # V ::= saw
1 # P ::= with
"#
  .parse()
  .unwrap();
  let parser = Parser::new(g).unwrap();

  let sentence = "the dog saw the cat with the telescope"
    .split(' ')
    .collect::<Vec<_>>();
  let trees = parser.parse_sentence(&sentence).unwrap();

  // PP attaches either to the object NP or to the VP
  assert_eq!(trees.len(), 2);
  for tree in &trees {
    assert_eq!(tree.label, "TOP");
    assert_eq!(tree.leaves(), sentence);
  }
  // scores are non-increasing
  assert!(trees[0].score() >= trees[1].score());
}
