//! Contraction-tree construction for n-ary products.
//!
//! The default tree is the left fold `((1·2)·3)·…`. When the factors use
//! the positional-integer convention (positive labels contracted, negative
//! labels free), the tree instead contracts along ascending positive
//! labels, which is the order that convention promises.

use crate::compiler::ast::Expr;

/// A binary parenthesization over factor positions.
#[derive(Debug, Clone, PartialEq)]
pub enum CTree {
    Leaf(usize),
    Node(Box<CTree>, Box<CTree>),
}

/// Build a contraction tree from the free-label list of each factor.
pub fn build_tree(label_lists: &[Vec<Expr>]) -> CTree {
    if is_positional(label_lists) {
        positional_tree(label_lists)
    } else {
        left_fold(label_lists.len())
    }
}

fn left_fold(n: usize) -> CTree {
    let mut tree = CTree::Leaf(0);
    for i in 1..n {
        tree = CTree::Node(Box::new(tree), Box::new(CTree::Leaf(i)));
    }
    tree
}

fn is_positional(label_lists: &[Vec<Expr>]) -> bool {
    let mut saw_positive = false;
    for list in label_lists {
        for label in list {
            match label {
                Expr::Int(n) => {
                    if *n > 0 {
                        saw_positive = true;
                    }
                }
                _ => return false,
            }
        }
    }
    saw_positive
}

fn positional_tree(label_lists: &[Vec<Expr>]) -> CTree {
    let mut groups: Vec<(CTree, Vec<i64>)> = label_lists
        .iter()
        .enumerate()
        .map(|(i, list)| {
            let labels = list
                .iter()
                .filter_map(|l| match l {
                    Expr::Int(n) => Some(*n),
                    _ => None,
                })
                .collect();
            (CTree::Leaf(i), labels)
        })
        .collect();

    let mut contracted: Vec<i64> = groups
        .iter()
        .flat_map(|(_, ls)| ls.iter().copied())
        .filter(|&l| l > 0)
        .collect();
    contracted.sort_unstable();
    contracted.dedup();

    for label in contracted {
        let holders: Vec<usize> = groups
            .iter()
            .enumerate()
            .filter(|(_, (_, ls))| ls.contains(&label))
            .map(|(i, _)| i)
            .collect();
        if holders.len() == 2 {
            let (second, first) = (holders[1], holders[0]);
            let (tree_b, labels_b) = groups.remove(second);
            let (tree_a, labels_a) = groups.remove(first);
            let mut merged = labels_a;
            merged.extend(labels_b);
            groups.insert(
                first,
                (
                    CTree::Node(Box::new(tree_a), Box::new(tree_b)),
                    merged,
                ),
            );
        }
    }

    // Disconnected remainders (outer products) fold left.
    let mut iter = groups.into_iter();
    let (mut tree, _) = iter.next().expect("at least one factor");
    for (next, _) in iter {
        tree = CTree::Node(Box::new(tree), Box::new(next));
    }
    tree
}

/// Substitute factor expressions into the tree, producing a fully
/// parenthesized binary product.
pub fn sort_product(tree: &CTree, factors: &[Expr]) -> Expr {
    match tree {
        CTree::Leaf(i) => factors[*i].clone(),
        CTree::Node(a, b) => Expr::call(
            "*",
            vec![sort_product(a, factors), sort_product(b, factors)],
        ),
    }
}
