//! Property-based tests for tree building, rollup and the node editor
//!
//! Invariants that must hold for ALL item lists, including dangling parents
//! and parent cycles:
//! - Numbering: roots are "1".."n"; a child is "<parent>.<position>"
//! - Orphan containment: items with a missing parent sit under one trailing synthetic stage
//! - Rollup: stage = Σ descendant compositions; composition = qty × price × (1 + rate/100)
//! - Idempotence: recomputing without mutation yields identical results
//! - Placeholder singularity and in-place commit

use orcaplan_core::models::{BudgetItem, Candidate, ItemId, ItemKind};
use orcaplan_core::services::{BudgetTree, CostRollup, EditorError, NodeEditor, NodeKey, ViewState};
use proptest::prelude::*;
use std::collections::HashSet;

const ORPHANS: &str = "Compositions without an assigned Stage";

#[derive(Debug, Clone)]
struct ItemSpec {
    is_stage: bool,
    parent: Option<i64>,
    quantity: f64,
    unit_price: f64,
    labor: f64,
}

fn item_spec(max_id: i64) -> impl Strategy<Value = ItemSpec> {
    (
        prop::bool::weighted(0.3),
        prop::option::weighted(0.8, 1..=max_id + 3),
        0.01f64..500.0,
        0.0f64..1000.0,
        0.0f64..200.0,
    )
        .prop_map(|(is_stage, parent, quantity, unit_price, labor)| ItemSpec {
            is_stage,
            parent,
            quantity,
            unit_price,
            labor,
        })
}

fn budget_items() -> impl Strategy<Value = Vec<BudgetItem>> {
    (1usize..40)
        .prop_flat_map(|n| prop::collection::vec(item_spec(n as i64), n))
        .prop_map(|specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, spec)| {
                    let id = ItemId::Durable(i as i64 + 1);
                    let parent = spec.parent.map(ItemId::Durable);
                    let mut item = if spec.is_stage {
                        let mut stage = BudgetItem::stage(format!("Stage {}", i + 1));
                        stage.parent_id = parent;
                        stage
                    } else {
                        let candidate = Candidate::new(
                            format!("C{}", i + 1),
                            "Composition",
                            "un",
                            spec.unit_price,
                            spec.labor,
                        );
                        BudgetItem::composition(parent, &candidate, spec.quantity, "SINAPI")
                    };
                    item.id = id;
                    item
                })
                .collect()
        })
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * (1.0 + a.abs().max(b.abs()))
}

/// Σ composition totals below `index` (excluding the node itself)
fn descendant_composition_sum(tree: &BudgetTree, rollup: &CostRollup, index: usize) -> f64 {
    tree.nodes()[index]
        .children
        .iter()
        .map(|&child| {
            let node = &tree.nodes()[child];
            match node.kind {
                ItemKind::Composition => {
                    rollup.node_total(&node.key) + descendant_composition_sum(tree, rollup, child)
                }
                ItemKind::Stage => descendant_composition_sum(tree, rollup, child),
                ItemKind::SearchPlaceholder => 0.0,
            }
        })
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_numbering_follows_sibling_position(items in budget_items()) {
        let tree = BudgetTree::build(&items, ORPHANS);

        for (position, &root) in tree.roots().iter().enumerate() {
            prop_assert_eq!(&tree.nodes()[root].sequence_number, &(position + 1).to_string());
            prop_assert_eq!(tree.nodes()[root].depth, 0);
        }

        for &index in &tree.walk() {
            let node = &tree.nodes()[index];
            for (position, &child) in node.children.iter().enumerate() {
                let expected = format!("{}.{}", node.sequence_number, position + 1);
                prop_assert_eq!(&tree.nodes()[child].sequence_number, &expected);
                prop_assert_eq!(tree.nodes()[child].depth, node.depth + 1);
            }
        }
    }

    #[test]
    fn prop_roots_and_siblings_sorted_by_id(items in budget_items()) {
        let tree = BudgetTree::build(&items, ORPHANS);

        let root_ids: Vec<ItemId> = tree
            .roots()
            .iter()
            .filter_map(|&r| tree.nodes()[r].key.item_id())
            .collect();
        prop_assert!(root_ids.windows(2).all(|w| w[0] < w[1]));

        for node in tree.nodes() {
            let ids: Vec<ItemId> = node
                .children
                .iter()
                .filter_map(|&c| tree.nodes()[c].key.item_id())
                .collect();
            prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn prop_orphans_live_under_last_root(items in budget_items()) {
        let tree = BudgetTree::build(&items, ORPHANS);
        let ids: HashSet<ItemId> = items.iter().map(|item| item.id).collect();

        let orphans: Vec<&BudgetItem> = items
            .iter()
            .filter(|item| !item.is_stage())
            .filter(|item| item.parent_id.map_or(true, |parent| !ids.contains(&parent)))
            .collect();

        prop_assert_eq!(tree.has_unassigned(), !orphans.is_empty());
        if !orphans.is_empty() {
            let last = *tree.roots().last().unwrap();
            prop_assert!(tree.nodes()[last].is_synthetic());
            let synthetic_count = tree.roots().iter().filter(|&&r| tree.nodes()[r].is_synthetic()).count();
            prop_assert_eq!(synthetic_count, 1);

            let children: HashSet<NodeKey> = tree.children(&NodeKey::Unassigned).into_iter().collect();
            for orphan in orphans {
                prop_assert!(children.contains(&NodeKey::Item(orphan.id)));
            }
        }
    }

    #[test]
    fn prop_rollup_matches_definition(items in budget_items(), rate in 0.0f64..100.0) {
        let tree = BudgetTree::build(&items, ORPHANS);
        let rollup = CostRollup::compute(&tree, rate);

        for &index in &tree.walk() {
            let node = &tree.nodes()[index];
            match node.kind {
                ItemKind::Composition => {
                    let item = tree.item(index).unwrap();
                    let expected = item.quantity.unwrap() * item.unit_price.unwrap() * (1.0 + rate / 100.0);
                    prop_assert!(approx(rollup.node_total(&node.key), expected));
                }
                ItemKind::Stage => {
                    let expected = descendant_composition_sum(&tree, &rollup, index);
                    prop_assert!(approx(rollup.node_total(&node.key), expected));
                }
                ItemKind::SearchPlaceholder => {
                    prop_assert_eq!(rollup.node_total(&node.key), 0.0);
                }
            }
        }

        let totals = rollup.totals();
        prop_assert!(approx(totals.total_with_markup, totals.total_without_markup + totals.total_markup_amount));
        prop_assert!(approx(totals.total_markup_amount, totals.total_without_markup * rate / 100.0));
    }

    #[test]
    fn prop_recompute_is_idempotent(items in budget_items(), rate in 0.0f64..100.0) {
        let first_tree = BudgetTree::build(&items, ORPHANS);
        let second_tree = BudgetTree::build(&items, ORPHANS);
        let first = CostRollup::compute(&first_tree, rate);
        let second = CostRollup::compute(&second_tree, rate);
        prop_assert_eq!(first, second);

        let labels = |tree: &BudgetTree| -> Vec<String> {
            tree.walk().iter().map(|&i| tree.nodes()[i].sequence_number.clone()).collect()
        };
        prop_assert_eq!(labels(&first_tree), labels(&second_tree));
    }

    #[test]
    fn prop_placeholder_is_singular_and_commit_replaces_in_place(
        items in budget_items(),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut items = items;
        let mut view = ViewState::new();
        let mut editor = NodeEditor::new(1.0, "SINAPI");

        let selected = items[pick.index(items.len())].clone();
        let placeholder = editor.begin_composition(Some(&selected), &mut items, &mut view).unwrap();
        let position = items.iter().position(|item| item.id == placeholder).unwrap();

        // A second attempt changes nothing
        let before = items.clone();
        prop_assert_eq!(
            editor.begin_composition(Some(&selected), &mut items, &mut view),
            Err(EditorError::SearchAlreadyActive)
        );
        prop_assert_eq!(&items, &before);

        editor.choose_candidate(Candidate::new("87292", "Concrete slab", "m3", 100.0, 20.0)).unwrap();
        let committed = editor.commit_composition(&mut items).unwrap();

        prop_assert_eq!(items.len(), before.len());
        prop_assert_eq!(items[position].id, committed);
        prop_assert_eq!(items[position].kind, ItemKind::Composition);
        prop_assert_eq!(items[position].parent_id, Some(selected.id));
        for (i, (after, prior)) in items.iter().zip(before.iter()).enumerate() {
            if i != position {
                prop_assert_eq!(after, prior);
            }
        }
    }
}
