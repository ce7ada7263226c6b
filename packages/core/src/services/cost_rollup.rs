//! Cost Rollup Engine
//!
//! Computes per-node totals over a built [`BudgetTree`] and the four
//! budget-level totals.
//!
//! - Composition: `quantity × unit_price × (1 + rate / 100)`
//! - Stage (including the synthetic unassigned stage): sum of the totals of
//!   every composition below it, direct or indirect
//! - Search placeholder: zero, and nothing below it is counted
//!
//! Totals are always recomputed from scratch; the computation is linear in
//! the number of items.

use std::collections::HashMap;

use crate::models::{BudgetTotals, ItemKind};
use crate::services::tree_builder::{BudgetTree, NodeKey};

/// Computed cost of a single node
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeCost {
    /// Unit price with markup; `None` for stages and placeholders
    pub unit_price_with_markup: Option<f64>,

    /// Markup-adjusted total of the node
    pub total: f64,
}

/// Result of one rollup pass
#[derive(Debug, Clone, PartialEq)]
pub struct CostRollup {
    bdi_rate_percent: f64,
    node_costs: HashMap<NodeKey, NodeCost>,
    totals: BudgetTotals,
}

impl CostRollup {
    /// Run the rollup over `tree` with the budget-wide markup rate
    pub fn compute(tree: &BudgetTree, bdi_rate_percent: f64) -> Self {
        let nodes = tree.nodes();
        let order = tree.walk();

        // Sum of composition totals in each reachable subtree (node included)
        let mut subtree_sum = vec![0.0_f64; nodes.len()];
        let mut node_costs = HashMap::with_capacity(order.len());

        // Reverse depth-first order visits children before their parents
        for &i in order.iter().rev() {
            let node = &nodes[i];
            let below: f64 = node.children.iter().map(|&c| subtree_sum[c]).sum();

            let cost = match node.kind {
                ItemKind::Composition => {
                    let item = tree.item(i);
                    let unit = item.and_then(|item| item.markup_unit_cost(bdi_rate_percent));
                    let quantity = item.and_then(|item| item.quantity).unwrap_or(0.0);
                    let total = quantity * unit.unwrap_or(0.0);
                    subtree_sum[i] = total + below;
                    NodeCost {
                        unit_price_with_markup: unit,
                        total,
                    }
                }
                ItemKind::Stage => {
                    subtree_sum[i] = below;
                    NodeCost {
                        unit_price_with_markup: None,
                        total: below,
                    }
                }
                ItemKind::SearchPlaceholder => {
                    subtree_sum[i] = 0.0;
                    NodeCost::default()
                }
            };
            node_costs.insert(node.key, cost);
        }

        // Items caught in a parent cycle are not reachable and not counted
        let (total_without_markup, total_labor) = order
            .iter()
            .filter_map(|&i| tree.item(i))
            .filter(|item| item.is_composition())
            .fold((0.0, 0.0), |(cost, labor), item| {
                (cost + item.direct_cost(), labor + item.labor_cost())
            });
        let total_markup_amount = total_without_markup * bdi_rate_percent / 100.0;

        let totals = BudgetTotals {
            total_without_markup,
            total_markup_amount,
            total_with_markup: total_without_markup + total_markup_amount,
            total_labor,
        };

        tracing::trace!(
            "Rollup over {} node(s) at {}% markup: {:?}",
            order.len(),
            bdi_rate_percent,
            totals
        );

        Self {
            bdi_rate_percent,
            node_costs,
            totals,
        }
    }

    pub fn bdi_rate_percent(&self) -> f64 {
        self.bdi_rate_percent
    }

    pub fn node_cost(&self, key: &NodeKey) -> Option<NodeCost> {
        self.node_costs.get(key).copied()
    }

    /// Markup-adjusted total of a node (zero for unknown or unreachable nodes)
    pub fn node_total(&self, key: &NodeKey) -> f64 {
        self.node_costs.get(key).map_or(0.0, |cost| cost.total)
    }

    pub fn totals(&self) -> BudgetTotals {
        self.totals
    }
}
