//! Control-flow graph view and edge utilities.
//!
//! The graph is a throwaway petgraph projection of a function's blocks; the
//! function itself stays the source of truth. The one mutation offered here
//! is critical-edge splitting, which indirect-branch rewriting needs because
//! an `indirectbr` terminator cannot be the source side of a critical edge.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::ir::{BasicBlock, Function, Inst, Term};

/// Kind of a control-flow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Unconditional branch.
    Uncond,
    /// Conditional branch, condition true.
    BranchTrue,
    /// Conditional branch, condition false.
    BranchFalse,
    /// One leg of an indirect branch.
    Indirect,
    /// Invoke normal destination.
    Normal,
    /// Invoke unwind destination.
    Unwind,
}

/// A petgraph projection of one function's control flow.
pub struct FlowGraph {
    pub graph: DiGraph<String, EdgeKind>,
    node_of: HashMap<String, NodeIndex>,
}

impl FlowGraph {
    /// Build the projection for `func`.
    pub fn build(func: &Function) -> Self {
        let mut graph = DiGraph::new();
        let mut node_of = HashMap::new();
        for block in &func.blocks {
            let idx = graph.add_node(block.label.clone());
            node_of.insert(block.label.clone(), idx);
        }
        for block in &func.blocks {
            let from = node_of[&block.label];
            for (slot, succ) in block.term.successors().iter().enumerate() {
                if let Some(&to) = node_of.get(*succ) {
                    graph.add_edge(from, to, edge_kind(&block.term, slot));
                }
            }
        }
        Self { graph, node_of }
    }

    /// Number of predecessors of the labeled block.
    pub fn pred_count(&self, label: &str) -> usize {
        self.node_of
            .get(label)
            .map(|&n| {
                self.graph
                    .neighbors_directed(n, petgraph::Incoming)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Number of successors of the labeled block.
    pub fn succ_count(&self, label: &str) -> usize {
        self.node_of
            .get(label)
            .map(|&n| {
                self.graph
                    .neighbors_directed(n, petgraph::Outgoing)
                    .count()
            })
            .unwrap_or(0)
    }
}

fn edge_kind(term: &Term, slot: usize) -> EdgeKind {
    match term {
        Term::Br { .. } => EdgeKind::Uncond,
        Term::CondBr { .. } => {
            if slot == 0 {
                EdgeKind::BranchTrue
            } else {
                EdgeKind::BranchFalse
            }
        }
        Term::IndirectBr { .. } => EdgeKind::Indirect,
        Term::Invoke { .. } => {
            if slot == 0 {
                EdgeKind::Normal
            } else {
                EdgeKind::Unwind
            }
        }
        _ => EdgeKind::Uncond,
    }
}

/// Split every critical edge whose source is a two-way conditional branch.
///
/// A critical edge runs from a block with multiple successors to a block
/// with multiple predecessors. Each such edge gets a fresh forwarding block
/// `<dest>.crit_edge` holding a single unconditional branch; phis in the
/// destination are repointed at the forwarding block. Edges out of
/// `indirectbr` terminators are not splittable and invoke edges are left to
/// the unwinder, mirroring the host utility this stands in for.
///
/// Returns the number of edges split.
pub fn split_all_critical_edges(func: &mut Function) -> usize {
    // Judge criticality against a snapshot projection; splitting one edge
    // never makes another edge critical or uncritical.
    let graph = FlowGraph::build(func);

    struct Pending {
        source: String,
        true_slot: bool,
        target: String,
    }

    let mut pending = Vec::new();
    for block in &func.blocks {
        if let Term::CondBr {
            on_true, on_false, ..
        } = &block.term
        {
            if on_true != on_false {
                for (slot, target) in [(true, on_true), (false, on_false)] {
                    if graph.pred_count(target) >= 2 {
                        pending.push(Pending {
                            source: block.label.clone(),
                            true_slot: slot,
                            target: target.clone(),
                        });
                    }
                }
            }
        }
    }

    let count = pending.len();
    for edge in pending {
        let split_label = func.fresh_label(&format!("{}.crit_edge", edge.target));
        debug!(
            source = %edge.source,
            target = %edge.target,
            split = %split_label,
            "splitting critical edge"
        );

        // Repoint the chosen slot of the source terminator.
        let source_idx = func.block_index(&edge.source).expect("source block");
        if let Term::CondBr {
            on_true, on_false, ..
        } = &mut func.blocks[source_idx].term
        {
            if edge.true_slot {
                *on_true = split_label.clone();
            } else {
                *on_false = split_label.clone();
            }
        }

        // Repoint one matching phi edge per phi in the destination.
        if let Some(target_block) = func.block_mut(&edge.target) {
            for inst in &mut target_block.insts {
                if let Inst::Phi { incoming, .. } = inst {
                    if let Some(entry) = incoming.iter_mut().find(|(_, pred)| *pred == edge.source)
                    {
                        entry.1 = split_label.clone();
                    }
                }
            }
        }

        let mut fwd = BasicBlock::new(split_label);
        fwd.term = Term::Br {
            dest: edge.target.clone(),
        };
        func.blocks.insert(source_idx + 1, fwd);
    }

    count
}
