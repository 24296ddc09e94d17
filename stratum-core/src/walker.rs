//! Deterministic depth-first traversal of a plan tree.
//!
//! [`PlanWalker`] is a plain, synchronous `Iterator` over cheaply-cloned
//! `Arc` handles, so it composes with the standard iterator adapters
//! (`filter`, `take_while`, `collect`) without an async runtime. It is used
//! by secret-scrubbing, persistence fan-out, and validation; none of them
//! need to await anything mid-traversal.
//!
//! Order: `Plan -> (Bypass, Pre, Cont, Post, Deferred) -> Blocks[i] ->
//! (Bypass, Pre, Cont, Post, Deferred) -> Sequences[j] -> Actions[k]`; check
//! groups also yield their actions.

use crate::model::{Action, Block, Checks, Plan, Sequence};
use std::sync::Arc;
use stratum_vault::ObjectType;

/// A typed handle to one node, yielded alongside its [`ObjectType`] tag.
#[derive(Clone)]
pub enum NodeRef {
    Plan(Arc<Plan>),
    Block(Arc<Block>),
    Checks(Arc<Checks>),
    Sequence(Arc<Sequence>),
    Action(Arc<Action>),
}

impl NodeRef {
    pub fn object_type(&self) -> ObjectType {
        match self {
            NodeRef::Plan(_) => ObjectType::Plan,
            NodeRef::Block(_) => ObjectType::Block,
            NodeRef::Checks(_) => ObjectType::Checks,
            NodeRef::Sequence(_) => ObjectType::Sequence,
            NodeRef::Action(_) => ObjectType::Action,
        }
    }
}

/// One item of a traversal: the node itself plus the chain of ancestors
/// (root-first) that led to it.
#[derive(Clone)]
pub struct WalkItem {
    pub node: NodeRef,
    pub parents: Vec<NodeRef>,
}

/// A lazy, finite, restartable pre-order traversal of a plan tree.
///
/// "Restartable" in the sense that a fresh `PlanWalker::new(plan)` always
/// retraverses from the root; state cells are read at call time, so two
/// walkers over the same plan observe whatever is current when each item is
/// produced.
pub struct PlanWalker {
    stack: Vec<WalkItem>,
}

impl PlanWalker {
    pub fn new(plan: Arc<Plan>) -> Self {
        let root = NodeRef::Plan(plan.clone());
        let mut stack = vec![WalkItem {
            node: root.clone(),
            parents: vec![],
        }];
        // Push children in reverse so the stack pops them in declaration order.
        push_plan_children(&mut stack, &plan, vec![root]);
        Self { stack }
    }
}

impl Iterator for PlanWalker {
    type Item = WalkItem;

    fn next(&mut self) -> Option<Self::Item> {
        self.stack.pop()
    }
}

fn push_plan_children(stack: &mut Vec<WalkItem>, plan: &Arc<Plan>, parents: Vec<NodeRef>) {
    let mut children = vec![];
    for block in plan.blocks.iter().rev() {
        push_block(&mut children, block, parents.clone());
    }
    for checks in [&plan.deferred, &plan.post, &plan.cont, &plan.pre, &plan.bypass] {
        push_checks(&mut children, checks, parents.clone());
    }
    stack.extend(children.into_iter().rev());
}

fn push_block(out: &mut Vec<WalkItem>, block: &Arc<Block>, parents: Vec<NodeRef>) {
    let self_ref = NodeRef::Block(block.clone());
    out.push(WalkItem {
        node: self_ref.clone(),
        parents: parents.clone(),
    });
    let child_parents = append(&parents, self_ref);

    let mut children = vec![];
    for seq in block.sequences.iter().rev() {
        push_sequence(&mut children, seq, child_parents.clone());
    }
    for checks in [&block.deferred, &block.post, &block.cont, &block.pre, &block.bypass] {
        push_checks(&mut children, checks, child_parents.clone());
    }
    out.extend(children.into_iter().rev());
}

fn push_checks(out: &mut Vec<WalkItem>, checks: &Arc<Checks>, parents: Vec<NodeRef>) {
    let self_ref = NodeRef::Checks(checks.clone());
    out.push(WalkItem {
        node: self_ref.clone(),
        parents: parents.clone(),
    });
    let child_parents = append(&parents, self_ref);
    let mut children = vec![];
    for action in checks.actions.iter().rev() {
        children.push(WalkItem {
            node: NodeRef::Action(action.clone()),
            parents: child_parents.clone(),
        });
    }
    out.extend(children.into_iter().rev());
}

fn push_sequence(out: &mut Vec<WalkItem>, seq: &Arc<Sequence>, parents: Vec<NodeRef>) {
    let self_ref = NodeRef::Sequence(seq.clone());
    out.push(WalkItem {
        node: self_ref.clone(),
        parents: parents.clone(),
    });
    let child_parents = append(&parents, self_ref);
    let mut children = vec![];
    for action in seq.actions.iter().rev() {
        children.push(WalkItem {
            node: NodeRef::Action(action.clone()),
            parents: child_parents.clone(),
        });
    }
    out.extend(children.into_iter().rev());
}

fn append(parents: &[NodeRef], node: NodeRef) -> Vec<NodeRef> {
    let mut v = parents.to_vec();
    v.push(node);
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Action;

    fn sample_plan() -> Arc<Plan> {
        let a1 = Action::new("a1", "noop", serde_json::json!({}));
        let a2 = Action::new("a2", "noop", serde_json::json!({}));
        let seq = Sequence::new("seq1", vec![a1, a2]);
        let block = Block::new("b1", vec![seq]);
        Arc::new(Plan::new("p1", vec![block]))
    }

    #[test]
    fn visits_every_node_in_declared_order() {
        let plan = sample_plan();
        let items: Vec<ObjectType> = PlanWalker::new(plan).map(|i| i.node.object_type()).collect();

        assert_eq!(items[0], ObjectType::Plan);
        assert!(items.contains(&ObjectType::Block));
        assert!(items.contains(&ObjectType::Sequence));
        assert_eq!(items.iter().filter(|t| **t == ObjectType::Action).count(), 2);
    }

    #[test]
    fn parent_chain_is_root_first() {
        let plan = sample_plan();
        let action_item = PlanWalker::new(plan.clone())
            .find(|i| matches!(i.node, NodeRef::Action(_)))
            .unwrap();

        assert!(matches!(action_item.parents[0], NodeRef::Plan(_)));
        assert!(action_item.parents.iter().any(|p| matches!(p, NodeRef::Block(_))));
    }

    #[test]
    fn is_restartable() {
        let plan = sample_plan();
        let first: Vec<_> = PlanWalker::new(plan.clone()).map(|i| i.node.object_type()).collect();
        let second: Vec<_> = PlanWalker::new(plan).map(|i| i.node.object_type()).collect();
        assert_eq!(first, second);
    }
}
