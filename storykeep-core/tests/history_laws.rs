//! History Integration Tests
//!
//! Property tests for the undo/redo contract:
//! - Undo restores the exact prior node set and ordering
//! - Redo reproduces the exact post-edit state
//! - Editing after undo truncates the redo branch

use proptest::prelude::*;
use storykeep_core::{
    Direction, EngineConfig, Node, NodeId, NodeKind, NodesContext, PaneData, TagElementData,
};

#[derive(Debug, Clone)]
enum Op {
    Add { parent: usize },
    AddAt { parent: usize, index: usize },
    Modify { target: usize, copy: String },
    Move { target: usize, before: bool },
    Relocate { target: usize, parent: usize, index: usize },
    Delete { target: usize },
    DeleteChildren { target: usize },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..64).prop_map(|parent| Op::Add { parent }),
        (0usize..64, 0usize..8).prop_map(|(parent, index)| Op::AddAt { parent, index }),
        (0usize..64, "[a-z]{0,8}").prop_map(|(target, copy)| Op::Modify { target, copy }),
        (0usize..64, any::<bool>()).prop_map(|(target, before)| Op::Move { target, before }),
        (0usize..64, 0usize..64, 0usize..8)
            .prop_map(|(target, parent, index)| Op::Relocate { target, parent, index }),
        (0usize..64).prop_map(|target| Op::Delete { target }),
        (0usize..64).prop_map(|target| Op::DeleteChildren { target }),
    ]
}

fn seeded() -> NodesContext {
    let mut ctx = NodesContext::new(EngineConfig::default().with_history_max_size(10_000));
    ctx.add_nodes(vec![
        Node::new(&NodeId::root(), NodeKind::Pane(PaneData::default())).with_id("pane"),
        para("a", "pane"),
        para("b", "pane"),
        para("c", "a"),
    ])
    .expect("seed");
    ctx
}

fn para(id: &str, parent: &str) -> Node {
    Node::new(
        &NodeId::from(parent),
        NodeKind::TagElement(TagElementData::new("p").with_copy(id)),
    )
    .with_id(id)
}

/// Every id in the store, root included, in a stable order.
fn ids(ctx: &NodesContext) -> Vec<NodeId> {
    let mut ids: Vec<NodeId> = ctx.store().nodes().map(|n| n.id.clone()).collect();
    ids.sort();
    ids
}

fn pick(ctx: &NodesContext, n: usize, with_root: bool) -> Option<NodeId> {
    let ids: Vec<NodeId> = ids(ctx)
        .into_iter()
        .filter(|id| with_root || !id.is_root())
        .collect();
    if ids.is_empty() {
        None
    } else {
        Some(ids[n % ids.len()].clone())
    }
}

fn apply(ctx: &mut NodesContext, op: &Op, counter: &mut usize) {
    match op {
        Op::Add { parent } => {
            if let Some(parent) = pick(ctx, *parent, true) {
                *counter += 1;
                let _ = ctx.add_nodes(vec![para(&format!("n{counter}"), parent.as_str())]);
            }
        }
        Op::AddAt { parent, index } => {
            if let Some(parent) = pick(ctx, *parent, true) {
                *counter += 1;
                let node = para(&format!("n{counter}"), parent.as_str());
                let _ = ctx.add_nodes_at(vec![node], *index);
            }
        }
        Op::Modify { target, copy } => {
            let node = pick(ctx, *target, false).and_then(|id| ctx.get_by_id(&id).cloned());
            if let Some(mut node) = node {
                if let NodeKind::TagElement(data) = &mut node.kind {
                    data.copy = Some(copy.clone());
                }
                ctx.modify_nodes(vec![node]);
            }
        }
        Op::Move { target, before } => {
            if let Some(id) = pick(ctx, *target, false) {
                let direction = if *before { Direction::Before } else { Direction::After };
                ctx.move_node(&id, direction);
            }
        }
        Op::Relocate { target, parent, index } => {
            let id = pick(ctx, *target, false);
            if let (Some(id), Some(parent)) = (id, pick(ctx, *parent, true)) {
                let _ = ctx.relocate_node(&id, &parent, *index);
            }
        }
        Op::Delete { target } => {
            if let Some(id) = pick(ctx, *target, false) {
                ctx.delete_node(&id);
            }
        }
        Op::DeleteChildren { target } => {
            if let Some(id) = pick(ctx, *target, true) {
                ctx.delete_children(&id);
            }
        }
    }
}

fn snapshot(ctx: &NodesContext) -> (Vec<Node>, usize) {
    (
        ctx.store().walk().into_iter().cloned().collect(),
        ctx.store().len(),
    )
}

proptest! {
    #[test]
    fn prop_undo_then_redo_replays_every_state(ops in prop::collection::vec(arb_op(), 1..25)) {
        let mut ctx = seeded();
        let base = ctx.history().len();
        let mut states = vec![snapshot(&ctx)];
        let mut counter = 0;

        for op in &ops {
            let recorded = ctx.history().len();
            apply(&mut ctx, op, &mut counter);
            if ctx.history().len() > recorded {
                states.push(snapshot(&ctx));
            }
        }

        let edits = ctx.history().len() - base;
        prop_assert_eq!(edits + 1, states.len());

        for i in (0..edits).rev() {
            prop_assert!(ctx.undo().expect("undo"));
            prop_assert_eq!(&snapshot(&ctx), &states[i]);
        }
        for state in states.iter().skip(1) {
            prop_assert!(ctx.redo().expect("redo"));
            prop_assert_eq!(&snapshot(&ctx), state);
        }
        prop_assert!(!ctx.history().can_redo());
    }

    #[test]
    fn prop_edit_after_undo_discards_redo_branch(
        ops in prop::collection::vec(arb_op(), 1..15),
        undo_count in 1usize..5,
    ) {
        let mut ctx = seeded();
        let mut counter = 0;
        for op in &ops {
            apply(&mut ctx, op, &mut counter);
        }

        let mut undone = 0;
        for _ in 0..undo_count {
            if ctx.undo().expect("undo") {
                undone += 1;
            }
        }
        let before = ctx.history().len();

        ctx.add_nodes(vec![para("fresh", "root")]).expect("new edit");

        prop_assert!(!ctx.history().can_redo());
        prop_assert!(!ctx.redo().expect("redo"));
        prop_assert_eq!(ctx.history().len(), before - undone + 1);
    }
}
