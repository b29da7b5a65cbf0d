//! Flow fragments and the arena they are built in.
//!
//! A [`Fragment`] is a piece of graph with an entry node and, if control can
//! still fall off its end, an open exit. Fragments are composed with
//! [`GraphBuilder::append`]; edges to block entries are only created by the
//! terminating operations (`goto`, `branch`, `ret`, ...).
//!
//! ```text
//!   open                    closed               empty
//!   entry ─▶ … ─▶ current    entry ─▶ … ─▶ ret     (nothing)
//! ```
//!
//! Nodes are either *segments*, straight-line runs that can be appended to an
//! open exit and merge into it, or *block entries*, which start a block of the
//! finished graph. [`GraphBuilder::finish`] keeps the nodes reachable from the
//! function entry and numbers them as blocks.

use std::collections::VecDeque;
use std::fmt;

use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};
use tracing::{debug, trace};

use crate::ir::{
    Block, BlockId, BlockKind, FlowGraph, Handler, Instr, InstrId, Terminator, YieldContinuation,
};
use crate::FragmentError;

// ── NodeId ──────────────────────────────────────────────────────────

/// Node of the arena. Becomes a [`BlockId`] if it survives finalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

// ── Fragment ────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Fragment {
    pub entry: Option<NodeId>,
    /// Where the next instruction goes; `None` once control cannot reach the end.
    pub current: Option<NodeId>,
}

impl Fragment {
    pub const EMPTY: Fragment = Fragment {
        entry: None,
        current: None,
    };

    /// An open fragment positioned at `node`.
    pub fn at(node: NodeId) -> Self {
        Self {
            entry: Some(node),
            current: Some(node),
        }
    }

    pub fn is_empty(self) -> bool {
        self.entry.is_none()
    }

    /// Control can fall off the end. Empty fragments are open.
    pub fn is_open(self) -> bool {
        self.entry.is_none() || self.current.is_some()
    }

    pub fn is_closed(self) -> bool {
        !self.is_open()
    }
}

// ── Nodes ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
enum Exit {
    Goto(NodeId),
    Branch {
        cond: InstrId,
        then_node: NodeId,
        else_node: NodeId,
    },
    Return(InstrId),
    Throw(InstrId),
    Rethrow {
        exception: InstrId,
        stack_trace: InstrId,
    },
}

impl Exit {
    fn successors(&self) -> SmallVec<[NodeId; 2]> {
        match self {
            Exit::Goto(target) => smallvec![*target],
            Exit::Branch {
                then_node,
                else_node,
                ..
            } => smallvec![*then_node, *else_node],
            Exit::Return(_) | Exit::Throw(_) | Exit::Rethrow { .. } => SmallVec::new(),
        }
    }
}

#[derive(Clone, Debug)]
struct Node {
    block_entry: bool,
    try_index: Option<u32>,
    instrs: Vec<InstrId>,
    exit: Option<Exit>,
    /// Set once a segment has been appended into another node.
    merged: bool,
}

#[derive(Clone, Copy, Debug)]
struct HandlerSlot {
    entry: Option<NodeId>,
    outer: Option<u32>,
}

// ── GraphBuilder ────────────────────────────────────────────────────

/// Arena of nodes and instructions for one function.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    instrs: Vec<Instr>,
    handlers: Vec<HandlerSlot>,
    continuations: Vec<(NodeId, Option<u32>)>,
    try_index: Option<u32>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler guarding nodes created from now on.
    pub fn try_index(&self) -> Option<u32> {
        self.try_index
    }

    pub fn set_try_index(&mut self, try_index: Option<u32>) {
        self.try_index = try_index;
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn push_node(&mut self, block_entry: bool, try_index: Option<u32>) -> NodeId {
        let id = NodeId::new(flint_ir::node::to_u32(self.nodes.len(), "nodes"));
        self.nodes.push(Node {
            block_entry,
            try_index,
            instrs: Vec::new(),
            exit: None,
            merged: false,
        });
        id
    }

    /// A new block entry under the current handler.
    pub fn target(&mut self) -> NodeId {
        self.push_node(true, self.try_index)
    }

    /// A new block entry under `try_index`.
    pub fn target_in(&mut self, try_index: Option<u32>) -> NodeId {
        self.push_node(true, try_index)
    }

    /// A one-instruction segment.
    pub fn emit(&mut self, instr: Instr) -> (Fragment, InstrId) {
        let id = InstrId::new(flint_ir::node::to_u32(self.instrs.len(), "instructions"));
        self.instrs.push(instr);
        let node = self.push_node(false, self.try_index);
        self.nodes[node.index()].instrs.push(id);
        (Fragment::at(node), id)
    }

    pub fn instr(&self, id: InstrId) -> &Instr {
        &self.instrs[id.index()]
    }

    /// `first` followed by `second`.
    ///
    /// The result is open exactly when `second` is. A leading segment of
    /// `second` merges into `first`'s open exit.
    pub fn append(&mut self, first: Fragment, second: Fragment) -> Result<Fragment, FragmentError> {
        let Some(entry) = first.entry else {
            return Ok(second);
        };
        let Some(current) = first.current else {
            return Err(FragmentError::AppendToClosed);
        };
        let Some(head) = second.entry else {
            return Ok(first);
        };
        let node = &self.nodes[head.index()];
        if node.block_entry || node.merged {
            return Err(FragmentError::AppendBlockEntry(head));
        }
        if self.nodes[current.index()].exit.is_some() {
            return Err(FragmentError::AlreadyTerminated(current));
        }

        let moved = std::mem::take(&mut self.nodes[head.index()].instrs);
        let exit = self.nodes[head.index()].exit.take();
        self.nodes[head.index()].merged = true;
        let target = &mut self.nodes[current.index()];
        target.instrs.extend(moved);
        target.exit = exit;

        let current = match second.current {
            Some(tail) if tail == head => Some(current),
            other => other,
        };
        Ok(Fragment {
            entry: Some(entry),
            current,
        })
    }

    fn terminate(&mut self, from: Fragment, exit: Exit) -> Result<Fragment, FragmentError> {
        for target in exit.successors() {
            if !self.nodes[target.index()].block_entry {
                return Err(FragmentError::JumpToSegment(target));
            }
        }
        let from = if from.is_empty() {
            Fragment::at(self.push_node(false, self.try_index))
        } else {
            from
        };
        let current = from.current.ok_or(FragmentError::AppendToClosed)?;
        let node = &mut self.nodes[current.index()];
        if node.exit.is_some() {
            return Err(FragmentError::AlreadyTerminated(current));
        }
        node.exit = Some(exit);
        Ok(Fragment {
            entry: from.entry,
            current: None,
        })
    }

    pub fn goto(&mut self, from: Fragment, target: NodeId) -> Result<Fragment, FragmentError> {
        self.terminate(from, Exit::Goto(target))
    }

    pub fn branch(
        &mut self,
        from: Fragment,
        cond: InstrId,
        then_node: NodeId,
        else_node: NodeId,
    ) -> Result<Fragment, FragmentError> {
        self.terminate(
            from,
            Exit::Branch {
                cond,
                then_node,
                else_node,
            },
        )
    }

    pub fn ret(&mut self, from: Fragment, value: InstrId) -> Result<Fragment, FragmentError> {
        self.terminate(from, Exit::Return(value))
    }

    pub fn throw(&mut self, from: Fragment, value: InstrId) -> Result<Fragment, FragmentError> {
        self.terminate(from, Exit::Throw(value))
    }

    pub fn rethrow(
        &mut self,
        from: Fragment,
        exception: InstrId,
        stack_trace: InstrId,
    ) -> Result<Fragment, FragmentError> {
        self.terminate(
            from,
            Exit::Rethrow {
                exception,
                stack_trace,
            },
        )
    }

    /// Merge the open ends of `arms`.
    ///
    /// Returns the node execution continues at: a new join when two or more
    /// arms are open, the only open arm's exit when one is, `None` otherwise.
    pub fn converge(&mut self, arms: &[Fragment]) -> Result<Option<NodeId>, FragmentError> {
        let open: SmallVec<[Fragment; 4]> = arms
            .iter()
            .copied()
            .filter(|arm| !arm.is_empty() && arm.is_open())
            .collect();
        match open.as_slice() {
            [] => Ok(None),
            [single] => Ok(single.current),
            _ => {
                let join = self.target();
                for arm in open {
                    self.goto(arm, join)?;
                }
                trace!(%join, arms = arms.len(), "joined");
                Ok(Some(join))
            }
        }
    }

    // ── Handlers and continuations ──────────────────────────────

    /// Register a handler nested in `outer`; its entry is set later.
    pub fn add_handler(&mut self, outer: Option<u32>) -> u32 {
        let index = flint_ir::node::to_u32(self.handlers.len(), "handlers");
        self.handlers.push(HandlerSlot { entry: None, outer });
        index
    }

    /// Handler enclosing handler `index`.
    pub fn handler_outer(&self, index: u32) -> Option<u32> {
        self.handlers.get(index as usize).and_then(|slot| slot.outer)
    }

    pub fn set_handler_entry(&mut self, index: u32, entry: NodeId) -> Result<(), FragmentError> {
        let slot = self
            .handlers
            .get_mut(index as usize)
            .ok_or(FragmentError::MissingHandler(index))?;
        slot.entry = Some(entry);
        Ok(())
    }

    /// Record a suspension point resuming at `entry`; returns its resumption
    /// index, starting at 1.
    pub fn add_continuation(&mut self, entry: NodeId) -> u32 {
        self.continuations.push((entry, self.nodes[entry.index()].try_index));
        flint_ir::node::to_u32(self.continuations.len(), "continuations")
    }

    /// Resumption entries in resumption order.
    pub fn continuations(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.continuations.iter().map(|(node, _)| *node)
    }

    // ── Finalization ────────────────────────────────────────────

    /// Number the nodes reachable from `entry` as blocks.
    ///
    /// Handler entries are reachable from every node their try body covers.
    /// Everything else, including the instructions of dropped nodes, stays
    /// out of the block list; instruction ids are unchanged.
    pub fn finish(mut self, entry: NodeId) -> Result<FlowGraph, FragmentError> {
        let mut order: Vec<NodeId> = Vec::new();
        let mut number: FxHashMap<NodeId, BlockId> = FxHashMap::default();
        let mut queue = VecDeque::from([entry]);
        number.insert(entry, BlockId::new(0));

        while let Some(id) = queue.pop_front() {
            order.push(id);
            let node = &self.nodes[id.index()];
            let exit = node.exit.as_ref().ok_or(FragmentError::Unterminated(id))?;
            let mut next: SmallVec<[NodeId; 3]> = exit.successors().into_iter().collect();
            if let Some(index) = node.try_index {
                let slot = self
                    .handlers
                    .get(index as usize)
                    .ok_or(FragmentError::MissingHandler(index))?;
                next.push(slot.entry.ok_or(FragmentError::MissingHandler(index))?);
            }
            for succ in next {
                if !number.contains_key(&succ) {
                    let block = BlockId::new(flint_ir::node::to_u32(number.len(), "blocks"));
                    number.insert(succ, block);
                    queue.push_back(succ);
                }
            }
        }

        let handler_of: FxHashMap<NodeId, u32> = self
            .handlers
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| Some((slot.entry?, flint_ir::node::to_u32(i, "handlers"))))
            .collect();

        let mut blocks = Vec::with_capacity(order.len());
        for id in &order {
            let node = &mut self.nodes[id.index()];
            let terminator = match node.exit.take() {
                Some(exit) => lower_exit(exit, &number),
                None => return Err(FragmentError::Unterminated(*id)),
            };
            blocks.push(Block {
                id: number[id],
                kind: BlockKind::Target,
                try_index: node.try_index,
                instrs: std::mem::take(&mut node.instrs),
                terminator,
                predecessors: Vec::new(),
            });
        }

        for index in 0..blocks.len() {
            let from = blocks[index].id;
            for succ in blocks[index].terminator.successors() {
                let preds = &mut blocks[succ.index()].predecessors;
                if preds.last() != Some(&from) {
                    preds.push(from);
                }
            }
        }
        for (block, id) in blocks.iter_mut().zip(&order) {
            block.kind = if block.id == BlockId::new(0) {
                BlockKind::FunctionEntry
            } else if let Some(handler) = handler_of.get(id) {
                BlockKind::Catch { handler: *handler }
            } else if block.predecessors.len() > 1 {
                BlockKind::Join
            } else {
                BlockKind::Target
            };
        }

        let handlers = self
            .handlers
            .iter()
            .map(|slot| Handler {
                entry: slot.entry.and_then(|node| number.get(&node).copied()),
                outer: slot.outer,
            })
            .collect();
        let continuations = self
            .continuations
            .iter()
            .filter_map(|(node, try_index)| {
                Some(YieldContinuation {
                    entry: number.get(node).copied()?,
                    try_index: *try_index,
                })
            })
            .collect();

        debug!(
            nodes = self.nodes.len(),
            blocks = blocks.len(),
            instrs = self.instrs.len(),
            "graph finished"
        );
        Ok(FlowGraph {
            blocks,
            instrs: self.instrs,
            handlers,
            continuations,
        })
    }
}

fn lower_exit(exit: Exit, number: &FxHashMap<NodeId, BlockId>) -> Terminator {
    match exit {
        Exit::Goto(target) => Terminator::Goto(number[&target]),
        Exit::Branch {
            cond,
            then_node,
            else_node,
        } => Terminator::Branch {
            cond,
            then_block: number[&then_node],
            else_block: number[&else_node],
        },
        Exit::Return(value) => Terminator::Return(value),
        Exit::Throw(value) => Terminator::Throw(value),
        Exit::Rethrow {
            exception,
            stack_trace,
        } => Terminator::Rethrow {
            exception,
            stack_trace,
        },
    }
}

#[cfg(test)]
mod tests;
