//! The control-flow graph a function lowers to.
//!
//! Blocks hold instruction ids; every instruction of the function lives in one
//! arena on the [`FlowGraph`]. Values are named by the instruction producing
//! them. Exceptional edges are implicit: a block inside a try body lists the
//! index of its [`Handler`], and the handler's entry is a [`BlockKind::Catch`].

use std::fmt;
use std::sync::Arc;

use smallvec::{smallvec, SmallVec};

use flint_ir::metadata::InferredType;
use flint_ir::{CanonicalRef, ConstantId, NodeRef, ResolvedType, SourceError, TokenPos};
use flint_scope::VarId;

// ── ID newtypes ─────────────────────────────────────────────────────

/// Basic block of a finished graph. `BlockId(0)` is the function entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
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

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// Instruction in the graph's arena, and the value it produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct InstrId(u32);

impl InstrId {
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

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

// ── Instructions ────────────────────────────────────────────────────

/// What a call invokes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Callee {
    /// A statically known procedure or constructor.
    Static(CanonicalRef),
    /// Dynamic dispatch on the first argument. Accessors use `get:` and `set:`
    /// prefixed names.
    Instance(Arc<str>),
    /// The closure in the first argument.
    Closure,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Call {
    pub callee: Callee,
    /// Receiver first for instance and closure calls, then positional
    /// arguments, then named ones.
    pub args: Vec<InstrId>,
    /// Names of the trailing named arguments, in call order.
    pub names: Vec<Arc<str>>,
    pub type_arguments: Vec<ResolvedType>,
}

impl Call {
    pub fn new(callee: Callee, args: Vec<InstrId>) -> Self {
        Self {
            callee,
            args,
            names: Vec::new(),
            type_arguments: Vec::new(),
        }
    }
}

/// One operation. Operands refer to earlier instructions.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Constant(ConstantId),
    /// Incoming argument `index` of the calling convention; optional
    /// parameters fall back to `default`.
    Parameter {
        index: u32,
        default: Option<ConstantId>,
    },
    LoadLocal(VarId),
    StoreLocal {
        var: VarId,
        value: InstrId,
    },
    /// Read a context slot `hops` parent links above the current context.
    LoadContext {
        var: VarId,
        hops: u32,
        index: u32,
    },
    StoreContext {
        var: VarId,
        hops: u32,
        index: u32,
        value: InstrId,
    },
    /// Allocate a context whose parent is the current one and make it current.
    EnterContext {
        level: u32,
        size: u32,
    },
    /// Make the parent of the current context current.
    ExitContext,
    /// Replace the current context with a shallow copy, so closures created so
    /// far keep the old bindings.
    CloneContext,
    CurrentContext,
    SetContext(InstrId),
    /// The context captured by a closure object.
    ClosureContext(InstrId),
    /// The receiver bound into a tear-off closure.
    ClosureReceiver(InstrId),
    LoadStatic(CanonicalRef),
    /// Run a static field's initializer if it has not run yet.
    InitStatic(CanonicalRef),
    StoreStatic {
        field: CanonicalRef,
        value: InstrId,
    },
    LoadField {
        receiver: InstrId,
        field: CanonicalRef,
    },
    StoreField {
        receiver: InstrId,
        field: CanonicalRef,
        value: InstrId,
    },
    Call(Box<Call>),
    AllocateObject(CanonicalRef),
    /// Closure over the function node at `function`, capturing the current
    /// context.
    AllocateClosure {
        function: NodeRef,
    },
    TearOff {
        receiver: InstrId,
        target: CanonicalRef,
    },
    Not(InstrId),
    /// `==` as the language defines it, including the null checks.
    Equals {
        left: InstrId,
        right: InstrId,
    },
    IsNull(InstrId),
    /// Throws if the value is null.
    CheckNull(InstrId),
    InstanceOf {
        value: InstrId,
        ty: ResolvedType,
    },
    /// Throws a type error unless the value is assignable to `ty`.
    AssertAssignable {
        value: InstrId,
        ty: ResolvedType,
        name: Arc<str>,
    },
    /// Type object for a type that mentions type parameters, instantiated
    /// with the current type arguments.
    InstantiateType(ResolvedType),
    Interpolate(Vec<InstrId>),
    CreateList(Vec<InstrId>),
    /// Keys and values alternate.
    CreateMap(Vec<InstrId>),
    /// The exception being handled, at a catch entry.
    LoadException,
    LoadStackTrace,
    /// The error object for a source error deferred to runtime.
    MakeError(SourceError),
    AssertionError {
        message: Option<InstrId>,
        start: TokenPos,
        end: TokenPos,
    },
    /// The `Invocation` object a no-such-method forwarder passes on.
    InvocationMirror {
        name: Arc<str>,
        arguments: Vec<InstrId>,
        names: Vec<Arc<str>>,
    },
    CheckStackOverflow {
        loop_depth: u32,
    },
}

impl Op {
    /// Operands read by this operation.
    pub fn operands(&self) -> SmallVec<[InstrId; 4]> {
        match self {
            Op::Constant(_)
            | Op::Parameter { .. }
            | Op::LoadLocal(_)
            | Op::LoadContext { .. }
            | Op::EnterContext { .. }
            | Op::ExitContext
            | Op::CloneContext
            | Op::CurrentContext
            | Op::LoadStatic(_)
            | Op::InitStatic(_)
            | Op::AllocateObject(_)
            | Op::AllocateClosure { .. }
            | Op::LoadException
            | Op::LoadStackTrace
            | Op::MakeError(_)
            | Op::InstantiateType(_)
            | Op::CheckStackOverflow { .. } => SmallVec::new(),
            Op::StoreLocal { value, .. }
            | Op::StoreContext { value, .. }
            | Op::StoreStatic { value, .. }
            | Op::SetContext(value)
            | Op::ClosureContext(value)
            | Op::ClosureReceiver(value)
            | Op::Not(value)
            | Op::IsNull(value)
            | Op::CheckNull(value)
            | Op::InstanceOf { value, .. }
            | Op::AssertAssignable { value, .. } => smallvec![*value],
            Op::LoadField { receiver, .. } | Op::TearOff { receiver, .. } => smallvec![*receiver],
            Op::StoreField {
                receiver, value, ..
            } => smallvec![*receiver, *value],
            Op::Equals { left, right } => smallvec![*left, *right],
            Op::Call(call) => call.args.iter().copied().collect(),
            Op::Interpolate(values) | Op::CreateList(values) | Op::CreateMap(values) => {
                values.iter().copied().collect()
            }
            Op::InvocationMirror { arguments, .. } => arguments.iter().copied().collect(),
            Op::AssertionError { message, .. } => message.iter().copied().collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Instr {
    pub op: Op,
    pub pos: TokenPos,
    /// Result type recorded for the originating expression.
    pub inferred: Option<InferredType>,
}

// ── Terminators ─────────────────────────────────────────────────────

/// How control leaves a block.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Terminator {
    Goto(BlockId),
    Branch {
        cond: InstrId,
        then_block: BlockId,
        else_block: BlockId,
    },
    Return(InstrId),
    Throw(InstrId),
    Rethrow {
        exception: InstrId,
        stack_trace: InstrId,
    },
}

impl Terminator {
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            Terminator::Goto(target) => smallvec![*target],
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => smallvec![*then_block, *else_block],
            Terminator::Return(_) | Terminator::Throw(_) | Terminator::Rethrow { .. } => {
                SmallVec::new()
            }
        }
    }
}

// ── Blocks ──────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind {
    FunctionEntry,
    /// Entered from exactly one predecessor.
    Target,
    /// Entered from several predecessors.
    Join,
    /// Entry of an exception handler; entered from its try body.
    Catch { handler: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub id: BlockId,
    pub kind: BlockKind,
    /// Handler guarding this block's instructions.
    pub try_index: Option<u32>,
    pub instrs: Vec<InstrId>,
    pub terminator: Terminator,
    /// Explicit-edge predecessors, deduplicated, in block order.
    pub predecessors: Vec<BlockId>,
}

/// An exception handler.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Handler {
    /// `None` when nothing in the try body survived finalization.
    pub entry: Option<BlockId>,
    /// Handler enclosing this one.
    pub outer: Option<u32>,
}

/// A suspension point of a resumable function.
///
/// Resumption `n` (1-based; 0 is the initial entry) continues at the `n - 1`th
/// entry of [`FlowGraph::continuations`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct YieldContinuation {
    pub entry: BlockId,
    pub try_index: Option<u32>,
}

/// A finished graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowGraph {
    pub blocks: Vec<Block>,
    pub instrs: Vec<Instr>,
    pub handlers: Vec<Handler>,
    pub continuations: Vec<YieldContinuation>,
}

impl FlowGraph {
    pub fn entry(&self) -> BlockId {
        BlockId::new(0)
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn instr(&self, id: InstrId) -> &Instr {
        &self.instrs[id.index()]
    }

    /// Instructions of `block` in execution order.
    pub fn block_instrs(&self, block: BlockId) -> impl Iterator<Item = (InstrId, &Instr)> + '_ {
        self.block(block)
            .instrs
            .iter()
            .map(move |id| (*id, self.instr(*id)))
    }

    /// Every instruction placed in some block.
    pub fn placed_instrs(&self) -> impl Iterator<Item = (BlockId, InstrId, &Instr)> + '_ {
        self.blocks.iter().flat_map(move |block| {
            block
                .instrs
                .iter()
                .map(move |id| (block.id, *id, self.instr(*id)))
        })
    }

    pub fn successors(&self, block: BlockId) -> SmallVec<[BlockId; 2]> {
        self.block(block).terminator.successors()
    }
}
