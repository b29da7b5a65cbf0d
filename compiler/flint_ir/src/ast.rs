//! Owned tree form of the binary IR.
//!
//! Compilation never builds these trees: every traversal works on offsets.
//! They exist for the encoder (fixtures, containers) and the decoder
//! (dumps, symmetry checks). Variable references name their declaration by
//! [`VarLabel`]; the encoder turns labels into declaration offsets and the
//! decoder turns offsets back into labels.

use crate::tag::{AsyncMarker, LogicalOp};
use crate::{CanonicalRef, TokenPos, VariableFlags};

/// Identifies a variable declaration within one encoded tree.
///
/// Decoded trees use the declaration's offset as its label.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VarLabel(pub u32);

/// Identifies a function node within one encoded tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FnLabel(pub u32);

#[derive(Clone, Debug, PartialEq)]
pub enum TypeNode {
    Invalid,
    Dynamic,
    Void,
    Bottom,
    Interface {
        class: CanonicalRef,
        arguments: Vec<TypeNode>,
    },
    SimpleInterface(CanonicalRef),
    Function {
        type_parameters: Vec<TypeParameter>,
        required: u32,
        positional: Vec<TypeNode>,
        named: Vec<(String, TypeNode)>,
        return_type: Box<TypeNode>,
    },
    SimpleFunction {
        positional: Vec<TypeNode>,
        return_type: Box<TypeNode>,
    },
    Parameter {
        index: u32,
        bound: Option<Box<TypeNode>>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeParameter {
    pub flags: u8,
    pub name: String,
    pub bound: TypeNode,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Arguments {
    pub types: Vec<TypeNode>,
    pub positional: Vec<Expression>,
    pub named: Vec<(String, Expression)>,
}

impl Arguments {
    pub fn positional(values: Vec<Expression>) -> Self {
        Self {
            positional: values,
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.positional.len() + self.named.len()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Invalid {
        pos: TokenPos,
        message: String,
    },
    VariableGet {
        pos: TokenPos,
        var: VarLabel,
        promoted: Option<TypeNode>,
    },
    VariableSet {
        pos: TokenPos,
        var: VarLabel,
        value: Box<Expression>,
    },
    PropertyGet {
        pos: TokenPos,
        receiver: Box<Expression>,
        name: String,
        target: CanonicalRef,
    },
    PropertySet {
        pos: TokenPos,
        receiver: Box<Expression>,
        name: String,
        value: Box<Expression>,
        target: CanonicalRef,
    },
    DirectPropertyGet {
        pos: TokenPos,
        receiver: Box<Expression>,
        target: CanonicalRef,
    },
    DirectPropertySet {
        pos: TokenPos,
        receiver: Box<Expression>,
        target: CanonicalRef,
        value: Box<Expression>,
    },
    DirectMethodInvocation {
        pos: TokenPos,
        receiver: Box<Expression>,
        target: CanonicalRef,
        arguments: Arguments,
    },
    SuperPropertyGet {
        pos: TokenPos,
        name: String,
        target: CanonicalRef,
    },
    SuperPropertySet {
        pos: TokenPos,
        name: String,
        value: Box<Expression>,
        target: CanonicalRef,
    },
    StaticGet {
        pos: TokenPos,
        target: CanonicalRef,
    },
    StaticSet {
        pos: TokenPos,
        target: CanonicalRef,
        value: Box<Expression>,
    },
    MethodInvocation {
        pos: TokenPos,
        receiver: Box<Expression>,
        name: String,
        arguments: Arguments,
        target: CanonicalRef,
    },
    SuperMethodInvocation {
        pos: TokenPos,
        name: String,
        arguments: Arguments,
        target: CanonicalRef,
    },
    StaticInvocation {
        pos: TokenPos,
        target: CanonicalRef,
        arguments: Arguments,
        is_const: bool,
    },
    ConstructorInvocation {
        pos: TokenPos,
        target: CanonicalRef,
        arguments: Arguments,
        is_const: bool,
    },
    Not(Box<Expression>),
    Logical {
        left: Box<Expression>,
        op: LogicalOp,
        right: Box<Expression>,
    },
    Conditional {
        condition: Box<Expression>,
        then: Box<Expression>,
        otherwise: Box<Expression>,
        static_type: Option<TypeNode>,
    },
    StringConcatenation {
        pos: TokenPos,
        parts: Vec<Expression>,
    },
    Is {
        pos: TokenPos,
        operand: Box<Expression>,
        ty: TypeNode,
    },
    As {
        pos: TokenPos,
        flags: u8,
        operand: Box<Expression>,
        ty: TypeNode,
    },
    StringLiteral(String),
    /// Encoded in the smallest fitting form; values outside the varint
    /// range are written as big-int literals.
    IntLiteral(i64),
    BigIntLiteral(String),
    DoubleLiteral(f64),
    BoolLiteral(bool),
    NullLiteral,
    SymbolLiteral(String),
    TypeLiteral(TypeNode),
    This,
    Rethrow {
        pos: TokenPos,
    },
    Throw {
        pos: TokenPos,
        value: Box<Expression>,
    },
    ListLiteral {
        pos: TokenPos,
        element_type: TypeNode,
        elements: Vec<Expression>,
        is_const: bool,
    },
    MapLiteral {
        pos: TokenPos,
        key_type: TypeNode,
        value_type: TypeNode,
        entries: Vec<(Expression, Expression)>,
        is_const: bool,
    },
    FunctionExpression {
        pos: TokenPos,
        function: Box<FunctionNode>,
    },
    Let {
        variable: Box<VariableDeclaration>,
        body: Box<Expression>,
    },
}

impl Expression {
    pub fn int(value: i64) -> Self {
        Expression::IntLiteral(value)
    }

    pub fn string(text: &str) -> Self {
        Expression::StringLiteral(text.to_owned())
    }

    pub fn get(var: VarLabel) -> Self {
        Expression::VariableGet {
            pos: TokenPos::NO_SOURCE,
            var,
            promoted: None,
        }
    }

    pub fn set(var: VarLabel, value: Expression) -> Self {
        Expression::VariableSet {
            pos: TokenPos::NO_SOURCE,
            var,
            value: Box::new(value),
        }
    }

    pub fn static_call(target: CanonicalRef, positional: Vec<Expression>) -> Self {
        Expression::StaticInvocation {
            pos: TokenPos::NO_SOURCE,
            target,
            arguments: Arguments::positional(positional),
            is_const: false,
        }
    }

    /// `receiver.name(positional...)` dispatched dynamically.
    pub fn method(receiver: Expression, name: &str, positional: Vec<Expression>) -> Self {
        Expression::MethodInvocation {
            pos: TokenPos::NO_SOURCE,
            receiver: Box::new(receiver),
            name: name.to_owned(),
            arguments: Arguments::positional(positional),
            target: CanonicalRef::NULL,
        }
    }

    pub fn static_get(target: CanonicalRef) -> Self {
        Expression::StaticGet {
            pos: TokenPos::NO_SOURCE,
            target,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariableDeclaration {
    pub label: VarLabel,
    pub pos: TokenPos,
    pub equals_pos: TokenPos,
    pub flags: VariableFlags,
    pub name: String,
    pub ty: TypeNode,
    pub initializer: Option<Box<Expression>>,
}

impl VariableDeclaration {
    pub fn new(label: u32, name: &str) -> Self {
        Self {
            label: VarLabel(label),
            pos: TokenPos::NO_SOURCE,
            equals_pos: TokenPos::NO_SOURCE,
            flags: VariableFlags::empty(),
            name: name.to_owned(),
            ty: TypeNode::Dynamic,
            initializer: None,
        }
    }

    #[must_use]
    pub fn with_initializer(mut self, value: Expression) -> Self {
        self.initializer = Some(Box::new(value));
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: VariableFlags) -> Self {
        self.flags |= flags;
        self
    }

    #[must_use]
    pub fn with_type(mut self, ty: TypeNode) -> Self {
        self.ty = ty;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionNode {
    pub label: FnLabel,
    pub pos: TokenPos,
    pub end_pos: TokenPos,
    pub async_marker: AsyncMarker,
    pub dart_async_marker: AsyncMarker,
    pub type_parameters: Vec<TypeParameter>,
    pub required_parameter_count: u32,
    pub positional: Vec<VariableDeclaration>,
    pub named: Vec<VariableDeclaration>,
    pub return_type: TypeNode,
    pub body: Option<Box<Statement>>,
}

impl FunctionNode {
    /// A synchronous function whose positional parameters are all required.
    pub fn new(label: u32, positional: Vec<VariableDeclaration>, body: Statement) -> Self {
        Self {
            label: FnLabel(label),
            pos: TokenPos::NO_SOURCE,
            end_pos: TokenPos::NO_SOURCE,
            async_marker: AsyncMarker::Sync,
            dart_async_marker: AsyncMarker::Sync,
            type_parameters: Vec::new(),
            required_parameter_count: crate::node::to_u32(positional.len(), "parameters"),
            positional,
            named: Vec::new(),
            return_type: TypeNode::Dynamic,
            body: Some(Box::new(body)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchCase {
    pub expressions: Vec<(TokenPos, Expression)>,
    pub is_default: bool,
    pub body: Statement,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Catch {
    pub pos: TokenPos,
    pub guard: TypeNode,
    pub exception: Option<VariableDeclaration>,
    pub stack_trace: Option<VariableDeclaration>,
    pub body: Statement,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Invalid,
    Expression(Expression),
    Block {
        pos: TokenPos,
        end_pos: TokenPos,
        statements: Vec<Statement>,
    },
    Empty,
    Assert {
        condition: Expression,
        start: TokenPos,
        end: TokenPos,
        message: Option<Expression>,
    },
    Labeled(Box<Statement>),
    Break {
        pos: TokenPos,
        label: u32,
    },
    While {
        pos: TokenPos,
        condition: Expression,
        body: Box<Statement>,
    },
    Do {
        pos: TokenPos,
        body: Box<Statement>,
        condition: Expression,
    },
    For {
        pos: TokenPos,
        variables: Vec<VariableDeclaration>,
        condition: Option<Expression>,
        updates: Vec<Expression>,
        body: Box<Statement>,
    },
    ForIn {
        pos: TokenPos,
        body_pos: TokenPos,
        variable: VariableDeclaration,
        iterable: Expression,
        body: Box<Statement>,
    },
    Switch {
        pos: TokenPos,
        scrutinee: Expression,
        cases: Vec<SwitchCase>,
    },
    ContinueSwitch {
        pos: TokenPos,
        case: u32,
    },
    If {
        pos: TokenPos,
        condition: Expression,
        then: Box<Statement>,
        otherwise: Box<Statement>,
    },
    Return {
        pos: TokenPos,
        value: Option<Expression>,
    },
    TryCatch {
        body: Box<Statement>,
        flags: u8,
        catches: Vec<Catch>,
    },
    TryFinally {
        body: Box<Statement>,
        finalizer: Box<Statement>,
    },
    Yield {
        pos: TokenPos,
        flags: u8,
        value: Expression,
    },
    VariableDeclaration(VariableDeclaration),
    FunctionDeclaration {
        pos: TokenPos,
        variable: VariableDeclaration,
        function: Box<FunctionNode>,
    },
}

impl Statement {
    pub fn block(statements: Vec<Statement>) -> Self {
        Statement::Block {
            pos: TokenPos::NO_SOURCE,
            end_pos: TokenPos::NO_SOURCE,
            statements,
        }
    }

    pub fn expr(expression: Expression) -> Self {
        Statement::Expression(expression)
    }

    pub fn ret(value: Option<Expression>) -> Self {
        Statement::Return {
            pos: TokenPos::NO_SOURCE,
            value,
        }
    }

    pub fn brk(label: u32) -> Self {
        Statement::Break {
            pos: TokenPos::NO_SOURCE,
            label,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Initializer {
    Invalid,
    Field {
        field: CanonicalRef,
        value: Expression,
    },
    Super {
        pos: TokenPos,
        target: CanonicalRef,
        arguments: Arguments,
    },
    Redirecting {
        pos: TokenPos,
        target: CanonicalRef,
        arguments: Arguments,
    },
    Local(VariableDeclaration),
}
