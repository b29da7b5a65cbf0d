//! Node tags of the binary IR.
//!
//! Every node starts with one tag byte. The specialized int literal packs a
//! small payload into the low three bits of its tag byte; [`Tag::split`]
//! separates the two.

use std::fmt;

macro_rules! define_tags {
    ($($name:ident = $value:literal,)*) => {
        /// Closed set of node kinds.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Tag {
            $($name = $value,)*
        }

        impl Tag {
            /// Decode a tag byte that carries no payload.
            fn from_plain(byte: u8) -> Option<Tag> {
                match byte {
                    $($value => Some(Tag::$name),)*
                    _ => None,
                }
            }

            /// Tag name as it appears in dumps and errors.
            pub fn name(self) -> &'static str {
                match self {
                    $(Tag::$name => stringify!($name),)*
                }
            }
        }
    };
}

define_tags! {
    Nothing = 0,
    Something = 1,

    // Members and member-like nodes
    FunctionNode = 3,

    // Initializers
    InvalidInitializer = 7,
    FieldInitializer = 8,
    SuperInitializer = 9,
    RedirectingInitializer = 10,
    LocalInitializer = 11,

    // Expressions
    DirectPropertyGet = 15,
    DirectPropertySet = 16,
    DirectMethodInvocation = 17,
    ConstStaticInvocation = 18,
    InvalidExpression = 19,
    VariableGet = 20,
    VariableSet = 21,
    PropertyGet = 22,
    PropertySet = 23,
    SuperPropertyGet = 24,
    SuperPropertySet = 25,
    StaticGet = 26,
    StaticSet = 27,
    MethodInvocation = 28,
    SuperMethodInvocation = 29,
    StaticInvocation = 30,
    ConstructorInvocation = 31,
    ConstConstructorInvocation = 32,
    Not = 33,
    LogicalExpression = 34,
    ConditionalExpression = 35,
    StringConcatenation = 36,
    IsExpression = 37,
    AsExpression = 38,
    StringLiteral = 39,
    DoubleLiteral = 40,
    TrueLiteral = 41,
    FalseLiteral = 42,
    NullLiteral = 43,
    SymbolLiteral = 44,
    TypeLiteral = 45,
    ThisExpression = 46,
    Rethrow = 47,
    Throw = 48,
    ListLiteral = 49,
    MapLiteral = 50,
    FunctionExpression = 52,
    Let = 53,
    PositiveIntLiteral = 55,
    NegativeIntLiteral = 56,
    BigIntLiteral = 57,
    ConstListLiteral = 58,
    ConstMapLiteral = 59,

    // Statements
    InvalidStatement = 60,
    ExpressionStatement = 61,
    Block = 62,
    EmptyStatement = 63,
    AssertStatement = 64,
    LabeledStatement = 65,
    BreakStatement = 66,
    WhileStatement = 67,
    DoStatement = 68,
    ForStatement = 69,
    ForInStatement = 70,
    SwitchStatement = 71,
    ContinueSwitchStatement = 72,
    IfStatement = 73,
    ReturnStatement = 74,
    TryCatch = 75,
    TryFinally = 76,
    YieldStatement = 77,
    VariableDeclaration = 78,
    FunctionDeclaration = 79,

    // Types
    BottomType = 89,
    InvalidType = 90,
    DynamicType = 91,
    VoidType = 92,
    InterfaceType = 93,
    FunctionType = 94,
    TypeParameterType = 95,
    SimpleInterfaceType = 96,
    SimpleFunctionType = 97,

    SpecializedIntLiteral = 0x90,
}

/// Mask selecting the payload bits of a specialized tag byte.
pub const SPECIALIZED_PAYLOAD_MASK: u8 = 0x07;

/// Bias subtracted from the payload of a specialized int literal.
pub const SPECIALIZED_INT_BIAS: i64 = 3;

/// Tag bytes at or above this value carry a payload.
const SPECIALIZED_TAG_FLOOR: u8 = 0x80;

impl Tag {
    /// Split a raw tag byte into its tag and payload.
    ///
    /// Returns `None` for bytes that name no tag.
    pub fn split(byte: u8) -> Option<(Tag, u8)> {
        if byte >= SPECIALIZED_TAG_FLOOR {
            let tag = Tag::from_plain(byte & !SPECIALIZED_PAYLOAD_MASK)?;
            Some((tag, byte & SPECIALIZED_PAYLOAD_MASK))
        } else {
            Tag::from_plain(byte).map(|tag| (tag, 0))
        }
    }

    /// Raw byte for this tag combined with `payload`.
    pub fn with_payload(self, payload: u8) -> u8 {
        debug_assert!(payload <= SPECIALIZED_PAYLOAD_MASK);
        (self as u8) | (payload & SPECIALIZED_PAYLOAD_MASK)
    }

    /// Whether this tag starts an expression node.
    pub fn is_expression(self) -> bool {
        matches!(self as u8, 15..=59 | 0x90)
    }

    /// Whether this tag starts a statement node.
    pub fn is_statement(self) -> bool {
        matches!(self as u8, 60..=79)
    }

    /// Whether this tag starts a type node.
    pub fn is_type(self) -> bool {
        matches!(self as u8, 89..=97)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Operator byte of a logical expression.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And = 0,
    Or = 1,
}

impl LogicalOp {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(LogicalOp::And),
            1 => Some(LogicalOp::Or),
            _ => None,
        }
    }
}

/// Async marker of a function node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum AsyncMarker {
    #[default]
    Sync = 0,
    SyncStar = 1,
    Async = 2,
    AsyncStar = 3,
    /// Body of a desugared generator or async function; contains native yields.
    SyncYielding = 4,
}

impl AsyncMarker {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(AsyncMarker::Sync),
            1 => Some(AsyncMarker::SyncStar),
            2 => Some(AsyncMarker::Async),
            3 => Some(AsyncMarker::AsyncStar),
            4 => Some(AsyncMarker::SyncYielding),
            _ => None,
        }
    }
}

/// Flags byte of a yield statement.
pub mod yield_flags {
    pub const STAR: u8 = 1 << 0;
    /// Lowered suspension point emitted by the async/generator desugaring.
    pub const NATIVE: u8 = 1 << 1;
}

/// Flags byte of a try/catch statement.
pub mod try_catch_flags {
    pub const NEEDS_STACK_TRACE: u8 = 1 << 0;
    pub const IS_SYNTHETIC: u8 = 1 << 1;
}

/// Flags byte of an `as` expression.
pub mod as_flags {
    /// The cast was inserted by the front end for an implicit downcast.
    pub const TYPE_ERROR: u8 = 1 << 0;
}

#[cfg(test)]
mod tests;
