use std::fmt;
use std::sync::Arc;

use flint_ir::program::ProcedureKind;
use flint_ir::{CanonicalRef, NameResolver, NodeRef, ProcedureAttributes, SourceUnit, SymbolKind};

use crate::{ContextScope, ScopeError};

/// What kind of body is being compiled.
///
/// Only regular functions, constructors, factories and closures are read from the
/// IR. The other kinds get bodies synthesized by the flow builder from their
/// member's declaration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Regular,
    Constructor,
    Factory,
    Closure,
    ImplicitGetter,
    ImplicitSetter,
    ImplicitStaticGetter,
    /// Getter returning a tear-off of a method.
    MethodExtractor,
    /// Body of a tear-off closure; forwards to the torn-off method.
    ImplicitClosure,
    DynamicInvocationForwarder,
    NoSuchMethodForwarder,
}

impl FunctionKind {
    /// Invoked through a closure object, which arrives as the first parameter.
    pub fn is_closure(self) -> bool {
        matches!(self, FunctionKind::Closure | FunctionKind::ImplicitClosure)
    }

    /// Whether the body is read from the function node.
    pub fn has_ir_body(self) -> bool {
        matches!(
            self,
            FunctionKind::Regular
                | FunctionKind::Constructor
                | FunctionKind::Factory
                | FunctionKind::Closure
        )
    }

    /// Whether the kind takes the declared parameters of its function node.
    pub fn takes_declared_parameters(self) -> bool {
        !matches!(
            self,
            FunctionKind::ImplicitGetter
                | FunctionKind::ImplicitSetter
                | FunctionKind::ImplicitStaticGetter
                | FunctionKind::MethodExtractor
        )
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FunctionKind::Regular => "regular",
            FunctionKind::Constructor => "constructor",
            FunctionKind::Factory => "factory",
            FunctionKind::Closure => "closure",
            FunctionKind::ImplicitGetter => "implicit getter",
            FunctionKind::ImplicitSetter => "implicit setter",
            FunctionKind::ImplicitStaticGetter => "implicit static getter",
            FunctionKind::MethodExtractor => "method extractor",
            FunctionKind::ImplicitClosure => "implicit closure",
            FunctionKind::DynamicInvocationForwarder => "dynamic invocation forwarder",
            FunctionKind::NoSuchMethodForwarder => "noSuchMethod forwarder",
        };
        f.write_str(name)
    }
}

/// Which parameters the callee checks against their declared types.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeCheckPolicy {
    All,
    None,
    /// Only covariant and generic-covariant-impl parameters; static types at the
    /// call sites cover the rest.
    OnlyCovariant,
    /// Every caller is statically checked.
    CallerChecked,
}

impl TypeCheckPolicy {
    pub fn for_function(
        kind: FunctionKind,
        is_static: bool,
        attributes: ProcedureAttributes,
    ) -> Self {
        match kind {
            FunctionKind::Closure
            | FunctionKind::ImplicitClosure
            | FunctionKind::DynamicInvocationForwarder => TypeCheckPolicy::All,
            FunctionKind::MethodExtractor
            | FunctionKind::NoSuchMethodForwarder
            | FunctionKind::ImplicitGetter
            | FunctionKind::ImplicitStaticGetter => TypeCheckPolicy::None,
            FunctionKind::Constructor | FunctionKind::Factory => TypeCheckPolicy::CallerChecked,
            FunctionKind::Regular | FunctionKind::ImplicitSetter if is_static => {
                TypeCheckPolicy::CallerChecked
            }
            FunctionKind::Regular | FunctionKind::ImplicitSetter => {
                if attributes.contains(ProcedureAttributes::HAS_DYNAMIC_INVOCATIONS) {
                    TypeCheckPolicy::All
                } else {
                    TypeCheckPolicy::OnlyCovariant
                }
            }
        }
    }

    /// Whether a parameter with the given covariance is checked in the callee.
    pub fn checks(self, covariant: bool) -> bool {
        match self {
            TypeCheckPolicy::All => true,
            TypeCheckPolicy::OnlyCovariant => covariant,
            TypeCheckPolicy::None | TypeCheckPolicy::CallerChecked => false,
        }
    }
}

/// The function a scope build runs over.
#[derive(Clone, Debug)]
pub struct ScopeTarget {
    pub member: CanonicalRef,
    pub kind: FunctionKind,
    /// Function node of the body; `None` for field accessors.
    pub function: Option<NodeRef>,
    /// Context exported by the enclosing function, for closures.
    pub outer: Option<Arc<ContextScope>>,
}

impl ScopeTarget {
    /// The declared body of `member`.
    pub fn member(unit: &SourceUnit, member: CanonicalRef) -> Result<Self, ScopeError> {
        let symbol = unit
            .program()
            .resolve(member)
            .ok_or(ScopeError::UnknownMember(member))?;
        let (kind, function) = match &symbol.kind {
            SymbolKind::Procedure(info) if info.kind == ProcedureKind::Factory => {
                (FunctionKind::Factory, Some(info.function))
            }
            SymbolKind::Procedure(info) => (FunctionKind::Regular, Some(info.function)),
            SymbolKind::Constructor(info) => (FunctionKind::Constructor, Some(info.function)),
            SymbolKind::Field(info) if info.is_static() => (FunctionKind::ImplicitStaticGetter, None),
            SymbolKind::Field(_) => (FunctionKind::ImplicitGetter, None),
            SymbolKind::Library | SymbolKind::Class(_) => {
                return Err(ScopeError::UnknownMember(member))
            }
        };
        Ok(Self {
            member,
            kind,
            function,
            outer: None,
        })
    }

    /// A synthesized body of `kind` derived from `member`'s declaration.
    pub fn synthetic(
        unit: &SourceUnit,
        member: CanonicalRef,
        kind: FunctionKind,
    ) -> Result<Self, ScopeError> {
        let mut target = Self::member(unit, member)?;
        target.kind = kind;
        Ok(target)
    }

    /// A closure declared inside `member`, compiled against its parent's context.
    pub fn closure(member: CanonicalRef, function: NodeRef, outer: Arc<ContextScope>) -> Self {
        Self {
            member,
            kind: FunctionKind::Closure,
            function: Some(function),
            outer: Some(outer),
        }
    }
}
