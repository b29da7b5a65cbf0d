//! Function entry and the bodies of each function kind.
//!
//! Only regular functions, factories, closures and constructors have a body
//! in the IR. Accessors, tear-offs and forwarders get one synthesized here
//! from their member's declaration.

use std::sync::Arc;

use flint_ir::tag::Tag;
use flint_ir::{Cursor, IrError, NameResolver, Symbol, TokenPos};
use flint_scope::{names, FunctionKind, Storage, VarId, VariableKind};

use super::{BuildResult, FlowBuilder};
use crate::ir::{Call, Callee, InstrId, Op};
use crate::{BuildError, Fragment};

impl FlowBuilder<'_, '_> {
    fn entry_pos(&self) -> TokenPos {
        self.scopes.scope(self.scopes.tree.root()).begin
    }

    /// Incoming value of the parameter `var`, before it is copied anywhere.
    fn incoming(&mut self, body: Fragment, var: VarId, pos: TokenPos) -> BuildResult<(Fragment, InstrId)> {
        let variable = self.scopes.variable(var);
        let Some(index) = variable.param_index else {
            return self.load(body, var, pos);
        };
        let op = Op::Parameter {
            index,
            default: variable.const_value,
        };
        self.emit(body, op, pos)
    }

    /// Install the context, copy parameters where they are read from, and
    /// check their types.
    pub(super) fn prologue(&mut self, body: Fragment) -> BuildResult<Fragment> {
        let scopes = self.scopes;
        let pos = self.entry_pos();
        let mut body = body;

        if scopes.kind.is_closure() && scopes.outer_context_level > 0 {
            let closure = self.synthetic(scopes.synthetic.closure, names::CLOSURE)?;
            let (next, value) = self.incoming(body, closure, pos)?;
            let (next, context) = self.emit(next, Op::ClosureContext(value), pos)?;
            body = self.emit(next, Op::SetContext(context), pos)?.0;
        }
        let (mut body, _) = self.enter_scope_id(body, scopes.tree.root(), pos)?;

        for &var in &scopes.parameters {
            let variable = scopes.variable(var);
            let copied = match variable.storage {
                Storage::Context { .. } => true,
                Storage::Parameter { .. } => variable.const_value.is_some(),
                Storage::Stack { .. } | Storage::Unallocated => false,
            };
            if copied {
                let (next, value) = self.incoming(body, var, pos)?;
                body = self.store(next, var, value, pos)?;
            }
        }
        for &var in &scopes.parameters {
            let variable = scopes.variable(var);
            if !variable.needs_type_check {
                continue;
            }
            let (next, value) = self.load(body, var, variable.pos)?;
            let op = Op::AssertAssignable {
                value,
                ty: variable.ty.clone(),
                name: variable.name.clone(),
            };
            body = self.emit(next, op, variable.pos)?.0;
        }
        self.stack_check(body, pos)
    }

    /// The function's body, starting at `start`.
    pub(super) fn body(&mut self, start: Fragment) -> BuildResult<Fragment> {
        let pos = self.entry_pos();
        let member = self.scopes.member;
        match self.scopes.kind {
            FunctionKind::Regular | FunctionKind::Factory | FunctionKind::Closure => {
                self.function_body(start)
            }
            FunctionKind::Constructor => {
                let body = self.field_initializers(start, pos)?;
                let body = self.initializer_list(body)?;
                self.function_body(body)
            }
            FunctionKind::ImplicitGetter => {
                let (body, this) = self.this(start, pos)?;
                let op = Op::LoadField {
                    receiver: this,
                    field: member,
                };
                let (body, value) = self.emit(body, op, pos)?;
                Ok(self.graph.ret(body, value)?)
            }
            FunctionKind::ImplicitSetter => {
                let value = *self
                    .scopes
                    .parameters
                    .last()
                    .ok_or_else(|| BuildError::MissingSynthetic("value".to_owned()))?;
                let (body, this) = self.this(start, pos)?;
                let (body, value) = self.load(body, value, pos)?;
                let op = Op::StoreField {
                    receiver: this,
                    field: member,
                    value,
                };
                Ok(self.emit(body, op, pos)?.0)
            }
            FunctionKind::ImplicitStaticGetter => self.static_getter_body(start, pos),
            FunctionKind::MethodExtractor => {
                let (body, this) = self.this(start, pos)?;
                let op = Op::TearOff {
                    receiver: this,
                    target: member,
                };
                let (body, value) = self.emit(body, op, pos)?;
                Ok(self.graph.ret(body, value)?)
            }
            FunctionKind::ImplicitClosure => {
                let body = match self.scopes.synthetic.this {
                    Some(this) => {
                        let closure =
                            self.synthetic(self.scopes.synthetic.closure, names::CLOSURE)?;
                        let (body, value) = self.load(start, closure, pos)?;
                        let (body, receiver) = self.emit(body, Op::ClosureReceiver(value), pos)?;
                        self.store(body, this, receiver, pos)?
                    }
                    None => start,
                };
                let (body, result) = self.forward(body, pos)?;
                Ok(self.graph.ret(body, result)?)
            }
            FunctionKind::DynamicInvocationForwarder => {
                let (body, result) = self.forward(start, pos)?;
                Ok(self.graph.ret(body, result)?)
            }
            FunctionKind::NoSuchMethodForwarder => {
                let (body, arguments, names) = self.forwarded_parameters(start, pos)?;
                let op = Op::InvocationMirror {
                    name: Arc::from(self.symbol.name.as_str()),
                    arguments,
                    names,
                };
                let (body, mirror) = self.emit(body, op, pos)?;
                let (body, mut args) = self.receiver_arguments(body, pos)?;
                args.push(mirror);
                let (body, result) = self.call_instance(body, "noSuchMethod", args, pos)?;
                Ok(self.graph.ret(body, result)?)
            }
        }
    }

    fn function_body(&mut self, body: Fragment) -> BuildResult<Fragment> {
        let Some(function) = self.scopes.function else {
            return Ok(body);
        };
        if body.is_closed() {
            return Ok(body);
        }
        let layout = self.unit.cursor_at(function).scan_function_node()?;
        match layout.body {
            Some(statement) => {
                let mut c = self.unit.cursor_at(statement);
                self.visit_statement(body, &mut c)
            }
            None => Ok(body),
        }
    }

    // ── Constructors ────────────────────────────────────────────

    /// Instance fields with initializers, in declaration order.
    fn field_initializers(&mut self, mut body: Fragment, pos: TokenPos) -> BuildResult<Fragment> {
        let program = self.unit.program();
        for member in program.members(self.symbol.parent) {
            let Some(field) = program.resolve(member).and_then(Symbol::as_field) else {
                continue;
            };
            let Some(init) = field.initializer.filter(|_| !field.is_static()) else {
                continue;
            };
            let (next, this) = self.this(body, pos)?;
            let mut c = self.unit.cursor_at(init);
            let (next, value) = self.visit_value(next, &mut c)?;
            let op = Op::StoreField {
                receiver: this,
                field: member,
                value,
            };
            body = self.emit(next, op, pos)?.0;
        }
        Ok(body)
    }

    fn initializer_list(&mut self, mut body: Fragment) -> BuildResult<Fragment> {
        let Some(info) = self.symbol.as_constructor() else {
            return Ok(body);
        };
        let mut c = self.unit.cursor_at(info.initializers);
        let len = c.read_list_length()?;
        for _ in 0..len {
            body = self.initializer(body, &mut c)?;
        }
        Ok(body)
    }

    fn initializer(&mut self, body: Fragment, c: &mut Cursor<'_>) -> BuildResult<Fragment> {
        let offset = c.offset();
        match c.read_tag()? {
            Tag::InvalidInitializer => Ok(body),
            Tag::FieldInitializer => {
                let field = c.read_canonical_ref()?;
                let (body, this) = self.this(body, TokenPos::NO_SOURCE)?;
                let (body, value) = self.visit_value(body, c)?;
                let op = Op::StoreField {
                    receiver: this,
                    field,
                    value,
                };
                Ok(self.emit(body, op, TokenPos::NO_SOURCE)?.0)
            }
            Tag::SuperInitializer | Tag::RedirectingInitializer => {
                let pos = c.read_position()?;
                let target = c.read_canonical_ref()?;
                let (body, this) = self.this(body, pos)?;
                let (body, args) = self.visit_arguments(body, c)?;
                let call = args.into_call(Callee::Static(target), Some(this));
                Ok(self.emit(body, Op::Call(Box::new(call)), pos)?.0)
            }
            Tag::LocalInitializer => self.visit_variable_declaration(body, c),
            other => Err(IrError::unexpected(offset, other, "initializer").into()),
        }
    }

    // ── Synthesized bodies ──────────────────────────────────────

    /// Lazy static fields run their initializer here and store the result.
    fn static_getter_body(&mut self, start: Fragment, pos: TokenPos) -> BuildResult<Fragment> {
        let member = self.scopes.member;
        let Some(field) = self.symbol.as_field() else {
            return Err(BuildError::UnknownMember(member));
        };
        match field.initializer {
            Some(init) if !field.is_const() => {
                let mut c = self.unit.cursor_at(init);
                let (body, value) = self.visit_value(start, &mut c)?;
                let op = Op::StoreStatic {
                    field: member,
                    value,
                };
                let (body, _) = self.emit(body, op, pos)?;
                Ok(self.graph.ret(body, value)?)
            }
            init => {
                let body = self.static_get(start, member, pos, init.unwrap_or(field.ty))?;
                let value = self.pop()?;
                Ok(self.graph.ret(body, value)?)
            }
        }
    }

    /// `[this]` when the function has a receiver.
    fn receiver_arguments(
        &mut self,
        body: Fragment,
        pos: TokenPos,
    ) -> BuildResult<(Fragment, Vec<InstrId>)> {
        match self.scopes.synthetic.this {
            Some(this) => {
                let (body, value) = self.load(body, this, pos)?;
                Ok((body, vec![value]))
            }
            None => Ok((body, Vec::new())),
        }
    }

    /// The declared parameters, loaded in calling-convention order, and the
    /// names of the trailing named ones.
    fn forwarded_parameters(
        &mut self,
        mut body: Fragment,
        pos: TokenPos,
    ) -> BuildResult<(Fragment, Vec<InstrId>, Vec<Arc<str>>)> {
        let scopes = self.scopes;
        let named = match scopes.function {
            Some(function) => self.unit.cursor_at(function).scan_function_node()?.named.len(),
            None => 0,
        };
        let declared: Vec<VarId> = scopes
            .parameters
            .iter()
            .copied()
            .filter(|var| scopes.variable(*var).kind == VariableKind::Parameter)
            .collect();
        let mut values = Vec::with_capacity(declared.len());
        for &var in &declared {
            let (next, value) = self.load(body, var, pos)?;
            values.push(value);
            body = next;
        }
        let names = declared[declared.len().saturating_sub(named)..]
            .iter()
            .map(|var| scopes.variable(*var).name.clone())
            .collect();
        Ok((body, values, names))
    }

    /// Call the member with this function's receiver and parameters.
    fn forward(&mut self, body: Fragment, pos: TokenPos) -> BuildResult<(Fragment, InstrId)> {
        let (body, mut args) = self.receiver_arguments(body, pos)?;
        let (body, values, names) = self.forwarded_parameters(body, pos)?;
        args.extend(values);
        let call = Call {
            callee: Callee::Static(self.scopes.member),
            args,
            names,
            type_arguments: Vec::new(),
        };
        self.emit(body, Op::Call(Box::new(call)), pos)
    }
}
