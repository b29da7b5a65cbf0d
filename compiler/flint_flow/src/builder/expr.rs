//! Expression arms. Each leaves exactly one value on the value stack.

use std::sync::Arc;

use flint_const::{ConstError, ConstResult, CursorMode};
use flint_ir::program::ProcedureKind;
use flint_ir::tag::{LogicalOp, Tag};
use flint_ir::{
    CanonicalRef, ConstValue, ConstantPool, Cursor, IrError, NameResolver, NodeRef, ResolvedType,
    SourceError, SourceErrorKind, SymbolKind, TokenPos,
};
use flint_scope::{names, PerDepth, VarId};
use flint_stack::ensure_sufficient_stack;

use super::{BuildResult, FlowBuilder};
use crate::ir::{Call, Callee, InstrId, Op};
use crate::Fragment;

/// Evaluated arguments of a call site.
pub(super) struct ArgumentList {
    pub(super) values: Vec<InstrId>,
    /// Names of the trailing named values.
    pub(super) names: Vec<Arc<str>>,
    pub(super) types: Vec<ResolvedType>,
}

impl ArgumentList {
    pub(super) fn into_call(self, callee: Callee, receiver: Option<InstrId>) -> Call {
        let mut args = Vec::with_capacity(self.values.len() + 1);
        args.extend(receiver);
        args.extend(self.values);
        Call {
            callee,
            args,
            names: self.names,
            type_arguments: self.types,
        }
    }
}

/// Tags the constant evaluator folds outright.
fn is_constant_literal(tag: Tag) -> bool {
    matches!(
        tag,
        Tag::StringLiteral
            | Tag::SpecializedIntLiteral
            | Tag::PositiveIntLiteral
            | Tag::NegativeIntLiteral
            | Tag::BigIntLiteral
            | Tag::DoubleLiteral
            | Tag::TrueLiteral
            | Tag::FalseLiteral
            | Tag::NullLiteral
            | Tag::SymbolLiteral
            | Tag::ConstStaticInvocation
            | Tag::ConstConstructorInvocation
            | Tag::ConstListLiteral
            | Tag::ConstMapLiteral
    )
}

impl FlowBuilder<'_, '_> {
    pub(super) fn visit_expression(
        &mut self,
        body: Fragment,
        c: &mut Cursor<'_>,
    ) -> BuildResult<Fragment> {
        ensure_sufficient_stack(|| self.visit_expression_inner(body, c))
    }

    /// Visit an expression and take its value off the stack.
    pub(super) fn visit_value(
        &mut self,
        body: Fragment,
        c: &mut Cursor<'_>,
    ) -> BuildResult<(Fragment, InstrId)> {
        let body = self.visit_expression(body, c)?;
        Ok((body, self.pop()?))
    }

    fn push_result(&mut self, (body, value): (Fragment, InstrId)) -> Fragment {
        self.push(value);
        body
    }

    fn visit_expression_inner(
        &mut self,
        body: Fragment,
        c: &mut Cursor<'_>,
    ) -> BuildResult<Fragment> {
        let node = c.node_ref();
        let offset = c.offset();
        let tag = c.peek_tag()?;
        if is_constant_literal(tag) {
            return self.constant_expression(body, c);
        }
        if tag == Tag::TypeLiteral {
            return self.type_literal(body, c);
        }
        c.read_tag()?;

        let body = match tag {
            Tag::InvalidExpression => {
                let pos = c.read_position()?;
                let message = c.read_string()?.to_owned();
                let error = SourceError::new(pos, SourceErrorKind::InvalidExpression(message));
                self.deferred_value(body, error)?
            }
            Tag::VariableGet => {
                let pos = c.read_position()?;
                let decl = c.read_node_ref()?;
                c.skip_option_type()?;
                let var = self.lookup(decl)?;
                let loaded = self.load(body, var, pos)?;
                self.push_result(loaded)
            }
            Tag::VariableSet => {
                let pos = c.read_position()?;
                let decl = c.read_node_ref()?;
                let var = self.lookup(decl)?;
                let (body, value) = self.visit_value(body, c)?;
                let body = self.store(body, var, value, pos)?;
                self.push(value);
                body
            }
            Tag::PropertyGet => {
                let pos = c.read_position()?;
                let (body, receiver) = self.visit_value(body, c)?;
                let name = c.read_string()?;
                c.skip_canonical_ref()?;
                let result = match self.unit.metadata().direct_call(node) {
                    Some(direct) => {
                        let body =
                            self.null_check(body, receiver, direct.check_receiver_for_null, pos)?;
                        self.direct_get(body, receiver, direct.target, pos, node)?
                    }
                    None => {
                        let callee = Callee::Instance(Arc::from(format!("get:{name}")));
                        self.call(body, Call::new(callee, vec![receiver]), pos, node)?
                    }
                };
                self.push_result(result)
            }
            Tag::PropertySet => {
                let pos = c.read_position()?;
                let (body, receiver) = self.visit_value(body, c)?;
                let name = c.read_string()?;
                let (body, value) = self.visit_value(body, c)?;
                c.skip_canonical_ref()?;
                let body = match self.unit.metadata().direct_call(node) {
                    Some(direct) => {
                        let body =
                            self.null_check(body, receiver, direct.check_receiver_for_null, pos)?;
                        self.direct_set(body, receiver, direct.target, value, pos)?
                    }
                    None => {
                        let callee = Callee::Instance(Arc::from(format!("set:{name}")));
                        let call = Call::new(callee, vec![receiver, value]);
                        self.call(body, call, pos, node)?.0
                    }
                };
                self.push(value);
                body
            }
            Tag::DirectPropertyGet => {
                let pos = c.read_position()?;
                let (body, receiver) = self.visit_value(body, c)?;
                let target = c.read_canonical_ref()?;
                let result = self.direct_get(body, receiver, target, pos, node)?;
                self.push_result(result)
            }
            Tag::DirectPropertySet => {
                let pos = c.read_position()?;
                let (body, receiver) = self.visit_value(body, c)?;
                let target = c.read_canonical_ref()?;
                let (body, value) = self.visit_value(body, c)?;
                let body = self.direct_set(body, receiver, target, value, pos)?;
                self.push(value);
                body
            }
            Tag::DirectMethodInvocation => {
                let pos = c.read_position()?;
                let (body, receiver) = self.visit_value(body, c)?;
                let target = c.read_canonical_ref()?;
                let (body, args) = self.visit_arguments(body, c)?;
                let call = args.into_call(Callee::Static(target), Some(receiver));
                let result = self.call(body, call, pos, node)?;
                self.push_result(result)
            }
            Tag::SuperPropertyGet => {
                let pos = c.read_position()?;
                let name = c.read_string()?;
                let target = c.read_canonical_ref()?;
                if target.is_null() {
                    self.deferred_value(body, unresolved(pos, name))?
                } else {
                    let (body, this) = self.this(body, pos)?;
                    let result = self.direct_get(body, this, target, pos, node)?;
                    self.push_result(result)
                }
            }
            Tag::SuperPropertySet => {
                let pos = c.read_position()?;
                let name = c.read_string()?;
                let (body, value) = self.visit_value(body, c)?;
                let target = c.read_canonical_ref()?;
                let body = if target.is_null() {
                    self.throw_error(body, unresolved(pos, name))?
                } else {
                    let (body, this) = self.this(body, pos)?;
                    self.direct_set(body, this, target, value, pos)?
                };
                self.push(value);
                body
            }
            Tag::SuperMethodInvocation => {
                let pos = c.read_position()?;
                let name = c.read_string()?;
                let (body, args) = self.visit_arguments(body, c)?;
                let target = c.read_canonical_ref()?;
                if target.is_null() {
                    self.deferred_value(body, unresolved(pos, name))?
                } else {
                    let (body, this) = self.this(body, pos)?;
                    let call = args.into_call(Callee::Static(target), Some(this));
                    let result = self.call(body, call, pos, node)?;
                    self.push_result(result)
                }
            }
            Tag::StaticGet => {
                let pos = c.read_position()?;
                let target = c.read_canonical_ref()?;
                self.static_get(body, target, pos, node)?
            }
            Tag::StaticSet => {
                let pos = c.read_position()?;
                let target = c.read_canonical_ref()?;
                let (body, value) = self.visit_value(body, c)?;
                let body = self.static_set(body, target, value, pos, node)?;
                self.push(value);
                body
            }
            Tag::MethodInvocation => {
                let pos = c.read_position()?;
                let (body, receiver) = self.visit_value(body, c)?;
                let name = c.read_string()?;
                let (body, args) = self.visit_arguments(body, c)?;
                c.skip_canonical_ref()?;
                let result = self.method_invocation(body, receiver, name, args, pos, node)?;
                self.push_result(result)
            }
            Tag::StaticInvocation => {
                let pos = c.read_position()?;
                let target = c.read_canonical_ref()?;
                let (body, args) = self.visit_arguments(body, c)?;
                let call = args.into_call(Callee::Static(target), None);
                let result = self.call(body, call, pos, node)?;
                self.push_result(result)
            }
            Tag::ConstructorInvocation => {
                let pos = c.read_position()?;
                let target = c.read_canonical_ref()?;
                match self.unit.program().resolve(target).map(|s| s.parent) {
                    Some(class) => {
                        let (body, object) =
                            self.emit_typed(body, Op::AllocateObject(class), pos, node)?;
                        let (body, args) = self.visit_arguments(body, c)?;
                        let call = args.into_call(Callee::Static(target), Some(object));
                        let (body, _) = self.call(body, call, pos, node)?;
                        self.push(object);
                        body
                    }
                    None => {
                        c.skip_arguments()?;
                        let name = self.unit.program().qualified_name(target);
                        self.deferred_value(body, unresolved(pos, &name))?
                    }
                }
            }
            Tag::Not => {
                let (body, value) = self.visit_value(body, c)?;
                let result = self.emit(body, Op::Not(value), TokenPos::NO_SOURCE)?;
                self.push_result(result)
            }
            Tag::LogicalExpression => self.logical_expression(body, c, offset)?,
            Tag::ConditionalExpression => {
                let temp = self.expression_temp()?;
                let (body, cond) = self.visit_value(body, c)?;
                let (then_node, else_node) = (self.graph.target(), self.graph.target());
                let head = self.graph.branch(body, cond, then_node, else_node)?;
                let then_arm = self.value_into(Fragment::at(then_node), c, temp)?;
                let else_arm = self.value_into(Fragment::at(else_node), c, temp)?;
                c.skip_option_type()?;
                self.join_value(head, &[then_arm, else_arm], temp)?
            }
            Tag::StringConcatenation => {
                let pos = c.read_position()?;
                let (body, values) = self.visit_list_of_values(body, c)?;
                let result = self.emit_typed(body, Op::Interpolate(values), pos, node)?;
                self.push_result(result)
            }
            Tag::IsExpression => {
                let pos = c.read_position()?;
                let (body, value) = self.visit_value(body, c)?;
                let ty = self.translator.translate(c)?;
                if let ResolvedType::Malformed(message) = ty {
                    self.deferred_value(body, malformed(pos, message))?
                } else {
                    let result = self.emit(body, Op::InstanceOf { value, ty }, pos)?;
                    self.push_result(result)
                }
            }
            Tag::AsExpression => {
                let pos = c.read_position()?;
                c.read_byte()?;
                let (body, value) = self.visit_value(body, c)?;
                let ty = self.translator.translate(c)?;
                if ty.is_top() {
                    self.push(value);
                    body
                } else if let ResolvedType::Malformed(message) = ty {
                    self.deferred_value(body, malformed(pos, message))?
                } else {
                    let op = Op::AssertAssignable {
                        value,
                        ty,
                        name: Arc::from(""),
                    };
                    let result = self.emit_typed(body, op, pos, node)?;
                    self.push_result(result)
                }
            }
            Tag::ThisExpression => {
                let loaded = self.this(body, TokenPos::NO_SOURCE)?;
                self.push_result(loaded)
            }
            Tag::Rethrow => {
                let pos = c.read_position()?;
                let depth = self.depth.catches;
                let exception = self.at_depth(PerDepth::RawException, depth)?;
                let stack_trace = self.at_depth(PerDepth::RawStackTrace, depth)?;
                let body = self.rethrow_vars(body, exception, stack_trace, pos)?;
                self.unreachable_value(body, pos)?
            }
            Tag::Throw => {
                let pos = c.read_position()?;
                let (body, value) = self.visit_value(body, c)?;
                let body = self.graph.throw(body, value)?;
                self.unreachable_value(body, pos)?
            }
            Tag::ListLiteral => {
                let pos = c.read_position()?;
                c.skip_type()?;
                let (body, values) = self.visit_list_of_values(body, c)?;
                let result = self.emit_typed(body, Op::CreateList(values), pos, node)?;
                self.push_result(result)
            }
            Tag::MapLiteral => {
                let pos = c.read_position()?;
                c.skip_type()?;
                c.skip_type()?;
                let len = c.read_list_length()?;
                let mut body = body;
                let mut values = Vec::with_capacity(len * 2);
                for _ in 0..len {
                    let (next, key) = self.visit_value(body, c)?;
                    let (next, value) = self.visit_value(next, c)?;
                    values.extend([key, value]);
                    body = next;
                }
                let result = self.emit_typed(body, Op::CreateMap(values), pos, node)?;
                self.push_result(result)
            }
            Tag::FunctionExpression => {
                let pos = c.read_position()?;
                let function = c.node_ref();
                c.skip_function_node()?;
                let result = self.emit(body, Op::AllocateClosure { function }, pos)?;
                self.push_result(result)
            }
            Tag::Let => {
                let (body, saved) = self.enter_scope(body, node, TokenPos::NO_SOURCE)?;
                let body = self.visit_variable_declaration(body, c)?;
                let body = self.visit_expression(body, c)?;
                self.exit_scope(body, saved)?
            }
            other => return Err(IrError::unexpected(offset, other, "expression").into()),
        };
        Ok(body)
    }

    // ── Constants ───────────────────────────────────────────────

    fn constant_expression(&mut self, body: Fragment, c: &mut Cursor<'_>) -> BuildResult<Fragment> {
        let node = c.node_ref();
        match self.evaluator.evaluate_safe(c, CursorMode::Advance)? {
            ConstResult::Value(id) => {
                let result = self.emit_typed(body, Op::Constant(id), TokenPos::NO_SOURCE, node)?;
                Ok(self.push_result(result))
            }
            ConstResult::Error(error) => self.deferred_value(body, error),
        }
    }

    /// Type literals over type parameters are instantiated at runtime; the
    /// rest are constants.
    fn type_literal(&mut self, body: Fragment, c: &mut Cursor<'_>) -> BuildResult<Fragment> {
        let mut probe = *c;
        probe.read_tag()?;
        let ty = self.translator.translate(&mut probe)?;
        if ty.is_instantiated() {
            return self.constant_expression(body, c);
        }
        let node = c.node_ref();
        c.skip_expression()?;
        let result = self.emit_typed(body, Op::InstantiateType(ty), TokenPos::NO_SOURCE, node)?;
        Ok(self.push_result(result))
    }

    /// Throw `error` here, leaving a placeholder value.
    pub(super) fn deferred_value(
        &mut self,
        body: Fragment,
        error: SourceError,
    ) -> BuildResult<Fragment> {
        let pos = error.pos;
        let body = self.throw_error(body, error)?;
        let result = self.null(body, pos)?;
        Ok(self.push_result(result))
    }

    /// Continue after a throw in expression position.
    fn unreachable_value(&mut self, closed: Fragment, pos: TokenPos) -> BuildResult<Fragment> {
        let dead = Fragment::at(self.graph.target());
        let (dead, null) = self.null(dead, pos)?;
        self.push(null);
        Ok(Fragment {
            entry: closed.entry,
            current: dead.current,
        })
    }

    pub(super) fn rethrow_vars(
        &mut self,
        body: Fragment,
        exception: VarId,
        stack_trace: VarId,
        pos: TokenPos,
    ) -> BuildResult<Fragment> {
        let (body, exception) = self.load(body, exception, pos)?;
        let (body, stack_trace) = self.load(body, stack_trace, pos)?;
        Ok(self.graph.rethrow(body, exception, stack_trace)?)
    }

    // ── Branching values ────────────────────────────────────────

    fn expression_temp(&self) -> BuildResult<VarId> {
        self.synthetic(self.scopes.synthetic.expression_temp, names::EXPRESSION_TEMP)
    }

    fn logical_expression(
        &mut self,
        body: Fragment,
        c: &mut Cursor<'_>,
        offset: usize,
    ) -> BuildResult<Fragment> {
        let temp = self.expression_temp()?;
        let (body, left) = self.visit_value(body, c)?;
        let byte = c.read_byte()?;
        let op = LogicalOp::from_byte(byte).ok_or(IrError::InvalidByte {
            offset,
            what: "logical operator",
            value: byte,
        })?;
        let (right_node, short_node) = (self.graph.target(), self.graph.target());
        let head = match op {
            LogicalOp::And => self.graph.branch(body, left, right_node, short_node)?,
            LogicalOp::Or => self.graph.branch(body, left, short_node, right_node)?,
        };
        let right = self.value_into(Fragment::at(right_node), c, temp)?;
        let short_value = match op {
            LogicalOp::And => ConstantPool::FALSE,
            LogicalOp::Or => ConstantPool::TRUE,
        };
        let (short, value) = self.constant(Fragment::at(short_node), short_value, TokenPos::NO_SOURCE)?;
        let short = self.store(short, temp, value, TokenPos::NO_SOURCE)?;
        self.join_value(head, &[right, short], temp)
    }

    /// Visit an expression and store its value into `temp`.
    fn value_into(
        &mut self,
        body: Fragment,
        c: &mut Cursor<'_>,
        temp: VarId,
    ) -> BuildResult<Fragment> {
        let (body, value) = self.visit_value(body, c)?;
        self.store(body, temp, value, TokenPos::NO_SOURCE)
    }

    /// Merge arms that each stored their value into `temp`, then load it.
    fn join_value(&mut self, head: Fragment, arms: &[Fragment], temp: VarId) -> BuildResult<Fragment> {
        let join = match self.graph.converge(arms)? {
            Some(join) => join,
            None => self.graph.target(),
        };
        let (tail, value) = self.load(Fragment::at(join), temp, TokenPos::NO_SOURCE)?;
        self.push(value);
        Ok(Fragment {
            entry: head.entry,
            current: tail.current,
        })
    }

    // ── Members ─────────────────────────────────────────────────

    fn null_check(
        &mut self,
        body: Fragment,
        receiver: InstrId,
        check: bool,
        pos: TokenPos,
    ) -> BuildResult<Fragment> {
        if !check {
            return Ok(body);
        }
        Ok(self.emit(body, Op::CheckNull(receiver), pos)?.0)
    }

    /// Read `target` on `receiver`: a field load, a method tear-off, or a
    /// getter call.
    pub(super) fn direct_get(
        &mut self,
        body: Fragment,
        receiver: InstrId,
        target: CanonicalRef,
        pos: TokenPos,
        node: NodeRef,
    ) -> BuildResult<(Fragment, InstrId)> {
        match self.unit.program().resolve(target).map(|s| &s.kind) {
            Some(SymbolKind::Field(_)) => {
                let op = Op::LoadField {
                    receiver,
                    field: target,
                };
                self.emit_typed(body, op, pos, node)
            }
            Some(SymbolKind::Procedure(info)) if info.kind == ProcedureKind::Method => {
                self.emit(body, Op::TearOff { receiver, target }, pos)
            }
            _ => {
                let call = Call::new(Callee::Static(target), vec![receiver]);
                self.call(body, call, pos, node)
            }
        }
    }

    pub(super) fn direct_set(
        &mut self,
        body: Fragment,
        receiver: InstrId,
        target: CanonicalRef,
        value: InstrId,
        pos: TokenPos,
    ) -> BuildResult<Fragment> {
        let is_field = self
            .unit
            .program()
            .resolve(target)
            .and_then(|s| s.as_field())
            .is_some();
        let op = if is_field {
            Op::StoreField {
                receiver,
                field: target,
                value,
            }
        } else {
            Op::Call(Box::new(Call::new(Callee::Static(target), vec![receiver, value])))
        };
        Ok(self.emit(body, op, pos)?.0)
    }

    /// Push the value of the static member `target`.
    pub(super) fn static_get(
        &mut self,
        body: Fragment,
        target: CanonicalRef,
        pos: TokenPos,
        node: NodeRef,
    ) -> BuildResult<Fragment> {
        let program = self.unit.program();
        let Some(symbol) = program.resolve(target) else {
            let name = program.qualified_name(target);
            return self.deferred_value(body, unresolved(pos, &name));
        };
        match &symbol.kind {
            SymbolKind::Field(field) if field.is_const() => {
                match self.evaluator.evaluate_static_field(target) {
                    Ok(id) => {
                        let result = self.emit_typed(body, Op::Constant(id), pos, node)?;
                        Ok(self.push_result(result))
                    }
                    Err(ConstError::Source(error)) => self.deferred_value(body, error),
                    Err(ConstError::Internal(error)) => Err(error.into()),
                }
            }
            SymbolKind::Field(field) => {
                let body = if field.initializer.is_some() {
                    self.emit(body, Op::InitStatic(target), pos)?.0
                } else {
                    body
                };
                let result = self.emit_typed(body, Op::LoadStatic(target), pos, node)?;
                Ok(self.push_result(result))
            }
            SymbolKind::Procedure(info) if info.kind == ProcedureKind::Getter => {
                let call = Call::new(Callee::Static(target), Vec::new());
                let result = self.call(body, call, pos, node)?;
                Ok(self.push_result(result))
            }
            SymbolKind::Procedure(_) => {
                let id = self.unit.pool().intern(ConstValue::TearOff(target));
                let result = self.emit_typed(body, Op::Constant(id), pos, node)?;
                Ok(self.push_result(result))
            }
            SymbolKind::Library | SymbolKind::Class(_) | SymbolKind::Constructor(_) => {
                let name = program.qualified_name(target);
                self.deferred_value(body, unresolved(pos, &name))
            }
        }
    }

    fn static_set(
        &mut self,
        body: Fragment,
        target: CanonicalRef,
        value: InstrId,
        pos: TokenPos,
        node: NodeRef,
    ) -> BuildResult<Fragment> {
        let program = self.unit.program();
        match program.resolve(target).map(|s| &s.kind) {
            Some(SymbolKind::Field(field)) if !field.is_const() => {
                let op = Op::StoreStatic {
                    field: target,
                    value,
                };
                Ok(self.emit(body, op, pos)?.0)
            }
            Some(SymbolKind::Procedure(info)) if info.kind == ProcedureKind::Setter => {
                let call = Call::new(Callee::Static(target), vec![value]);
                Ok(self.call(body, call, pos, node)?.0)
            }
            _ => {
                let name = program.qualified_name(target);
                self.throw_error(body, unresolved(pos, &name))
            }
        }
    }

    fn method_invocation(
        &mut self,
        body: Fragment,
        receiver: InstrId,
        name: &str,
        args: ArgumentList,
        pos: TokenPos,
        node: NodeRef,
    ) -> BuildResult<(Fragment, InstrId)> {
        if name == "==" && args.names.is_empty() {
            if let [right] = args.values.as_slice() {
                let op = Op::Equals {
                    left: receiver,
                    right: *right,
                };
                return self.emit_typed(body, op, pos, node);
            }
        }
        if let Some(direct) = self.unit.metadata().direct_call(node) {
            let body = self.null_check(body, receiver, direct.check_receiver_for_null, pos)?;
            let call = args.into_call(Callee::Static(direct.target), Some(receiver));
            return self.call(body, call, pos, node);
        }
        let callee = if name == "call" {
            Callee::Closure
        } else {
            Callee::Instance(Arc::from(name))
        };
        self.call(body, args.into_call(callee, Some(receiver)), pos, node)
    }

    // ── Lists ───────────────────────────────────────────────────

    fn visit_list_of_values(
        &mut self,
        mut body: Fragment,
        c: &mut Cursor<'_>,
    ) -> BuildResult<(Fragment, Vec<InstrId>)> {
        let len = c.read_list_length()?;
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            let (next, value) = self.visit_value(body, c)?;
            values.push(value);
            body = next;
        }
        Ok((body, values))
    }

    pub(super) fn visit_arguments(
        &mut self,
        body: Fragment,
        c: &mut Cursor<'_>,
    ) -> BuildResult<(Fragment, ArgumentList)> {
        let head = c.read_arguments_head()?;
        let mut types = Vec::with_capacity(head.type_argument_count);
        for _ in 0..head.type_argument_count {
            types.push(self.translator.translate(c)?);
        }
        let (mut body, mut values) = self.visit_list_of_values(body, c)?;
        let named = c.read_list_length()?;
        let mut names = Vec::with_capacity(named);
        for _ in 0..named {
            names.push(Arc::from(c.read_string()?));
            let (next, value) = self.visit_value(body, c)?;
            values.push(value);
            body = next;
        }
        Ok((
            body,
            ArgumentList {
                values,
                names,
                types,
            },
        ))
    }
}

fn unresolved(pos: TokenPos, name: &str) -> SourceError {
    SourceError::new(pos, SourceErrorKind::Unresolved(name.to_owned()))
}

fn malformed(pos: TokenPos, message: String) -> SourceError {
    SourceError::new(pos, SourceErrorKind::MalformedType(message))
}
