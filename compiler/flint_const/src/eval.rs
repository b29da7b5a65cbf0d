//! The constant evaluator.
//!
//! One arm per expression tag, parallel with `skip_expression`. Every
//! sub-expression goes through [`ConstantEvaluator::eval_expression`], which
//! consults the unit's cache first and leaves the cursor just past the
//! expression either way.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use flint_ir::program::{core, ConstructorInfo, ProcedureKind, Symbol, SymbolKind};
use flint_ir::tag::{LogicalOp, Tag, SPECIALIZED_INT_BIAS};
use flint_ir::{
    CanonicalRef, ConstValue, ConstantId, ConstantPool, Cursor, DefaultTypeTranslator, IrError,
    NameResolver, NodeRef, ResolvedType, SourceErrorKind, SourceUnit, TokenPos, TypeTranslator,
    VariableFlags,
};
use flint_stack::{ensure_sufficient_stack, RecursionLimit};

use crate::builtins::{interpolate, BuiltinInvoker, ConstArgs, ConstInvoker};
use crate::{ConstError, ConstOptions, ConstResult, CursorMode, EvalStats};

/// Bindings visible to the constructor (or `let`) being evaluated.
type Frame = FxHashMap<NodeRef, ConstantId>;

/// Evaluated arguments, still as interned ids.
#[derive(Debug, Default)]
struct Arguments {
    types: Vec<ResolvedType>,
    positional: Vec<ConstantId>,
    named: Vec<(Arc<str>, ConstantId)>,
}

pub struct ConstantEvaluator<'u> {
    unit: &'u SourceUnit,
    translator: Arc<dyn TypeTranslator>,
    invoker: Arc<dyn ConstInvoker>,
    /// Static initializers being evaluated; re-entering one is a cycle.
    pending: FxHashSet<NodeRef>,
    frames: Vec<Frame>,
    limit: RecursionLimit,
    /// Position of the innermost expression read so far that carries one.
    pos: TokenPos,
    stats: EvalStats,
}

impl<'u> ConstantEvaluator<'u> {
    pub fn new(unit: &'u SourceUnit, options: &ConstOptions) -> Self {
        Self {
            unit,
            translator: Arc::new(DefaultTypeTranslator),
            invoker: Arc::new(BuiltinInvoker::new(Arc::clone(&options.defines))),
            pending: FxHashSet::default(),
            frames: Vec::new(),
            limit: RecursionLimit::new(options.max_depth),
            pos: TokenPos::NO_SOURCE,
            stats: EvalStats::default(),
        }
    }

    #[must_use]
    pub fn with_translator(mut self, translator: Arc<dyn TypeTranslator>) -> Self {
        self.translator = translator;
        self
    }

    #[must_use]
    pub fn with_invoker(mut self, invoker: Arc<dyn ConstInvoker>) -> Self {
        self.invoker = invoker;
        self
    }

    pub fn unit(&self) -> &'u SourceUnit {
        self.unit
    }

    pub fn stats(&self) -> EvalStats {
        self.stats
    }

    pub fn value(&self, id: ConstantId) -> Option<ConstValue> {
        self.unit.pool().get(id)
    }

    // Entry points

    /// Evaluate the expression at the cursor and rewind the cursor.
    pub fn evaluate(&mut self, cursor: &mut Cursor<'_>) -> Result<ConstantId, ConstError> {
        self.evaluate_with(cursor, CursorMode::Reset)
    }

    /// Evaluate the expression at the cursor and leave the cursor past it.
    pub fn evaluate_and_advance(
        &mut self,
        cursor: &mut Cursor<'_>,
    ) -> Result<ConstantId, ConstError> {
        self.evaluate_with(cursor, CursorMode::Advance)
    }

    /// Evaluate the expression at the cursor.
    ///
    /// On failure the cursor is left where it started.
    pub fn evaluate_with(
        &mut self,
        cursor: &mut Cursor<'_>,
        mode: CursorMode,
    ) -> Result<ConstantId, ConstError> {
        let mut c = *cursor;
        let id = self.eval_expression(&mut c)?;
        if mode == CursorMode::Advance {
            *cursor = c;
        }
        Ok(id)
    }

    /// Like [`evaluate_with`](Self::evaluate_with), but a source-level
    /// failure becomes a [`ConstResult::Error`] instead of an `Err`.
    ///
    /// In [`CursorMode::Advance`] the cursor moves past the expression on
    /// failure too.
    pub fn evaluate_safe(
        &mut self,
        cursor: &mut Cursor<'_>,
        mode: CursorMode,
    ) -> Result<ConstResult, IrError> {
        match self.evaluate_with(cursor, mode) {
            Ok(id) => Ok(ConstResult::Value(id)),
            Err(ConstError::Source(error)) => {
                if mode == CursorMode::Advance {
                    cursor.skip_expression()?;
                }
                debug!(%error, "expression is not constant");
                Ok(ConstResult::Error(error))
            }
            Err(ConstError::Internal(error)) => Err(error),
        }
    }

    /// Evaluate the expression at `node`.
    pub fn evaluate_at(&mut self, node: NodeRef) -> Result<ConstantId, ConstError> {
        let mut c = self.unit.cursor_at(node);
        self.eval_expression(&mut c)
    }

    /// Value of a static const field.
    pub fn evaluate_static_field(&mut self, field: CanonicalRef) -> Result<ConstantId, ConstError> {
        self.static_get(self.pos, field)
    }

    /// Default value of the parameter declared at `decl`, if it has one.
    pub fn evaluate_parameter_default(
        &mut self,
        decl: NodeRef,
    ) -> Result<Option<ConstantId>, ConstError> {
        let mut c = self.unit.cursor_at(decl);
        match c.variable_initializer_at(decl)? {
            Some(init) => self.eval_detached(init).map(Some),
            None => Ok(None),
        }
    }

    // Core

    fn eval_expression(&mut self, c: &mut Cursor<'_>) -> Result<ConstantId, ConstError> {
        let node = c.node_ref();
        if let Some(id) = self.unit.cache().get(node) {
            self.stats.cache_hits += 1;
            trace!(%node, "constant cache hit");
            c.skip_expression()?;
            return Ok(id);
        }
        if !self.limit.enter() {
            return Err(ConstError::at(self.pos, SourceErrorKind::TooDeep));
        }
        self.stats.evaluations += 1;
        let result = ensure_sufficient_stack(|| self.eval_uncached(c));
        self.limit.exit();
        let id = result?;
        // Inside a constructor the value may depend on its arguments.
        if self.frames.is_empty() {
            self.unit.cache().insert(node, id);
        }
        Ok(id)
    }

    fn eval_uncached(&mut self, c: &mut Cursor<'_>) -> Result<ConstantId, ConstError> {
        let offset = c.offset();
        let (tag, payload) = c.read_tag_and_payload()?;
        match tag {
            Tag::InvalidExpression => {
                let pos = self.read_pos(c)?;
                let message = c.read_string()?;
                Err(ConstError::at(
                    pos,
                    SourceErrorKind::InvalidExpression(message.to_owned()),
                ))
            }
            Tag::VariableGet => {
                let pos = self.read_pos(c)?;
                let decl = c.read_node_ref()?;
                c.skip_option_type()?;
                self.variable_get(c, pos, decl)
            }
            Tag::StaticGet => {
                let pos = self.read_pos(c)?;
                let target = c.read_canonical_ref()?;
                self.static_get(pos, target)
            }
            Tag::PropertyGet => {
                let pos = self.read_pos(c)?;
                let receiver = self.eval_value(c)?;
                let name = c.read_string()?;
                c.skip_canonical_ref()?;
                self.property(pos, &receiver, name)
            }
            Tag::DirectPropertyGet => {
                let pos = self.read_pos(c)?;
                let receiver = self.eval_value(c)?;
                let name = self.member_name(c.read_canonical_ref()?)?;
                self.property(pos, &receiver, name)
            }
            Tag::MethodInvocation => {
                let pos = self.read_pos(c)?;
                let receiver = self.eval_value(c)?;
                let name = c.read_string()?;
                let args = self.eval_arguments(c, pos)?;
                c.skip_canonical_ref()?;
                self.method(pos, &receiver, name, &args)
            }
            Tag::DirectMethodInvocation => {
                let pos = self.read_pos(c)?;
                let receiver = self.eval_value(c)?;
                let name = self.member_name(c.read_canonical_ref()?)?;
                let args = self.eval_arguments(c, pos)?;
                self.method(pos, &receiver, name, &args)
            }
            Tag::StaticInvocation | Tag::ConstStaticInvocation => {
                let pos = self.read_pos(c)?;
                let target = c.read_canonical_ref()?;
                let args = self.eval_arguments(c, pos)?;
                self.static_call(pos, target, &args)
            }
            Tag::ConstructorInvocation | Tag::ConstConstructorInvocation => {
                let pos = self.read_pos(c)?;
                let target = c.read_canonical_ref()?;
                let args = self.eval_arguments(c, pos)?;
                self.construct(pos, target, args)
            }
            Tag::Not => {
                let operand = self.eval_value(c)?;
                match operand.as_bool() {
                    Some(b) => Ok(ConstantPool::bool(!b)),
                    None => Err(self.unsupported("!", &operand)),
                }
            }
            Tag::LogicalExpression => self.logical(c),
            Tag::ConditionalExpression => {
                let condition = self.eval_value(c)?;
                let Some(condition) = condition.as_bool() else {
                    return Err(self.unsupported("?:", &condition));
                };
                let id = if condition {
                    let id = self.eval_expression(c)?;
                    c.skip_expression()?;
                    id
                } else {
                    c.skip_expression()?;
                    self.eval_expression(c)?
                };
                c.skip_option_type()?;
                Ok(id)
            }
            Tag::StringConcatenation => {
                let pos = self.read_pos(c)?;
                let len = c.read_list_length()?;
                let mut parts = Vec::with_capacity(len);
                for _ in 0..len {
                    parts.push(self.eval_value(c)?);
                }
                self.concatenate(pos, &parts)
            }
            Tag::IsExpression => {
                let pos = self.read_pos(c)?;
                let operand = self.eval_value(c)?;
                let ty = self.translate(c, pos)?;
                Ok(ConstantPool::bool(self.is_instance(&operand, &ty, false)))
            }
            Tag::AsExpression => {
                let pos = self.read_pos(c)?;
                c.read_byte()?;
                let id = self.eval_expression(c)?;
                let operand = self.value_of(id)?;
                let ty = self.translate(c, pos)?;
                if self.is_instance(&operand, &ty, true) {
                    Ok(id)
                } else {
                    Err(ConstError::at(
                        pos,
                        SourceErrorKind::FailedCast {
                            actual: self.type_name(&operand),
                            expected: self.expected_name(&ty),
                        },
                    ))
                }
            }
            Tag::StringLiteral => {
                let text = c.read_string()?;
                Ok(self.intern(ConstValue::string(text)))
            }
            Tag::SpecializedIntLiteral => {
                Ok(self.intern(ConstValue::Int(i64::from(payload) - SPECIALIZED_INT_BIAS)))
            }
            Tag::PositiveIntLiteral => Ok(self.intern(ConstValue::Int(i64::from(c.read_uint()?)))),
            Tag::NegativeIntLiteral => {
                Ok(self.intern(ConstValue::Int(-i64::from(c.read_uint()?))))
            }
            Tag::BigIntLiteral => {
                let text = c.read_string()?;
                match text.parse::<i64>() {
                    Ok(value) => Ok(self.intern(ConstValue::Int(value))),
                    Err(_) => Err(ConstError::at(
                        self.pos,
                        SourceErrorKind::IntegerLiteralTooLarge(text.to_owned()),
                    )),
                }
            }
            Tag::DoubleLiteral => Ok(self.intern(ConstValue::double(c.read_double()?))),
            Tag::TrueLiteral => Ok(ConstantPool::TRUE),
            Tag::FalseLiteral => Ok(ConstantPool::FALSE),
            Tag::NullLiteral => Ok(ConstantPool::NULL),
            Tag::SymbolLiteral => {
                let name = c.read_string()?;
                Ok(self.intern(ConstValue::Symbol(Arc::from(name))))
            }
            Tag::TypeLiteral => {
                let ty = self.translate(c, self.pos)?;
                if !ty.is_instantiated() {
                    return Err(ConstError::at(self.pos, SourceErrorKind::NotConstant));
                }
                Ok(self.intern(ConstValue::Type(ty)))
            }
            Tag::ConstListLiteral => {
                let pos = self.read_pos(c)?;
                let element = self.translate(c, pos)?;
                let len = c.read_list_length()?;
                let mut elements = Vec::with_capacity(len);
                for _ in 0..len {
                    elements.push(self.eval_expression(c)?);
                }
                Ok(self.intern(ConstValue::List { element, elements }))
            }
            Tag::ConstMapLiteral => {
                let pos = self.read_pos(c)?;
                let key = self.translate(c, pos)?;
                let value = self.translate(c, pos)?;
                let len = c.read_list_length()?;
                let mut entries = Vec::with_capacity(len);
                let mut seen = FxHashSet::default();
                for _ in 0..len {
                    let k = self.eval_expression(c)?;
                    let v = self.eval_expression(c)?;
                    if !seen.insert(k) {
                        return Err(ConstError::at(
                            pos,
                            SourceErrorKind::InvalidExpression(
                                "duplicate key in constant map".to_owned(),
                            ),
                        ));
                    }
                    entries.push((k, v));
                }
                Ok(self.intern(ConstValue::Map {
                    key,
                    value,
                    entries,
                }))
            }
            Tag::Let => {
                let decl = c.node_ref();
                c.read_variable_head()?;
                c.skip_type()?;
                let value = if c.read_option()? {
                    self.eval_expression(c)?
                } else {
                    ConstantPool::NULL
                };
                let mut frame = self.frames.last().cloned().unwrap_or_default();
                frame.insert(decl, value);
                self.frames.push(frame);
                let result = self.eval_expression(c);
                self.frames.pop();
                result
            }
            Tag::ThisExpression => Err(ConstError::at(self.pos, SourceErrorKind::NotConstant)),
            Tag::VariableSet
            | Tag::PropertySet
            | Tag::DirectPropertySet
            | Tag::SuperPropertyGet
            | Tag::SuperPropertySet
            | Tag::SuperMethodInvocation
            | Tag::StaticSet
            | Tag::Rethrow
            | Tag::Throw
            | Tag::ListLiteral
            | Tag::MapLiteral
            | Tag::FunctionExpression => {
                let pos = self.read_pos(c)?;
                Err(ConstError::at(pos, SourceErrorKind::NotConstant))
            }
            other => Err(IrError::unexpected(offset, other, "expression").into()),
        }
    }

    fn logical(&mut self, c: &mut Cursor<'_>) -> Result<ConstantId, ConstError> {
        let left = self.eval_value(c)?;
        let op_offset = c.offset();
        let byte = c.read_byte()?;
        let op = LogicalOp::from_byte(byte).ok_or(IrError::InvalidByte {
            offset: op_offset,
            what: "logical operator",
            value: byte,
        })?;
        let symbol = match op {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
        };
        let Some(left) = left.as_bool() else {
            return Err(self.unsupported(symbol, &left));
        };
        let decided = match op {
            LogicalOp::And => !left,
            LogicalOp::Or => left,
        };
        if decided {
            c.skip_expression()?;
            return Ok(ConstantPool::bool(left));
        }
        let right = self.eval_value(c)?;
        match right.as_bool() {
            Some(b) => Ok(ConstantPool::bool(b)),
            None => Err(self.unsupported(symbol, &right)),
        }
    }

    fn concatenate(&mut self, pos: TokenPos, parts: &[ConstValue]) -> Result<ConstantId, ConstError> {
        if parts.iter().all(|p| matches!(p, ConstValue::String(_))) {
            let joined: String = parts.iter().filter_map(ConstValue::as_str).collect();
            return Ok(self.intern(ConstValue::String(Arc::from(joined))));
        }
        let mut text = String::new();
        for part in parts {
            let Some(piece) = interpolate(part) else {
                return Err(ConstError::at(
                    pos,
                    SourceErrorKind::InvalidExpression(format!(
                        "a value of type '{}' cannot be interpolated in a constant string",
                        part.kind_name()
                    )),
                ));
            };
            text.push_str(&piece);
        }
        Ok(self.intern(ConstValue::String(Arc::from(text))))
    }

    // Variables and statics

    fn variable_get(
        &mut self,
        c: &mut Cursor<'_>,
        pos: TokenPos,
        decl: NodeRef,
    ) -> Result<ConstantId, ConstError> {
        if let Some(id) = self.frames.last().and_then(|f| f.get(&decl)) {
            return Ok(*id);
        }
        let (head, init) = c.with_alternate_position(decl, |c| {
            let head = c.read_variable_head()?;
            let init = c.skip_variable_tail()?;
            Ok::<_, IrError>((head, init))
        })?;
        match init {
            Some(init) if head.is_const() => self.eval_detached(init),
            _ => Err(ConstError::at(pos, SourceErrorKind::NotConstant)),
        }
    }

    fn static_get(&mut self, pos: TokenPos, target: CanonicalRef) -> Result<ConstantId, ConstError> {
        let unit = self.unit;
        let Some(symbol) = unit.program().resolve(target) else {
            return Err(ConstError::at(
                pos,
                SourceErrorKind::Unresolved(format!("{target:?}")),
            ));
        };
        match &symbol.kind {
            SymbolKind::Field(info) if info.is_static() && info.is_const() => match info.initializer {
                Some(init) => self.static_initializer(pos, target, init),
                None => Err(ConstError::at(pos, SourceErrorKind::NotConstant)),
            },
            SymbolKind::Procedure(info) if info.is_static() && info.kind == ProcedureKind::Method => {
                Ok(self.intern(ConstValue::TearOff(target)))
            }
            _ => Err(ConstError::at(pos, SourceErrorKind::NotConstant)),
        }
    }

    fn static_initializer(
        &mut self,
        pos: TokenPos,
        field: CanonicalRef,
        init: NodeRef,
    ) -> Result<ConstantId, ConstError> {
        if !self.pending.insert(init) {
            let name = self.unit.program().qualified_name(field);
            debug!(field = %name, "cyclic constant initialization");
            // Entries computed along the cycle are suspect.
            self.unit.cache().clear();
            return Err(ConstError::at(
                pos,
                SourceErrorKind::CyclicInitialization { field: name },
            ));
        }
        let result = self.eval_detached(init);
        self.pending.remove(&init);
        result
    }

    /// Evaluate `node` outside any constructor bindings.
    fn eval_detached(&mut self, node: NodeRef) -> Result<ConstantId, ConstError> {
        let saved = std::mem::take(&mut self.frames);
        let mut c = self.unit.cursor_at(node);
        let result = self.eval_expression(&mut c);
        self.frames = saved;
        result
    }

    // Calls

    fn eval_arguments(&mut self, c: &mut Cursor<'_>, pos: TokenPos) -> Result<Arguments, ConstError> {
        let head = c.read_arguments_head()?;
        let mut args = Arguments::default();
        for _ in 0..head.type_argument_count {
            args.types.push(self.translate(c, pos)?);
        }
        let len = c.read_list_length()?;
        for _ in 0..len {
            args.positional.push(self.eval_expression(c)?);
        }
        let len = c.read_list_length()?;
        for _ in 0..len {
            let name = c.read_string_ref()?;
            let name = c
                .strings()
                .get_shared(name)
                .ok_or(IrError::StringOutOfRange(name))?;
            args.named.push((name, self.eval_expression(c)?));
        }
        Ok(args)
    }

    fn argument_values(&self, args: &Arguments) -> Result<ConstArgs, ConstError> {
        let positional = args
            .positional
            .iter()
            .map(|id| self.value_of(*id))
            .collect::<Result<Vec<_>, _>>()?;
        let named = args
            .named
            .iter()
            .map(|(name, id)| Ok((Arc::clone(name), self.value_of(*id)?)))
            .collect::<Result<Vec<_>, ConstError>>()?;
        Ok(ConstArgs { positional, named })
    }

    fn property(
        &mut self,
        pos: TokenPos,
        receiver: &ConstValue,
        name: &str,
    ) -> Result<ConstantId, ConstError> {
        match self.invoker.get_property(receiver, name) {
            Ok(Some(value)) => Ok(self.intern(value)),
            Ok(None) => Err(self.unsupported(name, receiver)),
            Err(kind) => Err(ConstError::at(pos, kind)),
        }
    }

    fn method(
        &mut self,
        pos: TokenPos,
        receiver: &ConstValue,
        name: &str,
        args: &Arguments,
    ) -> Result<ConstantId, ConstError> {
        let values = self.argument_values(args)?;
        match self.invoker.invoke_method(receiver, name, &values) {
            Ok(Some(value)) => Ok(self.intern(value)),
            Ok(None) => Err(self.unsupported(name, receiver)),
            Err(kind) => Err(ConstError::at(pos, kind)),
        }
    }

    fn static_call(
        &mut self,
        pos: TokenPos,
        target: CanonicalRef,
        args: &Arguments,
    ) -> Result<ConstantId, ConstError> {
        let qualified = self.unit.program().qualified_name(target);
        let values = self.argument_values(args)?;
        match self.invoker.invoke_static(&qualified, &values) {
            Ok(Some(value)) => Ok(self.intern(value)),
            Ok(None) => Err(ConstError::at(pos, SourceErrorKind::NotConstant)),
            Err(kind) => Err(ConstError::at(pos, kind)),
        }
    }

    // Const constructors

    fn construct(
        &mut self,
        pos: TokenPos,
        target: CanonicalRef,
        args: Arguments,
    ) -> Result<ConstantId, ConstError> {
        let unit = self.unit;
        let program = unit.program();
        let qualified = program.qualified_name(target);
        let values = self.argument_values(&args)?;
        // `fromEnvironment` and friends are factories the runtime provides.
        match self.invoker.invoke_static(&qualified, &values) {
            Ok(Some(value)) => return Ok(self.intern(value)),
            Ok(None) => {}
            Err(kind) => return Err(ConstError::at(pos, kind)),
        }
        let Some(symbol) = program.resolve(target) else {
            return Err(ConstError::at(pos, SourceErrorKind::Unresolved(qualified)));
        };
        let Some(info) = symbol.as_constructor().filter(|info| info.is_const) else {
            return Err(ConstError::at(pos, SourceErrorKind::NotConstant));
        };
        let class = symbol.parent;
        let mut fields = FxHashMap::default();
        self.run_constructor(pos, class, info, &args, &mut fields)?;
        let mut fields: Vec<(CanonicalRef, ConstantId)> = fields.into_iter().collect();
        fields.sort_unstable_by_key(|(field, _)| *field);
        trace!(class = %qualified, fields = fields.len(), "constant instance");
        Ok(self.intern(ConstValue::Instance {
            class,
            type_arguments: args.types,
            fields,
        }))
    }

    fn run_constructor(
        &mut self,
        pos: TokenPos,
        class: CanonicalRef,
        info: &ConstructorInfo,
        args: &Arguments,
        fields: &mut FxHashMap<CanonicalRef, ConstantId>,
    ) -> Result<(), ConstError> {
        if !self.limit.enter() {
            return Err(ConstError::at(pos, SourceErrorKind::TooDeep));
        }
        let result =
            ensure_sufficient_stack(|| self.run_constructor_body(class, info, args, fields));
        self.limit.exit();
        result
    }

    fn run_constructor_body(
        &mut self,
        class: CanonicalRef,
        info: &ConstructorInfo,
        args: &Arguments,
        fields: &mut FxHashMap<CanonicalRef, ConstantId>,
    ) -> Result<(), ConstError> {
        let unit = self.unit;
        let program = unit.program();

        // Field initializers of the class run first.
        for member in program.members(class) {
            let Some(field) = program.resolve(member).and_then(Symbol::as_field) else {
                continue;
            };
            if let (false, Some(init)) = (field.is_static(), field.initializer) {
                let id = self.eval_detached(init)?;
                fields.insert(member, id);
            }
        }

        let mut c = unit.cursor_at(info.function);
        let layout = c.scan_function_node()?;
        let mut frame = Frame::default();
        for (i, &param) in layout.positional.iter().enumerate() {
            let id = match args.positional.get(i) {
                Some(id) => *id,
                None => self.parameter_default(&mut c, param)?,
            };
            self.bind_parameter(&mut c, class, param, id, &mut frame, fields)?;
        }
        for &param in &layout.named {
            let head = c.variable_head_at(param)?;
            let name = c.string(head.name)?;
            let id = match args.named.iter().find(|(n, _)| &**n == name) {
                Some((_, id)) => *id,
                None => self.parameter_default(&mut c, param)?,
            };
            self.bind_parameter(&mut c, class, param, id, &mut frame, fields)?;
        }

        self.frames.push(frame);
        let result = self.run_initializers(info.initializers, fields);
        self.frames.pop();
        result
    }

    fn parameter_default(
        &mut self,
        c: &mut Cursor<'_>,
        param: NodeRef,
    ) -> Result<ConstantId, ConstError> {
        match c.variable_initializer_at(param)? {
            Some(init) => self.eval_detached(init),
            None => Ok(ConstantPool::NULL),
        }
    }

    fn bind_parameter(
        &self,
        c: &mut Cursor<'_>,
        class: CanonicalRef,
        param: NodeRef,
        id: ConstantId,
        frame: &mut Frame,
        fields: &mut FxHashMap<CanonicalRef, ConstantId>,
    ) -> Result<(), ConstError> {
        frame.insert(param, id);
        let head = c.variable_head_at(param)?;
        if head.flags.contains(VariableFlags::FIELD_FORMAL) {
            let name = c.string(head.name)?;
            let Some(field) = self.instance_field(class, name) else {
                return Err(ConstError::at(
                    head.pos,
                    SourceErrorKind::Unresolved(format!("this.{name}")),
                ));
            };
            fields.insert(field, id);
        }
        Ok(())
    }

    fn instance_field(&self, class: CanonicalRef, name: &str) -> Option<CanonicalRef> {
        let program = self.unit.program();
        program.members(class).into_iter().find(|member| {
            program
                .resolve(*member)
                .is_some_and(|s| s.name == name && s.as_field().is_some_and(|f| !f.is_static()))
        })
    }

    fn run_initializers(
        &mut self,
        list: NodeRef,
        fields: &mut FxHashMap<CanonicalRef, ConstantId>,
    ) -> Result<(), ConstError> {
        let unit = self.unit;
        let mut c = unit.cursor_at(list);
        let len = c.read_list_length()?;
        for _ in 0..len {
            let offset = c.offset();
            match c.read_tag()? {
                Tag::FieldInitializer => {
                    let field = c.read_canonical_ref()?;
                    let id = self.eval_expression(&mut c)?;
                    fields.insert(field, id);
                }
                Tag::SuperInitializer | Tag::RedirectingInitializer => {
                    let pos = self.read_pos(&mut c)?;
                    let target = c.read_canonical_ref()?;
                    let args = self.eval_arguments(&mut c, pos)?;
                    let Some(symbol) = unit.program().resolve(target) else {
                        return Err(ConstError::at(
                            pos,
                            SourceErrorKind::Unresolved(format!("{target:?}")),
                        ));
                    };
                    let Some(info) = symbol.as_constructor().filter(|info| info.is_const) else {
                        return Err(ConstError::at(pos, SourceErrorKind::NotConstant));
                    };
                    self.run_constructor(pos, symbol.parent, info, &args, fields)?;
                }
                Tag::LocalInitializer => {
                    let decl = c.node_ref();
                    c.read_variable_head()?;
                    c.skip_type()?;
                    let id = if c.read_option()? {
                        self.eval_expression(&mut c)?
                    } else {
                        ConstantPool::NULL
                    };
                    if let Some(frame) = self.frames.last_mut() {
                        frame.insert(decl, id);
                    }
                }
                Tag::InvalidInitializer => {
                    return Err(ConstError::at(
                        self.pos,
                        SourceErrorKind::InvalidExpression("invalid initializer".to_owned()),
                    ));
                }
                other => return Err(IrError::unexpected(offset, other, "initializer").into()),
            }
        }
        Ok(())
    }

    // Types

    fn translate(&self, c: &mut Cursor<'_>, pos: TokenPos) -> Result<ResolvedType, ConstError> {
        match self.translator.translate(c)? {
            ResolvedType::Malformed(message) => {
                Err(ConstError::at(pos, SourceErrorKind::MalformedType(message)))
            }
            ty => Ok(ty),
        }
    }

    /// Whether `value` is an instance of `ty`. Casts let `null` through.
    fn is_instance(&self, value: &ConstValue, ty: &ResolvedType, cast: bool) -> bool {
        let program = self.unit.program();
        match ty {
            ResolvedType::Dynamic | ResolvedType::Void | ResolvedType::Parameter { .. } => true,
            ResolvedType::Bottom | ResolvedType::Malformed(_) => false,
            ResolvedType::Function { .. } => matches!(value, ConstValue::TearOff(_)),
            ResolvedType::Interface { class, .. } => {
                if matches!(value, ConstValue::Null) {
                    let name = program.qualified_name(*class);
                    return cast || name == core::NULL || name == core::OBJECT;
                }
                self.value_class(value)
                    .is_some_and(|actual| program.is_subclass_of(actual, *class))
            }
        }
    }

    fn value_class(&self, value: &ConstValue) -> Option<CanonicalRef> {
        let name = match value {
            ConstValue::Instance { class, .. } => return Some(*class),
            ConstValue::Null => core::NULL,
            ConstValue::Bool(_) => core::BOOL,
            ConstValue::Int(_) => core::INT,
            ConstValue::Double(_) => core::DOUBLE,
            ConstValue::String(_) => core::STRING,
            ConstValue::Symbol(_) => core::SYMBOL,
            ConstValue::Type(_) => core::TYPE,
            ConstValue::List { .. } => core::LIST,
            ConstValue::Map { .. } => core::MAP,
            ConstValue::TearOff(_) => core::FUNCTION,
        };
        self.unit.program().lookup(name)
    }

    fn type_name(&self, value: &ConstValue) -> String {
        match self.value_class(value) {
            Some(class) => self.unit.program().qualified_name(class),
            None => value.kind_name().to_owned(),
        }
    }

    fn expected_name(&self, ty: &ResolvedType) -> String {
        match ty.class() {
            Some(class) => self.unit.program().qualified_name(class),
            None => ty.to_string(),
        }
    }

    // Helpers

    fn read_pos(&mut self, c: &mut Cursor<'_>) -> Result<TokenPos, IrError> {
        let pos = c.read_position()?;
        if pos.is_real() {
            self.pos = pos;
        }
        Ok(self.pos)
    }

    fn eval_value(&mut self, c: &mut Cursor<'_>) -> Result<ConstValue, ConstError> {
        let id = self.eval_expression(c)?;
        self.value_of(id)
    }

    fn value_of(&self, id: ConstantId) -> Result<ConstValue, ConstError> {
        self.unit.pool().get(id).ok_or_else(|| {
            ConstError::Internal(IrError::Container(format!(
                "{id:?} is not in this unit's constant pool"
            )))
        })
    }

    fn intern(&self, value: ConstValue) -> ConstantId {
        self.unit.pool().intern(value)
    }

    fn member_name(&self, target: CanonicalRef) -> Result<&'u str, ConstError> {
        let unit = self.unit;
        match unit.program().resolve(target) {
            Some(symbol) => Ok(symbol.name.as_str()),
            None => Err(ConstError::at(
                self.pos,
                SourceErrorKind::Unresolved(format!("{target:?}")),
            )),
        }
    }

    fn unsupported(&self, operator: &str, receiver: &ConstValue) -> ConstError {
        ConstError::at(
            self.pos,
            SourceErrorKind::UnsupportedOperation {
                operator: operator.to_owned(),
                receiver: receiver.kind_name().to_owned(),
            },
        )
    }
}

impl std::fmt::Debug for ConstantEvaluator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstantEvaluator")
            .field("pending", &self.pending.len())
            .field("frames", &self.frames.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
