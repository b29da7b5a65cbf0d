//! Encoder: writes owned trees into the binary form read by [`Cursor`].
//!
//! Field order mirrors `skip.rs`. Variable references are written as the
//! offset of their declaration, so a declaration must be written before any
//! reference to it.
//!
//! [`Cursor`]: crate::Cursor

use rustc_hash::FxHashMap;

use crate::ast::{
    Arguments, Catch, Expression, FnLabel, FunctionNode, Initializer, Statement, SwitchCase,
    TypeNode, TypeParameter, VarLabel, VariableDeclaration,
};
use crate::cursor::MAX_UINT;
use crate::node::to_u32;
use crate::tag::{Tag, SPECIALIZED_INT_BIAS};
use crate::{CanonicalRef, IrError, NodeRef, StringTable, TokenPos};

/// Smallest and largest values written as a single specialized tag byte.
const SPECIALIZED_INT_RANGE: std::ops::RangeInclusive<i64> = -SPECIALIZED_INT_BIAS..=4;

#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
    strings: StringTable,
    vars: FxHashMap<VarLabel, NodeRef>,
    functions: FxHashMap<FnLabel, NodeRef>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue an existing string table, so references stay valid.
    pub fn with_strings(strings: StringTable) -> Self {
        Self {
            strings,
            ..Self::default()
        }
    }

    pub fn offset(&self) -> NodeRef {
        NodeRef::new(to_u32(self.buf.len(), "encoded data"))
    }

    /// Offset the declaration labelled `label` was written at.
    pub fn var_offset(&self, label: VarLabel) -> Option<NodeRef> {
        self.vars.get(&label).copied()
    }

    /// Offset the function node labelled `label` was written at.
    pub fn function_offset(&self, label: FnLabel) -> Option<NodeRef> {
        self.functions.get(&label).copied()
    }

    pub fn strings_mut(&mut self) -> &mut StringTable {
        &mut self.strings
    }

    pub fn finish(self) -> (Vec<u8>, StringTable) {
        (self.buf, self.strings)
    }

    // Scalars

    pub fn write_byte(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_uint(&mut self, value: u32) -> Result<(), IrError> {
        if value < 0x80 {
            self.buf.push(value as u8);
        } else if value < 0x4000 {
            self.buf.push(0x80 | (value >> 8) as u8);
            self.buf.push(value as u8);
        } else if value <= MAX_UINT {
            let bytes = value.to_be_bytes();
            self.buf.push(0xC0 | bytes[0]);
            self.buf.extend_from_slice(&bytes[1..]);
        } else {
            return Err(IrError::Encode(format!("{value} does not fit a varint")));
        }
        Ok(())
    }

    pub fn write_uint32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_double(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_position(&mut self, pos: TokenPos) -> Result<(), IrError> {
        let shifted = u32::try_from(i64::from(pos.raw()) + 1)
            .map_err(|_| IrError::Encode(format!("invalid position {}", pos.raw())))?;
        self.write_uint(shifted)
    }

    pub fn write_string(&mut self, text: &str) -> Result<(), IrError> {
        let r = self.strings.intern(text);
        self.write_uint(r.raw())
    }

    pub fn write_canonical_ref(&mut self, r: CanonicalRef) -> Result<(), IrError> {
        self.write_uint(r.raw())
    }

    pub fn write_tag(&mut self, tag: Tag) {
        self.buf.push(tag as u8);
    }

    fn write_list_length(&mut self, len: usize) -> Result<(), IrError> {
        self.write_uint(to_u32(len, "list length"))
    }

    fn write_var_ref(&mut self, label: VarLabel) -> Result<(), IrError> {
        let offset = self
            .var_offset(label)
            .ok_or_else(|| IrError::Encode(format!("variable {label:?} used before declaration")))?;
        self.write_uint(offset.raw())
    }

    fn write_option<T>(
        &mut self,
        value: Option<&T>,
        write: impl FnOnce(&mut Self, &T) -> Result<(), IrError>,
    ) -> Result<(), IrError> {
        match value {
            Some(value) => {
                self.write_tag(Tag::Something);
                write(self, value)
            }
            None => {
                self.write_tag(Tag::Nothing);
                Ok(())
            }
        }
    }

    // Expressions

    /// Write an expression, returning its offset.
    pub fn write_expression(&mut self, expr: &Expression) -> Result<NodeRef, IrError> {
        let start = self.offset();
        match expr {
            Expression::Invalid { pos, message } => {
                self.write_tag(Tag::InvalidExpression);
                self.write_position(*pos)?;
                self.write_string(message)?;
            }
            Expression::VariableGet { pos, var, promoted } => {
                self.write_tag(Tag::VariableGet);
                self.write_position(*pos)?;
                self.write_var_ref(*var)?;
                self.write_option(promoted.as_ref(), Self::write_type_unit)?;
            }
            Expression::VariableSet { pos, var, value } => {
                self.write_tag(Tag::VariableSet);
                self.write_position(*pos)?;
                self.write_var_ref(*var)?;
                self.write_expression(value)?;
            }
            Expression::PropertyGet {
                pos,
                receiver,
                name,
                target,
            } => {
                self.write_tag(Tag::PropertyGet);
                self.write_position(*pos)?;
                self.write_expression(receiver)?;
                self.write_string(name)?;
                self.write_canonical_ref(*target)?;
            }
            Expression::PropertySet {
                pos,
                receiver,
                name,
                value,
                target,
            } => {
                self.write_tag(Tag::PropertySet);
                self.write_position(*pos)?;
                self.write_expression(receiver)?;
                self.write_string(name)?;
                self.write_expression(value)?;
                self.write_canonical_ref(*target)?;
            }
            Expression::DirectPropertyGet {
                pos,
                receiver,
                target,
            } => {
                self.write_tag(Tag::DirectPropertyGet);
                self.write_position(*pos)?;
                self.write_expression(receiver)?;
                self.write_canonical_ref(*target)?;
            }
            Expression::DirectPropertySet {
                pos,
                receiver,
                target,
                value,
            } => {
                self.write_tag(Tag::DirectPropertySet);
                self.write_position(*pos)?;
                self.write_expression(receiver)?;
                self.write_canonical_ref(*target)?;
                self.write_expression(value)?;
            }
            Expression::DirectMethodInvocation {
                pos,
                receiver,
                target,
                arguments,
            } => {
                self.write_tag(Tag::DirectMethodInvocation);
                self.write_position(*pos)?;
                self.write_expression(receiver)?;
                self.write_canonical_ref(*target)?;
                self.write_arguments(arguments)?;
            }
            Expression::SuperPropertyGet { pos, name, target } => {
                self.write_tag(Tag::SuperPropertyGet);
                self.write_position(*pos)?;
                self.write_string(name)?;
                self.write_canonical_ref(*target)?;
            }
            Expression::SuperPropertySet {
                pos,
                name,
                value,
                target,
            } => {
                self.write_tag(Tag::SuperPropertySet);
                self.write_position(*pos)?;
                self.write_string(name)?;
                self.write_expression(value)?;
                self.write_canonical_ref(*target)?;
            }
            Expression::StaticGet { pos, target } => {
                self.write_tag(Tag::StaticGet);
                self.write_position(*pos)?;
                self.write_canonical_ref(*target)?;
            }
            Expression::StaticSet { pos, target, value } => {
                self.write_tag(Tag::StaticSet);
                self.write_position(*pos)?;
                self.write_canonical_ref(*target)?;
                self.write_expression(value)?;
            }
            Expression::MethodInvocation {
                pos,
                receiver,
                name,
                arguments,
                target,
            } => {
                self.write_tag(Tag::MethodInvocation);
                self.write_position(*pos)?;
                self.write_expression(receiver)?;
                self.write_string(name)?;
                self.write_arguments(arguments)?;
                self.write_canonical_ref(*target)?;
            }
            Expression::SuperMethodInvocation {
                pos,
                name,
                arguments,
                target,
            } => {
                self.write_tag(Tag::SuperMethodInvocation);
                self.write_position(*pos)?;
                self.write_string(name)?;
                self.write_arguments(arguments)?;
                self.write_canonical_ref(*target)?;
            }
            Expression::StaticInvocation {
                pos,
                target,
                arguments,
                is_const,
            } => {
                self.write_tag(if *is_const {
                    Tag::ConstStaticInvocation
                } else {
                    Tag::StaticInvocation
                });
                self.write_position(*pos)?;
                self.write_canonical_ref(*target)?;
                self.write_arguments(arguments)?;
            }
            Expression::ConstructorInvocation {
                pos,
                target,
                arguments,
                is_const,
            } => {
                self.write_tag(if *is_const {
                    Tag::ConstConstructorInvocation
                } else {
                    Tag::ConstructorInvocation
                });
                self.write_position(*pos)?;
                self.write_canonical_ref(*target)?;
                self.write_arguments(arguments)?;
            }
            Expression::Not(operand) => {
                self.write_tag(Tag::Not);
                self.write_expression(operand)?;
            }
            Expression::Logical { left, op, right } => {
                self.write_tag(Tag::LogicalExpression);
                self.write_expression(left)?;
                self.write_byte(*op as u8);
                self.write_expression(right)?;
            }
            Expression::Conditional {
                condition,
                then,
                otherwise,
                static_type,
            } => {
                self.write_tag(Tag::ConditionalExpression);
                self.write_expression(condition)?;
                self.write_expression(then)?;
                self.write_expression(otherwise)?;
                self.write_option(static_type.as_ref(), Self::write_type_unit)?;
            }
            Expression::StringConcatenation { pos, parts } => {
                self.write_tag(Tag::StringConcatenation);
                self.write_position(*pos)?;
                self.write_expressions(parts)?;
            }
            Expression::Is { pos, operand, ty } => {
                self.write_tag(Tag::IsExpression);
                self.write_position(*pos)?;
                self.write_expression(operand)?;
                self.write_type(ty)?;
            }
            Expression::As {
                pos,
                flags,
                operand,
                ty,
            } => {
                self.write_tag(Tag::AsExpression);
                self.write_position(*pos)?;
                self.write_byte(*flags);
                self.write_expression(operand)?;
                self.write_type(ty)?;
            }
            Expression::StringLiteral(text) => {
                self.write_tag(Tag::StringLiteral);
                self.write_string(text)?;
            }
            Expression::IntLiteral(value) => self.write_int(*value)?,
            Expression::BigIntLiteral(text) => {
                self.write_tag(Tag::BigIntLiteral);
                self.write_string(text)?;
            }
            Expression::DoubleLiteral(value) => {
                self.write_tag(Tag::DoubleLiteral);
                self.write_double(*value);
            }
            Expression::BoolLiteral(true) => self.write_tag(Tag::TrueLiteral),
            Expression::BoolLiteral(false) => self.write_tag(Tag::FalseLiteral),
            Expression::NullLiteral => self.write_tag(Tag::NullLiteral),
            Expression::SymbolLiteral(text) => {
                self.write_tag(Tag::SymbolLiteral);
                self.write_string(text)?;
            }
            Expression::TypeLiteral(ty) => {
                self.write_tag(Tag::TypeLiteral);
                self.write_type(ty)?;
            }
            Expression::This => self.write_tag(Tag::ThisExpression),
            Expression::Rethrow { pos } => {
                self.write_tag(Tag::Rethrow);
                self.write_position(*pos)?;
            }
            Expression::Throw { pos, value } => {
                self.write_tag(Tag::Throw);
                self.write_position(*pos)?;
                self.write_expression(value)?;
            }
            Expression::ListLiteral {
                pos,
                element_type,
                elements,
                is_const,
            } => {
                self.write_tag(if *is_const {
                    Tag::ConstListLiteral
                } else {
                    Tag::ListLiteral
                });
                self.write_position(*pos)?;
                self.write_type(element_type)?;
                self.write_expressions(elements)?;
            }
            Expression::MapLiteral {
                pos,
                key_type,
                value_type,
                entries,
                is_const,
            } => {
                self.write_tag(if *is_const {
                    Tag::ConstMapLiteral
                } else {
                    Tag::MapLiteral
                });
                self.write_position(*pos)?;
                self.write_type(key_type)?;
                self.write_type(value_type)?;
                self.write_list_length(entries.len())?;
                for (key, value) in entries {
                    self.write_expression(key)?;
                    self.write_expression(value)?;
                }
            }
            Expression::FunctionExpression { pos, function } => {
                self.write_tag(Tag::FunctionExpression);
                self.write_position(*pos)?;
                self.write_function_node(function)?;
            }
            Expression::Let { variable, body } => {
                self.write_tag(Tag::Let);
                self.write_variable_declaration(variable)?;
                self.write_expression(body)?;
            }
        }
        Ok(start)
    }

    /// Smallest encoding for `value`; big-int literal outside the varint range.
    fn write_int(&mut self, value: i64) -> Result<(), IrError> {
        if SPECIALIZED_INT_RANGE.contains(&value) {
            let payload = (value + SPECIALIZED_INT_BIAS) as u8;
            self.buf.push(Tag::SpecializedIntLiteral.with_payload(payload));
            return Ok(());
        }
        let magnitude = value.unsigned_abs();
        match u32::try_from(magnitude) {
            Ok(m) if m <= MAX_UINT => {
                self.write_tag(if value < 0 {
                    Tag::NegativeIntLiteral
                } else {
                    Tag::PositiveIntLiteral
                });
                self.write_uint(m)
            }
            _ => {
                self.write_tag(Tag::BigIntLiteral);
                self.write_string(&value.to_string())
            }
        }
    }

    fn write_expressions(&mut self, exprs: &[Expression]) -> Result<(), IrError> {
        self.write_list_length(exprs.len())?;
        for expr in exprs {
            self.write_expression(expr)?;
        }
        Ok(())
    }

    fn write_expression_unit(&mut self, expr: &Expression) -> Result<(), IrError> {
        self.write_expression(expr).map(drop)
    }

    pub fn write_arguments(&mut self, args: &Arguments) -> Result<(), IrError> {
        self.write_list_length(args.count())?;
        self.write_types(&args.types)?;
        self.write_expressions(&args.positional)?;
        self.write_list_length(args.named.len())?;
        for (name, value) in &args.named {
            self.write_string(name)?;
            self.write_expression(value)?;
        }
        Ok(())
    }

    // Statements

    /// Write a statement, returning its offset.
    pub fn write_statement(&mut self, stmt: &Statement) -> Result<NodeRef, IrError> {
        let start = self.offset();
        match stmt {
            Statement::Invalid => self.write_tag(Tag::InvalidStatement),
            Statement::Empty => self.write_tag(Tag::EmptyStatement),
            Statement::Expression(expr) => {
                self.write_tag(Tag::ExpressionStatement);
                self.write_expression(expr)?;
            }
            Statement::Block {
                pos,
                end_pos,
                statements,
            } => {
                self.write_tag(Tag::Block);
                self.write_position(*pos)?;
                self.write_position(*end_pos)?;
                self.write_statements(statements)?;
            }
            Statement::Assert {
                condition,
                start: from,
                end,
                message,
            } => {
                self.write_tag(Tag::AssertStatement);
                self.write_expression(condition)?;
                self.write_position(*from)?;
                self.write_position(*end)?;
                self.write_option(message.as_ref(), Self::write_expression_unit)?;
            }
            Statement::Labeled(body) => {
                self.write_tag(Tag::LabeledStatement);
                self.write_statement(body)?;
            }
            Statement::Break { pos, label } => {
                self.write_tag(Tag::BreakStatement);
                self.write_position(*pos)?;
                self.write_uint(*label)?;
            }
            Statement::ContinueSwitch { pos, case } => {
                self.write_tag(Tag::ContinueSwitchStatement);
                self.write_position(*pos)?;
                self.write_uint(*case)?;
            }
            Statement::While {
                pos,
                condition,
                body,
            } => {
                self.write_tag(Tag::WhileStatement);
                self.write_position(*pos)?;
                self.write_expression(condition)?;
                self.write_statement(body)?;
            }
            Statement::Do {
                pos,
                body,
                condition,
            } => {
                self.write_tag(Tag::DoStatement);
                self.write_position(*pos)?;
                self.write_statement(body)?;
                self.write_expression(condition)?;
            }
            Statement::For {
                pos,
                variables,
                condition,
                updates,
                body,
            } => {
                self.write_tag(Tag::ForStatement);
                self.write_position(*pos)?;
                self.write_variable_declarations(variables)?;
                self.write_option(condition.as_ref(), Self::write_expression_unit)?;
                self.write_expressions(updates)?;
                self.write_statement(body)?;
            }
            Statement::ForIn {
                pos,
                body_pos,
                variable,
                iterable,
                body,
            } => {
                self.write_tag(Tag::ForInStatement);
                self.write_position(*pos)?;
                self.write_position(*body_pos)?;
                self.write_variable_declaration(variable)?;
                self.write_expression(iterable)?;
                self.write_statement(body)?;
            }
            Statement::Switch {
                pos,
                scrutinee,
                cases,
            } => {
                self.write_tag(Tag::SwitchStatement);
                self.write_position(*pos)?;
                self.write_expression(scrutinee)?;
                self.write_list_length(cases.len())?;
                for case in cases {
                    self.write_switch_case(case)?;
                }
            }
            Statement::If {
                pos,
                condition,
                then,
                otherwise,
            } => {
                self.write_tag(Tag::IfStatement);
                self.write_position(*pos)?;
                self.write_expression(condition)?;
                self.write_statement(then)?;
                self.write_statement(otherwise)?;
            }
            Statement::Return { pos, value } => {
                self.write_tag(Tag::ReturnStatement);
                self.write_position(*pos)?;
                self.write_option(value.as_ref(), Self::write_expression_unit)?;
            }
            Statement::TryCatch {
                body,
                flags,
                catches,
            } => {
                self.write_tag(Tag::TryCatch);
                self.write_statement(body)?;
                self.write_byte(*flags);
                self.write_list_length(catches.len())?;
                for catch in catches {
                    self.write_catch(catch)?;
                }
            }
            Statement::TryFinally { body, finalizer } => {
                self.write_tag(Tag::TryFinally);
                self.write_statement(body)?;
                self.write_statement(finalizer)?;
            }
            Statement::Yield { pos, flags, value } => {
                self.write_tag(Tag::YieldStatement);
                self.write_position(*pos)?;
                self.write_byte(*flags);
                self.write_expression(value)?;
            }
            Statement::VariableDeclaration(decl) => {
                self.write_tag(Tag::VariableDeclaration);
                self.write_variable_declaration(decl)?;
            }
            Statement::FunctionDeclaration {
                pos,
                variable,
                function,
            } => {
                self.write_tag(Tag::FunctionDeclaration);
                self.write_position(*pos)?;
                self.write_variable_declaration(variable)?;
                self.write_function_node(function)?;
            }
        }
        Ok(start)
    }

    fn write_statements(&mut self, stmts: &[Statement]) -> Result<(), IrError> {
        self.write_list_length(stmts.len())?;
        for stmt in stmts {
            self.write_statement(stmt)?;
        }
        Ok(())
    }

    fn write_switch_case(&mut self, case: &SwitchCase) -> Result<(), IrError> {
        self.write_list_length(case.expressions.len())?;
        for (pos, expr) in &case.expressions {
            self.write_position(*pos)?;
            self.write_expression(expr)?;
        }
        self.write_bool(case.is_default);
        self.write_statement(&case.body).map(drop)
    }

    fn write_catch(&mut self, catch: &Catch) -> Result<(), IrError> {
        self.write_position(catch.pos)?;
        self.write_type(&catch.guard)?;
        self.write_option(catch.exception.as_ref(), Self::write_declaration_unit)?;
        self.write_option(catch.stack_trace.as_ref(), Self::write_declaration_unit)?;
        self.write_statement(&catch.body).map(drop)
    }

    /// Write an untagged variable declaration, returning its offset.
    pub fn write_variable_declaration(
        &mut self,
        decl: &VariableDeclaration,
    ) -> Result<NodeRef, IrError> {
        let start = self.offset();
        // Registered first: an initializer may not refer to its own variable,
        // but a closure in it may.
        self.vars.insert(decl.label, start);
        self.write_position(decl.pos)?;
        self.write_position(decl.equals_pos)?;
        self.write_byte(decl.flags.bits());
        self.write_string(&decl.name)?;
        self.write_type(&decl.ty)?;
        let init = decl.initializer.as_deref();
        self.write_option(init, Self::write_expression_unit)?;
        Ok(start)
    }

    fn write_declaration_unit(&mut self, decl: &VariableDeclaration) -> Result<(), IrError> {
        self.write_variable_declaration(decl).map(drop)
    }

    fn write_variable_declarations(
        &mut self,
        decls: &[VariableDeclaration],
    ) -> Result<(), IrError> {
        self.write_list_length(decls.len())?;
        for decl in decls {
            self.write_variable_declaration(decl)?;
        }
        Ok(())
    }

    /// Write a tagged function node, returning its offset.
    pub fn write_function_node(&mut self, function: &FunctionNode) -> Result<NodeRef, IrError> {
        let start = self.offset();
        self.functions.insert(function.label, start);
        self.write_tag(Tag::FunctionNode);
        self.write_position(function.pos)?;
        self.write_position(function.end_pos)?;
        self.write_byte(function.async_marker as u8);
        self.write_byte(function.dart_async_marker as u8);
        self.write_type_parameters(&function.type_parameters)?;
        self.write_uint(function.required_parameter_count)?;
        self.write_variable_declarations(&function.positional)?;
        self.write_variable_declarations(&function.named)?;
        self.write_type(&function.return_type)?;
        match &function.body {
            Some(body) => {
                self.write_tag(Tag::Something);
                self.write_statement(body)?;
            }
            None => self.write_tag(Tag::Nothing),
        }
        Ok(start)
    }

    fn write_type_parameters(&mut self, params: &[TypeParameter]) -> Result<(), IrError> {
        self.write_list_length(params.len())?;
        for param in params {
            self.write_byte(param.flags);
            self.write_string(&param.name)?;
            self.write_type(&param.bound)?;
        }
        Ok(())
    }

    // Types

    pub fn write_type(&mut self, ty: &TypeNode) -> Result<NodeRef, IrError> {
        let start = self.offset();
        match ty {
            TypeNode::Invalid => self.write_tag(Tag::InvalidType),
            TypeNode::Dynamic => self.write_tag(Tag::DynamicType),
            TypeNode::Void => self.write_tag(Tag::VoidType),
            TypeNode::Bottom => self.write_tag(Tag::BottomType),
            TypeNode::Interface { class, arguments } => {
                self.write_tag(Tag::InterfaceType);
                self.write_canonical_ref(*class)?;
                self.write_types(arguments)?;
            }
            TypeNode::SimpleInterface(class) => {
                self.write_tag(Tag::SimpleInterfaceType);
                self.write_canonical_ref(*class)?;
            }
            TypeNode::Function {
                type_parameters,
                required,
                positional,
                named,
                return_type,
            } => {
                self.write_tag(Tag::FunctionType);
                self.write_type_parameters(type_parameters)?;
                self.write_uint(*required)?;
                self.write_types(positional)?;
                self.write_list_length(named.len())?;
                for (name, ty) in named {
                    self.write_string(name)?;
                    self.write_type(ty)?;
                }
                self.write_type(return_type)?;
            }
            TypeNode::SimpleFunction {
                positional,
                return_type,
            } => {
                self.write_tag(Tag::SimpleFunctionType);
                self.write_types(positional)?;
                self.write_type(return_type)?;
            }
            TypeNode::Parameter { index, bound } => {
                self.write_tag(Tag::TypeParameterType);
                self.write_uint(*index)?;
                self.write_option(bound.as_deref(), Self::write_type_unit)?;
            }
        }
        Ok(start)
    }

    fn write_type_unit(&mut self, ty: &TypeNode) -> Result<(), IrError> {
        self.write_type(ty).map(drop)
    }

    fn write_types(&mut self, types: &[TypeNode]) -> Result<(), IrError> {
        self.write_list_length(types.len())?;
        for ty in types {
            self.write_type(ty)?;
        }
        Ok(())
    }

    // Initializers

    pub fn write_initializer(&mut self, init: &Initializer) -> Result<NodeRef, IrError> {
        let start = self.offset();
        match init {
            Initializer::Invalid => self.write_tag(Tag::InvalidInitializer),
            Initializer::Field { field, value } => {
                self.write_tag(Tag::FieldInitializer);
                self.write_canonical_ref(*field)?;
                self.write_expression(value)?;
            }
            Initializer::Super {
                pos,
                target,
                arguments,
            } => {
                self.write_tag(Tag::SuperInitializer);
                self.write_position(*pos)?;
                self.write_canonical_ref(*target)?;
                self.write_arguments(arguments)?;
            }
            Initializer::Redirecting {
                pos,
                target,
                arguments,
            } => {
                self.write_tag(Tag::RedirectingInitializer);
                self.write_position(*pos)?;
                self.write_canonical_ref(*target)?;
                self.write_arguments(arguments)?;
            }
            Initializer::Local(decl) => {
                self.write_tag(Tag::LocalInitializer);
                self.write_variable_declaration(decl)?;
            }
        }
        Ok(start)
    }

    /// Write an initializer list, returning its offset.
    pub fn write_initializers(&mut self, inits: &[Initializer]) -> Result<NodeRef, IrError> {
        let start = self.offset();
        self.write_list_length(inits.len())?;
        for init in inits {
            self.write_initializer(init)?;
        }
        Ok(start)
    }
}
