//! Decoding traversal: reads a construct into its owned tree form.
//!
//! Parallel to `skip.rs`, arm for arm. Labels in the decoded tree are the
//! offsets of the nodes they name.

use crate::ast::{
    Arguments, Catch, Expression, FnLabel, FunctionNode, Initializer, Statement, SwitchCase,
    TypeNode, TypeParameter, VarLabel, VariableDeclaration,
};
use crate::cursor::Cursor;
use crate::tag::{LogicalOp, Tag, SPECIALIZED_INT_BIAS};
use crate::IrError;

impl Cursor<'_> {
    fn decode_name(&mut self) -> Result<String, IrError> {
        self.read_string().map(str::to_owned)
    }

    pub fn decode_expression(&mut self) -> Result<Expression, IrError> {
        let offset = self.offset();
        let (tag, payload) = self.read_tag_and_payload()?;
        let expr = match tag {
            Tag::InvalidExpression => Expression::Invalid {
                pos: self.read_position()?,
                message: self.decode_name()?,
            },
            Tag::VariableGet => Expression::VariableGet {
                pos: self.read_position()?,
                var: VarLabel(self.read_node_ref()?.raw()),
                promoted: self.decode_option_type()?,
            },
            Tag::VariableSet => Expression::VariableSet {
                pos: self.read_position()?,
                var: VarLabel(self.read_node_ref()?.raw()),
                value: Box::new(self.decode_expression()?),
            },
            Tag::PropertyGet => Expression::PropertyGet {
                pos: self.read_position()?,
                receiver: Box::new(self.decode_expression()?),
                name: self.decode_name()?,
                target: self.read_canonical_ref()?,
            },
            Tag::PropertySet => Expression::PropertySet {
                pos: self.read_position()?,
                receiver: Box::new(self.decode_expression()?),
                name: self.decode_name()?,
                value: Box::new(self.decode_expression()?),
                target: self.read_canonical_ref()?,
            },
            Tag::DirectPropertyGet => Expression::DirectPropertyGet {
                pos: self.read_position()?,
                receiver: Box::new(self.decode_expression()?),
                target: self.read_canonical_ref()?,
            },
            Tag::DirectPropertySet => Expression::DirectPropertySet {
                pos: self.read_position()?,
                receiver: Box::new(self.decode_expression()?),
                target: self.read_canonical_ref()?,
                value: Box::new(self.decode_expression()?),
            },
            Tag::DirectMethodInvocation => Expression::DirectMethodInvocation {
                pos: self.read_position()?,
                receiver: Box::new(self.decode_expression()?),
                target: self.read_canonical_ref()?,
                arguments: self.decode_arguments()?,
            },
            Tag::SuperPropertyGet => Expression::SuperPropertyGet {
                pos: self.read_position()?,
                name: self.decode_name()?,
                target: self.read_canonical_ref()?,
            },
            Tag::SuperPropertySet => Expression::SuperPropertySet {
                pos: self.read_position()?,
                name: self.decode_name()?,
                value: Box::new(self.decode_expression()?),
                target: self.read_canonical_ref()?,
            },
            Tag::StaticGet => Expression::StaticGet {
                pos: self.read_position()?,
                target: self.read_canonical_ref()?,
            },
            Tag::StaticSet => Expression::StaticSet {
                pos: self.read_position()?,
                target: self.read_canonical_ref()?,
                value: Box::new(self.decode_expression()?),
            },
            Tag::MethodInvocation => Expression::MethodInvocation {
                pos: self.read_position()?,
                receiver: Box::new(self.decode_expression()?),
                name: self.decode_name()?,
                arguments: self.decode_arguments()?,
                target: self.read_canonical_ref()?,
            },
            Tag::SuperMethodInvocation => Expression::SuperMethodInvocation {
                pos: self.read_position()?,
                name: self.decode_name()?,
                arguments: self.decode_arguments()?,
                target: self.read_canonical_ref()?,
            },
            Tag::StaticInvocation | Tag::ConstStaticInvocation => Expression::StaticInvocation {
                pos: self.read_position()?,
                target: self.read_canonical_ref()?,
                arguments: self.decode_arguments()?,
                is_const: tag == Tag::ConstStaticInvocation,
            },
            Tag::ConstructorInvocation | Tag::ConstConstructorInvocation => {
                Expression::ConstructorInvocation {
                    pos: self.read_position()?,
                    target: self.read_canonical_ref()?,
                    arguments: self.decode_arguments()?,
                    is_const: tag == Tag::ConstConstructorInvocation,
                }
            }
            Tag::Not => Expression::Not(Box::new(self.decode_expression()?)),
            Tag::LogicalExpression => {
                let left = Box::new(self.decode_expression()?);
                let op_offset = self.offset();
                let byte = self.read_byte()?;
                let op = LogicalOp::from_byte(byte).ok_or(IrError::InvalidByte {
                    offset: op_offset,
                    what: "logical operator",
                    value: byte,
                })?;
                Expression::Logical {
                    left,
                    op,
                    right: Box::new(self.decode_expression()?),
                }
            }
            Tag::ConditionalExpression => Expression::Conditional {
                condition: Box::new(self.decode_expression()?),
                then: Box::new(self.decode_expression()?),
                otherwise: Box::new(self.decode_expression()?),
                static_type: self.decode_option_type()?,
            },
            Tag::StringConcatenation => Expression::StringConcatenation {
                pos: self.read_position()?,
                parts: self.decode_list_of_expressions()?,
            },
            Tag::IsExpression => Expression::Is {
                pos: self.read_position()?,
                operand: Box::new(self.decode_expression()?),
                ty: self.decode_type()?,
            },
            Tag::AsExpression => Expression::As {
                pos: self.read_position()?,
                flags: self.read_byte()?,
                operand: Box::new(self.decode_expression()?),
                ty: self.decode_type()?,
            },
            Tag::StringLiteral => Expression::StringLiteral(self.decode_name()?),
            Tag::BigIntLiteral => Expression::BigIntLiteral(self.decode_name()?),
            Tag::SymbolLiteral => Expression::SymbolLiteral(self.decode_name()?),
            Tag::SpecializedIntLiteral => {
                Expression::IntLiteral(i64::from(payload) - SPECIALIZED_INT_BIAS)
            }
            Tag::PositiveIntLiteral => Expression::IntLiteral(i64::from(self.read_uint()?)),
            Tag::NegativeIntLiteral => Expression::IntLiteral(-i64::from(self.read_uint()?)),
            Tag::DoubleLiteral => Expression::DoubleLiteral(self.read_double()?),
            Tag::TrueLiteral => Expression::BoolLiteral(true),
            Tag::FalseLiteral => Expression::BoolLiteral(false),
            Tag::NullLiteral => Expression::NullLiteral,
            Tag::ThisExpression => Expression::This,
            Tag::TypeLiteral => Expression::TypeLiteral(self.decode_type()?),
            Tag::Rethrow => Expression::Rethrow {
                pos: self.read_position()?,
            },
            Tag::Throw => Expression::Throw {
                pos: self.read_position()?,
                value: Box::new(self.decode_expression()?),
            },
            Tag::ListLiteral | Tag::ConstListLiteral => Expression::ListLiteral {
                pos: self.read_position()?,
                element_type: self.decode_type()?,
                elements: self.decode_list_of_expressions()?,
                is_const: tag == Tag::ConstListLiteral,
            },
            Tag::MapLiteral | Tag::ConstMapLiteral => {
                let pos = self.read_position()?;
                let key_type = self.decode_type()?;
                let value_type = self.decode_type()?;
                let len = self.read_list_length()?;
                let mut entries = Vec::with_capacity(len);
                for _ in 0..len {
                    let key = self.decode_expression()?;
                    let value = self.decode_expression()?;
                    entries.push((key, value));
                }
                Expression::MapLiteral {
                    pos,
                    key_type,
                    value_type,
                    entries,
                    is_const: tag == Tag::ConstMapLiteral,
                }
            }
            Tag::FunctionExpression => Expression::FunctionExpression {
                pos: self.read_position()?,
                function: Box::new(self.decode_function_node()?),
            },
            Tag::Let => Expression::Let {
                variable: Box::new(self.decode_variable_declaration()?),
                body: Box::new(self.decode_expression()?),
            },
            other => return Err(IrError::unexpected(offset, other, "expression")),
        };
        Ok(expr)
    }

    fn decode_option_expression(&mut self) -> Result<Option<Expression>, IrError> {
        if self.read_option()? {
            self.decode_expression().map(Some)
        } else {
            Ok(None)
        }
    }

    fn decode_list_of_expressions(&mut self) -> Result<Vec<Expression>, IrError> {
        let len = self.read_list_length()?;
        (0..len).map(|_| self.decode_expression()).collect()
    }

    pub fn decode_arguments(&mut self) -> Result<Arguments, IrError> {
        self.read_uint()?; // total count, recomputed by the encoder
        let types = self.decode_list_of_types()?;
        let positional = self.decode_list_of_expressions()?;
        let len = self.read_list_length()?;
        let mut named = Vec::with_capacity(len);
        for _ in 0..len {
            let name = self.decode_name()?;
            named.push((name, self.decode_expression()?));
        }
        Ok(Arguments {
            types,
            positional,
            named,
        })
    }

    pub fn decode_statement(&mut self) -> Result<Statement, IrError> {
        let offset = self.offset();
        let tag = self.read_tag()?;
        let stmt = match tag {
            Tag::InvalidStatement => Statement::Invalid,
            Tag::EmptyStatement => Statement::Empty,
            Tag::ExpressionStatement => Statement::Expression(self.decode_expression()?),
            Tag::Block => Statement::Block {
                pos: self.read_position()?,
                end_pos: self.read_position()?,
                statements: self.decode_list_of_statements()?,
            },
            Tag::AssertStatement => Statement::Assert {
                condition: self.decode_expression()?,
                start: self.read_position()?,
                end: self.read_position()?,
                message: self.decode_option_expression()?,
            },
            Tag::LabeledStatement => Statement::Labeled(Box::new(self.decode_statement()?)),
            Tag::BreakStatement => Statement::Break {
                pos: self.read_position()?,
                label: self.read_uint()?,
            },
            Tag::ContinueSwitchStatement => Statement::ContinueSwitch {
                pos: self.read_position()?,
                case: self.read_uint()?,
            },
            Tag::WhileStatement => Statement::While {
                pos: self.read_position()?,
                condition: self.decode_expression()?,
                body: Box::new(self.decode_statement()?),
            },
            Tag::DoStatement => Statement::Do {
                pos: self.read_position()?,
                body: Box::new(self.decode_statement()?),
                condition: self.decode_expression()?,
            },
            Tag::ForStatement => Statement::For {
                pos: self.read_position()?,
                variables: self.decode_list_of_variable_declarations()?,
                condition: self.decode_option_expression()?,
                updates: self.decode_list_of_expressions()?,
                body: Box::new(self.decode_statement()?),
            },
            Tag::ForInStatement => Statement::ForIn {
                pos: self.read_position()?,
                body_pos: self.read_position()?,
                variable: self.decode_variable_declaration()?,
                iterable: self.decode_expression()?,
                body: Box::new(self.decode_statement()?),
            },
            Tag::SwitchStatement => {
                let pos = self.read_position()?;
                let scrutinee = self.decode_expression()?;
                let len = self.read_list_length()?;
                let mut cases = Vec::with_capacity(len);
                for _ in 0..len {
                    cases.push(self.decode_switch_case()?);
                }
                Statement::Switch {
                    pos,
                    scrutinee,
                    cases,
                }
            }
            Tag::IfStatement => Statement::If {
                pos: self.read_position()?,
                condition: self.decode_expression()?,
                then: Box::new(self.decode_statement()?),
                otherwise: Box::new(self.decode_statement()?),
            },
            Tag::ReturnStatement => Statement::Return {
                pos: self.read_position()?,
                value: self.decode_option_expression()?,
            },
            Tag::TryCatch => {
                let body = Box::new(self.decode_statement()?);
                let flags = self.read_byte()?;
                let len = self.read_list_length()?;
                let mut catches = Vec::with_capacity(len);
                for _ in 0..len {
                    catches.push(self.decode_catch()?);
                }
                Statement::TryCatch {
                    body,
                    flags,
                    catches,
                }
            }
            Tag::TryFinally => Statement::TryFinally {
                body: Box::new(self.decode_statement()?),
                finalizer: Box::new(self.decode_statement()?),
            },
            Tag::YieldStatement => Statement::Yield {
                pos: self.read_position()?,
                flags: self.read_byte()?,
                value: self.decode_expression()?,
            },
            Tag::VariableDeclaration => {
                Statement::VariableDeclaration(self.decode_variable_declaration()?)
            }
            Tag::FunctionDeclaration => Statement::FunctionDeclaration {
                pos: self.read_position()?,
                variable: self.decode_variable_declaration()?,
                function: Box::new(self.decode_function_node()?),
            },
            other => return Err(IrError::unexpected(offset, other, "statement")),
        };
        Ok(stmt)
    }

    fn decode_list_of_statements(&mut self) -> Result<Vec<Statement>, IrError> {
        let len = self.read_list_length()?;
        (0..len).map(|_| self.decode_statement()).collect()
    }

    fn decode_switch_case(&mut self) -> Result<SwitchCase, IrError> {
        let len = self.read_list_length()?;
        let mut expressions = Vec::with_capacity(len);
        for _ in 0..len {
            let pos = self.read_position()?;
            expressions.push((pos, self.decode_expression()?));
        }
        Ok(SwitchCase {
            expressions,
            is_default: self.read_bool()?,
            body: self.decode_statement()?,
        })
    }

    fn decode_catch(&mut self) -> Result<Catch, IrError> {
        Ok(Catch {
            pos: self.read_position()?,
            guard: self.decode_type()?,
            exception: self.decode_option_variable_declaration()?,
            stack_trace: self.decode_option_variable_declaration()?,
            body: self.decode_statement()?,
        })
    }

    pub fn decode_variable_declaration(&mut self) -> Result<VariableDeclaration, IrError> {
        let head = self.read_variable_head()?;
        Ok(VariableDeclaration {
            label: VarLabel(head.offset.raw()),
            pos: head.pos,
            equals_pos: head.equals_pos,
            flags: head.flags,
            name: self.string(head.name)?.to_owned(),
            ty: self.decode_type()?,
            initializer: self.decode_option_expression()?.map(Box::new),
        })
    }

    fn decode_option_variable_declaration(
        &mut self,
    ) -> Result<Option<VariableDeclaration>, IrError> {
        if self.read_option()? {
            self.decode_variable_declaration().map(Some)
        } else {
            Ok(None)
        }
    }

    fn decode_list_of_variable_declarations(
        &mut self,
    ) -> Result<Vec<VariableDeclaration>, IrError> {
        let len = self.read_list_length()?;
        (0..len).map(|_| self.decode_variable_declaration()).collect()
    }

    pub fn decode_function_node(&mut self) -> Result<FunctionNode, IrError> {
        let head = self.read_function_head()?;
        let type_parameters = self.decode_type_parameters()?;
        let required_parameter_count = self.read_uint()?;
        let positional = self.decode_list_of_variable_declarations()?;
        let named = self.decode_list_of_variable_declarations()?;
        let return_type = self.decode_type()?;
        let body = if self.read_option()? {
            Some(Box::new(self.decode_statement()?))
        } else {
            None
        };
        Ok(FunctionNode {
            label: FnLabel(head.offset.raw()),
            pos: head.pos,
            end_pos: head.end_pos,
            async_marker: head.async_marker,
            dart_async_marker: head.dart_async_marker,
            type_parameters,
            required_parameter_count,
            positional,
            named,
            return_type,
            body,
        })
    }

    fn decode_type_parameters(&mut self) -> Result<Vec<TypeParameter>, IrError> {
        let len = self.read_list_length()?;
        let mut params = Vec::with_capacity(len);
        for _ in 0..len {
            params.push(TypeParameter {
                flags: self.read_byte()?,
                name: self.decode_name()?,
                bound: self.decode_type()?,
            });
        }
        Ok(params)
    }

    pub fn decode_type(&mut self) -> Result<TypeNode, IrError> {
        let offset = self.offset();
        let tag = self.read_tag()?;
        let ty = match tag {
            Tag::InvalidType => TypeNode::Invalid,
            Tag::DynamicType => TypeNode::Dynamic,
            Tag::VoidType => TypeNode::Void,
            Tag::BottomType => TypeNode::Bottom,
            Tag::InterfaceType => TypeNode::Interface {
                class: self.read_canonical_ref()?,
                arguments: self.decode_list_of_types()?,
            },
            Tag::SimpleInterfaceType => TypeNode::SimpleInterface(self.read_canonical_ref()?),
            Tag::FunctionType => {
                let type_parameters = self.decode_type_parameters()?;
                let required = self.read_uint()?;
                let positional = self.decode_list_of_types()?;
                let len = self.read_list_length()?;
                let mut named = Vec::with_capacity(len);
                for _ in 0..len {
                    let name = self.decode_name()?;
                    named.push((name, self.decode_type()?));
                }
                TypeNode::Function {
                    type_parameters,
                    required,
                    positional,
                    named,
                    return_type: Box::new(self.decode_type()?),
                }
            }
            Tag::SimpleFunctionType => TypeNode::SimpleFunction {
                positional: self.decode_list_of_types()?,
                return_type: Box::new(self.decode_type()?),
            },
            Tag::TypeParameterType => TypeNode::Parameter {
                index: self.read_uint()?,
                bound: self.decode_option_type()?.map(Box::new),
            },
            other => return Err(IrError::unexpected(offset, other, "type")),
        };
        Ok(ty)
    }

    fn decode_option_type(&mut self) -> Result<Option<TypeNode>, IrError> {
        if self.read_option()? {
            self.decode_type().map(Some)
        } else {
            Ok(None)
        }
    }

    fn decode_list_of_types(&mut self) -> Result<Vec<TypeNode>, IrError> {
        let len = self.read_list_length()?;
        (0..len).map(|_| self.decode_type()).collect()
    }

    pub fn decode_initializer(&mut self) -> Result<Initializer, IrError> {
        let offset = self.offset();
        let tag = self.read_tag()?;
        let init = match tag {
            Tag::InvalidInitializer => Initializer::Invalid,
            Tag::FieldInitializer => Initializer::Field {
                field: self.read_canonical_ref()?,
                value: self.decode_expression()?,
            },
            Tag::SuperInitializer => Initializer::Super {
                pos: self.read_position()?,
                target: self.read_canonical_ref()?,
                arguments: self.decode_arguments()?,
            },
            Tag::RedirectingInitializer => Initializer::Redirecting {
                pos: self.read_position()?,
                target: self.read_canonical_ref()?,
                arguments: self.decode_arguments()?,
            },
            Tag::LocalInitializer => Initializer::Local(self.decode_variable_declaration()?),
            other => return Err(IrError::unexpected(offset, other, "initializer")),
        };
        Ok(init)
    }

    pub fn decode_initializers(&mut self) -> Result<Vec<Initializer>, IrError> {
        let len = self.read_list_length()?;
        (0..len).map(|_| self.decode_initializer()).collect()
    }
}
