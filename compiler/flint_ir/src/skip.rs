//! Skip traversal: advances over a construct without producing a value.
//!
//! One arm per tag, kept parallel with `decode.rs`; the symmetry tests read,
//! decode and skip every fixture and compare end offsets.

use crate::cursor::Cursor;
use crate::tag::Tag;
use crate::IrError;

impl Cursor<'_> {
    pub fn skip_position(&mut self) -> Result<(), IrError> {
        self.read_uint().map(drop)
    }

    pub fn skip_string_ref(&mut self) -> Result<(), IrError> {
        self.read_uint().map(drop)
    }

    pub fn skip_canonical_ref(&mut self) -> Result<(), IrError> {
        self.read_uint().map(drop)
    }

    pub fn skip_name(&mut self) -> Result<(), IrError> {
        self.skip_string_ref()
    }

    pub fn skip_expression(&mut self) -> Result<(), IrError> {
        let offset = self.offset();
        let (tag, _) = self.read_tag_and_payload()?;
        match tag {
            Tag::InvalidExpression => {
                self.skip_position()?;
                self.skip_string_ref()
            }
            Tag::VariableGet => {
                self.skip_position()?;
                self.read_node_ref()?;
                self.skip_option_type()
            }
            Tag::VariableSet => {
                self.skip_position()?;
                self.read_node_ref()?;
                self.skip_expression()
            }
            Tag::PropertyGet => {
                self.skip_position()?;
                self.skip_expression()?;
                self.skip_name()?;
                self.skip_canonical_ref()
            }
            Tag::PropertySet => {
                self.skip_position()?;
                self.skip_expression()?;
                self.skip_name()?;
                self.skip_expression()?;
                self.skip_canonical_ref()
            }
            Tag::DirectPropertyGet => {
                self.skip_position()?;
                self.skip_expression()?;
                self.skip_canonical_ref()
            }
            Tag::DirectPropertySet => {
                self.skip_position()?;
                self.skip_expression()?;
                self.skip_canonical_ref()?;
                self.skip_expression()
            }
            Tag::DirectMethodInvocation => {
                self.skip_position()?;
                self.skip_expression()?;
                self.skip_canonical_ref()?;
                self.skip_arguments()
            }
            Tag::SuperPropertyGet => {
                self.skip_position()?;
                self.skip_name()?;
                self.skip_canonical_ref()
            }
            Tag::SuperPropertySet => {
                self.skip_position()?;
                self.skip_name()?;
                self.skip_expression()?;
                self.skip_canonical_ref()
            }
            Tag::StaticGet => {
                self.skip_position()?;
                self.skip_canonical_ref()
            }
            Tag::StaticSet => {
                self.skip_position()?;
                self.skip_canonical_ref()?;
                self.skip_expression()
            }
            Tag::MethodInvocation => {
                self.skip_position()?;
                self.skip_expression()?;
                self.skip_name()?;
                self.skip_arguments()?;
                self.skip_canonical_ref()
            }
            Tag::SuperMethodInvocation => {
                self.skip_position()?;
                self.skip_name()?;
                self.skip_arguments()?;
                self.skip_canonical_ref()
            }
            Tag::StaticInvocation
            | Tag::ConstStaticInvocation
            | Tag::ConstructorInvocation
            | Tag::ConstConstructorInvocation => {
                self.skip_position()?;
                self.skip_canonical_ref()?;
                self.skip_arguments()
            }
            Tag::Not => self.skip_expression(),
            Tag::LogicalExpression => {
                self.skip_expression()?;
                self.read_byte()?;
                self.skip_expression()
            }
            Tag::ConditionalExpression => {
                self.skip_expression()?;
                self.skip_expression()?;
                self.skip_expression()?;
                self.skip_option_type()
            }
            Tag::StringConcatenation => {
                self.skip_position()?;
                self.skip_list_of_expressions()
            }
            Tag::IsExpression => {
                self.skip_position()?;
                self.skip_expression()?;
                self.skip_type()
            }
            Tag::AsExpression => {
                self.skip_position()?;
                self.read_byte()?;
                self.skip_expression()?;
                self.skip_type()
            }
            Tag::StringLiteral | Tag::BigIntLiteral | Tag::SymbolLiteral => {
                self.skip_string_ref()
            }
            Tag::SpecializedIntLiteral
            | Tag::TrueLiteral
            | Tag::FalseLiteral
            | Tag::NullLiteral
            | Tag::ThisExpression => Ok(()),
            Tag::PositiveIntLiteral | Tag::NegativeIntLiteral => self.read_uint().map(drop),
            Tag::DoubleLiteral => self.read_double().map(drop),
            Tag::TypeLiteral => self.skip_type(),
            Tag::Rethrow => self.skip_position(),
            Tag::Throw => {
                self.skip_position()?;
                self.skip_expression()
            }
            Tag::ListLiteral | Tag::ConstListLiteral => {
                self.skip_position()?;
                self.skip_type()?;
                self.skip_list_of_expressions()
            }
            Tag::MapLiteral | Tag::ConstMapLiteral => {
                self.skip_position()?;
                self.skip_type()?;
                self.skip_type()?;
                let len = self.read_list_length()?;
                for _ in 0..len {
                    self.skip_expression()?;
                    self.skip_expression()?;
                }
                Ok(())
            }
            Tag::FunctionExpression => {
                self.skip_position()?;
                self.skip_function_node()
            }
            Tag::Let => {
                self.skip_variable_declaration()?;
                self.skip_expression()
            }
            other => Err(IrError::unexpected(offset, other, "expression")),
        }
    }

    pub fn skip_option_expression(&mut self) -> Result<(), IrError> {
        if self.read_option()? {
            self.skip_expression()?;
        }
        Ok(())
    }

    pub fn skip_list_of_expressions(&mut self) -> Result<(), IrError> {
        let len = self.read_list_length()?;
        for _ in 0..len {
            self.skip_expression()?;
        }
        Ok(())
    }

    pub fn skip_named_expressions(&mut self) -> Result<(), IrError> {
        let len = self.read_list_length()?;
        for _ in 0..len {
            self.skip_name()?;
            self.skip_expression()?;
        }
        Ok(())
    }

    pub fn skip_arguments(&mut self) -> Result<(), IrError> {
        self.read_uint()?; // total count
        self.skip_list_of_types()?;
        self.skip_list_of_expressions()?;
        self.skip_named_expressions()
    }

    pub fn skip_statement(&mut self) -> Result<(), IrError> {
        let offset = self.offset();
        let tag = self.read_tag()?;
        match tag {
            Tag::InvalidStatement | Tag::EmptyStatement => Ok(()),
            Tag::ExpressionStatement => self.skip_expression(),
            Tag::Block => {
                self.skip_position()?;
                self.skip_position()?;
                self.skip_list_of_statements()
            }
            Tag::AssertStatement => {
                self.skip_expression()?;
                self.skip_position()?;
                self.skip_position()?;
                self.skip_option_expression()
            }
            Tag::LabeledStatement => self.skip_statement(),
            Tag::BreakStatement | Tag::ContinueSwitchStatement => {
                self.skip_position()?;
                self.read_uint().map(drop)
            }
            Tag::WhileStatement => {
                self.skip_position()?;
                self.skip_expression()?;
                self.skip_statement()
            }
            Tag::DoStatement => {
                self.skip_position()?;
                self.skip_statement()?;
                self.skip_expression()
            }
            Tag::ForStatement => {
                self.skip_position()?;
                self.skip_list_of_variable_declarations()?;
                self.skip_option_expression()?;
                self.skip_list_of_expressions()?;
                self.skip_statement()
            }
            Tag::ForInStatement => {
                self.skip_position()?;
                self.skip_position()?;
                self.skip_variable_declaration()?;
                self.skip_expression()?;
                self.skip_statement()
            }
            Tag::SwitchStatement => {
                self.skip_position()?;
                self.skip_expression()?;
                let len = self.read_list_length()?;
                for _ in 0..len {
                    self.skip_switch_case()?;
                }
                Ok(())
            }
            Tag::IfStatement => {
                self.skip_position()?;
                self.skip_expression()?;
                self.skip_statement()?;
                self.skip_statement()
            }
            Tag::ReturnStatement => {
                self.skip_position()?;
                self.skip_option_expression()
            }
            Tag::TryCatch => {
                self.skip_statement()?;
                self.read_byte()?;
                let len = self.read_list_length()?;
                for _ in 0..len {
                    self.skip_catch()?;
                }
                Ok(())
            }
            Tag::TryFinally => {
                self.skip_statement()?;
                self.skip_statement()
            }
            Tag::YieldStatement => {
                self.skip_position()?;
                self.read_byte()?;
                self.skip_expression()
            }
            Tag::VariableDeclaration => self.skip_variable_declaration(),
            Tag::FunctionDeclaration => {
                self.skip_position()?;
                self.skip_variable_declaration()?;
                self.skip_function_node()
            }
            other => Err(IrError::unexpected(offset, other, "statement")),
        }
    }

    pub fn skip_option_statement(&mut self) -> Result<(), IrError> {
        if self.read_option()? {
            self.skip_statement()?;
        }
        Ok(())
    }

    pub fn skip_list_of_statements(&mut self) -> Result<(), IrError> {
        let len = self.read_list_length()?;
        for _ in 0..len {
            self.skip_statement()?;
        }
        Ok(())
    }

    pub fn skip_switch_case(&mut self) -> Result<(), IrError> {
        let len = self.read_list_length()?;
        for _ in 0..len {
            self.skip_position()?;
            self.skip_expression()?;
        }
        self.read_bool()?;
        self.skip_statement()
    }

    pub fn skip_catch(&mut self) -> Result<(), IrError> {
        self.skip_position()?;
        self.skip_type()?;
        self.skip_option_variable_declaration()?;
        self.skip_option_variable_declaration()?;
        self.skip_statement()
    }

    /// Skip an untagged variable declaration.
    pub fn skip_variable_declaration(&mut self) -> Result<(), IrError> {
        self.skip_position()?;
        self.skip_position()?;
        self.read_byte()?;
        self.skip_string_ref()?;
        self.skip_type()?;
        self.skip_option_expression()
    }

    pub fn skip_option_variable_declaration(&mut self) -> Result<(), IrError> {
        if self.read_option()? {
            self.skip_variable_declaration()?;
        }
        Ok(())
    }

    pub fn skip_list_of_variable_declarations(&mut self) -> Result<(), IrError> {
        let len = self.read_list_length()?;
        for _ in 0..len {
            self.skip_variable_declaration()?;
        }
        Ok(())
    }

    pub fn skip_function_node(&mut self) -> Result<(), IrError> {
        self.expect_tag(Tag::FunctionNode)?;
        self.skip_position()?;
        self.skip_position()?;
        self.read_byte()?;
        self.read_byte()?;
        self.skip_type_parameters()?;
        self.read_uint()?;
        self.skip_list_of_variable_declarations()?;
        self.skip_list_of_variable_declarations()?;
        self.skip_type()?;
        self.skip_option_statement()
    }

    pub fn skip_type_parameters(&mut self) -> Result<(), IrError> {
        let len = self.read_list_length()?;
        for _ in 0..len {
            self.read_byte()?;
            self.skip_string_ref()?;
            self.skip_type()?;
        }
        Ok(())
    }

    pub fn skip_type(&mut self) -> Result<(), IrError> {
        let offset = self.offset();
        let tag = self.read_tag()?;
        match tag {
            Tag::InvalidType | Tag::DynamicType | Tag::VoidType | Tag::BottomType => Ok(()),
            Tag::InterfaceType => {
                self.skip_canonical_ref()?;
                self.skip_list_of_types()
            }
            Tag::SimpleInterfaceType => self.skip_canonical_ref(),
            Tag::FunctionType => {
                self.skip_type_parameters()?;
                self.read_uint()?;
                self.skip_list_of_types()?;
                let len = self.read_list_length()?;
                for _ in 0..len {
                    self.skip_string_ref()?;
                    self.skip_type()?;
                }
                self.skip_type()
            }
            Tag::SimpleFunctionType => {
                self.skip_list_of_types()?;
                self.skip_type()
            }
            Tag::TypeParameterType => {
                self.read_uint()?;
                self.skip_option_type()
            }
            other => Err(IrError::unexpected(offset, other, "type")),
        }
    }

    pub fn skip_option_type(&mut self) -> Result<(), IrError> {
        if self.read_option()? {
            self.skip_type()?;
        }
        Ok(())
    }

    pub fn skip_list_of_types(&mut self) -> Result<(), IrError> {
        let len = self.read_list_length()?;
        for _ in 0..len {
            self.skip_type()?;
        }
        Ok(())
    }

    pub fn skip_initializer(&mut self) -> Result<(), IrError> {
        let offset = self.offset();
        let tag = self.read_tag()?;
        match tag {
            Tag::InvalidInitializer => Ok(()),
            Tag::FieldInitializer => {
                self.skip_canonical_ref()?;
                self.skip_expression()
            }
            Tag::SuperInitializer | Tag::RedirectingInitializer => {
                self.skip_position()?;
                self.skip_canonical_ref()?;
                self.skip_arguments()
            }
            Tag::LocalInitializer => self.skip_variable_declaration(),
            other => Err(IrError::unexpected(offset, other, "initializer")),
        }
    }

    pub fn skip_list_of_initializers(&mut self) -> Result<(), IrError> {
        let len = self.read_list_length()?;
        for _ in 0..len {
            self.skip_initializer()?;
        }
        Ok(())
    }
}
