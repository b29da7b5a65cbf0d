//! Traversal arms of the scope walk, one per tag.

use flint_ir::tag::{yield_flags, Tag};
use flint_ir::{Cursor, IrError, NodeRef, TokenPos};
use flint_stack::ensure_sufficient_stack;
use tracing::{debug, trace};

use super::ScopeBuilder;
use crate::{names, PerDepth, ScopeError, ScopeId, ScopeKind, SyntheticVariables, VarId, VariableKind};

impl ScopeBuilder<'_, '_> {
    // ── Expressions ─────────────────────────────────────────────

    pub(super) fn visit_expression(&mut self, c: &mut Cursor<'_>) -> Result<(), ScopeError> {
        ensure_sufficient_stack(|| self.visit_expression_inner(c))
    }

    fn visit_expression_inner(&mut self, c: &mut Cursor<'_>) -> Result<(), ScopeError> {
        let node = c.node_ref();
        let offset = c.offset();
        let (tag, _) = c.read_tag_and_payload()?;
        match tag {
            Tag::InvalidExpression => {
                self.position(c)?;
                c.skip_string_ref()?;
            }
            Tag::VariableGet => {
                self.position(c)?;
                let decl = c.read_node_ref()?;
                self.use_declaration(decl)?;
                self.visit_option_type(c)?;
            }
            Tag::VariableSet => {
                self.position(c)?;
                let decl = c.read_node_ref()?;
                self.use_declaration(decl)?;
                self.visit_expression(c)?;
            }
            Tag::PropertyGet => {
                self.position(c)?;
                self.visit_expression(c)?;
                c.skip_name()?;
                c.skip_canonical_ref()?;
            }
            Tag::PropertySet => {
                self.position(c)?;
                self.visit_expression(c)?;
                c.skip_name()?;
                self.visit_expression(c)?;
                c.skip_canonical_ref()?;
            }
            Tag::DirectPropertyGet => {
                self.position(c)?;
                self.visit_expression(c)?;
                c.skip_canonical_ref()?;
            }
            Tag::DirectPropertySet => {
                self.position(c)?;
                self.visit_expression(c)?;
                c.skip_canonical_ref()?;
                self.visit_expression(c)?;
            }
            Tag::DirectMethodInvocation => {
                self.position(c)?;
                self.visit_expression(c)?;
                c.skip_canonical_ref()?;
                self.visit_arguments(c)?;
            }
            Tag::SuperPropertyGet => {
                self.position(c)?;
                self.use_this();
                c.skip_name()?;
                c.skip_canonical_ref()?;
            }
            Tag::SuperPropertySet => {
                self.position(c)?;
                self.use_this();
                c.skip_name()?;
                self.visit_expression(c)?;
                c.skip_canonical_ref()?;
            }
            Tag::StaticGet => {
                self.position(c)?;
                c.skip_canonical_ref()?;
            }
            Tag::StaticSet => {
                self.position(c)?;
                c.skip_canonical_ref()?;
                self.visit_expression(c)?;
            }
            Tag::MethodInvocation => {
                self.position(c)?;
                self.visit_expression(c)?;
                c.skip_name()?;
                self.visit_arguments(c)?;
                c.skip_canonical_ref()?;
            }
            Tag::SuperMethodInvocation => {
                self.position(c)?;
                self.use_this();
                c.skip_name()?;
                self.visit_arguments(c)?;
                c.skip_canonical_ref()?;
            }
            Tag::StaticInvocation
            | Tag::ConstStaticInvocation
            | Tag::ConstructorInvocation
            | Tag::ConstConstructorInvocation => {
                self.position(c)?;
                c.skip_canonical_ref()?;
                self.visit_arguments(c)?;
            }
            Tag::Not => self.visit_expression(c)?,
            Tag::LogicalExpression => {
                self.once(pick_expression_temp, names::EXPRESSION_TEMP, true);
                self.visit_expression(c)?;
                c.read_byte()?;
                self.visit_expression(c)?;
            }
            Tag::ConditionalExpression => {
                self.once(pick_expression_temp, names::EXPRESSION_TEMP, true);
                self.visit_expression(c)?;
                self.visit_expression(c)?;
                self.visit_expression(c)?;
                self.visit_option_type(c)?;
            }
            Tag::StringConcatenation => {
                self.position(c)?;
                self.visit_list_of_expressions(c)?;
            }
            Tag::IsExpression => {
                self.position(c)?;
                self.visit_expression(c)?;
                self.visit_type(c)?;
            }
            Tag::AsExpression => {
                self.position(c)?;
                c.read_byte()?;
                self.visit_expression(c)?;
                self.visit_type(c)?;
            }
            Tag::StringLiteral | Tag::BigIntLiteral | Tag::SymbolLiteral => c.skip_string_ref()?,
            Tag::SpecializedIntLiteral | Tag::TrueLiteral | Tag::FalseLiteral | Tag::NullLiteral => {}
            Tag::ThisExpression => self.use_this(),
            Tag::PositiveIntLiteral | Tag::NegativeIntLiteral => {
                c.read_uint()?;
            }
            Tag::DoubleLiteral => {
                c.read_double()?;
            }
            Tag::TypeLiteral => self.visit_type(c)?,
            Tag::Rethrow => {
                self.position(c)?;
            }
            Tag::Throw => {
                self.position(c)?;
                self.visit_expression(c)?;
            }
            Tag::ListLiteral | Tag::ConstListLiteral => {
                self.position(c)?;
                self.visit_type(c)?;
                self.visit_list_of_expressions(c)?;
            }
            Tag::MapLiteral | Tag::ConstMapLiteral => {
                self.position(c)?;
                self.visit_type(c)?;
                self.visit_type(c)?;
                let len = c.read_list_length()?;
                for _ in 0..len {
                    self.visit_expression(c)?;
                    self.visit_expression(c)?;
                }
            }
            Tag::FunctionExpression => {
                self.position(c)?;
                self.visit_nested_function(c)?;
            }
            Tag::Let => {
                self.enter_scope(ScopeKind::Let, node, TokenPos::NO_SOURCE);
                self.visit_variable_declaration(c)?;
                self.visit_expression(c)?;
                self.exit_scope(TokenPos::NO_SOURCE);
            }
            other => return Err(IrError::unexpected(offset, other, "expression").into()),
        }
        Ok(())
    }

    fn visit_list_of_expressions(&mut self, c: &mut Cursor<'_>) -> Result<(), ScopeError> {
        let len = c.read_list_length()?;
        for _ in 0..len {
            self.visit_expression(c)?;
        }
        Ok(())
    }

    fn visit_option_expression(&mut self, c: &mut Cursor<'_>) -> Result<(), ScopeError> {
        if c.read_option()? {
            self.visit_expression(c)?;
        }
        Ok(())
    }

    fn visit_arguments(&mut self, c: &mut Cursor<'_>) -> Result<(), ScopeError> {
        let head = c.read_arguments_head()?;
        for _ in 0..head.type_argument_count {
            self.visit_type(c)?;
        }
        self.visit_list_of_expressions(c)?;
        let named = c.read_list_length()?;
        for _ in 0..named {
            c.skip_name()?;
            self.visit_expression(c)?;
        }
        Ok(())
    }

    // ── Statements ──────────────────────────────────────────────

    pub(super) fn visit_statement(&mut self, c: &mut Cursor<'_>) -> Result<(), ScopeError> {
        ensure_sufficient_stack(|| self.visit_statement_inner(c))
    }

    fn visit_statement_inner(&mut self, c: &mut Cursor<'_>) -> Result<(), ScopeError> {
        let node = c.node_ref();
        let offset = c.offset();
        let tag = c.read_tag()?;
        match tag {
            Tag::InvalidStatement | Tag::EmptyStatement => {}
            Tag::ExpressionStatement => self.visit_expression(c)?,
            Tag::Block => {
                let begin = self.position(c)?;
                let end = c.read_position()?;
                self.enter_scope(ScopeKind::Block, node, begin);
                self.visit_list_of_statements(c)?;
                self.exit_scope(end);
            }
            Tag::AssertStatement => {
                self.visit_expression(c)?;
                self.position(c)?;
                self.position(c)?;
                self.visit_option_expression(c)?;
            }
            Tag::LabeledStatement => self.visit_statement(c)?,
            Tag::BreakStatement | Tag::ContinueSwitchStatement => {
                self.position(c)?;
                c.read_uint()?;
            }
            Tag::WhileStatement => {
                self.position(c)?;
                self.visit_expression(c)?;
                self.depth.loops += 1;
                self.visit_statement(c)?;
                self.depth.loops -= 1;
            }
            Tag::DoStatement => {
                self.position(c)?;
                self.depth.loops += 1;
                self.visit_statement(c)?;
                self.depth.loops -= 1;
                self.visit_expression(c)?;
            }
            Tag::ForStatement => {
                let pos = self.position(c)?;
                self.depth.loops += 1;
                self.enter_scope(ScopeKind::For, node, pos);
                let len = c.read_list_length()?;
                for _ in 0..len {
                    self.visit_variable_declaration(c)?;
                }
                self.visit_option_expression(c)?;
                self.visit_list_of_expressions(c)?;
                self.visit_statement(c)?;
                self.exit_scope(TokenPos::NO_SOURCE);
                self.depth.loops -= 1;
            }
            Tag::ForInStatement => {
                self.position(c)?;
                let body_pos = self.position(c)?;
                // The iterable is evaluated outside the loop's scope.
                let decl = c.node_ref();
                c.skip_variable_declaration()?;
                self.visit_expression(c)?;

                self.depth.for_ins += 1;
                self.per_depth(PerDepth::Iterator, self.depth.for_ins);
                self.depth.loops += 1;
                self.enter_scope(ScopeKind::ForIn, node, body_pos);
                c.with_alternate_position(decl, |c| self.visit_variable_declaration(c).map(drop))?;
                self.visit_statement(c)?;
                self.exit_scope(TokenPos::NO_SOURCE);
                self.depth.loops -= 1;
                self.depth.for_ins -= 1;
            }
            Tag::SwitchStatement => {
                let pos = self.position(c)?;
                self.visit_expression(c)?;
                self.once(pick_switch_variable, names::SWITCH, false);
                self.enter_scope(ScopeKind::Switch, node, pos);
                let len = c.read_list_length()?;
                for _ in 0..len {
                    self.visit_switch_case(c)?;
                }
                self.exit_scope(TokenPos::NO_SOURCE);
            }
            Tag::IfStatement => {
                self.position(c)?;
                self.visit_expression(c)?;
                self.visit_statement(c)?;
                self.visit_statement(c)?;
            }
            Tag::ReturnStatement => {
                self.position(c)?;
                if self.finally_bodies > 0 || self.depth.finallies > 0 {
                    self.once(pick_finally_return, names::FINALLY_RETURN, false);
                }
                self.visit_option_expression(c)?;
            }
            Tag::TryCatch => {
                self.depth.tries += 1;
                self.per_depth(PerDepth::SavedTryContext, self.depth.tries);
                self.visit_statement(c)?;
                self.depth.tries -= 1;
                c.read_byte()?;

                self.depth.catches += 1;
                self.exception_variables();
                let len = c.read_list_length()?;
                for _ in 0..len {
                    self.visit_catch(c)?;
                }
                self.depth.catches -= 1;
            }
            Tag::TryFinally => {
                self.depth.tries += 1;
                self.per_depth(PerDepth::SavedTryContext, self.depth.tries);
                self.finally_bodies += 1;
                self.visit_statement(c)?;
                self.finally_bodies -= 1;
                self.depth.tries -= 1;

                // The finalizer also runs as a catch-all handler.
                self.depth.finallies += 1;
                self.depth.catches += 1;
                self.exception_variables();
                self.visit_statement(c)?;
                self.depth.catches -= 1;
                self.depth.finallies -= 1;
            }
            Tag::YieldStatement => {
                self.position(c)?;
                let flags = c.read_byte()?;
                self.visit_expression(c)?;
                if flags & yield_flags::NATIVE != 0 {
                    self.capture_live_locals();
                }
            }
            Tag::VariableDeclaration => {
                self.visit_variable_declaration(c)?;
            }
            Tag::FunctionDeclaration => {
                self.position(c)?;
                self.visit_variable_declaration(c)?;
                self.visit_nested_function(c)?;
            }
            other => return Err(IrError::unexpected(offset, other, "statement").into()),
        }
        Ok(())
    }

    fn visit_list_of_statements(&mut self, c: &mut Cursor<'_>) -> Result<(), ScopeError> {
        let len = c.read_list_length()?;
        for _ in 0..len {
            self.visit_statement(c)?;
        }
        Ok(())
    }

    fn visit_switch_case(&mut self, c: &mut Cursor<'_>) -> Result<(), ScopeError> {
        let len = c.read_list_length()?;
        for _ in 0..len {
            self.position(c)?;
            self.visit_expression(c)?;
        }
        c.read_bool()?;
        self.visit_statement(c)
    }

    fn visit_catch(&mut self, c: &mut Cursor<'_>) -> Result<(), ScopeError> {
        let node = c.node_ref();
        let pos = self.position(c)?;
        self.enter_scope(ScopeKind::Catch, node, pos);
        self.visit_type(c)?;
        for _ in 0..2 {
            if c.read_option()? {
                self.visit_variable_declaration(c)?;
            }
        }
        self.visit_statement(c)?;
        self.exit_scope(TokenPos::NO_SOURCE);
        Ok(())
    }

    fn exception_variables(&mut self) {
        let depth = self.depth.catches;
        for kind in [
            PerDepth::Exception,
            PerDepth::StackTrace,
            PerDepth::RawException,
            PerDepth::RawStackTrace,
        ] {
            self.per_depth(kind, depth);
        }
    }

    /// Promote every local visible at a suspension point into the context.
    fn capture_live_locals(&mut self) {
        if self.depth.functions > 0 {
            return;
        }
        let chain: Vec<ScopeId> = self.tree.ancestors(self.current).collect();
        for id in chain {
            let mut promoted = false;
            for var in self.tree.get(id).variables.clone() {
                let variable = &mut self.variables[var.index()];
                let live = variable.kind != VariableKind::Outer && !variable.forced_stack;
                if live && !variable.captured {
                    variable.captured = true;
                    promoted = true;
                }
            }
            if promoted {
                self.tree.get_mut(id).requires_context = true;
            }
        }
        trace!(scope = %self.current, "locals promoted at a suspension point");
    }

    // ── Declarations ────────────────────────────────────────────

    /// Declare the untagged variable declaration at the cursor.
    ///
    /// The variable is visible in its own initializer so closures there can
    /// refer to it.
    pub(super) fn visit_variable_declaration(
        &mut self,
        c: &mut Cursor<'_>,
    ) -> Result<VarId, ScopeError> {
        let head = c.read_variable_head()?;
        self.note(head.pos);
        let ty_node = c.node_ref();
        self.visit_type(c)?;
        let ty = self.translator.translate_at(c, ty_node)?;
        let variable = self.new_variable(c, &head, VariableKind::Local, ty)?;
        let var = self.declare(variable);
        if c.read_option()? {
            let init = c.node_ref();
            self.visit_expression(c)?;
            if head.is_const() && self.depth.functions == 0 {
                let value = self.evaluator.evaluate_at(init)?;
                self.variables[var.index()].const_value = Some(value);
            }
        }
        Ok(var)
    }

    fn visit_nested_function(&mut self, c: &mut Cursor<'_>) -> Result<(), ScopeError> {
        let node = c.node_ref();
        self.closures.insert(node, self.current);
        let head = c.read_function_head()?;
        let saved = self.depth;
        self.depth = saved.nested_function();
        self.enter_scope(ScopeKind::Function, node, head.pos);

        let type_parameters = c.read_list_length()?;
        for _ in 0..type_parameters {
            c.read_byte()?;
            c.skip_string_ref()?;
            self.visit_type(c)?;
        }
        c.read_uint()?;
        for _ in 0..2 {
            let len = c.read_list_length()?;
            for _ in 0..len {
                self.visit_variable_declaration(c)?;
            }
        }
        self.visit_type(c)?;
        if c.read_option()? {
            self.visit_statement(c)?;
        }

        self.exit_scope(head.end_pos);
        self.depth = saved;
        Ok(())
    }

    pub(super) fn visit_initializers(&mut self, c: &mut Cursor<'_>) -> Result<(), ScopeError> {
        let len = c.read_list_length()?;
        for _ in 0..len {
            let offset = c.offset();
            match c.read_tag()? {
                Tag::InvalidInitializer => {}
                Tag::FieldInitializer => {
                    c.skip_canonical_ref()?;
                    self.visit_expression(c)?;
                }
                Tag::SuperInitializer | Tag::RedirectingInitializer => {
                    self.position(c)?;
                    c.skip_canonical_ref()?;
                    self.visit_arguments(c)?;
                }
                Tag::LocalInitializer => {
                    self.visit_variable_declaration(c)?;
                }
                other => return Err(IrError::unexpected(offset, other, "initializer").into()),
            }
        }
        Ok(())
    }

    // ── Types ───────────────────────────────────────────────────

    fn visit_type(&mut self, c: &mut Cursor<'_>) -> Result<(), ScopeError> {
        let offset = c.offset();
        match c.read_tag()? {
            Tag::InvalidType | Tag::DynamicType | Tag::VoidType | Tag::BottomType => {}
            Tag::InterfaceType => {
                c.skip_canonical_ref()?;
                self.visit_list_of_types(c)?;
            }
            Tag::SimpleInterfaceType => c.skip_canonical_ref()?,
            Tag::FunctionType => {
                let type_parameters = c.read_list_length()?;
                for _ in 0..type_parameters {
                    c.read_byte()?;
                    c.skip_string_ref()?;
                    self.visit_type(c)?;
                }
                c.read_uint()?;
                self.visit_list_of_types(c)?;
                let named = c.read_list_length()?;
                for _ in 0..named {
                    c.skip_string_ref()?;
                    self.visit_type(c)?;
                }
                self.visit_type(c)?;
            }
            Tag::SimpleFunctionType => {
                self.visit_list_of_types(c)?;
                self.visit_type(c)?;
            }
            Tag::TypeParameterType => {
                let index = c.read_uint()?;
                self.use_type_parameter(index);
                self.visit_option_type(c)?;
            }
            other => return Err(IrError::unexpected(offset, other, "type").into()),
        }
        Ok(())
    }

    fn visit_option_type(&mut self, c: &mut Cursor<'_>) -> Result<(), ScopeError> {
        if c.read_option()? {
            self.visit_type(c)?;
        }
        Ok(())
    }

    fn visit_list_of_types(&mut self, c: &mut Cursor<'_>) -> Result<(), ScopeError> {
        let len = c.read_list_length()?;
        for _ in 0..len {
            self.visit_type(c)?;
        }
        Ok(())
    }

    // ── Uses ────────────────────────────────────────────────────

    fn position(&mut self, c: &mut Cursor<'_>) -> Result<TokenPos, IrError> {
        let pos = c.read_position()?;
        self.note(pos);
        Ok(pos)
    }

    fn use_declaration(&mut self, decl: NodeRef) -> Result<(), ScopeError> {
        let var = match self.locals.get(&decl) {
            Some(var) => *var,
            None => self.resolve_outer(decl)?,
        };
        self.use_variable(var);
        Ok(())
    }

    /// A variable declared outside this function, looked up in the context it was
    /// compiled against: by declaration offset, else by name.
    fn resolve_outer(&mut self, decl: NodeRef) -> Result<VarId, ScopeError> {
        let target = self.target;
        let outer = target.outer.as_ref().ok_or(ScopeError::UnknownVariable(decl))?;
        let found = match outer.find_by_decl(decl) {
            Some(found) => found,
            None => {
                let mut c = self.unit.cursor_at(decl);
                let head = c.read_variable_head()?;
                outer
                    .find_by_name(c.string(head.name)?)
                    .ok_or(ScopeError::UnknownVariable(decl))?
            }
        };
        trace!(%decl, name = %found.name, "resolved through the outer context");
        let var = self.declare_outer(found);
        self.locals.insert(decl, var);
        Ok(var)
    }

    /// Record a use of `var` in the current scope.
    ///
    /// A use from a deeper function than the declaring one captures the variable
    /// and marks every scope on the way up as requiring a context.
    fn use_variable(&mut self, var: VarId) {
        let owner = self.variables[var.index()].scope;
        let owner_level = self.tree.get(owner).function_level;
        if owner_level >= self.depth.functions {
            return;
        }
        let variable = &mut self.variables[var.index()];
        if !variable.captured {
            debug!(name = %variable.name, "captured by a closure");
            variable.captured = true;
        }
        let mut scope = Some(self.current);
        while let Some(id) = scope {
            let s = self.tree.get_mut(id);
            s.requires_context = true;
            if id == owner {
                break;
            }
            let crosses = s.kind == ScopeKind::Function && s.function_level > owner_level;
            if crosses && !s.aliases.contains(&var) {
                s.aliases.push(var);
            }
            scope = s.parent;
        }
    }

    pub(super) fn use_this(&mut self) {
        let var = match self.synthetic.this {
            Some(var) => Some(var),
            None => self.outer_variable_named(names::THIS),
        };
        if let Some(var) = var {
            self.synthetic.this = Some(var);
            self.use_variable(var);
        }
    }

    /// Type parameters used inside a closure keep the type arguments they read
    /// alive in the context.
    fn use_type_parameter(&mut self, index: u32) {
        if self.depth.functions == 0 && !self.target.kind.is_closure() {
            return;
        }
        if index < self.class_type_parameters {
            match self.synthetic.type_arguments {
                Some(var) => self.use_variable(var),
                None => self.use_this(),
            }
        } else {
            let var = match self.synthetic.function_type_arguments {
                Some(var) => Some(var),
                None => self.outer_variable_named(names::FUNCTION_TYPE_ARGUMENTS),
            };
            if let Some(var) = var {
                self.use_variable(var);
            }
        }
    }
}

fn pick_switch_variable(s: &mut SyntheticVariables) -> &mut Option<VarId> {
    &mut s.switch_variable
}

fn pick_expression_temp(s: &mut SyntheticVariables) -> &mut Option<VarId> {
    &mut s.expression_temp
}

fn pick_finally_return(s: &mut SyntheticVariables) -> &mut Option<VarId> {
    &mut s.finally_return
}
