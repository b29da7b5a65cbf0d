//! The scope walk.
//!
//! One recursive descent over the function body, kept parallel with the cursor's
//! `skip_*` traversal: every arm consumes exactly the fields its skip arm skips.
//! Closures are walked as part of their parent so captures are found, but their
//! synthetic variables and slots belong to their own compilation.

mod visit;

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use flint_const::ConstantEvaluator;
use flint_ir::program::ProcedureKind;
use flint_ir::{
    AsyncMarker, Cursor, IrError, NameResolver, NodeRef, ResolvedType, SourceUnit, Symbol,
    SymbolKind, TokenPos, TypeTranslator, VariableHead,
};

use crate::allocate::allocate;
use crate::context::ContextVariable;
use crate::{
    names, DepthState, FunctionKind, PerDepth, ScopeError, ScopeId, ScopeKind, ScopeResult,
    ScopeTarget, ScopeTree, Storage, SyntheticVariables, TypeCheckPolicy, VarId, Variable,
    VariableKind,
};

/// Build the scopes of `target`.
///
/// Const locals and parameter defaults are evaluated eagerly with `evaluator`; a
/// failure there fails the build, since nothing can run without them.
pub fn build_scopes<'u>(
    unit: &'u SourceUnit,
    target: &ScopeTarget,
    evaluator: &mut ConstantEvaluator<'u>,
    translator: &dyn TypeTranslator,
) -> Result<ScopeResult, ScopeError> {
    let symbol = unit
        .program()
        .resolve(target.member)
        .ok_or(ScopeError::UnknownMember(target.member))?;
    debug!(
        member = %unit.program().qualified_name(target.member),
        kind = %target.kind,
        "building scopes"
    );
    let mut builder = ScopeBuilder::new(unit, target, symbol, evaluator, translator);
    builder.declare_parameters()?;
    builder.visit_body()?;
    Ok(builder.finish())
}

type Pick = fn(&mut SyntheticVariables) -> &mut Option<VarId>;

pub(crate) struct ScopeBuilder<'a, 'u> {
    unit: &'u SourceUnit,
    evaluator: &'a mut ConstantEvaluator<'u>,
    translator: &'a dyn TypeTranslator,
    target: &'a ScopeTarget,
    symbol: &'u Symbol,
    policy: TypeCheckPolicy,
    tree: ScopeTree,
    variables: Vec<Variable>,
    locals: FxHashMap<NodeRef, VarId>,
    scopes: FxHashMap<NodeRef, ScopeId>,
    closures: FxHashMap<NodeRef, ScopeId>,
    synthetic: SyntheticVariables,
    parameters: Vec<VarId>,
    /// Outer context variables already aliased, by declaration and name.
    outer_aliases: FxHashMap<(Option<NodeRef>, Arc<str>), VarId>,
    current: ScopeId,
    depth: DepthState,
    /// Try bodies of enclosing try/finally statements.
    finally_bodies: u32,
    class_type_parameters: u32,
    last_pos: TokenPos,
}

impl<'a, 'u> ScopeBuilder<'a, 'u> {
    fn new(
        unit: &'u SourceUnit,
        target: &'a ScopeTarget,
        symbol: &'u Symbol,
        evaluator: &'a mut ConstantEvaluator<'u>,
        translator: &'a dyn TypeTranslator,
    ) -> Self {
        let attributes = unit.metadata().procedure_attributes(target.member);
        let policy = TypeCheckPolicy::for_function(target.kind, is_static(symbol), attributes);
        let class_type_parameters = unit
            .program()
            .resolve(symbol.parent)
            .and_then(Symbol::as_class)
            .map_or(0, |class| class.type_parameter_count);

        let mut tree = ScopeTree::new();
        let root_node = target.function.unwrap_or(NodeRef::new(0));
        let root = tree.push(ScopeKind::Function, None, root_node, 0, 0, TokenPos::NO_SOURCE);
        let mut scopes = FxHashMap::default();
        if let Some(function) = target.function {
            scopes.insert(function, root);
        }

        Self {
            unit,
            evaluator,
            translator,
            target,
            symbol,
            policy,
            tree,
            variables: Vec::new(),
            locals: FxHashMap::default(),
            scopes,
            closures: FxHashMap::default(),
            synthetic: SyntheticVariables::default(),
            parameters: Vec::new(),
            outer_aliases: FxHashMap::default(),
            current: root,
            depth: DepthState::default(),
            finally_bodies: 0,
            class_type_parameters,
            last_pos: TokenPos::NO_SOURCE,
        }
    }

    /// Whether the compiled body runs with `this` bound.
    fn has_receiver(&self) -> bool {
        let in_class = self
            .unit
            .program()
            .resolve(self.symbol.parent)
            .and_then(Symbol::as_class)
            .is_some();
        in_class
            && !is_static(self.symbol)
            && !matches!(self.target.kind, FunctionKind::Factory | FunctionKind::Closure)
    }

    // ── Parameters ──────────────────────────────────────────────

    fn declare_parameters(&mut self) -> Result<(), ScopeError> {
        let kind = self.target.kind;
        if kind.is_closure() {
            let closure = self.add_synthetic_parameter(names::CLOSURE, ResolvedType::Dynamic);
            self.synthetic.closure = Some(closure);
        }
        if kind == FunctionKind::Factory {
            let types = self.add_synthetic_parameter(names::TYPE_ARGUMENTS, ResolvedType::Dynamic);
            self.synthetic.type_arguments = Some(types);
        }
        if self.has_receiver() {
            let ty = ResolvedType::interface(self.symbol.parent);
            let this = if kind == FunctionKind::ImplicitClosure {
                // Loaded from the closure object, not passed.
                let root = self.tree.root();
                let mut variable = Variable::new(Arc::from(names::THIS), VariableKind::Synthetic, root);
                variable.ty = ty;
                variable.is_final = true;
                self.declare(variable)
            } else {
                self.add_synthetic_parameter(names::THIS, ty)
            };
            self.synthetic.this = Some(this);
        }

        if let Some(function) = self.target.function {
            let layout = self.unit.cursor_at(function).scan_function_node()?;
            let root = self.tree.get_mut(self.tree.root());
            root.begin = layout.head.pos;
            root.end = layout.head.end_pos;
            self.note(layout.head.pos);

            if layout.is_generic() {
                let types = self.add_synthetic_parameter(
                    names::FUNCTION_TYPE_ARGUMENTS,
                    ResolvedType::Dynamic,
                );
                self.synthetic.function_type_arguments = Some(types);
            }
            if kind.takes_declared_parameters() {
                for decl in layout.parameters() {
                    self.declare_parameter(decl)?;
                }
            }
            if kind.has_ir_body() && layout.head.async_marker != AsyncMarker::Sync {
                self.declare_generator_state();
                if layout.head.async_marker == AsyncMarker::SyncYielding {
                    let declared = |i: usize| {
                        layout
                            .positional
                            .get(i)
                            .and_then(|decl| self.locals.get(decl))
                            .copied()
                    };
                    self.synthetic.async_exception = declared(1);
                    self.synthetic.async_stack_trace = declared(2);
                }
            }
        }

        if kind == FunctionKind::ImplicitSetter {
            let ty = match self.symbol.as_field() {
                Some(field) => self.translator.translate(&mut self.unit.cursor_at(field.ty))?,
                None => ResolvedType::Dynamic,
            };
            let checked = self.policy.checks(false) && !ty.is_top();
            let value = self.add_synthetic_parameter("value", ty);
            let variable = &mut self.variables[value.index()];
            variable.kind = VariableKind::Parameter;
            variable.needs_type_check = checked;
        }
        Ok(())
    }

    fn declare_parameter(&mut self, decl: NodeRef) -> Result<VarId, ScopeError> {
        let mut c = self.unit.cursor_at(decl);
        let head = c.read_variable_head()?;
        let ty = self.translator.translate(&mut c)?;
        let mut variable = self.new_variable(&c, &head, VariableKind::Parameter, ty)?;
        variable.needs_type_check = self.policy.checks(head.is_covariant()) && !variable.ty.is_top();
        variable.const_value = self.evaluator.evaluate_parameter_default(decl)?;
        Ok(self.add_parameter(variable))
    }

    fn add_synthetic_parameter(&mut self, name: &str, ty: ResolvedType) -> VarId {
        let mut variable = Variable::new(Arc::from(name), VariableKind::Synthetic, self.tree.root());
        variable.ty = ty;
        variable.is_final = true;
        self.add_parameter(variable)
    }

    fn add_parameter(&mut self, mut variable: Variable) -> VarId {
        variable.param_index = Some(flint_ir::node::to_u32(self.parameters.len(), "parameters"));
        let var = self.declare(variable);
        self.parameters.push(var);
        var
    }

    /// Resumption index and saved context of a generator body.
    ///
    /// Both live in the context: the body is re-entered on every resumption.
    fn declare_generator_state(&mut self) {
        for (pick, name) in [
            (pick_await_jump as Pick, names::AWAIT_JUMP),
            (pick_await_context as Pick, names::AWAIT_CONTEXT),
        ] {
            if let Some(var) = self.once(pick, name, false) {
                self.variables[var.index()].captured = true;
            }
        }
    }

    // ── Bodies ──────────────────────────────────────────────────

    fn visit_body(&mut self) -> Result<(), ScopeError> {
        match self.target.kind {
            FunctionKind::Regular | FunctionKind::Factory | FunctionKind::Closure => {
                self.visit_function_body()?;
            }
            FunctionKind::Constructor => {
                self.visit_field_initializers()?;
                if let Some(info) = self.symbol.as_constructor() {
                    let mut c = self.unit.cursor_at(info.initializers);
                    self.visit_initializers(&mut c)?;
                }
                self.visit_function_body()?;
            }
            FunctionKind::ImplicitStaticGetter => {
                if let Some(init) = self.symbol.as_field().and_then(|f| f.initializer) {
                    let mut c = self.unit.cursor_at(init);
                    self.visit_expression(&mut c)?;
                }
            }
            FunctionKind::ImplicitGetter
            | FunctionKind::ImplicitSetter
            | FunctionKind::MethodExtractor
            | FunctionKind::ImplicitClosure
            | FunctionKind::DynamicInvocationForwarder
            | FunctionKind::NoSuchMethodForwarder => {}
        }
        let end = self.tree.get(self.tree.root()).end;
        self.exit_scope(end);
        Ok(())
    }

    fn visit_function_body(&mut self) -> Result<(), ScopeError> {
        let Some(function) = self.target.function else {
            return Ok(());
        };
        let layout = self.unit.cursor_at(function).scan_function_node()?;
        if let Some(body) = layout.body {
            let mut c = self.unit.cursor_at(body);
            self.visit_statement(&mut c)?;
        }
        Ok(())
    }

    /// Initializers of the instance fields a constructor runs first.
    fn visit_field_initializers(&mut self) -> Result<(), ScopeError> {
        let program = self.unit.program();
        for member in program.members(self.symbol.parent) {
            let Some(field) = program.resolve(member).and_then(Symbol::as_field) else {
                continue;
            };
            if field.is_static() {
                continue;
            }
            if let Some(init) = field.initializer {
                let mut c = self.unit.cursor_at(init);
                self.visit_expression(&mut c)?;
            }
        }
        Ok(())
    }

    // ── Variables ───────────────────────────────────────────────

    fn new_variable(
        &self,
        c: &Cursor<'_>,
        head: &VariableHead,
        kind: VariableKind,
        ty: ResolvedType,
    ) -> Result<Variable, IrError> {
        let name = c
            .strings()
            .get_shared(head.name)
            .ok_or(IrError::StringOutOfRange(head.name))?;
        let mut variable = Variable::new(name, kind, self.current);
        variable.decl = Some(head.offset);
        variable.pos = head.pos;
        variable.ty = ty;
        variable.is_final = head.is_final();
        Ok(variable)
    }

    fn declare(&mut self, variable: Variable) -> VarId {
        let var = VarId::new(flint_ir::node::to_u32(self.variables.len(), "variables"));
        if let Some(decl) = variable.decl {
            self.locals.insert(decl, var);
        }
        self.tree.get_mut(variable.scope).variables.push(var);
        self.variables.push(variable);
        var
    }

    /// Alias for a variable of an enclosing function, declared in the root scope.
    fn declare_outer(&mut self, outer: &ContextVariable) -> VarId {
        let key = (outer.decl, Arc::clone(&outer.name));
        if let Some(var) = self.outer_aliases.get(&key) {
            return *var;
        }
        let mut variable = Variable::new(Arc::clone(&outer.name), VariableKind::Outer, self.tree.root());
        variable.decl = outer.decl;
        variable.ty = outer.ty.clone();
        variable.is_final = outer.is_final;
        variable.const_value = outer.const_value;
        variable.captured = true;
        variable.storage = Storage::Context {
            level: outer.level,
            index: outer.index,
        };
        let var = self.declare(variable);
        self.outer_aliases.insert(key, var);
        var
    }

    fn outer_variable_named(&mut self, name: &str) -> Option<VarId> {
        let target = self.target;
        let outer = target.outer.as_ref()?.find_by_name(name)?;
        Some(self.declare_outer(outer))
    }

    /// Synthetic variable in the root scope, reusing one an enclosing function
    /// already lifted into its context.
    fn synthetic_variable(&mut self, name: &str, forced_stack: bool) -> VarId {
        if let Some(var) = self.outer_variable_named(name) {
            return var;
        }
        let mut variable = Variable::new(Arc::from(name), VariableKind::Synthetic, self.tree.root());
        variable.forced_stack = forced_stack;
        self.declare(variable)
    }

    /// The single synthetic variable `pick` selects, created on first use.
    ///
    /// `None` while walking a nested function.
    fn once(&mut self, pick: Pick, name: &str, forced_stack: bool) -> Option<VarId> {
        if self.depth.functions > 0 {
            return None;
        }
        if let Some(var) = *pick(&mut self.synthetic) {
            return Some(var);
        }
        let var = self.synthetic_variable(name, forced_stack);
        *pick(&mut self.synthetic) = Some(var);
        Some(var)
    }

    /// Make sure a variable of `kind` exists for every depth up to `depth`.
    fn per_depth(&mut self, kind: PerDepth, depth: u32) {
        if self.depth.functions > 0 {
            return;
        }
        while self.synthetic.depth_count(kind) < depth as usize {
            let next = flint_ir::node::to_u32(self.synthetic.depth_count(kind), "depth") + 1;
            let var = self.synthetic_variable(&kind.name(next), kind.forced_stack());
            self.synthetic.slots_mut(kind).push(var);
        }
    }

    // ── Scopes ──────────────────────────────────────────────────

    fn enter_scope(&mut self, kind: ScopeKind, node: NodeRef, begin: TokenPos) {
        self.note(begin);
        let id = self.tree.push(
            kind,
            Some(self.current),
            node,
            self.depth.functions,
            self.depth.loops,
            begin,
        );
        self.scopes.insert(node, id);
        self.current = id;
    }

    /// Fix the current scope's range and return to its parent.
    ///
    /// Without a real `end` the scope ends at the last position seen inside it.
    fn exit_scope(&mut self, end: TokenPos) {
        self.note(end);
        let last = self.last_pos;
        let scope = self.tree.get_mut(self.current);
        scope.end = if end.is_real() { end } else { last };
        if let Some(parent) = scope.parent {
            self.current = parent;
        }
    }

    fn note(&mut self, pos: TokenPos) {
        if pos.is_real() && (!self.last_pos.is_real() || pos > self.last_pos) {
            self.last_pos = pos;
        }
    }

    // ── Result ──────────────────────────────────────────────────

    fn finish(mut self) -> ScopeResult {
        let outer_context_level = self.target.outer.as_ref().map_or(0, |o| o.context_level);
        let num_stack_locals = allocate(&mut self.tree, &mut self.variables, outer_context_level);
        debug!(
            scopes = self.tree.len(),
            variables = self.variables.len(),
            captured = self.variables.iter().filter(|v| v.captured).count(),
            stack = num_stack_locals,
            "scopes built"
        );
        ScopeResult {
            member: self.target.member,
            kind: self.target.kind,
            function: self.target.function,
            tree: self.tree,
            parameters: self.parameters,
            synthetic: self.synthetic,
            policy: self.policy,
            num_stack_locals,
            outer_context_level,
            variables: self.variables,
            locals: self.locals,
            scopes: self.scopes,
            closures: self.closures,
            outer: self.target.outer.clone(),
        }
    }
}

fn is_static(symbol: &Symbol) -> bool {
    match &symbol.kind {
        SymbolKind::Procedure(info) => info.is_static() || info.kind == ProcedureKind::Factory,
        SymbolKind::Field(info) => info.is_static(),
        SymbolKind::Constructor(_) => false,
        SymbolKind::Library | SymbolKind::Class(_) => true,
    }
}

fn pick_await_jump(s: &mut SyntheticVariables) -> &mut Option<VarId> {
    &mut s.await_jump
}

fn pick_await_context(s: &mut SyntheticVariables) -> &mut Option<VarId> {
    &mut s.await_context
}
