use crate::bytecode::compile_error::{Diagnostic, Diagnostics};
use crate::bytecode::ir::Program;
use crate::bytecode::op::{Op, Operand};
use crate::frontend::token::Pos;
use crate::lang::ast::{NodeId, NodeKind, SyntaxTree};
use crate::lang::scope::ScopeTree;
use crate::lang::symbol::{Symbol, SymbolKind, ValueType};

/// Result of a successful analysis: the finished program plus any warnings
/// that were recorded along the way.
#[derive(Debug)]
pub struct Compiled {
    pub program: Program,
    pub warnings: Vec<Diagnostic>,
}

/// Marker returned once a critical diagnostic has been recorded: the message
/// already lives in the accumulated diagnostics, and analysis unwinds without
/// touching the tree any further.
struct Halt;

type Flow<T> = Result<T, Halt>;

/// The function whose body is being analyzed, threaded explicitly into
/// statement analysis so `return` can check against the declared type.
struct FnCtx {
    name: String,
    ret: ValueType,
}

/// Single-pass semantic analyzer and code generator.
///
/// Walks the syntax tree once, maintaining a scope tree for name resolution
/// and appending instructions to the output program as a side effect of each
/// visit. The first critical diagnostic aborts the walk; the partially built
/// program is discarded with the compiler.
pub struct Compiler<'t> {
    tree: &'t SyntaxTree,
    scopes: ScopeTree,
    program: Program,
    diags: Diagnostics,
}

impl<'t> Compiler<'t> {
    pub fn compile(tree: &'t SyntaxTree) -> Result<Compiled, Diagnostics> {
        let mut compiler = Compiler {
            tree,
            scopes: ScopeTree::new(),
            program: Program::new(),
            diags: Diagnostics::new(),
        };
        match compiler.compile_program(tree.root()) {
            Ok(()) => Ok(Compiled {
                program: compiler.program,
                warnings: compiler.diags.into_warnings(),
            }),
            Err(Halt) => Err(compiler.diags),
        }
    }

    // =========================================================================
    // Diagnostics plumbing
    // =========================================================================

    fn critical<T>(&mut self, pos: Pos, message: impl Into<String>) -> Flow<T> {
        self.diags.error(pos, message);
        Err(Halt)
    }

    fn warn(&mut self, pos: Pos, message: impl Into<String>) {
        self.diags.warning(pos, message);
    }

    fn emit(&mut self, op: Op) {
        self.program.push(op);
    }

    fn pop_scope(&mut self) {
        let popped = self.scopes.pop();
        debug_assert!(popped.is_ok(), "scope push/pop pairing violated");
    }

    // =========================================================================
    // Program and functions
    // =========================================================================

    fn compile_program(&mut self, root: NodeId) -> Flow<()> {
        let t = self.tree;
        for &child in t.children(root) {
            match t.kind(child) {
                NodeKind::Function => self.compile_function(child)?,
                NodeKind::Statement => self.compile_statement(child, None)?,
                _ => {}
            }
        }
        self.emit(Op::Exit);
        Ok(())
    }

    fn compile_function(&mut self, id: NodeId) -> Flow<()> {
        let t = self.tree;
        let kids = t.children(id);
        let (ret, _) = self.declare_info(kids[0])?;
        let name = t.text(kids[1]).to_string();
        let pos = t.pos(kids[1]);

        if self.scopes.resolve_scope(&name) == Ok(self.scopes.current()) {
            return self.critical(pos, format!("function '{}' is already defined", name));
        }

        let mut params: Vec<(String, ValueType, Pos)> = Vec::new();
        for &param in t.children(kids[2]) {
            let pk = t.children(param);
            let (pty, _) = self.declare_info(pk[0])?;
            let pname = t.text(pk[1]).to_string();
            let ppos = t.pos(pk[1]);
            if pty == ValueType::Void {
                return self.critical(ppos, format!("parameter '{}' cannot be void", pname));
            }
            if self.scopes.resolve_scope(&pname).is_ok() {
                self.warn(ppos, format!("parameter '{}' shadows an outer declaration", pname));
            }
            params.push((pname, pty, ppos));
        }

        // Registered in the enclosing scope before the body is analyzed, so
        // recursive calls resolve.
        let signature = params.iter().map(|(n, ty, _)| (n.clone(), *ty)).collect();
        if self.scopes.define(Symbol::function(&name, ret, signature)).is_err() {
            return self.critical(pos, format!("function '{}' is already defined", name));
        }

        self.scopes.push();
        self.emit(Op::StartFunc(name.clone()));
        for (pname, pty, ppos) in &params {
            let mut symbol = Symbol::new(pname.clone(), SymbolKind::for_type(*pty, None));
            symbol.assigned = true;
            if self.scopes.define(symbol).is_err() {
                return self.critical(*ppos, format!("duplicate parameter '{}'", pname));
            }
            let arg = match pty {
                ValueType::Int => Op::ArgInt(pname.clone()),
                ValueType::IntArray => Op::ArgIntArray(pname.clone()),
                ValueType::Real => Op::ArgReal(pname.clone()),
                ValueType::RealArray => Op::ArgRealArray(pname.clone()),
                ValueType::Void => return self.critical(*ppos, "parameter cannot be void"),
            };
            self.emit(arg);
        }

        let ctx = FnCtx { name, ret };
        for &stmt in t.children(kids[3]) {
            self.compile_statement(stmt, Some(&ctx))?;
        }
        self.pop_scope();
        self.emit(Op::EndFunc);
        Ok(())
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn compile_statement(&mut self, id: NodeId, ctx: Option<&FnCtx>) -> Flow<()> {
        let t = self.tree;
        let kids = t.children(id);
        let Some(&inner) = kids.first() else {
            return Ok(()); // empty statement
        };
        match t.kind(inner) {
            NodeKind::IfStatement => self.compile_if(inner, ctx),
            NodeKind::WhileStatement => self.compile_while(inner, ctx),
            NodeKind::ReadStatement => self.compile_read(inner),
            NodeKind::WriteStatement => self.compile_write(inner),
            NodeKind::AssignStatement => self.compile_assign(inner),
            NodeKind::DeclareStatement => self.compile_declare(inner),
            NodeKind::ReturnStatement => self.compile_return(inner, ctx),
            NodeKind::FunctionCall => {
                let ret = self.compile_call(inner)?;
                if ret != ValueType::Void {
                    // Discard the unused return value.
                    self.emit(Op::Pop);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn compile_if(&mut self, id: NodeId, ctx: Option<&FnCtx>) -> Flow<()> {
        let t = self.tree;
        let kids = t.children(id);
        let pos = t.pos(id);
        let if_label = format!("_if_{}_{}", pos.row, pos.col);
        let else_label = format!("_else_{}_{}", pos.row, pos.col);
        let end_label = format!("_endif_{}_{}", pos.row, pos.col);

        self.compile_condition(kids[0])?;
        self.emit(Op::Label(if_label));
        self.emit(Op::JumpZero(else_label.clone()));

        self.scopes.push();
        self.emit(Op::EnterScope);
        for &stmt in t.children(kids[1]) {
            self.compile_statement(stmt, ctx)?;
        }
        self.emit(Op::ExitScope);
        self.pop_scope();
        self.emit(Op::Jump(end_label.clone()));

        self.emit(Op::Label(else_label));
        if let Some(&else_block) = kids.get(2) {
            self.scopes.push();
            self.emit(Op::EnterScope);
            for &stmt in t.children(else_block) {
                self.compile_statement(stmt, ctx)?;
            }
            self.emit(Op::ExitScope);
            self.pop_scope();
        }
        self.emit(Op::Label(end_label));
        Ok(())
    }

    fn compile_while(&mut self, id: NodeId, ctx: Option<&FnCtx>) -> Flow<()> {
        let t = self.tree;
        let kids = t.children(id);
        let pos = t.pos(id);
        let head_label = format!("_while_{}_{}", pos.row, pos.col);
        let end_label = format!("_endwhile_{}_{}", pos.row, pos.col);

        // The body scope opens before the condition and reopens on every
        // iteration, so loop-local declarations execute cleanly each time
        // around. Both exits of the loop leave the scope.
        self.emit(Op::Label(head_label.clone()));
        self.scopes.push();
        self.emit(Op::EnterScope);
        self.compile_condition(kids[0])?;
        self.emit(Op::JumpZero(end_label.clone()));
        for &stmt in t.children(kids[1]) {
            self.compile_statement(stmt, ctx)?;
        }
        self.emit(Op::ExitScope);
        self.emit(Op::Jump(head_label));
        self.emit(Op::Label(end_label));
        self.emit(Op::ExitScope);
        self.pop_scope();
        Ok(())
    }

    fn compile_read(&mut self, id: NodeId) -> Flow<()> {
        let target = self.resolve_target(self.tree.child(id, 0))?;
        let op = match (target.element, &target.index) {
            (ValueType::Int, None) => Op::ReadInt(target.name.clone()),
            (ValueType::Real, None) => Op::ReadReal(target.name.clone()),
            (ValueType::Int, Some(index)) => Op::ReadIntArray {
                name: target.name.clone(),
                index: index.clone(),
            },
            (ValueType::Real, Some(index)) => Op::ReadRealArray {
                name: target.name.clone(),
                index: index.clone(),
            },
            _ => return self.critical(target.pos, "read target must be int or real"),
        };
        self.emit(op);
        self.mark_assigned(&target.name);
        Ok(())
    }

    fn compile_write(&mut self, id: NodeId) -> Flow<()> {
        self.compile_expression(self.tree.child(id, 0))?;
        self.emit(Op::Print);
        Ok(())
    }

    fn compile_assign(&mut self, id: NodeId) -> Flow<()> {
        let t = self.tree;
        let kids = t.children(id);
        let target = self.resolve_target(kids[0])?;

        let value_type = self.compile_expression(kids[1])?;
        match (target.element, value_type) {
            (ValueType::Int, ValueType::Int) => {}
            (ValueType::Real, ValueType::Int | ValueType::Real) => {}
            (ValueType::Int, ValueType::Real) => {
                return self.critical(
                    target.pos,
                    format!("cannot assign a real value to int '{}'", target.name),
                );
            }
            (_, other) => {
                return self.critical(
                    target.pos,
                    format!("cannot assign a {} value to '{}'", other, target.name),
                );
            }
        }

        let op = match (target.element, &target.index) {
            (ValueType::Int, None) => Op::PopInt(target.name.clone()),
            (ValueType::Real, None) => Op::PopReal(target.name.clone()),
            (ValueType::Int, Some(index)) => Op::PopIntArray {
                name: target.name.clone(),
                index: index.clone(),
            },
            (ValueType::Real, Some(index)) => Op::PopRealArray {
                name: target.name.clone(),
                index: index.clone(),
            },
            _ => return self.critical(target.pos, "assignment target must be int or real"),
        };
        self.emit(op);
        self.mark_assigned(&target.name);
        Ok(())
    }

    fn compile_declare(&mut self, id: NodeId) -> Flow<()> {
        let t = self.tree;
        let kids = t.children(id);
        let (ty, size) = self.declare_info(kids[0])?;
        if ty == ValueType::Void {
            let pos = t.pos(kids[0]);
            return self.critical(pos, "cannot declare a variable of type void");
        }

        for &ident in &kids[1..] {
            let name = t.text(ident).to_string();
            let pos = t.pos(ident);
            match self.scopes.resolve_scope(&name) {
                Ok(owner) if owner == self.scopes.current() => {
                    return self.critical(
                        pos,
                        format!("name '{}' is already defined in this scope", name),
                    );
                }
                Ok(_) => self.warn(pos, format!("'{}' shadows an outer declaration", name)),
                Err(_) => {}
            }

            let declared_size = match &size {
                Some(Operand::Int(n)) => Some(*n),
                _ => None,
            };
            let symbol = Symbol::new(name.clone(), SymbolKind::for_type(ty, declared_size));
            if self.scopes.define(symbol).is_err() {
                return self.critical(
                    pos,
                    format!("name '{}' is already defined in this scope", name),
                );
            }

            let op = match (ty, &size) {
                (ValueType::Int, _) => Op::VarInt(name),
                (ValueType::Real, _) => Op::VarReal(name),
                (ValueType::IntArray, Some(size)) => Op::VarIntArray {
                    name,
                    size: size.clone(),
                },
                (ValueType::RealArray, Some(size)) => Op::VarRealArray {
                    name,
                    size: size.clone(),
                },
                _ => return self.critical(pos, "array declaration is missing its size"),
            };
            self.emit(op);
        }
        Ok(())
    }

    fn compile_return(&mut self, id: NodeId, ctx: Option<&FnCtx>) -> Flow<()> {
        let t = self.tree;
        let pos = t.pos(id);
        let Some(ctx) = ctx else {
            return self.critical(pos, "return statement outside of a function");
        };

        let value_type = self.compile_expression(t.child(id, 0))?;
        let ok = match (ctx.ret, value_type) {
            (ValueType::Void, _) => {
                return self.critical(
                    pos,
                    format!("cannot return a value from void function '{}'", ctx.name),
                );
            }
            (ret, ty) if ret == ty => true,
            // An integer result is silently promoted to the declared real.
            (ValueType::Real, ValueType::Int) => true,
            _ => false,
        };
        if !ok {
            return self.critical(
                pos,
                format!(
                    "return type mismatch in function '{}': expected {}, found {}",
                    ctx.name, ctx.ret, value_type
                ),
            );
        }
        self.emit(Op::Return);
        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn compile_condition(&mut self, id: NodeId) -> Flow<()> {
        let t = self.tree;
        let kids = t.children(id);
        let pos = t.pos(id);

        let lhs = self.compile_expression(kids[0])?;
        let rhs = self.compile_expression(kids[2])?;
        if !lhs.is_scalar() || !rhs.is_scalar() {
            return self.critical(pos, "comparison requires scalar operands");
        }

        let op_leaf = t.child(kids[1], 0);
        let op = match t.kind(op_leaf) {
            NodeKind::Equal => Op::CmpEq,
            NodeKind::NotEqual => Op::CmpNe,
            NodeKind::Gt => Op::CmpGt,
            NodeKind::Lt => Op::CmpLt,
            NodeKind::GtEq => Op::CmpGe,
            NodeKind::LtEq => Op::CmpLe,
            _ => return self.critical(pos, "malformed comparison operator"),
        };
        self.emit(op);
        Ok(())
    }

    fn compile_expression(&mut self, id: NodeId) -> Flow<ValueType> {
        let t = self.tree;
        let kids = t.children(id);

        let mut result = self.compile_term(kids[0])?;
        let mut i = 1;
        while i < kids.len() {
            let op_node = kids[i];
            let rhs = self.compile_term(kids[i + 1])?;
            result = self.combine(result, rhs, t.pos(op_node))?;
            let op_leaf = t.child(op_node, 0);
            let op = match t.kind(op_leaf) {
                NodeKind::Plus => Op::Add,
                NodeKind::Minus => Op::Sub,
                _ => return self.critical(t.pos(op_node), "malformed additive operator"),
            };
            self.emit(op);
            i += 2;
        }
        Ok(result)
    }

    fn compile_term(&mut self, id: NodeId) -> Flow<ValueType> {
        let t = self.tree;
        let kids = t.children(id);

        let mut result = self.compile_factor(kids[0])?;
        let mut i = 1;
        while i < kids.len() {
            let op_node = kids[i];
            let rhs = self.compile_factor(kids[i + 1])?;
            result = self.combine(result, rhs, t.pos(op_node))?;
            let op_leaf = t.child(op_node, 0);
            let op = match t.kind(op_leaf) {
                NodeKind::Star => Op::Mul,
                NodeKind::Slash => Op::Div,
                _ => return self.critical(t.pos(op_node), "malformed multiplicative operator"),
            };
            self.emit(op);
            i += 2;
        }
        Ok(result)
    }

    fn compile_factor(&mut self, id: NodeId) -> Flow<ValueType> {
        let t = self.tree;
        let inner = t.child(id, 0);
        let pos = t.pos(inner);

        match t.kind(inner) {
            NodeKind::IntegerLiteral => {
                let value = self.parse_int(inner)?;
                self.emit(Op::PushInt(Operand::Int(value)));
                Ok(ValueType::Int)
            }
            NodeKind::RealLiteral => {
                let text = t.text(inner);
                let Ok(value) = text.parse::<f64>() else {
                    let text = text.to_string();
                    return self.critical(pos, format!("invalid real literal \"{}\"", text));
                };
                self.emit(Op::PushReal(Operand::Real(value)));
                Ok(ValueType::Real)
            }
            NodeKind::Identifier => {
                let name = t.text(inner).to_string();
                let looked_up = match self.scopes.resolve(&name) {
                    Ok(symbol) => Some((symbol.kind.clone(), symbol.assigned)),
                    Err(_) => None,
                };
                let Some((kind, assigned)) = looked_up else {
                    return self.critical(pos, format!("name '{}' is not defined", name));
                };
                if kind.is_function() {
                    return self.critical(
                        pos,
                        format!("function '{}' cannot be used as a value", name),
                    );
                }
                if !assigned {
                    return self
                        .critical(pos, format!("'{}' is used before assignment", name));
                }
                match kind {
                    SymbolKind::Int => {
                        self.emit(Op::PushInt(Operand::Var(name)));
                        Ok(ValueType::Int)
                    }
                    SymbolKind::Real => {
                        self.emit(Op::PushReal(Operand::Var(name)));
                        Ok(ValueType::Real)
                    }
                    // A bare array name pushes the whole array by value; it
                    // is only meaningful as a call argument.
                    SymbolKind::IntArray { .. } => {
                        self.emit(Op::PushInt(Operand::Var(name)));
                        Ok(ValueType::IntArray)
                    }
                    SymbolKind::RealArray { .. } => {
                        self.emit(Op::PushReal(Operand::Var(name)));
                        Ok(ValueType::RealArray)
                    }
                    SymbolKind::Function { .. } => {
                        self.critical(pos, format!("'{}' is not a variable", name))
                    }
                }
            }
            NodeKind::IdentityArray => {
                let element = self.resolve_element(inner)?;
                match element.0 {
                    ValueType::Int => {
                        self.emit(Op::PushIntArray {
                            name: element.1,
                            index: element.2,
                        });
                        Ok(ValueType::Int)
                    }
                    ValueType::Real => {
                        self.emit(Op::PushRealArray {
                            name: element.1,
                            index: element.2,
                        });
                        Ok(ValueType::Real)
                    }
                    _ => self.critical(pos, "array element must be int or real"),
                }
            }
            NodeKind::FunctionCall => {
                let name = t.text(t.child(inner, 0)).to_string();
                let ret = self.compile_call(inner)?;
                if ret == ValueType::Void {
                    return self.critical(
                        pos,
                        format!("void function '{}' used in an expression", name),
                    );
                }
                Ok(ret)
            }
            NodeKind::Expression => self.compile_expression(inner),
            _ => self.critical(pos, "malformed factor"),
        }
    }

    fn compile_call(&mut self, id: NodeId) -> Flow<ValueType> {
        let t = self.tree;
        let name = t.text(t.child(id, 0)).to_string();
        let pos = t.pos(t.child(id, 0));

        let looked_up = match self.scopes.resolve(&name) {
            Ok(symbol) => match &symbol.kind {
                SymbolKind::Function { ret, params } => Some(Some((*ret, params.clone()))),
                _ => Some(None),
            },
            Err(_) => None,
        };
        let Some(function) = looked_up else {
            return self.critical(pos, format!("function '{}' is not defined", name));
        };
        let Some((ret, params)) = function else {
            return self.critical(pos, format!("'{}' is not a function", name));
        };

        let args = t.children(t.child(id, 1));
        if args.len() != params.len() {
            return self.critical(
                pos,
                format!(
                    "function '{}' expects {} arguments, found {}",
                    name,
                    params.len(),
                    args.len()
                ),
            );
        }

        for (&arg, (pname, pty)) in args.iter().zip(&params) {
            let arg_type = self.compile_expression(arg)?;
            let compatible =
                arg_type == *pty || (*pty == ValueType::Real && arg_type == ValueType::Int);
            if !compatible {
                let arg_pos = t.pos(arg);
                return self.critical(
                    arg_pos,
                    format!(
                        "argument '{}' of '{}': expected {}, found {}",
                        pname, name, pty, arg_type
                    ),
                );
            }
        }

        self.emit(Op::Call(name));
        Ok(ret)
    }

    // =========================================================================
    // Shared resolution helpers
    // =========================================================================

    /// Numeric promotion for a binary arithmetic combination.
    fn combine(&mut self, lhs: ValueType, rhs: ValueType, pos: Pos) -> Flow<ValueType> {
        match (lhs, rhs) {
            (ValueType::Int, ValueType::Int) => Ok(ValueType::Int),
            (ValueType::Int | ValueType::Real, ValueType::Int | ValueType::Real) => {
                Ok(ValueType::Real)
            }
            _ => self.critical(
                pos,
                format!("cannot apply arithmetic to {} and {}", lhs, rhs),
            ),
        }
    }

    fn parse_int(&mut self, leaf: NodeId) -> Flow<i64> {
        let text = self.tree.text(leaf);
        match text.parse::<i64>() {
            Ok(value) => Ok(value),
            Err(_) => {
                let text = text.to_string();
                let pos = self.tree.pos(leaf);
                self.critical(pos, format!("invalid integer literal \"{}\"", text))
            }
        }
    }

    /// Declared type of a `DeclareKeyword` node, plus the array size operand
    /// when the declaration has one.
    fn declare_info(&mut self, id: NodeId) -> Flow<(ValueType, Option<Operand>)> {
        let t = self.tree;
        let kids = t.children(id);
        let base = match t.kind(kids[0]) {
            NodeKind::Int => ValueType::Int,
            NodeKind::Real => ValueType::Real,
            NodeKind::Void => ValueType::Void,
            _ => {
                let pos = t.pos(kids[0]);
                return self.critical(pos, "malformed type keyword");
            }
        };

        let Some(&array) = kids.get(1) else {
            return Ok((base, None));
        };
        let size = self.array_operand(array)?;
        if let Operand::Int(n) = size {
            if n < 1 {
                let pos = t.pos(array);
                return self.critical(pos, format!("invalid array size {}", n));
            }
        }
        let ty = match base {
            ValueType::Int => ValueType::IntArray,
            ValueType::Real => ValueType::RealArray,
            other => {
                let pos = t.pos(array);
                return self.critical(pos, format!("{} cannot be an array element type", other));
            }
        };
        Ok((ty, Some(size)))
    }

    /// The literal or identifier inside an `Array` node's brackets.
    fn array_operand(&mut self, id: NodeId) -> Flow<Operand> {
        let t = self.tree;
        let leaf = t.child(id, 0);
        match t.kind(leaf) {
            NodeKind::IntegerLiteral => Ok(Operand::Int(self.parse_int(leaf)?)),
            NodeKind::Identifier => Ok(Operand::Var(t.text(leaf).to_string())),
            _ => {
                let pos = t.pos(leaf);
                self.critical(pos, "array brackets require an integer literal or identifier")
            }
        }
    }

    /// Validate an identifier used as an array offset or size: it must be a
    /// previously assigned int scalar.
    fn check_index_ident(&mut self, name: &str, pos: Pos) -> Flow<()> {
        let looked_up = match self.scopes.resolve(name) {
            Ok(symbol) => Some((symbol.kind.clone(), symbol.assigned)),
            Err(_) => None,
        };
        let Some((kind, assigned)) = looked_up else {
            return self.critical(pos, format!("name '{}' is not defined", name));
        };
        if kind != SymbolKind::Int {
            return self.critical(
                pos,
                format!("array offset '{}' must be an int scalar", name),
            );
        }
        if !assigned {
            return self.critical(pos, format!("'{}' is used before assignment", name));
        }
        Ok(())
    }

    /// Bounds-check an offset operand where possible. Literal offsets are
    /// checked against the declared element count; identifier offsets are
    /// validated as int scalars and deferred to the VM's runtime check.
    fn check_offset(
        &mut self,
        operand: &Operand,
        declared_size: Option<i64>,
        name: &str,
        pos: Pos,
    ) -> Flow<()> {
        match operand {
            Operand::Int(n) => {
                let out_of_bounds = *n < 0 || declared_size.is_some_and(|size| *n >= size);
                if out_of_bounds {
                    return self.critical(
                        pos,
                        format!(
                            "array offset {} out of bounds for '{}' (size {})",
                            n,
                            name,
                            declared_size.unwrap_or_default()
                        ),
                    );
                }
                Ok(())
            }
            Operand::Var(ident) => self.check_index_ident(ident, pos),
            Operand::Real(_) => self.critical(pos, "array offset must be an integer"),
        }
    }

    /// A resolved assignment or read target.
    fn resolve_target(&mut self, id: NodeId) -> Flow<Target> {
        let t = self.tree;
        let name_leaf = t.child(id, 0);
        let name = t.text(name_leaf).to_string();
        let pos = t.pos(name_leaf);

        let looked_up = match self.scopes.resolve(&name) {
            Ok(symbol) => Some(symbol.kind.clone()),
            Err(_) => None,
        };
        let Some(kind) = looked_up else {
            return self.critical(pos, format!("name '{}' is not defined", name));
        };
        if kind.is_function() {
            return self.critical(pos, format!("cannot store into function '{}'", name));
        }

        match t.kind(id) {
            NodeKind::Identity => match kind {
                SymbolKind::Int => Ok(Target {
                    name,
                    element: ValueType::Int,
                    index: None,
                    pos,
                }),
                SymbolKind::Real => Ok(Target {
                    name,
                    element: ValueType::Real,
                    index: None,
                    pos,
                }),
                _ => self.critical(
                    pos,
                    format!("cannot assign to entire array '{}'", name),
                ),
            },
            NodeKind::IdentityArray => {
                if !kind.is_array() {
                    return self.critical(pos, format!("'{}' is not an array", name));
                }
                let index = self.array_operand(t.child(id, 1))?;
                self.check_offset(&index, kind.declared_size(), &name, pos)?;
                let element = match kind {
                    SymbolKind::IntArray { .. } => ValueType::Int,
                    _ => ValueType::Real,
                };
                Ok(Target {
                    name,
                    element,
                    index: Some(index),
                    pos,
                })
            }
            _ => self.critical(pos, "malformed assignment target"),
        }
    }

    /// An array element used as a factor: (element type, array name, offset).
    fn resolve_element(&mut self, id: NodeId) -> Flow<(ValueType, String, Operand)> {
        let t = self.tree;
        let name_leaf = t.child(id, 0);
        let name = t.text(name_leaf).to_string();
        let pos = t.pos(name_leaf);

        let looked_up = match self.scopes.resolve(&name) {
            Ok(symbol) => Some((symbol.kind.clone(), symbol.assigned)),
            Err(_) => None,
        };
        let Some((kind, assigned)) = looked_up else {
            return self.critical(pos, format!("name '{}' is not defined", name));
        };
        if !kind.is_array() {
            return self.critical(pos, format!("'{}' is not an array", name));
        }
        if !assigned {
            return self.critical(pos, format!("'{}' is used before assignment", name));
        }
        let index = self.array_operand(t.child(id, 1))?;
        self.check_offset(&index, kind.declared_size(), &name, pos)?;
        let element = match kind {
            SymbolKind::IntArray { .. } => ValueType::Int,
            _ => ValueType::Real,
        };
        Ok((element, name, index))
    }

    fn mark_assigned(&mut self, name: &str) {
        if let Ok(symbol) = self.scopes.resolve_mut(name) {
            symbol.assigned = true;
        }
    }
}

struct Target {
    name: String,
    element: ValueType,
    index: Option<Operand>,
    pos: Pos,
}
