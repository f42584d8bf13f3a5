use std::collections::HashMap;

use super::bytecode::{Arg, Constant, Instruction, Module, Op};
use crate::parser::ast::{BinaryOp, Expr, ExprS, Literal, Stmt, StmtS, UnaryOp};
use crate::types::{LineMap, Span};

/// One lexical scope. Function scopes restart local slot numbering; the
/// top-level scope owns the slots of the root frame.
#[derive(Debug)]
struct Scope {
    locals: HashMap<String, usize>,
    next_local: usize,
}

impl Scope {
    fn new() -> Self {
        Self {
            locals: HashMap::new(),
            next_local: 0,
        }
    }
}

/// The scope chain, innermost scope last. Resolution walks outward to the
/// root; a miss means the name is a global.
#[derive(Debug)]
struct SymbolTable {
    scopes: Vec<Scope>,
}

impl SymbolTable {
    fn new() -> Self {
        Self {
            scopes: vec![Scope::new()],
        }
    }

    fn push_function(&mut self) {
        self.scopes.push(Scope::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    /// Allocates the next local slot in the current scope. Redefining a name
    /// rebinds it to a fresh slot.
    fn define_local(&mut self, name: &str) -> usize {
        let scope = self.scopes.last_mut().expect("scope stack is never empty");
        let idx = scope.next_local;
        scope.next_local += 1;
        scope.locals.insert(name.to_string(), idx);
        idx
    }

    fn resolve(&self, name: &str) -> Option<usize> {
        for scope in self.scopes.iter().rev() {
            if let Some(&idx) = scope.locals.get(name) {
                return Some(idx);
            }
        }
        None
    }
}

/// Break sites of the innermost loop, patched to the exit index once the
/// loop finishes emitting.
#[derive(Debug, Default)]
struct LoopContext {
    break_jumps: Vec<usize>,
}

pub struct Compiler {
    module: Module,
    symbols: SymbolTable,
    loop_stack: Vec<LoopContext>,
    lines: LineMap,
}

impl Compiler {
    pub fn new(source: &str) -> Self {
        Self {
            module: Module::new(),
            symbols: SymbolTable::new(),
            loop_stack: Vec::new(),
            lines: LineMap::new(source),
        }
    }

    pub fn compile(mut self, program: &[StmtS]) -> Module {
        for s in program {
            self.emit_stmt(s);
        }
        let line = program
            .last()
            .map(|s| self.lines.line_of(s.1.end.saturating_sub(1)))
            .unwrap_or(1);
        self.emit(Op::Halt, None, line);
        self.module
    }

    fn line(&self, span: &Span) -> u16 {
        self.lines.line_of(span.start)
    }

    fn emit(&mut self, op: Op, arg: Option<Arg>, line: u16) {
        self.module.instructions.push(Instruction::new(op, arg, line));
    }

    fn add_constant(&mut self, c: Constant) -> u32 {
        self.module.constants.push(c);
        (self.module.constants.len() - 1) as u32
    }

    fn offset(&self) -> usize {
        self.module.instructions.len()
    }

    /// Emits a jump with a placeholder target and returns its index.
    fn emit_jump(&mut self, op: Op, line: u16) -> usize {
        let idx = self.offset();
        self.emit(op, Some(Arg::Int(0)), line);
        idx
    }

    fn patch_jump(&mut self, idx: usize, target: usize) {
        let ins = &mut self.module.instructions[idx];
        match ins.op {
            Op::Jump | Op::JumpIfFalse => ins.arg = Some(Arg::Int(target as i32)),
            _ => unreachable!("patch target is not a jump"),
        }
    }

    fn emit_block(&mut self, block: &[StmtS]) {
        for s in block {
            self.emit_stmt(s);
        }
    }

    fn emit_stmt(&mut self, stmt: &StmtS) {
        let line = self.line(&stmt.1);
        match &stmt.0 {
            Stmt::Let { name, value } => {
                self.emit_expr(value);
                let idx = self.symbols.define_local(name);
                self.emit(Op::SetLocal, Some(Arg::Int(idx as i32)), line);
            }
            Stmt::Assign { target, value } => match &target.0 {
                Expr::Variable(name) => {
                    self.emit_expr(value);
                    match self.symbols.resolve(name) {
                        Some(idx) => self.emit(Op::SetLocal, Some(Arg::Int(idx as i32)), line),
                        None => self.emit(Op::SetGlobal, Some(Arg::Str(name.clone())), line),
                    }
                }
                Expr::Index { object, index } => {
                    self.emit_expr(object);
                    self.emit_expr(index);
                    self.emit_expr(value);
                    self.emit(Op::SetIndex, None, line);
                    // SetIndex leaves the container on the stack; a statement
                    // must not.
                    self.emit(Op::Pop, None, line);
                }
                _ => panic!("invalid assignment target (should be caught by semantic analysis)"),
            },
            Stmt::If {
                condition,
                then_block,
                elseif_blocks,
                else_block,
            } => {
                let mut arms: Vec<(&ExprS, &[StmtS])> = vec![(condition, then_block.as_slice())];
                for (cond, block) in elseif_blocks {
                    arms.push((cond, block.as_slice()));
                }
                let has_else = else_block.is_some();
                let mut end_jumps = Vec::new();

                for (i, (cond, block)) in arms.iter().enumerate() {
                    let cond_line = self.line(&cond.1);
                    self.emit_expr(cond);
                    let jump_false = self.emit_jump(Op::JumpIfFalse, cond_line);
                    self.emit_block(block);
                    if i < arms.len() - 1 || has_else {
                        end_jumps.push(self.emit_jump(Op::Jump, cond_line));
                    }
                    let after_arm = self.offset();
                    self.patch_jump(jump_false, after_arm);
                }

                if let Some(block) = else_block {
                    self.emit_block(block);
                }
                let end = self.offset();
                for idx in end_jumps {
                    self.patch_jump(idx, end);
                }
            }
            Stmt::While { condition, body } => {
                self.loop_stack.push(LoopContext::default());

                let start = self.offset();
                self.emit_expr(condition);
                let exit_jump = self.emit_jump(Op::JumpIfFalse, line);
                self.emit_block(body);
                self.emit(Op::Jump, Some(Arg::Int(start as i32)), line);

                let exit = self.offset();
                self.patch_jump(exit_jump, exit);
                self.patch_breaks(exit);
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.emit_stmt(init);
                }
                self.loop_stack.push(LoopContext::default());

                let start = self.offset();
                let exit_jump = cond.as_ref().map(|cond| {
                    self.emit_expr(cond);
                    self.emit_jump(Op::JumpIfFalse, line)
                });
                self.emit_block(body);
                if let Some(update) = update {
                    self.emit_stmt(update);
                }
                self.emit(Op::Jump, Some(Arg::Int(start as i32)), line);

                let exit = self.offset();
                if let Some(idx) = exit_jump {
                    self.patch_jump(idx, exit);
                }
                self.patch_breaks(exit);
            }
            Stmt::ForIn {
                var,
                iterable,
                body,
            } => {
                // let <len> = len(iterable); let <i> = 0
                self.emit_expr(iterable);
                let argc = self.add_constant(Constant::Number(1.0));
                self.emit(Op::Constant, Some(Arg::Const(argc)), line);
                self.emit(Op::Call, Some(Arg::Str("len".to_string())), line);
                let len_slot = self.symbols.define_local(&format!("{}@len", var));
                self.emit(Op::SetLocal, Some(Arg::Int(len_slot as i32)), line);

                let zero = self.add_constant(Constant::Number(0.0));
                self.emit(Op::Constant, Some(Arg::Const(zero)), line);
                let counter_slot = self.symbols.define_local(&format!("{}@counter", var));
                self.emit(Op::SetLocal, Some(Arg::Int(counter_slot as i32)), line);

                self.loop_stack.push(LoopContext::default());

                // while <i> < <len>
                let start = self.offset();
                self.emit(Op::GetLocal, Some(Arg::Int(counter_slot as i32)), line);
                self.emit(Op::GetLocal, Some(Arg::Int(len_slot as i32)), line);
                self.emit(Op::CmpLt, None, line);
                let exit_jump = self.emit_jump(Op::JumpIfFalse, line);

                // var = iterable[<i>]
                self.emit_expr(iterable);
                self.emit(Op::GetLocal, Some(Arg::Int(counter_slot as i32)), line);
                self.emit(Op::GetIndex, None, line);
                let var_slot = self.symbols.define_local(var);
                self.emit(Op::SetLocal, Some(Arg::Int(var_slot as i32)), line);

                self.emit_block(body);

                // <i> = <i> + 1
                self.emit(Op::GetLocal, Some(Arg::Int(counter_slot as i32)), line);
                let one = self.add_constant(Constant::Number(1.0));
                self.emit(Op::Constant, Some(Arg::Const(one)), line);
                self.emit(Op::Add, None, line);
                self.emit(Op::SetLocal, Some(Arg::Int(counter_slot as i32)), line);

                self.emit(Op::Jump, Some(Arg::Int(start as i32)), line);
                let exit = self.offset();
                self.patch_jump(exit_jump, exit);
                self.patch_breaks(exit);
            }
            Stmt::FuncDef { name, params, body } => {
                self.emit_function(params, body, line);
                self.emit(Op::SetGlobal, Some(Arg::Str(name.clone())), line);
            }
            Stmt::Return(value) => {
                match value {
                    Some(value) => self.emit_expr(value),
                    None => {
                        let idx = self.add_constant(Constant::Nil);
                        self.emit(Op::Constant, Some(Arg::Const(idx)), line);
                    }
                }
                self.emit(Op::Return, None, line);
            }
            Stmt::Break => {
                let offset = self.offset();
                match self.loop_stack.last_mut() {
                    Some(ctx) => {
                        ctx.break_jumps.push(offset);
                        self.emit(Op::Jump, Some(Arg::Int(0)), line);
                    }
                    None => panic!("break outside loop (should be caught by semantic analysis)"),
                }
            }
            Stmt::Expr(expr) => {
                self.emit_expr(expr);
                self.emit(Op::Pop, None, line);
            }
        }
    }

    fn patch_breaks(&mut self, exit: usize) {
        let ctx = self
            .loop_stack
            .pop()
            .expect("loop context pushed by the caller");
        for idx in ctx.break_jumps {
            self.patch_jump(idx, exit);
        }
    }

    /// Inlines a function body behind an unconditional jump so linear
    /// execution skips it, then pushes the function object at the
    /// definition site.
    fn emit_function(&mut self, params: &[String], body: &[StmtS], line: u16) {
        let guard = self.emit_jump(Op::Jump, line);

        self.symbols.push_function();
        for p in params {
            self.symbols.define_local(p);
        }
        let start_ip = self.offset();
        self.emit_block(body);
        // Every exit path must end in Return, including conditional
        // fall-through past an explicit return.
        let nil = self.add_constant(Constant::Nil);
        self.emit(Op::Constant, Some(Arg::Const(nil)), line);
        self.emit(Op::Return, None, line);
        self.symbols.pop();

        let after_body = self.offset();
        self.patch_jump(guard, after_body);

        let idx = self.add_constant(Constant::FuncPtr(start_ip as u32));
        self.emit(Op::MakeFunc, Some(Arg::Const(idx)), line);
    }

    fn emit_expr(&mut self, expr: &ExprS) {
        let line = self.line(&expr.1);
        match &expr.0 {
            Expr::Literal(lit) => {
                let c = match lit {
                    Literal::Number(n) => Constant::Number(*n),
                    Literal::Str(s) => Constant::Str(s.clone()),
                    Literal::Bool(b) => Constant::Bool(*b),
                    Literal::Nil => Constant::Nil,
                };
                let idx = self.add_constant(c);
                self.emit(Op::Constant, Some(Arg::Const(idx)), line);
            }
            Expr::Variable(name) => match self.symbols.resolve(name) {
                Some(idx) => self.emit(Op::GetLocal, Some(Arg::Int(idx as i32)), line),
                None => self.emit(Op::GetGlobal, Some(Arg::Str(name.clone())), line),
            },
            Expr::Unary { op, expr: inner } => match op {
                UnaryOp::Not => {
                    self.emit_expr(inner);
                    self.emit(Op::Not, None, line);
                }
                UnaryOp::Negate => {
                    // -x lowers to 0 - x
                    let zero = self.add_constant(Constant::Number(0.0));
                    self.emit(Op::Constant, Some(Arg::Const(zero)), line);
                    self.emit_expr(inner);
                    self.emit(Op::Sub, None, line);
                }
            },
            Expr::Binary { op, left, right } => match op {
                BinaryOp::And => self.emit_and(left, right, line),
                BinaryOp::Or => self.emit_or(left, right, line),
                _ => {
                    self.emit_expr(left);
                    self.emit_expr(right);
                    let op = match op {
                        BinaryOp::Add => Op::Add,
                        BinaryOp::Sub => Op::Sub,
                        BinaryOp::Mul => Op::Mul,
                        BinaryOp::Div => Op::Div,
                        BinaryOp::Eq => Op::CmpEq,
                        BinaryOp::Ne => Op::CmpNe,
                        BinaryOp::Lt => Op::CmpLt,
                        BinaryOp::Le => Op::CmpLte,
                        BinaryOp::Gt => Op::CmpGt,
                        BinaryOp::Ge => Op::CmpGte,
                        BinaryOp::And | BinaryOp::Or => unreachable!(),
                    };
                    self.emit(op, None, line);
                }
            },
            Expr::Call { callee, args } => {
                // A bare name that is not a local is called directly: the VM
                // resolves it at runtime, builtins before globals. A name
                // bound to a local slot holds a function value, so it is
                // called through the value like any computed callee.
                let direct_name = match &callee.0 {
                    Expr::Variable(name) if self.symbols.resolve(name).is_none() => {
                        Some(name.clone())
                    }
                    _ => None,
                };
                for a in args {
                    self.emit_expr(a);
                }
                match direct_name {
                    Some(name) => {
                        let argc = self.add_constant(Constant::Number(args.len() as f64));
                        self.emit(Op::Constant, Some(Arg::Const(argc)), line);
                        self.emit(Op::Call, Some(Arg::Str(name)), line);
                    }
                    None => {
                        self.emit_expr(callee);
                        let argc = self.add_constant(Constant::Number(args.len() as f64));
                        self.emit(Op::Constant, Some(Arg::Const(argc)), line);
                        self.emit(Op::CallIndirect, None, line);
                    }
                }
            }
            Expr::Index { object, index } => {
                self.emit_expr(object);
                self.emit_expr(index);
                self.emit(Op::GetIndex, None, line);
            }
            Expr::Array(items) => {
                for item in items {
                    self.emit_expr(item);
                }
                self.emit(Op::Array, Some(Arg::Int(items.len() as i32)), line);
            }
            Expr::Table(pairs) => {
                self.emit(Op::Table, None, line);
                for (key, value) in pairs {
                    let k = self.add_constant(Constant::Str(key.clone()));
                    self.emit(Op::Constant, Some(Arg::Const(k)), line);
                    self.emit_expr(value);
                    self.emit(Op::SetIndex, None, line);
                }
            }
            Expr::Function { params, body } => {
                self.emit_function(params, body, line);
            }
        }
    }

    /// `a and b` evaluates b only when a is truthy; the result is a boolean.
    fn emit_and(&mut self, left: &ExprS, right: &ExprS, line: u16) {
        self.emit_expr(left);
        let false_jump_a = self.emit_jump(Op::JumpIfFalse, line);
        self.emit_expr(right);
        let false_jump_b = self.emit_jump(Op::JumpIfFalse, line);
        let t = self.add_constant(Constant::Bool(true));
        self.emit(Op::Constant, Some(Arg::Const(t)), line);
        let end_jump = self.emit_jump(Op::Jump, line);

        let false_label = self.offset();
        self.patch_jump(false_jump_a, false_label);
        self.patch_jump(false_jump_b, false_label);
        let f = self.add_constant(Constant::Bool(false));
        self.emit(Op::Constant, Some(Arg::Const(f)), line);

        let end = self.offset();
        self.patch_jump(end_jump, end);
    }

    /// `a or b` evaluates b only when a is falsy; the result is a boolean.
    fn emit_or(&mut self, left: &ExprS, right: &ExprS, line: u16) {
        self.emit_expr(left);
        let try_right = self.emit_jump(Op::JumpIfFalse, line);
        let t = self.add_constant(Constant::Bool(true));
        self.emit(Op::Constant, Some(Arg::Const(t)), line);
        let end_jump_a = self.emit_jump(Op::Jump, line);

        let right_label = self.offset();
        self.patch_jump(try_right, right_label);
        self.emit_expr(right);
        let false_jump = self.emit_jump(Op::JumpIfFalse, line);
        let t2 = self.add_constant(Constant::Bool(true));
        self.emit(Op::Constant, Some(Arg::Const(t2)), line);
        let end_jump_b = self.emit_jump(Op::Jump, line);

        let false_label = self.offset();
        self.patch_jump(false_jump, false_label);
        let f = self.add_constant(Constant::Bool(false));
        self.emit(Op::Constant, Some(Arg::Const(f)), line);

        let end = self.offset();
        self.patch_jump(end_jump_a, end);
        self.patch_jump(end_jump_b, end);
    }
}
