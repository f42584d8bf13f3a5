use std::collections::HashSet;

use crate::parser::ast::{Expr, ExprS, Stmt, StmtS};
use crate::types::Span;

#[derive(Debug)]
pub struct SemanticError {
    pub message: String,
    pub span: Span,
}

pub type SemanticResult<T> = Result<T, SemanticError>;

/// Lexical scope stack used for name resolution. The bottom scope holds
/// globals (and the builtin names); function bodies push a fresh scope.
#[derive(Debug, Default)]
struct ScopeStack {
    stack: Vec<HashSet<String>>,
}

impl ScopeStack {
    fn new() -> Self {
        Self {
            stack: vec![HashSet::new()],
        }
    }

    fn push(&mut self) {
        self.stack.push(HashSet::new());
    }

    fn pop(&mut self) {
        self.stack.pop();
    }

    fn define(&mut self, name: &str) {
        if let Some(current) = self.stack.last_mut() {
            current.insert(name.to_string());
        }
    }

    fn is_defined(&self, name: &str) -> bool {
        self.stack.iter().rev().any(|s| s.contains(name))
    }
}

struct Analyzer {
    scopes: ScopeStack,
    loop_depth: usize,
}

/// Checks name resolution, assignment targets, and break placement.
///
/// Function names (top level and nested) are collected up front so that a
/// function body may call functions defined later in the program.
pub fn analyze(program: &[StmtS]) -> SemanticResult<()> {
    let mut scopes = ScopeStack::new();
    for b in crate::builtins::all() {
        scopes.define(b.name);
    }
    collect_func_names(program, &mut scopes);

    let mut analyzer = Analyzer {
        scopes,
        loop_depth: 0,
    };
    for stmt in program {
        analyzer.check_stmt(stmt)?;
    }
    Ok(())
}

fn collect_func_names(block: &[StmtS], scopes: &mut ScopeStack) {
    for s in block {
        match &s.0 {
            Stmt::FuncDef { name, body, .. } => {
                scopes.define(name);
                collect_func_names(body, scopes);
            }
            Stmt::If {
                then_block,
                elseif_blocks,
                else_block,
                ..
            } => {
                collect_func_names(then_block, scopes);
                for (_, block) in elseif_blocks {
                    collect_func_names(block, scopes);
                }
                if let Some(block) = else_block {
                    collect_func_names(block, scopes);
                }
            }
            Stmt::While { body, .. } | Stmt::For { body, .. } | Stmt::ForIn { body, .. } => {
                collect_func_names(body, scopes);
            }
            _ => {}
        }
    }
}

impl Analyzer {
    fn check_block(&mut self, block: &[StmtS]) -> SemanticResult<()> {
        for s in block {
            self.check_stmt(s)?;
        }
        Ok(())
    }

    fn check_stmt(&mut self, stmt: &StmtS) -> SemanticResult<()> {
        match &stmt.0 {
            Stmt::Let { name, value } => {
                self.check_expr(value)?;
                self.scopes.define(name);
                Ok(())
            }
            Stmt::Assign { target, value } => {
                self.check_expr(value)?;
                match &target.0 {
                    Expr::Variable(name) => {
                        // A bare assignment to a new name creates a global.
                        if !self.scopes.is_defined(name) {
                            self.scopes.define(name);
                        }
                        Ok(())
                    }
                    Expr::Index { .. } => self.check_expr(target),
                    _ => Err(SemanticError {
                        message: "Invalid assignment target".to_string(),
                        span: target.1.clone(),
                    }),
                }
            }
            Stmt::If {
                condition,
                then_block,
                elseif_blocks,
                else_block,
            } => {
                self.check_expr(condition)?;
                self.check_block(then_block)?;
                for (cond, block) in elseif_blocks {
                    self.check_expr(cond)?;
                    self.check_block(block)?;
                }
                if let Some(block) = else_block {
                    self.check_block(block)?;
                }
                Ok(())
            }
            Stmt::While { condition, body } => {
                self.check_expr(condition)?;
                self.loop_depth += 1;
                let result = self.check_block(body);
                self.loop_depth -= 1;
                result
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.check_stmt(init)?;
                }
                if let Some(cond) = cond {
                    self.check_expr(cond)?;
                }
                self.loop_depth += 1;
                let result = self.check_block(body).and_then(|_| {
                    if let Some(update) = update {
                        self.check_stmt(update)
                    } else {
                        Ok(())
                    }
                });
                self.loop_depth -= 1;
                result
            }
            Stmt::ForIn {
                var,
                iterable,
                body,
            } => {
                self.check_expr(iterable)?;
                self.scopes.define(var);
                self.loop_depth += 1;
                let result = self.check_block(body);
                self.loop_depth -= 1;
                result
            }
            Stmt::FuncDef {
                name, params, body, ..
            } => {
                self.scopes.define(name);
                self.check_function(params, body, stmt.1.clone())
            }
            Stmt::Return(value) => {
                if let Some(value) = value {
                    self.check_expr(value)?;
                }
                Ok(())
            }
            Stmt::Break => {
                if self.loop_depth == 0 {
                    return Err(SemanticError {
                        message: "break outside of a loop".to_string(),
                        span: stmt.1.clone(),
                    });
                }
                Ok(())
            }
            Stmt::Expr(expr) => self.check_expr(expr),
        }
    }

    fn check_function(
        &mut self,
        params: &[String],
        body: &[StmtS],
        _span: Span,
    ) -> SemanticResult<()> {
        self.scopes.push();
        for p in params {
            self.scopes.define(p);
        }
        // break cannot jump out of the enclosing function
        let saved_depth = std::mem::replace(&mut self.loop_depth, 0);
        let result = self.check_block(body);
        self.loop_depth = saved_depth;
        self.scopes.pop();
        result
    }

    fn check_expr(&mut self, expr: &ExprS) -> SemanticResult<()> {
        match &expr.0 {
            Expr::Literal(_) => Ok(()),
            Expr::Variable(name) => {
                if !self.scopes.is_defined(name) {
                    return Err(SemanticError {
                        message: format!("Undefined variable: {}", name),
                        span: expr.1.clone(),
                    });
                }
                Ok(())
            }
            Expr::Unary { expr: inner, .. } => self.check_expr(inner),
            Expr::Binary { left, right, .. } => {
                self.check_expr(left)?;
                self.check_expr(right)
            }
            Expr::Call { callee, args } => {
                if let Expr::Variable(name) = &callee.0 {
                    if !self.scopes.is_defined(name) {
                        return Err(SemanticError {
                            message: format!("Undefined function: {}", name),
                            span: expr.1.clone(),
                        });
                    }
                } else {
                    self.check_expr(callee)?;
                }
                for a in args {
                    self.check_expr(a)?;
                }
                Ok(())
            }
            Expr::Index { object, index } => {
                self.check_expr(object)?;
                self.check_expr(index)
            }
            Expr::Array(items) => {
                for item in items {
                    self.check_expr(item)?;
                }
                Ok(())
            }
            Expr::Table(pairs) => {
                for (_, value) in pairs {
                    self.check_expr(value)?;
                }
                Ok(())
            }
            Expr::Function { params, body } => self.check_function(params, body, expr.1.clone()),
        }
    }
}
