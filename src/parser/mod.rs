pub mod ast;

use crate::lexer::Token;
use crate::types::Span;
use ast::*;
use chumsky::Parser;
use chumsky::input::ValueInput;
use chumsky::prelude::*;

pub use chumsky::span::SimpleSpan;

type RichTokenError<'a> = Rich<'a, Token>;

#[derive(Debug, Clone)]
enum PostfixOp {
    Call(Vec<ExprS>),
    Index(ExprS),
}

/// Parses a whole program: a sequence of statements separated by newlines or
/// semicolons. Blocks are keyword-delimited (`then .. end`, `do .. end`), so
/// the statement and expression grammars are mutually recursive through
/// anonymous function bodies.
pub fn program_parser<'tokens, I>()
-> impl Parser<'tokens, I, Vec<StmtS>, extra::Err<RichTokenError<'tokens>>>
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan> + 'tokens,
{
    let mut expr = Recursive::declare();
    let mut stmt = Recursive::declare();

    let ident = select! { Token::Identifier(s) => s }.labelled("identifier");

    // Statement separators; blank lines and stray semicolons are padding.
    let sep = choice((just(Token::Newline), just(Token::Semicolon)))
        .ignored()
        .repeated();

    // A block body: statements up to (but not including) the closing keyword.
    let block = stmt
        .clone()
        .repeated()
        .collect::<Vec<StmtS>>()
        .then_ignore(sep.clone())
        .boxed();

    let params = ident
        .clone()
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<String>>()
        .delimited_by(just(Token::LParen), just(Token::RParen))
        .boxed();

    expr.define({
        let literal = select! {
            Token::Number(n) => Expr::Literal(Literal::Number(n)),
            Token::Str(s) => Expr::Literal(Literal::Str(s)),
            Token::Bool(b) => Expr::Literal(Literal::Bool(b)),
            Token::Nil => Expr::Literal(Literal::Nil),
        }
        .labelled("literal");

        let array = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<ExprS>>()
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map(Expr::Array)
            .labelled("array literal");

        // Table keys are bare words or string literals, as in `{ a: 1 }`.
        let table_key = select! {
            Token::Identifier(k) => k,
            Token::Str(k) => k,
        }
        .labelled("table key");

        let table = table_key
            .then_ignore(just(Token::Colon))
            .then(expr.clone())
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<(String, ExprS)>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace))
            .map(Expr::Table)
            .labelled("table literal");

        let func_expr = just(Token::Func)
            .ignore_then(params.clone())
            .then(block.clone())
            .then_ignore(just(Token::End))
            .map(|(params, body)| Expr::Function { params, body })
            .labelled("function expression");

        let primary = choice((
            literal,
            func_expr,
            ident.clone().map(Expr::Variable),
            array,
            table,
            expr.clone()
                .delimited_by(just(Token::LParen), just(Token::RParen))
                .map(|e: ExprS| e.0),
        ))
        .map_with(|node: Expr, e| {
            let s: I::Span = e.span();
            (node, s.into_range())
        });

        // Postfix chaining: calls and index accesses, e.g. t["f"](1)[0].
        let postfix_op = choice((
            expr.clone()
                .separated_by(just(Token::Comma))
                .allow_trailing()
                .collect::<Vec<ExprS>>()
                .delimited_by(just(Token::LParen), just(Token::RParen))
                .map(PostfixOp::Call),
            expr.clone()
                .delimited_by(just(Token::LBracket), just(Token::RBracket))
                .map(PostfixOp::Index),
        ));

        let atom = primary.foldl(postfix_op.repeated(), |base: ExprS, op: PostfixOp| {
            let start = base.1.start;
            match op {
                PostfixOp::Call(args) => {
                    let end = args.last().map(|a| a.1.end).unwrap_or(base.1.end);
                    (
                        Expr::Call {
                            callee: Box::new(base),
                            args,
                        },
                        start..end,
                    )
                }
                PostfixOp::Index(index) => {
                    let end = index.1.end;
                    (
                        Expr::Index {
                            object: Box::new(base),
                            index: Box::new(index),
                        },
                        start..end,
                    )
                }
            }
        });

        let op_unary = choice((
            just(Token::Not).to(UnaryOp::Not),
            just(Token::Minus).to(UnaryOp::Negate),
        ))
        .map_with(|op, e| {
            let s: I::Span = e.span();
            (op, s.into_range())
        });

        let unary = op_unary
            .repeated()
            .foldr(atom, |(op, op_span): (UnaryOp, Span), right: ExprS| {
                let span = op_span.start..right.1.end;
                (
                    Expr::Unary {
                        op,
                        expr: Box::new(right),
                    },
                    span,
                )
            });

        let op = |t| just(t).ignored();
        let product = unary.clone().foldl(
            choice((
                op(Token::Star).to(BinaryOp::Mul),
                op(Token::Slash).to(BinaryOp::Div),
            ))
            .then(unary)
            .repeated(),
            |left: ExprS, (op, right): (BinaryOp, ExprS)| {
                let span = left.1.start..right.1.end;
                (
                    Expr::Binary {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    span,
                )
            },
        );
        let sum = product.clone().foldl(
            choice((
                op(Token::Plus).to(BinaryOp::Add),
                op(Token::Minus).to(BinaryOp::Sub),
            ))
            .then(product)
            .repeated(),
            |left: ExprS, (op, right): (BinaryOp, ExprS)| {
                let span = left.1.start..right.1.end;
                (
                    Expr::Binary {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    span,
                )
            },
        );
        let comparison = sum.clone().foldl(
            choice((
                op(Token::EqualEqual).to(BinaryOp::Eq),
                op(Token::NotEqual).to(BinaryOp::Ne),
                op(Token::LessEqual).to(BinaryOp::Le),
                op(Token::Less).to(BinaryOp::Lt),
                op(Token::GreaterEqual).to(BinaryOp::Ge),
                op(Token::Greater).to(BinaryOp::Gt),
            ))
            .then(sum)
            .repeated(),
            |left: ExprS, (op, right): (BinaryOp, ExprS)| {
                let span = left.1.start..right.1.end;
                (
                    Expr::Binary {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    span,
                )
            },
        );
        let and_expr = comparison.clone().foldl(
            op(Token::And).to(BinaryOp::And).then(comparison).repeated(),
            |left: ExprS, (op, right): (BinaryOp, ExprS)| {
                let span = left.1.start..right.1.end;
                (
                    Expr::Binary {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    span,
                )
            },
        );
        let or_expr = and_expr.clone().foldl(
            op(Token::Or).to(BinaryOp::Or).then(and_expr).repeated(),
            |left: ExprS, (op, right): (BinaryOp, ExprS)| {
                let span = left.1.start..right.1.end;
                (
                    Expr::Binary {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    span,
                )
            },
        );

        or_expr.labelled("expression").boxed()
    });

    let let_stmt = just(Token::Let)
        .ignore_then(ident.clone())
        .then_ignore(just(Token::Equal))
        .then(expr.clone())
        .map(|(name, value)| Stmt::Let { name, value })
        .labelled("let binding");

    let assign_stmt = expr
        .clone()
        .then_ignore(just(Token::Equal))
        .then(expr.clone())
        .map(|(target, value)| Stmt::Assign { target, value })
        .labelled("assignment");

    let expr_stmt = expr
        .clone()
        .map(Stmt::Expr)
        .labelled("expression statement");

    let return_stmt = just(Token::Return)
        .ignore_then(expr.clone().or_not())
        .map(Stmt::Return)
        .labelled("return statement");

    let break_stmt = just(Token::Break).to(Stmt::Break).labelled("break");

    // Loop headers reuse the simple statement forms for init/update.
    let simple_spanned = choice((let_stmt.clone(), assign_stmt.clone(), expr_stmt.clone()))
        .map_with(|node: Stmt, e| {
            let s: I::Span = e.span();
            (node, s.into_range())
        })
        .boxed();

    let if_stmt = just(Token::If)
        .ignore_then(expr.clone())
        .then_ignore(just(Token::Then))
        .then(block.clone())
        .then(
            just(Token::Elseif)
                .ignore_then(expr.clone())
                .then_ignore(just(Token::Then))
                .then(block.clone())
                .repeated()
                .collect::<Vec<(ExprS, Vec<StmtS>)>>(),
        )
        .then(just(Token::Else).ignore_then(block.clone()).or_not())
        .then_ignore(just(Token::End))
        .map(
            |(((condition, then_block), elseif_blocks), else_block)| Stmt::If {
                condition,
                then_block,
                elseif_blocks,
                else_block,
            },
        )
        .labelled("if statement");

    let while_stmt = just(Token::While)
        .ignore_then(expr.clone())
        .then_ignore(just(Token::Do))
        .then(block.clone())
        .then_ignore(just(Token::End))
        .map(|(condition, body)| Stmt::While { condition, body })
        .labelled("while loop");

    let for_in_stmt = just(Token::For)
        .ignore_then(ident.clone())
        .then_ignore(just(Token::In))
        .then(expr.clone())
        .then_ignore(just(Token::Do))
        .then(block.clone())
        .then_ignore(just(Token::End))
        .map(|((var, iterable), body)| Stmt::ForIn {
            var,
            iterable,
            body,
        })
        .labelled("for-in loop");

    let for_stmt = just(Token::For)
        .ignore_then(simple_spanned.clone().or_not())
        .then_ignore(just(Token::Semicolon))
        .then(expr.clone().or_not())
        .then_ignore(just(Token::Semicolon))
        .then(simple_spanned.clone().or_not())
        .then_ignore(just(Token::Do))
        .then(block.clone())
        .then_ignore(just(Token::End))
        .map(|(((init, cond), update), body)| Stmt::For {
            init: init.map(Box::new),
            cond,
            update: update.map(Box::new),
            body,
        })
        .labelled("for loop");

    let func_stmt = just(Token::Func)
        .ignore_then(ident.clone())
        .then(params.clone())
        .then(block.clone())
        .then_ignore(just(Token::End))
        .map(|((name, params), body)| Stmt::FuncDef { name, params, body })
        .labelled("function definition");

    stmt.define(
        choice((
            func_stmt,
            if_stmt,
            while_stmt,
            for_in_stmt,
            for_stmt,
            let_stmt,
            return_stmt,
            break_stmt,
            assign_stmt,
            expr_stmt,
        ))
        .map_with(|node: Stmt, e| {
            let s: I::Span = e.span();
            (node, s.into_range())
        })
        .padded_by(sep.clone())
        .boxed(),
    );

    sep.clone()
        .ignore_then(stmt.repeated().collect::<Vec<StmtS>>())
        .then_ignore(sep)
        .then_ignore(end())
        .boxed()
}
