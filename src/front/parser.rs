//! C3: recursive-descent parser with Pratt-style binary expressions.

use super::ast::*;
use super::lexer::{LexError, Lexer, Token, TokenKind};
use crate::diagnostics::Span;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("expected {expected}, found {found} at {span}")]
    Unexpected {
        expected: String,
        found: TokenKind,
        span: Span,
    },
    #[error("array size must resolve to a positive integer constant at {0}")]
    BadArraySize(Span),
}

type Result<T> = std::result::Result<T, ParseError>;

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Result<Self> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next()?;
        Ok(Parser { lexer, current })
    }

    fn bump(&mut self) -> Result<Token> {
        let next = self.lexer.next()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current.kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> Result<bool> {
        if self.check(kind) {
            self.bump()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.current.kind == kind {
            self.bump()
        } else {
            Err(ParseError::Unexpected {
                expected: format!("`{:?}`", kind),
                found: self.current.kind.clone(),
                span: self.current.span,
            })
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span)> {
        match self.current.kind.clone() {
            TokenKind::Ident(name) => {
                let span = self.current.span;
                self.bump()?;
                Ok((name, span))
            }
            other => Err(ParseError::Unexpected {
                expected: "identifier".into(),
                found: other,
                span: self.current.span,
            }),
        }
    }

    fn is_ident(&self, word: &str) -> bool {
        matches!(&self.current.kind, TokenKind::Ident(s) if s == word)
    }

    fn eat_ident(&mut self, word: &str) -> Result<bool> {
        if self.is_ident(word) {
            self.bump()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<Span> {
        if self.is_ident(word) {
            let span = self.current.span;
            self.bump()?;
            Ok(span)
        } else {
            Err(ParseError::Unexpected {
                expected: format!("`{}`", word),
                found: self.current.kind.clone(),
                span: self.current.span,
            })
        }
    }

    // ---- top level ----------------------------------------------------

    pub fn parse_file(&mut self) -> Result<File> {
        let mut decls = Vec::new();
        while !self.check(&TokenKind::Eof) {
            decls.push(self.parse_top_decl()?);
        }
        Ok(File { decls })
    }

    fn parse_attrs(&mut self) -> Result<Vec<Attribute>> {
        let mut attrs = Vec::new();
        while self.check(&TokenKind::LBracket) {
            // `[[` is two LBracket tokens back to back.
            let start = self.current.span;
            self.bump()?;
            self.expect(TokenKind::LBracket)?;
            loop {
                let (name, span) = self.expect_ident()?;
                let mut args = Vec::new();
                if self.eat(&TokenKind::LParen)? {
                    if !self.check(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr(false)?);
                            if !self.eat(&TokenKind::Comma)? {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                }
                attrs.push(Attribute { name, args, span });
                if !self.eat(&TokenKind::Comma)? {
                    break;
                }
            }
            self.expect(TokenKind::RBracket)?;
            self.expect(TokenKind::RBracket)?;
            let _ = start;
        }
        Ok(attrs)
    }

    fn parse_top_decl(&mut self) -> Result<Decl> {
        let attrs = self.parse_attrs()?;
        let start = self.current.span;
        if self.eat_ident("fn")? {
            let (name, _) = self.expect_ident()?;
            self.expect(TokenKind::LParen)?;
            let mut params = Vec::new();
            if !self.check(&TokenKind::RParen) {
                loop {
                    let pattrs = self.parse_attrs()?;
                    let (pname, pspan) = self.expect_ident()?;
                    self.expect(TokenKind::Colon)?;
                    let type_expr = self.parse_expr(true)?;
                    params.push(Param {
                        name: pname,
                        attrs: pattrs,
                        type_expr,
                        span: pspan,
                    });
                    if !self.eat(&TokenKind::Comma)? {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen)?;
            let return_attrs = self.parse_attrs()?;
            let return_type = self.parse_expr(true)?;
            let body = self.parse_block_stmts()?;
            let span = self.span_from(start);
            return Ok(Decl {
                kind: DeclKind::Function(FunctionDecl {
                    name,
                    attrs,
                    params,
                    return_type,
                    return_attrs,
                    body,
                    span,
                }),
                span,
            });
        }
        if self.eat_ident("let")? {
            let storage = if self.eat(&TokenKind::LParen)? {
                let (s, _) = self.expect_ident()?;
                self.expect(TokenKind::RParen)?;
                Some(s)
            } else {
                None
            };
            let (name, _) = self.expect_ident()?;
            let type_expr = if self.eat(&TokenKind::Colon)? {
                Some(self.parse_expr(true)?)
            } else {
                None
            };
            let value_expr = if self.eat(&TokenKind::Eq)? {
                Some(self.parse_expr(false)?)
            } else {
                None
            };
            self.expect(TokenKind::Semicolon)?;
            let span = self.span_from(start);
            return Ok(Decl {
                kind: DeclKind::Var(VarDecl {
                    name,
                    storage,
                    attrs,
                    type_expr,
                    value_expr,
                    span,
                }),
                span,
            });
        }
        if self.eat_ident("type")? {
            let (name, _) = self.expect_ident()?;
            let value_expr = self.parse_expr(true)?;
            self.expect(TokenKind::Semicolon)?;
            let span = self.span_from(start);
            return Ok(Decl {
                kind: DeclKind::TypeDef(TypeDefDecl {
                    name,
                    value_expr,
                    span,
                }),
                span,
            });
        }
        Err(ParseError::Unexpected {
            expected: "`fn`, `let`, or `type`".into(),
            found: self.current.kind.clone(),
            span: self.current.span,
        })
    }

    // ---- statements -----------------------------------------------------

    fn parse_block_stmts(&mut self) -> Result<Vec<Stmt>> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        let start = self.current.span;
        if self.check(&TokenKind::LBrace) {
            let stmts = self.parse_block_stmts()?;
            return Ok(Stmt {
                kind: StmtKind::Block(stmts),
                span: self.span_from(start),
            });
        }
        if self.eat_ident("let")? {
            let (name, _) = self.expect_ident()?;
            self.expect(TokenKind::Colon)?;
            let type_expr = if self.check(&TokenKind::Eq) {
                None
            } else {
                Some(self.parse_expr(true)?)
            };
            let value_expr = if self.eat(&TokenKind::Eq)? {
                Some(self.parse_expr(false)?)
            } else {
                None
            };
            self.expect(TokenKind::Semicolon)?;
            return Ok(Stmt {
                kind: StmtKind::Decl(VarDecl {
                    name,
                    storage: Some("function".into()),
                    attrs: Vec::new(),
                    type_expr,
                    value_expr,
                    span: self.span_from(start),
                }),
                span: self.span_from(start),
            });
        }
        if self.eat_ident("return")? {
            let value = if self.check(&TokenKind::Semicolon) {
                None
            } else {
                Some(self.parse_expr(false)?)
            };
            self.expect(TokenKind::Semicolon)?;
            return Ok(Stmt {
                kind: StmtKind::Return(value),
                span: self.span_from(start),
            });
        }
        if self.eat_ident("discard")? {
            self.expect(TokenKind::Semicolon)?;
            return Ok(Stmt {
                kind: StmtKind::Discard,
                span: self.span_from(start),
            });
        }
        if self.eat_ident("break")? {
            self.expect(TokenKind::Semicolon)?;
            return Ok(Stmt {
                kind: StmtKind::Break,
                span: self.span_from(start),
            });
        }
        if self.eat_ident("continue")? {
            self.expect(TokenKind::Semicolon)?;
            return Ok(Stmt {
                kind: StmtKind::Continue,
                span: self.span_from(start),
            });
        }
        if self.eat_ident("if")? {
            self.expect(TokenKind::LParen)?;
            let cond = self.parse_expr(false)?;
            self.expect(TokenKind::RParen)?;
            let then_branch = Box::new(self.parse_stmt()?);
            let else_branch = if self.eat_ident("else")? {
                Some(Box::new(self.parse_stmt()?))
            } else {
                None
            };
            return Ok(Stmt {
                kind: StmtKind::If {
                    cond,
                    then_branch,
                    else_branch,
                },
                span: self.span_from(start),
            });
        }
        if self.eat_ident("while")? {
            self.expect(TokenKind::LParen)?;
            let cond = self.parse_expr(false)?;
            self.expect(TokenKind::RParen)?;
            let body = Box::new(self.parse_stmt()?);
            return Ok(Stmt {
                kind: StmtKind::While { cond, body },
                span: self.span_from(start),
            });
        }
        // Expression statement, optionally a plain or compound assignment.
        let target = self.parse_expr(false)?;
        let kind = if let Some(op) = self.compound_assign_op()? {
            let value = self.parse_expr(false)?;
            let rhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(target.clone()),
                    rhs: Box::new(value),
                },
                self.span_from(start),
            );
            StmtKind::Assign { target, value: rhs }
        } else if self.eat(&TokenKind::Eq)? {
            let value = self.parse_expr(false)?;
            StmtKind::Assign { target, value }
        } else {
            StmtKind::Expr(target)
        };
        self.expect(TokenKind::Semicolon)?;
        Ok(Stmt {
            kind,
            span: self.span_from(start),
        })
    }

    fn compound_assign_op(&mut self) -> Result<Option<BinaryOp>> {
        let op = match self.current.kind {
            TokenKind::PlusEq => BinaryOp::Add,
            TokenKind::MinusEq => BinaryOp::Sub,
            TokenKind::StarEq => BinaryOp::Mul,
            TokenKind::SlashEq => BinaryOp::Div,
            TokenKind::PercentEq => BinaryOp::Mod,
            TokenKind::AmpEq => BinaryOp::BitAnd,
            TokenKind::PipeEq => BinaryOp::BitOr,
            TokenKind::CaretEq => BinaryOp::BitXor,
            TokenKind::ShlEq => BinaryOp::Shl,
            TokenKind::ShrEq => BinaryOp::Shr,
            _ => return Ok(None),
        };
        self.bump()?;
        Ok(Some(op))
    }

    // ---- expressions ----------------------------------------------------

    /// `only_types` suppresses struct-literal postfix (`T{...}`) and turns
    /// on `T[n]`/`T[]` array-type postfix instead of value indexing.
    pub fn parse_expr(&mut self, only_types: bool) -> Result<Expr> {
        self.parse_binary(1, only_types)
    }

    fn binop_prec(kind: &TokenKind) -> Option<(BinaryOp, u8)> {
        Some(match kind {
            TokenKind::PipePipe => (BinaryOp::Or, 1),
            TokenKind::AmpAmp => (BinaryOp::And, 2),
            TokenKind::Pipe => (BinaryOp::BitOr, 3),
            TokenKind::Caret => (BinaryOp::BitXor, 4),
            TokenKind::Amp => (BinaryOp::BitAnd, 5),
            TokenKind::EqEq => (BinaryOp::Eq, 6),
            TokenKind::Ne => (BinaryOp::Ne, 6),
            TokenKind::Lt => (BinaryOp::Lt, 7),
            TokenKind::Le => (BinaryOp::Le, 7),
            TokenKind::Gt => (BinaryOp::Gt, 7),
            TokenKind::Ge => (BinaryOp::Ge, 7),
            TokenKind::Shl => (BinaryOp::Shl, 8),
            TokenKind::Shr => (BinaryOp::Shr, 8),
            TokenKind::Plus => (BinaryOp::Add, 9),
            TokenKind::Minus => (BinaryOp::Sub, 9),
            TokenKind::Star => (BinaryOp::Mul, 10),
            TokenKind::Slash => (BinaryOp::Div, 10),
            TokenKind::Percent => (BinaryOp::Mod, 10),
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_prec: u8, only_types: bool) -> Result<Expr> {
        let mut lhs = self.parse_unary(only_types)?;
        loop {
            let Some((op, prec)) = Self::binop_prec(&self.current.kind) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            let start = lhs.span;
            self.bump()?;
            let rhs = self.parse_binary(prec + 1, only_types)?;
            let span = start.merge(rhs.span);
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self, only_types: bool) -> Result<Expr> {
        let start = self.current.span;
        let op = match self.current.kind {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            self.bump()?;
            let expr = self.parse_unary(only_types)?;
            let span = start.merge(expr.span);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    expr: Box::new(expr),
                },
                span,
            ));
        }
        let primary = self.parse_primary(only_types)?;
        self.parse_postfix(primary, only_types)
    }

    fn parse_postfix(&mut self, mut expr: Expr, only_types: bool) -> Result<Expr> {
        loop {
            let start = expr.span;
            if self.eat(&TokenKind::Dot)? {
                let (name, nspan) = self.expect_ident()?;
                expr = Expr::new(
                    ExprKind::Member {
                        base: Box::new(expr),
                        name,
                    },
                    start.merge(nspan),
                );
                continue;
            }
            if self.check(&TokenKind::LBracket) {
                self.bump()?;
                if only_types {
                    let size = if self.check(&TokenKind::RBracket) {
                        None
                    } else {
                        Some(Box::new(self.parse_expr(false)?))
                    };
                    let end = self.expect(TokenKind::RBracket)?;
                    expr = Expr::new(
                        ExprKind::ArrayType {
                            elem: Box::new(expr),
                            size,
                        },
                        start.merge(end.span),
                    );
                } else {
                    let index = self.parse_expr(false)?;
                    let end = self.expect(TokenKind::RBracket)?;
                    expr = Expr::new(
                        ExprKind::Index {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                        start.merge(end.span),
                    );
                }
                continue;
            }
            if self.check(&TokenKind::LParen) {
                self.bump()?;
                let mut args = Vec::new();
                if !self.check(&TokenKind::RParen) {
                    loop {
                        args.push(self.parse_expr(false)?);
                        if !self.eat(&TokenKind::Comma)? {
                            break;
                        }
                    }
                }
                let end = self.expect(TokenKind::RParen)?;
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    start.merge(end.span),
                );
                continue;
            }
            if !only_types && self.check(&TokenKind::LBrace) {
                self.bump()?;
                let mut fields = Vec::new();
                if !self.check(&TokenKind::RBrace) {
                    loop {
                        self.expect(TokenKind::Dot)?;
                        let (name, _) = self.expect_ident()?;
                        self.expect(TokenKind::Eq)?;
                        let value = self.parse_expr(false)?;
                        fields.push((name, value));
                        if !self.eat(&TokenKind::Comma)? {
                            break;
                        }
                    }
                }
                let end = self.expect(TokenKind::RBrace)?;
                expr = Expr::new(
                    ExprKind::StructLiteral {
                        ty: Box::new(expr),
                        fields,
                    },
                    start.merge(end.span),
                );
                continue;
            }
            break;
        }
        Ok(expr)
    }

    fn parse_primary(&mut self, only_types: bool) -> Result<Expr> {
        let start = self.current.span;
        match self.current.kind.clone() {
            TokenKind::IntLiteral(v) => {
                self.bump()?;
                Ok(Expr::new(ExprKind::IntLiteral(v), start))
            }
            TokenKind::FloatLiteral(v) => {
                self.bump()?;
                Ok(Expr::new(ExprKind::FloatLiteral(v), start))
            }
            TokenKind::StringLiteral(s) => {
                self.bump()?;
                Ok(Expr::new(ExprKind::StringLiteral(s), start))
            }
            TokenKind::LParen => {
                self.bump()?;
                let inner = self.parse_expr(only_types)?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::At => {
                self.bump()?;
                let (name, _) = self.expect_ident()?;
                self.expect(TokenKind::LParen)?;
                let mut args = Vec::new();
                if !self.check(&TokenKind::RParen) {
                    loop {
                        args.push(self.parse_expr(false)?);
                        if !self.eat(&TokenKind::Comma)? {
                            break;
                        }
                    }
                }
                let end = self.expect(TokenKind::RParen)?;
                Ok(Expr::new(
                    ExprKind::BuiltinCall { name, args },
                    start.merge(end.span),
                ))
            }
            TokenKind::Ident(name) => {
                if name == "true" {
                    self.bump()?;
                    return Ok(Expr::new(ExprKind::BoolLiteral(true), start));
                }
                if name == "false" {
                    self.bump()?;
                    return Ok(Expr::new(ExprKind::BoolLiteral(false), start));
                }
                if name == "struct" {
                    return self.parse_struct_type(start);
                }
                self.bump()?;
                Ok(Expr::new(ExprKind::Ident(name), start))
            }
            other => Err(ParseError::Unexpected {
                expected: "expression".into(),
                found: other,
                span: start,
            }),
        }
    }

    fn parse_struct_type(&mut self, start: Span) -> Result<Expr> {
        self.expect_keyword("struct")?;
        let layout = if self.eat(&TokenKind::LParen)? {
            let (name, _) = self.expect_ident()?;
            self.expect(TokenKind::RParen)?;
            Some(name)
        } else {
            None
        };
        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let attrs = self.parse_attrs()?;
            let (name, fspan) = self.expect_ident()?;
            self.expect(TokenKind::Colon)?;
            let type_expr = self.parse_expr(true)?;
            fields.push(StructFieldSyntax {
                name,
                attrs,
                type_expr,
                span: fspan,
            });
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        let end = self.expect(TokenKind::RBrace)?;
        Ok(Expr::new(
            ExprKind::StructType { layout, fields },
            start.merge(end.span),
        ))
    }

    fn span_from(&self, start: Span) -> Span {
        start.merge(self.current.span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_empty_vertex_entry_point() {
        let src = "[[stage(vertex)]] fn main() void {}";
        let mut parser = Parser::new(src).unwrap();
        let file = parser.parse_file().unwrap();
        assert_eq!(file.decls.len(), 1);
        match &file.decls[0].kind {
            DeclKind::Function(f) => {
                assert_eq!(f.name, "main");
                assert_eq!(f.attrs.len(), 1);
                assert_eq!(f.attrs[0].name, "stage");
                assert!(f.body.is_empty());
            }
            _ => panic!("expected function decl"),
        }
    }

    #[test]
    fn parses_binary_precedence_left_associative() {
        let src = "fn f() int { return 1 + 2 * 3; }";
        let mut parser = Parser::new(src).unwrap();
        let file = parser.parse_file().unwrap();
        let DeclKind::Function(f) = &file.decls[0].kind else {
            panic!()
        };
        let StmtKind::Return(Some(expr)) = &f.body[0].kind else {
            panic!()
        };
        match &expr.kind {
            ExprKind::Binary {
                op: BinaryOp::Add,
                rhs,
                ..
            } => match &rhs.kind {
                ExprKind::Binary {
                    op: BinaryOp::Mul, ..
                } => {}
                _ => panic!("expected * to bind tighter than +"),
            },
            _ => panic!("expected top-level +"),
        }
    }

    #[test]
    fn parses_struct_literal_and_member_access() {
        let src = "fn f() float4 { return VSOut{ .pos = in_pos }.pos; }";
        let mut parser = Parser::new(src).unwrap();
        let file = parser.parse_file().unwrap();
        let DeclKind::Function(f) = &file.decls[0].kind else {
            panic!()
        };
        let StmtKind::Return(Some(expr)) = &f.body[0].kind else {
            panic!()
        };
        assert!(matches!(expr.kind, ExprKind::Member { .. }));
    }

    #[test]
    fn parses_array_type_in_type_position() {
        let src = "let x : float[4];";
        let mut parser = Parser::new(src).unwrap();
        let file = parser.parse_file().unwrap();
        let DeclKind::Var(v) = &file.decls[0].kind else {
            panic!()
        };
        assert!(matches!(
            v.type_expr.as_ref().unwrap().kind,
            ExprKind::ArrayType { .. }
        ));
    }

    #[test]
    fn compound_assignment_desugars_to_binary() {
        let src = "fn f() void { x += 1; }";
        let mut parser = Parser::new(src).unwrap();
        let file = parser.parse_file().unwrap();
        let DeclKind::Function(f) = &file.decls[0].kind else {
            panic!()
        };
        match &f.body[0].kind {
            StmtKind::Assign { value, .. } => {
                assert!(matches!(
                    value.kind,
                    ExprKind::Binary {
                        op: BinaryOp::Add,
                        ..
                    }
                ));
            }
            _ => panic!("expected assignment"),
        }
    }
}
