use std::rc::Rc;

use crate::{
    ast::{
        AssignOp, BinaryOp, CatchClause, Expr, ExprKind, FieldDecl, FunctionBody, FunctionDecl,
        ImportPath, Literal, Param, Program, Stmt, StmtKind, TypeDecl, TypeExpr, UnaryOp,
    },
    diagnostics::{Diagnostic, Location},
    lexer::{Keyword, Lexer, Token, TokenKind},
};

/// Parses a complete source file. The first syntax error aborts parsing.
pub fn parse_program(source: &str, file: impl Into<Rc<str>>) -> Result<Program, Diagnostic> {
    let file = file.into();
    let tokens = Lexer::new(source, Rc::clone(&file)).tokenize()?;
    let mut parser = Parser::new(tokens);
    let mut statements = Vec::new();
    while !parser.is_at_end() {
        if parser.matches(TokenKind::Semicolon) {
            continue;
        }
        statements.push(parser.parse_statement()?);
    }
    Ok(Program { file, statements })
}

/// Parses a standalone type annotation such as `dict<str, list<int>>`.
pub fn parse_type(source: &str) -> Result<TypeExpr, Diagnostic> {
    let tokens = Lexer::new(source, "<type>").tokenize()?;
    let mut parser = Parser::new(tokens);
    let ty = parser.parse_type_expr()?;
    if !parser.is_at_end() {
        return Err(parser.error(parser.peek(), "unexpected token after type"));
    }
    Ok(ty)
}

struct Parser {
    tokens: Vec<Token>,
    current: usize,
    loop_depth: usize,
    /// Set while parsing the lower bound of a slice, where `::` separates
    /// two empty parts instead of naming a module member.
    slice_bound: bool,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            loop_depth: 0,
            slice_bound: false,
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let location = self.peek().location.clone();
        let kind = match self.peek().kind {
            TokenKind::Keyword(Keyword::Let) => self.parse_let()?,
            TokenKind::Keyword(Keyword::Const) => self.parse_const()?,
            TokenKind::Keyword(Keyword::Fn) if self.peek_next_is(TokenKind::Identifier) => {
                self.advance();
                StmtKind::Function(Rc::new(self.parse_function_decl(true)?))
            }
            TokenKind::Keyword(Keyword::Type) => self.parse_type_decl()?,
            TokenKind::Keyword(Keyword::If) => self.parse_if()?,
            TokenKind::Keyword(Keyword::While) => self.parse_while()?,
            TokenKind::Keyword(Keyword::For) => self.parse_for()?,
            TokenKind::Keyword(Keyword::Return) => self.parse_return()?,
            TokenKind::Keyword(Keyword::Break) => self.parse_loop_jump(StmtKind::Break)?,
            TokenKind::Keyword(Keyword::Continue) => self.parse_loop_jump(StmtKind::Continue)?,
            TokenKind::Keyword(Keyword::Try) => self.parse_try()?,
            TokenKind::Keyword(Keyword::Throw) => {
                self.advance();
                let value = self.parse_expression()?;
                self.consume_optional_semicolon();
                StmtKind::Throw(value)
            }
            TokenKind::Keyword(Keyword::Import) => self.parse_import()?,
            TokenKind::LBrace => StmtKind::Block(self.parse_block()?),
            _ => StmtKind::Expr(self.parse_expression()?),
        };
        self.consume_optional_semicolon();
        Ok(Stmt { kind, location })
    }

    fn parse_let(&mut self) -> Result<StmtKind, Diagnostic> {
        self.consume_keyword(Keyword::Let, "expected `let`")?;
        let constant = self.matches_keyword(Keyword::Const);
        let name = self.consume_identifier("expected binding name after `let`")?;
        let annotation = if self.matches(TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        let value = if self.matches(TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else if constant {
            return Err(self.error(self.peek(), "constant binding requires an initializer"));
        } else {
            None
        };
        self.consume_optional_semicolon();
        Ok(StmtKind::Let {
            name,
            constant,
            annotation,
            value,
        })
    }

    fn parse_const(&mut self) -> Result<StmtKind, Diagnostic> {
        self.consume_keyword(Keyword::Const, "expected `const`")?;
        let name = self.consume_identifier("expected binding name after `const`")?;
        let annotation = if self.matches(TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        self.consume(TokenKind::Assign, "constant binding requires an initializer")?;
        let value = self.parse_expression()?;
        self.consume_optional_semicolon();
        Ok(StmtKind::Let {
            name,
            constant: true,
            annotation,
            value: Some(value),
        })
    }

    /// Parses after `fn`. Declarations take a name and always a block body.
    fn parse_function_decl(&mut self, named: bool) -> Result<FunctionDecl, Diagnostic> {
        let name = if named {
            Some(self.consume_identifier("expected function name")?)
        } else {
            None
        };
        self.consume(TokenKind::LParen, "expected `(` to start parameter list")?;
        let mut params: Vec<Param> = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let token = self.peek().clone();
                let param_name = self.consume_identifier("expected parameter name")?;
                if params.iter().any(|p| p.name == param_name) {
                    return Err(self.error(&token, format!("duplicate parameter `{param_name}`")));
                }
                let annotation = if self.matches(TokenKind::Colon) {
                    Some(self.parse_type_expr()?)
                } else {
                    None
                };
                let default = if self.matches(TokenKind::Assign) {
                    Some(self.parse_expression()?)
                } else if params.iter().any(|p| p.default.is_some()) {
                    return Err(self.error(
                        &token,
                        "parameters without defaults must come before those with defaults",
                    ));
                } else {
                    None
                };
                params.push(Param {
                    name: param_name,
                    annotation,
                    default,
                });
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "expected `)` after parameters")?;
        let ret = if self.matches(TokenKind::Arrow) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };

        let saved_loop_depth = std::mem::replace(&mut self.loop_depth, 0);
        let body = if !named && self.matches(TokenKind::FatArrow) {
            self.parse_expression().map(|expr| FunctionBody::Expr(Box::new(expr)))
        } else {
            self.parse_block().map(FunctionBody::Block)
        };
        self.loop_depth = saved_loop_depth;

        Ok(FunctionDecl {
            name,
            params,
            ret,
            body: body?,
        })
    }

    fn parse_type_decl(&mut self) -> Result<StmtKind, Diagnostic> {
        self.consume_keyword(Keyword::Type, "expected `type`")?;
        let name = self.consume_identifier("expected type name")?;
        self.consume(TokenKind::LBrace, "expected `{` after type name")?;
        let mut fields: Vec<FieldDecl> = Vec::new();
        let mut methods: Vec<Rc<FunctionDecl>> = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            let token = self.peek().clone();
            if self.matches_keyword(Keyword::Fn) {
                let method = self.parse_function_decl(true)?;
                if methods.iter().any(|m| m.name == method.name) {
                    return Err(self.error(&token, "duplicate method in type definition"));
                }
                methods.push(Rc::new(method));
                self.consume_optional_semicolon();
                continue;
            }
            let constant = self.matches_keyword(Keyword::Const);
            let field_name = self.consume_identifier("expected field or method declaration")?;
            if fields.iter().any(|f| f.name == field_name) {
                return Err(self.error(&token, format!("duplicate field `{field_name}`")));
            }
            let annotation = if self.matches(TokenKind::Colon) {
                Some(self.parse_type_expr()?)
            } else {
                None
            };
            let default = if self.matches(TokenKind::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            self.consume(TokenKind::Semicolon, "expected `;` after field declaration")?;
            fields.push(FieldDecl {
                name: field_name,
                constant,
                annotation,
                default,
            });
        }
        self.consume(TokenKind::RBrace, "expected `}` to close type definition")?;
        if let Some(destructor) = methods
            .iter()
            .find(|m| m.name.as_deref() == Some("destruct"))
        {
            if !destructor.params.is_empty() {
                return Err(self.error(self.previous(), "`destruct` takes no parameters"));
            }
        }
        Ok(StmtKind::Type(Rc::new(TypeDecl {
            name,
            fields,
            methods,
        })))
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        self.consume(TokenKind::LBrace, "expected `{` to start block")?;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            if self.matches(TokenKind::Semicolon) {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        self.consume(TokenKind::RBrace, "expected `}` to close block")?;
        Ok(statements)
    }

    fn parse_if(&mut self) -> Result<StmtKind, Diagnostic> {
        self.consume_keyword(Keyword::If, "expected `if`")?;
        let condition = self.parse_expression()?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.matches_keyword(Keyword::Else) {
            if self.check_keyword(Keyword::If) {
                let location = self.peek().location.clone();
                let nested = self.parse_if()?;
                Some(vec![Stmt {
                    kind: nested,
                    location,
                }])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(StmtKind::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn parse_loop_body(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        body
    }

    fn parse_while(&mut self) -> Result<StmtKind, Diagnostic> {
        self.consume_keyword(Keyword::While, "expected `while`")?;
        let condition = self.parse_expression()?;
        let body = self.parse_loop_body()?;
        Ok(StmtKind::While { condition, body })
    }

    fn parse_for(&mut self) -> Result<StmtKind, Diagnostic> {
        self.consume_keyword(Keyword::For, "expected `for`")?;
        let binding = self.consume_identifier("expected loop variable after `for`")?;
        let annotation = if self.matches(TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        self.consume_keyword(Keyword::In, "expected `in` after loop variable")?;
        let iterable = self.parse_expression()?;
        let body = self.parse_loop_body()?;
        Ok(StmtKind::For {
            binding,
            annotation,
            iterable,
            body,
        })
    }

    fn parse_return(&mut self) -> Result<StmtKind, Diagnostic> {
        self.consume_keyword(Keyword::Return, "expected `return`")?;
        let value = if self.check(TokenKind::Semicolon) || self.check(TokenKind::RBrace) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_optional_semicolon();
        Ok(StmtKind::Return(value))
    }

    fn parse_loop_jump(&mut self, kind: StmtKind) -> Result<StmtKind, Diagnostic> {
        let token = self.advance().clone();
        if self.loop_depth == 0 {
            return Err(self.error(&token, format!("`{}` outside of a loop", token.lexeme)));
        }
        self.consume_optional_semicolon();
        Ok(kind)
    }

    fn parse_try(&mut self) -> Result<StmtKind, Diagnostic> {
        self.consume_keyword(Keyword::Try, "expected `try`")?;
        let body = self.parse_block()?;
        let mut handlers = Vec::new();
        while self.matches_keyword(Keyword::Catch) {
            self.consume(TokenKind::LParen, "expected `(` after `catch`")?;
            let binding = self.consume_identifier("expected error binding in `catch`")?;
            let mut kinds = Vec::new();
            if self.matches(TokenKind::Colon) {
                loop {
                    kinds.push(self.consume_identifier("expected error kind name")?);
                    if !self.matches(TokenKind::Pipe) {
                        break;
                    }
                }
            }
            self.consume(TokenKind::RParen, "expected `)` after catch binding")?;
            let body = self.parse_block()?;
            handlers.push(CatchClause {
                binding,
                kinds,
                body,
            });
        }
        if handlers.is_empty() {
            return Err(self.error(self.peek(), "expected `catch` after `try` block"));
        }
        Ok(StmtKind::Try { body, handlers })
    }

    fn parse_import(&mut self) -> Result<StmtKind, Diagnostic> {
        self.consume_keyword(Keyword::Import, "expected `import`")?;
        let path = if self.check(TokenKind::String) {
            ImportPath::File(self.advance().lexeme.clone())
        } else {
            let mut segments = vec![self.consume_identifier("expected module name")?];
            while self.matches(TokenKind::ColonColon) {
                segments.push(self.consume_identifier("expected module name after `::`")?);
            }
            ImportPath::Module(segments)
        };
        let alias = if self.matches_keyword(Keyword::As) {
            Some(self.consume_identifier("expected alias after `as`")?)
        } else {
            None
        };
        self.consume_optional_semicolon();
        Ok(StmtKind::Import { path, alias })
    }

    fn parse_expression(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, Diagnostic> {
        let expr = self.parse_conditional()?;
        let op = match self.peek().kind {
            TokenKind::Assign => AssignOp::Set,
            TokenKind::PlusAssign => AssignOp::Update(BinaryOp::Add),
            TokenKind::MinusAssign => AssignOp::Update(BinaryOp::Sub),
            TokenKind::StarAssign => AssignOp::Update(BinaryOp::Mul),
            TokenKind::SlashAssign => AssignOp::Update(BinaryOp::Div),
            TokenKind::PercentAssign => AssignOp::Update(BinaryOp::Mod),
            _ => return Ok(expr),
        };
        let token = self.advance().clone();
        if !matches!(
            expr.kind,
            ExprKind::Variable(_) | ExprKind::Index { .. } | ExprKind::Member { .. }
        ) {
            return Err(self.error(&token, "invalid assignment target"));
        }
        let value = self.parse_assignment()?;
        Ok(Expr {
            location: token.location,
            kind: ExprKind::Assign {
                op,
                target: Box::new(expr),
                value: Box::new(value),
            },
        })
    }

    fn parse_conditional(&mut self) -> Result<Expr, Diagnostic> {
        let condition = self.parse_or()?;
        if !self.check(TokenKind::Question) {
            return Ok(condition);
        }
        let location = self.advance().location.clone();
        let then = self.parse_expression()?;
        self.consume(TokenKind::Colon, "expected `:` in conditional expression")?;
        let otherwise = self.parse_conditional()?;
        Ok(Expr {
            location,
            kind: ExprKind::Conditional {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
        })
    }

    fn parse_or(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_and()?;
        while self.check(TokenKind::DoublePipe) {
            let location = self.advance().location.clone();
            let right = self.parse_and()?;
            expr = binary(BinaryOp::Or, expr, right, location);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_equality()?;
        while self.check(TokenKind::DoubleAmpersand) {
            let location = self.advance().location.clone();
            let right = self.parse_equality()?;
            expr = binary(BinaryOp::And, expr, right, location);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_comparison()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqualEqual => BinaryOp::Equal,
                TokenKind::BangEqual => BinaryOp::NotEqual,
                _ => break,
            };
            let location = self.advance().location.clone();
            let right = self.parse_comparison()?;
            expr = binary(op, expr, right, location);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Less => BinaryOp::Less,
                TokenKind::LessEqual => BinaryOp::LessEqual,
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                TokenKind::Keyword(Keyword::In) => BinaryOp::In,
                _ => break,
            };
            let location = self.advance().location.clone();
            let right = self.parse_term()?;
            expr = binary(op, expr, right, location);
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_factor()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let location = self.advance().location.clone();
            let right = self.parse_factor()?;
            expr = binary(op, expr, right, location);
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let location = self.advance().location.clone();
            let right = self.parse_unary()?;
            expr = binary(op, expr, right, location);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        let op = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.parse_power(),
        };
        let location = self.advance().location.clone();
        let operand = self.parse_unary()?;
        Ok(Expr {
            location,
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
        })
    }

    /// `**` is right-associative and binds tighter than a unary prefix on its left.
    fn parse_power(&mut self) -> Result<Expr, Diagnostic> {
        let base = self.parse_call()?;
        if !self.check(TokenKind::StarStar) {
            return Ok(base);
        }
        let location = self.advance().location.clone();
        let exponent = self.parse_unary()?;
        Ok(binary(BinaryOp::Pow, base, exponent, location))
    }

    fn parse_call(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_primary()?;
        loop {
            // A `(` or `[` opening a new line starts a new statement.
            if self.check(TokenKind::LParen) && self.on_same_line() {
                let location = self.advance().location.clone();
                let args = self.nested(false, Self::parse_arguments)?;
                expr = Expr {
                    location,
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                };
            } else if self.check(TokenKind::LBracket) && self.on_same_line() {
                let location = self.advance().location.clone();
                expr = self.parse_index_or_slice(expr, location)?;
            } else if self.check(TokenKind::Dot)
                || (self.check(TokenKind::ColonColon) && !self.slice_bound)
            {
                let location = self.advance().location.clone();
                let name = self.consume_identifier("expected member name")?;
                expr = Expr {
                    location,
                    kind: ExprKind::Member {
                        target: Box::new(expr),
                        name,
                    },
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, Diagnostic> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "expected `)` after arguments")?;
        Ok(args)
    }

    /// Runs `parse` with `slice_bound` set to `in_bound`, restoring it afterwards.
    fn nested<T>(
        &mut self,
        in_bound: bool,
        parse: impl FnOnce(&mut Self) -> Result<T, Diagnostic>,
    ) -> Result<T, Diagnostic> {
        let saved = std::mem::replace(&mut self.slice_bound, in_bound);
        let result = parse(self);
        self.slice_bound = saved;
        result
    }

    fn parse_index_or_slice(&mut self, target: Expr, location: Location) -> Result<Expr, Diagnostic> {
        // `::` lexes as one token; here it stands for two colons around an
        // omitted upper bound.
        let lower = if self.check(TokenKind::Colon) || self.check(TokenKind::ColonColon) {
            None
        } else {
            let index = self.nested(true, Self::parse_expression)?;
            if self.matches(TokenKind::RBracket) {
                return Ok(Expr {
                    location,
                    kind: ExprKind::Index {
                        target: Box::new(target),
                        index: Box::new(index),
                    },
                });
            }
            Some(Box::new(index))
        };
        let (upper, stride) = if self.matches(TokenKind::ColonColon) {
            (None, self.parse_slice_part()?)
        } else {
            self.consume(TokenKind::Colon, "expected `:` or `]` in index expression")?;
            let upper = if self.check(TokenKind::Colon) {
                None
            } else {
                self.parse_slice_part()?
            };
            let stride = if self.matches(TokenKind::Colon) {
                self.parse_slice_part()?
            } else {
                None
            };
            (upper, stride)
        };
        self.consume(TokenKind::RBracket, "expected `]` after slice")?;
        Ok(Expr {
            location,
            kind: ExprKind::Slice {
                target: Box::new(target),
                lower,
                upper,
                stride,
            },
        })
    }

    fn parse_slice_part(&mut self) -> Result<Option<Box<Expr>>, Diagnostic> {
        if self.check(TokenKind::RBracket) {
            return Ok(None);
        }
        Ok(Some(Box::new(self.nested(false, Self::parse_expression)?)))
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let token = self.advance().clone();
        let kind = match &token.kind {
            TokenKind::Int => {
                let value = token
                    .lexeme
                    .parse::<i64>()
                    .map_err(|_| self.error(&token, "integer literal out of range"))?;
                ExprKind::Literal(Literal::Int(value))
            }
            TokenKind::Double => {
                let value = token
                    .lexeme
                    .parse::<f64>()
                    .map_err(|_| self.error(&token, "invalid floating-point literal"))?;
                ExprKind::Literal(Literal::Double(value))
            }
            TokenKind::String => ExprKind::Literal(Literal::Str(token.lexeme.clone())),
            TokenKind::Keyword(Keyword::True) => ExprKind::Literal(Literal::Bool(true)),
            TokenKind::Keyword(Keyword::False) => ExprKind::Literal(Literal::Bool(false)),
            TokenKind::Keyword(Keyword::Null) => ExprKind::Literal(Literal::Null),
            TokenKind::Identifier => ExprKind::Variable(token.lexeme.clone()),
            TokenKind::Keyword(Keyword::Fn) => {
                let decl = self.nested(false, |parser| parser.parse_function_decl(false))?;
                ExprKind::Function(Rc::new(decl))
            }
            TokenKind::LParen => {
                let inner = self.nested(false, Self::parse_expression)?;
                self.consume(TokenKind::RParen, "expected `)` after expression")?;
                return Ok(inner);
            }
            TokenKind::LBracket => ExprKind::List(self.nested(false, Self::parse_list_items)?),
            TokenKind::LBrace => self.nested(false, Self::parse_braced_literal)?,
            TokenKind::Eof => return Err(self.error(&token, "unexpected end of input")),
            _ => {
                return Err(self.error(
                    &token,
                    format!("unexpected token `{}` in expression", token.lexeme),
                ));
            }
        };
        Ok(Expr {
            kind,
            location: token.location,
        })
    }

    fn parse_list_items(&mut self) -> Result<Vec<Expr>, Diagnostic> {
        let mut items = Vec::new();
        if !self.check(TokenKind::RBracket) {
            loop {
                items.push(self.parse_expression()?);
                if !self.matches(TokenKind::Comma) || self.check(TokenKind::RBracket) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RBracket, "expected `]` after list items")?;
        Ok(items)
    }

    /// `{}` and `{k: v, ...}` are dicts, `{a, b}` is a set.
    fn parse_braced_literal(&mut self) -> Result<ExprKind, Diagnostic> {
        if self.matches(TokenKind::RBrace) {
            return Ok(ExprKind::Dict(Vec::new()));
        }
        let first = self.parse_expression()?;
        if self.matches(TokenKind::Colon) {
            let mut entries = vec![(first, self.parse_expression()?)];
            while self.matches(TokenKind::Comma) && !self.check(TokenKind::RBrace) {
                let key = self.parse_expression()?;
                self.consume(TokenKind::Colon, "expected `:` between dict key and value")?;
                entries.push((key, self.parse_expression()?));
            }
            self.consume(TokenKind::RBrace, "expected `}` after dict entries")?;
            Ok(ExprKind::Dict(entries))
        } else {
            let mut items = vec![first];
            while self.matches(TokenKind::Comma) && !self.check(TokenKind::RBrace) {
                items.push(self.parse_expression()?);
            }
            self.consume(TokenKind::RBrace, "expected `}` after set items")?;
            Ok(ExprKind::Set(items))
        }
    }

    fn parse_type_expr(&mut self) -> Result<TypeExpr, Diagnostic> {
        let first = self.parse_type_atom()?;
        if !self.check(TokenKind::Pipe) {
            return Ok(first);
        }
        let mut members = vec![first];
        while self.matches(TokenKind::Pipe) {
            members.push(self.parse_type_atom()?);
        }
        Ok(TypeExpr::Union(members))
    }

    fn parse_type_atom(&mut self) -> Result<TypeExpr, Diagnostic> {
        if self.matches_keyword(Keyword::Null) {
            return Ok(TypeExpr::Null);
        }
        if self.matches_keyword(Keyword::Fn) {
            let params = if self.matches(TokenKind::LParen) {
                let mut params = Vec::new();
                if !self.check(TokenKind::RParen) {
                    loop {
                        params.push(self.parse_type_expr()?);
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.consume(TokenKind::RParen, "expected `)` in function type")?;
                Some(params)
            } else {
                None
            };
            let ret = if self.matches(TokenKind::Arrow) {
                Some(Box::new(self.parse_type_atom()?))
            } else {
                None
            };
            return Ok(TypeExpr::Function { params, ret });
        }
        if self.matches_keyword(Keyword::Type) {
            return Ok(TypeExpr::Named {
                name: "type".to_string(),
                args: Vec::new(),
            });
        }
        let name = self.consume_identifier("expected type name")?;
        let mut args = Vec::new();
        if self.matches(TokenKind::Less) {
            loop {
                args.push(self.parse_type_expr()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
            self.consume(TokenKind::Greater, "expected `>` to close type arguments")?;
        }
        Ok(TypeExpr::Named { name, args })
    }

    fn consume_optional_semicolon(&mut self) {
        self.matches(TokenKind::Semicolon);
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn matches_keyword(&mut self, keyword: Keyword) -> bool {
        self.matches(TokenKind::Keyword(keyword))
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<&Token, Diagnostic> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(self.peek(), message))
        }
    }

    fn consume_keyword(&mut self, keyword: Keyword, message: &str) -> Result<&Token, Diagnostic> {
        self.consume(TokenKind::Keyword(keyword), message)
    }

    fn consume_identifier(&mut self, message: &str) -> Result<String, Diagnostic> {
        Ok(self.consume(TokenKind::Identifier, message)?.lexeme.clone())
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        self.check(TokenKind::Keyword(keyword))
    }

    fn peek_next_is(&self, kind: TokenKind) -> bool {
        self.tokens
            .get(self.current + 1)
            .is_some_and(|tok| tok.kind == kind)
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn on_same_line(&self) -> bool {
        self.peek().location.line == self.previous().location.line
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn error(&self, token: &Token, message: impl Into<String>) -> Diagnostic {
        let mut message = message.into();
        if token.kind == TokenKind::Eof {
            message.push_str(" (found end of input)");
        } else if !message.contains('`') {
            message.push_str(&format!(" (found `{}`)", token.lexeme));
        }
        Diagnostic::syntax_error(message, token.location.clone())
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr, location: Location) -> Expr {
    Expr {
        location,
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorKind;

    fn parse(source: &str) -> Program {
        parse_program(source, "<test>").expect("parse should succeed")
    }

    fn single_expr(source: &str) -> Expr {
        match parse(source).statements.remove(0).kind {
            StmtKind::Expr(expr) => expr,
            other => panic!("expected expression statement, found {other:?}"),
        }
    }

    #[test]
    fn respects_precedence() {
        let expr = single_expr("1 + 2 * 3 == 7 && !false;");
        assert_eq!(expr.to_string(), "(((1 + (2 * 3)) == 7) && (!false))");
    }

    #[test]
    fn power_is_right_associative_and_binds_tighter_than_negation() {
        assert_eq!(single_expr("-2 ** 3 ** 2").to_string(), "(-(2 ** (3 ** 2)))");
    }

    #[test]
    fn chains_member_index_and_call_left_to_right() {
        let expr = single_expr("a.b[0](x)");
        match expr.kind {
            ExprKind::Call { callee, .. } => match callee.kind {
                ExprKind::Index { target, .. } => {
                    assert!(matches!(target.kind, ExprKind::Member { .. }));
                }
                other => panic!("expected index, found {other:?}"),
            },
            other => panic!("expected call, found {other:?}"),
        }
    }

    #[test]
    fn parses_slices_with_optional_parts() {
        match single_expr("xs[::-1]").kind {
            ExprKind::Slice {
                lower,
                upper,
                stride,
                ..
            } => {
                assert!(lower.is_none());
                assert!(upper.is_none());
                assert!(stride.is_some());
            }
            other => panic!("expected slice, found {other:?}"),
        }
        assert_eq!(single_expr("xs[1:]").to_string(), "xs[1:]");
        assert_eq!(single_expr("xs[:n:2]").to_string(), "xs[:n:2]");
        assert_eq!(single_expr("xs[1::2]").to_string(), "xs[1::2]");
        assert_eq!(single_expr("xs[i::step]").to_string(), "xs[i::step]");
        assert_eq!(single_expr("xs[::-1]").to_string(), "xs[::(-1)]");
        assert_eq!(
            single_expr("xs[f(m::k)::2]").to_string(),
            "xs[f(m.k)::2]"
        );
    }

    #[test]
    fn block_statements_accept_a_trailing_semicolon() {
        let program = parse("fn f() {};\n{ 1 };;\ntype T { x = 1; fn g() {}; };");
        assert_eq!(program.statements.len(), 3);
    }

    #[test]
    fn distinguishes_dict_and_set_literals() {
        assert!(matches!(single_expr("({})").kind, ExprKind::Dict(ref e) if e.is_empty()));
        assert!(matches!(single_expr("({1: 2})").kind, ExprKind::Dict(_)));
        assert!(matches!(single_expr("({1, 2})").kind, ExprKind::Set(_)));
    }

    #[test]
    fn parses_compound_type_annotations() {
        let ty = parse_type("dict<str, list<int | null>>").expect("type");
        assert_eq!(ty.to_string(), "dict<str, list<int | null>>");
        let ty = parse_type("fn(int, str) -> bool").expect("type");
        assert_eq!(ty.to_string(), "fn(int, str) -> bool");
    }

    #[test]
    fn rejects_break_outside_loop() {
        let err = parse_program("fn f() { break; }", "<test>").expect_err("break outside loop");
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert!(parse_program("while true { fn() { continue; }; }", "<test>").is_err());
        assert!(parse_program("while true { if x { break; } }", "<test>").is_ok());
    }

    #[test]
    fn bracket_on_a_new_line_starts_a_statement() {
        let program = parse("f()\n[1, 2]\n(3)");
        assert_eq!(program.statements.len(), 3);
        assert_eq!(single_expr("f(1)[0]").to_string(), "f(1)[0]");
        assert_eq!(single_expr("xs\n    .len()").to_string(), "xs.len()");
    }

    #[test]
    fn rejects_invalid_assignment_target() {
        let err = parse_program("f() = 1;", "<test>").expect_err("invalid target");
        assert!(err.message.contains("invalid assignment target"));
    }

    #[test]
    fn reports_position_of_first_error() {
        let err = parse_program("let x = 1;\nlet = 2;", "main.ks").expect_err("missing name");
        let location = err.location.expect("location");
        assert_eq!((location.line, location.column), (2, 5));
        assert_eq!(&*location.file, "main.ks");
    }

    #[test]
    fn printed_program_reparses_to_identical_tree() {
        let source = r#"
            import os::path as p;
            import "lib/util";
            let const limit: int = 10;
            let xs: list<int> = [1, 2, 3];
            fn add(a: int, b = 2) -> int { return a + b; }
            type Point {
                x: double = 0.0;
                const label = "p";
                fn construct(x) { this.x = x; }
                fn norm() { x < 0 ? -x : x }
            }
            let f = fn(v) => v * 2;
            for i in range(0, 3) { if i == 1 { continue; } else if i > 1 { break; } }
            while false { xs[0] += 1; }
            try { throw value_error("bad\n"); } catch (e: value_error | key_error) { e.message; }
            { let s = {1, 2}; let d = {"a": [1.5, 2e10], "b": null}; xs[1:2:1]; }
            x = y = !z in w;
        "#;
        let first = parse(source);
        let printed = first.to_string();
        let second = parse_program(&printed, "<printed>").expect("printed program parses");
        assert_eq!(first, second, "printed form:\n{printed}");
    }
}
