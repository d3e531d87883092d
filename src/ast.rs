use std::{
    fmt::{self, Write},
    rc::Rc,
};

use crate::diagnostics::Location;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Double(f64),
    Str(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    In,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::In => "in",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

/// `=` or one of the compound assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Update(BinaryOp),
}

impl AssignOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Set => "=",
            AssignOp::Update(BinaryOp::Add) => "+=",
            AssignOp::Update(BinaryOp::Sub) => "-=",
            AssignOp::Update(BinaryOp::Mul) => "*=",
            AssignOp::Update(BinaryOp::Div) => "/=",
            AssignOp::Update(_) => "%=",
        }
    }
}

/// Syntactic shape of a type annotation. Names are resolved at evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Named { name: String, args: Vec<TypeExpr> },
    Null,
    Function {
        params: Option<Vec<TypeExpr>>,
        ret: Option<Box<TypeExpr>>,
    },
    Union(Vec<TypeExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub annotation: Option<TypeExpr>,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
    pub body: FunctionBody,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub constant: bool,
    pub annotation: Option<TypeExpr>,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<Rc<FunctionDecl>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub binding: String,
    pub kinds: Vec<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportPath {
    Module(Vec<String>),
    File(String),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: Location,
}

/// Nodes compare structurally; positions are ignored.
impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Variable(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        target: Box<Expr>,
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        stride: Option<Box<Expr>>,
    },
    Member {
        target: Box<Expr>,
        name: String,
    },
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Set(Vec<Expr>),
    Function(Rc<FunctionDecl>),
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub location: Location,
}

impl PartialEq for Stmt {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Let {
        name: String,
        constant: bool,
        annotation: Option<TypeExpr>,
        value: Option<Expr>,
    },
    Function(Rc<FunctionDecl>),
    Type(Rc<TypeDecl>),
    Expr(Expr),
    Block(Vec<Stmt>),
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    For {
        binding: String,
        annotation: Option<TypeExpr>,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Try {
        body: Vec<Stmt>,
        handlers: Vec<CatchClause>,
    },
    Throw(Expr),
    Import {
        path: ImportPath,
        alias: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct Program {
    pub file: Rc<str>,
    pub statements: Vec<Stmt>,
}

impl PartialEq for Program {
    fn eq(&self, other: &Self) -> bool {
        self.statements == other.statements
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Named { name, args } => {
                f.write_str(name)?;
                if !args.is_empty() {
                    f.write_char('<')?;
                    write_list(f, args)?;
                    f.write_char('>')?;
                }
                Ok(())
            }
            TypeExpr::Null => f.write_str("null"),
            TypeExpr::Function { params, ret } => {
                f.write_str("fn")?;
                if let Some(params) = params {
                    f.write_char('(')?;
                    write_list(f, params)?;
                    f.write_char(')')?;
                }
                if let Some(ret) = ret {
                    write!(f, " -> {ret}")?;
                }
                Ok(())
            }
            TypeExpr::Union(members) => {
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{member}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(n) => write!(f, "{n}"),
            Literal::Double(n) => write!(f, "{n:?}"),
            Literal::Str(s) => write_quoted(f, s),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Null => f.write_str("null"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(f, self, 0)
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_stmt(f, self, 0)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write_stmt(f, stmt, 0)?;
            f.write_char('\n')?;
        }
        Ok(())
    }
}

pub(crate) fn write_quoted(f: &mut impl Write, text: &str) -> fmt::Result {
    f.write_char('"')?;
    for ch in text.chars() {
        match ch {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            '\0' => f.write_str("\\0")?,
            c if c.is_control() => write!(f, "\\u{{{:x}}}", c as u32)?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_exprs(f: &mut fmt::Formatter<'_>, items: &[Expr], indent: usize) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write_expr(f, item, indent)?;
    }
    Ok(())
}

fn write_expr(f: &mut fmt::Formatter<'_>, expr: &Expr, indent: usize) -> fmt::Result {
    match &expr.kind {
        ExprKind::Literal(lit) => write!(f, "{lit}"),
        ExprKind::Variable(name) => f.write_str(name),
        ExprKind::Unary { op, operand } => {
            f.write_str(match op {
                UnaryOp::Negate => "(-",
                UnaryOp::Not => "(!",
            })?;
            write_expr(f, operand, indent)?;
            f.write_char(')')
        }
        ExprKind::Binary { op, left, right } => {
            f.write_char('(')?;
            write_expr(f, left, indent)?;
            write!(f, " {} ", op.symbol())?;
            write_expr(f, right, indent)?;
            f.write_char(')')
        }
        ExprKind::Conditional {
            condition,
            then,
            otherwise,
        } => {
            f.write_char('(')?;
            write_expr(f, condition, indent)?;
            f.write_str(" ? ")?;
            write_expr(f, then, indent)?;
            f.write_str(" : ")?;
            write_expr(f, otherwise, indent)?;
            f.write_char(')')
        }
        ExprKind::Assign { .. } => {
            f.write_char('(')?;
            write_assignment(f, expr, indent)?;
            f.write_char(')')
        }
        ExprKind::Call { callee, args } => {
            write_expr(f, callee, indent)?;
            f.write_char('(')?;
            write_exprs(f, args, indent)?;
            f.write_char(')')
        }
        ExprKind::Index { target, index } => {
            write_expr(f, target, indent)?;
            f.write_char('[')?;
            write_expr(f, index, indent)?;
            f.write_char(']')
        }
        ExprKind::Slice {
            target,
            lower,
            upper,
            stride,
        } => {
            write_expr(f, target, indent)?;
            f.write_char('[')?;
            if let Some(lower) = lower {
                write_expr(f, lower, indent)?;
            }
            f.write_char(':')?;
            if let Some(upper) = upper {
                write_expr(f, upper, indent)?;
            }
            if let Some(stride) = stride {
                f.write_char(':')?;
                write_expr(f, stride, indent)?;
            }
            f.write_char(']')
        }
        ExprKind::Member { target, name } => {
            write_expr(f, target, indent)?;
            write!(f, ".{name}")
        }
        ExprKind::List(items) => {
            f.write_char('[')?;
            write_exprs(f, items, indent)?;
            f.write_char(']')
        }
        ExprKind::Dict(entries) => {
            f.write_char('{')?;
            for (i, (key, value)) in entries.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_expr(f, key, indent)?;
                f.write_str(": ")?;
                write_expr(f, value, indent)?;
            }
            f.write_char('}')
        }
        ExprKind::Set(items) => {
            f.write_char('{')?;
            write_exprs(f, items, indent)?;
            f.write_char('}')
        }
        ExprKind::Function(decl) => {
            f.write_char('(')?;
            write_function(f, decl, indent)?;
            f.write_char(')')
        }
    }
}

fn write_assignment(f: &mut fmt::Formatter<'_>, expr: &Expr, indent: usize) -> fmt::Result {
    match &expr.kind {
        ExprKind::Assign { op, target, value } => {
            write_expr(f, target, indent)?;
            write!(f, " {} ", op.symbol())?;
            write_expr(f, value, indent)
        }
        _ => write_expr(f, expr, indent),
    }
}

fn write_params(f: &mut fmt::Formatter<'_>, params: &[Param], indent: usize) -> fmt::Result {
    f.write_char('(')?;
    for (i, param) in params.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        f.write_str(&param.name)?;
        if let Some(annotation) = &param.annotation {
            write!(f, ": {annotation}")?;
        }
        if let Some(default) = &param.default {
            f.write_str(" = ")?;
            write_expr(f, default, indent)?;
        }
    }
    f.write_char(')')
}

fn write_function(f: &mut fmt::Formatter<'_>, decl: &FunctionDecl, indent: usize) -> fmt::Result {
    f.write_str("fn")?;
    if let Some(name) = &decl.name {
        write!(f, " {name}")?;
    }
    write_params(f, &decl.params, indent)?;
    if let Some(ret) = &decl.ret {
        write!(f, " -> {ret}")?;
    }
    match &decl.body {
        FunctionBody::Block(body) => {
            f.write_char(' ')?;
            write_block(f, body, indent)
        }
        FunctionBody::Expr(expr) => {
            f.write_str(" => ")?;
            write_expr(f, expr, indent)
        }
    }
}

fn pad(f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    for _ in 0..indent {
        f.write_str("    ")?;
    }
    Ok(())
}

fn write_block(f: &mut fmt::Formatter<'_>, body: &[Stmt], indent: usize) -> fmt::Result {
    if body.is_empty() {
        return f.write_str("{}");
    }
    f.write_str("{\n")?;
    for stmt in body {
        pad(f, indent + 1)?;
        write_stmt(f, stmt, indent + 1)?;
        f.write_char('\n')?;
    }
    pad(f, indent)?;
    f.write_char('}')
}

fn write_stmt(f: &mut fmt::Formatter<'_>, stmt: &Stmt, indent: usize) -> fmt::Result {
    match &stmt.kind {
        StmtKind::Let {
            name,
            constant,
            annotation,
            value,
        } => {
            f.write_str(if *constant { "let const " } else { "let " })?;
            f.write_str(name)?;
            if let Some(annotation) = annotation {
                write!(f, ": {annotation}")?;
            }
            if let Some(value) = value {
                f.write_str(" = ")?;
                write_expr(f, value, indent)?;
            }
            f.write_char(';')
        }
        StmtKind::Function(decl) => write_function(f, decl, indent),
        StmtKind::Type(decl) => {
            writeln!(f, "type {} {{", decl.name)?;
            for field in &decl.fields {
                pad(f, indent + 1)?;
                if field.constant {
                    f.write_str("const ")?;
                }
                f.write_str(&field.name)?;
                if let Some(annotation) = &field.annotation {
                    write!(f, ": {annotation}")?;
                }
                if let Some(default) = &field.default {
                    f.write_str(" = ")?;
                    write_expr(f, default, indent + 1)?;
                }
                f.write_str(";\n")?;
            }
            for method in &decl.methods {
                pad(f, indent + 1)?;
                write_function(f, method, indent + 1)?;
                f.write_char('\n')?;
            }
            pad(f, indent)?;
            f.write_char('}')
        }
        StmtKind::Expr(expr) => {
            write_assignment(f, expr, indent)?;
            f.write_char(';')
        }
        StmtKind::Block(body) => write_block(f, body, indent),
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            f.write_str("if ")?;
            write_expr(f, condition, indent)?;
            f.write_char(' ')?;
            write_block(f, then_branch, indent)?;
            if let Some(else_branch) = else_branch {
                f.write_str(" else ")?;
                write_block(f, else_branch, indent)?;
            }
            Ok(())
        }
        StmtKind::While { condition, body } => {
            f.write_str("while ")?;
            write_expr(f, condition, indent)?;
            f.write_char(' ')?;
            write_block(f, body, indent)
        }
        StmtKind::For {
            binding,
            annotation,
            iterable,
            body,
        } => {
            write!(f, "for {binding}")?;
            if let Some(annotation) = annotation {
                write!(f, ": {annotation}")?;
            }
            f.write_str(" in ")?;
            write_expr(f, iterable, indent)?;
            f.write_char(' ')?;
            write_block(f, body, indent)
        }
        StmtKind::Return(value) => {
            f.write_str("return")?;
            if let Some(value) = value {
                f.write_char(' ')?;
                write_expr(f, value, indent)?;
            }
            f.write_char(';')
        }
        StmtKind::Break => f.write_str("break;"),
        StmtKind::Continue => f.write_str("continue;"),
        StmtKind::Try { body, handlers } => {
            f.write_str("try ")?;
            write_block(f, body, indent)?;
            for handler in handlers {
                write!(f, " catch ({}", handler.binding)?;
                if !handler.kinds.is_empty() {
                    write!(f, ": {}", handler.kinds.join(" | "))?;
                }
                f.write_str(") ")?;
                write_block(f, &handler.body, indent)?;
            }
            Ok(())
        }
        StmtKind::Throw(value) => {
            f.write_str("throw ")?;
            write_expr(f, value, indent)?;
            f.write_char(';')
        }
        StmtKind::Import { path, alias } => {
            f.write_str("import ")?;
            match path {
                ImportPath::Module(segments) => f.write_str(&segments.join("::"))?,
                ImportPath::File(file) => write_quoted(f, file)?,
            }
            if let Some(alias) = alias {
                write!(f, " as {alias}")?;
            }
            f.write_char(';')
        }
    }
}
