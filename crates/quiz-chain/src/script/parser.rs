//! Recursive descent parser producing the statement list of a script.

use super::ast::{BinOp, CmpOp, CompClause, Const, Expr, Stmt, StmtKind, Target, UnaryOp};
use super::lexer::{Spanned, Token};
use super::{ScriptError, ScriptResult};

/// Deepest nesting of expressions and blocks accepted. Parsing and
/// evaluating a script at this depth fits a 2 MiB thread stack in debug
/// builds.
pub const MAX_DEPTH: usize = 64;

static EOF: Token = Token::Eof;

const AUGMENTED: &[(&str, BinOp)] = &[
    ("+=", BinOp::Add),
    ("-=", BinOp::Sub),
    ("*=", BinOp::Mul),
    ("/=", BinOp::Div),
    ("//=", BinOp::FloorDiv),
    ("%=", BinOp::Mod),
];

pub fn parse(tokens: &[Spanned]) -> ScriptResult<Vec<Stmt>> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };

    let mut program = Vec::new();
    loop {
        match parser.peek() {
            Token::Eof => break,
            Token::Newline => parser.advance(),
            _ => program.push(parser.statement()?),
        }
    }
    Ok(program)
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    depth: usize,
}

fn describe(token: &Token) -> String {
    match token {
        Token::Int(n) => n.to_string(),
        Token::Float(f) => f.to_string(),
        Token::Str(_) => "string literal".to_string(),
        Token::Ident(name) => format!("'{name}'"),
        Token::Keyword(kw) => format!("'{kw}'"),
        Token::Op(op) => format!("'{op}'"),
        Token::Newline => "end of line".to_string(),
        Token::Indent => "unexpected indent".to_string(),
        Token::Dedent => "dedent".to_string(),
        Token::Eof => "end of script".to_string(),
    }
}

impl<'a> Parser<'a> {
    // ── Token helpers ──

    fn peek(&self) -> &'a Token {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> &'a Token {
        let tokens = self.tokens;
        tokens
            .get(self.pos + ahead)
            .or_else(|| tokens.last())
            .map(|s| &s.token)
            .unwrap_or(&EOF)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax {
            line: self.line(),
            message: message.into(),
        }
    }

    fn unexpected(&self, wanted: &str) -> ScriptError {
        self.error(format!("expected {wanted}, found {}", describe(self.peek())))
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(self.peek(), Token::Op(o) if *o == op)
    }

    fn is_kw(&self, kw: &str) -> bool {
        matches!(self.peek(), Token::Keyword(k) if *k == kw)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        let hit = self.is_op(op);
        if hit {
            self.advance();
        }
        hit
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        let hit = self.is_kw(kw);
        if hit {
            self.advance();
        }
        hit
    }

    fn expect_op(&mut self, op: &str) -> ScriptResult<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{op}'")))
        }
    }

    fn expect_kw(&mut self, kw: &str) -> ScriptResult<()> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{kw}'")))
        }
    }

    fn enter(&mut self) -> ScriptResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("expression is nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Whether the current token closes an expression list.
    fn at_list_end(&self) -> bool {
        match self.peek() {
            Token::Newline | Token::Eof | Token::Dedent => true,
            Token::Op(op) => {
                matches!(*op, "=" | ")" | "]" | "}" | ":")
                    || AUGMENTED.iter().any(|(sym, _)| sym == op)
            }
            _ => false,
        }
    }

    // ── Statements ──

    fn statement(&mut self) -> ScriptResult<Stmt> {
        let line = self.line();
        let kind = match self.peek() {
            Token::Keyword("if") => self.if_statement()?,
            Token::Keyword("for") => self.for_statement()?,
            Token::Keyword("while") => {
                self.advance();
                let cond = self.expr()?;
                let body = self.block()?;
                StmtKind::While { cond, body }
            }
            Token::Indent => return Err(self.error("unexpected indent")),
            _ => {
                let stmt = self.simple_statement()?;
                self.end_of_statement()?;
                return Ok(stmt);
            }
        };
        Ok(Stmt { line, kind })
    }

    fn end_of_statement(&mut self) -> ScriptResult<()> {
        match self.peek() {
            Token::Newline => {
                self.advance();
                Ok(())
            }
            Token::Eof | Token::Dedent => Ok(()),
            _ => Err(self.unexpected("end of line")),
        }
    }

    /// Assignment, augmented assignment, expression or a one-word statement.
    fn simple_statement(&mut self) -> ScriptResult<Stmt> {
        let line = self.line();

        let kind = if self.eat_kw("break") {
            StmtKind::Break
        } else if self.eat_kw("continue") {
            StmtKind::Continue
        } else if self.eat_kw("pass") {
            StmtKind::Pass
        } else {
            let first = self.expr_list()?;

            if self.is_op("=") {
                let mut targets = vec![to_target(first).map_err(|m| self.error(m))?];
                self.advance();
                let mut value = self.expr_list()?;
                while self.eat_op("=") {
                    targets.push(to_target(value).map_err(|m| self.error(m))?);
                    value = self.expr_list()?;
                }
                StmtKind::Assign { targets, value }
            } else if let Some(&(_, op)) = AUGMENTED.iter().find(|(sym, _)| self.is_op(sym)) {
                self.advance();
                let target = match to_target(first).map_err(|m| self.error(m))? {
                    Target::Unpack(_) => {
                        return Err(self.error("augmented assignment needs a single target"))
                    }
                    t => t,
                };
                let value = self.expr_list()?;
                StmtKind::AugAssign { target, op, value }
            } else {
                StmtKind::Expr(first)
            }
        };

        Ok(Stmt { line, kind })
    }

    /// `':'` followed by an indented block, or by one simple statement.
    fn block(&mut self) -> ScriptResult<Vec<Stmt>> {
        self.expect_op(":")?;

        if !matches!(self.peek(), Token::Newline) {
            let stmt = self.simple_statement()?;
            self.end_of_statement()?;
            return Ok(vec![stmt]);
        }
        self.enter()?;
        self.advance();

        if !matches!(self.peek(), Token::Indent) {
            return Err(self.error("expected an indented block"));
        }
        self.advance();

        let mut body = Vec::new();
        loop {
            match self.peek() {
                Token::Dedent => {
                    self.advance();
                    break;
                }
                Token::Eof => break,
                Token::Newline => self.advance(),
                _ => body.push(self.statement()?),
            }
        }
        self.leave();
        Ok(body)
    }

    fn if_statement(&mut self) -> ScriptResult<StmtKind> {
        self.expect_kw("if")?;
        let mut branches = Vec::new();
        let cond = self.expr()?;
        branches.push((cond, self.block()?));

        let mut orelse = Vec::new();
        loop {
            if self.eat_kw("elif") {
                let cond = self.expr()?;
                branches.push((cond, self.block()?));
            } else if self.eat_kw("else") {
                orelse = self.block()?;
                break;
            } else {
                break;
            }
        }
        Ok(StmtKind::If { branches, orelse })
    }

    fn for_statement(&mut self) -> ScriptResult<StmtKind> {
        self.expect_kw("for")?;
        let target = self.target_list()?;
        self.expect_kw("in")?;
        let iter = self.expr_list()?;
        let body = self.block()?;
        Ok(StmtKind::For { target, iter, body })
    }

    /// Loop targets: names, optionally comma separated and parenthesised.
    fn target_list(&mut self) -> ScriptResult<Target> {
        let first = self.target_atom()?;
        if !self.is_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.is_kw("in") || self.is_op(")") || self.is_op("]") {
                break;
            }
            items.push(self.target_atom()?);
        }
        Ok(Target::Unpack(items))
    }

    fn target_atom(&mut self) -> ScriptResult<Target> {
        match self.peek() {
            Token::Ident(name) => {
                self.advance();
                Ok(Target::Name(name.clone()))
            }
            Token::Op(open @ ("(" | "[")) => {
                let close = if *open == "(" { ")" } else { "]" };
                self.advance();
                let inner = self.target_list()?;
                self.expect_op(close)?;
                Ok(inner)
            }
            _ => Err(self.unexpected("a loop variable")),
        }
    }

    // ── Expressions ──

    /// One expression, or a bare comma list which becomes a list.
    fn expr_list(&mut self) -> ScriptResult<Expr> {
        let first = self.expr()?;
        if !self.is_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_list_end() {
                break;
            }
            items.push(self.expr()?);
        }
        Ok(Expr::List(items))
    }

    fn expr(&mut self) -> ScriptResult<Expr> {
        self.enter()?;
        let value = self.or_expr()?;
        let result = if self.eat_kw("if") {
            let cond = self.or_expr()?;
            self.expect_kw("else")?;
            let otherwise = self.expr()?;
            Expr::IfElse {
                cond: Box::new(cond),
                then: Box::new(value),
                otherwise: Box::new(otherwise),
            }
        } else {
            value
        };
        self.leave();
        Ok(result)
    }

    fn or_expr(&mut self) -> ScriptResult<Expr> {
        let mark = self.depth;
        let mut left = self.and_expr()?;
        while self.eat_kw("or") {
            self.enter()?;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth = mark;
        Ok(left)
    }

    fn and_expr(&mut self) -> ScriptResult<Expr> {
        let mark = self.depth;
        let mut left = self.not_expr()?;
        while self.eat_kw("and") {
            self.enter()?;
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth = mark;
        Ok(left)
    }

    fn not_expr(&mut self) -> ScriptResult<Expr> {
        if self.eat_kw("not") {
            self.enter()?;
            let inner = self.not_expr()?;
            self.leave();
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> ScriptResult<Expr> {
        let left = self.arith()?;
        let mut links = Vec::new();

        loop {
            let op = match self.peek() {
                Token::Op("==") => CmpOp::Eq,
                Token::Op("!=") => CmpOp::Ne,
                Token::Op("<") => CmpOp::Lt,
                Token::Op("<=") => CmpOp::Le,
                Token::Op(">") => CmpOp::Gt,
                Token::Op(">=") => CmpOp::Ge,
                Token::Keyword("in") => CmpOp::In,
                Token::Keyword("not") if matches!(self.peek_at(1), Token::Keyword("in")) => {
                    self.advance();
                    CmpOp::NotIn
                }
                // `is` compares by value.
                Token::Keyword("is") => {
                    self.advance();
                    let op = if self.eat_kw("not") { CmpOp::Ne } else { CmpOp::Eq };
                    links.push((op, self.arith()?));
                    continue;
                }
                _ => break,
            };
            self.advance();
            links.push((op, self.arith()?));
        }

        if links.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare(Box::new(left), links))
        }
    }

    fn arith(&mut self) -> ScriptResult<Expr> {
        let mark = self.depth;
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Token::Op("+") => BinOp::Add,
                Token::Op("-") => BinOp::Sub,
                _ => break,
            };
            self.advance();
            self.enter()?;
            let right = self.term()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        self.depth = mark;
        Ok(left)
    }

    fn term(&mut self) -> ScriptResult<Expr> {
        let mark = self.depth;
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Op("*") => BinOp::Mul,
                Token::Op("/") => BinOp::Div,
                Token::Op("//") => BinOp::FloorDiv,
                Token::Op("%") => BinOp::Mod,
                _ => break,
            };
            self.advance();
            self.enter()?;
            let right = self.unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        self.depth = mark;
        Ok(left)
    }

    fn unary(&mut self) -> ScriptResult<Expr> {
        let op = match self.peek() {
            Token::Op("-") => UnaryOp::Neg,
            Token::Op("+") => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.advance();
        self.enter()?;
        let operand = self.unary()?;
        self.leave();
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn power(&mut self) -> ScriptResult<Expr> {
        let base = self.postfix()?;
        if self.eat_op("**") {
            self.enter()?;
            let exponent = self.unary()?;
            self.leave();
            return Ok(Expr::Binary(Box::new(base), BinOp::Pow, Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> ScriptResult<Expr> {
        let mark = self.depth;
        let mut expr = self.atom()?;
        loop {
            if matches!(self.peek(), Token::Op("(" | "[" | ".")) {
                self.enter()?;
            }
            if self.eat_op("(") {
                expr = self.call(expr)?;
            } else if self.eat_op("[") {
                expr = self.subscript(expr)?;
            } else if self.eat_op(".") {
                let name = match self.peek() {
                    Token::Ident(name) => name.clone(),
                    _ => return Err(self.unexpected("an attribute name")),
                };
                self.advance();
                expr = Expr::Attribute {
                    object: Box::new(expr),
                    name,
                };
            } else {
                self.depth = mark;
                return Ok(expr);
            }
        }
    }

    /// Arguments after `(`, including a lone generator argument.
    fn call(&mut self, func: Expr) -> ScriptResult<Expr> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();

        while !self.is_op(")") {
            if let (Token::Ident(name), Token::Op("=")) = (self.peek(), self.peek_at(1)) {
                self.advance();
                self.advance();
                if kwargs.iter().any(|(k, _)| k == name) {
                    return Err(self.error(format!("keyword argument '{name}' repeated")));
                }
                kwargs.push((name.clone(), self.expr()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                let arg = self.expr()?;
                if self.is_kw("for") {
                    let clauses = self.comp_clauses()?;
                    args.push(Expr::ListComp {
                        element: Box::new(arg),
                        clauses,
                    });
                } else {
                    args.push(arg);
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;

        Ok(Expr::Call {
            func: Box::new(func),
            args,
            kwargs,
        })
    }

    /// Index or slice after `[`.
    fn subscript(&mut self, object: Expr) -> ScriptResult<Expr> {
        let lower = if self.is_op(":") {
            None
        } else {
            let index = self.expr()?;
            if !self.is_op(":") {
                self.expect_op("]")?;
                return Ok(Expr::Index {
                    object: Box::new(object),
                    index: Box::new(index),
                });
            }
            Some(Box::new(index))
        };

        self.expect_op(":")?;
        let upper = if self.is_op(":") || self.is_op("]") {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        let step = if self.eat_op(":") && !self.is_op("]") {
            Some(Box::new(self.expr()?))
        } else {
            None
        };
        self.expect_op("]")?;

        Ok(Expr::Slice {
            object: Box::new(object),
            lower,
            upper,
            step,
        })
    }

    fn comp_clauses(&mut self) -> ScriptResult<Vec<CompClause>> {
        let mut clauses = Vec::new();
        loop {
            if self.eat_kw("for") {
                let target = self.target_list()?;
                self.expect_kw("in")?;
                let iter = self.or_expr()?;
                clauses.push(CompClause::For { target, iter });
            } else if self.eat_kw("if") {
                clauses.push(CompClause::If(self.or_expr()?));
            } else {
                return Ok(clauses);
            }
        }
    }

    fn atom(&mut self) -> ScriptResult<Expr> {
        let token = self.peek();
        let expr = match token {
            Token::Int(n) => Expr::Const(Const::Int(*n)),
            Token::Float(f) => Expr::Const(Const::Float(*f)),
            Token::Str(s) => {
                let mut text = s.clone();
                self.advance();
                // Adjacent literals concatenate.
                while let Token::Str(more) = self.peek() {
                    text.push_str(more);
                    self.advance();
                }
                return Ok(Expr::Const(Const::Str(text)));
            }
            Token::Keyword("True") => Expr::Const(Const::Bool(true)),
            Token::Keyword("False") => Expr::Const(Const::Bool(false)),
            Token::Keyword("None") => Expr::Const(Const::None),
            Token::Ident(name) => Expr::Name(name.clone()),
            Token::Op("(") => {
                self.advance();
                return self.paren();
            }
            Token::Op("[") => {
                self.advance();
                return self.list_display();
            }
            Token::Op("{") => {
                self.advance();
                return self.dict_display();
            }
            _ => return Err(self.unexpected("an expression")),
        };
        self.advance();
        Ok(expr)
    }

    /// After `(`: grouping, tuple or generator.
    fn paren(&mut self) -> ScriptResult<Expr> {
        if self.eat_op(")") {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.expr()?;
        if self.is_kw("for") {
            let clauses = self.comp_clauses()?;
            self.expect_op(")")?;
            return Ok(Expr::ListComp {
                element: Box::new(first),
                clauses,
            });
        }
        if !self.is_op(",") {
            self.expect_op(")")?;
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.is_op(")") {
                break;
            }
            items.push(self.expr()?);
        }
        self.expect_op(")")?;
        Ok(Expr::List(items))
    }

    /// After `[`: list literal or list comprehension.
    fn list_display(&mut self) -> ScriptResult<Expr> {
        if self.eat_op("]") {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.expr()?;
        if self.is_kw("for") {
            let clauses = self.comp_clauses()?;
            self.expect_op("]")?;
            return Ok(Expr::ListComp {
                element: Box::new(first),
                clauses,
            });
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.is_op("]") {
                break;
            }
            items.push(self.expr()?);
        }
        self.expect_op("]")?;
        Ok(Expr::List(items))
    }

    /// After `{`: dict literal or dict comprehension.
    fn dict_display(&mut self) -> ScriptResult<Expr> {
        if self.eat_op("}") {
            return Ok(Expr::Dict(Vec::new()));
        }
        let key = self.expr()?;
        if !self.eat_op(":") {
            return Err(self.error("set literals are not supported; use a list or a dict"));
        }
        let value = self.expr()?;
        if self.is_kw("for") {
            let clauses = self.comp_clauses()?;
            self.expect_op("}")?;
            return Ok(Expr::DictComp {
                key: Box::new(key),
                value: Box::new(value),
                clauses,
            });
        }

        let mut pairs = vec![(key, value)];
        while self.eat_op(",") {
            if self.is_op("}") {
                break;
            }
            let k = self.expr()?;
            self.expect_op(":")?;
            let v = self.expr()?;
            pairs.push((k, v));
        }
        self.expect_op("}")?;
        Ok(Expr::Dict(pairs))
    }
}

fn to_target(expr: Expr) -> Result<Target, String> {
    match expr {
        Expr::Name(name) => Ok(Target::Name(name)),
        Expr::Index { object, index } => Ok(Target::Index {
            object: *object,
            index: *index,
        }),
        Expr::List(items) => items
            .into_iter()
            .map(to_target)
            .collect::<Result<Vec<_>, _>>()
            .map(Target::Unpack),
        Expr::Attribute { name, .. } => Err(format!("cannot assign to attribute '{name}'")),
        _ => Err("cannot assign to this expression".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::lexer::tokenize;

    fn program(source: &str) -> Vec<Stmt> {
        parse(&tokenize(source).unwrap()).unwrap()
    }

    fn single_expr(source: &str) -> Expr {
        match program(source).remove(0).kind {
            StmtKind::Expr(e) => e,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    fn syntax_error(source: &str) -> String {
        match tokenize(source).and_then(|t| parse(&t)) {
            Err(e) => e.to_string(),
            Ok(p) => panic!("expected syntax error, parsed {p:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        let e = single_expr("1 + 2 * 3");
        assert_eq!(
            e,
            Expr::Binary(
                Box::new(Expr::Const(Const::Int(1))),
                BinOp::Add,
                Box::new(Expr::Binary(
                    Box::new(Expr::Const(Const::Int(2))),
                    BinOp::Mul,
                    Box::new(Expr::Const(Const::Int(3))),
                )),
            )
        );
    }

    #[test]
    fn test_unary_binds_looser_than_power() {
        let e = single_expr("-2 ** 2");
        assert!(matches!(e, Expr::Unary(UnaryOp::Neg, ref inner)
            if matches!(**inner, Expr::Binary(_, BinOp::Pow, _))));
    }

    #[test]
    fn test_chained_comparison_and_not_in() {
        let e = single_expr("0 < x <= 10 and y not in z");
        let Expr::And(left, right) = e else {
            panic!("expected and");
        };
        assert!(matches!(*left, Expr::Compare(_, ref links) if links.len() == 2));
        assert!(matches!(*right, Expr::Compare(_, ref links) if links[0].0 == CmpOp::NotIn));
    }

    #[test]
    fn test_is_none() {
        let e = single_expr("x is not None");
        assert!(matches!(e, Expr::Compare(_, ref links) if links[0].0 == CmpOp::Ne));
        let e = single_expr("x is None");
        assert!(matches!(e, Expr::Compare(_, ref links) if links[0].0 == CmpOp::Eq));
    }

    #[test]
    fn test_if_elif_else() {
        let stmts = program("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\ny = x\n");
        assert_eq!(stmts.len(), 2);
        let StmtKind::If { branches, orelse } = &stmts[0].kind else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(orelse.len(), 1);
        assert_eq!(stmts[1].line, 7);
    }

    #[test]
    fn test_for_with_unpacking() {
        let stmts = program("for k, v in d.items():\n    total += v\n");
        let StmtKind::For { target, .. } = &stmts[0].kind else {
            panic!("expected for");
        };
        assert_eq!(target.names(), vec!["k", "v"]);
    }

    #[test]
    fn test_inline_block() {
        let stmts = program("if x: y = 1\n");
        let StmtKind::If { branches, .. } = &stmts[0].kind else {
            panic!("expected if");
        };
        assert_eq!(branches[0].1.len(), 1);
    }

    #[test]
    fn test_assignment_forms() {
        let stmts = program("a = b = 0\nrow[1] = 'x'\nx, y = 1, 2\nn //= 2\n");
        assert!(matches!(&stmts[0].kind, StmtKind::Assign { targets, .. } if targets.len() == 2));
        assert!(matches!(&stmts[1].kind, StmtKind::Assign { targets, .. }
            if matches!(targets[0], Target::Index { .. })));
        assert!(matches!(&stmts[2].kind, StmtKind::Assign { targets, value: Expr::List(v) }
            if matches!(targets[0], Target::Unpack(_)) && v.len() == 2));
        assert!(matches!(
            &stmts[3].kind,
            StmtKind::AugAssign { op: BinOp::FloorDiv, .. }
        ));
    }

    #[test]
    fn test_comprehensions_and_generator_argument() {
        let e = single_expr("sum(int(r[1]) for r in rows if r)");
        let Expr::Call { args, .. } = e else {
            panic!("expected call");
        };
        assert!(matches!(&args[0], Expr::ListComp { clauses, .. } if clauses.len() == 2));

        let e = single_expr("{k: v for k, v in pairs}");
        assert!(matches!(e, Expr::DictComp { .. }));
    }

    #[test]
    fn test_slices_and_kwargs() {
        let e = single_expr("rows[1:]");
        assert!(matches!(e, Expr::Slice { lower: Some(_), upper: None, step: None, .. }));
        let e = single_expr("s[::-1]");
        assert!(matches!(e, Expr::Slice { lower: None, upper: None, step: Some(_), .. }));
        let e = single_expr("csv.reader(t, delimiter=';')");
        assert!(matches!(e, Expr::Call { ref kwargs, .. } if kwargs[0].0 == "delimiter"));
    }

    #[test]
    fn test_ternary() {
        let e = single_expr("a if c else b");
        assert!(matches!(e, Expr::IfElse { .. }));
    }

    #[test]
    fn test_errors() {
        assert!(syntax_error("x = ").contains("expected an expression"));
        assert!(syntax_error("if x:\ny = 1").contains("indented block"));
        assert!(syntax_error("f(a=1, 2)").contains("positional argument"));
        assert!(syntax_error("{1, 2}").contains("set literals"));
        assert!(syntax_error("a.b = 1").contains("attribute"));
        assert!(syntax_error("1 = x").contains("cannot assign"));
        assert!(syntax_error("x = 1 2").contains("end of line"));
    }

    #[test]
    fn test_nesting_limit() {
        let source = format!("x = {}1{}", "(".repeat(100), ")".repeat(100));
        assert!(syntax_error(&source).contains("nested too deeply"));

        let source = format!("x = 1{}", " + 1".repeat(100));
        assert!(syntax_error(&source).contains("nested too deeply"));

        let source = format!("x = a{}", "[0]".repeat(100));
        assert!(syntax_error(&source).contains("nested too deeply"));

        program(&format!("x = 1{}", " + 1".repeat(50)));
    }
}
