//! Recursive-descent parser from tokens to a [`Program`].

use std::collections::HashMap;

use super::ParseError;
use super::ast::*;
use super::lexer::{Keyword, Punct, Spanned, Token, tokenize};
use super::value::Value;

/// How deeply statements and expressions may nest, counting each link of an
/// operator or member chain as one level.
const MAX_DEPTH: usize = 128;

/// Parse rule source into a program.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        loop_depth: 0,
        depth: 0,
        in_function: false,
        functions: HashMap::new(),
    };

    let mut body = Vec::new();
    while !parser.at_eof() {
        if let Some(stmt) = parser.statement()? {
            body.push(stmt);
        }
    }

    Ok(Program {
        body,
        functions: parser.functions,
    })
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    loop_depth: usize,
    depth: usize,
    in_function: bool,
    functions: HashMap<String, Function>,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    // TOKEN HELPERS:

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].token
    }

    fn current(&self) -> &Spanned {
        &self.tokens[self.pos]
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn is_punct(&self, p: Punct) -> bool {
        *self.peek() == Token::Punct(p)
    }

    fn is_keyword(&self, k: Keyword) -> bool {
        *self.peek() == Token::Keyword(k)
    }

    fn eat_punct(&mut self, p: Punct) -> bool {
        if self.is_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let tok = self.current();
        ParseError {
            message: message.into(),
            line: tok.line,
            column: tok.column,
        }
    }

    fn expect_punct(&mut self, p: Punct, what: &str) -> PResult<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected {}, found {}", what, describe(self.peek()))))
        }
    }

    fn expect_ident(&mut self, what: &str) -> PResult<String> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error_here(format!("expected {}, found {}", what, describe(&other)))),
        }
    }

    /// Run `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: fn(&mut Self) -> PResult<T>) -> PResult<T> {
        self.deeper()?;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn deeper(&mut self) -> PResult<()> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error_here("expression nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    /// Whether the next token starts on a later line than the previous one.
    fn newline_before_current(&self) -> bool {
        self.pos > 0 && self.tokens[self.pos].line > self.tokens[self.pos - 1].line
    }

    // STATEMENTS:

    /// Parse one statement. Function declarations are hoisted and yield `None`.
    fn statement(&mut self) -> PResult<Option<Stmt>> {
        self.nested(Self::statement_at_depth)
    }

    fn statement_at_depth(&mut self) -> PResult<Option<Stmt>> {
        let stmt = match self.peek().clone() {
            Token::Punct(Punct::Semicolon) => {
                self.advance();
                return Ok(None);
            }
            Token::Keyword(Keyword::Function) => {
                self.function_declaration()?;
                return Ok(None);
            }
            Token::Punct(Punct::LBrace) => Stmt::Block(self.block()?),
            Token::Keyword(Keyword::Let | Keyword::Const | Keyword::Var) => {
                self.advance();
                let name = self.expect_ident("variable name")?;
                let init = if self.eat_punct(Punct::Assign) {
                    Some(self.expression()?)
                } else {
                    None
                };
                Stmt::Let { name, init }
            }
            Token::Keyword(Keyword::If) => self.if_statement()?,
            Token::Keyword(Keyword::While) => {
                self.advance();
                self.expect_punct(Punct::LParen, "'(' after while")?;
                let cond = self.expression()?;
                self.expect_punct(Punct::RParen, "')'")?;
                self.loop_depth += 1;
                let body = self.body();
                self.loop_depth -= 1;
                Stmt::While { cond, body: body? }
            }
            Token::Keyword(Keyword::Return) => {
                self.advance();
                let ends = self.is_punct(Punct::Semicolon)
                    || self.is_punct(Punct::RBrace)
                    || self.at_eof()
                    || self.newline_before_current();
                Stmt::Return(if ends { None } else { Some(self.expression()?) })
            }
            Token::Keyword(Keyword::Throw) => {
                self.advance();
                Stmt::Throw(self.expression()?)
            }
            Token::Keyword(k @ (Keyword::Break | Keyword::Continue)) => {
                if self.loop_depth == 0 {
                    return Err(self.error_here(format!(
                        "'{}' outside of a loop",
                        if k == Keyword::Break { "break" } else { "continue" }
                    )));
                }
                self.advance();
                if k == Keyword::Break { Stmt::Break } else { Stmt::Continue }
            }
            Token::Keyword(Keyword::Else) => return Err(self.error_here("'else' without 'if'")),
            _ => self.expression_statement()?,
        };

        self.eat_punct(Punct::Semicolon);
        Ok(Some(stmt))
    }

    fn block(&mut self) -> PResult<Block> {
        self.expect_punct(Punct::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.is_punct(Punct::RBrace) {
            if self.at_eof() {
                return Err(self.error_here("expected '}' before end of rule"));
            }
            if let Some(stmt) = self.statement()? {
                stmts.push(stmt);
            }
        }
        self.advance();
        Ok(stmts)
    }

    /// Body of `if`/`while`: a braced block or a single statement.
    fn body(&mut self) -> PResult<Block> {
        if self.is_punct(Punct::LBrace) {
            self.block()
        } else {
            Ok(self.statement()?.into_iter().collect())
        }
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        self.advance();
        self.expect_punct(Punct::LParen, "'(' after if")?;
        let cond = self.expression()?;
        self.expect_punct(Punct::RParen, "')'")?;
        let then_branch = self.body()?;

        let else_branch = if self.is_keyword(Keyword::Else) {
            self.advance();
            if self.is_keyword(Keyword::If) {
                Some(vec![self.if_statement()?])
            } else {
                Some(self.body()?)
            }
        } else {
            None
        };

        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn function_declaration(&mut self) -> PResult<()> {
        if self.in_function || self.loop_depth > 0 {
            return Err(self.error_here("functions may only be declared at the top level"));
        }
        self.advance();
        let name = self.expect_ident("function name")?;
        if self.functions.contains_key(&name) {
            return Err(self.error_here(format!("function '{}' is already declared", name)));
        }

        self.expect_punct(Punct::LParen, "'(' after function name")?;
        let mut params = Vec::new();
        if !self.is_punct(Punct::RParen) {
            loop {
                params.push(self.expect_ident("parameter name")?);
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RParen, "')'")?;

        self.in_function = true;
        let body = self.block();
        self.in_function = false;

        self.functions.insert(
            name.clone(),
            Function {
                name,
                params,
                body: body?,
            },
        );
        Ok(())
    }

    fn expression_statement(&mut self) -> PResult<Stmt> {
        let start = self.current().clone();
        let expr = self.expression()?;

        let op = match self.peek() {
            Token::Punct(Punct::Assign) => AssignOp::Set,
            Token::Punct(Punct::PlusAssign) => AssignOp::Add,
            Token::Punct(Punct::MinusAssign) => AssignOp::Sub,
            _ => return Ok(Stmt::Expr(expr)),
        };
        self.advance();

        let target = place_from(expr).ok_or_else(|| ParseError {
            message: "invalid assignment target".into(),
            line: start.line,
            column: start.column,
        })?;
        let value = self.expression()?;
        Ok(Stmt::Assign { target, op, value })
    }

    // EXPRESSIONS (lowest precedence first):

    fn expression(&mut self) -> PResult<Expr> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> PResult<Expr> {
        let cond = self.coalesce()?;
        if !self.eat_punct(Punct::Question) {
            return Ok(cond);
        }
        let then_expr = self.expression()?;
        self.expect_punct(Punct::Colon, "':' in conditional expression")?;
        let else_expr = self.expression()?;
        Ok(Expr::Conditional {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        })
    }

    fn coalesce(&mut self) -> PResult<Expr> {
        let mut lhs = self.or()?;
        let mut links = 0;
        while self.eat_punct(Punct::Coalesce) {
            self.deeper()?;
            links += 1;
            let rhs = self.or()?;
            lhs = logical(LogicalOp::Coalesce, lhs, rhs);
        }
        self.depth -= links;
        Ok(lhs)
    }

    fn or(&mut self) -> PResult<Expr> {
        let mut lhs = self.and()?;
        let mut links = 0;
        while self.eat_punct(Punct::Or) {
            self.deeper()?;
            links += 1;
            let rhs = self.and()?;
            lhs = logical(LogicalOp::Or, lhs, rhs);
        }
        self.depth -= links;
        Ok(lhs)
    }

    fn and(&mut self) -> PResult<Expr> {
        let mut lhs = self.equality()?;
        let mut links = 0;
        while self.eat_punct(Punct::And) {
            self.deeper()?;
            links += 1;
            let rhs = self.equality()?;
            lhs = logical(LogicalOp::And, lhs, rhs);
        }
        self.depth -= links;
        Ok(lhs)
    }

    fn equality(&mut self) -> PResult<Expr> {
        let mut lhs = self.relational()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Token::Punct(Punct::Eq | Punct::StrictEq) => BinaryOp::Eq,
                Token::Punct(Punct::NotEq | Punct::StrictNotEq) => BinaryOp::NotEq,
                _ => break,
            };
            self.advance();
            self.deeper()?;
            links += 1;
            let rhs = self.relational()?;
            lhs = binary(op, lhs, rhs);
        }
        self.depth -= links;
        Ok(lhs)
    }

    fn relational(&mut self) -> PResult<Expr> {
        let mut lhs = self.additive()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Token::Punct(Punct::Lt) => BinaryOp::Lt,
                Token::Punct(Punct::Le) => BinaryOp::Le,
                Token::Punct(Punct::Gt) => BinaryOp::Gt,
                Token::Punct(Punct::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.advance();
            self.deeper()?;
            links += 1;
            let rhs = self.additive()?;
            lhs = binary(op, lhs, rhs);
        }
        self.depth -= links;
        Ok(lhs)
    }

    fn additive(&mut self) -> PResult<Expr> {
        let mut lhs = self.multiplicative()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Token::Punct(Punct::Plus) => BinaryOp::Add,
                Token::Punct(Punct::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.deeper()?;
            links += 1;
            let rhs = self.multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
        self.depth -= links;
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> PResult<Expr> {
        let mut lhs = self.unary()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Token::Punct(Punct::Star) => BinaryOp::Mul,
                Token::Punct(Punct::Slash) => BinaryOp::Div,
                Token::Punct(Punct::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            self.deeper()?;
            links += 1;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
        self.depth -= links;
        Ok(lhs)
    }

    fn unary(&mut self) -> PResult<Expr> {
        let op = match self.peek() {
            Token::Punct(Punct::Bang) => UnaryOp::Not,
            Token::Punct(Punct::Minus) => UnaryOp::Neg,
            _ => return self.postfix(),
        };
        self.advance();
        let operand = self.nested(Self::unary)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        let mut optional_chain = false;
        let mut links = 0;

        loop {
            if matches!(self.peek(), Token::Punct(Punct::Dot | Punct::QuestionDot | Punct::LBracket | Punct::LParen)) {
                self.deeper()?;
                links += 1;
            }
            let optional = self.is_punct(Punct::QuestionDot);
            if optional {
                optional_chain = true;
                self.advance();
            }

            if optional || self.eat_punct(Punct::Dot) {
                // `a?.[i]` and `a?.(x)` are not supported; `?.` must name a member
                let property = self.expect_ident("property name")?;
                if self.is_punct(Punct::LParen) {
                    let args = self.arguments()?;
                    expr = Expr::Call {
                        callee: Callee::Method {
                            receiver: Box::new(expr),
                            name: property,
                            optional,
                        },
                        args,
                    };
                } else {
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                        optional,
                    };
                }
            } else if self.eat_punct(Punct::LBracket) {
                let index = self.expression()?;
                self.expect_punct(Punct::RBracket, "']'")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    optional: false,
                };
            } else if self.is_punct(Punct::LParen) {
                let Expr::Ident(name) = expr else {
                    return Err(self.error_here("only named functions can be called"));
                };
                let args = self.arguments()?;
                expr = Expr::Call {
                    callee: Callee::Function(name),
                    args,
                };
            } else {
                break;
            }
        }
        self.depth -= links;

        if optional_chain {
            expr = Expr::OptionalChain(Box::new(expr));
        }
        Ok(expr)
    }

    fn arguments(&mut self) -> PResult<Vec<Expr>> {
        self.expect_punct(Punct::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.is_punct(Punct::RParen) {
            loop {
                args.push(self.expression()?);
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RParen, "')' after arguments")?;
        Ok(args)
    }

    fn primary(&mut self) -> PResult<Expr> {
        let token = self.peek().clone();
        let expr = match token {
            Token::Number(n) => Expr::Literal(Value::Number(n)),
            Token::Str(s) => Expr::Literal(Value::Str(s)),
            Token::Ident(name) => Expr::Ident(name),
            Token::Keyword(Keyword::True) => Expr::Literal(Value::Bool(true)),
            Token::Keyword(Keyword::False) => Expr::Literal(Value::Bool(false)),
            Token::Keyword(Keyword::Null | Keyword::Undefined) => Expr::Literal(Value::Null),
            Token::Punct(Punct::LParen) => {
                self.advance();
                let inner = self.expression()?;
                self.expect_punct(Punct::RParen, "')'")?;
                return Ok(inner);
            }
            Token::Punct(Punct::LBracket) => return self.array_literal(),
            Token::Punct(Punct::LBrace) => return self.object_literal(),
            other => {
                return Err(self.error_here(format!("expected expression, found {}", describe(&other))));
            }
        };
        self.advance();
        Ok(expr)
    }

    fn array_literal(&mut self) -> PResult<Expr> {
        self.advance();
        let mut items = Vec::new();
        while !self.is_punct(Punct::RBracket) {
            items.push(self.expression()?);
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RBracket, "']'")?;
        Ok(Expr::Array(items))
    }

    fn object_literal(&mut self) -> PResult<Expr> {
        self.advance();
        let mut fields = Vec::new();
        while !self.is_punct(Punct::RBrace) {
            let key = match self.peek().clone() {
                Token::Ident(name) => name,
                Token::Str(s) => s,
                // Keywords are valid keys (`{ null: 1 }` is odd but legal)
                Token::Keyword(_) if *self.peek_at(1) == Token::Punct(Punct::Colon) => {
                    describe(self.peek()).trim_matches('\'').to_string()
                }
                other => {
                    return Err(self.error_here(format!("expected property name, found {}", describe(&other))));
                }
            };
            self.advance();
            self.expect_punct(Punct::Colon, "':' after property name")?;
            fields.push((key, self.expression()?));
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RBrace, "'}'")?;
        Ok(Expr::Object(fields))
    }
}

fn logical(op: LogicalOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Logical {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

/// Turn `a`, `a.b`, `a[i].c` into an assignable place.
fn place_from(expr: Expr) -> Option<Place> {
    match expr {
        Expr::Ident(root) => Some(Place {
            root,
            path: Vec::new(),
        }),
        Expr::Member {
            object,
            property,
            optional: false,
        } => {
            let mut place = place_from(*object)?;
            place.path.push(PathSegment::Field(property));
            Some(place)
        }
        Expr::Index {
            object,
            index,
            optional: false,
        } => {
            let mut place = place_from(*object)?;
            place.path.push(PathSegment::Index(*index));
            Some(place)
        }
        _ => None,
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(n) => format!("number {}", super::value::format_number(*n)),
        Token::Str(s) => format!("string '{}'", s),
        Token::Ident(name) => format!("'{}'", name),
        Token::Keyword(k) => format!("'{}'", format!("{:?}", k).to_lowercase()),
        Token::Punct(p) => format!("'{}'", punct_str(*p)),
        Token::Eof => "end of rule".to_string(),
    }
}

fn punct_str(p: Punct) -> &'static str {
    match p {
        Punct::LParen => "(",
        Punct::RParen => ")",
        Punct::LBrace => "{",
        Punct::RBrace => "}",
        Punct::LBracket => "[",
        Punct::RBracket => "]",
        Punct::Comma => ",",
        Punct::Semicolon => ";",
        Punct::Dot => ".",
        Punct::QuestionDot => "?.",
        Punct::Question => "?",
        Punct::Colon => ":",
        Punct::Plus => "+",
        Punct::Minus => "-",
        Punct::Star => "*",
        Punct::Slash => "/",
        Punct::Percent => "%",
        Punct::Bang => "!",
        Punct::Assign => "=",
        Punct::PlusAssign => "+=",
        Punct::MinusAssign => "-=",
        Punct::Eq => "==",
        Punct::NotEq => "!=",
        Punct::StrictEq => "===",
        Punct::StrictNotEq => "!==",
        Punct::Lt => "<",
        Punct::Le => "<=",
        Punct::Gt => ">",
        Punct::Ge => ">=",
        Punct::And => "&&",
        Punct::Or => "||",
        Punct::Coalesce => "??",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_expression_program() {
        let program = parse("startHour >= 9 && endHour <= 18").unwrap();
        assert_eq!(program.body.len(), 1);
        assert!(matches!(
            program.body[0],
            Stmt::Expr(Expr::Logical {
                op: LogicalOp::And,
                ..
            })
        ));
    }

    #[test]
    fn test_functions_are_hoisted() {
        let program = parse(
            "function isWeekend(event) {\n\
               const day = weekday(event.start);\n\
               return day === 0 || day === 6;\n\
             }\n\
             return !isWeekend(event);",
        )
        .unwrap();

        assert_eq!(program.body.len(), 1);
        let f = &program.functions["isWeekend"];
        assert_eq!(f.params, vec!["event".to_string()]);
        assert_eq!(f.body.len(), 2);
    }

    #[test]
    fn test_member_assignment_becomes_place() {
        let program = parse("event.title = '[WORK] ' + event.title;").unwrap();
        let Stmt::Assign { target, op, .. } = &program.body[0] else {
            panic!("expected assignment, got {:?}", program.body[0]);
        };
        assert_eq!(target.root, "event");
        assert_eq!(*op, AssignOp::Set);
        assert!(matches!(&target.path[..], [PathSegment::Field(f)] if f == "title"));
    }

    #[test]
    fn test_return_without_value_at_line_end() {
        let program = parse("if (x) {\n  return\n}\nfalse").unwrap();
        let Stmt::If { then_branch, .. } = &program.body[0] else {
            panic!("expected if");
        };
        assert!(matches!(then_branch[0], Stmt::Return(None)));
    }

    #[test]
    fn test_optional_chain_wraps_whole_chain() {
        let program = parse("event.description?.toLowerCase().includes('x')").unwrap();
        assert!(matches!(program.body[0], Stmt::Expr(Expr::OptionalChain(_))));
    }

    #[test]
    fn test_invalid_assignment_target() {
        let err = parse("startHour + 1 = 3").unwrap_err();
        assert_eq!(err.message, "invalid assignment target");
        assert_eq!((err.line, err.column), (1, 1));
    }

    #[test]
    fn test_break_outside_loop() {
        let err = parse("break;").unwrap_err();
        assert!(err.message.contains("outside of a loop"));
    }

    #[test]
    fn test_nested_function_rejected() {
        let err = parse("function a() { function b() {} }").unwrap_err();
        assert!(err.message.contains("top level"));
    }

    #[test]
    fn test_missing_paren_reports_position() {
        let err = parse("return (startHour >= 9").unwrap_err();
        assert_eq!(err.message, "expected ')', found end of rule");
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_deep_nesting_is_an_error_not_a_crash() {
        let parens = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        for source in [
            parens,
            "[".repeat(100_000),
            format!("x = {}", "{a:".repeat(100_000)),
            "!".repeat(100_000) + "x",
            "{".repeat(100_000),
            "if (x) ".repeat(100_000) + "y",
        ] {
            let err = parse(&source).unwrap_err();
            assert_eq!(err.message, "expression nested too deeply");
        }
    }

    #[test]
    fn test_long_chains_are_bounded() {
        let sum = vec!["1"; 10_000].join(" + ");
        assert_eq!(parse(&sum).unwrap_err().message, "expression nested too deeply");

        let members = format!("event{}", ".x".repeat(10_000));
        assert_eq!(parse(&members).unwrap_err().message, "expression nested too deeply");
    }

    #[test]
    fn test_ordinary_nesting_still_parses() {
        let nested = format!("{}true{}", "(".repeat(50), ")".repeat(50));
        assert!(parse(&nested).is_ok());
        assert!(parse(&vec!["1"; 50].join(" + ")).is_ok());
        assert!(parse("if (a) { if (b) { while (c) { x = [[1, 2], {k: [3]}]; break; } } }").is_ok());
    }
}
