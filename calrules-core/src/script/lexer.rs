//! Tokenizer for rule scripts, built on nom.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{is_not, tag, take_until, take_while},
    character::complete::{char, digit1, multispace1, one_of, satisfy},
    combinator::{map, opt, recognize, value},
    multi::many0,
    sequence::pair,
};

use super::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Keyword(Keyword),
    Punct(Punct),
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Function,
    Let,
    Const,
    Var,
    If,
    Else,
    While,
    Return,
    Throw,
    Break,
    Continue,
    True,
    False,
    Null,
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Dot,
    QuestionDot,
    Question,
    Colon,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Assign,
    PlusAssign,
    MinusAssign,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Coalesce,
}

/// A token with the 1-based line and column where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

fn keyword(word: &str) -> Option<Keyword> {
    Some(match word {
        "function" => Keyword::Function,
        "let" => Keyword::Let,
        "const" => Keyword::Const,
        "var" => Keyword::Var,
        "if" => Keyword::If,
        "else" => Keyword::Else,
        "while" => Keyword::While,
        "return" => Keyword::Return,
        "throw" => Keyword::Throw,
        "break" => Keyword::Break,
        "continue" => Keyword::Continue,
        "true" => Keyword::True,
        "false" => Keyword::False,
        "null" => Keyword::Null,
        "undefined" => Keyword::Undefined,
        _ => return None,
    })
}

fn line_comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(tag("//"), opt(is_not("\n")))).parse(input)
}

fn block_comment(input: &str) -> IResult<&str, &str> {
    recognize((tag("/*"), take_until("*/"), tag("*/"))).parse(input)
}

fn trivia(input: &str) -> IResult<&str, ()> {
    value((), many0(alt((multispace1, line_comment, block_comment)))).parse(input)
}

fn number(input: &str) -> IResult<&str, f64> {
    map(recognize(pair(digit1, opt(pair(char('.'), digit1)))), |s: &str| {
        s.parse::<f64>().unwrap_or(f64::NAN)
    })
    .parse(input)
}

fn word(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_alphabetic() || c == '_' || c == '$'),
        take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '$'),
    ))
    .parse(input)
}

fn long_punct(input: &str) -> IResult<&str, Punct> {
    alt((
        value(Punct::StrictEq, tag("===")),
        value(Punct::StrictNotEq, tag("!==")),
        value(Punct::Eq, tag("==")),
        value(Punct::NotEq, tag("!=")),
        value(Punct::Le, tag("<=")),
        value(Punct::Ge, tag(">=")),
        value(Punct::And, tag("&&")),
        value(Punct::Or, tag("||")),
        value(Punct::Coalesce, tag("??")),
        value(Punct::QuestionDot, tag("?.")),
        value(Punct::PlusAssign, tag("+=")),
        value(Punct::MinusAssign, tag("-=")),
    ))
    .parse(input)
}

fn short_punct(input: &str) -> IResult<&str, Punct> {
    map(one_of("(){}[],;.?:+-*/%!=<>"), |c| match c {
        '(' => Punct::LParen,
        ')' => Punct::RParen,
        '{' => Punct::LBrace,
        '}' => Punct::RBrace,
        '[' => Punct::LBracket,
        ']' => Punct::RBracket,
        ',' => Punct::Comma,
        ';' => Punct::Semicolon,
        '.' => Punct::Dot,
        '?' => Punct::Question,
        ':' => Punct::Colon,
        '+' => Punct::Plus,
        '-' => Punct::Minus,
        '*' => Punct::Star,
        '/' => Punct::Slash,
        '%' => Punct::Percent,
        '!' => Punct::Bang,
        '=' => Punct::Assign,
        '<' => Punct::Lt,
        _ => Punct::Gt,
    })
    .parse(input)
}

/// Scan a quoted string starting at `input` (which begins with the quote).
/// Returns the rest of the input and the unescaped content, or `None` if the
/// string is not closed on the same line.
fn string_literal(input: &str) -> Option<(&str, String)> {
    let mut chars = input.chars();
    let quote = chars.next()?;
    let mut out = String::new();

    loop {
        match chars.next()? {
            '\n' => return None,
            c if c == quote => return Some((chars.as_str(), out)),
            '\\' => out.push(match chars.next()? {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '0' => '\0',
                other => other,
            }),
            c => out.push(c),
        }
    }
}

struct Cursor {
    line: usize,
    column: usize,
}

impl Cursor {
    fn advance(&mut self, consumed: &str) {
        for c in consumed.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            line: self.line,
            column: self.column,
        }
    }
}

/// Split rule source into tokens. The last token is always [`Token::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ParseError> {
    let mut tokens = Vec::new();
    let mut cursor = Cursor { line: 1, column: 1 };
    let mut rest = source;

    loop {
        if let Ok((after, ())) = trivia(rest) {
            cursor.advance(&rest[..rest.len() - after.len()]);
            rest = after;
        }

        if rest.starts_with("/*") {
            return Err(cursor.error("unterminated block comment"));
        }

        let (line, column) = (cursor.line, cursor.column);
        let Some(first) = rest.chars().next() else {
            tokens.push(Spanned {
                token: Token::Eof,
                line,
                column,
            });
            return Ok(tokens);
        };

        let (after, token) = if first == '\'' || first == '"' {
            string_literal(rest)
                .map(|(after, s)| (after, Token::Str(s)))
                .ok_or_else(|| cursor.error("unterminated string literal"))?
        } else if first.is_ascii_digit() {
            number(rest)
                .map(|(after, n)| (after, Token::Number(n)))
                .map_err(|_| cursor.error("invalid number"))?
        } else if let Ok((after, w)) = word(rest) {
            let token = match keyword(w) {
                Some(k) => Token::Keyword(k),
                None => Token::Ident(w.to_string()),
            };
            (after, token)
        } else if let Ok((after, p)) = alt((long_punct, short_punct)).parse(rest) {
            (after, Token::Punct(p))
        } else {
            return Err(cursor.error(format!("unexpected character '{}'", first)));
        };

        cursor.advance(&rest[..rest.len() - after.len()]);
        rest = after;
        tokens.push(Spanned { token, line, column });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_tokenize_expression_with_comments() {
        let tokens = kinds("// work hours\nstartHour >= 9 /* inclusive */ && endHour <= 18");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("startHour".into()),
                Token::Punct(Punct::Ge),
                Token::Number(9.0),
                Token::Punct(Punct::And),
                Token::Ident("endHour".into()),
                Token::Punct(Punct::Le),
                Token::Number(18.0),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_strict_equality_and_optional_chaining() {
        let tokens = kinds("a?.b === 'x\\'y'");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".into()),
                Token::Punct(Punct::QuestionDot),
                Token::Ident("b".into()),
                Token::Punct(Punct::StrictEq),
                Token::Str("x'y".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_positions_are_one_based() {
        let tokens = tokenize("let x = 1;\n  return x").unwrap();
        let ret = tokens
            .iter()
            .find(|t| t.token == Token::Keyword(Keyword::Return))
            .unwrap();
        assert_eq!((ret.line, ret.column), (2, 3));
    }

    #[test]
    fn test_unterminated_string_reports_position() {
        let err = tokenize("title == 'oops").unwrap_err();
        assert_eq!(err.message, "unterminated string literal");
        assert_eq!((err.line, err.column), (1, 10));
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("a # b").unwrap_err();
        assert!(err.message.contains('#'));
    }
}
