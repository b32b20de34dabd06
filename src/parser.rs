use super::ast::{BinOp, Expr, Function, Item, Program, Prototype};
use super::error::{ErrorKind, Result};
use super::lexer;
use super::token::{Position, Token};
use combine::easy;
use combine::error::{ParseError, StreamError};
use combine::parser::EasyParser;
pub(crate) use combine::parser::Parser;
use combine::stream::position::{IndexPositioner, Stream as PositionStream};
use combine::stream::{Stream, StreamErrorFor};
use combine::{attempt, between, choice, eof, many, many1, optional, parser, satisfy_map, token};
use std::collections::HashSet;
use std::fmt;

fn ident<Input>() -> impl Parser<Input, Output = String>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    satisfy_map(|t| match t {
        Token::Ident(id) => Some(id),
        _ => None,
    })
}

fn operator<Input>() -> impl Parser<Input, Output = BinOp>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    satisfy_map(|t| match t {
        Token::Kwd(c) => BinOp::from_symbol(c).ok(),
        _ => None,
    })
}

fn call<Input>() -> impl Parser<Input, Output = Expr>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (
        ident(),
        between(token(Token::Kwd('(')), token(Token::Kwd(')')), many(expr())),
    )
        .map(|(id, aa)| Expr::Call(id, aa))
}

fn parse_if<Input>() -> impl Parser<Input, Output = Expr>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    use super::token::Token::*;

    (token(If), expr(), token(Then), expr(), token(Else), expr())
        .map(|(_, c, _, t, _, e)| Expr::If(Box::new(c), Box::new(t), Box::new(e)))
}

fn aexp_<Input>() -> impl Parser<Input, Output = Expr>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    use super::token::Token::*;
    let number = satisfy_map(|c| match c {
        Number(n) => Some(Expr::Number(n)),
        _ => None,
    });

    let paren = between(token(Kwd('(')), token(Kwd(')')), expr());

    let variable = ident().map(Expr::Variable);

    choice((parse_if(), attempt(call()), variable, number, paren))
}

parser! {
    fn aexp[Input]()(Input) -> Expr
        where [Input: Stream<Token=Token>]
    {
        aexp_()
    }
}

// `aexp (op expr)?` is the same language as `binop | aexp` without
// re-parsing the left operand. The right operand recurses into the full
// expression, so every operator is right-associative at one level.
fn expr_<Input>() -> impl Parser<Input, Output = Expr>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (aexp(), optional((operator(), expr()))).map(|(lhs, rest)| match rest {
        Some((op, rhs)) => Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
        None => lhs,
    })
}

parser! {
    fn expr[Input]()(Input) -> Expr
        where [Input: Stream<Token=Token>]
    {
        expr_()
    }
}

fn prototype<Input>() -> impl Parser<Input, Output = Prototype>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    use super::token::Token::*;

    let args = many(ident());

    (ident(), between(token(Kwd('(')), token(Kwd(')')), args)).and_then(
        |(id, aa): (String, Vec<String>)| {
            let dup = {
                let mut seen = HashSet::new();
                aa.iter().find(|a| !seen.insert(a.as_str())).cloned()
            };
            match dup {
                Some(dup) => Err(StreamErrorFor::<Input>::message_format(format!(
                    "parameter '{}' repeated in '{}'",
                    dup, id
                ))),
                None => Ok(Prototype(id, aa)),
            }
        },
    )
}

pub(crate) fn definition<Input>() -> impl Parser<Input, Output = Function>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (token(Token::Def), prototype(), expr()).map(|(_, p, e)| Function(p, Box::new(e)))
}

fn item<Input>() -> impl Parser<Input, Output = Item>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    choice((definition().map(Item::Function), expr().map(Item::Expr)))
}

pub(crate) fn program<Input>() -> impl Parser<Input, Output = Program>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    many1::<Vec<_>, _, _>(item()).skip(eof()).map(Program)
}

/// Renders combine's error list as one line.
pub(crate) fn describe<T, R, F>(errors: &[easy::Error<T, R>], range: F) -> String
where
    T: fmt::Display,
    F: Fn(&R) -> String,
{
    let info = |i: &easy::Info<T, R>| match i {
        easy::Info::Token(t) => format!("`{}`", t),
        easy::Info::Range(r) => range(r),
        easy::Info::Owned(s) => s.clone(),
        easy::Info::Static(s) => (*s).to_string(),
    };

    let mut unexpected = Vec::new();
    let mut expected = Vec::new();
    let mut messages = Vec::new();
    for e in errors {
        match e {
            easy::Error::Unexpected(i) => unexpected.push(info(i)),
            easy::Error::Expected(i) => expected.push(info(i)),
            easy::Error::Message(i) => messages.push(info(i)),
            easy::Error::Other(e) => messages.push(e.to_string()),
        }
    }

    let mut parts = Vec::new();
    if !unexpected.is_empty() {
        parts.push(format!("unexpected {}", unexpected.join(", ")));
    }
    if !expected.is_empty() {
        parts.push(format!("expected {}", expected.join(" or ")));
    }
    parts.extend(messages);
    if parts.is_empty() {
        "no alternative matched".to_owned()
    } else {
        parts.join("; ")
    }
}

/// Parses a whole program. The first failure aborts the parse.
pub fn parse_program(src: &str) -> Result<Program> {
    parse_with_end(src).map(|(program, _)| program)
}

/// Parses a program and also returns the position just past its last token.
fn parse_with_end(src: &str) -> Result<(Program, Position)> {
    let (spanned, end) = lexer::tokenize(src)?;
    let toks: Vec<Token> = spanned.iter().map(|s| s.token.clone()).collect();
    let input = PositionStream::with_positioner(&toks[..], IndexPositioner::new());
    let result = match program().easy_parse(input) {
        Ok((p, _)) => Ok((p, end)),
        Err(e) => {
            let position = spanned.get(e.position).map_or(end, |s| s.position);
            let message = describe(&e.errors, |r: &&[Token]| {
                let words: Vec<String> = r.iter().map(|t| t.to_string()).collect();
                format!("`{}`", words.join(" "))
            });
            Err(ErrorKind::Syntax { position, message }.into())
        }
    };
    result
}

/// Parses a single expression, rejecting anything after it.
pub fn parse_expr(src: &str) -> Result<Expr> {
    let (program, end) = parse_with_end(src)?;
    let mut items = program.0;
    match (items.pop(), items.is_empty()) {
        (Some(Item::Expr(e)), true) => Ok(e),
        _ => Err(ErrorKind::Syntax {
            position: end,
            message: "expected exactly one expression".to_owned(),
        }
        .into()),
    }
}

#[cfg(test)]
mod test {

    use super::super::token::Position;
    use super::super::token::Token::*;
    use super::*;
    use combine::any;

    fn lex_tokens(s: &str) -> Vec<Token> {
        lexer::tokenize(s)
            .unwrap()
            .0
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    fn num(n: f64) -> Box<Expr> {
        Box::new(Expr::Number(n))
    }

    fn var(s: &str) -> Box<Expr> {
        Box::new(Expr::Variable(s.to_owned()))
    }

    #[test]
    fn test_parser_token() {
        assert_eq!(any().parse(vec![Def].as_slice()).map(|x| x.0), Ok(Def));

        assert_eq!(
            token(Ident("hoge".to_owned()))
                .parse(vec![Ident("hoge".to_owned())].as_slice())
                .map(|x| x.0),
            Ok(Ident("hoge".to_owned()))
        );
    }

    #[test]
    fn test_aexp() {
        {
            let tokens = vec![Token::Number(1.0)];
            assert_eq!(
                aexp().parse(tokens.as_slice()).map(|x| x.0),
                Ok(Expr::Number(1.0))
            );
        }

        {
            let tokens = vec![Token::Ident("y".to_owned())];
            assert_eq!(
                aexp().parse(tokens.as_slice()).map(|x| x.0),
                Ok(Expr::Variable("y".to_owned()))
            );
        }
    }

    #[test]
    fn test_expr() {
        {
            let tokens = vec![Number(1.0), Kwd('+'), Number(2.0)];
            assert_eq!(
                expr().parse(tokens.as_slice()).map(|x| x.0),
                Ok(Expr::Binary(BinOp::Add, num(1.0), num(2.0)))
            );
        }

        {
            // flat precedence: the right operand is the whole rest
            let tokens = vec![Number(1.0), Kwd('*'), Number(2.0), Kwd('+'), Number(3.0)];
            assert_eq!(
                expr().parse(tokens.as_slice()).map(|x| x.0),
                Ok(Expr::Binary(
                    BinOp::Mul,
                    num(1.0),
                    Box::new(Expr::Binary(BinOp::Add, num(2.0), num(3.0)))
                ))
            );
        }

        {
            let tokens = vec![
                Kwd('('),
                Number(1.0),
                Kwd('+'),
                Number(2.0),
                Kwd(')'),
                Kwd('*'),
                Number(3.0),
            ];
            assert_eq!(
                expr().parse(tokens.as_slice()).map(|x| x.0),
                Ok(Expr::Binary(
                    BinOp::Mul,
                    Box::new(Expr::Binary(BinOp::Add, num(1.0), num(2.))),
                    num(3.0)
                ))
            );
        }
    }

    #[test]
    fn test_right_assoc() {
        assert_eq!(
            parse_expr("1-2-3").unwrap(),
            Expr::Binary(
                BinOp::Sub,
                num(1.0),
                Box::new(Expr::Binary(BinOp::Sub, num(2.0), num(3.0)))
            )
        );
    }

    #[test]
    fn test_if() {
        assert_eq!(
            parse_expr("if a < b then a else b + 1").unwrap(),
            Expr::If(
                Box::new(Expr::Binary(BinOp::Lt, var("a"), var("b"))),
                var("a"),
                Box::new(Expr::Binary(BinOp::Add, var("b"), num(1.0)))
            )
        );
    }

    #[test]
    fn test_call() {
        let tokens = lex_tokens("foo(y 4.0)");
        assert_eq!(
            call().parse(tokens.as_slice()).map(|x| x.0),
            Ok(Expr::Call(
                "foo".to_owned(),
                vec![Expr::Variable("y".to_owned()), Expr::Number(4.0)]
            ))
        );

        // the argument list is a sequence of whole expressions
        let tokens = lex_tokens("fib(n-1)");
        assert_eq!(
            call().parse(tokens.as_slice()).map(|x| x.0),
            Ok(Expr::Call(
                "fib".to_owned(),
                vec![Expr::Binary(BinOp::Sub, var("n"), num(1.0))]
            ))
        );
    }

    #[test]
    fn test_prototype() {
        let tokens = vec![Ident("f".to_owned()), Kwd('('), Kwd(')')];
        assert_eq!(
            prototype().parse(tokens.as_slice()).map(|x| x.0),
            Ok(Prototype("f".to_owned(), vec![]))
        );

        let tokens = lex_tokens("pick(a b)");
        assert_eq!(
            prototype().parse(tokens.as_slice()).map(|x| x.0),
            Ok(Prototype(
                "pick".to_owned(),
                vec!["a".to_owned(), "b".to_owned()]
            ))
        );
    }

    #[test]
    fn test_program() {
        let p = parse_program(
            "def fib(n) if n < 3 then 1 else fib(n-1) + fib(n-2)\n\
             def div(a b) a/b\n\
             fib(10)",
        )
        .unwrap();
        assert_eq!(p.0.len(), 3);
        assert_eq!(p.functions().count(), 2);
        assert_eq!(
            p.last_expr(),
            Some(&Expr::Call("fib".to_owned(), vec![Expr::Number(10.0)]))
        );
    }

    #[test]
    fn test_duplicate_param() {
        let err = parse_program("def f(x x) x").unwrap_err();
        match err.kind() {
            ErrorKind::Syntax { message, .. } => assert!(message.contains("'x'"), "{}", message),
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_keyword_is_reserved() {
        assert!(parse_program("def if(x) x").is_err());
        assert!(parse_program("def f(then) then").is_err());
    }

    #[test]
    fn test_syntax_error_position() {
        let err = parse_program("def f(x)\n  x + )").unwrap_err();
        match err.kind() {
            ErrorKind::Syntax { position, .. } => {
                assert_eq!(*position, Position { line: 2, column: 7 })
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_at_end_of_input() {
        let err = parse_program("1 +").unwrap_err();
        match err.kind() {
            ErrorKind::Syntax { position, .. } => {
                assert_eq!(*position, Position { line: 1, column: 4 })
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_expr() {
        assert_eq!(parse_expr("1 + x").unwrap(), Expr::Binary(BinOp::Add, num(1.0), var("x")));
        match parse_expr("1\n  2").unwrap_err().kind() {
            ErrorKind::Syntax { position, .. } => {
                assert_eq!(*position, Position { line: 2, column: 4 })
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_program() {
        assert!(parse_program("  # nothing\n").is_err());
    }
}
