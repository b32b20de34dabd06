use super::error::{ErrorKind, Result};
use super::parser::describe;
use super::token::{Position, Spanned, Token};
use combine::error::{ParseError, StreamError};
use combine::parser::char::{digit, space};
use combine::parser::choice::or;
use combine::parser::token::position;
use combine::parser::EasyParser;
use combine::stream::position::{SourcePosition, Stream as PositionStream};
use combine::stream::{Stream, StreamErrorFor};
use combine::{choice, eof, many, many1, one_of, satisfy, skip_many, token, Parser};

fn number<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    many1(choice((digit(), token('.'))))
        .and_then(|ns: String| ns.parse::<f64>().map_err(StreamErrorFor::<Input>::other))
        .map(Token::Number)
}

fn ident<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    many1(satisfy(|c: char| c.is_ascii_alphabetic())).map(|s: String| match s.as_ref() {
        "def" => Token::Def,
        "if" => Token::If,
        "then" => Token::Then,
        "else" => Token::Else,
        id => Token::Ident(id.to_string()),
    })
}

fn kwd<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    one_of("()+-*/<".chars()).map(Token::Kwd)
}

fn comment<Input>() -> impl Parser<Input, Output = ()>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    token('#').with(skip_many(satisfy(|c| c != '\n')))
}

fn trivia<Input>() -> impl Parser<Input, Output = ()>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    skip_many(or(space().map(|_| ()), comment()))
}

fn lex<Input>() -> impl Parser<Input, Output = (Input::Position, Token)>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (position(), choice((number(), ident(), kwd()))).skip(trivia())
}

fn tokens<Input>() -> impl Parser<Input, Output = (Vec<(Input::Position, Token)>, Input::Position)>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    trivia()
        .with((many::<Vec<_>, _, _>(lex()), position()))
        .skip(eof())
}

/// Splits source text into positioned tokens. Also returns the position just
/// past the last token, used to report errors at end of input.
pub fn tokenize(src: &str) -> Result<(Vec<Spanned>, Position)> {
    match tokens().easy_parse(PositionStream::new(src)) {
        Ok(((toks, end), _)) => {
            let toks = toks
                .into_iter()
                .map(|(p, token): (SourcePosition, Token)| Spanned {
                    token,
                    position: p.into(),
                })
                .collect();
            Ok((toks, end.into()))
        }
        Err(e) => Err(ErrorKind::Syntax {
            position: e.position.into(),
            message: describe(&e.errors, |r: &&str| format!("`{}`", r)),
        }
        .into()),
    }
}

#[cfg(test)]
mod test {
    use super::super::token::Token::*;
    use super::*;

    #[test]
    fn test_number() {
        assert_eq!(number().easy_parse("1.0").map(|x| x.0), Ok(Number(1.0)));
        assert_eq!(number().easy_parse("42").map(|x| x.0), Ok(Number(42.0)));
        assert!(number().easy_parse("1.2.3").is_err());
    }

    #[test]
    fn test_ident() {
        assert_eq!(
            ident().easy_parse("test").map(|x| x.0),
            Ok(Ident("test".to_owned()))
        );

        assert_eq!(ident().easy_parse("def").map(|x| x.0), Ok(Def));
        assert_eq!(ident().easy_parse("then").map(|x| x.0), Ok(Then));
    }

    #[test]
    fn test_comment() {
        assert_eq!(comment().easy_parse("#hoge").map(|x| x.0), Ok(()));
    }

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src)
            .unwrap()
            .0
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            kinds("#comment\nfib(n-1)"),
            vec![
                Ident("fib".to_owned()),
                Kwd('('),
                Ident("n".to_owned()),
                Kwd('-'),
                Number(1.0),
                Kwd(')'),
            ]
        );
    }

    #[test]
    fn test_letters_and_digits_split() {
        assert_eq!(kinds("x1"), vec![Ident("x".to_owned()), Number(1.0)]);
    }

    #[test]
    fn test_positions() {
        let (toks, end) = tokenize("def f(x)\n  x # done\n").unwrap();
        assert_eq!(toks[0].position, Position { line: 1, column: 1 });
        assert_eq!(toks[4].token, Kwd(')'));
        assert_eq!(toks[5].position, Position { line: 2, column: 3 });
        assert_eq!(end, Position { line: 3, column: 1 });
    }

    #[test]
    fn test_non_ascii_letter() {
        assert!(ident().easy_parse("é").is_err());
        match tokenize("def f(é) é").unwrap_err().kind() {
            ErrorKind::Syntax { position, .. } => {
                assert_eq!(*position, Position { line: 1, column: 7 })
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_unexpected_char() {
        let err = tokenize("1 + $").unwrap_err();
        match err.kind() {
            ErrorKind::Syntax { position, .. } => {
                assert_eq!(*position, Position { line: 1, column: 5 })
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }
}
