use super::error::{ErrorKind, Result};
use std::fmt;

/// The closed set of binary operators. All share one precedence level and
/// associate to the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
}

impl BinOp {
    pub fn from_symbol(c: char) -> Result<BinOp> {
        match c {
            '+' => Ok(BinOp::Add),
            '-' => Ok(BinOp::Sub),
            '*' => Ok(BinOp::Mul),
            '/' => Ok(BinOp::Div),
            '<' => Ok(BinOp::Lt),
            c => Err(ErrorKind::UnknownOperator(c).into()),
        }
    }

    pub fn symbol(self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
            BinOp::Lt => '<',
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Builds a binary node from an operator symbol.
    pub fn binary(op: char, lhs: Expr, rhs: Expr) -> Result<Expr> {
        Ok(Expr::Binary(
            BinOp::from_symbol(op)?,
            Box::new(lhs),
            Box::new(rhs),
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prototype(pub String, pub Vec<String>);

impl Prototype {
    /// Signature of the nameless wrapper around a top-level expression.
    pub fn anonymous() -> Prototype {
        Prototype(String::new(), vec![])
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn params(&self) -> &[String] {
        &self.1
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function(pub Prototype, pub Box<Expr>);

impl Function {
    pub fn anonymous(body: Expr) -> Function {
        Function(Prototype::anonymous(), Box::new(body))
    }

    pub fn proto(&self) -> &Prototype {
        &self.0
    }

    pub fn body(&self) -> &Expr {
        &self.1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Function(Function),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program(pub Vec<Item>);

impl Program {
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.0.iter().filter_map(|item| match item {
            Item::Function(f) => Some(f),
            Item::Expr(_) => None,
        })
    }

    /// The only bare expression that gets executed. Earlier bare
    /// expressions are parsed and then ignored.
    pub fn last_expr(&self) -> Option<&Expr> {
        self.0.iter().rev().find_map(|item| match item {
            Item::Expr(e) => Some(e),
            Item::Function(_) => None,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_symbol() {
        for c in "+-*/<".chars() {
            assert_eq!(BinOp::from_symbol(c).unwrap().symbol(), c);
        }
        assert_eq!(
            BinOp::from_symbol('%').unwrap_err().kind(),
            &ErrorKind::UnknownOperator('%')
        );
    }

    #[test]
    fn test_binary() {
        let e = Expr::binary('<', Expr::Number(1.0), Expr::Variable("x".to_owned())).unwrap();
        assert_eq!(
            e,
            Expr::Binary(
                BinOp::Lt,
                Box::new(Expr::Number(1.0)),
                Box::new(Expr::Variable("x".to_owned()))
            )
        );
        assert!(Expr::binary('=', Expr::Number(1.0), Expr::Number(2.0)).is_err());
    }

    #[test]
    fn test_last_expr() {
        let p = Program(vec![
            Item::Expr(Expr::Number(1.0)),
            Item::Function(Function(
                Prototype("f".to_owned(), vec![]),
                Box::new(Expr::Number(0.0)),
            )),
            Item::Expr(Expr::Number(2.0)),
        ]);
        assert_eq!(p.last_expr(), Some(&Expr::Number(2.0)));
        assert_eq!(p.functions().count(), 1);
        assert_eq!(Program(vec![]).last_expr(), None);
    }
}
