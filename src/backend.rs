use super::error::Result;
use std::collections::HashMap;

/// Real-valued arithmetic instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// The code generation collaborator the lowering engine talks to.
///
/// Every value is a 64-bit float except the results of `compare_lt` and
/// `compare_ne_zero`, which are booleans and may only feed `cond_branch` or
/// `bool_to_real`. Instructions are appended to the block set by `position`.
pub trait Backend {
    type Value: Copy;
    type Function: Copy;
    type Block: Copy;

    fn real_constant(&mut self, value: f64) -> Self::Value;

    /// Creates a function taking `arity` reals and returning a real.
    fn declare_function(&mut self, name: &str, arity: usize) -> Result<Self::Function>;

    fn param(&self, function: Self::Function, index: usize) -> Result<Self::Value>;

    /// Drops a function whose body could not be built.
    fn remove_function(&mut self, function: Self::Function);

    fn create_block(&mut self, function: Self::Function, label: &str) -> Result<Self::Block>;

    fn position(&mut self, block: Self::Block);

    fn arith(&mut self, op: ArithOp, lhs: Self::Value, rhs: Self::Value) -> Result<Self::Value>;

    fn compare_lt(&mut self, lhs: Self::Value, rhs: Self::Value) -> Result<Self::Value>;

    fn compare_ne_zero(&mut self, value: Self::Value) -> Result<Self::Value>;

    fn bool_to_real(&mut self, value: Self::Value) -> Result<Self::Value>;

    fn branch(&mut self, target: Self::Block) -> Result<()>;

    fn cond_branch(
        &mut self,
        cond: Self::Value,
        then_block: Self::Block,
        else_block: Self::Block,
    ) -> Result<()>;

    fn phi(&mut self, incoming: &[(Self::Value, Self::Block)]) -> Result<Self::Value>;

    fn call(&mut self, callee: Self::Function, args: &[Self::Value]) -> Result<Self::Value>;

    fn ret(&mut self, value: Self::Value) -> Result<()>;

    fn verify(&mut self, function: Self::Function) -> Result<()>;

    fn execute(&mut self, function: Self::Function) -> Result<f64>;

    /// Textual form of everything emitted so far.
    fn render(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Declared<F> {
    pub handle: F,
    pub arity: usize,
}

/// Named functions visible to calls, shared by every definition in a session.
#[derive(Debug, Clone)]
pub struct Registry<F> {
    functions: HashMap<String, Declared<F>>,
}

impl<F: Copy> Registry<F> {
    pub fn new() -> Self {
        Registry {
            functions: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Declared<F>> {
        self.functions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn insert(&mut self, name: &str, handle: F, arity: usize) {
        self.functions
            .insert(name.to_owned(), Declared { handle, arity });
    }

    pub fn remove(&mut self, name: &str) -> Option<Declared<F>> {
        self.functions.remove(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}

impl<F: Copy> Default for Registry<F> {
    fn default() -> Self {
        Registry::new()
    }
}
