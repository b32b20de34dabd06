//! In-memory control-flow-graph IR and the builder that fills it.
//!
//! Functions take reals and return a real. A function is a list of basic
//! blocks; block 0 is the entry. Instruction results are numbered
//! temporaries, typed `real` or `bool`.

use super::backend::{ArithOp, Backend};
use super::error::{ErrorKind, Result};
use super::{interp, verify};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId {
    pub func: FuncId,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Temp(pub usize);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Const(f64),
    Param(usize),
    Temp(Temp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Real,
    Bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    Arith {
        dest: Temp,
        op: ArithOp,
        lhs: Value,
        rhs: Value,
    },
    /// Unordered-or-less-than.
    CmpLt { dest: Temp, lhs: Value, rhs: Value },
    /// Ordered-not-equal against `0.0`.
    CmpNeZero { dest: Temp, value: Value },
    BoolToReal { dest: Temp, value: Value },
    Phi {
        dest: Temp,
        incoming: Vec<(Value, BlockId)>,
    },
    Call {
        dest: Temp,
        callee: FuncId,
        args: Vec<Value>,
    },
    Br { target: BlockId },
    CondBr {
        cond: Value,
        then_dest: BlockId,
        else_dest: BlockId,
    },
    Ret { value: Value },
}

impl Inst {
    pub fn is_terminator(&self) -> bool {
        match self {
            Inst::Br { .. } | Inst::CondBr { .. } | Inst::Ret { .. } => true,
            _ => false,
        }
    }

    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Inst::Br { target } => vec![*target],
            Inst::CondBr {
                then_dest,
                else_dest,
                ..
            } => vec![*then_dest, *else_dest],
            _ => vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub label: String,
    pub insts: Vec<Inst>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub arity: usize,
    pub blocks: Vec<Block>,
    pub temps: Vec<Type>,
}

impl Function {
    pub fn type_of(&self, value: Value) -> Option<Type> {
        match value {
            Value::Const(_) => Some(Type::Real),
            Value::Param(i) if i < self.arity => Some(Type::Real),
            Value::Param(_) => None,
            Value::Temp(t) => self.temps.get(t.0).copied(),
        }
    }
}

/// A module of IR functions plus the insertion cursor used while building.
#[derive(Debug, Default)]
pub struct Module {
    functions: Vec<Option<Function>>,
    cursor: Option<BlockId>,
}

impl Module {
    pub fn new() -> Module {
        Module::default()
    }

    pub fn function(&self, id: FuncId) -> Option<&Function> {
        self.functions.get(id.0).and_then(Option::as_ref)
    }

    /// Looks up a live function by name. The nameless wrapper is never found.
    pub fn find(&self, name: &str) -> Option<FuncId> {
        if name.is_empty() {
            return None;
        }
        self.functions.iter().enumerate().find_map(|(i, f)| match f {
            Some(f) if f.name == name => Some(FuncId(i)),
            _ => None,
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.as_ref().map(|f| (FuncId(i), f)))
    }

    pub fn display_name(&self, id: FuncId) -> String {
        match self.function(id) {
            Some(f) if !f.name.is_empty() => f.name.clone(),
            _ => id.0.to_string(),
        }
    }

    /// Runs a function with the given arguments.
    pub fn run(&self, function: FuncId, args: &[f64]) -> Result<f64> {
        interp::run(self, function, args)
    }

    fn function_mut(&mut self, id: FuncId) -> Result<&mut Function> {
        self.functions
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| ErrorKind::Backend(format!("no function #{}", id.0)).into())
    }

    fn insertion_block(&mut self) -> Result<(&mut Function, usize)> {
        let at = self
            .cursor
            .ok_or_else(|| ErrorKind::Backend("builder is not positioned".to_owned()))?;
        let f = self.function_mut(at.func)?;
        if at.index >= f.blocks.len() {
            return Err(ErrorKind::Backend(format!("no block #{} in '{}'", at.index, f.name)).into());
        }
        Ok((f, at.index))
    }

    fn emit(&mut self, inst: Inst) -> Result<()> {
        let (f, index) = self.insertion_block()?;
        f.blocks[index].insts.push(inst);
        Ok(())
    }

    fn emit_value<F>(&mut self, ty: Type, make: F) -> Result<Value>
    where
        F: FnOnce(Temp) -> Inst,
    {
        let (f, index) = self.insertion_block()?;
        let dest = Temp(f.temps.len());
        f.temps.push(ty);
        f.blocks[index].insts.push(make(dest));
        Ok(Value::Temp(dest))
    }
}

impl Backend for Module {
    type Value = Value;
    type Function = FuncId;
    type Block = BlockId;

    fn real_constant(&mut self, value: f64) -> Value {
        Value::Const(value)
    }

    fn declare_function(&mut self, name: &str, arity: usize) -> Result<FuncId> {
        self.functions.push(Some(Function {
            name: name.to_owned(),
            arity,
            blocks: vec![],
            temps: vec![],
        }));
        Ok(FuncId(self.functions.len() - 1))
    }

    fn param(&self, function: FuncId, index: usize) -> Result<Value> {
        match self.function(function) {
            Some(f) if index < f.arity => Ok(Value::Param(index)),
            Some(f) => Err(ErrorKind::Backend(format!(
                "'{}' has no parameter #{}",
                f.name, index
            ))
            .into()),
            None => Err(ErrorKind::Backend(format!("no function #{}", function.0)).into()),
        }
    }

    fn remove_function(&mut self, function: FuncId) {
        if let Some(slot) = self.functions.get_mut(function.0) {
            *slot = None;
        }
        if self.cursor.map_or(false, |b| b.func == function) {
            self.cursor = None;
        }
    }

    fn create_block(&mut self, function: FuncId, label: &str) -> Result<BlockId> {
        let f = self.function_mut(function)?;
        f.blocks.push(Block {
            label: label.to_owned(),
            insts: vec![],
        });
        Ok(BlockId {
            func: function,
            index: f.blocks.len() - 1,
        })
    }

    fn position(&mut self, block: BlockId) {
        self.cursor = Some(block);
    }

    fn arith(&mut self, op: ArithOp, lhs: Value, rhs: Value) -> Result<Value> {
        self.emit_value(Type::Real, |dest| Inst::Arith { dest, op, lhs, rhs })
    }

    fn compare_lt(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.emit_value(Type::Bool, |dest| Inst::CmpLt { dest, lhs, rhs })
    }

    fn compare_ne_zero(&mut self, value: Value) -> Result<Value> {
        self.emit_value(Type::Bool, |dest| Inst::CmpNeZero { dest, value })
    }

    fn bool_to_real(&mut self, value: Value) -> Result<Value> {
        self.emit_value(Type::Real, |dest| Inst::BoolToReal { dest, value })
    }

    fn branch(&mut self, target: BlockId) -> Result<()> {
        self.emit(Inst::Br { target })
    }

    fn cond_branch(&mut self, cond: Value, then_dest: BlockId, else_dest: BlockId) -> Result<()> {
        self.emit(Inst::CondBr {
            cond,
            then_dest,
            else_dest,
        })
    }

    fn phi(&mut self, incoming: &[(Value, BlockId)]) -> Result<Value> {
        let incoming = incoming.to_vec();
        self.emit_value(Type::Real, |dest| Inst::Phi { dest, incoming })
    }

    fn call(&mut self, callee: FuncId, args: &[Value]) -> Result<Value> {
        let args = args.to_vec();
        self.emit_value(Type::Real, |dest| Inst::Call { dest, callee, args })
    }

    fn ret(&mut self, value: Value) -> Result<()> {
        self.emit(Inst::Ret { value })
    }

    fn verify(&mut self, function: FuncId) -> Result<()> {
        verify::verify_function(self, function)
    }

    fn execute(&mut self, function: FuncId) -> Result<f64> {
        self.run(function, &[])
    }

    fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Const(n) => write!(f, "{:?}", n),
            Value::Param(i) => write!(f, "%p{}", i),
            Value::Temp(t) => write!(f, "%t{}", t.0),
        }
    }
}

fn block_name(function: &Function, block: BlockId) -> String {
    match function.blocks.get(block.index) {
        Some(b) => format!("{}{}", b.label, block.index),
        None => format!("?{}", block.index),
    }
}

fn join(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Module {
    fn write_inst(&self, f: &mut fmt::Formatter<'_>, func: &Function, inst: &Inst) -> fmt::Result {
        match inst {
            Inst::Arith { dest, op, lhs, rhs } => {
                let name = match op {
                    ArithOp::Add => "fadd",
                    ArithOp::Sub => "fsub",
                    ArithOp::Mul => "fmul",
                    ArithOp::Div => "fdiv",
                };
                writeln!(f, "  %t{} = {} {}, {}", dest.0, name, lhs, rhs)
            }
            Inst::CmpLt { dest, lhs, rhs } => {
                writeln!(f, "  %t{} = fcmp ult {}, {}", dest.0, lhs, rhs)
            }
            Inst::CmpNeZero { dest, value } => {
                writeln!(f, "  %t{} = fcmp one {}, 0.0", dest.0, value)
            }
            Inst::BoolToReal { dest, value } => writeln!(f, "  %t{} = uitofp {}", dest.0, value),
            Inst::Phi { dest, incoming } => {
                let arms: Vec<String> = incoming
                    .iter()
                    .map(|(v, b)| format!("[ {}, %{} ]", v, block_name(func, *b)))
                    .collect();
                writeln!(f, "  %t{} = phi {}", dest.0, arms.join(", "))
            }
            Inst::Call { dest, callee, args } => writeln!(
                f,
                "  %t{} = call @{}({})",
                dest.0,
                self.display_name(*callee),
                join(args)
            ),
            Inst::Br { target } => writeln!(f, "  br %{}", block_name(func, *target)),
            Inst::CondBr {
                cond,
                then_dest,
                else_dest,
            } => writeln!(
                f,
                "  br {}, %{}, %{}",
                cond,
                block_name(func, *then_dest),
                block_name(func, *else_dest)
            ),
            Inst::Ret { value } => writeln!(f, "  ret {}", value),
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, func) in self.functions() {
            let params: Vec<String> = (0..func.arity).map(|i| format!("%p{}", i)).collect();
            writeln!(f, "define @{}({}) {{", self.display_name(id), params.join(", "))?;
            for (index, block) in func.blocks.iter().enumerate() {
                writeln!(f, "{}{}:", block.label, index)?;
                for inst in &block.insts {
                    self.write_inst(f, func, inst)?;
                }
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}
