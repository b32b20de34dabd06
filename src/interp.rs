//! Executes IR functions directly.
//!
//! Calls do not recurse on the native stack. Each active call is a `Frame`
//! on an explicit stack, so the depth cap is the only limit on nesting.

use super::backend::ArithOp;
use super::error::{ErrorKind, Result};
use super::ir::{FuncId, Function, Inst, Module, Temp, Value};

/// Deepest call nesting allowed before execution gives up.
pub const MAX_CALL_DEPTH: usize = 256;

pub fn run(module: &Module, function: FuncId, args: &[f64]) -> Result<f64> {
    let mut machine = Machine {
        module,
        frames: Vec::new(),
    };
    machine.enter(function, args.to_vec(), None)?;
    machine.execute()
}

fn fail<T>(message: String) -> Result<T> {
    Err(ErrorKind::Execution(message).into())
}

fn read(temps: &[f64], args: &[f64], value: Value) -> Result<f64> {
    let v = match value {
        Value::Const(n) => Some(n),
        Value::Param(i) => args.get(i).copied(),
        Value::Temp(t) => temps.get(t.0).copied(),
    };
    match v {
        Some(v) => Ok(v),
        None => fail(format!("read of undefined value {}", value)),
    }
}

fn write(temps: &mut [f64], dest: Temp, v: f64) -> Result<()> {
    match temps.get_mut(dest.0) {
        Some(slot) => {
            *slot = v;
            Ok(())
        }
        None => fail(format!("write to undefined value %t{}", dest.0)),
    }
}

fn real(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// One active call.
struct Frame<'m> {
    id: FuncId,
    f: &'m Function,
    args: Vec<f64>,
    temps: Vec<f64>,
    current: usize,
    prev: Option<usize>,
    pc: usize,
    /// Caller temp receiving the result; `None` for the outermost call.
    dest: Option<Temp>,
}

impl<'m> Frame<'m> {
    fn read(&self, value: Value) -> Result<f64> {
        read(&self.temps, &self.args, value)
    }

    fn jump(&mut self, target: usize) {
        self.prev = Some(self.current);
        self.current = target;
        self.pc = 0;
    }
}

struct Machine<'m> {
    module: &'m Module,
    frames: Vec<Frame<'m>>,
}

impl<'m> Machine<'m> {
    fn enter(&mut self, id: FuncId, args: Vec<f64>, dest: Option<Temp>) -> Result<()> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return fail(format!("call depth limit of {} exceeded", MAX_CALL_DEPTH));
        }
        let module = self.module;
        let f = match module.function(id) {
            Some(f) => f,
            None => return fail(format!("call to removed function #{}", id.0)),
        };
        if f.arity != args.len() {
            return fail(format!(
                "'{}' called with {} argument(s), expected {}",
                module.display_name(id),
                args.len(),
                f.arity
            ));
        }

        self.frames.push(Frame {
            id,
            f,
            args,
            temps: vec![0.0; f.temps.len()],
            current: 0,
            prev: None,
            pc: 0,
            dest,
        });
        Ok(())
    }

    /// Steps the top frame until the outermost call returns.
    fn execute(&mut self) -> Result<f64> {
        let module = self.module;
        loop {
            let frame = match self.frames.last_mut() {
                Some(frame) => frame,
                None => return fail("no active call".to_owned()),
            };
            let f: &'m Function = frame.f;
            let block = match f.blocks.get(frame.current) {
                Some(b) => b,
                None => {
                    return fail(format!(
                        "'{}' has no block #{}",
                        module.display_name(frame.id),
                        frame.current
                    ))
                }
            };
            let inst = match block.insts.get(frame.pc) {
                Some(inst) => inst,
                None => {
                    return fail(format!(
                        "block '{}{}' in '{}' ends without a terminator",
                        block.label,
                        frame.current,
                        module.display_name(frame.id)
                    ))
                }
            };
            frame.pc += 1;

            match inst {
                Inst::Arith { dest, op, lhs, rhs } => {
                    let l = frame.read(*lhs)?;
                    let r = frame.read(*rhs)?;
                    let v = match op {
                        ArithOp::Add => l + r,
                        ArithOp::Sub => l - r,
                        ArithOp::Mul => l * r,
                        ArithOp::Div => l / r,
                    };
                    write(&mut frame.temps, *dest, v)?;
                }
                Inst::CmpLt { dest, lhs, rhs } => {
                    let l = frame.read(*lhs)?;
                    let r = frame.read(*rhs)?;
                    write(
                        &mut frame.temps,
                        *dest,
                        real(l.is_nan() || r.is_nan() || l < r),
                    )?;
                }
                Inst::CmpNeZero { dest, value } => {
                    let v = frame.read(*value)?;
                    write(&mut frame.temps, *dest, real(!v.is_nan() && v != 0.0))?;
                }
                Inst::BoolToReal { dest, value } => {
                    let v = frame.read(*value)?;
                    write(&mut frame.temps, *dest, v)?;
                }
                Inst::Phi { dest, incoming } => {
                    let prev = frame.prev;
                    let chosen = prev.and_then(|p| incoming.iter().find(|(_, b)| b.index == p));
                    match chosen {
                        Some((v, _)) => {
                            let v = frame.read(*v)?;
                            write(&mut frame.temps, *dest, v)?;
                        }
                        None => {
                            return fail(format!(
                                "phi in '{}{}' has no entry for the incoming edge",
                                block.label, frame.current
                            ))
                        }
                    }
                }
                Inst::Call { dest, callee, args } => {
                    let values = args
                        .iter()
                        .map(|v| frame.read(*v))
                        .collect::<Result<Vec<f64>>>()?;
                    self.enter(*callee, values, Some(*dest))?;
                }
                Inst::Br { target } => frame.jump(target.index),
                Inst::CondBr {
                    cond,
                    then_dest,
                    else_dest,
                } => {
                    let c = frame.read(*cond)?;
                    frame.jump(if c != 0.0 {
                        then_dest.index
                    } else {
                        else_dest.index
                    });
                }
                Inst::Ret { value } => {
                    let v = frame.read(*value)?;
                    let dest = frame.dest;
                    self.frames.pop();
                    match (self.frames.last_mut(), dest) {
                        (None, _) => return Ok(v),
                        (Some(caller), Some(dest)) => write(&mut caller.temps, dest, v)?,
                        (Some(_), None) => return fail("return with no receiving call".to_owned()),
                    }
                }
            }
        }
    }
}
