//! Structural checks over a built IR function.

use super::error::{Error, ErrorKind, Result};
use super::ir::{BlockId, FuncId, Function, Inst, Module, Type, Value};

pub fn verify_function(module: &Module, id: FuncId) -> Result<()> {
    let f = module
        .function(id)
        .ok_or_else(|| ErrorKind::Backend(format!("no function #{}", id.0)))?;
    Checker { module, id, f }.check().map_err(|reason| -> Error {
        ErrorKind::Verification {
            function: module.display_name(id),
            reason,
        }
        .into()
    })
}

struct Checker<'m> {
    module: &'m Module,
    id: FuncId,
    f: &'m Function,
}

type Check = std::result::Result<(), String>;

impl<'m> Checker<'m> {
    fn check(&self) -> Check {
        if self.f.blocks.is_empty() {
            return Err("function has no blocks".to_owned());
        }

        let preds = self.predecessors()?;
        if !preds[0].is_empty() {
            return Err("entry block has predecessors".to_owned());
        }

        for (index, block) in self.f.blocks.iter().enumerate() {
            let name = format!("{}{}", block.label, index);
            match block.insts.last() {
                None => return Err(format!("block '{}' is empty", name)),
                Some(last) if !last.is_terminator() => {
                    return Err(format!("block '{}' does not end with a terminator", name))
                }
                Some(_) => {}
            }

            let body = &block.insts[..block.insts.len() - 1];
            if body.iter().any(Inst::is_terminator) {
                return Err(format!("block '{}' has instructions after its terminator", name));
            }

            let mut past_phis = false;
            for inst in &block.insts {
                match inst {
                    Inst::Phi { incoming, .. } => {
                        if past_phis {
                            return Err(format!("phi in '{}' is not at the top of the block", name));
                        }
                        self.check_phi(&name, incoming, &preds[index])?;
                    }
                    _ => past_phis = true,
                }
                self.check_operands(&name, inst)?;
            }
        }
        Ok(())
    }

    fn predecessors(&self) -> std::result::Result<Vec<Vec<usize>>, String> {
        let mut preds = vec![vec![]; self.f.blocks.len()];
        for (index, block) in self.f.blocks.iter().enumerate() {
            for inst in &block.insts {
                for target in inst.successors() {
                    self.check_block(target)?;
                    preds[target.index].push(index);
                }
            }
        }
        Ok(preds)
    }

    fn check_block(&self, block: BlockId) -> Check {
        if block.func != self.id || block.index >= self.f.blocks.len() {
            Err(format!("reference to block #{} outside the function", block.index))
        } else {
            Ok(())
        }
    }

    fn check_phi(&self, name: &str, incoming: &[(Value, BlockId)], preds: &[usize]) -> Check {
        for (_, b) in incoming {
            self.check_block(*b)?;
        }
        let mut from: Vec<usize> = incoming.iter().map(|(_, b)| b.index).collect();
        let mut expected = preds.to_vec();
        from.sort();
        expected.sort();
        if from != expected {
            let names = |v: &[usize]| {
                v.iter()
                    .map(|i| format!("{}{}", self.f.blocks[*i].label, i))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            return Err(format!(
                "phi in '{}' merges [{}] but the predecessors are [{}]",
                name,
                names(&from),
                names(&expected)
            ));
        }
        Ok(())
    }

    fn expect_type(&self, name: &str, value: Value, ty: Type) -> Check {
        match self.f.type_of(value) {
            Some(t) if t == ty => Ok(()),
            Some(t) => Err(format!(
                "{} used as {:?} in '{}' but it is {:?}",
                value, ty, name, t
            )),
            None => Err(format!("{} used in '{}' is not defined", value, name)),
        }
    }

    fn check_operands(&self, name: &str, inst: &Inst) -> Check {
        match inst {
            Inst::Arith { lhs, rhs, .. } | Inst::CmpLt { lhs, rhs, .. } => {
                self.expect_type(name, *lhs, Type::Real)?;
                self.expect_type(name, *rhs, Type::Real)
            }
            Inst::CmpNeZero { value, .. } | Inst::Ret { value } => {
                self.expect_type(name, *value, Type::Real)
            }
            Inst::BoolToReal { value, .. } => self.expect_type(name, *value, Type::Bool),
            Inst::Phi { incoming, .. } => incoming
                .iter()
                .try_for_each(|(v, _)| self.expect_type(name, *v, Type::Real)),
            Inst::Call { callee, args, .. } => {
                let target = self.module.function(*callee).ok_or_else(|| {
                    format!("call in '{}' to removed function #{}", name, callee.0)
                })?;
                if target.arity != args.len() {
                    return Err(format!(
                        "call to '{}' in '{}' passes {} argument(s), expected {}",
                        self.module.display_name(*callee),
                        name,
                        args.len(),
                        target.arity
                    ));
                }
                args.iter()
                    .try_for_each(|v| self.expect_type(name, *v, Type::Real))
            }
            Inst::CondBr { cond, .. } => self.expect_type(name, *cond, Type::Bool),
            Inst::Br { .. } => Ok(()),
        }
    }
}
