use super::ast::{BinOp, Expr, Function};
use super::backend::{ArithOp, Backend, Registry};
use super::error::{ErrorKind, Result};
use std::collections::HashMap;

/// Lowering state for one function body.
///
/// Every `codegen_expr` call takes the block it starts emitting into and
/// returns the value together with the block that is current when it
/// finishes. A nested `if` leaves emission in its own merge block, so callers
/// must merge on that returned block and never on the block they started in.
struct FunctionCodegen<'a, B: Backend> {
    backend: &'a mut B,
    registry: &'a Registry<B::Function>,
    function: B::Function,
    named_values: HashMap<&'a str, B::Value>,
}

impl<'a, B: Backend> FunctionCodegen<'a, B> {
    fn codegen_expr(&mut self, e: &Expr, block: B::Block) -> Result<(B::Value, B::Block)> {
        match e {
            Expr::Number(n) => Ok((self.backend.real_constant(*n), block)),
            Expr::Variable(name) => match self.named_values.get(name.as_str()) {
                Some(v) => Ok((*v, block)),
                None => Err(ErrorKind::UnboundName(name.clone()).into()),
            },
            Expr::Binary(op, lhs, rhs) => {
                let (lhs_val, block) = self.codegen_expr(lhs, block)?;
                let (rhs_val, block) = self.codegen_expr(rhs, block)?;
                let v = match op {
                    BinOp::Add => self.backend.arith(ArithOp::Add, lhs_val, rhs_val)?,
                    BinOp::Sub => self.backend.arith(ArithOp::Sub, lhs_val, rhs_val)?,
                    BinOp::Mul => self.backend.arith(ArithOp::Mul, lhs_val, rhs_val)?,
                    BinOp::Div => self.backend.arith(ArithOp::Div, lhs_val, rhs_val)?,
                    BinOp::Lt => {
                        let i = self.backend.compare_lt(lhs_val, rhs_val)?;
                        self.backend.bool_to_real(i)?
                    }
                };
                Ok((v, block))
            }
            Expr::Call(callee, args) => {
                let declared = self
                    .registry
                    .get(callee)
                    .ok_or_else(|| ErrorKind::UnknownFunction(callee.clone()))?;
                if declared.arity != args.len() {
                    return Err(ErrorKind::ArityMismatch {
                        name: callee.clone(),
                        expected: declared.arity,
                        found: args.len(),
                    }
                    .into());
                }

                let mut block = block;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    let (v, next) = self.codegen_expr(arg, block)?;
                    values.push(v);
                    block = next;
                }
                let v = self.backend.call(declared.handle, &values)?;
                Ok((v, block))
            }
            Expr::If(cond, then_expr, else_expr) => {
                let (cond_val, _) = self.codegen_expr(cond, block)?;
                let cond_val = self.backend.compare_ne_zero(cond_val)?;

                let then_bb = self.backend.create_block(self.function, "then")?;
                let else_bb = self.backend.create_block(self.function, "else")?;
                let merge_bb = self.backend.create_block(self.function, "ifcont")?;
                self.backend.cond_branch(cond_val, then_bb, else_bb)?;

                self.backend.position(then_bb);
                let (then_val, then_end) = self.codegen_expr(then_expr, then_bb)?;
                self.backend.branch(merge_bb)?;

                self.backend.position(else_bb);
                let (else_val, else_end) = self.codegen_expr(else_expr, else_bb)?;
                self.backend.branch(merge_bb)?;

                self.backend.position(merge_bb);
                let phi = self
                    .backend
                    .phi(&[(then_val, then_end), (else_val, else_end)])?;
                Ok((phi, merge_bb))
            }
        }
    }
}

/// Lowers one function definition, or the nameless wrapper of a top-level
/// expression.
///
/// A named function is registered before its body is lowered so the body can
/// call it. If lowering or verification fails the function is dropped from
/// both the registry and the backend.
pub fn codegen_func<B: Backend>(
    backend: &mut B,
    registry: &mut Registry<B::Function>,
    func: &Function,
) -> Result<B::Function> {
    let proto = func.proto();
    let name = proto.name();
    let params = proto.params();

    if !proto.is_anonymous() && registry.contains(name) {
        return Err(ErrorKind::DuplicateFunction(name.to_owned()).into());
    }
    for (i, p) in params.iter().enumerate() {
        if params[..i].contains(p) {
            return Err(ErrorKind::DuplicateParameter {
                function: name.to_owned(),
                name: p.clone(),
            }
            .into());
        }
    }

    let the_function = backend.declare_function(name, params.len())?;
    if !proto.is_anonymous() {
        registry.insert(name, the_function, params.len());
    }

    match codegen_body(backend, registry, the_function, func) {
        Ok(()) => Ok(the_function),
        Err(e) => {
            if !proto.is_anonymous() {
                registry.remove(name);
            }
            backend.remove_function(the_function);
            Err(e)
        }
    }
}

fn codegen_body<B: Backend>(
    backend: &mut B,
    registry: &Registry<B::Function>,
    the_function: B::Function,
    func: &Function,
) -> Result<()> {
    let entry = backend.create_block(the_function, "entry")?;
    backend.position(entry);

    let mut named_values = HashMap::new();
    for (i, p) in func.proto().params().iter().enumerate() {
        named_values.insert(p.as_str(), backend.param(the_function, i)?);
    }

    let mut cg = FunctionCodegen {
        backend,
        registry,
        function: the_function,
        named_values,
    };
    let (ret_val, _) = cg.codegen_expr(func.body(), entry)?;
    cg.backend.ret(ret_val)?;
    cg.backend.verify(the_function)
}

#[cfg(test)]
mod test {
    use super::super::ast::Prototype;
    use super::super::ir::{FuncId, Inst, Module};
    use super::super::parser::{parse_expr, parse_program};
    use super::*;

    fn define(m: &mut Module, r: &mut Registry<FuncId>, src: &str) -> Result<()> {
        for f in parse_program(src)?.functions() {
            codegen_func(m, r, f)?;
        }
        Ok(())
    }

    fn eval(m: &mut Module, r: &mut Registry<FuncId>, src: &str) -> Result<f64> {
        let f = codegen_func(m, r, &Function::anonymous(parse_expr(src)?))?;
        m.execute(f)
    }

    #[test]
    fn test_constant() {
        let mut m = Module::new();
        let mut r = Registry::new();
        assert_eq!(eval(&mut m, &mut r, "1 + 2 * 3").unwrap(), 7.0);
        assert_eq!(eval(&mut m, &mut r, "1-2-3").unwrap(), 2.0);
        assert_eq!(eval(&mut m, &mut r, "1 < 2").unwrap(), 1.0);
        assert_eq!(eval(&mut m, &mut r, "2 < 1").unwrap(), 0.0);
    }

    #[test]
    fn test_unbound_name() {
        let mut m = Module::new();
        let mut r = Registry::new();
        let err = define(&mut m, &mut r, "def f(x) x + y").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UnboundName("y".to_owned()));
        // the half-built function is gone
        assert!(r.is_empty());
        assert_eq!(m.functions().count(), 0);
    }

    #[test]
    fn test_unknown_function() {
        let mut m = Module::new();
        let mut r = Registry::new();
        let err = eval(&mut m, &mut r, "g(1)").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UnknownFunction("g".to_owned()));
    }

    #[test]
    fn test_arity_mismatch() {
        let mut m = Module::new();
        let mut r = Registry::new();
        define(&mut m, &mut r, "def add(a b) a + b").unwrap();
        let err = eval(&mut m, &mut r, "add(1)").unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::ArityMismatch {
                name: "add".to_owned(),
                expected: 2,
                found: 1
            }
        );
        assert_eq!(eval(&mut m, &mut r, "add(1 2)").unwrap(), 3.0);
    }

    #[test]
    fn test_duplicate_function() {
        let mut m = Module::new();
        let mut r = Registry::new();
        define(&mut m, &mut r, "def f(x) x").unwrap();
        let err = define(&mut m, &mut r, "def f(y) y").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::DuplicateFunction("f".to_owned()));
    }

    #[test]
    fn test_duplicate_parameter() {
        let mut m = Module::new();
        let mut r = Registry::new();
        let f = Function(
            Prototype("f".to_owned(), vec!["x".to_owned(), "x".to_owned()]),
            Box::new(Expr::Variable("x".to_owned())),
        );
        let err = codegen_func(&mut m, &mut r, &f).unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::DuplicateParameter {
                function: "f".to_owned(),
                name: "x".to_owned()
            }
        );
    }

    #[test]
    fn test_recursion() {
        let mut m = Module::new();
        let mut r = Registry::new();
        define(
            &mut m,
            &mut r,
            "def fact(n) if n < 2 then 1 else n*fact(n-1)",
        )
        .unwrap();
        assert_eq!(eval(&mut m, &mut r, "fact(5)").unwrap(), 120.0);
    }

    #[test]
    fn test_nested_if_merges_on_exit_blocks() {
        let mut m = Module::new();
        let mut r = Registry::new();
        define(
            &mut m,
            &mut r,
            "def pick(a b) if a < b then (if a < 0 then 0 else a) else b",
        )
        .unwrap();
        let pick = m.find("pick").unwrap();

        // entry0 then1 else2 ifcont3, then the inner if: then4 else5 ifcont6
        let blocks = &m.function(pick).unwrap().blocks;
        let outer_phi = blocks[3].insts.iter().find_map(|i| match i {
            Inst::Phi { incoming, .. } => Some(incoming.clone()),
            _ => None,
        });
        let incoming: Vec<usize> = outer_phi.unwrap().iter().map(|(_, b)| b.index).collect();
        assert_eq!(incoming, vec![6, 2]);

        assert_eq!(m.run(pick, &[-3.0, 5.0]).unwrap(), 0.0);
        assert_eq!(m.run(pick, &[2.0, 5.0]).unwrap(), 2.0);
        assert_eq!(m.run(pick, &[7.0, 5.0]).unwrap(), 5.0);
    }

    #[test]
    fn test_if_in_operands_and_arguments() {
        let mut m = Module::new();
        let mut r = Registry::new();
        define(&mut m, &mut r, "def id(x) x").unwrap();
        assert_eq!(
            eval(
                &mut m,
                &mut r,
                "(if 1 then 2 else 3) + id(if 0 then 10 else 20) * (if 1 then 1 else 0)"
            )
            .unwrap(),
            22.0
        );
    }
}
