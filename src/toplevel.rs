use super::ast::{Function, Program};
use super::backend::{Backend, Registry};
use super::codegen;
use super::error::{ErrorKind, Result};
use super::ir;
use super::parser;
use failure::ResultExt;
use std::io::{stdin, stdout, BufRead, Write};

/// Settings taken from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Print the parsed program to stderr.
    pub dump_ast: bool,
    /// Print the emitted IR to stderr after every run.
    pub dump_ir: bool,
    /// Report each step on stderr.
    pub verbose: bool,
}

/// Compiles and runs programs against one backend. Definitions stay visible
/// to later runs in the same session.
pub struct Session<B: Backend> {
    backend: B,
    registry: Registry<B::Function>,
    options: Options,
}

impl<B: Backend> Session<B> {
    pub fn new(backend: B, options: Options) -> Session<B> {
        Session {
            backend,
            registry: Registry::new(),
            options,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &Registry<B::Function> {
        &self.registry
    }

    fn note(&self, msg: &str) {
        if self.options.verbose {
            eprintln!("{}", msg);
        }
    }

    /// Parses and runs one program.
    ///
    /// Definitions are lowered in order. Only the last bare expression is
    /// lowered and executed; earlier ones are parsed and dropped. Returns
    /// `None` when the program has no bare expression.
    pub fn run(&mut self, src: &str) -> Result<Option<f64>> {
        let program = parser::parse_program(src)?;
        if self.options.dump_ast {
            eprintln!("{:#?}", program);
        }
        self.run_program(&program)
    }

    pub fn run_program(&mut self, program: &Program) -> Result<Option<f64>> {
        for func in program.functions() {
            codegen::codegen_func(&mut self.backend, &mut self.registry, func)?;
            self.note(&format!("parsed a function definition: {}", func.proto().name()));
        }

        let skipped = program.0.len() - program.functions().count();
        if skipped > 1 {
            self.note(&format!(
                "ignoring {} top-level expression(s) before the last one",
                skipped - 1
            ));
        }

        let result = match program.last_expr() {
            Some(e) => {
                let the_function = codegen::codegen_func(
                    &mut self.backend,
                    &mut self.registry,
                    &Function::anonymous(e.clone()),
                )?;
                self.note("parsed a top-level expr");
                let outcome = self.backend.execute(the_function);
                self.dump_ir();
                self.backend.remove_function(the_function);
                let v = outcome?;
                self.note(&format!("evaluated to {}", v));
                Some(v)
            }
            None => {
                self.dump_ir();
                None
            }
        };
        Ok(result)
    }

    fn dump_ir(&self) {
        if self.options.dump_ir {
            eprint!("{}", self.backend.render());
        }
    }

    /// Reads programs line by line until end of input. Errors are reported
    /// and the loop carries on.
    pub fn main_loop(&mut self) -> Result<()> {
        let input = stdin();
        let mut lines = input.lock();
        loop {
            print!("ready> ");
            stdout().flush().context(ErrorKind::Io)?;
            let mut line = String::new();
            if lines.read_line(&mut line).context(ErrorKind::Io)? == 0 {
                println!();
                return Ok(());
            }
            if line.trim().is_empty() {
                continue;
            }
            match self.run(&line) {
                Ok(Some(v)) => println!("Evaluated to {}", v),
                Ok(None) => {}
                Err(e) => println!("error: {}", e),
            }
        }
    }
}

/// Runs a program on a fresh reference IR session.
pub fn run(src: &str) -> Result<Option<f64>> {
    Session::new(ir::Module::new(), Options::default()).run(src)
}
