use clap::{Parser, ValueEnum};
use sfpl::backend::Backend;
use sfpl::{ir, Options, Session};
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// Built-in IR, verifier and interpreter
    Ir,
    /// LLVM (needs the `llvm` feature)
    Llvm,
}

#[derive(Parser)]
#[command(name = "sfpl")]
#[command(about = "Compiles and runs small functional programs")]
struct Args {
    /// Program to run; starts an interactive prompt when omitted
    file: Option<PathBuf>,

    /// Print the parsed program
    #[arg(long)]
    dump_ast: bool,

    /// Print the generated IR
    #[arg(long)]
    dump_ir: bool,

    /// Report each compilation step
    #[arg(short, long)]
    verbose: bool,

    /// Code generation backend
    #[arg(long, value_enum, default_value_t = BackendKind::Ir)]
    backend: BackendKind,
}

fn drive<B: Backend>(backend: B, options: Options, file: Option<PathBuf>) {
    let mut session = Session::new(backend, options);

    let file_path = match file {
        Some(p) => p,
        None => {
            if let Err(e) = session.main_loop() {
                eprintln!("error: {}", e);
                process::exit(1);
            }
            return;
        }
    };

    let src = fs::read_to_string(&file_path).unwrap_or_else(|e| {
        eprintln!("Error reading file '{}': {}", file_path.display(), e);
        process::exit(1);
    });

    match session.run(&src) {
        Ok(Some(v)) => println!("{}", v),
        Ok(None) => {}
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

#[cfg(feature = "llvm")]
fn drive_llvm(options: Options, file: Option<PathBuf>) {
    match sfpl::llvm::LlvmBackend::new("sfpl") {
        Ok(backend) => drive(backend, options, file),
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

#[cfg(not(feature = "llvm"))]
fn drive_llvm(_options: Options, _file: Option<PathBuf>) {
    eprintln!("error: this build has no LLVM backend; rebuild with `--features llvm`");
    process::exit(1);
}

fn main() {
    let args = Args::parse();
    let options = Options {
        dump_ast: args.dump_ast,
        dump_ir: args.dump_ir,
        verbose: args.verbose,
    };

    match args.backend {
        BackendKind::Ir => drive(ir::Module::new(), options, args.file),
        BackendKind::Llvm => drive_llvm(options, args.file),
    }
}
