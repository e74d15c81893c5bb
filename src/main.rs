use std::io;
use std::path::Path;
use std::{env, fs, process};

use cinder::bytecode::compile::Compiler;
use cinder::bytecode::{disasm, image};
use cinder::frontend::lexer::Lexer;
use cinder::frontend::parser::Parser;
use cinder::runtime::Vm;

fn main() {
    let args: Vec<String> = env::args().collect();

    let tokens_only = args.contains(&"--tokens".to_string());
    let ast_only = args.contains(&"--ast".to_string());
    let show_ir = args.contains(&"--ir".to_string());
    let no_run = args.contains(&"--no-run".to_string());
    let emit = flag_value(&args, "--emit");

    // First non-flag argument (skipping --emit's value) is the input file.
    let filename = args
        .iter()
        .enumerate()
        .skip(1)
        .find(|(i, a)| !a.starts_with('-') && !is_flag_value(&args, *i))
        .map(|(_, a)| a.clone());

    let Some(filename) = filename else {
        print_usage();
        process::exit(if args.len() > 1 { 1 } else { 0 });
    };

    match Path::new(&filename).extension().and_then(|e| e.to_str()) {
        Some("cdr") => run_source(&filename, tokens_only, ast_only, show_ir, no_run, emit),
        Some("cdrc") => run_image(&filename),
        _ => {
            eprintln!("error: expected a .cdr or .cdrc file, got '{}'", filename);
            process::exit(1);
        }
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    let at = args.iter().position(|a| a == flag)?;
    args.get(at + 1).cloned()
}

fn is_flag_value(args: &[String], i: usize) -> bool {
    i > 0 && args[i - 1] == "--emit"
}

fn print_usage() {
    println!("cinder - a small imperative language on a stack-machine VM");
    println!();
    println!("Usage:");
    println!("  cinder <file.cdr>             Compile and run a program");
    println!("  cinder <file.cdrc>            Run a compiled program image");
    println!("  cinder --tokens <file.cdr>    Dump the token stream");
    println!("  cinder --ast <file.cdr>       Dump the syntax tree");
    println!("  cinder --ir <file.cdr>        Print the IR listing");
    println!("  cinder --no-run <file.cdr>    Analyze without executing");
    println!("  cinder --emit <out.cdrc> <file.cdr>");
    println!("                                Write a compiled program image");
}

fn run_source(
    filename: &str,
    tokens_only: bool,
    ast_only: bool,
    show_ir: bool,
    no_run: bool,
    emit: Option<String>,
) {
    let source = match fs::read_to_string(filename) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", filename, e);
            process::exit(1);
        }
    };

    let tokens = match Lexer::new(&source).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };
    if tokens_only {
        for token in &tokens {
            println!("{}", token);
        }
        return;
    }

    let tree = match Parser::new(tokens).parse() {
        Ok(tree) => tree,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };
    if ast_only {
        print!("{}", tree.render());
        return;
    }

    let compiled = match Compiler::compile(&tree) {
        Ok(compiled) => compiled,
        Err(diags) => {
            eprint!("{}", diags);
            process::exit(1);
        }
    };
    for warning in &compiled.warnings {
        eprintln!("{}", warning);
    }

    if show_ir {
        disasm::print(&compiled.program);
    }
    if let Some(out) = emit {
        if let Err(e) = image::save(&compiled.program, Path::new(&out)) {
            eprintln!("error: cannot write '{}': {}", out, e);
            process::exit(1);
        }
    }
    if no_run {
        return;
    }

    execute(&compiled.program);
}

fn run_image(filename: &str) {
    let program = match image::load(Path::new(filename)) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("error: cannot load '{}': {}", filename, e);
            process::exit(1);
        }
    };
    execute(&program);
}

fn execute(program: &cinder::bytecode::Program) {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut vm = Vm::new(stdin.lock(), stdout.lock());
    if let Err(e) = vm.run(program) {
        eprintln!("{}", e);
        process::exit(1);
    }
}
