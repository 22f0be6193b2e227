use std::io::Write;

use clap::{Args, Parser, Subcommand};
use monkey::{
    parser::{parse, ParseErrors},
    tokenizer::{TokenType, Tokenizer},
    tree_walk_interpreter::{ExecutionError, Interpreter, Value},
};

#[derive(Debug, Parser)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn command(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Repl)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start an interactive session.
    Repl,
    /// Evaluate a source file and print its final value.
    Run(FileArgs),
    /// Print the tokens of a source file.
    Tokens(FileArgs),
    /// Print the canonical rendering of a parsed source file.
    Ast(FileArgs),
}

#[derive(Debug, Args)]
struct FileArgs {
    file: String,
}

#[derive(Debug, thiserror::Error)]
enum InterpretError {
    #[error("failed to read source file: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] ParseErrors),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

fn main() {
    let args = Cli::parse();

    let result = match args.command() {
        Command::Repl => repl_command(),
        Command::Run(args) => run_command(args),
        Command::Tokens(args) => tokens_command(args),
        Command::Ast(args) => ast_command(args),
    };

    if let Err(e) = result {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn repl_command() -> Result<(), InterpretError> {
    println!("Welcome to the Monkey REPL!");
    println!("EOF or \\q to exit. (Ctrl+D on *nix, Ctrl+Z on Windows)");

    let mut interpreter = Interpreter::default();
    let mut input = String::new();

    loop {
        print!(">> ");
        std::io::stdout().flush()?;

        input.clear();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }

        let source = input.trim();
        if source == "\\q" {
            break;
        }
        if source.is_empty() {
            continue;
        }

        match interpret(&mut interpreter, source) {
            Ok(Some(value)) => println!("{value}"),
            Ok(None) => {}
            Err(InterpretError::Parse(errors)) => {
                for error in &errors.0 {
                    println!("\t{error}");
                }
            }
            Err(e) => println!("Error: {e}"),
        }
    }

    Ok(())
}

fn run_command(args: &FileArgs) -> Result<(), InterpretError> {
    let source = std::fs::read_to_string(&args.file)?;
    let mut interpreter = Interpreter::default();
    if let Some(value) = interpret(&mut interpreter, &source)? {
        println!("{value}");
    }
    Ok(())
}

fn tokens_command(args: &FileArgs) -> Result<(), InterpretError> {
    let source = std::fs::read_to_string(&args.file)?;

    let mut line = 0;
    for token in Tokenizer::new(&source) {
        if token.span.start_line != line {
            print!("{:4} ", token.span.start_line);
            line = token.span.start_line;
        } else {
            print!("   | ");
        }

        println!("{:<10} {}", token.token_type().to_string(), token.lexeme);

        if *token.token_type() == TokenType::Eof {
            break;
        }
    }

    Ok(())
}

fn ast_command(args: &FileArgs) -> Result<(), InterpretError> {
    let source = std::fs::read_to_string(&args.file)?;
    let program = parse(&source)?;
    for statement in &program.0 {
        println!("{statement}");
    }
    Ok(())
}

fn interpret(interpreter: &mut Interpreter, source: &str) -> Result<Option<Value>, InterpretError> {
    let program = parse(source)?;
    Ok(interpreter.interpret(&program)?)
}
