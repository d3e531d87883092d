use std::{path::PathBuf, process::ExitCode, thread};

use clap::{Parser, Subcommand};

use kestrel::{stdlib::threading::WORKER_STACK_SIZE, Config, Interpreter, Repl, Result};

#[derive(Parser)]
#[command(author, version, about = "Kestrel language interpreter")]
struct Args {
    /// Extra directory searched for imported modules (repeatable)
    #[arg(long = "path", value_name = "DIR", global = true)]
    paths: Vec<PathBuf>,
    /// Print every module resolution step to stderr
    #[arg(long, global = true)]
    trace_imports: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a Kestrel script file
    Run {
        script: PathBuf,
        /// Arguments exposed to the script as `args`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Start an interactive REPL session
    Repl,
    /// Evaluate a snippet of Kestrel code and print its value
    Eval { source: String },
}

fn main() -> ExitCode {
    let args = Args::parse();
    // The evaluator recurses on the host stack; give it room. Diagnostics hold
    // `Rc`s, so only the rendered message leaves the thread.
    let worker = thread::Builder::new()
        .name("kestrel-main".to_string())
        .stack_size(WORKER_STACK_SIZE)
        .spawn(move || execute(args).map_err(|err| err.to_string()));
    let outcome = match worker {
        Ok(handle) => match handle.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                eprintln!("error: interpreter thread panicked");
                return ExitCode::FAILURE;
            }
        },
        Err(err) => {
            eprintln!("error: cannot start interpreter thread: {err}");
            return ExitCode::FAILURE;
        }
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn execute(args: Args) -> Result<()> {
    let mut config = Config::from_env().with_trace_imports(args.trace_imports);
    for path in args.paths {
        config = config.with_search_path(path);
    }
    match args.command.unwrap_or(Command::Repl) {
        Command::Run {
            script,
            args: script_args,
        } => {
            let mut interpreter = Interpreter::with_config(config.with_args(script_args));
            let result = interpreter.run_file(&script);
            let shutdown = interpreter.shutdown();
            result?;
            shutdown
        }
        Command::Repl => Repl::with_config(config).run(),
        Command::Eval { source } => {
            let mut interpreter = Interpreter::with_config(config);
            let value = interpreter.eval_source(&source)?;
            if !value.is_null() {
                println!("{}", value.repr());
            }
            drop(value);
            interpreter.shutdown()
        }
    }
}
