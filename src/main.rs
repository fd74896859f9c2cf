use std::{
    env::args_os,
    error::Error,
    fs,
    io::{self, stdin, IsTerminal},
    path::Path,
    process::ExitCode,
};

use bergskript::interpreter::Interpreter;
use bergskript::value::Value;
use num_traits::ToPrimitive;
use rustyline::validate::MatchingBracketValidator;
use rustyline::{
    error::ReadlineError, Cmd, ConditionalEventHandler, Editor, Event, EventContext, EventHandler,
    KeyEvent, Movement, RepeatCount,
};
use rustyline::{Completer, Helper, Highlighter, Hinter, Validator};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    if let Ok(filter) = EnvFilter::try_from_env("BERGSKRIPT_LOG") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    if args_os().len() > 2 {
        eprintln!("usage: bergskript [file]");
        return ExitCode::FAILURE;
    }

    if let Some(arg) = args_os().nth(1) {
        run_file(Path::new(&arg))
    } else if run_prompt().is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// The low byte of an Integer result, like a C `exit` would keep.
fn exit_code(val: &Value) -> ExitCode {
    match val.as_integer().ok().and_then(|x| x.to_i64()) {
        Some(x) => ExitCode::from(x as u8),
        None => ExitCode::FAILURE,
    }
}

fn run_file(path: &Path) -> ExitCode {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            eprintln!("error reading {}: {}", path.display(), err);
            return ExitCode::FAILURE;
        }
    };
    let mut interpreter = Interpreter::new();
    match interpreter.run(&content) {
        Ok(val) => exit_code(&val),
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

struct TabEventHandler;
impl ConditionalEventHandler for TabEventHandler {
    fn handle(&self, _: &Event, _n: RepeatCount, _: bool, _: &EventContext) -> Option<Cmd> {
        Some(Cmd::Indent(Movement::WholeLine))
    }
}

#[derive(Helper, Completer, Hinter, Highlighter, Validator)]
struct ReplHelper {
    #[rustyline(Completer)]
    completer: (),
    #[rustyline(Validator)]
    validator: MatchingBracketValidator,
}

fn run_source(interpreter: &mut Interpreter, code: &str) {
    match interpreter.run(code) {
        Ok(val) => println!("{}", val),
        Err(err) => println!("error: {}", err),
    }
}

/// Lines are collected until an empty one, then the whole buffer runs as one program.
fn run_prompt() -> Result<(), Box<dyn Error>> {
    let mut interpreter = Interpreter::new();
    if !stdin().is_terminal() {
        let program = io::read_to_string(stdin().lock())?;
        run_source(&mut interpreter, &program);
        return Ok(());
    }

    let h = ReplHelper {
        completer: (),
        validator: MatchingBracketValidator::new(),
    };
    let mut rl = Editor::new()?;
    rl.set_helper(Some(h));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabEventHandler)),
    );

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() { "> " } else { ". " };
        match rl.readline(prompt) {
            Ok(line) if line.trim().is_empty() => {
                if !buffer.is_empty() {
                    run_source(&mut interpreter, &buffer);
                    buffer.clear();
                }
            }
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                buffer.push_str(&line);
                buffer.push('\n');
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(()),
            Err(err) => break Err(Box::new(err)),
        }
    }
}
