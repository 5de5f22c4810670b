use std::io::{self, BufRead, Write};
use std::{env, fs, process};

use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use minilua::{interpret, Error, VM};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "minilua=warn".into()),
        )
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    match args.len() {
        1 => run_prompt(),
        2 => run_file(&args[1]),
        _ => {
            println!("Usage: minilua [script]");
            process::exit(1);
        }
    }
}

fn run_file(path: &str) {
    let src = match fs::read_to_string(path) {
        Ok(src) => src,
        Err(err) => {
            error!(%path, %err, "could not read script");
            eprintln!("Could not open file {path}: {err}");
            process::exit(74);
        }
    };
    debug!(%path, bytes = src.len(), "loaded script");

    let mut vm = VM::default();
    if let Err(err) = interpret(&src, &mut vm) {
        report(&err);
        process::exit(match err {
            Error::Parse(_) | Error::Compile(_) => 65,
            Error::Runtime(_) => 70,
        });
    }
}

fn run_prompt() {
    // One machine for the whole session, so globals carry across lines.
    let mut vm = VM::default();
    let stdin = io::stdin();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let line = line.trim();
                if line == "exit" {
                    break;
                }
                if line.is_empty() {
                    continue;
                }
                debug!(%line, "evaluating");
                if let Err(err) = interpret(line, &mut vm) {
                    report(&err);
                }
            }
            Err(err) => {
                eprintln!("Read error: {err}");
                break;
            }
        }
    }
}

fn report(err: &Error) {
    match err {
        Error::Parse(errors) => {
            for err in errors {
                eprintln!("{err}");
            }
        }
        other => eprintln!("{other}"),
    }
}
