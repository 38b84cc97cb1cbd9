#[macro_use]
extern crate log;

use std::env::{args, var};
use std::fs;

use rustyline::error::ReadlineError;
use wisp::vm::{Profiler, TimeProfiler};
use wisp::{Evaluator, ScriptError, Value};

fn main() {
    env_logger::init();

    let file = args().nth(1);
    let with_profiler = var("PROFILE").map(|s| !s.is_empty()).unwrap_or(false);

    match file {
        Some(file) => run_file(&file, with_profiler),
        None => run_repl(),
    }
}

fn run_file(file_path: &str, with_profiler: bool) {
    let text = match fs::read_to_string(file_path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Unable to read {}: {}", file_path, e);
            std::process::exit(1);
        }
    };
    let mut evaluator = Evaluator::new(Some(file_path));

    let result = if with_profiler {
        let mut profiler = TimeProfiler::new();
        let result = run_profiled(&mut evaluator, &text, &mut profiler);
        if let Some(report) = profiler.report() {
            eprintln!("{}", report);
        }
        result
    } else {
        evaluator.evaluate(&text)
    };

    if let Err(e) = result {
        println!("{}", e.to_string(false));
        std::process::exit(1);
    }
}

fn run_profiled(evaluator: &mut Evaluator, text: &str, profiler: &mut TimeProfiler) -> Result<Value, ScriptError> {
    evaluator.start(text)?;
    loop {
        if let Some(value) = evaluator.execute_with_profiler(0, profiler)? {
            return Ok(value);
        }
        if evaluator.is_suspended() {
            warn!("a native procedure never supplied its result");
            return Ok(Value::Unspecified);
        }
    }
}

fn run_repl() {
    let mut rl = rustyline::Editor::<()>::new();
    let mut evaluator = Evaluator::new(Some("repl"));

    loop {
        let line = match rl.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Eof) => break,
            Err(ReadlineError::Interrupted) => continue,
            Err(e) => {
                error!("readline: {}", e);
                break;
            }
        };
        rl.add_history_entry(line.as_str());

        match evaluator.evaluate(&line) {
            Ok(Value::Unspecified) => {}
            Ok(value) => println!("{}", evaluator.to_repl(&value)),
            Err(e) => println!("{}", e.to_string(false)),
        }
    }
}
