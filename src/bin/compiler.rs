use std::env::args;
use std::fs;
use std::io::{stdin, stdout, BufRead, Write};

use wisp::Evaluator;

fn main() {
    env_logger::init();

    match args().nth(1) {
        Some(file) => disassemble_file(&file),
        None => disassemble_lines(),
    }
}

fn disassemble_file(file_path: &str) {
    let text = match fs::read_to_string(file_path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Unable to read {}: {}", file_path, e);
            std::process::exit(1);
        }
    };
    let mut evaluator = Evaluator::new(Some(file_path));
    match evaluator.disassemble(&text) {
        Ok(listing) => print!("{}", listing),
        Err(e) => {
            println!("{}", e.to_string(false));
            std::process::exit(1);
        }
    }
}

fn disassemble_lines() {
    let mut evaluator = Evaluator::new(None);
    let input = stdin();
    let mut lines = input.lock().lines();

    loop {
        if stdout().write_all(b"> ").and_then(|_| stdout().flush()).is_err() {
            break;
        }
        let line = match lines.next() {
            Some(Ok(line)) => line,
            _ => break,
        };
        match evaluator.disassemble(&line) {
            Ok(listing) => print!("{}", listing),
            Err(e) => println!("{}", e.to_string(false)),
        }
    }
}
