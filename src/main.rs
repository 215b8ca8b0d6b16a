mod analyzer;
mod builtins;
mod error;
mod executor;
mod job_control;
mod jobs;
mod lexer;
mod parser;
mod shell;

use std::io::{self, BufRead};

use lexer::TokenKind;

fn main() {
    env_logger::init();

    let mut shell = match shell::Shell::init() {
        Ok(shell) => shell,
        Err(err) => {
            eprintln!("pgsh: {err}");
            std::process::exit(1);
        }
    };

    shell.prompt(None);

    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                eprintln!("pgsh: {err}");
                break;
            }
        }

        let tokens = lexer::tokenize(&line);
        shell.lines_read += tokens
            .iter()
            .filter(|tk| tk.kind == TokenKind::Newline)
            .count();

        let mut errors = Vec::new();
        let tree = parser::parse(&tokens, shell.lines_read, &mut errors);

        if !errors.is_empty() {
            for err in &errors {
                eprintln!("{err}");
            }
        } else if let Some(tree) = tree {
            for pipeline in analyzer::analyze(&tree) {
                if let Err(err) = executor::launch(&mut shell, &pipeline) {
                    eprintln!("pgsh: {err}");
                }
                if shell.exit_request.is_some() {
                    break;
                }
            }
        }

        if shell.exit_request.is_some() {
            break;
        }

        shell.notifications();
        shell.prompt(None);
    }

    std::process::exit(shell.exit_request.unwrap_or(0));
}
