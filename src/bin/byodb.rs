//! Interactive shell: reads statements, executes them against a database
//! file, prints results. Dot commands handle everything that is not SQL
//! (`.tables`, `.quit`).

use std::env;
use std::process::ExitCode;

use byodb::{Database, ExecuteResult};
use eyre::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const PROMPT: &str = "byodb> ";

fn main() -> ExitCode {
    env_logger::init();

    let Some(path) = env::args().nth(1) else {
        eprintln!("usage: byodb <database-file>");
        return ExitCode::FAILURE;
    };

    match run(&path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(path: &str) -> Result<()> {
    let db = Database::open(path)?;
    let mut editor = DefaultEditor::new()?;

    println!("byodb shell - .quit to exit");

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);

                if let Some(command) = line.strip_prefix('.') {
                    if !dot_command(&db, command)? {
                        break;
                    }
                    continue;
                }

                match db.execute(line) {
                    Ok(result) => print_result(result),
                    Err(err) => eprintln!("error: {:#}", err),
                }
            }
            Err(ReadlineError::Interrupted) => println!("^C"),
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("input error: {}", err);
                break;
            }
        }
    }

    db.close()
}

/// Returns `false` when the shell should exit.
fn dot_command(db: &Database, command: &str) -> Result<bool> {
    match command {
        "quit" | "exit" => return Ok(false),
        "tables" => {
            for name in db.tables()? {
                println!("{}", name);
            }
        }
        other => eprintln!("unknown command '.{}'", other),
    }
    Ok(true)
}

fn print_result(result: ExecuteResult) {
    match result {
        ExecuteResult::TableCreated { name } => println!("created table {}", name),
        ExecuteResult::Inserted { rows } => println!("inserted {} row(s)", rows),
        ExecuteResult::NoOp => {}
        ExecuteResult::Rows(set) => {
            println!("{}", set.columns.join(" | "));
            for row in &set.rows {
                println!("{}", row.join(" | "));
            }
            println!("({} row(s))", set.rows.len());
        }
    }
}
