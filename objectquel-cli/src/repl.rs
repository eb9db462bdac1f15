use crate::{Session, parse_params_json};
use anyhow::Result;
use objectquel::MemoryAdapter;
use objectquel::query::prepare;
use objectquel::Params;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Sql,
    Explain,
    Run,
}

/// Statements may span lines; a line ending in `;;` or a blank line ends
/// the statement.
fn statement_complete(buffer: &str, line: &str) -> bool {
    line.is_empty() || buffer.trim_end().ends_with(";;")
}

pub fn run_repl(session: &Session) -> Result<()> {
    println!("ObjectQuel REPL v{}", env!("CARGO_PKG_VERSION"));
    println!("Type .help for instructions, .exit to quit.\n");

    let options = session.config.query_options();
    let mut rl = DefaultEditor::new()?;
    let mut mode = Mode::Sql;
    let mut params = Params::new();
    let mut buffer = String::new();

    loop {
        let prompt = if buffer.is_empty() { "objectquel> " } else { "       ...> " };
        let line = match rl.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                buffer.clear();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        };
        let line = line.trim();

        if buffer.is_empty() && line.starts_with('.') {
            let _ = rl.add_history_entry(line);
            let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
            match command {
                ".exit" | ".quit" => break,
                ".help" => {
                    println!("Commands:");
                    println!("  .exit, .quit     Exit the REPL");
                    println!("  .sql             Print compiled SQL (default)");
                    println!("  .explain         Print the execution plan");
                    println!("  .run             Evaluate; only JSON ranges produce rows");
                    println!("  .params <json>   Set parameters, e.g. .params {{\"min\": 10}}");
                    println!("  <statement>      End with ';;' or a blank line");
                }
                ".sql" => mode = Mode::Sql,
                ".explain" => mode = Mode::Explain,
                ".run" => mode = Mode::Run,
                ".params" => match parse_params_json(Some(rest)) {
                    Ok(parsed) => {
                        println!("{} parameter(s) set", parsed.len());
                        params = parsed;
                    }
                    Err(e) => println!("Error: {e:#}"),
                },
                _ => println!("Unknown command: {command}"),
            }
            continue;
        }

        if buffer.is_empty() && line.is_empty() {
            continue;
        }
        buffer.push_str(line);
        buffer.push('\n');
        if !statement_complete(&buffer, line) {
            continue;
        }

        let source = buffer.trim_end().trim_end_matches(";;").to_string();
        buffer.clear();
        let _ = rl.add_history_entry(source.as_str());

        let start = Instant::now();
        let query = match prepare(&source, &session.schema, &options) {
            Ok(query) => query,
            Err(e) => {
                println!("Error: {e}");
                continue;
            }
        };
        match mode {
            Mode::Sql => match query.sql(&params) {
                Ok(compiled) => println!("{}", compiled.sql),
                Err(e) => println!("Error: {e}"),
            },
            Mode::Explain => match query.explain() {
                Ok(plan) => print!("{plan}"),
                Err(e) => println!("Error: {e}"),
            },
            Mode::Run => match query.execute(&mut MemoryAdapter::new(), &params) {
                Ok(rows) => {
                    for row in &rows {
                        println!("{}", serde_json::to_string(row)?);
                    }
                    println!("({} rows, {:.4}s)", rows.len(), start.elapsed().as_secs_f64());
                }
                Err(e) => println!("Error: {e}"),
            },
        }
    }

    Ok(())
}
