//! Interactive session reading snippets from stdin.
//!
//! Lines accumulate into a snippet until a blank line submits it. A line
//! starting with `:` at the start of a snippet is a meta-command.

use std::io::IsTerminal;
use std::path::PathBuf;

use rlm_core::{EngineConfig, Error, SessionRegistry};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{colors, exec, report};

const HELP: &str = "\
Enter Python, then a blank line to run it. `context` holds the loaded content.

  :info              session status
  :get NAME [MAX]    show a variable, up to MAX chars (default 10000)
  :reset             discard the session (counts against the reset quota)
  :load PATH...      load file(s), replacing the session
  :quit              exit
  :help              this text";

/// Characters shown by `:get` when no MAX is given.
const DEFAULT_VARIABLE_CHARS: usize = 10_000;

/// A meta-command entered at the prompt.
#[derive(Debug, PartialEq)]
enum Command {
    Info,
    Get { name: String, max: Option<usize> },
    Reset,
    Load(Vec<PathBuf>),
    Quit,
    Help,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.trim().trim_start_matches(':').split_whitespace();
    let Some(name) = words.next() else {
        return Err("Empty command. Try :help".to_string());
    };
    let args: Vec<&str> = words.collect();

    match (name, args.as_slice()) {
        ("info", []) => Ok(Command::Info),
        ("get", [name]) => Ok(Command::Get {
            name: name.to_string(),
            max: None,
        }),
        ("get", [name, max]) => {
            let max = max
                .parse()
                .map_err(|_| format!("MAX must be a number, got '{max}'"))?;
            Ok(Command::Get {
                name: name.to_string(),
                max: Some(max),
            })
        }
        ("get", _) => Err("Usage: :get NAME [MAX]".to_string()),
        ("reset", []) => Ok(Command::Reset),
        ("load", []) => Err("Usage: :load PATH...".to_string()),
        ("load", paths) => Ok(Command::Load(paths.iter().map(PathBuf::from).collect())),
        ("quit" | "q" | "exit", []) => Ok(Command::Quit),
        ("help" | "h", []) => Ok(Command::Help),
        (other, _) => Err(format!("Unknown command ':{other}'. Try :help")),
    }
}

/// Run the interactive loop until `:quit` or end of input.
pub async fn execute(config: EngineConfig, files: &[PathBuf], session: &str) -> anyhow::Result<()> {
    let registry = SessionRegistry::new(config);
    let interactive = std::io::stdin().is_terminal();

    if files.is_empty() {
        println!(
            "{}",
            colors::paint("No content loaded. Use :load PATH to start.", colors::DIM)
        );
    } else {
        println!("{}", exec::load(&registry, session, files).await?);
    }
    if interactive {
        println!("\n{HELP}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut snippet = String::new();

    loop {
        if interactive {
            print!("{}", if snippet.is_empty() { ">>> " } else { "... " });
            colors::flush_stdout();
        }

        let Some(line) = lines.next_line().await? else {
            if !snippet.trim().is_empty() {
                println!("{}", exec::run(&registry, session, &snippet).await?);
            }
            break;
        };

        if snippet.is_empty() && line.trim_start().starts_with(':') {
            match parse_command(&line) {
                Ok(Command::Quit) => break,
                Ok(command) => handle(&registry, session, command).await?,
                Err(message) => println!("{}", colors::paint(&message, colors::YELLOW)),
            }
            continue;
        }

        if line.trim().is_empty() {
            if !snippet.trim().is_empty() {
                println!("{}\n", exec::run(&registry, session, &snippet).await?);
            }
            snippet.clear();
            continue;
        }

        snippet.push_str(&line);
        snippet.push('\n');
    }

    Ok(())
}

async fn handle(registry: &SessionRegistry, session: &str, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Info => match registry.info(session).await {
            Ok(info) => println!("{}", report::info_report(&info)),
            Err(Error::SessionNotFound(_)) => {
                println!("No session '{session}'. Use :load PATH to start.")
            }
            Err(e) => return Err(e.into()),
        },
        Command::Get { name, max } => {
            let max = max.unwrap_or(DEFAULT_VARIABLE_CHARS);
            match registry.variable(session, &name).await {
                Ok(value) => println!("{}", report::variable_report(&name, value.as_ref(), max)),
                Err(Error::SessionNotFound(_)) => {
                    println!("No session '{session}'. Use :load PATH to start.")
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Reset => match registry.reset(session).await {
            Ok(receipt) => println!("{}", report::reset_report(session, &receipt)),
            Err(e) if e.is_quota() => println!("{}", colors::paint(&e.to_string(), colors::RED)),
            Err(e) => return Err(e.into()),
        },
        Command::Load(paths) => match exec::load(registry, session, &paths).await {
            Ok(summary) => println!("{summary}"),
            Err(e) => println!("{}", colors::paint(&format!("Error: {e}"), colors::RED)),
        },
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}
