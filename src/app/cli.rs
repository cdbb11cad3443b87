use std::{
    io::{self, Write},
    time::Duration,
};

use crossterm::{
    cursor,
    event::{self, Event, KeyCode},
    execute, terminal,
};
use log::error;

use crate::error::Result;
use crate::manager::session::Session;
use crate::models::status::styled;
use crate::models::task::TaskId;

enum Input {
    Line(String),
    Exit,
}

pub fn run_cli(mut session: Session) -> Result<()> {
    println!("Batch runner started. Enter a command, 'help' for a list or 'exit' to quit.");
    let mut commands_history: Vec<String> = Vec::new();

    terminal::enable_raw_mode()?;
    let result = command_loop(&mut session, &mut commands_history);
    terminal::disable_raw_mode()?;
    result
}

fn command_loop(session: &mut Session, commands_history: &mut Vec<String>) -> Result<()> {
    loop {
        let input = match read_line(commands_history)? {
            Input::Line(input) => input,
            Input::Exit => return Ok(()),
        };
        if !input.trim().is_empty() {
            commands_history.push(input.clone());
        }

        let mut args = input.split_whitespace();
        match args.next() {
            Some(keyword @ ("add" | "try")) => {
                let can_fail = keyword == "try";
                let command = command_argument(&input).to_string();
                if command.is_empty() {
                    println!("\rCommand to execute must be specified.");
                } else {
                    let id = session.add_shell_task(command, can_fail);
                    println!("\rAdded task with ID: {}", id);
                }
            }
            Some("run") => {
                println!("\rRunning batch. Press Esc to abort the current task.");
                match session.run(abort_pressed) {
                    Ok(outcome) if outcome.succeeded() => {
                        println!("\rBatch finished, {} task(s) done.", outcome.finished.len());
                    }
                    Ok(outcome) => {
                        println!("\rBatch stopped. Open tasks: {:?}", outcome.open);
                    }
                    Err(e) => error!("Batch execution failed: {}", e),
                }
            }
            Some("status") => match args.next().map(str::parse::<TaskId>) {
                Some(Ok(id)) => match session.task(id) {
                    Some(task) => {
                        println!("\rTask {} status: {}", id, task.status);
                        if let Some(message) = &task.last_message {
                            println!("\rLast message: {}", message);
                        }
                    }
                    None => println!("\rTask {} not found", id),
                },
                Some(Err(_)) => println!("\rInvalid task ID format."),
                None => println!("\rTask ID must be specified."),
            },
            Some("list") => {
                let tasks = session.get_all_tasks();
                if tasks.is_empty() {
                    println!("\rNo tasks");
                } else {
                    println!("\r{}\t {:^7} \t {}", "ID", "Status", "Command");
                    println!("\r{}", "-".repeat(60));
                    for task in tasks {
                        let optional = if task.can_fail { " (may fail)" } else { "" };
                        println!("\r{}\t {} \t {}{}", task.id, styled(task.status), task.label, optional);
                    }
                }
                if !session.is_connected() {
                    println!("\rConnection is marked as lost.");
                }
            }
            Some("clear") => {
                session.clear();
                println!("\rRemoved all tasks that were not started.");
            }
            Some("reset") => {
                session.reset();
                println!("\rBatch reset.");
            }
            Some("lost") => {
                if let Err(e) = session.connection_lost() {
                    error!("Failed to signal connection loss: {}", e);
                }
            }
            Some("reconnect") => {
                if let Err(e) = session.reconnected() {
                    error!("Failed to signal reconnect: {}", e);
                }
            }
            Some("help") => print_help(),
            Some("exit") => {
                println!("\rExiting the program...");
                return Ok(());
            }
            Some(cmd) => {
                println!("\rUnknown command: {}. Please try again.", cmd);
            }
            None => continue,
        }
    }
}

fn read_line(commands_history: &[String]) -> Result<Input> {
    let mut history_index = commands_history.len();
    let mut input = String::new();
    print!("\r>>> ");
    io::stdout().flush()?;

    loop {
        let Event::Key(key_event) = event::read()? else {
            continue;
        };
        match key_event.code {
            KeyCode::Enter => {
                println!();
                return Ok(Input::Line(input));
            }
            KeyCode::Up => {
                if history_index > 0 {
                    history_index -= 1;
                }
                if let Some(command) = commands_history.get(history_index) {
                    input = command.clone();
                    redraw(&input)?;
                }
            }
            KeyCode::Down => {
                if history_index < commands_history.len() {
                    history_index += 1;
                }
                input = commands_history.get(history_index).cloned().unwrap_or_default();
                redraw(&input)?;
            }
            KeyCode::Char(c) => {
                input.push(c);
                print!("{}", c);
                io::stdout().flush()?;
            }
            KeyCode::Backspace => {
                input.pop();
                redraw(&input)?;
            }
            KeyCode::Esc if input.is_empty() => {
                println!();
                return Ok(Input::Exit);
            }
            _ => {}
        }
    }
}

fn abort_pressed() -> io::Result<bool> {
    while event::poll(Duration::ZERO)? {
        if let Event::Key(key_event) = event::read()? {
            if key_event.code == KeyCode::Esc {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Everything after the first word, with inner whitespace preserved.
fn command_argument(input: &str) -> &str {
    input
        .trim()
        .split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim_start())
        .unwrap_or("")
}

fn redraw(input: &str) -> io::Result<()> {
    execute!(
        io::stdout(),
        cursor::MoveToColumn(0),
        terminal::Clear(terminal::ClearType::CurrentLine)
    )?;
    print!(">>> {}", input);
    io::stdout().flush()
}

fn print_help() {
    println!("\r  add <command>    queue a shell command");
    println!("\r  try <command>    queue a shell command that may fail");
    println!("\r  run              run or resume the batch");
    println!("\r  list             show all tasks");
    println!("\r  status <id>      show the status of a task");
    println!("\r  clear            drop tasks that were not started");
    println!("\r  reset            forget the whole batch");
    println!("\r  lost, reconnect  simulate a lost and restored connection");
    println!("\r  exit             quit");
}
