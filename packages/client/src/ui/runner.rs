//! Interactive client loop.
//!
//! Readline runs on a blocking thread and hands lines over an mpsc channel.
//! A printer task echoes connection changes and notices as they arrive.

use std::{io::Write, sync::Arc};

use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::{broadcast, mpsc};

use crate::{
    domain::{Role, UserIdentity},
    usecase::{QueueSession, SessionSnapshot},
};

use super::{command::CliCommand, error::ClientError, formatter::SessionFormatter};

fn prompt_for(role: Role) -> String {
    match role {
        Role::Patient => "patient> ".to_string(),
        Role::Staff => "staff> ".to_string(),
        Role::Admin => "admin> ".to_string(),
    }
}

/// Redisplay the prompt after asynchronous output
fn redisplay_prompt(prompt: &str) {
    print!("{}", prompt);
    std::io::stdout().flush().ok();
}

/// Run the interactive client until the user quits
pub async fn run_client(
    session: Arc<QueueSession>,
    identity: UserIdentity,
) -> Result<(), ClientError> {
    let prompt = prompt_for(identity.role);
    let mut notices = session.notices();
    let mut snapshots = session.start(identity).await?;
    println!(
        "\nSession {} started. Type 'help' for commands, Ctrl+D to exit.\n",
        session.id()
    );

    let printer_prompt = prompt.clone();
    let printer = tokio::spawn(async move {
        let mut last = snapshots.borrow_and_update().connection;
        loop {
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let connection = snapshots.borrow_and_update().connection;
                    if connection != last {
                        last = connection;
                        print!("{}", SessionFormatter::format_connection(connection));
                        redisplay_prompt(&printer_prompt);
                    }
                }
                notice = notices.recv() => match notice {
                    Ok(notice) => {
                        print!("{}", SessionFormatter::format_notice(&notice));
                        redisplay_prompt(&printer_prompt);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Skipped {} notices", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });

    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
    let readline_prompt = prompt.clone();
    let _readline_handle = std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        loop {
            match rl.readline(&readline_prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    while let Some(line) = input_rx.recv().await {
        let command = match line.parse::<CliCommand>() {
            Ok(command) => command,
            Err(e) => {
                print!("{}", SessionFormatter::format_error(&e));
                continue;
            }
        };
        if command == CliCommand::Quit {
            break;
        }
        print!("{}", execute(&session, command).await);
    }

    printer.abort();
    session.stop().await;
    tracing::info!("Client session ended normally");
    Ok(())
}

async fn execute(session: &QueueSession, command: CliCommand) -> String {
    match command {
        CliCommand::Join(clinic_id) => match session.join_queue_for_clinic(&clinic_id).await {
            Ok(token) => SessionFormatter::format_joined(token.token_number, token.queue_id.as_str()),
            Err(e) => SessionFormatter::format_error(&e),
        },
        CliCommand::Leave => match session.leave_queue().await {
            Ok(()) => "\nLeft the queue\n".to_string(),
            Err(e) => SessionFormatter::format_error(&e),
        },
        CliCommand::Next => match session.call_next().await {
            Ok(dispatch) => SessionFormatter::format_dispatch("Call next", dispatch),
            Err(e) => SessionFormatter::format_error(&e),
        },
        CliCommand::Complete => match session.complete_current().await {
            Ok(dispatch) => SessionFormatter::format_dispatch("Complete", dispatch),
            Err(e) => SessionFormatter::format_error(&e),
        },
        CliCommand::Open | CliCommand::Pause => {
            let is_active = command == CliCommand::Open;
            match session.set_queue_active(is_active).await {
                Ok(queue) => SessionFormatter::format_queue(&queue),
                Err(e) => SessionFormatter::format_error(&e),
            }
        }
        CliCommand::Init(max_queue_size) => match session.initialize_queue(max_queue_size).await {
            Ok(queue) => SessionFormatter::format_queue(&queue),
            Err(e) => SessionFormatter::format_error(&e),
        },
        CliCommand::Refresh => refresh(session).await,
        CliCommand::Reconnect => match session.reconnect().await {
            Ok(()) => "\nReconnecting...\n".to_string(),
            Err(e) => SessionFormatter::format_error(&e),
        },
        CliCommand::Status => SessionFormatter::format_snapshot(&session.snapshot()),
        CliCommand::Help => SessionFormatter::format_help(),
        CliCommand::Quit => String::new(),
    }
}

async fn refresh(session: &QueueSession) -> String {
    if let Err(e) = session.refresh_active_token().await {
        return SessionFormatter::format_error(&e);
    }
    if let Err(e) = session.refresh_queue().await {
        return SessionFormatter::format_error(&e);
    }
    let snapshot: SessionSnapshot = session.snapshot();
    SessionFormatter::format_snapshot(&snapshot)
}
