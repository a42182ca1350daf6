//! Text formatting for the interactive client.

use qure_shared::time::timestamp_to_clock_time;

use crate::{
    domain::{ConnectionState, Notice, NoticeKind, Queue, TokenStatus},
    usecase::{Dispatch, SessionSnapshot},
};

const RULE: &str = "============================================================";

/// Formatter for session output
pub struct SessionFormatter;

impl SessionFormatter {
    pub fn format_connection(state: ConnectionState) -> String {
        let label = match state {
            ConnectionState::Disconnected => "disconnected (type 'reconnect' to retry)",
            ConnectionState::Connecting => "connecting...",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "connection lost, reconnecting...",
            ConnectionState::AuthFailed => "authentication failed",
        };
        format!("\n* {}\n", label)
    }

    /// Format the full read-model
    ///
    /// # Arguments
    ///
    /// * `snapshot` - Current session snapshot
    ///
    /// # Returns
    ///
    /// A framed block with connection, token and queue lines
    pub fn format_snapshot(snapshot: &SessionSnapshot) -> String {
        let mut output = String::new();
        output.push_str(&format!("\n{}\n", RULE));
        output.push_str(&format!("Connection: {:?}\n", snapshot.connection));

        match &snapshot.queue_handle {
            Some(handle) => output.push_str(&format!(
                "Queue: {} ({})\n",
                handle.queue_id,
                if handle.is_active { "open" } else { "paused" }
            )),
            None => output.push_str("Queue: (none)\n"),
        }

        match &snapshot.active_token {
            Some(token) => output.push_str(&format!(
                "Your token: #{} - {}\n",
                token.token_number,
                Self::status_label(token.status)
            )),
            None => output.push_str("Your token: (none)\n"),
        }

        if let Some(status) = &snapshot.queue_status {
            output.push_str(&format!(
                "Now serving: #{} | waiting: {}",
                status.current_token_no, status.waiting_count
            ));
            if let Some(last) = status.last_served_token_number {
                output.push_str(&format!(" | last served: #{}", last));
            }
            if let Some(minutes) = status.estimated_wait_time {
                output.push_str(&format!(" | est. wait: {} min", minutes));
            }
            output.push('\n');
        }

        output.push_str(RULE);
        output.push('\n');
        output
    }

    pub fn format_notice(notice: &Notice) -> String {
        let time = timestamp_to_clock_time(notice.raised_at).unwrap_or_default();
        let text = match &notice.kind {
            NoticeKind::YourTurn { token_number } => {
                format!("It's your turn! Token #{} is being called", token_number)
            }
            NoticeKind::TokenSkipped { token_number } => {
                format!("Token #{} was skipped", token_number)
            }
            NoticeKind::VisitComplete => "Visit complete, thank you".to_string(),
            NoticeKind::TokenUpdated { token_number } => {
                format!("Your token number is now #{}", token_number)
            }
            NoticeKind::QueueEmpty { message } if message.is_empty() => {
                "No patients are waiting".to_string()
            }
            NoticeKind::QueueEmpty { message } => message.clone(),
            NoticeKind::SessionExpired => "Session expired, please sign in again".to_string(),
        };
        let bell = if notice.haptic { "\x07" } else { "" };
        format!("\n{}[{}] {}\n", bell, time, text)
    }

    pub fn format_joined(token_number: u32, queue: &str) -> String {
        format!("\nJoined queue {} with token #{}\n", queue, token_number)
    }

    pub fn format_dispatch(verb: &str, dispatch: Dispatch) -> String {
        match dispatch {
            Dispatch::Sent => format!("\n{} sent\n", verb),
            Dispatch::Suppressed => format!("\n{} already in progress\n", verb),
        }
    }

    pub fn format_queue(queue: &Queue) -> String {
        format!(
            "\nQueue {} is {} (max {} tokens)\n",
            queue.id,
            if queue.is_active { "open" } else { "paused" },
            queue.max_queue_size
        )
    }

    pub fn format_error(error: &dyn std::fmt::Display) -> String {
        format!("\n! {}\n", error)
    }

    pub fn format_help() -> String {
        let mut output = String::new();
        output.push_str("\nCommands:\n");
        output.push_str("  join <clinic-id>   take a token in the clinic's queue (patient)\n");
        output.push_str("  leave              give up your token (patient)\n");
        output.push_str("  next               call the next token (staff)\n");
        output.push_str("  complete           complete the token being served (staff)\n");
        output.push_str("  open | pause       open or pause today's queue (staff)\n");
        output.push_str("  init [max]         create today's queue (staff)\n");
        output.push_str("  status             show the session state\n");
        output.push_str("  refresh            reload token and queue from the server\n");
        output.push_str("  reconnect          reconnect after retries ran out\n");
        output.push_str("  quit               exit\n");
        output
    }

    fn status_label(status: TokenStatus) -> &'static str {
        match status {
            TokenStatus::Waiting => "waiting",
            TokenStatus::Called => "called",
            TokenStatus::InProgress => "in progress",
            TokenStatus::Completed => "completed",
            TokenStatus::Skipped => "skipped",
        }
    }
}
