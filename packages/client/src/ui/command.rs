//! Parsing of interactive input lines.

use std::str::FromStr;

use thiserror::Error;

use crate::{config::DEFAULT_MAX_QUEUE_SIZE, domain::ClinicId};

/// A line typed at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Join(ClinicId),
    Leave,
    Next,
    Complete,
    Status,
    Open,
    Pause,
    Init(u32),
    Refresh,
    Reconnect,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command '{0}', type 'help'")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

impl FromStr for CliCommand {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(ParseError::Usage("help"));
        };
        let argument = words.next();

        let command = match verb.to_ascii_lowercase().as_str() {
            "join" => {
                let clinic = argument.ok_or(ParseError::Usage("join <clinic-id>"))?;
                CliCommand::Join(
                    ClinicId::new(clinic).map_err(|_| ParseError::Usage("join <clinic-id>"))?,
                )
            }
            "leave" => CliCommand::Leave,
            "next" => CliCommand::Next,
            "complete" | "done" => CliCommand::Complete,
            "status" | "s" => CliCommand::Status,
            "open" => CliCommand::Open,
            "pause" => CliCommand::Pause,
            "init" => match argument {
                Some(size) => CliCommand::Init(
                    size.parse()
                        .map_err(|_| ParseError::Usage("init [max-queue-size]"))?,
                ),
                None => CliCommand::Init(DEFAULT_MAX_QUEUE_SIZE),
            },
            "refresh" => CliCommand::Refresh,
            "reconnect" => CliCommand::Reconnect,
            "help" | "?" => CliCommand::Help,
            "quit" | "exit" | "q" => CliCommand::Quit,
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_join_with_clinic() {
        // テスト項目: join コマンドはクリニック ID を受け取る
        // given (前提条件):
        let line = "join clinicA";

        // when (操作):
        let command: CliCommand = line.parse().unwrap();

        // then (期待する結果):
        assert_eq!(command, CliCommand::Join(ClinicId::new("clinicA").unwrap()));
    }

    #[test]
    fn test_parse_join_without_clinic_shows_usage() {
        // テスト項目: クリニック ID の無い join は使い方エラー
        assert_eq!(
            "join".parse::<CliCommand>(),
            Err(ParseError::Usage("join <clinic-id>"))
        );
    }

    #[test]
    fn test_parse_init_defaults_to_fifty() {
        // テスト項目: init の最大人数は省略時 50
        assert_eq!("init".parse::<CliCommand>(), Ok(CliCommand::Init(50)));
        assert_eq!("init 20".parse::<CliCommand>(), Ok(CliCommand::Init(20)));
        assert!("init many".parse::<CliCommand>().is_err());
    }

    #[test]
    fn test_parse_is_case_insensitive_with_aliases() {
        // テスト項目: コマンドは大文字小文字を区別せず、別名も受け付ける
        assert_eq!("NEXT".parse::<CliCommand>(), Ok(CliCommand::Next));
        assert_eq!("done".parse::<CliCommand>(), Ok(CliCommand::Complete));
        assert_eq!("q".parse::<CliCommand>(), Ok(CliCommand::Quit));
    }

    #[test]
    fn test_parse_unknown_command() {
        // テスト項目: 未知のコマンドはエラー
        assert_eq!(
            "dance".parse::<CliCommand>(),
            Err(ParseError::Unknown("dance".to_string()))
        );
    }
}
