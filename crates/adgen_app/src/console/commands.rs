//! Parses the lines typed at the prompt into reducer messages.

use adgen_core::{CandidateId, Direction, JobKind, Msg, Ticket};
use serde_json::Value;
use thiserror::Error;

pub const HELP: &str = "\
commands:
  start <kind> [json]     start a job (campaign, deep_research, prompt_scoring, image_set, video)
  review <ticket>         work on a finished job's candidates
  accept <id>             save the top candidate
  reject <id>             reject the top candidate
  restore                 undo the last decision
  open <ticket> <id>      show one candidate from the gallery
  retry <ticket>          retry a failed or halted job
  export                  write the saved candidates of the reviewed job
  refresh                 reload plan and credits
  dismiss                 clear notices
  help                    show this text
  quit                    close the screen and exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Send(Msg),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command `{0}`, type `help`")]
    Unknown(String),
    #[error("`{command}` needs {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },
    #[error("unknown job kind `{0}`")]
    UnknownKind(String),
    #[error("`{0}` is not a ticket number")]
    BadTicket(String),
    #[error("parameters are not valid JSON: {0}")]
    BadParameters(String),
}

/// Returns `None` for blank lines.
pub fn parse(line: &str) -> Option<Result<Command, CommandError>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    Some(parse_command(&word.to_ascii_lowercase(), rest))
}

fn parse_command(word: &str, rest: &str) -> Result<Command, CommandError> {
    let msg = match word {
        "start" => parse_start(rest)?,
        "review" => Msg::ReviewSelected {
            ticket: ticket_arg("review", rest)?,
        },
        "accept" | "save" => swipe("accept", rest, Direction::Accept)?,
        "reject" => swipe("reject", rest, Direction::Reject)?,
        "restore" | "undo" => Msg::RestoreClicked,
        "open" => {
            let (ticket, id) = rest.split_once(char::is_whitespace).ok_or(
                CommandError::MissingArgument {
                    command: "open",
                    expected: "a ticket and a candidate id",
                },
            )?;
            Msg::CandidateOpened {
                ticket: ticket_arg("open", ticket)?,
                candidate_id: CandidateId::new(id.trim()),
            }
        }
        "retry" => Msg::RetryClicked {
            ticket: ticket_arg("retry", rest)?,
        },
        "export" => Msg::ExportClicked,
        "refresh" => Msg::ScreenOpened,
        "dismiss" => Msg::NoticesDismissed,
        "help" | "?" => return Ok(Command::Help),
        "quit" | "exit" => return Ok(Command::Quit),
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Command::Send(msg))
}

fn parse_start(rest: &str) -> Result<Msg, CommandError> {
    let (kind, json) = match rest.split_once(char::is_whitespace) {
        Some((kind, json)) => (kind, json.trim()),
        None => (rest, ""),
    };
    if kind.is_empty() {
        return Err(CommandError::MissingArgument {
            command: "start",
            expected: "a job kind",
        });
    }
    let kind = JobKind::from_wire_name(kind)
        .ok_or_else(|| CommandError::UnknownKind(kind.to_string()))?;
    let parameters = if json.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(json).map_err(|err| CommandError::BadParameters(err.to_string()))?
    };
    Ok(Msg::StartRequested { kind, parameters })
}

fn swipe(command: &'static str, rest: &str, direction: Direction) -> Result<Msg, CommandError> {
    if rest.is_empty() {
        return Err(CommandError::MissingArgument {
            command,
            expected: "a candidate id",
        });
    }
    Ok(Msg::CandidateSwiped {
        candidate_id: CandidateId::new(rest),
        direction,
    })
}

fn ticket_arg(command: &'static str, arg: &str) -> Result<Ticket, CommandError> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Err(CommandError::MissingArgument {
            command,
            expected: "a ticket number",
        });
    }
    arg.trim_start_matches('#')
        .parse()
        .map_err(|_| CommandError::BadTicket(arg.to_string()))
}
