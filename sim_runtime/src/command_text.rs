use std::num::ParseIntError;

use thiserror::Error;

use crate::CommandPayload;

#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("invalid integer '{value}' for {context}: {source}")]
    InvalidInteger {
        value: String,
        context: &'static str,
        source: ParseIntError,
    },
}

/// Parse one line of the server's text command protocol.
pub fn parse_command_line(input: &str) -> Result<CommandPayload, CommandParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CommandParseError::Empty);
    }

    let mut parts = trimmed.split_whitespace();
    let verb = parts
        .next()
        .map(|v| v.to_ascii_lowercase())
        .ok_or(CommandParseError::Empty)?;

    match verb.as_str() {
        "step" | "round" => {
            let rounds_str = parts.next().unwrap_or("1");
            let rounds = parse_u32(rounds_str, "step rounds")?;
            Ok(CommandPayload::Step { rounds })
        }
        "back" => Ok(CommandPayload::Back),
        "forward" => Ok(CommandPayload::Forward),
        "jump" => {
            let round_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("round"))?;
            let round = parse_u64(round_str, "jump round")?;
            Ok(CommandPayload::Jump { round })
        }
        "resume" | "continue" => Ok(CommandPayload::Resume),
        "cutoff" => Ok(CommandPayload::CutOff),
        "shift" => {
            let delta_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("delta"))?;
            let delta = parse_i64(delta_str, "shift delta")?;
            Ok(CommandPayload::Shift { delta })
        }
        "anchor" => {
            let particle_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("particle"))?;
            let particle = parse_u32(particle_str, "anchor particle")?;
            Ok(CommandPayload::Anchor { particle })
        }
        "status" => Ok(CommandPayload::Status),
        other => Err(CommandParseError::UnknownCommand(other.to_string())),
    }
}

fn parse_u32(value: &str, context: &'static str) -> Result<u32, CommandParseError> {
    value
        .parse()
        .map_err(|source| CommandParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}

fn parse_u64(value: &str, context: &'static str) -> Result<u64, CommandParseError> {
    value
        .parse()
        .map_err(|source| CommandParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}

fn parse_i64(value: &str, context: &'static str) -> Result<i64, CommandParseError> {
    value
        .parse()
        .map_err(|source| CommandParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}
