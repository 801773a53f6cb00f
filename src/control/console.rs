//! Interactive control console
//!
//! Reads one command per line:
//!
//! - `ft` toggle the convolution filter
//! - `fl N` set the filter window length (2 <= N <= 65536)
//! - `rs N` set the resample target length
//! - `yr MIN MAX` set the plot's vertical axis range
//! - `help` list commands
//! - `q` quit

use super::{ControlCommand, ControlSender};
use crate::processor::filter::{MAX_WINDOW_SIZE, MIN_WINDOW_SIZE};
use crate::sink::AxisRange;
use std::io::Write;
use std::num::ParseIntError;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

pub const HELP: &str = "\
Commands:
  ft           toggle convolution filter
  fl N         set filter window length (2 <= N <= 65536)
  rs N         set resample target length
  yr MIN MAX   set axis range
  help         show this help
  q            quit";

/// Console input errors; reported to the user and otherwise ignored
#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("unknown command '{0}' (type 'help' for a list)")]
    UnknownCommand(String),
    #[error("'{command}' expects {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },
    #[error("'{command}' takes {expected}, got extra input '{extra}'")]
    UnexpectedArgument {
        command: &'static str,
        expected: &'static str,
        extra: String,
    },
    #[error("illegal input '{value}': {source}")]
    InvalidNumber {
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("filter length must be at least {min}, got {0}", min = MIN_WINDOW_SIZE)]
    FilterLengthTooShort(usize),
    #[error("filter length must be at most {max}, got {0}", max = MAX_WINDOW_SIZE)]
    FilterLengthTooLong(usize),
}

/// Parse one console line; blank lines yield `None`
pub fn parse_command(line: &str) -> Result<Option<ControlCommand>, ConsoleError> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let parsed = match command {
        "ft" => {
            expect_args("ft", "no arguments", &args, 0)?;
            ControlCommand::ToggleFilter
        }
        "fl" => {
            expect_args("fl", "a window length", &args, 1)?;
            let length: usize = parse_number(args[0])?;
            if length < MIN_WINDOW_SIZE {
                return Err(ConsoleError::FilterLengthTooShort(length));
            }
            if length > MAX_WINDOW_SIZE {
                return Err(ConsoleError::FilterLengthTooLong(length));
            }
            ControlCommand::FilterLength(length)
        }
        "rs" => {
            expect_args("rs", "a target length", &args, 1)?;
            ControlCommand::ResampleTarget(parse_number(args[0])?)
        }
        "yr" => {
            expect_args("yr", "a minimum and a maximum", &args, 2)?;
            ControlCommand::AxisRange(AxisRange {
                min: parse_number(args[0])?,
                max: parse_number(args[1])?,
            })
        }
        "help" | "?" => ControlCommand::Help,
        "q" | "quit" => ControlCommand::Quit,
        other => return Err(ConsoleError::UnknownCommand(other.to_string())),
    };

    Ok(Some(parsed))
}

fn expect_args(
    command: &'static str,
    expected: &'static str,
    args: &[&str],
    count: usize,
) -> Result<(), ConsoleError> {
    if args.len() < count {
        return Err(ConsoleError::MissingArgument { command, expected });
    }
    if args.len() > count {
        return Err(ConsoleError::UnexpectedArgument {
            command,
            expected,
            extra: args[count..].join(" "),
        });
    }
    Ok(())
}

fn parse_number<T>(value: &str) -> Result<T, ConsoleError>
where
    T: std::str::FromStr<Err = ParseIntError>,
{
    value.parse().map_err(|source| ConsoleError::InvalidNumber {
        value: value.to_string(),
        source,
    })
}

/// Read commands from `input` until `q` or end of input
///
/// Prompts, acknowledgements and input errors go to `feedback`. Malformed
/// lines are reported and leave the running state untouched.
pub async fn run_console<R, W>(
    input: R,
    feedback: &mut W,
    controls: &mut ControlSender,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();

    writeln!(feedback, "Waiting for commands ('help' for a list, 'q' to quit)...")?;
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(ControlCommand::Quit)) => return Ok(()),
            Ok(Some(ControlCommand::Help)) => writeln!(feedback, "{}", HELP)?,
            Ok(Some(command)) => {
                controls.dispatch(command);
                match command {
                    ControlCommand::ToggleFilter if controls.filter_toggle() => {
                        writeln!(feedback, "Convolution filter enabled")?
                    }
                    ControlCommand::ToggleFilter => {
                        writeln!(feedback, "Convolution filter disabled")?
                    }
                    ControlCommand::FilterLength(length) => {
                        writeln!(feedback, "Filter length -> {}", length)?
                    }
                    ControlCommand::ResampleTarget(target) if target < 1 => {
                        writeln!(feedback, "Resample target -> {} (no downsampling)", target)?
                    }
                    ControlCommand::ResampleTarget(target) => {
                        writeln!(feedback, "Resample target -> {}", target)?
                    }
                    ControlCommand::AxisRange(range) => {
                        writeln!(feedback, "Axis range -> [{}, {}]", range.min, range.max)?
                    }
                    ControlCommand::Help | ControlCommand::Quit => {}
                }
            }
            Err(e) => writeln!(feedback, "{}", e)?,
        }
    }

    Ok(())
}
