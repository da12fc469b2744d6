//! Line grammar of simulation scripts
//!
//! ```text
//! q[ueue][,g|f][,code[,data[,group]]]   queue an event (g: all groups, f: force new)
//! h[eartbeat][,time]                    advance time (default: now + 1)
//! s[tatus][,group[,fsm]]                print a status report
//! d[elay][,ms]                          pause the script (0 or absent: 1000 ms)
//! p[rint][,text]                        print text
//! w[akeup]                              wake the scheduler
//! r[eset]                               restart from the startup state
//! e[xit]                                stop
//! ```
//!
//! `// ...` starts a comment. A line may end with `= expected` to assert the
//! output of the command. A leading number is shorthand for `queue`.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use ofsm_core::{EventCode, EventData, Tick};

/// Pause used by `delay` without a period.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    Wakeup,
    Delay(Duration),
    Print(String),
    Queue {
        global: bool,
        force_new: bool,
        code: EventCode,
        data: EventData,
        group: u8,
    },
    Heartbeat(Option<Tick>),
    Status { group: u8, fsm: u8 },
    Reset,
}

/// A parsed script line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub number: usize,
    pub command: Command,
    /// Output the command must produce
    pub expected: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("Invalid Command '{0}' ignored.")]
    InvalidCommand(String),
    #[error("Invalid number '{0}'.")]
    InvalidNumber(String),
    #[error("Invalid Group Index {0}.")]
    InvalidGroup(u8),
    #[error("wakeup command is ignored in auto wake mode.")]
    WakeupIgnored,
    #[error(transparent)]
    Scheduler(#[from] ofsm_core::OfsmError),
}

/// Parse line `line_number` of a script. Blank and comment lines yield `None`.
pub fn parse_line(line_number: usize, raw: &str) -> Result<Option<Line>, ScriptError> {
    let mut text = raw.trim();
    if let Some(comment) = text.find("//") {
        text = text[..comment].trim_end();
    }
    if text.is_empty() {
        return Ok(None);
    }

    // print keeps its case and has no assertion
    if text.to_lowercase().starts_with('p') {
        let message = text.split_once(',').map_or("", |(_, message)| message);
        return Ok(Some(Line {
            number: line_number,
            command: Command::Print(message.to_string()),
            expected: None,
        }));
    }

    let (body, expected) = match text.split_once('=') {
        Some((body, expected)) => (body, Some(expected.trim().to_string())),
        None => (text, None),
    };
    let expected = expected.filter(|expected| !expected.is_empty());

    let body = body.to_lowercase();
    let mut tokens: Vec<&str> = body.split(',').map(str::trim).collect();
    if tokens[0].starts_with(|c: char| c.is_ascii_digit()) {
        tokens.insert(0, "queue");
    }

    let command = match tokens[0].chars().next() {
        Some('e') => Command::Exit,
        Some('w') => Command::Wakeup,
        Some('d') => {
            let ms: u64 = number(tokens.get(1))?;
            Command::Delay(if ms == 0 {
                DEFAULT_DELAY
            } else {
                Duration::from_millis(ms)
            })
        }
        Some('q') => parse_queue(&tokens[1..])?,
        Some('h') => Command::Heartbeat(match tokens.get(1) {
            Some(time) => Some(number(Some(time))?),
            None => None,
        }),
        Some('s') => Command::Status {
            group: number(tokens.get(1))?,
            fsm: number(tokens.get(2))?,
        },
        Some('r') => Command::Reset,
        _ => return Err(ScriptError::InvalidCommand(body.trim().to_string())),
    };

    Ok(Some(Line {
        number: line_number,
        command,
        expected,
    }))
}

fn parse_queue(args: &[&str]) -> Result<Command, ScriptError> {
    let (global, force_new) = args
        .first()
        .map_or((false, false), |mods| (mods.contains('g'), mods.contains('f')));
    let args = if global || force_new { &args[1..] } else { args };

    Ok(Command::Queue {
        global,
        force_new,
        code: EventCode(number(args.first())?),
        data: number(args.get(1))?,
        group: number(args.get(2))?,
    })
}

/// Optional numeric argument; absent or empty means zero.
fn number<T: FromStr + Default>(token: Option<&&str>) -> Result<T, ScriptError> {
    match token {
        None => Ok(T::default()),
        Some(token) if token.is_empty() => Ok(T::default()),
        Some(token) => token
            .parse()
            .map_err(|_| ScriptError::InvalidNumber(token.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(raw: &str) -> Command {
        parse_line(1, raw).unwrap().unwrap().command
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert_eq!(parse_line(1, "   ").unwrap(), None);
        assert_eq!(parse_line(2, "// queue,1").unwrap(), None);
    }

    #[test]
    fn queue_forms() {
        assert_eq!(
            command("queue,g,2,7"),
            Command::Queue {
                global: true,
                force_new: false,
                code: EventCode(2),
                data: 7,
                group: 0,
            }
        );
        assert_eq!(
            command("Q,F,1,2,3"),
            Command::Queue {
                global: false,
                force_new: true,
                code: EventCode(1),
                data: 2,
                group: 3,
            }
        );
        assert_eq!(command("1,20"), command("queue,1,20"));
        assert_eq!(
            command("q"),
            Command::Queue {
                global: false,
                force_new: false,
                code: EventCode::TIMEOUT,
                data: 0,
                group: 0,
            }
        );
    }

    #[test]
    fn assertion_and_comment_are_split_off() {
        let line = parse_line(4, "s,0,1 = -O[I]-G(0) // check").unwrap().unwrap();

        assert_eq!(line.number, 4);
        assert_eq!(line.command, Command::Status { group: 0, fsm: 1 });
        assert_eq!(line.expected.as_deref(), Some("-O[I]-G(0)"));
    }

    #[test]
    fn line_number_is_kept_apart_from_arguments() {
        let line = parse_line(17, "status,2,3").unwrap().unwrap();
        assert_eq!(line.number, 17);
        assert_eq!(line.command, Command::Status { group: 2, fsm: 3 });

        let line = parse_line(9, "Print,Done").unwrap().unwrap();
        assert_eq!(line.number, 9);
    }

    #[test]
    fn print_preserves_case_and_equals() {
        assert_eq!(
            command("Print,Hello = World"),
            Command::Print("Hello = World".into())
        );
        assert_eq!(command("p"), Command::Print(String::new()));
    }

    #[test]
    fn heartbeat_and_delay_defaults() {
        assert_eq!(command("h"), Command::Heartbeat(None));
        assert_eq!(command("heartbeat,42"), Command::Heartbeat(Some(42)));
        assert_eq!(command("d"), Command::Delay(DEFAULT_DELAY));
        assert_eq!(command("d,0"), Command::Delay(DEFAULT_DELAY));
        assert_eq!(command("delay,5"), Command::Delay(Duration::from_millis(5)));
    }

    #[test]
    fn unknown_commands_and_bad_numbers() {
        assert_eq!(
            parse_line(1, "jump,3").unwrap_err(),
            ScriptError::InvalidCommand("jump,3".into())
        );
        assert_eq!(
            parse_line(1, "= orphan").unwrap_err(),
            ScriptError::InvalidCommand(String::new())
        );
        assert_eq!(
            parse_line(1, "q,1,x").unwrap_err(),
            ScriptError::InvalidNumber("x".into())
        );
        assert_eq!(
            parse_line(1, "s,300").unwrap_err(),
            ScriptError::InvalidNumber("300".into())
        );
    }
}
