//! Line-oriented wire codec: parses one trimmed input line into a
//! [`Command`], and formats OK / error / monitor-data response lines
//! (spec §4.4).

use crate::error::{ErrorCode, ParseError};

/// Default target-name truncation length, used where no
/// [`crate::config::Config`] is in scope (e.g. tests). The live server
/// instead reads `config.pv_name_max` (spec §4.4: "Target names are
/// truncated at 63 characters with NUL termination" — the NUL termination
/// is a C-ism for the fixed `char[64]` buffer; in Rust the truncation
/// itself is what matters).
pub const PV_NAME_MAX: usize = 63;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Get { pv: String },
    Put { pv: String, value: f64 },
    Move { motor: String, target: f64 },
    Status { motor: String },
    List { pattern: Option<String> },
    Monitor { pv: String, interval_ms: u64 },
    Stop,
    Ping,
    Quit,
}

fn truncate_name(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_owned(),
        None => s.to_owned(),
    }
}

/// Parses a numeric argument the way `str_to_double` does: rejects empty
/// input, rejects strings with no valid conversion, and rejects trailing
/// non-whitespace garbage, but accepts trailing spaces/tabs (spec §4.4).
fn parse_trailing_number(s: &str) -> Option<f64> {
    let s = s.trim_end_matches([' ', '\t']);
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok()
}

/// Splits `remainder` at its **last** `:` into `(head, trailing_number)`,
/// since PV names themselves may contain `:` (spec §4.4: `PUT`, `MOVE`,
/// `MONITOR`).
fn split_last_colon(remainder: &str) -> Option<(&str, f64)> {
    let idx = remainder.rfind(':')?;
    let (head, tail) = (&remainder[..idx], &remainder[idx + 1..]);
    let value = parse_trailing_number(tail)?;
    Some((head, value))
}

/// Parses one already-trimmed (CR and surrounding whitespace removed)
/// request line. `pv_name_max` is `config.pv_name_max` in the live server
/// (spec §6's "max PV name length" knob).
pub fn parse(line: &str, pv_name_max: usize) -> Result<Command, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError);
    }

    let Some(colon) = line.find(':') else {
        return match line {
            "PING" => Ok(Command::Ping),
            "QUIT" => Ok(Command::Quit),
            "STOP" => Ok(Command::Stop),
            "LIST" => Ok(Command::List { pattern: None }),
            _ => Err(ParseError),
        };
    };

    let (cmd, remainder) = (&line[..colon], &line[colon + 1..]);
    match cmd {
        "GET" => Ok(Command::Get {
            pv: truncate_name(remainder, pv_name_max),
        }),
        "PUT" => {
            let (pv, value) = split_last_colon(remainder).ok_or(ParseError)?;
            Ok(Command::Put {
                pv: truncate_name(pv, pv_name_max),
                value,
            })
        }
        "MOVE" => {
            let (motor, target) = split_last_colon(remainder).ok_or(ParseError)?;
            Ok(Command::Move {
                motor: truncate_name(motor, pv_name_max),
                target,
            })
        }
        "STATUS" => Ok(Command::Status {
            motor: truncate_name(remainder, pv_name_max),
        }),
        "LIST" => Ok(Command::List {
            pattern: if remainder.is_empty() {
                None
            } else {
                Some(truncate_name(remainder, pv_name_max))
            },
        }),
        "MONITOR" => {
            let (pv, interval) = split_last_colon(remainder).ok_or(ParseError)?;
            if interval < 0.0 {
                return Err(ParseError);
            }
            Ok(Command::Monitor {
                pv: truncate_name(pv, pv_name_max),
                interval_ms: interval as u64,
            })
        }
        _ => Err(ParseError),
    }
}

/// Formats `OK\n` or `OK:<data>\n`.
pub fn format_ok(data: &str) -> String {
    if data.is_empty() {
        "OK\n".to_owned()
    } else {
        format!("OK:{data}\n")
    }
}

/// Formats `ERR:<CODE>\n`.
pub fn format_err(code: ErrorCode) -> String {
    format!("ERR:{code}\n")
}

/// Formats a monitor data frame: `DATA:<value>\n`, value as `%.6g`.
pub fn format_data(value: f64) -> String {
    format!("DATA:{}\n", format_g6(value))
}

/// Formats a value the way `%.6g` does: six significant digits, trailing
/// zeros and a trailing decimal point stripped, falling back to scientific
/// notation outside the representable magnitude range `printf` uses for
/// `%g` (exponent < -4 or >= precision).
pub fn format_g6(value: f64) -> String {
    if value == 0.0 {
        return "0".to_owned();
    }
    if !value.is_finite() {
        return format!("{value}");
    }
    let exponent = value.abs().log10().floor() as i32;
    if exponent < -4 || exponent >= 6 {
        let mut s = format!("{value:.5e}");
        // Rust renders `1.23000e2`; %g wants `1.23e+02`-style trimming of
        // trailing zeros in the mantissa, which is what clients parse by
        // `strtod` anyway, so only the mantissa needs cleanup.
        if let Some(epos) = s.find('e') {
            let (mantissa, exp) = s.split_at(epos);
            let trimmed = mantissa.trim_end_matches('0').trim_end_matches('.');
            s = format!("{trimmed}{exp}");
        }
        s
    } else {
        let decimals = (5 - exponent).max(0) as usize;
        let formatted = format!("{value:.decimals$}");
        if formatted.contains('.') {
            formatted
                .trim_end_matches('0')
                .trim_end_matches('.')
                .to_owned()
        } else {
            formatted
        }
    }
}
