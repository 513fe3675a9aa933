//! Line codec (C3) and the injected value codec (C7/C12).
//!
//! The line codec formats a `(time-of-day, cells)` pair to a single text
//! line and parses it back; cell formatting/parsing itself is delegated to
//! a [`ValueCodec`] supplied by the device, so the driver never inspects
//! cell contents beyond treating them as whitespace-free tokens.

use chrono::NaiveTime;

const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// Formats `(time, cells)` as a single shard line, trailing newline
/// included.
pub fn format_line(time: NaiveTime, cells: &[String]) -> String {
    let mut line = time.format(TIME_FORMAT).to_string();
    for cell in cells {
        line.push(' ');
        line.push_str(cell);
    }
    line.push('\n');
    line
}

/// Splits a raw shard line into its time-of-day field and the remaining
/// raw cell tokens. Does not allocate beyond the returned `Vec`; cells
/// borrow from `line`.
///
/// Fails if the first token cannot be parsed as `HH:MM:SS[.ffffff]`.
pub fn parse_line_time(line: &str) -> Result<(NaiveTime, Vec<&str>), String> {
    let mut tokens = line.split_whitespace();
    let time_str = tokens
        .next()
        .ok_or_else(|| "line is missing a time-of-day field".to_string())?;
    let time = NaiveTime::parse_from_str(time_str, TIME_FORMAT)
        .map_err(|e| format!("invalid time-of-day {time_str:?}: {e}"))?;
    Ok((time, tokens.collect()))
}

/// True for lines the readers should skip: blank lines, and lines whose
/// first non-whitespace character is `#`.
pub fn is_data_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

/// Formats and parses the opaque value cells of a measurement. Injected
/// into a [`crate::device::Device`] so the driver stays agnostic to cell
/// contents beyond the timestamp column.
pub trait ValueCodec {
    type Value;

    fn format_cells(&self, value: &Self::Value) -> Vec<String>;
    fn parse_cells(&self, cells: Vec<&str>) -> Result<Self::Value, String>;
}

/// Default codec: cells are opaque strings, copied verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl ValueCodec for StringCodec {
    type Value = Vec<String>;

    fn format_cells(&self, value: &Vec<String>) -> Vec<String> {
        value.clone()
    }

    fn parse_cells(&self, cells: Vec<&str>) -> Result<Vec<String>, String> {
        Ok(cells.into_iter().map(str::to_string).collect())
    }
}

/// Floating-point specialisation: cells are base-10 `f64` text, formatted
/// with Rust's default `Display` and parsed with `str::parse`. Mirrors
/// `taransaydb.FloatDevice`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatCodec;

impl ValueCodec for FloatCodec {
    type Value = Vec<f64>;

    fn format_cells(&self, value: &Vec<f64>) -> Vec<String> {
        value.iter().map(f64::to_string).collect()
    }

    fn parse_cells(&self, cells: Vec<&str>) -> Result<Vec<f64>, String> {
        cells
            .iter()
            .map(|cell| {
                cell.parse::<f64>()
                    .map_err(|e| format!("invalid float cell {cell:?}: {e}"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_then_parse_round_trips_time_and_cells() {
        let time = NaiveTime::from_hms_micro_opt(10, 0, 0, 500_000).unwrap();
        let cells = vec!["1.5".to_string(), "2.5".to_string()];
        let line = format_line(time, &cells);
        assert_eq!(line, "10:00:00.500000 1.5 2.5\n");

        let (parsed_time, parsed_cells) = parse_line_time(line.trim_end()).unwrap();
        assert_eq!(parsed_time, time);
        assert_eq!(parsed_cells, vec!["1.5", "2.5"]);
    }

    #[test]
    fn rejects_malformed_time() {
        assert!(parse_line_time("not-a-time 1 2").is_err());
    }

    #[test]
    fn comment_and_blank_lines_are_not_data() {
        assert!(!is_data_line(""));
        assert!(!is_data_line("   "));
        assert!(!is_data_line("# a comment"));
        assert!(!is_data_line("   # indented comment"));
        assert!(is_data_line("10:00:00 1.5"));
    }

    #[test]
    fn float_codec_round_trips() {
        let codec = FloatCodec;
        let values = vec![1.5_f64, -2.25, 0.0];
        let cells = codec.format_cells(&values);
        let borrowed: Vec<&str> = cells.iter().map(String::as_str).collect();
        assert_eq!(codec.parse_cells(borrowed).unwrap(), values);
    }

    #[test]
    fn float_codec_rejects_non_numeric_cell() {
        let codec = FloatCodec;
        assert!(codec.parse_cells(vec!["not-a-float"]).is_err());
    }
}
