//! Command-line front end for the `daylog` storage engine.
//!
//! Every subcommand resolves one named device under `--database` (or a
//! `--config` file supplying root/encoding/block-size defaults, §4.8)
//! and performs a single operation, using the floating-point value codec
//! (`spec.md` C12) since that is the shape of the numeric sensor logs
//! the engine targets. This binary is a convenience wrapper only: no
//! driver behavior depends on anything here.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, NaiveDateTime};
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};

use daylog::{DatabaseConfig, Device, Encoding, Error, FloatCodec};

fn build_cli() -> Command {
    Command::new("daylogctl")
        .about("Inspect and edit a daylog directory database")
        .version("0.1.0")
        .arg(
            Arg::new("database")
                .long("database")
                .help("Database root directory")
                .default_value(".")
                .global(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("TOML config file supplying root/encoding/block_size defaults")
                .global(true),
        )
        .subcommand(
            Command::new("append")
                .about("Append a measurement to a device's current shard")
                .arg(Arg::new("device").required(true))
                .arg(Arg::new("timestamp").required(true))
                .arg(Arg::new("values").required(true).num_args(1..)),
        )
        .subcommand(
            Command::new("insert")
                .about("Insert a measurement into a device's already-sorted shard")
                .arg(Arg::new("device").required(true))
                .arg(Arg::new("timestamp").required(true))
                .arg(Arg::new("values").required(true).num_args(1..)),
        )
        .subcommand(
            Command::new("sort")
                .about("Sort every shard of a device")
                .arg(Arg::new("device").required(true)),
        )
        .subcommand(
            Command::new("query")
                .about("Print every measurement in [start, stop) for a device")
                .arg(Arg::new("device").required(true))
                .arg(Arg::new("start").required(true))
                .arg(Arg::new("stop").required(true))
                .arg(
                    Arg::new("reverse")
                        .long("reverse")
                        .help("Iterate from stop down to start")
                        .action(ArgAction::SetTrue),
                ),
        )
}

/// Parses an RFC 3339 datetime argument down to the naive local instant
/// shard lines are keyed by; any timezone offset in the input is
/// dropped rather than converted, since shards carry no zone of their
/// own (`spec.md` §4.3).
fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.naive_local())
        .map_err(|e| Error::Usage(format!("invalid RFC 3339 timestamp {raw:?}: {e}")))
}

fn parse_values(raw: &[String]) -> Result<Vec<f64>, Error> {
    raw.iter()
        .map(|v| v.parse::<f64>().map_err(|e| Error::Usage(format!("invalid value {v:?}: {e}"))))
        .collect()
}

/// Resolves the device to operate on, honoring `--config` (per-device
/// encoding/block-size defaults, `spec.md` §4.8) when given. An explicit
/// `--database` always wins over a config file's `root`, since the
/// command line is more specific than a shared config.
fn device(matches: &ArgMatches, name: &str) -> Result<Device<FloatCodec>, Error> {
    let database: PathBuf = matches.get_one::<String>("database").expect("has a default").into();
    let database_given_explicitly = matches.value_source("database") == Some(ValueSource::CommandLine);

    match matches.get_one::<String>("config") {
        Some(config_path) => {
            let mut config = DatabaseConfig::load(config_path)?;
            if database_given_explicitly {
                config.root = database;
            }
            Ok(Device::from_config(&config, name, FloatCodec))
        }
        None => Ok(Device::new(database, name, Encoding::Utf8, FloatCodec)),
    }
}

fn run() -> Result<(), Error> {
    run_with(build_cli().get_matches(), &mut std::io::stdout())
}

fn run_with(matches: ArgMatches, out: &mut impl Write) -> Result<(), Error> {
    match matches.subcommand() {
        Some(("append", sub)) => {
            let name = sub.get_one::<String>("device").unwrap();
            let tick = parse_timestamp(sub.get_one::<String>("timestamp").unwrap())?;
            let values = parse_values(
                &sub.get_many::<String>("values").unwrap().cloned().collect::<Vec<_>>(),
            )?;
            device(&matches, name)?.writer().append(tick, &values)?;
        }
        Some(("insert", sub)) => {
            let name = sub.get_one::<String>("device").unwrap();
            let tick = parse_timestamp(sub.get_one::<String>("timestamp").unwrap())?;
            let values = parse_values(
                &sub.get_many::<String>("values").unwrap().cloned().collect::<Vec<_>>(),
            )?;
            device(&matches, name)?.writer().insert(tick, &values)?;
        }
        Some(("sort", sub)) => {
            let name = sub.get_one::<String>("device").unwrap();
            device(&matches, name)?.sort()?;
        }
        Some(("query", sub)) => {
            let name = sub.get_one::<String>("device").unwrap();
            let start = parse_timestamp(sub.get_one::<String>("start").unwrap())?;
            let stop = parse_timestamp(sub.get_one::<String>("stop").unwrap())?;
            let reverse = sub.get_flag("reverse");

            let dev = device(&matches, name)?;
            let reader = dev.reader();
            let cursor = reader.query_interval(start, stop)?;

            let rows: Box<dyn Iterator<Item = _>> = if reverse {
                Box::new(cursor.iter_rev())
            } else {
                Box::new(cursor.iter())
            };

            for row in rows {
                let (tick, values) = row?;
                let cells: Vec<String> = values.iter().map(f64::to_string).collect();
                writeln!(
                    out,
                    "{} {}",
                    tick.format("%Y-%m-%d %H:%M:%S%.f"),
                    cells.join(" ")
                )
                .map_err(Error::Io)?;
            }
        }
        _ => {
            eprintln!("no subcommand given; run with --help");
            return Err(Error::Usage("missing subcommand".to_string()));
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("daylogctl: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(args: &[&str], out: &mut impl Write) -> Result<(), Error> {
        let matches = build_cli().get_matches_from(args);
        run_with(matches, out)
    }

    #[test]
    fn append_then_query_round_trips_through_the_cli() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();

        let mut sink = Vec::new();
        run_args(
            &["daylogctl", "--database", root, "append", "temp", "2020-02-15T11:57:35Z", "21.5"],
            &mut sink,
        )
        .unwrap();

        let mut out = Vec::new();
        run_args(
            &[
                "daylogctl",
                "--database",
                root,
                "query",
                "temp",
                "2020-02-15T00:00:00Z",
                "2020-02-16T00:00:00Z",
            ],
            &mut out,
        )
        .unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed, "2020-02-15 11:57:35 21.5\n");
    }

    #[test]
    fn config_file_supplies_the_database_root() {
        let dir = tempfile::tempdir().unwrap();
        let db_dir = dir.path().join("db");
        std::fs::create_dir_all(&db_dir).unwrap();

        let config_path = dir.path().join("daylog.toml");
        std::fs::write(&config_path, format!("root = {:?}\n", db_dir.to_str().unwrap())).unwrap();
        let config_arg = config_path.to_str().unwrap();

        let mut sink = Vec::new();
        run_args(
            &["daylogctl", "--config", config_arg, "append", "temp", "2020-02-15T11:57:35Z", "21.5"],
            &mut sink,
        )
        .unwrap();

        let mut out = Vec::new();
        run_args(
            &[
                "daylogctl",
                "--config",
                config_arg,
                "query",
                "temp",
                "2020-02-15T00:00:00Z",
                "2020-02-16T00:00:00Z",
            ],
            &mut out,
        )
        .unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "2020-02-15 11:57:35 21.5\n");
    }

    #[test]
    fn query_rejects_a_malformed_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();

        let mut out = Vec::new();
        let err = run_args(
            &["daylogctl", "--database", root, "query", "temp", "not-a-time", "2020-02-16T00:00:00Z"],
            &mut out,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }
}
