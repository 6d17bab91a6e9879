// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::{Path, PathBuf};

use clap::{value_parser, Arg, ArgAction, Command};
use config::{Config, Manager};
use log::debug;
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;

use crate::config::Codec;

mod encode;
mod inspect;
mod version;

/// Generate the CLI command structure
fn command() -> Command {
    Command::new("disctl")
        .about("Inspect and produce DIS attribute lists")
        .arg(
            Arg::new("version")
                .short('v')
                .long("version")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config-dir")
                .long("config-dir")
                .global(true)
                .help("Load codec configuration from this directory")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .default_value("warn")
                .value_parser(["off", "error", "warn", "info", "debug", "trace"]),
        )
        .arg_required_else_help(true)
        .subcommand(encode::command())
        .subcommand(inspect::command())
        .subcommand(version::command())
}

/// Process all CLI arguments
pub fn process() -> Result<(), Error> {
    let matches = command().get_matches();
    if matches.get_flag("version") {
        version::print();
        return Ok(());
    }

    let level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("warn")
        .parse::<LevelFilter>()
        .map_err(|_| Error::LogLevel)?;

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| Error::Logging)?;

    let config = load_config(Path::new("/"), matches.get_one::<PathBuf>("config-dir"));

    match matches.subcommand() {
        Some(("encode", args)) => encode::handle(args).map_err(Error::Encode),
        Some(("inspect", args)) => inspect::handle(args, &config).map_err(Error::Inspect),
        Some(("version", _)) => {
            version::print();
            Ok(())
        }
        _ => unreachable!(),
    }
}

/// Merge the vendor and admin layers under `root` with the user layer,
/// or with `dir` when given
fn load_config(root: &Path, dir: Option<&PathBuf>) -> Codec {
    let local = match dir {
        Some(dir) => Some(Manager::custom(dir)),
        None => Manager::user("disctl")
            .map_err(|error| debug!("skipping user codec config: {error}"))
            .ok(),
    };

    let config = [Some(Manager::system(root, "disctl")), local]
        .into_iter()
        .flatten()
        .filter_map(|manager| manager.load::<Codec>())
        .reduce(Codec::merge)
        .unwrap_or_default();

    debug!("codec config: {config:?}");
    config
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid log level")]
    LogLevel,

    #[error("logging already initialized")]
    Logging,

    #[error("error handling encode: {0}")]
    Encode(#[from] encode::Error),

    #[error("error handling inspect: {0}")]
    Inspect(#[from] inspect::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn command_is_valid() {
        command().debug_assert();
    }

    #[test]
    fn global_args_after_subcommand() {
        let matches = command()
            .try_get_matches_from(["disctl", "inspect", "--log-level", "debug", "a.dis"])
            .unwrap();

        assert_eq!(matches.get_one::<String>("log-level").unwrap(), "debug");
        assert!(matches!(matches.subcommand(), Some(("inspect", _))));
    }

    #[test]
    fn config_layers() {
        let root = std::env::temp_dir().join(format!("disctl-test-{}-layers", std::process::id()));
        let _ = fs_err::remove_dir_all(&root);

        let vendor = root.join("usr/share/disctl");
        let admin = root.join("etc/disctl/codec.d");
        let custom = root.join("custom");
        fs_err::create_dir_all(&vendor).unwrap();
        fs_err::create_dir_all(&admin).unwrap();
        fs_err::create_dir_all(&custom).unwrap();

        fs_err::write(vendor.join("codec.yaml"), "max-entries: 100\nmax-record-budget: 4096\n").unwrap();
        fs_err::write(admin.join("10-entries.yaml"), "max-entries: 50\n").unwrap();
        fs_err::write(admin.join("20-entries.yaml"), "max-entries: 20\n").unwrap();
        fs_err::write(custom.join("codec.yaml"), "discard-partial: true\n").unwrap();

        let system_only = load_config(&root, Some(&root.join("missing")));
        assert_eq!(system_only.max_entries, Some(20));
        assert_eq!(system_only.max_record_budget, Some(4096));
        assert_eq!(system_only.discard_partial, None);

        let layered = load_config(&root, Some(&custom));
        assert_eq!(layered.max_entries, Some(20));
        assert_eq!(layered.discard_partial, Some(true));

        fs_err::remove_dir_all(root).unwrap();
    }
}
