// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{
    io::{self, BufReader, Write},
    path::PathBuf,
};

use clap::{arg, Arg, ArgAction, ArgMatches, Command};
use dis::{AttrList, DecodeError, Decoder, PartialPolicy, Svrattrl};
use fs_err::File;
use log::debug;
use thiserror::Error;

use crate::config::Codec;

pub fn command() -> Command {
    Command::new("inspect")
        .about("Examine raw attribute lists")
        .long_about("Decode each file as a DIS attribute list and print its records")
        .arg(arg!(<PATH> ... "files to inspect").value_parser(clap::value_parser!(PathBuf)))
        .arg(
            Arg::new("discard-partial")
                .long("discard-partial")
                .help("Print nothing from a list that fails to decode")
                .action(ArgAction::SetTrue),
        )
}

///
/// Inspect the given attribute list files and print results
///
pub fn handle(args: &ArgMatches, config: &Codec) -> Result<(), Error> {
    inspect(args, config, &mut io::stdout().lock())
}

fn inspect(args: &ArgMatches, config: &Codec, out: &mut impl Write) -> Result<(), Error> {
    let paths = args
        .get_many::<PathBuf>("PATH")
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

    let mut options = config.options();
    if args.get_flag("discard-partial") {
        options.partial = PartialPolicy::Discard;
    }

    // Process each input path in order.
    for path in paths {
        let reader = BufReader::new(File::open(path)?);

        let mut decoder = Decoder::with_allocator(config.allocator()).with_options(options);
        let mut list = AttrList::new();

        let result = decoder.decode(reader, &mut list);

        writeln!(out, "{path:?} = {} attributes", list.len())?;

        for record in &list {
            writeln!(out, " - {}", describe(record))?;
            debug!(
                "   name {} + resource {} + value {} of {} bytes, total {}",
                record.name_len(),
                record.resource_len(),
                record.value_len(),
                record.budget(),
                record.total_size()
            );
        }

        result.map_err(|error| Error::Decode(path.clone(), error))?;
    }

    Ok(())
}

fn describe(record: &Svrattrl) -> String {
    match record.batch_op() {
        Some(op) => format!("{record} ({op})"),
        None => format!("{record} (op {})", record.op()),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO failure")]
    IO(#[from] io::Error),

    #[error("Format failure in {0:?} (status {code})", code = .1.code())]
    Decode(PathBuf, #[source] DecodeError),
}

#[cfg(test)]
mod test {
    use dis::BatchOp;

    use super::*;

    /// Two records, the second cut short
    fn truncated_stream(name: &str) -> PathBuf {
        let list = [
            Svrattrl::new("Job_Name", None, "STDIN", BatchOp::Set),
            Svrattrl::new("Resource_List", Some(b"ncpus".as_slice()), "4", BatchOp::Set),
        ]
        .into_iter()
        .collect::<AttrList>();

        let mut bytes = vec![];
        dis::encode_svrattrl(&mut bytes, &list).unwrap();
        bytes.truncate(bytes.len() - 2);

        let path = std::env::temp_dir().join(format!("disctl-test-{}-{name}.dis", std::process::id()));
        fs_err::write(&path, bytes).unwrap();
        path
    }

    fn run(args: &[&str], config: &Codec) -> (String, Result<(), Error>) {
        let matches = command().try_get_matches_from(args.to_vec()).unwrap();

        let mut out = vec![];
        let result = inspect(&matches, config, &mut out);

        (String::from_utf8(out).unwrap(), result)
    }

    #[test]
    fn partial_records_printed() {
        let path = truncated_stream("keep");

        let (out, result) = run(&["inspect", path.to_str().unwrap()], &Codec::default());

        assert!(out.contains("= 1 attributes"));
        assert!(out.contains(" - Job_Name = STDIN (set)"));
        assert!(!out.contains("Resource_List"));
        assert!(matches!(result, Err(Error::Decode(ref p, ref e)) if *p == path && e.code() == 7));

        fs_err::remove_file(path).unwrap();
    }

    #[test]
    fn discard_partial_flag() {
        let path = truncated_stream("discard");

        let (out, result) = run(&["inspect", "--discard-partial", path.to_str().unwrap()], &Codec::default());

        assert!(out.contains("= 0 attributes"));
        assert!(!out.contains("Job_Name"));
        assert!(matches!(result, Err(Error::Decode(..))));

        fs_err::remove_file(path).unwrap();
    }

    #[test]
    fn describe_ops() {
        let known = Svrattrl::new("Resource_List", Some(b"mem".as_slice()), "1gb", BatchOp::Set);
        let unknown = Svrattrl::new("x", None, "y", 42u32);

        assert_eq!(describe(&known), "Resource_List.mem = 1gb (set)");
        assert_eq!(describe(&unknown), "x = y (op 42)");
    }
}
