// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{
    io::{self, BufWriter, Write},
    path::PathBuf,
    str::FromStr,
};

use clap::{arg, ArgMatches, Command};
use dis::{Attrl, BatchOp, EncodeError};
use fs_err as fs;
use log::info;
use serde::Deserialize;
use thiserror::Error;

pub fn command() -> Command {
    Command::new("encode")
        .about("Encode an attribute list")
        .long_about(
            "Read a YAML sequence of attributes (name, optional resource, value, optional op) \
             and write it as a DIS attribute list",
        )
        .arg(arg!(<YAML> "attribute description").value_parser(clap::value_parser!(PathBuf)))
        .arg(arg!(-o --output <PATH> "file to write").value_parser(clap::value_parser!(PathBuf)))
}

/// Op given by name (`set`, `incr`, ...) or raw code
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Op {
    Code(u32),
    Name(String),
}

impl Default for Op {
    fn default() -> Self {
        Op::Code(BatchOp::Set.into())
    }
}

#[derive(Debug, Deserialize)]
struct Attribute {
    name: String,
    resource: Option<String>,
    value: String,
    #[serde(default)]
    op: Op,
}

impl TryFrom<Attribute> for Attrl {
    type Error = Error;

    fn try_from(attribute: Attribute) -> Result<Self, Self::Error> {
        let op = match attribute.op {
            Op::Code(code) => code,
            Op::Name(name) => BatchOp::from_str(&name).map_err(|_| Error::UnknownOp(name))?.into(),
        };

        Ok(Attrl {
            name: attribute.name,
            resource: attribute.resource,
            value: attribute.value,
            op,
        })
    }
}

fn parse(yaml: &str) -> Result<Vec<Attrl>, Error> {
    serde_yaml::from_str::<Vec<Attribute>>(yaml)?
        .into_iter()
        .map(Attrl::try_from)
        .collect()
}

pub fn handle(args: &ArgMatches) -> Result<(), Error> {
    let (Some(input), Some(output)) = (args.get_one::<PathBuf>("YAML"), args.get_one::<PathBuf>("output")) else {
        unreachable!("required by clap");
    };

    let attributes = parse(&fs::read_to_string(input)?)?;

    let mut writer = BufWriter::new(fs::File::create(output)?);
    dis::encode_attrl(&mut writer, &attributes)?;
    writer.flush()?;

    info!("wrote {} attributes to {output:?}", attributes.len());

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io")]
    Io(#[from] io::Error),

    #[error("parse attributes")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unknown op {0:?}")]
    UnknownOp(String),

    #[error("encode")]
    Encode(#[from] EncodeError),
}
