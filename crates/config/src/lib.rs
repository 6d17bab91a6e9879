// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::{Path, PathBuf};

use fs_err as fs;
use serde::de::DeserializeOwned;
use thiserror::Error;

const EXTENSION: &str = "yaml";

pub trait Config: DeserializeOwned {
    fn domain() -> String;

    fn merge(self, other: Self) -> Self;
}

#[derive(Debug, Clone)]
pub struct Manager {
    scope: Scope,
}

impl Manager {
    /// Config is loaded / merged from `usr/share` then `etc` relative to `root`
    pub fn system(root: impl Into<PathBuf>, program: impl ToString) -> Self {
        Self {
            scope: Scope::System {
                root: root.into(),
                program: program.to_string(),
            },
        }
    }

    /// Config is loaded from $XDG_CONFIG_HOME/{program}
    pub fn user(program: impl ToString) -> Result<Self, CreateUserError> {
        Ok(Self {
            scope: Scope::User {
                config: dirs::config_dir().ok_or(CreateUserError)?,
                program: program.to_string(),
            },
        })
    }

    /// Config is loaded from `path`
    pub fn custom(path: impl Into<PathBuf>) -> Self {
        Self {
            scope: Scope::Custom(path.into()),
        }
    }

    /// Load every file for `T`'s domain, merged in search order.
    /// Unreadable or malformed files are skipped.
    pub fn load<T: Config>(&self) -> Option<T> {
        let domain = T::domain();

        let mut configs = vec![];

        for (entry, resolve) in self.scope.load_with() {
            for path in enumerate_paths(entry, resolve, &domain) {
                if let Some(config) = read_config(&path) {
                    configs.push(config);
                }
            }
        }

        configs.into_iter().reduce(T::merge)
    }
}

#[derive(Debug, Error)]
#[error("$HOME or $XDG_CONFIG_HOME env not set")]
pub struct CreateUserError;

fn enumerate_paths(entry: Entry, resolve: Resolve<'_>, domain: &str) -> Vec<PathBuf> {
    match entry {
        Entry::File => {
            let file = resolve.file(domain);

            if file.exists() {
                vec![file]
            } else {
                vec![]
            }
        }
        Entry::Directory => {
            let Ok(read_dir) = fs::read_dir(resolve.dir(domain)) else {
                return vec![];
            };

            let mut paths = read_dir
                .filter_map(|entry| {
                    let path = entry.ok()?.path();
                    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default();

                    (path.exists() && extension == EXTENSION).then_some(path)
                })
                .collect::<Vec<_>>();

            // Fragments apply in name order
            paths.sort();
            paths
        }
    }
}

fn read_config<T: Config>(path: &Path) -> Option<T> {
    let bytes = fs::read(path).ok()?;
    serde_yaml::from_slice(&bytes).ok()
}

#[derive(Debug, Clone)]
enum Scope {
    System { program: String, root: PathBuf },
    User { program: String, config: PathBuf },
    Custom(PathBuf),
}

impl Scope {
    fn load_with(&self) -> Vec<(Entry, Resolve<'_>)> {
        match &self {
            // System we search / merge all base file / .d files
            // from vendor then admin
            Scope::System { root, program } => [SystemBase::Vendor, SystemBase::Admin]
                .into_iter()
                .flat_map(|base| {
                    [Entry::File, Entry::Directory].map(|entry| {
                        (
                            entry,
                            Resolve::System {
                                root,
                                base,
                                program,
                            },
                        )
                    })
                })
                .collect(),
            Scope::User { config, program } => vec![
                (Entry::File, Resolve::User { config, program }),
                (Entry::Directory, Resolve::User { config, program }),
            ],
            Scope::Custom(root) => vec![
                (Entry::File, Resolve::Custom(root)),
                (Entry::Directory, Resolve::Custom(root)),
            ],
        }
    }
}

#[derive(Clone, Copy)]
enum SystemBase {
    Admin,
    Vendor,
}

impl SystemBase {
    fn path(&self) -> &'static str {
        match self {
            SystemBase::Admin => "etc",
            SystemBase::Vendor => "usr/share",
        }
    }
}

enum Entry {
    File,
    Directory,
}

enum Resolve<'a> {
    System {
        root: &'a Path,
        base: SystemBase,
        program: &'a str,
    },
    User {
        config: &'a Path,
        program: &'a str,
    },
    Custom(&'a Path),
}

impl Resolve<'_> {
    fn config_dir(&self) -> PathBuf {
        match self {
            Resolve::System { root, base, program } => root.join(base.path()).join(program),
            Resolve::User { config, program } => config.join(program),
            Resolve::Custom(dir) => dir.to_path_buf(),
        }
    }

    fn file(&self, domain: &str) -> PathBuf {
        self.config_dir().join(format!("{domain}.{EXTENSION}"))
    }

    fn dir(&self, domain: &str) -> PathBuf {
        self.config_dir().join(format!("{domain}.d"))
    }
}
