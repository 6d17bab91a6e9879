// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use serde::Deserialize;

/// Decode limits and policy, read from the `codec` config domain
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Codec {
    /// Largest attribute count accepted per list
    pub max_entries: Option<u32>,
    /// Largest payload budget allocated per record, otherwise
    /// [`dis::DEFAULT_RECORD_LIMIT`]
    pub max_record_budget: Option<usize>,
    /// Drop partially decoded lists on error
    pub discard_partial: Option<bool>,
}

impl config::Config for Codec {
    fn domain() -> String {
        "codec".into()
    }

    /// Later files override earlier ones field by field
    fn merge(self, other: Self) -> Self {
        Self {
            max_entries: other.max_entries.or(self.max_entries),
            max_record_budget: other.max_record_budget.or(self.max_record_budget),
            discard_partial: other.discard_partial.or(self.discard_partial),
        }
    }
}

impl Codec {
    pub fn options(&self) -> dis::Options {
        dis::Options {
            partial: if self.discard_partial.unwrap_or_default() {
                dis::PartialPolicy::Discard
            } else {
                dis::PartialPolicy::Keep
            },
            max_entries: self.max_entries,
        }
    }

    pub fn allocator(&self) -> dis::System {
        match self.max_record_budget {
            Some(limit) => dis::System::with_limit(limit),
            None => dis::System::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use config::Config;

    use super::*;

    #[test]
    fn merge_overrides_set_fields() {
        let vendor: Codec = serde_yaml::from_str("max-entries: 100\nmax-record-budget: 4096\n").unwrap();
        let admin: Codec = serde_yaml::from_str("max-entries: 10\ndiscard-partial: true\n").unwrap();

        let merged = vendor.merge(admin);

        assert_eq!(merged.max_entries, Some(10));
        assert_eq!(merged.max_record_budget, Some(4096));
        assert_eq!(merged.options().partial, dis::PartialPolicy::Discard);
        assert_eq!(merged.allocator().limit, Some(4096));
    }

    #[test]
    fn defaults_keep_partial_lists() {
        let options = Codec::default().options();

        assert_eq!(options.partial, dis::PartialPolicy::Keep);
        assert_eq!(options.max_entries, None);
        assert_eq!(Codec::default().allocator().limit, Some(dis::DEFAULT_RECORD_LIMIT));
    }
}
