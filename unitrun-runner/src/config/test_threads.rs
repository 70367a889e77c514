// Copyright (c) The unitrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{
    Deserialize,
    de::{self, Unexpected},
};
use std::{fmt, sync::LazyLock};
use tracing::warn;

/// The number of worker threads a concurrent run may use.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TestThreads {
    /// A fixed number of threads.
    Count(usize),

    /// One thread per logical CPU.
    NumCpus,
}

impl TestThreads {
    /// Resolves the number of threads on this machine.
    pub fn compute(self) -> usize {
        match self {
            Self::Count(threads) => threads,
            Self::NumCpus => get_num_cpus(),
        }
    }

    /// A positive count is taken as is; a negative one leaves that many CPUs free, keeping at
    /// least one thread.
    fn from_signed(count: i64) -> Option<Self> {
        match count {
            0 => None,
            n if n > 0 => Some(Self::Count(n as usize)),
            n => Some(Self::Count(
                (get_num_cpus() as i64).saturating_add(n).max(1) as usize,
            )),
        }
    }
}

impl<'de> Deserialize<'de> for TestThreads {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct TestThreadsVisitor;

        impl de::Visitor<'_> for TestThreadsVisitor {
            type Value = TestThreads;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a non-zero integer or \"num-cpus\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                match v {
                    "num-cpus" => Ok(TestThreads::NumCpus),
                    _ => Err(E::invalid_value(Unexpected::Str(v), &self)),
                }
            }

            // TOML integers arrive as i64.
            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                TestThreads::from_signed(v)
                    .ok_or_else(|| E::invalid_value(Unexpected::Signed(v), &self))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                i64::try_from(v)
                    .ok()
                    .and_then(TestThreads::from_signed)
                    .ok_or_else(|| E::invalid_value(Unexpected::Unsigned(v), &self))
            }
        }

        deserializer.deserialize_any(TestThreadsVisitor)
    }
}

/// Returns the number of logical CPUs, computed once.
pub(crate) fn get_num_cpus() -> usize {
    static NUM_CPUS: LazyLock<usize> =
        LazyLock::new(|| match std::thread::available_parallelism() {
            Ok(count) => count.into(),
            Err(err) => {
                warn!("unable to determine num-cpus ({err}), assuming 1 logical CPU");
                1
            }
        });

    *NUM_CPUS
}
