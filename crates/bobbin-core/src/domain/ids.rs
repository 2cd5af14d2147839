//! Job identifiers.
//!
//! Jobs are keyed by ULID: the timestamp sits in the high bits, so ids sort by
//! creation time and can be generated on any node without coordination.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifier of a job. Displayed as `job-<ulid>`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Ulid);

impl JobId {
    const PREFIX: &'static str = "job-";

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for JobId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0)
    }
}

impl FromStr for JobId {
    type Err = ulid::DecodeError;

    /// Accepts both the bare ULID and the prefixed display form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(Self::PREFIX).unwrap_or(s);
        Ulid::from_string(raw).map(Self)
    }
}
