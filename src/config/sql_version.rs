use std::{fmt::Display, str::FromStr};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

static SERVER_VERSION: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^\s*(\d{1,2})\.\d+").ok());

/// Target SQL Server version.
///
/// - `Sql8`: SQL Server 2000. No EXCEPT/INTERSECT, no row_number, `TOP n` only.
/// - `Sql9`: SQL Server 2005.
/// - `Sql10`: SQL Server 2008 and later ("Katmai"), adds `datetime2`, `time`,
///   `datetimeoffset` and spatial types.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum SqlVersion {
    Sql8,
    Sql9,
    #[default]
    Sql10,
}

impl SqlVersion {
    /// True for every version older than SQL Server 2008.
    pub fn is_pre_katmai(self) -> bool {
        self < SqlVersion::Sql10
    }

    /// The provider manifest token of the version.
    pub fn manifest_token(self) -> &'static str {
        match self {
            SqlVersion::Sql8 => "2000",
            SqlVersion::Sql9 => "2005",
            SqlVersion::Sql10 => "2008",
        }
    }

    /// Maps a server version string (`"09.00.3042"`, `"10.50.1600.1"`) to a version.
    pub fn from_server_version(server_version: &str) -> Result<Self> {
        let major = SERVER_VERSION
            .as_ref()
            .and_then(|re| re.captures(server_version))
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .ok_or_else(|| Error::Config(format!("unrecognized server version '{server_version}'")))?;

        match major {
            8 => Ok(SqlVersion::Sql8),
            9 => Ok(SqlVersion::Sql9),
            m if m >= 10 => Ok(SqlVersion::Sql10),
            m => Err(Error::Config(format!("server major version {m} is not supported"))),
        }
    }
}

impl FromStr for SqlVersion {
    type Err = Error;

    fn from_str(token: &str) -> Result<Self> {
        match token.trim() {
            "2000" => Ok(SqlVersion::Sql8),
            "2005" => Ok(SqlVersion::Sql9),
            "2008" => Ok(SqlVersion::Sql10),
            other => Err(Error::Config(format!("unknown manifest token '{other}'"))),
        }
    }
}

impl Display for SqlVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SQL Server {}", self.manifest_token())
    }
}
