use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::UploadError;

/// The closed set of dataset kinds accepted for upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SchemaId {
    #[serde(rename = "RTIS")]
    Rtis,
    #[serde(rename = "SNT")]
    Snt,
    #[serde(rename = "FSD")]
    Fsd,
    #[serde(rename = "CMS")]
    Cms,
}

impl SchemaId {
    /// All schema identifiers in display order
    pub const ALL: [SchemaId; 4] = [SchemaId::Rtis, SchemaId::Snt, SchemaId::Fsd, SchemaId::Cms];

    pub fn as_str(self) -> &'static str {
        match self {
            SchemaId::Rtis => "RTIS",
            SchemaId::Snt => "SNT",
            SchemaId::Fsd => "FSD",
            SchemaId::Cms => "CMS",
        }
    }

    /// Position of this schema inside [`SchemaId::ALL`]
    pub(crate) fn index(self) -> usize {
        match self {
            SchemaId::Rtis => 0,
            SchemaId::Snt => 1,
            SchemaId::Fsd => 2,
            SchemaId::Cms => 3,
        }
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaId {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SchemaId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| UploadError::UnknownSchema(s.to_string()))
    }
}
