//! Strongly-typed ID types for domain entities.
//!
//! Every persisted row is keyed by a 64-bit snowflake id (see [`crate::snowflake`]).
//! IDs serialize as decimal strings so JSON consumers that store numbers as
//! doubles never lose precision, and deserialize from either strings or numbers.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to generate a strongly-typed ID wrapper around an `i64`.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw id value.
            #[must_use]
            pub const fn from_raw(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw id value, as stored in the database.
            #[must_use]
            pub const fn as_raw(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self).map_err(|e| ParseIdError {
                    id_type: stringify!($name),
                    reason: e.to_string(),
                })
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer
                    .deserialize_any(RawIdVisitor(stringify!($name)))
                    .map(Self)
            }
        }
    };
}

struct RawIdVisitor(&'static str);

impl Visitor<'_> for RawIdVisitor {
    type Value = i64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a {} as an integer or decimal string", self.0)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
        Ok(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
        i64::try_from(v).map_err(|_| E::custom(format!("{} out of range: {v}", self.0)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
        v.trim()
            .parse()
            .map_err(|_| E::custom(format!("invalid {}: {v:?}", self.0)))
    }
}

define_id!(
    /// Unique identifier for a user acting on the platform.
    UserId
);

define_id!(
    /// Unique identifier for a stored workflow template.
    TemplateId
);

define_id!(
    /// Unique identifier for a single execution of a workflow definition.
    WorkflowInstanceId
);

define_id!(
    /// Unique identifier for one node execution record within a workflow instance.
    NodeInstanceId
);

define_id!(
    /// Unique identifier for an uploaded file.
    FileId
);

define_id!(
    /// Unique identifier for a knowledge base.
    KnowledgeBaseId
);

define_id!(
    /// Unique identifier for a configured model.
    ModelId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_plain_decimal() {
        let id = WorkflowInstanceId::from_raw(7_234_019_882_110_976);
        assert_eq!(id.to_string(), "7234019882110976");
    }

    #[test]
    fn parse_trims_whitespace() {
        let id: NodeInstanceId = " 42 ".parse().expect("should parse");
        assert_eq!(id.as_raw(), 42);
    }

    #[test]
    fn parse_invalid_id() {
        let result: Result<TemplateId, _> = "tpl_abc".parse();
        let err = result.unwrap_err();
        assert_eq!(err.id_type, "TemplateId");
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&UserId::from_raw(9_007_199_254_740_993)).expect("serialize");
        assert_eq!(json, "\"9007199254740993\"");
    }

    #[test]
    fn deserializes_from_number_or_string() {
        let from_number: FileId = serde_json::from_str("12").expect("number");
        let from_string: FileId = serde_json::from_str("\"12\"").expect("string");
        assert_eq!(from_number, from_string);
        assert!(serde_json::from_str::<FileId>("\"twelve\"").is_err());
        assert!(serde_json::from_str::<FileId>("true").is_err());
    }

    #[test]
    fn ids_order_by_raw_value() {
        let mut ids = vec![ModelId::from_raw(3), ModelId::from_raw(1), ModelId::from_raw(2)];
        ids.sort();
        assert_eq!(ids, vec![ModelId::from(1), ModelId::from(2), ModelId::from(3)]);
    }
}
