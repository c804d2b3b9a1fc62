use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Movie running time in minutes, written as `"<n> mins"` in JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Runtime(pub i32);

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mins", self.0)
    }
}

impl Serialize for Runtime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_runtime(&raw).ok_or_else(|| de::Error::custom("invalid runtime format"))
    }
}

fn parse_runtime(raw: &str) -> Option<Runtime> {
    let mut parts = raw.split(' ');
    let (Some(number), Some("mins"), None) = (parts.next(), parts.next(), parts.next()) else {
        return None;
    };
    number.parse::<i32>().ok().map(Runtime)
}
