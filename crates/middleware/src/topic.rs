//! Topic identifiers and consensus timestamps
//!
//! Topic ids use the dotted `shard.realm.num` form (e.g. "0.0.1234"); a bare
//! number is shorthand for `0.0.<num>`. Consensus timestamps use the mirror
//! node REST form `seconds.nanos` (e.g. "1700000000.000000042").

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// Identifier of a consensus topic (the feed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TopicId {
    pub shard: u64,
    pub realm: u64,
    pub num: u64,
}

impl TopicId {
    pub const fn new(shard: u64, realm: u64, num: u64) -> Self {
        Self { shard, realm, num }
    }
}

impl FromStr for TopicId {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TransportError::InvalidTopic(s.to_string());
        let parts = s
            .trim()
            .split('.')
            .map(|p| p.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;

        match parts.as_slice() {
            [num] => Ok(Self::new(0, 0, *num)),
            [shard, realm, num] => Ok(Self::new(*shard, *realm, *num)),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for TopicId {
    type Error = TransportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TopicId> for String {
    fn from(topic: TopicId) -> Self {
        topic.to_string()
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.shard, self.realm, self.num)
    }
}

/// Consensus timestamp assigned by the network: seconds and nanoseconds since the Unix epoch
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct ConsensusTimestamp {
    pub seconds: i64,
    pub nanos: u32,
}

impl ConsensusTimestamp {
    pub const EPOCH: Self = Self::new(0, 0);

    /// `nanos` must be below one second.
    pub const fn new(seconds: i64, nanos: u32) -> Self {
        Self { seconds, nanos }
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            seconds: dt.timestamp(),
            nanos: dt.timestamp_subsec_nanos().min(NANOS_PER_SECOND - 1),
        }
    }

    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Calendar form of this timestamp, `None` when out of chrono's range
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.seconds, self.nanos)
    }
}

impl FromStr for ConsensusTimestamp {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TransportError::InvalidTimestamp(s.to_string());
        let trimmed = s.trim();
        let (seconds, fraction) = match trimmed.split_once('.') {
            Some((seconds, fraction)) => (seconds, Some(fraction)),
            None => (trimmed, None),
        };

        // Unsigned seconds only: consensus time is never before the epoch
        if seconds.is_empty() || !seconds.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let seconds: i64 = seconds.parse().map_err(|_| invalid())?;
        let nanos = match fraction {
            None => 0,
            Some(f) if !f.is_empty() && f.len() <= 9 && f.bytes().all(|b| b.is_ascii_digit()) => {
                // "5" is half a second, not five nanoseconds
                format!("{:0<9}", f).parse::<u32>().map_err(|_| invalid())?
            }
            Some(_) => return Err(invalid()),
        };

        Ok(Self::new(seconds, nanos))
    }
}

impl TryFrom<String> for ConsensusTimestamp {
    type Error = TransportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConsensusTimestamp> for String {
    fn from(ts: ConsensusTimestamp) -> Self {
        ts.to_string()
    }
}

impl fmt::Display for ConsensusTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_id_parse() {
        let topic: TopicId = "0.0.1234".parse().unwrap();
        assert_eq!(topic, TopicId::new(0, 0, 1234));

        let topic: TopicId = "1.2.3".parse().unwrap();
        assert_eq!(topic, TopicId::new(1, 2, 3));
        assert_eq!(topic.to_string(), "1.2.3");
    }

    #[test]
    fn test_topic_id_bare_number() {
        let topic: TopicId = "48117".parse().unwrap();
        assert_eq!(topic, TopicId::new(0, 0, 48117));
    }

    #[test]
    fn test_topic_id_invalid() {
        assert!(matches!("".parse::<TopicId>(), Err(TransportError::InvalidTopic(_))));
        assert!("0.0".parse::<TopicId>().is_err());
        assert!("0.0.abc".parse::<TopicId>().is_err());
        assert!("0.0.1.2".parse::<TopicId>().is_err());
    }

    #[test]
    fn test_topic_id_serde_as_string() {
        let topic = TopicId::new(0, 0, 77);
        let json = serde_json::to_string(&topic).unwrap();
        assert_eq!(json, r#""0.0.77""#);

        let back: TopicId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, topic);
    }

    #[test]
    fn test_timestamp_parse_mirror_format() {
        let ts: ConsensusTimestamp = "1700000000.000000042".parse().unwrap();
        assert_eq!(ts, ConsensusTimestamp::new(1_700_000_000, 42));
    }

    #[test]
    fn test_timestamp_parse_short_fraction_is_right_padded() {
        let ts: ConsensusTimestamp = "10.5".parse().unwrap();
        assert_eq!(ts.nanos, 500_000_000);

        let ts: ConsensusTimestamp = "0".parse().unwrap();
        assert_eq!(ts, ConsensusTimestamp::EPOCH);
    }

    #[test]
    fn test_timestamp_parse_invalid() {
        assert!("abc".parse::<ConsensusTimestamp>().is_err());
        assert!("1.".parse::<ConsensusTimestamp>().is_err());
        assert!("1.1234567890".parse::<ConsensusTimestamp>().is_err());
        assert!("1.-5".parse::<ConsensusTimestamp>().is_err());
    }

    #[test]
    fn test_timestamp_parse_rejects_signed_seconds() {
        assert!(matches!(
            "-0.5".parse::<ConsensusTimestamp>(),
            Err(TransportError::InvalidTimestamp(_))
        ));
        assert!("-1".parse::<ConsensusTimestamp>().is_err());
        assert!("+1.0".parse::<ConsensusTimestamp>().is_err());
        assert!(".5".parse::<ConsensusTimestamp>().is_err());
    }

    #[test]
    fn test_timestamp_ordering() {
        let a = ConsensusTimestamp::new(10, 999_999_999);
        let b = ConsensusTimestamp::new(11, 0);
        assert!(a < b);
    }

    #[test]
    fn test_timestamp_to_datetime() {
        let ts = ConsensusTimestamp::new(1_700_000_000, 123_000_000);
        let dt = ts.to_datetime().unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
        assert_eq!(dt.timestamp_subsec_millis(), 123);
        assert_eq!(ConsensusTimestamp::from_datetime(dt), ts);
    }

    #[test]
    fn test_timestamp_out_of_range_has_no_calendar_form() {
        assert!(ConsensusTimestamp::new(i64::MAX, 0).to_datetime().is_none());
    }
}
