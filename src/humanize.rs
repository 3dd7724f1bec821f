//! Human-readable sizes and durations for configuration values
//!
//! Both types accept either a bare integer (bytes / seconds) or a string
//! with a unit suffix, so TOML and environment overrides read naturally:
//! `chunk_size = "512KB"`, `max_cooldown = "1h"`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(#[from] std::num::ParseIntError),

    #[error("Invalid unit: {0}")]
    InvalidUnit(String),
}

/// Splits `"512KB"` into `(512, "KB")`. The unit may be empty.
fn split_number_unit(s: &str) -> Result<(u64, &str), ParseError> {
    let pos = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if pos == 0 {
        return Err(ParseError::InvalidFormat(s.to_string()));
    }
    let num: u64 = s[..pos].parse()?;
    Ok((num, s[pos..].trim()))
}

/// Byte size wrapper with human-readable parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const KIB: u64 = 1024;
    pub const MIB: u64 = 1024 * 1024;

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn as_usize(&self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }

    pub fn to_human_readable(&self) -> String {
        const UNITS: &[(&str, u64)] = &[
            ("GB", 1024 * 1024 * 1024),
            ("MB", ByteSize::MIB),
            ("KB", ByteSize::KIB),
        ];

        for &(unit, divisor) in UNITS {
            if self.0 >= divisor && self.0 % divisor == 0 {
                return format!("{}{}", self.0 / divisor, unit);
            }
        }

        format!("{}B", self.0)
    }
}

impl FromStr for ByteSize {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();
        let (num, unit) = split_number_unit(&s)?;

        let multiplier = match unit {
            "" | "B" => 1,
            "K" | "KB" | "KIB" => ByteSize::KIB,
            "M" | "MB" | "MIB" => ByteSize::MIB,
            "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
            other => return Err(ParseError::InvalidUnit(other.to_string())),
        };

        num.checked_mul(multiplier)
            .map(ByteSize)
            .ok_or_else(|| ParseError::InvalidFormat(s.clone()))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_human_readable())
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ByteSizeVisitor;

        impl serde::de::Visitor<'_> for ByteSizeVisitor {
            type Value = ByteSize;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a byte size as string (e.g., \"512KB\") or integer")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(ByteSize(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(ByteSize)
                    .map_err(|_| E::custom("byte size must not be negative"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse::<ByteSize>().map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_any(ByteSizeVisitor)
    }
}

/// Duration wrapper accepting `"30s"`, `"5m"`, `"1h"`, `"250ms"` or plain seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl FromStr for HumanDuration {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let (num, unit) = split_number_unit(&s)?;

        let duration = match unit {
            "ms" => Duration::from_millis(num),
            "" | "s" | "sec" | "secs" => Duration::from_secs(num),
            "m" | "min" | "mins" => Duration::from_secs(num.saturating_mul(60)),
            "h" | "hr" | "hrs" => Duration::from_secs(num.saturating_mul(3600)),
            other => return Err(ParseError::InvalidUnit(other.to_string())),
        };

        Ok(HumanDuration(duration))
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.0;
        if d.subsec_millis() != 0 {
            return write!(f, "{}ms", d.as_millis());
        }
        let secs = d.as_secs();
        if secs != 0 && secs % 3600 == 0 {
            write!(f, "{}h", secs / 3600)
        } else if secs != 0 && secs % 60 == 0 {
            write!(f, "{}m", secs / 60)
        } else {
            write!(f, "{}s", secs)
        }
    }
}

impl Serialize for HumanDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct DurationVisitor;

        impl serde::de::Visitor<'_> for DurationVisitor {
            type Value = HumanDuration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a duration as string (e.g., \"30s\", \"1h\") or seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(HumanDuration::from_secs(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(HumanDuration::from_secs)
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse::<HumanDuration>().map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sizes() {
        assert_eq!("1024".parse::<ByteSize>().unwrap().as_u64(), 1024);
        assert_eq!("512KB".parse::<ByteSize>().unwrap().as_u64(), 512 * 1024);
        assert_eq!("1m".parse::<ByteSize>().unwrap().as_u64(), 1024 * 1024);
        assert_eq!("1MiB".parse::<ByteSize>().unwrap().as_u64(), 1024 * 1024);
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        assert!(matches!(
            "KB".parse::<ByteSize>(),
            Err(ParseError::InvalidFormat(_))
        ));
        assert!(matches!(
            "12XB".parse::<ByteSize>(),
            Err(ParseError::InvalidUnit(_))
        ));
    }

    #[test]
    fn test_size_display() {
        assert_eq!(ByteSize(512 * 1024).to_string(), "512KB");
        assert_eq!(ByteSize(1024 * 1024).to_string(), "1MB");
        assert_eq!(ByteSize(1500).to_string(), "1500B");
    }

    #[test]
    fn test_parse_durations() {
        assert_eq!(
            "30s".parse::<HumanDuration>().unwrap().as_duration(),
            Duration::from_secs(30)
        );
        assert_eq!(
            "5m".parse::<HumanDuration>().unwrap().as_duration(),
            Duration::from_secs(300)
        );
        assert_eq!(
            "1h".parse::<HumanDuration>().unwrap().as_duration(),
            Duration::from_secs(3600)
        );
        assert_eq!(
            "250ms".parse::<HumanDuration>().unwrap().as_duration(),
            Duration::from_millis(250)
        );
        assert_eq!(
            "45".parse::<HumanDuration>().unwrap().as_duration(),
            Duration::from_secs(45)
        );
        assert!("soon".parse::<HumanDuration>().is_err());
        assert!("3d".parse::<HumanDuration>().is_err());
    }

    #[test]
    fn test_duration_display() {
        assert_eq!(HumanDuration::from_secs(3600).to_string(), "1h");
        assert_eq!(HumanDuration::from_secs(120).to_string(), "2m");
        assert_eq!(HumanDuration::from_secs(45).to_string(), "45s");
        assert_eq!(HumanDuration(Duration::from_millis(1500)).to_string(), "1500ms");
    }

    #[test]
    fn test_deserialize_mixed() {
        #[derive(Deserialize)]
        struct TestStruct {
            size: ByteSize,
            wait: HumanDuration,
        }
        let parsed: TestStruct =
            serde_json::from_str(r#"{"size": "1MB", "wait": 10}"#).unwrap();
        assert_eq!(parsed.size.as_u64(), 1024 * 1024);
        assert_eq!(parsed.wait.as_duration(), Duration::from_secs(10));

        let parsed: TestStruct =
            serde_json::from_str(r#"{"size": 2048, "wait": "2m"}"#).unwrap();
        assert_eq!(parsed.size.as_u64(), 2048);
        assert_eq!(parsed.wait.as_duration(), Duration::from_secs(120));
    }
}
