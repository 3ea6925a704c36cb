use std::fmt;

use crate::error::ValidationError;

pub const CONTROL_VALUE_MAX: u8 = 127;
pub const PART_COUNT: usize = 6;

/// A 7-bit parameter value. Construction is checked; nothing is ever clamped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ControlValue(u8);

impl ControlValue {
    pub const MIN: ControlValue = ControlValue(0);
    pub const MAX: ControlValue = ControlValue(CONTROL_VALUE_MAX);

    pub const fn new(value: u8) -> Option<Self> {
        if value <= CONTROL_VALUE_MAX {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn from_raw(value: i64, path: &str) -> Result<Self, ValidationError> {
        match u8::try_from(value) {
            Ok(v) if v <= CONTROL_VALUE_MAX => Ok(Self(v)),
            _ => Err(ValidationError::OutOfRange {
                path: path.to_string(),
                value,
                min: 0,
                max: i64::from(CONTROL_VALUE_MAX),
            }),
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Part number in `1..=6`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartIndex(u8);

impl PartIndex {
    pub fn new(number: i64) -> Result<Self, ValidationError> {
        match u8::try_from(number) {
            Ok(n) if (1..=PART_COUNT as u8).contains(&n) => Ok(Self(n)),
            _ => Err(ValidationError::OutOfRange {
                path: "part".to_string(),
                value: number,
                min: 1,
                max: PART_COUNT as i64,
            }),
        }
    }

    /// Parses a `part1`..`part6` document key.
    pub fn from_key(key: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidKey {
            path: String::new(),
            key: key.to_string(),
        };
        let digits = key.strip_prefix("part").ok_or_else(invalid)?;
        if digits.len() != 1 {
            return Err(invalid());
        }
        match digits.as_bytes()[0] {
            b @ b'1'..=b'6' => Ok(Self(b - b'0')),
            _ => Err(invalid()),
        }
    }

    pub fn all() -> impl Iterator<Item = PartIndex> {
        (1..=PART_COUNT as u8).map(PartIndex)
    }

    pub const fn number(self) -> u8 {
        self.0
    }

    /// Zero-based slot for array storage.
    pub const fn slot(self) -> usize {
        self.0 as usize - 1
    }

    pub fn key(self) -> String {
        format!("part{}", self.0)
    }
}

impl fmt::Display for PartIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "part{}", self.0)
    }
}

/// Positive (1-based) step number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StepIndex(u32);

impl StepIndex {
    pub fn new(number: i64) -> Result<Self, ValidationError> {
        match u32::try_from(number) {
            Ok(n) if n >= 1 => Ok(Self(n)),
            _ => Err(ValidationError::OutOfRange {
                path: "step".to_string(),
                value: number,
                min: 1,
                max: i64::from(u32::MAX),
            }),
        }
    }

    /// Parses a step key matching `[1-9][0-9]*`.
    pub fn from_key(key: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidKey {
            path: String::new(),
            key: key.to_string(),
        };
        let bytes = key.as_bytes();
        match bytes.first() {
            Some(b'1'..=b'9') => {}
            _ => return Err(invalid()),
        }
        if !bytes.iter().all(u8::is_ascii_digit) {
            return Err(invalid());
        }
        key.parse::<u32>().map(Self).map_err(|_| invalid())
    }

    pub const fn number(self) -> u32 {
        self.0
    }

    pub fn key(self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for StepIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayerId {
    Layer1,
    Layer2,
}

impl LayerId {
    pub const ALL: [LayerId; 2] = [LayerId::Layer1, LayerId::Layer2];

    pub fn key(self) -> &'static str {
        match self {
            LayerId::Layer1 => "layer1",
            LayerId::Layer2 => "layer2",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "layer1" => Some(LayerId::Layer1),
            "layer2" => Some(LayerId::Layer2),
            _ => None,
        }
    }

    pub const fn number(self) -> u8 {
        match self {
            LayerId::Layer1 => 1,
            LayerId::Layer2 => 2,
        }
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::{ControlValue, LayerId, PartIndex, StepIndex};
    use crate::error::ValidationError;

    #[test]
    fn control_value_accepts_exactly_seven_bits() {
        for raw in -3i64..=200 {
            let accepted = ControlValue::from_raw(raw, "level").is_ok();
            assert_eq!(accepted, (0..=127).contains(&raw), "raw={}", raw);
        }
        assert!(ControlValue::new(127).is_some());
        assert!(ControlValue::new(128).is_none());
    }

    #[test]
    fn part_keys_only_cover_one_to_six() {
        assert_eq!(PartIndex::from_key("part1").unwrap().number(), 1);
        assert_eq!(PartIndex::from_key("part6").unwrap().number(), 6);
        for key in ["part0", "part7", "part", "part12", "Part1", "track1"] {
            assert!(
                matches!(PartIndex::from_key(key), Err(ValidationError::InvalidKey { .. })),
                "{} should be rejected",
                key
            );
        }
        assert!(PartIndex::new(7).is_err());
        assert_eq!(PartIndex::all().count(), 6);
    }

    #[test]
    fn step_keys_reject_leading_zero_and_non_digits() {
        assert_eq!(StepIndex::from_key("1").unwrap().number(), 1);
        assert_eq!(StepIndex::from_key("1024").unwrap().number(), 1024);
        for key in ["0", "01", "", "-1", "1a", " 3", "99999999999"] {
            assert!(StepIndex::from_key(key).is_err(), "{:?} should be rejected", key);
        }
        assert!(StepIndex::new(0).is_err());
    }

    #[test]
    fn step_indices_order_numerically() {
        let mut steps = vec![
            StepIndex::from_key("10").unwrap(),
            StepIndex::from_key("2").unwrap(),
            StepIndex::from_key("1").unwrap(),
        ];
        steps.sort();
        let keys: Vec<_> = steps.into_iter().map(StepIndex::key).collect();
        assert_eq!(keys, ["1", "2", "10"]);
    }

    #[test]
    fn layer_keys_round_trip() {
        for layer in LayerId::ALL {
            assert_eq!(LayerId::from_key(layer.key()), Some(layer));
        }
        assert_eq!(LayerId::from_key("layer3"), None);
    }
}
