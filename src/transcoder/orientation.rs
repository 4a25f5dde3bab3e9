use std::fmt;
use std::str::FromStr;

use crate::error::ThumbnailerError;

/// EXIF orientation tag value.
///
/// The standard values are 1..=8; exiftool reports up to 10 for some
/// vendor sentinels, which are carried through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Orientation(u8);

impl Orientation {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl FromStr for Orientation {
    type Err = ThumbnailerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        trimmed
            .parse::<u8>()
            .ok()
            .and_then(Orientation::new)
            .ok_or_else(|| ThumbnailerError::Orientation(trimmed.to_string()))
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tool_output() {
        assert_eq!("6\n".parse::<Orientation>().unwrap().value(), 6);
        assert_eq!(" 1 ".parse::<Orientation>().unwrap().value(), 1);
        assert_eq!("10".parse::<Orientation>().unwrap().value(), 10);
    }

    #[test]
    fn test_rejects_out_of_range_and_garbage() {
        assert!("".parse::<Orientation>().is_err());
        assert!("0".parse::<Orientation>().is_err());
        assert!("11".parse::<Orientation>().is_err());
        assert!("Rotate 90 CW".parse::<Orientation>().is_err());
        assert!("-3".parse::<Orientation>().is_err());
    }
}
