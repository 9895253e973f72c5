/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeParseError {
    #[error("unsupported range unit")]
    UnsupportedUnit,
    #[error("invalid range spec")]
    InvalidSpec,
    #[error("range not satisfiable")]
    Unsatisfiable,
    #[error("too many ranges")]
    TooManyRanges,
}

/// Most parts served in one `multipart/byteranges` response.
pub const MAX_RANGE_PARTS: usize = 32;

/// An inclusive byte range inside a resource of known size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HttpByteRange {
    pub start: u64,
    pub end: u64,
}

impl HttpByteRange {
    #[allow(clippy::len_without_is_empty)]
    #[inline]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    fn parse_spec(spec: &str, total: u64) -> Result<Self, RangeParseError> {
        let Some((first, last)) = spec.split_once('-') else {
            return Err(RangeParseError::InvalidSpec);
        };
        let first = first.trim();
        let last = last.trim();

        if first.is_empty() {
            // suffix range
            let suffix = u64::from_str(last).map_err(|_| RangeParseError::InvalidSpec)?;
            if suffix == 0 || total == 0 {
                return Err(RangeParseError::Unsatisfiable);
            }
            return Ok(HttpByteRange {
                start: total.saturating_sub(suffix),
                end: total - 1,
            });
        }

        let start = u64::from_str(first).map_err(|_| RangeParseError::InvalidSpec)?;
        let end = if last.is_empty() {
            None
        } else {
            let end = u64::from_str(last).map_err(|_| RangeParseError::InvalidSpec)?;
            if end < start {
                return Err(RangeParseError::InvalidSpec);
            }
            Some(end)
        };
        if start >= total {
            return Err(RangeParseError::Unsatisfiable);
        }
        let end = match end {
            Some(end) => end.min(total - 1),
            None => total - 1,
        };
        Ok(HttpByteRange { start, end })
    }
}

/// Parse the value of a `Range` header against a resource of `total` bytes.
pub fn parse_range_header(value: &str, total: u64) -> Result<Vec<HttpByteRange>, RangeParseError> {
    let Some((unit, specs)) = value.trim().split_once('=') else {
        return Err(RangeParseError::InvalidSpec);
    };
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return Err(RangeParseError::UnsupportedUnit);
    }

    let mut ranges = Vec::new();
    for spec in specs.split(',') {
        let spec = spec.trim();
        if spec.is_empty() {
            continue;
        }
        ranges.push(HttpByteRange::parse_spec(spec, total)?);
    }
    if ranges.is_empty() {
        return Err(RangeParseError::InvalidSpec);
    }
    let ranges = coalesce(ranges);
    if ranges.len() > MAX_RANGE_PARTS {
        return Err(RangeParseError::TooManyRanges);
    }
    Ok(ranges)
}

/// Merge overlapping or adjacent ranges, ordered by start offset.
fn coalesce(mut ranges: Vec<HttpByteRange>) -> Vec<HttpByteRange> {
    if ranges.len() < 2 {
        return ranges;
    }
    ranges.sort_unstable_by_key(|r| r.start);
    let mut merged: Vec<HttpByteRange> = Vec::with_capacity(ranges.len());
    for r in ranges {
        match merged.last_mut() {
            Some(last) if r.start <= last.end.saturating_add(1) => {
                last.end = last.end.max(r.end);
            }
            _ => merged.push(r),
        }
    }
    merged
}

/// Value of a `Content-Range` header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HttpContentRange {
    pub range: Option<HttpByteRange>,
    pub total: Option<u64>,
}

impl HttpContentRange {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (unit, left) = value.split_once(' ')?;
        if !unit.eq_ignore_ascii_case("bytes") {
            return None;
        }
        let (range, total) = left.trim().split_once('/')?;
        let total = match total.trim() {
            "*" => None,
            s => Some(u64::from_str(s).ok()?),
        };
        let range = match range.trim() {
            "*" => None,
            s => {
                let (start, end) = s.split_once('-')?;
                let start = u64::from_str(start.trim()).ok()?;
                let end = u64::from_str(end.trim()).ok()?;
                if end < start {
                    return None;
                }
                Some(HttpByteRange { start, end })
            }
        };
        Some(HttpContentRange { range, total })
    }

    /// Whether the stored bytes cover the requested range.
    pub fn covers(&self, range: &HttpByteRange) -> bool {
        match &self.range {
            Some(r) => r.start <= range.start && range.end <= r.end,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single() {
        let r = parse_range_header("bytes=10-19", 100).unwrap();
        assert_eq!(r, vec![HttpByteRange { start: 10, end: 19 }]);
        assert_eq!(r[0].len(), 10);
    }

    #[test]
    fn open_and_suffix() {
        let r = parse_range_header("bytes=90-", 100).unwrap();
        assert_eq!(r, vec![HttpByteRange { start: 90, end: 99 }]);

        let r = parse_range_header("bytes=-10", 100).unwrap();
        assert_eq!(r, vec![HttpByteRange { start: 90, end: 99 }]);

        let r = parse_range_header("bytes=-1000", 100).unwrap();
        assert_eq!(r, vec![HttpByteRange { start: 0, end: 99 }]);
    }

    #[test]
    fn clamp_end() {
        let r = parse_range_header("bytes=50-1000", 100).unwrap();
        assert_eq!(r, vec![HttpByteRange { start: 50, end: 99 }]);
    }

    #[test]
    fn multiple() {
        let r = parse_range_header("bytes=0-9, 20-29,-5", 100).unwrap();
        assert_eq!(
            r,
            vec![
                HttpByteRange { start: 0, end: 9 },
                HttpByteRange { start: 20, end: 29 },
                HttpByteRange { start: 95, end: 99 },
            ]
        );
    }

    #[test]
    fn coalesced() {
        let r = parse_range_header("bytes=0-,0-,0-,0-", 100).unwrap();
        assert_eq!(r, vec![HttpByteRange { start: 0, end: 99 }]);

        let r = parse_range_header("bytes=50-59,0-9,10-19,55-70", 100).unwrap();
        assert_eq!(
            r,
            vec![
                HttpByteRange { start: 0, end: 19 },
                HttpByteRange { start: 50, end: 70 },
            ]
        );

        let value = format!("bytes={}", vec!["0-"; 10_000].join(","));
        let r = parse_range_header(&value, 100).unwrap();
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn too_many_parts() {
        let specs: Vec<String> = (0..=MAX_RANGE_PARTS as u64)
            .map(|i| format!("{}-{}", i * 2, i * 2))
            .collect();
        let value = format!("bytes={}", specs.join(","));
        assert_eq!(
            parse_range_header(&value, 1000),
            Err(RangeParseError::TooManyRanges)
        );

        let value = format!("bytes={}", specs[..MAX_RANGE_PARTS].join(","));
        assert_eq!(parse_range_header(&value, 1000).unwrap().len(), MAX_RANGE_PARTS);
    }

    #[test]
    fn invalid() {
        assert_eq!(
            parse_range_header("bytes=100-", 100),
            Err(RangeParseError::Unsatisfiable)
        );
        assert_eq!(
            parse_range_header("bytes=-0", 100),
            Err(RangeParseError::Unsatisfiable)
        );
        assert_eq!(
            parse_range_header("bytes=20-10", 100),
            Err(RangeParseError::InvalidSpec)
        );
        assert_eq!(
            parse_range_header("items=0-1", 100),
            Err(RangeParseError::UnsupportedUnit)
        );
        assert_eq!(
            parse_range_header("bytes=18446744073709551616-", 100),
            Err(RangeParseError::InvalidSpec)
        );
        assert!(parse_range_header("bytes=", 100).is_err());
    }

    #[test]
    fn content_range() {
        let cr = HttpContentRange::parse("bytes 0-49/100").unwrap();
        assert_eq!(cr.total, Some(100));
        assert!(cr.covers(&HttpByteRange { start: 10, end: 19 }));
        assert!(!cr.covers(&HttpByteRange { start: 40, end: 59 }));

        let cr = HttpContentRange::parse("bytes */100").unwrap();
        assert!(cr.range.is_none());
        assert!(HttpContentRange::parse("bytes 5-1/100").is_none());
    }
}
