//! Minute buckets, window offsets and clocks
//!
//! A bucket is the set of keyword scores observed during one wall-clock
//! minute. Its key is `trend:<YYYYMMDDHHmm>` rendered in a fixed UTC offset so
//! that every replica writing into a shared store agrees on bucket identity.
//!
//! A window is the contiguous range of buckets `[now - end, now - start)` at
//! minute resolution, described by a [`WindowSpec`].

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

use crate::{Error, Result};

/// Prefix shared by every bucket key
pub const BUCKET_PREFIX: &str = "trend:";

const BUCKET_FORMAT: &str = "%Y%m%d%H%M";
const BUCKET_DIGITS: usize = 12;

/// Key of one minute-wide bucket, e.g. `trend:202406061230`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketKey(String);

impl BucketKey {
    /// Key of the bucket containing `at`, floored to the minute in `zone`
    pub fn for_instant(at: DateTime<Utc>, zone: FixedOffset) -> Self {
        let local = at.with_timezone(&zone);
        Self(format!("{}{}", BUCKET_PREFIX, local.format(BUCKET_FORMAT)))
    }

    /// Parse and validate a raw key
    ///
    /// Anything other than the prefix followed by exactly twelve ASCII digits
    /// is rejected here rather than being passed on to a store.
    pub fn parse(raw: &str) -> Result<Self> {
        let digits = raw
            .strip_prefix(BUCKET_PREFIX)
            .ok_or_else(|| Error::InvalidInput(format!("bucket key missing prefix: {raw}")))?;

        if digits.len() != BUCKET_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidInput(format!("malformed bucket key: {raw}")));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the fixed zone buckets are rendered in
pub fn bucket_zone(offset_minutes: i32) -> Result<FixedOffset> {
    offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| Error::InvalidInput(format!("UTC offset out of range: {offset_minutes} minutes")))
}

/// Minute offsets of a window relative to "now": `[now - end, now - start)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    start_offset_minutes: u32,
    end_offset_minutes: u32,
}

impl WindowSpec {
    pub fn new(start_offset_minutes: u32, end_offset_minutes: u32) -> Result<Self> {
        if start_offset_minutes >= end_offset_minutes {
            return Err(Error::InvalidInput(format!(
                "window start offset {start_offset_minutes} must be below end offset {end_offset_minutes}"
            )));
        }
        Ok(Self {
            start_offset_minutes,
            end_offset_minutes,
        })
    }

    /// The most recent `minutes` buckets
    pub fn recent(minutes: u32) -> Result<Self> {
        Self::new(0, minutes)
    }

    /// The `minutes` buckets immediately older than `self`
    pub fn preceding(&self, minutes: u32) -> Result<Self> {
        let end = self
            .end_offset_minutes
            .checked_add(minutes)
            .ok_or_else(|| Error::InvalidInput(format!("window end offset overflows: {} + {}", self.end_offset_minutes, minutes)))?;
        Self::new(self.end_offset_minutes, end)
    }

    pub fn start_offset_minutes(&self) -> u32 {
        self.start_offset_minutes
    }

    pub fn end_offset_minutes(&self) -> u32 {
        self.end_offset_minutes
    }

    pub fn len_minutes(&self) -> u32 {
        self.end_offset_minutes - self.start_offset_minutes
    }

    /// Bucket keys covered by this window, newest first
    pub fn bucket_keys(&self, now: DateTime<Utc>, zone: FixedOffset) -> Vec<BucketKey> {
        (self.start_offset_minutes..self.end_offset_minutes)
            .map(|i| BucketKey::for_instant(now - Duration::minutes(i64::from(i)), zone))
            .collect()
    }
}

/// Source of "now" for bucket keys and expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = at;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}
