//! File naming policy.
//!
//! Names are composed as `{prefix}_{random digits}_{timestamp}.{extension}`.
//! The clock and the digit source are injected so names can be made
//! deterministic in tests.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Default number of random digits in a generated name.
pub const DEFAULT_RANDOM_DIGITS: u32 = 2;

/// Extension used when nothing better can be derived.
const FALLBACK_EXTENSION: &str = "bin";

/// Preferred extensions for common types; `mime_guess` lists candidates
/// alphabetically, which picks odd ones (e.g. `jfif` for JPEG).
const PREFERRED_EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpeg"),
    ("image/jpg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/svg+xml", "svg"),
    ("text/plain", "txt"),
    ("text/html", "html"),
    ("text/csv", "csv"),
    ("application/json", "json"),
    ("application/pdf", "pdf"),
    ("application/zip", "zip"),
];

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Source of decimal digits for name randomization.
pub trait RandomSource: Send + Sync {
    /// A digit in `0..=9`.
    fn digit(&self) -> u8;
}

/// Digits from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn digit(&self) -> u8 {
        rand::rng().random_range(0..10)
    }
}

/// Replays a fixed digit sequence, wrapping around at the end.
#[derive(Debug)]
pub struct SequenceRandom {
    digits: Vec<u8>,
    next: AtomicUsize,
}

impl SequenceRandom {
    /// Create a source replaying `digits` (each taken modulo 10).
    pub fn new(digits: impl Into<Vec<u8>>) -> Self {
        let mut digits: Vec<u8> = digits.into().into_iter().map(|d| d % 10).collect();
        if digits.is_empty() {
            digits.push(0);
        }
        Self {
            digits,
            next: AtomicUsize::new(0),
        }
    }
}

impl RandomSource for SequenceRandom {
    fn digit(&self) -> u8 {
        let i = self.next.fetch_add(1, Ordering::Relaxed);
        self.digits[i % self.digits.len()]
    }
}

/// Inputs for one generated file name.
#[derive(Debug, Clone, Default)]
pub struct NameParams<'a> {
    /// Name prefix (usually the form field name).
    pub prefix: &'a str,
    /// Explicit file name; used verbatim when set.
    pub filename: Option<&'a str>,
    /// Fixed timestamp segment; the clock is used when unset.
    pub date: Option<&'a str>,
    /// Number of random digits (0 disables the segment).
    pub randoms: u32,
    /// Explicit extension, tried before the MIME type.
    pub suffix: Option<&'a str>,
    /// MIME type of the content.
    pub mimetype: &'a str,
}

/// Generates file names from a clock and a digit source.
#[derive(Clone)]
pub struct NamingPolicy {
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(ThreadRandom))
    }
}

impl fmt::Debug for NamingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamingPolicy").finish_non_exhaustive()
    }
}

impl NamingPolicy {
    /// Create a policy from explicit sources.
    pub fn new(clock: Arc<dyn Clock>, random: Arc<dyn RandomSource>) -> Self {
        Self { clock, random }
    }

    /// Filesystem-safe timestamp for the current instant.
    pub fn timestamp(&self) -> String {
        timestamp_token(&self.clock.now())
    }

    /// `count` random digits.
    pub fn random_digits(&self, count: u32) -> String {
        (0..count)
            .map(|_| char::from(b'0' + self.random.digit()))
            .collect()
    }

    /// Compose `{prefix}_{digits}_{date}.{extension}`.
    ///
    /// The digit segment and its separator are omitted when `randoms` is 0.
    pub fn compose(
        &self,
        prefix: &str,
        randoms: u32,
        date: Option<&str>,
        extension: &str,
    ) -> String {
        let date = date.map_or_else(|| self.timestamp(), str::to_string);
        let extension = normalize_extension(extension);

        if randoms == 0 {
            format!("{prefix}_{date}.{extension}")
        } else {
            format!(
                "{prefix}_{}_{date}.{extension}",
                self.random_digits(randoms)
            )
        }
    }

    /// Produce a file name for the given parameters.
    pub fn file_name(&self, params: &NameParams<'_>) -> String {
        if let Some(filename) = params.filename {
            return filename.to_string();
        }

        let extension = resolve_extension(params.suffix, params.mimetype);
        self.compose(params.prefix, params.randoms, params.date, &extension)
    }
}

/// Format an instant as an ISO-8601 string with `-` replaced by `_` and
/// `:`/`.` replaced by `-`, e.g. `2024_01_02T03-04-05-678Z`.
pub fn timestamp_token(instant: &DateTime<Utc>) -> String {
    instant.format("%Y_%m_%dT%H-%M-%S-%3fZ").to_string()
}

/// Extension registered for a MIME type, if any.
pub fn extension_for_mime(mimetype: &str) -> Option<String> {
    let essence = mime_essence(mimetype);

    if let Some((_, ext)) = PREFERRED_EXTENSIONS.iter().find(|(m, _)| *m == essence) {
        return Some((*ext).to_string());
    }

    let candidates = mime_guess::get_mime_extensions_str(&essence)?;
    let subtype = mime_subtype(&essence);
    candidates
        .iter()
        .find(|ext| **ext == subtype)
        .or_else(|| candidates.first())
        .map(|ext| (*ext).to_string())
}

/// Subtype part of a MIME type (`"png"` for `"image/png"`).
pub fn mime_subtype(mimetype: &str) -> &str {
    let without_params = mimetype.split(';').next().unwrap_or_default().trim();
    without_params
        .split_once('/')
        .map(|(_, subtype)| subtype)
        .filter(|subtype| !subtype.is_empty())
        .unwrap_or(FALLBACK_EXTENSION)
}

/// Extension to use: explicit suffix, then the registered extension of the
/// MIME type, then its raw subtype.
pub fn resolve_extension(suffix: Option<&str>, mimetype: &str) -> String {
    suffix
        .map(normalize_extension)
        .filter(|ext| !ext.is_empty())
        .map(str::to_string)
        .or_else(|| extension_for_mime(mimetype))
        .unwrap_or_else(|| mime_subtype(mimetype).to_string())
}

/// Strip a leading dot from a user-supplied extension.
pub fn normalize_extension(extension: &str) -> &str {
    extension.trim().trim_start_matches('.')
}

fn mime_essence(mimetype: &str) -> String {
    mimetype
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
