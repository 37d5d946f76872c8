use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};

use crate::predict::error::PredictError;
use crate::predict::orbit::OrbitModel;

const MOON_MAX_AGE_DAYS: f64 = 1.5;
const MIN_MAX_AGE_DAYS: f64 = 7.0;
const MAX_MAX_AGE_DAYS: f64 = 60.0;
const AGE_PERIODS: f64 = 200.0;

/// One named two-line element set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TleSet {
    pub name: String,
    pub line1: String,
    pub line2: String,
    pub source: String,
}

/// Anything that can hand out element sets by satellite name.
pub trait ElementSource {
    fn fetch(&mut self, name: &str) -> Result<TleSet, PredictError>;
}

/// Sum of the digits in the first 68 columns, `-` counting as 1, modulo 10.
pub fn checksum_digit(line: &str) -> u32 {
    line.chars()
        .take(68)
        .map(|c| match c {
            '0'..='9' => c as u32 - '0' as u32,
            '-' => 1,
            _ => 0,
        })
        .sum::<u32>()
        % 10
}

/// True when column 69 holds the checksum of the first 68 columns.
pub fn checksum_ok(line: &str) -> bool {
    let line = line.trim_end();
    match line.chars().nth(68).and_then(|c| c.to_digit(10)) {
        Some(expected) => line.chars().count() == 69 && checksum_digit(line) == expected,
        None => false,
    }
}

/// Oldest element epoch, in days, still trusted for a body of this period.
pub fn max_epoch_age_days(period_days: f64, is_moon: bool) -> f64 {
    if is_moon {
        MOON_MAX_AGE_DAYS
    } else {
        (AGE_PERIODS * period_days).clamp(MIN_MAX_AGE_DAYS, MAX_MAX_AGE_DAYS)
    }
}

pub fn check_epoch_age(body: &dyn OrbitModel, now: DateTime<Utc>) -> Result<(), PredictError> {
    let age_days = (now - body.epoch()).num_seconds().abs() as f64 / 86_400.0;
    let max_days = max_epoch_age_days(body.period_days(), body.is_moon());
    if age_days > max_days {
        return Err(PredictError::StaleElements {
            name: body.name().to_string(),
            age_days,
            max_days,
        });
    }
    Ok(())
}

/// Fetches `name`, retrying transport-level failures with a fixed backoff.
/// A missing satellite is not retried.
pub async fn fetch_with_retry<S: ElementSource + ?Sized>(
    source: &mut S,
    name: &str,
    attempts: u32,
    backoff: StdDuration,
) -> Result<TleSet, PredictError> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match source.fetch(name) {
            Ok(tle) => return Ok(tle),
            Err(e @ PredictError::NotFound(_)) => return Err(e),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                log::warn!(
                    "Fetching elements for {} failed (attempt {}/{}): {}",
                    name,
                    attempt,
                    attempts,
                    e
                );
                attempt += 1;
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Element sets read from every `.tle`/`.txt` file in a directory.
pub struct TleLoader {
    tle_dir: PathBuf,
    satellites: HashMap<String, TleSet>,
}

impl TleLoader {
    pub fn new(tle_dir: PathBuf) -> Self {
        Self {
            tle_dir,
            satellites: HashMap::new(),
        }
    }

    /// Load all TLE files from the directory
    pub fn load_all(&mut self) -> Result<(), PredictError> {
        if !self.tle_dir.exists() {
            return Err(PredictError::DirectoryNotFound(
                self.tle_dir.display().to_string(),
            ));
        }

        self.satellites.clear();

        for entry in fs::read_dir(&self.tle_dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let is_tle = path
                .extension()
                .map(|ext| ext == "tle" || ext == "txt")
                .unwrap_or(false);
            if !is_tle {
                continue;
            }
            match parse_tle_file(&path) {
                Ok(entries) => {
                    for tle in entries {
                        self.satellites.insert(tle.name.to_lowercase(), tle);
                    }
                }
                Err(e) => {
                    log::warn!("Failed to parse TLE file {}: {}", path.display(), e);
                }
            }
        }

        log::debug!(
            "Loaded {} element sets from {}",
            self.satellites.len(),
            self.tle_dir.display()
        );
        Ok(())
    }

    /// Names of all loaded satellites, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.satellites.values().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn get(&self, name: &str) -> Option<&TleSet> {
        self.satellites.get(&name.trim().to_lowercase())
    }
}

impl ElementSource for TleLoader {
    /// Rereads the directory so a refreshed file is picked up on every lookup.
    fn fetch(&mut self, name: &str) -> Result<TleSet, PredictError> {
        self.load_all()?;
        self.get(name)
            .cloned()
            .ok_or_else(|| PredictError::NotFound(name.to_string()))
    }
}

fn parse_tle_file(path: &Path) -> Result<Vec<TleSet>, PredictError> {
    let content = fs::read_to_string(path)?;
    let filename = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    parse_tle_text(&content, &filename)
}

/// Parses 2- or 3-line TLE text. Sets failing the checksum are rejected.
pub fn parse_tle_text(content: &str, source: &str) -> Result<Vec<TleSet>, PredictError> {
    let mut results = Vec::new();
    for (name, line1, line2) in parse_multi_tle(content) {
        let name = name.unwrap_or_else(|| format!("NORAD {}", line1.get(2..7).unwrap_or("").trim()));
        if !checksum_ok(&line1) || !checksum_ok(&line2) {
            return Err(PredictError::BadChecksum(name));
        }
        results.push(TleSet {
            name,
            line1,
            line2,
            source: source.to_string(),
        });
    }
    if results.is_empty() && !content.trim().is_empty() {
        return Err(PredictError::InvalidTle {
            source_name: source.to_string(),
            message: "no element sets found".to_string(),
        });
    }
    Ok(results)
}

/// Parse multi-satellite TLE content
fn parse_multi_tle(content: &str) -> Vec<(Option<String>, String, String)> {
    let lines: Vec<&str> = content
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    let mut result = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if is_line(lines[i], '1') && i + 1 < lines.len() && is_line(lines[i + 1], '2') {
            // 2-line TLE (no name)
            result.push((None, lines[i].to_string(), lines[i + 1].to_string()));
            i += 2;
        } else if i + 2 < lines.len() && is_line(lines[i + 1], '1') && is_line(lines[i + 2], '2')
        {
            // 3-line TLE (with name)
            result.push((
                Some(lines[i].to_string()),
                lines[i + 1].to_string(),
                lines[i + 2].to_string(),
            ));
            i += 3;
        } else {
            i += 1;
        }
    }

    result
}

fn is_line(line: &str, number: char) -> bool {
    line.len() >= 7 && line.starts_with(number) && line.as_bytes()[1] == b' '
}
