//! Per-process budget checks for the drain loop.
//!
//! The loop asks [`evaluate`] once per queue item. A `Stop` answer is not an
//! error: the engine persists its counters and hands off to a fresh process.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::time::Duration;

/// Ceiling used when the configured memory limit is unlimited.
pub const UNLIMITED_MEMORY_BYTES: u64 = 32_000 * 1024 * 1024;

static MEMORY_LIMIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)\s*(-?\d+)\s*([KMG]?)B?\s*$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetLimits {
    pub max_elapsed: Duration,
    pub max_depth: u32,
    pub memory_ceiling_bytes: u64,
    /// Fraction of the ceiling at which the loop stops.
    pub memory_headroom: f64,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            max_elapsed: Duration::from_secs(20),
            max_depth: 100,
            memory_ceiling_bytes: 128 * 1024 * 1024,
            memory_headroom: 0.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Elapsed,
    Depth,
    Memory,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Elapsed => "elapsed time",
            StopReason::Depth => "iteration depth",
            StopReason::Memory => "memory usage",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetDecision {
    Continue,
    Stop(StopReason),
}

/// Decide whether the current process may take on another item.
pub fn evaluate(
    elapsed: Duration,
    depth: u32,
    memory_bytes: u64,
    limits: &BudgetLimits,
) -> BudgetDecision {
    if elapsed > limits.max_elapsed {
        return BudgetDecision::Stop(StopReason::Elapsed);
    }
    if depth > limits.max_depth {
        return BudgetDecision::Stop(StopReason::Depth);
    }
    let threshold = limits.memory_ceiling_bytes as f64 * limits.memory_headroom;
    if memory_bytes as f64 >= threshold {
        return BudgetDecision::Stop(StopReason::Memory);
    }
    BudgetDecision::Continue
}

/// Parse a memory limit such as `128M`, `2G` or `512000K` into bytes. A bare
/// number is taken as megabytes. `-1`, `0` and empty mean unlimited and map to
/// [`UNLIMITED_MEMORY_BYTES`].
pub fn parse_memory_limit(raw: &str) -> Option<u64> {
    if raw.trim().is_empty() {
        return Some(UNLIMITED_MEMORY_BYTES);
    }
    let caps = MEMORY_LIMIT_RE.captures(raw)?;
    let amount: i64 = caps[1].parse().ok()?;
    if amount <= 0 {
        return Some(UNLIMITED_MEMORY_BYTES);
    }
    let unit = match caps[2].to_ascii_uppercase().as_str() {
        "K" => 1024,
        "G" => 1024 * 1024 * 1024,
        _ => 1024 * 1024,
    };
    (amount as u64).checked_mul(unit)
}

/// Resident memory of the current process in bytes, taken from the `VmRSS`
/// line of `/proc/self/status`. Returns 0 where the file is unavailable so
/// the memory check never trips on platforms without procfs.
pub fn current_memory_usage() -> u64 {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| parse_vm_rss(&status))
        .unwrap_or(0)
}

/// `VmRSS` is reported in kB regardless of the kernel page size.
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line
        .trim_start_matches("VmRSS:")
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;
    kb.checked_mul(1024)
}
