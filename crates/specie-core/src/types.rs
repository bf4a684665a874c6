//! Shared identifiers, the protocol clock, and protocol constants.

/// Wallet identity — first 16 hex chars of SHA-256 of the public key encoding.
pub type WalletId = String;

/// Coin identity — UUID v4, hyphenated form.
pub type CoinId = String;

/// Unix timestamp in milliseconds.
pub type Timestamp = i64;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Render an epoch-millis timestamp as RFC 3339 UTC
/// (`2024-01-15T09:30:00.000Z`). Used in double-spend verdict text.
pub fn iso_utc(ms: Timestamp) -> String {
    let secs = ms.div_euclid(1000);
    let millis = ms.rem_euclid(1000);
    let days = secs.div_euclid(86_400);
    let sod = secs.rem_euclid(86_400);
    let (year, month, day) = civil_from_days(days);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        year,
        month,
        day,
        sod / 3600,
        (sod % 3600) / 60,
        sod % 60,
        millis
    )
}

// Gregorian date from days since the epoch (Hinnant's civil-from-days).
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

/// Protocol constants.
pub mod constants {
    // Roster and quorum
    pub const DEFAULT_NUM_AGENTS: usize = 5;
    pub const DEFAULT_REQUIRED_WITNESSES: usize = 3;
    pub const DEFAULT_NETWORK_ID: &str = "main";

    // Witness lottery: share of the committee drawn by reputation weight,
    // the remainder drawn uniformly.
    pub const LOTTERY_REPUTATION_SHARE: f64 = 0.7;

    // Liveness and retry
    pub const PEER_TIMEOUT_MS: i64 = 30_000;
    pub const PEER_SWEEP_INTERVAL_MS: u64 = 60_000;
    pub const RETRY_INTERVAL_MS: u64 = 15_000;
    pub const STATS_INTERVAL_MS: u64 = 300_000;
    pub const MAX_RETRIES: u32 = 3;

    // Per-witness bounded memory
    pub const SEEN_COINS_CAPACITY: usize = 10_000_000;
    pub const SEEN_COINS_HASHES: usize = 15;
    pub const RECENCY_CACHE_CAPACITY: usize = 100_000;
    pub const MAX_FAILURES_BEFORE_BAN: u32 = 5;

    // Reputation
    pub const REPUTATION_FLOOR: f64 = 0.0;
    pub const REPUTATION_CAP: f64 = 100.0;
    pub const INITIAL_REPUTATION: f64 = 100.0;
    pub const REPUTATION_HISTORY_CAP: usize = 100;

    // Coin seeding at network initialization
    pub const SEED_VALUE_MIN: u64 = 1;
    pub const SEED_VALUE_MAX: u64 = 10;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_utc_epoch() {
        assert_eq!(iso_utc(0), "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn iso_utc_known_instant() {
        // 2023-11-14T22:13:20.000Z
        assert_eq!(iso_utc(1_700_000_000_000), "2023-11-14T22:13:20.000Z");
    }

    #[test]
    fn iso_utc_with_millis() {
        assert_eq!(iso_utc(1_700_000_000_123), "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn iso_utc_leap_day() {
        // 2024-02-29T00:00:00.000Z
        assert_eq!(iso_utc(1_709_164_800_000), "2024-02-29T00:00:00.000Z");
    }

    #[test]
    fn now_ms_is_positive() {
        assert!(now_ms() > 1_600_000_000_000);
    }
}
