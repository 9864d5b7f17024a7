//! Quality Policy
//!
//! The tunables and predicates that decide which addresses are worth
//! keeping, overwriting, or dialing. The constants are protocol-level:
//! changing them changes which entries survive and how selection behaves.

use crate::domain::addr::Timestamp;
use crate::domain::entry::AddrStats;

/// How old (in days) an advertised timestamp may be before the entry is
/// considered stale.
pub const HORIZON_DAYS: i64 = 30;
/// After how many failed attempts with no success ever we give up on a new
/// entry.
pub const RETRIES: i32 = 3;
/// How many successive failures are tolerated ...
pub const MAX_FAILURES: i32 = 10;
/// ... within at least this many days since the last success.
pub const MIN_FAIL_DAYS: i64 = 7;
/// How recent a successful connection must be to protect a tried entry from
/// eviction during collision resolution.
pub const REPLACEMENT_HOURS: i64 = 4;
/// Maximum number of pending tried-table collisions held for
/// test-before-evict.
pub const TRIED_COLLISION_CAP: usize = 10;
/// How long we keep trying to resolve a tried collision before evicting the
/// incumbent anyway.
pub const TEST_WINDOW_SECS: i64 = 40 * 60;
/// Maximum number of records (canonical + aliases) for one address in the
/// new table.
pub const MAX_NEW_REFS: usize = 8;

/// Whether an entry's statistics are bad enough that overwriting it loses
/// nothing.
///
/// Anything tried within the last minute is protected: we may simply not
/// have heard the outcome yet.
pub fn is_terrible(stats: &AddrStats, now: Timestamp) -> bool {
    if stats.last_try.as_secs() != 0 && stats.last_try.as_secs() >= now.as_secs() - 60 {
        return false;
    }

    // claimed timestamp from the future
    if stats.time as i64 > now.as_secs() + 10 * 60 {
        return true;
    }

    // not seen in recent history
    if stats.time == 0 || now.as_secs() - stats.time as i64 > HORIZON_DAYS * 24 * 60 * 60 {
        return true;
    }

    // tried several times and never a success
    if stats.last_success.as_secs() == 0 && stats.attempts >= RETRIES {
        return true;
    }

    // many successive failures over at least a week
    if now.since(stats.last_success) > MIN_FAIL_DAYS * 24 * 60 * 60 && stats.attempts >= MAX_FAILURES
    {
        return true;
    }

    false
}

/// Relative selection weight of an entry.
///
/// Very recent attempts are deprioritized hard; every failed attempt costs
/// a factor 0.66, capped at eight so long outages do not push an entry to
/// effectively zero.
pub fn chance(stats: &AddrStats, now: Timestamp) -> f64 {
    let mut chance = 1.0;
    let since_last_try = now.since(stats.last_try).max(0);

    if since_last_try < 60 * 10 {
        chance *= 0.01;
    }

    chance *= 0.66_f64.powi(stats.attempts.clamp(0, 8));

    chance
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_stats(now: Timestamp) -> AddrStats {
        AddrStats {
            time: now.as_secs() as u32,
            ..AddrStats::default()
        }
    }

    #[test]
    fn test_fresh_entry_is_not_terrible() {
        let now = Timestamp::new(1_000_000);
        assert!(!is_terrible(&fresh_stats(now), now));
    }

    #[test]
    fn test_unknown_time_is_terrible() {
        let now = Timestamp::new(1_000_000);
        let stats = AddrStats::default();
        assert!(is_terrible(&stats, now));
    }

    #[test]
    fn test_future_time_is_terrible() {
        let now = Timestamp::new(1_000_000);
        let mut stats = fresh_stats(now);
        stats.time = (now.as_secs() + 11 * 60) as u32;
        assert!(is_terrible(&stats, now));
    }

    #[test]
    fn test_stale_entry_is_terrible() {
        let now = Timestamp::new(100_000_000);
        let mut stats = fresh_stats(now);
        stats.time = (now.as_secs() - HORIZON_DAYS * 24 * 60 * 60 - 1) as u32;
        assert!(is_terrible(&stats, now));
    }

    #[test]
    fn test_retries_without_success_is_terrible() {
        let now = Timestamp::new(1_000_000);
        let mut stats = fresh_stats(now);
        stats.attempts = RETRIES;
        assert!(is_terrible(&stats, now));

        stats.attempts = RETRIES - 1;
        assert!(!is_terrible(&stats, now));
    }

    #[test]
    fn test_week_of_failures_is_terrible() {
        let now = Timestamp::new(100_000_000);
        let mut stats = fresh_stats(now);
        stats.last_success = now.sub_secs(MIN_FAIL_DAYS * 24 * 60 * 60 + 1);
        stats.attempts = MAX_FAILURES;
        assert!(is_terrible(&stats, now));

        stats.attempts = MAX_FAILURES - 1;
        assert!(!is_terrible(&stats, now));
    }

    #[test]
    fn test_recent_try_shields_from_terrible() {
        let now = Timestamp::new(1_000_000);
        // stale on every other axis
        let mut stats = AddrStats::default();
        stats.last_try = now.sub_secs(30);
        assert!(!is_terrible(&stats, now));

        stats.last_try = now.sub_secs(61);
        assert!(is_terrible(&stats, now));
    }

    #[test]
    fn test_chance_penalizes_recent_try() {
        let now = Timestamp::new(1_000_000);
        let mut stats = fresh_stats(now);
        assert!((chance(&stats, now) - 1.0).abs() < 1e-9);

        stats.last_try = now.sub_secs(5 * 60);
        assert!((chance(&stats, now) - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_chance_attempt_penalty_is_capped() {
        let now = Timestamp::new(1_000_000);
        let mut stats = fresh_stats(now);

        stats.attempts = 8;
        let at_cap = chance(&stats, now);
        stats.attempts = 20;
        assert!((chance(&stats, now) - at_cap).abs() < 1e-12);
        assert!(at_cap > 0.0);
    }
}
