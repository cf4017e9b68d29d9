use anyhow::Context;
use chrono::{Datelike, NaiveDate};

// Session-scoped advisory lock guarding concurrent runs for the same symbol and as-of date.
const LOCK_NAMESPACE: i64 = 0x4957_4D53_4947; // "IWMSIG"

/// FNV-1a over the upper-cased symbol, folded with the day number.
pub fn lock_key(symbol: &str, as_of_date: NaiveDate) -> i64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in symbol.trim().to_ascii_uppercase().bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    let symbol_bits = (hash >> 32) as i64;
    LOCK_NAMESPACE ^ (symbol_bits << 20) ^ (as_of_date.num_days_from_ce() as i64)
}

pub async fn try_acquire_run_lock(
    pool: &sqlx::PgPool,
    symbol: &str,
    as_of_date: NaiveDate,
) -> anyhow::Result<bool> {
    let key = lock_key(symbol, as_of_date);
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;
    Ok(acquired.0)
}

pub async fn release_run_lock(
    pool: &sqlx::PgPool,
    symbol: &str,
    as_of_date: NaiveDate,
) -> anyhow::Result<()> {
    let key = lock_key(symbol, as_of_date);
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .persistent(false)
        .bind(key)
        .execute(pool)
        .await
        .with_context(|| format!("failed to release advisory lock (key={key})"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_depends_on_symbol_and_date() {
        let d1 = NaiveDate::from_ymd_opt(2026, 3, 6).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(lock_key("IWM", d1), lock_key(" iwm ", d1));
        assert_ne!(lock_key("IWM", d1), lock_key("IWM", d2));
        assert_ne!(lock_key("IWM", d1), lock_key("SPY", d1));
    }
}
