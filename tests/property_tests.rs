//! Property tests for the cleaning and feature stages.
//!
//! 1. Cleaned output is positive and date-ordered within each ticker
//! 2. Cleaning already-cleaned data changes nothing
//! 3. Tickers never influence each other's rolling features

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use stock_pipeline::data::{clean, engineer_features, FeaturedRecord, RawRow};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_close() -> impl Strategy<Value = f64> {
    (1.0..500.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

fn arb_volume() -> impl Strategy<Value = f64> {
    prop_oneof![
        8 => (1.0..1_000_000.0_f64).prop_map(f64::round),
        1 => Just(0.0),
        1 => Just(-5.0),
    ]
}

fn arb_raw_row() -> impl Strategy<Value = RawRow> {
    (0..3usize, 0..40i64, arb_close(), arb_volume()).prop_map(|(t, day, close, volume)| {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(day);
        RawRow {
            ticker: Some(["AAA", "BBB", "CCC"][t].to_string()),
            date: Some(date.to_string()),
            open: Some(close.to_string()),
            close: Some(close.to_string()),
            high: Some((close + 1.0).to_string()),
            low: Some(close.to_string()),
            volume: Some(volume.to_string()),
        }
    })
}

fn raw_series(ticker: &str, closes: &[f64]) -> Vec<RawRow> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| RawRow {
            ticker: Some(ticker.to_string()),
            date: Some((start + Duration::days(i as i64)).to_string()),
            open: Some(close.to_string()),
            close: Some(close.to_string()),
            high: Some(close.to_string()),
            low: Some(close.to_string()),
            volume: Some("1000".to_string()),
        })
        .collect()
}

fn arb_two_tickers() -> impl Strategy<Value = (Vec<f64>, Vec<f64>, Vec<RawRow>)> {
    (
        prop::collection::vec(arb_close(), 0..30),
        prop::collection::vec(arb_close(), 0..30),
    )
        .prop_flat_map(|(a, b)| {
            let mut rows = raw_series("AAA", &a);
            rows.extend(raw_series("BBB", &b));
            (Just(a), Just(b), Just(rows).prop_shuffle())
        })
}

fn featured_for(ticker: &str, rows: &[RawRow]) -> Vec<FeaturedRecord> {
    let cleaned = clean(rows).unwrap();
    engineer_features(&cleaned)
        .into_iter()
        .filter(|f| f.record.ticker == ticker)
        .collect()
}

// ── Cleaning ─────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn cleaned_rows_are_positive_and_ordered(rows in prop::collection::vec(arb_raw_row(), 0..80)) {
        let cleaned = clean(&rows).unwrap();

        for record in &cleaned {
            prop_assert!(record.is_valid());
        }
        for pair in cleaned.windows(2) {
            prop_assert!(
                (pair[0].ticker.as_str(), pair[0].date) <= (pair[1].ticker.as_str(), pair[1].date)
            );
        }

        let expected = rows
            .iter()
            .filter(|r| r.volume.as_deref().and_then(|v| v.parse::<f64>().ok()).unwrap_or(0.0) > 0.0)
            .count();
        prop_assert_eq!(cleaned.len(), expected);
    }

    #[test]
    fn cleaning_is_idempotent(rows in prop::collection::vec(arb_raw_row(), 0..80)) {
        let once = clean(&rows).unwrap();
        let again: Vec<RawRow> = once.iter().map(RawRow::from).collect();
        let twice = clean(&again).unwrap();
        prop_assert_eq!(once, twice);
    }
}

// ── Feature stage ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn tickers_are_independent((a, b, shuffled) in arb_two_tickers()) {
        prop_assert_eq!(featured_for("AAA", &shuffled), featured_for("AAA", &raw_series("AAA", &a)));
        prop_assert_eq!(featured_for("BBB", &shuffled), featured_for("BBB", &raw_series("BBB", &b)));
    }

    #[test]
    fn featured_row_count_follows_history(closes in prop::collection::vec(arb_close(), 0..40)) {
        let featured = featured_for("AAA", &raw_series("AAA", &closes));
        prop_assert_eq!(featured.len(), closes.len().saturating_sub(10));
    }
}
