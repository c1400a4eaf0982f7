use super::raw;
use crate::error::ParseError;
use crate::etl::cleaning::*;
use crate::etl::model::{AVERAGE_PLAYTIME_FOREVER, POSITIVE_REVIEWS, RawRecord};
use chrono::NaiveDate;

#[test]
fn test_score_is_capped_at_ceiling() {
    assert_eq!(clean_score(Some("150")), Ok(SCORE_CEILING));
    assert_eq!(clean_score(Some("100.5")), Ok(100.0));
    assert_eq!(clean_score(Some("87.5")), Ok(87.5));
    assert_eq!(clean_score(Some("0")), Ok(0.0));
}

#[test]
fn test_missing_or_nan_score_becomes_ceiling() {
    assert_eq!(clean_score(None), Ok(SCORE_CEILING));
    assert_eq!(clean_score(Some("NaN")), Ok(SCORE_CEILING));
}

#[test]
fn test_unparseable_score_is_invalid() {
    assert!(matches!(
        clean_score(Some("great")),
        Err(ParseError::InvalidValue { field: "user_score", .. })
    ));
}

#[test]
fn test_missing_count_is_zero() {
    assert_eq!(clean_count(AVERAGE_PLAYTIME_FOREVER, None), Ok(0));
    assert_eq!(clean_count(AVERAGE_PLAYTIME_FOREVER, Some("42")), Ok(42));
}

#[test]
fn test_fractional_count_is_truncated() {
    assert_eq!(clean_count(AVERAGE_PLAYTIME_FOREVER, Some("12.9")), Ok(12));
    assert_eq!(clean_count(AVERAGE_PLAYTIME_FOREVER, Some("-3.7")), Ok(-3));
    assert!(clean_count(AVERAGE_PLAYTIME_FOREVER, Some("1e300")).is_err());
    assert!(clean_count(AVERAGE_PLAYTIME_FOREVER, Some("lots")).is_err());
}

#[test]
fn test_negative_score_is_raised_to_floor() {
    assert_eq!(clean_score(Some("-5")), Ok(SCORE_FLOOR));
    assert_eq!(clean_score(Some("-5000")), Ok(SCORE_FLOOR));
    assert_eq!(clean_score(Some("-inf")), Ok(SCORE_FLOOR));
    assert_eq!(clean_score(Some("inf")), Ok(SCORE_CEILING));
}

#[test]
fn test_score_is_kept_to_two_decimals() {
    assert_eq!(clean_score(Some("87.555")), Ok(87.56));
    assert_eq!(clean_score(Some("99.999")), Ok(100.0));
}

#[test]
fn test_count_must_fit_integer_column() {
    assert_eq!(
        clean_count(POSITIVE_REVIEWS, Some("2147483647")),
        Ok(2_147_483_647)
    );
    assert_eq!(
        clean_count(POSITIVE_REVIEWS, Some("-2147483648")),
        Ok(-2_147_483_648)
    );
    assert!(matches!(
        clean_count(POSITIVE_REVIEWS, Some("3000000000")),
        Err(ParseError::InvalidValue { field: "positive_reviews", .. })
    ));
    assert!(clean_count(POSITIVE_REVIEWS, Some("2147483648.0")).is_err());
    assert!(clean_count(POSITIVE_REVIEWS, Some("-2147483649")).is_err());
    assert_eq!(clean_count(POSITIVE_REVIEWS, Some("2147483647.9")), Ok(2_147_483_647));
}

#[test]
fn test_price_must_fit_numeric_column() {
    assert_eq!(clean_price(Some("99999999.99")), Ok(99_999_999.99));
    assert!(matches!(
        clean_price(Some("100000000")),
        Err(ParseError::InvalidValue { field: "price", .. })
    ));
    assert!(clean_price(Some("99999999.995")).is_err(), "rounds up to the limit");
    assert!(clean_price(Some("-100000000")).is_err());
    assert!(clean_price(Some("inf")).is_err());
}

#[test]
fn test_price_rounds_half_cents_away_from_zero() {
    assert_eq!(clean_price(Some("1.005")), Ok(1.01));
    assert_eq!(clean_price(Some("19.994")), Ok(19.99));
    assert_eq!(clean_price(Some("-1.005")), Ok(-1.01));
}

#[test]
fn test_round_to_cents_reads_fifteen_digits() {
    assert_eq!(round_to_cents(1.005), 1.01);
    assert_eq!(round_to_cents(87.555), 87.56);
    assert_eq!(round_to_cents(2.675), 2.68);
    assert_eq!(round_to_cents(0.004), 0.0);
    assert_eq!(round_to_cents(0.005), 0.01);
    assert_eq!(round_to_cents(19.99), 19.99);
    assert_eq!(round_to_cents(0.0), 0.0);
}

#[test]
fn test_out_of_range_row_is_dropped_not_loaded() {
    let rows = vec![
        raw(2),
        RawRecord {
            positive_reviews: Some("3000000000".to_owned()),
            ..raw(3)
        },
        RawRecord {
            price: Some("250000000".to_owned()),
            ..raw(4)
        },
    ];

    let outcome = clean_records(&rows);

    assert_eq!(outcome.stats.retained, 1);
    assert_eq!(outcome.stats.invalid_values, 2);
    assert_eq!(outcome.records[0].line, 2);
}

#[test]
fn test_parse_date_formats() {
    assert_eq!(parse_date("2020-01-15"), NaiveDate::from_ymd_opt(2020, 1, 15));
    assert_eq!(parse_date("Mar 5, 2020"), NaiveDate::from_ymd_opt(2020, 3, 5));
    assert_eq!(parse_date("Oct 21, 2008"), NaiveDate::from_ymd_opt(2008, 10, 21));
    assert_eq!(parse_date("not-a-date"), None);
    assert_eq!(parse_date(""), None);
}

#[test]
fn test_clean_record_keeps_valid_values() -> anyhow::Result<()> {
    let cleaned = clean_record(&raw(2)).map_err(|r| anyhow::anyhow!("{r:?}"))?;
    assert_eq!(cleaned.release_date, NaiveDate::from_ymd_opt(2020, 1, 15).unwrap());
    assert_eq!(cleaned.price, 19.99);
    assert_eq!(cleaned.user_score, 87.5);
    assert_eq!(cleaned.genres, "Action, Indie");
    Ok(())
}

#[test]
fn test_clean_record_repairs_missing_metrics() -> anyhow::Result<()> {
    let record = RawRecord {
        user_score: Some("150".to_owned()),
        median_playtime_2weeks: None,
        price: None,
        ..raw(3)
    };
    let cleaned = clean_record(&record).map_err(|r| anyhow::anyhow!("{r:?}"))?;
    assert_eq!(cleaned.user_score, 100.0);
    assert_eq!(cleaned.median_playtime_2weeks, 0);
    assert_eq!(cleaned.price, 0.0);
    Ok(())
}

#[test]
fn test_clean_records_drops_and_counts() {
    let rows = vec![
        raw(2),
        RawRecord {
            release_date: Some("not-a-date".to_owned()),
            ..raw(3)
        },
        RawRecord {
            release_date: None,
            ..raw(4)
        },
        RawRecord {
            categories: None,
            ..raw(5)
        },
        RawRecord {
            positive_reviews: Some("many".to_owned()),
            ..raw(6)
        },
        RawRecord {
            release_date: Some("Mar 5, 2020".to_owned()),
            ..raw(7)
        },
    ];

    let outcome = clean_records(&rows);

    assert_eq!(outcome.stats.rows_read, 6);
    assert_eq!(outcome.stats.invalid_dates, 2);
    assert_eq!(outcome.stats.missing_labels, 1);
    assert_eq!(outcome.stats.invalid_values, 1);
    assert_eq!(outcome.stats.retained, 2);
    assert_eq!(outcome.stats.dropped() + outcome.stats.retained, 6);

    let lines: Vec<usize> = outcome.records.iter().map(|r| r.line).collect();
    assert_eq!(lines, vec![2, 7], "source order must be preserved");
    assert_eq!(
        outcome.records[1].release_date,
        NaiveDate::from_ymd_opt(2020, 3, 5).unwrap()
    );
}
