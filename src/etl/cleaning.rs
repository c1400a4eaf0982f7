use super::model::{
    AVERAGE_PLAYTIME_2WEEKS, AVERAGE_PLAYTIME_FOREVER, CleanedRecord, MEDIAN_PLAYTIME_2WEEKS,
    MEDIAN_PLAYTIME_FOREVER, METACRITIC_SCORE, NEGATIVE_REVIEWS, POSITIVE_REVIEWS, PRICE,
    RawRecord, USER_SCORE,
};
use crate::error::ParseError;
use chrono::NaiveDate;
use serde::Serialize;

/// Scores above this, or missing, are capped to it.
pub const SCORE_CEILING: f64 = 100.0;
/// Negative scores are raised to it.
pub const SCORE_FLOOR: f64 = 0.0;
/// Rounded prices must stay below this to fit `NUMERIC(10, 2)`.
pub const PRICE_LIMIT: f64 = 100_000_000.0;

const ISO_DATE: &str = "%Y-%m-%d";
/// e.g. `Mar 5, 2020`
const HUMAN_DATE: &str = "%b %d, %Y";

/// Row counts for one cleaning pass. `retained` plus the three drop
/// counters always equals `rows_read`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanStats {
    pub rows_read: usize,
    pub missing_labels: usize,
    pub invalid_values: usize,
    pub invalid_dates: usize,
    pub retained: usize,
}

impl CleanStats {
    pub fn dropped(&self) -> usize {
        self.missing_labels + self.invalid_values + self.invalid_dates
    }
}

#[derive(Debug, Clone)]
pub struct CleanOutcome {
    pub records: Vec<CleanedRecord>,
    pub stats: CleanStats,
}

/// Why a raw record did not make it into the cleaned sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// `genres` or `categories` absent
    MissingLabels,
    Invalid(ParseError),
}

fn invalid(field: &'static str, value: &str) -> ParseError {
    ParseError::InvalidValue {
        field,
        value: value.to_owned(),
    }
}

fn parse_number(field: &'static str, value: &str) -> Result<f64, ParseError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .ok_or_else(|| invalid(field, value))
}

/// Rounds to two decimals the way a `NUMERIC(_, 2)` column stores a bound
/// float: the value is read as 15 significant decimal digits, then rounded
/// half away from zero. So `1.005` becomes `1.01`, not the `1.0` that
/// `(x * 100.0).round()` gives.
pub fn round_to_cents(value: f64) -> f64 {
    if !value.is_finite() || value == 0.0 {
        return value;
    }

    // `d.dddddddddddddde<exp>`
    let text = format!("{:.14e}", value.abs());
    let Some((mantissa, exponent)) = text.split_once('e') else {
        return value;
    };
    let (Ok(digits), Ok(exponent)) = (
        mantissa.replace('.', "").parse::<u128>(),
        exponent.parse::<i32>(),
    ) else {
        return value;
    };

    // value = digits * 10^(exponent - 14), so cents = digits * 10^(exponent - 12)
    let shift = exponent - 12;
    let cents = if shift >= 0 {
        10_u128
            .checked_pow(shift.unsigned_abs())
            .and_then(|scale| digits.checked_mul(scale))
    } else {
        Some(
            10_u128
                .checked_pow(shift.unsigned_abs())
                .map_or(0, |divisor| (digits + divisor / 2) / divisor),
        )
    };

    match cents {
        Some(cents) => (cents as f64 / 100.0).copysign(value),
        None => value,
    }
}

/// Missing, NaN or above-ceiling scores become [`SCORE_CEILING`], negative
/// ones [`SCORE_FLOOR`]. Kept to two decimals.
pub fn clean_score(value: Option<&str>) -> Result<f64, ParseError> {
    let Some(value) = value else {
        return Ok(SCORE_CEILING);
    };
    let score = parse_number(USER_SCORE, value)?;
    if score.is_nan() || score > SCORE_CEILING {
        return Ok(SCORE_CEILING);
    }
    if score < SCORE_FLOOR {
        return Ok(SCORE_FLOOR);
    }
    Ok(round_to_cents(score))
}

/// Integer counters (playtimes, reviews, metacritic). Missing means zero;
/// fractional input is truncated toward zero. Anything outside the `INTEGER`
/// column range is invalid.
pub fn clean_count(field: &'static str, value: Option<&str>) -> Result<i64, ParseError> {
    let Some(value) = value else {
        return Ok(0);
    };
    let count = match value.trim().parse::<i64>() {
        Ok(count) => count,
        Err(_) => {
            let number = parse_number(field, value)?;
            if number.is_nan() {
                return Ok(0);
            }
            let truncated = number.trunc();
            if !(f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&truncated) {
                return Err(invalid(field, value));
            }
            truncated as i64
        }
    };
    if i32::try_from(count).is_err() {
        return Err(invalid(field, value));
    }
    Ok(count)
}

/// Missing means free. Kept to two decimals; a price that would not fit
/// `NUMERIC(10, 2)` is invalid.
pub fn clean_price(value: Option<&str>) -> Result<f64, ParseError> {
    let Some(value) = value else {
        return Ok(0.0);
    };
    let price = parse_number(PRICE, value)?;
    if !price.is_finite() {
        return Err(invalid(PRICE, value));
    }
    let price = round_to_cents(price);
    if price.abs() >= PRICE_LIMIT {
        return Err(invalid(PRICE, value));
    }
    Ok(price)
}

/// ISO first, then the `Mar 5, 2020` form. `None` when neither matches.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, ISO_DATE)
        .or_else(|_| NaiveDate::parse_from_str(value, HUMAN_DATE))
        .ok()
}

pub fn clean_record(raw: &RawRecord) -> Result<CleanedRecord, Rejection> {
    let (Some(genres), Some(categories)) = (&raw.genres, &raw.categories) else {
        return Err(Rejection::MissingLabels);
    };

    let count = |field: &'static str, value: &Option<String>| {
        clean_count(field, value.as_deref()).map_err(Rejection::Invalid)
    };

    let user_score = clean_score(raw.user_score.as_deref()).map_err(Rejection::Invalid)?;
    let price = clean_price(raw.price.as_deref()).map_err(Rejection::Invalid)?;
    let positive_reviews = count(POSITIVE_REVIEWS, &raw.positive_reviews)?;
    let negative_reviews = count(NEGATIVE_REVIEWS, &raw.negative_reviews)?;
    let metacritic_score = count(METACRITIC_SCORE, &raw.metacritic_score)?;
    let average_playtime_forever = count(AVERAGE_PLAYTIME_FOREVER, &raw.average_playtime_forever)?;
    let average_playtime_2weeks = count(AVERAGE_PLAYTIME_2WEEKS, &raw.average_playtime_2weeks)?;
    let median_playtime_forever = count(MEDIAN_PLAYTIME_FOREVER, &raw.median_playtime_forever)?;
    let median_playtime_2weeks = count(MEDIAN_PLAYTIME_2WEEKS, &raw.median_playtime_2weeks)?;

    let date_text = raw.release_date.as_deref().unwrap_or_default();
    let release_date = parse_date(date_text).ok_or_else(|| {
        Rejection::Invalid(ParseError::InvalidDate {
            value: date_text.to_owned(),
        })
    })?;

    Ok(CleanedRecord {
        line: raw.line,
        release_date,
        price,
        positive_reviews,
        negative_reviews,
        user_score,
        metacritic_score,
        average_playtime_forever,
        average_playtime_2weeks,
        median_playtime_forever,
        median_playtime_2weeks,
        genres: genres.clone(),
        categories: categories.clone(),
    })
}

/// Cleans every record, dropping (and counting) the ones that cannot be
/// repaired. The retained order is the source order, which later defines
/// the synchronized ids.
pub fn clean_records(raw: &[RawRecord]) -> CleanOutcome {
    let mut stats = CleanStats {
        rows_read: raw.len(),
        ..Default::default()
    };
    let mut records = Vec::with_capacity(raw.len());

    for record in raw {
        match clean_record(record) {
            Ok(cleaned) => records.push(cleaned),
            Err(Rejection::MissingLabels) => {
                stats.missing_labels += 1;
                tracing::debug!(line = record.line, "Dropping row without genres/categories");
            }
            Err(Rejection::Invalid(err @ ParseError::InvalidDate { .. })) => {
                stats.invalid_dates += 1;
                tracing::debug!(line = record.line, "Dropping row: {err}");
            }
            Err(Rejection::Invalid(err)) => {
                stats.invalid_values += 1;
                tracing::debug!(line = record.line, "Dropping row: {err}");
            }
        }
    }

    stats.retained = records.len();
    if stats.dropped() > 0 {
        tracing::warn!(
            missing_labels = stats.missing_labels,
            invalid_values = stats.invalid_values,
            invalid_dates = stats.invalid_dates,
            "Dropped {} of {} rows during cleaning",
            stats.dropped(),
            stats.rows_read
        );
    }
    tracing::info!(retained = stats.retained, "Cleaning complete");

    CleanOutcome { records, stats }
}
