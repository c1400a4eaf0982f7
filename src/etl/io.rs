use super::model::{
    AVERAGE_PLAYTIME_2WEEKS, AVERAGE_PLAYTIME_FOREVER, CATEGORIES, GENRES, MEDIAN_PLAYTIME_2WEEKS,
    MEDIAN_PLAYTIME_FOREVER, METACRITIC_SCORE, NEGATIVE_REVIEWS, POSITIVE_REVIEWS, PRICE,
    REQUIRED_COLUMNS, RELEASE_DATE, RawRecord, USER_SCORE,
};
use crate::config::{InputSettings, TextEncoding};
use crate::error::{Result, ResultExt as _, WarehouseError};
use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;

/// Reads the extract at `path` into raw records, in file order.
pub fn load_records(path: &Path, settings: &InputSettings) -> Result<Vec<RawRecord>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read extract {}", path.display()))?;
    let text = decode(bytes, settings.encoding)?;
    let df = read_frame(text.into_bytes(), settings.delimiter_byte()?)
        .with_context(|| format!("Failed to parse extract {}", path.display()))?;

    tracing::info!(
        rows = df.height(),
        columns = df.width(),
        "Read extract {}",
        path.display()
    );
    records_from_frame(&df)
}

/// Transcodes the raw bytes to UTF-8. Latin-1 maps each byte to the code
/// point of the same value, so it cannot fail.
pub fn decode(bytes: Vec<u8>, encoding: TextEncoding) -> Result<String> {
    match encoding {
        TextEncoding::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
        TextEncoding::Utf8 => String::from_utf8(bytes)
            .map_err(|e| WarehouseError::Input(format!("Extract is not valid UTF-8: {e}"))),
    }
}

/// Parses delimited text with every column kept as a string; typing is the
/// cleaner's job.
pub fn read_frame(bytes: Vec<u8>, delimiter: u8) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .map_parse_options(|options| options.with_separator(delimiter))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;
    Ok(df)
}

pub fn records_from_frame(df: &DataFrame) -> Result<Vec<RawRecord>> {
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|name| df.get_column_index(name).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(WarehouseError::Input(format!(
            "Extract is missing required column(s): {}",
            missing.join(", ")
        )));
    }

    let release_date = text_column(df, RELEASE_DATE)?;
    let price = text_column(df, PRICE)?;
    let positive_reviews = text_column(df, POSITIVE_REVIEWS)?;
    let negative_reviews = text_column(df, NEGATIVE_REVIEWS)?;
    let user_score = text_column(df, USER_SCORE)?;
    let metacritic_score = text_column(df, METACRITIC_SCORE)?;
    let average_playtime_forever = text_column(df, AVERAGE_PLAYTIME_FOREVER)?;
    let average_playtime_2weeks = text_column(df, AVERAGE_PLAYTIME_2WEEKS)?;
    let median_playtime_forever = text_column(df, MEDIAN_PLAYTIME_FOREVER)?;
    let median_playtime_2weeks = text_column(df, MEDIAN_PLAYTIME_2WEEKS)?;
    let genres = text_column(df, GENRES)?;
    let categories = text_column(df, CATEGORIES)?;

    let cell = |ca: &StringChunked, row: usize| -> Option<String> {
        ca.get(row)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
    };

    let records = (0..df.height())
        .map(|row| RawRecord {
            line: row + 2,
            release_date: cell(release_date, row),
            price: cell(price, row),
            positive_reviews: cell(positive_reviews, row),
            negative_reviews: cell(negative_reviews, row),
            user_score: cell(user_score, row),
            metacritic_score: cell(metacritic_score, row),
            average_playtime_forever: cell(average_playtime_forever, row),
            average_playtime_2weeks: cell(average_playtime_2weeks, row),
            median_playtime_forever: cell(median_playtime_forever, row),
            median_playtime_2weeks: cell(median_playtime_2weeks, row),
            genres: cell(genres, row),
            categories: cell(categories, row),
        })
        .collect();

    Ok(records)
}

fn text_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a StringChunked> {
    let column = df.column(name)?;
    Ok(column.as_materialized_series().str()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "name;release_date;price;positive_reviews;negative_reviews;user_score;metacritic_score;average_playtime_forever;average_playtime_2weeks;median_playtime_forever;median_playtime_2weeks;genres;categories";

    #[test]
    fn test_latin1_decodes_every_byte() -> anyhow::Result<()> {
        let text = decode(vec![b'C', 0xE9, b'l', b'i', b'n', b'e'], TextEncoding::Latin1)?;
        assert_eq!(text, "Céline");
        Ok(())
    }

    #[test]
    fn test_utf8_rejects_invalid_bytes() {
        assert!(decode(vec![0xFF, 0xFE], TextEncoding::Utf8).is_err());
    }

    #[test]
    fn test_records_keep_text_and_blank_becomes_none() -> anyhow::Result<()> {
        let csv = format!(
            "{HEADER}\nPortal;2007-10-10;9.99;1000;20;95;90;300;;120;0;Action, Puzzle;Single-player\n"
        );
        let df = read_frame(csv.into_bytes(), b';')?;
        let records = records_from_frame(&df)?;

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.line, 2);
        assert_eq!(record.release_date.as_deref(), Some("2007-10-10"));
        assert_eq!(record.price.as_deref(), Some("9.99"));
        assert_eq!(record.average_playtime_2weeks, None);
        assert_eq!(record.genres.as_deref(), Some("Action, Puzzle"));
        Ok(())
    }

    #[test]
    fn test_missing_column_is_input_error() -> anyhow::Result<()> {
        let df = read_frame(b"release_date;price\n2020-01-01;1.0\n".to_vec(), b';')?;
        let err = records_from_frame(&df).unwrap_err();
        assert!(matches!(err, WarehouseError::Input(_)));
        assert!(err.to_string().contains("genres"));
        Ok(())
    }
}
