//! Streaming parser for the monthly civil-registry CSV drops.
//!
//! Files are `;`-delimited with nine columns:
//!
//! ```text
//! nomprenom;sexe;datenaisse;lieunaisse;commnaisse;paysnaisse;datedeces;lieudeces;actedeces
//! ```
//!
//! The input is consumed one record at a time — a monthly drop can run to
//! hundreds of megabytes and is never held in memory. Rows are filtered
//! structurally (column count, required fields, parseable dates) and
//! semantically (age at death below the configured minimum); every discard
//! increments a counter and never stops the stream.

use csv_async::AsyncReaderBuilder;
use tokio::io::AsyncRead;

use crate::error::IngestError;
use crate::failure::FailureSink;

const EXPECTED_COLUMNS: usize = 9;
/// First cell of the header row, when the drop carries one.
const HEADER_SIGNATURE: &str = "nomprenom";

/// One raw registry row that survived the structural and semantic filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeathRow {
    /// Registry name form, e.g. `DUPONT*JEAN MARIE/`.
    pub full_name: String,
    pub sex: String,
    /// 8-digit `YYYYMMDD`.
    pub birth_date: String,
    pub birth_place_code: String,
    pub birth_commune: String,
    pub birth_country: String,
    /// 8-digit `YYYYMMDD`.
    pub death_date: String,
    /// Commune code of the death place — half of the natural key.
    pub death_place_code: String,
    /// Death-act number — the other half of the natural key.
    pub act_number: String,
    /// The original line, retained for failure reporting downstream.
    pub raw_line: String,
}

impl DeathRow {
    /// Human-readable name: `DUPONT*JEAN/` becomes `DUPONT JEAN`.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.full_name
            .trim_end_matches('/')
            .replace('*', " ")
            .trim()
            .to_owned()
    }
}

/// Discard counters for one parsed file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CsvParseStats {
    /// Data rows read (the header row is not counted).
    pub rows_read: u64,
    pub header_skipped: bool,
    pub wrong_column_count: u64,
    pub missing_required: u64,
    pub invalid_dates: u64,
    pub under_age: u64,
}

impl CsvParseStats {
    /// Total rows dropped by any filter.
    #[must_use]
    pub fn discarded(&self) -> u64 {
        self.wrong_column_count + self.missing_required + self.invalid_dates + self.under_age
    }
}

/// Parses one registry drop incrementally, yielding the rows that pass every
/// filter.
///
/// A leading header row (recognized by its first cell) is skipped. Rows with
/// the wrong column count, empty required fields, or unparseable dates are
/// recorded in `sink`; rows below the age threshold are counted but not
/// reported — filtering them out is the parser's job, not a data defect.
///
/// # Errors
///
/// Returns [`IngestError::Csv`] only for stream-level failures (I/O on the
/// underlying reader, malformed quoting); per-row problems never abort the
/// parse.
pub async fn parse_death_csv<R>(
    reader: R,
    source_file: &str,
    min_age_years: u32,
    sink: &mut FailureSink,
) -> Result<(Vec<DeathRow>, CsvParseStats), IngestError>
where
    R: AsyncRead + Unpin + Send,
{
    let mut rdr = AsyncReaderBuilder::new()
        .has_headers(false)
        .delimiter(b';')
        .flexible(true)
        .create_reader(reader);

    let mut stats = CsvParseStats::default();
    let mut rows: Vec<DeathRow> = Vec::new();
    let mut record = csv_async::ByteRecord::new();
    let mut first = true;

    loop {
        let more = rdr
            .read_byte_record(&mut record)
            .await
            .map_err(|e| IngestError::Csv {
                file: source_file.to_owned(),
                source: e,
            })?;
        if !more {
            break;
        }

        let fields: Vec<String> = record
            .iter()
            .map(|f| String::from_utf8_lossy(f).trim().to_owned())
            .collect();

        if first {
            first = false;
            if fields.first().map(String::as_str) == Some(HEADER_SIGNATURE) {
                stats.header_skipped = true;
                continue;
            }
        }

        stats.rows_read += 1;
        let raw_line = fields.join(";");

        if fields.len() != EXPECTED_COLUMNS {
            stats.wrong_column_count += 1;
            sink.record(
                raw_line,
                format!("expected {EXPECTED_COLUMNS} columns, got {}", fields.len()),
            );
            continue;
        }

        let row = DeathRow {
            full_name: fields[0].clone(),
            sex: fields[1].clone(),
            birth_date: fields[2].clone(),
            birth_place_code: fields[3].clone(),
            birth_commune: fields[4].clone(),
            birth_country: fields[5].clone(),
            death_date: fields[6].clone(),
            death_place_code: fields[7].clone(),
            act_number: fields[8].clone(),
            raw_line,
        };

        if row.full_name.is_empty()
            || row.birth_date.is_empty()
            || row.death_date.is_empty()
            || row.death_place_code.is_empty()
            || row.act_number.is_empty()
        {
            stats.missing_required += 1;
            sink.record(row.raw_line, "missing required field");
            continue;
        }

        let Some(age) = age_at(&row.birth_date, &row.death_date) else {
            stats.invalid_dates += 1;
            sink.record(row.raw_line, "unparseable birth or death date");
            continue;
        };

        if age < min_age_years {
            stats.under_age += 1;
            continue;
        }

        rows.push(row);
    }

    Ok((rows, stats))
}

/// Whole-year age at `event` for someone born on `birth`, both 8-digit
/// `YYYYMMDD` strings.
///
/// Standard anniversary rule: the year difference is decremented by one when
/// the event's month/day precedes the birth month/day. Returns `None` for
/// malformed dates (wrong length, non-numeric, zero month or day — the
/// registry uses `00` for unknown components) and for events before birth.
#[must_use]
pub fn age_at(birth: &str, event: &str) -> Option<u32> {
    let (by, bm, bd) = split_ymd(birth)?;
    let (ey, em, ed) = split_ymd(event)?;

    let mut age = ey - by;
    if (em, ed) < (bm, bd) {
        age -= 1;
    }
    u32::try_from(age).ok()
}

fn split_ymd(date: &str) -> Option<(i32, u32, u32)> {
    if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = date[0..4].parse().ok()?;
    let month: u32 = date[4..6].parse().ok()?;
    let day: u32 = date[6..8].parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    Some((year, month, day))
}
