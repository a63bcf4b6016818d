//! Cell extraction and timestamp helpers used by the row normalizer

use anyhow::{Result, anyhow};
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use std::io::Cursor;

pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["xlsx", "xlsm", "xls", "ods"];

/// Days between the spreadsheet date-serial epoch and the Unix epoch
const SERIAL_EPOCH_OFFSET_DAYS: f64 = 25569.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

const DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
    "%Y.%m.%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%m/%d/%Y"];

/// Lower-cased extension of an uploaded file name
pub fn file_extension(file_name: &str) -> Option<String> {
    let (stem, extension) = file_name.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some(extension.to_ascii_lowercase())
}

pub fn is_supported_file(file_name: &str) -> bool {
    file_extension(file_name).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Load the first worksheet of an xlsx/xlsm/xls/ods workbook
pub fn load_sheet(file_data: Vec<u8>) -> Result<Vec<Vec<Data>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(file_data))?;
    let sheet_name = workbook
        .sheet_names()
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No worksheets"))?;
    let worksheet = workbook.worksheet_range(&sheet_name)?;
    Ok(worksheet.rows().map(<[Data]>::to_vec).collect())
}

/// Numeric cell value. Numeric text is accepted; non-finite values are not.
pub fn extract_number(cell: &Data) -> Option<f64> {
    let value = match cell {
        Data::Float(f) => *f,
        #[allow(clippy::cast_precision_loss)]
        Data::Int(i) => *i as f64,
        Data::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

/// Integer cell value, rounded, `None` outside the i32 range
pub fn extract_integer(cell: &Data) -> Option<i32> {
    if let Data::Int(i) = cell {
        return i32::try_from(*i).ok();
    }
    let rounded = extract_number(cell)?.round();
    if rounded >= f64::from(i32::MIN) && rounded <= f64::from(i32::MAX) {
        // Bounds and finiteness checked above
        #[allow(clippy::cast_possible_truncation)]
        Some(rounded as i32)
    } else {
        None
    }
}

/// Convert a spreadsheet date serial: `(serial - 25569) * 86400` seconds since the Unix epoch
pub fn excel_serial_to_datetime(serial: f64) -> Option<DateTime<Utc>> {
    let millis = ((serial - SERIAL_EPOCH_OFFSET_DAYS) * MILLIS_PER_DAY).round();
    if !millis.is_finite() {
        return None;
    }
    // Out-of-range values saturate and are then rejected by chrono
    #[allow(clippy::cast_possible_truncation)]
    DateTime::from_timestamp_millis(millis as i64)
}

/// Wall-clock time read in `zone`, as UTC
fn in_zone(naive: NaiveDateTime, zone: FixedOffset) -> Option<DateTime<Utc>> {
    naive
        .and_local_timezone(zone)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a timestamp written as text. Values without an offset are read in `zone`.
pub fn parse_text_timestamp(value: &str, zone: FixedOffset) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return in_zone(dt, zone);
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0).and_then(|dt| in_zone(dt, zone));
        }
    }

    // Date serial stored as text
    value
        .parse::<f64>()
        .ok()
        .and_then(excel_serial_to_datetime)
}

/// Timestamp of a cell: numeric cells are date serials, text is parsed in `zone`
pub fn parse_timestamp_cell(cell: &Data, zone: FixedOffset) -> Option<DateTime<Utc>> {
    match cell {
        Data::Float(serial) => excel_serial_to_datetime(*serial),
        #[allow(clippy::cast_precision_loss)]
        Data::Int(serial) => excel_serial_to_datetime(*serial as f64),
        Data::DateTime(excel_dt) => excel_serial_to_datetime(excel_dt.as_f64()),
        Data::DateTimeIso(s) | Data::String(s) => parse_text_timestamp(s, zone),
        _ => None,
    }
}
