//! Downloadable import template

use anyhow::Result;
use rust_xlsxwriter::{Format, Workbook};

use super::structure::SheetColumn;

pub const TEMPLATE_FILE_NAME: &str = "pvsd-import-template.xlsx";
pub const TEMPLATE_SHEET_NAME: &str = "实验数据模板";

const TEMPLATE_COLUMNS: [(SheetColumn, f64); 7] = [
    (SheetColumn::Sequence, 8.0),
    (SheetColumn::Current, 12.0),
    (SheetColumn::Voltage, 12.0),
    (SheetColumn::Power, 12.0),
    (SheetColumn::Timestamp, 20.0),
    (SheetColumn::DeviceAddress, 12.0),
    (SheetColumn::DeviceType, 20.0),
];

struct SampleRow {
    sequence: f64,
    current: f64,
    voltage: f64,
    power: f64,
    timestamp: &'static str,
    device_address: &'static str,
    device_type: &'static str,
}

const SAMPLE_ROWS: [SampleRow; 3] = [
    SampleRow {
        sequence: 1.0,
        current: 0.11,
        voltage: 20.355,
        power: 2.239,
        timestamp: "2025/1/15 10:00:00",
        device_address: "1",
        device_type: "光伏关断器-A型",
    },
    SampleRow {
        sequence: 2.0,
        current: 0.26,
        voltage: 20.681,
        power: 5.377,
        timestamp: "2025/1/15 10:01:00",
        device_address: "1",
        device_type: "光伏关断器-A型",
    },
    SampleRow {
        sequence: 3.0,
        current: 0.52,
        voltage: 21.054,
        power: 10.948,
        timestamp: "2025/1/15 10:02:00",
        device_address: "1",
        device_type: "光伏关断器-A型",
    },
];

/// Build the xlsx template: the seven recognised headers and three sample rows
pub fn build_template() -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(TEMPLATE_SHEET_NAME)?;

    for (col, (column, width)) in (0u16..).zip(TEMPLATE_COLUMNS) {
        worksheet.write_string_with_format(0, col, column.header(), &header_format)?;
        worksheet.set_column_width(col, width)?;
    }

    for (row, sample) in (1u32..).zip(&SAMPLE_ROWS) {
        worksheet.write_number(row, 0, sample.sequence)?;
        worksheet.write_number(row, 1, sample.current)?;
        worksheet.write_number(row, 2, sample.voltage)?;
        worksheet.write_number(row, 3, sample.power)?;
        worksheet.write_string(row, 4, sample.timestamp)?;
        worksheet.write_string(row, 5, sample.device_address)?;
        worksheet.write_string(row, 6, sample.device_type)?;
    }

    Ok(workbook.save_to_buffer()?)
}
