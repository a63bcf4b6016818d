//! Header detection for measurement spreadsheets
//!
//! The first non-blank row holds the column headers. Columns are matched on
//! their exact header text; unknown columns are ignored.

use anyhow::{Result, anyhow};
use calamine::Data;
use std::collections::HashMap;

pub const EMPTY_OR_MALFORMED: &str = "file is empty or malformed";

/// Columns the importer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SheetColumn {
    Sequence,
    Current,
    Voltage,
    Power,
    Timestamp,
    DeviceAddress,
    DeviceType,
    Resistance,
    Temperature,
}

impl SheetColumn {
    pub const ALL: [SheetColumn; 9] = [
        SheetColumn::Sequence,
        SheetColumn::Current,
        SheetColumn::Voltage,
        SheetColumn::Power,
        SheetColumn::Timestamp,
        SheetColumn::DeviceAddress,
        SheetColumn::DeviceType,
        SheetColumn::Resistance,
        SheetColumn::Temperature,
    ];

    pub const fn header(self) -> &'static str {
        match self {
            SheetColumn::Sequence => "序号",
            SheetColumn::Current => "电流 (A)",
            SheetColumn::Voltage => "电压 (V)",
            SheetColumn::Power => "功率 (W)",
            SheetColumn::Timestamp => "时间戳",
            SheetColumn::DeviceAddress => "设备地址",
            SheetColumn::DeviceType => "设备类型",
            SheetColumn::Resistance => "阻值 (Ω)",
            SheetColumn::Temperature => "温度 (℃)",
        }
    }

    pub fn from_header(header: &str) -> Option<Self> {
        let header = header.trim();
        Self::ALL.into_iter().find(|column| column.header() == header)
    }
}

/// Column layout of one sheet
#[derive(Debug, Clone)]
pub struct SheetStructure {
    pub columns: HashMap<SheetColumn, usize>,
    pub header_row: usize,
}

impl SheetStructure {
    /// The cell under `column`, `None` when the column or cell is absent
    pub fn cell<'a>(&self, row: &'a [Data], column: SheetColumn) -> Option<&'a Data> {
        self.columns.get(&column).and_then(|&idx| row.get(idx))
    }
}

pub fn is_blank_cell(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

pub fn is_blank_row(row: &[Data]) -> bool {
    row.iter().all(is_blank_cell)
}

/// Locate the header row and map recognised headers to column indices
pub fn parse_sheet_structure(rows: &[Vec<Data>]) -> Result<SheetStructure> {
    let header_row = rows
        .iter()
        .position(|row| !is_blank_row(row))
        .ok_or_else(|| anyhow!(EMPTY_OR_MALFORMED))?;

    let mut columns = HashMap::new();
    for (col_idx, cell) in rows[header_row].iter().enumerate() {
        if let Data::String(header) = cell {
            if let Some(column) = SheetColumn::from_header(header) {
                // First occurrence wins when a header repeats
                columns.entry(column).or_insert(col_idx);
            }
        }
    }

    if columns.is_empty() {
        return Err(anyhow!(
            "no recognised column headers (expected {}, {}, {}, {})",
            SheetColumn::Sequence.header(),
            SheetColumn::Current.header(),
            SheetColumn::Voltage.header(),
            SheetColumn::Timestamp.header(),
        ));
    }

    Ok(SheetStructure {
        columns,
        header_row,
    })
}

/// Non-blank rows below the header, in file order
pub fn data_rows<'a>(rows: &'a [Vec<Data>], structure: &SheetStructure) -> Vec<&'a [Data]> {
    rows.iter()
        .skip(structure.header_row + 1)
        .filter(|row| !is_blank_row(row))
        .map(Vec::as_slice)
        .collect()
}
