//! Plain-text tables for terminal output.

use std::fmt::Write as _;

use crate::{
    data::Row,
    schema::{StorageType, TableSchema},
};

pub const NULL_DISPLAY: &str = "NULL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

impl Align {
    pub fn for_storage(storage: StorageType) -> Self {
        match storage {
            StorageType::Integer | StorageType::Double => Align::Right,
            _ => Align::Left,
        }
    }
}

/// Renders `rows` under `headers`. Columns without an entry in `aligns` are
/// left aligned.
pub fn render_table(headers: &[String], rows: &[Vec<String>], aligns: &[Align]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| cell_width(h).max(3)).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell_width(cell));
        }
    }

    let mut output = String::new();
    push_line(&mut output, headers, &widths, aligns);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_line(&mut output, &rule, &widths, &[]);
    for row in rows {
        push_line(&mut output, row, &widths, aligns);
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>], aligns: &[Align]) {
    print!("{}", render_table(headers, rows, aligns));
}

/// Display text for a persisted row, honouring `DATE` columns.
pub fn row_cells(schema: &TableSchema, row: &Row) -> Vec<String> {
    schema
        .columns
        .iter()
        .zip(row.iter())
        .map(|(column, cell)| match cell {
            Some(value) => column.storage_type.render(value),
            None => NULL_DISPLAY.to_string(),
        })
        .collect()
}

pub fn schema_aligns(schema: &TableSchema) -> Vec<Align> {
    schema
        .columns
        .iter()
        .map(|c| Align::for_storage(c.storage_type))
        .collect()
}

fn push_line(output: &mut String, cells: &[String], widths: &[usize], aligns: &[Align]) {
    let mut line = String::new();
    for (idx, (cell, width)) in cells.iter().zip(widths.iter()).enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        let text = flatten(cell);
        let pad = width.saturating_sub(cell_width(&text));
        match aligns.get(idx).copied().unwrap_or(Align::Left) {
            Align::Left => {
                line.push_str(&text);
                line.extend(std::iter::repeat_n(' ', pad));
            }
            Align::Right => {
                line.extend(std::iter::repeat_n(' ', pad));
                line.push_str(&text);
            }
        }
    }
    let _ = writeln!(output, "{}", line.trim_end());
}

fn cell_width(value: &str) -> usize {
    value.chars().count()
}

// Control characters would break the grid.
fn flatten(value: &str) -> String {
    value
        .chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect()
}
