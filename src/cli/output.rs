//! Terminal output helpers: JSON or comfy-table rendering.

use comfy_table::{presets::UTF8_FULL_CONDENSED, Table};
use serde::Serialize;

/// Print a value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(out) => println!("{out}"),
        Err(err) => eprintln!("serialization error: {err}"),
    }
}

/// Render rows under a header as a condensed table.
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(headers.to_vec());
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}
