use anyhow::Result;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};

/// Print `rows` under `header`, or the `empty` notice when there are none.
pub fn print_rows(header: &[&str], rows: Vec<Vec<String>>, empty: &str) -> Result<()> {
    if rows.is_empty() {
        println!("{empty}");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
    Ok(())
}
