use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::dashboard::Grade;

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn grade_color(grade: Option<Grade>) -> Option<TableColor> {
    match grade? {
        Grade::Stretch | Grade::Design => Some(TableColor::Green),
        Grade::Minimum => Some(TableColor::Yellow),
        Grade::Failing => Some(TableColor::Red),
    }
}

pub fn color_coded_value_cell(value: f64, grade: Option<Grade>) -> Cell {
    let cell = Cell::new(format!("{value:.3}"));
    match grade_color(grade) {
        Some(color) => cell.fg(color),
        None => cell,
    }
}

pub fn color_coded_gap_cell(missing: i64) -> Cell {
    let text = missing.to_string();
    if missing >= 10 {
        Cell::new(text).fg(TableColor::Red)
    } else {
        Cell::new(text).fg(TableColor::Yellow)
    }
}
