//! Checkstyle XML output.
//!
//! CI servers already know how to gate a build on checkstyle errors, so every
//! SLOW, FAILED or TIMEOUT row becomes one `<error>`. The `line` attribute points
//! at the row in the plain-text results table written next to it.

use super::ResultRow;
use super::html::escape_html;

pub const CHECKSTYLE_VERSION: &str = "5.0";

/// `row_lines[i]` is the table line on which `rows[i]` starts.
pub fn render(file_name: &str, rows: &[ResultRow], row_lines: &[usize]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!("<checkstyle version=\"{CHECKSTYLE_VERSION}\">\n"));
    xml.push_str(&format!("  <file name=\"{}\">\n", escape_html(file_name)));

    for (row, line) in rows.iter().zip(row_lines) {
        if !row.status.is_problem() {
            continue;
        }
        let message = format!("{} is {}", row.label, row.status);
        xml.push_str(&format!(
            "    <error line=\"{line}\" severity=\"error\" message=\"{}\" />\n",
            escape_html(&message)
        ));
    }

    xml.push_str("  </file>\n</checkstyle>\n");
    xml
}
