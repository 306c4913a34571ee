//! HTML rendering of the summary and results tables.

use chrono::Utc;
use tracing::debug;

use super::table::{Align, TextTable};
use super::{ResultRow, Summary, results_table};

const HTML_HEADER: &str = r#"<!DOCTYPE html>
<html>
    <head>
        <title>API Performance Test Results</title>
        <style>
            body {font-family: monospace;
                  font-size: 11pt;}
            table tr:hover {background: blue;
                            color: white;}
            .status-SLOW {color: #b58900;}
            .status-FAILED, .status-TIMEOUT {color: #dc322f; font-weight: bold;}
        </style>
    </head>
    <body>
    <div>API Performance Test Results</div>
"#;

const HTML_FOOTER: &str = r#"    </body>
</html>
"#;

pub fn render_report(summary: &Summary, rows: &[ResultRow]) -> String {
    let mut html = String::from(HTML_HEADER);
    html.push_str(&format!(
        "    <div>Generated {}</div>\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str(&render_table(&summary.to_table(), None));
    html.push_str("<br />\n");
    html.push_str(&render_table(&results_table(rows), Some(3)));
    html.push_str(HTML_FOOTER);

    debug!(
        component = "report",
        operation = "render_html",
        rows = rows.len(),
        bytes = html.len(),
        "Rendered HTML report"
    );
    html
}

/// Render a table; `status_column` cells get a `status-<VALUE>` class.
pub fn render_table(table: &TextTable, status_column: Option<usize>) -> String {
    let mut out = String::from("<table>\n    <thead>\n        <tr>\n");
    for header in table.headers() {
        out.push_str(&format!("            <th>{}</th>\n", escape_cell(header)));
    }
    out.push_str("        </tr>\n    </thead>\n    <tbody>\n");

    for row in table.rows() {
        out.push_str("        <tr>\n");
        for (col, cell) in row.iter().enumerate() {
            let align = match table.aligns()[col] {
                Align::Left => "left",
                Align::Right => "right",
                Align::Center => "center",
            };
            let class = match status_column {
                Some(status_col) if status_col == col => {
                    format!(" class=\"status-{}\"", escape_html(cell).replace(' ', "-"))
                }
                _ => String::new(),
            };
            out.push_str(&format!(
                "            <td style=\"text-align: {align}\"{class}>{}</td>\n",
                escape_cell(cell)
            ));
        }
        out.push_str("        </tr>\n");
    }
    out.push_str("    </tbody>\n</table>\n");
    out
}

fn escape_cell(cell: &str) -> String {
    escape_html(cell).replace('\n', "<br>")
}

/// Escape HTML special characters, quotes included since values land in attributes.
pub fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#39;"),
            _ => result.push(c),
        }
    }
    result
}
