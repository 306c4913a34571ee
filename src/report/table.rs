//! Boxed plain-text tables.
//!
//! ```text
//! +----------+--------+
//! | Key      |  Value |
//! +----------+--------+
//! | API URL  | http:… |
//! +----------+--------+
//! ```
//!
//! Cells may span several lines. The header block is always three lines, so
//! the first data row starts on line 4.

/// Lines taken by the top border, header and header separator.
pub const HEADER_LINES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    Left,
    Right,
    #[default]
    Center,
}

#[derive(Debug, Clone, Default)]
pub struct TextTable {
    headers: Vec<String>,
    aligns: Vec<Align>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let headers: Vec<String> = headers.into_iter().map(Into::into).collect();
        let aligns = vec![Align::default(); headers.len()];
        Self {
            headers,
            aligns,
            rows: Vec::new(),
        }
    }

    pub fn align(&mut self, column: usize, align: Align) -> &mut Self {
        if let Some(slot) = self.aligns.get_mut(column) {
            *slot = align;
        }
        self
    }

    /// Add a row; missing cells render empty, extra cells are dropped.
    pub fn add_row<I, S>(&mut self, cells: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row: Vec<String> = cells.into_iter().map(Into::into).collect();
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
        self
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn aligns(&self) -> &[Align] {
        &self.aligns
    }

    fn widths(&self) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .map(|(col, header)| {
                self.rows
                    .iter()
                    .map(|row| cell_width(&row[col]))
                    .chain(std::iter::once(cell_width(header)))
                    .max()
                    .unwrap_or(0)
            })
            .collect()
    }

    /// 1-based line number on which each row starts in [`render`](Self::render).
    pub fn row_lines(&self) -> Vec<usize> {
        let mut line = HEADER_LINES + 1;
        self.rows
            .iter()
            .map(|row| {
                let start = line;
                line += row_height(row);
                start
            })
            .collect()
    }

    pub fn render(&self) -> String {
        let widths = self.widths();
        let border = border_line(&widths);

        let mut output = String::new();
        output.push_str(&border);
        push_row(&mut output, &self.headers, &widths, &vec![Align::Center; widths.len()]);
        output.push_str(&border);
        for row in &self.rows {
            push_row(&mut output, row, &widths, &self.aligns);
        }
        output.push_str(&border);
        output
    }
}

fn cell_width(cell: &str) -> usize {
    cell.lines().map(|l| l.chars().count()).max().unwrap_or(0)
}

fn row_height(row: &[String]) -> usize {
    row.iter()
        .map(|cell| cell.lines().count())
        .max()
        .unwrap_or(0)
        .max(1)
}

fn border_line(widths: &[usize]) -> String {
    let mut line = String::from("+");
    for width in widths {
        line.push_str(&"-".repeat(width + 2));
        line.push('+');
    }
    line.push('\n');
    line
}

fn push_row(output: &mut String, cells: &[String], widths: &[usize], aligns: &[Align]) {
    let split: Vec<Vec<&str>> = cells.iter().map(|c| c.lines().collect()).collect();
    for line_idx in 0..row_height(cells) {
        output.push('|');
        for (col, width) in widths.iter().enumerate() {
            let text = split[col].get(line_idx).copied().unwrap_or("");
            output.push(' ');
            output.push_str(&pad(text, *width, aligns[col]));
            output.push_str(" |");
        }
        output.push('\n');
    }
}

fn pad(text: &str, width: usize, align: Align) -> String {
    let fill = width.saturating_sub(text.chars().count());
    match align {
        Align::Left => format!("{text}{}", " ".repeat(fill)),
        Align::Right => format!("{}{text}", " ".repeat(fill)),
        Align::Center => {
            let left = fill / 2;
            format!("{}{text}{}", " ".repeat(left), " ".repeat(fill - left))
        }
    }
}
