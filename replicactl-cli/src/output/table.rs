//! Table rendering for status output.

/// Fixed-column table with box-drawing borders.
///
/// Column widths follow the widest cell. Headers render bold cyan unless
/// `NO_COLOR` is set.
pub struct TableBuilder {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    widths: Vec<usize>,
    use_color: bool,
}

impl TableBuilder {
    #[must_use]
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| (*h).to_string()).collect(),
            widths: headers.iter().map(|h| h.len()).collect(),
            rows: Vec::new(),
            use_color: std::env::var("NO_COLOR").is_err(),
        }
    }

    pub fn add_row(&mut self, row: Vec<String>) {
        for (width, cell) in self.widths.iter_mut().zip(&row) {
            *width = (*width).max(cell.len());
        }
        self.rows.push(row);
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.border(&mut out, '┌', '┬', '┐');
        self.row(&mut out, &self.headers, true);
        self.border(&mut out, '├', '┼', '┤');
        for row in &self.rows {
            self.row(&mut out, row, false);
        }
        self.border(&mut out, '└', '┴', '┘');
        out
    }

    fn border(&self, out: &mut String, left: char, mid: char, right: char) {
        out.push(left);
        for (i, width) in self.widths.iter().enumerate() {
            for _ in 0..(width + 2) {
                out.push('─');
            }
            if i < self.widths.len() - 1 {
                out.push(mid);
            }
        }
        out.push(right);
        out.push('\n');
    }

    fn row(&self, out: &mut String, cells: &[String], is_header: bool) {
        out.push('│');
        for (cell, width) in cells.iter().zip(self.widths.iter().copied()) {
            if is_header && self.use_color {
                out.push_str(&format!(" \x1b[1;36m{cell:<width$}\x1b[0m │"));
            } else {
                out.push_str(&format!(" {cell:<width$} │"));
            }
        }
        out.push('\n');
    }
}
