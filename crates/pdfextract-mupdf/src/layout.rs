//! Geometry helpers that turn positioned text fragments into table rows.
//!
//! Kept free of MuPDF types so the grouping logic can be tested without a
//! real document.

use std::cmp::Ordering;

use pdfextract_core::Table;

/// A run of glyphs on one baseline with no large horizontal gap inside it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Fragment {
    pub x0: f32,
    pub x1: f32,
    /// Baseline.
    pub y: f32,
    pub text: String,
}

impl Fragment {
    pub fn new(x0: f32, x1: f32, y: f32, text: &str) -> Self {
        Self {
            x0,
            x1,
            y,
            text: text.to_string(),
        }
    }

    /// Gap above which the next glyph starts a new fragment: the configured
    /// tolerance, or twice the average glyph width if that is wider.
    pub fn break_gap(&self, tolerance: f32) -> f32 {
        let glyphs = self.text.chars().filter(|c| !c.is_whitespace()).count().max(1);
        let avg = (self.x1 - self.x0) / glyphs as f32;
        tolerance.max(avg * 2.0)
    }
}

/// Builds fragments glyph by glyph.
#[derive(Debug, Default)]
pub(crate) struct FragmentBuilder {
    tolerance: f32,
    current: Option<Fragment>,
    pending_space: bool,
    done: Vec<Fragment>,
}

impl FragmentBuilder {
    pub fn new(tolerance: f32) -> Self {
        Self {
            tolerance,
            ..Self::default()
        }
    }

    pub fn push(&mut self, ch: char, x0: f32, x1: f32, y: f32) {
        if ch.is_whitespace() {
            self.pending_space = self.current.is_some();
            return;
        }
        match self.current.as_mut() {
            Some(f) if x0 - f.x1 <= f.break_gap(self.tolerance) => {
                if self.pending_space {
                    f.text.push(' ');
                }
                f.text.push(ch);
                f.x1 = f.x1.max(x1);
            }
            _ => {
                self.end_line();
                self.current = Some(Fragment {
                    x0,
                    x1,
                    y,
                    text: ch.to_string(),
                });
            }
        }
        self.pending_space = false;
    }

    /// Close the fragment in progress; the next glyph always starts a new one.
    pub fn end_line(&mut self) {
        if let Some(f) = self.current.take() {
            self.done.push(f);
        }
        self.pending_space = false;
    }

    pub fn finish(mut self) -> Vec<Fragment> {
        self.end_line();
        self.done
    }
}

fn cmp_f32(a: f32, b: f32) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Group fragments into rows by baseline, each row sorted left to right.
pub(crate) fn rows(mut fragments: Vec<Fragment>, y_tolerance: f32) -> Vec<Vec<Fragment>> {
    fragments.sort_by(|a, b| cmp_f32(a.y, b.y).then(cmp_f32(a.x0, b.x0)));

    let mut rows: Vec<Vec<Fragment>> = Vec::new();
    for fragment in fragments {
        match rows.last_mut() {
            Some(row) if (fragment.y - row[0].y).abs() <= y_tolerance => row.push(fragment),
            _ => rows.push(vec![fragment]),
        }
    }
    for row in &mut rows {
        row.sort_by(|a, b| cmp_f32(a.x0, b.x0));
    }
    rows
}

/// Runs of at least two consecutive rows with the same number of cells
/// (at least `min_columns`) become tables.
pub(crate) fn tables(rows: Vec<Vec<Fragment>>, min_columns: usize) -> Vec<Table> {
    let mut tables = Vec::new();
    let mut run: Vec<Vec<String>> = Vec::new();

    let mut flush = |run: &mut Vec<Vec<String>>| {
        if run.len() >= 2 {
            tables.push(std::mem::take(run));
        } else {
            run.clear();
        }
    };

    for row in rows {
        let cells: Vec<String> = row.into_iter().map(|f| f.text).collect();
        let continues = run.last().is_some_and(|prev| prev.len() == cells.len());
        if cells.len() < min_columns {
            flush(&mut run);
            continue;
        }
        if !continues {
            flush(&mut run);
        }
        run.push(cells);
    }
    flush(&mut run);
    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(builder: &mut FragmentBuilder, text: &str, x: f32, y: f32) -> f32 {
        let mut x = x;
        for ch in text.chars() {
            builder.push(ch, x, x + 5.0, y);
            x += 5.0;
        }
        x
    }

    #[test]
    fn spaces_inside_a_cell_are_kept() {
        let mut b = FragmentBuilder::new(3.0);
        let x = word(&mut b, "two", 0.0, 10.0);
        b.push(' ', x, x + 2.5, 10.0);
        word(&mut b, "words", x + 2.5, 10.0);
        let fragments = b.finish();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].text, "two words");
    }

    #[test]
    fn wide_gap_splits_cells() {
        let mut b = FragmentBuilder::new(3.0);
        word(&mut b, "name", 0.0, 10.0);
        word(&mut b, "age", 80.0, 10.0);
        let fragments = b.finish();
        let texts: Vec<_> = fragments.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, vec!["name", "age"]);
    }

    #[test]
    fn aligned_rows_form_a_table() {
        let fragments = vec![
            Fragment::new(100.0, 120.0, 10.0, "age"),
            Fragment::new(0.0, 20.0, 10.0, "name"),
            Fragment::new(0.0, 20.0, 22.0, "ada"),
            Fragment::new(100.0, 110.0, 22.5, "36"),
            Fragment::new(0.0, 200.0, 40.0, "A paragraph of running text."),
            Fragment::new(0.0, 20.0, 60.0, "x"),
            Fragment::new(100.0, 110.0, 60.0, "y"),
        ];
        let tables = tables(rows(fragments, 3.0), 2);
        assert_eq!(tables.len(), 1);
        assert_eq!(
            tables[0],
            vec![
                vec!["name".to_string(), "age".to_string()],
                vec!["ada".to_string(), "36".to_string()],
            ]
        );
    }

    #[test]
    fn column_count_change_starts_new_table() {
        let row = |y: f32, n: usize| {
            (0..n)
                .map(|i| Fragment::new(i as f32 * 50.0, i as f32 * 50.0 + 10.0, y, "c"))
                .collect::<Vec<_>>()
        };
        let mut fragments = Vec::new();
        fragments.extend(row(0.0, 2));
        fragments.extend(row(10.0, 2));
        fragments.extend(row(20.0, 3));
        fragments.extend(row(30.0, 3));
        fragments.extend(row(40.0, 3));
        let tables = tables(rows(fragments, 2.0), 2);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].len(), 2);
        assert_eq!(tables[1].len(), 3);
    }

    #[test]
    fn min_columns_filters_narrow_rows() {
        let fragments = vec![
            Fragment::new(0.0, 10.0, 0.0, "a"),
            Fragment::new(50.0, 60.0, 0.0, "b"),
            Fragment::new(0.0, 10.0, 10.0, "c"),
            Fragment::new(50.0, 60.0, 10.0, "d"),
        ];
        assert!(tables(rows(fragments, 2.0), 3).is_empty());
    }
}
