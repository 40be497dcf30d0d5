use crate::canvas::Rgb;

/// Row-major block colors of the current image. Cells are taken (left empty)
/// as they are turned into particles.
#[derive(Clone, Debug)]
pub(crate) struct SourceGrid {
    cols: usize,
    rows: usize,
    cells: Vec<Option<Rgb>>,
}

impl SourceGrid {
    pub(crate) fn new(cols: usize, rows: usize, colors: Vec<Rgb>) -> Self {
        debug_assert_eq!(colors.len(), cols * rows);
        let mut cells: Vec<Option<Rgb>> = colors.into_iter().map(Some).collect();
        cells.resize(cols * rows, None);
        Self { cols, rows, cells }
    }

    pub(crate) fn from_fn(
        cols: usize,
        rows: usize,
        mut f: impl FnMut(usize, usize) -> Rgb,
    ) -> Self {
        let mut colors = Vec::with_capacity(cols * rows);
        for y in 0..rows {
            for x in 0..cols {
                colors.push(f(x, y));
            }
        }
        Self::new(cols, rows, colors)
    }

    pub(crate) fn cols(&self) -> usize {
        self.cols
    }

    pub(crate) fn rows(&self) -> usize {
        self.rows
    }

    pub(crate) fn len(&self) -> usize {
        self.cols * self.rows
    }

    #[cfg(test)]
    pub(crate) fn get(&self, x: usize, y: usize) -> Option<Rgb> {
        if x >= self.cols || y >= self.rows {
            return None;
        }
        self.cells[y * self.cols + x]
    }

    pub(crate) fn take(&mut self, x: usize, y: usize) -> Option<Rgb> {
        if x >= self.cols || y >= self.rows {
            return None;
        }
        self.cells[y * self.cols + x].take()
    }

    /// Remaining cells with their coordinates, in row-major order.
    pub(crate) fn remaining(&self) -> impl Iterator<Item = (usize, usize, Rgb)> + '_ {
        self.cells.iter().enumerate().filter_map(move |(i, c)| {
            c.map(|color| (i % self.cols.max(1), i / self.cols.max(1), color))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_leaves_hole() {
        let mut g = SourceGrid::from_fn(3, 2, |x, y| Rgb::new(x as u8, y as u8, 0));
        assert_eq!(g.len(), 6);
        assert_eq!(g.take(2, 1), Some(Rgb::new(2, 1, 0)));
        assert_eq!(g.take(2, 1), None);
        assert_eq!(g.get(2, 1), None);
        assert_eq!(g.remaining().count(), 5);
        assert!(g.remaining().all(|(x, y, _)| (x, y) != (2, 1)));
    }

    #[test]
    fn out_of_range_reads_are_empty() {
        let mut g = SourceGrid::from_fn(1, 1, |_, _| Rgb::WHITE);
        assert_eq!(g.get(1, 0), None);
        assert_eq!(g.take(0, 1), None);
    }
}
