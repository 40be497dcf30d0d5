/// Ground heightmap for the falling phase: one flag per pixel-block cell.
///
/// A cell flips to occupied once, when a particle comes to rest on it, and is
/// never cleared. Out-of-range reads report free and out-of-range marks are
/// dropped.
pub(crate) struct OccupancyGrid {
    cols: usize,
    rows: usize,
    cells: Vec<bool>,
    filled: usize,
}

impl OccupancyGrid {
    pub(crate) fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            cells: vec![false; cols * rows],
            filled: 0,
        }
    }

    pub(crate) fn rows(&self) -> usize {
        self.rows
    }

    /// Cell containing a continuous canvas position (integer division by the
    /// block size). Negative coordinates fold into the first row/column.
    pub(crate) fn cell_of(x: f32, y: f32, block: u32) -> (usize, usize) {
        let b = block.max(1) as f32;
        ((x.max(0.0) / b) as usize, (y.max(0.0) / b) as usize)
    }

    fn idx(&self, cx: usize, cy: usize) -> Option<usize> {
        (cx < self.cols && cy < self.rows).then(|| cy * self.cols + cx)
    }

    pub(crate) fn is_occupied(&self, cx: usize, cy: usize) -> bool {
        self.idx(cx, cy).is_some_and(|i| self.cells[i])
    }

    /// Returns true when the cell was free and is now taken.
    pub(crate) fn mark(&mut self, cx: usize, cy: usize) -> bool {
        let Some(i) = self.idx(cx, cy) else {
            return false;
        };
        if self.cells[i] {
            return false;
        }
        self.cells[i] = true;
        self.filled += 1;
        true
    }

    /// Topmost occupied cell of column `cx` within `from..=to`.
    pub(crate) fn first_occupied(&self, cx: usize, from: usize, to: usize) -> Option<usize> {
        (from..=to.min(self.rows.saturating_sub(1))).find(|&cy| self.is_occupied(cx, cy))
    }

    /// Lowest free cell of column `cx` at or above `cy`.
    pub(crate) fn free_at_or_above(&self, cx: usize, cy: usize) -> Option<usize> {
        if cx >= self.cols || self.rows == 0 {
            return None;
        }
        let start = cy.min(self.rows - 1);
        (0..=start).rev().find(|&row| !self.is_occupied(cx, row))
    }

    pub(crate) fn occupied_count(&self) -> usize {
        self.filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_is_one_shot() {
        let mut g = OccupancyGrid::new(3, 2);
        assert!(!g.is_occupied(1, 1));
        assert!(g.mark(1, 1));
        assert!(!g.mark(1, 1));
        assert!(g.is_occupied(1, 1));
        assert_eq!(g.occupied_count(), 1);
    }

    #[test]
    fn out_of_range_is_free_and_unmarkable() {
        let mut g = OccupancyGrid::new(2, 2);
        assert!(!g.mark(2, 0));
        assert!(!g.mark(0, 5));
        assert!(!g.is_occupied(9, 9));
        assert_eq!(g.occupied_count(), 0);
    }

    #[test]
    fn cell_of_uses_integer_division() {
        assert_eq!(OccupancyGrid::cell_of(7.9, 4.0, 4), (1, 1));
        assert_eq!(OccupancyGrid::cell_of(0.0, 3.99, 4), (0, 0));
        assert_eq!(OccupancyGrid::cell_of(-0.5, 9.0, 4), (0, 2));
    }

    #[test]
    fn column_scans() {
        let mut g = OccupancyGrid::new(1, 5);
        g.mark(0, 3);
        g.mark(0, 4);
        assert_eq!(g.first_occupied(0, 0, 2), None);
        assert_eq!(g.first_occupied(0, 1, 9), Some(3));
        assert_eq!(g.free_at_or_above(0, 4), Some(2));
        assert_eq!(g.free_at_or_above(0, 1), Some(1));
        g.mark(0, 0);
        g.mark(0, 1);
        g.mark(0, 2);
        assert_eq!(g.free_at_or_above(0, 4), None);
    }
}
