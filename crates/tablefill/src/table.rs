use crate::{Error, PartitionPlan, Result, partition::Axis};
use core::{fmt, mem};

/// The value stored in every table cell.
pub type Cell = u32;

/// Largest cell count whose buffer size fits in `isize`.
pub const MAX_TABLE_CELLS: usize = isize::MAX as usize / mem::size_of::<Cell>();

/// A fillable `rows x cols` grid.
///
/// Cells are stored in a single row-major buffer so that a partition plan can
/// hand out disjoint mutable views of it (see [`Table::split_partitions`])
/// without copying or locking.
#[derive(Clone, PartialEq, Eq)]
pub struct Table {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
}

impl Table {
    /// Allocates a zero-filled table.
    ///
    /// # Panics
    ///
    /// Panics if `rows * cols` overflows `usize` or exceeds
    /// [`MAX_TABLE_CELLS`]. Callers that take dimensions from untrusted
    /// input should go through [`Table::try_new`] or the
    /// [`crate::FillEngine`] instead.
    pub fn new(rows: usize, cols: usize) -> Self {
        let len = rows
            .checked_mul(cols)
            .unwrap_or_else(|| panic!("table dimensions {rows}x{cols} overflow usize"));
        Self {
            rows,
            cols,
            cells: vec![0; len],
        }
    }

    /// Allocates a zero-filled table from signed dimensions.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidDimension`] if either dimension is negative.
    /// - [`Error::TableTooLarge`] if `rows * cols` exceeds
    ///   [`MAX_TABLE_CELLS`] or the buffer cannot be allocated.
    pub fn try_new(rows: i64, cols: i64) -> Result<Self> {
        let (r, c) = checked_dims(rows, cols, usize::MAX)?;
        Self::try_zeroed(r, c).ok_or(Error::TableTooLarge {
            rows,
            cols,
            max_cells: MAX_TABLE_CELLS,
        })
    }

    /// Allocates a zero-filled table, or `None` if the allocator refuses.
    pub(crate) fn try_zeroed(rows: usize, cols: usize) -> Option<Self> {
        let len = rows.checked_mul(cols)?;
        let mut cells = Vec::new();
        cells.try_reserve_exact(len).ok()?;
        cells.resize(len, 0);
        Some(Self { rows, cols, cells })
    }

    /// Builds a table from a row-major buffer.
    pub(crate) fn from_parts(rows: usize, cols: usize, cells: Vec<Cell>) -> Self {
        debug_assert_eq!(rows.checked_mul(cols), Some(cells.len()));
        Self { rows, cols, cells }
    }

    pub const fn rows(&self) -> usize {
        self.rows
    }

    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Returns the cell at `(row, col)`, or `None` if out of bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<Cell> {
        if row < self.rows && col < self.cols {
            Some(self.cells[row * self.cols + col])
        } else {
            None
        }
    }

    /// Returns row `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= rows`.
    pub fn row(&self, i: usize) -> &[Cell] {
        assert!(i < self.rows, "row {i} out of bounds ({} rows)", self.rows);
        &self.cells[i * self.cols..(i + 1) * self.cols]
    }

    /// Iterates over the rows in order.
    ///
    /// Yields exactly `rows` slices, including when `cols == 0`.
    pub fn rows_iter(&self) -> impl ExactSizeIterator<Item = &[Cell]> + '_ {
        (0..self.rows).map(move |i| &self.cells[i * self.cols..(i + 1) * self.cols])
    }

    /// The row-major cell buffer.
    pub fn as_slice(&self) -> &[Cell] {
        &self.cells
    }

    /// Copies the table into one `Vec` per row.
    pub fn to_nested(&self) -> Vec<Vec<Cell>> {
        self.rows_iter().map(<[Cell]>::to_vec).collect()
    }

    /// Writes `value` into every cell of rows `[start_row, end_row)`.
    ///
    /// # Panics
    ///
    /// Panics unless `start_row <= end_row <= rows`.
    pub fn fill_range(&mut self, start_row: usize, end_row: usize, value: Cell) {
        assert!(
            start_row <= end_row && end_row <= self.rows,
            "row range {start_row}..{end_row} out of bounds ({} rows)",
            self.rows
        );
        self.cells[start_row * self.cols..end_row * self.cols].fill(value);
    }

    /// Writes `value` into every cell of columns `[start_col, end_col)`.
    ///
    /// # Panics
    ///
    /// Panics unless `start_col <= end_col <= cols`.
    pub fn fill_column_range(&mut self, start_col: usize, end_col: usize, value: Cell) {
        assert!(
            start_col <= end_col && end_col <= self.cols,
            "column range {start_col}..{end_col} out of bounds ({} cols)",
            self.cols
        );
        if start_col == end_col {
            return;
        }
        for row in self.cells.chunks_exact_mut(self.cols) {
            row[start_col..end_col].fill(value);
        }
    }

    /// Splits the cell buffer into one mutable view per partition in `plan`.
    ///
    /// Views are produced with `split_at_mut`, so no two views can alias a
    /// cell. A row partition is one contiguous segment; a column partition
    /// holds one segment per row.
    ///
    /// # Panics
    ///
    /// Panics if `plan` was built for a different shape.
    pub fn split_partitions(&mut self, plan: &PartitionPlan) -> Vec<PartitionView<'_>> {
        assert_eq!(
            (plan.table_rows(), plan.table_cols()),
            (self.rows, self.cols),
            "partition plan does not match table shape"
        );

        let mut views: Vec<PartitionView<'_>> = plan
            .partitions()
            .map(|p| PartitionView {
                index: p.index,
                marker: p.marker,
                segments: Vec::new(),
            })
            .collect();
        if views.is_empty() {
            return views;
        }

        match plan.axis() {
            Axis::Rows => {
                let mut rest: &mut [Cell] = &mut self.cells;
                for (view, range) in views.iter_mut().zip(plan.ranges()) {
                    let (head, tail) = mem::take(&mut rest).split_at_mut(range.len() * self.cols);
                    view.segments.push(head);
                    rest = tail;
                }
                debug_assert!(rest.is_empty());
            }
            Axis::Columns => {
                for view in &mut views {
                    view.segments.reserve_exact(self.rows);
                }
                for row in self.cells.chunks_exact_mut(self.cols) {
                    let mut rest = row;
                    for (view, range) in views.iter_mut().zip(plan.ranges()) {
                        let (head, tail) = mem::take(&mut rest).split_at_mut(range.len());
                        view.segments.push(head);
                        rest = tail;
                    }
                    debug_assert!(rest.is_empty());
                }
            }
        }

        views
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("cells", &self.to_nested())
            .finish()
    }
}

/// Exclusive write access to one partition of a [`Table`].
///
/// Obtained from [`Table::split_partitions`]. The view can only reach the
/// cells of its own partition.
#[derive(Debug)]
pub struct PartitionView<'a> {
    index: usize,
    marker: Cell,
    segments: Vec<&'a mut [Cell]>,
}

impl PartitionView<'_> {
    /// Zero-based partition index within the plan.
    pub const fn index(&self) -> usize {
        self.index
    }

    /// The marker this partition is filled with (`index + 1`).
    pub const fn marker(&self) -> Cell {
        self.marker
    }

    /// Number of cells covered by this view.
    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the partition marker into every cell of the view.
    pub fn fill(&mut self) {
        let marker = self.marker;
        self.fill_with(marker);
    }

    /// Writes `value` into every cell of the view.
    pub fn fill_with(&mut self, value: Cell) {
        for segment in &mut self.segments {
            segment.fill(value);
        }
    }
}

/// Validates signed dimensions and returns them as `usize`.
///
/// `max_cells` is further capped at [`MAX_TABLE_CELLS`].
pub(crate) fn checked_dims(rows: i64, cols: i64, max_cells: usize) -> Result<(usize, usize)> {
    if rows < 0 || cols < 0 {
        return Err(Error::InvalidDimension { rows, cols });
    }
    let max_cells = max_cells.min(MAX_TABLE_CELLS);
    let too_large = || Error::TableTooLarge {
        rows,
        cols,
        max_cells,
    };
    let r = usize::try_from(rows).map_err(|_| too_large())?;
    let c = usize::try_from(cols).map_err(|_| too_large())?;
    match r.checked_mul(c) {
        Some(cells) if cells <= max_cells => Ok((r, c)),
        _ => Err(too_large()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::num::NonZeroUsize;

    fn threads(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn new_table_is_zeroed() {
        let table = Table::new(3, 4);
        assert_eq!(table.rows(), 3);
        assert_eq!(table.cols(), 4);
        assert_eq!(table.len(), 12);
        assert!(table.as_slice().iter().all(|&c| c == 0));
    }

    #[test]
    fn try_new_rejects_buffers_beyond_isize() {
        // 2^62 cells fit in a 64-bit usize but not in an allocation.
        let err = Table::try_new(1 << 31, 1 << 31).unwrap_err();
        assert_eq!(
            err,
            Error::TableTooLarge {
                rows: 1 << 31,
                cols: 1 << 31,
                max_cells: MAX_TABLE_CELLS,
            }
        );
    }

    #[test]
    fn cell_limit_is_capped_at_allocatable_size() {
        assert_eq!(checked_dims(3, 4, usize::MAX), Ok((3, 4)));
        assert!(matches!(
            checked_dims(i64::try_from(MAX_TABLE_CELLS).unwrap(), 2, usize::MAX),
            Err(Error::TableTooLarge { max_cells: MAX_TABLE_CELLS, .. })
        ));
    }

    #[test]
    fn try_zeroed_matches_new() {
        assert_eq!(Table::try_zeroed(3, 5), Some(Table::new(3, 5)));
        assert_eq!(Table::try_zeroed(usize::MAX, 2), None);
    }

    #[test]
    fn try_new_rejects_negative_dimensions() {
        assert_eq!(
            Table::try_new(-1, 5).unwrap_err(),
            Error::InvalidDimension { rows: -1, cols: 5 }
        );
        assert_eq!(
            Table::try_new(5, -3).unwrap_err(),
            Error::InvalidDimension { rows: 5, cols: -3 }
        );
    }

    #[test]
    fn try_new_rejects_overflowing_dimensions() {
        let err = Table::try_new(i64::MAX, i64::MAX).unwrap_err();
        assert!(matches!(err, Error::TableTooLarge { .. }));
    }

    #[test]
    fn zero_dimensions_are_empty() {
        let table = Table::new(0, 7);
        assert!(table.is_empty());
        assert_eq!(table.rows_iter().len(), 0);

        let table = Table::new(4, 0);
        assert!(table.is_empty());
        assert_eq!(table.to_nested(), vec![Vec::<Cell>::new(); 4]);
    }

    #[test]
    fn fill_range_touches_only_requested_rows() {
        let mut table = Table::new(4, 3);
        table.fill_range(1, 3, 9);
        assert_eq!(
            table.to_nested(),
            vec![vec![0, 0, 0], vec![9, 9, 9], vec![9, 9, 9], vec![0, 0, 0]]
        );
    }

    #[test]
    fn fill_column_range_touches_only_requested_columns() {
        let mut table = Table::new(2, 4);
        table.fill_column_range(1, 3, 5);
        assert_eq!(table.to_nested(), vec![vec![0, 5, 5, 0], vec![0, 5, 5, 0]]);
    }

    #[test]
    fn empty_ranges_are_noops() {
        let mut table = Table::new(2, 2);
        table.fill_range(1, 1, 7);
        table.fill_column_range(2, 2, 7);
        assert!(table.as_slice().iter().all(|&c| c == 0));

        let mut table = Table::new(3, 0);
        table.fill_column_range(0, 0, 7);
        table.fill_range(0, 3, 7);
        assert!(table.is_empty());
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn fill_range_past_end_panics() {
        Table::new(2, 2).fill_range(1, 3, 1);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn fill_column_range_inverted_panics() {
        Table::new(2, 2).fill_column_range(2, 1, 1);
    }

    #[test]
    fn get_is_bounds_checked() {
        let mut table = Table::new(2, 3);
        table.fill_range(1, 2, 4);
        assert_eq!(table.get(1, 2), Some(4));
        assert_eq!(table.get(0, 2), Some(0));
        assert_eq!(table.get(2, 0), None);
        assert_eq!(table.get(0, 3), None);
    }

    #[test]
    fn split_by_rows_gives_contiguous_views() {
        let mut table = Table::new(5, 2);
        let plan = PartitionPlan::new(5, 2, threads(2));
        assert_eq!(plan.axis(), Axis::Rows);

        let views = table.split_partitions(&plan);
        let lens: Vec<_> = views.iter().map(PartitionView::len).collect();
        assert_eq!(lens, vec![4, 6]);
        for mut view in views {
            view.fill();
        }
        assert_eq!(
            table.to_nested(),
            vec![vec![1, 1], vec![1, 1], vec![2, 2], vec![2, 2], vec![2, 2]]
        );
    }

    #[test]
    fn split_by_columns_gives_one_segment_per_row() {
        let mut table = Table::new(2, 5);
        let plan = PartitionPlan::new(2, 5, threads(3));
        assert_eq!(plan.axis(), Axis::Columns);

        let views = table.split_partitions(&plan);
        assert_eq!(views.len(), 3);
        assert!(views.iter().all(|v| v.segments.len() == 2));
        for mut view in views {
            view.fill();
        }
        assert_eq!(
            table.to_nested(),
            vec![vec![1, 2, 3, 3, 3], vec![1, 2, 3, 3, 3]]
        );
    }

    #[test]
    #[should_panic(expected = "does not match table shape")]
    fn split_rejects_foreign_plan() {
        let mut table = Table::new(3, 3);
        let plan = PartitionPlan::new(4, 3, threads(2));
        let _ = table.split_partitions(&plan);
    }
}
