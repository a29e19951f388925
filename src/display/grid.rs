//! Two-by-three grid compositing.

use std::borrow::Cow;

use image::{imageops, RgbImage};

pub const GRID_COLUMNS: u32 = 3;
pub const GRID_ROWS: u32 = 2;
pub const GRID_CAPACITY: usize = (GRID_COLUMNS * GRID_ROWS) as usize;

/// Fill the grid to capacity with black images shaped like the first image.
/// Anything past capacity is dropped. Empty input stays empty.
pub fn pad_cells<'a>(images: &[&'a RgbImage]) -> Vec<Cow<'a, RgbImage>> {
    let Some(first) = images.first() else {
        return Vec::new();
    };
    let mut cells: Vec<Cow<'a, RgbImage>> = images
        .iter()
        .take(GRID_CAPACITY)
        .map(|img| Cow::Borrowed(*img))
        .collect();

    if cells.len() < GRID_CAPACITY {
        let placeholder = RgbImage::new(first.width(), first.height());
        cells.resize(GRID_CAPACITY, Cow::Owned(placeholder));
    }
    cells
}

/// Lay up to six images out in two rows of three. Cells take the first
/// image's size; a differently sized image is clipped to its cell.
pub fn compose_grid(images: &[&RgbImage]) -> Option<RgbImage> {
    let cells = pad_cells(images);
    let first = cells.first()?;
    let (cell_w, cell_h) = first.dimensions();

    let mut grid = RgbImage::new(cell_w * GRID_COLUMNS, cell_h * GRID_ROWS);
    for (i, cell) in cells.iter().enumerate() {
        let i = i as u32;
        let (col, row) = (i % GRID_COLUMNS, i / GRID_COLUMNS);
        let clipped = imageops::crop_imm(cell.as_ref(), 0, 0, cell_w, cell_h).to_image();
        imageops::replace(
            &mut grid,
            &clipped,
            i64::from(col * cell_w),
            i64::from(row * cell_h),
        );
    }
    Some(grid)
}
