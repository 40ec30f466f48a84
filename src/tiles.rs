//! Tiled page rendering
//!
//! Splits the rotated, zoomed view of a page into a fixed grid of
//! tiles, each backed by its own page handle so tiles render
//! independently, including from different threads. Tile geometry lives
//! in view space; each tile also precomputes the canonical page-space
//! region it must ask the backend for.

use std::sync::{Arc, PoisonError};

use image::DynamicImage;

use crate::document::Page;
use crate::error::{BackendError, PageError};
use crate::geom::PageRect;
use crate::options::ColorMode;
use crate::surface::PixelSurface;

/// One cell of a tiled view.
pub struct Tile {
    surface: PixelSurface,
    column: i32,
    row: i32,
    /// Tile bounds in rotated, zoomed view coordinates.
    view_rect: PageRect,
    /// Same region in zoomed canonical page coordinates.
    pix_rect: PageRect,
    zoom: f32,
}

impl Tile {
    fn new(
        scratch: &PixelSurface,
        extent: &PageRect,
        scaled_bounds: &PageRect,
        rotation: i32,
        zoom: f32,
        column: i32,
        row: i32,
        tile_w: i32,
        tile_h: i32,
    ) -> Result<Self, PageError> {
        let x = (column * tile_w) as f32;
        let y = (row * tile_h) as f32;
        let x1 = (extent.x1()).min(x + tile_w as f32);
        let y1 = (extent.y1()).min(y + tile_h as f32);
        let view_rect = PageRect::new(x, y, x1, y1);
        let pix_rect = view_rect.rotate_between(scaled_bounds, rotation, 0);

        Ok(Self {
            surface: scratch.try_clone()?,
            column,
            row,
            view_rect,
            pix_rect,
            zoom,
        })
    }

    #[must_use]
    pub fn column(&self) -> i32 {
        self.column
    }

    #[must_use]
    pub fn row(&self) -> i32 {
        self.row
    }

    /// View-space x origin of this tile in pixels.
    #[must_use]
    pub fn x(&self) -> i32 {
        self.view_rect.x()
    }

    /// View-space y origin of this tile in pixels.
    #[must_use]
    pub fn y(&self) -> i32 {
        self.view_rect.y()
    }

    #[must_use]
    pub fn width(&self) -> i32 {
        self.view_rect.width()
    }

    #[must_use]
    pub fn height(&self) -> i32 {
        self.view_rect.height()
    }

    /// Rasterize this tile's region of the page.
    pub fn render(&mut self) -> Result<(), BackendError> {
        let r = &self.pix_rect;
        self.surface.draw_page(
            None,
            r.x0() / self.zoom,
            r.y0() / self.zoom,
            r.x1() / self.zoom,
            r.y1() / self.zoom,
        )
    }

    /// Rendered tile image; `None` before the first render.
    #[must_use]
    pub fn image(&mut self) -> Option<Arc<DynamicImage>> {
        self.surface.image()
    }

    /// Release pixels and this tile's private page handle.
    pub fn dispose(&mut self) {
        self.surface.dispose();
        self.surface.page().dispose();
    }
}

impl std::fmt::Debug for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tile")
            .field("column", &self.column)
            .field("row", &self.row)
            .field("view_rect", &self.view_rect)
            .finish_non_exhaustive()
    }
}

/// Fixed grid of tiles covering one view of one page.
pub struct TileCache {
    tiles: Vec<Tile>,
    columns: i32,
    rows: i32,
    tile_width: i32,
    tile_height: i32,
}

impl TileCache {
    /// Tile the view of `page` at the given color mode, rotation and
    /// zoom. Tile dimensions are clamped to at least one pixel.
    ///
    /// Tiles are ordered row-major, top row first. Each tile opens its
    /// own page handle; drop or dispose the cache to release them.
    pub fn new(
        page: &Arc<Page>,
        color: ColorMode,
        rotation: i32,
        zoom: f32,
        tile_width: i32,
        tile_height: i32,
    ) -> Result<Self, PageError> {
        let tile_width = tile_width.max(1);
        let tile_height = tile_height.max(1);

        let mut scratch = page.pixels().ok_or(PageError::PageClosed)?;
        let (rotation, zoom) = {
            let options = scratch.options();
            let mut options = options.lock().unwrap_or_else(PoisonError::into_inner);
            options.set_color_mode(color);
            options.set_rotation(rotation);
            options.set_zoom(zoom);
            (options.rotation(), options.zoom())
        };

        let scaled_bounds = page.bound_box().scale(zoom);
        let extent = scaled_bounds.rotate_to_view(&scaled_bounds, rotation);

        let columns = (extent.width() + tile_width - 1) / tile_width;
        let rows = (extent.height() + tile_height - 1) / tile_height;

        let mut tiles = Vec::with_capacity((columns.max(0) * rows.max(0)) as usize);
        for row in 0..rows {
            for column in 0..columns {
                tiles.push(Tile::new(
                    &scratch,
                    &extent,
                    &scaled_bounds,
                    rotation,
                    zoom,
                    column,
                    row,
                    tile_width,
                    tile_height,
                )?);
            }
        }
        scratch.dispose();

        Ok(Self {
            tiles,
            columns,
            rows,
            tile_width,
            tile_height,
        })
    }

    #[must_use]
    pub fn columns(&self) -> i32 {
        self.columns
    }

    #[must_use]
    pub fn rows(&self) -> i32 {
        self.rows
    }

    #[must_use]
    pub fn tile_width(&self) -> i32 {
        self.tile_width
    }

    #[must_use]
    pub fn tile_height(&self) -> i32 {
        self.tile_height
    }

    /// Tiles in row-major order.
    #[must_use]
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tiles_mut(&mut self) -> &mut [Tile] {
        &mut self.tiles
    }

    /// Take ownership of the tiles, e.g. to render them from worker
    /// threads.
    #[must_use]
    pub fn into_tiles(self) -> Vec<Tile> {
        self.tiles
    }

    /// Tile at a grid position.
    #[must_use]
    pub fn tile(&self, column: i32, row: i32) -> Option<&Tile> {
        if !(0..self.columns).contains(&column) || !(0..self.rows).contains(&row) {
            return None;
        }
        self.tiles.get((row * self.columns + column) as usize)
    }

    pub fn tile_mut(&mut self, column: i32, row: i32) -> Option<&mut Tile> {
        if !(0..self.columns).contains(&column) || !(0..self.rows).contains(&row) {
            return None;
        }
        self.tiles.get_mut((row * self.columns + column) as usize)
    }

    /// Dispose every tile.
    pub fn dispose(&mut self) {
        for tile in &mut self.tiles {
            tile.dispose();
        }
    }
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("columns", &self.columns)
            .field("rows", &self.rows)
            .field("tile_width", &self.tile_width)
            .field("tile_height", &self.tile_height)
            .finish_non_exhaustive()
    }
}

// Tiles own their page handle and surface outright.
const _: () = {
    const fn assert_send<T: Send>() {}
    assert_send::<Tile>();
};
