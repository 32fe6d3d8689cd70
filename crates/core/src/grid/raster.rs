//! Integer line rasterization (Bresenham)
//!
//! Approximates the footprint swept by a parcel during one time slice as the
//! 8-connected chain of grid cells between its start and end cells.

/// Grid cell as (column, row)
pub type Cell = (i64, i64);

/// Lazy 8-connected path between two cells, both endpoints included
///
/// Yields exactly `max(|dx|, |dy|) + 1` cells.
#[derive(Debug, Clone)]
pub struct Line {
    x: i64,
    y: i64,
    x1: i64,
    y1: i64,
    sx: i64,
    sy: i64,
    dx2: i64,
    dy2: i64,
    err: i64,
    x_major: bool,
    remaining: usize,
}

impl Line {
    pub fn new(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        let dx = (x1 - x0).abs();
        let dy = (y1 - y0).abs();
        let x_major = dx > dy;
        Self {
            x: x0,
            y: y0,
            x1,
            y1,
            sx: if x0 < x1 { 1 } else { -1 },
            sy: if y0 < y1 { 1 } else { -1 },
            dx2: 2 * dx,
            dy2: 2 * dy,
            err: if x_major { dx } else { dy },
            x_major,
            remaining: dx.max(dy) as usize + 1,
        }
    }
}

impl Iterator for Line {
    type Item = Cell;

    fn next(&mut self) -> Option<Cell> {
        match self.remaining {
            0 => None,
            1 => {
                self.remaining = 0;
                Some((self.x1, self.y1))
            }
            _ => {
                self.remaining -= 1;
                let cell = (self.x, self.y);
                if self.x_major {
                    self.err -= self.dy2;
                    if self.err < 0 {
                        self.y += self.sy;
                        self.err += self.dx2;
                    }
                    self.x += self.sx;
                } else {
                    self.err -= self.dx2;
                    if self.err < 0 {
                        self.x += self.sx;
                        self.err += self.dy2;
                    }
                    self.y += self.sy;
                }
                Some(cell)
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Line {}

/// Cells on the straight path from `(x0, y0)` to `(x1, y1)`
pub fn rasterize(x0: i64, y0: i64, x1: i64, y1: i64) -> Vec<Cell> {
    Line::new(x0, y0, x1, y1).collect()
}
