//! Renderer: the deterministic rasterizer.
//!
//! Maps a frame `Snapshot` onto a fixed-size character grid through the
//! snapshot's viewport. The renderer is pure and stateless: the same snapshot
//! and grid size always give the same cells. It knows nothing about steps,
//! timers or playback.

use crate::frame::{Snapshot, Viewport};
use crate::types::{Circle, Element, Path, Point, Rect};

const FILL: char = '█';
const DOT: char = '•';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    /// `None` is the terminal's default foreground.
    pub fg: Option<Rgb>,
}

impl Default for Cell {
    fn default() -> Self {
        Cell { ch: ' ', fg: None }
    }
}

pub type Grid = Vec<Vec<Cell>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellChange {
    pub x: u16,
    pub y: u16,
    pub cell: Cell,
}

pub struct Renderer;

impl Renderer {
    pub fn blank(width: u16, height: u16) -> Grid {
        vec![vec![Cell::default(); width as usize]; height as usize]
    }

    /// Rasterize a snapshot onto a `width` x `height` grid.
    ///
    /// Elements are painted in ascending `z` so higher values paint over
    /// lower ones. A degenerate viewport yields a blank grid.
    pub fn rasterize(snapshot: &Snapshot, width: u16, height: u16) -> Grid {
        let mut canvas = Canvas {
            grid: Self::blank(width, height),
            proj: Projection::new(&snapshot.viewport, width, height),
        };
        if !canvas.proj.is_valid() {
            return canvas.grid;
        }

        for elem in snapshot.draw_order() {
            let fg = elem.color().and_then(parse_color);
            match elem {
                Element::Rect(rect) => canvas.rect(rect, fg),
                Element::Circle(circle) => canvas.circle(circle, fg),
                Element::Path(path) => canvas.path(path, fg),
                Element::Camera(_) => {}
            }
        }
        canvas.grid
    }

    /// Cell-level diff between two grids of the same size.
    pub fn diff(prev: &[Vec<Cell>], next: &[Vec<Cell>]) -> Vec<CellChange> {
        let mut changes = Vec::new();
        for (y, (prev_row, next_row)) in prev.iter().zip(next.iter()).enumerate() {
            for (x, (prev_cell, next_cell)) in prev_row.iter().zip(next_row.iter()).enumerate() {
                if prev_cell != next_cell {
                    changes.push(CellChange {
                        x: x as u16,
                        y: y as u16,
                        cell: next_cell.clone(),
                    });
                }
            }
        }
        changes
    }
}

/// `#rrggbb` or `#rgb`. Anything else has no colour.
pub fn parse_color(s: &str) -> Option<Rgb> {
    let hex = s.trim().strip_prefix('#')?;
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(hex.get(range)?, 16).ok();
    match hex.len() {
        6 => Some(Rgb {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        }),
        3 => {
            let short = |i: usize| channel(i..i + 1).map(|v| v * 17);
            Some(Rgb {
                r: short(0)?,
                g: short(1)?,
                b: short(2)?,
            })
        }
        _ => None,
    }
}

/// World to grid coordinates. Cell `(c, r)` covers `[c, c + 1) x [r, r + 1)`
/// in grid space.
struct Projection {
    origin: Point,
    size: Point,
    cols: f64,
    rows: f64,
}

impl Projection {
    fn new(view: &Viewport, width: u16, height: u16) -> Self {
        Projection {
            origin: Point::new(view.x, view.y),
            size: Point::new(view.w, view.h),
            cols: f64::from(width),
            rows: f64::from(height),
        }
    }

    fn is_valid(&self) -> bool {
        self.size.x > 0.0 && self.size.y > 0.0 && self.size.x.is_finite() && self.size.y.is_finite()
    }

    fn col(&self, x: f64) -> f64 {
        (x - self.origin.x) * self.cols / self.size.x
    }

    fn row(&self, y: f64) -> f64 {
        (y - self.origin.y) * self.rows / self.size.y
    }

    /// World coordinates of a cell centre.
    fn world(&self, col: i64, row: i64) -> Point {
        Point::new(
            self.origin.x + (col as f64 + 0.5) * self.size.x / self.cols,
            self.origin.y + (row as f64 + 0.5) * self.size.y / self.rows,
        )
    }

    fn cell(&self, p: &Point) -> (i64, i64) {
        (self.col(p.x).floor() as i64, self.row(p.y).floor() as i64)
    }
}

struct Canvas {
    grid: Grid,
    proj: Projection,
}

impl Canvas {
    fn put(&mut self, col: i64, row: i64, ch: char, fg: Option<Rgb>) {
        if col < 0 || row < 0 {
            return;
        }
        if let Some(cell) = self
            .grid
            .get_mut(row as usize)
            .and_then(|r| r.get_mut(col as usize))
        {
            *cell = Cell { ch, fg };
        }
    }

    /// Span of cells `[lo, hi]` covered by the world interval `[a, b]`.
    fn span(lo: f64, hi: f64) -> (i64, i64) {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        let first = lo.floor() as i64;
        let last = ((hi - 1e-9).ceil() as i64 - 1).max(first);
        (first, last)
    }

    /// Clamp a span to the visible columns (`rows == false`) or rows, keeping
    /// one cell of margin on each side.
    fn clip(&self, (first, last): (i64, i64), rows: bool) -> (i64, i64) {
        let len = if rows {
            self.grid.len()
        } else {
            self.grid.first().map_or(0, Vec::len)
        };
        (first.max(-1), last.min(len as i64))
    }

    fn rect(&mut self, rect: &Rect, fg: Option<Rgb>) {
        let (c0, c1) = Self::span(self.proj.col(rect.x), self.proj.col(rect.x + rect.w));
        let (r0, r1) = Self::span(self.proj.row(rect.y), self.proj.row(rect.y + rect.h));
        let (vc0, vc1) = self.clip((c0, c1), false);
        let (vr0, vr1) = self.clip((r0, r1), true);

        if c0 == c1 || r0 == r1 {
            for row in vr0..=vr1 {
                for col in vc0..=vc1 {
                    self.put(col, row, FILL, fg);
                }
            }
            return;
        }

        for col in (c0 + 1).max(vc0)..c1.min(vc1 + 1) {
            self.put(col, r0, '─', fg);
            self.put(col, r1, '─', fg);
        }
        for row in (r0 + 1).max(vr0)..r1.min(vr1 + 1) {
            self.put(c0, row, '│', fg);
            self.put(c1, row, '│', fg);
        }
        self.put(c0, r0, '┌', fg);
        self.put(c1, r0, '┐', fg);
        self.put(c0, r1, '└', fg);
        self.put(c1, r1, '┘', fg);
    }

    fn circle(&mut self, circle: &Circle, fg: Option<Rgb>) {
        let r = circle.r.abs();
        let (c0, c1) = Self::span(self.proj.col(circle.x - r), self.proj.col(circle.x + r));
        let (r0, r1) = Self::span(self.proj.row(circle.y - r), self.proj.row(circle.y + r));
        let (c0, c1) = self.clip((c0, c1), false);
        let (r0, r1) = self.clip((r0, r1), true);

        let mut painted = false;
        for row in r0..=r1 {
            for col in c0..=c1 {
                let p = self.proj.world(col, row);
                let (dx, dy) = (p.x - circle.x, p.y - circle.y);
                if dx * dx + dy * dy <= r * r {
                    self.put(col, row, FILL, fg);
                    painted = true;
                }
            }
        }
        // smaller than a cell
        if !painted {
            let (col, row) = self.proj.cell(&Point::new(circle.x, circle.y));
            self.put(col, row, DOT, fg);
        }
    }

    fn path(&mut self, path: &Path, fg: Option<Rgb>) {
        let cells: Vec<(i64, i64)> = path.points.iter().map(|p| self.proj.cell(p)).collect();
        match cells.as_slice() {
            [] => {}
            [(col, row)] => self.put(*col, *row, DOT, fg),
            _ => {
                for pair in cells.windows(2) {
                    self.line(pair[0], pair[1], fg);
                }
            }
        }
    }

    /// Bresenham line between two cells, both ends included.
    fn line(&mut self, from: (i64, i64), to: (i64, i64), fg: Option<Rgb>) {
        let (mut x, mut y) = from;
        let dx = (to.0 - x).abs();
        let dy = -(to.1 - y).abs();
        let sx = if x < to.0 { 1 } else { -1 };
        let sy = if y < to.1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.put(x, y, DOT, fg);
            if (x, y) == to {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }
}
