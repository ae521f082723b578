//! Vector primitives drawn through [Canvas::plot], so they honour rotation and clip silently.
use core::{
    cmp::{max, min},
    mem::swap,
};

use bitflags::bitflags;

use embedded_graphics::prelude::OriginDimensions;

use crate::canvas::Canvas;

bitflags! {
    /// Selects which quarter arcs [Canvas::draw_circle_quadrants] draws.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Corners: u8 {
        const TOP_LEFT = 0b0001;
        const TOP_RIGHT = 0b0010;
        const BOTTOM_RIGHT = 0b0100;
        const BOTTOM_LEFT = 0b1000;
    }
}

impl<B> Canvas<B>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    // Coordinates are widened to i64 internally so that extreme inputs clip instead of
    // overflowing.

    fn logical_bounds(&self) -> (i64, i64) {
        let size = self.size();
        (size.width as i64, size.height as i64)
    }

    fn plot_wide(&mut self, x: i64, y: i64, colored: bool) {
        if let (Ok(x), Ok(y)) = (i32::try_from(x), i32::try_from(y)) {
            self.plot(x, y, colored);
        }
    }

    /// Plots `width` pixels rightwards from (x, y), skipping those off the canvas.
    fn span_wide(&mut self, x: i64, y: i64, width: i64, colored: bool) {
        let (bound_x, bound_y) = self.logical_bounds();
        if y < 0 || y >= bound_y {
            return;
        }
        for i in x.max(0)..x.saturating_add(width).min(bound_x) {
            self.plot_wide(i, y, colored);
        }
    }

    /// Plots `height` pixels downwards from (x, y), skipping those off the canvas.
    fn column_wide(&mut self, x: i64, y: i64, height: i64, colored: bool) {
        let (bound_x, bound_y) = self.logical_bounds();
        if x < 0 || x >= bound_x {
            return;
        }
        for i in y.max(0)..y.saturating_add(height).min(bound_y) {
            self.plot_wide(x, i, colored);
        }
    }

    /// Draws a line from (x0, y0) to (x1, y1), both ends included.
    ///
    /// Steps one pixel at a time along the major axis and rounds the minor axis, which is the
    /// pixel set Bresenham produces. Only the steps whose major coordinate is on the canvas are
    /// visited.
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, colored: bool) {
        let (x0, y0, x1, y1) = (x0 as i64, y0 as i64, x1 as i64, y1 as i64);
        let (bound_x, bound_y) = self.logical_bounds();
        let (dx, dy) = (x1 - x0, y1 - y0);

        if dx.abs() >= dy.abs() {
            for (x, y) in line_steps(x0, y0, dx, dy, bound_x) {
                self.plot_wide(x, y, colored);
            }
        } else {
            for (y, x) in line_steps(y0, x0, dy, dx, bound_y) {
                self.plot_wide(x, y, colored);
            }
        }
    }

    /// Draws `width` pixels to the right of (x, y), starting at x.
    pub fn draw_horizontal_line(&mut self, x: i32, y: i32, width: i32, colored: bool) {
        self.span_wide(x as i64, y as i64, width as i64, colored);
    }

    /// Draws `height` pixels downwards from (x, y), starting at y.
    pub fn draw_vertical_line(&mut self, x: i32, y: i32, height: i32, colored: bool) {
        self.column_wide(x as i64, y as i64, height as i64, colored);
    }

    /// Draws the outline of the rectangle spanned by two opposite corners, both included.
    pub fn draw_rectangle(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, colored: bool) {
        let (min_x, max_x) = (min(x0, x1) as i64, max(x0, x1) as i64);
        let (min_y, max_y) = (min(y0, y1) as i64, max(y0, y1) as i64);

        self.span_wide(min_x, min_y, max_x - min_x + 1, colored);
        self.span_wide(min_x, max_y, max_x - min_x + 1, colored);
        self.column_wide(min_x, min_y, max_y - min_y + 1, colored);
        self.column_wide(max_x, min_y, max_y - min_y + 1, colored);
    }

    /// Fills the rectangle spanned by two opposite corners, both included.
    pub fn draw_filled_rectangle(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, colored: bool) {
        let (min_x, max_x) = (min(x0, x1) as i64, max(x0, x1) as i64);
        let (min_y, max_y) = (min(y0, y1) as i64, max(y0, y1) as i64);
        let (_, bound_y) = self.logical_bounds();

        for y in min_y.max(0)..=max_y.min(bound_y - 1) {
            self.span_wide(min_x, y, max_x - min_x + 1, colored);
        }
    }

    /// Draws a circle outline centred on (x, y).
    pub fn draw_circle(&mut self, x: i32, y: i32, radius: i32, colored: bool) {
        self.circle_impl(x as i64, y as i64, radius as i64, colored, false);
    }

    /// Draws a filled circle centred on (x, y).
    pub fn draw_filled_circle(&mut self, x: i32, y: i32, radius: i32, colored: bool) {
        self.circle_impl(x as i64, y as i64, radius as i64, colored, true);
    }

    /// Whether a circle's bounding box misses the canvas entirely.
    fn circle_off_canvas(&self, x: i64, y: i64, radius: i64) -> bool {
        let (bound_x, bound_y) = self.logical_bounds();
        x + radius < 0 || y + radius < 0 || x - radius >= bound_x || y - radius >= bound_y
    }

    fn circle_impl(&mut self, x: i64, y: i64, radius: i64, colored: bool, filled: bool) {
        if radius < 0 || self.circle_off_canvas(x, y, radius) {
            return;
        }
        // Bresenham, walking one quadrant from (-r, 0) and mirroring it into the other three.
        let mut x_pos = -radius;
        let mut y_pos = 0;
        let mut err = 2 - 2 * radius;

        loop {
            self.plot_wide(x - x_pos, y + y_pos, colored);
            self.plot_wide(x + x_pos, y + y_pos, colored);
            self.plot_wide(x + x_pos, y - y_pos, colored);
            self.plot_wide(x - x_pos, y - y_pos, colored);
            if filled {
                self.span_wide(x + x_pos, y + y_pos, 2 * -x_pos + 1, colored);
                self.span_wide(x + x_pos, y - y_pos, 2 * -x_pos + 1, colored);
            }

            let mut e2 = err;
            if e2 <= y_pos {
                y_pos += 1;
                err += y_pos * 2 + 1;
                if -x_pos == y_pos && e2 <= x_pos {
                    e2 = 0;
                }
            }
            if e2 > x_pos {
                x_pos += 1;
                err += x_pos * 2 + 1;
            }
            if x_pos > 0 {
                break;
            }
        }
    }

    /// Draws the quarter arcs of a circle selected by `corners`.
    pub fn draw_circle_quadrants(
        &mut self,
        x0: i32,
        y0: i32,
        radius: i32,
        corners: Corners,
        colored: bool,
    ) {
        self.quadrants_wide(x0 as i64, y0 as i64, radius as i64, corners, colored);
    }

    fn quadrants_wide(&mut self, x0: i64, y0: i64, radius: i64, corners: Corners, colored: bool) {
        if self.circle_off_canvas(x0, y0, radius) {
            return;
        }
        // Midpoint circle, one octant per iteration mirrored into the selected quadrants.
        let mut f = 1 - radius;
        let mut dd_f_x = 1;
        let mut dd_f_y = -2 * radius;
        let mut x = 0;
        let mut y = radius;

        while x < y {
            if f >= 0 {
                y -= 1;
                dd_f_y += 2;
                f += dd_f_y;
            }
            x += 1;
            dd_f_x += 2;
            f += dd_f_x;

            if corners.contains(Corners::BOTTOM_RIGHT) {
                self.plot_wide(x0 + x, y0 + y, colored);
                self.plot_wide(x0 + y, y0 + x, colored);
            }
            if corners.contains(Corners::TOP_RIGHT) {
                self.plot_wide(x0 + x, y0 - y, colored);
                self.plot_wide(x0 + y, y0 - x, colored);
            }
            if corners.contains(Corners::BOTTOM_LEFT) {
                self.plot_wide(x0 - y, y0 + x, colored);
                self.plot_wide(x0 - x, y0 + y, colored);
            }
            if corners.contains(Corners::TOP_LEFT) {
                self.plot_wide(x0 - y, y0 - x, colored);
                self.plot_wide(x0 - x, y0 - y, colored);
            }
        }
    }

    /// Draws the outline of a `width` x `height` rectangle at (x, y) with corners rounded to
    /// `radius`. The radius is capped at half the shorter side.
    pub fn draw_round_rect(
        &mut self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        radius: i32,
        colored: bool,
    ) {
        if width <= 0 || height <= 0 {
            return;
        }
        let r = radius.clamp(0, min(width, height) / 2) as i64;
        let (x, y, width, height) = (x as i64, y as i64, width as i64, height as i64);

        self.span_wide(x + r, y, width - 2 * r, colored);
        self.span_wide(x + r, y + height - 1, width - 2 * r, colored);
        self.column_wide(x, y + r, height - 2 * r, colored);
        self.column_wide(x + width - 1, y + r, height - 2 * r, colored);

        self.quadrants_wide(x + r, y + r, r, Corners::TOP_LEFT, colored);
        self.quadrants_wide(x + width - r - 1, y + r, r, Corners::TOP_RIGHT, colored);
        self.quadrants_wide(
            x + width - r - 1,
            y + height - r - 1,
            r,
            Corners::BOTTOM_RIGHT,
            colored,
        );
        self.quadrants_wide(x + r, y + height - r - 1, r, Corners::BOTTOM_LEFT, colored);
    }

    /// Draws the outline of a triangle.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_triangle(
        &mut self,
        x0: i32,
        y0: i32,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        colored: bool,
    ) {
        self.draw_line(x0, y0, x1, y1, colored);
        self.draw_line(x1, y1, x2, y2, colored);
        self.draw_line(x2, y2, x0, y0, colored);
    }

    /// Fills a triangle by scan converting it one horizontal span per row.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_filled_triangle(
        &mut self,
        x0: i32,
        y0: i32,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        colored: bool,
    ) {
        let (mut x0, mut y0) = (x0 as i64, y0 as i64);
        let (mut x1, mut y1) = (x1 as i64, y1 as i64);
        let (mut x2, mut y2) = (x2 as i64, y2 as i64);

        // Sort so that y0 <= y1 <= y2.
        if y0 > y1 {
            swap(&mut y0, &mut y1);
            swap(&mut x0, &mut x1);
        }
        if y1 > y2 {
            swap(&mut y2, &mut y1);
            swap(&mut x2, &mut x1);
        }
        if y0 > y1 {
            swap(&mut y0, &mut y1);
            swap(&mut x0, &mut x1);
        }

        if y0 == y2 {
            // All on one row.
            let a = min(x0, min(x1, x2));
            let b = max(x0, max(x1, x2));
            self.span_wide(a, y0, b - a + 1, colored);
            return;
        }

        // x of the edge from (x, y) with slope dx/dy, `steps` rows further down. The product can
        // exceed i64 for extreme inputs, the quotient can't.
        let edge = |x: i64, dx: i64, dy: i64, steps: i64| {
            x + ((dx as i128 * steps as i128) / dy as i128) as i64
        };
        let (_, bound_y) = self.logical_bounds();

        // The upper part runs from y0 to y1 - 1, or to y1 inclusive if the lower edge is flat, in
        // which case the lower part is empty.
        let last = if y1 == y2 { y1 } else { y1 - 1 };

        for y in y0.max(0)..=last.min(bound_y - 1) {
            let a = edge(x0, x1 - x0, y1 - y0, y - y0);
            let b = edge(x0, x2 - x0, y2 - y0, y - y0);
            self.span_wide(min(a, b), y, (a - b).abs() + 1, colored);
        }
        for y in (last + 1).max(0)..=y2.min(bound_y - 1) {
            let a = edge(x1, x2 - x1, y2 - y1, y - y1);
            let b = edge(x0, x2 - x0, y2 - y0, y - y0);
            self.span_wide(min(a, b), y, (a - b).abs() + 1, colored);
        }
    }
}

/// The points of a line as (major, minor) pairs, starting at (`major`, `minor`) and moving
/// `d_major` along the major axis, restricted to major coordinates in `0..bound`.
fn line_steps(
    major: i64,
    minor: i64,
    d_major: i64,
    d_minor: i64,
    bound: i64,
) -> impl Iterator<Item = (i64, i64)> {
    let steps = d_major.abs();
    let major_step = d_major.signum();
    let minor_step = d_minor.signum();
    let rise = d_minor.abs() as i128;

    let (first, last) = if major_step >= 0 {
        ((-major).max(0), steps.min(bound - 1 - major))
    } else {
        ((major - (bound - 1)).max(0), steps.min(major))
    };
    (first..=last).map(move |t| {
        let offset = if steps == 0 {
            0
        } else {
            // round(rise * t / steps), halves rounding up.
            ((2 * rise * t as i128 + steps as i128) / (2 * steps as i128)) as i64
        };
        (major + major_step * t, minor + minor_step * offset)
    })
}
