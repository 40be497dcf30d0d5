#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Rgb {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
}

impl Rgb {
    pub(crate) const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
    pub(crate) const WHITE: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };

    pub(crate) const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Drawing surface the frame driver renders into.
///
/// Coordinates are canvas pixels; rectangles may hang off any edge and are
/// clipped by the implementation.
pub(crate) trait Canvas {
    fn size(&self) -> (u32, u32);
    fn clear(&mut self, color: Rgb);
    fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: Rgb);
    fn fill_rect_rgba(&mut self, x: i32, y: i32, w: u32, h: u32, color: Rgb, alpha: u8);
    fn present(&mut self) -> anyhow::Result<()>;
}

pub(crate) struct PixelCanvas {
    pub(crate) w: u32,
    pub(crate) h: u32,
    pub(crate) px: Vec<Rgb>,
}

impl PixelCanvas {
    pub(crate) fn new(w: u32, h: u32) -> Self {
        Self {
            w,
            h,
            px: vec![Rgb::BLACK; (w as usize) * (h as usize)],
        }
    }

    pub(crate) fn idx(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.w as usize) + (x as usize)
    }

    pub(crate) fn get(&self, x: u32, y: u32) -> Rgb {
        if x >= self.w || y >= self.h {
            return Rgb::BLACK;
        }
        self.px[self.idx(x, y)]
    }

    /// Clip a rectangle to the canvas, returning pixel ranges.
    fn clip(&self, x: i32, y: i32, w: u32, h: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = (x as i64).max(0);
        let y0 = (y as i64).max(0);
        let x1 = (x as i64 + w as i64).min(self.w as i64);
        let y1 = (y as i64 + h as i64).min(self.h as i64);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }

    fn blend_over(&mut self, x: u32, y: u32, src: Rgb, alpha: u8) {
        let i = self.idx(x, y);
        let dst = self.px[i];
        let sa = alpha as f32 / 255.0;
        let blend = |sc: u8, dc: u8| -> u8 {
            let out = sc as f32 * sa + dc as f32 * (1.0 - sa);
            (out.clamp(0.0, 255.0) + 0.5) as u8
        };
        self.px[i] = Rgb {
            r: blend(src.r, dst.r),
            g: blend(src.g, dst.g),
            b: blend(src.b, dst.b),
        };
    }
}

impl Canvas for PixelCanvas {
    fn size(&self) -> (u32, u32) {
        (self.w, self.h)
    }

    fn clear(&mut self, color: Rgb) {
        self.px.fill(color);
    }

    fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: Rgb) {
        let Some((x0, y0, x1, y1)) = self.clip(x, y, w, h) else {
            return;
        };
        for yy in y0..y1 {
            let row = self.idx(x0, yy);
            self.px[row..row + (x1 - x0) as usize].fill(color);
        }
    }

    fn fill_rect_rgba(&mut self, x: i32, y: i32, w: u32, h: u32, color: Rgb, alpha: u8) {
        if alpha == 0 {
            return;
        }
        let Some((x0, y0, x1, y1)) = self.clip(x, y, w, h) else {
            return;
        };
        for yy in y0..y1 {
            for xx in x0..x1 {
                self.blend_over(xx, yy, color, alpha);
            }
        }
    }

    fn present(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Headless canvas that keeps the pixels and counts presented frames.
#[cfg(test)]
pub(crate) struct RecordingCanvas {
    pub(crate) pixels: PixelCanvas,
    pub(crate) presented: usize,
    pub(crate) flashes: usize,
}

#[cfg(test)]
impl RecordingCanvas {
    pub(crate) fn new(w: u32, h: u32) -> Self {
        Self {
            pixels: PixelCanvas::new(w, h),
            presented: 0,
            flashes: 0,
        }
    }
}

#[cfg(test)]
impl Canvas for RecordingCanvas {
    fn size(&self) -> (u32, u32) {
        self.pixels.size()
    }
    fn clear(&mut self, color: Rgb) {
        if color == Rgb::WHITE {
            self.flashes += 1;
        }
        self.pixels.clear(color);
    }
    fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: Rgb) {
        self.pixels.fill_rect(x, y, w, h, color);
    }
    fn fill_rect_rgba(&mut self, x: i32, y: i32, w: u32, h: u32, color: Rgb, alpha: u8) {
        self.pixels.fill_rect_rgba(x, y, w, h, color, alpha);
    }
    fn present(&mut self) -> anyhow::Result<()> {
        self.presented += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_rect_clips_to_canvas() {
        let mut c = PixelCanvas::new(4, 4);
        c.fill_rect(-2, 3, 4, 4, Rgb::WHITE);
        assert_eq!(c.get(0, 3), Rgb::WHITE);
        assert_eq!(c.get(1, 3), Rgb::WHITE);
        assert_eq!(c.get(2, 3), Rgb::BLACK);
        assert_eq!(c.get(0, 2), Rgb::BLACK);
    }

    #[test]
    fn fully_offscreen_rect_is_ignored() {
        let mut c = PixelCanvas::new(4, 4);
        c.fill_rect(10, 10, 3, 3, Rgb::WHITE);
        c.fill_rect(-5, 0, 2, 2, Rgb::WHITE);
        assert!(c.px.iter().all(|p| *p == Rgb::BLACK));
    }

    #[test]
    fn rgba_blends_over_background() {
        let mut c = PixelCanvas::new(2, 2);
        c.fill_rect_rgba(0, 0, 1, 1, Rgb::new(200, 100, 0), 128);
        let p = c.get(0, 0);
        assert_eq!(p, Rgb::new(100, 50, 0));

        c.fill_rect_rgba(1, 1, 1, 1, Rgb::WHITE, 0);
        assert_eq!(c.get(1, 1), Rgb::BLACK);
    }
}
