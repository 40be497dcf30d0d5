use crate::canvas::{Canvas, PixelCanvas, Rgb};
use crossterm::{
    cursor, execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{
        self, BeginSynchronizedUpdate, Clear, ClearType, DisableLineWrap, EnableLineWrap,
        EndSynchronizedUpdate, EnterAlternateScreen, LeaveAlternateScreen,
    },
};
use std::io::{self, Write};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Cell {
    pub(crate) ch: char,
    pub(crate) fg: Color,
    pub(crate) bg: Color,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            fg: Color::Black,
            bg: Color::Black,
        }
    }
}

pub(crate) struct CellBuffer {
    pub(crate) w: u16,
    pub(crate) h: u16,
    pub(crate) cells: Vec<Cell>,
}

impl CellBuffer {
    pub(crate) fn new(w: u16, h: u16) -> Self {
        Self {
            w,
            h,
            cells: vec![Cell::default(); (w as usize) * (h as usize)],
        }
    }
    pub(crate) fn idx(&self, x: u16, y: u16) -> usize {
        (y as usize) * (self.w as usize) + (x as usize)
    }
    pub(crate) fn set(&mut self, x: u16, y: u16, c: Cell) {
        if x < self.w && y < self.h {
            let i = self.idx(x, y);
            self.cells[i] = c;
        }
    }
}

fn to_color(c: Rgb) -> Color {
    Color::Rgb {
        r: c.r,
        g: c.g,
        b: c.b,
    }
}

/// Half-block encoding: every cell shows two stacked canvas pixels, the
/// upper one as `▀` foreground and the lower one as background. The canvas
/// is sampled nearest-neighbour onto whatever cell grid is available.
pub(crate) fn canvas_to_cells(canvas: &PixelCanvas, out: &mut CellBuffer) {
    let cols = out.w as u32;
    let sub_rows = out.h as u32 * 2;
    if cols == 0 || sub_rows == 0 {
        return;
    }
    for cy in 0..out.h as u32 {
        for cx in 0..cols {
            let px = cx * canvas.w / cols;
            let top = canvas.get(px, (cy * 2) * canvas.h / sub_rows);
            let bottom = canvas.get(px, (cy * 2 + 1) * canvas.h / sub_rows);
            let cell = if top == bottom {
                Cell {
                    ch: ' ',
                    fg: to_color(top),
                    bg: to_color(top),
                }
            } else {
                Cell {
                    ch: '▀',
                    fg: to_color(top),
                    bg: to_color(bottom),
                }
            };
            out.set(cx as u16, cy as u16, cell);
        }
    }
}

/// Terminal size in half-block pixels.
pub(crate) fn pixel_size() -> anyhow::Result<(u32, u32)> {
    let (cols, rows) = terminal::size()?;
    Ok((cols as u32, rows as u32 * 2))
}

/// Alternate-screen canvas. Drawing goes to an off-screen pixel canvas;
/// `present` diffs the half-block cells against the previous frame.
pub(crate) struct Terminal {
    out: io::Stdout,
    cols: u16,
    rows: u16,
    prev: CellBuffer,
    cur: CellBuffer,
    canvas: PixelCanvas,
    active: bool,
}

impl Terminal {
    pub(crate) fn begin(width: u32, height: u32) -> anyhow::Result<Self> {
        let mut out = io::stdout();
        execute!(
            out,
            EnterAlternateScreen,
            cursor::Hide,
            DisableLineWrap,
            terminal::Clear(ClearType::All)
        )?;
        terminal::enable_raw_mode()?;
        tracing::info!("terminal raw mode enabled");

        let (cols, rows) = terminal::size()?;
        Ok(Self {
            out,
            cols,
            rows,
            prev: CellBuffer::new(cols, rows),
            cur: CellBuffer::new(cols, rows),
            canvas: PixelCanvas::new(width, height),
            active: true,
        })
    }

    pub(crate) fn end(&mut self) -> anyhow::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        queue!(
            self.out,
            BeginSynchronizedUpdate,
            ResetColor,
            Clear(ClearType::All),
            cursor::Show,
            EnableLineWrap,
            EndSynchronizedUpdate,
            LeaveAlternateScreen
        )?;
        self.out.flush()?;
        terminal::disable_raw_mode()?;
        tracing::info!("terminal restored");
        Ok(())
    }

    fn resize_if_needed(&mut self) -> anyhow::Result<bool> {
        let (c, r) = terminal::size()?;
        if c == self.cols && r == self.rows {
            return Ok(false);
        }
        tracing::debug!(cols = c, rows = r, "terminal resized");
        self.cols = c;
        self.rows = r;
        self.prev = CellBuffer::new(c, r);
        self.cur = CellBuffer::new(c, r);
        queue!(self.out, Clear(ClearType::All))?;
        Ok(true)
    }
}

impl Canvas for Terminal {
    fn size(&self) -> (u32, u32) {
        self.canvas.size()
    }

    fn clear(&mut self, color: Rgb) {
        self.canvas.clear(color);
    }

    fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: Rgb) {
        self.canvas.fill_rect(x, y, w, h, color);
    }

    fn fill_rect_rgba(&mut self, x: i32, y: i32, w: u32, h: u32, color: Rgb, alpha: u8) {
        self.canvas.fill_rect_rgba(x, y, w, h, color, alpha);
    }

    fn present(&mut self) -> anyhow::Result<()> {
        let resized = self.resize_if_needed()?;
        canvas_to_cells(&self.canvas, &mut self.cur);

        queue!(self.out, BeginSynchronizedUpdate)?;
        let mut last_fg = None;
        let mut last_bg = None;
        for y in 0..self.rows {
            for x in 0..self.cols {
                let i = self.cur.idx(x, y);
                let c = self.cur.cells[i];
                if !resized && c == self.prev.cells[i] {
                    continue;
                }
                queue!(self.out, cursor::MoveTo(x, y))?;
                if last_fg != Some(c.fg) {
                    queue!(self.out, SetForegroundColor(c.fg))?;
                    last_fg = Some(c.fg);
                }
                if last_bg != Some(c.bg) {
                    queue!(self.out, SetBackgroundColor(c.bg))?;
                    last_bg = Some(c.bg);
                }
                queue!(self.out, Print(c.ch))?;
            }
        }
        queue!(self.out, ResetColor, EndSynchronizedUpdate)?;
        self.out.flush()?;
        self.prev.cells.copy_from_slice(&self.cur.cells);
        Ok(())
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if let Err(e) = self.end() {
            tracing::warn!(error = %e, "terminal restore failed");
        }
    }
}
