//! Board renderer.
//!
//! Draw order for one full redraw:
//! 1. resize + background
//! 2. board view: every slave's pixels, then borders and `S<id>` labels,
//!    grid, board stats; single view: that slave's pixels and its grid
//! 3. selection highlight with the picked cell's ids
//! 4. HUD
//!
//! Pixel placement always goes through `MappingTable::resolve`, so unmapped
//! cells use the slave's default id order.

use crate::core::color::ColorPolicy;
use crate::core::player::FrameView;
use crate::core::session::{Board, ViewMode};

use super::canvas::{Canvas, Rect, Rgba, TextAlign};
use super::pick::{self, Hit};

pub const DEFAULT_CELL: f32 = 12.0;
const FONT_SIZE: f32 = 10.0;

const BACKGROUND: Rgba = Rgba::opaque(0x0f, 0x14, 0x19);
const GRID: Rgba = Rgba::new(255, 255, 255, 31);
const SLAVE_BORDER: Rgba = Rgba::new(99, 179, 237, 179);
const LABEL: Rgba = Rgba::new(255, 255, 255, 230);
const SELECTION: Rgba = Rgba::new(245, 158, 11, 242);
const PICK_PANEL: Rgba = Rgba::new(0, 0, 0, 179);
const PANEL: Rgba = Rgba::new(0, 0, 0, 166);
const HUD_TEXT: Rgba = Rgba::new(255, 255, 255, 242);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    /// Logical pixels per LED cell
    pub cell: f32,
    pub dpr: f32,
    pub show_grid: bool,
    pub policy: ColorPolicy,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            cell: DEFAULT_CELL,
            dpr: 1.0,
            show_grid: true,
            policy: ColorPolicy::default(),
        }
    }
}

/// Playback facts shown in the HUD
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HudState {
    pub state: String,
    pub frame: u32,
    pub total_frames: u32,
    pub measured_fps: Option<f64>,
    pub transport: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Renderer {
    pub opts: RenderOptions,
}

impl Renderer {
    pub fn new(opts: RenderOptions) -> Self {
        Self { opts }
    }

    fn cell_rect(&self, gx: i32, gy: i32) -> Rect {
        let c = self.opts.cell;
        Rect::new(gx as f32 * c, gy as f32 * c, c, c)
    }

    /// Size the canvas for the current view; returns the grid in cells
    pub fn resize(&self, canvas: &mut dyn Canvas, board: &Board) -> (u32, u32) {
        let (cols, rows) = match board.view {
            ViewMode::Board => (board.grid_w, board.grid_h),
            ViewMode::Single(id) => board
                .geometry(id)
                .map_or((1, 1), |g| (g.width, g.height)),
        };
        let c = self.opts.cell;
        canvas.resize(
            (cols as f32 * c).ceil() as u32,
            (rows as f32 * c).ceil() as u32,
            self.opts.dpr,
        );
        (cols, rows)
    }

    pub fn draw_background(&self, canvas: &mut dyn Canvas) {
        let (w, h) = canvas.size();
        canvas.fill_rect(Rect::new(0.0, 0.0, w as f32, h as f32), BACKGROUND);
    }

    /// Pixels of one slave with its origin at board cell `(ox, oy)`
    fn draw_slave_pixels(&self, canvas: &mut dyn Canvas, board: &Board, view: &FrameView, id: i32, ox: i32, oy: i32) {
        let (Some(buf), Some(g)) = (view.buffer(id), board.geometry(id)) else {
            return;
        };
        for y in 0..g.height {
            for x in 0..g.width {
                let Some(entry) = board.mapping.resolve(id, x, y) else {
                    continue;
                };
                if let Some(color) = self.opts.policy.pixel_at(buf, entry.pxld_id) {
                    canvas.fill_rect(self.cell_rect(ox + x as i32, oy + y as i32), color.into());
                }
            }
        }
    }

    pub fn draw_board(&self, canvas: &mut dyn Canvas, board: &Board, view: &FrameView) {
        for slave in board.slaves() {
            let p = board.placement(slave.id);
            self.draw_slave_pixels(canvas, board, view, slave.id, p.ox, p.oy);
        }
        let c = self.opts.cell;
        for slave in board.slaves() {
            let Some(g) = board.geometry(slave.id) else {
                continue;
            };
            let p = board.placement(slave.id);
            let (x, y) = (p.ox as f32 * c, p.oy as f32 * c);
            canvas.stroke_rect(
                Rect::new(x + 0.5, y + 0.5, g.width as f32 * c, g.height as f32 * c),
                1.0,
                SLAVE_BORDER,
            );
            canvas.text(x + 3.0, y + 12.0, &format!("S{}", slave.id), FONT_SIZE, LABEL, TextAlign::Left);
        }
    }

    pub fn draw_single_slave(&self, canvas: &mut dyn Canvas, board: &Board, view: &FrameView, id: i32) {
        self.draw_slave_pixels(canvas, board, view, id, 0, 0);
    }

    pub fn draw_grid(&self, canvas: &mut dyn Canvas, cols: u32, rows: u32) {
        if !self.opts.show_grid {
            return;
        }
        let c = self.opts.cell;
        let (w, h) = (cols as f32 * c, rows as f32 * c);
        for x in 0..=cols {
            let px = x as f32 * c + 0.5;
            canvas.line((px, 0.0), (px, h), 0.5, GRID);
        }
        for y in 0..=rows {
            let py = y as f32 * c + 0.5;
            canvas.line((0.0, py), (w, py), 0.5, GRID);
        }
    }

    /// Active slave count and pixel total, top right
    pub fn draw_board_info(&self, canvas: &mut dyn Canvas, board: &Board, view: &FrameView) {
        let (w, _) = canvas.size();
        let w = w as f32;
        let mut active = 0;
        let mut pixels = 0;
        for s in board.slaves() {
            if let Some(buf) = view.buffer(s.id) {
                active += 1;
                pixels += buf.len() / 4;
            }
        }
        canvas.fill_rect(Rect::new(w - 144.0, 4.0, 140.0, 34.0), PANEL);
        canvas.text(w - 8.0, 18.0, &format!("active slaves: {}", active), FONT_SIZE, HUD_TEXT, TextAlign::Right);
        canvas.text(w - 8.0, 34.0, &format!("total pixels: {}", pixels), FONT_SIZE, HUD_TEXT, TextAlign::Right);
    }

    pub fn draw_selection(&self, canvas: &mut dyn Canvas, board: &Board) {
        let Some((sel, entry)) = board.picked() else {
            return;
        };
        let (gx, gy) = match board.view {
            ViewMode::Board => {
                let p = board.placement(sel.slave_id);
                (p.ox + sel.x as i32, p.oy + sel.y as i32)
            }
            ViewMode::Single(_) => (sel.x as i32, sel.y as i32),
        };
        let r = self.cell_rect(gx, gy);
        canvas.stroke_rect(Rect::new(r.x + 0.5, r.y + 0.5, r.w, r.h), 2.0, SELECTION);
        canvas.fill_rect(Rect::new(r.x + 2.0, r.y + 2.0, 80.0, 30.0), PICK_PANEL);
        canvas.text(r.x + 5.0, r.y + 15.0, &format!("pxld: {}", entry.pxld_id), FONT_SIZE, LABEL, TextAlign::Left);
        canvas.text(r.x + 5.0, r.y + 28.0, &format!("mcu: {}", entry.mcu_id), FONT_SIZE, LABEL, TextAlign::Left);
    }

    pub fn draw_hud(&self, canvas: &mut dyn Canvas, board: &Board, hud: &HudState) {
        let (mode, slave, grid) = match board.view {
            ViewMode::Board => (
                "board".to_string(),
                "all".to_string(),
                format!("{}x{}", board.grid_w, board.grid_h),
            ),
            ViewMode::Single(id) => {
                let (w, h) = board.geometry(id).map_or((1, 1), |g| (g.width, g.height));
                ("slave".to_string(), id.to_string(), format!("{}x{}", w, h))
            }
        };
        let fps = hud
            .measured_fps
            .map_or_else(|| "-".to_string(), |f| format!("{:.1}", f));
        let line1 = format!(
            "mode={} slave={} frame={}/{} {}",
            mode,
            slave,
            hud.frame,
            hud.total_frames.saturating_sub(1),
            hud.state
        );
        let mut line2 = format!(
            "grid={} cell={}px slaves={} fps={}",
            grid,
            self.opts.cell,
            board.slaves().count(),
            fps
        );
        if let Some(t) = &hud.transport {
            line2.push_str(&format!(" via {}", t));
        }

        let height = if hud.status.is_some() { 62.0 } else { 46.0 };
        canvas.fill_rect(Rect::new(4.0, 4.0, 340.0, height), PANEL);
        canvas.text(8.0, 18.0, &line1, FONT_SIZE, HUD_TEXT, TextAlign::Left);
        canvas.text(8.0, 34.0, &line2, FONT_SIZE, HUD_TEXT, TextAlign::Left);
        if let Some(status) = &hud.status {
            canvas.text(8.0, 50.0, status, FONT_SIZE, HUD_TEXT, TextAlign::Left);
        }
    }

    pub fn hit_test(&self, board: &Board, gx: i32, gy: i32) -> Option<Hit> {
        pick::hit_test(board, gx, gy)
    }

    /// Logical pointer position in the current view → hit
    pub fn pick_at(&self, board: &Board, px: f32, py: f32) -> Option<Hit> {
        let (gx, gy) = pick::pointer_to_cell(px, py, self.opts.cell)?;
        pick::pick(board, gx, gy)
    }

    /// Full redraw
    pub fn render(&self, canvas: &mut dyn Canvas, board: &Board, view: &FrameView, hud: &HudState) {
        let (cols, rows) = self.resize(canvas, board);
        self.draw_background(canvas);
        match board.view {
            ViewMode::Board => {
                self.draw_board(canvas, board, view);
                self.draw_grid(canvas, cols, rows);
                self.draw_board_info(canvas, board, view);
            }
            ViewMode::Single(id) => {
                self.draw_single_slave(canvas, board, view, id);
                self.draw_grid(canvas, cols, rows);
            }
        }
        self.draw_selection(canvas, board);
        self.draw_hud(canvas, board, hud);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frame_cache::RgbwBuffer;
    use crate::core::layout::Placement;
    use crate::core::mapping::IdOrder;
    use crate::core::session::{Selection, Slave};
    use crate::render::canvas::{DrawList, DrawOp};

    fn board() -> Board {
        let mut b = Board::new("show.pxld", 10, 6, IdOrder::RowMajor);
        b.set_slaves([Slave { id: 1, pixel_count: 4 }, Slave { id: 2, pixel_count: 2 }]);
        b.layout.set(Placement { slave_id: 1, ox: 1, oy: 1 });
        b.layout.set(Placement { slave_id: 2, ox: 1, oy: 3 });
        b
    }

    fn view_with(buffers: &[(i32, &[u8])]) -> FrameView {
        FrameView::with_buffers(0, buffers.iter().map(|(id, b)| (*id, RgbwBuffer::from(*b))))
    }

    fn renderer() -> Renderer {
        Renderer::new(RenderOptions {
            cell: 10.0,
            policy: ColorPolicy::ignore_white(),
            ..RenderOptions::default()
        })
    }

    #[test]
    fn test_board_pixels_at_mapped_location() {
        let mut b = board();
        b.mapping.apply(1, 3, 0, 0, 5).unwrap();
        let view = view_with(&[(1, &[200, 0, 0, 0, 1, 1, 1, 0, 2, 2, 2, 0, 3, 3, 3, 0])]);
        let mut canvas = DrawList::new();
        renderer().draw_board(&mut canvas, &b, &view);

        let fills: Vec<(Rect, Rgba)> = canvas.fills().map(|(r, c)| (*r, *c)).collect();
        assert_eq!(fills.len(), 4);
        // Cell (0,0) defaults to pxld 0, cell (3,0) was mapped to pxld 0 too
        assert!(fills.contains(&(Rect::new(10.0, 10.0, 10.0, 10.0), Rgba::opaque(200, 0, 0))));
        assert!(fills.contains(&(Rect::new(40.0, 10.0, 10.0, 10.0), Rgba::opaque(200, 0, 0))));
        assert!(fills.contains(&(Rect::new(20.0, 10.0, 10.0, 10.0), Rgba::opaque(1, 1, 1))));
        // Slave 2 has no buffer: border and label only
        assert_eq!(canvas.strokes().count(), 2);
        assert_eq!(canvas.texts().collect::<Vec<_>>(), vec!["S1", "S2"]);
    }

    #[test]
    fn test_short_buffer_skips_missing_pixels() {
        let b = board();
        let view = view_with(&[(1, &[9, 9, 9, 0])]);
        let mut canvas = DrawList::new();
        renderer().draw_single_slave(&mut canvas, &b, &view, 1);
        assert_eq!(canvas.fills().count(), 1);
    }

    #[test]
    fn test_grid_line_count() {
        let mut canvas = DrawList::new();
        renderer().draw_grid(&mut canvas, 4, 3);
        assert_eq!(canvas.lines(), 5 + 4);

        let mut hidden = renderer();
        hidden.opts.show_grid = false;
        let mut canvas = DrawList::new();
        hidden.draw_grid(&mut canvas, 4, 3);
        assert_eq!(canvas.lines(), 0);
    }

    #[test]
    fn test_resize_follows_view() {
        let mut b = board();
        let mut canvas = DrawList::new();
        let r = renderer();
        assert_eq!(r.resize(&mut canvas, &b), (10, 6));
        assert_eq!(canvas.size(), (100, 60));
        b.select_view(1).unwrap();
        assert_eq!(r.resize(&mut canvas, &b), (4, 1));
        assert_eq!(canvas.size(), (40, 10));
    }

    #[test]
    fn test_selection_shows_ids() {
        let mut b = board();
        b.selection = Some(Selection { slave_id: 2, x: 1, y: 0 });
        let mut canvas = DrawList::new();
        renderer().draw_selection(&mut canvas, &b);
        let strokes: Vec<_> = canvas.strokes().collect();
        assert_eq!(strokes[0].0, &Rect::new(20.5, 30.5, 10.0, 10.0));
        assert_eq!(canvas.texts().collect::<Vec<_>>(), vec!["pxld: 1", "mcu: 1"]);
    }

    #[test]
    fn test_hud_text() {
        let b = board();
        let hud = HudState {
            state: "playing".into(),
            frame: 12,
            total_frames: 100,
            measured_fps: Some(29.94),
            transport: None,
            status: Some("Saved slave 1".into()),
        };
        let mut canvas = DrawList::new();
        renderer().draw_hud(&mut canvas, &b, &hud);
        let texts: Vec<_> = canvas.texts().collect();
        assert_eq!(texts[0], "mode=board slave=all frame=12/99 playing");
        assert_eq!(texts[1], "grid=10x6 cell=10px slaves=2 fps=29.9");
        assert_eq!(texts[2], "Saved slave 1");
    }

    #[test]
    fn test_render_full_frame_order() {
        let b = board();
        let view = view_with(&[(2, &[0, 0, 0, 0, 0, 0, 0, 0])]);
        let mut canvas = DrawList::new();
        renderer().render(&mut canvas, &b, &view, &HudState::default());
        assert!(matches!(canvas.ops[0], DrawOp::Resize { width: 100, height: 60, .. }));
        assert_eq!(canvas.ops[1], DrawOp::Fill(Rect::new(0.0, 0.0, 100.0, 60.0), BACKGROUND));
        assert!(canvas.texts().any(|t| t == "active slaves: 1"));
        assert!(canvas.texts().any(|t| t == "total pixels: 2"));
    }

    #[test]
    fn test_pick_at_pointer() {
        let b = board();
        let r = renderer();
        assert_eq!(
            r.pick_at(&b, 35.0, 15.0),
            Some(Hit { slave_id: 1, local_x: 2, local_y: 0 })
        );
        assert_eq!(r.pick_at(&b, 5.0, 5.0), None);
    }
}
