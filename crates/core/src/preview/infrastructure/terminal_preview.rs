//! Live preview rendered into the terminal with Unicode half-block cells.
//!
//! Frames are handed to a render thread through a single-slot channel, so a
//! slow terminal drops frames instead of stalling the pipeline.

use std::io::{self, Stdout};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::widgets::Widget;
use ratatui::Terminal;

use crate::preview::domain::preview_sink::{PreviewError, PreviewSink};
use crate::shared::frame::Frame;

pub struct TerminalPreview {
    session: Option<PreviewSession>,
    dropped: usize,
}

struct PreviewSession {
    frame_tx: Sender<Frame>,
    renderer: JoinHandle<()>,
}

impl TerminalPreview {
    pub fn new() -> Self {
        Self {
            session: None,
            dropped: 0,
        }
    }

    /// Frames discarded because the renderer was still busy.
    pub fn dropped_frames(&self) -> usize {
        self.dropped
    }
}

impl Default for TerminalPreview {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewSink for TerminalPreview {
    fn open(&mut self, title: &str) -> Result<(), PreviewError> {
        if self.session.is_some() {
            return Ok(());
        }

        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e.into());
        }
        let terminal = match Terminal::new(CrosstermBackend::new(stdout)) {
            Ok(terminal) => terminal,
            Err(e) => {
                restore_terminal();
                return Err(e.into());
            }
        };

        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<Frame>(1);
        let title = title.to_string();
        let renderer = std::thread::spawn(move || render_loop(terminal, frame_rx, title));

        self.session = Some(PreviewSession { frame_tx, renderer });
        self.dropped = 0;
        Ok(())
    }

    fn present(&mut self, frame: &Frame) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.frame_tx.is_full() {
            self.dropped += 1;
            return;
        }
        match session.frame_tx.try_send(frame.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.dropped += 1,
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("Preview renderer stopped, closing preview");
                self.close();
            }
        }
    }

    fn poll_cancel(&mut self, timeout: Duration) -> bool {
        if self.session.is_none() {
            return false;
        }

        let mut wait = timeout;
        loop {
            match event::poll(wait) {
                Ok(true) => {}
                Ok(false) => return false,
                Err(e) => {
                    log::debug!("Preview input poll failed: {e}");
                    return false;
                }
            }
            match event::read() {
                Ok(Event::Key(key))
                    if key.kind == KeyEventKind::Press
                        && is_cancel_key(key.code, key.modifiers) =>
                {
                    return true;
                }
                Ok(_) => {}
                Err(e) => {
                    log::debug!("Preview input read failed: {e}");
                    return false;
                }
            }
            // Drain whatever else is queued without waiting again.
            wait = Duration::ZERO;
        }
    }

    fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        drop(session.frame_tx);
        if session.renderer.join().is_err() {
            log::warn!("Preview renderer panicked");
        }
        restore_terminal();
        if self.dropped > 0 {
            log::debug!("Preview dropped {} frames", self.dropped);
        }
    }
}

impl Drop for TerminalPreview {
    fn drop(&mut self) {
        self.close();
    }
}

fn is_cancel_key(code: KeyCode, modifiers: KeyModifiers) -> bool {
    match code {
        KeyCode::Char('q') | KeyCode::Char('Q') => true,
        // Raw mode swallows SIGINT, so Ctrl+C arrives as a key.
        KeyCode::Char('c') => modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

fn restore_terminal() {
    if let Err(e) = disable_raw_mode() {
        log::warn!("Failed to leave raw mode: {e}");
    }
    if let Err(e) = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show) {
        log::warn!("Failed to leave alternate screen: {e}");
    }
}

fn render_loop(mut terminal: Terminal<CrosstermBackend<Stdout>>, frames: Receiver<Frame>, title: String) {
    for frame in frames {
        let status = format!("{title} | frame {} | q: stop", frame.index());
        let result = terminal.draw(|f| {
            let (view_area, status_area) = split_status_line(f.area());
            f.render_widget(FrameView { frame: &frame }, view_area);
            f.render_widget(StatusBar { message: &status }, status_area);
        });
        if let Err(e) = result {
            log::warn!("Preview draw failed: {e}");
            break;
        }
    }
}

/// Splits off the bottom line of `area` for the status bar.
fn split_status_line(area: Rect) -> (Rect, Rect) {
    let view_height = area.height.saturating_sub(1);
    let view = Rect {
        height: view_height,
        ..area
    };
    let status = Rect {
        y: area.y + view_height,
        height: area.height.min(1),
        ..area
    };
    (view, status)
}

/// Draws a frame scaled to fit the area, two pixel rows per cell.
struct FrameView<'a> {
    frame: &'a Frame,
}

impl Widget for FrameView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let frame = self.frame;
        if frame.width() == 0 || frame.height() == 0 || area.width == 0 || area.height == 0 {
            return;
        }

        let frame_aspect = frame.width() as f64 / frame.height() as f64;
        let term_width = area.width as f64;
        let term_height = (area.height as f64) * 2.0;

        let (display_width, display_height) = if term_width / term_height > frame_aspect {
            let h = term_height;
            ((h * frame_aspect) as u16, (h / 2.0) as u16)
        } else {
            let w = term_width;
            (w as u16, (w / frame_aspect / 2.0) as u16)
        };
        if display_width == 0 || display_height == 0 {
            return;
        }

        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;

        let x_scale = frame.width() as f64 / display_width as f64;
        let y_scale = frame.height() as f64 / (display_height as f64 * 2.0);

        for ty in 0..display_height {
            for tx in 0..display_width {
                let src_x = (tx as f64 * x_scale) as u32;
                let src_top = (ty as f64 * 2.0 * y_scale) as u32;
                let src_bottom = ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                let [r1, g1, b1] = frame.pixel(src_x, src_top);
                let [r2, g2, b2] = frame.pixel(src_x, src_bottom);

                if let Some(cell) = buf.cell_mut((x_offset + tx, y_offset + ty)) {
                    cell.set_char('▀');
                    cell.set_fg(Color::Rgb(r1, g1, b1));
                    cell.set_bg(Color::Rgb(r2, g2, b2));
                }
            }
        }
    }
}

struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(
            area.x,
            area.y,
            text,
            Style::default().fg(Color::White).bg(Color::DarkGray),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(w: u32, h: u32, rgb: [u8; 3]) -> Frame {
        let data = rgb.repeat((w * h) as usize);
        Frame::new(data, w, h, 3, 0)
    }

    #[test]
    fn test_frame_view_fills_cells_with_half_blocks() {
        let area = Rect::new(0, 0, 10, 5);
        let mut buf = Buffer::empty(area);
        let frame = solid_frame(20, 10, [255, 0, 0]);

        FrameView { frame: &frame }.render(area, &mut buf);

        let cell = buf.cell((5, 2)).unwrap();
        assert_eq!(cell.symbol(), "▀");
        assert_eq!(cell.fg, Color::Rgb(255, 0, 0));
        assert_eq!(cell.bg, Color::Rgb(255, 0, 0));
    }

    #[test]
    fn test_frame_view_keeps_aspect_ratio_centered() {
        // Tall frame in a wide area: columns at the edges stay empty.
        let area = Rect::new(0, 0, 40, 5);
        let mut buf = Buffer::empty(area);
        let frame = solid_frame(10, 20, [0, 255, 0]);

        FrameView { frame: &frame }.render(area, &mut buf);

        assert_eq!(buf.cell((0, 2)).unwrap().symbol(), " ");
        assert_eq!(buf.cell((20, 2)).unwrap().symbol(), "▀");
    }

    #[test]
    fn test_frame_view_top_and_bottom_pixels_differ() {
        let mut data = Vec::new();
        data.extend([255u8, 255, 255].repeat(2)); // row 0 white
        data.extend([0u8, 0, 0].repeat(2)); // row 1 black
        let frame = Frame::new(data, 2, 2, 3, 0);
        let area = Rect::new(0, 0, 2, 1);
        let mut buf = Buffer::empty(area);

        FrameView { frame: &frame }.render(area, &mut buf);

        let cell = buf.cell((0, 0)).unwrap();
        assert_eq!(cell.fg, Color::Rgb(255, 255, 255));
        assert_eq!(cell.bg, Color::Rgb(0, 0, 0));
    }

    #[test]
    fn test_frame_view_empty_frame_draws_nothing() {
        let area = Rect::new(0, 0, 4, 2);
        let mut buf = Buffer::empty(area);
        let frame = Frame::new(Vec::new(), 0, 0, 3, 0);
        FrameView { frame: &frame }.render(area, &mut buf);
        assert_eq!(buf, Buffer::empty(area));
    }

    #[test]
    fn test_status_bar_truncates_message() {
        let area = Rect::new(0, 0, 5, 1);
        let mut buf = Buffer::empty(area);
        StatusBar {
            message: "faceswap | q: stop",
        }
        .render(area, &mut buf);

        let line: String = (0..5)
            .map(|x| buf.cell((x, 0)).unwrap().symbol().to_string())
            .collect();
        assert_eq!(line, "faces");
        assert_eq!(buf.cell((4, 0)).unwrap().bg, Color::DarkGray);
    }

    #[test]
    fn test_split_status_line() {
        let (view, status) = split_status_line(Rect::new(0, 0, 80, 24));
        assert_eq!(view, Rect::new(0, 0, 80, 23));
        assert_eq!(status, Rect::new(0, 23, 80, 1));

        let (view, status) = split_status_line(Rect::new(0, 0, 80, 0));
        assert_eq!(view.height, 0);
        assert_eq!(status.height, 0);
    }

    #[test]
    fn test_cancel_keys() {
        assert!(is_cancel_key(KeyCode::Char('q'), KeyModifiers::NONE));
        assert!(is_cancel_key(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(!is_cancel_key(KeyCode::Char('c'), KeyModifiers::NONE));
        assert!(!is_cancel_key(KeyCode::Esc, KeyModifiers::NONE));
    }

    #[test]
    fn test_unopened_preview_is_inert() {
        let mut preview = TerminalPreview::new();
        preview.present(&solid_frame(4, 4, [1, 2, 3]));
        assert!(!preview.poll_cancel(Duration::from_millis(1)));
        preview.close();
        preview.close();
        assert_eq!(preview.dropped_frames(), 0);
    }
}
