//! Display surfaces the render worker presents frames on

use std::fmt;
use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::tty::IsTty;
use crossterm::{execute, queue};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{DisplayConfig, DisplayMode};

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("stdout is not a terminal")]
    NotATerminal,

    #[error("display '{0}' is closed")]
    Closed(String),

    #[error("terminal I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// One composed screen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub seq: u64,
    pub lines: Vec<String>,
}

/// Where frames go
pub trait DisplaySurface: Send + Sync + fmt::Debug {
    fn title(&self) -> &str;

    fn present(&self, frame: &Frame) -> Result<(), DisplayError>;

    fn frames_presented(&self) -> u64;

    /// Release the surface; later `present` calls fail
    fn close(&self);
}

/// Create the surface selected by `config`
pub fn create_display(config: &DisplayConfig) -> Result<Arc<dyn DisplaySurface>, DisplayError> {
    debug!(mode = ?config.mode, "create_display: called");
    let surface: Arc<dyn DisplaySurface> = match config.mode {
        DisplayMode::Headless => Arc::new(HeadlessDisplay::new(&config.title)),
        DisplayMode::Terminal => Arc::new(TerminalDisplay::new(&config.title)?),
    };
    info!(title = surface.title(), mode = ?config.mode, "Display created");
    Ok(surface)
}

/// Keeps the last frame in memory
#[derive(Debug)]
pub struct HeadlessDisplay {
    title: String,
    frames: AtomicU64,
    last: Mutex<Option<Frame>>,
    closed: AtomicBool,
}

impl HeadlessDisplay {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            frames: AtomicU64::new(0),
            last: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn last_frame(&self) -> Option<Frame> {
        self.last.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl DisplaySurface for HeadlessDisplay {
    fn title(&self) -> &str {
        &self.title
    }

    fn present(&self, frame: &Frame) -> Result<(), DisplayError> {
        if self.is_closed() {
            return Err(DisplayError::Closed(self.title.clone()));
        }
        *self.last.lock() = Some(frame.clone());
        self.frames.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn frames_presented(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Full-screen text view on the controlling terminal
pub struct TerminalDisplay {
    title: String,
    out: Mutex<Option<Stdout>>,
    frames: AtomicU64,
}

impl fmt::Debug for TerminalDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalDisplay")
            .field("title", &self.title)
            .field("frames", &self.frames)
            .finish()
    }
}

impl TerminalDisplay {
    pub fn new(title: &str) -> Result<Self, DisplayError> {
        let mut stdout = io::stdout();
        if !stdout.is_tty() {
            return Err(DisplayError::NotATerminal);
        }
        execute!(stdout, EnterAlternateScreen, Hide)?;
        Ok(Self {
            title: title.to_string(),
            out: Mutex::new(Some(stdout)),
            frames: AtomicU64::new(0),
        })
    }
}

impl DisplaySurface for TerminalDisplay {
    fn title(&self) -> &str {
        &self.title
    }

    fn present(&self, frame: &Frame) -> Result<(), DisplayError> {
        let mut guard = self.out.lock();
        let out = guard.as_mut().ok_or_else(|| DisplayError::Closed(self.title.clone()))?;

        queue!(out, MoveTo(0, 0), Clear(ClearType::All), Print(&self.title))?;
        for (i, line) in frame.lines.iter().enumerate() {
            // Lines past the addressable rows are dropped
            let Some(row) = screen_row(i) else { break };
            queue!(out, MoveTo(0, row), Print(line))?;
        }
        out.flush()?;
        self.frames.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn frames_presented(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    fn close(&self) {
        if let Some(mut out) = self.out.lock().take() {
            let _ = execute!(out, Show, LeaveAlternateScreen);
        }
    }
}

/// Terminal row for a frame line; the title and a blank line come first
fn screen_row(line: usize) -> Option<u16> {
    u16::try_from(line).ok()?.checked_add(2)
}

impl Drop for TerminalDisplay {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_keeps_last_frame() {
        let display = HeadlessDisplay::new("test");
        assert!(display.last_frame().is_none());

        let frame = Frame {
            seq: 3,
            lines: vec!["hello".into()],
        };
        display.present(&frame).unwrap();
        assert_eq!(display.frames_presented(), 1);
        assert_eq!(display.last_frame(), Some(frame));
    }

    #[test]
    fn test_headless_close_rejects_present() {
        let display = HeadlessDisplay::new("test");
        display.close();
        assert!(matches!(display.present(&Frame::default()), Err(DisplayError::Closed(_))));
    }

    #[test]
    fn test_screen_row_bounds() {
        assert_eq!(screen_row(0), Some(2));
        assert_eq!(screen_row(10), Some(12));
        assert_eq!(screen_row(usize::from(u16::MAX) - 2), Some(u16::MAX));
        assert_eq!(screen_row(usize::from(u16::MAX) - 1), None);
        assert_eq!(screen_row(70_000), None);
    }

    #[test]
    fn test_create_headless() {
        let config = DisplayConfig {
            mode: DisplayMode::Headless,
            title: "SA".into(),
        };
        let display = create_display(&config).unwrap();
        assert_eq!(display.title(), "SA");
        assert_eq!(display.frames_presented(), 0);
    }
}
