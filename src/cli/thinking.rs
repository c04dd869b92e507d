//! Thinking indicator shown while a completion is outstanding.

use std::io::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossterm::style::Stylize;
use crossterm::{cursor, execute, terminal};

const FRAMES: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
const FRAME_INTERVAL: Duration = Duration::from_millis(80);

/// A spinner repainting one status line on stdout.
///
/// The line is cleared on [`Thinking::stop`] and on drop, so any exit path
/// leaves the terminal clean.
pub struct Thinking {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Thinking {
    /// Start spinning with `label`.
    #[must_use]
    pub fn start(label: &str) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let label = label.to_string();

        let handle = std::thread::spawn(move || {
            let mut stdout = std::io::stdout();
            let mut i = 0;
            while !flag.load(Ordering::Relaxed) {
                let frame = FRAMES[i % FRAMES.len()];
                let _ = write!(stdout, "\r{}", format!("{frame} {label}").dark_grey());
                let _ = stdout.flush();
                std::thread::sleep(FRAME_INTERVAL);
                i += 1;
            }
            let _ = execute!(
                stdout,
                cursor::MoveToColumn(0),
                terminal::Clear(terminal::ClearType::CurrentLine)
            );
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop and clear the line. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stop.store(true, Ordering::Relaxed);
            let _ = handle.join();
        }
    }

    /// Whether the spinner is still running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for Thinking {
    fn drop(&mut self) {
        self.stop();
    }
}
