//! Terminal output: the `log!` macro and in-place progress bars.
//!
//! ```ignore
//! log!("build"; "rendering {} pages", count);
//!
//! let progress = ProgressBars::new(&[("render", entries.len())]);
//! progress.inc(0);
//! progress.finish();
//! ```

use colored::{ColoredString, Colorize};
use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType, size},
};
use std::{
    io::{Write, stdout},
    sync::{
        OnceLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use parking_lot::Mutex;

static TERMINAL_WIDTH: OnceLock<u16> = OnceLock::new();

// Bar line: "[render] [████░░░░] 42/100"
const MIN_BAR_WIDTH: usize = 10;
const MAX_BAR_WIDTH: usize = 40;

fn terminal_width() -> usize {
    *TERMINAL_WIDTH.get_or_init(|| size().map(|(w, _)| w).unwrap_or(120)) as usize
}

/// Display width of `"[module] "`.
const fn prefix_len(module: &str) -> usize {
    module.len() + 3
}

// ============================================================================
// Log Macro
// ============================================================================

/// Log a message with a colored module prefix.
///
/// ```ignore
/// log!("serve"; "listening on http://{}", addr);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::utils::log::log($module, &format!($($arg)*))
    }};
}

/// Print `message` under a colored `[module]` prefix, cut to terminal width.
pub fn log(module: &str, message: &str) {
    let prefix = colorize_prefix(module);
    let message = truncate_str(message, terminal_width().saturating_sub(prefix_len(module)));

    let mut stdout = stdout().lock();
    execute!(stdout, Clear(ClearType::UntilNewLine)).ok();
    writeln!(stdout, "{prefix} {message}").ok();
    stdout.flush().ok();
}

fn colorize_prefix(module: &str) -> ColoredString {
    let prefix = format!("[{module}]");
    match module.to_ascii_lowercase().as_str() {
        "serve" => prefix.bright_blue().bold(),
        "watch" | "reload" => prefix.bright_green().bold(),
        "error" => prefix.bright_red().bold(),
        "build" => prefix.bright_cyan().bold(),
        _ => prefix.bright_yellow().bold(),
    }
}

/// Cut `s` to at most `max_len` bytes on a char boundary.
fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ============================================================================
// Progress Bars
// ============================================================================

/// Progress bars, one terminal line each, updated in place.
///
/// Bars are addressed by creation order. Safe to drive from rayon workers.
pub struct ProgressBars {
    bars: Vec<Bar>,
    lock: Mutex<()>,
}

struct Bar {
    module: &'static str,
    total: usize,
    current: AtomicUsize,
}

impl ProgressBars {
    pub fn new(modules: &[(&'static str, usize)]) -> Self {
        let mut stdout = stdout().lock();
        for _ in modules {
            writeln!(stdout).ok();
        }
        stdout.flush().ok();

        Self {
            bars: modules
                .iter()
                .map(|&(module, total)| Bar {
                    module,
                    total,
                    current: AtomicUsize::new(0),
                })
                .collect(),
            lock: Mutex::new(()),
        }
    }

    pub fn inc(&self, index: usize) {
        if let Some(bar) = self.bars.get(index) {
            let current = bar.current.fetch_add(1, Ordering::Relaxed) + 1;
            self.draw(index, bar, current);
        }
    }

    fn draw(&self, row: usize, bar: &Bar, current: usize) {
        let _guard = self.lock.lock();

        let count = format!("{current}/{}", bar.total);
        let overhead = prefix_len(bar.module) + 4 + count.len();
        let line = render_bar(current, bar.total, terminal_width().saturating_sub(overhead));

        let mut stdout = stdout().lock();
        let up = (self.bars.len() - row) as u16;
        execute!(stdout, cursor::MoveUp(up), Clear(ClearType::CurrentLine)).ok();
        write!(stdout, "{} [{line}] {count}", colorize_prefix(bar.module)).ok();
        execute!(stdout, cursor::MoveDown(up)).ok();
        write!(stdout, "\r").ok();
        stdout.flush().ok();
    }

    /// Erase the bars and return the cursor to where they began.
    pub fn finish(&self) {
        let _guard = self.lock.lock();
        let rows = self.bars.len() as u16;

        let mut stdout = stdout().lock();
        execute!(stdout, cursor::MoveUp(rows)).ok();
        for _ in &self.bars {
            execute!(stdout, Clear(ClearType::CurrentLine), cursor::MoveDown(1)).ok();
        }
        execute!(stdout, cursor::MoveUp(rows)).ok();
        stdout.flush().ok();
    }
}

/// Filled/empty cells for `current` of `total`, within the available width.
fn render_bar(current: usize, total: usize, available: usize) -> String {
    let width = available.clamp(MIN_BAR_WIDTH, MAX_BAR_WIDTH);
    let filled = if total > 0 {
        (current.min(total) * width) / total
    } else {
        0
    };
    "█".repeat(filled) + &"░".repeat(width - filled)
}
