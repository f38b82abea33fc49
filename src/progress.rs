use std::io::Write;
use std::time::Instant;

use crate::services::UploadProgress;

const BAR_WIDTH: usize = 30;
const REDRAW_INTERVAL_MS: u128 = 100;

/// Stderr progress line for an upload, fed with progress snapshots.
pub struct UploadProgressBar {
    name: String,
    latest: UploadProgress,
    started: Instant,
    last_draw: Option<Instant>,
}

impl UploadProgressBar {
    pub fn new(name: &str, total: u64) -> Self {
        Self {
            name: name.to_string(),
            latest: UploadProgress { loaded: 0, total },
            started: Instant::now(),
            last_draw: None,
        }
    }

    /// Record a snapshot; redraws at most every 100ms.
    pub fn observe(&mut self, progress: UploadProgress) {
        self.latest = progress;

        let now = Instant::now();
        let due = self
            .last_draw
            .is_none_or(|last| now.duration_since(last).as_millis() >= REDRAW_INTERVAL_MS);
        if due {
            self.draw();
            self.last_draw = Some(now);
        }
    }

    /// Draw the completed line and end it.
    pub fn finish(&mut self) {
        self.latest.loaded = self.latest.total;
        self.draw();
        eprintln!();
    }

    /// End the line without claiming completion.
    pub fn abandon(&mut self) {
        if self.last_draw.is_some() {
            eprintln!();
        }
    }

    fn render(&self) -> String {
        let UploadProgress { loaded, total } = self.latest;
        let filled = if total > 0 {
            (BAR_WIDTH as u64 * loaded.min(total) / total) as usize
        } else {
            BAR_WIDTH
        };
        let empty = BAR_WIDTH - filled;

        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            loaded as f64 / elapsed
        } else {
            0.0
        };

        format!(
            "{} [{}>{}] {}% {}/{} {}",
            self.name,
            "=".repeat(filled),
            " ".repeat(empty),
            self.latest.percent(),
            format_bytes(loaded),
            format_bytes(total),
            format_rate(rate),
        )
    }

    fn draw(&self) {
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "\r{}    ", self.render());
        let _ = stderr.flush();
    }
}

/// Human-readable byte count.
pub fn format_bytes(n: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if n >= GB {
        format!("{:.1}GB", n as f64 / GB as f64)
    } else if n >= MB {
        format!("{:.1}MB", n as f64 / MB as f64)
    } else if n >= KB {
        format!("{:.1}KB", n as f64 / KB as f64)
    } else {
        format!("{n}B")
    }
}

fn format_rate(bps: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * KB;

    if bps >= MB {
        format!("{:.1}MB/s", bps / MB)
    } else if bps >= KB {
        format!("{:.0}KB/s", bps / KB)
    } else {
        format!("{bps:.0}B/s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0B");
        assert_eq!(format_bytes(1023), "1023B");
        assert_eq!(format_bytes(1536), "1.5KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0GB");
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(500.0), "500B/s");
        assert_eq!(format_rate(2048.0), "2KB/s");
        assert_eq!(format_rate(1024.0 * 1024.0 * 2.5), "2.5MB/s");
    }

    #[test]
    fn test_render_half_done() {
        let mut bar = UploadProgressBar::new("plan.pdf", 2048);
        bar.latest = UploadProgress {
            loaded: 1024,
            total: 2048,
        };
        let line = bar.render();
        assert!(line.starts_with("plan.pdf ["));
        assert!(line.contains(&format!("{}>", "=".repeat(15))));
        assert!(line.contains("50% 1.0KB/2.0KB"));
    }

    #[test]
    fn test_render_overshoot_and_zero_total() {
        let mut bar = UploadProgressBar::new("x", 10);
        bar.latest = UploadProgress {
            loaded: 20,
            total: 10,
        };
        assert!(bar.render().contains("100%"));

        let empty = UploadProgressBar::new("y", 0);
        assert!(empty.render().contains(&"=".repeat(BAR_WIDTH)));
    }

    #[test]
    fn test_observe_then_finish() {
        let mut bar = UploadProgressBar::new("z", 1000);
        for loaded in (0..=1000).step_by(100) {
            bar.observe(UploadProgress {
                loaded,
                total: 1000,
            });
        }
        assert_eq!(bar.latest.loaded, 1000);
        assert!(bar.last_draw.is_some());
        bar.finish();
    }
}
