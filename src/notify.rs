use std::{io::Write, sync::Mutex};

use uuid::Uuid;

/// Where download progress is surfaced to the user.
pub trait Notifier: Send + Sync {
    fn progress(&self, id: Uuid, title: &str, fraction: f32);
    fn complete(&self, id: Uuid, title: &str);
    fn failed(&self, id: Uuid, title: &str, error: &str);
}

/// Discards everything.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn progress(&self, _id: Uuid, _title: &str, _fraction: f32) {}
    fn complete(&self, _id: Uuid, _title: &str) {}
    fn failed(&self, _id: Uuid, _title: &str, _error: &str) {}
}

/// Redraws a single status line on stdout.
pub struct ConsoleNotifier {
    // Last whole percentage printed per task, to avoid redrawing per chunk
    last: Mutex<Vec<(Uuid, u32)>>,
}

impl Default for ConsoleNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(Vec::new()),
        }
    }

    fn should_draw(&self, id: Uuid, percent: u32) -> bool {
        let Ok(mut last) = self.last.lock() else {
            return true;
        };
        match last.iter_mut().find(|(t, _)| *t == id) {
            Some((_, p)) if *p == percent => false,
            Some((_, p)) => {
                *p = percent;
                true
            }
            None => {
                last.push((id, percent));
                true
            }
        }
    }

    fn forget(&self, id: Uuid) {
        if let Ok(mut last) = self.last.lock() {
            last.retain(|(t, _)| *t != id);
        }
    }
}

pub fn progress_bar(fraction: f32, width: usize) -> String {
    let fraction = fraction.clamp(0.0, 1.0);
    let filled = (fraction * width as f32).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

impl Notifier for ConsoleNotifier {
    fn progress(&self, id: Uuid, title: &str, fraction: f32) {
        let percent = (fraction.clamp(0.0, 1.0) * 100.0) as u32;
        if !self.should_draw(id, percent) {
            return;
        }
        print!(
            "\x1b[2K\r{} {:>3}% {}",
            progress_bar(fraction, 30),
            percent,
            title
        );
        let _ = std::io::stdout().lock().flush();
    }

    fn complete(&self, id: Uuid, title: &str) {
        self.forget(id);
        println!("\x1b[2K\rDownload complete: {}", title);
    }

    fn failed(&self, id: Uuid, title: &str, error: &str) {
        self.forget(id);
        println!("\x1b[2K\rDownload failed: {} ({})", title, error);
    }
}
