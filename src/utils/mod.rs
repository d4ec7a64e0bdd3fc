use std::time::{Duration, Instant};
use tracing::info;

/// A simple wall-clock timer for logging elapsed time.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("⏱  Starting: {}", label);
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!(
            "⏱  Finished: {} (took {:.2?})",
            self.label,
            self.start.elapsed()
        );
    }
}

/// Format a large integer with thousands separators.
pub fn fmt_number(n: i64) -> String {
    let s = n.unsigned_abs().to_string();
    let mut result = String::new();
    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    if n < 0 {
        result.push('-');
    }
    result.chars().rev().collect()
}

/// Won amount rounded to the unit, e.g. `2,517,797,674`.
pub fn fmt_amount(value: f64) -> String {
    if !value.is_finite() {
        return "-".to_string();
    }
    fmt_number(value.round() as i64)
}

/// Headline value in millions of won, e.g. `2,518 백만원`.
pub fn fmt_millions(value: f64) -> String {
    format!("{} 백만원", fmt_amount(value / 1e6))
}

pub fn fmt_percent(pct: f64) -> String {
    format!("{:.2}%", pct)
}

/// Vacancy rates show one decimal place.
pub fn fmt_vacancy(pct: f64) -> String {
    format!("{:.1}%", pct)
}
