use chrono::NaiveDateTime;

/// `YYYYmmddHHMMSS-NNN`: second-resolution timestamp plus a per-process
/// counter, so ids never repeat within one run.
#[derive(Debug, Default)]
pub struct UidGenerator {
    counter: u32,
}

impl UidGenerator {
    pub fn next(&mut self, now: NaiveDateTime) -> String {
        self.counter += 1;
        format!("{}-{:03}", now.format("%Y%m%d%H%M%S"), self.counter)
    }
}
