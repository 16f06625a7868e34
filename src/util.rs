use std::time::Duration;

// ----------------------------------------------------------------------------
// Declarations
// ----------------------------------------------------------------------------
pub trait SlashFix {
    fn slash_fix(self) -> Self;
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------
impl SlashFix for std::path::PathBuf {
    fn slash_fix(self) -> Self {
        self.to_string_lossy().to_string().slash_fix().into()
    }
}

impl SlashFix for String {
    fn slash_fix(self) -> Self {
        self.replace("\\", "/")
    }
}

/// Human-readable duration for logs and CLI summaries: milliseconds under a
/// second, one-decimal seconds under a minute, otherwise minutes and seconds.
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis < 1000 {
        format!("{millis}ms")
    } else if millis < 60_000 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        let total_secs = d.as_secs();
        format!("{}m {}s", total_secs / 60, total_secs % 60)
    }
}
