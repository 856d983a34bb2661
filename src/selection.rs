//! Reading the text the user has selected.
//!
//! The primary selection is read with `wl-paste -p` on Wayland, falling
//! back to `xclip -o -selection primary` on X11.

use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Selection readers tried in order.
const READERS: &[(&str, &[&str])] = &[
    ("wl-paste", &["-p"]),
    ("xclip", &["-o", "-selection", "primary"]),
];

/// The current primary selection, trimmed. `None` if nothing is selected
/// or no reader is available.
pub async fn selected_text() -> Option<String> {
    for (program, args) in READERS {
        if let Some(text) = read_with(program, args).await {
            return Some(text);
        }
    }
    None
}

async fn read_with(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).kill_on_drop(true).output();

    let output = match tokio::time::timeout(READ_TIMEOUT, output).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            debug!(target: "selection", program, error = %e, "Selection reader unavailable");
            return None;
        }
        Err(_) => {
            debug!(target: "selection", program, "Selection reader timed out");
            return None;
        }
    };

    if !output.status.success() {
        return None;
    }
    non_empty(&String::from_utf8_lossy(&output.stdout))
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_trims() {
        assert_eq!(non_empty("  hello \n"), Some("hello".to_string()));
        assert_eq!(non_empty(" \n\t"), None);
    }

    #[tokio::test]
    async fn test_missing_program_yields_none() {
        assert_eq!(read_with("definitely-not-a-selection-tool", &[]).await, None);
    }

    #[tokio::test]
    async fn test_reads_program_output() {
        assert_eq!(read_with("echo", &["  picked text  "]).await, Some("picked text".to_string()));
        assert_eq!(read_with("false", &[]).await, None);
    }
}
