use std::path::Path;

use anyhow::{Context, Result};

/// Sorted entry names of the action dataset directory. A missing or
/// unreadable directory yields no labels.
pub fn load_action_labels(dir: &Path) -> Vec<String> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            log::warn!(
                "action directory {} not found, using empty action list: {err}",
                dir.display()
            );
            return Vec::new();
        }
    };

    let mut labels: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    labels.sort();
    labels
}

/// `A` to `Z`.
pub fn alphabet_labels() -> Vec<String> {
    ('A'..='Z').map(String::from).collect()
}

/// Reads one label per line. Lines of the form `"<index> <label>"` keep only
/// the label; blank lines are skipped.
pub fn load_label_file(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read labels {}", path.display()))?;

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(char::is_whitespace) {
            Some((index, label)) if index.parse::<usize>().is_ok() => label.trim().to_string(),
            _ => line.to_string(),
        })
        .collect())
}
