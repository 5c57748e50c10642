//! Command text helpers

/// Command prefixes whose requests the game never answers
pub const RAW_DISPLAY_PREFIXES: [&str; 2] = ["tellraw", "titleraw"];

/// Whether a command is a raw-text display command
pub fn is_raw_display(command: &str) -> bool {
    RAW_DISPLAY_PREFIXES
        .iter()
        .any(|prefix| command.starts_with(prefix))
}

/// Escape text for embedding inside a JSON string literal of a command
pub fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// `tellraw` command showing `text` to `target`
pub fn rawtext_command(target: &str, text: &str) -> String {
    format!(
        r#"tellraw {} {{"rawtext":[{{"text":"{}"}}]}}"#,
        target,
        escape_text(text)
    )
}
