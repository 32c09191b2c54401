use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::path::Path;

pub fn display_path(path: &Path, base: Option<&Path>) -> String {
    if let Some(base) = base {
        if let Ok(relative) = path.strip_prefix(base) {
            return relative.display().to_string();
        }
    }
    path.display().to_string()
}

/// Render argv as a shell-safe line. Only used for display; commands are
/// always spawned from the argument vector.
pub fn format_command_line(program: &OsStr, args: &[OsString]) -> String {
    let words: Vec<Cow<'_, str>> = std::iter::once(program)
        .chain(args.iter().map(OsString::as_os_str))
        .map(OsStr::to_string_lossy)
        .collect();
    shell_words::join(words)
}
