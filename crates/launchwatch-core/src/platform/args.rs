//! Splitting configured argument strings into argument vectors.
//!
//! # Platform Behavior
//! - **Windows**: `CommandLineToArgvW`, so unquoted `C:\Games\x` keeps its
//!   backslashes and `"C:\Program Files\x"` stays one argument
//! - **Linux/macOS**: POSIX shell words via `shell_words`

#![cfg_attr(windows, allow(unsafe_code))]

use crate::error::{LaunchError, Result};

fn invalid(line: &str, message: impl std::fmt::Display) -> LaunchError {
    LaunchError::Validation {
        field: "arguments".to_string(),
        message: format!("cannot split '{}': {}", line, message),
    }
}

/// Split a command-line string into arguments the way the platform shell
/// would.
pub fn split_command_line(line: &str) -> Result<Vec<String>> {
    #[cfg(windows)]
    {
        split_windows(line)
    }

    #[cfg(not(windows))]
    {
        shell_words::split(line).map_err(|e| invalid(line, e))
    }
}

#[cfg(windows)]
fn split_windows(line: &str) -> Result<Vec<String>> {
    use windows_sys::Win32::Foundation::LocalFree;
    use windows_sys::Win32::UI::Shell::CommandLineToArgvW;

    // The first token follows program-name rules; parse behind a placeholder.
    let wide: Vec<u16> = format!("x {}", line)
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect();
    let mut count: i32 = 0;

    // SAFETY: `wide` is NUL-terminated and outlives the call.
    let argv = unsafe { CommandLineToArgvW(wide.as_ptr(), &mut count) };
    if argv.is_null() {
        return Err(invalid(line, std::io::Error::last_os_error()));
    }

    let count = usize::try_from(count).unwrap_or(0);
    let mut args = Vec::with_capacity(count.saturating_sub(1));
    for index in 1..count {
        // SAFETY: `argv` holds `count` NUL-terminated wide strings.
        let arg = unsafe {
            let ptr = *argv.add(index);
            let mut len = 0;
            while *ptr.add(len) != 0 {
                len += 1;
            }
            String::from_utf16_lossy(std::slice::from_raw_parts(ptr, len))
        };
        args.push(arg);
    }

    // SAFETY: `argv` came from CommandLineToArgvW and is freed exactly once.
    unsafe {
        LocalFree(argv as _);
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_groups_quoted_arguments() {
        assert_eq!(split_command_line("").unwrap(), Vec::<String>::new());
        assert_eq!(split_command_line("  -a  -b ").unwrap(), vec!["-a", "-b"]);
        assert_eq!(
            split_command_line(r#"--launch "My Game" -x"#).unwrap(),
            vec!["--launch", "My Game", "-x"]
        );
        assert_eq!(
            split_command_line(r#""say \"hi\"""#).unwrap(),
            vec![r#"say "hi""#]
        );
    }

    #[test]
    fn test_quoted_windows_path_survives() {
        assert_eq!(
            split_command_line(r#"--dir "C:\Games\x" -q"#).unwrap(),
            vec!["--dir", r"C:\Games\x", "-q"]
        );
    }

    #[cfg(windows)]
    #[test]
    fn test_unquoted_windows_path_survives() {
        assert_eq!(
            split_command_line(r"--dir C:\Games\x").unwrap(),
            vec!["--dir", r"C:\Games\x"]
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn test_unterminated_quote_is_rejected() {
        let err = split_command_line(r#"--launch "My Game"#).unwrap_err();
        assert!(matches!(err, LaunchError::Validation { .. }));
    }
}
