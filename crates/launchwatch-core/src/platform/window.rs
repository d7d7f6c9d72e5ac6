//! Top-level window lookup for a process.
//!
//! Only Windows has a portable notion of "the main window of a PID". Other
//! platforms report [`LaunchError::Unsupported`] and callers substitute a
//! synthetic window (see `SystemWindows`).

#![cfg_attr(windows, allow(unsafe_code))]

use crate::error::Result;
#[cfg(not(windows))]
use crate::error::LaunchError;
use crate::process::WindowInfo;

/// Find the first visible, unowned top-level window belonging to `pid`.
pub fn main_window(pid: u32) -> Result<Option<WindowInfo>> {
    #[cfg(windows)]
    {
        Ok(win::main_window(pid))
    }

    #[cfg(not(windows))]
    {
        let _ = pid;
        Err(LaunchError::unsupported("window lookup"))
    }
}

/// Minimize the window with the given native handle.
pub fn minimize_window(handle: u64) -> Result<()> {
    #[cfg(windows)]
    {
        win::minimize(handle);
        Ok(())
    }

    #[cfg(not(windows))]
    {
        let _ = handle;
        Err(LaunchError::unsupported("window minimize"))
    }
}

#[cfg(windows)]
mod win {
    use crate::process::WindowInfo;
    use windows_sys::Win32::Foundation::{BOOL, HWND, LPARAM};
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetClassNameW, GetWindow, GetWindowTextW, GetWindowThreadProcessId,
        IsWindowVisible, ShowWindow, GW_OWNER, SW_MINIMIZE,
    };

    struct Search {
        pid: u32,
        found: HWND,
    }

    unsafe extern "system" fn visit(hwnd: HWND, lparam: LPARAM) -> BOOL {
        // SAFETY: lparam is the `&mut Search` handed to EnumWindows, which
        // outlives the enumeration.
        let search = unsafe { &mut *(lparam as *mut Search) };

        let mut owner_pid = 0u32;
        // SAFETY: hwnd comes from EnumWindows and owner_pid is a valid out pointer.
        let is_main = unsafe {
            GetWindowThreadProcessId(hwnd, &mut owner_pid);
            IsWindowVisible(hwnd) != 0 && GetWindow(hwnd, GW_OWNER).is_null()
        };

        if owner_pid == search.pid && is_main {
            search.found = hwnd;
            return 0;
        }
        1
    }

    fn read_text(hwnd: HWND, read: unsafe extern "system" fn(HWND, *mut u16, i32) -> i32) -> String {
        let mut buf = [0u16; 512];
        // SAFETY: buf is writable for its full length, which is what we pass.
        let len = unsafe { read(hwnd, buf.as_mut_ptr(), buf.len() as i32) };
        String::from_utf16_lossy(&buf[..len.max(0) as usize])
    }

    pub(super) fn main_window(pid: u32) -> Option<WindowInfo> {
        let mut search = Search {
            pid,
            found: std::ptr::null_mut(),
        };
        // SAFETY: `visit` only dereferences lparam as the Search above.
        unsafe {
            EnumWindows(Some(visit), &mut search as *mut Search as LPARAM);
        }
        if search.found.is_null() {
            return None;
        }

        Some(WindowInfo {
            handle: search.found as usize as u64,
            title: read_text(search.found, GetWindowTextW),
            class: read_text(search.found, GetClassNameW),
        })
    }

    pub(super) fn minimize(handle: u64) {
        let hwnd = handle as usize as HWND;
        // SAFETY: ShowWindow tolerates stale handles and just fails.
        unsafe {
            ShowWindow(hwnd, SW_MINIMIZE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(windows))]
    #[test]
    fn test_window_lookup_unsupported() {
        assert!(main_window(std::process::id()).is_err());
        assert!(minimize_window(1).is_err());
    }
}
