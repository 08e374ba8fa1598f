use anyhow::{anyhow, Result};
use tracing::debug;
use windows::Win32::{
    Foundation::HWND,
    UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowTextW},
};

use crate::daemon::storage::entities::ActivityKey;

use super::WindowProbe;

#[tracing::instrument]
pub fn get_active_title() -> Result<String> {
    let window = unsafe { GetForegroundWindow() };

    if window.is_invalid() {
        return Err(anyhow!("Failed to get foreground window"));
    }

    let mut text: [u16; 4096] = [0; 4096];
    Ok(unsafe { get_window_title(window, &mut text) })
}

unsafe fn get_window_title(window_handle: HWND, text: &mut [u16]) -> String {
    let len = unsafe { GetWindowTextW(window_handle, text) };
    String::from_utf16_lossy(&text[..len as usize])
}

pub struct WindowsProbe {}

impl WindowsProbe {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for WindowsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowProbe for WindowsProbe {
    fn probe(&mut self) -> Option<ActivityKey> {
        get_active_title()
            .inspect_err(|e| debug!("Failed to get active window {e:?}"))
            .ok()
            .and_then(ActivityKey::new_opt)
    }
}
