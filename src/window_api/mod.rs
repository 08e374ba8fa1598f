//! Contains logic for finding out which window the user is looking at in different environments.
//! [GenericWindowProbe] is the main artifact of this module that abstracts the platforms.

pub mod command;
#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use crate::daemon::storage::entities::ActivityKey;

/// Intended to serve as a contract every platform must implement.
#[cfg_attr(test, mockall::automock)]
pub trait WindowProbe {
    /// Title of the foreground window, for example 'Vibing in YouTube - Chrome'. [None] when
    /// there is no foreground window or the platform call failed. Never panics.
    fn probe(&mut self) -> Option<ActivityKey>;
}

/// Used on platforms where no probe is available. Everything is untracked time.
pub struct UnsupportedProbe;

impl WindowProbe for UnsupportedProbe {
    fn probe(&mut self) -> Option<ActivityKey> {
        None
    }
}

/// Serves as a cross-compatible [WindowProbe] implementation. The concrete probe is chosen once,
/// when the tracker starts.
pub struct GenericWindowProbe {
    inner: Box<dyn WindowProbe>,
}

impl GenericWindowProbe {
    pub fn new() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                tracing::info!("Using Windows foreground window probe");
                Self { inner: Box::new(win::WindowsProbe::new()) }
            }
            else if #[cfg(feature = "x11")] {
                match x11::X11Probe::new() {
                    Ok(probe) => {
                        tracing::info!("Using X11 foreground window probe");
                        Self { inner: Box::new(probe) }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to connect to X11 ({e:?}), falling back to xdotool");
                        Self { inner: Box::new(command::CommandProbe::xdotool()) }
                    }
                }
            }
            else if #[cfg(target_os = "linux")] {
                tracing::info!("Using xdotool foreground window probe");
                Self { inner: Box::new(command::CommandProbe::xdotool()) }
            }
            else if #[cfg(target_os = "macos")] {
                tracing::info!("Using osascript foreground application probe");
                Self { inner: Box::new(command::CommandProbe::osascript()) }
            }
            else {
                tracing::warn!("No window probe is available for this platform, nothing will be tracked");
                Self { inner: Box::new(UnsupportedProbe) }
            }
        }
    }
}

impl Default for GenericWindowProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowProbe for GenericWindowProbe {
    fn probe(&mut self) -> Option<ActivityKey> {
        self.inner.probe()
    }
}
