//! Contains logic for resolving the current foreground activity name in
//! different environments. [GenericResolver] is the main artifact of this
//! module that abstracts over the platform backends.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use anyhow::Result;
use tracing::warn;

/// Result of one poll of the platform capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Name of the current foreground activity. A window title, or the
    /// visited domain when the foreground window is a recognized browser.
    Activity(String),
    /// The running platform offers no window introspection.
    Unsupported,
}

/// Intended to serve as a contract platform backends must implement.
#[cfg_attr(test, mockall::automock)]
pub trait ActivityResolver {
    fn resolve_current_activity(&mut self) -> Result<Resolution>;
}

/// Window title marker identifying the browser whose address bar gets
/// resolved instead of the title.
const BROWSER_TITLE_MARKER: &str = "Google Chrome";

pub fn is_browser_window(title: &str) -> bool {
    title.contains(BROWSER_TITLE_MARKER)
}

/// Extracts the host from a `scheme://host/...` url, the third `/` delimited
/// segment.
pub fn domain_from_url(url: &str) -> Option<&str> {
    url.split('/').nth(2).filter(|v| !v.is_empty())
}

/// Serves as a cross-compatible resolver implementation.
pub struct GenericResolver {
    inner: Box<dyn ActivityResolver>,
}

impl GenericResolver {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                Ok(Self {
                    inner: Box::new(win::WindowsResolver::new()?),
                })
            }
            else if #[cfg(feature = "x11")] {
                Ok(Self {
                    inner: Box::new(x11::X11Resolver::new()?),
                })
            }
            else {
                Ok(Self {
                    inner: Box::new(UnsupportedResolver::new()),
                })
            }
        }
    }
}

impl ActivityResolver for GenericResolver {
    fn resolve_current_activity(&mut self) -> Result<Resolution> {
        self.inner.resolve_current_activity()
    }
}

/// Fallback for platforms without window introspection. The monitor keeps
/// polling and records nothing.
pub struct UnsupportedResolver {
    notified: bool,
}

impl UnsupportedResolver {
    pub fn new() -> Self {
        Self { notified: false }
    }
}

impl Default for UnsupportedResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityResolver for UnsupportedResolver {
    fn resolve_current_activity(&mut self) -> Result<Resolution> {
        if !self.notified {
            warn!(
                "Platform {} is not supported, no activity will be detected",
                std::env::consts::OS
            );
            self.notified = true;
        }
        Ok(Resolution::Unsupported)
    }
}
