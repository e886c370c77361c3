use anyhow::{anyhow, Result};
use tracing::error;
use windows::{
    core::Interface,
    Win32::{
        Foundation::HWND,
        System::{
            Com::{
                CoCreateInstance, CoInitializeEx, CoUninitialize, CLSCTX_INPROC_SERVER,
                COINIT_MULTITHREADED,
            },
            Variant::VARIANT,
        },
        UI::{
            Accessibility::{
                CUIAutomation, IUIAutomation, IUIAutomationValuePattern, TreeScope_Subtree,
                UIA_ControlTypePropertyId, UIA_EditControlTypeId, UIA_ValuePatternId,
            },
            WindowsAndMessaging::{GetForegroundWindow, GetWindowTextW},
        },
    },
};

use super::{domain_from_url, is_browser_window, ActivityResolver, Resolution};

#[tracing::instrument]
fn get_foreground_window() -> Result<(HWND, String)> {
    let window = unsafe { GetForegroundWindow() };

    if window.is_invalid() {
        return Err(anyhow!("Failed to get foreground window"));
    }

    let mut text: [u16; 4096] = [0; 4096];
    let len = unsafe { GetWindowTextW(window, &mut text) };
    let title = String::from_utf16_lossy(&text[..len as usize]);

    Ok((window, title))
}

/// Resolver for Windows. Reads the foreground window title through Win32 and,
/// for the recognized browser, the visited url through UI Automation.
pub struct WindowsResolver {
    automation: IUIAutomation,
}

impl WindowsResolver {
    pub fn new() -> Result<Self> {
        unsafe { CoInitializeEx(None, COINIT_MULTITHREADED).ok()? };
        let automation: IUIAutomation =
            unsafe { CoCreateInstance(&CUIAutomation, None, CLSCTX_INPROC_SERVER)? };
        Ok(Self { automation })
    }

    /// Reads the url displayed in the browser's address bar edit control.
    /// The control carries the address without a scheme.
    fn get_browser_url(&self, window: HWND) -> Result<String> {
        unsafe {
            let element = self.automation.ElementFromHandle(window)?;
            let condition = self.automation.CreatePropertyCondition(
                UIA_ControlTypePropertyId,
                &VARIANT::from(UIA_EditControlTypeId.0),
            )?;
            let edit = element.FindFirst(TreeScope_Subtree, &condition)?;
            let pattern: IUIAutomationValuePattern =
                edit.GetCurrentPattern(UIA_ValuePatternId)?.cast()?;
            let value = pattern.CurrentValue()?;
            Ok(format!("https://{}", value))
        }
    }
}

impl Drop for WindowsResolver {
    fn drop(&mut self) {
        unsafe { CoUninitialize() };
    }
}

impl ActivityResolver for WindowsResolver {
    fn resolve_current_activity(&mut self) -> Result<Resolution> {
        let (window, title) = get_foreground_window()
            .inspect_err(|e| error!("Failed to get active window {e:?}"))?;

        if is_browser_window(&title) {
            // The address bar is best effort. A browser mid navigation falls
            // back to its window title.
            match self.get_browser_url(window) {
                Ok(url) => {
                    if let Some(domain) = domain_from_url(&url) {
                        return Ok(Resolution::Activity(domain.to_string()));
                    }
                }
                Err(e) => error!("Failed to read browser address bar {e:?}"),
            }
        }

        Ok(Resolution::Activity(title))
    }
}
