//! Sending the user somewhere else
//!
//! Signing in with an account switch hands the user to the identity
//! provider's page. In a native process that means opening the system
//! browser; library users that drive their own UI plug in their own
//! `Navigator`.

use std::io;
use std::process::Command;

/// Something that can take the user to a URL
pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &str) -> io::Result<()>;
}

/// Does nothing; the caller acts on the returned redirect URL itself
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, _url: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Opens URLs in the platform's default browser
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl Navigator for SystemBrowser {
    fn navigate(&self, url: &str) -> io::Result<()> {
        tracing::info!("Opening browser at {}", url);
        browser_command(url).spawn()?;
        Ok(())
    }
}

#[cfg(target_os = "macos")]
fn browser_command(url: &str) -> Command {
    let mut cmd = Command::new("open");
    cmd.arg(url);
    cmd
}

#[cfg(target_os = "windows")]
fn browser_command(url: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/c", "start", "", url]);
    cmd
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn browser_command(url: &str) -> Command {
    let mut cmd = Command::new("xdg-open");
    cmd.arg(url);
    cmd
}
