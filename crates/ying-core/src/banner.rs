//! Host banner shown at the top of every relayed progress message.

use std::fmt;
use std::net::{IpAddr, UdpSocket};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const EXTERNAL_IP_URL: &str = "https://api.ipify.org";
const EXTERNAL_IP_TIMEOUT: Duration = Duration::from_secs(5);

/// Identity of the machine running a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub user: String,
    pub host: String,
    pub internal_ip: Option<IpAddr>,
    pub external_ip: Option<String>,
    pub cwd: PathBuf,
}

impl HostInfo {
    /// Collect host details. Lookups that fail leave their field empty.
    pub fn detect() -> Self {
        Self {
            user: current_user(),
            host: hostname().unwrap_or_else(|| "localhost".to_string()),
            internal_ip: internal_ip(),
            external_ip: external_ip(),
            cwd: std::env::current_dir().unwrap_or_default(),
        }
    }

    pub fn banner(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for HostInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let internal = self
            .internal_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "?".to_string());
        let external = self.external_ip.as_deref().unwrap_or("?");
        write!(
            f,
            "{}@{}[{}][{}]:{}",
            self.user,
            self.host,
            internal,
            external,
            self.cwd.display()
        )
    }
}

/// Build the banner for the current host.
pub fn format_host_banner() -> String {
    HostInfo::detect().banner()
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(unix)]
fn hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return None;
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Some(String::from_utf8_lossy(&buf[..len]).into_owned())
}

#[cfg(not(unix))]
fn hostname() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}

/// Address of the interface that routes to the public internet.
///
/// Connecting a UDP socket sends no packets; it only selects a route.
fn internal_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

fn external_ip() -> Option<String> {
    let agent = ureq::AgentBuilder::new().timeout(EXTERNAL_IP_TIMEOUT).build();
    match agent.get(EXTERNAL_IP_URL).call() {
        Ok(resp) => resp
            .into_string()
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        Err(e) => {
            debug!(target: "ying::plog", "External IP lookup failed: {}", e);
            None
        }
    }
}
