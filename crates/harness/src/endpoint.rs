//! Endpoint description and process-wide port allocation

use std::collections::HashSet;
use std::net::TcpListener;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::error::{HarnessError, HarnessResult};

/// Ports handed out since process start. Concurrently running cases each
/// spawn a real listening service, so a port must never be issued twice
/// even if the OS would currently allow a rebind.
static ALLOCATED_PORTS: Lazy<Mutex<HashSet<u16>>> = Lazy::new(|| Mutex::new(HashSet::new()));

const ALLOCATION_ATTEMPTS: usize = 16;

/// Address pair a single test case owns for its full lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub host: String,
    pub port: u16,
    pub admin_port: Option<u16>,
}

impl ServiceEndpoint {
    /// Allocate a fresh endpoint, with an admin port when the variant
    /// under test exposes an admin interface.
    pub fn allocate(with_admin_port: bool) -> HarnessResult<Self> {
        let port = allocate_port()?;
        let admin_port = if with_admin_port {
            Some(allocate_port()?)
        } else {
            None
        };

        Ok(Self {
            host: "127.0.0.1".to_string(),
            port,
            admin_port,
        })
    }

    pub fn root_url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

/// Find a free port and reserve it for the rest of the process lifetime.
pub fn allocate_port() -> HarnessResult<u16> {
    for _ in 0..ALLOCATION_ATTEMPTS {
        let port = TcpListener::bind("127.0.0.1:0")
            .and_then(|l| l.local_addr())
            .map_err(|e| HarnessError::PortAllocation(e.to_string()))?
            .port();

        let mut allocated = ALLOCATED_PORTS
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if allocated.insert(port) {
            return Ok(port);
        }
        // the OS handed back a port we already reserved; try again
    }

    Err(HarnessError::PortAllocation(format!(
        "no unreserved port found in {} attempts",
        ALLOCATION_ATTEMPTS
    )))
}
