use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;
use wearlink_wire::{Command, ModuleInfo, INFO};

use crate::error::{LinkError, Result};
use crate::link::Link;

/// Modules discovered on the connected board, by module id.
#[derive(Debug, Default, Clone)]
pub struct ModuleDirectory {
    modules: BTreeMap<u8, ModuleInfo>,
}

impl ModuleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, info: ModuleInfo) {
        self.modules.insert(info.module, info);
    }

    pub fn get(&self, module: u8) -> Option<&ModuleInfo> {
        self.modules.get(&module)
    }

    /// Typed probe: true only when the board implements the module.
    /// A module that answered with the no-implementation marker, or never
    /// answered at all, is not present.
    pub fn is_present(&self, module: u8) -> bool {
        self.modules
            .get(&module)
            .map(|info| info.is_present())
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleInfo> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Probe candidate modules by reading each INFO register.
///
/// All requests are issued up front (in ascending candidate order) and
/// awaited in the same order, so discovery latency is one round trip, not
/// one per module. A candidate that never answers is treated as absent
/// unless it is listed in `mandatory`, in which case the whole discovery
/// fails with [`LinkError::Timeout`] — leaving everything already written
/// to `directory` intact.
pub fn discover_modules(
    link: &Link,
    candidates: impl IntoIterator<Item = u8>,
    mandatory: &[u8],
    timeout: Duration,
    directory: &mut ModuleDirectory,
) -> Result<()> {
    let mut inflight = Vec::new();
    for module in candidates {
        let cmd = Command::new(module, INFO, Bytes::new());
        let completion = link.request(&cmd, Some(timeout))?;
        inflight.push((module, completion));
    }

    for (module, completion) in inflight {
        match completion.wait() {
            Ok(frame) => {
                let response = Command::decode(&frame)?;
                let info = ModuleInfo::parse(module, &response.payload)?;
                debug!(module, present = info.is_present(), "module discovered");
                directory.insert(info);
            }
            Err(LinkError::Timeout(elapsed)) => {
                if mandatory.contains(&module) {
                    debug!(module, "mandatory module did not answer");
                    return Err(LinkError::Timeout(elapsed));
                }
                debug!(module, "module absent (no answer)");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
