//! Disk usage sampling for diskwatch probes
//!
//! One entry per configured mount point, in the shape the kernel expects
//! under `usage` in a disk-usage@v1 event.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use sysinfo::Disks;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("none of the configured mount points were found: {0:?}")]
    NoMatchingMount(Vec<String>),
}

/// Usage of one mounted filesystem (bytes)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MountUsage {
    pub used_percent: f64,
    pub free: u64,
    pub total: u64,
    pub used: u64,
}

impl MountUsage {
    pub fn from_space(total: u64, available: u64) -> Self {
        let available = available.min(total);
        let used = total - available;
        let used_percent = if total > 0 {
            // une décimale, comme psutil
            ((used as f64 / total as f64) * 1000.0).round() / 10.0
        } else {
            0.0
        };
        Self {
            used_percent,
            free: available,
            total,
            used,
        }
    }
}

/// Outgoing event (matches disk-usage@v1 contract)
#[derive(Debug, Clone, Serialize)]
pub struct UsageEvent {
    pub node_id: String,
    pub usage: BTreeMap<String, MountUsage>,
}

pub fn collect_usage(mounts: &[String]) -> Result<BTreeMap<String, MountUsage>, ProbeError> {
    let disks = Disks::new_with_refreshed_list();
    let mut usage = BTreeMap::new();

    for mount in mounts {
        let found = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new(mount));
        match found {
            Some(disk) => {
                let entry = MountUsage::from_space(disk.total_space(), disk.available_space());
                debug!("{}: {:.1}% used, {} bytes free", mount, entry.used_percent, entry.free);
                usage.insert(mount.clone(), entry);
            }
            None => warn!("Mount point {} not found, skipping", mount),
        }
    }

    if usage.is_empty() {
        return Err(ProbeError::NoMatchingMount(mounts.to_vec()));
    }
    Ok(usage)
}
