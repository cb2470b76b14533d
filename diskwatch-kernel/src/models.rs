use crate::error::SnapshotError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Point de montage consommé par les indicateurs
pub const ROOT_MOUNT: &str = "/";

/// Identifiant opaque d'un noeud surveillé
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Un échantillon d'usage disque pour un noeud.
///
/// `free_bytes` reste signé pour que les valeurs aberrantes venant de la
/// télémétrie soient détectées par [`UsageSnapshot::validate`] plutôt que
/// tronquées au décodage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub resource_id: ResourceId,
    pub used_percent: f64,
    pub free_bytes: i64,
}

impl UsageSnapshot {
    pub fn new(resource_id: impl Into<ResourceId>, used_percent: f64, free_bytes: i64) -> Self {
        Self {
            resource_id: resource_id.into(),
            used_percent,
            free_bytes,
        }
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.free_bytes < 0 {
            return Err(SnapshotError::NegativeFree {
                node: self.resource_id.to_string(),
                free: self.free_bytes,
            });
        }
        if !self.used_percent.is_finite() || !(0.0..=100.0).contains(&self.used_percent) {
            return Err(SnapshotError::PercentOutOfRange {
                node: self.resource_id.to_string(),
                percent: self.used_percent,
            });
        }
        Ok(())
    }

    /// Espace libre une fois validé
    pub fn free(&self) -> u64 {
        self.free_bytes.max(0) as u64
    }
}

// Message entrant (sonde → kernel) : diskwatch/nodes/disk-usage@v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    pub node_id: String,
    pub usage: HashMap<String, MountUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountUsage {
    pub used_percent: f64,
    pub free: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used: Option<i64>,
}

impl UsageEvent {
    pub fn from_slice(payload: &[u8]) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Extrait le snapshot du montage racine, seul consommé par les indicateurs
    pub fn into_snapshot(mut self) -> Result<UsageSnapshot, SnapshotError> {
        let root = self
            .usage
            .remove(ROOT_MOUNT)
            .ok_or_else(|| SnapshotError::MissingRootMount(self.node_id.clone()))?;
        let snapshot = UsageSnapshot::new(self.node_id, root.used_percent, root.free);
        snapshot.validate()?;
        Ok(snapshot)
    }
}

/// Décode un payload brut en snapshot validé
pub fn decode_snapshot(payload: &[u8]) -> Result<UsageSnapshot, SnapshotError> {
    UsageEvent::from_slice(payload)?.into_snapshot()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_root_mount_only() {
        let payload = br#"{
            "node_id": "n1",
            "usage": {
                "/": {"used_percent": 72, "free": 2000000000, "total": 8000000000},
                "/data": {"used_percent": 10, "free": 1}
            }
        }"#;
        let snapshot = decode_snapshot(payload).unwrap();
        assert_eq!(snapshot.resource_id, ResourceId::from("n1"));
        assert_eq!(snapshot.used_percent, 72.0);
        assert_eq!(snapshot.free_bytes, 2_000_000_000);
    }

    #[test]
    fn test_decode_missing_root_mount() {
        let payload = br#"{"node_id": "n1", "usage": {"/data": {"used_percent": 10, "free": 1}}}"#;
        assert!(matches!(
            decode_snapshot(payload),
            Err(SnapshotError::MissingRootMount(node)) if node == "n1"
        ));
    }

    #[test]
    fn test_decode_invalid_json() {
        assert!(matches!(decode_snapshot(b"not json"), Err(SnapshotError::Json(_))));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(UsageSnapshot::new("n1", -5.0, 100).validate().is_err());
        assert!(UsageSnapshot::new("n1", 100.5, 100).validate().is_err());
        assert!(UsageSnapshot::new("n1", f64::NAN, 100).validate().is_err());
        assert!(UsageSnapshot::new("n1", 50.0, -1).validate().is_err());
        assert!(UsageSnapshot::new("n1", 0.0, 0).validate().is_ok());
        assert!(UsageSnapshot::new("n1", 100.0, 0).validate().is_ok());
    }
}
