/**
 * PRÉFÉRENCES UTILISATEUR - seuil "espace disque faible"
 *
 * Persistance JSON (comme le registre d'agents) + notification des
 * changements via un canal watch : chaque vue hébergée recalcule sa couleur.
 */

use crate::error::PreferencesError;
use crate::indicator::Thresholds;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::info;

pub const DEFAULT_LOW_DISK_THRESHOLD_GB: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_threshold")]
    pub low_disk_space_threshold_gb: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_LOW_DISK_THRESHOLD_GB
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            low_disk_space_threshold_gb: DEFAULT_LOW_DISK_THRESHOLD_GB,
        }
    }
}

impl Preferences {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds::from_low_disk_gb(self.low_disk_space_threshold_gb)
    }
}

pub struct PreferencesStore {
    path: Option<PathBuf>,
    tx: watch::Sender<Preferences>,
}

impl PreferencesStore {
    /// Store en mémoire uniquement (tests, pas de fichier configuré)
    pub fn in_memory(prefs: Preferences) -> Self {
        let (tx, _rx) = watch::channel(prefs);
        Self { path: None, tx }
    }

    /// Charge les préférences depuis le fichier JSON, défauts s'il n'existe pas
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PreferencesError> {
        let path = path.as_ref().to_path_buf();
        let prefs = if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            let prefs: Preferences = serde_json::from_str(&content)?;
            validate_threshold(prefs.low_disk_space_threshold_gb)?;
            info!(path = %path.display(), threshold_gb = prefs.low_disk_space_threshold_gb, "loaded preferences");
            prefs
        } else {
            info!(path = %path.display(), "no preferences file, using defaults");
            Preferences::default()
        };
        let (tx, _rx) = watch::channel(prefs);
        Ok(Self { path: Some(path), tx })
    }

    /// Défauts, mais rattachés au fichier : la prochaine modification l'écrase
    pub fn defaults_at(path: impl AsRef<Path>) -> Self {
        let (tx, _rx) = watch::channel(Preferences::default());
        Self {
            path: Some(path.as_ref().to_path_buf()),
            tx,
        }
    }

    pub fn get(&self) -> Preferences {
        *self.tx.borrow()
    }

    pub fn thresholds(&self) -> Thresholds {
        self.get().thresholds()
    }

    pub fn subscribe(&self) -> watch::Receiver<Preferences> {
        self.tx.subscribe()
    }

    pub async fn set_low_disk_space_threshold(&self, gb: f64) -> Result<Preferences, PreferencesError> {
        validate_threshold(gb)?;
        let prefs = Preferences {
            low_disk_space_threshold_gb: gb,
        };
        self.save(&prefs).await?;
        self.tx.send_replace(prefs);
        info!(threshold_gb = gb, "low disk space threshold changed");
        Ok(prefs)
    }

    async fn save(&self, prefs: &Preferences) -> Result<(), PreferencesError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_json::to_string_pretty(prefs)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

fn validate_threshold(gb: f64) -> Result<(), PreferencesError> {
    if gb.is_finite() && gb >= 0.0 {
        Ok(())
    } else {
        Err(PreferencesError::InvalidThreshold(gb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferencesStore::load(dir.path().join("prefs.json")).await.unwrap();
        assert_eq!(store.get(), Preferences::default());
        assert_eq!(store.thresholds().warning_bytes, 5_000_000_000);
    }

    #[tokio::test]
    async fn test_set_threshold_persists_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");
        let store = PreferencesStore::load(&path).await.unwrap();
        let mut rx = store.subscribe();

        store.set_low_disk_space_threshold(2.5).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().low_disk_space_threshold_gb, 2.5);

        let reloaded = PreferencesStore::load(&path).await.unwrap();
        assert_eq!(reloaded.get().low_disk_space_threshold_gb, 2.5);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_overwritten_by_next_update() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        assert!(matches!(
            PreferencesStore::load(&path).await,
            Err(PreferencesError::Serialization(_))
        ));
        let store = PreferencesStore::defaults_at(&path);
        assert_eq!(store.get(), Preferences::default());

        store.set_low_disk_space_threshold(1.5).await.unwrap();
        let reloaded = PreferencesStore::load(&path).await.unwrap();
        assert_eq!(reloaded.get().low_disk_space_threshold_gb, 1.5);
    }

    #[tokio::test]
    async fn test_invalid_threshold_rejected() {
        let store = PreferencesStore::in_memory(Preferences::default());
        assert!(store.set_low_disk_space_threshold(-1.0).await.is_err());
        assert!(store.set_low_disk_space_threshold(f64::INFINITY).await.is_err());
        assert_eq!(store.get(), Preferences::default());
    }
}
