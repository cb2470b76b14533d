/**
 * ERREURS DU KERNEL
 *
 * Aucune erreur fatale ne sort du coeur : un snapshot invalide est ignoré,
 * un désabonnement inconnu est un no-op, un callback en échec est isolé.
 * Ces types servent aux logs et aux réponses HTTP.
 */

/// Télémétrie inexploitable (MalformedSnapshot)
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("invalid usage payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no root mount entry for node {0}")]
    MissingRootMount(String),
    #[error("negative free space ({free}) for node {node}")]
    NegativeFree { node: String, free: i64 },
    #[error("used percent {percent} out of range for node {node}")]
    PercentOutOfRange { node: String, percent: f64 },
}

/// Erreurs du store de préférences
#[derive(Debug, thiserror::Error)]
pub enum PreferencesError {
    #[error("invalid low disk space threshold: {0} GB")]
    InvalidThreshold(f64),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Erreurs de chargement de kernel.yaml
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
