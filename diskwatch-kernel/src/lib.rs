//! diskwatch kernel: feed d'usage disque par noeud et indicateurs associés.
//!
//! - [`feed`] : registre pub/sub des snapshots, par noeud
//! - [`indicator`] : machine à états current/selected + dérivation du rendu
//! - [`preferences`] : seuil "espace disque faible" persisté et notifié
//! - [`views`], [`http`], [`mqtt`] : hébergement des indicateurs par le kernel

pub mod config;
pub mod error;
pub mod feed;
pub mod health;
pub mod http;
pub mod indicator;
pub mod models;
pub mod mqtt;
pub mod preferences;
pub mod size;
pub mod surface;
pub mod views;

use parking_lot::Mutex;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}
