/**
 * VUES HÉBERGÉES - un indicateur par panneau de dashboard
 *
 * RÔLE : Le kernel joue le rôle d'hôte d'affichage. Chaque vue nommée
 * possède un IndicatorRenderer et une MemorySurface ; l'API REST pilote les
 * slots current/selected et relit le rendu.
 */

use crate::feed::FeedRegistry;
use crate::indicator::{IndicatorRenderer, IndicatorState, Thresholds};
use crate::models::ResourceId;
use crate::preferences::Preferences;
use crate::surface::{MemorySurface, SurfaceFrame};
use crate::{new_state, Shared};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

struct IndicatorView {
    renderer: IndicatorRenderer,
    surface: Arc<MemorySurface>,
    created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewSnapshot {
    pub name: String,
    pub current_node: Option<ResourceId>,
    pub selected_node: Option<ResourceId>,
    pub state: Option<IndicatorState>,
    pub frame: SurfaceFrame,
    pub thresholds: Thresholds,
    pub created_at: String,
}

fn to_snapshot(name: &str, view: &IndicatorView) -> ViewSnapshot {
    ViewSnapshot {
        name: name.to_string(),
        current_node: view.renderer.current_resource(),
        selected_node: view.renderer.selected_resource(),
        state: view.renderer.state(),
        frame: view.surface.frame(),
        thresholds: view.renderer.thresholds(),
        created_at: view.created_at.format(&Rfc3339).unwrap_or_default(),
    }
}

#[derive(Clone)]
pub struct ViewRegistry {
    feed: FeedRegistry,
    views: Shared<BTreeMap<String, IndicatorView>>,
    thresholds: Shared<Thresholds>,
}

impl ViewRegistry {
    pub fn new(feed: FeedRegistry, thresholds: Thresholds) -> Self {
        Self {
            feed,
            views: new_state(BTreeMap::new()),
            thresholds: new_state(thresholds),
        }
    }

    /// Crée la vue si absente. Renvoie `true` si elle vient d'être créée.
    pub fn ensure_view(&self, name: &str) -> bool {
        let mut views = self.views.lock();
        if views.contains_key(name) {
            return false;
        }
        let surface = Arc::new(MemorySurface::new());
        let renderer = IndicatorRenderer::new(self.feed.clone(), *self.thresholds.lock(), surface.clone());
        views.insert(
            name.to_string(),
            IndicatorView {
                renderer,
                surface,
                created_at: OffsetDateTime::now_utc(),
            },
        );
        info!(view = name, "created indicator view");
        true
    }

    /// Supprime la vue et libère ses abonnements
    pub fn remove_view(&self, name: &str) -> bool {
        let removed = self.views.lock().remove(name);
        match removed {
            Some(view) => {
                view.renderer.dispose();
                info!(view = name, "removed indicator view");
                true
            }
            None => false,
        }
    }

    pub fn set_current(&self, name: &str, node: Option<ResourceId>) -> Option<ViewSnapshot> {
        let mut views = self.views.lock();
        let view = views.get_mut(name)?;
        view.renderer.set_current_resource(node);
        Some(to_snapshot(name, view))
    }

    pub fn set_selected(&self, name: &str, node: Option<ResourceId>) -> Option<ViewSnapshot> {
        let mut views = self.views.lock();
        let view = views.get_mut(name)?;
        view.renderer.set_selected_resource(node);
        Some(to_snapshot(name, view))
    }

    pub fn get(&self, name: &str) -> Option<ViewSnapshot> {
        let views = self.views.lock();
        views.get(name).map(|v| to_snapshot(name, v))
    }

    pub fn list(&self) -> Vec<ViewSnapshot> {
        self.views
            .lock()
            .iter()
            .map(|(name, v)| to_snapshot(name, v))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.views.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn apply_thresholds(&self, thresholds: Thresholds) {
        *self.thresholds.lock() = thresholds;
        let views = self.views.lock();
        for view in views.values() {
            view.renderer.apply_thresholds(thresholds);
        }
        debug!(views = views.len(), warning_bytes = thresholds.warning_bytes, "thresholds applied");
    }

    /// Suit les changements de préférences et les pousse à toutes les vues
    pub fn spawn_threshold_listener(&self, mut rx: watch::Receiver<Preferences>) -> JoinHandle<()> {
        let views = self.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let thresholds = rx.borrow_and_update().thresholds();
                views.apply_thresholds(thresholds);
            }
        })
    }
}
