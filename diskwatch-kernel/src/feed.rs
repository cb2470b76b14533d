/**
 * USAGE FEED - Registre pub/sub des snapshots d'usage disque
 *
 * RÔLE :
 * Découple la télémétrie (MQTT, HTTP) des indicateurs qui l'affichent.
 * Chaque abonnement associe un noeud à un callback ; `publish` livre le
 * snapshot à tous les callbacks du noeud, dans l'ordre d'enregistrement.
 *
 * FONCTIONNEMENT :
 * - Aucun historique : seuls les abonnements vivants sont conservés
 * - Les callbacks sont appelés hors du verrou (ils peuvent se (dés)abonner)
 * - Un callback en erreur ou qui panique n'interrompt pas la livraison
 * - Instance construite explicitement et passée par clone (pas de global)
 */

use crate::models::{ResourceId, UsageSnapshot};
use crate::{new_state, Shared};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

pub type UsageCallback = Arc<dyn Fn(&UsageSnapshot) -> anyhow::Result<()> + Send + Sync>;

/// Preuve d'abonnement, rendue à `unsubscribe`
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping the handle leaves the callback registered"]
pub struct SubscriptionHandle {
    resource_id: ResourceId,
    id: u64,
}

impl SubscriptionHandle {
    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }
}

/// Bilan d'un `publish`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
}

struct Subscriber {
    id: u64,
    callback: UsageCallback,
}

#[derive(Default)]
struct FeedInner {
    next_id: u64,
    subscribers: HashMap<ResourceId, Vec<Subscriber>>,
}

#[derive(Clone)]
pub struct FeedRegistry {
    inner: Shared<FeedInner>,
}

impl FeedRegistry {
    pub fn new() -> Self {
        Self {
            inner: new_state(FeedInner::default()),
        }
    }

    /// Enregistre un callback pour tous les futurs snapshots du noeud
    pub fn subscribe<F>(&self, resource_id: impl Into<ResourceId>, callback: F) -> SubscriptionHandle
    where
        F: Fn(&UsageSnapshot) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let resource_id = resource_id.into();
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .subscribers
            .entry(resource_id.clone())
            .or_default()
            .push(Subscriber { id, callback: Arc::new(callback) });
        debug!(node = %resource_id, subscription = id, "subscribed to usage feed");
        SubscriptionHandle { resource_id, id }
    }

    /// Retire un abonnement. Renvoie `false` (sans erreur) s'il est inconnu.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut inner = self.inner.lock();
        let Some(list) = inner.subscribers.get_mut(&handle.resource_id) else {
            trace!(node = %handle.resource_id, "unsubscribe for unknown node ignored");
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != handle.id);
        let removed = list.len() != before;
        if list.is_empty() {
            inner.subscribers.remove(&handle.resource_id);
        }
        if removed {
            debug!(node = %handle.resource_id, subscription = handle.id, "unsubscribed from usage feed");
        } else {
            trace!(node = %handle.resource_id, subscription = handle.id, "unsubscribe for unknown subscription ignored");
        }
        removed
    }

    /// Livre le snapshot à tous les abonnés du noeud, dans l'ordre d'enregistrement
    pub fn publish(&self, snapshot: &UsageSnapshot) -> PublishReport {
        // copie des callbacks : un désabonnement pendant la livraison vaut pour le publish suivant
        let callbacks: Vec<(u64, UsageCallback)> = {
            let inner = self.inner.lock();
            match inner.subscribers.get(&snapshot.resource_id) {
                Some(list) => list.iter().map(|s| (s.id, s.callback.clone())).collect(),
                None => return PublishReport::default(),
            }
        };

        let mut report = PublishReport::default();
        for (id, callback) in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(snapshot))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    warn!(node = %snapshot.resource_id, subscription = id, "usage callback failed: {e:#}");
                    report.failed += 1;
                }
                Err(_) => {
                    error!(node = %snapshot.resource_id, subscription = id, "usage callback panicked");
                    report.failed += 1;
                }
            }
        }
        report
    }

    pub fn subscriber_count(&self, resource_id: &ResourceId) -> usize {
        self.inner
            .lock()
            .subscribers
            .get(resource_id)
            .map_or(0, Vec::len)
    }

    pub fn total_subscriptions(&self) -> usize {
        self.inner.lock().subscribers.values().map(Vec::len).sum()
    }
}

impl Default for FeedRegistry {
    fn default() -> Self {
        Self::new()
    }
}
