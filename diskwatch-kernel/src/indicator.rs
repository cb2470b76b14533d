/**
 * INDICATEUR D'USAGE DISQUE
 *
 * RÔLE : Pour la vue d'un noeud, affiche l'espace libre restant sous forme de
 * barre colorée (normal / warning / critical) + libellé "X GB Free".
 *
 * ÉTATS (par slot, "current" et "selected" indépendants) :
 *   Unbound ──set(id)──▶ Bound(id) ──set(autre)──▶ Bound(autre)
 *                           └──set(None)──▶ Unbound
 * Chaque transition désabonne l'ancien noeud avant d'abonner le nouveau.
 * La visibilité exige que le dernier snapshot reçu corresponde à l'un des
 * deux slots : un snapshot en vol pour un noeud quitté est simplement masqué.
 */

use crate::feed::{FeedRegistry, SubscriptionHandle};
use crate::models::{ResourceId, UsageSnapshot};
use crate::preferences::DEFAULT_LOW_DISK_THRESHOLD_GB;
use crate::size::{gb_to_bytes, human_size};
use crate::surface::{DisplaySurface, Gradient};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Seuil critique fixe (0.01 GB)
pub const CRITICAL_THRESHOLD_GB: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorTier {
    Normal,
    Warning,
    Critical,
}

impl ColorTier {
    pub fn theme_token(self) -> &'static str {
        match self {
            ColorTier::Normal => "success",
            ColorTier::Warning => "warning",
            ColorTier::Critical => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Thresholds {
    pub warning_bytes: u64,
    pub critical_bytes: u64,
}

impl Thresholds {
    pub fn from_low_disk_gb(gb: f64) -> Self {
        Self {
            warning_bytes: gb_to_bytes(gb),
            critical_bytes: gb_to_bytes(CRITICAL_THRESHOLD_GB),
        }
    }

    pub fn tier_for(&self, free_bytes: u64) -> ColorTier {
        if free_bytes <= self.critical_bytes {
            ColorTier::Critical
        } else if free_bytes <= self.warning_bytes {
            ColorTier::Warning
        } else {
            ColorTier::Normal
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from_low_disk_gb(DEFAULT_LOW_DISK_THRESHOLD_GB)
    }
}

/// Partie de l'état qui ne dépend que de (snapshot, seuils)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedUsage {
    pub color_tier: ColorTier,
    pub percent_text: String,
    pub free_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorState {
    pub resource_id: ResourceId,
    pub visible: bool,
    pub color_tier: ColorTier,
    pub percent_text: String,
    pub free_label: String,
}

pub fn derive_state(snapshot: &UsageSnapshot, thresholds: &Thresholds) -> DerivedUsage {
    let free = snapshot.free();
    DerivedUsage {
        color_tier: thresholds.tier_for(free),
        percent_text: format!("{}%", snapshot.used_percent),
        free_label: format!("{} Free", human_size(free)),
    }
}

pub fn is_visible(
    snapshot_id: &ResourceId,
    current: Option<&ResourceId>,
    selected: Option<&ResourceId>,
) -> bool {
    current == Some(snapshot_id) || selected == Some(snapshot_id)
}

struct IndicatorCore {
    thresholds: Thresholds,
    current: Option<ResourceId>,
    selected: Option<ResourceId>,
    last_snapshot: Option<UsageSnapshot>,
    state: Option<IndicatorState>,
    surface: Arc<dyn DisplaySurface>,
}

impl IndicatorCore {
    fn on_snapshot(&mut self, snapshot: &UsageSnapshot) {
        if let Err(e) = snapshot.validate() {
            debug!("dropping malformed snapshot: {e}");
            return;
        }
        self.last_snapshot = Some(snapshot.clone());
        self.render();
    }

    fn render(&mut self) {
        let Some(snapshot) = &self.last_snapshot else {
            return;
        };
        let derived = derive_state(snapshot, &self.thresholds);
        let visible = is_visible(
            &snapshot.resource_id,
            self.current.as_ref(),
            self.selected.as_ref(),
        );

        self.surface
            .set_gradient(&Gradient::for_usage(derived.color_tier, snapshot.used_percent));
        self.surface.set_label(&derived.free_label);
        self.surface.set_visible(visible);

        self.state = Some(IndicatorState {
            resource_id: snapshot.resource_id.clone(),
            visible,
            color_tier: derived.color_tier,
            percent_text: derived.percent_text,
            free_label: derived.free_label,
        });
    }

    fn refresh_visibility(&mut self) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let visible = is_visible(&state.resource_id, self.current.as_ref(), self.selected.as_ref());
        if state.visible != visible {
            state.visible = visible;
            self.surface.set_visible(visible);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Current,
    Selected,
}

/// Indicateur lié à une vue. Libère ses abonnements au `dispose` (ou au drop).
pub struct IndicatorRenderer {
    feed: FeedRegistry,
    core: Arc<Mutex<IndicatorCore>>,
    current: Option<SubscriptionHandle>,
    selected: Option<SubscriptionHandle>,
}

impl IndicatorRenderer {
    pub fn new(feed: FeedRegistry, thresholds: Thresholds, surface: Arc<dyn DisplaySurface>) -> Self {
        Self {
            feed,
            core: Arc::new(Mutex::new(IndicatorCore {
                thresholds,
                current: None,
                selected: None,
                last_snapshot: None,
                state: None,
                surface,
            })),
            current: None,
            selected: None,
        }
    }

    pub fn set_current_resource(&mut self, resource_id: Option<ResourceId>) {
        self.rebind(Slot::Current, resource_id);
    }

    pub fn set_selected_resource(&mut self, resource_id: Option<ResourceId>) {
        self.rebind(Slot::Selected, resource_id);
    }

    fn rebind(&mut self, slot: Slot, resource_id: Option<ResourceId>) {
        let handle = match slot {
            Slot::Current => &mut self.current,
            Slot::Selected => &mut self.selected,
        };
        if handle.as_ref().map(SubscriptionHandle::resource_id) == resource_id.as_ref() {
            return;
        }

        if let Some(old) = handle.take() {
            self.feed.unsubscribe(old);
        }

        {
            let mut core = self.core.lock();
            match slot {
                Slot::Current => core.current = resource_id.clone(),
                Slot::Selected => core.selected = resource_id.clone(),
            }
            core.refresh_visibility();
        }

        if let Some(id) = resource_id {
            debug!(node = %id, ?slot, "binding disk usage indicator");
            *handle = Some(self.feed.subscribe(id, snapshot_callback(Arc::downgrade(&self.core))));
        }
    }

    /// Nouveaux seuils : recalcul depuis le dernier snapshot, no-op s'il n'y en a pas
    pub fn apply_thresholds(&self, thresholds: Thresholds) {
        let mut core = self.core.lock();
        core.thresholds = thresholds;
        if core.last_snapshot.is_some() {
            core.render();
        }
    }

    pub fn current_resource(&self) -> Option<ResourceId> {
        self.core.lock().current.clone()
    }

    pub fn selected_resource(&self) -> Option<ResourceId> {
        self.core.lock().selected.clone()
    }

    pub fn thresholds(&self) -> Thresholds {
        self.core.lock().thresholds
    }

    pub fn state(&self) -> Option<IndicatorState> {
        self.core.lock().state.clone()
    }

    pub fn last_snapshot(&self) -> Option<UsageSnapshot> {
        self.core.lock().last_snapshot.clone()
    }

    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        for handle in [self.current.take(), self.selected.take()].into_iter().flatten() {
            self.feed.unsubscribe(handle);
        }
    }
}

impl Drop for IndicatorRenderer {
    fn drop(&mut self) {
        self.release();
    }
}

fn snapshot_callback(
    core: Weak<Mutex<IndicatorCore>>,
) -> impl Fn(&UsageSnapshot) -> anyhow::Result<()> + Send + Sync + 'static {
    move |snapshot: &UsageSnapshot| {
        if let Some(core) = core.upgrade() {
            core.lock().on_snapshot(snapshot);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::MemorySurface;

    const GB: i64 = 1_000_000_000;

    fn renderer(feed: &FeedRegistry) -> (IndicatorRenderer, Arc<MemorySurface>) {
        let surface = Arc::new(MemorySurface::new());
        let r = IndicatorRenderer::new(feed.clone(), Thresholds::from_low_disk_gb(5.0), surface.clone());
        (r, surface)
    }

    #[test]
    fn test_tier_boundaries() {
        let t = Thresholds::from_low_disk_gb(5.0);
        assert_eq!(t.tier_for(t.warning_bytes), ColorTier::Warning);
        assert_eq!(t.tier_for(t.warning_bytes + 1), ColorTier::Normal);
        assert_eq!(t.tier_for(t.critical_bytes), ColorTier::Critical);
        assert_eq!(t.tier_for(t.critical_bytes + 1), ColorTier::Warning);
        assert_eq!(t.tier_for(0), ColorTier::Critical);
    }

    #[test]
    fn test_derive_state_is_pure() {
        let s = UsageSnapshot::new("n1", 72.0, 2 * GB);
        let t = Thresholds::from_low_disk_gb(5.0);
        let a = derive_state(&s, &t);
        assert_eq!(a, derive_state(&s, &t));
        assert_eq!(a.color_tier, ColorTier::Warning);
        assert_eq!(a.percent_text, "72%");
        assert_eq!(a.free_label, "2.0 GB Free");

        let fractional = derive_state(&UsageSnapshot::new("n1", 33.5, 9 * GB), &t);
        assert_eq!(fractional.percent_text, "33.5%");
        assert_eq!(fractional.color_tier, ColorTier::Normal);
    }

    #[test]
    fn test_visibility_predicate() {
        let n1 = ResourceId::from("n1");
        let n2 = ResourceId::from("n2");
        assert!(is_visible(&n1, Some(&n1), None));
        assert!(is_visible(&n1, None, Some(&n1)));
        assert!(is_visible(&n1, Some(&n2), Some(&n1)));
        assert!(!is_visible(&n1, Some(&n2), None));
        assert!(!is_visible(&n1, None, None));
    }

    #[test]
    fn test_first_snapshot_renders() {
        let feed = FeedRegistry::new();
        let (mut r, surface) = renderer(&feed);
        r.set_current_resource(Some("n1".into()));

        feed.publish(&UsageSnapshot::new("n1", 72.0, 2 * GB));

        let state = r.state().unwrap();
        assert!(state.visible);
        assert_eq!(state.color_tier, ColorTier::Warning);
        assert_eq!(state.percent_text, "72%");
        assert_eq!(state.free_label, "2.0 GB Free");

        let frame = surface.frame();
        assert!(frame.visible);
        assert_eq!(frame.label.as_deref(), Some("2.0 GB Free"));
        assert_eq!(
            frame.background.as_deref(),
            Some("linear-gradient(90deg, warning 72%, info 72%)")
        );
    }

    #[test]
    fn test_switch_resource_stops_stale_updates() {
        let feed = FeedRegistry::new();
        let (mut r, _surface) = renderer(&feed);
        r.set_current_resource(Some("a".into()));
        r.set_current_resource(Some("b".into()));

        assert_eq!(feed.subscriber_count(&"a".into()), 0);
        assert_eq!(feed.subscriber_count(&"b".into()), 1);

        let report = feed.publish(&UsageSnapshot::new("a", 50.0, 10 * GB));
        assert_eq!(report.delivered, 0);
        assert!(r.state().is_none());

        feed.publish(&UsageSnapshot::new("b", 50.0, 10 * GB));
        assert_eq!(r.state().unwrap().resource_id, ResourceId::from("b"));
    }

    #[test]
    fn test_in_flight_snapshot_after_switch_is_hidden() {
        let feed = FeedRegistry::new();
        let surface = Arc::new(MemorySurface::new());
        let r = Arc::new(Mutex::new(IndicatorRenderer::new(
            feed.clone(),
            Thresholds::from_low_disk_gb(5.0),
            surface.clone(),
        )));

        // enregistré avant le renderer : bascule vers "b" pendant la livraison de "a"
        let switcher = r.clone();
        let _switch = feed.subscribe("a", move |_: &UsageSnapshot| {
            switcher.lock().set_current_resource(Some("b".into()));
            Ok(())
        });
        r.lock().set_current_resource(Some("a".into()));

        let report = feed.publish(&UsageSnapshot::new("a", 50.0, 10 * GB));
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 0);

        let r = r.lock();
        assert_eq!(r.current_resource(), Some(ResourceId::from("b")));
        let state = r.state().unwrap();
        assert_eq!(state.resource_id, ResourceId::from("a"));
        assert!(!state.visible);
        assert!(!surface.frame().visible);
        assert_eq!(feed.subscriber_count(&"a".into()), 1);
    }

    #[test]
    fn test_rebinding_same_resource_keeps_subscription() {
        let feed = FeedRegistry::new();
        let (mut r, _surface) = renderer(&feed);
        r.set_current_resource(Some("n1".into()));
        r.set_current_resource(Some("n1".into()));
        assert_eq!(feed.subscriber_count(&"n1".into()), 1);
    }

    #[test]
    fn test_malformed_snapshot_keeps_previous_render() {
        let feed = FeedRegistry::new();
        let (mut r, surface) = renderer(&feed);
        r.set_current_resource(Some("n1".into()));
        feed.publish(&UsageSnapshot::new("n1", 40.0, 20 * GB));
        let before = (r.state(), surface.frame());

        feed.publish(&UsageSnapshot::new("n1", -5.0, 100));
        feed.publish(&UsageSnapshot::new("n1", 10.0, -1));

        assert_eq!((r.state(), surface.frame()), before);
    }

    #[test]
    fn test_malformed_first_snapshot_renders_nothing() {
        let feed = FeedRegistry::new();
        let (mut r, surface) = renderer(&feed);
        r.set_current_resource(Some("n1".into()));
        feed.publish(&UsageSnapshot::new("n1", -5.0, 100));
        assert!(r.state().is_none());
        assert_eq!(surface.frame(), crate::surface::SurfaceFrame::default());
    }

    #[test]
    fn test_selected_slot_is_independent() {
        let feed = FeedRegistry::new();
        let (mut r, surface) = renderer(&feed);
        r.set_current_resource(Some("n1".into()));
        r.set_selected_resource(Some("n2".into()));

        feed.publish(&UsageSnapshot::new("n2", 10.0, 50 * GB));
        assert!(r.state().unwrap().visible);

        // quitter n2 masque le rendu de n2, n1 reste abonné
        r.set_selected_resource(None);
        assert!(!r.state().unwrap().visible);
        assert!(!surface.frame().visible);
        assert_eq!(feed.subscriber_count(&"n1".into()), 1);
        assert_eq!(feed.subscriber_count(&"n2".into()), 0);
    }

    #[test]
    fn test_apply_thresholds_rederives_color() {
        let feed = FeedRegistry::new();
        let (mut r, surface) = renderer(&feed);

        // pas encore de snapshot : no-op
        r.apply_thresholds(Thresholds::from_low_disk_gb(1.0));
        assert!(r.state().is_none());
        assert_eq!(surface.frame(), crate::surface::SurfaceFrame::default());

        r.set_current_resource(Some("n1".into()));
        feed.publish(&UsageSnapshot::new("n1", 72.0, 2 * GB));
        assert_eq!(r.state().unwrap().color_tier, ColorTier::Normal);

        r.apply_thresholds(Thresholds::from_low_disk_gb(5.0));
        assert_eq!(r.state().unwrap().color_tier, ColorTier::Warning);
        assert_eq!(
            surface.frame().background.as_deref(),
            Some("linear-gradient(90deg, warning 72%, info 72%)")
        );
    }

    #[test]
    fn test_dispose_and_drop_release_subscriptions() {
        let feed = FeedRegistry::new();
        let (mut r, _surface) = renderer(&feed);
        r.set_current_resource(Some("n1".into()));
        r.set_selected_resource(Some("n2".into()));
        assert_eq!(feed.total_subscriptions(), 2);
        r.dispose();
        assert_eq!(feed.total_subscriptions(), 0);

        {
            let (mut r, _surface) = renderer(&feed);
            r.set_current_resource(Some("n1".into()));
            assert_eq!(feed.total_subscriptions(), 1);
        }
        assert_eq!(feed.total_subscriptions(), 0);
    }
}
