/**
 * DISPLAY SURFACE - Contrat de sortie des indicateurs
 *
 * L'indicateur ne possède ni layout ni styles : il pousse trois propriétés
 * (dégradé, libellé, visibilité) vers une surface fournie par l'hôte.
 * `MemorySurface` est la surface du kernel, relue par l'API REST.
 */

use crate::indicator::ColorTier;
use parking_lot::Mutex;
use serde::Serialize;

/// Couleur de la partie libre de la barre
pub const REMAINDER_TOKEN: &str = "info";

/// Dégradé de fond : couleur du tier jusqu'à `stop_percent`, puis `info`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gradient {
    pub fill: &'static str,
    pub remainder: &'static str,
    pub stop_percent: f64,
}

impl Gradient {
    pub fn for_usage(tier: ColorTier, used_percent: f64) -> Self {
        Self {
            fill: tier.theme_token(),
            remainder: REMAINDER_TOKEN,
            stop_percent: used_percent,
        }
    }

    pub fn to_css(&self) -> String {
        let p = self.stop_percent;
        format!("linear-gradient(90deg, {} {p}%, {} {p}%)", self.fill, self.remainder)
    }
}

pub trait DisplaySurface: Send + Sync {
    fn set_gradient(&self, gradient: &Gradient);
    fn set_label(&self, text: &str);
    fn set_visible(&self, visible: bool);
}

/// Dernier rendu connu d'une surface mémoire
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SurfaceFrame {
    pub gradient: Option<Gradient>,
    pub background: Option<String>,
    pub label: Option<String>,
    pub visible: bool,
}

#[derive(Default)]
pub struct MemorySurface {
    frame: Mutex<SurfaceFrame>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&self) -> SurfaceFrame {
        self.frame.lock().clone()
    }
}

impl DisplaySurface for MemorySurface {
    fn set_gradient(&self, gradient: &Gradient) {
        let mut frame = self.frame.lock();
        frame.background = Some(gradient.to_css());
        frame.gradient = Some(gradient.clone());
    }

    fn set_label(&self, text: &str) {
        self.frame.lock().label = Some(text.to_string());
    }

    fn set_visible(&self, visible: bool) {
        self.frame.lock().visible = visible;
    }
}
