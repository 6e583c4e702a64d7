//! Zoom state for the document viewer
//!
//! Owns the current render scale and turns zoom commands into render
//! effects. Every mutation is clamped into [`RenderScale::MIN`]..=[`RenderScale::MAX`].

use serde::{Deserialize, Serialize};

/// Zoom level used to rasterize pages (1.0 = one pixel per PDF point)
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f32", into = "f32")]
pub struct RenderScale(f32);

impl RenderScale {
    /// Minimum allowed scale
    pub const MIN: f32 = 0.5;
    /// Maximum allowed scale
    pub const MAX: f32 = 5.0;

    /// Create a scale, clamping into the valid range
    #[must_use]
    pub fn new(value: f32) -> Self {
        Self(Self::clamp_factor(value))
    }

    /// Returns the raw scale value
    #[must_use]
    pub fn get(self) -> f32 {
        self.0
    }

    /// Clamp factor to valid range, handling NaN/Inf
    #[must_use]
    pub fn clamp_factor(factor: f32) -> f32 {
        if !factor.is_finite() {
            1.0
        } else {
            factor.clamp(Self::MIN, Self::MAX)
        }
    }
}

impl Default for RenderScale {
    fn default() -> Self {
        Self(1.0)
    }
}

impl From<f32> for RenderScale {
    fn from(value: f32) -> Self {
        Self::new(value)
    }
}

impl From<RenderScale> for f32 {
    fn from(scale: RenderScale) -> Self {
        scale.0
    }
}

impl std::fmt::Display for RenderScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.0}%", self.0 * 100.0)
    }
}

/// How the initial scale and zoom step are chosen
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScalePolicy {
    /// Scale added or removed by one zoom action
    pub step: f32,
    /// Initial scale for viewports narrower than `narrow_breakpoint_px`
    pub narrow_scale: RenderScale,
    /// Initial scale for everything else
    pub wide_scale: RenderScale,
    /// Width below which a viewport counts as narrow
    pub narrow_breakpoint_px: u32,
}

impl Default for ScalePolicy {
    fn default() -> Self {
        Self {
            step: 0.25,
            narrow_scale: RenderScale::new(0.8),
            wide_scale: RenderScale::new(1.2),
            narrow_breakpoint_px: 768,
        }
    }
}

impl ScalePolicy {
    /// Pick the scale a freshly opened viewer starts at
    #[must_use]
    pub fn initial_scale(&self, viewport_width_px: u32) -> RenderScale {
        if viewport_width_px < self.narrow_breakpoint_px {
            self.narrow_scale
        } else {
            self.wide_scale
        }
    }
}

/// Commands that modify the zoom state
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    /// Zoom in by one step
    ZoomIn,
    /// Zoom out by one step
    ZoomOut,
    /// Set an absolute scale
    SetScale(f32),
    /// Choose the initial scale for a viewer that is being opened
    Reset { viewport_width_px: u32 },
    /// A document handle became available or went away
    SetDocumentLoaded(bool),
}

/// Effects produced by zoom state changes
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Effect {
    /// Re-render every page of the loaded document at this scale
    RerenderAll(RenderScale),
}

/// Viewport controller: current scale plus whether there is anything to render
#[derive(Debug)]
pub struct Zoom {
    scale: RenderScale,
    policy: ScalePolicy,
    document_loaded: bool,
}

impl Default for Zoom {
    fn default() -> Self {
        Self::new(ScalePolicy::default())
    }
}

impl Zoom {
    #[must_use]
    pub fn new(policy: ScalePolicy) -> Self {
        Self {
            scale: RenderScale::default(),
            policy,
            document_loaded: false,
        }
    }

    /// Returns the current scale
    #[must_use]
    pub fn scale(&self) -> RenderScale {
        self.scale
    }

    #[must_use]
    pub fn policy(&self) -> &ScalePolicy {
        &self.policy
    }

    #[must_use]
    pub fn is_document_loaded(&self) -> bool {
        self.document_loaded
    }

    /// Zoom in by one step
    pub fn zoom_in(&mut self) -> Vec<Effect> {
        self.apply(Command::ZoomIn)
    }

    /// Zoom out by one step
    pub fn zoom_out(&mut self) -> Vec<Effect> {
        self.apply(Command::ZoomOut)
    }

    /// Set an absolute scale, clamped into range
    pub fn set_scale(&mut self, value: f32) -> Vec<Effect> {
        self.apply(Command::SetScale(value))
    }

    /// Apply a command and return resulting effects
    ///
    /// Scale mutations always produce a re-render when a document is loaded,
    /// even when clamping leaves the value unchanged. Without a document the
    /// new scale is only recorded.
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::ZoomIn => {
                self.scale = RenderScale::new(self.scale.get() + self.policy.step);
                self.rerender()
            }

            Command::ZoomOut => {
                self.scale = RenderScale::new(self.scale.get() - self.policy.step);
                self.rerender()
            }

            Command::SetScale(value) => {
                self.scale = RenderScale::new(value);
                self.rerender()
            }

            Command::Reset { viewport_width_px } => {
                self.scale = self.policy.initial_scale(viewport_width_px);
                self.document_loaded = false;
                vec![]
            }

            Command::SetDocumentLoaded(loaded) => {
                self.document_loaded = loaded;
                if loaded {
                    vec![Effect::RerenderAll(self.scale)]
                } else {
                    vec![]
                }
            }
        }
    }

    fn rerender(&self) -> Vec<Effect> {
        if self.document_loaded {
            vec![Effect::RerenderAll(self.scale)]
        } else {
            vec![]
        }
    }
}
