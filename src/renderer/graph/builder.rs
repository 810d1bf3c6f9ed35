//! Frame Graph Builder
//!
//! Decides, once per frame, which passes exist and in which order:
//!
//! 1. Local-light work. With clustered lighting: cookies, one shared
//!    local-shadow pass and the cluster update. Without: one shadow pass per
//!    shadow-casting local light.
//! 2. For each run of render actions, the directional shadows it needs, the
//!    coalesced main pass, and an optional post-process pass.
//!
//! A run is broken when the next action targets another surface, needs
//! directional shadows, or is a grab, when the current action is a grab, when
//! the current action triggers a post-process hook, or at the end of the list.

use log::debug;
use slotmap::SlotMap;

use crate::renderer::device::same_target;
use crate::renderer::graph::pass::MainPass;
use crate::renderer::settings::RendererSettings;
use crate::scene::composition::LayerComposition;
use crate::scene::light::{Light, LightKey};
use crate::scene::render_action::RenderAction;

/// One entry of the frame graph.
#[derive(Debug, Clone, PartialEq)]
pub enum FramePass {
    /// Cookie rendering for all visible local lights (clustered).
    LocalCookies { lights: Vec<LightKey> },
    /// Shared omni/spot shadow rendering, reused by every camera (clustered).
    LocalShadows { lights: Vec<LightKey> },
    /// Cluster refresh; always follows [`FramePass::LocalShadows`].
    UpdateClusters,
    /// Shadow rendering of a single local light (non-clustered).
    LocalShadow { light: LightKey },
    /// Directional shadows for one camera, right before the pass that
    /// contains `action`.
    DirectionalShadows {
        camera: usize,
        action: usize,
        lights: Vec<LightKey>,
    },
    Main(MainPass),
    /// The camera's post-process hook.
    PostProcess { camera: usize },
}

impl FramePass {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::LocalCookies { .. } => "local-cookies",
            Self::LocalShadows { .. } => "local-shadows",
            Self::UpdateClusters => "update-clusters",
            Self::LocalShadow { .. } => "local-shadow",
            Self::DirectionalShadows { .. } => "directional-shadows",
            Self::Main(_) => "main",
            Self::PostProcess { .. } => "postprocess",
        }
    }

    #[inline]
    #[must_use]
    pub fn as_main(&self) -> Option<&MainPass> {
        match self {
            Self::Main(pass) => Some(pass),
            _ => None,
        }
    }
}

/// Ordered pass list of one frame.
#[derive(Debug, Default)]
pub struct FrameGraph {
    passes: Vec<FramePass>,
}

impl FrameGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn passes(&self) -> &[FramePass] {
        &self.passes
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn main_passes(&self) -> impl Iterator<Item = &MainPass> {
        self.passes.iter().filter_map(FramePass::as_main)
    }

    /// Index of the main pass whose range contains `action`.
    #[must_use]
    pub fn pass_containing(&self, action: usize) -> Option<usize> {
        self.passes.iter().position(|p| {
            p.as_main()
                .is_some_and(|m| (m.start..m.end).contains(&action))
        })
    }

    /// Rebuilds the pass list from the composition's current render actions.
    ///
    /// # Panics
    ///
    /// Panics if a render action references a layer or camera index outside
    /// the composition.
    pub fn build(&mut self, composition: &LayerComposition, settings: &RendererSettings) {
        self.passes.clear();

        if settings.clustered_lighting {
            self.passes.push(FramePass::LocalCookies {
                lights: local_lights(composition, |l| l.cookie.is_some()),
            });
            self.passes.push(FramePass::LocalShadows {
                lights: local_lights(composition, |l| l.cast_shadows),
            });
            self.passes.push(FramePass::UpdateClusters);
        } else {
            for light in local_lights(composition, |l| l.cast_shadows) {
                self.passes.push(FramePass::LocalShadow { light });
            }
        }

        let actions = composition.render_actions();
        let mut run_start: Option<usize> = None;

        for (i, action) in actions.iter().enumerate() {
            check_indices(composition, i, action);
            if !is_enabled(composition, action) {
                debug!("Skipping render action {i}: layer or camera disabled");
                continue;
            }

            let shadow_lights = directional_casters(action, &composition.lights);
            if !shadow_lights.is_empty() {
                self.passes.push(FramePass::DirectionalShadows {
                    camera: action.camera,
                    action: i,
                    lights: shadow_lights,
                });
            }

            let start = *run_start.get_or_insert(i);

            let layer = &composition.layers[action.layer];
            let camera = &composition.cameras[action.camera];
            let postprocess = action.trigger_postprocess && camera.on_postprocess.is_some();

            let next = actions[i + 1..]
                .iter()
                .inspect(|a| check_indices(composition, i, a))
                .find(|a| is_enabled(composition, a));
            let boundary = match next {
                None => true,
                Some(next) => {
                    !same_target(next.render_target.as_ref(), action.render_target.as_ref())
                        || !directional_casters(next, &composition.lights).is_empty()
                        || composition.layers[next.layer].is_grab()
                }
            } || layer.is_grab()
                || postprocess;

            if boundary {
                self.passes.push(FramePass::Main(MainPass::coalesce(
                    composition,
                    start,
                    i + 1,
                    &settings.capabilities,
                )));
                if postprocess {
                    self.passes.push(FramePass::PostProcess {
                        camera: action.camera,
                    });
                }
                run_start = None;
            }
        }

        debug!(
            "Frame graph rebuilt: {} passes for {} render actions",
            self.passes.len(),
            actions.len()
        );
    }
}

fn check_indices(composition: &LayerComposition, i: usize, action: &RenderAction) {
    assert!(
        action.layer < composition.layers.len(),
        "render action {i} references missing layer {}",
        action.layer
    );
    assert!(
        action.camera < composition.cameras.len(),
        "render action {i} references missing camera {}",
        action.camera
    );
}

fn is_enabled(composition: &LayerComposition, action: &RenderAction) -> bool {
    composition.layers[action.layer].enabled && composition.cameras[action.camera].enabled
}

/// Directional lights of `action` that still cast shadows.
pub(crate) fn directional_casters(
    action: &RenderAction,
    lights: &SlotMap<LightKey, Light>,
) -> Vec<LightKey> {
    action
        .directional_lights
        .iter()
        .copied()
        .filter(|key| {
            lights
                .get(*key)
                .is_some_and(|light| light.enabled && light.cast_shadows)
        })
        .collect()
}

/// Enabled local lights of all enabled layers matching `filter`, deduplicated
/// in first-seen order.
fn local_lights(composition: &LayerComposition, filter: impl Fn(&Light) -> bool) -> Vec<LightKey> {
    let mut out = Vec::new();
    for layer in composition.layers.iter().filter(|l| l.enabled) {
        for key in layer.lights().local() {
            if out.contains(&key) {
                continue;
            }
            if composition
                .lights
                .get(key)
                .is_some_and(|light| light.enabled && filter(light))
            {
                out.push(key);
            }
        }
    }
    out
}
