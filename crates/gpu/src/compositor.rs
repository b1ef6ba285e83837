//! Per-frame pass ordering.
//!
//! The plan is data only; the wgpu renderer walks it pass by pass. Layers:
//! the decorative scene through bloom, then flat outlines on top with depth
//! off, then the entity overlay against a freshly cleared depth buffer.

use scene::instances::SizeClass;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// Offscreen color the decorative scene renders into when bloom is on.
    SceneColor,
    BloomA,
    BloomB,
    Surface,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ColorOp {
    Clear([f64; 4]),
    Load,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DepthOp {
    /// No depth attachment.
    Off,
    Clear,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PostEffect {
    BrightExtract,
    BlurHorizontal,
    BlurVertical,
    Composite,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DrawKind {
    Stars,
    Globe,
    Atmosphere,
    AmbientArcs,
    AmbientParticles,
    Post(PostEffect),
    Outlines,
    /// Depth-only sphere that hides far-side entities.
    Occluder,
    Icons(SizeClass),
    Stems,
    SelectedIcon,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassSpec {
    pub label: &'static str,
    pub target: Target,
    /// Textures sampled by the pass, in binding order.
    pub sources: Vec<Target>,
    pub color: ColorOp,
    pub depth: DepthOp,
    pub draws: Vec<DrawKind>,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PlanOptions {
    pub bloom: bool,
    pub clear_color: [f64; 4],
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            bloom: true,
            clear_color: [0.0, 0.0, 0.02, 1.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan {
    passes: Vec<PassSpec>,
}

impl FramePlan {
    pub fn build(options: &PlanOptions) -> Self {
        let scene_draws = vec![
            DrawKind::Stars,
            DrawKind::Globe,
            DrawKind::Atmosphere,
            DrawKind::AmbientArcs,
            DrawKind::AmbientParticles,
        ];
        let mut passes = Vec::with_capacity(8);

        if options.bloom {
            passes.push(PassSpec {
                label: "scene",
                target: Target::SceneColor,
                sources: Vec::new(),
                color: ColorOp::Clear(options.clear_color),
                depth: DepthOp::Clear,
                draws: scene_draws,
            });
            let post = [
                ("bloom_extract", Target::BloomA, vec![Target::SceneColor], PostEffect::BrightExtract),
                ("bloom_blur_h", Target::BloomB, vec![Target::BloomA], PostEffect::BlurHorizontal),
                ("bloom_blur_v", Target::BloomA, vec![Target::BloomB], PostEffect::BlurVertical),
                (
                    "bloom_composite",
                    Target::Surface,
                    vec![Target::SceneColor, Target::BloomA],
                    PostEffect::Composite,
                ),
            ];
            for (label, target, sources, effect) in post {
                passes.push(PassSpec {
                    label,
                    target,
                    sources,
                    color: ColorOp::Clear([0.0, 0.0, 0.0, 1.0]),
                    depth: DepthOp::Off,
                    draws: vec![DrawKind::Post(effect)],
                });
            }
        } else {
            passes.push(PassSpec {
                label: "scene",
                target: Target::Surface,
                sources: Vec::new(),
                color: ColorOp::Clear(options.clear_color),
                depth: DepthOp::Clear,
                draws: scene_draws,
            });
        }

        passes.push(PassSpec {
            label: "outlines",
            target: Target::Surface,
            sources: Vec::new(),
            color: ColorOp::Load,
            depth: DepthOp::Off,
            draws: vec![DrawKind::Outlines],
        });

        let mut overlay = vec![DrawKind::Occluder];
        overlay.extend(SizeClass::ALL.map(DrawKind::Icons));
        overlay.extend([DrawKind::Stems, DrawKind::SelectedIcon]);
        passes.push(PassSpec {
            label: "entities",
            target: Target::Surface,
            sources: Vec::new(),
            color: ColorOp::Load,
            depth: DepthOp::Clear,
            draws: overlay,
        });

        Self { passes }
    }

    pub fn passes(&self) -> &[PassSpec] {
        &self.passes
    }

    /// Whether any pass writes the offscreen targets.
    pub fn uses_offscreen(&self) -> bool {
        self.passes.iter().any(|p| p.target != Target::Surface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn labels(plan: &FramePlan) -> Vec<&'static str> {
        plan.passes().iter().map(|p| p.label).collect()
    }

    #[test]
    fn bloom_plan_orders_scene_post_outlines_entities() {
        let plan = FramePlan::build(&PlanOptions::default());
        assert_eq!(
            labels(&plan),
            vec![
                "scene",
                "bloom_extract",
                "bloom_blur_h",
                "bloom_blur_v",
                "bloom_composite",
                "outlines",
                "entities",
            ]
        );
        assert!(plan.uses_offscreen());
        assert_eq!(plan.passes()[0].target, Target::SceneColor);
        assert_eq!(plan.passes()[4].sources, vec![Target::SceneColor, Target::BloomA]);
    }

    #[test]
    fn outlines_keep_color_and_skip_depth() {
        let plan = FramePlan::build(&PlanOptions::default());
        let outlines = &plan.passes()[5];
        assert_eq!(outlines.color, ColorOp::Load);
        assert_eq!(outlines.depth, DepthOp::Off);
        assert_eq!(outlines.target, Target::Surface);
    }

    #[test]
    fn entity_overlay_clears_depth_only_and_draws_occluder_first() {
        let plan = FramePlan::build(&PlanOptions::default());
        let overlay = plan.passes().last().unwrap();
        assert_eq!(overlay.color, ColorOp::Load);
        assert_eq!(overlay.depth, DepthOp::Clear);
        assert_eq!(overlay.draws[0], DrawKind::Occluder);
        assert_eq!(
            overlay.draws[1..4],
            [
                DrawKind::Icons(SizeClass::Light),
                DrawKind::Icons(SizeClass::Medium),
                DrawKind::Icons(SizeClass::Heavy),
            ]
        );
    }

    #[test]
    fn without_bloom_the_scene_goes_straight_to_the_surface() {
        let plan = FramePlan::build(&PlanOptions {
            bloom: false,
            ..PlanOptions::default()
        });
        assert_eq!(labels(&plan), vec!["scene", "outlines", "entities"]);
        assert!(!plan.uses_offscreen());
        assert!(
            plan.passes()
                .iter()
                .flat_map(|p| &p.draws)
                .all(|d| !matches!(d, DrawKind::Post(_)))
        );
    }
}
