//! Engine configuration, parsed from the optional JSON passed to `init`.
//!
//! Every section falls back to its defaults field by field, so a host only
//! spells out the constants it wants to change.

use gpu::Palette;
use scene::{FxConfig, InstanceConfig, MotionConfig, PickConfig};
use serde::Deserialize;
use thiserror::Error;

use crate::globe_controller::CameraConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderConfig {
    pub bloom: bool,
    /// Brightness above which scene pixels feed the bloom.
    pub bloom_threshold: f32,
    pub bloom_intensity: f32,
    pub clear_color: [f64; 4],
    pub globe_color: [f32; 4],
    pub atmosphere_color: [f32; 4],
    /// Alpha is the outline opacity.
    pub outline_color: [f32; 4],
    pub light_dir: [f32; 3],
    pub stars_alpha: f32,
    pub star_count: u32,
    pub globe_lat_segments: u32,
    pub globe_lon_segments: u32,
    /// Longest outline edge before it is subdivided along the great circle.
    pub outline_max_step_deg: f64,
    /// Outline radius relative to the globe.
    pub outline_lift: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            bloom: true,
            bloom_threshold: 0.55,
            bloom_intensity: 1.1,
            clear_color: [0.0, 0.0, 0.02, 1.0],
            globe_color: [0.02, 0.06, 0.12, 1.0],
            atmosphere_color: [0.25, 0.55, 1.0, 1.0],
            outline_color: [0.45, 0.75, 1.0, 0.55],
            light_dir: [0.4, 0.5, 0.77],
            stars_alpha: 0.85,
            star_count: 2400,
            globe_lat_segments: 64,
            globe_lon_segments: 128,
            outline_max_step_deg: 2.0,
            outline_lift: 1.001,
        }
    }
}

impl RenderConfig {
    pub fn palette(&self) -> Palette {
        Palette {
            globe_color: self.globe_color,
            atmosphere_color: self.atmosphere_color,
            outline_color: self.outline_color,
            light_dir: self.light_dir,
            stars_alpha: self.stars_alpha,
            bloom_threshold: self.bloom_threshold,
            bloom_intensity: self.bloom_intensity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub motion: MotionConfig,
    pub instances: InstanceConfig,
    pub camera: CameraConfig,
    pub picking: PickConfig,
    pub fx: FxConfig,
    pub render: RenderConfig,
    /// Country boundaries as GeoJSON. Empty skips the fetch and uses the
    /// built-in outlines.
    pub outlines_url: String,
    /// `EnvFilter` directive, e.g. `info` or `flight_globe=debug,scene=info`.
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            motion: MotionConfig::default(),
            instances: InstanceConfig::default(),
            camera: CameraConfig::default(),
            picking: PickConfig::default(),
            fx: FxConfig::default(),
            render: RenderConfig::default(),
            outlines_url: "countries.geojson".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Parses `json`; `None`, empty or whitespace-only input yields defaults.
    pub fn from_json(json: Option<&str>) -> Result<Self, ConfigError> {
        let config = match json.map(str::trim) {
            None | Some("") => Self::default(),
            Some(s) => serde_json::from_str(s)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let cam = &self.camera;
        if !(cam.zoom_min > 1.0 && cam.zoom_min <= cam.zoom_max) {
            return Err(invalid(
                "camera.zoomMin",
                format!("need 1 < zoomMin <= zoomMax, got {} / {}", cam.zoom_min, cam.zoom_max),
            ));
        }
        if !(0.0..1.0).contains(&cam.inertia_decay) {
            return Err(invalid(
                "camera.inertiaDecay",
                format!("must be in [0, 1), got {}", cam.inertia_decay),
            ));
        }
        if !(cam.fov_y_deg > 0.0 && cam.fov_y_deg < 180.0) {
            return Err(invalid("camera.fovYDeg", format!("got {}", cam.fov_y_deg)));
        }
        if self.picking.threshold_deg < 0.0 {
            return Err(invalid(
                "picking.thresholdDeg",
                format!("must be non-negative, got {}", self.picking.threshold_deg),
            ));
        }
        if self.fx.min_batch > self.fx.max_batch {
            return Err(invalid(
                "fx.minBatch",
                format!("{} exceeds maxBatch {}", self.fx.min_batch, self.fx.max_batch),
            ));
        }
        if self.fx.spark_speed_min > self.fx.spark_speed_max {
            return Err(invalid("fx.sparkSpeedMin", "exceeds sparkSpeedMax".to_string()));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_input_gives_defaults() {
        assert_eq!(EngineConfig::from_json(None).unwrap(), EngineConfig::default());
        assert_eq!(EngineConfig::from_json(Some("  ")).unwrap(), EngineConfig::default());
    }

    #[test]
    fn named_constants_have_their_documented_defaults() {
        let c = EngineConfig::default();
        assert_eq!(c.motion.snapshot_blend, 0.3);
        assert_eq!(c.picking.threshold_deg, 5.0);
        assert_eq!(c.picking.sphere_scale, 1.02);
        assert_eq!(c.camera.track_fast_window_s, 0.6);
        assert_eq!(c.camera.tap_threshold_px, 8.0);
        assert_eq!(c.camera.inertia_decay, 0.95);
        assert_eq!(c.instances.render_cap, scene::MAX_RENDERED_ENTITIES);
        assert!(c.render.bloom);
    }

    #[test]
    fn partial_sections_override_single_fields() {
        let c = EngineConfig::from_json(Some(
            r#"{"camera":{"zoomMax":4.5},"instances":{"renderCap":10},"logLevel":"debug"}"#,
        ))
        .unwrap();
        assert_eq!(c.camera.zoom_max, 4.5);
        assert_eq!(c.camera.zoom_min, CameraConfig::default().zoom_min);
        assert_eq!(c.instances.render_cap, 10);
        assert_eq!(c.log_level, "debug");
        assert_eq!(c.render, RenderConfig::default());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            EngineConfig::from_json(Some("{camera:")),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn rejects_inverted_zoom_range() {
        let err = EngineConfig::from_json(Some(r#"{"camera":{"zoomMin":5,"zoomMax":2}}"#))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "camera.zoomMin", .. }));
    }

    #[test]
    fn rejects_inverted_batch_bounds() {
        let err =
            EngineConfig::from_json(Some(r#"{"fx":{"minBatch":5,"maxBatch":2}}"#)).unwrap_err();
        assert!(err.to_string().contains("fx.minBatch"));
    }
}
