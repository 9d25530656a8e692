use std::time::Duration;

/// Linear RGB, each channel in `[0, 1]`
pub type Rgb = [f32; 3];

pub const BRAIN_COLORS: [Rgb; 1] = [[1.0, 0.9, 0.9]];

pub const MASK_COLORS: [Rgb; 10] = [
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [1.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 0.0, 1.0],
    [0.0, 1.0, 1.0],
    [1.0, 0.5, 0.5],
    [0.5, 1.0, 0.5],
    [0.5, 0.5, 1.0],
    [1.0, 0.5, 0.0],
];

/// Everything the viewer needs that is not read from the volumes themselves
#[derive(Clone, Debug)]
pub struct ViewerConfig {
    pub brain_color: Rgb,
    pub brain_opacity: f32,
    pub brain_smoothness: u32,

    /// Ordered mask palette; label `i` takes `mask_colors[i % len]`
    pub mask_colors: Vec<Rgb>,
    pub mask_opacity: f32,
    pub mask_smoothness: u32,
    /// Upper bound on the number of mask labels built per load
    pub max_mask_labels: usize,

    pub pipeline: PipelineParams,

    /// Initial upper bound of the grayscale value ramp
    pub lookup_value: f32,

    /// Minimum spacing between UI pump ticks during a blocking recompute
    pub pump_interval: Duration,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            brain_color: BRAIN_COLORS[0],
            brain_opacity: 0.2,
            brain_smoothness: 500,
            mask_colors: MASK_COLORS.to_vec(),
            mask_opacity: 1.0,
            mask_smoothness: 500,
            max_mask_labels: 10,
            pipeline: PipelineParams::default(),
            lookup_value: 2.0,
            pump_interval: Duration::from_millis(100),
        }
    }
}

impl ViewerConfig {
    pub fn mask_color(&self, index: usize) -> Rgb {
        if self.mask_colors.is_empty() {
            return MASK_COLORS[index % MASK_COLORS.len()];
        }
        self.mask_colors[index % self.mask_colors.len()]
    }
}

/// Constants of the decimate, smooth and normals stages
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineParams {
    /// Fraction of triangles the decimator tries to remove
    pub target_reduction: f32,
    pub relaxation_factor: f32,
    /// Dihedral angle in degrees above which an edge is split for shading
    pub feature_angle: f32,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            target_reduction: 0.5,
            relaxation_factor: 0.01,
            feature_angle: 60.0,
        }
    }
}

/// Range limits of the numeric pickers
pub mod limits {
    pub const OPACITY: (f32, f32) = (0.0, 1.0);
    pub const SMOOTHNESS: (u32, u32) = (100, 1000);
    pub const LOOKUP_VALUE: (f32, f32) = (0.0, 3.0);
}
