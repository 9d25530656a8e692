use crate::config::{Rgb, ViewerConfig};
use crate::enums::{ExtractionMode, Role};
use crate::mesh::{Material, RenderMesh};
use crate::pipeline::{BuildOutcome, Progress, SurfacePipeline};
use crate::volume::{ScalarRange, Volume};

use log::info;

/// Rendering state of one tissue class
#[derive(Clone, Debug)]
pub struct Label {
    /// The label's own palette color
    pub color: Rgb,
    /// Opacity chosen on the slider, independent of visibility
    pub opacity: f32,
    pub smoothness: u32,
    pub extractor_value: f32,
    pub mesh: Option<RenderMesh>,
    pub visible: bool,
    /// Cleared for good when the label's surface came out empty
    pub enabled: bool,
}

impl Label {
    pub fn new(color: Rgb, opacity: f32, smoothness: u32, extractor_value: f32) -> Self {
        Self {
            color,
            opacity,
            smoothness,
            extractor_value,
            mesh: None,
            visible: true,
            enabled: true,
        }
    }

    /// Material implied by the label's own color, opacity and visibility
    pub fn material(&self) -> Material {
        Material {
            color: self.color,
            opacity: if self.visible { self.opacity } else { 0.0 },
        }
    }

    /// Whether controls may act on this label
    pub fn is_interactive(&self) -> bool {
        self.enabled && self.mesh.is_some()
    }
}

/// Number of mask labels to build: the mask's own maximum, capped
pub fn mask_label_count(scalar_range: ScalarRange, cap: usize) -> usize {
    let max = scalar_range.max.floor();
    if max.is_nan() || max < 1.0 {
        return 0;
    }
    (max as usize).min(cap)
}

/// Ordered labels of one volume, each with its own pipeline
#[derive(Debug)]
pub struct LabelSet {
    role: Role,
    labels: Vec<Label>,
    pipelines: Vec<SurfacePipeline>,
}

impl LabelSet {
    /// Single continuous label at the middle of the scalar range
    pub fn brain(volume: &Volume, config: &ViewerConfig, progress: &mut dyn Progress) -> Self {
        let label = Label::new(
            config.brain_color,
            config.brain_opacity,
            config.brain_smoothness,
            volume.scalar_range().midpoint(),
        );
        let pipeline = SurfacePipeline::new(ExtractionMode::Continuous, config.pipeline);
        let mut set = Self {
            role: Role::Brain,
            labels: vec![label],
            pipelines: vec![pipeline],
        };
        set.build_all(volume, progress);
        set
    }

    /// One discrete label per class id `1..=n`
    pub fn mask(volume: &Volume, config: &ViewerConfig, progress: &mut dyn Progress) -> Self {
        let n = mask_label_count(volume.scalar_range(), config.max_mask_labels);
        info!("Building {n} mask labels for {}", volume.path().display());
        let labels = (0..n)
            .map(|i| {
                Label::new(
                    config.mask_color(i),
                    config.mask_opacity,
                    config.mask_smoothness,
                    (i + 1) as f32,
                )
            })
            .collect();
        let pipelines = (0..n)
            .map(|_| SurfacePipeline::new(ExtractionMode::Discrete, config.pipeline))
            .collect();
        let mut set = Self {
            role: Role::Mask,
            labels,
            pipelines,
        };
        set.build_all(volume, progress);
        set
    }

    fn build_all(&mut self, volume: &Volume, progress: &mut dyn Progress) {
        for (label, pipeline) in self.labels.iter_mut().zip(&mut self.pipelines) {
            pipeline.extract_and_build(volume, label, progress);
        }
    }

    /// Re-runs the pipeline of one label; `None` when the label is not interactive
    pub fn rebuild(
        &mut self,
        index: usize,
        volume: &Volume,
        progress: &mut dyn Progress,
    ) -> Option<BuildOutcome> {
        let label = self.labels.get_mut(index)?;
        if !label.is_interactive() {
            return None;
        }
        Some(self.pipelines[index].extract_and_build(volume, label, progress))
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Label> {
        self.labels.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Label> {
        self.labels.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Label> {
        self.labels.iter_mut()
    }

    /// Indices of labels controls may act on
    pub fn interactive(&self) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, label)| label.is_interactive())
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::tests::{ball, labels};
    use crate::pipeline::NoProgress;
    use ndarray::Array3;

    fn range(max: f32) -> ScalarRange {
        ScalarRange { min: 0.0, max }
    }

    #[test]
    fn mask_count_is_capped_maximum() {
        assert_eq!(mask_label_count(range(14.0), 10), 10);
        assert_eq!(mask_label_count(range(3.0), 10), 3);
        assert_eq!(mask_label_count(range(3.9), 10), 3);
        assert_eq!(mask_label_count(range(0.5), 10), 0);
        assert_eq!(mask_label_count(range(-2.0), 10), 0);
        assert_eq!(mask_label_count(range(14.0), 12), 12);
    }

    #[test]
    fn brain_starts_at_mid_range() {
        let volume = ball(12, 4.0);
        let set = LabelSet::brain(&volume, &ViewerConfig::default(), &mut NoProgress);
        assert_eq!(set.len(), 1);
        assert_eq!(set.role(), Role::Brain);
        let label = set.get(0).unwrap();
        assert_eq!(label.extractor_value, volume.scalar_range().midpoint());
        assert!(label.is_interactive());
    }

    #[test]
    fn mask_labels_take_index_plus_one() {
        let volume = labels(12);
        let config = ViewerConfig::default();
        let set = LabelSet::mask(&volume, &config, &mut NoProgress);
        assert_eq!(set.len(), 2);
        for (i, label) in set.iter().enumerate() {
            assert_eq!(label.extractor_value, (i + 1) as f32);
            assert_eq!(label.color, config.mask_colors[i]);
            assert!(label.is_interactive());
        }
    }

    #[test]
    fn missing_class_is_disabled() {
        // ids 1 and 3 present, 2 absent
        let data = Array3::from_shape_fn((8, 8, 8), |(x, y, z)| match (x, y, z) {
            (2..=3, 2..=3, 2..=3) => 1.0,
            (4..=5, 4..=5, 4..=5) => 3.0,
            _ => 0.0,
        });
        let volume = Volume::new("gap.nii.gz", data, (1.0, 1.0, 1.0));
        let mut set = LabelSet::mask(&volume, &ViewerConfig::default(), &mut NoProgress);
        assert_eq!(set.len(), 3);
        assert_eq!(set.interactive(), vec![0, 2]);

        let absent = set.get(1).unwrap();
        assert!(absent.mesh.is_none());
        assert!(!absent.enabled);
        assert_eq!(set.rebuild(1, &volume, &mut NoProgress), None);
        assert!(set.rebuild(0, &volume, &mut NoProgress).is_some());
        assert_eq!(set.rebuild(5, &volume, &mut NoProgress), None);
    }

    #[test]
    fn hidden_label_material_is_transparent() {
        let mut label = Label::new([1.0, 0.0, 0.0], 0.7, 100, 1.0);
        assert_eq!(label.material().opacity, 0.7);
        label.visible = false;
        assert_eq!(label.material().opacity, 0.0);
        assert_eq!(label.material().color, [1.0, 0.0, 0.0]);
    }
}
