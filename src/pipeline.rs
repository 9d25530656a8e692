//! The reconstruction pipeline: extract, decimate, smooth, estimate normals.
//!
//! Every stage runs synchronously on the caller's thread and reports through
//! a [`Progress`] sink. Callers that drive a UI wrap their event loop's
//! "process pending events" hook in an [`EventPump`] so long recomputes keep
//! the shell responsive without hidden sleeps.

use crate::config::PipelineParams;
use crate::decimate::decimate;
use crate::enums::ExtractionMode;
use crate::extract::extract_surface;
use crate::label::Label;
use crate::mesh::{RenderMesh, TriMesh};
use crate::normals::compute_normals;
use crate::smooth::smooth;
use crate::volume::Volume;

use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use web_time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Decimate,
    Smooth,
    Normals,
}

/// Receives periodic reports from long-running stages.
///
/// `fraction` is the completed share of `stage`, in `[0, 1]`.
pub trait Progress {
    fn tick(&mut self, stage: Stage, fraction: f32);
}

impl<F: FnMut(Stage, f32)> Progress for F {
    fn tick(&mut self, stage: Stage, fraction: f32) {
        self(stage, fraction)
    }
}

/// Discards all reports
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn tick(&mut self, _stage: Stage, _fraction: f32) {}
}

/// Forwards progress ticks to a UI pump at most once per `interval`
pub struct EventPump<F: FnMut()> {
    pump: F,
    interval: Duration,
    last: Option<Instant>,
    pumped: usize,
}

impl<F: FnMut()> EventPump<F> {
    pub fn new(interval: Duration, pump: F) -> Self {
        Self {
            pump,
            interval,
            last: None,
            pumped: 0,
        }
    }

    /// How many times the pump has run
    pub fn pumped(&self) -> usize {
        self.pumped
    }
}

impl<F: FnMut()> Progress for EventPump<F> {
    fn tick(&mut self, _stage: Stage, _fraction: f32) {
        let now = Instant::now();
        let due = self
            .last
            .is_none_or(|last| now.duration_since(last) >= self.interval);
        if due {
            (self.pump)();
            self.pumped += 1;
            self.last = Some(now);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildOutcome {
    Built { triangles: usize },
    /// Nothing crosses the iso-value; the label is disabled
    Empty,
}

/// One reconstruction chain for a single (volume, label) pair.
///
/// The raw extraction is cached per extractor value, so a smoothness change
/// restarts at decimation.
#[derive(Debug)]
pub struct SurfacePipeline {
    mode: ExtractionMode,
    params: PipelineParams,
    extracted: Option<(f32, Arc<TriMesh>)>,
}

impl SurfacePipeline {
    pub fn new(mode: ExtractionMode, params: PipelineParams) -> Self {
        Self {
            mode,
            params,
            extracted: None,
        }
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    /// Rebuilds `label.mesh` for the label's current value and smoothness.
    ///
    /// An existing mesh keeps its material; only the geometry is replaced.
    pub fn extract_and_build(
        &mut self,
        volume: &Volume,
        label: &mut Label,
        progress: &mut dyn Progress,
    ) -> BuildOutcome {
        let start = Instant::now();
        let raw = self.extraction(volume, label.extractor_value, progress);
        if raw.is_empty() {
            debug!(
                "no surface at {} in {}, disabling label",
                label.extractor_value,
                volume.path().display()
            );
            label.mesh = None;
            label.enabled = false;
            return BuildOutcome::Empty;
        }

        let decimated = decimate(&raw, self.params.target_reduction, progress);
        let smoothed = smooth(
            &decimated,
            label.smoothness,
            self.params.relaxation_factor,
            progress,
        );
        let geometry = compute_normals(&smoothed, self.params.feature_angle, progress);
        let triangles = geometry.triangle_count();

        let material = label
            .mesh
            .as_ref()
            .map_or_else(|| label.material(), |mesh| mesh.material);
        label.mesh = Some(RenderMesh::new(geometry, material));

        info!(
            "Built {:?} surface at {} ({} triangles) in {:?}",
            self.mode,
            label.extractor_value,
            triangles,
            start.elapsed()
        );
        BuildOutcome::Built { triangles }
    }

    fn extraction(
        &mut self,
        volume: &Volume,
        value: f32,
        progress: &mut dyn Progress,
    ) -> Arc<TriMesh> {
        if let Some((cached, mesh)) = &self.extracted {
            if *cached == value {
                return mesh.clone();
            }
        }
        let mesh = Arc::new(extract_surface(volume, value, self.mode, progress));
        self.extracted = Some((value, mesh.clone()));
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::tests::{ball, labels};

    fn brain_label(value: f32) -> Label {
        Label::new([1.0, 0.9, 0.9], 0.2, 100, value)
    }

    #[test]
    fn builds_a_mesh_with_normals() {
        let volume = ball(14, 4.5);
        let mut pipeline = SurfacePipeline::new(ExtractionMode::Continuous, PipelineParams::default());
        let mut label = brain_label(500.0);
        let outcome = pipeline.extract_and_build(&volume, &mut label, &mut NoProgress);

        let mesh = label.mesh.as_ref().unwrap();
        assert_eq!(
            outcome,
            BuildOutcome::Built {
                triangles: mesh.geometry.triangle_count()
            }
        );
        assert_eq!(mesh.geometry.normals.len(), mesh.geometry.vertex_count());
        assert_eq!(mesh.material.opacity, 0.2);
        assert!(label.enabled);
    }

    #[test]
    fn nan_sample_near_the_surface_stays_local() {
        let clean = ball(14, 4.5);
        let mut data = clean.data().clone();
        data[[6, 6, 11]] = f32::NAN;
        let volume = Volume::new("ball.nii.gz", data, (1.0, 1.0, 1.0));

        let mut pipeline = SurfacePipeline::new(ExtractionMode::Continuous, PipelineParams::default());
        let mut label = brain_label(500.0);
        let outcome = pipeline.extract_and_build(&volume, &mut label, &mut NoProgress);
        assert!(matches!(outcome, BuildOutcome::Built { .. }));

        let mesh = &label.mesh.as_ref().unwrap().geometry;
        assert!(mesh.positions.iter().flatten().all(|c| c.is_finite()));
        assert!(mesh.normals.iter().flatten().all(|c| c.is_finite()));
        let bounds = mesh.bounds().unwrap();
        assert!(bounds.min.iter().chain(bounds.max.iter()).all(|c| c.is_finite()));
    }

    #[test]
    fn empty_extraction_disables_label() {
        let volume = labels(12);
        let mut pipeline = SurfacePipeline::new(ExtractionMode::Discrete, PipelineParams::default());
        let mut label = brain_label(7.0);
        let outcome = pipeline.extract_and_build(&volume, &mut label, &mut NoProgress);
        assert_eq!(outcome, BuildOutcome::Empty);
        assert!(label.mesh.is_none());
        assert!(!label.enabled);
    }

    #[test]
    fn rebuild_with_same_inputs_is_identical() {
        let volume = ball(14, 4.5);
        let mut pipeline = SurfacePipeline::new(ExtractionMode::Continuous, PipelineParams::default());
        let mut label = brain_label(480.0);
        pipeline.extract_and_build(&volume, &mut label, &mut NoProgress);
        let first = label.mesh.clone().unwrap();
        pipeline.extract_and_build(&volume, &mut label, &mut NoProgress);
        let second = label.mesh.clone().unwrap();
        assert_eq!(first.geometry.vertex_count(), second.geometry.vertex_count());
        assert_eq!(first.geometry.triangle_count(), second.geometry.triangle_count());
        assert_eq!(*first.geometry, *second.geometry);
    }

    #[test]
    fn smoothness_change_reuses_extraction() {
        let volume = ball(14, 4.5);
        let mut pipeline = SurfacePipeline::new(ExtractionMode::Continuous, PipelineParams::default());
        let mut label = brain_label(500.0);
        pipeline.extract_and_build(&volume, &mut label, &mut NoProgress);

        let mut stages = Vec::new();
        label.smoothness = 300;
        let mut record = |stage: Stage, _: f32| stages.push(stage);
        pipeline.extract_and_build(&volume, &mut label, &mut record);
        assert!(!stages.contains(&Stage::Extract));
        assert!(stages.contains(&Stage::Smooth));

        stages.clear();
        label.extractor_value = 520.0;
        let mut record = |stage: Stage, _: f32| stages.push(stage);
        pipeline.extract_and_build(&volume, &mut label, &mut record);
        assert!(stages.contains(&Stage::Extract));
    }

    #[test]
    fn rebuild_keeps_material() {
        let volume = ball(12, 4.0);
        let mut pipeline = SurfacePipeline::new(ExtractionMode::Continuous, PipelineParams::default());
        let mut label = brain_label(500.0);
        pipeline.extract_and_build(&volume, &mut label, &mut NoProgress);
        label.mesh.as_mut().unwrap().material.opacity = 0.0;
        label.smoothness = 200;
        pipeline.extract_and_build(&volume, &mut label, &mut NoProgress);
        assert_eq!(label.mesh.unwrap().material.opacity, 0.0);
    }

    #[test]
    fn event_pump_throttles() {
        let mut calls = 0;
        let mut pump = EventPump::new(Duration::from_secs(3600), || calls += 1);
        for _ in 0..10 {
            pump.tick(Stage::Smooth, 0.5);
        }
        assert_eq!(pump.pumped(), 1);
        drop(pump);
        assert_eq!(calls, 1);

        let mut eager = EventPump::new(Duration::ZERO, || {});
        for _ in 0..5 {
            eager.tick(Stage::Extract, 0.1);
        }
        assert_eq!(eager.pumped(), 5);
    }
}
