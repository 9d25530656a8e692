use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use env_logger::Env;
use log::{debug, info};
use web_time::Instant;

use nifti_volume::{
    Camera, ColorMode, Control, NiftiDecoder, Primitive, PrimitiveId, Renderer, Role, Session,
    Stage, ViewPreset, ViewerConfig,
};

/// Reconstruct brain and mask surfaces and report the resulting scene
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Brain volume (`.nii.gz`)
    #[clap(short, long)]
    brain: PathBuf,

    /// Labeled mask volume (`.nii.gz`)
    #[clap(short, long)]
    mask: PathBuf,

    /// Brain iso-value; defaults to the middle of the scalar range
    #[clap(short, long)]
    threshold: Option<f32>,

    /// Laplacian smoothing iterations for every surface
    #[clap(short, long)]
    smoothness: Option<u32>,

    /// Brain surface opacity
    #[clap(long)]
    brain_opacity: Option<f32>,

    /// Mask surface opacity
    #[clap(long)]
    mask_opacity: Option<f32>,

    /// Maximum number of mask labels to build
    #[clap(long, default_value_t = 10)]
    max_labels: usize,

    /// Mask coloring
    #[clap(long, value_enum, default_value_t = ColorArg::Multi)]
    color: ColorArg,

    /// Camera preset
    #[clap(long, value_enum, default_value_t = ViewArg::Axial)]
    view: ViewArg,

    /// Show the three slice planes
    #[clap(long)]
    slicer: bool,
}

#[derive(ValueEnum, Clone, Copy)]
enum ColorArg {
    Single,
    Multi,
}

#[derive(ValueEnum, Clone, Copy)]
enum ViewArg {
    Axial,
    Coronal,
    Sagittal,
}

/// Renderer that logs every scene mutation and counts frames
#[derive(Default)]
struct LogRenderer {
    frames: usize,
}

impl Renderer for LogRenderer {
    fn add(&mut self, id: PrimitiveId, primitive: &Primitive) {
        debug!("add {id:?}: {}", describe(primitive));
        log_buffers(primitive);
    }

    fn update(&mut self, id: PrimitiveId, primitive: &Primitive) {
        debug!("update {id:?}: {}", describe(primitive));
        log_buffers(primitive);
    }

    fn remove(&mut self, id: PrimitiveId) {
        debug!("remove {id:?}");
    }

    fn set_camera(&mut self, camera: &Camera) {
        debug!(
            "camera at {:?} looking at {:?}, view angle {:.1}",
            camera.position, camera.focal_point, camera.view_angle
        );
    }

    fn render(&mut self) {
        self.frames += 1;
    }
}

/// Sizes of the vertex and index buffers a GPU backend would upload
fn log_buffers(primitive: &Primitive) {
    if let Primitive::Surface { mesh, .. } = primitive {
        let vertices = mesh.geometry.vertices();
        debug!(
            "  buffers: {} vertex bytes, {} index bytes",
            bytemuck::cast_slice::<_, u8>(&vertices[..]).len(),
            mesh.geometry.index_bytes().len()
        );
    }
}

fn describe(primitive: &Primitive) -> String {
    match primitive {
        Primitive::Surface { label, mesh } => format!(
            "surface {label}, {} triangles, opacity {:.2}",
            mesh.geometry.triangle_count(),
            mesh.material.opacity
        ),
        Primitive::Slice(plane) => format!(
            "{:?} slice at {}, opacity {:.2}",
            plane.orientation,
            plane.position(),
            plane.opacity
        ),
        Primitive::Projection(plane) => format!(
            "{:?} projection, opacity {:.2}",
            plane.orientation, plane.opacity
        ),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .init();

    let args = Args::parse();
    let config = ViewerConfig {
        max_mask_labels: args.max_labels,
        ..ViewerConfig::default()
    };
    let mut session = Session::new(LogRenderer::default(), NiftiDecoder, config);
    session.set_path(Role::Brain, &args.brain)?;
    session.set_path(Role::Mask, &args.mask)?;

    let start = Instant::now();
    let mut progress = |stage: Stage, fraction: f32| {
        debug!("{stage:?} {:.0}%", fraction * 100.0);
    };
    session.open(&mut progress)?;
    info!("Loaded volumes in {:?}", start.elapsed());

    let mut controls = Vec::new();
    if let Some(threshold) = args.threshold {
        controls.push(Control::BrainThreshold(threshold));
    }
    if let Some(smoothness) = args.smoothness {
        controls.push(Control::BrainSmoothness(smoothness));
        controls.push(Control::MaskSmoothness(smoothness));
    }
    if let Some(opacity) = args.brain_opacity {
        controls.push(Control::BrainOpacity(opacity));
    }
    if let Some(opacity) = args.mask_opacity {
        controls.push(Control::MaskOpacity(opacity));
    }
    controls.push(Control::MaskColorMode(match args.color {
        ColorArg::Single => ColorMode::Single,
        ColorArg::Multi => ColorMode::Multi,
    }));
    controls.push(Control::Slicer(args.slicer));
    controls.push(Control::View(match args.view {
        ViewArg::Axial => ViewPreset::Axial,
        ViewArg::Coronal => ViewPreset::Coronal,
        ViewArg::Sagittal => ViewPreset::Sagittal,
    }));

    for control in controls {
        let start = Instant::now();
        let class = session.apply(control, &mut progress);
        info!("{control:?}: {class:?} in {:?}", start.elapsed());
    }

    for role in [Role::Brain, Role::Mask] {
        info!(
            "{role}: {} primitives",
            session.scene().count_for_role(role)
        );
    }
    if let Some(labels) = session.mask_labels() {
        for (i, label) in labels.iter().enumerate() {
            match &label.mesh {
                Some(mesh) => info!(
                    "mask label {}: {} triangles",
                    i + 1,
                    mesh.geometry.triangle_count()
                ),
                None => info!("mask label {}: empty, disabled", i + 1),
            }
        }
    }
    info!("Rendered {} frames", session.renderer().frames);
    Ok(())
}
