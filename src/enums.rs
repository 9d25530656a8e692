#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Axial,
        Orientation::Coronal,
        Orientation::Sagittal,
    ];

    /// Position in [`Orientation::ALL`]
    pub fn index(self) -> usize {
        match self {
            Orientation::Axial => 0,
            Orientation::Coronal => 1,
            Orientation::Sagittal => 2,
        }
    }

    /// Index of the volume axis this plane is perpendicular to (x = 0, y = 1, z = 2)
    pub fn normal_axis(self) -> usize {
        match self {
            Orientation::Axial => 2,
            Orientation::Coronal => 1,
            Orientation::Sagittal => 0,
        }
    }
}

/// Which of the two loaded volumes a piece of state belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Brain,
    Mask,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Brain => write!(f, "brain"),
            Role::Mask => write!(f, "mask"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Interpolated crossing of a smoothly varying field
    Continuous,
    /// Boundary of the voxels carrying one integer class id
    Discrete,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorMode {
    Single,
    #[default]
    Multi,
}

/// The two mutually exclusive display modes layered over the brain surface
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerMode {
    Slicer,
    Projection,
}

impl PeerMode {
    pub fn peer(self) -> PeerMode {
        match self {
            PeerMode::Slicer => PeerMode::Projection,
            PeerMode::Projection => PeerMode::Slicer,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewPreset {
    Axial,
    Coronal,
    Sagittal,
}

/// Resampling applied when a slice is turned into an image
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    /// Resample to isotropic pixels
    #[default]
    Bilinear,
    None,
    // TODO: trilinear sampling for oblique projection planes
}
