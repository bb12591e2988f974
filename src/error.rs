use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the stellarator model builder.
#[derive(Debug, Error)]
pub enum ParastellError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Malformed radial-build input, raised at construction.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{axis} angles need at least {min} entries, got {count}")]
    TooFewAngles {
        axis: &'static str,
        min: usize,
        count: usize,
    },

    #[error("toroidal angles must start at 0 degrees, got {0}")]
    ToroidalStart(f64),

    #[error("toroidal angles must not exceed 360 degrees, got {0}")]
    ToroidalExtent(f64),

    #[error("{axis} angles must be strictly increasing (index {index})")]
    NotIncreasing { axis: &'static str, index: usize },

    #[error("poloidal angles must span 360 degrees, got a span of {0}")]
    PoloidalSpan(f64),

    #[error(
        "thickness matrix for '{component}' is {rows}x{cols}, expected {expected_rows}x{expected_cols}"
    )]
    GridShape {
        component: String,
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },

    #[error("thickness matrix for '{component}' has invalid value {value} at ({row}, {col})")]
    InvalidThickness {
        component: String,
        row: usize,
        col: usize,
        value: f64,
    },

    #[error("component '{0}' is defined more than once")]
    DuplicateComponent(String),

    #[error("wall flux label must be finite and >= 1, got {0}")]
    WallFluxLabel(f64),

    #[error("repeated build spans {0} degrees, more than a full turn")]
    RepeatedExtent(f64),
}

/// Equilibrium queries outside the valid flux-coordinate domain.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("flux label {value} is outside [0, 1]")]
    FluxLabelOutOfRange { value: f64 },

    #[error("surface normal is degenerate at theta = {theta} rad, phi = {phi} rad")]
    DegenerateNormal { theta: f64, phi: f64 },
}

/// Failures reported by, or while talking to, the modeling kernel.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("kernel command '{command}' failed: {reason}")]
    CommandFailed {
        command: &'static str,
        reason: String,
    },

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("importing '{name}' produced {count} volumes, expected {expected}")]
    UnexpectedVolumeCount {
        name: String,
        count: usize,
        expected: usize,
    },

    #[error("kernel file error at {path}: {source}")]
    File {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("kernel file format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// Unsupported or ill-formed options, raised before any geometry work.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("invalid cross-section: {0}")]
    CrossSection(String),

    #[error("unrecognized extension '{found}' for {path}, expected '.{expected}'")]
    FileExtension {
        path: PathBuf,
        found: String,
        expected: &'static str,
    },

    #[error("invalid value for '{option}': {reason}")]
    InvalidValue {
        option: &'static str,
        reason: String,
    },

    #[error("invalid filament data at line {line}: {reason}")]
    Filament { line: usize, reason: String },

    #[error("'{0}' has no exported STEP file to import")]
    MissingStep(String),

    #[error("configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Convenience type alias for results using [`ParastellError`].
pub type Result<T> = std::result::Result<T, ParastellError>;
