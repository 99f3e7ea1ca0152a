//! Convert time-dependent spline simulation results into unstructured VTK meshes.
//!
//! Input is a hierarchical container (see [`Container`]) holding, for every time level, a set of
//! named bases. A basis carries spline geometry blocks (one per patch) whenever its geometry
//! changes, and field coefficients on those patches. [`Reader`] walks the levels in order,
//! tesselates every geometry update once, assembles field data on the same nodes and hands
//! everything to a [`Writer`] which serializes one mesh per time step.
//!
//! ```ignore
//! let container = ifem_vtk::MemoryContainer::new();
//! // ... fill the container ...
//! let config = ifem_vtk::Config::default();
//! let mut writer = ifem_vtk::writer::create("vtu", "out.vtu".as_ref(), &config)?;
//! let mut reader = ifem_vtk::Reader::new(container, config)?;
//! reader.write(writer.as_mut())?;
//! ```

pub mod cache;
pub mod catalogue;
pub mod config;
pub mod container;
pub mod fields;
pub mod geometry;
pub mod identity;
pub mod prelude;
mod reader;
pub mod tesselate;
pub mod writer;

pub use cache::PatchCache;
pub use catalogue::{Basis, Catalogue};
pub use config::{Config, OutputMode};
pub use container::{Container, MemoryContainer};
pub use fields::{Field, FieldPatch, FieldType};
pub use geometry::{CellType, Patch, SplinePatch, Tesselate, UnstructuredPatch};
pub use identity::{ObjectCatalogue, PatchId, PatchRecord};
pub use reader::Reader;
pub use writer::Writer;

pub use ndarray;

/// general purpose error enumeration for possible causes of failure.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("An io error occured: `{0}`")]
    Io(#[from] std::io::Error),
    #[error("Could not write XML data to file: `{0}`")]
    XmlWrite(#[from] quick_xml::Error),
    #[error("Array shape mismatch: `{0}`")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Could not parse geometry for basis `{basis}`, level {level}, patch {patch}: {source}")]
    Geometry {
        basis: String,
        level: usize,
        patch: usize,
        source: geometry::G2Error,
    },
    #[error("Invalid spline patch: {0}")]
    Spline(String),
    #[error("Geometry for basis `{basis}` unavailable at timestep {level}")]
    GeometryUnavailable { basis: String, level: usize },
    #[error("Unknown basis `{0}`")]
    UnknownBasis(String),
    #[error("Unknown field `{0}`")]
    UnknownField(String),
    #[error("Missing dataset `{0}` in container")]
    MissingData(String),
    #[error(
        "Field `{field}` on basis `{basis}` has {size} values, which is not a multiple of \
         {ncoeffs} coefficients or {nelements} elements"
    )]
    DataShape {
        field: String,
        basis: String,
        size: usize,
        ncoeffs: usize,
        nelements: usize,
    },
    #[error(
        "Field `{field}` at level {level}, patch {patch} has {actual} values, expected {expected}"
    )]
    InconsistentComponents {
        field: String,
        level: usize,
        patch: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Sub-patches of field `{field}` have mismatched sample counts {rows:?}")]
    RaggedFieldPatch { field: String, rows: Vec<usize> },
    #[error("Field `{field}` has {actual} rows on patch {patch}, expected {expected}")]
    FieldSize {
        field: String,
        patch: PatchId,
        expected: usize,
        actual: usize,
    },
    #[error("Patch with parametric dimension {pardim} exceeds the catalogue limit of {max}")]
    ParametricDimension { pardim: usize, max: usize },
    #[error("{format} format does not support '{mode}' mode")]
    UnsupportedMode { format: &'static str, mode: OutputMode },
    #[error("Unable to find any applicable writers for format `{0}`")]
    UnknownFormat(String),
    #[error("Unknown output mode `{0}`")]
    UnknownMode(String),
    #[error("Index {value} does not fit in {target}")]
    IndexOverflow { value: usize, target: &'static str },
    #[error("Could not read input `{}`: {reason}", .path.display())]
    InvalidInput {
        path: std::path::PathBuf,
        reason: String,
    },
    #[error("Unable to find any applicable container for `{}`", .0.display())]
    UnknownInput(std::path::PathBuf),
}
