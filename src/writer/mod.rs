//! # Writers
//!
//! A writer receives geometry and field blocks per patch and serializes one mesh per time step.
//! The calls arrive in a fixed pattern for every step: any number of
//! [`update_geometry`](Writer::update_geometry) and [`update_field`](Writer::update_field), then
//! [`add_time`](Writer::add_time) and [`finalize_step`](Writer::finalize_step). When all steps are
//! done [`close`](Writer::close) finishes files that span the whole run.
//!
//! State carries over between steps: a patch whose geometry did not change is not sent again and
//! the writer keeps emitting its previous nodes and cells. A patch that is no longer shown by
//! any basis is dropped with [`remove_geometry`](Writer::remove_geometry), together with its
//! field blocks.
//!
//! Writers are selected by format name through an explicit registry ([`WRITERS`]):
//!
//! | format | writer | modes |
//! |--------|--------|-------|
//! | `vtk`  | [`VtkWriter`](legacy::VtkWriter) | ascii, binary |
//! | `vtu`  | [`VtuWriter`](xml::VtuWriter) | appended, ascii, binary |
//! | `pvd`  | [`PvdWriter`](pvd::PvdWriter) | appended, ascii, binary |

pub mod legacy;
pub mod pvd;
pub mod xml;

use crate::fields::pad_components;
use crate::geometry::UnstructuredPatch;
use crate::prelude::*;
use indexmap::IndexMap;
use ndarray::{concatenate, ArrayView2, Axis};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use legacy::VtkWriter;
pub use pvd::PvdWriter;
pub use xml::VtuWriter;

pub trait Writer {
    /// replace the geometry of a patch
    fn update_geometry(&mut self, patch: UnstructuredPatch, patch_id: PatchId) -> Result<(), Error>;

    /// stop writing a patch and all field data on it
    fn remove_geometry(&mut self, patch_id: PatchId) -> Result<(), Error>;

    /// replace the data of a field on a patch. `data` has one row per node (or cell when `cells`
    /// is set) of the patch
    fn update_field(
        &mut self,
        name: &str,
        data: Array2<f64>,
        cells: bool,
        patch_id: PatchId,
    ) -> Result<(), Error>;

    /// set the physical time of the current step
    fn add_time(&mut self, time: f64) -> Result<(), Error>;

    /// write the current step
    fn finalize_step(&mut self) -> Result<(), Error>;

    /// finish any output spanning all steps
    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// constructs a writer for an output path. Implementations validate the output mode before
/// touching the file system.
pub type Factory = fn(&Path, &Config) -> Result<Box<dyn Writer>, Error>;

pub struct WriterEntry {
    pub name: &'static str,
    pub applicable: fn(&str) -> bool,
    pub create: Factory,
}

/// all writers, in the order they are tried
pub const WRITERS: &[WriterEntry] = &[
    WriterEntry {
        name: "VTK",
        applicable: |fmt| fmt.eq_ignore_ascii_case("vtk"),
        create: legacy::create,
    },
    WriterEntry {
        name: "VTU",
        applicable: |fmt| fmt.eq_ignore_ascii_case("vtu"),
        create: xml::create,
    },
    WriterEntry {
        name: "PVD",
        applicable: |fmt| fmt.eq_ignore_ascii_case("pvd"),
        create: pvd::create,
    },
];

/// the first registered writer that handles `format`
pub fn find_applicable(format: &str) -> Result<&'static WriterEntry, Error> {
    for entry in WRITERS {
        if (entry.applicable)(format) {
            log::info!("Using writer: {}", entry.name);
            return Ok(entry);
        }
        log::debug!("Rejecting writer: {}", entry.name);
    }
    Err(Error::UnknownFormat(format.to_string()))
}

/// construct the writer for `format` writing to `path`
pub fn create(format: &str, path: &Path, config: &Config) -> Result<Box<dyn Writer>, Error> {
    let entry = find_applicable(format)?;
    (entry.create)(path, config)
}

/// `dir/stem.ext` becomes `dir/stem-<step>.ext`
pub fn step_filename(path: &Path, step: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, step, ext.to_string_lossy()),
        None => format!("{}-{}", stem, step),
    };
    path.with_file_name(name)
}

#[derive(Debug, Clone)]
struct FieldBlocks {
    cells: bool,
    data: BTreeMap<PatchId, Array2<f64>>,
}

/// Geometry and field blocks accumulated over the steps of a run
#[derive(Debug, Clone, Default)]
pub struct MeshState {
    patches: BTreeMap<PatchId, UnstructuredPatch>,
    fields: IndexMap<String, FieldBlocks>,
    time: Option<f64>,
    step: usize,
}

impl MeshState {
    pub fn update_geometry(&mut self, patch: UnstructuredPatch, patch_id: PatchId) {
        self.patches.insert(patch_id, patch);
    }

    pub fn remove_geometry(&mut self, patch_id: PatchId) {
        self.patches.remove(&patch_id);
        for blocks in self.fields.values_mut() {
            blocks.data.remove(&patch_id);
        }
    }

    pub fn update_field(&mut self, name: &str, data: Array2<f64>, cells: bool, patch_id: PatchId) {
        let blocks = self
            .fields
            .entry(name.to_string())
            .or_insert_with(|| FieldBlocks {
                cells,
                data: BTreeMap::new(),
            });
        blocks.cells = cells;
        blocks.data.insert(patch_id, data);
    }

    pub fn add_time(&mut self, time: f64) {
        self.time = Some(time);
    }

    /// index of the step being assembled
    pub fn step(&self) -> usize {
        self.step
    }

    /// the time value of the current step, falling back to the step index
    pub fn timestep(&self) -> f64 {
        self.time.unwrap_or(self.step as f64)
    }

    pub(crate) fn next_step(&mut self) {
        self.step += 1;
        self.time = None;
    }

    /// concatenate all patches in patch id order into one grid
    pub fn assemble(&self) -> Result<Grid, Error> {
        let nodes: Vec<Array2<f64>> = self
            .patches
            .values()
            .map(|patch| pad_components(patch.nodes.view(), 3, false))
            .collect();
        let views: Vec<ArrayView2<f64>> = nodes.iter().map(Array2::view).collect();
        let points = if views.is_empty() {
            Array2::zeros((0, 3))
        } else {
            concatenate(Axis(0), &views)?
        };

        let mut connectivity = Vec::new();
        let mut offsets = Vec::new();
        let mut types = Vec::new();
        let mut node_offset = 0;
        for patch in self.patches.values() {
            for cell in patch.cells.rows() {
                connectivity.extend(cell.iter().map(|node| node + node_offset));
                offsets.push(connectivity.len());
                types.push(patch.celltype.vtk_id());
            }
            node_offset += patch.num_nodes();
        }

        let mut point_data = Vec::new();
        let mut cell_data = Vec::new();
        for (name, blocks) in &self.fields {
            let array = self.assemble_field(name, blocks)?;
            if blocks.cells {
                cell_data.push((name.clone(), array));
            } else {
                point_data.push((name.clone(), array));
            }
        }

        Ok(Grid {
            points,
            connectivity,
            offsets,
            types,
            point_data,
            cell_data,
        })
    }

    fn assemble_field(&self, name: &str, blocks: &FieldBlocks) -> Result<Array2<f64>, Error> {
        let ncomps = blocks.data.values().map(Array2::ncols).max().unwrap_or(1);

        let mut parts = Vec::with_capacity(self.patches.len());
        let mut missing = 0;
        for (id, patch) in &self.patches {
            let expected = if blocks.cells {
                patch.num_cells()
            } else {
                patch.num_nodes()
            };
            match blocks.data.get(id) {
                Some(data) if data.nrows() != expected => {
                    return Err(Error::FieldSize {
                        field: name.to_string(),
                        patch: *id,
                        expected,
                        actual: data.nrows(),
                    })
                }
                Some(data) => parts.push(pad_components(data.view(), ncomps, false)),
                None => {
                    missing += 1;
                    parts.push(Array2::zeros((expected, ncomps)));
                }
            }
        }
        if missing > 0 {
            log::warn!(
                "Field {} has no data on {} patch(es), writing zeros there",
                name,
                missing
            );
        }

        let views: Vec<ArrayView2<f64>> = parts.iter().map(Array2::view).collect();
        if views.is_empty() {
            return Ok(Array2::zeros((0, ncomps)));
        }
        Ok(concatenate(Axis(0), &views)?)
    }
}

/// One step's worth of unstructured mesh, ready to be serialized
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    /// node coordinates, `(num_points, 3)`
    pub points: Array2<f64>,
    /// node indices of all cells, back to back
    pub connectivity: Vec<usize>,
    /// end of every cell in `connectivity`
    pub offsets: Vec<usize>,
    /// VTK cell type of every cell
    pub types: Vec<u8>,
    pub point_data: Vec<(String, Array2<f64>)>,
    pub cell_data: Vec<(String, Array2<f64>)>,
}

impl Grid {
    pub fn num_points(&self) -> usize {
        self.points.nrows()
    }

    pub fn num_cells(&self) -> usize {
        self.types.len()
    }

    /// the cells as slices of node indices
    pub fn cells(&self) -> impl Iterator<Item = &[usize]> {
        let starts = std::iter::once(0).chain(self.offsets.iter().copied());
        starts
            .zip(self.offsets.iter().copied())
            .map(move |(start, end)| &self.connectivity[start..end])
    }
}

/// Element types that can be written to array sections
pub(crate) trait Numeric: Copy + num_traits::NumCast {
    /// name of the type in XML files
    const XML_TYPE: &'static str;
    /// name of the type in legacy files
    const LEGACY_TYPE: &'static str;

    fn extend_le_bytes(self, bytes: &mut Vec<u8>);

    fn extend_be_bytes(self, bytes: &mut Vec<u8>);

    fn push_ascii(self, out: &mut String);
}

impl Numeric for f64 {
    const XML_TYPE: &'static str = "Float64";
    const LEGACY_TYPE: &'static str = "double";

    fn extend_le_bytes(self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.to_le_bytes());
    }

    fn extend_be_bytes(self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.to_be_bytes());
    }

    fn push_ascii(self, out: &mut String) {
        let mut buffer = ryu::Buffer::new();
        out.push_str(buffer.format(self));
    }
}

macro_rules! impl_numeric_int {
    ($ty:ty, $xml:expr, $legacy:expr) => {
        impl Numeric for $ty {
            const XML_TYPE: &'static str = $xml;
            const LEGACY_TYPE: &'static str = $legacy;

            fn extend_le_bytes(self, bytes: &mut Vec<u8>) {
                bytes.extend_from_slice(&self.to_le_bytes());
            }

            fn extend_be_bytes(self, bytes: &mut Vec<u8>) {
                bytes.extend_from_slice(&self.to_be_bytes());
            }

            fn push_ascii(self, out: &mut String) {
                out.push_str(&self.to_string());
            }
        }
    };
}

impl_numeric_int!(i32, "Int32", "int");
impl_numeric_int!(i64, "Int64", "long");
impl_numeric_int!(u8, "UInt8", "unsigned_char");

/// convert indices to the integer type of a file format
pub(crate) fn cast_indices<N: Numeric>(values: &[usize]) -> Result<Vec<N>, Error> {
    values
        .iter()
        .map(|&v| {
            <N as num_traits::NumCast>::from(v).ok_or(Error::IndexOverflow {
                value: v,
                target: N::XML_TYPE,
            })
        })
        .collect()
}
