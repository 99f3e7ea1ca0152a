//! # Geometry
//!
//! Patches come in two flavours. A [`SplinePatch`] is a parametric object decoded from a geometry
//! block which has to be evaluated on a grid before it can be written. An [`UnstructuredPatch`]
//! is already discrete: a list of nodes and a list of cells referencing them. Writers only ever
//! see unstructured patches.
//!
//! Both flavours implement [`Tesselate`], and [`Patch`] is the closed union of the two that the
//! patch cache and the identity catalogue hand around.

mod g2;
mod spline;

pub use g2::{read as read_g2, G2Error};
pub use spline::SplinePatch;

use crate::prelude::*;
use crate::tesselate;
use ndarray::{Array2, ArrayView2};

/// The cell shapes produced by tesselating structured patches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    Line,
    Quad,
    Hexahedron,
}

impl CellType {
    /// the cell type of a structured patch with the given parametric dimension
    pub fn from_pardim(pardim: usize) -> Option<Self> {
        match pardim {
            1 => Some(Self::Line),
            2 => Some(Self::Quad),
            3 => Some(Self::Hexahedron),
            _ => None,
        }
    }

    pub fn pardim(&self) -> usize {
        match self {
            Self::Line => 1,
            Self::Quad => 2,
            Self::Hexahedron => 3,
        }
    }

    /// number of nodes per cell
    pub fn num_nodes(&self) -> usize {
        1 << self.pardim()
    }

    /// the VTK cell type identifier
    pub fn vtk_id(&self) -> u8 {
        match self {
            Self::Line => 3,
            Self::Quad => 9,
            Self::Hexahedron => 12,
        }
    }
}

/// A discrete patch: node coordinates of shape `(num_nodes, 3)` and cells of shape
/// `(num_cells, nodes_per_cell)` indexing into the nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct UnstructuredPatch {
    pub nodes: Array2<f64>,
    pub cells: Array2<usize>,
    pub celltype: CellType,
}

impl UnstructuredPatch {
    pub fn new(nodes: Array2<f64>, cells: Array2<usize>, celltype: CellType) -> Self {
        Self {
            nodes,
            cells,
            celltype,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.nrows()
    }

    pub fn num_cells(&self) -> usize {
        self.cells.nrows()
    }
}

/// Anything that can be turned into nodes and cells, and that field data can be sampled on.
pub trait Tesselate {
    fn pardim(&self) -> usize;

    /// discretize the patch into nodes and cells
    fn tesselate(&self) -> Result<UnstructuredPatch, Error>;

    /// sample field data defined on this patch at the nodes (or cells) produced by
    /// [`tesselate`](Tesselate::tesselate), in the same order
    fn tesselate_field(&self, data: ArrayView2<f64>, cells: bool) -> Result<Array2<f64>, Error>;
}

impl Tesselate for SplinePatch {
    fn pardim(&self) -> usize {
        SplinePatch::pardim(self)
    }

    fn tesselate(&self) -> Result<UnstructuredPatch, Error> {
        let nodes = self.evaluate(&self.knots())?;
        tesselate::tesselate(nodes)
    }

    fn tesselate_field(&self, data: ArrayView2<f64>, cells: bool) -> Result<Array2<f64>, Error> {
        if cells {
            self.cells_to_grid(data)
        } else {
            self.evaluate_field(data, &self.knots())
        }
    }
}

impl Tesselate for UnstructuredPatch {
    fn pardim(&self) -> usize {
        self.celltype.pardim()
    }

    fn tesselate(&self) -> Result<UnstructuredPatch, Error> {
        Ok(self.clone())
    }

    fn tesselate_field(&self, data: ArrayView2<f64>, cells: bool) -> Result<Array2<f64>, Error> {
        let expected = if cells {
            self.num_cells()
        } else {
            self.num_nodes()
        };
        if data.nrows() != expected {
            return Err(Error::Spline(format!(
                "field has {} values, unstructured patch has {}",
                data.nrows(),
                expected
            )));
        }
        Ok(data.to_owned())
    }
}

/// A patch as handed out by the patch cache
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    Structured(SplinePatch),
    Unstructured(UnstructuredPatch),
}

impl Patch {
    /// number of degrees of freedom a node based field carries on this patch
    pub fn num_coefficients(&self) -> usize {
        match self {
            Self::Structured(patch) => patch.ncoeffs(),
            Self::Unstructured(patch) => patch.num_nodes(),
        }
    }

    /// number of values a cell based field carries on this patch
    pub fn num_elements(&self) -> usize {
        match self {
            Self::Structured(patch) => patch.nelements(),
            Self::Unstructured(patch) => patch.num_cells(),
        }
    }

    /// the parameter grid tesselation evaluates on, if the patch is parametric
    pub fn tesselation_grid(&self) -> Option<Vec<Vec<f64>>> {
        match self {
            Self::Structured(patch) => Some(patch.knots()),
            Self::Unstructured(_) => None,
        }
    }

    /// tesselate on `grid` instead of the patch's own break points, if given
    pub fn tesselate_on(&self, grid: Option<&[Vec<f64>]>) -> Result<UnstructuredPatch, Error> {
        match (self, grid) {
            (Self::Structured(patch), Some(grid)) => tesselate::tesselate(patch.evaluate(grid)?),
            _ => self.tesselate(),
        }
    }

    /// sample field data at the nodes [`tesselate_on`](Patch::tesselate_on) produces for the
    /// same grid; cell data does not depend on the grid
    pub fn tesselate_field_on(
        &self,
        data: ArrayView2<f64>,
        cells: bool,
        grid: Option<&[Vec<f64>]>,
    ) -> Result<Array2<f64>, Error> {
        match (self, grid) {
            (Self::Structured(patch), Some(grid)) if !cells => patch.evaluate_field(data, grid),
            _ => self.tesselate_field(data, cells),
        }
    }
}

impl From<SplinePatch> for Patch {
    fn from(patch: SplinePatch) -> Self {
        Self::Structured(patch)
    }
}

impl From<UnstructuredPatch> for Patch {
    fn from(patch: UnstructuredPatch) -> Self {
        Self::Unstructured(patch)
    }
}

impl Tesselate for Patch {
    fn pardim(&self) -> usize {
        match self {
            Self::Structured(patch) => Tesselate::pardim(patch),
            Self::Unstructured(patch) => Tesselate::pardim(patch),
        }
    }

    fn tesselate(&self) -> Result<UnstructuredPatch, Error> {
        match self {
            Self::Structured(patch) => patch.tesselate(),
            Self::Unstructured(patch) => patch.tesselate(),
        }
    }

    fn tesselate_field(&self, data: ArrayView2<f64>, cells: bool) -> Result<Array2<f64>, Error> {
        match self {
            Self::Structured(patch) => patch.tesselate_field(data, cells),
            Self::Unstructured(patch) => patch.tesselate_field(data, cells),
        }
    }
}
