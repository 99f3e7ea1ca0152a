//! Stable patch numbering across time levels.
//!
//! Simulations usually rewrite the geometry of every basis now and then although only a few of
//! them actually move. [`ObjectCatalogue`] recognizes geometrically identical patches no matter
//! which (level, basis, index) they were decoded from and hands out one [`PatchRecord`] for
//! them, so that writers only see new geometry when it changed.

use crate::geometry::Patch;
use crate::prelude::*;
use std::collections::HashMap;

/// coordinates and knots closer than this compare equal
const TOLERANCE: f64 = 1e-10;

/// Identifier of a geometrically unique patch. Ids are dense and assigned in first-seen order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Into)]
#[display(fmt = "{}", _0)]
pub struct PatchId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PatchKey {
    Structured {
        orders: Vec<usize>,
        shape: Vec<usize>,
        rational: bool,
        knots: Vec<u64>,
        coefs: Vec<u64>,
    },
    Unstructured {
        celltype: u8,
        cells: Vec<usize>,
        nodes: Vec<u64>,
    },
}

/// snap values to multiples of [`TOLERANCE`] and take the bits, so large coordinates keep
/// their own key
fn quantize<'a, I: IntoIterator<Item = &'a f64>>(values: I) -> Vec<u64> {
    values
        .into_iter()
        .map(|v| {
            let snapped = (v / TOLERANCE).round();
            // -0.0 and 0.0
            if snapped == 0.0 {
                0
            } else {
                snapped.to_bits()
            }
        })
        .collect()
}

impl PatchKey {
    fn new(patch: &Patch) -> Self {
        match patch {
            Patch::Structured(spline) => PatchKey::Structured {
                orders: spline.orders().to_vec(),
                shape: spline.coefs().shape().to_vec(),
                rational: spline.is_rational(),
                knots: quantize(spline.knot_vectors().iter().flatten()),
                coefs: quantize(spline.coefs().iter()),
            },
            Patch::Unstructured(mesh) => PatchKey::Unstructured {
                celltype: mesh.celltype.vtk_id(),
                cells: mesh.cells.iter().copied().collect(),
                nodes: quantize(mesh.nodes.iter()),
            },
        }
    }
}

/// Identity and emission state of one unique patch.
#[derive(Debug, Clone)]
pub struct PatchRecord {
    pub id: PatchId,
    /// the first patch seen with this geometry
    pub patch: Rc<Patch>,
    tesselation: Option<Vec<Vec<f64>>>,
    last_written: Option<usize>,
}

impl PatchRecord {
    fn new(id: PatchId, patch: Rc<Patch>) -> Self {
        Self {
            id,
            patch,
            tesselation: None,
            last_written: None,
        }
    }

    /// the last level this patch's geometry was handed to a writer, `None` if never
    pub fn last_written(&self) -> Option<usize> {
        self.last_written
    }

    /// true if geometry for `level` has not been written yet
    pub fn needs_update(&self, level: usize) -> bool {
        self.last_written.map_or(true, |written| written < level)
    }

    /// record that geometry was written at `level`; the recorded level never decreases
    pub fn mark_written(&mut self, level: usize) {
        self.last_written = Some(self.last_written.map_or(level, |w| w.max(level)));
    }

    /// the parameter grid the geometry was last tesselated on
    pub fn tesselation(&self) -> Option<&[Vec<f64>]> {
        self.tesselation.as_deref()
    }

    pub(crate) fn set_tesselation(&mut self, grid: Option<Vec<Vec<f64>>>) {
        self.tesselation = grid;
    }
}

#[derive(Debug)]
pub struct ObjectCatalogue {
    max_pardim: usize,
    keys: HashMap<PatchKey, usize>,
    records: Vec<PatchRecord>,
}

impl ObjectCatalogue {
    /// a catalogue accepting patches of parametric dimension up to `max_pardim`
    pub fn new(max_pardim: usize) -> Self {
        Self {
            max_pardim,
            keys: HashMap::new(),
            records: Vec::new(),
        }
    }

    /// the record for this patch's geometry, created on first sight
    pub fn add(&mut self, patch: &Rc<Patch>) -> Result<&mut PatchRecord, Error> {
        let pardim = patch.pardim();
        if pardim > self.max_pardim {
            return Err(Error::ParametricDimension {
                pardim,
                max: self.max_pardim,
            });
        }

        let key = PatchKey::new(patch);
        let next = self.records.len();
        let index = *self.keys.entry(key).or_insert(next);
        if index == next {
            self.records
                .push(PatchRecord::new(PatchId(next), Rc::clone(patch)));
        }
        Ok(&mut self.records[index])
    }

    pub fn get(&self, id: PatchId) -> Option<&PatchRecord> {
        self.records.get(id.0)
    }

    /// records in id order
    pub fn records(&self) -> impl Iterator<Item = &PatchRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
