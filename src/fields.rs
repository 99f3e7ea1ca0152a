//! Fields and the per-patch data assembled for writers.
//!
//! A [`Field`] is the catalogue entry for a named quantity. For every time level it is present
//! at, [`Field::patches`] materializes one [`FieldPatch`] per geometry patch of its basis. Before
//! a field patch is handed to a writer it is padded to the number of components the output
//! expects ([`FieldPatch::ensure_ncomps`]) and sampled at the nodes or cells of its geometry
//! ([`FieldPatch::tesselate`]).

use crate::cache::PatchCache;
use crate::catalogue::Basis;
use crate::geometry::Patch;
use crate::prelude::*;
use ndarray::{concatenate, s, ArrayView2, Axis};

/// What a field physically represents. Orthogonal to whether it lives on nodes or cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Scalar,
    Vector,
    Displacement,
}

impl FieldType {
    /// scalar for single component fields, otherwise a vector (or a displacement if the name
    /// says so)
    pub fn infer(name: &str, ncomps: usize) -> Self {
        if ncomps <= 1 {
            Self::Scalar
        } else if name.to_lowercase().contains("displacement") {
            Self::Displacement
        } else {
            Self::Vector
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar)
    }

    pub fn is_vector(&self) -> bool {
        !self.is_scalar()
    }

    pub fn is_displacement(&self) -> bool {
        matches!(self, Self::Displacement)
    }
}

/// Where the values of a field come from
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSource {
    /// stored under the field's own name
    Stored,
    /// assembled column by column from the named single component fields
    Combined(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub basis: String,
    /// true if the field is defined on cells as opposed to nodes
    pub cells: bool,
    pub ncomps: usize,
    pub fieldtype: FieldType,
    /// true if the field may be split into scalar components
    pub decompose: bool,
    pub source: FieldSource,
}

impl Field {
    /// names of the stored fields this field reads
    pub fn sources(&self) -> Vec<&str> {
        match &self.source {
            FieldSource::Stored => vec![self.name.as_str()],
            FieldSource::Combined(names) => names.iter().map(String::as_str).collect(),
        }
    }

    /// true if all data for this field is stored at `level`
    pub fn present_at<C: Container>(&self, container: &C, level: usize) -> bool {
        let stored = container.fields(level, &self.basis);
        self.sources()
            .iter()
            .all(|source| stored.iter().any(|name| name == source))
    }

    /// component indices and names of the scalar fields this field decomposes into
    pub fn decompositions(&self) -> Vec<(usize, String)> {
        if !self.decompose || self.ncomps == 1 {
            return Vec::new();
        }
        if self.ncomps > 3 {
            log::warn!(
                "Attempted to decompose {}, ignoring extra components",
                self.name
            );
        }
        (0..self.ncomps)
            .zip(['x', 'y', 'z'])
            .map(|(index, suffix)| (index, format!("{}_{}", self.name, suffix)))
            .collect()
    }

    /// the data of this field on every patch of its basis at `level`
    pub fn patches<C: Container>(
        &self,
        container: &C,
        cache: &mut PatchCache,
        basis: &Basis,
        level: usize,
    ) -> Result<Vec<FieldPatch>, Error> {
        let resolved = basis.level_at(level)?;
        let npatches = container
            .geometry_count(resolved, &basis.name)
            .ok_or_else(|| Error::GeometryUnavailable {
                basis: basis.name.clone(),
                level,
            })?;

        let sources = self.sources();
        let source_comps = match self.source {
            FieldSource::Stored => self.ncomps,
            FieldSource::Combined(_) => 1,
        };

        let mut patches = Vec::with_capacity(npatches);
        for index in 0..npatches {
            let patch = cache.get(container, basis, level, index)?;
            let rows = if self.cells {
                patch.num_elements()
            } else {
                patch.num_coefficients()
            };

            let mut parts = Vec::with_capacity(sources.len());
            for source in &sources {
                let raw = container.field(level, &basis.name, source, index)?;
                if raw.len() != rows * source_comps {
                    return Err(Error::InconsistentComponents {
                        field: source.to_string(),
                        level,
                        patch: index,
                        expected: rows * source_comps,
                        actual: raw.len(),
                    });
                }
                let data = Array2::from_shape_vec((rows, source_comps), raw)?;
                parts.push((Rc::clone(&patch), data));
            }

            let kind = match self.source {
                FieldSource::Stored => {
                    let (patch, data) = parts.remove(0);
                    FieldPatchKind::Simple { patch, data }
                }
                FieldSource::Combined(_) => FieldPatchKind::Combined { parts },
            };
            patches.push(FieldPatch {
                name: self.name.clone(),
                cells: self.cells,
                fieldtype: self.fieldtype,
                kind,
            });
        }
        Ok(patches)
    }
}

/// The two shapes field data on one patch can take
#[derive(Debug, Clone, PartialEq)]
pub enum FieldPatchKind {
    /// one array of shape `(samples, ncomps)` on one patch
    Simple { patch: Rc<Patch>, data: Array2<f64> },
    /// arrays concatenated along the component axis, each sampled on its own patch
    Combined { parts: Vec<(Rc<Patch>, Array2<f64>)> },
}

/// The values of one field on one geometric patch at one time level
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPatch {
    pub name: String,
    pub cells: bool,
    pub fieldtype: FieldType,
    pub kind: FieldPatchKind,
}

impl FieldPatch {
    pub fn simple<T: Into<String>>(name: T, patch: Rc<Patch>, data: Array2<f64>, cells: bool) -> Self {
        let fieldtype = FieldType::infer("", data.ncols());
        Self {
            name: name.into(),
            cells,
            fieldtype,
            kind: FieldPatchKind::Simple { patch, data },
        }
    }

    pub fn combined<T: Into<String>>(
        name: T,
        parts: Vec<(Rc<Patch>, Array2<f64>)>,
        cells: bool,
    ) -> Self {
        let ncomps = parts.iter().map(|(_, data)| data.ncols()).sum();
        Self {
            name: name.into(),
            cells,
            fieldtype: FieldType::infer("", ncomps),
            kind: FieldPatchKind::Combined { parts },
        }
    }

    pub fn num_comps(&self) -> usize {
        match &self.kind {
            FieldPatchKind::Simple { data, .. } => data.ncols(),
            FieldPatchKind::Combined { parts } => parts.iter().map(|(_, data)| data.ncols()).sum(),
        }
    }

    /// the geometry patch the field is reported on
    pub fn patch(&self) -> Option<&Rc<Patch>> {
        match &self.kind {
            FieldPatchKind::Simple { patch, .. } => Some(patch),
            FieldPatchKind::Combined { parts } => parts.first().map(|(patch, _)| patch),
        }
    }

    /// pad with zero components up to `ncomps`
    ///
    /// never removes components. Single component data is left alone if `allow_scalar` is set.
    /// Combined patches get a new zero block on the geometry of their last part.
    pub fn ensure_ncomps(&mut self, ncomps: usize, allow_scalar: bool) {
        let current = self.num_comps();
        if (current == 1 && allow_scalar) || current >= ncomps {
            return;
        }
        match &mut self.kind {
            FieldPatchKind::Simple { data, .. } => {
                *data = pad_components(data.view(), ncomps, allow_scalar);
            }
            FieldPatchKind::Combined { parts } => {
                let last = parts
                    .last()
                    .map(|(patch, data)| (Rc::clone(patch), data.nrows()));
                if let Some((patch, rows)) = last {
                    parts.push((patch, Array2::zeros((rows, ncomps - current))));
                }
            }
        }
    }

    /// sample the field at the nodes (or cells) of its geometry, giving `(samples, ncomps)`
    pub fn tesselate(&self) -> Result<Array2<f64>, Error> {
        self.tesselate_on(None)
    }

    /// like [`tesselate`](FieldPatch::tesselate), but node data is evaluated on `grid`, the grid
    /// the geometry was tesselated on
    pub fn tesselate_on(&self, grid: Option<&[Vec<f64>]>) -> Result<Array2<f64>, Error> {
        match &self.kind {
            FieldPatchKind::Simple { patch, data } => {
                patch.tesselate_field_on(data.view(), self.cells, grid)
            }
            FieldPatchKind::Combined { parts } => {
                let blocks = parts
                    .iter()
                    .map(|(patch, data)| patch.tesselate_field_on(data.view(), self.cells, grid))
                    .collect::<Result<Vec<_>, _>>()?;

                let rows: Vec<usize> = blocks.iter().map(Array2::nrows).collect();
                if rows.windows(2).any(|w| w[0] != w[1]) {
                    return Err(Error::RaggedFieldPatch {
                        field: self.name.clone(),
                        rows,
                    });
                }
                let views: Vec<ArrayView2<f64>> = blocks.iter().map(Array2::view).collect();
                Ok(concatenate(Axis(1), &views)?)
            }
        }
    }

    /// a scalar field patch holding component `index` of this one
    pub fn pick_component<T: Into<String>>(&self, index: usize, name: T) -> Option<FieldPatch> {
        let (patch, data, column) = match &self.kind {
            FieldPatchKind::Simple { patch, data } => (patch, data, index),
            FieldPatchKind::Combined { parts } => {
                let mut column = index;
                let mut found = None;
                for (patch, data) in parts {
                    if column < data.ncols() {
                        found = Some((patch, data, column));
                        break;
                    }
                    column -= data.ncols();
                }
                found?
            }
        };
        if column >= data.ncols() {
            return None;
        }

        Some(FieldPatch {
            name: name.into(),
            cells: self.cells,
            fieldtype: FieldType::Scalar,
            kind: FieldPatchKind::Simple {
                patch: Rc::clone(patch),
                data: data.slice(s![.., column..column + 1]).to_owned(),
            },
        })
    }
}

/// pad an array with trailing zero components up to `ncomps`
pub fn pad_components(data: ArrayView2<f64>, ncomps: usize, allow_scalar: bool) -> Array2<f64> {
    let (rows, current) = data.dim();
    if (current == 1 && allow_scalar) || current >= ncomps {
        return data.to_owned();
    }
    let mut out = Array2::zeros((rows, ncomps));
    out.slice_mut(s![.., ..current]).assign(&data);
    out
}

/// What to do with NaN values on their way into a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NanPolicy {
    Preserve,
    /// the target format can not represent NaN
    ReplaceWithZero,
}

/// apply the NaN policy to data about to be written, returning the number of replaced values
pub fn nan_filter(data: &mut Array2<f64>, name: &str, policy: NanPolicy) -> usize {
    if policy == NanPolicy::Preserve {
        return 0;
    }
    let mut replaced = 0;
    data.mapv_inplace(|v| {
        if v.is_nan() {
            replaced += 1;
            0.0
        } else {
            v
        }
    });
    if replaced > 0 {
        log::warn!(
            "VTK ASCII files do not support NaN, {} value(s) of {} will be set to zero",
            replaced,
            name
        );
    }
    replaced
}
