//! The basis and field index built by one pass over the whole time series.
//!
//! Geometry is stored sparsely: a basis only carries geometry blocks at the levels where it
//! changed (its *update levels*). Every later lookup of a basis at some level resolves to the
//! greatest update level not after it, see [`Basis::level_at`].

use crate::cache::PatchCache;
use crate::fields::{Field, FieldSource, FieldType};
use crate::prelude::*;
use indexmap::IndexMap;

/// A named group of patches sharing one geometry definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Basis {
    pub name: String,
    updates: Vec<usize>,
}

impl Basis {
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self {
            name: name.into(),
            updates: Vec::new(),
        }
    }

    /// the levels at which geometry for this basis was written, strictly increasing
    pub fn updates(&self) -> &[usize] {
        &self.updates
    }

    /// record a geometry update; levels must be pushed in increasing order
    pub(crate) fn push_update(&mut self, level: usize) {
        debug_assert!(self.updates.last().map_or(true, |last| *last < level));
        self.updates.push(level);
    }

    /// the greatest update level that is not after `level`
    pub fn level_at(&self, level: usize) -> Result<usize, Error> {
        // update lists are sorted, so the number of updates <= level points one past the answer
        let position = self.updates.partition_point(|update| *update <= level);
        position
            .checked_sub(1)
            .map(|idx| self.updates[idx])
            .ok_or_else(|| Error::GeometryUnavailable {
                basis: self.name.clone(),
                level,
            })
    }

    /// true if the geometry of this basis was (re-)written at exactly this level
    pub fn updated_at(&self, level: usize) -> bool {
        self.updates.binary_search(&level).is_ok()
    }
}

/// Index of every basis and field in a container.
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    bases: IndexMap<String, Basis>,
    fields: IndexMap<String, Field>,
    max_pardim: usize,
    nlevels: usize,
}

impl Catalogue {
    /// scan every level of the container once
    ///
    /// patch 0 of every geometry update is decoded (through the cache) to find the highest
    /// parametric dimension and to derive component counts of fields
    pub fn build<C: Container>(
        container: &C,
        cache: &mut PatchCache,
        config: &Config,
    ) -> Result<Self, Error> {
        let nlevels = container.nlevels();
        let mut bases: IndexMap<String, Basis> = IndexMap::new();
        for level in 0..nlevels {
            for name in container.bases(level) {
                let basis = bases
                    .entry(name.clone())
                    .or_insert_with(|| Basis::new(name.clone()));
                if container.geometry_count(level, &name).is_some() {
                    basis.push_update(level);
                }
            }
        }

        let mut max_pardim = 0;
        for basis in bases.values() {
            for &level in basis.updates() {
                let patch = cache.get(container, basis, level, 0)?;
                max_pardim = max_pardim.max(patch.pardim());
            }
        }

        let mut fields: IndexMap<String, Field> = IndexMap::new();
        for level in 0..nlevels {
            for name in container.bases(level) {
                let basis = &bases[&name];
                for field_name in container.fields(level, &name) {
                    if fields.contains_key(&field_name) {
                        continue;
                    }
                    let field = Self::inspect_field(container, cache, basis, level, &field_name, config)?;
                    log::debug!(
                        "Field {} on basis {}: {} component(s), {} based",
                        field.name,
                        field.basis,
                        field.ncomps,
                        if field.cells { "cell" } else { "node" }
                    );
                    fields.insert(field_name, field);
                }
            }
        }

        if config.combine_split_fields {
            let combined = combine_split_fields(&fields);
            for field in combined {
                log::debug!("Combining {:?} into vector field {}", field.sources(), field.name);
                fields.insert(field.name.clone(), field);
            }
        }

        Ok(Self {
            bases,
            fields,
            max_pardim,
            nlevels,
        })
    }

    fn inspect_field<C: Container>(
        container: &C,
        cache: &mut PatchCache,
        basis: &Basis,
        level: usize,
        name: &str,
        config: &Config,
    ) -> Result<Field, Error> {
        let patch = cache.get(container, basis, level, 0)?;
        let size = container.field(level, &basis.name, name, 0)?.len();
        let ncoeffs = patch.num_coefficients();
        let nelements = patch.num_elements();

        let (ncomps, cells) = if ncoeffs > 0 && size % ncoeffs == 0 && size > 0 {
            (size / ncoeffs, false)
        } else if nelements > 0 && size % nelements == 0 && size > 0 {
            (size / nelements, true)
        } else {
            return Err(Error::DataShape {
                field: name.to_string(),
                basis: basis.name.clone(),
                size,
                ncoeffs,
                nelements,
            });
        };

        let fieldtype = FieldType::infer(name, ncomps);
        Ok(Field {
            name: name.to_string(),
            basis: basis.name.clone(),
            cells,
            ncomps,
            fieldtype,
            decompose: config.decompose && fieldtype.is_vector(),
            source: FieldSource::Stored,
        })
    }

    pub fn bases(&self) -> impl Iterator<Item = &Basis> {
        self.bases.values()
    }

    pub fn basis(&self, name: &str) -> Result<&Basis, Error> {
        self.bases
            .get(name)
            .ok_or_else(|| Error::UnknownBasis(name.to_string()))
    }

    /// fields in the order they were first seen, followed by combined fields
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    pub fn field(&self, name: &str) -> Result<&Field, Error> {
        self.fields
            .get(name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))
    }

    /// the highest parametric dimension of any basis
    pub fn max_pardim(&self) -> usize {
        self.max_pardim
    }

    pub fn nlevels(&self) -> usize {
        self.nlevels
    }

    /// the geometry level that is in effect for a basis at `level`
    pub fn basis_level(&self, level: usize, basis: &str) -> Result<usize, Error> {
        self.basis(basis)?.level_at(level)
    }

    /// number of patches of a basis at `level`
    pub fn npatches<C: Container>(
        &self,
        container: &C,
        level: usize,
        basis: &str,
    ) -> Result<usize, Error> {
        let resolved = self.basis_level(level, basis)?;
        container
            .geometry_count(resolved, basis)
            .ok_or_else(|| Error::GeometryUnavailable {
                basis: basis.to_string(),
                level,
            })
    }
}

/// find groups of scalar fields `name_x`, `name_y` (, `name_z`) on the same basis that together
/// form a vector field `name`
fn combine_split_fields(fields: &IndexMap<String, Field>) -> Vec<Field> {
    let mut candidates: IndexMap<String, Vec<&Field>> = IndexMap::new();
    for field in fields.values() {
        if field.ncomps != 1 {
            continue;
        }
        if let Some(base) = field.name.strip_suffix("_x") {
            candidates.entry(base.to_string()).or_default().push(field);
        }
    }

    let mut combined = Vec::new();
    for (base, first) in candidates {
        if base.is_empty() || fields.contains_key(&base) {
            continue;
        }
        let x = first[0];
        let mut parts = vec![x];
        for suffix in ["_y", "_z"] {
            match fields.get(&format!("{}{}", base, suffix)) {
                Some(f) if f.ncomps == 1 && f.basis == x.basis && f.cells == x.cells => {
                    parts.push(f)
                }
                _ => break,
            }
        }
        if parts.len() < 2 {
            continue;
        }

        let ncomps = parts.len();
        combined.push(Field {
            name: base.clone(),
            basis: x.basis.clone(),
            cells: x.cells,
            ncomps,
            fieldtype: FieldType::infer(&base, ncomps),
            decompose: false,
            source: FieldSource::Combined(parts.iter().map(|f| f.name.clone()).collect()),
        });
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_resolution() {
        let mut basis = Basis::new("mesh");
        basis.push_update(0);
        basis.push_update(3);
        basis.push_update(7);

        assert_eq!(basis.level_at(0).unwrap(), 0);
        assert_eq!(basis.level_at(2).unwrap(), 0);
        assert_eq!(basis.level_at(3).unwrap(), 3);
        assert_eq!(basis.level_at(6).unwrap(), 3);
        assert_eq!(basis.level_at(7).unwrap(), 7);
        assert_eq!(basis.level_at(100).unwrap(), 7);
        assert!(basis.updated_at(3));
        assert!(!basis.updated_at(4));
    }

    #[test]
    fn level_before_first_update() {
        let mut basis = Basis::new("late");
        basis.push_update(2);

        let err = basis.level_at(1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Geometry for basis `late` unavailable at timestep 1"
        );
        assert!(Basis::new("empty").level_at(0).is_err());
    }
}
