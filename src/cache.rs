//! Memoized geometry decoding.

use crate::catalogue::Basis;
use crate::geometry::{self, Patch};
use crate::prelude::*;
use std::collections::HashMap;

/// Decoded patches keyed by (resolved level, basis name, patch index).
///
/// Lookups resolve the requested level to the basis update level first, so every level that
/// reuses the same geometry shares one decoded patch.
#[derive(Debug, Default)]
pub struct PatchCache {
    patches: HashMap<(usize, String, usize), Rc<Patch>>,
    decodes: usize,
}

impl PatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// the patch with index `index` of `basis` as it is at `level`
    pub fn get<C: Container>(
        &mut self,
        container: &C,
        basis: &Basis,
        level: usize,
        index: usize,
    ) -> Result<Rc<Patch>, Error> {
        let level = basis.level_at(level)?;
        let key = (level, basis.name.clone(), index);
        if let Some(patch) = self.patches.get(&key) {
            return Ok(Rc::clone(patch));
        }

        let bytes = container.geometry(level, &basis.name, index)?;
        let mut patch = geometry::read_g2(&bytes).map_err(|source| Error::Geometry {
            basis: basis.name.clone(),
            level,
            patch: index,
            source,
        })?;
        patch.set_dimension(3);
        self.decodes += 1;

        let patch = Rc::new(Patch::from(patch));
        self.patches.insert(key, Rc::clone(&patch));
        Ok(patch)
    }

    /// number of geometry blocks decoded so far
    pub fn decodes(&self) -> usize {
        self.decodes
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}
