use crate::cache::PatchCache;
use crate::catalogue::Catalogue;
use crate::fields::FieldPatch;
use crate::identity::ObjectCatalogue;
use crate::prelude::*;
use std::collections::HashMap;

/// Which unique patch every (basis, patch index) currently shows, and how many slots show each
/// patch
#[derive(Debug, Default)]
struct Slots {
    shown: HashMap<(String, usize), PatchId>,
    refs: HashMap<PatchId, usize>,
}

impl Slots {
    /// show `id` in a slot, returning the patch it replaced if no slot shows that one anymore
    fn assign(&mut self, basis: &str, index: usize, id: PatchId) -> Option<PatchId> {
        let previous = self.shown.insert((basis.to_string(), index), id);
        if previous == Some(id) {
            return None;
        }
        *self.refs.entry(id).or_insert(0) += 1;
        previous.and_then(|old| self.release(old))
    }

    /// empty the slots of `basis` from `npatches` on, returning patches no slot shows anymore
    fn truncate(&mut self, basis: &str, npatches: usize) -> Vec<PatchId> {
        let stale: Vec<(String, usize)> = self
            .shown
            .keys()
            .filter(|(name, index)| name == basis && *index >= npatches)
            .cloned()
            .collect();
        let mut unused = Vec::new();
        for key in stale {
            if let Some(id) = self.shown.remove(&key) {
                unused.extend(self.release(id));
            }
        }
        unused
    }

    fn release(&mut self, id: PatchId) -> Option<PatchId> {
        let count = self.refs.get_mut(&id)?;
        *count -= 1;
        if *count > 0 {
            return None;
        }
        self.refs.remove(&id);
        Some(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepState {
    Idle,
    /// a step was started and not yet finalized
    Open(usize),
}

/// Drives the conversion of a whole container, one time step per level.
///
/// Construction scans the container once to build the [`Catalogue`]. [`Reader::write`] then
/// emits, for every level: geometry for each patch whose basis was updated there (once per
/// unique patch and level), all fields stored at the level, the time value and a step boundary.
/// A patch replaced by new geometry in every slot that showed it is removed from the writer.
#[derive(Debug)]
pub struct Reader<C> {
    container: C,
    config: Config,
    catalogue: Catalogue,
    cache: PatchCache,
    patches: ObjectCatalogue,
    slots: Slots,
    state: StepState,
}

impl<C: Container> Reader<C> {
    pub fn new(container: C, config: Config) -> Result<Self, Error> {
        let mut cache = PatchCache::new();
        let catalogue = Catalogue::build(&container, &mut cache, &config)?;
        log::info!(
            "Found {} level(s), {} basis/bases and {} field(s)",
            catalogue.nlevels(),
            catalogue.bases().count(),
            catalogue.fields().count()
        );
        let patches = ObjectCatalogue::new(catalogue.max_pardim());
        Ok(Self {
            container,
            config,
            catalogue,
            cache,
            patches,
            slots: Slots::default(),
            state: StepState::Idle,
        })
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    pub fn cache(&self) -> &PatchCache {
        &self.cache
    }

    /// unique patches seen so far
    pub fn patches(&self) -> &ObjectCatalogue {
        &self.patches
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn container(&self) -> &C {
        &self.container
    }

    /// write every level of the container and close the writer
    pub fn write(&mut self, w: &mut dyn Writer) -> Result<(), Error> {
        for level in 0..self.catalogue.nlevels() {
            self.write_level(level, w)?;
        }
        w.close()
    }

    /// write a single time step
    pub fn write_level(&mut self, level: usize, w: &mut dyn Writer) -> Result<(), Error> {
        self.state = StepState::Open(level);
        log::debug!("Step {}", level);

        self.write_geometry(level, w)?;
        self.write_fields(level, w)?;

        let time = self.container.time(level).unwrap_or(level as f64);
        w.add_time(time)?;
        w.finalize_step()?;
        self.state = StepState::Idle;
        Ok(())
    }

    /// true while a step has been started but not finalized, which only remains the case after an
    /// error
    pub fn step_open(&self) -> Option<usize> {
        match self.state {
            StepState::Open(level) => Some(level),
            StepState::Idle => None,
        }
    }

    fn write_geometry(&mut self, level: usize, w: &mut dyn Writer) -> Result<(), Error> {
        for basis in self.catalogue.bases() {
            if !basis.updated_at(level) {
                continue;
            }
            let npatches = self.catalogue.npatches(&self.container, level, &basis.name)?;
            for index in 0..npatches {
                let patch = self.cache.get(&self.container, basis, level, index)?;
                let record = self.patches.add(&patch)?;
                if let Some(replaced) = self.slots.assign(&basis.name, index, record.id) {
                    log::debug!("Removing geometry of patch {}, replaced by {}", replaced, record.id);
                    w.remove_geometry(replaced)?;
                }
                if !record.needs_update(level) {
                    log::debug!(
                        "Skipping geometry of patch {} ({} #{}), already written",
                        record.id,
                        basis.name,
                        index
                    );
                    continue;
                }

                record.set_tesselation(patch.tesselation_grid());
                let mesh = patch.tesselate_on(record.tesselation())?;
                log::debug!(
                    "Writing geometry of patch {} ({} #{}): {} node(s), {} cell(s)",
                    record.id,
                    basis.name,
                    index,
                    mesh.num_nodes(),
                    mesh.num_cells()
                );
                w.update_geometry(mesh, record.id)?;
                record.mark_written(level);
            }
            for unused in self.slots.truncate(&basis.name, npatches) {
                log::debug!("Removing geometry of patch {}, {} has fewer patches", unused, basis.name);
                w.remove_geometry(unused)?;
            }
        }
        Ok(())
    }

    fn write_fields(&mut self, level: usize, w: &mut dyn Writer) -> Result<(), Error> {
        for field in self.catalogue.fields() {
            if !field.present_at(&self.container, level) {
                continue;
            }
            let basis = self.catalogue.basis(&field.basis)?;
            let decompositions = field.decompositions();

            for fieldpatch in field.patches(&self.container, &mut self.cache, basis, level)? {
                let mut outputs: Vec<FieldPatch> = decompositions
                    .iter()
                    .filter_map(|(index, name)| fieldpatch.pick_component(*index, name.as_str()))
                    .collect();
                outputs.insert(0, fieldpatch);

                for mut output in outputs {
                    let patch = match output.patch() {
                        Some(patch) => Rc::clone(patch),
                        None => continue,
                    };
                    // sampled on the grid the geometry went out with, so rows line up with nodes
                    let record = self.patches.add(&patch)?;
                    output.ensure_ncomps(3, true);
                    let data = output.tesselate_on(record.tesselation())?;
                    w.update_field(&output.name, data, output.cells, record.id)?;
                }
            }
        }
        Ok(())
    }
}
