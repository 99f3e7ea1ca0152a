//! Access to the hierarchical input data.
//!
//! Result files are laid out as a tree: the top level is indexed by time level (`"0"`, `"1"`,
//! ...), each level contains named basis groups, and a basis group may carry a `basis` subgroup
//! with one serialized geometry block per patch and a `fields` subgroup with one array per field
//! and patch. Patch indices are 1-based in storage and 0-based everywhere in this crate.
//!
//! Parsing the actual file format lives outside this crate. Anything that can answer the
//! questions of [`Container`] can be converted; [`MemoryContainer`] is the in-memory
//! implementation.
//!
//! Inputs on disk are opened through an explicit registry ([`CONTAINERS`]). The one built in
//! entry reads a directory laid out like the tree above:
//!
//! ```text
//! <root>/<level>/time                             physical time (optional)
//! <root>/<level>/<basis>/basis/<patch>            G2 text
//! <root>/<level>/<basis>/fields/<field>/<patch>   whitespace separated reals
//! ```

use crate::Error;
use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};

pub trait Container {
    /// number of time levels in the file
    fn nlevels(&self) -> usize;

    /// names of the basis groups present at a level, in storage order
    fn bases(&self, level: usize) -> Vec<String>;

    /// number of geometry blocks stored for the basis at exactly this level, or `None` if the
    /// basis group has no geometry subgroup at this level
    fn geometry_count(&self, level: usize, basis: &str) -> Option<usize>;

    /// raw (text encoded) geometry block of a patch
    fn geometry(&self, level: usize, basis: &str, patch: usize) -> Result<Vec<u8>, Error>;

    /// names of the fields stored under the basis at this level
    fn fields(&self, level: usize, basis: &str) -> Vec<String>;

    /// raw coefficients of a field on a patch, flattened with the components fastest
    fn field(&self, level: usize, basis: &str, field: &str, patch: usize)
        -> Result<Vec<f64>, Error>;

    /// physical time of a level, if the file records one
    fn time(&self, _level: usize) -> Option<f64> {
        None
    }
}

macro_rules! forward_container {
    ($ty:ty) => {
        impl<C: Container + ?Sized> Container for $ty {
            fn nlevels(&self) -> usize {
                (**self).nlevels()
            }

            fn bases(&self, level: usize) -> Vec<String> {
                (**self).bases(level)
            }

            fn geometry_count(&self, level: usize, basis: &str) -> Option<usize> {
                (**self).geometry_count(level, basis)
            }

            fn geometry(&self, level: usize, basis: &str, patch: usize) -> Result<Vec<u8>, Error> {
                (**self).geometry(level, basis, patch)
            }

            fn fields(&self, level: usize, basis: &str) -> Vec<String> {
                (**self).fields(level, basis)
            }

            fn field(
                &self,
                level: usize,
                basis: &str,
                field: &str,
                patch: usize,
            ) -> Result<Vec<f64>, Error> {
                (**self).field(level, basis, field, patch)
            }

            fn time(&self, level: usize) -> Option<f64> {
                (**self).time(level)
            }
        }
    };
}

forward_container!(&C);
forward_container!(Box<C>);

/// opens the input at a path
pub type Opener = fn(&Path) -> Result<Box<dyn Container>, Error>;

pub struct ContainerEntry {
    pub name: &'static str,
    pub applicable: fn(&Path) -> bool,
    pub open: Opener,
}

/// all input containers, in the order they are tried
pub const CONTAINERS: &[ContainerEntry] = &[ContainerEntry {
    name: "directory tree",
    applicable: |path| path.is_dir(),
    open: open_dir,
}];

/// the first registered container that can read `path`
pub fn find_applicable(path: &Path) -> Result<&'static ContainerEntry, Error> {
    for entry in CONTAINERS {
        if (entry.applicable)(path) {
            log::info!("Using container: {}", entry.name);
            return Ok(entry);
        }
        log::debug!("Rejecting container: {}", entry.name);
    }
    Err(Error::UnknownInput(path.to_path_buf()))
}

/// open the input at `path` with the first applicable container
pub fn open(path: &Path) -> Result<Box<dyn Container>, Error> {
    let entry = find_applicable(path)?;
    (entry.open)(path)
}

fn open_dir(path: &Path) -> Result<Box<dyn Container>, Error> {
    Ok(Box::new(MemoryContainer::from_dir(path)?))
}

/// entries of `dir` named by an integer, in numeric order
fn numbered_entries(dir: &Path) -> Result<Vec<(usize, PathBuf)>, Error> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let number = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.parse().ok());
        if let Some(number) = number {
            entries.push((number, path));
        }
    }
    entries.sort();
    Ok(entries)
}

/// subdirectories of `dir` by name, sorted
fn named_dirs(dir: &Path) -> Result<Vec<(String, PathBuf)>, Error> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
            dirs.push((name.to_string(), path.clone()));
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn read_reals(path: &Path) -> Result<Vec<f64>, Error> {
    fs::read_to_string(path)?
        .split_ascii_whitespace()
        .map(|token| {
            token.parse().map_err(|_| Error::InvalidInput {
                path: path.to_path_buf(),
                reason: format!("`{}` is not a real number", token),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
struct BasisGroup {
    geometry: Option<Vec<Vec<u8>>>,
    fields: IndexMap<String, Vec<Vec<f64>>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Level {
    time: Option<f64>,
    bases: IndexMap<String, BasisGroup>,
}

/// A [`Container`] held entirely in memory.
///
/// Levels are created on demand: inserting data at level 3 into an empty container creates
/// levels 0 through 3.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryContainer {
    levels: Vec<Level>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    fn level_mut(&mut self, level: usize) -> &mut Level {
        if self.levels.len() <= level {
            self.levels.resize_with(level + 1, Level::default);
        }
        &mut self.levels[level]
    }

    fn group(&self, level: usize, basis: &str) -> Option<&BasisGroup> {
        self.levels.get(level).and_then(|l| l.bases.get(basis))
    }

    /// register an (empty) basis group at a level
    pub fn insert_basis(&mut self, level: usize, basis: &str) -> &mut Self {
        self.level_mut(level)
            .bases
            .entry(basis.to_string())
            .or_default();
        self
    }

    /// store the geometry blocks of every patch of a basis at a level
    pub fn insert_geometry<T: Into<Vec<u8>>>(
        &mut self,
        level: usize,
        basis: &str,
        blocks: Vec<T>,
    ) -> &mut Self {
        let blocks = blocks.into_iter().map(Into::into).collect();
        self.level_mut(level)
            .bases
            .entry(basis.to_string())
            .or_default()
            .geometry = Some(blocks);
        self
    }

    /// store the coefficients of a field on every patch of a basis at a level
    pub fn insert_field(
        &mut self,
        level: usize,
        basis: &str,
        field: &str,
        patches: Vec<Vec<f64>>,
    ) -> &mut Self {
        self.level_mut(level)
            .bases
            .entry(basis.to_string())
            .or_default()
            .fields
            .insert(field.to_string(), patches);
        self
    }

    pub fn set_time(&mut self, level: usize, time: f64) -> &mut Self {
        self.level_mut(level).time = Some(time);
        self
    }

    /// load a directory tree, see the [module documentation](self) for the layout
    ///
    /// levels, bases and fields with names that do not fit the layout are skipped. Patches are
    /// taken in the numeric order of their file names.
    pub fn from_dir(root: &Path) -> Result<Self, Error> {
        let mut container = Self::new();
        for (level, dir) in numbered_entries(root)? {
            if !dir.is_dir() {
                continue;
            }
            container.level_mut(level);

            let time = dir.join("time");
            if time.is_file() {
                let value = read_reals(&time)?.first().copied().ok_or_else(|| {
                    Error::InvalidInput {
                        path: time.clone(),
                        reason: "no time value".to_string(),
                    }
                })?;
                container.set_time(level, value);
            }

            for (basis, group) in named_dirs(&dir)? {
                container.insert_basis(level, &basis);

                let geometry = group.join("basis");
                if geometry.is_dir() {
                    let blocks = numbered_entries(&geometry)?
                        .into_iter()
                        .map(|(_, path)| fs::read(path))
                        .collect::<Result<Vec<_>, _>>()?;
                    container.insert_geometry(level, &basis, blocks);
                }

                let fields = group.join("fields");
                if fields.is_dir() {
                    for (field, patches) in named_dirs(&fields)? {
                        let data = numbered_entries(&patches)?
                            .iter()
                            .map(|(_, path)| read_reals(path))
                            .collect::<Result<Vec<_>, _>>()?;
                        container.insert_field(level, &basis, &field, data);
                    }
                }
            }
            log::debug!("Loaded level {} from {}", level, dir.display());
        }
        Ok(container)
    }
}

impl Container for MemoryContainer {
    fn nlevels(&self) -> usize {
        self.levels.len()
    }

    fn bases(&self, level: usize) -> Vec<String> {
        self.levels
            .get(level)
            .map(|l| l.bases.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn geometry_count(&self, level: usize, basis: &str) -> Option<usize> {
        self.group(level, basis)
            .and_then(|g| g.geometry.as_ref())
            .map(Vec::len)
    }

    fn geometry(&self, level: usize, basis: &str, patch: usize) -> Result<Vec<u8>, Error> {
        self.group(level, basis)
            .and_then(|g| g.geometry.as_ref())
            .and_then(|blocks| blocks.get(patch))
            .cloned()
            .ok_or_else(|| Error::MissingData(format!("{}/{}/basis/{}", level, basis, patch + 1)))
    }

    fn fields(&self, level: usize, basis: &str) -> Vec<String> {
        self.group(level, basis)
            .map(|g| g.fields.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn field(
        &self,
        level: usize,
        basis: &str,
        field: &str,
        patch: usize,
    ) -> Result<Vec<f64>, Error> {
        self.group(level, basis)
            .and_then(|g| g.fields.get(field))
            .and_then(|patches| patches.get(patch))
            .cloned()
            .ok_or_else(|| {
                Error::MissingData(format!("{}/{}/fields/{}/{}", level, basis, field, patch + 1))
            })
    }

    fn time(&self, level: usize) -> Option<f64> {
        self.levels.get(level).and_then(|l| l.time)
    }
}
