//! Legacy VTK files (`.vtk`)

use super::{cast_indices, step_filename, Grid, MeshState, Numeric};
use crate::fields::{nan_filter, NanPolicy};
use crate::geometry::UnstructuredPatch;
use crate::prelude::*;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Writes one legacy `.vtk` file per step, named `<stem>-<step>.vtk`
#[derive(Debug, Clone)]
pub struct VtkWriter {
    path: PathBuf,
    mode: OutputMode,
    state: MeshState,
}

impl VtkWriter {
    /// supports the `ascii` and `binary` modes
    pub fn new(path: &Path, config: &Config) -> Result<Self, Error> {
        match config.output_mode {
            OutputMode::Ascii | OutputMode::Binary => Ok(Self {
                path: path.to_path_buf(),
                mode: config.output_mode,
                state: MeshState::default(),
            }),
            mode => Err(Error::UnsupportedMode {
                format: "VTK",
                mode,
            }),
        }
    }

    fn nan_policy(&self) -> NanPolicy {
        match self.mode {
            OutputMode::Ascii => NanPolicy::ReplaceWithZero,
            _ => NanPolicy::Preserve,
        }
    }
}

pub(crate) fn create(path: &Path, config: &Config) -> Result<Box<dyn Writer>, Error> {
    Ok(Box::new(VtkWriter::new(path, config)?))
}

impl Writer for VtkWriter {
    fn update_geometry(&mut self, patch: UnstructuredPatch, patch_id: PatchId) -> Result<(), Error> {
        self.state.update_geometry(patch, patch_id);
        Ok(())
    }

    fn remove_geometry(&mut self, patch_id: PatchId) -> Result<(), Error> {
        self.state.remove_geometry(patch_id);
        Ok(())
    }

    fn update_field(
        &mut self,
        name: &str,
        data: Array2<f64>,
        cells: bool,
        patch_id: PatchId,
    ) -> Result<(), Error> {
        self.state.update_field(name, data, cells, patch_id);
        Ok(())
    }

    fn add_time(&mut self, time: f64) -> Result<(), Error> {
        self.state.add_time(time);
        Ok(())
    }

    fn finalize_step(&mut self) -> Result<(), Error> {
        let mut grid = self.state.assemble()?;
        let policy = self.nan_policy();
        for (name, data) in grid.point_data.iter_mut().chain(grid.cell_data.iter_mut()) {
            nan_filter(data, name, policy);
        }
        let filename = step_filename(&self.path, self.state.step());
        let mut file = BufWriter::new(File::create(&filename)?);
        write_legacy(&mut file, &grid, self.mode == OutputMode::Binary)?;
        file.flush()?;
        log::info!("{}", filename.display());
        self.state.next_step();
        Ok(())
    }
}

/// Serialize a grid as a legacy unstructured grid, big endian if `binary` is set
pub fn write_legacy<W: Write>(w: &mut W, grid: &Grid, binary: bool) -> Result<(), Error> {
    writeln!(w, "# vtk DataFile Version 3.0")?;
    writeln!(w, "Converted by ifem-vtk")?;
    writeln!(w, "{}", if binary { "BINARY" } else { "ASCII" })?;
    writeln!(w, "DATASET UNSTRUCTURED_GRID")?;

    let points: Vec<f64> = grid.points.iter().copied().collect();
    writeln!(w, "POINTS {} {}", grid.num_points(), f64::LEGACY_TYPE)?;
    write_values(w, &points, 3, binary)?;

    writeln!(
        w,
        "CELLS {} {}",
        grid.num_cells(),
        grid.num_cells() + grid.connectivity.len()
    )?;
    let mut cells: Vec<i32> = Vec::with_capacity(grid.connectivity.len() + grid.num_cells());
    for cell in grid.cells() {
        let mut row = cast_indices::<i32>(&[cell.len()])?;
        row.extend(cast_indices::<i32>(cell)?);
        if binary {
            cells.extend(row);
        } else {
            write_values(w, &row, row.len(), false)?;
        }
    }
    if binary {
        write_values(w, &cells, 1, true)?;
    }

    let types: Vec<i32> = grid.types.iter().map(|t| i32::from(*t)).collect();
    writeln!(w, "CELL_TYPES {}", grid.num_cells())?;
    write_values(w, &types, 1, binary)?;

    write_field_data(w, "POINT_DATA", grid.num_points(), &grid.point_data, binary)?;
    write_field_data(w, "CELL_DATA", grid.num_cells(), &grid.cell_data, binary)?;
    Ok(())
}

fn write_field_data<W: Write>(
    w: &mut W,
    section: &str,
    count: usize,
    arrays: &[(String, Array2<f64>)],
    binary: bool,
) -> Result<(), Error> {
    if arrays.is_empty() {
        return Ok(());
    }
    writeln!(w, "{} {}", section, count)?;
    writeln!(w, "FIELD FieldData {}", arrays.len())?;
    for (name, data) in arrays {
        // legacy array names are whitespace delimited
        let name = name.replace(char::is_whitespace, "_");
        writeln!(w, "{} {} {} {}", name, data.ncols(), data.nrows(), f64::LEGACY_TYPE)?;
        let values: Vec<f64> = data.iter().copied().collect();
        write_values(w, &values, data.ncols().max(1), binary)?;
    }
    Ok(())
}

/// one line per `per_line` values in ascii, a big endian block followed by a newline in binary
fn write_values<W: Write, N: Numeric>(
    w: &mut W,
    values: &[N],
    per_line: usize,
    binary: bool,
) -> Result<(), Error> {
    if binary {
        let mut bytes = Vec::with_capacity(values.len() * std::mem::size_of::<N>());
        values.iter().for_each(|v| v.extend_be_bytes(&mut bytes));
        w.write_all(&bytes)?;
        writeln!(w)?;
        return Ok(());
    }

    let mut line = String::new();
    for row in values.chunks(per_line) {
        line.clear();
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                line.push(' ');
            }
            value.push_ascii(&mut line);
        }
        writeln!(w, "{}", line)?;
    }
    Ok(())
}
