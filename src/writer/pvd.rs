//! ParaView collections (`.pvd`) referencing one `.vtu` file per step

use super::xml::VtuWriter;
use crate::geometry::UnstructuredPatch;
use crate::prelude::*;
use crate::writer::Writer;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Writer as XmlWriter;

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Writes steps to `<stem>/data-<step>.vtu` next to the collection file and lists them in the
/// collection, which is completed by [`close`](Writer::close).
pub struct PvdWriter {
    data_dir: PathBuf,
    /// the data directory as referenced from the collection file
    relative_dir: String,
    vtu: VtuWriter,
    collection: XmlWriter<BufWriter<File>>,
    closed: bool,
}

impl PvdWriter {
    pub fn new(path: &Path, config: &Config) -> Result<Self, Error> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "data".to_string());
        let data_dir = path.with_file_name(&stem);
        let vtu = VtuWriter::new(&data_dir.join("data.vtu"), config)?;

        let mut collection = XmlWriter::new_with_indent(BufWriter::new(File::create(path)?), b' ', 2);
        let mut root = BytesStart::new("VTKFile");
        root.push_attribute(("type", "Collection"));
        root.push_attribute(("version", "0.1"));
        collection.write_event(Event::Start(root))?;
        collection.write_event(Event::Start(BytesStart::new("Collection")))?;

        Ok(Self {
            data_dir,
            relative_dir: stem,
            vtu,
            collection,
            closed: false,
        })
    }
}

pub(crate) fn create(path: &Path, config: &Config) -> Result<Box<dyn Writer>, Error> {
    Ok(Box::new(PvdWriter::new(path, config)?))
}

impl Writer for PvdWriter {
    fn update_geometry(&mut self, patch: UnstructuredPatch, patch_id: PatchId) -> Result<(), Error> {
        self.vtu.update_geometry(patch, patch_id)
    }

    fn remove_geometry(&mut self, patch_id: PatchId) -> Result<(), Error> {
        self.vtu.remove_geometry(patch_id)
    }

    fn update_field(
        &mut self,
        name: &str,
        data: Array2<f64>,
        cells: bool,
        patch_id: PatchId,
    ) -> Result<(), Error> {
        self.vtu.update_field(name, data, cells, patch_id)
    }

    fn add_time(&mut self, time: f64) -> Result<(), Error> {
        self.vtu.add_time(time)
    }

    fn finalize_step(&mut self) -> Result<(), Error> {
        let name = format!("data-{}.vtu", self.vtu.state.step());
        let timestep = self.vtu.state.timestep();

        fs::create_dir_all(&self.data_dir)?;
        self.vtu.finalize_to(&self.data_dir.join(&name))?;

        let file = format!("{}/{}", self.relative_dir, name);
        let mut dataset = BytesStart::new("DataSet");
        dataset.push_attribute(("timestep", timestep.to_string().as_str()));
        dataset.push_attribute(("part", "0"));
        dataset.push_attribute(("file", file.as_str()));
        self.collection.write_event(Event::Empty(dataset))?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        self.collection
            .write_event(Event::End(BytesEnd::new("Collection")))?;
        self.collection
            .write_event(Event::End(BytesEnd::new("VTKFile")))?;
        self.collection.inner().flush()?;
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::CellType;
    use ndarray::arr2;

    #[test]
    fn collection_lists_steps() {
        let dir = std::env::temp_dir().join("ifem-vtk-pvd-unit");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("run.pvd");

        let mut writer = PvdWriter::new(&path, &Config::default()).unwrap();
        let segment = UnstructuredPatch::new(
            arr2(&[[0., 0., 0.], [1., 0., 0.]]),
            arr2(&[[0, 1]]),
            CellType::Line,
        );
        writer.update_geometry(segment, PatchId(0)).unwrap();
        writer.add_time(0.25).unwrap();
        writer.finalize_step().unwrap();
        writer.finalize_step().unwrap();
        writer.close().unwrap();
        writer.close().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("<DataSet timestep=\"0.25\" part=\"0\" file=\"run/data-0.vtu\"/>"));
        assert!(text.contains("<DataSet timestep=\"1\" part=\"0\" file=\"run/data-1.vtu\"/>"));
        assert!(text.trim_end().ends_with("</VTKFile>"));
        assert!(dir.join("run").join("data-1.vtu").exists());
    }
}
