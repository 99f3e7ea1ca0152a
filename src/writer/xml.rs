//! VTK XML unstructured grid files (`.vtu`)

use super::{step_filename, Grid, MeshState, Numeric};
use crate::geometry::UnstructuredPatch;
use crate::prelude::*;
use crate::writer::Writer;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer as XmlWriter;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Writes one `.vtu` file per step, named `<stem>-<step>.vtu`
#[derive(Debug, Clone)]
pub struct VtuWriter {
    path: PathBuf,
    mode: OutputMode,
    pub(crate) state: MeshState,
}

impl VtuWriter {
    /// all output modes are supported
    pub fn new(path: &Path, config: &Config) -> Result<Self, Error> {
        Ok(Self {
            path: path.to_path_buf(),
            mode: config.output_mode,
            state: MeshState::default(),
        })
    }

    /// the file the current step is written to
    pub fn current_filename(&self) -> PathBuf {
        step_filename(&self.path, self.state.step())
    }

    /// write the current step to an explicit location
    pub(crate) fn finalize_to(&mut self, filename: &Path) -> Result<(), Error> {
        let grid = self.state.assemble()?;
        let file = BufWriter::new(File::create(filename)?);
        write_vtu(file, &grid, self.mode)?;
        log::info!("{}", filename.display());
        self.state.next_step();
        Ok(())
    }
}

pub(crate) fn create(path: &Path, config: &Config) -> Result<Box<dyn Writer>, Error> {
    Ok(Box::new(VtuWriter::new(path, config)?))
}

impl Writer for VtuWriter {
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
        let filename = self.current_filename();
        self.finalize_to(&filename)
    }
}

/// the encoding to use when writing a dataarray
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Encoding {
    Ascii,
    Base64,
    Appended,
}

impl Encoding {
    fn to_str(self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::Base64 => "binary",
            Self::Appended => "appended",
        }
    }
}

impl From<OutputMode> for Encoding {
    fn from(mode: OutputMode) -> Self {
        match mode {
            OutputMode::Ascii => Self::Ascii,
            OutputMode::Binary => Self::Base64,
            OutputMode::Appended => Self::Appended,
        }
    }
}

/// raw binary blocks collected while writing the headers of appended arrays
#[derive(Debug, Default)]
struct AppendedData {
    bytes: Vec<u8>,
}

impl AppendedData {
    /// add a block and return its offset
    fn push<N: Numeric>(&mut self, values: &[N]) -> usize {
        let offset = self.bytes.len();
        push_block(&mut self.bytes, values);
        offset
    }
}

/// a UInt64 byte count followed by the little endian values
fn push_block<N: Numeric>(bytes: &mut Vec<u8>, values: &[N]) {
    let size = (values.len() * std::mem::size_of::<N>()) as u64;
    bytes.extend_from_slice(&size.to_le_bytes());
    values.iter().for_each(|v| v.extend_le_bytes(bytes));
}

/// Serialize a grid as a VTK XML unstructured grid
pub fn write_vtu<W: Write>(inner: W, grid: &Grid, mode: OutputMode) -> Result<(), Error> {
    let mut writer = XmlWriter::new_with_indent(inner, b' ', 2);
    let encoding = Encoding::from(mode);
    let mut appended = AppendedData::default();

    writer.write_event(Event::Decl(BytesDecl::new("1.0", None, None)))?;

    let mut root = BytesStart::new("VTKFile");
    root.push_attribute(("type", "UnstructuredGrid"));
    root.push_attribute(("version", "1.0"));
    root.push_attribute(("byte_order", "LittleEndian"));
    root.push_attribute(("header_type", "UInt64"));
    writer.write_event(Event::Start(root))?;
    writer.write_event(Event::Start(BytesStart::new("UnstructuredGrid")))?;

    let mut piece = BytesStart::new("Piece");
    piece.push_attribute(("NumberOfPoints", grid.num_points().to_string().as_str()));
    piece.push_attribute(("NumberOfCells", grid.num_cells().to_string().as_str()));
    writer.write_event(Event::Start(piece))?;

    for (section, arrays) in [("PointData", &grid.point_data), ("CellData", &grid.cell_data)] {
        writer.write_event(Event::Start(BytesStart::new(section)))?;
        for (name, data) in arrays {
            let values: Vec<f64> = data.iter().copied().collect();
            write_dataarray(&mut writer, name, data.ncols(), &values, encoding, &mut appended)?;
        }
        writer.write_event(Event::End(BytesEnd::new(section)))?;
    }

    writer.write_event(Event::Start(BytesStart::new("Points")))?;
    let points: Vec<f64> = grid.points.iter().copied().collect();
    write_dataarray(&mut writer, "Points", 3, &points, encoding, &mut appended)?;
    writer.write_event(Event::End(BytesEnd::new("Points")))?;

    writer.write_event(Event::Start(BytesStart::new("Cells")))?;
    let connectivity = super::cast_indices::<i64>(&grid.connectivity)?;
    let offsets = super::cast_indices::<i64>(&grid.offsets)?;
    write_dataarray(&mut writer, "connectivity", 1, &connectivity, encoding, &mut appended)?;
    write_dataarray(&mut writer, "offsets", 1, &offsets, encoding, &mut appended)?;
    write_dataarray(&mut writer, "types", 1, &grid.types, encoding, &mut appended)?;
    writer.write_event(Event::End(BytesEnd::new("Cells")))?;

    writer.write_event(Event::End(BytesEnd::new("Piece")))?;
    writer.write_event(Event::End(BytesEnd::new("UnstructuredGrid")))?;

    if encoding == Encoding::Appended {
        let mut header = BytesStart::new("AppendedData");
        header.push_attribute(("encoding", "raw"));
        writer.write_event(Event::Start(header))?;

        let inner = writer.inner();
        inner.write_all(b"\n_")?;
        inner.write_all(&appended.bytes)?;
        inner.write_all(b"\n")?;

        writer.write_event(Event::End(BytesEnd::new("AppendedData")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("VTKFile")))?;
    writer.inner().flush()?;

    Ok(())
}

fn write_dataarray<W: Write, N: Numeric>(
    writer: &mut XmlWriter<W>,
    name: &str,
    components: usize,
    values: &[N],
    encoding: Encoding,
    appended: &mut AppendedData,
) -> Result<(), Error> {
    let mut header = BytesStart::new("DataArray");
    header.push_attribute(("type", N::XML_TYPE));
    header.push_attribute(("Name", name));
    header.push_attribute(("NumberOfComponents", components.to_string().as_str()));
    header.push_attribute(("format", encoding.to_str()));

    match encoding {
        Encoding::Appended => {
            let offset = appended.push(values);
            header.push_attribute(("offset", offset.to_string().as_str()));
            writer.write_event(Event::Empty(header))?;
        }
        Encoding::Ascii => {
            writer.write_event(Event::Start(header))?;
            let mut data = String::new();
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    data.push(' ');
                }
                value.push_ascii(&mut data);
            }
            writer.write_event(Event::Text(BytesText::new(&data)))?;
            writer.write_event(Event::End(BytesEnd::new("DataArray")))?;
        }
        Encoding::Base64 => {
            writer.write_event(Event::Start(header))?;
            let mut bytes = Vec::with_capacity(8 + values.len() * std::mem::size_of::<N>());
            push_block(&mut bytes, values);
            let data = base64::encode(bytes.as_slice());
            writer.write_event(Event::Text(BytesText::new(&data)))?;
            writer.write_event(Event::End(BytesEnd::new("DataArray")))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::CellType;
    use ndarray::arr2;

    fn grid() -> Grid {
        let mut state = MeshState::default();
        state.update_geometry(
            UnstructuredPatch::new(
                arr2(&[[0., 0., 0.], [1., 0., 0.], [0., 1., 0.], [1., 1., 0.]]),
                arr2(&[[0, 1, 3, 2]]),
                CellType::Quad,
            ),
            PatchId(0),
        );
        state.update_field("p", arr2(&[[1.5], [f64::NAN], [0.], [2.]]), false, PatchId(0));
        state.update_field("e", arr2(&[[7.]]), true, PatchId(0));
        state.assemble().unwrap()
    }

    fn render(mode: OutputMode) -> String {
        let mut out = Vec::new();
        write_vtu(&mut out, &grid(), mode).unwrap();
        String::from_utf8_lossy(&out).into_owned()
    }

    #[test]
    fn ascii_arrays() {
        let text = render(OutputMode::Ascii);
        assert!(text.starts_with("<?xml version=\"1.0\"?>"));
        assert!(text.contains("type=\"UnstructuredGrid\""));
        assert!(text.contains("header_type=\"UInt64\""));
        assert!(text.contains("NumberOfPoints=\"4\" NumberOfCells=\"1\""));
        assert!(text.contains("1.5 NaN 0.0 2.0"));
        assert!(text.contains("0 1 3 2"));
        assert!(text.contains("Name=\"types\" NumberOfComponents=\"1\" format=\"ascii\">9<"));
        assert!(text.contains("<CellData>"));
    }

    #[test]
    fn base64_arrays() {
        let text = render(OutputMode::Binary);
        let mut block = Vec::new();
        push_block(&mut block, &[9u8]);
        assert!(text.contains(&base64::encode(&block)));
        assert!(text.contains("format=\"binary\""));
        assert!(!text.contains("AppendedData"));
    }

    #[test]
    fn appended_offsets() {
        let mut out = Vec::new();
        write_vtu(&mut out, &grid(), OutputMode::Appended).unwrap();
        let text = String::from_utf8_lossy(&out);

        // point data (4 doubles), cell data (1 double), then points (12 doubles)
        assert!(text.contains("Name=\"p\" NumberOfComponents=\"1\" format=\"appended\" offset=\"0\""));
        assert!(text.contains("Name=\"e\" NumberOfComponents=\"1\" format=\"appended\" offset=\"40\""));
        assert!(text.contains("Name=\"Points\" NumberOfComponents=\"3\" format=\"appended\" offset=\"56\""));
        assert!(text.contains("<AppendedData encoding=\"raw\">"));

        // NaN survives bit for bit
        let start = out.windows(2).position(|w| w == b"\n_").unwrap() + 2;
        let second = &out[start + 16..start + 24];
        assert_eq!(
            f64::from_le_bytes(second.try_into().unwrap()).to_bits(),
            f64::NAN.to_bits()
        );
    }
}
