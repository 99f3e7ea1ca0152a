use ifem_vtk::writer::{self, PvdWriter, VtkWriter, VtuWriter};
use ifem_vtk::{
    Config, Error, MemoryContainer, OutputMode, PatchId, Reader, UnstructuredPatch, Writer,
};
use ndarray::Array2;
use std::fs;
use std::path::PathBuf;

fn output_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("ifem-vtk-tests").join(name);
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// linear segment from `x0` to `x1`
fn line(x0: f64, x1: f64) -> String {
    format!("100 1 0 0\n1 0\n2 2\n0 0 1 1\n{}\n{}\n", x0, x1)
}

/// bilinear unit square with two elements in each direction
fn square() -> String {
    let mut g2 = String::from("200 1 0 0\n2 0\n3 2\n0 0 0.5 1 1\n3 2\n0 0 0.5 1 1\n");
    for j in 0..3 {
        for i in 0..3 {
            g2.push_str(&format!("{} {}\n", i as f64 * 0.5, j as f64 * 0.5));
        }
    }
    g2
}

/// trilinear unit cube with a single element
fn cube() -> String {
    let mut g2 = String::from("700 1 0 0\n3 0\n2 2\n0 0 1 1\n2 2\n0 0 1 1\n2 2\n0 0 1 1\n");
    for k in 0..2 {
        for j in 0..2 {
            for i in 0..2 {
                g2.push_str(&format!("{} {} {}\n", i, j, k));
            }
        }
    }
    g2
}

fn convert(container: &MemoryContainer, w: &mut dyn Writer, config: Config) -> Result<(), Error> {
    let mut reader = Reader::new(container, config)?;
    reader.write(w)
}

#[derive(Default)]
struct Recorder {
    geometry: Vec<(usize, PatchId, Array2<f64>, Array2<usize>)>,
    removed: Vec<(usize, PatchId)>,
    fields: Vec<(usize, String, PatchId, Array2<f64>)>,
    times: Vec<f64>,
    step: usize,
    closed: bool,
}

impl Writer for Recorder {
    fn update_geometry(&mut self, patch: UnstructuredPatch, patch_id: PatchId) -> Result<(), Error> {
        self.geometry
            .push((self.step, patch_id, patch.nodes, patch.cells));
        Ok(())
    }

    fn remove_geometry(&mut self, patch_id: PatchId) -> Result<(), Error> {
        self.removed.push((self.step, patch_id));
        Ok(())
    }

    fn update_field(
        &mut self,
        name: &str,
        data: Array2<f64>,
        _cells: bool,
        patch_id: PatchId,
    ) -> Result<(), Error> {
        self.fields
            .push((self.step, name.to_string(), patch_id, data));
        Ok(())
    }

    fn add_time(&mut self, time: f64) -> Result<(), Error> {
        self.times.push(time);
        Ok(())
    }

    fn finalize_step(&mut self) -> Result<(), Error> {
        self.step += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.closed = true;
        Ok(())
    }
}

#[test]
fn deterministic_output() {
    let mut container = MemoryContainer::new();
    container.insert_geometry(0, "mesh", vec![line(0., 1.), line(1., 2.), line(2., 3.)]);
    container.insert_geometry(0, "other", vec![square()]);
    container.insert_field(0, "mesh", "p", vec![vec![1., 2.], vec![3., 4.], vec![5., 6.]]);

    let mut outputs = Vec::new();
    for run in ["first", "second"] {
        let dir = output_dir(&format!("deterministic-{}", run));
        let config = Config::default().with_output_mode(OutputMode::Ascii);
        let mut w = VtuWriter::new(&dir.join("out.vtu"), &config).unwrap();
        convert(&container, &mut w, config).unwrap();
        outputs.push(fs::read(dir.join("out-0.vtu")).unwrap());
    }
    assert_eq!(outputs[0], outputs[1]);

    let mut recorder = Recorder::default();
    convert(&container, &mut recorder, Config::default()).unwrap();
    let ids: Vec<PatchId> = recorder.geometry.iter().map(|g| g.1).collect();
    assert_eq!(ids, vec![PatchId(0), PatchId(1), PatchId(2), PatchId(3)]);
    assert!(recorder.closed);
}

#[test]
fn geometry_updates_reuse_cache() {
    let mut container = MemoryContainer::new();
    for (level, offset) in [(0, 0.), (3, 1.), (7, 2.)] {
        container.insert_geometry(level, "mesh", vec![line(offset, offset + 1.)]);
    }
    for level in 0..10 {
        container.insert_field(level, "mesh", "p", vec![vec![level as f64, 0.]]);
    }

    let mut reader = Reader::new(&container, Config::default()).unwrap();
    let mut recorder = Recorder::default();
    reader.write(&mut recorder).unwrap();

    assert_eq!(reader.cache().decodes(), 3);
    assert_eq!(reader.catalogue().basis_level(5, "mesh").unwrap(), 3);
    let steps: Vec<usize> = recorder.geometry.iter().map(|g| g.0).collect();
    assert_eq!(steps, vec![0, 3, 7]);
    assert_eq!(recorder.removed, vec![(3, PatchId(0)), (7, PatchId(1))]);
    assert_eq!(recorder.fields.len(), 10);
    assert_eq!(recorder.times, (0..10).map(|l| l as f64).collect::<Vec<_>>());

    // field data at level 5 sits on the geometry from level 3
    let (_, _, id, data) = &recorder.fields[5];
    assert_eq!(*id, PatchId(1));
    assert_eq!(data[[0, 0]], 5.0);
}

#[test]
fn moved_geometry_replaces_previous() {
    let mut container = MemoryContainer::new();
    container.insert_geometry(0, "mesh", vec![line(0., 1.)]);
    container.insert_geometry(1, "mesh", vec![line(5., 6.)]);
    container.insert_field(0, "mesh", "p", vec![vec![1., 2.]]);
    container.insert_field(1, "mesh", "p", vec![vec![3., 4.]]);

    let dir = output_dir("moved");
    let config = Config::default().with_output_mode(OutputMode::Ascii);
    let mut w = VtuWriter::new(&dir.join("out.vtu"), &config).unwrap();
    convert(&container, &mut w, config).unwrap();

    let text = fs::read_to_string(dir.join("out-1.vtu")).unwrap();
    assert!(text.contains("NumberOfPoints=\"2\" NumberOfCells=\"1\""));
    assert!(text.contains("Name=\"p\" NumberOfComponents=\"1\" format=\"ascii\">3.0 4.0<"));
    assert!(!text.contains(">0.0 0.0 0.0 1.0 0.0 0.0<"));
}

#[test]
fn field_before_first_geometry() {
    let mut container = MemoryContainer::new();
    container.insert_field(1, "late", "p", vec![vec![1., 2.]]);
    container.insert_geometry(2, "late", vec![line(0., 1.)]);

    let err = Reader::new(&container, Config::default()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Geometry for basis `late` unavailable at timestep 1"
    );
}

#[test]
fn vectors_padded_to_three_components() {
    let mut container = MemoryContainer::new();
    container.insert_geometry(0, "mesh", vec![line(0., 1.)]);
    container.insert_field(0, "mesh", "w", vec![vec![1., 2., 3., 4.]]);

    let dir = output_dir("padding");
    let config = Config::default()
        .with_output_mode(OutputMode::Ascii)
        .with_decompose(false);
    let mut w = VtuWriter::new(&dir.join("out.vtu"), &config).unwrap();
    convert(&container, &mut w, config).unwrap();

    let text = fs::read_to_string(dir.join("out-0.vtu")).unwrap();
    assert!(text.contains(
        "Name=\"w\" NumberOfComponents=\"3\" format=\"ascii\">1.0 2.0 0.0 3.0 4.0 0.0<"
    ));
    assert!(!text.contains("w_x"));
}

#[test]
fn hexahedron_connectivity() {
    let mut container = MemoryContainer::new();
    container.insert_geometry(0, "volume", vec![cube()]);

    let dir = output_dir("hexahedron");
    let config = Config::default().with_output_mode(OutputMode::Ascii);
    let mut w = VtkWriter::new(&dir.join("cube.vtk"), &config).unwrap();
    convert(&container, &mut w, config).unwrap();

    let text = fs::read_to_string(dir.join("cube-0.vtk")).unwrap();
    assert!(text.contains("POINTS 8 double\n0.0 0.0 0.0\n0.0 0.0 1.0\n"));
    assert!(text.contains("CELLS 1 9\n8 0 4 6 2 1 5 7 3\n"));
    assert!(text.contains("CELL_TYPES 1\n12\n"));
}

#[test]
fn quadrilateral_connectivity_and_cell_data() {
    let mut container = MemoryContainer::new();
    container.insert_geometry(0, "surface", vec![square()]);
    // four element values listed with the first direction fastest
    container.insert_field(0, "surface", "e", vec![vec![1., 2., 3., 4.]]);

    let mut recorder = Recorder::default();
    convert(&container, &mut recorder, Config::default()).unwrap();

    let (_, _, nodes, cells) = &recorder.geometry[0];
    assert_eq!(nodes.dim(), (9, 3));
    assert_eq!(cells.dim(), (4, 4));
    assert_eq!(cells.row(0).to_vec(), vec![0, 3, 4, 1]);
    assert_eq!(cells.row(3).to_vec(), vec![4, 7, 8, 5]);

    let (_, name, _, data) = &recorder.fields[0];
    assert_eq!(name, "e");
    assert_eq!(data.iter().copied().collect::<Vec<_>>(), vec![1., 3., 2., 4.]);
}

#[test]
fn identical_patches_share_id() {
    let mut container = MemoryContainer::new();
    container.insert_geometry(0, "pressure", vec![line(0., 1.)]);
    container.insert_geometry(0, "velocity", vec![line(0., 1.)]);
    container.insert_field(0, "pressure", "p", vec![vec![1., 2.]]);
    container.insert_field(0, "velocity", "q", vec![vec![3., 4.]]);

    let mut reader = Reader::new(&container, Config::default()).unwrap();
    let mut recorder = Recorder::default();
    reader.write(&mut recorder).unwrap();

    assert_eq!(recorder.geometry.len(), 1);
    assert_eq!(reader.patches().len(), 1);
    let ids: Vec<PatchId> = recorder.fields.iter().map(|f| f.2).collect();
    assert_eq!(ids, vec![PatchId(0), PatchId(0)]);
}

#[test]
fn decomposed_vector_components() {
    let mut container = MemoryContainer::new();
    container.insert_geometry(0, "mesh", vec![line(0., 1.)]);
    container.insert_field(0, "mesh", "v", vec![vec![1., 2., 3., 4., 5., 6.]]);

    let dir = output_dir("decompose");
    let config = Config::default().with_output_mode(OutputMode::Ascii);
    let mut w = VtuWriter::new(&dir.join("out.vtu"), &config).unwrap();
    convert(&container, &mut w, config).unwrap();

    let text = fs::read_to_string(dir.join("out-0.vtu")).unwrap();
    assert!(text.contains("Name=\"v\" NumberOfComponents=\"3\" format=\"ascii\">1.0 2.0 3.0 4.0 5.0 6.0<"));
    assert!(text.contains("Name=\"v_x\" NumberOfComponents=\"1\" format=\"ascii\">1.0 4.0<"));
    assert!(text.contains("Name=\"v_y\" NumberOfComponents=\"1\" format=\"ascii\">2.0 5.0<"));
    assert!(text.contains("Name=\"v_z\" NumberOfComponents=\"1\" format=\"ascii\">3.0 6.0<"));
}

#[test]
fn split_fields_are_combined() {
    let mut container = MemoryContainer::new();
    container.insert_geometry(0, "mesh", vec![line(0., 1.)]);
    container.insert_field(0, "mesh", "u_x", vec![vec![1., 2.]]);
    container.insert_field(0, "mesh", "u_y", vec![vec![3., 4.]]);

    let mut recorder = Recorder::default();
    convert(&container, &mut recorder, Config::default()).unwrap();
    let names: Vec<&str> = recorder.fields.iter().map(|f| f.1.as_str()).collect();
    assert_eq!(names, vec!["u_x", "u_y", "u"]);
    assert_eq!(
        recorder.fields[2].3,
        ndarray::arr2(&[[1., 3., 0.], [2., 4., 0.]])
    );

    let mut recorder = Recorder::default();
    let config = Config::default().with_combine_split_fields(false);
    convert(&container, &mut recorder, config).unwrap();
    assert_eq!(recorder.fields.len(), 2);
}

#[test]
fn nan_policy_per_format() {
    // cell data is reordered but never interpolated, so values reach the writer untouched
    let mut container = MemoryContainer::new();
    container.insert_geometry(0, "surface", vec![square()]);
    container.insert_field(0, "surface", "p", vec![vec![f64::NAN, 1., 2., 3.]]);

    let dir = output_dir("nan");

    let ascii = Config::default().with_output_mode(OutputMode::Ascii);
    let mut w = VtkWriter::new(&dir.join("ascii.vtk"), &ascii).unwrap();
    convert(&container, &mut w, ascii).unwrap();
    let text = fs::read_to_string(dir.join("ascii-0.vtk")).unwrap();
    assert!(text.contains("CELL_DATA 4\nFIELD FieldData 1\np 1 4 double\n0.0\n2.0\n1.0\n3.0\n"));
    assert!(!text.contains("NaN"));

    let binary = Config::default().with_output_mode(OutputMode::Binary);
    let mut w = VtkWriter::new(&dir.join("binary.vtk"), &binary).unwrap();
    convert(&container, &mut w, binary).unwrap();
    let bytes = fs::read(dir.join("binary-0.vtk")).unwrap();
    let nan = f64::NAN.to_be_bytes();
    assert!(bytes.windows(8).any(|w| w == nan));

    let appended = Config::default().with_output_mode(OutputMode::Appended);
    let mut w = VtuWriter::new(&dir.join("appended.vtu"), &appended).unwrap();
    convert(&container, &mut w, appended).unwrap();
    let bytes = fs::read(dir.join("appended-0.vtu")).unwrap();
    let nan = f64::NAN.to_le_bytes();
    assert!(bytes.windows(8).any(|w| w == nan));
}

#[test]
fn pvd_collection_with_times() {
    let mut container = MemoryContainer::new();
    container.insert_geometry(0, "mesh", vec![line(0., 1.)]);
    container.insert_field(0, "mesh", "p", vec![vec![1., 2.]]);
    container.insert_field(1, "mesh", "p", vec![vec![3., 4.]]);
    container.set_time(0, 0.0).set_time(1, 0.125);

    let dir = output_dir("pvd");
    let config = Config::default();
    let mut w = PvdWriter::new(&dir.join("result.pvd"), &config).unwrap();
    convert(&container, &mut w, config).unwrap();

    let collection = fs::read_to_string(dir.join("result.pvd")).unwrap();
    assert!(collection.contains("type=\"Collection\""));
    assert!(collection.contains("timestep=\"0\" part=\"0\" file=\"result/data-0.vtu\""));
    assert!(collection.contains("timestep=\"0.125\" part=\"0\" file=\"result/data-1.vtu\""));
    assert!(collection.trim_end().ends_with("</VTKFile>"));

    // the second step keeps the geometry written in the first
    let step = fs::read_to_string(dir.join("result").join("data-1.vtu")).unwrap();
    assert!(step.contains("NumberOfPoints=\"2\" NumberOfCells=\"1\""));
}

#[test]
fn convert_directory_input() {
    let root = output_dir("directory-input");
    let input = root.join("input");
    for (level, x0) in [(0, 0.), (2, 1.)] {
        let basis = input.join(level.to_string()).join("mesh").join("basis");
        fs::create_dir_all(&basis).unwrap();
        fs::write(basis.join("1"), line(x0, x0 + 1.)).unwrap();
    }
    for level in 0..3 {
        let field = input.join(level.to_string()).join("mesh").join("fields").join("p");
        fs::create_dir_all(&field).unwrap();
        fs::write(field.join("1"), format!("{} 0", level)).unwrap();
    }

    let container = ifem_vtk::container::open(&input).unwrap();
    let mut reader = Reader::new(container, Config::default()).unwrap();
    let mut recorder = Recorder::default();
    reader.write(&mut recorder).unwrap();

    let steps: Vec<usize> = recorder.geometry.iter().map(|g| g.0).collect();
    assert_eq!(steps, vec![0, 2]);
    assert_eq!(recorder.removed, vec![(2, PatchId(0))]);
    assert_eq!(recorder.fields.len(), 3);
    assert_eq!(recorder.times, vec![0., 1., 2.]);
}

#[test]
fn registry_rejects_before_io() {
    let dir = output_dir("registry");
    let path = dir.join("never.vtk");
    let config = Config::default().with_output_mode(OutputMode::Appended);

    let err = writer::create("vtk", &path, &config).err().unwrap();
    assert!(matches!(err, Error::UnsupportedMode { format: "VTK", .. }));
    assert!(!path.exists());

    let err = writer::create("obj", &path, &config).err().unwrap();
    assert_eq!(
        err.to_string(),
        "Unable to find any applicable writers for format `obj`"
    );

    assert!(writer::create("pvd", &dir.join("ok.pvd"), &config).is_ok());
}
