//! Turning evaluated structured grids into nodes and cells.
//!
//! A patch evaluated on its grid gives an array of shape `(n_1, ..., n_d, 3)`. The nodes are that
//! array flattened in row-major order (first grid axis slowest) and every unit cell of the grid
//! becomes one line, quadrilateral or hexahedron. Hexahedra follow the VTK vertex order: the
//! bottom face counter-clockwise, then the top face in the same order.

use crate::geometry::{CellType, UnstructuredPatch};
use crate::prelude::*;
use ndarray::{Array2, ArrayD};

/// row-major index of a grid point
#[inline]
fn ravel(index: &[usize], shape: &[usize]) -> usize {
    index
        .iter()
        .zip(shape.iter())
        .fold(0, |acc, (i, n)| acc * n + i)
}

/// connectivity of a structured grid with `shape` nodes along each axis
///
/// an axis with a single node has no cells along it, so such a grid has no elements
pub fn elements(shape: &[usize]) -> Array2<usize> {
    let cells: Vec<usize> = shape.iter().map(|n| n.saturating_sub(1)).collect();
    let num_cells: usize = cells.iter().product();
    let mut out = Vec::with_capacity(num_cells << shape.len());

    match shape.len() {
        1 => {
            for i in 0..cells[0] {
                out.extend([i, i + 1]);
            }
        }
        2 => {
            for i in 0..cells[0] {
                for j in 0..cells[1] {
                    out.extend([
                        ravel(&[i, j], shape),
                        ravel(&[i + 1, j], shape),
                        ravel(&[i + 1, j + 1], shape),
                        ravel(&[i, j + 1], shape),
                    ]);
                }
            }
        }
        3 => {
            for i in 0..cells[0] {
                for j in 0..cells[1] {
                    for k in 0..cells[2] {
                        out.extend([
                            ravel(&[i, j, k], shape),
                            ravel(&[i + 1, j, k], shape),
                            ravel(&[i + 1, j + 1, k], shape),
                            ravel(&[i, j + 1, k], shape),
                            ravel(&[i, j, k + 1], shape),
                            ravel(&[i + 1, j, k + 1], shape),
                            ravel(&[i + 1, j + 1, k + 1], shape),
                            ravel(&[i, j + 1, k + 1], shape),
                        ]);
                    }
                }
            }
        }
        _ => {}
    }

    let width = 1 << shape.len();
    let rows = out.len() / width;
    Array2::from_shape_vec((rows, width), out).unwrap_or_else(|_| Array2::zeros((0, width)))
}

/// flatten evaluated nodes of shape `(n_1, ..., n_d, components)` and build their cells
pub fn tesselate(nodes: ArrayD<f64>) -> Result<UnstructuredPatch, Error> {
    let pardim = nodes.ndim().saturating_sub(1);
    let celltype = CellType::from_pardim(pardim).ok_or_else(|| {
        Error::Spline(format!(
            "cannot tesselate a grid of parametric dimension {}",
            pardim
        ))
    })?;

    let shape = nodes.shape()[..pardim].to_vec();
    let components = nodes.shape()[pardim];
    let num_nodes = shape.iter().product();

    let nodes = nodes
        .as_standard_layout()
        .into_owned()
        .into_shape((num_nodes, components))?;

    Ok(UnstructuredPatch::new(nodes, elements(&shape), celltype))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn single_hexahedron() {
        let cells = elements(&[2, 2, 2]);
        assert_eq!(cells.dim(), (1, 8));
        assert_eq!(cells.row(0).to_vec(), vec![0, 4, 6, 2, 1, 5, 7, 3]);
    }

    #[test]
    fn quads_on_three_by_three() {
        let cells = elements(&[3, 3]);
        assert_eq!(cells.dim(), (4, 4));
        assert_eq!(cells.row(0).to_vec(), vec![0, 3, 4, 1]);
        assert_eq!(cells.row(1).to_vec(), vec![1, 4, 5, 2]);
        assert_eq!(cells.row(3).to_vec(), vec![4, 7, 8, 5]);
    }

    #[test]
    fn lines() {
        let cells = elements(&[4]);
        assert_eq!(cells, ndarray::arr2(&[[0, 1], [1, 2], [2, 3]]));
    }

    #[test]
    fn degenerate_axis_has_no_cells() {
        assert_eq!(elements(&[1, 5]).dim(), (0, 4));
        assert_eq!(elements(&[3, 1, 2]).dim(), (0, 8));
        assert_eq!(elements(&[1]).dim(), (0, 2));
    }

    #[test]
    fn nodes_flattened_row_major() {
        let values: Vec<f64> = (0..2 * 3 * 3).map(|v| v as f64).collect();
        let nodes = ArrayD::from_shape_vec(IxDyn(&[2, 3, 3]), values).unwrap();

        let mesh = tesselate(nodes).unwrap();
        assert_eq!(mesh.celltype, CellType::Quad);
        assert_eq!(mesh.num_nodes(), 6);
        assert_eq!(mesh.num_cells(), 2);
        assert_eq!(mesh.nodes.row(4).to_vec(), vec![12., 13., 14.]);
    }

    #[test]
    fn rejects_flat_arrays() {
        let nodes = ArrayD::<f64>::zeros(IxDyn(&[3]));
        assert!(tesselate(nodes).is_err());
    }
}
