use crate::prelude::*;
use ndarray::{concatenate, Array2, ArrayD, ArrayView2, Axis, IxDyn, Slice};

/// knots closer than this are treated as the same break point
const KNOT_TOLERANCE: f64 = 1e-10;

/// A tensor product B-spline (or NURBS) curve, surface or volume.
///
/// Control points are stored in an array of shape `(n_1, ..., n_d, components)` where the first
/// parametric direction comes first. For rational patches the coefficients are homogeneous: the
/// last component is the weight and the physical coordinates are premultiplied by it.
#[derive(Debug, Clone, PartialEq)]
pub struct SplinePatch {
    knots: Vec<Vec<f64>>,
    orders: Vec<usize>,
    coefs: ArrayD<f64>,
    rational: bool,
}

impl SplinePatch {
    /// build a patch from its knot vectors, orders and control points
    pub fn new(
        knots: Vec<Vec<f64>>,
        orders: Vec<usize>,
        coefs: ArrayD<f64>,
        rational: bool,
    ) -> Result<Self, Error> {
        validate(&knots, &orders, coefs.shape(), rational).map_err(Error::Spline)?;
        Ok(Self {
            knots,
            orders,
            coefs,
            rational,
        })
    }

    /// build a patch from control points listed with the first parametric direction running
    /// fastest, which is how they are laid out in geometry files
    pub fn from_flat(
        knots: Vec<Vec<f64>>,
        orders: Vec<usize>,
        flat: Vec<f64>,
        components: usize,
        rational: bool,
    ) -> Result<Self, Error> {
        let counts = coef_counts(&knots, &orders).map_err(Error::Spline)?;
        let coefs = fastest_first(flat, &counts, components)?;
        Self::new(knots, orders, coefs, rational)
    }

    pub fn pardim(&self) -> usize {
        self.orders.len()
    }

    /// number of physical coordinates (excluding the weight of rational patches)
    pub fn dimension(&self) -> usize {
        self.components() - self.rational as usize
    }

    fn components(&self) -> usize {
        self.coefs.shape()[self.pardim()]
    }

    pub fn is_rational(&self) -> bool {
        self.rational
    }

    pub fn orders(&self) -> &[usize] {
        &self.orders
    }

    pub fn knot_vectors(&self) -> &[Vec<f64>] {
        &self.knots
    }

    pub fn coefs(&self) -> &ArrayD<f64> {
        &self.coefs
    }

    /// number of control points in each parametric direction
    pub fn shape(&self) -> &[usize] {
        &self.coefs.shape()[..self.pardim()]
    }

    /// total number of control points
    pub fn ncoeffs(&self) -> usize {
        self.shape().iter().product()
    }

    /// number of non-empty knot spans, i.e. the number of elements after tesselation
    pub fn nelements(&self) -> usize {
        self.knots().iter().map(|k| k.len() - 1).product()
    }

    /// the unique break points in every parametric direction
    ///
    /// this is the grid the patch is evaluated on when tesselated
    pub fn knots(&self) -> Vec<Vec<f64>> {
        self.knots
            .iter()
            .zip(self.orders.iter())
            .map(|(knots, order)| {
                let n = knots.len() - order;
                let mut breaks: Vec<f64> = Vec::new();
                for &knot in &knots[order - 1..=n] {
                    match breaks.last() {
                        Some(last) if (knot - last).abs() <= KNOT_TOLERANCE => {}
                        _ => breaks.push(knot),
                    }
                }
                breaks
            })
            .collect()
    }

    /// embed the patch in a space of (at least) `dim` physical dimensions by padding
    /// the coordinates with zeros
    pub fn set_dimension(&mut self, dim: usize) {
        let current = self.dimension();
        if dim <= current {
            return;
        }

        let last = self.pardim();
        let mut pad_shape = self.shape().to_vec();
        pad_shape.push(dim - current);
        let pad = ArrayD::<f64>::zeros(IxDyn(&pad_shape));

        let physical = self.coefs.slice_axis(Axis(last), Slice::from(0..current));
        let weights = self
            .coefs
            .slice_axis(Axis(last), Slice::from(current..self.components()));

        // shapes agree on every axis but the last, so this can not fail
        if let Ok(coefs) = concatenate(Axis(last), &[physical, pad.view(), weights]) {
            self.coefs = coefs;
        }
    }

    /// evaluate the physical coordinates of the patch on a tensor grid of parameter values,
    /// giving an array of shape `(m_1, ..., m_d, dimension)`
    pub fn evaluate(&self, grid: &[Vec<f64>]) -> Result<ArrayD<f64>, Error> {
        let values = self.contract_all(self.coefs.clone(), grid)?;
        if self.rational {
            Ok(divide_weights(values))
        } else {
            Ok(values)
        }
    }

    /// evaluate field coefficients defined on the control points of this patch, giving an
    /// array of shape `(m_1 * ... * m_d, ncomps)` in the same node order as [`evaluate`]
    ///
    /// [`evaluate`]: SplinePatch::evaluate
    pub fn evaluate_field(
        &self,
        coefs: ArrayView2<f64>,
        grid: &[Vec<f64>],
    ) -> Result<Array2<f64>, Error> {
        let (ncoeffs, ncomps) = coefs.dim();
        if ncoeffs != self.ncoeffs() {
            return Err(Error::Spline(format!(
                "field has {} coefficients, patch has {}",
                ncoeffs,
                self.ncoeffs()
            )));
        }

        let flat = coefs.iter().copied().collect();
        let mut coefs = fastest_first(flat, self.shape(), ncomps)?;

        if self.rational {
            let last = self.pardim();
            let weights = self
                .coefs
                .index_axis(Axis(last), self.dimension())
                .insert_axis(Axis(last));
            let weighted = &coefs * &weights;
            coefs = concatenate(Axis(last), &[weighted.view(), weights])?;
        }

        let mut values = self.contract_all(coefs, grid)?;
        if self.rational {
            values = divide_weights(values);
        }

        let npoints = grid.iter().map(Vec::len).product();
        let values = values.as_standard_layout().into_owned();
        Ok(values.into_shape((npoints, ncomps))?)
    }

    /// reorder per-element data listed with the first parametric direction fastest into the
    /// element order produced by tesselation
    pub fn cells_to_grid(&self, data: ArrayView2<f64>) -> Result<Array2<f64>, Error> {
        let (nelements, ncomps) = data.dim();
        if nelements != self.nelements() {
            return Err(Error::Spline(format!(
                "cell field has {} values, patch has {} elements",
                nelements,
                self.nelements()
            )));
        }

        let counts: Vec<usize> = self.knots().iter().map(|k| k.len() - 1).collect();
        let flat = data.iter().copied().collect();
        let grid = fastest_first(flat, &counts, ncomps)?;
        Ok(grid.into_shape((nelements, ncomps))?)
    }

    fn contract_all(&self, mut values: ArrayD<f64>, grid: &[Vec<f64>]) -> Result<ArrayD<f64>, Error> {
        if grid.len() != self.pardim() {
            return Err(Error::Spline(format!(
                "evaluation grid has {} directions, patch has {}",
                grid.len(),
                self.pardim()
            )));
        }

        for (axis, ((knots, order), params)) in self
            .knots
            .iter()
            .zip(self.orders.iter())
            .zip(grid.iter())
            .enumerate()
        {
            let basis = basis_matrix(knots, *order, params);
            values = contract(values, axis, &basis)?;
        }
        Ok(values)
    }
}

fn coef_counts(knots: &[Vec<f64>], orders: &[usize]) -> Result<Vec<usize>, String> {
    if knots.len() != orders.len() {
        return Err(format!(
            "{} knot vectors for {} orders",
            knots.len(),
            orders.len()
        ));
    }
    knots
        .iter()
        .zip(orders.iter())
        .map(|(knots, &order)| {
            if order == 0 || knots.len() < 2 * order {
                Err(format!(
                    "knot vector of length {} is too short for order {}",
                    knots.len(),
                    order
                ))
            } else {
                Ok(knots.len() - order)
            }
        })
        .collect()
}

pub(crate) fn validate(
    knots: &[Vec<f64>],
    orders: &[usize],
    shape: &[usize],
    rational: bool,
) -> Result<(), String> {
    let pardim = orders.len();
    if !(1..=3).contains(&pardim) {
        return Err(format!("unsupported parametric dimension {}", pardim));
    }

    let counts = coef_counts(knots, orders)?;
    if shape.len() != pardim + 1 || shape[..pardim] != counts[..] {
        return Err(format!(
            "control point array of shape {:?} does not match {:?} coefficients",
            shape, counts
        ));
    }
    if shape[pardim] <= rational as usize {
        return Err("control points have no physical coordinates".to_string());
    }

    for knots in knots {
        if knots.windows(2).any(|w| w[1] < w[0]) {
            return Err(format!("knot vector {:?} is decreasing", knots));
        }
    }
    Ok(())
}

/// lay out flat values with the first axis fastest as a standard layout array with
/// the first axis first
pub(crate) fn fastest_first(
    flat: Vec<f64>,
    counts: &[usize],
    ncomps: usize,
) -> Result<ArrayD<f64>, Error> {
    let mut shape: Vec<usize> = counts.iter().rev().copied().collect();
    shape.push(ncomps);
    let array = ArrayD::from_shape_vec(IxDyn(&shape), flat)?;

    let mut axes: Vec<usize> = (0..counts.len()).rev().collect();
    axes.push(counts.len());
    Ok(array.permuted_axes(axes).as_standard_layout().into_owned())
}

/// index of the knot span containing `t`, clamped to the valid parameter range
fn find_span(knots: &[f64], order: usize, t: f64) -> usize {
    let n = knots.len() - order;
    if t >= knots[n] {
        // the right end of the domain belongs to the last non-empty span
        let mut span = n - 1;
        while span > order - 1 && knots[span] >= knots[n] {
            span -= 1;
        }
        return span;
    }
    let mut span = order - 1;
    while span < n - 1 && knots[span + 1] <= t {
        span += 1;
    }
    span
}

/// the `order` non-zero basis functions on a knot span (Cox-de Boor)
fn basis_functions(knots: &[f64], order: usize, span: usize, t: f64) -> Vec<f64> {
    let mut values = vec![0.0; order];
    let mut left = vec![0.0; order];
    let mut right = vec![0.0; order];
    values[0] = 1.0;

    for j in 1..order {
        left[j] = t - knots[span + 1 - j];
        right[j] = knots[span + j] - t;
        let mut saved = 0.0;
        for r in 0..j {
            let denominator = right[r + 1] + left[j - r];
            let temp = if denominator == 0.0 {
                0.0
            } else {
                values[r] / denominator
            };
            values[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        values[j] = saved;
    }
    values
}

/// dense matrix of shape `(params, coefficients)` with every basis function evaluated
/// at every parameter value
pub(crate) fn basis_matrix(knots: &[f64], order: usize, params: &[f64]) -> Array2<f64> {
    let n = knots.len() - order;
    let mut matrix = Array2::zeros((params.len(), n));
    for (row, &t) in params.iter().enumerate() {
        let span = find_span(knots, order, t);
        for (j, value) in basis_functions(knots, order, span, t).into_iter().enumerate() {
            matrix[[row, span + 1 - order + j]] = value;
        }
    }
    matrix
}

/// apply `matrix` along one axis of `values`
fn contract(values: ArrayD<f64>, axis: usize, matrix: &Array2<f64>) -> Result<ArrayD<f64>, Error> {
    let shape = values.shape().to_vec();
    let ndim = shape.len();

    let mut axes = vec![axis];
    axes.extend((0..ndim).filter(|&a| a != axis));
    let rest: usize = axes[1..].iter().map(|&a| shape[a]).product();

    let moved = values.permuted_axes(axes.clone());
    let flat = moved
        .as_standard_layout()
        .into_owned()
        .into_shape((shape[axis], rest))?;
    let contracted = matrix.dot(&flat);

    let mut new_shape = vec![matrix.nrows()];
    new_shape.extend(axes[1..].iter().map(|&a| shape[a]));
    let contracted = contracted.into_shape(IxDyn(&new_shape))?;

    let mut inverse = vec![0; ndim];
    for (position, &a) in axes.iter().enumerate() {
        inverse[a] = position;
    }
    Ok(contracted
        .permuted_axes(inverse)
        .as_standard_layout()
        .into_owned())
}

/// divide homogeneous coordinates (weight last) by the weight and drop it
fn divide_weights(values: ArrayD<f64>) -> ArrayD<f64> {
    let last = values.ndim() - 1;
    let dim = values.shape()[last] - 1;
    let weights = values.index_axis(Axis(last), dim).to_owned();
    let mut physical = values.slice_axis(Axis(last), Slice::from(0..dim)).to_owned();
    for i in 0..dim {
        let mut column = physical.index_axis_mut(Axis(last), i);
        column /= &weights;
    }
    physical
}
