//! Reading spline objects in the G2 text format.
//!
//! A G2 object starts with a header line `class major minor auxiliary` followed by the physical
//! dimension and a rational flag, then `count order` and the knot vector for every parametric
//! direction, and finally the control points with the first direction running fastest:
//!
//! ```text
//! 200 1 0 0
//! 2 0
//! 2 2
//! 0 0 1 1
//! 2 2
//! 0 0 1 1
//! 0 0
//! 1 0
//! 0 1
//! 1 1
//! ```
//!
//! Only B-spline curves (class 100), surfaces (class 200) and volumes (class 700) are supported.

use super::spline::{self, SplinePatch};
use std::str::SplitAsciiWhitespace;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum G2Error {
    #[error("geometry block is not valid utf-8")]
    Utf8,
    #[error("unexpected end of data while reading {0}")]
    UnexpectedEof(&'static str),
    #[error("could not parse `{token}` as {expected}")]
    InvalidToken {
        token: String,
        expected: &'static str,
    },
    #[error("unsupported object class {0}")]
    UnsupportedClass(usize),
    #[error("invalid spline object: {0}")]
    Invalid(String),
}

struct Tokens<'a> {
    inner: SplitAsciiWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: text.split_ascii_whitespace(),
        }
    }

    fn usize(&mut self, what: &'static str) -> Result<usize, G2Error> {
        let token = self.inner.next().ok_or(G2Error::UnexpectedEof(what))?;
        token.parse().map_err(|_| G2Error::InvalidToken {
            token: token.to_string(),
            expected: "an integer",
        })
    }

    fn f64(&mut self, what: &'static str) -> Result<f64, G2Error> {
        let token = self.inner.next().ok_or(G2Error::UnexpectedEof(what))?;
        token.parse().map_err(|_| G2Error::InvalidToken {
            token: token.to_string(),
            expected: "a real number",
        })
    }

    fn f64s(&mut self, count: usize, what: &'static str) -> Result<Vec<f64>, G2Error> {
        (0..count).map(|_| self.f64(what)).collect()
    }
}

fn too_large(what: &str) -> G2Error {
    G2Error::Invalid(format!("{} size overflows", what))
}

fn class_pardim(class: usize) -> Result<usize, G2Error> {
    match class {
        100 => Ok(1),
        200 => Ok(2),
        700 => Ok(3),
        other => Err(G2Error::UnsupportedClass(other)),
    }
}

#[cfg(test)]
fn pardim_class(pardim: usize) -> usize {
    match pardim {
        1 => 100,
        2 => 200,
        _ => 700,
    }
}

/// parse the first spline object in a G2 encoded block
pub fn read(bytes: &[u8]) -> Result<SplinePatch, G2Error> {
    let text = std::str::from_utf8(bytes).map_err(|_| G2Error::Utf8)?;
    let mut tokens = Tokens::new(text);

    let pardim = class_pardim(tokens.usize("object class")?)?;
    // version numbers and auxiliary data
    for _ in 0..3 {
        tokens.usize("object header")?;
    }

    let dimension = tokens.usize("physical dimension")?;
    let rational = match tokens.usize("rational flag")? {
        0 => false,
        1 => true,
        other => return Err(G2Error::Invalid(format!("rational flag {}", other))),
    };

    let mut knots = Vec::with_capacity(pardim);
    let mut orders = Vec::with_capacity(pardim);
    let mut shape = Vec::with_capacity(pardim + 1);
    for _ in 0..pardim {
        let count = tokens.usize("coefficient count")?;
        let order = tokens.usize("order")?;
        let nknots = count
            .checked_add(order)
            .ok_or_else(|| too_large("knot vector"))?;
        knots.push(tokens.f64s(nknots, "knot vector")?);
        orders.push(order);
        shape.push(count);
    }

    let components = dimension
        .checked_add(rational as usize)
        .ok_or_else(|| too_large("physical dimension"))?;
    let nvalues = shape
        .iter()
        .try_fold(components, |total, &n| total.checked_mul(n))
        .ok_or_else(|| too_large("control points"))?;
    let flat = tokens.f64s(nvalues, "control points")?;

    shape.push(components);
    spline::validate(&knots, &orders, &shape, rational).map_err(G2Error::Invalid)?;

    SplinePatch::from_flat(knots, orders, flat, components, rational)
        .map_err(|e| G2Error::Invalid(e.to_string()))
}

/// serialize a patch as a G2 object
#[cfg(test)]
fn write(patch: &SplinePatch) -> String {
    let mut out = String::new();
    let mut buffer = ryu::Buffer::new();
    let mut push_line = |out: &mut String, values: &mut dyn Iterator<Item = f64>| {
        let line: Vec<String> = values.map(|v| buffer.format(v).to_string()).collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    };

    out.push_str(&format!("{} 1 0 0\n", pardim_class(patch.pardim())));
    out.push_str(&format!(
        "{} {}\n",
        patch.dimension(),
        patch.is_rational() as usize
    ));
    for (knots, order) in patch.knot_vectors().iter().zip(patch.orders()) {
        out.push_str(&format!("{} {}\n", knots.len() - order, order));
        push_line(&mut out, &mut knots.iter().copied());
    }

    // control points go out with the first direction fastest
    let pardim = patch.pardim();
    let mut axes: Vec<usize> = (0..pardim).rev().collect();
    axes.push(pardim);
    let reversed = patch.coefs().view().permuted_axes(axes);
    let reversed = reversed.as_standard_layout();
    let components = reversed.shape()[pardim];
    for point in reversed.as_slice().unwrap_or(&[]).chunks(components) {
        push_line(&mut out, &mut point.iter().copied());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str = "200 1 0 0\n2 0\n2 2\n0 0 1 1\n2 2\n0 0 1 1\n0 0\n1 0\n0 1\n1 1\n";

    #[test]
    fn read_surface() {
        let patch = read(SQUARE.as_bytes()).unwrap();
        assert_eq!(patch.pardim(), 2);
        assert_eq!(patch.dimension(), 2);
        assert!(!patch.is_rational());
        assert_eq!(patch.shape(), &[2, 2]);
        assert_eq!(patch.coefs()[[1, 0, 0]], 1.0);
        assert_eq!(patch.coefs()[[0, 1, 1]], 1.0);
    }

    #[test]
    fn write_then_read_matches() {
        let patch = read(SQUARE.as_bytes()).unwrap();
        let text = write(&patch);
        assert_eq!(read(text.as_bytes()).unwrap(), patch);
    }

    #[test]
    fn unsupported_class() {
        let err = read(b"400 1 0 0\n").unwrap_err();
        assert_eq!(err, G2Error::UnsupportedClass(400));
    }

    #[test]
    fn truncated_control_points() {
        let text = "100 1 0 0\n3 0\n2 2\n0 0 1 1\n0 0 0\n";
        let err = read(text.as_bytes()).unwrap_err();
        assert_eq!(err, G2Error::UnexpectedEof("control points"));
    }

    #[test]
    fn oversized_counts() {
        let text = "100 1 0 0\n1 0\n18446744073709551615 2\n0 0 1 1\n";
        assert!(matches!(read(text.as_bytes()), Err(G2Error::Invalid(_))));
    }

    #[test]
    fn invalid_number() {
        let text = "100 1 0 0\n3 0\n2 2\n0 0 x 1\n";
        let err = read(text.as_bytes()).unwrap_err();
        assert_eq!(
            err,
            G2Error::InvalidToken {
                token: "x".to_string(),
                expected: "a real number"
            }
        );
    }
}
