//! Common traits and types that are useful for working with `ifem-vtk`
#![allow(unused_imports)]

pub use crate::container::Container;
pub use crate::geometry::Tesselate;
pub use crate::writer::Writer;
pub use crate::{Config, OutputMode};

pub(crate) use crate::identity::PatchId;
pub(crate) use crate::Error;
pub(crate) use std::io::Write;
pub(crate) use std::rc::Rc;

pub(crate) use derive_more::{Display, From, Into};

pub(crate) use ndarray::{Array2, ArrayD};
