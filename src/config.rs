//! Conversion settings shared by the reader and the writers.
//!
//! There is no process wide configuration: a [`Config`] value is built once and handed to
//! [`Reader::new`](crate::Reader::new) and to the writer factories in
//! [`writer`](crate::writer).

use crate::Error;
use std::str::FromStr;

/// How array data is encoded in the output files.
///
/// Not every writer accepts every mode: legacy VTK files only know `Ascii` and `Binary`, the XML
/// based writers additionally support `Appended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum OutputMode {
    #[display(fmt = "ascii")]
    Ascii,
    #[display(fmt = "binary")]
    Binary,
    #[display(fmt = "appended")]
    Appended,
}

impl FromStr for OutputMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ascii" => Ok(Self::Ascii),
            "binary" => Ok(Self::Binary),
            "appended" => Ok(Self::Appended),
            _ => Err(Error::UnknownMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub output_mode: OutputMode,
    /// split vector fields into `name_x`, `name_y` and `name_z` scalars
    pub decompose: bool,
    /// join scalar fields `name_x`, `name_y` (and `name_z`) into a vector field `name`
    pub combine_split_fields: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_mode: OutputMode::Binary,
            decompose: true,
            combine_split_fields: true,
        }
    }
}

impl Config {
    pub fn with_output_mode(mut self, output_mode: OutputMode) -> Self {
        self.output_mode = output_mode;
        self
    }

    pub fn with_decompose(mut self, decompose: bool) -> Self {
        self.decompose = decompose;
        self
    }

    pub fn with_combine_split_fields(mut self, combine: bool) -> Self {
        self.combine_split_fields = combine;
        self
    }
}

#[test]
fn parse_output_mode() {
    assert_eq!("ascii".parse::<OutputMode>().unwrap(), OutputMode::Ascii);
    assert_eq!("Binary".parse::<OutputMode>().unwrap(), OutputMode::Binary);
    assert_eq!("APPENDED".parse::<OutputMode>().unwrap(), OutputMode::Appended);
    assert!("base64".parse::<OutputMode>().is_err());
    assert_eq!(OutputMode::Appended.to_string(), "appended");
}
