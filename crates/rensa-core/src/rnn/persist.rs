//! # Model File Header
//!
//! Every model file starts with seven little-endian `i32` fields:
//! model type, model direction, CRF flag (0|1), `L0`, `L1`, `L2` and the
//! dense feature size. Weight matrices follow in the order the owning
//! network defines.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{RensaError, Result};
use crate::rnn::LayerSizes;
use crate::types::{ModelDirection, ModelType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelHeader {
    pub model_type: ModelType,
    pub direction: ModelDirection,
    pub crf: bool,
    pub sizes: LayerSizes,
}

impl ModelHeader {
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        write_i32(w, self.model_type.tag())?;
        write_i32(w, self.direction.tag())?;
        write_i32(w, i32::from(self.crf))?;
        write_dim(w, self.sizes.input, "L0")?;
        write_dim(w, self.sizes.hidden, "L1")?;
        write_dim(w, self.sizes.output, "L2")?;
        write_dim(w, self.sizes.dense, "dense feature size")?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let model_type = ModelType::from_tag(read_i32(r)?)?;
        let direction = ModelDirection::from_tag(read_i32(r)?)?;
        let crf = read_i32(r)? == 1;
        let sizes = LayerSizes {
            input: read_dim(r, "L0")?,
            hidden: read_dim(r, "L1")?,
            output: read_dim(r, "L2")?,
            dense: read_dim(r, "dense feature size")?,
        };
        Ok(Self {
            model_type,
            direction,
            crf,
            sizes,
        })
    }

    /// Read only the header of the model at `path`.
    pub fn peek(path: &Path) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::read_from(&mut reader)
    }
}

/// `<path><suffix>`, e.g. `model.bin` → `model.bin.forward`.
pub fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn write_i32<W: Write>(w: &mut W, v: i32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub(crate) fn write_dim<W: Write>(w: &mut W, v: usize, what: &str) -> Result<()> {
    let v = i32::try_from(v)
        .map_err(|_| RensaError::DimensionMismatch(format!("{what} {v} does not fit an i32 field")))?;
    write_i32(w, v)
}

fn read_i32<R: Read>(r: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

pub(crate) fn read_dim<R: Read>(r: &mut R, what: &str) -> Result<usize> {
    let v = read_i32(r)?;
    usize::try_from(v).map_err(|_| RensaError::DimensionMismatch(format!("negative {what} in file: {v}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(crf: bool) -> ModelHeader {
        ModelHeader {
            model_type: ModelType::Simple,
            direction: ModelDirection::Bidirectional,
            crf,
            sizes: LayerSizes {
                input: 100,
                hidden: 8,
                output: 5,
                dense: 0,
            },
        }
    }

    #[test]
    fn header_is_seven_ints() {
        let mut buf = Vec::new();
        header(true).write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 7 * 4);
        assert_eq!(&buf[4..8], &1i32.to_le_bytes());
        assert_eq!(&buf[8..12], &1i32.to_le_bytes());
        assert_eq!(ModelHeader::read_from(&mut buf.as_slice()).unwrap(), header(true));
    }

    #[test]
    fn negative_dimension_is_rejected() {
        let mut buf = Vec::new();
        header(false).write_to(&mut buf).unwrap();
        buf[12..16].copy_from_slice(&(-3i32).to_le_bytes());
        assert!(matches!(
            ModelHeader::read_from(&mut buf.as_slice()),
            Err(RensaError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn suffix_appends_to_file_name() {
        let p = suffixed(Path::new("/tmp/model.bin"), ".forward");
        assert_eq!(p, PathBuf::from("/tmp/model.bin.forward"));
    }
}
