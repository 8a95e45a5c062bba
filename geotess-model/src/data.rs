//! Typed attribute storage
//!
//! Every node of every profile carries one tuple of attribute values. The
//! element kind is a single model-wide tag, so the storage is one flat
//! column per profile (`nnodes * nattributes` values) instead of boxed
//! per-cell objects, and no per-cell dispatch happens in query loops.

use num_traits::cast;
use strum_macros::{Display, EnumIter, EnumString};

use crate::error::{GeoTessError, Result};

/// Element kind of every attribute value in a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
pub enum DataType {
    #[strum(serialize = "BYTE")]
    Byte,
    #[strum(serialize = "SHORT")]
    Short,
    #[strum(serialize = "INT")]
    Int,
    #[strum(serialize = "LONG")]
    Long,
    #[strum(serialize = "FLOAT")]
    Float,
    #[strum(serialize = "DOUBLE")]
    Double,
    /// User-defined payload; serialization is supplied through the
    /// model extension hook.
    #[strum(serialize = "CUSTOM")]
    Custom,
}

impl DataType {
    /// Size in bytes of one value in the binary format. Zero for CUSTOM,
    /// whose cell width is owned by the registered extension.
    pub fn size(self) -> usize {
        match self {
            DataType::Byte => 1,
            DataType::Short => 2,
            DataType::Int => 4,
            DataType::Long => 8,
            DataType::Float => 4,
            DataType::Double => 8,
            DataType::Custom => 0,
        }
    }

    pub fn is_floating(self) -> bool {
        matches!(self, DataType::Float | DataType::Double)
    }
}

/// The raw value column of one profile, `nnodes * nattributes` values in
/// node-major order.
#[derive(Debug, Clone)]
pub enum DataValues {
    Byte(Vec<i8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    /// One opaque payload per node, produced and consumed by the
    /// registered extension's cell codec.
    Custom(Vec<Box<[u8]>>),
}

/// Attribute values for the nodes of one profile.
#[derive(Debug, Clone)]
pub struct DataColumn {
    nattributes: usize,
    values: DataValues,
}

impl DataColumn {
    /// A column of `nnodes * nattributes` values of the given kind.
    /// Floating kinds start as NaN (the missing-value sentinel), integral
    /// kinds as zero.
    pub fn new(data_type: DataType, nnodes: usize, nattributes: usize) -> Result<Self> {
        let n = nnodes * nattributes;
        let values = match data_type {
            DataType::Byte => DataValues::Byte(vec![0; n]),
            DataType::Short => DataValues::Short(vec![0; n]),
            DataType::Int => DataValues::Int(vec![0; n]),
            DataType::Long => DataValues::Long(vec![0; n]),
            DataType::Float => DataValues::Float(vec![f32::NAN; n]),
            DataType::Double => DataValues::Double(vec![f64::NAN; n]),
            DataType::Custom => {
                return Err(GeoTessError::invalid_input(
                    "CUSTOM columns are created by the extension cell codec",
                ))
            }
        };
        Ok(Self { nattributes, values })
    }

    /// Wrap an existing value vector. `values.len()` must be a multiple of
    /// `nattributes`.
    pub fn from_values(values: DataValues, nattributes: usize) -> Result<Self> {
        let col = Self { nattributes, values };
        if nattributes == 0 {
            return Err(GeoTessError::invalid_input("nattributes must be positive"));
        }
        if col.raw_len() % nattributes != 0 {
            return Err(GeoTessError::invalid_input(format!(
                "value count {} is not a multiple of nattributes {}",
                col.raw_len(),
                nattributes
            )));
        }
        Ok(col)
    }

    /// Single-node column of f32 values, one per attribute.
    pub fn floats(values: Vec<f32>) -> Self {
        let nattributes = values.len();
        Self {
            nattributes,
            values: DataValues::Float(values),
        }
    }

    /// Single-node column of f64 values, one per attribute.
    pub fn doubles(values: Vec<f64>) -> Self {
        let nattributes = values.len();
        Self {
            nattributes,
            values: DataValues::Double(values),
        }
    }

    fn raw_len(&self) -> usize {
        match &self.values {
            DataValues::Byte(v) => v.len(),
            DataValues::Short(v) => v.len(),
            DataValues::Int(v) => v.len(),
            DataValues::Long(v) => v.len(),
            DataValues::Float(v) => v.len(),
            DataValues::Double(v) => v.len(),
            DataValues::Custom(v) => v.len() * self.nattributes.max(1),
        }
    }

    pub fn data_type(&self) -> DataType {
        match &self.values {
            DataValues::Byte(_) => DataType::Byte,
            DataValues::Short(_) => DataType::Short,
            DataValues::Int(_) => DataType::Int,
            DataValues::Long(_) => DataType::Long,
            DataValues::Float(_) => DataType::Float,
            DataValues::Double(_) => DataType::Double,
            DataValues::Custom(_) => DataType::Custom,
        }
    }

    pub fn nattributes(&self) -> usize {
        self.nattributes
    }

    pub fn nnodes(&self) -> usize {
        if self.nattributes == 0 {
            0
        } else if let DataValues::Custom(v) = &self.values {
            v.len()
        } else {
            self.raw_len() / self.nattributes
        }
    }

    pub fn values(&self) -> &DataValues {
        &self.values
    }

    /// Value at (node, attribute) widened to f64. NaN for out-of-range
    /// indices and for CUSTOM payloads, which have no numeric view.
    pub fn get(&self, node: usize, attr: usize) -> f64 {
        if attr >= self.nattributes {
            return f64::NAN;
        }
        let i = node * self.nattributes + attr;
        match &self.values {
            DataValues::Byte(v) => v.get(i).map_or(f64::NAN, |&x| x as f64),
            DataValues::Short(v) => v.get(i).map_or(f64::NAN, |&x| x as f64),
            DataValues::Int(v) => v.get(i).map_or(f64::NAN, |&x| x as f64),
            DataValues::Long(v) => v.get(i).map_or(f64::NAN, |&x| x as f64),
            DataValues::Float(v) => v.get(i).map_or(f64::NAN, |&x| x as f64),
            DataValues::Double(v) => v.get(i).copied().unwrap_or(f64::NAN),
            DataValues::Custom(_) => f64::NAN,
        }
    }

    /// Store `value` at (node, attribute), casting to the element kind.
    /// Integral kinds saturate through `num_traits::cast`; a NaN stored
    /// into an integral kind becomes zero.
    pub fn set(&mut self, node: usize, attr: usize, value: f64) -> Result<()> {
        if attr >= self.nattributes || node >= self.nnodes() {
            return Err(GeoTessError::invalid_input(format!(
                "node {} attribute {} out of range ({} x {})",
                node,
                attr,
                self.nnodes(),
                self.nattributes
            )));
        }
        let i = node * self.nattributes + attr;
        match &mut self.values {
            DataValues::Byte(v) => v[i] = cast(value).unwrap_or(0),
            DataValues::Short(v) => v[i] = cast(value).unwrap_or(0),
            DataValues::Int(v) => v[i] = cast(value).unwrap_or(0),
            DataValues::Long(v) => v[i] = cast(value).unwrap_or(0),
            DataValues::Float(v) => v[i] = value as f32,
            DataValues::Double(v) => v[i] = value,
            DataValues::Custom(_) => {
                return Err(GeoTessError::invalid_input(
                    "CUSTOM payloads have no numeric setter",
                ))
            }
        }
        Ok(())
    }

    /// The opaque payload of one node of a CUSTOM column.
    pub fn custom_payload(&self, node: usize) -> Option<&[u8]> {
        match &self.values {
            DataValues::Custom(v) => v.get(node).map(|b| b.as_ref()),
            _ => None,
        }
    }
}

// Structural equality treats NaN as equal to NaN so round-trip comparison
// of models with missing values works; floats compare by bit pattern.
impl PartialEq for DataColumn {
    fn eq(&self, other: &Self) -> bool {
        if self.nattributes != other.nattributes {
            return false;
        }
        match (&self.values, &other.values) {
            (DataValues::Byte(a), DataValues::Byte(b)) => a == b,
            (DataValues::Short(a), DataValues::Short(b)) => a == b,
            (DataValues::Int(a), DataValues::Int(b)) => a == b,
            (DataValues::Long(a), DataValues::Long(b)) => a == b,
            (DataValues::Float(a), DataValues::Float(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (DataValues::Double(a), DataValues::Double(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (DataValues::Custom(a), DataValues::Custom(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn type_tags_round_trip() {
        for name in ["BYTE", "SHORT", "INT", "LONG", "FLOAT", "DOUBLE", "CUSTOM"] {
            let t = DataType::from_str(name).unwrap();
            assert_eq!(t.to_string(), name);
        }
        assert!(DataType::from_str("COMPLEX").is_err());
    }

    #[test]
    fn new_float_column_starts_as_nan() {
        let col = DataColumn::new(DataType::Float, 3, 2).unwrap();
        assert_eq!(col.nnodes(), 3);
        assert!(col.get(0, 0).is_nan());
        assert!(col.get(2, 1).is_nan());
    }

    #[test]
    fn set_and_get_cast_through_element_kind() {
        let mut col = DataColumn::new(DataType::Short, 2, 2).unwrap();
        col.set(1, 1, 1234.0).unwrap();
        assert_eq!(col.get(1, 1), 1234.0);
        // Fractions truncate toward zero on integral kinds.
        col.set(0, 0, 2.9).unwrap();
        assert_eq!(col.get(0, 0), 2.0);
        assert!(col.set(2, 0, 1.0).is_err());
    }

    #[test]
    fn out_of_range_reads_are_nan() {
        let col = DataColumn::floats(vec![1.0, 2.0]);
        assert!(col.get(1, 0).is_nan());
        assert!(col.get(0, 5).is_nan());
    }

    #[test]
    fn nan_equals_nan_in_structural_comparison() {
        let a = DataColumn::floats(vec![1.0, f32::NAN]);
        let b = DataColumn::floats(vec![1.0, f32::NAN]);
        let c = DataColumn::floats(vec![1.0, 2.0]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
