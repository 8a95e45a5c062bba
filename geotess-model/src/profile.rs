//! Radial profiles
//!
//! A profile is the radial slice of a model at one (vertex, layer): zero
//! or more radii in km plus matching data nodes. The five variants are a
//! closed enum dispatched by the wire tag; payloads live in one
//! [`DataColumn`] per profile.

use strum_macros::{Display, EnumString};

use crate::data::{DataColumn, DataType};
use crate::error::{GeoTessError, GeoTessErrorKind, Result};
use crate::io::extension::CustomCellCodec;
use crate::io::stream::{AsciiReader, AsciiWriter, BinReader, BinWriter};

/// Wire tag of each profile variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum ProfileType {
    #[strum(serialize = "NPOINT")]
    NPoint,
    #[strum(serialize = "CONSTANT")]
    Constant,
    #[strum(serialize = "THIN")]
    Thin,
    #[strum(serialize = "EMPTY")]
    Empty,
    #[strum(serialize = "SURFACE")]
    Surface,
}

impl ProfileType {
    pub fn tag(self) -> u8 {
        match self {
            ProfileType::NPoint => 0,
            ProfileType::Constant => 1,
            ProfileType::Thin => 2,
            ProfileType::Empty => 3,
            ProfileType::Surface => 4,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => ProfileType::NPoint,
            1 => ProfileType::Constant,
            2 => ProfileType::Thin,
            3 => ProfileType::Empty,
            4 => ProfileType::Surface,
            _ => return None,
        })
    }
}

/// Radial slice at one (vertex, layer).
#[derive(Debug, Clone)]
pub enum Profile {
    /// N >= 2 non-decreasing radii with one data node each; radii[0] and
    /// radii[N-1] are the layer boundaries.
    NPoint { radii: Vec<f32>, data: DataColumn },
    /// Two radii bracketing the layer, one value throughout.
    Constant {
        radius_bottom: f32,
        radius_top: f32,
        data: DataColumn,
    },
    /// Zero-thickness layer: one radius, one data node.
    Thin { radius: f32, data: DataColumn },
    /// Two radii bracketing the layer, no data.
    Empty { radius_bottom: f32, radius_top: f32 },
    /// No radii, one data node; only legal when the grid is used as a 2D
    /// surface.
    Surface { data: DataColumn },
}

// Radii compare by bit pattern so unset (NaN) boundaries survive a
// round-trip comparison; data columns are already NaN-aware.
impl PartialEq for Profile {
    fn eq(&self, other: &Self) -> bool {
        fn feq(a: f32, b: f32) -> bool {
            a.to_bits() == b.to_bits()
        }
        match (self, other) {
            (
                Profile::NPoint { radii: r1, data: d1 },
                Profile::NPoint { radii: r2, data: d2 },
            ) => r1.len() == r2.len() && r1.iter().zip(r2).all(|(&a, &b)| feq(a, b)) && d1 == d2,
            (
                Profile::Constant {
                    radius_bottom: b1,
                    radius_top: t1,
                    data: d1,
                },
                Profile::Constant {
                    radius_bottom: b2,
                    radius_top: t2,
                    data: d2,
                },
            ) => feq(*b1, *b2) && feq(*t1, *t2) && d1 == d2,
            (
                Profile::Thin { radius: r1, data: d1 },
                Profile::Thin { radius: r2, data: d2 },
            ) => feq(*r1, *r2) && d1 == d2,
            (
                Profile::Empty {
                    radius_bottom: b1,
                    radius_top: t1,
                },
                Profile::Empty {
                    radius_bottom: b2,
                    radius_top: t2,
                },
            ) => feq(*b1, *b2) && feq(*t1, *t2),
            (Profile::Surface { data: d1 }, Profile::Surface { data: d2 }) => d1 == d2,
            _ => false,
        }
    }
}

impl Profile {
    pub fn profile_type(&self) -> ProfileType {
        match self {
            Profile::NPoint { .. } => ProfileType::NPoint,
            Profile::Constant { .. } => ProfileType::Constant,
            Profile::Thin { .. } => ProfileType::Thin,
            Profile::Empty { .. } => ProfileType::Empty,
            Profile::Surface { .. } => ProfileType::Surface,
        }
    }

    /// Build an NPoint profile, validating the radius/node pairing and
    /// monotonicity.
    pub fn npoint(radii: Vec<f32>, data: DataColumn) -> Result<Self> {
        if radii.len() < 2 {
            return Err(GeoTessError::invalid_input(
                "an NPoint profile needs at least two radii",
            ));
        }
        if data.nnodes() != radii.len() {
            return Err(GeoTessError::inconsistent(format!(
                "{} radii but {} data nodes",
                radii.len(),
                data.nnodes()
            )));
        }
        if radii.windows(2).any(|w| w[1] < w[0]) {
            return Err(GeoTessError::inconsistent(
                "NPoint radii must be non-decreasing",
            ));
        }
        Ok(Profile::NPoint { radii, data })
    }

    pub fn constant(radius_bottom: f32, radius_top: f32, data: DataColumn) -> Result<Self> {
        if radius_top < radius_bottom {
            return Err(GeoTessError::inconsistent(
                "layer top below layer bottom",
            ));
        }
        if data.nnodes() != 1 {
            return Err(GeoTessError::inconsistent(
                "a Constant profile carries exactly one data node",
            ));
        }
        Ok(Profile::Constant {
            radius_bottom,
            radius_top,
            data,
        })
    }

    pub fn empty(radius_bottom: f32, radius_top: f32) -> Result<Self> {
        if radius_top < radius_bottom {
            return Err(GeoTessError::inconsistent(
                "layer top below layer bottom",
            ));
        }
        Ok(Profile::Empty {
            radius_bottom,
            radius_top,
        })
    }

    /// Number of stored radii.
    pub fn nradii(&self) -> usize {
        match self {
            Profile::NPoint { radii, .. } => radii.len(),
            Profile::Constant { .. } | Profile::Empty { .. } => 2,
            Profile::Thin { .. } => 1,
            Profile::Surface { .. } => 0,
        }
    }

    /// Number of data nodes; these are the points the point map
    /// enumerates.
    pub fn nnodes(&self) -> usize {
        match self {
            Profile::NPoint { radii, .. } => radii.len(),
            Profile::Constant { .. } | Profile::Thin { .. } | Profile::Surface { .. } => 1,
            Profile::Empty { .. } => 0,
        }
    }

    /// Stored radius `i` in km.
    pub fn radius(&self, i: usize) -> Option<f32> {
        match self {
            Profile::NPoint { radii, .. } => radii.get(i).copied(),
            Profile::Constant {
                radius_bottom,
                radius_top,
                ..
            }
            | Profile::Empty {
                radius_bottom,
                radius_top,
            } => [*radius_bottom, *radius_top].get(i).copied(),
            Profile::Thin { radius, .. } => (i == 0).then_some(*radius),
            Profile::Surface { .. } => None,
        }
    }

    /// Radius of data node `i`; for Constant that is the layer center's
    /// single value domain, reported as the bottom radius.
    pub fn node_radius(&self, i: usize) -> Option<f32> {
        match self {
            Profile::NPoint { radii, .. } => radii.get(i).copied(),
            Profile::Constant { radius_bottom, .. } => (i == 0).then_some(*radius_bottom),
            Profile::Thin { radius, .. } => (i == 0).then_some(*radius),
            Profile::Surface { .. } => (i == 0).then_some(0.0),
            Profile::Empty { .. } => None,
        }
    }

    /// Bottom radius of the layer, NaN for Surface.
    pub fn radius_bottom(&self) -> f32 {
        match self {
            Profile::NPoint { radii, .. } => radii[0],
            Profile::Constant { radius_bottom, .. } | Profile::Empty { radius_bottom, .. } => {
                *radius_bottom
            }
            Profile::Thin { radius, .. } => *radius,
            Profile::Surface { .. } => f32::NAN,
        }
    }

    /// Top radius of the layer, NaN for Surface.
    pub fn radius_top(&self) -> f32 {
        match self {
            Profile::NPoint { radii, .. } => radii[radii.len() - 1],
            Profile::Constant { radius_top, .. } | Profile::Empty { radius_top, .. } => *radius_top,
            Profile::Thin { radius, .. } => *radius,
            Profile::Surface { .. } => f32::NAN,
        }
    }

    pub fn data(&self) -> Option<&DataColumn> {
        match self {
            Profile::NPoint { data, .. }
            | Profile::Constant { data, .. }
            | Profile::Thin { data, .. }
            | Profile::Surface { data } => Some(data),
            Profile::Empty { .. } => None,
        }
    }

    pub fn data_mut(&mut self) -> Option<&mut DataColumn> {
        match self {
            Profile::NPoint { data, .. }
            | Profile::Constant { data, .. }
            | Profile::Thin { data, .. }
            | Profile::Surface { data } => Some(data),
            Profile::Empty { .. } => None,
        }
    }

    /// Attribute value at data node `node`, NaN when absent.
    pub fn value(&self, node: usize, attr: usize) -> f64 {
        self.data().map_or(f64::NAN, |d| d.get(node, attr))
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    pub fn write_binary(
        &self,
        w: &mut BinWriter,
        codec: Option<&dyn CustomCellCodec>,
    ) -> Result<()> {
        w.write_u8(self.profile_type().tag())?;
        match self {
            Profile::NPoint { radii, data } => {
                w.write_u32(radii.len() as u32)?;
                for &r in radii {
                    w.write_f32(r)?;
                }
                write_cells(w, data, codec)
            }
            Profile::Constant {
                radius_bottom,
                radius_top,
                data,
            } => {
                w.write_f32(*radius_bottom)?;
                w.write_f32(*radius_top)?;
                write_cells(w, data, codec)
            }
            Profile::Thin { radius, data } => {
                w.write_f32(*radius)?;
                write_cells(w, data, codec)
            }
            Profile::Empty {
                radius_bottom,
                radius_top,
            } => {
                w.write_f32(*radius_bottom)?;
                w.write_f32(*radius_top)
            }
            Profile::Surface { data } => write_cells(w, data, codec),
        }
    }

    pub fn read_binary(
        r: &mut BinReader,
        data_type: DataType,
        nattributes: usize,
        codec: Option<&dyn CustomCellCodec>,
    ) -> Result<Self> {
        let at = r.offset();
        let tag = r.read_u8()?;
        let ptype = ProfileType::from_tag(tag).ok_or_else(|| {
            GeoTessError::at(
                GeoTessErrorKind::MalformedFile(format!("unknown profile type tag {}", tag)),
                at,
            )
        })?;
        match ptype {
            ProfileType::NPoint => {
                let at = r.offset();
                let nradii = r.read_u32()? as usize;
                if nradii < 2 {
                    return Err(GeoTessError::at(
                        GeoTessErrorKind::MalformedFile(format!(
                            "NPoint profile with {} radii",
                            nradii
                        )),
                        at,
                    ));
                }
                let mut radii = Vec::with_capacity(nradii);
                for _ in 0..nradii {
                    radii.push(r.read_f32()?);
                }
                let data = read_cells(r, data_type, nradii, nattributes, codec)?;
                Profile::npoint(radii, data)
            }
            ProfileType::Constant => {
                let radius_bottom = r.read_f32()?;
                let radius_top = r.read_f32()?;
                let data = read_cells(r, data_type, 1, nattributes, codec)?;
                Profile::constant(radius_bottom, radius_top, data)
            }
            ProfileType::Thin => {
                let radius = r.read_f32()?;
                let data = read_cells(r, data_type, 1, nattributes, codec)?;
                Ok(Profile::Thin { radius, data })
            }
            ProfileType::Empty => {
                let radius_bottom = r.read_f32()?;
                let radius_top = r.read_f32()?;
                Profile::empty(radius_bottom, radius_top)
            }
            ProfileType::Surface => {
                let data = read_cells(r, data_type, 1, nattributes, codec)?;
                Ok(Profile::Surface { data })
            }
        }
    }

    pub fn write_ascii(
        &self,
        w: &mut AsciiWriter,
        codec: Option<&dyn CustomCellCodec>,
    ) -> Result<()> {
        let mut fields: Vec<String> = vec![self.profile_type().tag().to_string()];
        match self {
            Profile::NPoint { radii, data } => {
                fields.push(radii.len().to_string());
                for &r in radii {
                    fields.push(r.to_string());
                }
                push_cells(&mut fields, data, w, codec)?;
                w.write_fields(&fields)
            }
            Profile::Constant {
                radius_bottom,
                radius_top,
                data,
            } => {
                fields.push(radius_bottom.to_string());
                fields.push(radius_top.to_string());
                push_cells(&mut fields, data, w, codec)?;
                w.write_fields(&fields)
            }
            Profile::Thin { radius, data } => {
                fields.push(radius.to_string());
                push_cells(&mut fields, data, w, codec)?;
                w.write_fields(&fields)
            }
            Profile::Empty {
                radius_bottom,
                radius_top,
            } => {
                fields.push(radius_bottom.to_string());
                fields.push(radius_top.to_string());
                w.write_fields(&fields)
            }
            Profile::Surface { data } => {
                push_cells(&mut fields, data, w, codec)?;
                w.write_fields(&fields)
            }
        }
    }

    pub fn read_ascii(
        r: &mut AsciiReader,
        data_type: DataType,
        nattributes: usize,
        codec: Option<&dyn CustomCellCodec>,
    ) -> Result<Self> {
        let at = r.offset();
        let tag = r.read_u8()?;
        let ptype = ProfileType::from_tag(tag).ok_or_else(|| {
            GeoTessError::at(
                GeoTessErrorKind::MalformedFile(format!("unknown profile type tag {}", tag)),
                at,
            )
        })?;
        match ptype {
            ProfileType::NPoint => {
                let nradii = r.read_u32()? as usize;
                let mut radii = Vec::with_capacity(nradii);
                for _ in 0..nradii {
                    radii.push(r.read_f32()?);
                }
                let data = read_cells_ascii(r, data_type, nradii, nattributes, codec)?;
                Profile::npoint(radii, data)
            }
            ProfileType::Constant => {
                let radius_bottom = r.read_f32()?;
                let radius_top = r.read_f32()?;
                let data = read_cells_ascii(r, data_type, 1, nattributes, codec)?;
                Profile::constant(radius_bottom, radius_top, data)
            }
            ProfileType::Thin => {
                let radius = r.read_f32()?;
                let data = read_cells_ascii(r, data_type, 1, nattributes, codec)?;
                Ok(Profile::Thin { radius, data })
            }
            ProfileType::Empty => {
                let radius_bottom = r.read_f32()?;
                let radius_top = r.read_f32()?;
                Profile::empty(radius_bottom, radius_top)
            }
            ProfileType::Surface => {
                let data = read_cells_ascii(r, data_type, 1, nattributes, codec)?;
                Ok(Profile::Surface { data })
            }
        }
    }
}

fn write_cells(
    w: &mut BinWriter,
    data: &DataColumn,
    codec: Option<&dyn CustomCellCodec>,
) -> Result<()> {
    use crate::data::DataValues::*;
    match data.values() {
        Byte(v) => v.iter().try_for_each(|&x| w.write_i8(x)),
        Short(v) => v.iter().try_for_each(|&x| w.write_i16(x)),
        Int(v) => v.iter().try_for_each(|&x| w.write_i32(x)),
        Long(v) => v.iter().try_for_each(|&x| w.write_i64(x)),
        Float(v) => v.iter().try_for_each(|&x| w.write_f32(x)),
        Double(v) => v.iter().try_for_each(|&x| w.write_f64(x)),
        Custom(cells) => {
            let codec = codec.ok_or_else(|| {
                GeoTessError::invalid_input("CUSTOM data requires a registered cell codec")
            })?;
            cells.iter().try_for_each(|c| codec.write_cell(w, c))
        }
    }
}

fn read_cells(
    r: &mut BinReader,
    data_type: DataType,
    nnodes: usize,
    nattributes: usize,
    codec: Option<&dyn CustomCellCodec>,
) -> Result<DataColumn> {
    use crate::data::DataValues;
    let n = nnodes * nattributes;
    let values = match data_type {
        DataType::Byte => {
            DataValues::Byte((0..n).map(|_| r.read_i8()).collect::<Result<_>>()?)
        }
        DataType::Short => {
            DataValues::Short((0..n).map(|_| r.read_i16()).collect::<Result<_>>()?)
        }
        DataType::Int => DataValues::Int((0..n).map(|_| r.read_i32()).collect::<Result<_>>()?),
        DataType::Long => {
            DataValues::Long((0..n).map(|_| r.read_i64()).collect::<Result<_>>()?)
        }
        DataType::Float => {
            DataValues::Float((0..n).map(|_| r.read_f32()).collect::<Result<_>>()?)
        }
        DataType::Double => {
            DataValues::Double((0..n).map(|_| r.read_f64()).collect::<Result<_>>()?)
        }
        DataType::Custom => {
            let codec = codec.ok_or_else(|| {
                GeoTessError::at(
                    GeoTessErrorKind::MalformedFile(
                        "CUSTOM data requires a registered cell codec".into(),
                    ),
                    r.offset(),
                )
            })?;
            DataValues::Custom(
                (0..nnodes)
                    .map(|_| codec.read_cell(r, nattributes))
                    .collect::<Result<_>>()?,
            )
        }
    };
    DataColumn::from_values(values, nattributes)
}

/// ASCII cells join the profile's record line as decimal fields; CUSTOM
/// payloads are delegated to the codec on their own records.
fn push_cells(
    fields: &mut Vec<String>,
    data: &DataColumn,
    w: &mut AsciiWriter,
    codec: Option<&dyn CustomCellCodec>,
) -> Result<()> {
    use crate::data::DataValues::*;
    match data.values() {
        Byte(v) => fields.extend(v.iter().map(|x| x.to_string())),
        Short(v) => fields.extend(v.iter().map(|x| x.to_string())),
        Int(v) => fields.extend(v.iter().map(|x| x.to_string())),
        Long(v) => fields.extend(v.iter().map(|x| x.to_string())),
        Float(v) => fields.extend(v.iter().map(|x| x.to_string())),
        Double(v) => fields.extend(v.iter().map(|x| x.to_string())),
        Custom(cells) => {
            let codec = codec.ok_or_else(|| {
                GeoTessError::invalid_input("CUSTOM data requires a registered cell codec")
            })?;
            for c in cells {
                codec.write_cell_ascii(w, c)?;
            }
        }
    }
    Ok(())
}

fn read_cells_ascii(
    r: &mut AsciiReader,
    data_type: DataType,
    nnodes: usize,
    nattributes: usize,
    codec: Option<&dyn CustomCellCodec>,
) -> Result<DataColumn> {
    use crate::data::DataValues;
    let n = nnodes * nattributes;
    let values = match data_type {
        DataType::Byte => DataValues::Byte(
            (0..n)
                .map(|_| r.read_i64().map(|x| x as i8))
                .collect::<Result<_>>()?,
        ),
        DataType::Short => DataValues::Short(
            (0..n)
                .map(|_| r.read_i64().map(|x| x as i16))
                .collect::<Result<_>>()?,
        ),
        DataType::Int => DataValues::Int(
            (0..n)
                .map(|_| r.read_i64().map(|x| x as i32))
                .collect::<Result<_>>()?,
        ),
        DataType::Long => DataValues::Long(
            (0..n).map(|_| r.read_i64()).collect::<Result<_>>()?,
        ),
        DataType::Float => {
            DataValues::Float((0..n).map(|_| r.read_f32()).collect::<Result<_>>()?)
        }
        DataType::Double => {
            DataValues::Double((0..n).map(|_| r.read_f64()).collect::<Result<_>>()?)
        }
        DataType::Custom => {
            let codec = codec.ok_or_else(|| {
                GeoTessError::new(GeoTessErrorKind::MalformedFile(
                    "CUSTOM data requires a registered cell codec".into(),
                ))
            })?;
            DataValues::Custom(
                (0..nnodes)
                    .map(|_| codec.read_cell_ascii(r, nattributes))
                    .collect::<Result<_>>()?,
            )
        }
    };
    DataColumn::from_values(values, nattributes)
}
