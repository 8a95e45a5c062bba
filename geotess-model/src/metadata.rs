//! Model metadata
//!
//! Layer names, the tessellation each layer interpolates on, attribute
//! names and units, the model-wide element kind, the earth shape, and the
//! provenance strings. Built once, validated against a grid when bound to
//! a model, and immutable afterwards.

use geotess_geom::EarthShape;

use crate::data::DataType;
use crate::error::{GeoTessError, Result};
use crate::grid::Grid;

/// Descriptive and structural metadata of one model.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaData {
    description: String,
    layer_names: Vec<String>,
    /// Tessellation index each layer interpolates on.
    layer_tess_ids: Vec<u32>,
    attribute_names: Vec<String>,
    attribute_units: Vec<String>,
    data_type: DataType,
    earth_shape: EarthShape,
    model_software_version: String,
    model_generation_date: String,
}

impl MetaData {
    /// Assemble metadata. `layer_tess_ids` must parallel `layer_names`;
    /// attribute names and units must parallel each other.
    pub fn new(
        layer_names: Vec<String>,
        layer_tess_ids: Vec<u32>,
        attribute_names: Vec<String>,
        attribute_units: Vec<String>,
        data_type: DataType,
        earth_shape: EarthShape,
    ) -> Result<Self> {
        if layer_names.is_empty() {
            return Err(GeoTessError::invalid_input("a model needs at least one layer"));
        }
        if layer_tess_ids.len() != layer_names.len() {
            return Err(GeoTessError::invalid_input(format!(
                "{} layer names but {} tessellation ids",
                layer_names.len(),
                layer_tess_ids.len()
            )));
        }
        if attribute_names.is_empty() || attribute_names.len() != attribute_units.len() {
            return Err(GeoTessError::invalid_input(format!(
                "{} attribute names but {} units",
                attribute_names.len(),
                attribute_units.len()
            )));
        }
        Ok(Self {
            description: String::new(),
            layer_names,
            layer_tess_ids,
            attribute_names,
            attribute_units,
            data_type,
            earth_shape,
            model_software_version: format!("geotess-model {}", env!("CARGO_PKG_VERSION")),
            model_generation_date: String::new(),
        })
    }

    /// Single-tessellation convenience: every layer on tessellation 0.
    pub fn single_tessellation(
        layer_names: Vec<String>,
        attribute_names: Vec<String>,
        attribute_units: Vec<String>,
        data_type: DataType,
        earth_shape: EarthShape,
    ) -> Result<Self> {
        let ids = vec![0; layer_names.len()];
        Self::new(
            layer_names,
            ids,
            attribute_names,
            attribute_units,
            data_type,
            earth_shape,
        )
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn set_provenance(&mut self, software_version: String, generation_date: String) {
        self.model_software_version = software_version;
        self.model_generation_date = generation_date;
    }

    /// Check this metadata against the grid it will be bound to, and
    /// whether a custom cell codec is available when the element kind
    /// needs one.
    pub fn validate(&self, grid: &Grid, have_cell_codec: bool) -> Result<()> {
        for (layer, &tess) in self.layer_tess_ids.iter().enumerate() {
            if tess as usize >= grid.ntessellations() {
                return Err(GeoTessError::inconsistent(format!(
                    "layer {} ({}) references tessellation {} but the grid defines {}",
                    layer,
                    self.layer_names[layer],
                    tess,
                    grid.ntessellations()
                )));
            }
        }
        if self.data_type == DataType::Custom && !have_cell_codec {
            return Err(GeoTessError::inconsistent(
                "CUSTOM element kind requires a registered extension with a cell codec",
            ));
        }
        Ok(())
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn nlayers(&self) -> usize {
        self.layer_names.len()
    }

    pub fn layer_names(&self) -> &[String] {
        &self.layer_names
    }

    pub fn layer_name(&self, layer: usize) -> Option<&str> {
        self.layer_names.get(layer).map(String::as_str)
    }

    /// Index of the layer with the given name.
    pub fn layer_index(&self, name: &str) -> Option<usize> {
        self.layer_names.iter().position(|n| n == name)
    }

    pub fn layer_tess_ids(&self) -> &[u32] {
        &self.layer_tess_ids
    }

    pub fn tessellation_of(&self, layer: usize) -> usize {
        self.layer_tess_ids[layer] as usize
    }

    pub fn nattributes(&self) -> usize {
        self.attribute_names.len()
    }

    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    pub fn attribute_units(&self) -> &[String] {
        &self.attribute_units
    }

    /// Index of the attribute with the given name.
    pub fn attribute_index(&self, name: &str) -> Result<usize> {
        self.attribute_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| {
                GeoTessError::invalid_input(format!("unknown attribute {:?}", name))
            })
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn earth_shape(&self) -> EarthShape {
        self.earth_shape
    }

    pub fn model_software_version(&self) -> &str {
        &self.model_software_version
    }

    pub fn model_generation_date(&self) -> &str {
        &self.model_generation_date
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> MetaData {
        MetaData::single_tessellation(
            vec!["crust".into(), "mantle".into()],
            vec!["vp".into(), "vs".into()],
            vec!["km/s".into(), "km/s".into()],
            DataType::Float,
            EarthShape::Wgs84,
        )
        .unwrap()
    }

    #[test]
    fn parallel_array_lengths_are_enforced() {
        assert!(MetaData::new(
            vec!["a".into()],
            vec![0, 0],
            vec!["x".into()],
            vec!["u".into()],
            DataType::Float,
            EarthShape::Sphere,
        )
        .is_err());
        assert!(MetaData::single_tessellation(
            vec![],
            vec!["x".into()],
            vec!["u".into()],
            DataType::Float,
            EarthShape::Sphere,
        )
        .is_err());
    }

    #[test]
    fn lookup_by_name() {
        let m = meta();
        assert_eq!(m.layer_index("mantle"), Some(1));
        assert_eq!(m.attribute_index("vs").unwrap(), 1);
        assert!(m.attribute_index("qp").is_err());
    }

    #[test]
    fn validation_catches_undefined_tessellation() {
        let grid = Grid::icosahedron(1).unwrap();
        let ok = meta();
        ok.validate(&grid, false).unwrap();
        let bad = MetaData::new(
            vec!["crust".into()],
            vec![3],
            vec!["vp".into()],
            vec!["km/s".into()],
            DataType::Float,
            EarthShape::Wgs84,
        )
        .unwrap();
        assert!(bad.validate(&grid, false).is_err());
    }

    #[test]
    fn custom_kind_needs_a_codec() {
        let grid = Grid::icosahedron(1).unwrap();
        let m = MetaData::single_tessellation(
            vec!["crust".into()],
            vec!["vp".into()],
            vec!["km/s".into()],
            DataType::Custom,
            EarthShape::Wgs84,
        )
        .unwrap();
        assert!(m.validate(&grid, false).is_err());
        m.validate(&grid, true).unwrap();
    }
}
