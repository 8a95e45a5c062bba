//! The model container
//!
//! A [`Model`] owns its metadata and its profile table and shares its
//! [`Grid`] by reference, so sibling models at the same resolution reuse
//! one set of geometry and caches. Profiles are stored vertex-major:
//! `profiles[vertex * nlayers + layer]`.
//!
//! Writes (`set_profile`, active-region changes) take `&mut self` and
//! invalidate the lazily built point map; read-only queries are safe to
//! share across threads.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use log::debug;

use geotess_geom::{SphericalPolygon, Vec3};

use crate::data::DataType;
use crate::error::{GeoTessError, GeoTessErrorKind, Result};
use crate::grid::Grid;
use crate::io::extension::{ExtensionRegistry, ModelExtension};
use crate::io::stream::{AsciiReader, AsciiWriter, BinReader, BinWriter};
use crate::metadata::MetaData;
use crate::pointmap::PointMap;
use crate::profile::Profile;

/// Magic written at the head of every model file.
pub const MODEL_MAGIC: &str = "GEOTESSMODEL";

/// Model format versions: v2 adds the per-layer tessellation array and
/// the earth-shape name. We write v2 and read both.
pub const MODEL_FORMAT_VERSION: u32 = 2;

/// Token marking an embedded grid in the grid payload slot.
const EMBEDDED_GRID: &str = "*";

/// A multi-layer earth model bound to a shared grid.
pub struct Model {
    grid: Arc<Grid>,
    metadata: MetaData,
    profiles: Vec<Profile>,
    active_region: Option<SphericalPolygon>,
    pointmap: OnceLock<PointMap>,
    extension: Option<Box<dyn ModelExtension>>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("grid_id", &self.grid.grid_id())
            .field("nlayers", &self.metadata.nlayers())
            .field("nattributes", &self.metadata.nattributes())
            .field("extension", &self.extension.as_ref().map(|e| e.class_tag().to_owned()))
            .finish()
    }
}

impl Model {
    /// Create a model with every profile Empty and its radii unset (NaN),
    /// so boundary checks do not fire until real profiles land. Metadata
    /// is validated against the grid and frozen.
    pub fn new(grid: Arc<Grid>, metadata: MetaData) -> Result<Self> {
        metadata.validate(&grid, true)?;
        let n = grid.nvertices() * metadata.nlayers();
        let profiles = vec![Profile::empty(f32::NAN, f32::NAN)?; n];
        Ok(Self {
            grid,
            metadata,
            profiles,
            active_region: None,
            pointmap: OnceLock::new(),
            extension: None,
        })
    }

    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    pub fn metadata(&self) -> &MetaData {
        &self.metadata
    }

    pub fn nlayers(&self) -> usize {
        self.metadata.nlayers()
    }

    pub fn nvertices(&self) -> usize {
        self.grid.nvertices()
    }

    pub fn nattributes(&self) -> usize {
        self.metadata.nattributes()
    }

    fn slot(&self, vertex: u32, layer: usize) -> usize {
        vertex as usize * self.nlayers() + layer
    }

    pub fn profile(&self, vertex: u32, layer: usize) -> &Profile {
        &self.profiles[self.slot(vertex, layer)]
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// Replace the profile at (vertex, layer).
    ///
    /// Validates the radius range against the layers below and above at
    /// the same vertex when those are already populated, and rebuilds the
    /// point map on next use.
    pub fn set_profile(&mut self, vertex: u32, layer: usize, profile: Profile) -> Result<()> {
        if vertex as usize >= self.nvertices() || layer >= self.nlayers() {
            return Err(GeoTessError::invalid_input(format!(
                "vertex {} layer {} out of range",
                vertex, layer
            )));
        }
        if let Some(data) = profile.data() {
            if data.data_type() != self.metadata.data_type() {
                return Err(GeoTessError::inconsistent(format!(
                    "profile data type {} does not match model data type {}",
                    data.data_type(),
                    self.metadata.data_type()
                )));
            }
            if data.nattributes() != self.nattributes() {
                return Err(GeoTessError::inconsistent(format!(
                    "profile carries {} attributes, model defines {}",
                    data.nattributes(),
                    self.nattributes()
                )));
            }
        }
        let has_radii = profile.nradii() > 0;
        if has_radii {
            if layer > 0 {
                let below = self.profile(vertex, layer - 1);
                if below.nradii() > 0 && profile.radius_bottom() < below.radius_top() - 1e-3 {
                    return Err(GeoTessError::inconsistent(format!(
                        "profile bottom {} at (vertex {}, layer {}) drops below the top of layer {}",
                        profile.radius_bottom(),
                        vertex,
                        layer,
                        layer - 1
                    )));
                }
            }
            if layer + 1 < self.nlayers() {
                let above = self.profile(vertex, layer + 1);
                if above.nradii() > 0 && profile.radius_top() > above.radius_bottom() + 1e-3 {
                    return Err(GeoTessError::inconsistent(format!(
                        "profile top {} at (vertex {}, layer {}) rises above the bottom of layer {}",
                        profile.radius_top(),
                        vertex,
                        layer,
                        layer + 1
                    )));
                }
            }
        }
        let slot = self.slot(vertex, layer);
        self.profiles[slot] = profile;
        self.pointmap = OnceLock::new();
        Ok(())
    }

    pub fn nradii(&self, vertex: u32, layer: usize) -> usize {
        self.profile(vertex, layer).nradii()
    }

    pub fn radius(&self, vertex: u32, layer: usize, i: usize) -> Option<f32> {
        self.profile(vertex, layer).radius(i)
    }

    pub fn value(&self, vertex: u32, layer: usize, attr: usize, node: usize) -> f64 {
        self.profile(vertex, layer).value(node, attr)
    }

    /// Radius of the bottom of a layer at a vertex.
    pub fn layer_radius_bottom(&self, vertex: u32, layer: usize) -> f64 {
        f64::from(self.profile(vertex, layer).radius_bottom())
    }

    /// Radius of the top of a layer at a vertex.
    pub fn layer_radius_top(&self, vertex: u32, layer: usize) -> f64 {
        f64::from(self.profile(vertex, layer).radius_top())
    }

    // ------------------------------------------------------------------
    // Point map
    // ------------------------------------------------------------------

    /// Bind or clear the active region; the point map is rebuilt on next
    /// use, so existing point ids from the previous configuration become
    /// invalid.
    pub fn set_active_region(&mut self, region: Option<SphericalPolygon>) {
        self.active_region = region;
        self.pointmap = OnceLock::new();
    }

    pub fn active_region(&self) -> Option<&SphericalPolygon> {
        self.active_region.as_ref()
    }

    /// The point map, built on first use.
    pub fn point_map(&self) -> &PointMap {
        self.pointmap.get_or_init(|| {
            PointMap::build(
                &self.grid,
                self.nlayers(),
                &self.profiles,
                self.active_region.as_ref(),
            )
        })
    }

    pub fn npoints(&self) -> usize {
        self.point_map().npoints()
    }

    pub fn point_radius(&self, p: i32) -> Option<f64> {
        self.point_map().point_radius(p, &self.profiles)
    }

    pub fn point_unit_vector(&self, p: i32) -> Option<Vec3> {
        self.point_map().point_unit_vector(p, &self.grid)
    }

    pub fn point_value(&self, p: i32, attr: usize) -> f64 {
        self.point_map().point_value(p, attr, &self.profiles)
    }

    // ------------------------------------------------------------------
    // Extension hook
    // ------------------------------------------------------------------

    pub fn extension(&self) -> Option<&dyn ModelExtension> {
        self.extension.as_deref()
    }

    pub fn set_extension(&mut self, extension: Option<Box<dyn ModelExtension>>) {
        self.extension = extension;
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    /// Write the model. `grid_path` embeds the grid when `None`, or
    /// writes a relative path reference the reader resolves later.
    pub fn write_binary(&self, w: &mut BinWriter, grid_path: Option<&str>) -> Result<()> {
        let codec = self.extension.as_deref().and_then(|e| e.cell_codec());
        if self.metadata.data_type() == DataType::Custom && codec.is_none() {
            return Err(GeoTessError::inconsistent(
                "CUSTOM element kind requires an extension with a cell codec",
            ));
        }
        w.write_magic(MODEL_MAGIC)?;
        w.write_u32(MODEL_FORMAT_VERSION)?;
        w.write_string(self.metadata.model_software_version())?;
        w.write_string(self.metadata.model_generation_date())?;
        w.write_string(self.metadata.description())?;
        w.write_u32(self.nlayers() as u32)?;
        for name in self.metadata.layer_names() {
            w.write_string(name)?;
        }
        for &tess in self.metadata.layer_tess_ids() {
            w.write_u32(tess)?;
        }
        w.write_string(&self.metadata.attribute_names().join(";"))?;
        w.write_string(&self.metadata.attribute_units().join(";"))?;
        w.write_string(&self.metadata.data_type().to_string())?;
        w.write_string(&self.metadata.earth_shape().to_string())?;
        w.write_u32(self.nvertices() as u32)?;
        for vertex in 0..self.nvertices() as u32 {
            for layer in 0..self.nlayers() {
                self.profile(vertex, layer).write_binary(w, codec)?;
            }
        }
        match grid_path {
            None => {
                w.write_string(EMBEDDED_GRID)?;
                w.write_string(self.grid.grid_id())?;
                self.grid.write_binary(w)?;
            }
            Some(path) => {
                w.write_string(path)?;
                w.write_string(self.grid.grid_id())?;
            }
        }
        if let Some(ext) = &self.extension {
            w.write_string(ext.class_tag())?;
            w.write_u32(ext.format_version())?;
            ext.write_extra(w)?;
        }
        w.flush()
    }

    /// Read a binary model. External grid references resolve relative to
    /// `grid_dir`.
    pub fn read_binary(
        r: &mut BinReader,
        registry: &ExtensionRegistry,
        grid_dir: Option<&Path>,
    ) -> Result<Self> {
        r.expect_magic(MODEL_MAGIC)?;
        let at = r.offset();
        let version = r.read_u32()?;
        if version != 1 && version != 2 {
            return Err(GeoTessError::at(
                GeoTessErrorKind::MalformedFile(format!(
                    "unsupported model format version {}",
                    version
                )),
                at,
            ));
        }
        let software_version = r.read_string()?;
        let generation_date = r.read_string()?;
        let description = r.read_string()?;
        let nlayers = r.read_u32()? as usize;
        let mut layer_names = Vec::with_capacity(nlayers);
        for _ in 0..nlayers {
            layer_names.push(r.read_string()?);
        }
        let layer_tess_ids = if version >= 2 {
            (0..nlayers).map(|_| r.read_u32()).collect::<Result<_>>()?
        } else {
            vec![0; nlayers]
        };
        let attribute_names = split_list(&r.read_string()?);
        let attribute_units = split_list(&r.read_string()?);
        let data_type = parse_data_type(&r.read_string()?, r.offset())?;
        let earth_shape = if version >= 2 {
            parse_earth_shape(&r.read_string()?, r.offset())?
        } else {
            geotess_geom::EarthShape::Wgs84
        };
        let metadata = {
            let mut m = MetaData::new(
                layer_names,
                layer_tess_ids,
                attribute_names,
                attribute_units,
                data_type,
                earth_shape,
            )?
            .with_description(description);
            m.set_provenance(software_version, generation_date);
            m
        };
        let codec = registry.cell_codec();
        if data_type == DataType::Custom && codec.is_none() {
            return Err(GeoTessError::new(GeoTessErrorKind::MalformedFile(
                "CUSTOM element kind but no registered cell codec".into(),
            )));
        }
        let nattributes = metadata.nattributes();
        Self::read_binary_body(
            r,
            registry,
            grid_dir,
            metadata,
            nattributes,
            data_type,
            codec,
        )
    }

    fn read_binary_body(
        r: &mut BinReader,
        registry: &ExtensionRegistry,
        grid_dir: Option<&Path>,
        metadata: MetaData,
        nattributes: usize,
        data_type: DataType,
        codec: Option<&dyn crate::io::extension::CustomCellCodec>,
    ) -> Result<Self> {
        // The profile block carries its own node counts; the number of
        // (vertex, layer) records is fixed by the grid, which in this
        // format is identified after the block. The writer prefixes the
        // block with the vertex count so a forward-only reader can size
        // it.
        let nvertices = r.read_u32()? as usize;
        let nlayers = metadata.nlayers();
        let mut profiles = Vec::with_capacity(nvertices * nlayers);
        for _ in 0..nvertices * nlayers {
            profiles.push(Profile::read_binary(r, data_type, nattributes, codec)?);
        }
        let token = r.read_string()?;
        let expected_id = r.read_string()?;
        let grid = if token == EMBEDDED_GRID {
            Grid::read_binary(r)?
        } else {
            let dir = grid_dir.ok_or_else(|| {
                GeoTessError::new(GeoTessErrorKind::MalformedFile(format!(
                    "model references external grid {:?} but no grid directory was supplied",
                    token
                )))
            })?;
            Grid::read_file(dir.join(&token))?
        };
        if grid.grid_id() != expected_id {
            return Err(GeoTessError::new(GeoTessErrorKind::MalformedFile(format!(
                "model expects grid {} but loaded {}",
                expected_id,
                grid.grid_id()
            ))));
        }
        if grid.nvertices() != nvertices {
            return Err(GeoTessError::new(GeoTessErrorKind::MalformedFile(format!(
                "profile block covers {} vertices but the grid has {}",
                nvertices,
                grid.nvertices()
            ))));
        }
        let mut model = Self {
            grid: Arc::new(grid),
            metadata,
            profiles,
            active_region: None,
            pointmap: OnceLock::new(),
            extension: None,
        };
        model.metadata.validate(&model.grid, codec.is_some())?;
        // Derived-class payload, dispatched through the registry.
        let at = r.offset();
        if let Some(tag) = r.read_opt_string()? {
            let version = r.read_u32()?;
            let factory = registry.resolve(&tag, at)?;
            debug!("loading extension {:?} version {}", tag, version);
            let ext = factory.read_extra(&model, version, r)?;
            model.extension = Some(ext);
        }
        debug!(
            "loaded model on grid {}: {} layers, {} attributes, {} profiles",
            model.grid.grid_id(),
            model.nlayers(),
            model.nattributes(),
            model.profiles.len()
        );
        Ok(model)
    }

    pub fn write_ascii(&self, w: &mut AsciiWriter, grid_path: Option<&str>) -> Result<()> {
        let codec = self.extension.as_deref().and_then(|e| e.cell_codec());
        if self.metadata.data_type() == DataType::Custom && codec.is_none() {
            return Err(GeoTessError::inconsistent(
                "CUSTOM element kind requires an extension with a cell codec",
            ));
        }
        w.write_line(MODEL_MAGIC)?;
        w.write_line(&MODEL_FORMAT_VERSION.to_string())?;
        w.write_string(self.metadata.model_software_version())?;
        w.write_string(self.metadata.model_generation_date())?;
        w.write_string(self.metadata.description())?;
        w.write_line(&self.nlayers().to_string())?;
        for name in self.metadata.layer_names() {
            w.write_string(name)?;
        }
        w.write_fields(
            &self
                .metadata
                .layer_tess_ids()
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>(),
        )?;
        w.write_string(&self.metadata.attribute_names().join(";"))?;
        w.write_string(&self.metadata.attribute_units().join(";"))?;
        w.write_line(&self.metadata.data_type().to_string())?;
        w.write_line(&self.metadata.earth_shape().to_string())?;
        w.write_line(&self.nvertices().to_string())?;
        for vertex in 0..self.nvertices() as u32 {
            for layer in 0..self.nlayers() {
                self.profile(vertex, layer).write_ascii(w, codec)?;
            }
        }
        match grid_path {
            None => {
                w.write_string(EMBEDDED_GRID)?;
                w.write_line(self.grid.grid_id())?;
                self.grid.write_ascii(w)?;
            }
            Some(path) => {
                w.write_string(path)?;
                w.write_line(self.grid.grid_id())?;
            }
        }
        if let Some(ext) = &self.extension {
            w.write_string(ext.class_tag())?;
            w.write_line(&ext.format_version().to_string())?;
            ext.write_extra_ascii(w)?;
        }
        w.flush()
    }

    pub fn read_ascii(
        r: &mut AsciiReader,
        registry: &ExtensionRegistry,
        grid_dir: Option<&Path>,
    ) -> Result<Self> {
        let magic = r.read_word()?;
        if magic != MODEL_MAGIC {
            return Err(GeoTessError::new(GeoTessErrorKind::MalformedFile(format!(
                "bad magic {:?}",
                magic
            ))));
        }
        let version = r.read_u32()?;
        if version != 1 && version != 2 {
            return Err(GeoTessError::new(GeoTessErrorKind::MalformedFile(format!(
                "unsupported model format version {}",
                version
            ))));
        }
        let software_version = r.read_string()?;
        let generation_date = r.read_string()?;
        let description = r.read_string()?;
        let nlayers = r.read_u32()? as usize;
        let mut layer_names = Vec::with_capacity(nlayers);
        for _ in 0..nlayers {
            layer_names.push(r.read_string()?);
        }
        let layer_tess_ids = if version >= 2 {
            (0..nlayers).map(|_| r.read_u32()).collect::<Result<_>>()?
        } else {
            vec![0; nlayers]
        };
        let attribute_names = split_list(&r.read_string()?);
        let attribute_units = split_list(&r.read_string()?);
        let data_type = parse_data_type(&r.read_word()?, r.offset())?;
        let earth_shape = if version >= 2 {
            parse_earth_shape(&r.read_word()?, r.offset())?
        } else {
            geotess_geom::EarthShape::Wgs84
        };
        let metadata = {
            let mut m = MetaData::new(
                layer_names,
                layer_tess_ids,
                attribute_names,
                attribute_units,
                data_type,
                earth_shape,
            )?
            .with_description(description);
            m.set_provenance(software_version, generation_date);
            m
        };
        let codec = registry.cell_codec();
        if data_type == DataType::Custom && codec.is_none() {
            return Err(GeoTessError::new(GeoTessErrorKind::MalformedFile(
                "CUSTOM element kind but no registered cell codec".into(),
            )));
        }
        let nvertices = r.read_u32()? as usize;
        let nattributes = metadata.nattributes();
        let mut profiles = Vec::with_capacity(nvertices * nlayers);
        for _ in 0..nvertices * nlayers {
            profiles.push(Profile::read_ascii(r, data_type, nattributes, codec)?);
        }
        let token = r.read_string()?;
        let expected_id = r.read_word()?;
        let grid = if token == EMBEDDED_GRID {
            Grid::read_ascii(r)?
        } else {
            let dir = grid_dir.ok_or_else(|| {
                GeoTessError::new(GeoTessErrorKind::MalformedFile(format!(
                    "model references external grid {:?} but no grid directory was supplied",
                    token
                )))
            })?;
            Grid::read_file(dir.join(&token))?
        };
        if grid.grid_id() != expected_id {
            return Err(GeoTessError::new(GeoTessErrorKind::MalformedFile(format!(
                "model expects grid {} but loaded {}",
                expected_id,
                grid.grid_id()
            ))));
        }
        if grid.nvertices() != nvertices {
            return Err(GeoTessError::new(GeoTessErrorKind::MalformedFile(format!(
                "profile block covers {} vertices but the grid has {}",
                nvertices,
                grid.nvertices()
            ))));
        }
        let mut model = Self {
            grid: Arc::new(grid),
            metadata,
            profiles,
            active_region: None,
            pointmap: OnceLock::new(),
            extension: None,
        };
        model.metadata.validate(&model.grid, codec.is_some())?;
        if !r.at_end() {
            let tag = r.read_string()?;
            let version = r.read_u32()?;
            let factory = registry.resolve(&tag, r.offset())?;
            let ext = factory.read_extra_ascii(&model, version, r)?;
            model.extension = Some(ext);
        }
        Ok(model)
    }

    /// Load a model from a file, sniffing binary vs ASCII. External grid
    /// references resolve relative to the model file's directory.
    pub fn read_file(path: impl AsRef<Path>, registry: &ExtensionRegistry) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let dir = path.parent().map(Path::to_path_buf);
        if crate::io::is_ascii_header(&data, MODEL_MAGIC) {
            Self::read_ascii(
                &mut AsciiReader::from_text(data),
                registry,
                dir.as_deref(),
            )
        } else {
            let mut cur = data.as_slice();
            Self::read_binary(&mut BinReader::new(&mut cur), registry, dir.as_deref())
        }
    }

    /// Write a model to a file; `.ascii` paths select the ASCII format.
    /// `grid_path` references an external grid file instead of embedding.
    pub fn write_file(&self, path: impl AsRef<Path>, grid_path: Option<&str>) -> Result<()> {
        let path = path.as_ref();
        let mut file = std::fs::File::create(path)?;
        if crate::io::is_ascii_path(path) {
            self.write_ascii(&mut AsciiWriter::new(&mut file), grid_path)
        } else {
            self.write_binary(&mut BinWriter::new(&mut file), grid_path)
        }
    }
}

impl PartialEq for Model {
    /// Structural comparison: grid identity, metadata, and every profile
    /// payload (bit-exact radii and values, NaN-aware).
    fn eq(&self, other: &Self) -> bool {
        let ext_eq = match (&self.extension, &other.extension) {
            (None, None) => true,
            (Some(a), Some(b)) => a.extension_eq(b.as_ref()),
            _ => false,
        };
        self.grid.grid_id() == other.grid.grid_id()
            && self.metadata == other.metadata
            && self.profiles == other.profiles
            && ext_eq
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(';').map(|p| p.trim().to_owned()).collect()
}

fn parse_data_type(s: &str, offset: usize) -> Result<DataType> {
    s.parse().map_err(|_| {
        GeoTessError::at(
            GeoTessErrorKind::MalformedFile(format!("unknown data type {:?}", s)),
            offset,
        )
    })
}

fn parse_earth_shape(s: &str, offset: usize) -> Result<geotess_geom::EarthShape> {
    s.parse().map_err(|_| {
        GeoTessError::at(
            GeoTessErrorKind::MalformedFile(format!("unknown earth shape {:?}", s)),
            offset,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataColumn;
    use crate::io::extension::ExtensionFactory;
    use geotess_geom::EarthShape;

    fn test_metadata(nlayers: usize) -> MetaData {
        let names = (0..nlayers).map(|i| format!("layer {}", i)).collect();
        MetaData::single_tessellation(
            names,
            vec!["vp".into()],
            vec!["km/s".into()],
            DataType::Float,
            EarthShape::Wgs84,
        )
        .unwrap()
        .with_description("test model\nwith a two-line description")
    }

    /// One profile variant per latitude band, all five represented.
    fn banded_model() -> Model {
        let grid = Arc::new(Grid::icosahedron(1).unwrap());
        let mut model = Model::new(grid.clone(), test_metadata(1)).unwrap();
        for v in 0..grid.nvertices() as u32 {
            let z = grid.vertex(v).z;
            let profile = if z > 0.8 {
                Profile::npoint(
                    vec![6000.0, 6100.0, 6371.0],
                    DataColumn::from_values(
                        crate::data::DataValues::Float(vec![8.0, 8.1, 8.2]),
                        1,
                    )
                    .unwrap(),
                )
                .unwrap()
            } else if z > 0.3 {
                Profile::constant(6000.0, 6371.0, DataColumn::floats(vec![7.5])).unwrap()
            } else if z > -0.3 {
                Profile::Thin {
                    radius: 6100.0,
                    data: DataColumn::floats(vec![6.25]),
                }
            } else if z > -0.8 {
                Profile::empty(6000.0, 6371.0).unwrap()
            } else {
                Profile::Surface {
                    data: DataColumn::floats(vec![f32::NAN]),
                }
            };
            model.set_profile(v, 0, profile).unwrap();
        }
        model
    }

    #[test]
    fn binary_round_trip_preserves_every_variant() {
        let model = banded_model();
        let mut buf = Vec::new();
        model
            .write_binary(&mut BinWriter::new(&mut buf), None)
            .unwrap();
        let mut cur = buf.as_slice();
        let read =
            Model::read_binary(&mut BinReader::new(&mut cur), &ExtensionRegistry::new(), None)
                .unwrap();
        assert_eq!(read, model);
        assert_eq!(read.grid().grid_id(), model.grid().grid_id());
        assert_eq!(read.metadata().description(), model.metadata().description());
    }

    #[test]
    fn ascii_round_trip_preserves_every_variant() {
        let model = banded_model();
        let mut buf = Vec::new();
        model
            .write_ascii(&mut AsciiWriter::new(&mut buf), None)
            .unwrap();
        let read = Model::read_ascii(
            &mut AsciiReader::from_text(buf),
            &ExtensionRegistry::new(),
            None,
        )
        .unwrap();
        assert_eq!(read, model);
    }

    #[test]
    fn external_grid_reference_round_trips_through_files() {
        let dir = std::env::temp_dir().join(format!(
            "geotess-model-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let model = banded_model();
        model.grid().write_file(dir.join("grid.geotess")).unwrap();
        model
            .write_file(dir.join("model.geotess"), Some("grid.geotess"))
            .unwrap();
        let read =
            Model::read_file(dir.join("model.geotess"), &ExtensionRegistry::new()).unwrap();
        assert_eq!(read, model);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn grid_id_mismatch_is_rejected() {
        let model = banded_model();
        let mut buf = Vec::new();
        model
            .write_binary(&mut BinWriter::new(&mut buf), Some("missing-grid.geotess"))
            .unwrap();
        // No grid directory supplied: the external reference cannot
        // resolve.
        let mut cur = buf.as_slice();
        let err =
            Model::read_binary(&mut BinReader::new(&mut cur), &ExtensionRegistry::new(), None)
                .unwrap_err();
        assert!(matches!(err.kind, GeoTessErrorKind::MalformedFile(_)));
    }

    #[test]
    fn profile_boundary_violations_are_rejected() {
        let grid = Arc::new(Grid::icosahedron(1).unwrap());
        let mut model = Model::new(grid, test_metadata(2)).unwrap();
        model
            .set_profile(
                0,
                0,
                Profile::constant(5000.0, 6000.0, DataColumn::floats(vec![1.0])).unwrap(),
            )
            .unwrap();
        // Layer 1 dipping below the top of layer 0.
        let err = model.set_profile(
            0,
            1,
            Profile::constant(5500.0, 6371.0, DataColumn::floats(vec![2.0])).unwrap(),
        );
        assert!(err.is_err());
        model
            .set_profile(
                0,
                1,
                Profile::constant(6000.0, 6371.0, DataColumn::floats(vec![2.0])).unwrap(),
            )
            .unwrap();
    }

    #[test]
    fn set_profile_rebuilds_the_point_map() {
        let mut model = banded_model();
        let before = model.npoints();
        // Swap an Empty profile for a Constant one: one more point.
        let empty_vertex = (0..model.nvertices() as u32)
            .find(|&v| model.profile(v, 0).profile_type() == crate::profile::ProfileType::Empty)
            .unwrap();
        model
            .set_profile(
                empty_vertex,
                0,
                Profile::constant(6000.0, 6371.0, DataColumn::floats(vec![3.0])).unwrap(),
            )
            .unwrap();
        assert_eq!(model.npoints(), before + 1);
    }

    #[derive(Debug)]
    struct Anisotropy {
        scale: f64,
    }

    impl ModelExtension for Anisotropy {
        fn class_tag(&self) -> &str {
            "Anisotropy"
        }

        fn format_version(&self) -> u32 {
            1
        }

        fn write_extra(&self, w: &mut BinWriter) -> Result<()> {
            w.write_f64(self.scale)
        }

        fn write_extra_ascii(&self, w: &mut AsciiWriter) -> Result<()> {
            w.write_line(&self.scale.to_string())
        }
    }

    struct AnisotropyFactory;

    impl ExtensionFactory for AnisotropyFactory {
        fn read_extra(
            &self,
            _model: &Model,
            version: u32,
            r: &mut BinReader,
        ) -> Result<Box<dyn ModelExtension>> {
            assert_eq!(version, 1);
            Ok(Box::new(Anisotropy {
                scale: r.read_f64()?,
            }))
        }

        fn read_extra_ascii(
            &self,
            _model: &Model,
            version: u32,
            r: &mut AsciiReader,
        ) -> Result<Box<dyn ModelExtension>> {
            assert_eq!(version, 1);
            Ok(Box::new(Anisotropy {
                scale: r.read_f64()?,
            }))
        }
    }

    #[test]
    fn extension_payload_round_trips_through_the_registry() {
        let mut model = banded_model();
        model.set_extension(Some(Box::new(Anisotropy { scale: 0.75 })));
        let mut buf = Vec::new();
        model
            .write_binary(&mut BinWriter::new(&mut buf), None)
            .unwrap();

        // Without the factory the tag is unresolvable.
        let mut cur = buf.as_slice();
        assert!(Model::read_binary(
            &mut BinReader::new(&mut cur),
            &ExtensionRegistry::new(),
            None
        )
        .is_err());

        let mut registry = ExtensionRegistry::new();
        registry.register("Anisotropy", Box::new(AnisotropyFactory));
        let mut cur = buf.as_slice();
        let read = Model::read_binary(&mut BinReader::new(&mut cur), &registry, None).unwrap();
        let ext = read.extension().unwrap();
        assert_eq!(ext.class_tag(), "Anisotropy");
        assert_eq!(ext.format_version(), 1);
        assert_eq!(read, model);
    }
}
