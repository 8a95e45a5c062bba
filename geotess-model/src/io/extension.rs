//! Derived-model extension hook
//!
//! A derived model's extra state lives between the base payload and the
//! end of stream: a class-tag string, a u32 format version, then
//! class-specific bytes. Dispatch goes through an explicit registry keyed
//! by the tag and populated at startup; there is no name-based reflection.

use std::collections::HashMap;
use std::fmt::Debug;

use crate::error::{GeoTessError, Result};
use crate::io::stream::{AsciiReader, AsciiWriter, BinReader, BinWriter};
use crate::model::Model;

/// Extra state carried by a derived model.
///
/// The writer emits the class tag and format version, then calls
/// [`write_extra`](Self::write_extra) immediately after the base payload;
/// the loader reads tag and version, resolves the factory, and calls its
/// `read_extra` immediately after the base payload has loaded.
pub trait ModelExtension: Debug + Send + Sync {
    /// Discriminator written to the stream; must match the registry key.
    fn class_tag(&self) -> &str;

    /// Format version written after the tag, so forward compatibility is
    /// decidable at load time.
    fn format_version(&self) -> u32;

    fn write_extra(&self, w: &mut BinWriter) -> Result<()>;

    fn write_extra_ascii(&self, w: &mut AsciiWriter) -> Result<()>;

    /// Structural comparison used by model equality. Implementations that
    /// carry payload should override; the default compares identity only.
    fn extension_eq(&self, other: &dyn ModelExtension) -> bool {
        self.class_tag() == other.class_tag() && self.format_version() == other.format_version()
    }

    /// Cell codec for CUSTOM element kinds; the writer side of
    /// [`ExtensionFactory::cell_codec`].
    fn cell_codec(&self) -> Option<&dyn CustomCellCodec> {
        None
    }
}

/// Codec for CUSTOM data cells. A model whose element kind is CUSTOM can
/// only be read or written when its registered extension supplies one.
pub trait CustomCellCodec: Send + Sync {
    /// Read one node's payload; the codec owns the cell width.
    fn read_cell(&self, r: &mut BinReader, nattributes: usize) -> Result<Box<[u8]>>;

    fn write_cell(&self, w: &mut BinWriter, payload: &[u8]) -> Result<()>;

    fn read_cell_ascii(&self, r: &mut AsciiReader, nattributes: usize) -> Result<Box<[u8]>>;

    fn write_cell_ascii(&self, w: &mut AsciiWriter, payload: &[u8]) -> Result<()>;
}

/// Deserializer side of one extension class.
pub trait ExtensionFactory: Send + Sync {
    /// Rebuild the extension from the stream. `version` has already been
    /// read; unknown versions should return `MalformedFile`.
    fn read_extra(
        &self,
        model: &Model,
        version: u32,
        r: &mut BinReader,
    ) -> Result<Box<dyn ModelExtension>>;

    fn read_extra_ascii(
        &self,
        model: &Model,
        version: u32,
        r: &mut AsciiReader,
    ) -> Result<Box<dyn ModelExtension>>;

    /// Cell codec for CUSTOM element kinds, when this extension defines
    /// one.
    fn cell_codec(&self) -> Option<&dyn CustomCellCodec> {
        None
    }
}

/// Registry of extension factories keyed by class tag.
#[derive(Default)]
pub struct ExtensionRegistry {
    factories: HashMap<String, Box<dyn ExtensionFactory>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class_tag: impl Into<String>, factory: Box<dyn ExtensionFactory>) {
        self.factories.insert(class_tag.into(), factory);
    }

    pub fn get(&self, class_tag: &str) -> Option<&dyn ExtensionFactory> {
        self.factories.get(class_tag).map(|f| f.as_ref())
    }

    /// Resolve a tag read from a stream, failing when no factory is
    /// registered for it.
    pub fn resolve(&self, class_tag: &str, offset: usize) -> Result<&dyn ExtensionFactory> {
        self.get(class_tag).ok_or_else(|| {
            GeoTessError::at(
                crate::error::GeoTessErrorKind::MalformedFile(format!(
                    "no extension registered for class tag {:?}",
                    class_tag
                )),
                offset,
            )
        })
    }

    /// The single cell codec available through registered extensions, if
    /// any. Used when loading models with the CUSTOM element kind.
    pub fn cell_codec(&self) -> Option<&dyn CustomCellCodec> {
        self.factories.values().find_map(|f| f.cell_codec())
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
