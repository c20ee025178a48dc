//! Asset loading
//!
//! Meshes, textures and shader binaries are loaded once from an
//! [`AssetManifest`] into named [`AssetTable`]s and referenced afterwards
//! through [`Handle`]s.

mod manifest;
mod mesh;
mod table;
mod texture;

pub use manifest::{AssetManifest, MeshEntry, ShaderEntry, ShaderStage, TextureEntry, TextureFilter};
pub use mesh::{Mesh, MeshData, Vertex, VERTEX_ATTRIBUTE_WIDTHS};
pub use table::{AssetTable, Handle};
pub use texture::{ImageData, Texture};

use std::path::Path;
use thiserror::Error;

use crate::config::ConfigError;
use crate::render::vulkan::{ShaderModule, VulkanError};
use crate::render::RenderContext;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// IO error while reading an asset
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Mesh file could not be imported
    #[error("Failed to import mesh {path}: {reason}")]
    MeshImport {
        /// File that failed
        path: String,
        /// Importer message
        reason: String,
    },

    /// Image file could not be decoded
    #[error("Failed to decode image {path}: {reason}")]
    ImageDecode {
        /// File that failed
        path: String,
        /// Decoder message
        reason: String,
    },

    /// Name not present in its table
    #[error("Unknown {kind} '{name}'")]
    UnknownAsset {
        /// Asset kind
        kind: &'static str,
        /// Requested name
        name: String,
    },

    /// GPU upload or object creation failed
    #[error(transparent)]
    Vulkan(#[from] VulkanError),

    /// Manifest could not be read
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for asset operations
pub type AssetResult<T> = Result<T, AssetError>;

/// All assets one demo uses
pub struct Assets {
    /// Uploaded meshes
    pub meshes: AssetTable<Mesh>,
    /// Uploaded textures
    pub textures: AssetTable<Texture>,
    /// Shader modules
    pub shaders: AssetTable<ShaderModule>,
}

impl Default for Assets {
    fn default() -> Self {
        Self {
            meshes: AssetTable::new("mesh"),
            textures: AssetTable::new("texture"),
            shaders: AssetTable::new("shader"),
        }
    }
}

impl Assets {
    /// Load every entry of `manifest`, resolving paths against `root`
    pub fn load(context: &mut RenderContext, manifest: &AssetManifest, root: &Path) -> AssetResult<Self> {
        let mut assets = Self::default();

        for entry in &manifest.shaders {
            let module = ShaderModule::from_file(context.device().clone(), root.join(&entry.path), entry.stage.flags())?;
            assets.shaders.insert(entry.name.clone(), module);
        }

        for entry in &manifest.textures {
            let data = ImageData::from_file(root.join(&entry.path))?;
            let texture = Texture::upload(context, &data, entry.filter.sampler_info())?;
            assets.textures.insert(entry.name.clone(), texture);
        }

        for entry in &manifest.meshes {
            let data = MeshData::import_obj(root.join(&entry.path))?;
            let mesh = Mesh::upload(context, &data)?;
            assets.meshes.insert(entry.name.clone(), mesh);
        }

        log::info!(
            "Loaded {} shaders, {} textures, {} meshes",
            assets.shaders.len(),
            assets.textures.len(),
            assets.meshes.len()
        );
        Ok(assets)
    }

    /// Load a manifest file and everything it lists, relative to the file's directory
    pub fn load_manifest(context: &mut RenderContext, path: impl AsRef<Path>) -> AssetResult<Self> {
        use crate::config::Config;

        let path = path.as_ref();
        let manifest = AssetManifest::load_from_file(path)?;
        let root = path.parent().unwrap_or_else(|| Path::new("."));
        Self::load(context, &manifest, root)
    }

    /// Shader module registered as `name`
    pub fn shader(&self, name: &str) -> AssetResult<&ShaderModule> {
        self.shaders.get_by_name(name)
    }
}
