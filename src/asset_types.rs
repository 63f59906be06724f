//! Built-in example resources and their loaders.
//!
//! These cover the three lifecycle shapes the manager supports: textures
//! need a render-thread finalize (driver upload), audio is ready as soon as
//! it is decoded, and raw data tracks a revision counter across hot reloads.
//! Production decoders live in their own crates; the loaders here read the
//! engine tooling's trivial little-endian formats straight off the file
//! system.

use crate::error::{ResourceError, Result};
use crate::handle::ResourcePtr;
use crate::loader::ResourceLoader;
use crate::manager::ResourceManager;
use crate::resource::{FinalizeFlags, Resource, ResourceMeta};
use std::any::Any;

pub const TEXTURE_TYPE: &str = "Texture";
pub const AUDIO_TYPE: &str = "Audio";
pub const DATA_TYPE: &str = "Data";

/// Texture resource; finalize uploads it to the driver
pub struct TextureResource {
    meta: ResourceMeta,
    width: u32,
    height: u32,
    data: Vec<u8>,
    uploaded: bool,
}

impl TextureResource {
    pub fn new(id: impl Into<String>, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            meta: ResourceMeta::new(TEXTURE_TYPE, id)
                .with_finalize(FinalizeFlags::FROM_RENDERER | FinalizeFlags::NOT_YET),
            width,
            height,
            data,
            uploaded: false,
        }
    }

    /// 2x2 magenta placeholder shown while the real texture loads or after
    /// a failed load
    pub fn dummy() -> Self {
        let magenta = [255u8, 0, 255, 255];
        Self {
            meta: ResourceMeta::new(TEXTURE_TYPE, "builtin/dummy_texture"),
            width: 2,
            height: 2,
            data: magenta.repeat(4),
            uploaded: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }
    pub fn height(&self) -> u32 {
        self.height
    }
    pub fn data(&self) -> &[u8] {
        &self.data
    }
    pub fn is_uploaded(&self) -> bool {
        self.uploaded
    }
}

impl Resource for TextureResource {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut ResourceMeta {
        &mut self.meta
    }
    fn finalize(&mut self) -> Result<()> {
        // Stand-in for the driver upload; a real renderer backend hooks in here.
        self.uploaded = true;
        Ok(())
    }
    fn unload(&mut self) -> Result<()> {
        self.data.clear();
        self.uploaded = false;
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Reads the tooling's raw texture format: `[w: u16le][h: u16le][rgba8...]`
#[derive(Clone)]
pub struct TextureLoader {
    pub path: String,
}

impl TextureLoader {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl ResourceLoader for TextureLoader {
    fn resource_type(&self) -> &'static str {
        TEXTURE_TYPE
    }

    fn resource_id(&self) -> String {
        self.path.clone()
    }

    fn load(&mut self, _existing: Option<&dyn Resource>) -> Result<Box<dyn Resource>> {
        let bytes = std::fs::read(&self.path).map_err(|e| {
            ResourceError::LoadingError(format!("failed to read texture {}: {e}", self.path))
        })?;
        if bytes.len() < 4 {
            return Err(ResourceError::LoadingError(format!(
                "texture {} truncated header",
                self.path
            )));
        }
        let width = u16::from_le_bytes([bytes[0], bytes[1]]) as u32;
        let height = u16::from_le_bytes([bytes[2], bytes[3]]) as u32;
        let expected = 4 + (width as usize) * (height as usize) * 4;
        if bytes.len() != expected {
            return Err(ResourceError::LoadingError(format!(
                "texture {} is {} bytes, expected {expected} for {width}x{height}",
                self.path,
                bytes.len()
            )));
        }
        Ok(Box::new(TextureResource::new(
            self.path.clone(),
            width,
            height,
            bytes[4..].to_vec(),
        )))
    }

    fn box_clone(&self) -> Box<dyn ResourceLoader> {
        Box::new(self.clone())
    }

    fn post_load(&mut self, manager: &ResourceManager, handle: &ResourcePtr) {
        manager.register_loader_for_reload(&self.path, self.box_clone(), handle.clone());
    }
}

/// Audio resource; ready as soon as it is decoded, no finalize step
pub struct AudioResource {
    meta: ResourceMeta,
    sample_rate: u32,
    channels: u8,
    samples: Vec<f32>,
}

impl AudioResource {
    pub fn new(id: impl Into<String>, sample_rate: u32, channels: u8, samples: Vec<f32>) -> Self {
        Self {
            meta: ResourceMeta::new(AUDIO_TYPE, id),
            sample_rate,
            channels,
            samples,
        }
    }

    /// Short silent buffer played while the real sound loads or after a
    /// failed load
    pub fn dummy() -> Self {
        Self::new("builtin/dummy_audio", 44_100, 1, vec![0.0; 256])
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    pub fn channels(&self) -> u8 {
        self.channels
    }
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
    pub fn duration_seconds(&self) -> f32 {
        self.samples.len() as f32 / (self.sample_rate as f32 * self.channels as f32)
    }
}

impl Resource for AudioResource {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut ResourceMeta {
        &mut self.meta
    }
    fn unload(&mut self) -> Result<()> {
        self.samples.clear();
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Reads `[rate: u32le][channels: u8][f32le samples...]`
#[derive(Clone)]
pub struct AudioLoader {
    pub path: String,
}

impl AudioLoader {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl ResourceLoader for AudioLoader {
    fn resource_type(&self) -> &'static str {
        AUDIO_TYPE
    }

    fn resource_id(&self) -> String {
        self.path.clone()
    }

    fn load(&mut self, _existing: Option<&dyn Resource>) -> Result<Box<dyn Resource>> {
        let bytes = std::fs::read(&self.path).map_err(|e| {
            ResourceError::LoadingError(format!("failed to read audio {}: {e}", self.path))
        })?;
        if bytes.len() < 5 {
            return Err(ResourceError::LoadingError(format!(
                "audio {} truncated header",
                self.path
            )));
        }
        let sample_rate = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let channels = bytes[4];
        if channels == 0 {
            return Err(ResourceError::LoadingError(format!(
                "audio {} has zero channels",
                self.path
            )));
        }
        let payload = &bytes[5..];
        if payload.len() % 4 != 0 {
            return Err(ResourceError::LoadingError(format!(
                "audio {} sample data not f32-aligned",
                self.path
            )));
        }
        let samples = payload
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Box::new(AudioResource::new(
            self.path.clone(),
            sample_rate,
            channels,
            samples,
        )))
    }

    fn box_clone(&self) -> Box<dyn ResourceLoader> {
        Box::new(self.clone())
    }
}

/// Generic binary blob with a revision counter carried across hot reloads
pub struct DataResource {
    meta: ResourceMeta,
    data: Vec<u8>,
    revision: u32,
}

impl DataResource {
    pub fn new(id: impl Into<String>, data: Vec<u8>, revision: u32) -> Self {
        Self {
            meta: ResourceMeta::new(DATA_TYPE, id),
            data,
            revision,
        }
    }

    pub fn dummy() -> Self {
        Self::new("builtin/dummy_data", Vec::new(), 0)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// How many times this resource has been (re)loaded since first load
    pub fn revision(&self) -> u32 {
        self.revision
    }
}

impl Resource for DataResource {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut ResourceMeta {
        &mut self.meta
    }
    fn unload(&mut self) -> Result<()> {
        self.data.clear();
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Loads a file as-is and keeps the revision counter running across reloads
#[derive(Clone)]
pub struct DataLoader {
    pub path: String,
}

impl DataLoader {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl ResourceLoader for DataLoader {
    fn resource_type(&self) -> &'static str {
        DATA_TYPE
    }

    fn resource_id(&self) -> String {
        self.path.clone()
    }

    fn load(&mut self, existing: Option<&dyn Resource>) -> Result<Box<dyn Resource>> {
        let data = std::fs::read(&self.path).map_err(|e| {
            ResourceError::LoadingError(format!("failed to read {}: {e}", self.path))
        })?;
        let revision = existing
            .and_then(|r| r.as_any().downcast_ref::<DataResource>())
            .map_or(0, |r| r.revision + 1);
        Ok(Box::new(DataResource::new(self.path.clone(), data, revision)))
    }

    fn box_clone(&self) -> Box<dyn ResourceLoader> {
        Box::new(self.clone())
    }

    fn post_load(&mut self, manager: &ResourceManager, handle: &ResourcePtr) {
        manager.register_loader_for_reload(&self.path, self.box_clone(), handle.clone());
    }
}

/// Register dummies for every built-in type on a fresh manager
pub fn register_builtin_types(manager: &ResourceManager) -> Result<()> {
    manager.register_resource_type(Box::new(TextureResource::dummy()))?;
    manager.register_resource_type(Box::new(AudioResource::dummy()))?;
    manager.register_resource_type(Box::new(DataResource::dummy()))?;
    Ok(())
}
