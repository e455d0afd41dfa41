/// Loader for precompiled shader binaries.
///
/// Binaries are looked up by stage name under one directory, with the file
/// extension of the active backend (`ShadowVS.spv` for Vulkan). A missing or
/// empty binary is a deployment error and fails start-up.

use std::path::{Path, PathBuf};
use rustc_hash::FxHashMap;
use crate::engine_fatal;
use crate::error::{Error, Result};
use crate::graphics_device::ShaderBytecode;

pub struct ShaderLibrary {
    dir: PathBuf,
    extension: &'static str,
    loaded: FxHashMap<String, ShaderBytecode>,
}

impl ShaderLibrary {
    pub fn new(dir: impl Into<PathBuf>, extension: &'static str) -> Self {
        Self {
            dir: dir.into(),
            extension,
            loaded: FxHashMap::default(),
        }
    }

    /// Path the binary for `name` is read from
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name).with_extension(self.extension)
    }

    /// Load (or return the already loaded) binary for `name`
    pub fn load(&mut self, name: &str) -> Result<ShaderBytecode> {
        if let Some(bytecode) = self.loaded.get(name) {
            return Ok(bytecode.clone());
        }

        let path = self.path_for(name);
        let code = read_binary(&path)?;
        let bytecode = ShaderBytecode { name: name.to_string(), code };
        self.loaded.insert(name.to_string(), bytecode.clone());
        Ok(bytecode)
    }

    /// Number of distinct binaries loaded
    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }
}

fn read_binary(path: &Path) -> Result<Vec<u8>> {
    let fail = |reason: String| {
        engine_fatal!(
            "nebula::shader_library",
            Error::ShaderLoadFailed { path: path.display().to_string(), reason }
        )
    };

    let code = std::fs::read(path).map_err(|e| fail(e.to_string()))?;
    if code.is_empty() {
        return Err(fail("file is empty".to_string()));
    }
    Ok(code)
}

#[cfg(test)]
#[path = "shader_library_tests.rs"]
mod tests;
