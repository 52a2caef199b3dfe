// Shader module loading
//
// Vulkan consumes SPIR-V words. Compiled binaries come from disk through the
// file loader, are re-aligned into u32 words and wrapped in shader modules.

use ash::vk;
use std::io::Cursor;
use std::path::Path;

use crate::error::{RendererError, RendererResult};
use crate::file::{read_entire_file, FileMode};

/// Load a compiled SPIR-V binary. Empty or truncated files are errors.
pub fn load_spirv(path: &Path) -> RendererResult<Vec<u32>> {
    let bytes = read_entire_file(path, FileMode::Binary);
    if bytes.is_empty() {
        return Err(RendererError::ShaderLoad {
            path: path.to_path_buf(),
        });
    }

    ash::util::read_spv(&mut Cursor::new(&bytes)).map_err(|e| {
        log::error!("Invalid SPIR-V in {:?}: {}", path, e);
        RendererError::ShaderLoad {
            path: path.to_path_buf(),
        }
    })
}

pub fn create_shader_module(device: &ash::Device, code: &[u32]) -> RendererResult<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    unsafe { device.create_shader_module(&create_info, None) }
        .map_err(RendererError::resource("shader module"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn words_are_read_in_native_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&SPIRV_MAGIC.to_le_bytes()).unwrap();
        file.write_all(&0x0001_0000u32.to_le_bytes()).unwrap();

        let words = load_spirv(file.path()).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000]);
    }

    #[test]
    fn empty_file_fails() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = load_spirv(file.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceCreation);
    }

    #[test]
    fn missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triangle.vert.spv");
        match load_spirv(&path) {
            Err(RendererError::ShaderLoad { path: reported }) => assert_eq!(reported, path),
            other => panic!("expected ShaderLoad, got {:?}", other),
        }
    }

    #[test]
    fn partial_word_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x03, 0x02, 0x23, 0x07, 0x00, 0x00]).unwrap();
        assert!(load_spirv(file.path()).is_err());
    }
}
