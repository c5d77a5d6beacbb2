//! Shader blob loading, program linking, and uniform snapshots.
//!
//! Shaders arrive as precompiled opaque blobs; nothing is parsed or compiled
//! at this layer. Linking copies the compiled representation into per-program
//! storage so a program outlives its source shader handles. Uniform values
//! are captured into the command stream at record time, never referenced
//! live by the GPU.

use std::borrow::Cow;
use std::path::Path;

use tracing::debug;

use crate::error::RuntimeError;
use crate::handle::{Handle, NONE_HANDLE};
use crate::types::ShaderStage;

use super::GlesRuntime;

pub(crate) struct ShaderRecord {
    pub stage: ShaderStage,
    /// Offset of the blob inside the code region.
    pub code_offset: u64,
    pub code_len: usize,
    pub loaded: bool,
}

pub(crate) struct ProgramStage {
    /// The program's own copy of the compiled representation.
    pub blob: Vec<u8>,
    pub module: wgpu::ShaderModule,
    pub valid: bool,
}

pub(crate) struct ProgramRecord {
    pub vertex: ProgramStage,
    pub fragment: ProgramStage,
}

impl ProgramRecord {
    pub fn is_bindable(&self) -> bool {
        self.vertex.valid && self.fragment.valid
    }
}

pub(crate) struct UniformBlock {
    /// Current CPU-side value; snapshotted per draw.
    pub shadow: Vec<u8>,
}

fn module_from_blob(device: &wgpu::Device, label: &str, blob: &[u8]) -> wgpu::ShaderModule {
    // The blob's structure is an external contract; the native layer owns
    // its interpretation.
    let source = String::from_utf8_lossy(blob);
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(Cow::Owned(source.into_owned())),
    })
}

impl GlesRuntime {
    pub(crate) fn try_load_shader(
        &mut self,
        shader: Handle,
        stage: ShaderStage,
        path: &Path,
    ) -> Result<(), RuntimeError> {
        let blob = std::fs::read(path).map_err(|source| RuntimeError::ShaderBlobIo {
            path: path.display().to_string(),
            source,
        })?;
        if blob.is_empty() {
            return Err(RuntimeError::ShaderBlobEmpty {
                path: path.display().to_string(),
            });
        }

        let code_offset =
            self.regions
                .load_code(&blob)
                .ok_or(RuntimeError::RegionExhausted {
                    region: "shader-code",
                    requested: blob.len() as u64,
                })?;

        self.shaders.put(
            shader,
            ShaderRecord {
                stage,
                code_offset,
                code_len: blob.len(),
                loaded: true,
            },
        )?;
        debug!(shader, ?stage, code_offset, len = blob.len(), "shader blob loaded");
        Ok(())
    }

    pub(crate) fn try_link_program(
        &mut self,
        program: Handle,
        vertex: Handle,
        fragment: Handle,
    ) -> Result<(), RuntimeError> {
        let link_stage = |runtime: &GlesRuntime,
                          handle: Handle,
                          want: ShaderStage,
                          label: &str|
         -> Result<ProgramStage, RuntimeError> {
            let record = runtime.shaders.get(handle)?;
            // Copy the blob bytes out of code memory into program storage;
            // the source shader handle may be deleted afterwards.
            let blob = runtime
                .regions
                .code_at(record.code_offset, record.code_len)
                .to_vec();
            let module = module_from_blob(&runtime.device, label, &blob);
            Ok(ProgramStage {
                blob,
                module,
                valid: record.loaded && record.stage == want,
            })
        };

        let vertex_stage = link_stage(self, vertex, ShaderStage::Vertex, "glaze.program.vs")?;
        let fragment_stage = link_stage(self, fragment, ShaderStage::Fragment, "glaze.program.fs")?;

        self.pipelines.remove_program(program);
        self.programs.put(
            program,
            ProgramRecord {
                vertex: vertex_stage,
                fragment: fragment_stage,
            },
        )?;
        debug!(program, vertex, fragment, "program linked");
        Ok(())
    }

    pub(crate) fn try_uniform_alloc(&mut self, block: Handle, size: u32) -> Result<(), RuntimeError> {
        let size = size.min(self.config.max_uniform_block_size);
        self.uniform_blocks.put(
            block,
            UniformBlock {
                shadow: vec![0u8; size as usize],
            },
        )
    }

    pub(crate) fn try_uniform_write(
        &mut self,
        block: Handle,
        offset: u32,
        data: &[u8],
    ) -> Result<(), RuntimeError> {
        let record = self.uniform_blocks.get_mut(block)?;
        let start = offset as usize;
        let end = start.saturating_add(data.len()).min(record.shadow.len());
        if start < end {
            record.shadow[start..end].copy_from_slice(&data[..end - start]);
        }
        Ok(())
    }

    /// Snapshot the bound uniform blocks' current bytes into the frame slot's
    /// uniform sub-range, returning the dynamic offsets for the draw.
    ///
    /// Two draws recorded into the same command buffer with different values
    /// each get their own slice; the GPU never dereferences the shadow.
    pub(crate) fn snapshot_uniforms(&mut self) -> Result<(u32, u32), RuntimeError> {
        let vs = self.snapshot_one(self.state.vs_uniform)?;
        let fs = self.snapshot_one(self.state.fs_uniform)?;
        Ok((vs, fs))
    }

    fn snapshot_one(&mut self, block: Handle) -> Result<u32, RuntimeError> {
        if block == NONE_HANDLE {
            return Ok(self.zero_uniform_offset);
        }
        let Some(record) = self.uniform_blocks.lookup(block) else {
            return Ok(self.zero_uniform_offset);
        };
        let slot = self.frames.current();
        let reserve = self.config.max_uniform_block_size as u64;
        let alignment = self.caps.uniform_alignment();
        self.regions
            .snapshot_uniform(&self.queue, slot, &record.shadow, reserve, alignment)
            .ok_or(RuntimeError::RegionExhausted {
                region: "uniform-data",
                requested: reserve,
            })
    }
}
