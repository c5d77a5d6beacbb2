//! The backend operation table.
//!
//! This trait is the only boundary the front end calls through. Handles are
//! allocated by the front end; the backend indexes its tables with them and
//! treats handle 0 as "none" everywhere.
//!
//! Operations degrade locally on recoverable failures (region exhaustion,
//! incomplete resources, device faults): they log, skip the work, and leave
//! resources in their prior state. Pixel-producing calls return zero-filled
//! data when the native queue has faulted.

use std::path::Path;

use crate::handle::Handle;
use crate::types::*;

pub trait GlesBackend {
    // Frame control.

    /// Pick the next swapchain slot to record into, waiting out its previous
    /// fence if one is still pending. Returns the slot index.
    fn acquire_image(&mut self) -> u32;
    fn begin_frame(&mut self, slot: u32);
    fn end_frame(&mut self, slot: u32);
    fn present(&mut self, slot: u32);
    /// Block until `slot`'s prior submission completes. No-op when nothing is
    /// pending.
    fn wait_fence(&mut self, slot: u32);

    // State application.

    fn apply_viewport(&mut self, viewport: Viewport);
    fn apply_scissor(&mut self, enabled: bool, rect: ScissorRect);
    fn apply_blend(&mut self, state: BlendState);
    /// Merges with the currently applied stencil state; see
    /// [`Self::apply_depth_stencil`].
    fn apply_depth(&mut self, state: DepthState);
    /// Merges with the currently applied depth state; see
    /// [`Self::apply_depth_stencil`].
    fn apply_stencil(&mut self, state: StencilState);
    /// Depth and stencil form a single native state object. Binding them
    /// separately would let the second bind clobber fields set by the first,
    /// so the separate entry points above route through this combined one.
    fn apply_depth_stencil(&mut self, depth: DepthState, stencil: StencilState);
    fn apply_raster(&mut self, state: RasterState);
    fn apply_color_mask(&mut self, mask: ColorMask);
    fn apply_depth_bias(&mut self, bias: DepthBias);

    fn clear(&mut self, mask: ClearMask, color: [f32; 4], depth: f32, stencil: u32);

    // Buffer objects.

    fn create_buffer(&mut self, buffer: Handle);
    fn delete_buffer(&mut self, buffer: Handle);
    fn buffer_data(&mut self, buffer: Handle, data: &[u8]);
    fn buffer_sub_data(&mut self, buffer: Handle, offset: u32, data: &[u8]);

    // Textures.

    fn tex_image_2d(
        &mut self,
        texture: Handle,
        width: u32,
        height: u32,
        format: TexFormat,
        pixels: &[u8],
    );
    fn tex_sub_image_2d(
        &mut self,
        texture: Handle,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        format: TexFormat,
        pixels: &[u8],
    );
    fn tex_image_cube_face(
        &mut self,
        texture: Handle,
        face: CubeFace,
        size: u32,
        format: TexFormat,
        pixels: &[u8],
    );
    /// `data` is opaque block data sized by the caller; no CPU-side
    /// reformatting happens here.
    fn compressed_tex_image_2d(
        &mut self,
        texture: Handle,
        width: u32,
        height: u32,
        format: CompressedFormat,
        data: &[u8],
    );
    fn tex_parameter(&mut self, texture: Handle, params: SamplerParams);
    fn bind_texture(&mut self, unit: u32, texture: Handle);
    fn generate_mipmaps(&mut self, texture: Handle);
    /// Copy the current framebuffer into `texture`, (re)defining its storage.
    fn copy_tex_image_2d(&mut self, texture: Handle, width: u32, height: u32);
    fn copy_tex_sub_image_2d(
        &mut self,
        texture: Handle,
        dst_x: u32,
        dst_y: u32,
        src_x: u32,
        src_y: u32,
        width: u32,
        height: u32,
    );

    // Shaders and programs.

    /// Load a precompiled shader blob. The binary structure is an external
    /// contract; nothing beyond a size check is validated here.
    fn load_shader(&mut self, shader: Handle, stage: ShaderStage, path: &Path);
    fn delete_shader(&mut self, shader: Handle);
    /// Copies both stages' compiled representations into per-program storage;
    /// the program stays bindable after its source shaders are deleted.
    fn link_program(&mut self, program: Handle, vertex: Handle, fragment: Handle);
    fn delete_program(&mut self, program: Handle);
    fn bind_program(&mut self, program: Handle);

    // Uniform blocks.

    fn uniform_alloc(&mut self, block: Handle, size: u32);
    fn uniform_write(&mut self, block: Handle, offset: u32, data: &[u8]);
    /// Select the blocks whose bytes are snapshotted into the command stream
    /// at each draw. Handle 0 leaves a stage with zeroed uniforms.
    fn bind_uniforms(&mut self, vertex: Handle, fragment: Handle);

    // Vertex attributes.

    /// `None` disables the attribute; it is then fed its constant value.
    fn set_vertex_attrib(&mut self, index: u32, attrib: Option<VertexAttrib>);
    fn set_attrib_constant(&mut self, index: u32, value: [f32; 4]);
    /// Provide the bytes backing client-side attribute/index sources for
    /// subsequent draws.
    fn supply_client_array(&mut self, array: u32, data: &[u8]);

    // Draws.

    fn draw_arrays(&mut self, primitive: Primitive, first: u32, count: u32);
    fn draw_elements(
        &mut self,
        primitive: Primitive,
        count: u32,
        index_type: IndexType,
        source: IndexSource,
    );

    // Framebuffer.

    /// Handle 0 for `color` selects the current swapchain image; handle 0
    /// for `depth` means no depth/stencil attachment (the default framebuffer
    /// always has one).
    fn bind_framebuffer(&mut self, color: Handle, depth: Handle);
    fn renderbuffer_storage(&mut self, renderbuffer: Handle, width: u32, height: u32);
    fn delete_renderbuffer(&mut self, renderbuffer: Handle);

    // Readback.

    /// Returns `width * height * 4` RGBA8 bytes with bottom-origin row
    /// order, or zero-filled data when the device has faulted.
    fn read_pixels(&mut self, x: u32, y: u32, width: u32, height: u32) -> Vec<u8>;

    // Synchronization.

    fn flush(&mut self);
    fn finish(&mut self);
    /// Full coherency point between the copy engine, the 3D engine, and the
    /// CPU; invalidates descriptor bindings.
    fn barrier(&mut self);

    // Lifecycle.

    fn shutdown(&mut self);
}
