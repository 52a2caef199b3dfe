// Graphics pipeline creation
//
// One render pass with a single colour attachment and one fixed pipeline:
// no vertex input (the vertex shader generates the triangle), triangle list,
// back-face culling with clockwise front faces, no blending.

use ash::vk;

use super::resources::{ResourceStack, VkResource};
use super::shader::{create_shader_module, load_spirv};
use super::RendererConfig;
use crate::error::{RendererError, RendererResult};

const ENTRY_POINT: &std::ffi::CStr = c"main";

pub struct GraphicsPipeline {
    pub render_pass: vk::RenderPass,
    pub pipeline: vk::Pipeline,
}

/// The swapchain image: cleared on load, stored, handed to presentation
pub fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build()
}

/// Colour writes wait until the presentation engine is done reading the image
pub fn external_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .build()
}

pub fn create_render_pass(
    device: &ash::Device,
    format: vk::Format,
    resources: &mut ResourceStack<VkResource>,
) -> RendererResult<vk::RenderPass> {
    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let color_attachments = [color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_attachments)
        .build();

    let attachments = [color_attachment(format)];
    let subpasses = [subpass];
    let dependencies = [external_dependency()];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    let render_pass = unsafe { device.create_render_pass(&render_pass_info, None) }
        .map_err(RendererError::resource("render pass"))?;
    resources.push(VkResource::RenderPass(render_pass));

    Ok(render_pass)
}

pub fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo {
    vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false)
        .build()
}

pub fn color_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
        .build()
}

/// Viewport and scissor covering the whole swapchain extent
pub fn full_viewport(extent: vk::Extent2D) -> (vk::Viewport, vk::Rect2D) {
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };
    (viewport, scissor)
}

impl GraphicsPipeline {
    pub fn new(
        device: &ash::Device,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        config: &RendererConfig,
        resources: &mut ResourceStack<VkResource>,
    ) -> RendererResult<Self> {
        let vertex_code = load_spirv(&config.vertex_shader)?;
        let fragment_code = load_spirv(&config.fragment_shader)?;

        let vertex_shader = create_shader_module(device, &vertex_code)?;
        let fragment_shader = match create_shader_module(device, &fragment_code) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.destroy_shader_module(vertex_shader, None) };
                return Err(e);
            }
        };

        let result = Self::build(device, render_pass, extent, vertex_shader, fragment_shader, resources);

        // Baked into the pipeline (or useless after a failure) either way
        unsafe {
            device.destroy_shader_module(vertex_shader, None);
            device.destroy_shader_module(fragment_shader, None);
        }

        let pipeline = result?;
        log::info!("Created graphics pipeline");

        Ok(Self {
            render_pass,
            pipeline,
        })
    }

    fn build(
        device: &ash::Device,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        vertex_shader: vk::ShaderModule,
        fragment_shader: vk::ShaderModule,
        resources: &mut ResourceStack<VkResource>,
    ) -> RendererResult<vk::Pipeline> {
        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_shader)
                .name(ENTRY_POINT)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_shader)
                .name(ENTRY_POINT)
                .build(),
        ];

        // Geometry comes from gl_VertexIndex, nothing is bound
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let (viewport, scissor) = full_viewport(extent);
        let viewports = [viewport];
        let scissors = [scissor];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterizer = rasterization_state();

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachments = [color_blend_attachment()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .map_err(RendererError::resource("pipeline layout"))?;
        resources.push(VkResource::PipelineLayout(layout));

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, e)| RendererError::resource("graphics pipeline")(e))?;

        let pipeline = pipelines
            .into_iter()
            .next()
            .ok_or(RendererError::ResourceCreation {
                what: "graphics pipeline",
                result: vk::Result::ERROR_UNKNOWN,
            })?;
        resources.push(VkResource::Pipeline(pipeline));

        Ok(pipeline)
    }
}
