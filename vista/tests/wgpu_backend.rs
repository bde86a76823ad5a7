use std::sync::Arc;

use anyhow::Context;
use vista::{
    backend::{encode_commands, CommandBuffer, GpuBackend, WgpuBackend},
    managers::{MaterialBufferManager, MaterialBufferSlot, MaterialUploadContext, NoResourceListener},
    options::MaterialBufferOptions,
    types::{
        ElementSource, MaterialBlueprint, MaterialHandle, MaterialProperties, MaterialPropertyValue,
        UniformBufferElement, UniformBufferLayout, ValueType,
    },
};

/// Returns `None` on machines without any adapter.
async fn device() -> anyhow::Result<Option<(Arc<wgpu::Device>, Arc<wgpu::Queue>)>> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let Some(adapter) = instance.request_adapter(&wgpu::RequestAdapterOptions::default()).await else {
        return Ok(None);
    };
    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("vista test device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
            },
            None,
        )
        .await
        .context("Device creation failed")?;
    Ok(Some((Arc::new(device), Arc::new(queue))))
}

fn blueprint() -> MaterialBlueprint {
    MaterialBlueprint {
        properties: MaterialProperties::new(),
        uniform_buffer: UniformBufferLayout::packed(
            vec![UniformBufferElement::new(
                ValueType::Float4,
                ElementSource::Static(MaterialPropertyValue::Float4(glam::Vec4::ONE)),
            )],
            16,
        ),
    }
}

#[test]
fn pools_upload_and_bind() -> anyhow::Result<()> {
    let Some((device, queue)) = pollster::block_on(device())? else {
        return Ok(());
    };
    let backend = WgpuBackend::new(device.clone(), queue.clone());
    assert!(backend.max_uniform_buffer_size() >= 16 * 1024);

    let mut manager = MaterialBufferManager::new(&backend, blueprint(), &MaterialBufferOptions::default())?;
    let mut slots: Vec<_> = (0..4).map(|i| MaterialBufferSlot::new(MaterialHandle::new(i))).collect();
    for slot in &mut slots {
        manager.request_slot(&backend, slot);
    }
    assert_eq!(manager.pool_count(), 1);

    let materials: Vec<MaterialProperties> = Vec::new();
    let globals = MaterialProperties::new();
    manager.reset_last_bound_pool(
        &backend,
        &mut MaterialUploadContext {
            materials: &materials,
            global_properties: &globals,
            listener: &mut NoResourceListener,
        },
    );
    assert_eq!(manager.dirty_slot_count(), 0);

    let mut commands = CommandBuffer::new();
    for slot in &slots {
        manager.fill_command_buffer(slot, &mut commands);
    }
    assert_eq!(commands.len(), 1);

    let target = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("target"),
        size: wgpu::Extent3d {
            width: 4,
            height: 4,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    {
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("material binds"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        encode_commands(&commands, &mut rpass);
    }
    queue.submit(Some(encoder.finish()));
    device.poll(wgpu::Maintain::Wait);

    Ok(())
}
