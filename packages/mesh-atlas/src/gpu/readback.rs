//! Copy textures back to CPU memory.

use anyhow::{anyhow, Context, Result};
use half::f16;

/// `bytes_per_row` for a texture-to-buffer copy (multiple of 256).
pub fn padded_bytes_per_row(width: u32, bytes_per_pixel: u32) -> u32 {
    let unpadded = width * bytes_per_pixel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padding = (align - unpadded % align) % align;
    unpadded + padding
}

/// Read a whole single-mip 2D texture and strip the row padding.
pub fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    bytes_per_pixel: u32,
) -> Result<Vec<u8>> {
    let size = texture.size();
    let (width, height) = (size.width, size.height);
    let padded = padded_bytes_per_row(width, bytes_per_pixel);

    let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Buffer"),
        size: (padded * height) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &output_buffer,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        size,
    );
    queue.submit(Some(encoder.finish()));

    let buffer_slice = output_buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
        let _ = tx.send(v);
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .context("Readback callback was dropped")?
        .map_err(|e| anyhow!("Failed to map readback buffer: {}", e))?;

    let row_bytes = (width * bytes_per_pixel) as usize;
    let mut unpadded = Vec::with_capacity(row_bytes * height as usize);
    {
        let data = buffer_slice.get_mapped_range();
        for row in 0..height {
            let start = (row * padded) as usize;
            unpadded.extend_from_slice(&data[start..start + row_bytes]);
        }
    }
    output_buffer.unmap();

    Ok(unpadded)
}

/// Read an `Rgba8Unorm` texture.
pub fn read_rgba8(device: &wgpu::Device, queue: &wgpu::Queue, texture: &wgpu::Texture) -> Result<Vec<u8>> {
    read_texture(device, queue, texture, 4)
}

/// Read a single-channel float texture (`R32Float` or `R16Float`).
pub fn read_float(device: &wgpu::Device, queue: &wgpu::Queue, texture: &wgpu::Texture) -> Result<Vec<f32>> {
    match texture.format() {
        wgpu::TextureFormat::R32Float => {
            let bytes = read_texture(device, queue, texture, 4)?;
            Ok(decode_r32f(&bytes))
        }
        wgpu::TextureFormat::R16Float => {
            let bytes = read_texture(device, queue, texture, 2)?;
            Ok(decode_r16f(&bytes))
        }
        other => Err(anyhow!("Cannot read {:?} as a float texture", other)),
    }
}

fn decode_r32f(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn decode_r16f(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|c| f16::from_bits(u16::from_ne_bytes([c[0], c[1]])).to_f32())
        .collect()
}

/// Map float values to 8-bit grey RGBA using `[min, max]`.
pub fn grey_rgba8(values: &[f32], min: f32, max: f32) -> Vec<u8> {
    let span = (max - min).max(f32::EPSILON);
    values
        .iter()
        .flat_map(|v| {
            let g = (((v - min) / span).clamp(0.0, 1.0) * 255.0).round() as u8;
            [g, g, g, 255]
        })
        .collect()
}
