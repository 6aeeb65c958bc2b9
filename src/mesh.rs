// mesh.rs: CPU-side geometry for panorama spheres, sprite quads and marker lines

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

/// UV sphere meant to be seen from the inside. The x axis is mirrored so an
/// equirectangular image reads the right way round from the centre.
pub fn build_sphere(radius: f32, lat: usize, lon: usize) -> MeshData {
    let mut vertices = Vec::with_capacity((lat + 1) * (lon + 1));
    let mut indices = Vec::with_capacity(lat * lon * 6);

    for i in 0..=lat {
        let theta = std::f32::consts::PI * (i as f32) / (lat as f32);
        let y = radius * theta.cos();
        let sin_t = theta.sin();

        for j in 0..=lon {
            let phi = 2.0 * std::f32::consts::PI * (j as f32) / (lon as f32);

            vertices.push(Vertex {
                position: [radius * phi.cos() * sin_t, y, radius * phi.sin() * sin_t],
                // texture rows run top to bottom in wgpu
                uv: [(j as f32) / (lon as f32), (i as f32) / (lat as f32)],
            });
        }
    }

    for i in 0..lat {
        for j in 0..lon {
            let a = (i * (lon + 1) + j) as u32;
            let b = a + (lon + 1) as u32;
            indices.extend_from_slice(&[a, b, a + 1, b, b + 1, a + 1]);
        }
    }

    MeshData { vertices, indices }
}

/// Unit quad centred on the origin in the XY plane.
pub fn build_quad() -> MeshData {
    let v = |x: f32, y: f32, u: f32, w: f32| Vertex {
        position: [x, y, 0.0],
        uv: [u, w],
    };
    MeshData {
        vertices: vec![
            v(-0.5, -0.5, 0.0, 1.0),
            v(0.5, -0.5, 1.0, 1.0),
            v(0.5, 0.5, 1.0, 0.0),
            v(-0.5, 0.5, 0.0, 0.0),
        ],
        indices: vec![0, 1, 2, 0, 2, 3],
    }
}

pub fn build_line(from: [f32; 3], to: [f32; 3]) -> [Vertex; 2] {
    [
        Vertex { position: from, uv: [0.0, 0.0] },
        Vertex { position: to, uv: [0.0, 0.0] },
    ]
}
