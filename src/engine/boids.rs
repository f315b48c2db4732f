// Flocking simulation in normalized [0,1]² space
//
// Each frame runs two passes over all agents:
//   velocity pass: previous positions + velocities -> new velocities
//   position pass: previous positions + new velocities -> new positions
// and then swaps front/back buffers. The kernel runs either as WGSL compute
// shaders or as the CPU loops below; both implement the same arithmetic.
//
// Neighbor and occupancy tests are brute force (O(N²) and O(pixels × N)).
// That is fine for N ≤ 256 but would need spatial partitioning to scale.

use glam::Vec2;
use rand::Rng;

use super::gpu::{self, FULLSCREEN_WGSL, GpuContext, GpuError};
use super::input::{InputEvent, PointerState};
use super::Engine;
use crate::config::{Config, FlockBackend};

const KERNEL_WGSL: &str = include_str!("../shaders/flock_kernel.wgsl");
const RASTER_WGSL: &str = include_str!("../shaders/flock_raster.wgsl");

pub const MAX_SPEED: f32 = 0.005;
/// Squared distance below which another agent pushes this one away.
pub const SEPARATION_RADIUS_SQ: f32 = 0.00005;
pub const COHESION_DIVISOR: f32 = 10000.0;
pub const ALIGNMENT_DIVISOR: f32 = 80.0;
pub const SEPARATION_DIVISOR: f32 = 100.0;
pub const EDGE_MARGIN: f32 = 0.1;
pub const EDGE_GAIN: f32 = 0.01;
pub const POINTER_GAIN: f32 = 0.0001;

const WORKGROUP_SIZE: u32 = 64;

/// Uniform rescale so `|v| <= MAX_SPEED`.
pub fn clamp_speed(velocity: Vec2) -> Vec2 {
    let speed = velocity.length();
    if speed > MAX_SPEED {
        velocity / speed * MAX_SPEED
    } else {
        velocity
    }
}

/// Corrective push back toward the interior when within `EDGE_MARGIN` of an edge.
pub fn edge_push(position: Vec2) -> Vec2 {
    let mut push = Vec2::ZERO;
    if position.x < EDGE_MARGIN {
        push.x += (EDGE_MARGIN - position.x) * EDGE_GAIN;
    }
    if position.x > 1.0 - EDGE_MARGIN {
        push.x += (1.0 - EDGE_MARGIN - position.x) * EDGE_GAIN;
    }
    if position.y < EDGE_MARGIN {
        push.y += (EDGE_MARGIN - position.y) * EDGE_GAIN;
    }
    if position.y > 1.0 - EDGE_MARGIN {
        push.y += (1.0 - EDGE_MARGIN - position.y) * EDGE_GAIN;
    }
    push
}

/// Unit vector toward the pointer scaled by `POINTER_GAIN`. An agent sitting
/// exactly on the pointer has no direction, so the term is skipped.
pub fn pointer_pull(position: Vec2, pointer: Vec2) -> Vec2 {
    let to_pointer = pointer - position;
    let distance = to_pointer.length();
    if distance > 0.0 {
        to_pointer / distance * POINTER_GAIN
    } else {
        Vec2::ZERO
    }
}

/// Velocity pass for agent `i`, reading only the previous frame's fields.
pub fn steer(i: usize, positions: &[Vec2], velocities: &[Vec2], pointer: Vec2) -> Vec2 {
    let position = positions[i];
    let velocity = velocities[i];

    let mut sum_position = Vec2::ZERO;
    let mut sum_velocity = Vec2::ZERO;
    let mut repulsion = Vec2::ZERO;
    for (other_position, other_velocity) in positions.iter().zip(velocities) {
        sum_position += *other_position;
        sum_velocity += *other_velocity;
        let diff = *other_position - position;
        if diff.length_squared() < SEPARATION_RADIUS_SQ {
            repulsion -= diff;
        }
    }

    let others = (positions.len() - 1) as f32;
    let mean_position = (sum_position - position) / others;
    let mean_velocity = (sum_velocity - velocity) / others;

    let cohesion = (mean_position - position) / COHESION_DIVISOR;
    let alignment = (mean_velocity - velocity) / ALIGNMENT_DIVISOR;
    let separation = repulsion / SEPARATION_DIVISOR;

    clamp_speed(
        velocity + cohesion + alignment + separation + edge_push(position) + pointer_pull(position, pointer),
    )
}

/// Double-buffered agent fields. `front` holds the last completed frame;
/// `back` is written by the passes and then swapped in.
pub struct FlockFields {
    position_front: Vec<Vec2>,
    position_back: Vec<Vec2>,
    velocity_front: Vec<Vec2>,
    velocity_back: Vec<Vec2>,
}

impl FlockFields {
    pub fn new(positions: Vec<Vec2>, velocities: Vec<Vec2>) -> Self {
        assert_eq!(positions.len(), velocities.len());
        assert!(positions.len() >= 2, "flock needs at least two agents");
        let len = positions.len();
        Self {
            position_front: positions,
            position_back: vec![Vec2::ZERO; len],
            velocity_front: velocities,
            velocity_back: vec![Vec2::ZERO; len],
        }
    }

    /// `width²` agents, positions uniform in [0,1)², velocity components uniform in [-0.5,0.5).
    pub fn seeded(width: u32, rng: &mut impl Rng) -> Self {
        let count = (width * width) as usize;
        let positions = (0..count)
            .map(|_| Vec2::new(rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)))
            .collect();
        let velocities = (0..count)
            .map(|_| Vec2::new(rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5)))
            .collect();
        Self::new(positions, velocities)
    }

    pub fn len(&self) -> usize {
        self.position_front.len()
    }

    pub fn positions(&self) -> &[Vec2] {
        &self.position_front
    }

    pub fn velocities(&self) -> &[Vec2] {
        &self.velocity_front
    }

    pub fn mean_speed(&self) -> f32 {
        self.velocity_front.iter().map(|v| v.length()).sum::<f32>() / self.len() as f32
    }

    /// Both passes plus the swap.
    pub fn step(&mut self, pointer: Vec2) {
        for i in 0..self.len() {
            self.velocity_back[i] = steer(i, &self.position_front, &self.velocity_front, pointer);
        }
        for i in 0..self.len() {
            self.position_back[i] = self.position_front[i] + self.velocity_back[i];
        }
        std::mem::swap(&mut self.velocity_front, &mut self.velocity_back);
        std::mem::swap(&mut self.position_front, &mut self.position_back);
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct FlockParams {
    pointer: [f32; 2],
    count: u32,
    _padding: u32,
}

/// Compute pipelines and the bind groups for both buffer parities.
struct FlockKernel {
    velocity_pipeline: wgpu::ComputePipeline,
    position_pipeline: wgpu::ComputePipeline,
    // [parity]: reads buffers[parity], writes buffers[1 - parity]
    velocity_bind_groups: [wgpu::BindGroup; 2],
    position_bind_groups: [wgpu::BindGroup; 2],
}

struct FlockRenderer {
    params_buffer: wgpu::Buffer,
    positions: [wgpu::Buffer; 2],
    velocities: [wgpu::Buffer; 2],
    /// Index of the buffers holding the last completed frame.
    front: usize,
    kernel: Option<FlockKernel>,
    raster_pipeline: wgpu::RenderPipeline,
    raster_bind_groups: [wgpu::BindGroup; 2],
}

impl FlockRenderer {
    fn new(gpu: &GpuContext, fields: &FlockFields, with_kernel: bool) -> Result<Self, GpuError> {
        use wgpu::util::DeviceExt;

        let params = FlockParams {
            pointer: [0.0, 0.0],
            count: fields.len() as u32,
            _padding: 0,
        };
        let params_buffer = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("flock params buffer"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let field_buffer = |label: &str, data: &[Vec2]| {
            let raw: Vec<[f32; 2]> = data.iter().map(|v| v.to_array()).collect();
            gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&raw),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            })
        };
        let zeros = vec![Vec2::ZERO; fields.len()];
        let positions = [
            field_buffer("flock positions A", fields.positions()),
            field_buffer("flock positions B", &zeros),
        ];
        let velocities = [
            field_buffer("flock velocities A", fields.velocities()),
            field_buffer("flock velocities B", &zeros),
        ];

        let kernel = if with_kernel {
            if !gpu.compute_supported {
                return Err(GpuError::ComputeUnsupported);
            }
            Some(Self::create_kernel(gpu, &params_buffer, &positions, &velocities)?)
        } else {
            None
        };

        let raster_source = format!("{FULLSCREEN_WGSL}\n{RASTER_WGSL}");
        let raster_module = gpu.compile_shader("flock raster shader", &raster_source)?;
        let raster_layout = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("flock raster bind group layout"),
            entries: &[
                gpu::layout_entry(0, wgpu::ShaderStages::FRAGMENT, gpu::uniform_binding()),
                gpu::layout_entry(1, wgpu::ShaderStages::FRAGMENT, gpu::storage_binding(true)),
            ],
        });
        let raster_bind_group = |parity: usize| {
            gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("flock raster bind group"),
                layout: &raster_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: positions[parity].as_entire_binding(),
                    },
                ],
            })
        };
        let raster_bind_groups = [raster_bind_group(0), raster_bind_group(1)];
        let raster_pipeline = gpu.fullscreen_pipeline("flock raster pipeline", &raster_module, &[&raster_layout]);

        Ok(Self {
            params_buffer,
            positions,
            velocities,
            front: 0,
            kernel,
            raster_pipeline,
            raster_bind_groups,
        })
    }

    fn create_kernel(
        gpu: &GpuContext,
        params_buffer: &wgpu::Buffer,
        positions: &[wgpu::Buffer; 2],
        velocities: &[wgpu::Buffer; 2],
    ) -> Result<FlockKernel, GpuError> {
        let module = gpu.compile_shader("flock kernel", KERNEL_WGSL)?;

        let layout = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("flock kernel bind group layout"),
            entries: &[
                gpu::layout_entry(0, wgpu::ShaderStages::COMPUTE, gpu::uniform_binding()),
                gpu::layout_entry(1, wgpu::ShaderStages::COMPUTE, gpu::storage_binding(true)),
                gpu::layout_entry(2, wgpu::ShaderStages::COMPUTE, gpu::storage_binding(true)),
                gpu::layout_entry(3, wgpu::ShaderStages::COMPUTE, gpu::storage_binding(false)),
            ],
        });

        let bind_group = |label: &str, positions_in: &wgpu::Buffer, velocities_in: &wgpu::Buffer, out: &wgpu::Buffer| {
            gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: positions_in.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: velocities_in.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: out.as_entire_binding(),
                    },
                ],
            })
        };

        let velocity_bind_groups = [
            bind_group("velocity pass (A -> B)", &positions[0], &velocities[0], &velocities[1]),
            bind_group("velocity pass (B -> A)", &positions[1], &velocities[1], &velocities[0]),
        ];
        // The position pass consumes the velocities the velocity pass just wrote.
        let position_bind_groups = [
            bind_group("position pass (A -> B)", &positions[0], &velocities[1], &positions[1]),
            bind_group("position pass (B -> A)", &positions[1], &velocities[0], &positions[0]),
        ];

        let pipeline_layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("flock kernel pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = |label: &str, entry_point: &str| {
            gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(entry_point),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
        };

        Ok(FlockKernel {
            velocity_pipeline: pipeline("flock velocity pipeline", "velocity_pass"),
            position_pipeline: pipeline("flock position pipeline", "position_pass"),
            velocity_bind_groups,
            position_bind_groups,
        })
    }

    fn write_params(&self, queue: &wgpu::Queue, pointer: Vec2, count: u32) {
        let params = FlockParams {
            pointer: pointer.to_array(),
            count,
            _padding: 0,
        };
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));
    }

    /// Upload CPU-stepped positions into the front buffer for the raster pass.
    fn upload_positions(&self, queue: &wgpu::Queue, positions: &[Vec2]) {
        let raw: Vec<[f32; 2]> = positions.iter().map(|v| v.to_array()).collect();
        queue.write_buffer(&self.positions[self.front], 0, bytemuck::cast_slice(&raw));
    }

    /// Velocity pass, position pass, swap. Each pass is its own compute pass so
    /// the second never observes a partially written velocity buffer.
    fn dispatch(&mut self, gpu: &GpuContext, count: u32) {
        let Some(kernel) = &self.kernel else { return };
        let workgroups = count.div_ceil(WORKGROUP_SIZE);
        let parity = self.front;

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("flock kernel encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("flock velocity pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.velocity_pipeline);
            pass.set_bind_group(0, &kernel.velocity_bind_groups[parity], &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("flock position pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.position_pipeline);
            pass.set_bind_group(0, &kernel.position_bind_groups[parity], &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));

        self.front = 1 - parity;
    }

    fn destroy(self) {
        self.params_buffer.destroy();
        for buffer in self.positions.iter().chain(self.velocities.iter()) {
            buffer.destroy();
        }
    }
}

pub struct FlockEngine {
    /// Present only for the CPU backend; the GPU backend keeps its state in buffers.
    fields: Option<FlockFields>,
    count: u32,
    backend: FlockBackend,
    pointer: PointerState,
    renderer: Option<FlockRenderer>,
}

impl FlockEngine {
    pub fn new(gpu: &GpuContext, config: &Config) -> Result<Self, GpuError> {
        let fields = FlockFields::seeded(config.flock_width, &mut config.rng());
        let count = fields.len() as u32;
        let renderer = FlockRenderer::new(gpu, &fields, config.flock_backend == FlockBackend::Gpu)?;
        log::info!("Flock: {count} agents on {:?} backend", config.flock_backend);

        Ok(Self {
            fields: (config.flock_backend == FlockBackend::Cpu).then_some(fields),
            count,
            backend: config.flock_backend,
            pointer: PointerState::new(gpu.size.width, gpu.size.height),
            renderer: Some(renderer),
        })
    }

    /// Pointer in flock space; (0,0) until the pointer is first seen.
    fn pointer_target(&self) -> Vec2 {
        self.pointer.normalized().unwrap_or(Vec2::ZERO)
    }
}

impl Engine for FlockEngine {
    fn name(&self) -> &'static str {
        "boids"
    }

    fn handle_input(&mut self, event: &InputEvent) {
        self.pointer.record(event);
    }

    fn update(&mut self, gpu: &GpuContext, _dt: f32) {
        let pointer = self.pointer_target();
        let Some(renderer) = self.renderer.as_mut() else { return };
        renderer.write_params(&gpu.queue, pointer, self.count);

        match self.fields.as_mut() {
            Some(fields) => {
                fields.step(pointer);
                renderer.upload_positions(&gpu.queue, fields.positions());
            }
            None => renderer.dispatch(gpu, self.count),
        }
    }

    fn render(&mut self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        if let Some(renderer) = &self.renderer {
            gpu::draw_fullscreen(
                encoder,
                view,
                "flock raster pass",
                &renderer.raster_pipeline,
                &renderer.raster_bind_groups[renderer.front],
            );
        }
    }

    fn stats(&self) -> Vec<String> {
        let pointer = self.pointer_target();
        let mut lines = vec![
            format!("Agents: {}", self.count),
            format!("Backend: {:?}", self.backend),
            format!("Pointer: ({:.3}, {:.3})", pointer.x, pointer.y),
        ];
        if let Some(fields) = &self.fields {
            lines.push(format!("Mean speed: {:.5}", fields.mean_speed()));
        }
        lines
    }

    fn release(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            renderer.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn within_limit(v: Vec2) -> bool {
        v.length() <= MAX_SPEED * (1.0 + 1e-5)
    }

    #[test]
    fn velocities_stay_clamped() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut fields = FlockFields::seeded(16, &mut rng);
        assert!(fields.velocities().iter().any(|v| !within_limit(*v)));
        for frame in 0..200 {
            let pointer = Vec2::new(rng.gen_range(-0.5..1.5), rng.gen_range(-0.5..1.5));
            fields.step(pointer);
            for v in fields.velocities() {
                assert!(within_limit(*v), "frame {frame}: |v| = {}", v.length());
            }
        }
    }

    #[test]
    fn position_pass_uses_new_velocity() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut fields = FlockFields::seeded(4, &mut rng);
        let before: Vec<Vec2> = fields.positions().to_vec();
        fields.step(Vec2::new(0.5, 0.5));
        for ((after, before), v) in fields.positions().iter().zip(&before).zip(fields.velocities()) {
            assert!((*after - (*before + *v)).length() < 1e-7);
        }
    }

    #[test]
    fn update_is_independent_of_agent_order() {
        let mut rng = StdRng::seed_from_u64(5);
        let seeded = FlockFields::seeded(4, &mut rng);
        let positions = seeded.positions().to_vec();
        let velocities = seeded.velocities().to_vec();

        let mut forward = FlockFields::new(positions.clone(), velocities.clone());
        let mut reversed = FlockFields::new(
            positions.iter().rev().copied().collect(),
            velocities.iter().rev().copied().collect(),
        );
        let pointer = Vec2::new(0.3, 0.7);
        forward.step(pointer);
        reversed.step(pointer);

        let n = positions.len();
        for i in 0..n {
            let a = forward.positions()[i];
            let b = reversed.positions()[n - 1 - i];
            assert!((a - b).length() < 1e-6, "agent {i}: {a} vs {b}");
        }
    }

    #[test]
    fn pointer_pull_is_unit_scaled_and_guarded() {
        let pull = pointer_pull(Vec2::new(0.2, 0.2), Vec2::new(0.8, 0.2));
        assert!((pull - Vec2::new(POINTER_GAIN, 0.0)).length() < 1e-9);
        assert_eq!(pointer_pull(Vec2::splat(0.4), Vec2::splat(0.4)), Vec2::ZERO);
    }

    #[test]
    fn agent_on_pointer_stays_finite() {
        let positions = vec![Vec2::splat(0.5), Vec2::new(0.2, 0.3), Vec2::new(0.7, 0.6)];
        let velocities = vec![Vec2::ZERO; 3];
        let v = steer(0, &positions, &velocities, Vec2::splat(0.5));
        assert!(v.is_finite());
    }

    #[test]
    fn edge_push_points_inward() {
        assert_eq!(edge_push(Vec2::splat(0.5)), Vec2::ZERO);
        let low = edge_push(Vec2::new(0.0, 0.05));
        assert!(low.x > 0.0 && low.y > 0.0);
        let high = edge_push(Vec2::new(1.0, 0.95));
        assert!(high.x < 0.0 && high.y < 0.0);
        assert!((low.x - 0.1 * EDGE_GAIN).abs() < 1e-9);
    }

    #[test]
    fn close_agents_repel() {
        let positions = vec![Vec2::new(0.5, 0.5), Vec2::new(0.501, 0.5), Vec2::new(0.5, 0.2), Vec2::new(0.5, 0.8)];
        let velocities = vec![Vec2::ZERO; 4];
        let v = steer(0, &positions, &velocities, Vec2::new(0.5, 0.5));
        assert!(v.x < 0.0, "expected push away from the neighbor on +x, got {v}");
    }

    #[test]
    fn raster_shader_validates_with_occupancy_radius() {
        let source = format!("{FULLSCREEN_WGSL}\n{RASTER_WGSL}");
        let module = gpu::validate_wgsl("flock raster", &source);
        assert_eq!(gpu::wgsl_f32_constant(&module, "OCCUPANCY_RADIUS_SQ"), Some(0.000001));
        assert!(module.entry_points.iter().any(|ep| ep.name == "fs_main"));
    }

    #[test]
    fn kernel_shader_matches_cpu_constants() {
        let module = gpu::validate_wgsl("flock kernel", KERNEL_WGSL);
        for (name, value) in [
            ("MAX_SPEED", MAX_SPEED),
            ("SEPARATION_RADIUS_SQ", SEPARATION_RADIUS_SQ),
            ("POINTER_GAIN", POINTER_GAIN),
        ] {
            assert_eq!(gpu::wgsl_f32_constant(&module, name), Some(value), "{name}");
        }
        let entry_points: Vec<&str> = module.entry_points.iter().map(|ep| ep.name.as_str()).collect();
        assert!(entry_points.contains(&"velocity_pass"));
        assert!(entry_points.contains(&"position_pass"));
    }

    #[test]
    fn clamp_leaves_slow_velocity_untouched() {
        let slow = Vec2::new(0.001, -0.002);
        assert_eq!(clamp_speed(slow), slow);
        let fast = clamp_speed(Vec2::new(3.0, 4.0));
        assert!((fast - Vec2::new(0.003, 0.004)).length() < 1e-7);
    }
}
