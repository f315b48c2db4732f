// Conway's Game of Life on a toroidal grid
//
// The grid is double-buffered: a generation reads every cell of the current
// buffer and writes the scratch buffer, then the two are swapped. Grid row 0
// is the bottom of the screen, matching the texture the renderer samples.

use rand::Rng;
use rand::rngs::StdRng;

use super::gpu::{self, FULLSCREEN_WGSL, GpuContext, GpuError};
use super::input::{InputEvent, PointerState};
use super::Engine;
use crate::config::Config;

const LIFE_WGSL: &str = include_str!("../shaders/life.wgsl");

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::NoUninit)]
pub enum Cell {
    Dead = 0,
    Alive = 255,
}

/// Conway rule: survive on 2 or 3, birth on exactly 3.
pub fn next_state(cell: Cell, live_neighbors: u8) -> Cell {
    match (cell, live_neighbors) {
        (Cell::Alive, 2 | 3) => Cell::Alive,
        (Cell::Alive, _) => Cell::Dead,
        (Cell::Dead, 3) => Cell::Alive,
        (Cell::Dead, _) => Cell::Dead,
    }
}

pub struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
    scratch: Vec<Cell>,
}

impl Grid {
    /// All-dead grid. Dimensions are clamped to at least 1×1.
    pub fn new(rows: usize, cols: usize) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        Self {
            rows,
            cols,
            cells: vec![Cell::Dead; rows * cols],
            scratch: vec![Cell::Dead; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Row-major index with toroidal wrap on both axes.
    fn index(&self, row: i64, col: i64) -> usize {
        let r = row.rem_euclid(self.rows as i64) as usize;
        let c = col.rem_euclid(self.cols as i64) as usize;
        r * self.cols + c
    }

    pub fn get(&self, row: i64, col: i64) -> Cell {
        self.cells[self.index(row, col)]
    }

    pub fn set(&mut self, row: i64, col: i64, cell: Cell) {
        let i = self.index(row, col);
        self.cells[i] = cell;
    }

    pub fn live_neighbors(&self, row: i64, col: i64) -> u8 {
        let mut count = 0;
        for dr in -1..=1 {
            for dc in -1..=1 {
                if (dr, dc) != (0, 0) && self.get(row + dr, col + dc) == Cell::Alive {
                    count += 1;
                }
            }
        }
        count
    }

    pub fn live_count(&self) -> usize {
        self.cells.iter().filter(|c| **c == Cell::Alive).count()
    }

    /// One generation over the whole grid.
    pub fn step(&mut self) {
        for row in 0..self.rows {
            for col in 0..self.cols {
                let (r, c) = (row as i64, col as i64);
                let i = row * self.cols + col;
                self.scratch[i] = next_state(self.cells[i], self.live_neighbors(r, c));
            }
        }
        std::mem::swap(&mut self.cells, &mut self.scratch);
    }

    /// Independently randomize every cell within Euclidean `radius` of `center`
    /// (row, col), alive with probability 0.5. The disc wraps around edges.
    pub fn randomize_disc(&mut self, center: (i64, i64), radius: i32, rng: &mut impl Rng) {
        let radius = radius.max(0) as i64;
        for i in -radius..=radius {
            for j in -radius..=radius {
                if i * i + j * j <= radius * radius {
                    let cell = if rng.gen_bool(0.5) { Cell::Alive } else { Cell::Dead };
                    self.set(center.0 + j, center.1 + i, cell);
                }
            }
        }
    }

    /// Cell states as texel bytes (0 or 255), row-major from the bottom row.
    pub fn texels(&self) -> &[u8] {
        bytemuck::cast_slice(&self.cells)
    }
}

/// Grid resolution for a viewport: rows follow the width, columns keep the aspect.
pub fn grid_dims(width: u32, height: u32, cell_px: f32) -> (usize, usize) {
    let width = width.max(1) as f32;
    let height = height.max(1) as f32;
    let rows = (width / cell_px.max(f32::EPSILON)).round().max(1.0);
    let cols = (rows * width / height).round().max(1.0);
    (rows as usize, cols as usize)
}

/// Simulation half of the engine: grid, timing accumulator, brush.
pub struct LifeSim {
    grid: Grid,
    pointer: PointerState,
    interval: f32,
    elapsed: f32,
    generation: u64,
    brush_radius: i32,
    rng: StdRng,
    dirty: bool,
}

impl LifeSim {
    pub fn new(
        grid: Grid,
        viewport: (u32, u32),
        interval: f32,
        brush_radius: i32,
        rng: StdRng,
    ) -> Self {
        Self {
            grid,
            pointer: PointerState::new(viewport.0, viewport.1),
            interval,
            elapsed: 0.0,
            generation: 0,
            brush_radius,
            rng,
            dirty: true,
        }
    }

    /// Fresh grid with a random disc of `seed_radius` at its center.
    pub fn seeded(
        rows: usize,
        cols: usize,
        seed_radius: i32,
        viewport: (u32, u32),
        interval: f32,
        brush_radius: i32,
        mut rng: StdRng,
    ) -> Self {
        let mut grid = Grid::new(rows, cols);
        let center = ((grid.rows() / 2) as i64, (grid.cols() / 2) as i64);
        grid.randomize_disc(center, seed_radius, &mut rng);
        Self::new(grid, viewport, interval, brush_radius, rng)
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_painting(&self) -> bool {
        self.pointer.primary_held
    }

    pub fn handle_input(&mut self, event: &InputEvent) {
        self.pointer.record(event);
    }

    /// Grid cell (row, col) under the pointer, if it has been seen.
    pub fn brush_center(&self) -> Option<(i64, i64)> {
        let uv = self.pointer.normalized()?;
        let col = (uv.x * self.grid.cols() as f32).floor() as i64;
        let row = (uv.y * self.grid.rows() as f32).floor() as i64;
        Some((row, col))
    }

    /// Paint (every frame while held), then apply at most one generation when
    /// the accumulator passes the interval. Returns true if the grid changed.
    pub fn advance(&mut self, dt: f32) -> bool {
        if self.pointer.primary_held {
            if let Some(center) = self.brush_center() {
                self.grid.randomize_disc(center, self.brush_radius, &mut self.rng);
                self.dirty = true;
            }
        }

        self.elapsed += dt;
        if self.elapsed > self.interval {
            self.grid.step();
            self.generation += 1;
            self.elapsed = 0.0;
            self.dirty = true;
        }

        std::mem::take(&mut self.dirty)
    }
}

struct LifeRenderer {
    texture: wgpu::Texture,
    extent: wgpu::Extent3d,
    bind_group: wgpu::BindGroup,
    pipeline: wgpu::RenderPipeline,
}

impl LifeRenderer {
    fn new(gpu: &GpuContext, rows: u32, cols: u32) -> Result<Self, GpuError> {
        let source = format!("{FULLSCREEN_WGSL}\n{LIFE_WGSL}");
        let module = gpu.compile_shader("life shader", &source)?;

        let extent = wgpu::Extent3d {
            width: cols,
            height: rows,
            depth_or_array_layers: 1,
        };
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("life cells texture"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("life cells sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let layout = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("life bind group layout"),
            entries: &[
                gpu::layout_entry(
                    0,
                    wgpu::ShaderStages::FRAGMENT,
                    wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                ),
                gpu::layout_entry(
                    1,
                    wgpu::ShaderStages::FRAGMENT,
                    wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                ),
            ],
        });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("life bind group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        let pipeline = gpu.fullscreen_pipeline("life pipeline", &module, &[&layout]);

        Ok(Self {
            texture,
            extent,
            bind_group,
            pipeline,
        })
    }

    fn upload(&self, queue: &wgpu::Queue, grid: &Grid) {
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            grid.texels(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(self.extent.width),
                rows_per_image: Some(self.extent.height),
            },
            self.extent,
        );
    }
}

pub struct LifeEngine {
    sim: LifeSim,
    renderer: Option<LifeRenderer>,
}

impl LifeEngine {
    pub fn new(gpu: &GpuContext, config: &Config) -> Result<Self, GpuError> {
        let (width, height) = (gpu.size.width, gpu.size.height);
        let (rows, cols) = grid_dims(width, height, config.cell_px);
        let max_side = gpu.device.limits().max_texture_dimension_2d as usize;
        let (rows, cols) = (rows.min(max_side), cols.min(max_side));
        log::info!("Life grid: {rows} rows x {cols} cols");

        let sim = LifeSim::seeded(
            rows,
            cols,
            config.seed_radius,
            (width, height),
            config.tick_ms as f32 / 1000.0,
            config.brush_radius,
            config.rng(),
        );
        let renderer = LifeRenderer::new(gpu, rows as u32, cols as u32)?;
        renderer.upload(&gpu.queue, sim.grid());

        Ok(Self {
            sim,
            renderer: Some(renderer),
        })
    }
}

impl Engine for LifeEngine {
    fn name(&self) -> &'static str {
        "life"
    }

    fn handle_input(&mut self, event: &InputEvent) {
        self.sim.handle_input(event);
    }

    fn update(&mut self, gpu: &GpuContext, dt: f32) {
        if self.sim.advance(dt) {
            if let Some(renderer) = &self.renderer {
                renderer.upload(&gpu.queue, self.sim.grid());
            }
        }
    }

    fn render(&mut self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        if let Some(renderer) = &self.renderer {
            gpu::draw_fullscreen(encoder, view, "life pass", &renderer.pipeline, &renderer.bind_group);
        }
    }

    fn stats(&self) -> Vec<String> {
        let grid = self.sim.grid();
        vec![
            format!("Grid: {} x {}", grid.rows(), grid.cols()),
            format!("Generation: {}", self.sim.generation()),
            format!("Live cells: {}", grid.live_count()),
            format!("Painting: {}", if self.sim.is_painting() { "yes" } else { "no" }),
        ]
    }

    fn release(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            renderer.texture.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::input::PointerButton;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn sim_with(grid: Grid) -> LifeSim {
        LifeSim::new(grid, (100, 100), 0.03, 2, rng())
    }

    #[test]
    fn conway_rule_on_three_by_three_torus() {
        // On a 3x3 torus every other cell is a neighbor exactly once.
        for target in 0..9usize {
            for alive_neighbors in 0..=8usize {
                for state in [Cell::Dead, Cell::Alive] {
                    let mut grid = Grid::new(3, 3);
                    let (tr, tc) = ((target / 3) as i64, (target % 3) as i64);
                    grid.set(tr, tc, state);
                    let others: Vec<usize> = (0..9).filter(|i| *i != target).collect();
                    for &i in others.iter().take(alive_neighbors) {
                        grid.set((i / 3) as i64, (i % 3) as i64, Cell::Alive);
                    }
                    assert_eq!(grid.live_neighbors(tr, tc) as usize, alive_neighbors);

                    grid.step();
                    let expected = match (state, alive_neighbors) {
                        (Cell::Alive, 2 | 3) => Cell::Alive,
                        (Cell::Dead, 3) => Cell::Alive,
                        _ => Cell::Dead,
                    };
                    assert_eq!(
                        grid.get(tr, tc),
                        expected,
                        "cell {target} state {state:?} with {alive_neighbors} neighbors"
                    );
                }
            }
        }
    }

    #[test]
    fn corner_sees_opposite_corner() {
        let mut grid = Grid::new(5, 7);
        grid.set(0, 0, Cell::Alive);
        grid.set(4, 6, Cell::Alive);
        assert_eq!(grid.live_neighbors(0, 0), 1);
        assert_eq!(grid.live_neighbors(4, 6), 1);
    }

    #[test]
    fn step_is_total_for_small_grids() {
        let mut rng = rng();
        for rows in 1..=4 {
            for cols in 1..=4 {
                let mut grid = Grid::new(rows, cols);
                grid.randomize_disc((0, 0), 3, &mut rng);
                grid.step();
                assert_eq!((grid.rows(), grid.cols()), (rows, cols));
                assert_eq!(grid.texels().len(), rows * cols);
            }
        }
    }

    #[test]
    fn generation_reads_previous_state_only() {
        // Blinker: horizontal bar becomes vertical, which in-place updates would break.
        let mut grid = Grid::new(5, 5);
        for c in 1..=3 {
            grid.set(2, c, Cell::Alive);
        }
        grid.step();
        for r in 0..5 {
            for c in 0..5 {
                let expected = if c == 2 && (1..=3).contains(&r) { Cell::Alive } else { Cell::Dead };
                assert_eq!(grid.get(r, c), expected, "({r},{c})");
            }
        }
    }

    #[test]
    fn seed_stays_inside_radius() {
        let sim = LifeSim::seeded(40, 60, 5, (100, 100), 0.03, 10, rng());
        let grid = sim.grid();
        let (cr, cc) = (20i64, 30i64);
        let mut alive = 0;
        for r in 0..40i64 {
            for c in 0..60i64 {
                if grid.get(r, c) == Cell::Alive {
                    alive += 1;
                    assert!((r - cr).pow(2) + (c - cc).pow(2) <= 25);
                }
            }
        }
        assert!(alive > 0);
    }

    #[test]
    fn generation_waits_for_interval() {
        let mut sim = sim_with(Grid::new(8, 8));
        sim.advance(0.0);
        assert!(!sim.advance(0.02));
        assert_eq!(sim.generation(), 0);
        assert!(sim.advance(0.02));
        assert_eq!(sim.generation(), 1);
        // accumulator was reset, not carried over
        assert!(!sim.advance(0.02));
        assert_eq!(sim.generation(), 1);
    }

    #[test]
    fn brush_paints_only_while_held() {
        let mut sim = sim_with(Grid::new(50, 50));
        sim.advance(0.0);
        sim.handle_input(&InputEvent::PointerMove { x: 50.0, y: 50.0 });
        assert!(!sim.advance(0.001));
        assert_eq!(sim.grid().live_count(), 0);

        sim.handle_input(&InputEvent::PointerDown { button: PointerButton::Primary, x: 50.0, y: 50.0 });
        for _ in 0..4 {
            assert!(sim.advance(0.001));
        }
        assert!(sim.grid().live_count() > 0);
        assert!(sim.is_painting());

        sim.handle_input(&InputEvent::PointerLeave);
        assert!(!sim.is_painting());
        assert!(!sim.advance(0.001));
    }

    #[test]
    fn brush_center_maps_bottom_left_origin() {
        let mut sim = sim_with(Grid::new(10, 20));
        sim.handle_input(&InputEvent::PointerMove { x: 0.0, y: 99.0 });
        assert_eq!(sim.brush_center(), Some((0, 0)));
        sim.handle_input(&InputEvent::PointerMove { x: 99.0, y: 0.0 });
        assert_eq!(sim.brush_center(), Some((10, 19)));
    }

    #[test]
    fn life_shader_validates() {
        let source = format!("{FULLSCREEN_WGSL}\n{LIFE_WGSL}");
        let module = gpu::validate_wgsl("life", &source);
        assert!(module.entry_points.iter().any(|ep| ep.name == "fs_main"));
    }

    #[test]
    fn grid_dims_follow_viewport() {
        assert_eq!(grid_dims(1400, 700, 3.5), (400, 800));
        assert_eq!(grid_dims(0, 0, 3.5), (1, 1));
    }
}
