//! The animated water demo.
//!
//! [`WavesScene`] steps a [`HeightField`] every frame, drops random "rain"
//! disturbances onto it, and streams the resulting surface into the acquired
//! frame slot's dynamic vertex buffer.
//!
//! Object and material constants only change occasionally, so each carries a
//! dirty counter set to the number of frames in flight whenever it changes.
//! Every rendered frame uploads the dirty ones and decrements their counters,
//! so each slot in the ring receives the new values exactly once.

use std::ops::RangeInclusive;

use glam::{Mat4, Vec2, Vec3, Vec4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace};

use waves_core::config::{DemoConfig, RainConfig};
use waves_rhi::command::{DrawIndexed, VertexSource};
use waves_sim::{HeightField, WaveVertex, grid_indices};

use crate::camera::OrbitCamera;
use crate::constants::{Light, MaterialConstants, ObjectConstants, PassConstants};
use crate::error::RenderResult;
use crate::frame_resource::{SlotLayout, SlotWriter};
use crate::scene::{FrameTime, InputEvent, MouseButton, Scene};

/// Margin kept between raindrops and the grid edge on large grids.
const RAIN_MARGIN: usize = 4;

/// Texture scroll speed of the water material, in UV units per second.
const WATER_SCROLL: Vec2 = Vec2::new(0.1, 0.02);

/// Pixels of zoom drag one scroll line stands for.
const SCROLL_LINE_PIXELS: f32 = 20.0;

/// A material and how many frame slots still hold stale constants for it.
#[derive(Clone, Debug)]
struct Material {
    constants: MaterialConstants,
    frames_dirty: usize,
}

/// A drawable piece of geometry with its own object constants.
#[derive(Clone, Debug)]
struct RenderItem {
    world: Mat4,
    tex_transform: Mat4,
    object_index: usize,
    material_index: usize,
    vertices: VertexSource,
    index_count: u32,
    start_index: u32,
    base_vertex: i32,
    frames_dirty: usize,
}

impl RenderItem {
    fn draw(&self) -> DrawIndexed {
        DrawIndexed {
            vertices: self.vertices,
            index_count: self.index_count,
            start_index: self.start_index,
            base_vertex: self.base_vertex,
            object_index: self.object_index as u32,
            material_index: self.material_index as u32,
        }
    }
}

/// Water surface driven by a height-field simulation.
pub struct WavesScene {
    waves: HeightField,
    rain: RainConfig,
    rng: StdRng,
    rain_elapsed: f32,
    drops: u64,
    camera: OrbitCamera,
    viewport: (u32, u32),
    frames_in_flight: usize,
    materials: Vec<Material>,
    items: Vec<RenderItem>,
    water_offset: Vec2,
    pass: PassConstants,
    indices: Vec<u32>,
    vertices: Vec<WaveVertex>,
}

impl WavesScene {
    /// Builds the scene from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the wave parameters are invalid.
    pub fn new(config: &DemoConfig) -> RenderResult<Self> {
        let w = &config.waves;
        let waves = HeightField::new(w.rows, w.cols, w.spatial_step, w.time_step, w.speed, w.damping)?;

        let indices = grid_indices(waves.row_count(), waves.column_count());
        let vertices = vec![WaveVertex::default(); waves.vertex_count()];
        let frames_in_flight = config.frames.frames_in_flight;

        let water = Material {
            constants: MaterialConstants {
                diffuse_albedo: Vec4::new(1.0, 1.0, 1.0, 0.5),
                fresnel_r0: Vec3::splat(0.1),
                roughness: 0.0,
                mat_transform: Mat4::IDENTITY,
            },
            frames_dirty: frames_in_flight,
        };

        let water_item = RenderItem {
            world: Mat4::IDENTITY,
            tex_transform: Mat4::from_scale(Vec3::new(5.0, 5.0, 1.0)),
            object_index: 0,
            material_index: 0,
            vertices: VertexSource::FrameDynamic,
            index_count: indices.len() as u32,
            start_index: 0,
            base_vertex: 0,
            frames_dirty: frames_in_flight,
        };

        let (width, height) = (config.run.width, config.run.height);
        let camera = OrbitCamera::new(width as f32 / height.max(1) as f32);

        info!(
            "Waves scene: {}x{} grid, {} triangles, rain every {}s",
            waves.row_count(),
            waves.column_count(),
            waves.triangle_count(),
            config.rain.interval
        );

        Ok(Self {
            waves,
            rain: config.rain.clone(),
            rng: StdRng::seed_from_u64(config.rain.seed),
            rain_elapsed: 0.0,
            drops: 0,
            camera,
            viewport: (width, height),
            frames_in_flight,
            materials: vec![water],
            items: vec![water_item],
            water_offset: Vec2::ZERO,
            pass: PassConstants::default(),
            indices,
            vertices,
        })
    }

    /// The simulated surface.
    pub fn waves(&self) -> &HeightField {
        &self.waves
    }

    /// Static index buffer contents for the wave grid.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Raindrops applied so far.
    pub fn drops(&self) -> u64 {
        self.drops
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    /// Rows and columns a raindrop may land on, if the grid has room.
    fn rain_range(extent: usize) -> Option<RangeInclusive<usize>> {
        if extent >= 2 * RAIN_MARGIN + 1 {
            Some(RAIN_MARGIN..=extent - RAIN_MARGIN - 1)
        } else if extent >= 5 {
            Some(2..=extent - 3)
        } else {
            None
        }
    }

    fn update_rain(&mut self, delta: f32) {
        self.rain_elapsed += delta;
        if self.rain_elapsed < self.rain.interval {
            return;
        }
        self.rain_elapsed -= self.rain.interval;

        let (Some(rows), Some(cols)) = (
            Self::rain_range(self.waves.row_count()),
            Self::rain_range(self.waves.column_count()),
        ) else {
            return;
        };

        let i = self.rng.gen_range(rows);
        let j = self.rng.gen_range(cols);
        let magnitude = if self.rain.max_magnitude > self.rain.min_magnitude {
            self.rng
                .gen_range(self.rain.min_magnitude..self.rain.max_magnitude)
        } else {
            self.rain.min_magnitude
        };

        self.waves.disturb(i, j, magnitude);
        self.drops += 1;
        trace!("Raindrop at ({}, {}) with magnitude {:.3}", i, j, magnitude);
    }

    fn animate_water(&mut self, delta: f32) {
        self.water_offset += WATER_SCROLL * delta;
        if self.water_offset.x >= 1.0 {
            self.water_offset.x -= 1.0;
        }
        if self.water_offset.y >= 1.0 {
            self.water_offset.y -= 1.0;
        }

        let water = &mut self.materials[0];
        water.constants.mat_transform = Mat4::from_translation(self.water_offset.extend(0.0));
        water.frames_dirty = self.frames_in_flight;
    }

    fn update_pass(&mut self, time: &FrameTime) {
        let (width, height) = self.viewport;
        let size = Vec2::new(width as f32, height as f32);

        let pass = &mut self.pass;
        pass.set_camera(
            self.camera.view_matrix(),
            self.camera.projection_matrix(),
            self.camera.position(),
        );
        pass.render_target_size = size;
        pass.inv_render_target_size = size.recip();
        pass.near_z = self.camera.near();
        pass.far_z = self.camera.far();
        pass.total_time = time.total;
        pass.delta_time = time.delta;
        pass.ambient_light = Vec4::new(0.25, 0.25, 0.35, 1.0);
        pass.lights[0] = Light::directional(
            Vec3::new(0.57735, -0.57735, 0.57735),
            Vec3::splat(0.6),
        );
        pass.lights[1] = Light::directional(
            Vec3::new(-0.57735, -0.57735, 0.57735),
            Vec3::splat(0.3),
        );
        pass.lights[2] = Light::directional(Vec3::new(0.0, -0.707, -0.707), Vec3::splat(0.15));
    }
}

impl Scene for WavesScene {
    fn name(&self) -> &str {
        "waves"
    }

    fn slot_layout(&self) -> SlotLayout {
        SlotLayout {
            pass_count: 1,
            object_count: self.items.len(),
            material_count: self.materials.len(),
            wave_vertex_count: self.waves.vertex_count(),
        }
    }

    fn init(&mut self, frames_in_flight: usize) -> RenderResult<()> {
        if frames_in_flight != self.frames_in_flight {
            debug!(
                "Waves scene resized for {} frames in flight (was {})",
                frames_in_flight, self.frames_in_flight
            );
        }
        self.frames_in_flight = frames_in_flight;
        for item in &mut self.items {
            item.frames_dirty = frames_in_flight;
        }
        for material in &mut self.materials {
            material.frames_dirty = frames_in_flight;
        }
        Ok(())
    }

    fn update(&mut self, time: &FrameTime) -> RenderResult<()> {
        self.animate_water(time.delta);
        self.update_rain(time.delta);
        self.waves.step(time.delta);
        Ok(())
    }

    fn render(
        &mut self,
        time: &FrameTime,
        slot: &mut dyn SlotWriter,
        draws: &mut Vec<DrawIndexed>,
    ) -> RenderResult<()> {
        for item in self.items.iter_mut().filter(|item| item.frames_dirty > 0) {
            slot.write_object(
                item.object_index,
                &ObjectConstants {
                    world: item.world,
                    tex_transform: item.tex_transform,
                },
            );
            item.frames_dirty -= 1;
        }

        for (index, material) in self.materials.iter_mut().enumerate() {
            if material.frames_dirty > 0 {
                slot.write_material(index, &material.constants);
                material.frames_dirty -= 1;
            }
        }

        self.update_pass(time);
        slot.write_pass(0, &self.pass);

        self.waves.write_vertices(&mut self.vertices);
        slot.write_wave_vertices(&self.vertices);

        draws.extend(self.items.iter().map(RenderItem::draw));
        Ok(())
    }

    fn on_input(&mut self, event: &InputEvent) {
        match *event {
            InputEvent::MouseDrag {
                button: MouseButton::Left,
                dx,
                dy,
            } => self.camera.rotate(dx, dy),
            InputEvent::MouseDrag {
                button: MouseButton::Right,
                dx,
                dy,
            } => self.camera.zoom(dx, dy),
            InputEvent::MouseDrag { .. } => {}
            InputEvent::Scroll { delta } => self.camera.zoom(0.0, delta * SCROLL_LINE_PIXELS),
        }
    }

    fn on_resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.viewport = (width, height);
        self.camera.set_aspect(width as f32 / height as f32);
        debug!("Waves scene resized to {}x{}", width, height);
    }

    fn on_shutdown(&mut self) {
        let peak = self
            .waves
            .positions()
            .iter()
            .fold(0.0f32, |peak, p| peak.max(p.y.abs()));
        info!(
            "Waves: {} simulation steps, {} raindrops, peak height {:.3}",
            self.waves.steps_taken(),
            self.drops,
            peak
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Captures everything a scene writes into a slot.
    #[derive(Default)]
    struct RecordingSlot {
        passes: Vec<PassConstants>,
        objects: Vec<(usize, ObjectConstants)>,
        materials: Vec<(usize, MaterialConstants)>,
        vertices: Vec<WaveVertex>,
        vertex_writes: usize,
    }

    impl SlotWriter for RecordingSlot {
        fn slot_index(&self) -> usize {
            0
        }

        fn write_pass(&mut self, _index: usize, constants: &PassConstants) {
            self.passes.push(*constants);
        }

        fn write_object(&mut self, index: usize, constants: &ObjectConstants) {
            self.objects.push((index, *constants));
        }

        fn write_material(&mut self, index: usize, constants: &MaterialConstants) {
            self.materials.push((index, *constants));
        }

        fn write_wave_vertices(&mut self, vertices: &[WaveVertex]) {
            self.vertices = vertices.to_vec();
            self.vertex_writes += 1;
        }
    }

    fn config(rows: usize, cols: usize) -> DemoConfig {
        let mut config = DemoConfig::default();
        config.waves.rows = rows;
        config.waves.cols = cols;
        config
    }

    fn frame(frame: u64, delta: f32) -> FrameTime {
        FrameTime {
            total: frame as f32 * delta,
            delta,
            frame,
        }
    }

    #[test]
    fn test_slot_layout_matches_grid() {
        let scene = WavesScene::new(&config(16, 20)).unwrap();
        let layout = scene.slot_layout();
        assert_eq!(layout.pass_count, 1);
        assert_eq!(layout.object_count, 1);
        assert_eq!(layout.material_count, 1);
        assert_eq!(layout.wave_vertex_count, 16 * 20);
        assert_eq!(scene.indices().len(), 6 * 15 * 19);
    }

    #[test]
    fn test_invalid_grid_is_rejected() {
        assert!(WavesScene::new(&config(2, 16)).is_err());
    }

    #[test]
    fn test_render_emits_water_draw() {
        let mut scene = WavesScene::new(&config(16, 16)).unwrap();
        let mut slot = RecordingSlot::default();
        let mut draws = Vec::new();

        scene.render(&frame(0, 0.016), &mut slot, &mut draws).unwrap();

        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].vertices, VertexSource::FrameDynamic);
        assert_eq!(draws[0].index_count, 6 * 15 * 15);
        assert_eq!(slot.passes.len(), 1);
        assert_eq!(slot.vertex_writes, 1);
        assert_eq!(slot.vertices.len(), 256);
        assert_eq!(slot.vertices[17].position, scene.waves().position(17));
    }

    #[test]
    fn test_object_constants_uploaded_once_per_slot() {
        let mut scene = WavesScene::new(&config(16, 16)).unwrap();
        let mut slot = RecordingSlot::default();
        let mut draws = Vec::new();

        for i in 0..6 {
            scene.render(&frame(i, 0.016), &mut slot, &mut draws).unwrap();
        }

        // Three frames in flight: only the first three frames see the upload.
        assert_eq!(slot.objects.len(), 3);
        assert_eq!(slot.materials.len(), 3);
        let (index, object) = slot.objects[0];
        assert_eq!(index, 0);
        assert_eq!(object.tex_transform, Mat4::from_scale(Vec3::new(5.0, 5.0, 1.0)));
    }

    #[test]
    fn test_init_follows_host_ring_size() {
        let mut small = config(16, 16);
        small.frames.frames_in_flight = 2;
        let mut scene = WavesScene::new(&small).unwrap();
        scene.init(3).unwrap();

        let mut slot = RecordingSlot::default();
        let mut draws = Vec::new();
        for i in 0..6 {
            scene.render(&frame(i, 0.016), &mut slot, &mut draws).unwrap();
        }

        // Every slot of the three-slot ring gets the static constants.
        assert_eq!(slot.objects.len(), 3);
        assert_eq!(slot.materials.len(), 3);
    }

    #[test]
    fn test_water_animation_marks_material_dirty() {
        let mut scene = WavesScene::new(&config(16, 16)).unwrap();
        let mut slot = RecordingSlot::default();
        let mut draws = Vec::new();

        for i in 0..4 {
            scene.render(&frame(i, 0.016), &mut slot, &mut draws).unwrap();
        }
        assert_eq!(slot.materials.len(), 3);

        scene.update(&frame(4, 0.5)).unwrap();
        scene.render(&frame(4, 0.5), &mut slot, &mut draws).unwrap();

        assert_eq!(slot.materials.len(), 4);
        let (_, water) = slot.materials[3];
        let offset = water.mat_transform.w_axis;
        assert!((offset.x - 0.05).abs() < 1e-6);
        assert!((offset.y - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_rain_falls_every_interval() {
        let mut scene = WavesScene::new(&config(32, 32)).unwrap();
        for i in 0..8 {
            scene.update(&frame(i, 0.125)).unwrap();
        }
        // 8 x 0.125s = 1s of rain at 0.25s intervals
        assert_eq!(scene.drops(), 4);
        assert!(scene.waves().positions().iter().any(|p| p.y != 0.0));
    }

    #[test]
    fn test_same_seed_same_surface() {
        let mut a = WavesScene::new(&config(24, 24)).unwrap();
        let mut b = WavesScene::new(&config(24, 24)).unwrap();
        for i in 0..40 {
            a.update(&frame(i, 0.05)).unwrap();
            b.update(&frame(i, 0.05)).unwrap();
        }
        assert_eq!(a.waves().positions(), b.waves().positions());
    }

    #[test]
    fn test_tiny_grid_gets_no_rain() {
        let mut scene = WavesScene::new(&config(4, 4)).unwrap();
        for i in 0..10 {
            scene.update(&frame(i, 0.3)).unwrap();
        }
        assert_eq!(scene.drops(), 0);
    }

    #[test]
    fn test_rain_range() {
        assert_eq!(WavesScene::rain_range(128), Some(4..=123));
        assert_eq!(WavesScene::rain_range(9), Some(4..=4));
        assert_eq!(WavesScene::rain_range(6), Some(2..=3));
        assert_eq!(WavesScene::rain_range(5), Some(2..=2));
        assert_eq!(WavesScene::rain_range(4), None);
    }

    #[test]
    fn test_input_moves_camera() {
        let mut scene = WavesScene::new(&config(16, 16)).unwrap();
        let start = scene.camera().clone();

        scene.on_input(&InputEvent::MouseDrag {
            button: MouseButton::Left,
            dx: 40.0,
            dy: 0.0,
        });
        assert!(scene.camera().theta() > start.theta());

        scene.on_input(&InputEvent::MouseDrag {
            button: MouseButton::Right,
            dx: 10.0,
            dy: 0.0,
        });
        assert!((scene.camera().radius() - (start.radius() + 2.0)).abs() < 1e-4);

        scene.on_input(&InputEvent::MouseDrag {
            button: MouseButton::Middle,
            dx: 10.0,
            dy: 10.0,
        });
        assert!((scene.camera().radius() - (start.radius() + 2.0)).abs() < 1e-4);
    }

    #[test]
    fn test_resize_updates_pass_size() {
        let mut scene = WavesScene::new(&config(16, 16)).unwrap();
        scene.on_resize(800, 600);
        scene.on_resize(0, 600);

        let mut slot = RecordingSlot::default();
        scene.render(&frame(0, 0.016), &mut slot, &mut Vec::new()).unwrap();
        assert_eq!(slot.passes[0].render_target_size, Vec2::new(800.0, 600.0));
    }
}
