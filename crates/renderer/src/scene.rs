//! Scene data fed to the compute pass.
//!
//! Every struct here is copied verbatim into a GPU buffer, so each one is
//! `#[repr(C)]`, `Pod`, and sized exactly as the compute shader declares it:
//!
//! | binding | data                | size            |
//! |---------|---------------------|-----------------|
//! | 1       | [`CameraUniform`]   | 64 B            |
//! | 2       | [`RandomSamples`]   | 4096 B          |
//! | 3       | [`RenderSettings`]  | 8 B             |
//! | 4       | `[Sphere]`          | 16 B per sphere |

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Number of random floats uploaded each frame.
pub const RANDOM_SAMPLE_COUNT: usize = 1024;

/// Camera-to-world transform.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    pub matrix: Mat4,
}

impl CameraUniform {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct RandomSamples {
    pub values: [f32; RANDOM_SAMPLE_COUNT],
}

impl RandomSamples {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

impl Default for RandomSamples {
    fn default() -> Self {
        Zeroable::zeroed()
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct RenderSettings {
    pub max_bounces: u32,
    pub samples_per_pixel: u32,
}

impl RenderSettings {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            max_bounces: 8,
            samples_per_pixel: 1,
        }
    }
}

/// std430 element: a `vec3` centre packed with the radius.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub const STRIDE: usize = std::mem::size_of::<Self>();

    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }
}

/// Fixed look-at camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 4.0, 10.0),
            target: Vec3::new(0.0, 1.0, 0.0),
            up: Vec3::Y,
        }
    }
}

impl Camera {
    pub fn uniform(&self) -> CameraUniform {
        CameraUniform {
            matrix: Mat4::look_at_rh(self.eye, self.target, self.up).inverse(),
        }
    }
}

/// The default scene: a 4×4 grid of unit spheres resting on y = 1.
pub fn sphere_grid() -> Vec<Sphere> {
    (0..4)
        .flat_map(|i| {
            (0..4).map(move |j| {
                Sphere::new(
                    Vec3::new(2.0 * i as f32 - 4.0, 1.0, 2.0 * j as f32 - 4.0),
                    1.0,
                )
            })
        })
        .collect()
}

/// Everything the compute pass reads, owned on the CPU side.
pub struct SceneState {
    pub camera: Camera,
    pub settings: RenderSettings,
    spheres: Vec<Sphere>,
    random: Box<RandomSamples>,
    rng: StdRng,
}

impl SceneState {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic scene for tests and captures.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let mut scene = Self {
            camera: Camera::default(),
            settings: RenderSettings::default(),
            spheres: sphere_grid(),
            random: Box::default(),
            rng,
        };
        scene.update();
        scene
    }

    /// Draws a fresh set of random samples in `[0, 1)`.
    pub fn update(&mut self) {
        for value in self.random.values.iter_mut() {
            *value = self.rng.r#gen();
        }
    }

    pub fn camera_uniform(&self) -> CameraUniform {
        self.camera.uniform()
    }

    pub fn random_samples(&self) -> &RandomSamples {
        &self.random
    }

    pub fn spheres(&self) -> &[Sphere] {
        &self.spheres
    }

    /// Byte size of the sphere storage buffer.
    pub fn sphere_buffer_size(&self) -> usize {
        Sphere::STRIDE * self.spheres.len()
    }
}

impl Default for SceneState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_sizes_match_shader() {
        assert_eq!(CameraUniform::SIZE, 64);
        assert_eq!(RandomSamples::SIZE, 4096);
        assert_eq!(RenderSettings::SIZE, 8);
        assert_eq!(Sphere::STRIDE, 16);
    }

    #[test]
    fn test_sphere_grid_layout() {
        let spheres = sphere_grid();
        assert_eq!(spheres.len(), 16);
        assert_eq!(spheres[0].center, Vec3::new(-4.0, 1.0, -4.0));
        assert_eq!(spheres[5].center, Vec3::new(-2.0, 1.0, -2.0));
        assert_eq!(spheres[15].center, Vec3::new(2.0, 1.0, 2.0));
        assert!(spheres.iter().all(|s| s.radius == 1.0));
    }

    #[test]
    fn test_random_samples_in_unit_range() {
        let scene = SceneState::with_seed(7);
        assert!(
            scene
                .random_samples()
                .values
                .iter()
                .all(|v| (0.0..1.0).contains(v))
        );
    }

    #[test]
    fn test_update_regenerates_samples() {
        let mut scene = SceneState::with_seed(42);
        let before = *scene.random_samples();
        scene.update();
        assert_ne!(before, *scene.random_samples());
    }

    #[test]
    fn test_camera_uniform_places_eye() {
        let camera = Camera::default();
        let matrix = camera.uniform().matrix;
        let eye = matrix.transform_point3(Vec3::ZERO);
        assert!((eye - camera.eye).length() < 1e-4);
    }

    #[test]
    fn test_sphere_bytes_round_trip_layout() {
        let sphere = Sphere::new(Vec3::new(1.0, 2.0, 3.0), 0.5);
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&sphere));
        assert_eq!(floats, &[1.0, 2.0, 3.0, 0.5]);
    }

    #[test]
    fn test_sphere_buffer_size() {
        let scene = SceneState::with_seed(1);
        assert_eq!(scene.sphere_buffer_size(), 256);
    }
}
