//! Frustums and bounding volumes.
//!
//! Plane extraction follows <https://www.gamedevs.org/uploads/fast-extraction-viewing-frustum-planes-from-world-view-projection-matrix.pdf>
//! for a 0..1 clip space depth range.

use glam::{Mat4, Vec3, Vec3A, Vec4, Vec4Swizzles};

/// Represents a point in space and a radius from that point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C, align(16))]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}
impl BoundingSphere {
    pub fn from_mesh(mesh: &[Vec3]) -> Self {
        let center = find_mesh_center(mesh);
        let radius = find_mesh_bounding_sphere_radius(center, mesh);

        Self {
            center: Vec3::from(center),
            radius,
        }
    }

    /// Sphere enclosing the given axis aligned box.
    pub fn from_aabb(min: Vec3, max: Vec3) -> Self {
        Self {
            center: (min + max) * 0.5,
            radius: (max - min).length() * 0.5,
        }
    }

    pub fn apply_transform(self, transform: Mat4) -> Self {
        let max_scale = transform
            .x_axis
            .xyz()
            .length_squared()
            .max(
                transform
                    .y_axis
                    .xyz()
                    .length_squared()
                    .max(transform.z_axis.xyz().length_squared()),
            )
            .sqrt();
        let center = transform * self.center.extend(1.0);

        Self {
            center: center.truncate(),
            radius: max_scale * self.radius,
        }
    }
}

fn find_mesh_center(mesh: &[Vec3]) -> Vec3A {
    let first = if let Some(first) = mesh.first() {
        *first
    } else {
        return Vec3A::ZERO;
    };
    let mut max = Vec3A::from(first);
    let mut min = max;

    for pos in mesh.iter().skip(1) {
        let pos = Vec3A::from(*pos);
        max = max.max(pos);
        min = min.min(pos);
    }

    (max + min) / 2.0
}

fn find_mesh_bounding_sphere_radius(mesh_center: Vec3A, mesh: &[Vec3]) -> f32 {
    mesh.iter().fold(0.0, |distance, pos| {
        distance.max((Vec3A::from(*pos) - mesh_center).length())
    })
}

/// Object space bounds of a scene item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalBounds {
    pub min: Vec3,
    pub max: Vec3,
    /// Must enclose everything the box encloses that is ever drawn.
    pub sphere: BoundingSphere,
}

impl LocalBounds {
    pub fn from_aabb(min: Vec3, max: Vec3) -> Self {
        debug_assert!(min.cmple(max).all(), "inverted box {min} {max}");
        Self {
            min,
            max,
            sphere: BoundingSphere::from_aabb(min, max),
        }
    }

    /// Bounds of a point cloud. The sphere is the tighter mesh sphere, not the
    /// sphere around the box.
    pub fn from_positions(positions: &[Vec3]) -> Self {
        let (min, max) = match positions.split_first() {
            Some((first, rest)) => rest.iter().fold((*first, *first), |(min, max), p| (min.min(*p), max.max(*p))),
            None => (Vec3::ZERO, Vec3::ZERO),
        };
        Self {
            min,
            max,
            sphere: BoundingSphere::from_mesh(positions),
        }
    }
}

/// Represents a plane as a vec4 (or vec3 + f32)
#[derive(Debug, Copy, Clone, PartialEq)]
#[repr(C, align(16))]
pub struct ShaderPlane {
    pub abc: Vec3,
    pub d: f32,
}

impl ShaderPlane {
    pub fn new(a: f32, b: f32, c: f32, d: f32) -> Self {
        Self {
            abc: Vec3::new(a, b, c),
            d,
        }
    }

    /// Normalizes the plane. A plane without a normal, such as the far plane of
    /// an infinite projection, turns into a plane every point is in front of.
    pub fn normalize(mut self) -> Self {
        let mag = self.abc.length();
        if mag <= f32::EPSILON {
            return Self::new(0.0, 0.0, 0.0, f32::MAX);
        }

        self.abc /= mag;
        self.d /= mag;

        self
    }

    pub fn distance(self, point: Vec3) -> f32 {
        self.abc.dot(point) + self.d
    }
}

/// A frustum composed of 6 planes, all pointing inwards.
#[derive(Debug, Copy, Clone, PartialEq)]
#[repr(C, align(16))]
pub struct ShaderFrustum {
    pub left: ShaderPlane,
    pub right: ShaderPlane,
    pub top: ShaderPlane,
    pub bottom: ShaderPlane,
    pub near: ShaderPlane,
    pub far: ShaderPlane,
}

impl ShaderFrustum {
    pub fn from_matrix(matrix: Mat4) -> Self {
        let mat_arr = matrix.to_cols_array_2d();

        let left = ShaderPlane::new(
            mat_arr[0][3] + mat_arr[0][0],
            mat_arr[1][3] + mat_arr[1][0],
            mat_arr[2][3] + mat_arr[2][0],
            mat_arr[3][3] + mat_arr[3][0],
        );

        let right = ShaderPlane::new(
            mat_arr[0][3] - mat_arr[0][0],
            mat_arr[1][3] - mat_arr[1][0],
            mat_arr[2][3] - mat_arr[2][0],
            mat_arr[3][3] - mat_arr[3][0],
        );

        let top = ShaderPlane::new(
            mat_arr[0][3] - mat_arr[0][1],
            mat_arr[1][3] - mat_arr[1][1],
            mat_arr[2][3] - mat_arr[2][1],
            mat_arr[3][3] - mat_arr[3][1],
        );

        let bottom = ShaderPlane::new(
            mat_arr[0][3] + mat_arr[0][1],
            mat_arr[1][3] + mat_arr[1][1],
            mat_arr[2][3] + mat_arr[2][1],
            mat_arr[3][3] + mat_arr[3][1],
        );

        // 0 <= z
        let near = ShaderPlane::new(mat_arr[0][2], mat_arr[1][2], mat_arr[2][2], mat_arr[3][2]);

        // z <= w
        let far = ShaderPlane::new(
            mat_arr[0][3] - mat_arr[0][2],
            mat_arr[1][3] - mat_arr[1][2],
            mat_arr[2][3] - mat_arr[2][2],
            mat_arr[3][3] - mat_arr[3][2],
        );

        Self {
            left: left.normalize(),
            right: right.normalize(),
            top: top.normalize(),
            bottom: bottom.normalize(),
            near: near.normalize(),
            far: far.normalize(),
        }
    }

    pub fn planes(&self) -> [ShaderPlane; 6] {
        [self.left, self.right, self.top, self.bottom, self.near, self.far]
    }

    /// Determines if the sphere is at all inside the frustum. A sphere exactly
    /// touching a plane from the outside is not.
    pub fn contains_sphere(&self, sphere: BoundingSphere) -> bool {
        let neg_radius = -sphere.radius;

        self.planes()
            .iter()
            .all(|plane| plane.distance(sphere.center) > neg_radius)
    }
}

/// A frustum plane broadcast into every lane.
#[derive(Debug, Copy, Clone)]
pub struct SimdPlane {
    pub x: Vec4,
    pub y: Vec4,
    pub z: Vec4,
    pub d: Vec4,
}

/// [`ShaderFrustum`] with each plane replicated four times, to test four
/// items against a plane at once.
#[derive(Debug, Copy, Clone)]
pub struct SimdFrustum {
    pub planes: [SimdPlane; 6],
}

impl SimdFrustum {
    pub fn new(frustum: &ShaderFrustum) -> Self {
        Self {
            planes: frustum.planes().map(|plane| SimdPlane {
                x: Vec4::splat(plane.abc.x),
                y: Vec4::splat(plane.abc.y),
                z: Vec4::splat(plane.abc.z),
                d: Vec4::splat(plane.d),
            }),
        }
    }
}
