use glam::{Mat4, Vec3};
use vista_types::{Camera, CameraProjection, CustomCameraMatrices, Handedness};

/// Manages the camera's location and projection settings.
#[derive(Debug, Clone)]
pub struct CameraManager {
    handedness: Handedness,
    proj: Mat4,
    inv_view: Mat4,
    data: Camera,
    aspect_ratio: f32,
    custom: Option<CustomCameraMatrices>,
}
impl CameraManager {
    /// Builds a new camera, using the given aspect ratio. If no aspect ratio is
    /// given it is assumed that no aspect ratio scaling should be done.
    pub fn new(data: Camera, handedness: Handedness, aspect_ratio: Option<f32>) -> Self {
        profiling::scope!("CameraManager::new");

        let aspect_ratio = aspect_ratio.unwrap_or(1.0);
        let proj = compute_projection_matrix(data, handedness, aspect_ratio);

        Self {
            handedness,
            proj,
            inv_view: data.view.inverse(),
            data,
            aspect_ratio,
            custom: None,
        }
    }

    /// Sets the camera data, rebuilding the projection with the current
    /// aspect ratio.
    pub fn set_data(&mut self, data: Camera) {
        self.set_aspect_data(data, self.aspect_ratio)
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: Option<f32>) {
        self.set_aspect_data(self.data, aspect_ratio.unwrap_or(1.0));
    }

    pub fn set_aspect_data(&mut self, data: Camera, aspect_ratio: f32) {
        self.proj = compute_projection_matrix(data, self.handedness, aspect_ratio);
        self.inv_view = data.view.inverse();
        self.data = data;
        self.aspect_ratio = aspect_ratio;
    }

    /// Overrides the world to view and view to clip matrices until cleared
    /// with `None`.
    pub fn set_custom_matrices(&mut self, custom: Option<CustomCameraMatrices>) {
        self.custom = custom;
    }

    pub fn custom_matrices(&self) -> Option<&CustomCameraMatrices> {
        self.custom.as_ref()
    }

    pub fn get_data(&self) -> Camera {
        self.data
    }

    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }

    pub fn view(&self) -> Mat4 {
        match self.custom {
            Some(custom) => custom.world_to_view,
            None => self.data.view,
        }
    }

    pub fn proj(&self) -> Mat4 {
        match self.custom {
            Some(custom) => custom.view_to_clip,
            None => self.proj,
        }
    }

    /// View to clip matrix for a target with the given aspect ratio.
    pub fn proj_for_aspect(&self, aspect_ratio: f32) -> Mat4 {
        match self.custom {
            Some(custom) => custom.view_to_clip,
            None if aspect_ratio == self.aspect_ratio => self.proj,
            None => compute_projection_matrix(self.data, self.handedness, aspect_ratio),
        }
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj() * self.view()
    }

    pub fn location(&self) -> Vec3 {
        match self.custom {
            Some(custom) => custom.world_to_view.inverse().w_axis.truncate(),
            None => self.inv_view.w_axis.truncate(),
        }
    }
}

fn compute_projection_matrix(data: Camera, handedness: Handedness, aspect_ratio: f32) -> Mat4 {
    match data.projection {
        CameraProjection::Orthographic { size } => {
            let half = size * 0.5;
            if handedness == Handedness::Left {
                Mat4::orthographic_lh(-half.x, half.x, -half.y, half.y, -half.z, half.z)
            } else {
                Mat4::orthographic_rh(-half.x, half.x, -half.y, half.y, -half.z, half.z)
            }
        }
        CameraProjection::Perspective { vfov, near, far } => {
            if handedness == Handedness::Left {
                Mat4::perspective_lh(vfov.to_radians(), aspect_ratio, near, far)
            } else {
                Mat4::perspective_rh(vfov.to_radians(), aspect_ratio, near, far)
            }
        }
        CameraProjection::Raw(proj) => proj,
    }
}

#[cfg(test)]
mod test {
    use glam::{Mat4, Vec3};
    use vista_types::{Camera, CameraProjection, CustomCameraMatrices, Handedness};

    use super::CameraManager;

    fn camera() -> Camera {
        Camera {
            projection: CameraProjection::Perspective {
                vfov: 90.0,
                near: 0.1,
                far: 100.0,
            },
            view: Mat4::look_at_rh(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO, Vec3::Y),
        }
    }

    #[test]
    fn location_from_view() {
        let manager = CameraManager::new(camera(), Handedness::Right, Some(1.5));
        assert!(manager.location().abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-5));
        assert_eq!(manager.proj_for_aspect(1.5), manager.proj());
        assert_ne!(manager.proj_for_aspect(1.0), manager.proj());
    }

    #[test]
    fn custom_matrices_take_over() {
        let mut manager = CameraManager::new(camera(), Handedness::Right, None);
        let custom = CustomCameraMatrices {
            world_to_view: Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)),
            view_to_clip: Mat4::orthographic_rh(-1.0, 1.0, -1.0, 1.0, 0.0, 10.0),
        };
        manager.set_custom_matrices(Some(custom));
        assert_eq!(manager.view_proj(), custom.view_to_clip * custom.world_to_view);
        assert_eq!(manager.proj_for_aspect(3.0), custom.view_to_clip);
        assert!(manager.location().abs_diff_eq(Vec3::new(0.0, 0.0, 5.0), 1e-5));

        manager.set_custom_matrices(None);
        assert!(manager.location().abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-5));
    }
}
