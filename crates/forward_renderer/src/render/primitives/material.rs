//! Surface material description

use crate::foundation::math::Vec3;

/// Phong surface parameters shared between mesh instances
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Material name
    pub name: String,
    /// Ambient reflectance
    pub ambient: Vec3,
    /// Diffuse reflectance
    pub diffuse: Vec3,
    /// Specular reflectance
    pub specular: Vec3,
    /// Specular exponent
    pub shininess: f32,
}

impl Material {
    /// White material with a moderate highlight
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ambient: Vec3::new(1.0, 1.0, 1.0),
            diffuse: Vec3::new(1.0, 1.0, 1.0),
            specular: Vec3::new(1.0, 1.0, 1.0),
            shininess: 32.0,
        }
    }

    /// Builder-style diffuse color
    #[must_use]
    pub fn with_diffuse(mut self, diffuse: Vec3) -> Self {
        self.diffuse = diffuse;
        self
    }
}
