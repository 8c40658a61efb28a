//! Lighting system
//!
//! A [`Light`] is a tagged variant over the three supported light types.
//! Each type serializes to its own std140 uniform block; the forward
//! technique uploads that blob into a light pool slot and picks the
//! pipeline matching [`Light::light_type`].

use bytemuck::{Pod, Zeroable};
use slotmap::new_key_type;

use crate::foundation::math::Vec3;

new_key_type! {
    /// Key of a light registered in a scene
    pub struct LightId;
}

/// Light types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    /// Directional light (like sunlight)
    Directional,
    /// Point light (like a lightbulb)
    Point,
    /// Spot light (like a flashlight)
    Spot,
}

impl LightType {
    /// Every light type, in pipeline order
    pub const ALL: [Self; 3] = [Self::Directional, Self::Point, Self::Spot];

    /// Dense index, used to pick the matching pipeline
    pub const fn index(self) -> usize {
        match self {
            Self::Directional => 0,
            Self::Point => 1,
            Self::Spot => 2,
        }
    }
}

/// Phong color terms shared by all light types
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightColor {
    /// Ambient term
    pub ambient: Vec3,
    /// Diffuse term
    pub diffuse: Vec3,
    /// Specular term
    pub specular: Vec3,
}

impl Default for LightColor {
    fn default() -> Self {
        Self {
            ambient: Vec3::zeros(),
            diffuse: Vec3::new(1.0, 1.0, 1.0),
            specular: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

/// Light shining along one direction from infinitely far away
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels in
    pub direction: Vec3,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(0.0, -1.0, 0.0),
        }
    }
}

/// Omnidirectional light with distance attenuation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    /// World position
    pub position: Vec3,
    /// Constant attenuation factor
    pub constant: f32,
    /// Linear attenuation factor
    pub linear: f32,
    /// Quadratic attenuation factor
    pub quadratic: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            constant: 1.0,
            linear: 0.09,
            quadratic: 0.032,
        }
    }
}

/// Cone light with a soft edge between the inner and outer angles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    /// World position
    pub position: Vec3,
    /// Cone axis
    pub direction: Vec3,
    /// Half-angle of the fully lit cone, in radians
    pub inner_angle: f32,
    /// Half-angle where the light fades out, in radians
    pub outer_angle: f32,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            direction: Vec3::new(0.0, -1.0, 0.0),
            inner_angle: 12.5_f32.to_radians(),
            outer_angle: 17.5_f32.to_radians(),
        }
    }
}

/// Type-specific light parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// Directional light
    Directional(DirectionalLight),
    /// Point light
    Point(PointLight),
    /// Spot light
    Spot(SpotLight),
}

impl LightKind {
    /// Type tag
    pub const fn light_type(&self) -> LightType {
        match self {
            Self::Directional(_) => LightType::Directional,
            Self::Point(_) => LightType::Point,
            Self::Spot(_) => LightType::Spot,
        }
    }
}

/// std140 block read by the directional fragment shader
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DirectionalLightUniform {
    /// Ambient term
    pub ambient: [f32; 3],
    _pad0: f32,
    /// Diffuse term
    pub diffuse: [f32; 3],
    _pad1: f32,
    /// Specular term
    pub specular: [f32; 3],
    _pad2: f32,
    /// Normalized direction
    pub direction: [f32; 3],
    _pad3: f32,
}

/// std140 block read by the point fragment shader
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PointLightUniform {
    /// Ambient term
    pub ambient: [f32; 3],
    _pad0: f32,
    /// Diffuse term
    pub diffuse: [f32; 3],
    _pad1: f32,
    /// Specular term
    pub specular: [f32; 3],
    _pad2: f32,
    /// World position
    pub position: [f32; 3],
    /// Constant attenuation factor
    pub constant: f32,
    /// Linear attenuation factor
    pub linear: f32,
    /// Quadratic attenuation factor
    pub quadratic: f32,
    _pad3: [f32; 2],
}

/// std140 block read by the spot fragment shader
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SpotLightUniform {
    /// Ambient term
    pub ambient: [f32; 3],
    _pad0: f32,
    /// Diffuse term
    pub diffuse: [f32; 3],
    _pad1: f32,
    /// Specular term
    pub specular: [f32; 3],
    _pad2: f32,
    /// World position
    pub position: [f32; 3],
    _pad3: f32,
    /// Normalized cone axis
    pub direction: [f32; 3],
    /// Cosine of the inner half-angle
    pub cut_off: f32,
    /// Cosine of the outer half-angle
    pub outer_cut_off: f32,
    _pad4: [f32; 3],
}

/// Serialized light, ready for upload
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightData {
    /// Directional block
    Directional(DirectionalLightUniform),
    /// Point block
    Point(PointLightUniform),
    /// Spot block
    Spot(SpotLightUniform),
}

const fn max(a: usize, b: usize) -> usize {
    if a > b {
        a
    } else {
        b
    }
}

impl LightData {
    /// Size of the largest light block; every light pool slot holds this much
    pub const MAX_SIZE: usize = max(
        std::mem::size_of::<DirectionalLightUniform>(),
        max(
            std::mem::size_of::<PointLightUniform>(),
            std::mem::size_of::<SpotLightUniform>(),
        ),
    );

    /// Raw bytes of the block
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Directional(data) => bytemuck::bytes_of(data),
            Self::Point(data) => bytemuck::bytes_of(data),
            Self::Spot(data) => bytemuck::bytes_of(data),
        }
    }

    /// Byte size of the block
    pub fn size(&self) -> usize {
        self.as_bytes().len()
    }
}

fn normalized(v: Vec3) -> [f32; 3] {
    v.try_normalize(f32::EPSILON).unwrap_or(v).into()
}

/// A light source
///
/// Every setter marks the light dirty; the forward technique re-uploads a
/// dirty light into a fresh uniform slot and clears the flag.
#[derive(Debug, Clone)]
pub struct Light {
    name: String,
    color: LightColor,
    kind: LightKind,
    dirty: bool,
}

impl Light {
    /// Create a light of any kind
    pub fn new(name: impl Into<String>, kind: LightKind) -> Self {
        Self {
            name: name.into(),
            color: LightColor::default(),
            kind,
            dirty: true,
        }
    }

    /// Create a directional light
    pub fn directional(name: impl Into<String>, light: DirectionalLight) -> Self {
        Self::new(name, LightKind::Directional(light))
    }

    /// Create a point light
    pub fn point(name: impl Into<String>, light: PointLight) -> Self {
        Self::new(name, LightKind::Point(light))
    }

    /// Create a spot light
    pub fn spot(name: impl Into<String>, light: SpotLight) -> Self {
        Self::new(name, LightKind::Spot(light))
    }

    /// Builder-style color
    #[must_use]
    pub fn with_color(mut self, color: LightColor) -> Self {
        self.color = color;
        self
    }

    /// Light name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type tag
    pub fn light_type(&self) -> LightType {
        self.kind.light_type()
    }

    /// Color terms
    pub fn color(&self) -> &LightColor {
        &self.color
    }

    /// Type-specific parameters
    pub fn kind(&self) -> &LightKind {
        &self.kind
    }

    /// Replace the color terms
    pub fn set_color(&mut self, color: LightColor) {
        self.color = color;
        self.dirty = true;
    }

    /// Set the ambient term
    pub fn set_ambient(&mut self, ambient: Vec3) {
        self.color.ambient = ambient;
        self.dirty = true;
    }

    /// Set the diffuse term
    pub fn set_diffuse(&mut self, diffuse: Vec3) {
        self.color.diffuse = diffuse;
        self.dirty = true;
    }

    /// Set the specular term
    pub fn set_specular(&mut self, specular: Vec3) {
        self.color.specular = specular;
        self.dirty = true;
    }

    /// Set the direction of a directional or spot light
    ///
    /// Returns `false` for point lights, which have no direction.
    pub fn set_direction(&mut self, direction: Vec3) -> bool {
        match &mut self.kind {
            LightKind::Directional(light) => light.direction = direction,
            LightKind::Spot(light) => light.direction = direction,
            LightKind::Point(_) => return false,
        }
        self.dirty = true;
        true
    }

    /// Set the position of a point or spot light
    ///
    /// Returns `false` for directional lights, which have no position.
    pub fn set_position(&mut self, position: Vec3) -> bool {
        match &mut self.kind {
            LightKind::Point(light) => light.position = position,
            LightKind::Spot(light) => light.position = position,
            LightKind::Directional(_) => return false,
        }
        self.dirty = true;
        true
    }

    /// Edit the type-specific parameters in place
    pub fn modify(&mut self, edit: impl FnOnce(&mut LightKind)) {
        edit(&mut self.kind);
        self.dirty = true;
    }

    /// Whether the uploaded copy is stale
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark the uploaded copy as current
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Serialize into the uniform block of this light's type
    pub fn data(&self) -> LightData {
        let ambient = self.color.ambient.into();
        let diffuse = self.color.diffuse.into();
        let specular = self.color.specular.into();

        match &self.kind {
            LightKind::Directional(light) => LightData::Directional(DirectionalLightUniform {
                ambient,
                diffuse,
                specular,
                direction: normalized(light.direction),
                ..Zeroable::zeroed()
            }),
            LightKind::Point(light) => LightData::Point(PointLightUniform {
                ambient,
                diffuse,
                specular,
                position: light.position.into(),
                constant: light.constant,
                linear: light.linear,
                quadratic: light.quadratic,
                ..Zeroable::zeroed()
            }),
            LightKind::Spot(light) => LightData::Spot(SpotLightUniform {
                ambient,
                diffuse,
                specular,
                position: light.position.into(),
                direction: normalized(light.direction),
                cut_off: light.inner_angle.cos(),
                outer_cut_off: light.outer_angle.cos(),
                ..Zeroable::zeroed()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_uniform_layouts() {
        assert_eq!(std::mem::size_of::<DirectionalLightUniform>(), 64);
        assert_eq!(std::mem::size_of::<PointLightUniform>(), 80);
        assert_eq!(std::mem::size_of::<SpotLightUniform>(), 96);
        assert_eq!(LightData::MAX_SIZE, 96);
        assert_eq!(std::mem::offset_of!(SpotLightUniform, direction), 64);
    }

    #[test]
    fn test_directional_data_bytes() {
        let light = Light::directional(
            "sun",
            DirectionalLight {
                direction: Vec3::new(0.0, 0.0, -2.0),
            },
        )
        .with_color(LightColor {
            ambient: Vec3::new(0.1, 0.1, 0.1),
            ..LightColor::default()
        });

        let data = light.data();
        assert_eq!(data.size(), 64);
        let floats: &[f32] = bytemuck::cast_slice(data.as_bytes());
        assert_relative_eq!(floats[0], 0.1);
        assert_relative_eq!(floats[4], 1.0);
        assert_relative_eq!(floats[12], 0.0);
        assert_relative_eq!(floats[14], -1.0);
    }

    #[test]
    fn test_spot_stores_cosines() {
        let light = Light::spot(
            "torch",
            SpotLight {
                inner_angle: 0.0,
                outer_angle: std::f32::consts::FRAC_PI_2,
                ..SpotLight::default()
            },
        );
        let LightData::Spot(data) = light.data() else {
            panic!("expected spot data");
        };
        assert_relative_eq!(data.cut_off, 1.0);
        assert_relative_eq!(data.outer_cut_off, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_setters_mark_dirty() {
        let mut light = Light::point("bulb", PointLight::default());
        assert!(light.is_dirty());
        light.clear_dirty();

        assert!(!light.set_direction(Vec3::x()));
        assert!(!light.is_dirty());

        assert!(light.set_position(Vec3::new(1.0, 2.0, 3.0)));
        assert!(light.is_dirty());
        light.clear_dirty();

        light.modify(|kind| {
            if let LightKind::Point(point) = kind {
                point.linear = 0.5;
            }
        });
        assert!(light.is_dirty());
        assert_eq!(light.light_type(), LightType::Point);
        assert_eq!(LightType::Point.index(), 1);
    }
}
