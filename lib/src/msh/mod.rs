//! Decoded mesh state: what the segment processors accumulate while walking
//! a model chunk, before the result is deposited into a [`Builder`].

pub mod builder;

pub use builder::{Builder, Builders};

use bitflags::bitflags;
use glam::{Vec2, Vec3, Vec4};

/// Level of detail, carried by the model name suffix.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum Lod {
    #[default]
    Zero,
    One,
    Two,
    LowRes,
}

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
    pub struct RenderFlags: u32 {
        const HARDEDGED = 1 << 0;
        const TRANSPARENT = 1 << 1;
        const GLOW = 1 << 2;
        const ADDITIVE = 1 << 3;
        const SPECULAR = 1 << 4;
        const DOUBLESIDED = 1 << 5;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum RenderType {
    #[default]
    Normal,
    Bumpmap,
    EnvMap,
    Wireframe,
    Scrolling,
    Energy,
    Animated,
    Refraction,
}

impl RenderType {
    /// Maps the raw value a PS2 `RTYP` chunk stores. Values with no named
    /// variant fall back to [`RenderType::Normal`].
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => RenderType::Bumpmap,
            2 => RenderType::EnvMap,
            3 => RenderType::Wireframe,
            4 => RenderType::Scrolling,
            5 => RenderType::Energy,
            6 => RenderType::Animated,
            7 => RenderType::Refraction,
            _ => RenderType::Normal,
        }
    }
}

/// First-generation render types, selected by the older material dialect.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum RenderTypeSwbf1 {
    #[default]
    Normal,
    Specular,
    Glow,
    Detail,
    Scroll,
    Reflection,
    Camouflage,
    Refraction,
    Bumpmap,
    BumpmapSpecular,
    Water,
}

#[derive(Clone, Debug, Default)]
pub struct Material {
    pub name: String,
    pub textures: [String; 4],
    pub diffuse_colour: Vec4,
    pub specular_colour: Vec4,
    pub specular_value: f32,
    pub params: [u8; 2],
    pub flags: RenderFlags,
    pub render_type: RenderType,
    pub type_swbf1: RenderTypeSwbf1,
    pub vertex_lighting: bool,
    /// Name of the light attached to the material; empty when none is.
    pub attached_light: String,
}

/// One vertex worth of skinning data.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SkinEntry {
    pub bones: [u8; 3],
    pub weights: Vec3,
}

impl SkinEntry {
    /// A hard-skinned vertex: one bone at full weight.
    pub fn hard(bone: u8) -> Self {
        Self { bones: [bone; 3], weights: Vec3::new(1.0, 0.0, 0.0) }
    }
}

/// Geometry and material state for one model segment.
#[derive(Clone, Debug, Default)]
pub struct Model {
    pub lod: Lod,
    pub name: String,
    pub parent: Option<String>,
    pub material: Material,
    pub strips: Vec<Vec<u16>>,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub texture_coords: Vec<Vec2>,
    pub colours: Vec<Vec4>,
    pub skin: Vec<SkinEntry>,
    pub bone_map: Vec<u8>,
    /// Geometry already in final coordinates; no skinning transform needed.
    pub pretransformed: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Bbox {
    pub centre: Vec3,
    pub size: Vec3,
}

impl Bbox {
    pub fn from_corners(a: Vec3, b: Vec3) -> Self {
        Self { centre: (a + b) / 2.0, size: (a - b).abs() / 2.0 }
    }
}
