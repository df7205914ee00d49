//! Material (`MTRL`) and render-type (`RTYP`) decoding.
//!
//! Two incompatible `MTRL` encodings exist. The newer one is a fixed 24-byte
//! record followed by a name string; the older one is a flag word followed by
//! a variable tail keyed off the flags. The older chunks are always smaller
//! than the fixed record, so the payload size picks the dialect.

use std::mem::size_of;

use zerocopy::{
    byteorder::{LittleEndian, F32, I32, U32},
    FromBytes, FromZeroes,
};

use super::{ucfb::Reader, Result};
use crate::{
    msh::{Material, RenderFlags, RenderType, RenderTypeSwbf1},
    util::math::{range_convert, unpack_unorm4x8},
};

/// Flag bits of the 24-byte material record.
mod flags {
    pub const HARDEDGED: u32 = 2;
    pub const TRANSPARENT: u32 = 4;
    pub const GLOW: u32 = 16;
    pub const BUMPMAP: u32 = 32;
    pub const ADDITIVE: u32 = 64;
    pub const SPECULAR: u32 = 128;
    pub const ENV_MAP: u32 = 256;
    pub const VERTEX_LIGHTING: u32 = 512;
    // Name taken from the msh flag; may produce some other effect.
    pub const WIREFRAME: u32 = 2048;
    pub const DOUBLESIDED: u32 = 65536;
    pub const SCROLLING: u32 = 16777216;
    pub const ENERGY: u32 = 33554432;
    pub const ANIMATED: u32 = 67108864;
    pub const ATTACHED_LIGHT: u32 = 134217728;
}

/// Flag bits of the first-generation material chunk.
mod flags_swbf1 {
    pub const HARDEDGED: u32 = 2;
    pub const TRANSPARENT: u32 = 4;
    pub const SPECULAR: u32 = 48;
    pub const ADDITIVE: u32 = 128;
    pub const GLOW: u32 = 256;
    pub const DETAIL: u32 = 512;
    pub const SCROLL: u32 = 1024;
    pub const REFLECTION: u32 = 4096;
    pub const CAMOUFLAGE: u32 = 8192;
    pub const REFRACTION: u32 = 16384;
}

#[derive(FromBytes, FromZeroes)]
#[repr(C, packed)]
struct MaterialInfo {
    flags: U32<LittleEndian>,
    diffuse_colour: U32<LittleEndian>,
    specular_colour: U32<LittleEndian>,
    specular_intensity: U32<LittleEndian>,
    params: [U32<LittleEndian>; 2],
    // A NUL-terminated string follows, naming the attached light. It is
    // present even when the attached-light flag is clear.
}

#[inline]
fn set(flags: u32, mask: u32) -> bool {
    flags & mask == mask
}

/// Decodes an `MTRL` chunk of either dialect into `out`.
pub fn read_material(mut material: Reader, out: &mut Material) -> Result<()> {
    if material.size() < size_of::<MaterialInfo>() {
        return read_material_swbf1(material, out);
    }

    let info: MaterialInfo = material.read()?;
    let flags = info.flags.get();

    out.diffuse_colour = unpack_unorm4x8(info.diffuse_colour.get());
    out.specular_colour = unpack_unorm4x8(info.specular_colour.get());
    out.specular_value = info.specular_intensity.get() as f32;
    out.params = [info.params[0].get() as u8, info.params[1].get() as u8];

    let attached_light = material.read_string_unaligned()?;

    out.vertex_lighting = set(flags, flags::VERTEX_LIGHTING);

    if set(flags, flags::HARDEDGED) {
        out.flags |= RenderFlags::HARDEDGED;
    }
    // Doublesided materials suppress the transparent render flag.
    if set(flags, flags::TRANSPARENT) && !set(flags, flags::DOUBLESIDED) {
        out.flags |= RenderFlags::TRANSPARENT;
    }
    if set(flags, flags::GLOW) {
        out.flags |= RenderFlags::GLOW;
    }
    if set(flags, flags::BUMPMAP) {
        out.render_type = RenderType::Bumpmap;
    }
    if set(flags, flags::ADDITIVE) {
        out.flags |= RenderFlags::ADDITIVE;
    }
    if set(flags, flags::SPECULAR) {
        out.flags |= RenderFlags::SPECULAR;
    }
    if set(flags, flags::ENV_MAP) {
        out.render_type = RenderType::EnvMap;
    }
    if set(flags, flags::WIREFRAME) {
        out.render_type = RenderType::Wireframe;
    }
    if set(flags, flags::DOUBLESIDED) {
        out.flags |= RenderFlags::DOUBLESIDED;
    }
    if set(flags, flags::SCROLLING) {
        out.render_type = RenderType::Scrolling;
    }
    if set(flags, flags::ENERGY) {
        out.render_type = RenderType::Energy;
    }
    if set(flags, flags::ANIMATED) {
        out.render_type = RenderType::Animated;
    }
    if set(flags, flags::ATTACHED_LIGHT) {
        out.attached_light = attached_light.to_owned();
    }

    Ok(())
}

fn read_material_swbf1(mut material: Reader, out: &mut Material) -> Result<()> {
    if material.at_end() {
        return Ok(());
    }

    let flags = material.read::<U32<LittleEndian>>()?.get();

    if set(flags, flags_swbf1::HARDEDGED) {
        out.flags |= RenderFlags::HARDEDGED;
    }
    if set(flags, flags_swbf1::TRANSPARENT) {
        out.flags |= RenderFlags::TRANSPARENT;
    }
    if set(flags, flags_swbf1::SPECULAR) {
        out.type_swbf1 = RenderTypeSwbf1::Specular;
        out.specular_value = material.read::<I32<LittleEndian>>()?.get() as f32;
        out.specular_colour = unpack_unorm4x8(material.read::<U32<LittleEndian>>()?.get());
    }
    if set(flags, flags_swbf1::ADDITIVE) {
        out.flags |= RenderFlags::ADDITIVE;
    }
    if set(flags, flags_swbf1::GLOW) {
        out.type_swbf1 = RenderTypeSwbf1::Glow;
    }
    if set(flags, flags_swbf1::DETAIL) {
        out.type_swbf1 = RenderTypeSwbf1::Detail;
        out.params = read_texture_params(&mut material)?;
    }
    if set(flags, flags_swbf1::SCROLL) {
        out.type_swbf1 = RenderTypeSwbf1::Scroll;
        out.params = read_texture_params(&mut material)?;
    }
    if set(flags, flags_swbf1::REFLECTION) {
        out.type_swbf1 = RenderTypeSwbf1::Reflection;
    }
    if set(flags, flags_swbf1::CAMOUFLAGE) {
        out.type_swbf1 = RenderTypeSwbf1::Camouflage;
    }
    if set(flags, flags_swbf1::REFRACTION) {
        out.type_swbf1 = RenderTypeSwbf1::Refraction;
    }

    Ok(())
}

/// Two per-axis parameters stored as floats on `[-1, 1]`, kept as the `u8`
/// bit pattern of their `[-128, 127]` mapping.
fn read_texture_params(material: &mut Reader) -> Result<[u8; 2]> {
    let mut params = [0u8; 2];
    for param in &mut params {
        let value = material.read::<F32<LittleEndian>>()?.get();
        *param = range_convert(value, [-1.0, 1.0], [-128.0, 127.0]) as i8 as u8;
    }
    Ok(params)
}

/// Decodes the textual `RTYP` chunk used by the PC and Xbox dialects.
pub fn read_render_type(mut render_type: Reader, out: &mut Material) -> Result<()> {
    match render_type.read_string()? {
        "Refraction" => out.render_type = RenderType::Refraction,
        "Bump" => {
            out.type_swbf1 = if out.type_swbf1 == RenderTypeSwbf1::Specular {
                RenderTypeSwbf1::BumpmapSpecular
            } else {
                RenderTypeSwbf1::Bumpmap
            };
        }
        "Water" => out.type_swbf1 = RenderTypeSwbf1::Water,
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use glam::Vec4;

    use super::*;
    use crate::format::{Error, Magic};

    fn chunk(magic: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + payload.len());
        bytes.extend_from_slice(magic);
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    fn material_chunk(payload: &[u8]) -> Vec<u8> {
        chunk(b"MTRL", payload)
    }

    fn swbf2_payload(flags: u32) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&flags.to_le_bytes());
        payload.extend_from_slice(&[0; 20]);
        payload.push(0); // empty attached-light name
        payload
    }

    fn decode(payload: &[u8]) -> Material {
        let bytes = material_chunk(payload);
        let reader = Reader::new(&bytes).unwrap();
        let mut out = Material::default();
        read_material(reader, &mut out).unwrap();
        out
    }

    #[test]
    fn empty_chunk_is_an_empty_swbf1_material() {
        let out = decode(&[]);
        assert_eq!(out.flags, RenderFlags::empty());
        assert_eq!(out.type_swbf1, RenderTypeSwbf1::Normal);
    }

    #[test]
    fn swbf1_specular() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&48u32.to_le_bytes());
        payload.extend_from_slice(&5i32.to_le_bytes());
        payload.extend_from_slice(&0xFF80_8080u32.to_le_bytes());
        let out = decode(&payload);

        assert_eq!(out.type_swbf1, RenderTypeSwbf1::Specular);
        assert_eq!(out.specular_value, 5.0);
        let diff = out.specular_colour - Vec4::new(0.5, 0.5, 0.5, 1.0);
        assert!(diff.abs().max_element() < 1.0 / 255.0);
    }

    #[test]
    fn swbf1_specular_needs_both_bits() {
        let out = decode(&16u32.to_le_bytes());
        assert_eq!(out.type_swbf1, RenderTypeSwbf1::Normal);
    }

    #[test]
    fn swbf1_scroll_overrides_detail() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(512u32 | 1024).to_le_bytes());
        for value in [1.0f32, -1.0, 0.0, 1.0] {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        let out = decode(&payload);

        assert_eq!(out.type_swbf1, RenderTypeSwbf1::Scroll);
        // scroll params overwrite the detail params
        assert_eq!(out.params, [0, 127]);
    }

    #[test]
    fn swbf2_all_zero() {
        let out = decode(&swbf2_payload(0));
        assert_eq!(out.flags, RenderFlags::empty());
        assert_eq!(out.render_type, RenderType::Normal);
        assert_eq!(out.diffuse_colour, Vec4::ZERO);
        assert!(out.attached_light.is_empty());
        assert!(!out.vertex_lighting);
    }

    #[test]
    fn swbf2_without_name_string_fails() {
        let bytes = material_chunk(&swbf2_payload(0)[..24]);
        let reader = Reader::new(&bytes).unwrap();
        let mut out = Material::default();
        assert!(matches!(
            read_material(reader, &mut out),
            Err(Error::UnterminatedString(magic)) if magic == Magic::new(b"MTRL")
        ));
    }

    #[test]
    fn doublesided_suppresses_transparent() {
        let out = decode(&swbf2_payload(flags::TRANSPARENT | flags::DOUBLESIDED));
        assert!(out.flags.contains(RenderFlags::DOUBLESIDED));
        assert!(!out.flags.contains(RenderFlags::TRANSPARENT));

        let out = decode(&swbf2_payload(flags::TRANSPARENT));
        assert!(out.flags.contains(RenderFlags::TRANSPARENT));
    }

    #[test]
    fn swbf2_type_precedence_is_iteration_order() {
        let out = decode(&swbf2_payload(flags::BUMPMAP | flags::ENV_MAP | flags::SCROLLING));
        assert_eq!(out.render_type, RenderType::Scrolling);
    }

    #[test]
    fn attached_light_consumed_only_when_flagged() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&flags::ATTACHED_LIGHT.to_le_bytes());
        payload.extend_from_slice(&[0; 20]);
        payload.extend_from_slice(b"lamp\0");
        let out = decode(&payload);
        assert_eq!(out.attached_light, "lamp");

        let mut payload = Vec::new();
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&[0; 20]);
        payload.extend_from_slice(b"lamp\0");
        let out = decode(&payload);
        assert!(out.attached_light.is_empty());
    }

    #[test]
    fn swbf2_vertex_lighting_and_colours() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&flags::VERTEX_LIGHTING.to_le_bytes());
        payload.extend_from_slice(&0xFF00_00FFu32.to_le_bytes()); // diffuse
        payload.extend_from_slice(&0xFF00_FF00u32.to_le_bytes()); // specular
        payload.extend_from_slice(&3u32.to_le_bytes()); // intensity
        payload.extend_from_slice(&300u32.to_le_bytes()); // params[0], truncates
        payload.extend_from_slice(&2u32.to_le_bytes());
        payload.push(0);
        let out = decode(&payload);

        assert!(out.vertex_lighting);
        assert_eq!(out.diffuse_colour, Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(out.specular_colour, Vec4::new(0.0, 1.0, 0.0, 1.0));
        assert_eq!(out.specular_value, 3.0);
        assert_eq!(out.params, [44, 2]);
    }

    #[test]
    fn rtyp_bump_upgrades_specular() {
        let bytes = chunk(b"RTYP", b"Bump\0");
        let mut out = Material::default();
        read_render_type(Reader::new(&bytes).unwrap(), &mut out).unwrap();
        assert_eq!(out.type_swbf1, RenderTypeSwbf1::Bumpmap);

        out.type_swbf1 = RenderTypeSwbf1::Specular;
        read_render_type(Reader::new(&bytes).unwrap(), &mut out).unwrap();
        assert_eq!(out.type_swbf1, RenderTypeSwbf1::BumpmapSpecular);
    }

    #[test]
    fn rtyp_unknown_tag_is_ignored() {
        let bytes = chunk(b"RTYP", b"Chrome\0");
        let mut out = Material::default();
        read_render_type(Reader::new(&bytes).unwrap(), &mut out).unwrap();
        assert_eq!(out.render_type, RenderType::Normal);
        assert_eq!(out.type_swbf1, RenderTypeSwbf1::Normal);
    }
}
