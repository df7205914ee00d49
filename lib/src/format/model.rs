//! Model (`modl`) chunk decoding.
//!
//! The envelope is `NAME`, an optional `VRTX`, `NODE`, `INFO`, then any
//! number of `segm` children (unknown siblings are permitted and skipped).
//! Each segment is handed to the processor for the selected platform; the
//! finished models are deposited into the [`Builders`] entry of the model's
//! base name, one model per segment.

use glam::{Vec2, Vec3, Vec4};
use zerocopy::byteorder::{LittleEndian, F32, I16, U16, U32};

use super::{mtrl, ucfb::Reader, vbuf, Error, Magic, Result};
use crate::{
    msh::{Bbox, Builder, Builders, Lod, Model, RenderType, SkinEntry},
    util::math::{bgra_to_rgba, unpack_snorm4x8},
};

/// Top-level magic of a model chunk.
pub const MAGIC_MODL: Magic = Magic::new(b"modl");

const MAGIC_NAME: Magic = Magic::new(b"NAME");
const MAGIC_VRTX: Magic = Magic::new(b"VRTX");
const MAGIC_NODE: Magic = Magic::new(b"NODE");
const MAGIC_INFO: Magic = Magic::new(b"INFO");
const MAGIC_SEGM: Magic = Magic::new(b"segm");
const MAGIC_MTRL: Magic = Magic::new(b"MTRL");
const MAGIC_RTYP: Magic = Magic::new(b"RTYP");
const MAGIC_MNAM: Magic = Magic::new(b"MNAM");
const MAGIC_TNAM: Magic = Magic::new(b"TNAM");
const MAGIC_BNAM: Magic = Magic::new(b"BNAM");
const MAGIC_BMAP: Magic = Magic::new(b"BMAP");
const MAGIC_IBUF: Magic = Magic::new(b"IBUF");
const MAGIC_VBUF: Magic = Magic::new(b"VBUF");
const MAGIC_STRP: Magic = Magic::new(b"STRP");
const MAGIC_POSI: Magic = Magic::new(b"POSI");
const MAGIC_NORM: Magic = Magic::new(b"NORM");
const MAGIC_TEX0: Magic = Magic::new(b"TEX0");
const MAGIC_COL0: Magic = Magic::new(b"COL0");
const MAGIC_BONE: Magic = Magic::new(b"BONE");

/// Geometry dialect of the input file.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Platform {
    Pc,
    Xbox,
    Ps2,
}

pub struct ModelInfo {
    pub vertex_box: [Vec3; 2],
    pub visibility_box: [Vec3; 2],
    pub face_count: u32,
}

/// Decodes a model chunk and deposits its segments under the base name.
pub fn read_model(mut model: Reader, platform: Platform, builders: &Builders) -> Result<()> {
    let (name, lod) = read_model_name(model.read_child_strict(MAGIC_NAME)?)?;

    model.read_child_strict_optional(MAGIC_VRTX)?;
    model.read_child_strict(MAGIC_NODE)?;
    let info = read_model_info(model.read_child_strict(MAGIC_INFO)?)?;

    let builder = builders.entry(&name);
    builder.set_bbox(Bbox::from_corners(info.vertex_box[0], info.vertex_box[1]));

    while !model.at_end() {
        let child = model.read_child()?;
        if child.magic() != MAGIC_SEGM {
            continue;
        }
        match platform {
            Platform::Pc => process_segment_pc(child, lod, &info, &builder)?,
            Platform::Xbox => process_segment_xbox(child, lod, &info, &builder)?,
            Platform::Ps2 => process_segment_ps2(child, lod, &info, &builder)?,
        }
    }

    Ok(())
}

/// Splits the LOD suffix off a model name. `LOD1`, `LOD2` and `LOWD` mark
/// the lower levels of detail; any other name is LOD zero kept whole.
fn read_model_name(mut name: Reader) -> Result<(String, Lod)> {
    let full = name.read_string()?;
    for (suffix, lod) in [("LOD1", Lod::One), ("LOD2", Lod::Two), ("LOWD", Lod::LowRes)] {
        if let Some(base) = full.strip_suffix(suffix) {
            return Ok((base.to_owned(), lod));
        }
    }
    Ok((full.to_owned(), Lod::Zero))
}

fn read_model_info(mut info: Reader) -> Result<ModelInfo> {
    // the newer files lead with four ints, the older with three
    match info.size() {
        72 => info.consume(16)?,
        68 => info.consume(12)?,
        size => return Err(Error::UnknownModelInfo(size)),
    }

    let vertex_box = [read_vec3(&mut info)?, read_vec3(&mut info)?];
    let visibility_box = [read_vec3(&mut info)?, read_vec3(&mut info)?];
    info.consume(4)?;
    let face_count = info.read::<U32<LittleEndian>>()?.get();

    Ok(ModelInfo { vertex_box, visibility_box, face_count })
}

fn process_segment_pc(
    mut segment: Reader,
    lod: Lod,
    info: &ModelInfo,
    builder: &Builder,
) -> Result<()> {
    let mut model = Model { lod, ..Model::default() };
    let mut vbufs = Vec::with_capacity(8);

    while !segment.at_end() {
        let child = segment.read_child()?;
        match child.magic() {
            MAGIC_MTRL => mtrl::read_material(child, &mut model.material)?,
            MAGIC_RTYP => mtrl::read_render_type(child, &mut model.material)?,
            MAGIC_MNAM => read_material_name(child, &mut model)?,
            MAGIC_TNAM => read_texture_name(child, &mut model.material.textures)?,
            MAGIC_IBUF => model.strips.push(read_index_buffer(child)?),
            MAGIC_VBUF => vbufs.push(child),
            MAGIC_BNAM => model.parent = Some(read_parent_name(child)?),
            MAGIC_BMAP => model.bone_map = read_bone_map(child)?,
            magic => log::debug!("ignoring {magic} child in model segment"),
        }
    }

    vbuf::read_vbuf(vbufs, &mut model, &info.vertex_box)?;

    builder.add_model(model);
    Ok(())
}

fn process_segment_xbox(
    mut segment: Reader,
    lod: Lod,
    info: &ModelInfo,
    builder: &Builder,
) -> Result<()> {
    let mut model = Model { lod, ..Model::default() };

    while !segment.at_end() {
        let child = segment.read_child()?;
        match child.magic() {
            MAGIC_MTRL => mtrl::read_material(child, &mut model.material)?,
            MAGIC_RTYP => mtrl::read_render_type(child, &mut model.material)?,
            MAGIC_MNAM => read_material_name(child, &mut model)?,
            MAGIC_TNAM => read_texture_name(child, &mut model.material.textures)?,
            MAGIC_IBUF => model.strips.push(read_index_buffer(child)?),
            MAGIC_VBUF => vbuf::read_vbuf_xbox(child, &mut model, &info.vertex_box)?,
            MAGIC_BNAM => model.parent = Some(read_parent_name(child)?),
            MAGIC_BMAP => model.bone_map = read_bone_map(child)?,
            magic => log::debug!("ignoring {magic} child in model segment"),
        }
    }

    builder.add_model(model);
    Ok(())
}

fn process_segment_ps2(
    mut segment: Reader,
    lod: Lod,
    info: &ModelInfo,
    builder: &Builder,
) -> Result<()> {
    let mut model = Model { lod, ..Model::default() };

    let mut segment_info = segment.read_child_strict(MAGIC_INFO)?;
    let vertex_count = segment_info.read::<U32<LittleEndian>>()?.get() as usize;
    let index_count = segment_info.read::<U32<LittleEndian>>()?.get() as usize;

    while !segment.at_end() {
        let child = segment.read_child()?;
        match child.magic() {
            MAGIC_MTRL => mtrl::read_material(child, &mut model.material)?,
            MAGIC_RTYP => model.material.render_type = read_render_type_ps2(child)?,
            MAGIC_MNAM => read_material_name(child, &mut model)?,
            MAGIC_TNAM => read_texture_name(child, &mut model.material.textures)?,
            MAGIC_STRP => read_strip_buffer(child, index_count, &mut model.strips)?,
            MAGIC_POSI => {
                model.positions = read_positions_buffer(child, vertex_count, &info.vertex_box)?;
            }
            MAGIC_NORM => model.normals = read_normals_buffer(child, vertex_count)?,
            MAGIC_TEX0 => model.texture_coords = read_uv_buffer(child, vertex_count)?,
            MAGIC_COL0 => model.colours = read_colour_buffer(child, vertex_count)?,
            MAGIC_BONE => model.skin = read_skin_buffer(child, vertex_count)?,
            MAGIC_BMAP => {
                model.bone_map = read_bone_map(child)?;
                model.pretransformed = true;
            }
            MAGIC_BNAM => model.parent = Some(read_parent_name(child)?),
            magic => log::debug!("ignoring {magic} child in model segment"),
        }
    }

    builder.add_model(model);
    Ok(())
}

fn read_material_name(mut mnam: Reader, model: &mut Model) -> Result<()> {
    let name = mnam.read_string()?;
    model.material.name = name.to_owned();
    model.name = name.to_owned();
    Ok(())
}

fn read_parent_name(mut bnam: Reader) -> Result<String> {
    Ok(bnam.read_string()?.to_owned())
}

/// `TNAM` names one of the four texture slots; out-of-range slots are
/// silently dropped.
fn read_texture_name(mut tnam: Reader, textures: &mut [String; 4]) -> Result<()> {
    let slot = tnam.read::<U32<LittleEndian>>()?.get() as usize;
    let name = tnam.read_string()?;
    if let Some(out) = textures.get_mut(slot) {
        *out = name.to_owned();
    }
    Ok(())
}

fn read_render_type_ps2(mut rtyp: Reader) -> Result<RenderType> {
    Ok(RenderType::from_raw(rtyp.read::<U32<LittleEndian>>()?.get()))
}

fn read_index_buffer(mut ibuf: Reader) -> Result<Vec<u16>> {
    let count = ibuf.read::<U32<LittleEndian>>()?.get() as usize;
    let indices = ibuf.read_array::<U16<LittleEndian>>(count)?;
    Ok(indices.iter().map(|index| index.get()).collect())
}

/// Splits a PS2 strip buffer into its triangle strips. Each strip leads with
/// two indices whose high bit is set; the markers are masked off.
fn read_strip_buffer(
    mut strip_buffer: Reader,
    index_count: usize,
    strips: &mut Vec<Vec<u16>>,
) -> Result<()> {
    let raw = strip_buffer.read_array::<U16<LittleEndian>>(index_count)?;
    let indices: Vec<u16> = raw.iter().map(|index| index.get()).collect();

    let mut pos = 0;
    while pos < indices.len() {
        strips.push(read_vertex_strip(&indices, &mut pos)?);
    }
    Ok(())
}

fn read_vertex_strip(indices: &[u16], pos: &mut usize) -> Result<Vec<u16>> {
    if *pos + 1 >= indices.len() {
        return Err(Error::InvalidIndexBuffer);
    }

    let mut strip = Vec::with_capacity(32);
    strip.push(indices[*pos] & 0x7FFF);
    strip.push(indices[*pos + 1] & 0x7FFF);
    *pos += 2;

    while *pos < indices.len() && indices[*pos] & 0x8000 == 0 {
        strip.push(indices[*pos]);
        *pos += 1;
    }

    Ok(strip)
}

fn read_positions_buffer(
    mut positions_buffer: Reader,
    vertex_count: usize,
    vertex_box: &[Vec3; 2],
) -> Result<Vec<Vec3>> {
    let compressed = positions_buffer.read_array::<[U16<LittleEndian>; 3]>(vertex_count)?;
    Ok(compressed
        .iter()
        .map(|c| vbuf::dequantize_position([c[0].get(), c[1].get(), c[2].get()], vertex_box))
        .collect())
}

fn read_normals_buffer(mut normals_buffer: Reader, vertex_count: usize) -> Result<Vec<Vec3>> {
    let compressed = normals_buffer.read_array::<[i8; 3]>(vertex_count)?;
    Ok(compressed
        .iter()
        .map(|c| Vec3::new(c[0] as f32, c[1] as f32, c[2] as f32) / 127.0)
        .collect())
}

fn read_uv_buffer(mut uv_buffer: Reader, vertex_count: usize) -> Result<Vec<Vec2>> {
    let compressed = uv_buffer.read_array::<[I16<LittleEndian>; 2]>(vertex_count)?;
    Ok(compressed
        .iter()
        .map(|c| vbuf::dequantize_texture_coords([c[0].get(), c[1].get()]))
        .collect())
}

fn read_colour_buffer(mut colour_buffer: Reader, vertex_count: usize) -> Result<Vec<Vec4>> {
    let packed = colour_buffer.read_array::<U32<LittleEndian>>(vertex_count)?;
    Ok(packed.iter().map(|colour| bgra_to_rgba(unpack_snorm4x8(colour.get()))).collect())
}

/// `BONE` hard-skins every vertex to a single bone.
fn read_skin_buffer(mut bone_buffer: Reader, vertex_count: usize) -> Result<Vec<SkinEntry>> {
    let hardskin = bone_buffer.read_array::<u8>(vertex_count)?;
    Ok(hardskin.iter().map(|&bone| SkinEntry::hard(bone)).collect())
}

fn read_bone_map(mut bone_map: Reader) -> Result<Vec<u8>> {
    let count = bone_map.read::<U32<LittleEndian>>()?.get() as usize;
    Ok(bone_map.read_array::<u8>(count)?.to_vec())
}

fn read_vec3(reader: &mut Reader) -> Result<Vec3> {
    let components = reader.read::<[F32<LittleEndian>; 3]>()?;
    Ok(Vec3::new(components[0].get(), components[1].get(), components[2].get()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(magic: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + payload.len());
        bytes.extend_from_slice(magic);
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    fn name_chunk(name: &str) -> Vec<u8> {
        let mut payload = name.as_bytes().to_vec();
        payload.push(0);
        chunk(b"NAME", &payload)
    }

    fn info_payload(leading_ints: usize) -> Vec<u8> {
        let mut payload = vec![0u8; leading_ints * 4];
        for corner in [[-1.0f32; 3], [1.0; 3], [-2.0; 3], [2.0; 3]] {
            for component in corner {
                payload.extend_from_slice(&component.to_le_bytes());
            }
        }
        payload.extend_from_slice(&0i32.to_le_bytes());
        payload.extend_from_slice(&6u32.to_le_bytes());
        payload
    }

    #[test]
    fn lod_suffix_rule() {
        let cases = [
            ("CrateLOD1", ("Crate", Lod::One)),
            ("CrateLOD2", ("Crate", Lod::Two)),
            ("CrateLOWD", ("Crate", Lod::LowRes)),
            ("CrateLOD3", ("CrateLOD3", Lod::Zero)),
            ("Crate", ("Crate", Lod::Zero)),
            ("ab", ("ab", Lod::Zero)),
        ];
        for (name, (base, lod)) in cases {
            let bytes = name_chunk(name);
            let (read_base, read_lod) = read_model_name(Reader::new(&bytes).unwrap()).unwrap();
            assert_eq!(read_base, base, "{name}");
            assert_eq!(read_lod, lod, "{name}");
        }
    }

    #[test]
    fn model_info_sizes() {
        for (leading, expected) in [(3usize, 68usize), (4, 72)] {
            let payload = info_payload(leading);
            assert_eq!(payload.len(), expected);
            let bytes = chunk(b"INFO", &payload);
            let info = read_model_info(Reader::new(&bytes).unwrap()).unwrap();
            assert_eq!(info.vertex_box, [Vec3::splat(-1.0), Vec3::splat(1.0)]);
            assert_eq!(info.visibility_box, [Vec3::splat(-2.0), Vec3::splat(2.0)]);
            assert_eq!(info.face_count, 6);
        }

        for size in [67usize, 69, 71, 73] {
            let bytes = chunk(b"INFO", &vec![0u8; size]);
            assert!(matches!(
                read_model_info(Reader::new(&bytes).unwrap()),
                Err(Error::UnknownModelInfo(s)) if s == size
            ));
        }
    }

    #[test]
    fn strip_segmentation() {
        let indices = [0x8000, 0x8001, 2, 3, 0x8004, 0x8005, 6];
        let mut pos = 0;
        assert_eq!(read_vertex_strip(&indices, &mut pos).unwrap(), [0, 1, 2, 3]);
        assert_eq!(read_vertex_strip(&indices, &mut pos).unwrap(), [4, 5, 6]);
        assert_eq!(pos, indices.len());
    }

    #[test]
    fn strip_needs_two_leading_indices() {
        let indices = [0x8000, 0x8001, 2, 0x8003];
        let mut pos = 0;
        assert_eq!(read_vertex_strip(&indices, &mut pos).unwrap(), [0, 1, 2]);
        assert!(matches!(read_vertex_strip(&indices, &mut pos), Err(Error::InvalidIndexBuffer)));
    }

    #[test]
    fn texture_slot_out_of_range_is_ignored() {
        let mut payload = 4u32.to_le_bytes().to_vec();
        payload.extend_from_slice(b"tex\0");
        let bytes = chunk(b"TNAM", &payload);

        let mut textures: [String; 4] = Default::default();
        read_texture_name(Reader::new(&bytes).unwrap(), &mut textures).unwrap();
        assert!(textures.iter().all(String::is_empty));

        let mut payload = 1u32.to_le_bytes().to_vec();
        payload.extend_from_slice(b"tex\0");
        let bytes = chunk(b"TNAM", &payload);
        read_texture_name(Reader::new(&bytes).unwrap(), &mut textures).unwrap();
        assert_eq!(textures[1], "tex");
    }

    #[test]
    fn ps2_buffers() {
        let vertex_box = [Vec3::splat(-1.0), Vec3::splat(1.0)];

        let mut payload = Vec::new();
        for _ in 0..3 {
            for component in [65535u16, 65535, 65535] {
                payload.extend_from_slice(&component.to_le_bytes());
            }
        }
        let bytes = chunk(b"POSI", &payload);
        let positions =
            read_positions_buffer(Reader::new(&bytes).unwrap(), 3, &vertex_box).unwrap();
        assert_eq!(positions, vec![Vec3::splat(1.0); 3]);

        let bytes = chunk(b"NORM", &[127u8, 127, 127]);
        let normals = read_normals_buffer(Reader::new(&bytes).unwrap(), 1).unwrap();
        assert_eq!(normals, [Vec3::splat(1.0)]);

        let bytes = chunk(b"TEX0", &[0; 4]);
        let uvs = read_uv_buffer(Reader::new(&bytes).unwrap(), 1).unwrap();
        assert_eq!(uvs, [Vec2::new(0.0, 1.0)]);

        let bytes = chunk(b"BONE", &[5, 9]);
        let skin = read_skin_buffer(Reader::new(&bytes).unwrap(), 2).unwrap();
        assert_eq!(skin, [SkinEntry::hard(5), SkinEntry::hard(9)]);

        let mut payload = 2u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&[3, 1]);
        let bytes = chunk(b"BMAP", &payload);
        assert_eq!(read_bone_map(Reader::new(&bytes).unwrap()).unwrap(), [3, 1]);
    }

    #[test]
    fn ps2_colours_swizzle_snorm() {
        let bytes = chunk(b"COL0", &[127, 0, 0, 127]);
        let colours = read_colour_buffer(Reader::new(&bytes).unwrap(), 1).unwrap();
        assert_eq!(colours, [Vec4::new(0.0, 0.0, 1.0, 1.0)]);
    }
}
