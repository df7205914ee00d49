//! Interleaved vertex buffers (`VBUF`), used by the PC and Xbox dialects.
//!
//! A buffer is `{vertex_count: u32, stride: u32, flags: u32}` followed by
//! `vertex_count` packed records. The flag word selects which attributes a
//! record carries and whether each is stored compressed. A segment may hold
//! several buffers; attributes missing from one may be supplied by another,
//! and an attribute already populated on the model is never overwritten.

use std::io::Cursor;

use binrw::{binread, BinReaderExt};
use glam::{Vec2, Vec3, Vec4};
use zerocopy::{
    byteorder::{LittleEndian, U32},
    FromBytes, FromZeroes,
};

use super::{ucfb::Reader, Error, Result};
use crate::{
    msh::{Model, SkinEntry},
    util::math::{bgra_to_rgba, fract, range_convert, unpack_unorm4x8},
};

const POSITION: u32 = 0x0002;
const BLENDINFO: u32 = 0x0004;
const NORMAL: u32 = 0x0020;
const TANGENTS: u32 = 0x0040;
const COLOUR: u32 = 0x0080;
const STATIC_LIGHTING: u32 = 0x0100;
const TEXCOORDS: u32 = 0x0200;

const POSITION_COMPRESSED: u32 = 0x1000;
const BLENDINFO_COMPRESSED: u32 = 0x2000;
const NORMAL_COMPRESSED: u32 = 0x4000;
const TEXCOORD_COMPRESSED: u32 = 0x8000;

const KNOWN_FLAGS: u32 = POSITION
    | BLENDINFO
    | NORMAL
    | TANGENTS
    | COLOUR
    | STATIC_LIGHTING
    | TEXCOORDS
    | POSITION_COMPRESSED
    | BLENDINFO_COMPRESSED
    | NORMAL_COMPRESSED
    | TEXCOORD_COMPRESSED;

#[inline]
const fn has(flags: u32, mask: u32) -> bool {
    flags & mask == mask
}

#[derive(FromBytes, FromZeroes)]
#[repr(C, packed)]
struct VbufHeader {
    count: U32<LittleEndian>,
    stride: U32<LittleEndian>,
    flags: U32<LittleEndian>,
}

#[binread]
#[br(little, import { flags: u32 })]
struct PackedVertex {
    #[br(if(has(flags, POSITION) && !has(flags, POSITION_COMPRESSED)))]
    position: Option<[f32; 3]>,
    #[br(if(has(flags, POSITION | POSITION_COMPRESSED)))]
    position_quantized: Option<[u16; 3]>,
    #[br(if(has(flags, BLENDINFO) && !has(flags, BLENDINFO_COMPRESSED)))]
    skin: Option<RawSkin>,
    #[br(if(has(flags, BLENDINFO | BLENDINFO_COMPRESSED)))]
    skin_packed: Option<[u8; 4]>,
    #[br(if(has(flags, NORMAL) && !has(flags, NORMAL_COMPRESSED)))]
    normal: Option<[f32; 3]>,
    #[br(if(has(flags, NORMAL | NORMAL_COMPRESSED)))]
    normal_packed: Option<u32>,
    // Tangent pairs contribute to the stride but have no home on the model.
    #[br(if(has(flags, TANGENTS) && !has(flags, NORMAL_COMPRESSED)))]
    _tangents: Option<[[f32; 3]; 2]>,
    #[br(if(has(flags, TANGENTS | NORMAL_COMPRESSED)))]
    _tangents_packed: Option<[u32; 2]>,
    #[br(if(has(flags, COLOUR)))]
    colour: Option<u32>,
    #[br(if(has(flags, STATIC_LIGHTING)))]
    static_lighting: Option<u32>,
    #[br(if(has(flags, TEXCOORDS) && !has(flags, TEXCOORD_COMPRESSED)))]
    texture_coords: Option<[f32; 2]>,
    #[br(if(has(flags, TEXCOORDS | TEXCOORD_COMPRESSED)))]
    texture_coords_quantized: Option<[i16; 2]>,
}

#[binread]
#[br(little)]
struct RawSkin {
    bones: [u8; 4],
    weights: [f32; 3],
}

/// Byte size of one packed record with the given flags.
fn record_stride(flags: u32) -> u32 {
    let normal_size = if has(flags, NORMAL_COMPRESSED) { 4 } else { 12 };
    let mut stride = 0;
    if has(flags, POSITION) {
        stride += if has(flags, POSITION_COMPRESSED) { 6 } else { 12 };
    }
    if has(flags, BLENDINFO) {
        stride += if has(flags, BLENDINFO_COMPRESSED) { 4 } else { 16 };
    }
    if has(flags, NORMAL) {
        stride += normal_size;
    }
    if has(flags, TANGENTS) {
        stride += 2 * normal_size;
    }
    if has(flags, COLOUR) {
        stride += 4;
    }
    if has(flags, STATIC_LIGHTING) {
        stride += 4;
    }
    if has(flags, TEXCOORDS) {
        stride += if has(flags, TEXCOORD_COMPRESSED) { 4 } else { 8 };
    }
    stride
}

#[derive(Default)]
struct VertexStreams {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    texture_coords: Vec<Vec2>,
    colours: Vec<Vec4>,
    skin: Vec<SkinEntry>,
    pretransformed: bool,
}

/// Decodes the collected `VBUF` chunks of a PC segment into `model`.
pub fn read_vbuf(vbufs: Vec<Reader>, model: &mut Model, vertex_box: &[Vec3; 2]) -> Result<()> {
    for vbuf in vbufs {
        if let Some(streams) = read_buffer(vbuf, vertex_box, false)? {
            merge_into(model, streams);
        }
    }
    Ok(())
}

/// Decodes a single Xbox `VBUF` chunk into `model`.
pub fn read_vbuf_xbox(vbuf: Reader, model: &mut Model, vertex_box: &[Vec3; 2]) -> Result<()> {
    if let Some(streams) = read_buffer(vbuf, vertex_box, true)? {
        merge_into(model, streams);
    }
    Ok(())
}

fn read_buffer(
    mut vbuf: Reader,
    vertex_box: &[Vec3; 2],
    xbox: bool,
) -> Result<Option<VertexStreams>> {
    let header: VbufHeader = vbuf.read()?;
    let count = header.count.get() as usize;
    let stride = header.stride.get();
    let flags = header.flags.get();

    let expected = record_stride(flags);
    if flags & !KNOWN_FLAGS != 0 || stride != expected {
        log::warn!(
            "skipping vertex buffer with unrecognised layout: flags {flags:#06x}, \
             stride {stride} (expected {expected})"
        );
        return Ok(None);
    }

    let bytes = vbuf.read_array_unaligned::<u8>(count * stride as usize)?;
    let mut cursor = Cursor::new(bytes);

    let mut streams =
        VertexStreams { pretransformed: has(flags, POSITION | POSITION_COMPRESSED), ..Default::default() };
    for _ in 0..count {
        let vertex = cursor
            .read_le_args::<PackedVertex>(binrw::args! { flags })
            .map_err(|_| Error::InvalidVertexBuffer)?;

        if let Some(position) = vertex.position {
            streams.positions.push(Vec3::from_array(position));
        }
        if let Some(quantized) = vertex.position_quantized {
            streams.positions.push(dequantize_position(quantized, vertex_box));
        }
        if let Some(skin) = vertex.skin {
            streams.skin.push(SkinEntry {
                bones: [skin.bones[0], skin.bones[1], skin.bones[2]],
                weights: Vec3::from_array(skin.weights),
            });
        }
        if let Some(bones) = vertex.skin_packed {
            streams.skin.push(SkinEntry::hard(bones[0]));
        }
        if let Some(normal) = vertex.normal {
            streams.normals.push(Vec3::from_array(normal));
        }
        if let Some(packed) = vertex.normal_packed {
            streams.normals.push(if xbox {
                decode_normal_xbox(packed)
            } else {
                decode_normal_packed(packed)
            });
        }
        if let Some(colour) = vertex.colour.or(vertex.static_lighting) {
            streams.colours.push(bgra_to_rgba(unpack_unorm4x8(colour)));
        }
        if let Some(uv) = vertex.texture_coords {
            streams.texture_coords.push(Vec2::from_array(uv));
        }
        if let Some(quantized) = vertex.texture_coords_quantized {
            streams.texture_coords.push(dequantize_texture_coords(quantized));
        }
    }

    Ok(Some(streams))
}

fn merge_into(model: &mut Model, streams: VertexStreams) {
    if model.positions.is_empty() {
        model.positions = streams.positions;
    }
    if model.normals.is_empty() {
        model.normals = streams.normals;
    }
    if model.texture_coords.is_empty() {
        model.texture_coords = streams.texture_coords;
    }
    if model.colours.is_empty() {
        model.colours = streams.colours;
    }
    if model.skin.is_empty() {
        model.skin = streams.skin;
    }
    model.pretransformed |= streams.pretransformed;
}

/// Maps a quantized position from `[0, 65535]` onto the vertex box.
pub(crate) fn dequantize_position(quantized: [u16; 3], vertex_box: &[Vec3; 2]) -> Vec3 {
    let [min, max] = *vertex_box;
    Vec3::new(
        range_convert(quantized[0] as f32, [0.0, 65535.0], [min.x, max.x]),
        range_convert(quantized[1] as f32, [0.0, 65535.0], [min.y, max.y]),
        range_convert(quantized[2] as f32, [0.0, 65535.0], [min.z, max.z]),
    )
}

/// Maps quantized texture coordinates, flipping V with fractional wrapping.
pub(crate) fn dequantize_texture_coords(quantized: [i16; 2]) -> Vec2 {
    let u = quantized[0] as f32 / 2048.0;
    let v = quantized[1] as f32 / 2048.0;
    Vec2::new(u, 1.0 - fract(v))
}

fn decode_normal_packed(packed: u32) -> Vec3 {
    let b = packed.to_le_bytes();
    Vec3::new(b[0] as i8 as f32, b[1] as i8 as f32, b[2] as i8 as f32) / 127.0
}

// 11/11/10 signed-normalized packing used by the Xbox vertex declarations.
fn decode_normal_xbox(packed: u32) -> Vec3 {
    Vec3::new(
        sign_extend(packed & 0x7FF, 11) as f32 / 1023.0,
        sign_extend((packed >> 11) & 0x7FF, 11) as f32 / 1023.0,
        sign_extend(packed >> 22, 10) as f32 / 511.0,
    )
}

fn sign_extend(value: u32, bits: u32) -> i32 {
    ((value << (32 - bits)) as i32) >> (32 - bits)
}
