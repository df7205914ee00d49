//! Numeric conventions shared by the chunk decoders: linear range mapping
//! and the packed-colour formats stored in material and vertex data.

use glam::Vec4;

/// Linearly maps `value` from `old` onto `new`.
pub fn range_convert(value: f32, old: [f32; 2], new: [f32; 2]) -> f32 {
    (value - old[0]) * ((new[1] - new[0]) / (old[1] - old[0])) + new[0]
}

/// Fractional part as `x - floor(x)`, staying in `[0, 1)` for negative input.
pub fn fract(value: f32) -> f32 {
    value - value.floor()
}

/// Unpacks four unsigned bytes, low to high, onto `[0, 1]`.
pub fn unpack_unorm4x8(packed: u32) -> Vec4 {
    let b = packed.to_le_bytes();
    Vec4::new(b[0] as f32, b[1] as f32, b[2] as f32, b[3] as f32) / 255.0
}

/// Unpacks four signed bytes, low to high, onto `[-1, 1]`.
pub fn unpack_snorm4x8(packed: u32) -> Vec4 {
    let b = packed.to_le_bytes();
    Vec4::new(
        (b[0] as i8 as f32 / 127.0).clamp(-1.0, 1.0),
        (b[1] as i8 as f32 / 127.0).clamp(-1.0, 1.0),
        (b[2] as i8 as f32 / 127.0).clamp(-1.0, 1.0),
        (b[3] as i8 as f32 / 127.0).clamp(-1.0, 1.0),
    )
}

pub fn pack_unorm4x8(value: Vec4) -> u32 {
    let b = [
        (value.x.clamp(0.0, 1.0) * 255.0).round() as u8,
        (value.y.clamp(0.0, 1.0) * 255.0).round() as u8,
        (value.z.clamp(0.0, 1.0) * 255.0).round() as u8,
        (value.w.clamp(0.0, 1.0) * 255.0).round() as u8,
    ];
    u32::from_le_bytes(b)
}

pub fn pack_snorm4x8(value: Vec4) -> u32 {
    let b = [
        (value.x.clamp(-1.0, 1.0) * 127.0).round() as i8 as u8,
        (value.y.clamp(-1.0, 1.0) * 127.0).round() as i8 as u8,
        (value.z.clamp(-1.0, 1.0) * 127.0).round() as i8 as u8,
        (value.w.clamp(-1.0, 1.0) * 127.0).round() as i8 as u8,
    ];
    u32::from_le_bytes(b)
}

/// Vertex colours are stored BGRA; decoded colours are RGBA.
pub fn bgra_to_rgba(colour: Vec4) -> Vec4 {
    Vec4::new(colour.z, colour.y, colour.x, colour.w)
}
