//! Object-definition chunks, re-emitted as `.odf` text files.
//!
//! An object chunk holds a `BASE` (class label), a `TYPE` (the descriptor
//! file name) and a run of `PROP` children, each a name hash plus a value
//! string. Property names are resolved through a caller-supplied hash lookup
//! and the finished text goes through the [`FileSaver`] seam.

use std::borrow::Cow;

use zerocopy::byteorder::{LittleEndian, U32};

use super::{ucfb::Reader, Magic, Result};

const MAGIC_BASE: Magic = Magic::new(b"BASE");
const MAGIC_TYPE: Magic = Magic::new(b"TYPE");
const MAGIC_PROP: Magic = Magic::new(b"PROP");

/// Property hash naming the geometry a game object uses.
pub const GEOMETRY_NAME_HASH: u32 = 0x47C8_6B4A;

/// Destination for emitted files, keyed by a directory tag, a base name and
/// an extension.
pub trait FileSaver {
    fn save_file(
        &self,
        contents: &str,
        directory: &str,
        name: &str,
        extension: &str,
    ) -> anyhow::Result<()>;
}

/// Emits the descriptor for one object chunk.
///
/// `type_tag` is the bracketed class header of the emitted file and `lookup`
/// resolves property-name hashes back into names.
pub fn read_object(
    mut object: Reader,
    type_tag: &str,
    lookup: &dyn Fn(u32) -> Cow<'static, str>,
    saver: &dyn FileSaver,
) -> anyhow::Result<()> {
    let mut text = String::with_capacity(1024);
    write_bracketed(type_tag, &mut text);

    let mut base = object.read_child_strict(MAGIC_BASE)?;
    write_property("ClassLabel", base.read_string()?, &mut text);

    let mut type_chunk = object.read_child_strict(MAGIC_TYPE)?;
    let file_name = type_chunk.read_string()?;

    let properties = read_properties(&mut object)?;

    if let Some((_, geometry)) = properties.iter().find(|(hash, _)| *hash == GEOMETRY_NAME_HASH) {
        write_property("GeometryName", &format!("{geometry}.msh"), &mut text);
    }

    text.push('\n');
    write_bracketed("Properties", &mut text);

    for (hash, value) in &properties {
        write_property(&lookup(*hash), value, &mut text);
    }

    saver.save_file(&text, "odf", file_name, ".odf")
}

fn read_properties<'a>(object: &mut Reader<'a>) -> Result<Vec<(u32, &'a str)>> {
    let mut properties = Vec::with_capacity(128);
    while !object.at_end() {
        let mut property = object.read_child_strict(MAGIC_PROP)?;
        let hash = property.read::<U32<LittleEndian>>()?.get();
        let value = property.read_string()?;
        properties.push((hash, value));
    }
    Ok(properties)
}

fn write_bracketed(what: &str, to: &mut String) {
    to.push('[');
    to.push_str(what);
    to.push_str("]\n\n");
}

fn write_property(name: &str, value: &str, to: &mut String) {
    to.push_str(name);
    to.push_str(" = \"");
    to.push_str(value);
    to.push_str("\"\n");
}
