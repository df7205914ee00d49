use std::{borrow::Cow, fs::DirBuilder, path::PathBuf};

use anyhow::{bail, Context, Result};
use argh::FromArgs;
use zerolib::{
    format::{
        model::{read_model, Platform, MAGIC_MODL},
        odf::{read_object, FileSaver},
        ucfb::Reader,
        Magic,
    },
    msh::Builders,
    util::file::map_file,
};

#[derive(FromArgs, PartialEq, Debug)]
/// process munged level files
#[argh(subcommand, name = "level")]
pub struct Args {
    #[argh(subcommand)]
    command: SubCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum SubCommand {
    Extract(ExtractArgs),
}

#[derive(FromArgs, PartialEq, Debug)]
/// extract object descriptors and aggregate models from a level file
#[argh(subcommand, name = "extract")]
pub struct ExtractArgs {
    #[argh(positional)]
    /// input level file
    input: PathBuf,
    #[argh(option, short = 'o', default = "PathBuf::from(\"extracted\")")]
    /// output directory
    output: PathBuf,
    #[argh(option, default = "Platform::Pc", from_str_fn(parse_platform))]
    /// input platform: pc, xbox or ps2
    platform: Platform,
}

fn parse_platform(value: &str) -> Result<Platform, String> {
    match value {
        "pc" => Ok(Platform::Pc),
        "xbox" => Ok(Platform::Xbox),
        "ps2" => Ok(Platform::Ps2),
        other => Err(format!("unknown platform '{other}'")),
    }
}

pub fn run(args: Args) -> Result<()> {
    match args.command {
        SubCommand::Extract(c_args) => extract(c_args),
    }
}

const MAGIC_UCFB: Magic = Magic::new(b"ucfb");

/// Object chunks and the class header their descriptors carry.
const OBJECT_CLASSES: [(Magic, &str); 4] = [
    (Magic::new(b"entc"), "GameObjectClass"),
    (Magic::new(b"expc"), "ExplosionClass"),
    (Magic::new(b"ordc"), "OrdnanceClass"),
    (Magic::new(b"wpnc"), "WeaponClass"),
];

fn extract(args: ExtractArgs) -> Result<()> {
    let data = map_file(&args.input)?;
    let mut root = Reader::new(&data)
        .with_context(|| format!("'{}' is not a munged level file", args.input.display()))?;
    if root.magic() != MAGIC_UCFB {
        bail!("'{}' is not a ucfb container (found {})", args.input.display(), root.magic());
    }

    let saver = DirectorySaver { root: args.output };
    let builders = Builders::new();

    while !root.at_end() {
        let Some(child) = root.try_read_child() else {
            bail!("malformed chunk at the top level, stopping");
        };

        let magic = child.magic();
        let result = if magic == MAGIC_MODL {
            read_model(child, args.platform, &builders).map_err(anyhow::Error::from)
        } else if let Some((_, class)) = OBJECT_CLASSES.iter().find(|(m, _)| *m == magic) {
            read_object(child, class, &lookup_property_name, &saver)
        } else {
            log::debug!("skipping unhandled {magic} chunk");
            Ok(())
        };

        // a bad chunk is abandoned, the walk continues with the next one
        if let Err(e) = result {
            log::warn!("failed to decode {magic} chunk: {e:#}");
        }
    }

    for (name, builder) in builders.into_inner() {
        let models = builder.models();
        let strips: usize = models.iter().map(|m| m.strips.len()).sum();
        let positions: usize = models.iter().map(|m| m.positions.len()).sum();
        log::info!(
            "model {name}: {} segment(s), {strips} strip(s), {positions} position(s)",
            models.len()
        );
    }

    Ok(())
}

/// Property-name hashes are emitted as hex until a reverse-hash table is
/// wired in.
fn lookup_property_name(hash: u32) -> Cow<'static, str> {
    Cow::Owned(format!("0x{hash:08x}"))
}

struct DirectorySaver {
    root: PathBuf,
}

impl FileSaver for DirectorySaver {
    fn save_file(
        &self,
        contents: &str,
        directory: &str,
        name: &str,
        extension: &str,
    ) -> Result<()> {
        let dir = self.root.join(directory);
        DirBuilder::new().recursive(true).create(&dir)?;
        let path = dir.join(format!("{name}{extension}"));
        std::fs::write(&path, contents)
            .with_context(|| format!("failed to write '{}'", path.display()))?;
        Ok(())
    }
}
