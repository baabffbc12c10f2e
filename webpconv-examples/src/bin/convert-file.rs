// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

// Converts a single .webp file next to itself into a .jpg and a .png and prints the sizes.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use log::info;
use webpconv_codec::{
    decode_webp, encode_jpeg, encode_png, has_webp_extension, JPEG_EXTENSION, PNG_EXTENSION,
};

#[derive(Debug, Parser)]
#[command(about = "Convert a WebP file to JPEG and PNG")]
struct Args {
    /// The .webp file to convert
    input: PathBuf,

    /// JPEG quality (1-100)
    #[arg(long, default_value_t = 100)]
    quality: u8,
}

fn file_size(path: &Path) -> anyhow::Result<u64> {
    let meta = fs::metadata(path)
        .with_context(|| format!("failed to get file stats for {}", path.display()))?;
    Ok(meta.len())
}

fn convert(input: &Path, quality: u8) -> anyhow::Result<()> {
    if !has_webp_extension(&input.to_string_lossy()) {
        bail!("provided file is not a .webp file");
    }

    let data = fs::read(input).with_context(|| format!("unable to open {}", input.display()))?;
    let image = decode_webp(&data).context("failed to decode webp image")?;

    let jpg_path = input.with_extension(JPEG_EXTENSION);
    let png_path = input.with_extension(PNG_EXTENSION);
    let jpg = encode_jpeg(&image, quality).context("failed to encode jpg")?;
    fs::write(&jpg_path, jpg)
        .with_context(|| format!("unable to create {}", jpg_path.display()))?;
    let png = encode_png(&image).context("failed to encode png")?;
    fs::write(&png_path, png)
        .with_context(|| format!("unable to create {}", png_path.display()))?;

    for path in [input, jpg_path.as_path(), png_path.as_path()] {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        info!("{name} size: {} bytes", file_size(path)?);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if !(1..=100).contains(&args.quality) {
        bail!("--quality must be between 1 and 100");
    }
    convert(&args.input, args.quality)
}
