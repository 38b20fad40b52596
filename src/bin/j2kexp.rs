//! j2kexp CLI - JPEG 2000 Part 1 encoder and decoder.
//!
//! Set `RUST_LOG=debug` (or `trace`) to follow the codec stages.

use clap::{Parser, Subcommand, ValueEnum};
use jpegexp_j2k::jpeg2000::parser::parse;
use jpegexp_j2k::jpeg2000::jp2::Jp2Reader;
use jpegexp_j2k::{FrameInfo, J2kDecoder, J2kEncoder, ProgressionOrder};
use std::fs;
use std::path::PathBuf;

/// JPEG 2000 Part 1 codec
#[derive(Parser)]
#[command(name = "j2kexp")]
#[command(author = "jpegexp-rs contributors")]
#[command(version)]
#[command(about = "Encode, decode and inspect JPEG 2000 codestreams", long_about = None)]
#[command(after_help = "EXAMPLES:
    j2kexp encode -i image.pgm -o image.j2k
    j2kexp encode -i pixels.raw -o image.j2k -w 512 -H 512 -n 3 --lossy -q 80
    j2kexp decode -i image.j2k -o image.ppm -f pnm
    j2kexp info -i image.jp2")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode raw 8-bit samples or a PGM/PPM file into a codestream
    #[command(visible_alias = "e")]
    Encode {
        /// Input file: raw interleaved samples, or binary PGM/PPM
        #[arg(short, long)]
        input: PathBuf,

        /// Output codestream (.j2k)
        #[arg(short, long)]
        output: PathBuf,

        /// Image width in pixels (raw input only)
        #[arg(short, long)]
        width: Option<u32>,

        /// Image height in pixels (raw input only)
        #[arg(short = 'H', long)]
        height: Option<u32>,

        /// Number of components (raw input only)
        #[arg(short = 'n', long, default_value = "1")]
        components: u32,

        /// Use the irreversible 9/7 path
        #[arg(long)]
        lossy: bool,

        /// Quality level (1-100, lossy only)
        #[arg(short, long, default_value = "85")]
        quality: u8,

        /// Wavelet decomposition levels
        #[arg(short, long, default_value = "5")]
        levels: u8,

        /// Number of quality layers
        #[arg(long, default_value = "1")]
        layers: u16,

        /// Packet progression order
        #[arg(short, long, default_value = "lrcp", value_enum)]
        progression: Progression,

        /// Code-block width and height (power of two)
        #[arg(long, default_value = "64")]
        codeblock: u32,

        /// Tile width and height; the whole image when absent
        #[arg(short, long)]
        tile: Option<u32>,

        /// Emit SOP markers before each packet
        #[arg(long)]
        sop: bool,

        /// Emit EPH markers after each packet header
        #[arg(long)]
        eph: bool,

        /// Disable the multiple component transform
        #[arg(long)]
        no_mct: bool,
    },

    /// Decode a codestream or JP2 file
    #[command(visible_alias = "d")]
    Decode {
        /// Input file (.j2k or .jp2)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for decoded pixels
        #[arg(short, long)]
        output: PathBuf,

        /// Output format: raw bytes or PGM/PPM
        #[arg(short, long, default_value = "raw", value_enum)]
        format: OutputFormat,

        /// Decode at most this many quality layers
        #[arg(long)]
        layers: Option<u16>,
    },

    /// Print main header fields
    #[command(visible_alias = "i")]
    Info {
        /// Input file (.j2k or .jp2)
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Raw interleaved samples
    Raw,
    /// Portable GrayMap / PixMap
    Pnm,
}

#[derive(Clone, Copy, ValueEnum)]
enum Progression {
    Lrcp,
    Rlcp,
    Rpcl,
    Pcrl,
    Cprl,
}

impl From<Progression> for ProgressionOrder {
    fn from(value: Progression) -> Self {
        match value {
            Progression::Lrcp => ProgressionOrder::Lrcp,
            Progression::Rlcp => ProgressionOrder::Rlcp,
            Progression::Rpcl => ProgressionOrder::Rpcl,
            Progression::Pcrl => ProgressionOrder::Pcrl,
            Progression::Cprl => ProgressionOrder::Cprl,
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Encode {
            input,
            output,
            width,
            height,
            components,
            lossy,
            quality,
            levels,
            layers,
            progression,
            codeblock,
            tile,
            sop,
            eph,
            no_mct,
        } => {
            let mut encoder = J2kEncoder::new();
            encoder.set_lossy(lossy);
            encoder.set_quality(quality);
            encoder.set_decomposition_levels(levels);
            encoder.set_layer_count(layers);
            encoder.set_progression_order(progression.into());
            encoder.set_codeblock_size(codeblock, codeblock);
            if let Some(size) = tile {
                encoder.set_tile_size(size, size);
            }
            encoder.set_sop(sop);
            encoder.set_eph(eph);
            encoder.set_color_transform(!no_mct);
            encode_image(&input, &output, width, height, components, &encoder)
        }
        Commands::Decode {
            input,
            output,
            format,
            layers,
        } => decode_image(&input, &output, &format, layers),
        Commands::Info { input } => show_info(&input),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn encode_image(
    input: &PathBuf,
    output: &PathBuf,
    width: Option<u32>,
    height: Option<u32>,
    components: u32,
    encoder: &J2kEncoder,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;

    let (frame_info, pixels) = if data.starts_with(b"P5") || data.starts_with(b"P6") {
        read_pnm(&data)?
    } else {
        let (Some(width), Some(height)) = (width, height) else {
            return Err("raw input needs --width and --height".into());
        };
        let frame_info = FrameInfo {
            width,
            height,
            bits_per_sample: 8,
            component_count: components,
        };
        (frame_info, &data[..])
    };

    let encoded = encoder.encode(pixels, &frame_info)?;
    fs::write(output, &encoded)?;
    println!(
        "✓ Encoded {}x{} image ({} components) to {:?}: {} bytes",
        frame_info.width,
        frame_info.height,
        frame_info.component_count,
        output,
        encoded.len()
    );
    Ok(())
}

fn decode_image(
    input: &PathBuf,
    output: &PathBuf,
    format: &OutputFormat,
    layers: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;
    let codestream = codestream_of(&data)?;

    let mut decoder = J2kDecoder::new();
    if let Some(layers) = layers {
        decoder.set_max_layers(layers);
    }
    let image = decoder.decode(codestream)?;

    match format {
        OutputFormat::Raw => fs::write(output, &image.pixels)?,
        OutputFormat::Pnm => write_pnm(output, &image.pixels, image.width, image.height, image.component_count)?,
    }

    println!(
        "✓ Decoded {}x{} image ({} components) to {:?}",
        image.width, image.height, image.component_count, output
    );
    Ok(())
}

fn show_info(input: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;

    println!("File: {:?}", input);
    println!("Size: {} bytes", data.len());
    println!();
    println!(
        "Format: {}",
        if jpegexp_j2k::is_jp2_file(&data) {
            "JP2 Container (JPEG 2000)"
        } else if jpegexp_j2k::is_jpeg2000_codestream(&data) {
            "JPEG 2000 Codestream"
        } else {
            "Unknown"
        }
    );

    let codestream = parse(codestream_of(&data)?)?;
    let frame = &codestream.frame;
    let coding = &codestream.coding;
    let image = frame.image_rect();
    println!("  Dimensions:  {}x{}", image.width(), image.height());
    println!("  Origin:      {},{}", frame.x_origin, frame.y_origin);
    println!("  Components:  {}", frame.component_count());
    for (c, component) in frame.components.iter().enumerate() {
        println!(
            "    #{}: {} bits {}, subsampling {}x{}",
            c,
            component.precision,
            if component.is_signed { "signed" } else { "unsigned" },
            component.dx,
            component.dy
        );
    }
    println!(
        "  Tiles:       {} ({}x{})",
        frame.tile_count(),
        frame.tile_width,
        frame.tile_height
    );
    println!("  Wavelet:     {:?}", coding.wavelet);
    println!("  DWT levels:  {}", coding.decomposition_levels);
    println!("  Layers:      {}", coding.layer_count);
    println!("  Progression: {}", coding.progression_order.name());
    println!(
        "  Code-blocks: {}x{}",
        coding.codeblock_width(),
        coding.codeblock_height()
    );
    println!("  MCT:         {}", if coding.use_mct { "Yes" } else { "No" });
    println!(
        "  SOP/EPH:     {}/{}",
        if coding.use_sop { "Yes" } else { "No" },
        if coding.use_eph { "Yes" } else { "No" }
    );
    println!(
        "  Quantization: {:?}, {} guard bits",
        codestream.quantization.style, codestream.quantization.guard_bits
    );
    for comment in &codestream.comments {
        println!("  Comment:     {}", String::from_utf8_lossy(comment));
    }
    Ok(())
}

/// The codestream inside a JP2 file, or the data itself.
fn codestream_of(data: &[u8]) -> Result<&[u8], Box<dyn std::error::Error>> {
    if jpegexp_j2k::is_jp2_file(data) {
        return Jp2Reader::new(data)
            .find_codestream()?
            .ok_or_else(|| "JP2 file has no codestream box".into());
    }
    Ok(data)
}

/// Parses a binary PGM (P5) or PPM (P6) header.
fn read_pnm(data: &[u8]) -> Result<(FrameInfo, &[u8]), Box<dyn std::error::Error>> {
    let components = if data.starts_with(b"P5") { 1 } else { 3 };
    let mut position = 2;
    let mut fields = [0u32; 3];
    for field in &mut fields {
        loop {
            match data.get(position) {
                Some(b'#') => {
                    while data.get(position).is_some_and(|&b| b != b'\n') {
                        position += 1;
                    }
                }
                Some(b) if b.is_ascii_whitespace() => position += 1,
                Some(_) => break,
                None => return Err("truncated PNM header".into()),
            }
        }
        let start = position;
        while data.get(position).is_some_and(u8::is_ascii_digit) {
            position += 1;
        }
        *field = std::str::from_utf8(&data[start..position])?.parse()?;
    }
    // A single whitespace byte separates the header from the samples.
    position += 1;

    let [width, height, maximum] = fields;
    if maximum == 0 || maximum > 255 {
        return Err("only 8-bit PNM files are supported".into());
    }
    let frame_info = FrameInfo {
        width,
        height,
        bits_per_sample: (32 - maximum.leading_zeros()) as u8,
        component_count: components,
    };
    let size = width as usize * height as usize * components as usize;
    let pixels = data
        .get(position..position + size)
        .ok_or("PNM sample data is truncated")?;
    Ok((frame_info, pixels))
}

fn write_pnm(
    path: &PathBuf,
    pixels: &[u8],
    width: u32,
    height: u32,
    components: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    use std::io::Write;
    let mut file = fs::File::create(path)?;

    match components {
        1 => writeln!(file, "P5")?,
        3 => writeln!(file, "P6")?,
        _ => return Err(format!("PNM cannot hold {} components", components).into()),
    }
    writeln!(file, "{} {}", width, height)?;
    writeln!(file, "255")?;
    file.write_all(pixels)?;

    Ok(())
}
