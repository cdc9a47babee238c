use std::fs;
use std::path::PathBuf;

use bingo_tools::api::server::serve;
use bingo_tools::config::AppConfig;
use bingo_tools::pipeline::presets::{ID_PHOTO_SIZES, RESIZE_PRESETS};
use bingo_tools::pipeline::{
    compress_to_size, convert, crop_to_id_size, find_id_photo_size, find_resize_preset, resize,
    IdPhotoSize, ImageMime, ImagePayload,
};
use serde_json::json;
use tracing::level_filters::LevelFilter;
use tracing::info;
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> CliResult<()> {
    init_tracing();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    let rest = cli_args.iter().skip(1).cloned().collect::<Vec<_>>();
    match cli_args.first().map(String::as_str) {
        Some("compress") => return run_compress_cli(rest),
        Some("resize") => return run_resize_cli(rest),
        Some("convert") => return run_convert_cli(rest),
        Some("id-crop") => return run_id_crop_cli(rest),
        Some("presets") => return run_presets_cli(),
        Some("serve") => {}
        Some("-h" | "--help") => {
            print_usage();
            return Ok(());
        }
        _ => {}
    }

    let serve_args = if matches!(cli_args.first().map(String::as_str), Some("serve")) {
        rest
    } else {
        cli_args
    };
    let parsed = parse_serve_cli_args(serve_args.as_slice())?;
    let mut config = AppConfig::load(parsed.config_path.as_deref())?;
    if let Some(bind) = parsed.bind {
        config.bind = bind.parse()?;
    }

    serve(config).await?;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ServeCliArgs {
    config_path: Option<PathBuf>,
    bind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct IoPaths {
    input: PathBuf,
    output: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CompressCliArgs {
    paths: IoPaths,
    target_kb: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ResizeCliArgs {
    paths: IoPaths,
    width: u32,
    height: u32,
}

#[derive(Debug, Clone, PartialEq)]
struct ConvertCliArgs {
    paths: IoPaths,
    mime: ImageMime,
    quality: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct IdCropCliArgs {
    paths: IoPaths,
    size: IdPhotoSize,
}

/// Flags shared by every image subcommand, plus whatever the subcommand adds.
#[derive(Debug, Default)]
struct RawFlags {
    input: Option<String>,
    output: Option<String>,
    extra: Vec<(String, String)>,
}

impl RawFlags {
    fn value(&self, flag: &str) -> Option<&str> {
        self.extra
            .iter()
            .rev()
            .find(|(name, _)| name == flag)
            .map(|(_, value)| value.as_str())
    }

    fn paths(&self) -> CliResult<IoPaths> {
        let input = non_empty(self.input.as_deref())
            .ok_or_else(|| std::io::Error::other("Missing required --input"))?;
        let output = non_empty(self.output.as_deref())
            .ok_or_else(|| std::io::Error::other("Missing required --output"))?;
        Ok(IoPaths {
            input: PathBuf::from(input),
            output: PathBuf::from(output),
        })
    }
}

fn parse_flags(args: &[String], extra_flags: &[&str]) -> CliResult<RawFlags> {
    let mut flags = RawFlags::default();
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> CliResult<String> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--input" => flags.input = Some(needs_value(i)?),
            "--output" => flags.output = Some(needs_value(i)?),
            known if extra_flags.contains(&known) => {
                flags.extra.push((known.to_string(), needs_value(i)?));
            }
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
        i += 2;
    }
    Ok(flags)
}

fn parse_serve_cli_args(args: &[String]) -> CliResult<ServeCliArgs> {
    let mut parsed = ServeCliArgs::default();
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> CliResult<String> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--config" => {
                parsed.config_path = Some(PathBuf::from(needs_value(i)?));
                i += 2;
            }
            "--bind" => {
                parsed.bind = Some(needs_value(i)?);
                i += 2;
            }
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
    }
    Ok(parsed)
}

fn parse_compress_cli_args(args: &[String]) -> CliResult<CompressCliArgs> {
    let flags = parse_flags(args, &["--target-kb"])?;
    let target_kb = match flags.value("--target-kb") {
        Some(raw) => parse_positive(raw, "--target-kb")?,
        None => 100,
    };
    Ok(CompressCliArgs {
        paths: flags.paths()?,
        target_kb,
    })
}

fn parse_resize_cli_args(args: &[String]) -> CliResult<ResizeCliArgs> {
    let flags = parse_flags(args, &["--width", "--height", "--preset"])?;
    let (mut width, mut height) = match flags.value("--preset") {
        Some(id) => {
            let preset = find_resize_preset(id)
                .ok_or_else(|| std::io::Error::other(format!("Unknown resize preset: {id}")))?;
            (Some(preset.width), Some(preset.height))
        }
        None => (None, None),
    };
    if let Some(raw) = flags.value("--width") {
        width = Some(parse_positive(raw, "--width")?);
    }
    if let Some(raw) = flags.value("--height") {
        height = Some(parse_positive(raw, "--height")?);
    }
    let (Some(width), Some(height)) = (width, height) else {
        return Err(
            std::io::Error::other("Missing required --width/--height (or --preset)").into(),
        );
    };
    Ok(ResizeCliArgs {
        paths: flags.paths()?,
        width,
        height,
    })
}

fn parse_convert_cli_args(args: &[String]) -> CliResult<ConvertCliArgs> {
    let flags = parse_flags(args, &["--format", "--quality"])?;
    let mime = flags
        .value("--format")
        .ok_or_else(|| std::io::Error::other("Missing required --format"))?
        .parse::<ImageMime>()?;
    let quality = match flags.value("--quality") {
        Some(raw) => raw
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|q| (0.0..=1.0).contains(q))
            .ok_or_else(|| {
                std::io::Error::other(format!("--quality must be between 0 and 1, got '{raw}'"))
            })?,
        None => 0.92,
    };
    Ok(ConvertCliArgs {
        paths: flags.paths()?,
        mime,
        quality,
    })
}

fn parse_id_crop_cli_args(args: &[String]) -> CliResult<IdCropCliArgs> {
    let flags = parse_flags(args, &["--size"])?;
    let size = match flags.value("--size") {
        Some(id) => find_id_photo_size(id)
            .ok_or_else(|| std::io::Error::other(format!("Unknown ID photo size: {id}")))?,
        None => IdPhotoSize::default(),
    };
    Ok(IdCropCliArgs {
        paths: flags.paths()?,
        size,
    })
}

fn run_compress_cli(args: Vec<String>) -> CliResult<()> {
    if wants_help(&args) {
        print_usage();
        return Ok(());
    }
    let parsed = parse_compress_cli_args(args.as_slice())?;
    let source = read_image(&parsed.paths)?;
    let outcome = compress_to_size(&source, parsed.target_kb)?;
    write_image(&parsed.paths, &outcome.payload)?;
    print_json(json!({
        "ok": true,
        "output": parsed.paths.output.display().to_string(),
        "input_bytes": source.len(),
        "output_bytes": outcome.payload.len(),
        "target_bytes": outcome.target_bytes,
        "target_met": outcome.target_met,
        "rounds": outcome.attempts.len(),
        "final_quality": outcome.final_quality(),
    }))
}

fn run_resize_cli(args: Vec<String>) -> CliResult<()> {
    if wants_help(&args) {
        print_usage();
        return Ok(());
    }
    let parsed = parse_resize_cli_args(args.as_slice())?;
    let source = read_image(&parsed.paths)?;
    let resized = resize(&source, parsed.width, parsed.height)?;
    write_image(&parsed.paths, &resized)?;
    print_json(json!({
        "ok": true,
        "output": parsed.paths.output.display().to_string(),
        "width": parsed.width,
        "height": parsed.height,
        "mime": resized.mime(),
        "output_bytes": resized.len(),
    }))
}

fn run_convert_cli(args: Vec<String>) -> CliResult<()> {
    if wants_help(&args) {
        print_usage();
        return Ok(());
    }
    let parsed = parse_convert_cli_args(args.as_slice())?;
    let source = read_image(&parsed.paths)?;
    let converted = convert(&source, parsed.mime, parsed.quality)?;
    write_image(&parsed.paths, &converted)?;
    print_json(json!({
        "ok": true,
        "output": parsed.paths.output.display().to_string(),
        "from": source.mime(),
        "to": converted.mime(),
        "quality": parsed.quality,
        "output_bytes": converted.len(),
    }))
}

fn run_id_crop_cli(args: Vec<String>) -> CliResult<()> {
    if wants_help(&args) {
        print_usage();
        return Ok(());
    }
    let parsed = parse_id_crop_cli_args(args.as_slice())?;
    let source = read_image(&parsed.paths)?;
    let cropped = crop_to_id_size(&source, parsed.size.px_width, parsed.size.px_height)?;
    write_image(&parsed.paths, &cropped)?;
    print_json(json!({
        "ok": true,
        "output": parsed.paths.output.display().to_string(),
        "size": parsed.size,
        "output_bytes": cropped.len(),
    }))
}

fn run_presets_cli() -> CliResult<()> {
    print_json(json!({
        "ok": true,
        "id_photo_sizes": ID_PHOTO_SIZES,
        "resize_presets": RESIZE_PRESETS,
    }))
}

fn read_image(paths: &IoPaths) -> CliResult<ImagePayload> {
    let bytes = fs::read(&paths.input)?;
    let payload = ImagePayload::sniff(bytes)?;
    info!(
        input = %paths.input.display(),
        mime = %payload.mime(),
        bytes = payload.len(),
        "loaded source image"
    );
    Ok(payload)
}

fn write_image(paths: &IoPaths, payload: &ImagePayload) -> CliResult<()> {
    if let Some(parent) = paths.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&paths.output, payload.bytes())?;
    Ok(())
}

fn print_json(value: serde_json::Value) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn wants_help(args: &[String]) -> bool {
    args.iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_positive(raw: &str, flag: &str) -> CliResult<u32> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|value| *value > 0)
        .ok_or_else(|| {
            std::io::Error::other(format!("{flag} must be a positive integer, got '{raw}'")).into()
        })
}

fn print_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  cargo run -- [serve] [--config PATH] [--bind ADDR]\n",
        "  cargo run -- compress --input PATH --output PATH [--target-kb N]\n",
        "  cargo run -- resize --input PATH --output PATH (--width N --height N | --preset ID)\n",
        "  cargo run -- convert --input PATH --output PATH --format png|jpeg|webp|bmp|tiff [--quality 0..1]\n",
        "  cargo run -- id-crop --input PATH --output PATH [--size 1in|1in_s|2in|2in_s|passport|visa_us]\n",
        "  cargo run -- presets\n\n",
        "Defaults:\n",
        "  serve binds BINGO_BIND (127.0.0.1:8787); config file from --config or BINGO_CONFIG\n",
        "  provider keys come from GEMINI_API_KEY / BIGMODEL_API_KEY (.env is read)\n",
        "  --target-kb defaults to 100, --quality to 0.92, --size to 1in\n"
    ));
}
