//! marker-overlay CLI: overlay images or cubes on ArUco markers.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use marker_overlay::aruco::{dictionary_by_name, generate_marker, with_quiet_zone, DEFAULT_DICTIONARY};
use marker_overlay::io::{load_frame, save_frame, ImageSequenceSink, ImageSequenceSource};
use marker_overlay::{
    CameraIntrinsics, CameraModel, Distortion, FramePipeline, OverlayConfig, OverlayMode,
    PipelineError,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "marker-overlay")]
#[command(about = "Overlay images or wireframe cubes on ArUco markers")]
#[command(version)]
struct Cli {
    /// Log level (off, error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a single image file.
    Image {
        /// Input image.
        #[arg(long)]
        input: PathBuf,
        /// Output image; the format follows the extension.
        #[arg(long)]
        output: PathBuf,
        #[command(flatten)]
        overlay: OverlayArgs,
    },

    /// Process every image in a directory, in file-name order.
    Sequence {
        /// Directory of input frames.
        #[arg(long)]
        input: PathBuf,
        /// Directory for numbered output frames.
        #[arg(long)]
        output: PathBuf,
        #[command(flatten)]
        overlay: OverlayArgs,
    },

    /// Render a printable marker image.
    Generate {
        /// Marker id within the dictionary.
        #[arg(long, default_value_t = 0)]
        id: u32,
        /// Marker side in pixels, without the white margin.
        #[arg(long, default_value_t = 512)]
        size: u32,
        /// White margin in pixels (default: size / 8).
        #[arg(long)]
        margin: Option<u32>,
        /// Dictionary name.
        #[arg(long, default_value = DEFAULT_DICTIONARY)]
        dictionary: String,
        /// Output PNG.
        #[arg(long, default_value = "aruco_marker.png")]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct OverlayArgs {
    /// JSON config; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overlay strategy.
    #[arg(long, value_enum)]
    mode: Option<OverlayMode>,

    /// Image warped onto markers in planar mode.
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Physical marker side length.
    #[arg(long)]
    marker_length: Option<f64>,

    #[command(flatten)]
    camera: CameraArgs,
}

#[derive(Debug, Clone, Args, Default)]
struct CameraArgs {
    /// Camera focal length fx (pixels). If set, fy/cx/cy are required too.
    #[arg(long)]
    camera_fx: Option<f64>,
    /// Camera focal length fy (pixels).
    #[arg(long)]
    camera_fy: Option<f64>,
    /// Principal point cx (pixels).
    #[arg(long)]
    camera_cx: Option<f64>,
    /// Principal point cy (pixels).
    #[arg(long)]
    camera_cy: Option<f64>,
}

impl CameraArgs {
    fn to_model(&self) -> CliResult<Option<CameraModel>> {
        let intr = [self.camera_fx, self.camera_fy, self.camera_cx, self.camera_cy];
        let [Some(fx), Some(fy), Some(cx), Some(cy)] = intr else {
            if intr.iter().any(Option::is_some) {
                return Err(
                    "camera intrinsics are partial; provide all of --camera-fx --camera-fy --camera-cx --camera-cy"
                        .into(),
                );
            }
            return Ok(None);
        };
        let model = CameraModel::new(CameraIntrinsics { fx, fy, cx, cy }, Distortion::default());
        if !model.intrinsics.is_valid() {
            return Err(PipelineError::InvalidCamera.into());
        }
        Ok(Some(model))
    }
}

impl OverlayArgs {
    fn to_config(&self) -> CliResult<OverlayConfig> {
        let mut config = match &self.config {
            Some(path) => OverlayConfig::load_json(path)?,
            None => OverlayConfig::default(),
        };
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(path) = &self.overlay {
            config.overlay_path = Some(path.clone());
        }
        if let Some(length) = self.marker_length {
            config.marker_length = length;
        }
        if let Some(camera) = self.camera.to_model()? {
            config.camera = Some(camera);
        }
        Ok(config)
    }
}

fn init_logging(level: LevelFilter) -> CliResult<()> {
    #[cfg(feature = "tracing")]
    {
        let _ = level;
        tracing_log::LogTracer::init()?;
        marker_overlay::core::init_tracing(false);
    }
    #[cfg(not(feature = "tracing"))]
    {
        marker_overlay::core::init_with_level(level)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    init_logging(cli.log_level)?;

    match cli.command {
        Commands::Image {
            input,
            output,
            overlay,
        } => run_image(&input, &output, &overlay),
        Commands::Sequence {
            input,
            output,
            overlay,
        } => run_sequence(&input, &output, &overlay),
        Commands::Generate {
            id,
            size,
            margin,
            dictionary,
            output,
        } => run_generate(id, size, margin, &dictionary, &output),
    }
}

fn run_image(input: &Path, output: &Path, args: &OverlayArgs) -> CliResult<()> {
    let config = args.to_config()?;
    let mut pipeline = FramePipeline::from_config(&config)?;

    let frame = load_frame(input)?;
    log::info!("{}: {}x{}", input.display(), frame.width(), frame.height());
    let (out, detections) = pipeline.process_with_detections(frame);
    save_frame(&out, output)?;

    println!(
        "{} markers, written to {}",
        detections.len(),
        output.display()
    );
    Ok(())
}

fn run_sequence(input: &Path, output: &Path, args: &OverlayArgs) -> CliResult<()> {
    let config = args.to_config()?;
    let mut pipeline = FramePipeline::from_config(&config)?;

    let mut source = ImageSequenceSource::open(input)?;
    if source.is_empty() {
        return Err(PipelineError::EmptySource(input.to_path_buf()).into());
    }
    let mut sink = ImageSequenceSink::create(output)?;
    let stats = pipeline.run(&mut source, &mut sink)?;

    println!("{}", serde_json::to_string(&stats)?);
    Ok(())
}

fn run_generate(
    id: u32,
    size: u32,
    margin: Option<u32>,
    dictionary: &str,
    output: &Path,
) -> CliResult<()> {
    let dict = dictionary_by_name(dictionary)?;
    let marker = generate_marker(&dict, id, size, 1)?;
    let margin = margin.unwrap_or(size / 8) as usize;
    let img = with_quiet_zone(&marker, margin);

    let (w, h) = (img.width as u32, img.height as u32);
    let png = image::GrayImage::from_raw(w, h, img.data)
        .ok_or("marker buffer does not match its dimensions")?;
    png.save(output)?;

    println!("{} id {id} ({w}x{h}) written to {}", dict.name, output.display());
    Ok(())
}
