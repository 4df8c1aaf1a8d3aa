use std::path::{Path, PathBuf};

use clap::Parser;
use dicom_mpr::{
    GpuResourceManager, Orientation, RenderLoop, RendererConfig, SliceExtractor, SliceStack,
    StackLoader, Volume, VolumeBuilder, Window, enums::SortBy,
};
use log::{error, info};

/// Write windowed axial, coronal and sagittal planes of a DICOM series.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Directory holding the .dcm files of one series
    #[arg(default_value = "dicom")]
    input: PathBuf,

    /// Where the PNGs go
    #[arg(short, long, default_value = ".")]
    out: PathBuf,

    /// Slice index along each axis (defaults to the centre)
    #[arg(short, long)]
    slice: Option<i64>,

    /// Window center, overrides the series default
    #[arg(long, requires = "width", allow_negative_numbers = true)]
    center: Option<f64>,

    /// Window width, overrides the series default
    #[arg(long, requires = "center")]
    width: Option<f64>,

    /// Renderer config (YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also render each view through a headless GPU viewport
    #[arg(long)]
    gpu: bool,

    /// Size of the GPU viewport
    #[arg(long, default_value_t = 512)]
    viewport_size: u32,
}

fn setup_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn pick_window(
    args: &Args,
    stack: &SliceStack,
    volume: &Volume,
) -> Result<Window, Box<dyn std::error::Error>> {
    if let (Some(center), Some(width)) = (args.center, args.width) {
        return Ok(Window::new(center, width)?);
    }
    Ok(stack
        .first()
        .and_then(|slice| slice.default_window)
        .unwrap_or_else(|| volume.full_range_window()))
}

fn slice_for(args: &Args, volume: &Volume, orientation: Orientation) -> i64 {
    args.slice.unwrap_or(orientation.extent(volume.dim()) as i64 / 2)
}

fn name(orientation: Orientation) -> &'static str {
    match orientation {
        Orientation::Axial => "axial",
        Orientation::Coronal => "coronal",
        Orientation::Sagittal => "sagittal",
    }
}

fn write_planes(
    args: &Args,
    volume: &Volume,
    window: &Window,
) -> Result<(), Box<dyn std::error::Error>> {
    for orientation in Orientation::ALL {
        let index = slice_for(args, volume, orientation);
        let plane = SliceExtractor::extract(volume, orientation.into(), index);
        let image = image::GrayImage::from_raw(
            plane.width as u32,
            plane.height as u32,
            plane.windowed(window),
        )
        .ok_or("plane does not match its dimensions")?;
        let path = args.out.join(format!("{}.png", name(orientation)));
        image.save(&path)?;
        info!("wrote {} ({}x{})", path.display(), plane.width, plane.height);
    }
    Ok(())
}

async fn render_on_gpu(
    args: &Args,
    stack: &SliceStack,
    volume: &Volume,
    config: &RendererConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let size = args.viewport_size.max(1);
    for orientation in Orientation::ALL {
        let gpu = GpuResourceManager::create_headless(size, size, config).await?;
        let mut viewport = RenderLoop::new(gpu);
        viewport.initialize().await?;
        viewport.set_series(stack, orientation.into())?;
        viewport.set_slice(slice_for(args, volume, orientation));
        if let (Some(center), Some(width)) = (args.center, args.width) {
            viewport.set_window(center, width)?;
        }
        viewport.tick()?;

        let pixels = viewport.backend().read_back().await?;
        let image = image::RgbaImage::from_raw(size, size, pixels)
            .ok_or("read back frame does not match the viewport")?;
        let path = args.out.join(format!("{}_gpu.png", name(orientation)));
        image.save(&path)?;
        info!("wrote {}", path.display());
        viewport.dispose();
    }
    Ok(())
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => RendererConfig::from_path(path)?,
        None => RendererConfig::default(),
    };

    let stack = StackLoader::load_from_directory(&args.input, SortBy::ImagePositionPatient)?;
    let volume = VolumeBuilder::build(&stack)?;
    let window = pick_window(&args, &stack, &volume)?;
    info!("window center {} width {}", window.center(), window.width());

    ensure_dir(&args.out)?;
    write_planes(&args, &volume, &window)?;
    if args.gpu {
        render_on_gpu(&args, &stack, &volume, &config).await?;
    }
    Ok(())
}

fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    setup_logger();
    let args = Args::parse();
    if let Err(err) = run(args).await {
        error!("{}", err);
        std::process::exit(1);
    }
}
