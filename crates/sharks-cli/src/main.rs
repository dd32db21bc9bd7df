//! sharks-cli: Command-line tool for the Sharks platform layer
//!
//! Runs each platform operation on its own so a capture problem can be
//! reproduced without the overlay UI.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sharks_platform::{
    capture::{Platform, probe},
    model::{Geometry, OpenWindowInfo},
    util::detect::detect_platform,
};

#[derive(Parser)]
#[command(name = "sharks-cli")]
#[command(about = "CLI tool for screenshot, cursor and window debugging")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the OS, the bound and preferred backends and the desktop geometry
    Info,
    /// Capture a region of the virtual desktop
    Screenshot {
        /// Region as X,Y,WxH (defaults to the whole desktop)
        #[arg(long)]
        geometry: Option<Geometry>,
        /// Output PNG path (defaults to a timestamped name)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Save the current cursor image
    Cursor {
        /// Output PNG path (defaults to a timestamped name)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// List selectable top-level windows
    Windows {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Ask the compositor to fullscreen this process's overlay window
    Fullscreen,
}

#[derive(Serialize)]
struct InfoReport {
    os:              String,
    backend:         String,
    preferred:       String,
    wayland:         bool,
    virtual_desktop: Option<Geometry>,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sharks_cli=info".parse()?)
                .add_directive("sharks_platform=warn".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let mut platform = probe();
    tracing::info!("Using {} backend", platform.backend_type());

    match cli.command {
        Commands::Info => info(&platform)?,
        Commands::Screenshot { geometry, out } => screenshot(&mut platform, geometry, out)?,
        Commands::Cursor { out } => cursor(&mut platform, out)?,
        Commands::Windows { json } => windows(&mut platform, json)?,
        Commands::Fullscreen => {
            platform.request_fullscreen();
            println!("Fullscreen request sent");
        }
    }

    Ok(())
}

fn info(platform: &impl Platform) -> Result<()> {
    let platform_info = platform.platform_info();
    let report = InfoReport {
        os:              platform_info.os,
        backend:         platform_info.backend.to_string(),
        preferred:       detect_platform().backend.to_string(),
        wayland:         platform.is_wayland(),
        virtual_desktop: platform.virtual_desktop(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn screenshot(
    platform: &mut impl Platform,
    geometry: Option<Geometry>,
    out: Option<PathBuf>,
) -> Result<()> {
    let geometry = match geometry.or_else(|| platform.virtual_desktop()) {
        Some(geometry) => geometry,
        None => anyhow::bail!("Desktop size is unknown on this backend, pass --geometry"),
    };
    if geometry.is_empty() {
        anyhow::bail!("Geometry {} covers no pixels", geometry);
    }

    println!("Capturing {}...", geometry);
    let image = platform.screenshot(geometry);

    let out = out.unwrap_or_else(|| timestamped("screenshot"));
    save_png(&out, image.into_rgba_image())?;
    println!("✓ Screenshot saved to {}", out.display());
    Ok(())
}

fn cursor(platform: &mut impl Platform, out: Option<PathBuf>) -> Result<()> {
    let (image, hotspot) = platform.cursor_image().into_parts();
    if image.is_empty() {
        anyhow::bail!("No cursor image available on the {} backend", platform.backend_type());
    }

    let out = out.unwrap_or_else(|| timestamped("cursor"));
    println!(
        "Cursor {}x{}, hotspot ({}, {})",
        image.width(),
        image.height(),
        hotspot.x,
        hotspot.y
    );
    save_png(&out, image.into_rgba_image())?;
    println!("✓ Cursor saved to {}", out.display());
    Ok(())
}

fn windows(platform: &mut impl Platform, json: bool) -> Result<()> {
    let windows: Vec<OpenWindowInfo> = platform.open_windows();

    if json {
        println!("{}", serde_json::to_string_pretty(&windows)?);
        return Ok(());
    }

    println!("Found {} windows:\n", windows.len());
    for window in windows {
        println!("  {:<24} {}", window.geometry.to_string(), window.name);
    }
    Ok(())
}

fn timestamped(kind: &str) -> PathBuf {
    PathBuf::from(format!("sharks-{}-{}.png", kind, Local::now().format("%Y%m%d-%H%M%S")))
}

fn save_png(path: &Path, image: image::RgbaImage) -> Result<()> {
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write {}", path.display()))
}
