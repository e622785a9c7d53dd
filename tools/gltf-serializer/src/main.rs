//! gltf-serializer - glTF 2.0 / GLB scene export
//!
//! Exports a procedural demo scene to .glb or .gltf and prints the default
//! export configuration.

mod demo;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use gltf_serializer::{ExportConfig, GltfExporter, load_config};

#[derive(Parser)]
#[command(name = "gltf-serializer")]
#[command(about = "glTF 2.0 / GLB scene exporter")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export the demo scene
    Demo {
        /// Output file (.glb or .gltf)
        #[arg(short, long, default_value = "demo.glb")]
        output: PathBuf,

        /// Export config (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Export the camera (overrides config)
        #[arg(long)]
        camera: bool,
    },

    /// Print the default export config as TOML
    Config,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo {
            output,
            config,
            camera,
        } => {
            let mut config = match config {
                Some(path) => load_config(&path)
                    .with_context(|| format!("Failed to load config: {:?}", path))?,
                None => ExportConfig::default(),
            };
            if camera {
                config.camera = true;
            }

            let stage = demo::build_stage()?;
            let serializer = GltfExporter::new()
                .serialize(&stage, config)
                .context("Failed to serialize demo scene")?;

            let ext = output
                .extension()
                .and_then(|e| e.to_str())
                .map(|s| s.to_lowercase())
                .unwrap_or_default();

            let bytes = match ext.as_str() {
                "glb" => serializer.to_glb()?,
                "gltf" => serializer.to_json_string()?.into_bytes(),
                _ => anyhow::bail!("Unsupported output format: {:?} (use .glb or .gltf)", output),
            };

            std::fs::write(&output, &bytes)
                .with_context(|| format!("Failed to write output: {:?}", output))?;

            let gltf = serializer.to_gltf();
            tracing::info!(
                "Exported {:?}: {} nodes, {} meshes, {} materials, {} animations, {} bytes",
                output,
                gltf.nodes.len(),
                gltf.meshes.len(),
                gltf.materials.len(),
                gltf.animations.len(),
                bytes.len()
            );
        }

        Commands::Config => {
            let toml = toml::to_string_pretty(&ExportConfig::default())
                .context("Failed to serialize default config")?;
            print!("{}", toml);
        }
    }

    Ok(())
}
