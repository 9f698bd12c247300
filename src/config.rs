use clap::{Args, Parser, Subcommand};
use std::{net::SocketAddr, path::PathBuf, thread};

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// ONNX export of the lunar terrain segmentation model
    #[arg(short, long, global = true, default_value = "lunar_model.onnx")]
    pub model_path: PathBuf,

    #[arg(short, long, global = true, default_value_t = 0)]
    pub device_id: i32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Serve the segmentation API and upload UI over HTTP
    Serve(ServeConfig),
    /// Segment every image in a directory into colorized PNGs
    Segment(SegmentConfig),
}

#[derive(Args, Clone, Debug)]
pub struct ServeConfig {
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    #[arg(short, long, default_value_t = 8000)]
    pub port: u16,

    /// Largest accepted upload, in MiB
    #[arg(long, default_value_t = 25, value_parser = clap::value_parser!(u32).range(1..=1024))]
    pub max_upload_mb: u32,
}

#[derive(Args, Clone, Debug)]
pub struct SegmentConfig {
    pub input_dir: PathBuf,

    #[arg(default_value = "output")]
    pub output_dir: PathBuf,

    #[arg(short, long, default_value_t = default_threads())]
    pub num_threads: usize,
}

impl ServeConfig {
    pub fn bind_address(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    pub const fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb as usize * 1024 * 1024
    }
}

fn default_threads() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}
