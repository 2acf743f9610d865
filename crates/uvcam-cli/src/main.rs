use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use uvcam_core::negotiation::plan_stream;
use uvcam_core::{
    Coordinator, CoordinatorConfig, StreamRequest, Target, UvcFormat, UvcStreamHandler, FORMATS,
};
use uvcam_hw::quirks::list_quirks;
use uvcam_hw::sim::{self, SimulatedSensor};

#[derive(Parser)]
#[command(name = "uvcam", about = "uvcam UVC bridge diagnostics")]
struct Cli {
    /// Board family; selects the transfer buffer size
    #[arg(long, global = true, default_value = "esp32s3")]
    target: Target,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the formats and frames advertised to the host
    Caps {
        #[arg(long)]
        json: bool,
    },
    /// List sensors with post-init corrections
    Sensors,
    /// Dry-run a host request and show the sensor settings it maps to
    Negotiate {
        /// Requested mode, e.g. 640x480@30
        mode: StreamRequest,
        #[arg(long, value_enum, default_value_t = FormatArg::Mjpeg)]
        format: FormatArg,
        #[arg(long)]
        json: bool,
    },
    /// Stream frames from a simulated sensor through the coordinator
    Stream {
        /// Requested mode, e.g. 640x480@30
        mode: StreamRequest,
        /// Number of frames to pull
        #[arg(short, long, default_value_t = 10)]
        frames: u32,
        /// Sensor product ID, e.g. 0x3660
        #[arg(long, default_value = "0x26", value_parser = sim::parse_pid)]
        sensor: u16,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Mjpeg,
    Yuy2,
    Nv12,
    Gray8,
}

impl From<FormatArg> for UvcFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Mjpeg => UvcFormat::Mjpeg,
            FormatArg::Yuy2 => UvcFormat::Yuy2,
            FormatArg::Nv12 => UvcFormat::Nv12,
            FormatArg::Gray8 => UvcFormat::Gray8,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = CoordinatorConfig::for_target(cli.target);

    match cli.command {
        Commands::Caps { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(FORMATS)?);
            } else {
                for (fi, fmt) in FORMATS.iter().enumerate() {
                    println!("Format({}) = {}", fi + 1, fmt.format);
                    for (i, f) in fmt.frames.iter().enumerate() {
                        println!(
                            "\tFrame({}) = {} * {} @{}fps (interval: {})",
                            i + 1,
                            f.width,
                            f.height,
                            f.frame_rate,
                            f.interval
                        );
                    }
                }
                println!("Transfer buffer: {} bytes ({})", config.max_frame_bytes, cli.target);
            }
        }
        Commands::Sensors => {
            for q in list_quirks() {
                println!("{:<8} pid={:#06x}  {:?}", q.sensor.name, q.sensor.product_id, q.corrections);
            }
            println!("(every sensor also gets vflip=true first)");
        }
        Commands::Negotiate { mode, format, json } => {
            let request = StreamRequest {
                format: format.into(),
                ..mode
            };
            let plan = plan_stream(&request, FORMATS, &config)?;
            if json {
                let out = serde_json::json!({
                    "negotiated": plan.params,
                    "sensor": plan.sensor,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{request}: accepted");
                println!("  frame interval: {} (100ns units)", plan.params.frame_interval);
                println!("  sensor frame size: {}", plan.sensor.frame_size);
                println!("  JPEG quality: {}", plan.sensor.jpeg_quality);
                println!("  buffers: {}  xclk: {} Hz", plan.sensor.fb_count, plan.sensor.xclk_freq_hz);
            }
        }
        Commands::Stream {
            mode,
            frames,
            sensor,
        } => {
            let model = sim::model_for_pid(sensor)
                .ok_or_else(|| anyhow!("no simulated sensor with PID {sensor:#x}"))?;
            let mut coordinator = Coordinator::new(SimulatedSensor::new(model), config);
            coordinator.on_stream_start(&mode)?;

            for _ in 0..frames {
                match coordinator.on_frame_request() {
                    Some(frame) => {
                        println!(
                            "frame {:>4}: {} bytes {}x{} {} t={:?}",
                            frame.sequence,
                            frame.len,
                            frame.width,
                            frame.height,
                            frame.format,
                            frame.timestamp
                        );
                        coordinator.on_frame_release(frame);
                    }
                    None => println!("no frame"),
                }
            }
            coordinator.on_stream_stop();

            let stats = coordinator.exchange_stats();
            let counters = coordinator.sensor().counters();
            println!(
                "delivered={} empty={} oversized={} sensor_inits={} outstanding={}",
                stats.delivered,
                stats.empty_polls,
                stats.oversized,
                counters.inits,
                counters.outstanding()
            );
            coordinator.shutdown();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_stream_args() {
        let cli = Cli::try_parse_from(["uvcam", "stream", "1280x720@15", "--sensor", "0x3660"]).unwrap();
        match cli.command {
            Commands::Stream { mode, frames, sensor } => {
                assert_eq!(mode, StreamRequest::mjpeg(1280, 720, 15));
                assert_eq!(frames, 10);
                assert_eq!(sensor, 0x3660);
            }
            _ => panic!("expected stream"),
        }
    }

    #[test]
    fn test_sensor_id_accepts_decimal_rejects_garbage() {
        let cli = Cli::try_parse_from(["uvcam", "stream", "640x480@30", "--sensor", "155"]).unwrap();
        assert!(matches!(cli.command, Commands::Stream { sensor: 0x9b, .. }));
        assert!(Cli::try_parse_from(["uvcam", "stream", "640x480@30", "--sensor", "0xzz"]).is_err());
    }

    #[test]
    fn test_bad_mode_rejected() {
        assert!(Cli::try_parse_from(["uvcam", "negotiate", "640x480"]).is_err());
    }
}
