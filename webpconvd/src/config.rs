// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::job_engine::pool::PoolConfig;
use crate::jobs::webp_to_jpeg_job::DEFAULT_JPEG_QUALITY;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BUFFER_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
/// Upper bound for every configured timeout.
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Every option can also be given as an environment variable (or in a `.env` file).
#[derive(Debug, Clone, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Port to listen on. A leading colon is accepted (":3000").
    #[arg(long, env = "PORT", default_value = "3000", value_parser = parse_port)]
    pub port: u16,

    /// Number of worker threads
    #[arg(long, env = "NUM_WORKERS", default_value_t = 5)]
    pub num_workers: usize,

    /// Maximum number of jobs waiting for a worker
    #[arg(long, env = "JOB_QUEUE_SIZE", default_value_t = 100)]
    pub job_queue_size: usize,

    /// How long a request waits for its conversion (e.g. "30s")
    #[arg(long, env = "JOB_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    pub job_timeout: Duration,

    /// How long a request waits for queue space before the server reports busy
    #[arg(long, env = "JOB_QUEUE_TIMEOUT", default_value = "100ms", value_parser = parse_duration)]
    pub job_queue_timeout: Duration,

    /// How long a worker tries to hand a result back to its request
    #[arg(long, env = "WORKER_RESULT_TIMEOUT", default_value = "1s", value_parser = parse_duration)]
    pub worker_result_timeout: Duration,

    /// Maximum request body size in bytes
    #[arg(long, env = "BUFFER_SIZE", default_value_t = DEFAULT_BUFFER_SIZE)]
    pub buffer_size: usize,

    /// Directory that receives a copy of every converted file. Nothing is stored if unset.
    #[arg(long, env = "OUTPUT_PATH", value_name = "DIR")]
    pub output_path: Option<PathBuf>,

    /// JPEG quality (1-100)
    #[arg(long, env = "JPEG_QUALITY", default_value_t = DEFAULT_JPEG_QUALITY)]
    pub jpeg_quality: u8,

    /// How long shutdown waits for busy workers
    #[arg(long, env = "SHUTDOWN_GRACE", default_value = "10s", value_parser = parse_duration)]
    pub shutdown_grace: Duration,
}

pub fn validate_args(args: &Args) -> Result<(), String> {
    if args.num_workers == 0 {
        return Err("NUM_WORKERS must be at least 1".into());
    }
    if args.job_queue_size == 0 {
        return Err("JOB_QUEUE_SIZE must be at least 1".into());
    }
    if !(1..=100).contains(&args.jpeg_quality) {
        return Err(format!(
            "JPEG_QUALITY must be between 1 and 100, got {}",
            args.jpeg_quality
        ));
    }
    if args.buffer_size == 0 {
        return Err("BUFFER_SIZE must not be 0".into());
    }

    for (name, value) in [
        ("JOB_TIMEOUT", args.job_timeout),
        ("JOB_QUEUE_TIMEOUT", args.job_queue_timeout),
        ("WORKER_RESULT_TIMEOUT", args.worker_result_timeout),
    ] {
        if value.is_zero() {
            return Err(format!("{name} must not be 0"));
        }
    }
    for (name, value) in [
        ("JOB_TIMEOUT", args.job_timeout),
        ("JOB_QUEUE_TIMEOUT", args.job_queue_timeout),
        ("WORKER_RESULT_TIMEOUT", args.worker_result_timeout),
        ("SHUTDOWN_GRACE", args.shutdown_grace),
    ] {
        if value > MAX_DURATION {
            return Err(format!("{name} must not exceed {MAX_DURATION:?}, got {value:?}"));
        }
    }

    Ok(())
}

impl Args {
    pub fn into_config(self) -> ServiceConfig {
        ServiceConfig {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port)),
            body_limit: self.buffer_size,
            output_dir: self.output_path,
            jpeg_quality: self.jpeg_quality,
            shutdown_grace: self.shutdown_grace,
            pool: PoolConfig {
                capacity: self.job_queue_size,
                workers: self.num_workers,
                job_timeout: self.job_timeout,
                admission_timeout: self.job_queue_timeout,
                delivery_timeout: self.worker_result_timeout,
            },
        }
    }
}

/// Everything the service needs at startup. Built once in `main` and passed down by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub listen: SocketAddr,
    pub body_limit: usize,
    pub output_dir: Option<PathBuf>,
    pub jpeg_quality: u8,
    pub shutdown_grace: Duration,
    pub pool: PoolConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            body_limit: DEFAULT_BUFFER_SIZE,
            output_dir: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            pool: PoolConfig::default(),
        }
    }
}

fn parse_port(s: &str) -> Result<u16, String> {
    let digits = s.trim().trim_start_matches(':');
    digits
        .parse::<u16>()
        .map_err(|e| format!("invalid port {s:?}: {e}"))
}

/// Parses `"250ms"`, `"30s"`, `"5m"`, `"1h"` or a bare `"0"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in duration {s:?} (use ms, s, m or h)"))?;
    let (number, unit) = s.split_at(split);
    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration {s:?}"))?;

    let secs_per_unit = match unit {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => return Err(format!("unknown unit {unit:?} in duration {s:?}")),
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration {s:?} is out of range"))
}
