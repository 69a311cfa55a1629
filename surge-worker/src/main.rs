use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use surge_client::HttpConnectionFactory;
use surge_common::{JobDescriptor, JobResult};
use surge_worker::config::{self, WorkerConfig, INITIALIZE_TIMEOUT, RELEASE_COOLDOWN};
use surge_worker::{Job, ScenarioRegistry};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "surge-worker", about = "Surge load-generation worker")]
struct Args {
    /// Path to a JSON job descriptor
    #[arg(long)]
    job: PathBuf,

    /// Pause after disposing connections (seconds)
    #[arg(long, default_value_t = RELEASE_COOLDOWN.as_secs())]
    cooldown_secs: u64,

    /// Per-connection initialization limit (seconds); 0 disables it
    #[arg(long, default_value_t = INITIALIZE_TIMEOUT.as_secs())]
    initialize_timeout_secs: u64,

    /// Write the job result as JSON to this file
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let descriptor = config::load_descriptor(&args.job).unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(3);
    });

    init_logging(&descriptor);

    let worker_config = WorkerConfig {
        release_cooldown: Duration::from_secs(args.cooldown_secs),
        initialize_timeout: match args.initialize_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        },
    };

    let job = Job::new(
        descriptor,
        Arc::new(HttpConnectionFactory::default()),
        Arc::new(ScenarioRegistry::with_defaults()),
        worker_config,
    );

    if let Err(e) = job.start().await {
        eprintln!("Failed to start job: {e}");
        job.stop();
        job.release().await;
        process::exit(3);
    }

    print!("Running {}s {} job ", job.descriptor().duration, job.descriptor().scenario().unwrap_or("-"));
    std::io::stdout().flush().ok();

    let dot_handle = tokio::spawn(async {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.tick().await; // consume the immediate first tick
        loop {
            interval.tick().await;
            print!(".");
            std::io::stdout().flush().ok();
        }
    });

    let interrupt = job.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.stop();
        }
    });

    let result = job.wait().await;

    dot_handle.abort();
    println!();

    job.release().await;

    print_report(&result, job.descriptor());

    if let Some(path) = &args.output {
        if let Err(e) = write_result(path, &result) {
            eprintln!("Failed to write {}: {e}", path.display());
            process::exit(3);
        }
    }

    process::exit(if result.has_error() { 1 } else { 0 });
}

/// `RUST_LOG` wins; otherwise the job's `loglevel` property, then `info`.
fn init_logging(descriptor: &JobDescriptor) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(descriptor.log_level().unwrap_or("info"))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn write_result(path: &std::path::Path, result: &JobResult) -> std::io::Result<()> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, result)?;
    Ok(())
}

fn print_report(result: &JobResult, descriptor: &JobDescriptor) {
    println!("Surge Job Results");
    println!("=================");
    println!("Job:                   {}", result.id);
    println!("Scenario:              {}", descriptor.scenario().unwrap_or("-"));
    println!("Connections:           {}", descriptor.connections);
    println!("Duration:              {:.1} s", result.duration_ms / 1000.0);
    println!();
    println!("Requests:              {}", format_thousands(result.requests));
    println!("Throughput:            {:.1} rps", result.requests_per_second);
    println!(
        "Per connection:        {} min / {} max",
        result.min_requests_per_connection, result.max_requests_per_connection
    );
    println!("Average latency:       {:.2} ms", result.latency.average);
    if let Some(p) = result.latency.percentiles {
        println!("P50 latency:           {:.2} ms", p.p50);
        println!("P75 latency:           {:.2} ms", p.p75);
        println!("P90 latency:           {:.2} ms", p.p90);
        println!("P99 latency:           {:.2} ms", p.p99);
        println!("Max latency:           {:.2} ms", p.p100);
    }
    println!();
    if result.has_error() {
        println!("Errors:");
        for line in result.error.lines() {
            println!("  {line}");
        }
        println!();
    }
    println!("Result: {}", if result.has_error() { "FAIL" } else { "PASS" });
}

fn format_thousands(n: u64) -> String {
    if n >= 1_000_000 {
        format!("~{}M", n / 1_000_000)
    } else if n >= 1_000 {
        format!("~{}K", n / 1_000)
    } else {
        n.to_string()
    }
}
