use anyhow::{Context, Result};
use clap::Parser;
use chrono::Utc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use transcribe_queue::{QueueClient, SqsQueueClient};
use transcribe_types::Job;

/// Constructs a valid job message and enqueues it. A thin companion to the
/// worker: it shares the queue client trait but never receives, deletes, or
/// extends visibility.
#[derive(Parser, Debug)]
#[command(name = "transcribe-submitter")]
#[command(about = "Enqueue a single transcription job", long_about = None)]
struct Args {
	/// Queue endpoint. Falls back to QUEUE_URL if omitted.
	#[arg(long = "queue_url", env = "QUEUE_URL")]
	queue_url: String,

	#[arg(long = "s3_input_path")]
	s3_input_path: String,

	#[arg(long = "s3_output_path")]
	s3_output_path: String,

	#[arg(long = "estimated_duration_seconds", default_value = "0")]
	estimated_duration_seconds: u64,

	#[arg(long = "priority", default_value = "0")]
	priority: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
	dotenvy::dotenv().ok();
	tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

	let args = Args::parse();

	if !args.s3_input_path.starts_with("s3://") {
		error!(path = %args.s3_input_path, "s3-input-path must be an s3:// uri");
		std::process::exit(1);
	}
	if !args.s3_output_path.starts_with("s3://") {
		error!(path = %args.s3_output_path, "s3-output-path must be an s3:// uri");
		std::process::exit(1);
	}

	let job = Job {
		job_id: uuid::Uuid::new_v4().to_string(),
		s3_input_path: args.s3_input_path,
		s3_output_path: args.s3_output_path,
		estimated_duration_seconds: args.estimated_duration_seconds,
		priority: args.priority,
		retry_count: 0,
		submitted_at: Utc::now(),
	};

	let body = serde_json::to_vec(&job).context("serializing job")?;

	let queue = SqsQueueClient::from_env(args.queue_url).await;
	match queue.send(body).await {
		Ok(()) => {
			info!(job_id = %job.job_id, "job enqueued");
			println!("Job ID: {}", job.job_id);
			Ok(())
		}
		Err(e) => {
			error!(error = %e, "failed to enqueue job");
			std::process::exit(1);
		}
	}
}
