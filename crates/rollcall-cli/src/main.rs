use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rollcall", about = "Campus attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register (or overwrite) a face sample for a student
    Register {
        /// Student identity
        identity: String,
        /// Path to the captured frame (JPEG/PNG)
        image: PathBuf,
    },
    /// Submit an attendance attempt for a course
    Attend {
        /// Claimed student identity
        identity: String,
        /// Course code
        course: String,
        /// Path to the captured frame (JPEG/PNG)
        image: PathBuf,
        /// Latitude of the submission
        #[arg(long, requires = "longitude")]
        latitude: Option<f64>,
        /// Longitude of the submission
        #[arg(long, requires = "latitude")]
        longitude: Option<f64>,
    },
    /// List today's courses
    Courses,
    /// Show daemon status
    Status,
}

// `#[zbus::proxy]` generates the async `RollCallProxy` used below.
#[zbus::proxy(
    interface = "edu.campus.RollCall1",
    default_service = "edu.campus.RollCall1",
    default_path = "/edu/campus/RollCall1"
)]
trait RollCall {
    async fn register_face(&self, identity: &str, frame: Vec<u8>) -> zbus::Result<String>;

    async fn submit_attendance(
        &self,
        identity: &str,
        course: &str,
        frame: Vec<u8>,
        has_geolocation: bool,
        latitude: f64,
        longitude: f64,
    ) -> zbus::Result<String>;

    async fn list_courses(&self) -> zbus::Result<String>;

    async fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let connection = zbus::Connection::session()
        .await
        .context("connecting to the session bus")?;
    let proxy = RollCallProxy::new(&connection)
        .await
        .context("connecting to rollcalld")?;

    match cli.command {
        Commands::Register { identity, image } => {
            let frame = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let verdict = proxy.register_face(&identity, frame).await?;
            print_verdict(&verdict)?;
        }
        Commands::Attend {
            identity,
            course,
            image,
            latitude,
            longitude,
        } => {
            let frame = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let has_geolocation = latitude.is_some() && longitude.is_some();
            let verdict = proxy
                .submit_attendance(
                    &identity,
                    &course,
                    frame,
                    has_geolocation,
                    latitude.unwrap_or(0.0),
                    longitude.unwrap_or(0.0),
                )
                .await?;
            print_verdict(&verdict)?;
        }
        Commands::Courses => {
            let courses = proxy.list_courses().await?;
            let parsed: serde_json::Value = serde_json::from_str(&courses)?;
            match parsed.as_array() {
                Some(list) if !list.is_empty() => {
                    for course in list {
                        println!(
                            "{}  {}",
                            course["code"].as_str().unwrap_or("?"),
                            course["name"].as_str().unwrap_or("?")
                        );
                    }
                }
                _ => println!("no courses available"),
            }
        }
        Commands::Status => {
            let status = proxy.status().await?;
            let parsed: serde_json::Value = serde_json::from_str(&status)?;
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }
    }

    Ok(())
}

/// Render a verdict JSON string as a short human line.
fn print_verdict(raw: &str) -> Result<()> {
    let verdict: serde_json::Value = serde_json::from_str(raw)?;
    match verdict["verdict"].as_str() {
        Some("admitted") => {
            println!(
                "admitted: {} in {} (record {})",
                verdict["identity"].as_str().unwrap_or("?"),
                verdict["course"].as_str().unwrap_or("?"),
                verdict["record_id"].as_str().unwrap_or("?")
            );
        }
        Some("stored") => {
            println!(
                "face registered for {}",
                verdict["identity"].as_str().unwrap_or("?")
            );
        }
        Some("rejected") => {
            println!(
                "rejected ({}): {}",
                verdict["code"].as_str().unwrap_or("?"),
                verdict["message"].as_str().unwrap_or("")
            );
            if let Some(matched) = verdict["matched"].as_str() {
                println!("matched identity: {matched}");
            }
        }
        _ => println!("{raw}"),
    }
    Ok(())
}
