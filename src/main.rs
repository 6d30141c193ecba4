use anyhow::Result;
use clap::Parser;
use meeting_attendant::BotConfig;
use tracing::info;

/// Meeting attendance agent: validates a session configuration and
/// reports the resolved parameters. Live sessions embed a platform
/// driver through the library API; see demos/scripted_session.rs for a
/// complete wiring.
#[derive(Parser, Debug)]
#[command(name = "meeting-attendant", version)]
struct Args {
    /// Configuration file (without extension, any supported format)
    #[arg(long, default_value = "config/meeting-attendant")]
    config: String,

    /// Override the configured meeting URL
    #[arg(long)]
    meeting_url: Option<String>,

    /// Override the configured display name
    #[arg(long)]
    display_name: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut cfg = BotConfig::load(&args.config)?;

    if let Some(url) = args.meeting_url {
        cfg.meeting.url = Some(url);
    }
    if let Some(name) = args.display_name {
        cfg.meeting.display_name = name;
    }

    cfg.validate()?;

    info!("meeting-attendant v{}", env!("CARGO_PKG_VERSION"));
    info!("Platform: {}", cfg.meeting.platform);
    info!("Display name: {}", cfg.meeting.display_name);
    info!(
        "Meeting URL: {}",
        cfg.meeting.url.as_deref().unwrap_or("(not set)")
    );
    info!(
        "Stream backend: {} at {}Hz",
        cfg.stream.api_url, cfg.stream.sample_rate
    );
    info!(
        "Leave thresholds: waiting room {}ms, no-one-joined {}ms, everyone-left {}ms",
        cfg.automatic_leave.waiting_room_timeout_ms,
        cfg.automatic_leave.no_one_joined_timeout_ms,
        cfg.automatic_leave.everyone_left_timeout_ms,
    );
    info!("Configuration is valid");

    Ok(())
}
