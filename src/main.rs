use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use beacon_ptt::buttons::ConsolePanel;
use beacon_ptt::clock::{Clock, SystemClock};
use beacon_ptt::connectivity::{RouteLink, WsTransport};
use beacon_ptt::discovery::MdnsResolver;
use beacon_ptt::power::HostPower;
use beacon_ptt::voice::{
    AudioInput, AudioOutput, CHUNK_SAMPLES, MicCapture, SAMPLE_RATE, Speaker, samples_to_wav,
};
use beacon_ptt::{ActivityLoop, BeepKind, Config, ConnectivityManager, Peripherals};

/// Beacon PTT - Push-to-talk voice client for the Beacon speech gateway
#[derive(Parser)]
#[command(name = "beacon-ptt", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/omni/beacon-ptt/config.toml)
    #[arg(short, long, env = "BEACON_PTT_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the push-to-talk client (default)
    Run,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Save the recording as a WAV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Play every feedback beep pattern
    TestBeep,
    /// Show the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,beacon_ptt=info",
        1 => "info,beacon_ptt=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_client(config).await,
        Command::TestMic { duration, output } => test_mic(duration, output.as_deref()),
        Command::TestBeep => test_beep(config.volume),
        Command::Config => {
            println!("{config:#?}");
            Ok(())
        }
    }
}

/// Run the activity loop on a blocking thread until Ctrl-C or power-off
async fn run_client(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        device_id = %config.device_id,
        "starting beacon-ptt"
    );

    let stop = Arc::new(AtomicBool::new(false));
    let loop_stop = Arc::clone(&stop);
    let runtime = tokio::runtime::Handle::current();

    // Audio streams are not Send, so everything is built on the loop thread
    let worker = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let io = Peripherals {
            mic: Box::new(MicCapture::new()?),
            speaker: Box::new(Speaker::new()?),
            buttons: Box::new(ConsolePanel::spawn()?),
            power: Box::new(HostPower::new()),
            clock: Box::new(SystemClock::new()),
        };
        let net = ConnectivityManager::new(
            &config,
            Box::new(RouteLink::new(&config.wifi)),
            Box::new(MdnsResolver::new(config.timing.resolve_timeout_ms)?),
            Box::new(WsTransport::new(runtime)),
        );

        let mut client = ActivityLoop::new(&config, io, net);
        client.begin()?;
        tracing::info!("beacon-ptt ready, hold talk to dictate");
        client.run(&loop_stop);
        Ok(())
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutting down");
            stop.store(true, Ordering::Relaxed);
        }
        // The loop can be stuck waiting for the network; a second Ctrl-C exits
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    worker.await??;
    tracing::info!("beacon-ptt stopped");
    Ok(())
}

/// Test microphone input
fn test_mic(duration: u64, output: Option<&std::path::Path>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let clock = SystemClock::new();
    let mut mic = MicCapture::new()?;
    mic.begin()?;

    println!("Sample rate: {SAMPLE_RATE} Hz");
    println!("---");

    let mut chunk = [0_i16; CHUNK_SAMPLES];
    let mut recording = Vec::new();
    for i in 0..duration {
        let second_end = clock.now_ms() + 1000;
        let mut second = Vec::new();
        while clock.now_ms() < second_end {
            if mic.try_record(&mut chunk) {
                second.extend_from_slice(&chunk);
            } else {
                clock.delay_ms(5);
            }
        }

        let energy = calculate_rms(&second);
        let peak = second.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:5} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );

        recording.extend(second);
    }

    mic.end();

    if let Some(path) = output {
        let wav = samples_to_wav(&recording, SAMPLE_RATE)?;
        std::fs::write(path, wav)?;
        println!("\nSaved {} samples to {}", recording.len(), path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// RMS energy, normalized to 0.0..=1.0
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples
        .iter()
        .map(|&s| {
            let x = f32::from(s) / 32768.0;
            x * x
        })
        .sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Play each feedback pattern in priority order
fn test_beep(volume: u8) -> anyhow::Result<()> {
    println!("Playing feedback beeps at volume {volume}...\n");

    let clock = SystemClock::new();
    let mut speaker = Speaker::new()?;
    speaker.begin()?;
    speaker.set_volume(volume);

    for kind in BeepKind::PRIORITY {
        let pattern = kind.pattern();
        println!(
            "{kind}: {} Hz, {} ms x{}",
            pattern.freq_hz, pattern.duration_ms, pattern.repeat
        );
        pattern.play(&mut speaker, &clock);
        clock.delay_ms(600);
    }

    speaker.end();

    println!("\n---");
    println!("If you heard four distinct patterns, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Try: pavucontrol (to check levels)");

    Ok(())
}
